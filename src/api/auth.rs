use axum::http::{header::AUTHORIZATION, HeaderMap};

use crate::api::{types::ApiError, ApiState};
use crate::identity::{bearer_token, UserId};

/// Resolves the caller from the `Authorization: Bearer` header.
pub async fn authenticate(state: &ApiState, headers: &HeaderMap) -> Result<UserId, ApiError> {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let token = bearer_token(header)?;
    Ok(state.identity.resolve(token).await?)
}
