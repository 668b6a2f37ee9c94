use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use crate::api::{auth, types::*, ApiState};
use crate::db::models::{Session, StoredSession, UserSessionSummary};
use crate::error::FocusError;

/// POST /api/sessions: append one ended session for the caller.
///
/// The body is parsed only after authentication so an anonymous request is
/// always answered with 401.
pub async fn create_session(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<StoredSession>), ApiError> {
    let user = auth::authenticate(&state, &headers).await?;

    let session: Session = serde_json::from_slice(&body)
        .map_err(|err| FocusError::invalid(format!("malformed body: {err}")))?;

    let stored = state.service.append(&user, session).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// GET /api/sessions: every session of the caller plus aggregates.
pub async fn list_sessions(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<UserSessionSummary>, ApiError> {
    let user = auth::authenticate(&state, &headers).await?;
    Ok(Json(state.service.list(&user).await?))
}

/// GET /api/sessions/latest
pub async fn latest_session(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<StoredSession>, ApiError> {
    let user = auth::authenticate(&state, &headers).await?;
    Ok(Json(state.service.latest(&user).await?))
}

/// DELETE /api/sessions: remove all of the caller's sessions in one transaction.
pub async fn clear_sessions(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<ClearedResponse>, ApiError> {
    let user = auth::authenticate(&state, &headers).await?;
    let deleted = state.service.clear(&user).await?;
    Ok(Json(ClearedResponse { deleted }))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}
