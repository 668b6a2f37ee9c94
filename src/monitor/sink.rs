//! Where an ended session goes: straight into a local store, or over HTTP to
//! an aggregation server.

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::StatusCode;

use crate::{
    aggregation::SessionAggregationService,
    db::models::{Session, SessionId, StoredSession},
    error::{FocusError, FocusResult},
    identity::UserId,
};

#[async_trait]
pub trait SessionSink: Send + Sync {
    async fn persist(&self, session: &Session) -> FocusResult<SessionId>;
}

pub struct LocalSessionSink {
    service: SessionAggregationService,
    user: UserId,
}

impl LocalSessionSink {
    pub fn new(service: SessionAggregationService, user: UserId) -> Self {
        Self { service, user }
    }
}

#[async_trait]
impl SessionSink for LocalSessionSink {
    async fn persist(&self, session: &Session) -> FocusResult<SessionId> {
        let stored = self.service.append(&self.user, session.clone()).await?;
        Ok(stored.id)
    }
}

pub struct RemoteSessionSink {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl RemoteSessionSink {
    pub fn new(base_url: &str, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/api/sessions", base_url.trim_end_matches('/')),
            token: token.into(),
        }
    }
}

#[async_trait]
impl SessionSink for RemoteSessionSink {
    async fn persist(&self, session: &Session) -> FocusResult<SessionId> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(session)
            .send()
            .await
            .map_err(|err| FocusError::storage(anyhow!("POST {} failed: {err}", self.endpoint)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(FocusError::Unauthenticated);
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(FocusError::invalid(format!("server rejected session ({status}): {body}")));
        }
        if !status.is_success() {
            return Err(FocusError::storage(anyhow!(
                "server responded {status} to session upload"
            )));
        }

        let stored: StoredSession = response
            .json()
            .await
            .map_err(|err| FocusError::storage(anyhow!("unreadable upload response: {err}")))?;
        Ok(stored.id)
    }
}
