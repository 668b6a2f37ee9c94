use log::{error, info};

use crate::{
    db::{
        models::{Session, SessionId, StoredSession, UserSessionSummary},
        Database, SessionRecord,
    },
    error::{FocusError, FocusResult},
    identity::UserId,
};

use super::summary::summarize;

/// Per-user session log with aggregates computed on read.
#[derive(Clone)]
pub struct SessionAggregationService {
    db: Database,
}

impl SessionAggregationService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Stores one ended session for `user`. Any `userId` carried by the
    /// record is replaced by the caller identity.
    pub async fn append(&self, user: &UserId, session: Session) -> FocusResult<StoredSession> {
        let session = session.with_user(user.as_str());
        session.validate()?;

        let id = SessionId::generate();
        self.db.insert_session(&id, &session).await.map_err(|err| {
            error!("Failed to store session for {user}: {err:#}");
            FocusError::storage(err)
        })?;

        info!(
            "Stored session {id} for {user} ({}s, {} alerts)",
            session.total_session_time, session.number_of_alerts
        );

        Ok(StoredSession {
            id,
            record: SessionRecord::Current(session),
        })
    }

    pub async fn list(&self, user: &UserId) -> FocusResult<UserSessionSummary> {
        let sessions = self
            .db
            .list_sessions_for_user(user.as_str())
            .await
            .map_err(|err| {
                error!("Failed to read sessions for {user}: {err:#}");
                FocusError::storage(err)
            })?;
        Ok(summarize(sessions))
    }

    pub async fn latest(&self, user: &UserId) -> FocusResult<StoredSession> {
        self.db
            .latest_session_for_user(user.as_str())
            .await
            .map_err(|err| {
                error!("Failed to read latest session for {user}: {err:#}");
                FocusError::storage(err)
            })?
            .ok_or(FocusError::NotFound)
    }

    /// Deletes the user's whole history or nothing.
    pub async fn clear(&self, user: &UserId) -> FocusResult<usize> {
        let removed = self
            .db
            .delete_sessions_for_user(user.as_str())
            .await
            .map_err(|err| {
                error!("Failed to clear sessions for {user}: {err:#}");
                FocusError::storage(err)
            })?;
        info!("Cleared {removed} sessions for {user}");
        Ok(removed)
    }
}
