use thiserror::Error;

#[derive(Error, Debug)]
pub enum FocusError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("no session found")]
    NotFound,

    #[error("session storage unavailable: {0}")]
    StorageUnavailable(#[source] anyhow::Error),

    #[error("presence device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("session is not running")]
    SessionNotRunning,

    #[error("session was already started")]
    SessionAlreadyStarted,
}

impl FocusError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        FocusError::InvalidSession(reason.into())
    }

    pub fn storage(err: anyhow::Error) -> Self {
        FocusError::StorageUnavailable(err)
    }
}

pub type FocusResult<T> = std::result::Result<T, FocusError>;
