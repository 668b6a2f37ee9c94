pub mod session;

pub use session::{
    focus_percent, whole_seconds_between, LegacySession, Session, SessionId, SessionRecord,
    StoredSession, UserSessionSummary,
};
