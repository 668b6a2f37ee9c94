pub mod alerts;
pub mod commands;
pub mod controller;
pub mod presence;
pub mod sink;
pub mod state;

pub use alerts::{AlertDispatcher, AlertEvent, AlertSink, LogAlertSink};
pub use controller::{
    EndedSession, MonitorEvent, Persistence, SessionTracker, TrackerConfig, TrackerSnapshot,
    TrackerStatus,
};
pub use presence::{PresenceReader, SignalDebouncer};
pub use sink::{LocalSessionSink, RemoteSessionSink, SessionSink};
pub use state::{
    AlertState, AlertStateMachine, AlertThresholds, AlertTier, AttentionState, RearmPolicy,
    TickOutcome,
};
