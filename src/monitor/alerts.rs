use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;

use super::AlertTier;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub session_id: String,
    pub tier: AlertTier,
    /// 1-based count of alerts fired in this session, including this one.
    pub alert_number: u32,
    pub absent_secs: u64,
    pub message: &'static str,
    pub fired_at: DateTime<Utc>,
}

/// Receives alerts from inside the tick. Implementations must return
/// promptly: the next tick is not evaluated until `dispatch` returns.
pub trait AlertSink: Send {
    fn dispatch(&mut self, alert: &AlertEvent);

    /// Frees any device or thread held by the sink.
    fn release(&mut self) {}
}

pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn dispatch(&mut self, alert: &AlertEvent) {
        warn!(
            "[session {}] alert #{} ({:?}) after {}s away: {}",
            alert.session_id, alert.alert_number, alert.tier, alert.absent_secs, alert.message
        );
    }
}

/// Owns the sinks for one session and releases them on teardown.
#[derive(Default)]
pub struct AlertDispatcher {
    sinks: Vec<Box<dyn AlertSink>>,
    released: bool,
}

impl AlertDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: impl AlertSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn push(&mut self, sink: Box<dyn AlertSink>) {
        self.sinks.push(sink);
    }

    pub fn dispatch(&mut self, alert: &AlertEvent) {
        if self.released {
            return;
        }
        for sink in &mut self.sinks {
            sink.dispatch(alert);
        }
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for sink in &mut self.sinks {
            sink.release();
        }
    }
}

impl Drop for AlertDispatcher {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Records dispatched alerts and release calls.
    #[derive(Clone, Default)]
    pub struct RecordingSink {
        pub alerts: Arc<Mutex<Vec<AlertEvent>>>,
        pub releases: Arc<Mutex<u32>>,
    }

    impl AlertSink for RecordingSink {
        fn dispatch(&mut self, alert: &AlertEvent) {
            self.alerts.lock().unwrap().push(alert.clone());
        }

        fn release(&mut self) {
            *self.releases.lock().unwrap() += 1;
        }
    }
}
