//! Session records as they cross the persistence boundary.
//!
//! `Session` is the current shape. Rows written before aggregate statistics
//! existed only carry timestamps and an `attentionSpans` array; they decode as
//! `SessionRecord::Legacy` and are upgraded (or not) by `SessionRecord::migrate`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FocusError, FocusResult};

const FOCUS_PERCENT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Filled by the server from the caller identity; clients may omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_session_time: u64,
    pub total_time_unfocused: u64,
    pub total_time_focused: u64,
    pub number_of_alerts: u32,
    pub focus_percent: f64,
}

impl Session {
    /// Derives the statistics of an ended session.
    ///
    /// Unfocused time is clamped to the session length: the tick clock can
    /// account one period that the wall clock has not fully elapsed yet.
    pub fn finalize(
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        unfocused_secs: u64,
        alerts: u32,
    ) -> Self {
        let total_session_time = whole_seconds_between(start_time, end_time);
        let total_time_unfocused = unfocused_secs.min(total_session_time);
        let total_time_focused = total_session_time - total_time_unfocused;

        Self {
            user_id: None,
            start_time,
            end_time,
            total_session_time,
            total_time_unfocused,
            total_time_focused,
            number_of_alerts: alerts,
            focus_percent: focus_percent(total_time_focused, total_session_time),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Checks every data-model invariant before the record is stored.
    pub fn validate(&self) -> FocusResult<()> {
        if self.end_time < self.start_time {
            return Err(FocusError::invalid("endTime precedes startTime"));
        }

        let expected_total = whole_seconds_between(self.start_time, self.end_time);
        if self.total_session_time != expected_total {
            return Err(FocusError::invalid(format!(
                "totalSessionTime {} does not match endTime - startTime ({expected_total})",
                self.total_session_time
            )));
        }

        if self.total_time_unfocused > self.total_session_time {
            return Err(FocusError::invalid(format!(
                "totalTimeUnfocused {} exceeds totalSessionTime {}",
                self.total_time_unfocused, self.total_session_time
            )));
        }

        // Unfocused <= total was checked above, so the subtraction cannot underflow.
        if self.total_time_focused != self.total_session_time - self.total_time_unfocused {
            return Err(FocusError::invalid(
                "totalTimeFocused + totalTimeUnfocused must equal totalSessionTime",
            ));
        }

        if !self.focus_percent.is_finite() || !(0.0..=100.0).contains(&self.focus_percent) {
            return Err(FocusError::invalid(format!(
                "focusPercent {} outside [0, 100]",
                self.focus_percent
            )));
        }

        let expected_percent = focus_percent(self.total_time_focused, self.total_session_time);
        if (self.focus_percent - expected_percent).abs() > FOCUS_PERCENT_TOLERANCE {
            return Err(FocusError::invalid(format!(
                "focusPercent {} does not match totalTimeFocused / totalSessionTime ({expected_percent})",
                self.focus_percent
            )));
        }

        Ok(())
    }
}

/// Record shape used before per-session statistics were stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub attention_spans: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionRecord {
    Current(Session),
    Legacy(LegacySession),
}

impl SessionRecord {
    pub fn start_time(&self) -> DateTime<Utc> {
        match self {
            SessionRecord::Current(session) => session.start_time,
            SessionRecord::Legacy(legacy) => legacy.start_time,
        }
    }

    /// Upgrades the record to the current shape.
    ///
    /// Legacy rows never recorded focused time or alerts, so they yield `None`
    /// and contribute nothing to aggregates.
    pub fn migrate(&self) -> Option<Session> {
        match self {
            SessionRecord::Current(session) => Some(session.clone()),
            SessionRecord::Legacy(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub id: SessionId,
    #[serde(flatten)]
    pub record: SessionRecord,
}

/// Cross-session statistics, recomputed on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserSessionSummary {
    pub sessions: Vec<StoredSession>,
    pub total_session_time: u64,
    pub total_focus_time: u64,
    pub total_alerts: u64,
    pub average_alerts: f64,
    pub average_focus_percentage: f64,
}

pub fn whole_seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    (end - start).num_seconds().max(0) as u64
}

pub fn focus_percent(focused_secs: u64, total_secs: u64) -> f64 {
    if total_secs == 0 {
        0.0
    } else {
        focused_secs as f64 / total_secs as f64 * 100.0
    }
}
