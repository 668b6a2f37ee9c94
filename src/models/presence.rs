use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One answer from the presence detector. Consumed immediately, never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSample {
    pub detected: bool,
    pub timestamp: DateTime<Utc>,
}

impl PresenceSample {
    pub fn new(detected: bool, timestamp: DateTime<Utc>) -> Self {
        Self {
            detected,
            timestamp,
        }
    }

    pub fn now(detected: bool) -> Self {
        Self::new(detected, Utc::now())
    }
}
