use std::sync::Arc;

use tokio::sync::watch;

use crate::models::PresenceSample;

/// Single-slot, last-write-wins presence signal.
///
/// Detection writes through `observe`; the tick clock reads whatever is in
/// the slot when it fires. Nothing is queued, so slow detection never builds
/// a backlog. A sample older than the one already held is dropped.
#[derive(Clone)]
pub struct SignalDebouncer {
    tx: Arc<watch::Sender<Option<PresenceSample>>>,
}

impl Default for SignalDebouncer {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalDebouncer {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Returns false when the sample was discarded as late.
    pub fn observe(&self, sample: PresenceSample) -> bool {
        self.tx.send_if_modified(|slot| match slot {
            Some(current) if sample.timestamp < current.timestamp => false,
            _ => {
                *slot = Some(sample);
                true
            }
        })
    }

    pub fn reader(&self) -> PresenceReader {
        PresenceReader {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Clone)]
pub struct PresenceReader {
    rx: watch::Receiver<Option<PresenceSample>>,
}

impl PresenceReader {
    /// No sample yet counts as absent.
    pub fn is_present(&self) -> bool {
        self.rx.borrow().map(|sample| sample.detected).unwrap_or(false)
    }
}
