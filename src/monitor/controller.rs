use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{
    db::models::{Session, SessionId},
    error::{FocusError, FocusResult},
    models::PresenceSample,
    sensing::{FrameSource, PresenceDetector, SensingController},
    settings::MonitorSettings,
};

use super::{
    alerts::{AlertDispatcher, AlertEvent},
    presence::{PresenceReader, SignalDebouncer},
    sink::SessionSink,
    AlertState, AlertStateMachine, AlertThresholds, AttentionState,
};

// Set to false to silence tick-level logging in this module
const ENABLE_LOGS: bool = true;

use crate::session_log;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TrackerStatus {
    NotStarted,
    Running,
    Ended,
    Discarded,
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub thresholds: AlertThresholds,
    pub tick_interval: Duration,
    pub capture_interval: Duration,
    pub heartbeat_every_ticks: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::from_settings(&MonitorSettings::default())
    }
}

impl TrackerConfig {
    pub fn from_settings(settings: &MonitorSettings) -> Self {
        let debug_mode = std::env::var("FOCUSBUDDY_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            thresholds: settings.thresholds(),
            tick_interval: settings.tick_interval(),
            capture_interval: settings.capture_interval(),
            heartbeat_every_ticks: if debug_mode { 1 } else { 10 },
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSnapshot {
    pub session_id: String,
    pub status: TrackerStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_secs: u64,
    pub unfocused_secs: u64,
    pub attention: AttentionState,
    pub alert_state: AlertState,
    pub present: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MonitorEvent {
    Started {
        session_id: String,
        started_at: DateTime<Utc>,
    },
    Heartbeat(TrackerSnapshot),
    Alert(AlertEvent),
    Ended {
        session: Session,
        saved: bool,
    },
    Discarded {
        session_id: String,
    },
}

#[derive(Debug)]
pub enum Persistence {
    Saved(SessionId),
    Failed(FocusError),
}

/// Result of `end_session`. The record is available even when saving failed.
#[derive(Debug)]
pub struct EndedSession {
    pub session: Session,
    pub persistence: Persistence,
}

impl EndedSession {
    pub fn is_saved(&self) -> bool {
        matches!(self.persistence, Persistence::Saved(_))
    }

    pub fn saved_id(&self) -> Option<&SessionId> {
        match &self.persistence {
            Persistence::Saved(id) => Some(id),
            Persistence::Failed(_) => None,
        }
    }
}

struct TrackerState {
    status: TrackerStatus,
    started_at: Option<DateTime<Utc>>,
    anchor: Option<Instant>,
    final_elapsed: Option<Duration>,
    monitor: AlertStateMachine,
    unfocused: Duration,
    absent_run: u32,
    alerts: AlertDispatcher,
}

impl TrackerState {
    fn elapsed(&self) -> Duration {
        match (self.final_elapsed, self.anchor) {
            (Some(elapsed), _) => elapsed,
            (None, Some(anchor)) => anchor.elapsed(),
            (None, None) => Duration::ZERO,
        }
    }

    fn evaluate_tick(
        &mut self,
        present: bool,
        session_id: &str,
        tick_interval: Duration,
    ) -> Option<AlertEvent> {
        let outcome = self.monitor.tick(present);

        if present {
            self.absent_run = 0;
        } else {
            self.absent_run = self.absent_run.saturating_add(1);
            self.unfocused += tick_interval;
        }

        let alert = outcome.alert.map(|tier| AlertEvent {
            session_id: session_id.to_string(),
            tier,
            alert_number: outcome.attention.alerts_fired,
            absent_secs: tick_interval.saturating_mul(self.absent_run).as_secs(),
            message: tier.message(),
            fired_at: Utc::now(),
        });

        if let Some(alert) = &alert {
            self.alerts.dispatch(alert);
        }
        alert
    }

    fn snapshot(&self, session_id: &str, present: bool) -> TrackerSnapshot {
        TrackerSnapshot {
            session_id: session_id.to_string(),
            status: self.status,
            started_at: self.started_at,
            elapsed_secs: self.elapsed().as_secs(),
            unfocused_secs: self.unfocused.as_secs(),
            attention: self.monitor.attention(),
            alert_state: self.monitor.state(),
            present,
        }
    }
}

/// Lifecycle of one focus session: `NotStarted -> Running -> Ended | Discarded`.
///
/// A tracker runs a single session; start a new tracker for the next one.
pub struct SessionTracker {
    session_id: String,
    config: TrackerConfig,
    state: Arc<Mutex<TrackerState>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    sensing: Mutex<SensingController>,
    debouncer: SignalDebouncer,
    sink: Arc<dyn SessionSink>,
    events: broadcast::Sender<MonitorEvent>,
}

impl SessionTracker {
    pub fn new(config: TrackerConfig, sink: Arc<dyn SessionSink>, alerts: AlertDispatcher) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = TrackerState {
            status: TrackerStatus::NotStarted,
            started_at: None,
            anchor: None,
            final_elapsed: None,
            monitor: AlertStateMachine::new(config.thresholds),
            unfocused: Duration::ZERO,
            absent_run: 0,
            alerts,
        };

        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            config,
            state: Arc::new(Mutex::new(state)),
            ticker: Mutex::new(None),
            sensing: Mutex::new(SensingController::new()),
            debouncer: SignalDebouncer::new(),
            sink,
            events,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Write side of the presence slot, for hosts that detect presence themselves.
    pub fn presence(&self) -> SignalDebouncer {
        self.debouncer.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub async fn status(&self) -> TrackerStatus {
        self.state.lock().await.status
    }

    pub async fn snapshot(&self) -> TrackerSnapshot {
        let present = self.debouncer.reader().is_present();
        self.state.lock().await.snapshot(&self.session_id, present)
    }

    pub async fn start(&self) -> FocusResult<()> {
        let started_at = {
            let mut state = self.state.lock().await;
            if state.status != TrackerStatus::NotStarted {
                return Err(FocusError::SessionAlreadyStarted);
            }
            let started_at = Utc::now();
            state.status = TrackerStatus::Running;
            state.started_at = Some(started_at);
            state.anchor = Some(Instant::now());
            started_at
        };

        self.spawn_ticker().await;

        session_log!(info, self.session_id, "session started");
        let _ = self.events.send(MonitorEvent::Started {
            session_id: self.session_id.clone(),
            started_at,
        });
        Ok(())
    }

    /// Starts capturing from `source`. When the device cannot be acquired the
    /// session keeps running and counts as absent.
    pub async fn attach_presence_source(
        &self,
        source: &dyn FrameSource,
        detector: Arc<dyn PresenceDetector>,
    ) -> FocusResult<()> {
        self.ensure_running().await?;

        let result = self.sensing.lock().await.start_sensing(
            self.session_id.clone(),
            source,
            detector,
            self.debouncer.clone(),
            self.config.capture_interval,
        );

        if let Err(err) = &result {
            session_log!(warn, self.session_id, "{err}; treating presence as absent");
            self.debouncer.observe(PresenceSample::now(false));
        }
        result
    }

    /// Swaps the presence source without touching the tick clock, the
    /// accumulated unfocused time or the alert counters.
    pub async fn replace_presence_source(
        &self,
        source: &dyn FrameSource,
        detector: Arc<dyn PresenceDetector>,
    ) -> FocusResult<()> {
        self.detach_presence_source().await?;
        self.attach_presence_source(source, detector).await
    }

    /// Stops capturing and releases the camera. Presence reads as absent
    /// until a new source or host sample arrives.
    pub async fn detach_presence_source(&self) -> FocusResult<()> {
        self.ensure_running().await?;
        self.stop_sensing().await;
        self.debouncer.observe(PresenceSample::now(false));
        Ok(())
    }

    /// Ends the session, computes its record and hands it to the sink.
    pub async fn end_session(&self) -> FocusResult<EndedSession> {
        let alerts;
        let session = {
            let mut state = self.state.lock().await;
            if state.status != TrackerStatus::Running {
                return Err(FocusError::SessionNotRunning);
            }
            let elapsed = state.elapsed();
            state.final_elapsed = Some(elapsed);
            state.status = TrackerStatus::Ended;
            alerts = std::mem::take(&mut state.alerts);

            let started_at = state.started_at.unwrap_or_else(Utc::now);
            let ended_at = started_at
                + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());

            Session::finalize(
                started_at,
                ended_at,
                state.unfocused.as_secs(),
                state.monitor.attention().alerts_fired,
            )
        };

        self.release_alerts(alerts).await;
        self.teardown().await;

        let persistence = match self.sink.persist(&session).await {
            Ok(id) => {
                session_log!(info, self.session_id, "session saved as {id}");
                Persistence::Saved(id)
            }
            Err(err) => {
                session_log!(error, self.session_id, "session was not saved: {err}");
                Persistence::Failed(err)
            }
        };

        let ended = EndedSession {
            session,
            persistence,
        };
        let _ = self.events.send(MonitorEvent::Ended {
            session: ended.session.clone(),
            saved: ended.is_saved(),
        });
        session_log!(
            info,
            self.session_id,
            "session ended: {}s total, {}s unfocused, {} alerts",
            ended.session.total_session_time,
            ended.session.total_time_unfocused,
            ended.session.number_of_alerts
        );
        Ok(ended)
    }

    /// Ends the session without recording anything.
    pub async fn discard(&self) -> FocusResult<()> {
        let alerts = {
            let mut state = self.state.lock().await;
            if state.status != TrackerStatus::Running {
                return Err(FocusError::SessionNotRunning);
            }
            let elapsed = state.elapsed();
            state.final_elapsed = Some(elapsed);
            state.status = TrackerStatus::Discarded;
            std::mem::take(&mut state.alerts)
        };

        self.release_alerts(alerts).await;
        self.teardown().await;

        session_log!(info, self.session_id, "session discarded");
        let _ = self.events.send(MonitorEvent::Discarded {
            session_id: self.session_id.clone(),
        });
        Ok(())
    }

    async fn ensure_running(&self) -> FocusResult<()> {
        if self.state.lock().await.status == TrackerStatus::Running {
            Ok(())
        } else {
            Err(FocusError::SessionNotRunning)
        }
    }

    /// Sinks may join threads on release, so this runs on the blocking pool
    /// and never under the state lock.
    async fn release_alerts(&self, mut alerts: AlertDispatcher) {
        if let Err(err) = tokio::task::spawn_blocking(move || alerts.release()).await {
            session_log!(error, self.session_id, "failed to release alert sinks: {err}");
        }
    }

    async fn teardown(&self) {
        self.cancel_ticker().await;
        self.stop_sensing().await;
    }

    async fn stop_sensing(&self) {
        if let Err(err) = self.sensing.lock().await.stop_sensing().await {
            session_log!(error, self.session_id, "failed to stop sensing: {err:#}");
        }
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let state = self.state.clone();
        let reader: PresenceReader = self.debouncer.reader();
        let events = self.events.clone();
        let session_id = self.session_id.clone();
        let tick_interval = self.config.tick_interval;
        let heartbeat_every = u64::from(self.config.heartbeat_every_ticks.max(1));

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + tick_interval, tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks: u64 = 0;

            loop {
                interval.tick().await;
                let present = reader.is_present();

                let (alert, heartbeat) = {
                    let mut guard = state.lock().await;
                    if guard.status != TrackerStatus::Running {
                        break;
                    }
                    let alert = guard.evaluate_tick(present, &session_id, tick_interval);
                    ticks = ticks.wrapping_add(1);
                    let heartbeat = (ticks % heartbeat_every == 0)
                        .then(|| guard.snapshot(&session_id, present));
                    (alert, heartbeat)
                };

                if let Some(alert) = alert {
                    let _ = events.send(MonitorEvent::Alert(alert));
                }
                if let Some(snapshot) = heartbeat {
                    session_log!(
                        debug,
                        session_id,
                        "heartbeat: {}s elapsed, {}s unfocused",
                        snapshot.elapsed_secs,
                        snapshot.unfocused_secs
                    );
                    let _ = events.send(MonitorEvent::Heartbeat(snapshot));
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }
}

impl Drop for SessionTracker {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.get_mut().take() {
            handle.abort();
        }
        self.sensing.get_mut().cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::monitor::{alerts::testing::RecordingSink, AlertSink, AlertTier, RearmPolicy};

    #[derive(Default)]
    struct MemorySink {
        saved: StdMutex<Vec<Session>>,
        fail: bool,
    }

    #[async_trait]
    impl SessionSink for MemorySink {
        async fn persist(&self, session: &Session) -> FocusResult<SessionId> {
            if self.fail {
                return Err(FocusError::storage(anyhow::anyhow!("backend offline")));
            }
            self.saved.lock().unwrap().push(session.clone());
            Ok(SessionId::generate())
        }
    }

    fn config() -> TrackerConfig {
        TrackerConfig {
            thresholds: AlertThresholds::new(5, 5, RearmPolicy::AtEscalation).unwrap(),
            tick_interval: Duration::from_secs(1),
            capture_interval: Duration::from_millis(500),
            heartbeat_every_ticks: 10,
        }
    }

    fn tracker(sink: Arc<MemorySink>, alerts: RecordingSink) -> SessionTracker {
        SessionTracker::new(config(), sink, AlertDispatcher::new().with_sink(alerts))
    }

    #[tokio::test(start_paused = true)]
    async fn absent_session_fires_alerts_and_accumulates_unfocused_time() {
        let sink = Arc::new(MemorySink::default());
        let alerts = RecordingSink::default();
        let tracker = tracker(sink.clone(), alerts.clone());

        tracker.start().await.unwrap();
        time::sleep(Duration::from_millis(12_500)).await;

        let snapshot = tracker.snapshot().await;
        assert_eq!(snapshot.unfocused_secs, 12);
        assert_eq!(snapshot.attention.alerts_fired, 2);
        assert_eq!(snapshot.attention.consecutive_absent_ticks, 2);

        tracker.presence().observe(PresenceSample::now(true));
        time::sleep(Duration::from_secs(8)).await;

        let ended = tracker.end_session().await.unwrap();
        assert!(ended.is_saved());
        let session = &ended.session;
        assert_eq!(session.total_session_time, 20);
        assert_eq!(session.total_time_unfocused, 12);
        assert_eq!(session.total_time_focused, 8);
        assert_eq!(session.number_of_alerts, 2);
        assert!((session.focus_percent - 40.0).abs() < 1e-6);

        let fired: Vec<AlertTier> = alerts.alerts.lock().unwrap().iter().map(|a| a.tier).collect();
        assert_eq!(fired, vec![AlertTier::Warning, AlertTier::Escalation]);
        assert_eq!(*alerts.releases.lock().unwrap(), 1);
        assert_eq!(sink.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn present_session_is_fully_focused() {
        let sink = Arc::new(MemorySink::default());
        let tracker = tracker(sink.clone(), RecordingSink::default());
        tracker.presence().observe(PresenceSample::now(true));

        tracker.start().await.unwrap();
        time::sleep(Duration::from_millis(30_200)).await;
        let ended = tracker.end_session().await.unwrap();

        assert_eq!(ended.session.total_session_time, 30);
        assert_eq!(ended.session.total_time_unfocused, 0);
        assert_eq!(ended.session.number_of_alerts, 0);
        assert!((ended.session.focus_percent - 100.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_end_yields_zero_length_session() {
        let sink = Arc::new(MemorySink::default());
        let tracker = tracker(sink, RecordingSink::default());

        tracker.start().await.unwrap();
        let ended = tracker.end_session().await.unwrap();

        assert_eq!(ended.session.total_session_time, 0);
        assert_eq!(ended.session.number_of_alerts, 0);
        assert_eq!(ended.session.focus_percent, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_failure_still_returns_the_record() {
        let sink = Arc::new(MemorySink {
            fail: true,
            ..MemorySink::default()
        });
        let tracker = tracker(sink, RecordingSink::default());

        tracker.start().await.unwrap();
        time::sleep(Duration::from_millis(3_100)).await;
        let ended = tracker.end_session().await.unwrap();

        assert!(!ended.is_saved());
        assert!(matches!(
            ended.persistence,
            Persistence::Failed(FocusError::StorageUnavailable(_))
        ));
        assert_eq!(ended.session.total_session_time, 3);
        assert_eq!(tracker.status().await, TrackerStatus::Ended);
    }

    #[tokio::test(start_paused = true)]
    async fn end_and_discard_are_mutually_exclusive() {
        let sink = Arc::new(MemorySink::default());
        let tracker = tracker(sink.clone(), RecordingSink::default());

        assert!(matches!(
            tracker.end_session().await,
            Err(FocusError::SessionNotRunning)
        ));

        tracker.start().await.unwrap();
        assert!(matches!(
            tracker.start().await,
            Err(FocusError::SessionAlreadyStarted)
        ));

        tracker.discard().await.unwrap();
        assert!(matches!(
            tracker.end_session().await,
            Err(FocusError::SessionNotRunning)
        ));
        assert!(matches!(
            tracker.discard().await,
            Err(FocusError::SessionNotRunning)
        ));
        assert!(matches!(
            tracker.start().await,
            Err(FocusError::SessionAlreadyStarted)
        ));
        assert!(sink.saved.lock().unwrap().is_empty());
        assert_eq!(tracker.status().await, TrackerStatus::Discarded);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_stops_after_discard() {
        let alerts = RecordingSink::default();
        let tracker = tracker(Arc::new(MemorySink::default()), alerts.clone());

        tracker.start().await.unwrap();
        time::sleep(Duration::from_millis(2_500)).await;
        tracker.discard().await.unwrap();
        time::sleep(Duration::from_secs(30)).await;

        let snapshot = tracker.snapshot().await;
        assert_eq!(snapshot.unfocused_secs, 2);
        assert_eq!(snapshot.elapsed_secs, 2);
        assert!(alerts.alerts.lock().unwrap().is_empty());
        assert_eq!(*alerts.releases.lock().unwrap(), 1);
    }

    struct ThreadRecordingSink {
        released_on: Arc<StdMutex<Option<std::thread::ThreadId>>>,
    }

    impl AlertSink for ThreadRecordingSink {
        fn dispatch(&mut self, _alert: &AlertEvent) {}

        fn release(&mut self) {
            *self.released_on.lock().unwrap() = Some(std::thread::current().id());
        }
    }

    #[tokio::test]
    async fn alert_sinks_are_released_off_the_async_thread() {
        for end in [true, false] {
            let released_on = Arc::new(StdMutex::new(None));
            let alerts = AlertDispatcher::new().with_sink(ThreadRecordingSink {
                released_on: released_on.clone(),
            });
            let tracker = SessionTracker::new(config(), Arc::new(MemorySink::default()), alerts);

            tracker.start().await.unwrap();
            if end {
                tracker.end_session().await.unwrap();
            } else {
                tracker.discard().await.unwrap();
            }

            let thread = (*released_on.lock().unwrap()).expect("sink was released");
            assert_ne!(thread, std::thread::current().id());
            // The state lock is free again once teardown returns.
            assert_eq!(
                tracker.status().await,
                if end { TrackerStatus::Ended } else { TrackerStatus::Discarded }
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn alerts_are_broadcast_to_subscribers() {
        let tracker = tracker(Arc::new(MemorySink::default()), RecordingSink::default());
        let mut events = tracker.subscribe();

        tracker.start().await.unwrap();
        time::sleep(Duration::from_millis(5_500)).await;
        tracker.discard().await.unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(matches!(seen.first(), Some(MonitorEvent::Started { .. })));
        assert!(seen.iter().any(|event| matches!(
            event,
            MonitorEvent::Alert(AlertEvent { tier: AlertTier::Warning, alert_number: 1, absent_secs: 5, .. })
        )));
        assert!(matches!(seen.last(), Some(MonitorEvent::Discarded { .. })));
    }
}
