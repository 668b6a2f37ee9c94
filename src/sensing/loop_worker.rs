use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{models::PresenceSample, monitor::SignalDebouncer};

use super::{camera::CameraHandle, detector::PresenceDetector};

// Set to false to silence per-capture logging in this module
const ENABLE_LOGS: bool = true;

use crate::session_log;

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) type SharedCamera = Arc<Mutex<Box<dyn CameraHandle>>>;

/// Captures a frame every `interval`, runs detection off the async threads
/// and writes the result into the presence slot. Capture failures and
/// timeouts are written as absence. The camera is released when the loop
/// exits.
pub async fn sensing_loop(
    session_id: String,
    camera: SharedCamera,
    detector: Arc<dyn PresenceDetector>,
    debouncer: SignalDebouncer,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let timestamp = Utc::now();
                let started = Instant::now();
                let fut = perform_capture(camera.clone(), detector.clone());

                let detected = match tokio::time::timeout(CAPTURE_TIMEOUT, fut).await {
                    Ok(Ok(Some(detected))) => detected,
                    Ok(Ok(None)) => false,
                    Ok(Err(err)) => {
                        session_log!(warn, session_id, "presence capture failed: {err:#}");
                        false
                    }
                    Err(_) => {
                        session_log!(warn, session_id, "presence capture timed out (> {:?})", CAPTURE_TIMEOUT);
                        false
                    }
                };

                if !debouncer.observe(PresenceSample::new(detected, timestamp)) {
                    session_log!(debug, session_id, "discarded late presence sample");
                }
                session_log!(trace, session_id, "presence={} in {}ms", detected, started.elapsed().as_millis());
            }
            _ = cancel_token.cancelled() => {
                session_log!(info, session_id, "sensing loop shutting down");
                break;
            }
        }
    }

    if let Err(err) = release_camera(camera).await {
        session_log!(error, session_id, "failed to release camera: {err:#}");
    }
}

/// `Ok(None)` when the device has no frame yet.
async fn perform_capture(
    camera: SharedCamera,
    detector: Arc<dyn PresenceDetector>,
) -> Result<Option<bool>> {
    tokio::task::spawn_blocking(move || -> Result<Option<bool>> {
        let frame = {
            let mut handle = camera
                .lock()
                .map_err(|_| anyhow!("camera handle poisoned"))?;
            handle.capture()?
        };
        Ok(frame.map(|frame| detector.detect(&frame)))
    })
    .await
    .context("presence detection worker join failed")?
}

async fn release_camera(camera: SharedCamera) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        let mut handle = match camera.lock() {
            Ok(handle) => handle,
            Err(poisoned) => poisoned.into_inner(),
        };
        handle.release();
    })
    .await
    .context("camera release worker join failed")
}
