use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Context;
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{FocusError, FocusResult},
    monitor::SignalDebouncer,
};

use super::{
    camera::FrameSource,
    detector::PresenceDetector,
    loop_worker::{sensing_loop, SharedCamera},
};

/// Runs at most one detection loop. The loop owns the camera handle.
#[derive(Default)]
pub struct SensingController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    source_name: Option<String>,
}

impl SensingController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    pub fn start_sensing(
        &mut self,
        session_id: String,
        source: &dyn FrameSource,
        detector: Arc<dyn PresenceDetector>,
        debouncer: SignalDebouncer,
        interval: Duration,
    ) -> FocusResult<()> {
        if self.handle.is_some() {
            return Err(FocusError::DeviceUnavailable(
                "a presence source is already attached".into(),
            ));
        }

        let camera: SharedCamera = Arc::new(Mutex::new(source.acquire()?));
        info!("[session {session_id}] sensing from {}", source.name());

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sensing_loop(
            session_id,
            camera,
            detector,
            debouncer,
            interval,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.source_name = Some(source.name().to_string());
        Ok(())
    }

    /// Stops the loop and waits until the camera has been released.
    pub async fn stop_sensing(&mut self) -> anyhow::Result<()> {
        self.cancel();
        self.source_name = None;

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("sensing loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }

    /// Signals the loop to stop without waiting for it.
    pub fn cancel(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}

impl Drop for SensingController {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::sensing::camera::CameraHandle;

    struct CountingCamera {
        releases: Arc<AtomicU32>,
    }

    struct CountingHandle {
        releases: Arc<AtomicU32>,
        released: bool,
    }

    impl CameraHandle for CountingHandle {
        fn capture(&mut self) -> anyhow::Result<Option<RgbaImage>> {
            Ok(Some(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]))))
        }

        fn release(&mut self) {
            if !self.released {
                self.released = true;
                self.releases.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    impl FrameSource for CountingCamera {
        fn name(&self) -> &str {
            "counting"
        }

        fn acquire(&self) -> FocusResult<Box<dyn CameraHandle>> {
            Ok(Box::new(CountingHandle {
                releases: self.releases.clone(),
                released: false,
            }))
        }
    }

    struct AlwaysPresent;

    impl PresenceDetector for AlwaysPresent {
        fn detect(&self, _frame: &RgbaImage) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn stop_releases_the_camera_and_allows_restart() {
        let releases = Arc::new(AtomicU32::new(0));
        let camera = CountingCamera {
            releases: releases.clone(),
        };
        let debouncer = SignalDebouncer::new();
        let reader = debouncer.reader();
        let mut controller = SensingController::new();

        controller
            .start_sensing(
                "s1".into(),
                &camera,
                Arc::new(AlwaysPresent),
                debouncer.clone(),
                Duration::from_millis(10),
            )
            .unwrap();
        assert!(controller
            .start_sensing(
                "s1".into(),
                &camera,
                Arc::new(AlwaysPresent),
                debouncer.clone(),
                Duration::from_millis(10),
            )
            .is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.stop_sensing().await.unwrap();

        assert!(reader.is_present());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(!controller.is_active());
    }
}
