//! Audible alert chimes.
//!
//! Playback lives on a dedicated thread because the output stream is not
//! `Send`. Without the `sound` feature (or without an output device) the
//! chime falls back to the terminal bell.

use std::{
    io::Write,
    sync::mpsc::{self, Receiver, Sender},
    thread::{self, JoinHandle},
};

use anyhow::{Context, Result};
use log::{error, warn};

use crate::monitor::{AlertEvent, AlertSink, AlertTier};

enum ChimeCommand {
    Play(AlertTier),
    Shutdown,
}

pub struct ChimeAlertSink {
    tx: Option<Sender<ChimeCommand>>,
    worker: Option<JoinHandle<()>>,
}

impl ChimeAlertSink {
    pub fn new() -> Result<Self> {
        let (tx, rx) = mpsc::channel::<ChimeCommand>();

        let worker = thread::Builder::new()
            .name("alert-chime".to_string())
            .spawn(move || run_chime_thread(rx))
            .context("Failed to spawn alert chime thread")?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }
}

impl AlertSink for ChimeAlertSink {
    fn dispatch(&mut self, alert: &AlertEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(ChimeCommand::Play(alert.tier)).is_err() {
                warn!("Alert chime thread is gone; skipping chime");
            }
        }
    }

    fn release(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(ChimeCommand::Shutdown);
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Alert chime thread panicked");
            }
        }
    }
}

impl Drop for ChimeAlertSink {
    fn drop(&mut self) {
        self.release();
    }
}

/// (frequency in Hz, duration in ms) per note.
fn tones(tier: AlertTier) -> &'static [(f32, u64)] {
    match tier {
        AlertTier::Warning => &[(880.0, 180)],
        AlertTier::Escalation => &[(660.0, 180), (880.0, 180), (990.0, 260)],
    }
}

#[cfg(feature = "sound")]
fn run_chime_thread(rx: Receiver<ChimeCommand>) {
    use rodio::{
        source::{SineWave, Source},
        OutputStream, Sink,
    };
    use std::time::Duration;

    let (_stream, handle) = match OutputStream::try_default() {
        Ok(output) => output,
        Err(err) => {
            warn!("No audio output for alert chimes ({err}); using terminal bell");
            return run_bell(rx);
        }
    };
    let sink = match Sink::try_new(&handle) {
        Ok(sink) => sink,
        Err(err) => {
            warn!("Failed to create audio sink ({err}); using terminal bell");
            return run_bell(rx);
        }
    };

    while let Ok(cmd) = rx.recv() {
        match cmd {
            ChimeCommand::Play(tier) => {
                for &(freq, millis) in tones(tier) {
                    sink.append(
                        SineWave::new(freq)
                            .take_duration(Duration::from_millis(millis))
                            .amplify(0.25),
                    );
                }
            }
            ChimeCommand::Shutdown => {
                sink.stop();
                break;
            }
        }
    }
}

#[cfg(not(feature = "sound"))]
fn run_chime_thread(rx: Receiver<ChimeCommand>) {
    run_bell(rx);
}

fn run_bell(rx: Receiver<ChimeCommand>) {
    while let Ok(cmd) = rx.recv() {
        match cmd {
            ChimeCommand::Play(tier) => {
                let bells = "\x07".repeat(tones(tier).len());
                let mut stderr = std::io::stderr();
                let _ = stderr.write_all(bells.as_bytes());
                let _ = stderr.flush();
            }
            ChimeCommand::Shutdown => break,
        }
    }
}
