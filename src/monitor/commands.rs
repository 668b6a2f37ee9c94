//! `focusbuddy watch`: one monitoring session driven from the terminal.

use std::{io::BufRead, path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    aggregation::SessionAggregationService,
    audio::ChimeAlertSink,
    cli::WatchArgs,
    db::Database,
    identity::UserId,
    models::PresenceSample,
    sensing::{ContrastPresenceDetector, ImageDirCamera, PresenceDetector},
    settings::MonitorSettings,
    DATABASE_FILE,
};

use super::{
    AlertDispatcher, AlertTier, LocalSessionSink, LogAlertSink, MonitorEvent, Persistence,
    RemoteSessionSink, SessionSink, SessionTracker, SignalDebouncer, TrackerConfig,
};

pub async fn run_watch(args: &WatchArgs, mut monitor: MonitorSettings, data_dir: &Path) -> Result<()> {
    if let Some(t1) = args.t1 {
        monitor.warn_after_ticks = t1;
    }
    if let Some(t2) = args.t2 {
        monitor.escalate_after_ticks = t2;
    }
    monitor.validate().context("Invalid monitor settings")?;

    let sink: Arc<dyn SessionSink> = match (&args.server, &args.token) {
        (Some(server), Some(token)) => {
            info!("Sessions will be uploaded to {server}");
            Arc::new(RemoteSessionSink::new(server, token.clone()))
        }
        _ => {
            let db = Database::new(data_dir.join(DATABASE_FILE))?;
            Arc::new(LocalSessionSink::new(
                SessionAggregationService::new(db),
                UserId::new(args.user.as_str())?,
            ))
        }
    };

    let mut alerts = AlertDispatcher::new().with_sink(LogAlertSink);
    if monitor.chime_enabled {
        match ChimeAlertSink::new() {
            Ok(chime) => alerts.push(Box::new(chime)),
            Err(err) => warn!("Alert chime disabled: {err:#}"),
        }
    }

    let tracker = SessionTracker::new(TrackerConfig::from_settings(&monitor), sink, alerts);
    let printer = tokio::spawn(print_events(tracker.subscribe()));
    tracker.start().await?;

    if let Some(dir) = &args.frames {
        let detector: Arc<dyn PresenceDetector> = Arc::new(
            args.min_contrast
                .map(ContrastPresenceDetector::new)
                .unwrap_or_default(),
        );
        if let Err(err) = tracker
            .attach_presence_source(&ImageDirCamera::new(dir), detector)
            .await
        {
            warn!("{err}; the session will count as absent");
        }
    } else if args.stdin_presence {
        spawn_stdin_reader(tracker.presence())?;
    } else {
        warn!("No presence source (--frames or --stdin-presence); the session will count as absent");
    }

    println!("Session {} running. Press Ctrl-C to stop.", tracker.session_id());
    wait_for_stop(args.duration).await;

    if args.discard {
        tracker.discard().await?;
        println!("Session discarded");
    } else {
        let ended = tracker.end_session().await?;
        println!("{}", serde_json::to_string_pretty(&ended.session)?);
        match &ended.persistence {
            Persistence::Saved(id) => println!("Saved as {id}"),
            Persistence::Failed(err) => eprintln!("Session was not saved: {err}"),
        }
    }

    printer.abort();
    Ok(())
}

async fn wait_for_stop(duration: Option<u64>) {
    match duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            }
        }
        None => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

async fn print_events(mut events: broadcast::Receiver<MonitorEvent>) {
    loop {
        match events.recv().await {
            Ok(MonitorEvent::Alert(alert)) => {
                let label = match alert.tier {
                    AlertTier::Warning => "warning",
                    AlertTier::Escalation => "ESCALATION",
                };
                println!("[{label}] {}", alert.message);
            }
            Ok(MonitorEvent::Heartbeat(snapshot)) => println!(
                "{}s elapsed, {}s unfocused, {} alert(s), {}",
                snapshot.elapsed_secs,
                snapshot.unfocused_secs,
                snapshot.attention.alerts_fired,
                if snapshot.present { "present" } else { "away" }
            ),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!("Event printer skipped {skipped} events"),
            Err(RecvError::Closed) => break,
        }
    }
}

// A plain thread: a pending stdin read would otherwise hold up runtime shutdown.
fn spawn_stdin_reader(debouncer: SignalDebouncer) -> Result<()> {
    std::thread::Builder::new()
        .name("stdin-presence".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match parse_presence(&line) {
                    Some(present) => {
                        debouncer.observe(PresenceSample::now(present));
                    }
                    None => warn!("Ignoring presence line {line:?}"),
                }
            }
        })
        .context("Failed to spawn stdin presence reader")?;
    Ok(())
}

fn parse_presence(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "1" | "p" | "present" | "yes" => Some(true),
        "0" | "a" | "absent" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_lines_are_parsed_leniently() {
        assert_eq!(parse_presence("1"), Some(true));
        assert_eq!(parse_presence(" Present \n"), Some(true));
        assert_eq!(parse_presence("absent"), Some(false));
        assert_eq!(parse_presence("0"), Some(false));
        assert_eq!(parse_presence("maybe"), None);
        assert_eq!(parse_presence(""), None);
    }
}
