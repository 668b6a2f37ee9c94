use crate::db::models::{focus_percent, StoredSession, UserSessionSummary};

/// Folds a user's sessions into aggregate statistics.
///
/// `sessions` must already be in ascending `startTime` order; summation
/// follows that order. Records that cannot be migrated to the current shape
/// are listed and contribute zero to every total, but still count as
/// sessions for `averageAlerts`.
pub fn summarize(sessions: Vec<StoredSession>) -> UserSessionSummary {
    let mut total_session_time: u64 = 0;
    let mut total_focus_time: u64 = 0;
    let mut total_alerts: u64 = 0;

    for stored in &sessions {
        let Some(session) = stored.record.migrate() else {
            continue;
        };
        total_session_time += session.total_session_time;
        total_focus_time += session.total_time_focused;
        total_alerts += u64::from(session.number_of_alerts);
    }

    let average_alerts = if sessions.is_empty() {
        0.0
    } else {
        total_alerts as f64 / sessions.len() as f64
    };

    UserSessionSummary {
        sessions,
        total_session_time,
        total_focus_time,
        total_alerts,
        average_alerts,
        average_focus_percentage: focus_percent(total_focus_time, total_session_time),
    }
}
