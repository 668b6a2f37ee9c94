use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, Row};

use crate::db::{
    helpers::{format_datetime, parse_datetime, require, to_i64, to_u32, to_u64},
    models::{LegacySession, Session, SessionId, SessionRecord, StoredSession},
    Database,
};

const SESSION_COLUMNS: &str = "id, user_id, start_time, end_time, attention_spans, schema_version,
     total_session_time, total_time_unfocused, total_time_focused, number_of_alerts, focus_percent";

const CURRENT_RECORD_VERSION: i64 = 2;

fn row_to_stored_session(row: &Row) -> Result<StoredSession> {
    let id: String = row.get("id")?;
    let user_id: Option<String> = row.get("user_id")?;
    let start_time: String = row.get("start_time")?;
    let end_time: String = row.get("end_time")?;
    let schema_version: i64 = row.get("schema_version")?;

    let start_time = parse_datetime(&start_time, "start_time")?;
    let end_time = parse_datetime(&end_time, "end_time")?;

    let record = match schema_version {
        1 => {
            let spans: String = row.get("attention_spans")?;
            let attention_spans: Vec<f64> = serde_json::from_str(&spans)
                .with_context(|| format!("invalid attention_spans on session {id}"))?;
            SessionRecord::Legacy(LegacySession {
                user_id,
                start_time,
                end_time,
                attention_spans,
            })
        }
        CURRENT_RECORD_VERSION => {
            let total_session_time: Option<i64> = row.get("total_session_time")?;
            let total_time_unfocused: Option<i64> = row.get("total_time_unfocused")?;
            let total_time_focused: Option<i64> = row.get("total_time_focused")?;
            let number_of_alerts: Option<i64> = row.get("number_of_alerts")?;
            let focus_percent: Option<f64> = row.get("focus_percent")?;

            SessionRecord::Current(Session {
                user_id,
                start_time,
                end_time,
                total_session_time: to_u64(
                    require(total_session_time, "total_session_time")?,
                    "total_session_time",
                )?,
                total_time_unfocused: to_u64(
                    require(total_time_unfocused, "total_time_unfocused")?,
                    "total_time_unfocused",
                )?,
                total_time_focused: to_u64(
                    require(total_time_focused, "total_time_focused")?,
                    "total_time_focused",
                )?,
                number_of_alerts: to_u32(
                    require(number_of_alerts, "number_of_alerts")?,
                    "number_of_alerts",
                )?,
                focus_percent: require(focus_percent, "focus_percent")?,
            })
        }
        other => bail!("session {id} has unknown schema_version {other}"),
    };

    Ok(StoredSession {
        id: SessionId(id),
        record,
    })
}

fn query_sessions(conn: &Connection, sql: &str, user_id: &str) -> Result<Vec<StoredSession>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params![user_id])?;
    let mut sessions = Vec::new();
    while let Some(row) = rows.next()? {
        sessions.push(row_to_stored_session(row)?);
    }
    Ok(sessions)
}

impl Database {
    pub async fn insert_session(&self, id: &SessionId, session: &Session) -> Result<()> {
        let id = id.clone();
        let record = session.clone();
        self.execute(move |conn| {
            let user_id = record
                .user_id
                .as_deref()
                .context("refusing to store a session without user_id")?;
            conn.execute(
                "INSERT INTO sessions (id, user_id, start_time, end_time, attention_spans, schema_version,
                     total_session_time, total_time_unfocused, total_time_focused, number_of_alerts, focus_percent)
                 VALUES (?1, ?2, ?3, ?4, '[]', ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id.as_str(),
                    user_id,
                    format_datetime(&record.start_time),
                    format_datetime(&record.end_time),
                    CURRENT_RECORD_VERSION,
                    to_i64(record.total_session_time)?,
                    to_i64(record.total_time_unfocused)?,
                    to_i64(record.total_time_focused)?,
                    i64::from(record.number_of_alerts),
                    record.focus_percent,
                ],
            )
            .with_context(|| "failed to insert session")?;
            Ok(())
        })
        .await
    }

    /// All sessions of one user, oldest first. Ties on `start_time` fall back
    /// to id order so repeated reads are identical.
    pub async fn list_sessions_for_user(&self, user_id: &str) -> Result<Vec<StoredSession>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {SESSION_COLUMNS}
                 FROM sessions
                 WHERE user_id = ?1
                 ORDER BY start_time ASC, id ASC"
            );
            let mut sessions = query_sessions(conn, &sql, &user_id)?;
            // Text order only matches time order for our own fixed-width format.
            sessions.sort_by_key(|stored| stored.record.start_time());
            Ok(sessions)
        })
        .await
    }

    /// The session with the greatest start time, decided the same way as
    /// the last entry of `list_sessions_for_user`. Legacy rows may carry
    /// offsets or precisions that do not sort as text, so the pick happens
    /// on parsed times.
    pub async fn latest_session_for_user(&self, user_id: &str) -> Result<Option<StoredSession>> {
        Ok(self.list_sessions_for_user(user_id).await?.pop())
    }

    /// Deletes every session of one user in a single transaction.
    pub async fn delete_sessions_for_user(&self, user_id: &str) -> Result<usize> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])?;
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    pub async fn count_sessions_for_user(&self, user_id: &str) -> Result<usize> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sessions WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
        .await
    }
}
