//! Call-log repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;

use super::DbPool;
use crate::calllog::{CallLogWriter, CallRecord};
use crate::{Error, Result};

/// A stored call-log row
#[derive(Debug, Clone, Serialize)]
pub struct LoggedCall {
    pub id: i64,
    pub call_id: String,
    pub endpoint: String,
    pub method: String,
    pub user_id: Option<String>,
    pub outcome: String,
    pub exception: Option<String>,
    pub stack_trace: Option<String>,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
}

/// Call-log repository backed by `SQLite`
#[derive(Clone)]
pub struct CallLogRepo {
    pool: DbPool,
}

impl CallLogRepo {
    /// Create a new call-log repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a call record and return its row id
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn insert(
        &self,
        record: &CallRecord,
        user_id: Option<&str>,
        exception: Option<&str>,
        stack_trace: Option<&str>,
    ) -> Result<i64> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO call_log
                (call_id, endpoint, method, user_id, outcome, exception, stack_trace, started_at, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.call_id.to_string(),
                record.endpoint,
                record.method,
                user_id,
                record.outcome,
                exception,
                stack_trace,
                record.started_at.to_rfc3339(),
                i64::try_from(record.duration_ms).unwrap_or(i64::MAX),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Get a call-log row by id
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn get(&self, id: i64) -> Result<Option<LoggedCall>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn.prepare(
            "SELECT id, call_id, endpoint, method, user_id, outcome, exception, stack_trace,
                    duration_ms, started_at
             FROM call_log WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map([id], row_to_call)?;
        let call = rows.next().transpose()?;
        Ok(call)
    }

    /// List the most recent calls, newest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list_recent(&self, limit: usize) -> Result<Vec<LoggedCall>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn.prepare(
            "SELECT id, call_id, endpoint, method, user_id, outcome, exception, stack_trace,
                    duration_ms, started_at
             FROM call_log ORDER BY id DESC LIMIT ?1",
        )?;

        let calls = stmt
            .query_map([i64::try_from(limit).unwrap_or(i64::MAX)], row_to_call)?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(calls)
    }

    /// Count stored calls
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn count(&self) -> Result<u64> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM call_log", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn insert_blocking(
        &self,
        record: &CallRecord,
        user_id: Option<&str>,
        exception: Option<&str>,
        stack_trace: Option<&str>,
    ) -> Result<i64> {
        let repo = self.clone();
        let record = record.clone();
        let user_id = user_id.map(ToString::to_string);
        let exception = exception.map(ToString::to_string);
        let stack_trace = stack_trace.map(ToString::to_string);

        tokio::task::spawn_blocking(move || {
            repo.insert(
                &record,
                user_id.as_deref(),
                exception.as_deref(),
                stack_trace.as_deref(),
            )
        })
        .await
        .map_err(|e| Error::Database(format!("call log task failed: {e}")))?
    }
}

#[async_trait]
impl CallLogWriter for CallLogRepo {
    async fn log_success(&self, record: &CallRecord, user_id: Option<&str>) -> Result<i64> {
        self.insert_blocking(record, user_id, None, None).await
    }

    async fn log_failure(
        &self,
        record: &CallRecord,
        exception: &str,
        stack_trace: &str,
    ) -> Result<i64> {
        self.insert_blocking(record, None, Some(exception), Some(stack_trace))
            .await
    }
}

fn row_to_call(row: &rusqlite::Row<'_>) -> rusqlite::Result<LoggedCall> {
    let duration_ms: i64 = row.get(8)?;
    Ok(LoggedCall {
        id: row.get(0)?,
        call_id: row.get(1)?,
        endpoint: row.get(2)?,
        method: row.get(3)?,
        user_id: row.get(4)?,
        outcome: row.get(5)?,
        exception: row.get(6)?,
        stack_trace: row.get(7)?,
        duration_ms: u64::try_from(duration_ms).unwrap_or(0),
        started_at: parse_datetime(&row.get::<_, String>(9)?),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
