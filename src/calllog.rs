//! Call-log write contract
//!
//! Endpoints configured to log have every call recorded. Successful calls are
//! written in the background; failed calls are written before the response is
//! built so the record id can be returned to the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::Result;
use crate::context::CallContext;

/// Data recorded for a single call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRecord {
    pub call_id: Uuid,
    pub endpoint: String,
    pub method: String,
    /// Outcome tag, see [`crate::CallResult::kind`]
    pub outcome: String,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl CallRecord {
    /// Snapshot a context with the given outcome
    #[must_use]
    pub fn from_context(ctx: &CallContext, outcome: &str) -> Self {
        Self {
            call_id: ctx.call_id(),
            endpoint: ctx.endpoint().to_string(),
            method: ctx.method().to_string(),
            outcome: outcome.to_string(),
            duration_ms: ctx.elapsed_ms(),
            started_at: ctx.started_at(),
        }
    }
}

/// Log-write service
#[async_trait]
pub trait CallLogWriter: Send + Sync {
    /// Record a completed call
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be stored
    async fn log_success(&self, record: &CallRecord, user_id: Option<&str>) -> Result<i64>;

    /// Record a failed call and return the record id
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be stored
    async fn log_failure(
        &self,
        record: &CallRecord,
        exception: &str,
        stack_trace: &str,
    ) -> Result<i64>;
}
