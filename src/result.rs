//! Outcome of a dispatched call

use std::fmt;

use serde_json::Value;

/// The single outcome produced for every dispatched call
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    /// Handler completed and returned a value
    Success(Value),

    /// Malformed call: bad endpoint, module or method name, or malformed envelope
    InvalidParams(String),

    /// Missing or invalid credentials, or a missing scope
    AuthenticationFailed(String),

    /// Handler fault
    InternalServerError {
        exception: String,
        stack_trace: String,
        /// Call-log record id, when the failure was logged
        log_id: Option<i64>,
    },

    /// Explicit status code
    StatusCode(u16),
}

impl CallResult {
    /// Short outcome tag used in logs and call records
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::InvalidParams(_) => "invalid_params",
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InternalServerError { .. } => "internal_server_error",
            Self::StatusCode(_) => "status_code",
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl fmt::Display for CallResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(value) => write!(f, "success: {value}"),
            Self::InvalidParams(description) => write!(f, "invalid params: {description}"),
            Self::AuthenticationFailed(description) => {
                write!(f, "authentication failed: {description}")
            }
            Self::InternalServerError {
                exception,
                stack_trace,
                log_id,
            } => {
                write!(f, "internal server error: {exception}")?;
                if let Some(id) = log_id {
                    write!(f, " (log id {id})")?;
                }
                if !stack_trace.is_empty() {
                    write!(f, "\n{stack_trace}")?;
                }
                Ok(())
            }
            Self::StatusCode(code) => write!(f, "status code {code}"),
        }
    }
}
