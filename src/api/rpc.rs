//! RPC calls over HTTP
//!
//! `POST /rpc/{endpoint}` with a JSON object body. The `method` key names the
//! method; every other key is a raw parameter. JSON strings are passed on as
//! text, anything else as a structured value.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Json,
    body::Bytes,
    extract::{
        ConnectInfo, FromRequest, Path, Request, State,
        rejection::{BytesRejection, FailedToBufferBody},
    },
    http::{HeaderValue, StatusCode, header::USER_AGENT, request::Parts},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};

use super::ApiState;
use super::auth::extract_bearer;
use crate::context::{CallEnvelope, PeerInfo, RequestHandle};
use crate::params::RawParam;
use crate::result::CallResult;
use crate::{Error, Result};

/// Transport handle for one HTTP request
#[derive(Debug)]
pub struct HttpRequestHandle {
    remote_addr: Option<SocketAddr>,
    user_agent: Option<HeaderValue>,
}

impl HttpRequestHandle {
    /// Capture the parts of a request a call may inspect
    #[must_use]
    pub fn from_parts(parts: &Parts) -> Self {
        Self {
            remote_addr: parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0),
            user_agent: parts.headers.get(USER_AGENT).cloned(),
        }
    }
}

#[async_trait]
impl RequestHandle for HttpRequestHandle {
    async fn describe(&self) -> Result<PeerInfo> {
        let user_agent = self
            .user_agent
            .as_ref()
            .map(|value| {
                value
                    .to_str()
                    .map(ToString::to_string)
                    .map_err(|_| Error::Transport("user-agent header is not valid text".to_string()))
            })
            .transpose()?;

        Ok(PeerInfo {
            remote_addr: self.remote_addr.map(|addr| addr.to_string()),
            user_agent,
        })
    }

    fn release(&self) {
        tracing::trace!(remote_addr = ?self.remote_addr, "request released");
    }
}

/// JSON error body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_id: Option<i64>,
}

fn error_response(
    status: StatusCode,
    error: &'static str,
    message: String,
    log_id: Option<i64>,
) -> Response {
    (
        status,
        Json(ErrorBody {
            error,
            message,
            log_id,
        }),
    )
        .into_response()
}

/// Translate a call outcome into an HTTP response
///
/// Authentication failures answer `401` unless the caller is signed in, so
/// missing, unknown and expired tokens all ask for credentials. A signed-in
/// caller lacking access gets `403`.
pub fn call_response(result: &CallResult, signed_in: bool) -> Response {
    match result {
        CallResult::Success(value) => (StatusCode::OK, Json(json!({ "result": value }))).into_response(),
        CallResult::InvalidParams(message) => {
            error_response(StatusCode::BAD_REQUEST, result.kind(), message.clone(), None)
        }
        CallResult::AuthenticationFailed(message) => {
            let status = if signed_in {
                StatusCode::FORBIDDEN
            } else {
                StatusCode::UNAUTHORIZED
            };
            error_response(status, result.kind(), message.clone(), None)
        }
        CallResult::InternalServerError { log_id, .. } => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            result.kind(),
            "internal server error".to_string(),
            *log_id,
        ),
        CallResult::StatusCode(code) => {
            let status = StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let message = status
                .canonical_reason()
                .map_or_else(|| format!("status {code}"), ToString::to_string);
            error_response(status, result.kind(), message, None)
        }
    }
}

/// Parse a request body into a call envelope
fn parse_call(endpoint: String, body: &[u8]) -> std::result::Result<CallEnvelope, String> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| format!("request body is not valid JSON: {e}"))?;
    let Value::Object(mut fields) = value else {
        return Err("request body must be a JSON object".to_string());
    };

    let method = match fields.remove("method") {
        Some(Value::String(method)) if !method.is_empty() => method,
        Some(_) => return Err("\"method\" must be a non-empty string".to_string()),
        None => return Err("missing \"method\"".to_string()),
    };

    let mut envelope = CallEnvelope::new(endpoint, method);
    for (name, value) in fields {
        let raw = match value {
            Value::String(text) => RawParam::Text(text),
            other => RawParam::Structured(other),
        };
        envelope = envelope.param(name, raw);
    }
    Ok(envelope)
}

/// `POST /rpc/{endpoint}`
pub async fn call(
    State(state): State<Arc<ApiState>>,
    Path(endpoint): Path<String>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let token = extract_bearer(&parts.headers).map(ToString::to_string);
    let handle = Arc::new(HttpRequestHandle::from_parts(&parts));

    // Length limit comes from the route's `DefaultBodyLimit`
    let bytes = match Bytes::from_request(Request::from_parts(parts, body), &()).await {
        Ok(bytes) => bytes,
        Err(rejection) => return body_rejected(&rejection),
    };

    let mut envelope = match parse_call(endpoint, &bytes) {
        Ok(envelope) => envelope,
        Err(message) => {
            tracing::debug!(%message, "malformed request");
            return error_response(StatusCode::BAD_REQUEST, "invalid_request", message, None);
        }
    };
    if let Some(token) = &token {
        envelope = envelope.token(token.as_str());
    }

    let result = state.dispatcher.handle_call(envelope, handle).await;

    let signed_in = match (&result, &token) {
        (CallResult::AuthenticationFailed(_), Some(token)) => {
            state.dispatcher.is_signed_in(token).await
        }
        _ => false,
    };
    call_response(&result, signed_in)
}

/// `413` for bodies over the limit, `400` for any other read failure
fn body_rejected(rejection: &BytesRejection) -> Response {
    let status = match rejection {
        BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_)) => {
            StatusCode::PAYLOAD_TOO_LARGE
        }
        _ => StatusCode::BAD_REQUEST,
    };
    tracing::debug!(%status, error = %rejection, "request body rejected");
    error_response(
        status,
        "invalid_request",
        format!("request body rejected: {}", rejection.body_text()),
        None,
    )
}
