//! Endpoints served by the `switchboard` binary
//!
//! - `health` (open): `ping`, `echo`
//! - `admin.calls` (signed in with scope `calls:read`, logged): `recent`,
//!   `get`, `count`

use std::sync::Arc;

use anyhow::Context as _;
use serde_json::{Value, json};

use crate::auth::Authenticator;
use crate::context::CallContext;
use crate::db::CallLogRepo;
use crate::dispatcher::Dispatcher;
use crate::params::{CallParams, ParamKind};
use crate::registry::{Endpoint, Method};
use crate::{Error, Result};

/// Scope needed to read the call log
pub const CALLS_READ: &str = "calls:read";

const DEFAULT_RECENT: i64 = 20;
const MAX_RECENT: i64 = 500;

/// Build the default registry around a call-log store
///
/// # Errors
///
/// Returns error if the registry is inconsistent
pub fn registry(repo: CallLogRepo, authenticator: Arc<dyn Authenticator>) -> Result<Dispatcher> {
    let admin = Dispatcher::builder().endpoint(calls_endpoint(repo.clone())?).build()?;

    Dispatcher::builder()
        .endpoint(health_endpoint()?)
        .module("admin", admin)
        .authenticator(authenticator)
        .call_log(Arc::new(repo))
        .build()
}

/// Liveness checks over RPC
///
/// # Errors
///
/// Returns error if the endpoint is inconsistent
pub fn health_endpoint() -> Result<Endpoint> {
    Endpoint::builder("health")
        .method(Method::new("ping", ping))
        .method(Method::new("echo", echo).param("message", ParamKind::Text))
        .build()
}

/// Read access to the call log
///
/// # Errors
///
/// Returns error if the endpoint is inconsistent
pub fn calls_endpoint(repo: CallLogRepo) -> Result<Endpoint> {
    let recent_repo = repo.clone();
    let get_repo = repo.clone();

    Endpoint::builder("calls")
        .requires_auth(true)
        .scope(CALLS_READ)
        .log_calls(true)
        .method(
            Method::new("recent", move |_ctx, params| recent(recent_repo.clone(), params))
                .nullable_param("limit", ParamKind::Integer),
        )
        .method(
            Method::new("get", move |_ctx, params| get(get_repo.clone(), params))
                .param("id", ParamKind::Integer),
        )
        .method(Method::new("count", move |_ctx, _params| count(repo.clone())))
        .build()
}

async fn ping(_ctx: Arc<CallContext>, _params: CallParams) -> anyhow::Result<Value> {
    Ok(json!("pong"))
}

async fn echo(ctx: Arc<CallContext>, params: CallParams) -> anyhow::Result<Value> {
    Ok(json!({
        "message": params.text("message"),
        "callId": ctx.call_id().to_string(),
        "userAgent": ctx.peer().user_agent,
    }))
}

async fn recent(repo: CallLogRepo, params: CallParams) -> anyhow::Result<Value> {
    let limit = params
        .integer("limit")
        .unwrap_or(DEFAULT_RECENT)
        .clamp(1, MAX_RECENT);
    let limit = usize::try_from(limit).unwrap_or(1);

    let calls = tokio::task::spawn_blocking(move || repo.list_recent(limit))
        .await
        .context("call log query task failed")??;
    Ok(serde_json::to_value(calls)?)
}

async fn get(repo: CallLogRepo, params: CallParams) -> anyhow::Result<Value> {
    let Some(id) = params.integer("id") else {
        return Err(Error::Status(400).into());
    };

    let call = tokio::task::spawn_blocking(move || repo.get(id))
        .await
        .context("call log query task failed")??;
    match call {
        Some(call) => Ok(serde_json::to_value(call)?),
        None => Err(Error::Status(404).into()),
    }
}

async fn count(repo: CallLogRepo) -> anyhow::Result<Value> {
    let count = tokio::task::spawn_blocking(move || repo.count())
        .await
        .context("call log query task failed")??;
    Ok(json!({ "count": count }))
}
