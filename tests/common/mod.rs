//! Shared test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use switchboard::{
    CallContext, CallLogRepo, CallLogWriter, CallParams, CallRecord, DbPool, Dispatcher, Endpoint,
    Error, Method, ParamKind, PeerInfo, RequestHandle, StaticTokenAuthenticator, TypeRegistry, db,
};

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Transport handle that counts how it is used
#[derive(Debug, Default)]
pub struct CountingHandle {
    pub describes: AtomicUsize,
    pub releases: AtomicUsize,
    pub malformed: bool,
}

impl CountingHandle {
    #[must_use]
    pub fn malformed() -> Self {
        Self {
            malformed: true,
            ..Self::default()
        }
    }

    pub fn describes(&self) -> usize {
        self.describes.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestHandle for CountingHandle {
    async fn describe(&self) -> switchboard::Result<PeerInfo> {
        self.describes.fetch_add(1, Ordering::SeqCst);
        if self.malformed {
            return Err(Error::Transport("truncated frame".to_string()));
        }
        Ok(PeerInfo {
            remote_addr: Some("127.0.0.1:40000".to_string()),
            user_agent: Some("tests".to_string()),
        })
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Call-log writer that counts writes before storing them
pub struct CountingLog {
    pub repo: CallLogRepo,
    pub successes: AtomicUsize,
    pub failures: AtomicUsize,
}

impl CountingLog {
    #[must_use]
    pub fn new(repo: CallLogRepo) -> Self {
        Self {
            repo,
            successes: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.successes.load(Ordering::SeqCst) + self.failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CallLogWriter for CountingLog {
    async fn log_success(
        &self,
        record: &CallRecord,
        user_id: Option<&str>,
    ) -> switchboard::Result<i64> {
        self.successes.fetch_add(1, Ordering::SeqCst);
        self.repo.log_success(record, user_id).await
    }

    async fn log_failure(
        &self,
        record: &CallRecord,
        exception: &str,
        stack_trace: &str,
    ) -> switchboard::Result<i64> {
        self.failures.fetch_add(1, Ordering::SeqCst);
        self.repo.log_failure(record, exception, stack_trace).await
    }
}

/// Invoice lines decoded through the billing type registry
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InvoiceLines {
    pub items: Vec<String>,
    pub currency: String,
}

/// Tokens:
/// - `admin-reader`: alice, `{admin:read}`
/// - `admin-writer`: root, `{admin:read, admin:write}`
/// - `reports-a`: bob, `{reports:a}`
/// - `reports-ab`: carol, `{reports:a, reports:b}`
#[must_use]
pub fn test_authenticator() -> StaticTokenAuthenticator {
    StaticTokenAuthenticator::new()
        .with_token("admin-reader", "alice", ["admin:read"])
        .with_token("admin-writer", "root", ["admin:read", "admin:write"])
        .with_token("reports-a", "bob", ["reports:a"])
        .with_token("reports-ab", "carol", ["reports:a", "reports:b"])
}

async fn create_invoice(_ctx: Arc<CallContext>, params: CallParams) -> anyhow::Result<Value> {
    let customer = params
        .text("customer")
        .ok_or_else(|| anyhow!("customer is required"))?;
    let amount = params.float("amount").unwrap_or_default();
    let lines = params.object::<InvoiceLines>("lines");

    Ok(json!({
        "invoice": format!("INV-{customer}"),
        "amount": amount,
        "due": params.timestamp("due").map(|due| due.to_rfc3339()),
        "items": lines.map(|l| l.items.len()),
        "currency": lines.map(|l| l.currency.clone()),
    }))
}

async fn delete_record(_ctx: Arc<CallContext>, params: CallParams) -> anyhow::Result<Value> {
    let id = params.integer("id").unwrap_or_default();
    Err(anyhow!("storage offline").context(format!("delete {id} failed")))
}

async fn whoami(ctx: Arc<CallContext>, _params: CallParams) -> anyhow::Result<Value> {
    Ok(json!({ "user": ctx.user_id().await }))
}

async fn echo_params(_ctx: Arc<CallContext>, params: CallParams) -> anyhow::Result<Value> {
    Ok(json!({
        "names": params.names(),
        "text": params.text("text"),
        "integer": params.integer("integer"),
        "float": params.float("float"),
        "flag": params.bool("flag"),
        "at": params.timestamp("at").map(|at| at.to_rfc3339()),
        "nullable_is_null": params.is_null("maybe"),
    }))
}

async fn explode(_ctx: Arc<CallContext>, _params: CallParams) -> anyhow::Result<Value> {
    panic!("invariant broken");
}

async fn not_found(_ctx: Arc<CallContext>, _params: CallParams) -> anyhow::Result<Value> {
    Err(Error::Status(404).into())
}

async fn ok(_ctx: Arc<CallContext>, _params: CallParams) -> anyhow::Result<Value> {
    Ok(json!("ok"))
}

/// Billing module: `invoice.create` (no auth, logged)
#[must_use]
pub fn billing_module() -> Dispatcher {
    let mut types = TypeRegistry::new();
    types.register::<InvoiceLines>("InvoiceLines");

    let invoice = Endpoint::builder("invoice")
        .log_calls(true)
        .method(
            Method::new("create", create_invoice)
                .param("customer", ParamKind::Text)
                .param("amount", ParamKind::Float)
                .param("due", ParamKind::Timestamp)
                .param("lines", ParamKind::object("InvoiceLines")),
        )
        .build()
        .expect("invoice endpoint");

    Dispatcher::builder()
        .endpoint(invoice)
        .types(types)
        .build()
        .expect("billing module")
}

/// Endpoints:
/// - `admin`: auth, scope `admin:write`, logged; `delete` faults, `whoami` succeeds
/// - `secure`: auth; `a`, `b`
/// - `reports`: scopes `reports:a`, `reports:b`; `run`
/// - `params`: open; `echo` declares one parameter of each kind
/// - `faults`: open, logged; `panic`, `missing`
/// - `quiet`: open, not logged; `fail`, `ok`
/// - module `billing`
#[must_use]
pub fn build_dispatcher(log: Option<Arc<dyn CallLogWriter>>) -> Dispatcher {
    let admin = Endpoint::builder("admin")
        .requires_auth(true)
        .scope("admin:write")
        .log_calls(true)
        .method(Method::new("delete", delete_record).param("id", ParamKind::Integer))
        .method(Method::new("whoami", whoami))
        .build()
        .expect("admin endpoint");

    let secure = Endpoint::builder("secure")
        .requires_auth(true)
        .method(Method::new("a", ok))
        .method(Method::new("b", ok).param("n", ParamKind::Integer))
        .build()
        .expect("secure endpoint");

    let reports = Endpoint::builder("reports")
        .scope("reports:a")
        .scope("reports:b")
        .method(Method::new("run", ok))
        .build()
        .expect("reports endpoint");

    let params = Endpoint::builder("params")
        .method(
            Method::new("echo", echo_params)
                .param("text", ParamKind::Text)
                .param("integer", ParamKind::Integer)
                .param("float", ParamKind::Float)
                .param("flag", ParamKind::Bool)
                .param("at", ParamKind::Timestamp)
                .nullable_param("maybe", ParamKind::Integer),
        )
        .build()
        .expect("params endpoint");

    let faults = Endpoint::builder("faults")
        .log_calls(true)
        .method(Method::new("panic", explode))
        .method(Method::new("missing", not_found))
        .build()
        .expect("faults endpoint");

    let quiet = Endpoint::builder("quiet")
        .method(Method::new("fail", delete_record))
        .method(Method::new("ok", ok))
        .build()
        .expect("quiet endpoint");

    let mut builder = Dispatcher::builder()
        .endpoint(admin)
        .endpoint(secure)
        .endpoint(reports)
        .endpoint(params)
        .endpoint(faults)
        .endpoint(quiet)
        .module("billing", billing_module())
        .authenticator(Arc::new(test_authenticator()));

    if let Some(log) = log {
        builder = builder.call_log(log);
    }

    builder.build().expect("dispatcher")
}
