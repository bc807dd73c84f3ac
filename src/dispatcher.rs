//! Call dispatch: routing, access control, coercion and invocation
//!
//! A [`Dispatcher`] owns a fixed table of endpoints plus named child
//! dispatchers (modules), reached as `module.endpoint`. Only one level of
//! module delegation is traversed.
//!
//! Credential checks and call logging always use the services of the
//! dispatcher that received the call. Object parameters are decoded with the
//! type registry of the dispatcher that owns the endpoint.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::auth::{Authenticator, DenyAll};
use crate::calllog::{CallLogWriter, CallRecord};
use crate::context::{CallContext, CallEnvelope, ReleaseGuard, RequestHandle};
use crate::params::{TypeRegistry, coerce_all};
use crate::registry::{Endpoint, check_name};
use crate::result::CallResult;
use crate::{Error, Result};

/// Background call-log writes that nobody waits on
#[derive(Default)]
struct LogTasks {
    tasks: Mutex<JoinSet<()>>,
}

impl LogTasks {
    fn spawn(&self, writer: Arc<dyn CallLogWriter>, record: CallRecord, user_id: Option<String>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            if let Err(e) = writer.log_success(&record, user_id.as_deref()).await {
                warn!(
                    call_id = %record.call_id,
                    endpoint = %record.endpoint,
                    error = %e,
                    "failed to write call log"
                );
            }
        });
    }

    async fn flush(&self) {
        let mut pending = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "call log task did not complete");
            }
        }
    }
}

/// An endpoint found by name, with the dispatcher that owns it
struct Route<'a> {
    qualified: String,
    owner: &'a Dispatcher,
    endpoint: &'a Endpoint,
}

/// Routes named remote calls to registered handlers
pub struct Dispatcher {
    endpoints: HashMap<String, Endpoint>,
    modules: HashMap<String, Dispatcher>,
    authenticator: Arc<dyn Authenticator>,
    call_log: Option<Arc<dyn CallLogWriter>>,
    types: Arc<TypeRegistry>,
    log_tasks: LogTasks,
}

impl Dispatcher {
    /// Start building a dispatcher
    #[must_use]
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Look up an endpoint by `endpoint` or `module.endpoint` name
    ///
    /// # Errors
    ///
    /// Returns a description of the malformed or unknown name
    pub fn lookup(&self, name: &str) -> std::result::Result<&Endpoint, String> {
        self.route(name).map(|route| route.endpoint)
    }

    fn route(&self, name: &str) -> std::result::Result<Route<'_>, String> {
        let mut segments = name.split('.');
        match (segments.next(), segments.next(), segments.next()) {
            (Some(endpoint), None, _) if !endpoint.is_empty() => self
                .endpoints
                .get(endpoint)
                .map(|found| Route {
                    qualified: endpoint.to_string(),
                    owner: self,
                    endpoint: found,
                })
                .ok_or_else(|| format!("endpoint not found: {endpoint}")),
            (Some(module), Some(endpoint), None) if !module.is_empty() && !endpoint.is_empty() => {
                let child = self
                    .modules
                    .get(module)
                    .ok_or_else(|| format!("module not found: {module}"))?;
                child
                    .endpoints
                    .get(endpoint)
                    .map(|found| Route {
                        qualified: name.to_string(),
                        owner: child,
                        endpoint: found,
                    })
                    .ok_or_else(|| format!("endpoint not found: {name}"))
            }
            _ => Err(format!("malformed endpoint name: '{name}'")),
        }
    }

    /// Qualified names of every reachable endpoint, sorted
    #[must_use]
    pub fn endpoint_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.endpoints.keys().cloned().collect();
        for (module, child) in &self.modules {
            names.extend(child.endpoints.keys().map(|e| format!("{module}.{e}")));
        }
        names.sort();
        names
    }

    /// Wait for background call-log writes spawned so far
    pub async fn flush_logs(&self) {
        self.log_tasks.flush().await;
        for child in self.modules.values() {
            child.log_tasks.flush().await;
        }
    }

    /// Whether `token` resolves to a signed-in caller
    ///
    /// Lookup errors count as not signed in.
    pub async fn is_signed_in(&self, token: &str) -> bool {
        match self.authenticator.authenticate(token).await {
            Ok(info) => info.is_some(),
            Err(e) => {
                warn!(error = %e, "credential lookup failed");
                false
            }
        }
    }

    /// Dispatch one call and produce its outcome
    ///
    /// Never fails for client-triggerable conditions; every such condition is
    /// reported through the returned [`CallResult`].
    pub async fn handle_call(
        &self,
        envelope: CallEnvelope,
        handle: Arc<dyn RequestHandle>,
    ) -> CallResult {
        let route = match self.route(&envelope.endpoint) {
            Ok(route) => route,
            Err(description) => {
                debug!(endpoint = %envelope.endpoint, %description, "routing failed");
                return CallResult::InvalidParams(description);
            }
        };

        let ctx = match CallContext::open(
            route.qualified,
            envelope,
            handle,
            self.authenticator.clone(),
        )
        .await
        {
            Ok(ctx) => Arc::new(ctx),
            Err(e) => {
                warn!(error = %e, "malformed call");
                return CallResult::InvalidParams(format!("malformed call: {e}"));
            }
        };

        let _release = ReleaseGuard(ctx.clone());
        let result = self.run(route.owner, route.endpoint, ctx.clone()).await;

        debug!(
            call_id = %ctx.call_id(),
            endpoint = ctx.endpoint(),
            method = ctx.method(),
            outcome = result.kind(),
            duration_ms = ctx.elapsed_ms(),
            "call finished"
        );
        result
    }

    async fn run(&self, owner: &Self, endpoint: &Endpoint, ctx: Arc<CallContext>) -> CallResult {
        if let Err(description) = authorize(endpoint, &ctx).await {
            warn!(
                call_id = %ctx.call_id(),
                endpoint = ctx.endpoint(),
                %description,
                "call denied"
            );
            return CallResult::AuthenticationFailed(description);
        }

        let Some(method) = endpoint.method(ctx.method()) else {
            return CallResult::InvalidParams(format!(
                "method not found: {}.{}",
                ctx.endpoint(),
                ctx.method()
            ));
        };

        // Coercion runs registered decoders, which may panic too
        let invocation = AssertUnwindSafe(async {
            let params = coerce_all(ctx.raw_params(), method.params(), &owner.types);
            debug!(
                call_id = %ctx.call_id(),
                endpoint = ctx.endpoint(),
                method = ctx.method(),
                params = ?params.names(),
                "invoking method"
            );
            method.invoke(ctx.clone(), params).await
        })
        .catch_unwind()
        .await;

        let (exception, stack_trace) = match invocation {
            Ok(Ok(value)) => {
                let result = CallResult::Success(value);
                self.log_completed(endpoint, &ctx, &result).await;
                return result;
            }
            Ok(Err(e)) => {
                if let Some(Error::Status(code)) = e.downcast_ref::<Error>() {
                    let result = CallResult::StatusCode(*code);
                    self.log_completed(endpoint, &ctx, &result).await;
                    return result;
                }
                (format!("{e:#}"), error_trace(&e))
            }
            Err(payload) => (
                format!("handler panicked: {}", panic_message(payload.as_ref())),
                Backtrace::force_capture().to_string(),
            ),
        };

        error!(
            call_id = %ctx.call_id(),
            endpoint = ctx.endpoint(),
            method = ctx.method(),
            %exception,
            "method failed"
        );

        let log_id = if endpoint.log_calls() {
            self.log_failed(&ctx, &exception, &stack_trace).await
        } else {
            None
        };

        CallResult::InternalServerError {
            exception,
            stack_trace,
            log_id,
        }
    }

    /// Fire-and-forget record of a completed call
    async fn log_completed(&self, endpoint: &Endpoint, ctx: &CallContext, result: &CallResult) {
        let Some(writer) = self.call_log.as_ref().filter(|_| endpoint.log_calls()) else {
            return;
        };
        let user_id = if endpoint.requires_auth() {
            ctx.user_id().await.map(ToString::to_string)
        } else {
            None
        };
        let record = CallRecord::from_context(ctx, result.kind());
        self.log_tasks.spawn(writer.clone(), record, user_id);
    }

    /// Awaited record of a failed call; returns the record id
    async fn log_failed(&self, ctx: &CallContext, exception: &str, stack_trace: &str) -> Option<i64> {
        let writer = self.call_log.as_ref()?;
        let record = CallRecord::from_context(ctx, "internal_server_error");
        match writer.log_failure(&record, exception, stack_trace).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(call_id = %record.call_id, error = %e, "failed to write failure log");
                None
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("endpoints", &self.endpoints.keys().collect::<Vec<_>>())
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("call_log", &self.call_log.is_some())
            .finish_non_exhaustive()
    }
}

/// Enforce authentication, then required scopes
async fn authorize(endpoint: &Endpoint, ctx: &CallContext) -> std::result::Result<(), String> {
    if endpoint.requires_auth() {
        if !ctx.has_token() {
            return Err("authentication required".to_string());
        }
        if !ctx.is_signed_in().await {
            return Err("invalid or expired credentials".to_string());
        }
    }

    if !endpoint.required_scopes().is_empty() {
        if !ctx.is_signed_in().await {
            return Err("sign-in required".to_string());
        }
        let granted = ctx.granted_scopes().await;
        if let Some(missing) = endpoint
            .required_scopes()
            .iter()
            .find(|scope| !granted.contains(*scope))
        {
            return Err(format!("missing scope: {missing}"));
        }
    }

    Ok(())
}

fn error_trace(e: &anyhow::Error) -> String {
    let backtrace = e.backtrace();
    if backtrace.status() == BacktraceStatus::Captured {
        return backtrace.to_string();
    }
    e.chain()
        .skip(1)
        .map(|cause| format!("caused by: {cause}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Builder for [`Dispatcher`]
#[derive(Default)]
pub struct DispatcherBuilder {
    endpoints: Vec<Endpoint>,
    modules: Vec<(String, Dispatcher)>,
    authenticator: Option<Arc<dyn Authenticator>>,
    call_log: Option<Arc<dyn CallLogWriter>>,
    types: TypeRegistry,
}

impl DispatcherBuilder {
    #[must_use]
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Mount a child dispatcher under `name`
    #[must_use]
    pub fn module(mut self, name: impl Into<String>, dispatcher: Dispatcher) -> Self {
        self.modules.push((name.into(), dispatcher));
        self
    }

    /// Credential service; defaults to rejecting every token
    #[must_use]
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Call-log writer; without one nothing is logged
    #[must_use]
    pub fn call_log(mut self, writer: Arc<dyn CallLogWriter>) -> Self {
        self.call_log = Some(writer);
        self
    }

    /// Types available to object parameters of this dispatcher's endpoints
    #[must_use]
    pub fn types(mut self, types: TypeRegistry) -> Self {
        self.types = types;
        self
    }

    /// Finish the dispatcher
    ///
    /// # Errors
    ///
    /// Returns error on invalid or duplicate endpoint or module names
    pub fn build(self) -> Result<Dispatcher> {
        let mut endpoints = HashMap::with_capacity(self.endpoints.len());
        for endpoint in self.endpoints {
            if endpoints.contains_key(endpoint.name()) {
                return Err(Error::Registry(format!(
                    "duplicate endpoint '{}'",
                    endpoint.name()
                )));
            }
            endpoints.insert(endpoint.name().to_string(), endpoint);
        }

        let mut modules = HashMap::with_capacity(self.modules.len());
        for (name, dispatcher) in self.modules {
            check_name("module", &name)?;
            if modules.contains_key(&name) {
                return Err(Error::Registry(format!("duplicate module '{name}'")));
            }
            modules.insert(name, dispatcher);
        }

        Ok(Dispatcher {
            endpoints,
            modules,
            authenticator: self.authenticator.unwrap_or_else(|| Arc::new(DenyAll)),
            call_log: self.call_log,
            types: Arc::new(self.types),
            log_tasks: LogTasks::default(),
        })
    }
}
