//! Endpoint and method registry entries
//!
//! Entries are assembled with builders at startup and are immutable once
//! built. A [`Method`] binds a name to its parameter schema and handler; an
//! [`Endpoint`] groups methods under shared access-control settings.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::auth::Scope;
use crate::context::CallContext;
use crate::params::{CallParams, ParamKind, ParamSpec};
use crate::{Error, Result};

/// Future returned by a method handler
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Value>>;

/// A boxed async method handler
pub type HandlerFn = Arc<dyn Fn(Arc<CallContext>, CallParams) -> HandlerFuture + Send + Sync>;

/// Validate an endpoint, method or module name
pub(crate) fn check_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Registry(format!("{kind} name must not be empty")));
    }
    if name.contains('.') {
        return Err(Error::Registry(format!(
            "{kind} name '{name}' must not contain '.'"
        )));
    }
    Ok(())
}

/// A remotely callable method
#[derive(Clone)]
pub struct Method {
    name: String,
    params: BTreeMap<String, ParamSpec>,
    handler: HandlerFn,
}

impl Method {
    /// Create a method with no declared parameters
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<CallContext>, CallParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
            handler: Arc::new(move |ctx, params| Box::pin(handler(ctx, params))),
        }
    }

    /// Declare a non-nullable parameter
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.insert(name.into(), ParamSpec::required(kind));
        self
    }

    /// Declare a nullable parameter
    #[must_use]
    pub fn nullable_param(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.insert(name.into(), ParamSpec::nullable(kind));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter schema
    #[must_use]
    pub const fn params(&self) -> &BTreeMap<String, ParamSpec> {
        &self.params
    }

    pub(crate) fn invoke(&self, ctx: Arc<CallContext>, params: CallParams) -> HandlerFuture {
        (self.handler)(ctx, params)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A named group of methods sharing access-control settings
#[derive(Debug, Clone)]
pub struct Endpoint {
    name: String,
    requires_auth: bool,
    required_scopes: BTreeSet<Scope>,
    log_calls: bool,
    methods: HashMap<String, Method>,
}

impl Endpoint {
    /// Start building an endpoint
    #[must_use]
    pub fn builder(name: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder {
            name: name.into(),
            requires_auth: false,
            required_scopes: BTreeSet::new(),
            log_calls: false,
            methods: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn requires_auth(&self) -> bool {
        self.requires_auth
    }

    /// Scopes a caller must hold, in addition to any plain auth requirement
    #[must_use]
    pub const fn required_scopes(&self) -> &BTreeSet<Scope> {
        &self.required_scopes
    }

    #[must_use]
    pub const fn log_calls(&self) -> bool {
        self.log_calls
    }

    #[must_use]
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// Method names, sorted
    #[must_use]
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Builder for [`Endpoint`]
#[derive(Debug)]
pub struct EndpointBuilder {
    name: String,
    requires_auth: bool,
    required_scopes: BTreeSet<Scope>,
    log_calls: bool,
    methods: Vec<Method>,
}

impl EndpointBuilder {
    /// Require a signed-in caller
    #[must_use]
    pub const fn requires_auth(mut self, requires_auth: bool) -> Self {
        self.requires_auth = requires_auth;
        self
    }

    /// Require the caller to hold `scope`
    #[must_use]
    pub fn scope(mut self, scope: impl Into<Scope>) -> Self {
        self.required_scopes.insert(scope.into());
        self
    }

    /// Record every call in the call log
    #[must_use]
    pub const fn log_calls(mut self, log_calls: bool) -> Self {
        self.log_calls = log_calls;
        self
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    /// Finish the endpoint
    ///
    /// # Errors
    ///
    /// Returns error on an invalid name or a duplicate method name
    pub fn build(self) -> Result<Endpoint> {
        check_name("endpoint", &self.name)?;

        let mut methods = HashMap::with_capacity(self.methods.len());
        for method in self.methods {
            check_name("method", &method.name)?;
            if methods.contains_key(&method.name) {
                return Err(Error::Registry(format!(
                    "duplicate method '{}' on endpoint '{}'",
                    method.name, self.name
                )));
            }
            methods.insert(method.name.clone(), method);
        }

        Ok(Endpoint {
            name: self.name,
            requires_auth: self.requires_auth,
            required_scopes: self.required_scopes,
            log_calls: self.log_calls,
            methods,
        })
    }
}
