//! Per-call state handed to method handlers
//!
//! A [`CallContext`] lives for exactly one dispatched call. It carries the
//! parsed call envelope, the transport handle and a lazily resolved auth
//! state. The transport handle is released exactly once when the call ends,
//! whichever way it ends.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::Result;
use crate::auth::{AuthInfo, Authenticator, Scope};
use crate::params::RawParam;

static NO_SCOPES: BTreeSet<Scope> = BTreeSet::new();

/// Transport-side view of the peer that issued a call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerInfo {
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
}

/// Transport handle owned by a call
#[async_trait]
pub trait RequestHandle: Send + Sync {
    /// Inspect transport-specific call data
    ///
    /// # Errors
    ///
    /// Returns error if the transport data is malformed
    async fn describe(&self) -> Result<PeerInfo>;

    /// Release transport resources; called once per call
    fn release(&self);
}

/// Handle for in-process calls with no transport behind them
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedHandle;

#[async_trait]
impl RequestHandle for DetachedHandle {
    async fn describe(&self) -> Result<PeerInfo> {
        Ok(PeerInfo::default())
    }

    fn release(&self) {}
}

/// A decoded remote call, as delivered by a transport
#[derive(Debug)]
pub struct CallEnvelope {
    /// `endpoint` or `module.endpoint`
    pub endpoint: String,
    pub method: String,
    pub params: HashMap<String, RawParam>,
    pub auth_token: Option<SecretString>,
}

impl CallEnvelope {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: method.into(),
            params: HashMap::new(),
            auth_token: None,
        }
    }

    /// Add a raw parameter
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<RawParam>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Attach a bearer token
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(SecretString::from(token.into()));
        self
    }
}

/// State for a single dispatched call
pub struct CallContext {
    call_id: Uuid,
    endpoint: String,
    method: String,
    raw_params: HashMap<String, RawParam>,
    auth_token: Option<SecretString>,
    peer: PeerInfo,
    started_at: DateTime<Utc>,
    started: Instant,
    authenticator: Arc<dyn Authenticator>,
    auth: OnceCell<Option<AuthInfo>>,
    handle: Arc<dyn RequestHandle>,
    released: AtomicBool,
}

impl CallContext {
    /// Open a context for a routed call
    ///
    /// `endpoint` is the resolved, qualified endpoint name.
    ///
    /// # Errors
    ///
    /// Returns error if the transport handle reports malformed call data. The
    /// handle is not released in that case; the caller owns it.
    pub async fn open(
        endpoint: String,
        envelope: CallEnvelope,
        handle: Arc<dyn RequestHandle>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Self> {
        let peer = handle.describe().await?;
        Ok(Self {
            call_id: Uuid::new_v4(),
            endpoint,
            method: envelope.method,
            raw_params: envelope.params,
            auth_token: envelope.auth_token,
            peer,
            started_at: Utc::now(),
            started: Instant::now(),
            authenticator,
            auth: OnceCell::new(),
            handle,
            released: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub const fn call_id(&self) -> Uuid {
        self.call_id
    }

    /// Resolved endpoint name, qualified with its module if any
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Parameters exactly as the transport delivered them
    #[must_use]
    pub const fn raw_params(&self) -> &HashMap<String, RawParam> {
        &self.raw_params
    }

    #[must_use]
    pub const fn peer(&self) -> &PeerInfo {
        &self.peer
    }

    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Milliseconds since the context was opened
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Whether the call carried a bearer token
    #[must_use]
    pub const fn has_token(&self) -> bool {
        self.auth_token.is_some()
    }

    async fn auth_info(&self) -> Option<&AuthInfo> {
        self.auth
            .get_or_init(|| async {
                let token = self.auth_token.as_ref()?;
                match self.authenticator.authenticate(token.expose_secret()).await {
                    Ok(info) => info,
                    Err(e) => {
                        tracing::warn!(call_id = %self.call_id, error = %e, "credential lookup failed");
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    /// Whether the token resolves to a signed-in user
    ///
    /// Resolved once per call; later checks reuse the first lookup.
    pub async fn is_signed_in(&self) -> bool {
        self.auth_info().await.is_some()
    }

    /// Scopes granted to the caller; empty when not signed in
    pub async fn granted_scopes(&self) -> &BTreeSet<Scope> {
        self.auth_info().await.map_or(&NO_SCOPES, |info| &info.scopes)
    }

    /// Authenticated user id, if signed in
    pub async fn user_id(&self) -> Option<&str> {
        self.auth_info().await.map(|info| info.user_id.as_str())
    }

    /// Release the transport handle; later calls are no-ops
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.handle.release();
            tracing::trace!(call_id = %self.call_id, "call context released");
        }
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for CallContext {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("call_id", &self.call_id)
            .field("endpoint", &self.endpoint)
            .field("method", &self.method)
            .field("peer", &self.peer)
            .field("has_token", &self.auth_token.is_some())
            .finish_non_exhaustive()
    }
}

/// Releases a shared [`CallContext`] when dropped
///
/// Handlers may keep clones of the context alive past the end of the call;
/// the guard ties release to the dispatcher's scope instead.
pub(crate) struct ReleaseGuard(pub(crate) Arc<CallContext>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}
