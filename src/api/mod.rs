//! HTTP transport for the dispatcher

mod auth;
pub mod health;
pub mod rate_limit;
pub mod rpc;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, extract::DefaultBodyLimit, routing::post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::config::DEFAULT_MAX_BODY_BYTES;
use crate::dispatcher::Dispatcher;

pub use auth::extract_bearer;
pub use rpc::{HttpRequestHandle, call_response};

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<Dispatcher>,
    pub rate_limiter: Option<rate_limit::SharedLimiter>,
    pub max_body_bytes: usize,
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Create a server for `dispatcher` on `port`
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, port: u16) -> Self {
        Self {
            state: Arc::new(ApiState {
                dispatcher,
                rate_limiter: None,
                max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            }),
            port,
        }
    }

    /// Limit RPC calls to `requests_per_minute` across all callers
    #[must_use]
    pub fn rate_limit(mut self, requests_per_minute: Option<u32>) -> Self {
        Arc::make_mut(&mut self.state).rate_limiter =
            requests_per_minute.map(rate_limit::create_limiter);
        self
    }

    #[must_use]
    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        Arc::make_mut(&mut self.state).max_body_bytes = bytes;
        self
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let rpc = Router::new()
            .route("/rpc/{endpoint}", post(rpc::call))
            .layer(DefaultBodyLimit::max(self.state.max_body_bytes))
            .layer(axum::middleware::from_fn_with_state(
                self.state.clone(),
                rate_limit::rate_limit_middleware,
            ))
            .with_state(self.state.clone());

        rpc.merge(health::router())
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server until interrupted
    ///
    /// Outstanding call-log writes are flushed before returning.
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(
            port = self.port,
            endpoints = ?self.state.dispatcher.endpoint_names(),
            rate_limited = self.state.rate_limiter.is_some(),
            "API server listening"
        );

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        self.state.dispatcher.flush_logs().await;
        tracing::info!("API server stopped");
        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
