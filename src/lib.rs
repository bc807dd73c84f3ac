//! Switchboard - RPC dispatch engine
//!
//! This library routes named remote calls to registered async handlers:
//! - Endpoint routing (`endpoint` or `module.endpoint`)
//! - Authentication and scope checks
//! - Lenient parameter coercion into typed values
//! - A closed result taxonomy for every call
//! - Call logging to `SQLite`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Transports                        │
//! │        HTTP (axum)  │  in-process (Detached)        │
//! └────────────────────┬────────────────────────────────┘
//!                      │ CallEnvelope + RequestHandle
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Dispatcher                        │
//! │  Route │ Context │ Auth/Scopes │ Coerce │ Invoke    │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                   Services                           │
//! │  Authenticator  │  TypeRegistry  │  CallLogWriter   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod auth;
pub mod builtin;
pub mod calllog;
pub mod config;
pub mod context;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod params;
pub mod registry;
pub mod result;

pub use auth::{AuthInfo, Authenticator, CachedAuthenticator, Scope, StaticTokenAuthenticator};
pub use calllog::{CallLogWriter, CallRecord};
pub use config::Config;
pub use context::{CallContext, CallEnvelope, DetachedHandle, PeerInfo, RequestHandle};
pub use db::{CallLogRepo, DbConn, DbPool};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{Error, Result};
pub use params::{CallParams, ParamKind, ParamSpec, ParamValue, RawParam, TypeRegistry};
pub use registry::{Endpoint, EndpointBuilder, Method};
pub use result::CallResult;
