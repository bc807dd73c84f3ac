//! Credential lookup for authenticated endpoints
//!
//! The dispatcher only consumes the outcome of a credential lookup: whether
//! the caller is signed in, who they are, and which scopes they hold.
//! - [`StaticTokenAuthenticator`]: bearer tokens from configuration
//! - [`CachedAuthenticator`]: TTL cache in front of any authenticator

mod cache;
mod token;

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

pub use cache::CachedAuthenticator;
pub use token::{StaticTokenAuthenticator, fingerprint};

/// A named permission an endpoint may require
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Scope {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Scope {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identity and grants resolved from a valid credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    pub user_id: String,
    pub scopes: BTreeSet<Scope>,
}

impl AuthInfo {
    #[must_use]
    pub fn new<I, S>(user_id: impl Into<String>, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scope>,
    {
        Self {
            user_id: user_id.into(),
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }
}

/// Credential/session service
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolve a token to the caller's identity
    ///
    /// Returns `Ok(None)` for unknown or revoked tokens.
    ///
    /// # Errors
    ///
    /// Returns error if the credential store cannot be consulted
    async fn authenticate(&self, token: &str) -> Result<Option<AuthInfo>>;
}

/// Authenticator that rejects every token
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

#[async_trait]
impl Authenticator for DenyAll {
    async fn authenticate(&self, _token: &str) -> Result<Option<AuthInfo>> {
        Ok(None)
    }
}
