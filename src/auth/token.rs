//! Bearer tokens configured up front
//!
//! Tokens are held only as SHA-256 fingerprints so the raw secrets never stay
//! resident after startup.

use std::collections::HashMap;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{AuthInfo, Authenticator, Scope};
use crate::config::TokenGrant;
use crate::{Error, Result};

/// Hex-encoded SHA-256 fingerprint of a token
#[must_use]
pub fn fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Authenticator backed by a fixed token table
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    grants: HashMap<String, AuthInfo>,
}

impl StaticTokenAuthenticator {
    /// Create an authenticator with no tokens
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configured grants
    ///
    /// # Errors
    ///
    /// Returns error if a grant has neither a token nor a valid fingerprint
    pub fn from_grants(grants: &[TokenGrant]) -> Result<Self> {
        let mut auth = Self::new();
        for grant in grants {
            let key = match (&grant.token, &grant.token_sha256) {
                (Some(token), _) => fingerprint(token),
                (None, Some(digest)) => {
                    let digest = digest.to_ascii_lowercase();
                    if digest.len() != 64 || hex::decode(&digest).is_err() {
                        return Err(Error::Config(format!(
                            "invalid token_sha256 for user '{}'",
                            grant.user_id
                        )));
                    }
                    digest
                }
                (None, None) => {
                    return Err(Error::Config(format!(
                        "token grant for user '{}' has no token",
                        grant.user_id
                    )));
                }
            };
            auth.grants.insert(
                key,
                AuthInfo::new(grant.user_id.clone(), grant.scopes.iter().map(Scope::new)),
            );
        }
        Ok(auth)
    }

    /// Add a token granting `scopes` to `user_id`
    #[must_use]
    pub fn with_token<I, S>(mut self, token: &str, user_id: &str, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scope>,
    {
        self.grants
            .insert(fingerprint(token), AuthInfo::new(user_id, scopes));
        self
    }

    /// Number of configured tokens
    #[must_use]
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Option<AuthInfo>> {
        Ok(self.grants.get(&fingerprint(token)).cloned())
    }
}
