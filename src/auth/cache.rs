//! TTL cache for credential lookups
//!
//! Both signed-in and rejected outcomes are cached for the full TTL, keyed by
//! token fingerprint. Lookup errors are never cached.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mini_moka::sync::Cache;

use super::{AuthInfo, Authenticator, fingerprint};
use crate::Result;

/// Caching wrapper around another [`Authenticator`]
#[derive(Clone)]
pub struct CachedAuthenticator {
    inner: Arc<dyn Authenticator>,
    cache: Cache<String, Option<AuthInfo>>,
}

impl CachedAuthenticator {
    /// Wrap `inner`, caching results for `ttl`
    #[must_use]
    pub fn new(inner: Arc<dyn Authenticator>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::builder().max_capacity(4096).time_to_live(ttl).build(),
        }
    }

    /// Drop every cached lookup
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

#[async_trait]
impl Authenticator for CachedAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Option<AuthInfo>> {
        let key = fingerprint(token);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let resolved = self.inner.authenticate(token).await?;
        self.cache.insert(key, resolved.clone());
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::Error;

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Authenticator for Counting {
        async fn authenticate(&self, token: &str) -> Result<Option<AuthInfo>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Auth("store offline".to_string()));
            }
            Ok((token == "good").then(|| AuthInfo::new("bob", ["a"])))
        }
    }

    #[tokio::test]
    async fn caches_hits_and_misses() {
        let inner = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let cached = CachedAuthenticator::new(inner.clone(), Duration::from_secs(60));

        assert!(cached.authenticate("good").await.unwrap().is_some());
        assert!(cached.authenticate("good").await.unwrap().is_some());
        assert!(cached.authenticate("bad").await.unwrap().is_none());
        assert!(cached.authenticate("bad").await.unwrap().is_none());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);

        cached.invalidate_all();
        assert!(cached.authenticate("good").await.unwrap().is_some());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let inner = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let cached = CachedAuthenticator::new(inner.clone(), Duration::from_secs(60));

        assert!(cached.authenticate("good").await.is_err());
        assert!(cached.authenticate("good").await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
