//! Configuration management for Switchboard
//!
//! Precedence is env > TOML file > defaults.

pub mod file;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 18_800;

/// Default maximum request body size (1 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Default credential cache TTL
pub const DEFAULT_AUTH_CACHE_TTL_SECS: u64 = 60;

/// Switchboard configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Call-log database configuration
    pub database: DatabaseConfig,

    /// Credential configuration
    pub auth: AuthConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Global request budget per minute
    pub rate_limit_per_minute: Option<u32>,

    /// Maximum request body size in bytes
    pub max_body_bytes: usize,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the `SQLite` call-log database
    pub path: PathBuf,
}

/// Credential configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Seconds to cache credential lookups (0 disables caching)
    pub cache_ttl_secs: u64,

    /// Configured bearer tokens
    pub tokens: Vec<TokenGrant>,
}

/// A bearer token and what it grants
///
/// Either `token` or its hex SHA-256 `token_sha256` must be set.
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_sha256: Option<String>,
    pub user_id: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("token_sha256", &self.token_sha256)
            .field("user_id", &self.user_id)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Default database path: `~/.local/share/switchboard/calls.db`
fn default_db_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("switchboard-calls.db"),
        |d| d.data_dir().join("switchboard").join("calls.db"),
    )
}

impl Config {
    /// Load configuration from the environment and the TOML file
    ///
    /// # Errors
    ///
    /// Returns error if an explicitly given config file cannot be loaded
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(path)?;
        Ok(Self::resolve(fc, |key| std::env::var(key).ok()))
    }

    /// Merge a parsed file with environment lookups
    pub fn resolve(
        fc: file::SwitchboardConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let server = ServerConfig {
            port: env("SWITCHBOARD_PORT")
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(DEFAULT_PORT),
            rate_limit_per_minute: env("SWITCHBOARD_RATE_LIMIT")
                .and_then(|s| s.parse().ok())
                .or(fc.server.rate_limit_per_minute)
                .filter(|rpm| *rpm > 0),
            max_body_bytes: fc.server.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES),
        };

        let database = DatabaseConfig {
            path: env("SWITCHBOARD_DB_PATH")
                .or(fc.database.path)
                .map_or_else(default_db_path, PathBuf::from),
        };

        let auth = AuthConfig {
            cache_ttl_secs: env("SWITCHBOARD_AUTH_CACHE_TTL")
                .and_then(|s| s.parse().ok())
                .or(fc.auth.cache_ttl_secs)
                .unwrap_or(DEFAULT_AUTH_CACHE_TTL_SECS),
            tokens: fc.auth.tokens,
        };

        Self {
            server,
            database,
            auth,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::file::{DatabaseFileConfig, ServerFileConfig, SwitchboardConfigFile};
    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_file_or_env() {
        let config = Config::resolve(SwitchboardConfigFile::default(), env_from(&[]));
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.server.rate_limit_per_minute, None);
        assert_eq!(config.server.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert_eq!(config.auth.cache_ttl_secs, DEFAULT_AUTH_CACHE_TTL_SECS);
        assert!(config.auth.tokens.is_empty());
        assert!(config.database.path.ends_with("calls.db"));
    }

    #[test]
    fn env_overrides_file() {
        let fc = SwitchboardConfigFile {
            server: ServerFileConfig {
                port: Some(9000),
                rate_limit_per_minute: Some(10),
                max_body_bytes: Some(2048),
            },
            database: DatabaseFileConfig {
                path: Some("/srv/file.db".to_string()),
            },
            ..SwitchboardConfigFile::default()
        };

        let config = Config::resolve(
            fc,
            env_from(&[
                ("SWITCHBOARD_PORT", "9100"),
                ("SWITCHBOARD_DB_PATH", "/srv/env.db"),
                ("SWITCHBOARD_RATE_LIMIT", "0"),
            ]),
        );

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.database.path, PathBuf::from("/srv/env.db"));
        assert_eq!(config.server.rate_limit_per_minute, None);
        assert_eq!(config.server.max_body_bytes, 2048);
    }

    #[test]
    fn unparsable_env_falls_back_to_file() {
        let fc = SwitchboardConfigFile {
            server: ServerFileConfig {
                port: Some(9000),
                ..ServerFileConfig::default()
            },
            ..SwitchboardConfigFile::default()
        };
        let config = Config::resolve(fc, env_from(&[("SWITCHBOARD_PORT", "http")]));
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn token_grant_debug_redacts_secret() {
        let grant = TokenGrant {
            token: Some("hunter2".to_string()),
            token_sha256: None,
            user_id: "ops".to_string(),
            scopes: vec![],
        };
        let rendered = format!("{grant:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
