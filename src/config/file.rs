//! TOML configuration file loading
//!
//! Supports `~/.config/switchboard/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::TokenGrant;
use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct SwitchboardConfigFile {
    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Call-log database configuration
    #[serde(default)]
    pub database: DatabaseFileConfig,

    /// Credential configuration
    #[serde(default)]
    pub auth: AuthFileConfig,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// HTTP port
    pub port: Option<u16>,

    /// Global request budget per minute (unset = unlimited)
    pub rate_limit_per_minute: Option<u32>,

    /// Maximum request body size in bytes
    pub max_body_bytes: Option<usize>,
}

/// Database configuration
#[derive(Debug, Default, Deserialize)]
pub struct DatabaseFileConfig {
    /// Path to the `SQLite` call-log database
    pub path: Option<String>,
}

/// Credential configuration
#[derive(Debug, Default, Deserialize)]
pub struct AuthFileConfig {
    /// Seconds to cache credential lookups (0 disables caching)
    pub cache_ttl_secs: Option<u64>,

    /// Bearer tokens
    #[serde(default)]
    pub tokens: Vec<TokenGrant>,
}

/// Load the TOML config file
///
/// An explicit `path` must exist and parse. Without one, the standard path is
/// tried and any problem falls back to defaults.
///
/// # Errors
///
/// Returns error if an explicit path cannot be read or parsed
pub fn load_config_file(path: Option<&Path>) -> Result<SwitchboardConfigFile> {
    if let Some(path) = path {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(SwitchboardConfigFile::default());
    };

    if !path.exists() {
        return Ok(SwitchboardConfigFile::default());
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                Ok(SwitchboardConfigFile::default())
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            Ok(SwitchboardConfigFile::default())
        }
    }
}

/// Return the config file path: `~/.config/switchboard/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("switchboard").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parses_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[server]
port = 9000
rate_limit_per_minute = 120

[database]
path = "/tmp/calls.db"

[auth]
cache_ttl_secs = 30

[[auth.tokens]]
token = "dev-token"
user_id = "dev"
scopes = ["admin:read"]

[[auth.tokens]]
token_sha256 = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
user_id = "ci"
"#
        )
        .unwrap();

        let config = load_config_file(Some(file.path())).unwrap();
        assert_eq!(config.server.port, Some(9000));
        assert_eq!(config.server.rate_limit_per_minute, Some(120));
        assert_eq!(config.database.path.as_deref(), Some("/tmp/calls.db"));
        assert_eq!(config.auth.cache_ttl_secs, Some(30));
        assert_eq!(config.auth.tokens.len(), 2);
        assert_eq!(config.auth.tokens[0].scopes, vec!["admin:read".to_string()]);
        assert!(config.auth.tokens[1].scopes.is_empty());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config_file(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn explicit_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[server\nport = ").unwrap();
        assert!(load_config_file(Some(file.path())).is_err());
    }
}
