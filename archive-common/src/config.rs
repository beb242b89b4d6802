//! Configuration loading
//!
//! Resolution priority (highest first):
//! 1. Command-line arguments (applied by the binary as a final layer)
//! 2. Environment variables (`ARCHIVE_*`)
//! 3. TOML config file
//! 4. Compiled defaults
//!
//! A missing TOML file is not an error; the vault starts on defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::record::{ScopePath, SessionId};
use crate::{Error, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "ARCHIVE_CONFIG";

/// Which document store / identity provider pair to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process store and identity (offline, data lost on exit)
    #[default]
    Memory,
    /// Hosted identity toolkit + document database over REST
    Firestore,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Backend::Memory),
            "firestore" => Ok(Backend::Firestore),
            other => Err(format!("unknown backend '{}' (expected memory or firestore)", other)),
        }
    }
}

/// One configuration layer; every field optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    pub app_id: Option<String>,
    pub collection: Option<String>,
    pub email_suffix: Option<String>,
    pub max_file_bytes: Option<u64>,
    pub backend: Option<Backend>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub poll_interval_ms: Option<u64>,
    pub log_level: Option<String>,
}

/// Resolved vault configuration
///
/// Passed explicitly into the identity provider and document store clients.
#[derive(Debug, Clone, PartialEq)]
pub struct VaultConfig {
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    pub app_id: String,
    pub collection: String,
    pub email_suffix: String,
    pub max_file_bytes: u64,
    pub backend: Backend,
    pub bind_address: String,
    pub port: u16,
    pub poll_interval_ms: u64,
    pub log_level: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            project_id: None,
            app_id: "cyber-archive-v1".to_string(),
            collection: "secure_uploads".to_string(),
            email_suffix: ".edu".to_string(),
            max_file_bytes: 700 * 1024,
            backend: Backend::Memory,
            bind_address: "127.0.0.1".to_string(),
            port: 5780,
            poll_interval_ms: 2000,
            log_level: "info".to_string(),
        }
    }
}

impl VaultConfig {
    /// Defaults ← TOML file ← environment
    ///
    /// `config_path` is an explicit file (CLI); when absent the file is looked
    /// up via `ARCHIVE_CONFIG` and then the platform config directory.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        Self::load_from(resolve_config_path(config_path).as_deref())
    }

    /// Defaults ← file at an already resolved `path` ← environment
    ///
    /// A path that does not exist contributes nothing.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = path.filter(|p| p.exists()) {
            config.apply(load_toml_config(path)?);
        }
        config.apply(env_layer()?);
        Ok(config)
    }

    /// Overlay every value present in `layer`
    pub fn apply(&mut self, layer: TomlConfig) {
        if let Some(v) = layer.api_key {
            self.api_key = Some(v);
        }
        if let Some(v) = layer.project_id {
            self.project_id = Some(v);
        }
        if let Some(v) = layer.app_id {
            self.app_id = v;
        }
        if let Some(v) = layer.collection {
            self.collection = v;
        }
        if let Some(v) = layer.email_suffix {
            self.email_suffix = v;
        }
        if let Some(v) = layer.max_file_bytes {
            self.max_file_bytes = v;
        }
        if let Some(v) = layer.backend {
            self.backend = v;
        }
        if let Some(v) = layer.bind_address {
            self.bind_address = v;
        }
        if let Some(v) = layer.port {
            self.port = v;
        }
        if let Some(v) = layer.poll_interval_ms {
            self.poll_interval_ms = v;
        }
        if let Some(v) = layer.log_level {
            self.log_level = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend == Backend::Firestore {
            if self.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
                return Err(Error::Config(
                    "firestore backend requires api_key (ARCHIVE_API_KEY)".to_string(),
                ));
            }
            if self.project_id.as_deref().map_or(true, |p| p.trim().is_empty()) {
                return Err(Error::Config(
                    "firestore backend requires project_id (ARCHIVE_PROJECT_ID)".to_string(),
                ));
            }
        }
        if self.max_file_bytes == 0 {
            return Err(Error::Config("max_file_bytes must be positive".to_string()));
        }
        if self.email_suffix.is_empty() {
            return Err(Error::Config("email_suffix must not be empty".to_string()));
        }
        if self.app_id.is_empty() || self.collection.is_empty() {
            return Err(Error::Config(
                "app_id and collection must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Scope path of the given session's records
    pub fn scope_for(&self, session: &SessionId) -> ScopePath {
        ScopePath::for_session(&self.app_id, session, &self.collection)
    }

    /// `host:port` for the HTTP listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Locate the config file: explicit path, then `ARCHIVE_CONFIG`, then
/// `<config_dir>/cyber-archive/vault.toml`
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    dirs::config_dir().map(|d| d.join("cyber-archive").join("vault.toml"))
}

/// Read and parse a TOML config layer
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Configuration layer from `ARCHIVE_*` environment variables
pub fn env_layer() -> Result<TomlConfig> {
    Ok(TomlConfig {
        api_key: env_string("ARCHIVE_API_KEY"),
        project_id: env_string("ARCHIVE_PROJECT_ID"),
        app_id: env_string("ARCHIVE_APP_ID"),
        collection: env_string("ARCHIVE_COLLECTION"),
        email_suffix: env_string("ARCHIVE_EMAIL_SUFFIX"),
        max_file_bytes: env_parsed("ARCHIVE_MAX_FILE_BYTES")?,
        backend: env_parsed("ARCHIVE_BACKEND")?,
        bind_address: env_string("ARCHIVE_BIND_ADDRESS"),
        port: env_parsed("ARCHIVE_PORT")?,
        poll_interval_ms: env_parsed("ARCHIVE_POLL_INTERVAL_MS")?,
        log_level: env_string("ARCHIVE_LOG_LEVEL"),
    })
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}={:?}: {}", name, raw, e))),
        None => Ok(None),
    }
}
