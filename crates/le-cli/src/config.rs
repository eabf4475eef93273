//! Configuration loading and management.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use le_core::{IngestLimits, ViewerConfig};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    pub server: ServerConfig,
    pub limits: IngestLimits,
    pub client: ClientConfig,
    pub viewer: ViewerConfig,
}

/// Ingress settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Bearer tokens accepted on mutating routes.
    pub api_tokens: Vec<String>,
    /// Admit every caller. Only for local single-user setups.
    pub auth_disabled: bool,
}

/// Outbound HTTP settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the analytics ingress, including `/api/analytics`.
    pub ingress_url: String,
    /// Attention inference endpoint.
    pub inference_url: String,
    /// Token sent when posting telemetry.
    pub api_token: Option<String>,
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("log_level", &self.log_level)
            .field("server", &self.server)
            .field("limits", &self.limits)
            .field("client", &self.client)
            .field("viewer", &self.viewer)
            .finish()
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind", &self.bind)
            .field("api_tokens", &format_args!("[{} REDACTED]", self.api_tokens.len()))
            .field("auth_disabled", &self.auth_disabled)
            .finish()
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("ingress_url", &self.ingress_url)
            .field("inference_url", &self.inference_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            api_tokens: Vec::new(),
            auth_disabled: false,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ingress_url: "http://127.0.0.1:8080/api/analytics".to_string(),
            inference_url: "http://127.0.0.1:8000/infer".to_string(),
            api_token: None,
            timeout_secs: 5,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("le.db"),
            log_level: "info".to_string(),
            server: ServerConfig::default(),
            limits: IngestLimits::default(),
            client: ClientConfig::default(),
            viewer: ViewerConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    ///
    /// Later sources win: defaults, `config.toml` in the config directory,
    /// `config_path`, then `LE_*` environment variables (`__` separates
    /// nested keys, e.g. `LE_SERVER__BIND`).
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("LE_").split("__"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for le.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("le"))
}

/// Returns the platform-specific data directory for le.
///
/// On Linux: `~/.local/share/le`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("le"))
}
