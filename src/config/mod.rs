use crate::oauth::{ProviderConfig, ProviderRegistry};
use crate::platform::Platform;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "SOCIAL_CONNECT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "social-connect.toml";

/// Complete service configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Client credentials keyed by platform name (`[providers.youtube]`)
    #[serde(default)]
    pub providers: HashMap<String, ClientCredentials>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Public base URL the vendors redirect back to
    #[serde(default = "default_callback_base_url")]
    pub callback_base_url: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_callback_base_url() -> String {
    "http://localhost:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            callback_base_url: default_callback_base_url(),
        }
    }
}

/// Authorization flow timing
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    #[serde(default = "default_state_expiry")]
    pub state_expiry_seconds: i64,
    #[serde(default = "default_state_cleanup_interval")]
    pub state_cleanup_interval_seconds: u64,
    /// Timeout applied to every vendor HTTP call
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
}

fn default_state_expiry() -> i64 {
    600
}

fn default_state_cleanup_interval() -> u64 {
    60
}

fn default_http_timeout() -> u64 {
    crate::oauth::DEFAULT_TIMEOUT_SECONDS
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            state_expiry_seconds: default_state_expiry(),
            state_cleanup_interval_seconds: default_state_cleanup_interval(),
            http_timeout_seconds: default_http_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "accounts.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// OAuth client registered with a platform
#[derive(Clone, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Load configuration from TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Loads the file named by `SOCIAL_CONNECT_CONFIG` (defaults apply when the
/// default file is absent), then applies environment overrides.
pub fn load_from_env() -> Result<AppConfig> {
    let explicit = std::env::var(CONFIG_PATH_ENV).ok();
    let path = explicit
        .clone()
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let mut config = if explicit.is_some() || Path::new(&path).exists() {
        load_config(&path)?
    } else {
        AppConfig::default()
    };

    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

impl AppConfig {
    /// Applies `SOCIAL_CONNECT_*` and `SOCIAL_OAUTH_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SOCIAL_CONNECT_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = lookup("SOCIAL_CONNECT_CALLBACK_BASE_URL") {
            self.server.callback_base_url = v;
        }
        if let Some(v) = lookup("SOCIAL_CONNECT_DATABASE_PATH") {
            self.storage.database_path = v;
        }
        if let Some(v) = lookup("SOCIAL_CONNECT_STATE_EXPIRY_SECONDS") {
            match v.parse::<i64>() {
                Ok(n) => self.oauth.state_expiry_seconds = n,
                Err(_) => warn!(value = %v, "Ignoring invalid SOCIAL_CONNECT_STATE_EXPIRY_SECONDS"),
            }
        }
        if let Some(v) = lookup("SOCIAL_CONNECT_HTTP_TIMEOUT_SECONDS") {
            match v.parse::<u64>() {
                Ok(n) => self.oauth.http_timeout_seconds = n,
                Err(_) => warn!(value = %v, "Ignoring invalid SOCIAL_CONNECT_HTTP_TIMEOUT_SECONDS"),
            }
        }

        for platform in Platform::ALL {
            let prefix = format!("SOCIAL_OAUTH_{}", platform.as_str().to_uppercase());
            let client_id = lookup(&format!("{}_CLIENT_ID", prefix));
            let client_secret = lookup(&format!("{}_CLIENT_SECRET", prefix));
            if let (Some(client_id), Some(client_secret)) = (client_id, client_secret) {
                self.providers.insert(
                    platform.as_str().to_string(),
                    ClientCredentials {
                        client_id,
                        client_secret,
                    },
                );
            }
        }
    }

    /// Rejects timing values the flow cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.oauth.state_expiry_seconds <= 0 {
            bail!(
                "oauth.state_expiry_seconds must be positive (got {})",
                self.oauth.state_expiry_seconds
            );
        }
        if self.oauth.state_cleanup_interval_seconds == 0 {
            bail!("oauth.state_cleanup_interval_seconds must be at least 1");
        }
        if self.oauth.http_timeout_seconds == 0 {
            bail!("oauth.http_timeout_seconds must be at least 1");
        }
        Ok(())
    }

    /// Builds the provider registry from the configured client credentials.
    ///
    /// Platforms without credentials are left out and report `not_configured`.
    pub fn provider_registry(&self) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        for (name, credentials) in &self.providers {
            match name.parse::<Platform>() {
                Ok(platform) => registry.insert(ProviderConfig::new(
                    platform,
                    &credentials.client_id,
                    &credentials.client_secret,
                )),
                Err(e) => warn!(provider = %name, error = %e, "Ignoring provider credentials"),
            }
        }
        registry
    }
}
