//! Gateway configuration
//!
//! Read from TOML, then overridden by `SQLPANEL_*` environment variables.
//!
//! ```toml
//! bind_address = "127.0.0.1:8080"
//! cors_enabled = true
//!
//! [security]
//! api_key = "change-me"
//! ip_whitelist = ["127.0.0.1"]
//! rate_limit_per_minute = 60
//! trust_forwarded_for = false
//!
//! [database]
//! host = "localhost"
//! port = 3306
//! user = "root"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use sqlpanel::engine::ProfileDefaults;

use crate::error::GatewayError;

/// Main gateway configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Server bind address
    pub bind_address: String,

    /// Enable CORS
    pub cors_enabled: bool,

    pub security: SecurityConfig,

    /// Connection fields used when a request leaves them out
    pub database: ProfileDefaults,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            cors_enabled: true,
            security: SecurityConfig::default(),
            database: ProfileDefaults::default(),
        }
    }
}

/// Access control for `/api`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Required `X-API-Key` value; `None` disables the check
    pub api_key: Option<String>,
    /// Allowed client addresses; empty allows all
    pub ip_whitelist: Vec<String>,
    /// Requests per client per minute; 0 disables limiting
    pub rate_limit_per_minute: u32,
    /// Take the client address from `X-Forwarded-For` instead of the peer.
    /// Only safe behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            ip_whitelist: Vec::new(),
            rate_limit_per_minute: 60,
            trust_forwarded_for: false,
        }
    }
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("ip_whitelist", &self.ip_whitelist)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .finish()
    }
}

impl GatewayConfig {
    /// Create a new configuration builder
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    pub fn from_toml_str(text: &str) -> Result<Self, GatewayError> {
        toml::from_str(text).map_err(|e| GatewayError::config(format!("Invalid config: {}", e)))
    }

    /// Default config location: `<config dir>/sqlpanel/gateway.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sqlpanel").join("gateway.toml"))
    }

    /// Load from `path`, else the default location when it exists, else
    /// defaults; then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, GatewayError> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path().filter(|p| p.exists()),
        };

        let mut config = match path {
            Some(path) => {
                tracing::info!("Loading config from: {}", path.display());
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| GatewayError::config(format!("Cannot read {}: {}", path.display(), e)))?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `SQLPANEL_*` overrides from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), GatewayError> {
        if let Some(addr) = lookup("SQLPANEL_BIND") {
            self.bind_address = addr;
        }
        if let Some(key) = lookup("SQLPANEL_API_KEY") {
            self.security.api_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Some(host) = lookup("SQLPANEL_DB_HOST") {
            self.database.host = Some(host);
        }
        if let Some(port) = lookup("SQLPANEL_DB_PORT") {
            let port = port
                .parse()
                .map_err(|_| GatewayError::config(format!("SQLPANEL_DB_PORT is not a port: {}", port)))?;
            self.database.port = Some(port);
        }
        if let Some(user) = lookup("SQLPANEL_DB_USER") {
            self.database.user = Some(user);
        }
        if let Some(password) = lookup("SQLPANEL_DB_PASS") {
            self.database.password = Some(password);
        }
        Ok(())
    }
}

/// Builder for GatewayConfig
#[derive(Debug, Default)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    /// Set the bind address
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.config.bind_address = addr.into();
        self
    }

    pub fn cors(mut self, enabled: bool) -> Self {
        self.config.cors_enabled = enabled;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.security.api_key = Some(key.into());
        self
    }

    pub fn ip_whitelist(mut self, addresses: Vec<String>) -> Self {
        self.config.security.ip_whitelist = addresses;
        self
    }

    pub fn rate_limit(mut self, per_minute: u32) -> Self {
        self.config.security.rate_limit_per_minute = per_minute;
        self
    }

    /// Trust `X-Forwarded-For` from a reverse proxy
    pub fn trust_forwarded_for(mut self, trust: bool) -> Self {
        self.config.security.trust_forwarded_for = trust;
        self
    }

    /// Set the fallback connection fields
    pub fn database(mut self, defaults: ProfileDefaults) -> Self {
        self.config.database = defaults;
        self
    }

    /// Build the configuration
    pub fn build(self) -> GatewayConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let config = GatewayConfig::from_toml_str(
            r#"
            bind_address = "0.0.0.0:9000"

            [security]
            api_key = "k"
            ip_whitelist = ["10.0.0.1"]

            [database]
            host = "db"
            port = 3307
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:9000");
        assert!(config.cors_enabled);
        assert_eq!(config.security.api_key.as_deref(), Some("k"));
        assert_eq!(config.security.rate_limit_per_minute, 60);
        assert!(!config.security.trust_forwarded_for);
        assert_eq!(config.database.host.as_deref(), Some("db"));
        assert_eq!(config.database.port, Some(3307));
    }

    #[test]
    fn test_trust_forwarded_for() {
        let config = GatewayConfig::from_toml_str("[security]\ntrust_forwarded_for = true").unwrap();
        assert!(config.security.trust_forwarded_for);
        assert!(GatewayConfig::builder().trust_forwarded_for(true).build().security.trust_forwarded_for);
    }

    #[test]
    fn test_wrong_value_type_is_rejected() {
        assert!(GatewayConfig::from_toml_str("cors_enabled = \"maybe\"").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = GatewayConfig::default();
        config
            .apply_env(|key| match key {
                "SQLPANEL_BIND" => Some("0.0.0.0:1".to_string()),
                "SQLPANEL_DB_PORT" => Some("3310".to_string()),
                "SQLPANEL_DB_PASS" => Some("pw".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:1");
        assert_eq!(config.database.port, Some(3310));
        assert_eq!(config.database.password.as_deref(), Some("pw"));

        let bad = config.apply_env(|key| (key == "SQLPANEL_DB_PORT").then(|| "x".to_string()));
        assert!(bad.is_err());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = GatewayConfig::builder().api_key("secret-key").build();
        assert!(!format!("{:?}", config).contains("secret-key"));
    }
}
