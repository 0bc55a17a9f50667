mod chat_bridge;
mod pathfinding;
mod registry;
mod secrets;
mod server;
mod store;

pub use chat_bridge::*;
pub use pathfinding::*;
pub use registry::*;
pub use secrets::*;
pub use server::*;
pub use store::*;

use std::fmt;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chat_bridge: ChatBridgeConfig,
    #[serde(default)]
    pub pathfinding: PathfindingConfig,
}

impl Config {
    /// Load from a TOML file if present, then layer environment variable
    /// overrides on top for anything security-sensitive.
    pub fn load_from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw)
                .map_err(|e| crate::error::Error::Internal(format!("parsing {}: {e}", path.display())))?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Env vars always win over file config for anything that governs
    /// addressing or reconciliation cadence (spec §6).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PORT") {
            if let Ok(port) = v.parse() {
                self.server.port = port;
            }
        }
        for var in REGISTRY_URL_ENV_VARS {
            if let Ok(v) = std::env::var(var) {
                if !v.is_empty() {
                    self.registry.service_url = Some(v);
                    break;
                }
            }
        }
        if let Ok(v) = std::env::var("REGISTRY_SYNC_INTERVAL_MS") {
            if let Ok(ms) = v.parse() {
                self.registry.sync_interval_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("OFFICE_BASE_DOMAIN") {
            if !v.is_empty() {
                self.registry.base_domain = v;
            }
        }
        if let Ok(v) = std::env::var("DEFAULT_AGENT_VOICE_ID") {
            if !v.is_empty() {
                self.registry.default_voice_agent_id = v;
            }
        }
        if let Ok(v) = std::env::var("CHAT_BRIDGE_URL") {
            if !v.is_empty() {
                self.chat_bridge.url = v;
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues. An empty
    /// vec means everything looks good.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.server.port == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }
        if self.server.host.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        match &self.registry.service_url {
            None => issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "registry.service_url".into(),
                message: "no Registry URL configured — reconciliation and NPC secret \
                          resolution tiers 2/3 will be unavailable"
                    .into(),
            }),
            Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    field: "registry.service_url".into(),
                    message: format!("must start with http:// or https:// (got \"{url}\")"),
                });
            }
            Some(_) => {}
        }

        if self.registry.sync_interval_ms == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "registry.sync_interval_ms".into(),
                message: "must be greater than 0".into(),
            });
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_apart_from_missing_registry_url() {
        let config = Config::default();
        let issues = config.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, ConfigSeverity::Warning);
        assert_eq!(issues[0].field, "registry.service_url");
    }

    #[test]
    fn zero_port_is_an_error() {
        let mut config = Config::default();
        config.server.port = 0;
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.field == "server.port" && i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn bad_registry_url_is_an_error() {
        let mut config = Config::default();
        config.registry.service_url = Some("ftp://example.com".into());
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.field == "registry.service_url" && i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn load_from_missing_file_returns_defaults() {
        let config = Config::load_from_file(std::path::Path::new("/nonexistent/presence.toml"))
            .expect("defaults should load even without a file");
        assert_eq!(config.server.port, 3010);
    }
}
