//! Configuration module for mintdesk
//!
//! Loads `mintdesk.toml` (if present), then applies environment overrides.
//! Every field has a default so an empty file, or no file, is valid.

use crate::network::{EndpointResolver, Network};
use crate::retry::RetryPolicy;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "mintdesk.toml";

pub const ENV_NETWORK: &str = "MINTDESK_NETWORK";
pub const ENV_RPC_URL: &str = "MINTDESK_RPC_URL";
pub const ENV_STORE: &str = "MINTDESK_STORE";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub deploy: DeployConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network used when the CLI is not given `--network`
    #[serde(default)]
    pub default: Network,

    /// Endpoint overrides (e.g. a private RPC or local validator)
    #[serde(default)]
    pub devnet_url: Option<String>,

    #[serde(default)]
    pub mainnet_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Attempts per retried phase
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between mint-creation attempts
    #[serde(default = "default_mint_retry_delay_ms")]
    pub mint_retry_delay_ms: u64,

    /// Delay between initial-supply attempts
    #[serde(default = "default_supply_retry_delay_ms")]
    pub supply_retry_delay_ms: u64,

    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,

    /// Signature status polling interval while confirming
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of the client store
    #[serde(default = "default_storage_path")]
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable ones
    #[serde(default)]
    pub json: bool,
}

// Default value functions
fn default_max_attempts() -> u32 { 3 }
fn default_mint_retry_delay_ms() -> u64 { 3_000 }
fn default_supply_retry_delay_ms() -> u64 { 2_000 }
fn default_confirm_timeout_secs() -> u64 { 45 }
fn default_poll_interval_ms() -> u64 { 500 }
fn default_storage_path() -> String { ".mintdesk".to_string() }

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            mint_retry_delay_ms: default_mint_retry_delay_ms(),
            supply_retry_delay_ms: default_supply_retry_delay_ms(),
            confirm_timeout_secs: default_confirm_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl DeployConfig {
    pub fn mint_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_attempts, Duration::from_millis(self.mint_retry_delay_ms))
    }

    pub fn supply_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_attempts, Duration::from_millis(self.supply_retry_delay_ms))
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;
        Ok(config)
    }

    /// Load `path` if it exists (defaults otherwise), then apply `.env` and
    /// `MINTDESK_*` overrides and validate
    pub fn load(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup`; `MINTDESK_RPC_URL` targets the
    /// default network after `MINTDESK_NETWORK` is applied
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(network) = lookup(ENV_NETWORK) {
            self.network.default = network
                .parse()
                .with_context(|| format!("Invalid {}", ENV_NETWORK))?;
        }
        if let Some(url) = lookup(ENV_RPC_URL) {
            match self.network.default {
                Network::Devnet => self.network.devnet_url = Some(url),
                Network::Mainnet => self.network.mainnet_url = Some(url),
            }
        }
        if let Some(path) = lookup(ENV_STORE) {
            self.storage.path = path;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.deploy.max_attempts == 0 {
            bail!("deploy.max_attempts must be at least 1");
        }
        if self.deploy.confirm_timeout_secs == 0 {
            bail!("deploy.confirm_timeout_secs must be greater than 0");
        }
        if self.deploy.poll_interval_ms == 0 {
            bail!("deploy.poll_interval_ms must be greater than 0");
        }
        for (name, url) in [
            ("network.devnet_url", &self.network.devnet_url),
            ("network.mainnet_url", &self.network.mainnet_url),
        ] {
            if let Some(url) = url {
                url::Url::parse(url).with_context(|| format!("Invalid {}: '{}'", name, url))?;
            }
        }
        if self.storage.path.trim().is_empty() {
            bail!("storage.path must not be empty");
        }
        Ok(())
    }

    pub fn endpoint_resolver(&self) -> EndpointResolver {
        let mut resolver = EndpointResolver::new();
        if let Some(url) = &self.network.devnet_url {
            resolver = resolver.with_override(Network::Devnet, url.clone());
        }
        if let Some(url) = &self.network.mainnet_url {
            resolver = resolver.with_override(Network::Mainnet, url.clone());
        }
        resolver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.network.default, Network::Devnet);
        assert_eq!(config.deploy.max_attempts, 3);
        assert_eq!(config.deploy.mint_retry_delay_ms, 3_000);
        assert_eq!(config.deploy.supply_retry_delay_ms, 2_000);
        assert_eq!(config.deploy.confirm_timeout(), Duration::from_secs(45));
        assert_eq!(config.storage.path, ".mintdesk");
        assert!(!config.logging.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_sections() {
        let config: Config = toml::from_str(
            r#"
            [network]
            default = "mainnet"
            mainnet_url = "https://rpc.example.org"

            [deploy]
            max_attempts = 5
            confirm_timeout_secs = 30

            [logging]
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(config.network.default, Network::Mainnet);
        assert_eq!(config.deploy.max_attempts, 5);
        assert_eq!(config.deploy.poll_interval_ms, 500);
        assert!(config.logging.json);
        assert_eq!(
            config.endpoint_resolver().resolve(Network::Mainnet),
            "https://rpc.example.org"
        );
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_overrides(env(&[
                (ENV_NETWORK, "mainnet-beta"),
                (ENV_RPC_URL, "http://127.0.0.1:8899"),
                (ENV_STORE, "/tmp/mintdesk-store"),
            ]))
            .unwrap();
        assert_eq!(config.network.default, Network::Mainnet);
        assert_eq!(config.network.mainnet_url.as_deref(), Some("http://127.0.0.1:8899"));
        assert!(config.network.devnet_url.is_none());
        assert_eq!(config.storage.path, "/tmp/mintdesk-store");
    }

    #[test]
    fn test_env_rejects_unknown_network() {
        let mut config = Config::default();
        assert!(config
            .apply_env_overrides(env(&[(ENV_NETWORK, "testnet")]))
            .is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.deploy.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.deploy.confirm_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.network.devnet_url = Some("::not a url::".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mintdesk.toml");
        std::fs::write(&path, "[deploy]\nmax_attempts = 2\n").unwrap();
        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.deploy.max_attempts, 2);
        assert_eq!(config.deploy.mint_retry_policy().max_attempts, 2);
    }
}
