use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::eyre::{eyre, Result};
use keel_core::{Registry, RetryConfig};
use serde::Deserialize;

pub const KEEL_CONFIG: &str = "keel.toml";

/// Gas limit used when a network does not set one
pub const DEFAULT_GAS_LIMIT: u64 = 21_000_000;
/// Gas price (wei) used when a network does not set one
pub const DEFAULT_GAS_PRICE: u128 = 80_000_000_000;
/// Environment variable holding the deployer's private key
pub const DEFAULT_PRIVATE_KEY_ENV: &str = "DEPLOYER_PRIVATE_KEY";

/// Project configuration file structure (keel.toml)
#[derive(Debug, Clone, Deserialize)]
pub struct KeelConfig {
    #[serde(default)]
    pub networks: HashMap<String, NetworkEntry>,
    #[serde(default)]
    pub deploy: DeploySettings,
    /// Artifacts in deployment order
    #[serde(default)]
    pub artifacts: Registry,
}

/// A `[networks.<name>]` table
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkEntry {
    pub url: String,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "default_gas_price")]
    pub gas_price: u128,
    #[serde(default)]
    pub verifier: Option<VerifierEntry>,
}

/// Etherscan-compatible explorer API of a network
#[derive(Debug, Clone, Deserialize)]
pub struct VerifierEntry {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// The `[deploy]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    /// Hardhat artifacts directory
    pub artifacts_dir: PathBuf,
    /// Where deployment manifests are written
    pub deployments_dir: PathBuf,
    pub propagation_delay_secs: u64,
    pub confirmation_timeout_secs: u64,
    pub verification_timeout_secs: u64,
    pub max_retries: u32,
    pub private_key_env: String,
    /// Optional bound on a whole run
    pub deadline_secs: Option<u64>,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("artifacts"),
            deployments_dir: PathBuf::from("deployments"),
            propagation_delay_secs: 60,
            confirmation_timeout_secs: 300,
            verification_timeout_secs: 180,
            max_retries: keel_core::retry::DEFAULT_MAX_RETRIES,
            private_key_env: DEFAULT_PRIVATE_KEY_ENV.to_string(),
            deadline_secs: None,
        }
    }
}

impl DeploySettings {
    pub fn propagation_delay(&self) -> Duration {
        Duration::from_secs(self.propagation_delay_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn verification_timeout(&self) -> Duration {
        Duration::from_secs(self.verification_timeout_secs)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    /// Backoff for explorer calls. Receipt polling reuses only its delays and
    /// is bounded by `confirmation_timeout_secs` instead.
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::default().with_max_attempts(self.max_retries)
    }

    /// Read the signing key from the configured environment variable
    pub fn private_key(&self) -> Result<String> {
        let key = std::env::var(&self.private_key_env).map_err(|_| {
            eyre!(
                "Environment variable '{}' with the deployer private key is not set",
                self.private_key_env
            )
        })?;

        // Normalize private key (add 0x prefix if missing)
        let key = key.trim();
        Ok(if key.starts_with("0x") {
            key.to_string()
        } else {
            format!("0x{}", key)
        })
    }
}

impl KeelConfig {
    /// Load configuration from keel.toml in the current directory
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(KEEL_CONFIG))
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| eyre!("Could not find {}. Is this a keel project?", path.display()))?;

        let config: KeelConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Get a network configuration by name, resolving environment variables
    pub fn get_network(&self, name: &str) -> Result<NetworkConfig> {
        let entry = self
            .networks
            .get(name)
            .ok_or_else(|| {
                eyre!(
                    "Network '{}' not found in [networks]. Available: {}",
                    name,
                    self.network_names().join(", ")
                )
            })?;

        let verifier = entry
            .verifier
            .as_ref()
            .map(|v| -> Result<VerifierConfig> {
                Ok(VerifierConfig {
                    api_url: resolve_env_var(&v.url)?,
                    api_key: v.api_key.as_deref().map(resolve_env_var).transpose()?,
                })
            })
            .transpose()?;

        Ok(NetworkConfig {
            name: name.to_string(),
            rpc_url: resolve_env_var(&entry.url)?,
            gas_limit: entry.gas_limit,
            gas_price: entry.gas_price,
            verifier,
        })
    }

    /// Get all network names, sorted
    pub fn network_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.networks.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Network configuration with environment references resolved
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub name: String,
    pub rpc_url: String,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub verifier: Option<VerifierConfig>,
}

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub api_url: String,
    pub api_key: Option<String>,
}

fn default_gas_limit() -> u64 {
    DEFAULT_GAS_LIMIT
}

fn default_gas_price() -> u128 {
    DEFAULT_GAS_PRICE
}

/// Resolve environment variable references in a string
/// Supports ${VAR_NAME} syntax
fn resolve_env_var(value: &str) -> Result<String> {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).map_err(|_| eyre!("Environment variable '{}' not set", var_name))
    } else {
        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::ArgRef;

    const CONFIG: &str = r#"
[networks.mumbai]
url = "${TEST_KEEL_MUMBAI_RPC}"
gas_limit = 21000000
gas_price = 80000000000

[networks.mumbai.verifier]
url = "https://api-testnet.polygonscan.com/api"
api_key = "${TEST_KEEL_POLYGONSCAN_KEY}"

[networks.local]
url = "http://localhost:8545"

[deploy]
propagation_delay_secs = 0

[[artifacts]]
name = "France"
source = "contracts/Tokens.sol:France"

[[artifacts]]
name = "Brasil"
source = "contracts/Tokens.sol:Brasil"

[[artifacts]]
name = "Swap"
source = "contracts/Swap.sol:Swap"
args = [{ address_of = "France" }, { address_of = "Brasil" }]
"#;

    #[test]
    fn test_parse_config() {
        let config: KeelConfig = toml::from_str(CONFIG).unwrap();

        assert_eq!(config.network_names(), vec!["local", "mumbai"]);
        assert_eq!(config.artifacts.len(), 3);
        assert!(config.artifacts.validate().is_ok());

        let swap = config.artifacts.get("Swap").unwrap();
        assert_eq!(
            swap.constructor_args,
            vec![ArgRef::address_of("France"), ArgRef::address_of("Brasil")]
        );

        assert_eq!(config.deploy.propagation_delay(), Duration::ZERO);
        assert_eq!(config.deploy.artifacts_dir, PathBuf::from("artifacts"));
        assert_eq!(config.deploy.private_key_env, DEFAULT_PRIVATE_KEY_ENV);
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: KeelConfig = toml::from_str("").unwrap();

        assert!(config.networks.is_empty());
        assert!(config.artifacts.is_empty());
        assert_eq!(config.deploy.propagation_delay(), Duration::from_secs(60));
        assert!(config.deploy.deadline().is_none());
    }

    #[test]
    fn test_get_network_with_verifier() {
        std::env::set_var("TEST_KEEL_MUMBAI_RPC", "https://rpc.mumbai.test");
        std::env::set_var("TEST_KEEL_POLYGONSCAN_KEY", "secret");

        let config: KeelConfig = toml::from_str(CONFIG).unwrap();
        let network = config.get_network("mumbai").unwrap();

        assert_eq!(network.name, "mumbai");
        assert_eq!(network.rpc_url, "https://rpc.mumbai.test");
        assert_eq!(network.gas_limit, 21_000_000);
        assert_eq!(network.gas_price, 80_000_000_000);

        let verifier = network.verifier.unwrap();
        assert_eq!(verifier.api_url, "https://api-testnet.polygonscan.com/api");
        assert_eq!(verifier.api_key.as_deref(), Some("secret"));

        std::env::remove_var("TEST_KEEL_MUMBAI_RPC");
        std::env::remove_var("TEST_KEEL_POLYGONSCAN_KEY");
    }

    #[test]
    fn test_get_network_defaults() {
        let config: KeelConfig = toml::from_str(CONFIG).unwrap();
        let network = config.get_network("local").unwrap();

        assert_eq!(network.rpc_url, "http://localhost:8545");
        assert_eq!(network.gas_limit, DEFAULT_GAS_LIMIT);
        assert_eq!(network.gas_price, DEFAULT_GAS_PRICE);
        assert!(network.verifier.is_none());
    }

    #[test]
    fn test_get_network_not_found() {
        let config: KeelConfig = toml::from_str(CONFIG).unwrap();
        let err = config.get_network("mainnet").unwrap_err();
        assert!(err.to_string().contains("Available: local, mumbai"));
    }

    #[test]
    fn test_private_key_normalized() {
        let settings = DeploySettings {
            private_key_env: "TEST_KEEL_PRIVATE_KEY".to_string(),
            ..Default::default()
        };

        std::env::set_var("TEST_KEEL_PRIVATE_KEY", "abcdef");
        assert_eq!(settings.private_key().unwrap(), "0xabcdef");

        std::env::set_var("TEST_KEEL_PRIVATE_KEY", "0xabcdef");
        assert_eq!(settings.private_key().unwrap(), "0xabcdef");

        std::env::remove_var("TEST_KEEL_PRIVATE_KEY");
        assert!(settings.private_key().is_err());
    }

    #[test]
    fn test_resolve_env_var() {
        std::env::set_var("TEST_KEEL_VAR_123", "resolved_value");
        assert_eq!(resolve_env_var("${TEST_KEEL_VAR_123}").unwrap(), "resolved_value");
        std::env::remove_var("TEST_KEEL_VAR_123");

        assert_eq!(
            resolve_env_var("https://literal.url").unwrap(),
            "https://literal.url"
        );
        assert!(resolve_env_var("${NONEXISTENT_KEEL_VAR_99999}").is_err());
    }
}
