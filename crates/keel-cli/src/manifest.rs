//! Deployment manifest persisted under `deployments/<network>.json`

use std::path::{Path, PathBuf};

use color_eyre::eyre::{eyre, Result};
use keel_core::{RunState, VerificationResult};
use serde::{Deserialize, Serialize};

/// Confirmed deployments of one network, in deployment order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentManifest {
    pub network: String,
    pub chain_id: u64,
    pub deployments: RunState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verifications: Vec<VerificationResult>,
}

impl DeploymentManifest {
    pub fn new(network: impl Into<String>, chain_id: u64) -> Self {
        Self {
            network: network.into(),
            chain_id,
            deployments: RunState::new(),
            verifications: Vec::new(),
        }
    }

    pub fn path(dir: &Path, network: &str) -> PathBuf {
        dir.join(format!("{}.json", network))
    }

    /// Load the manifest of `network` from `dir`
    pub fn load(dir: &Path, network: &str) -> Result<Self> {
        let path = Self::path(dir, network);
        let content = std::fs::read_to_string(&path).map_err(|_| {
            eyre!(
                "No deployment manifest at {}. Run 'keel deploy --network {}' first.",
                path.display(),
                network
            )
        })?;
        let manifest: Self = serde_json::from_str(&content)
            .map_err(|e| eyre!("Failed to parse {}: {}", path.display(), e))?;

        if manifest.network != network {
            return Err(eyre!(
                "{} belongs to network '{}', not '{}'",
                path.display(),
                manifest.network,
                network
            ));
        }

        Ok(manifest)
    }

    /// Write the manifest to `dir`, replacing the previous file atomically
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = Self::path(dir, &self.network);
        let tmp = path.with_extension("json.tmp");

        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{Address, ArtifactSpec, DeploymentRecord, VerificationOutcome, B256};

    fn manifest() -> DeploymentManifest {
        let mut manifest = DeploymentManifest::new("mumbai", 80001);
        manifest.deployments.push(DeploymentRecord::confirmed(
            &ArtifactSpec::new("France", "contracts/Tokens.sol:France"),
            Vec::new(),
            Address::repeat_byte(1),
            B256::repeat_byte(1),
            Some(10),
        ));
        manifest.deployments.push(DeploymentRecord::confirmed(
            &ArtifactSpec::new("Swap", "contracts/Swap.sol:Swap"),
            vec![serde_json::json!(Address::repeat_byte(1).to_checksum(None))],
            Address::repeat_byte(2),
            B256::repeat_byte(2),
            Some(11),
        ));
        manifest
    }

    #[test]
    fn test_save_and_load() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("deployments");

        let path = manifest().save(&dir).unwrap();
        assert_eq!(path, dir.join("mumbai.json"));

        let loaded = DeploymentManifest::load(&dir, "mumbai").unwrap();
        assert_eq!(loaded, manifest());
        assert_eq!(loaded.deployments.names(), vec!["France", "Swap"]);
    }

    #[test]
    fn test_save_overwrites() {
        let temp = tempfile::tempdir().unwrap();

        DeploymentManifest::new("mumbai", 80001)
            .save(temp.path())
            .unwrap();

        let mut updated = manifest();
        updated.verifications.push(VerificationResult {
            name: "France".into(),
            address: Address::repeat_byte(1),
            outcome: VerificationOutcome::AlreadyVerified,
        });
        updated.save(temp.path()).unwrap();

        let loaded = DeploymentManifest::load(temp.path(), "mumbai").unwrap();
        assert_eq!(loaded.deployments.len(), 2);
        assert_eq!(
            loaded.verifications[0].outcome,
            VerificationOutcome::AlreadyVerified
        );
        assert!(!temp.path().join("mumbai.json.tmp").exists());
    }

    #[test]
    fn test_load_missing() {
        let temp = tempfile::tempdir().unwrap();
        let err = DeploymentManifest::load(temp.path(), "mumbai").unwrap_err();
        assert!(err.to_string().contains("keel deploy --network mumbai"));
    }

    #[test]
    fn test_load_rejects_other_network() {
        let temp = tempfile::tempdir().unwrap();
        manifest().save(temp.path()).unwrap();
        std::fs::rename(
            temp.path().join("mumbai.json"),
            temp.path().join("polygon.json"),
        )
        .unwrap();

        assert!(DeploymentManifest::load(temp.path(), "polygon").is_err());
    }
}
