//! Hardhat artifact loading
//!
//! A source locator `contracts/Tokens.sol:France` maps to
//! `<artifacts>/contracts/Tokens.sol/France.json`. The sibling
//! `France.dbg.json` points at the build-info file holding the compiler
//! version and the standard JSON input used for verification.

use std::path::{Path, PathBuf};

use color_eyre::eyre::{eyre, Result, WrapErr};
use keel_core::{encode_constructor_args, Abi, Bytecode};
use serde::Deserialize;

// =============================================================================
// Types
// =============================================================================

/// A compiled contract artifact (`hh-sol-artifact-1`)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardhatArtifact {
    pub contract_name: String,
    pub source_name: String,
    pub abi: serde_json::Value,
    pub bytecode: String,
}

impl HardhatArtifact {
    pub fn parsed_abi(&self) -> keel_core::Result<Abi> {
        Abi::from_value(&self.abi)
    }

    pub fn creation_code(&self) -> keel_core::Result<Bytecode> {
        Bytecode::from_hex(&self.bytecode)
    }

    /// ABI-encode constructor arguments against this artifact's constructor
    pub fn encode_constructor_args(&self, args: &[serde_json::Value]) -> keel_core::Result<Vec<u8>> {
        let inputs = self.parsed_abi()?.constructor_inputs();
        encode_constructor_args(&inputs, args)
    }
}

/// Debug file pointing at the build-info of an artifact
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    build_info: String,
}

/// Compiler run that produced an artifact
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub solc_long_version: String,
    /// Standard JSON compiler input
    pub input: serde_json::Value,
}

impl BuildInfo {
    /// Compiler version as explorers expect it (`v0.8.17+commit.8df45f5f`)
    pub fn compiler_version(&self) -> String {
        format!("v{}", self.solc_long_version)
    }
}

// =============================================================================
// Trait Definition
// =============================================================================

/// Trait for loading contract artifacts by source locator
pub trait ArtifactLoader: Send + Sync {
    /// Load the compiled artifact
    fn load(&self, source_locator: &str) -> Result<HardhatArtifact>;

    /// Load the build-info the artifact was compiled in
    fn build_info(&self, source_locator: &str) -> Result<BuildInfo>;
}

// =============================================================================
// Filesystem Implementation
// =============================================================================

/// Artifact loader reading Hardhat build output
#[derive(Debug, Clone)]
pub struct HardhatArtifactLoader {
    artifacts_dir: PathBuf,
}

impl HardhatArtifactLoader {
    pub fn new(artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
        }
    }

    /// Directory holding `<Name>.json` for the given locator
    fn contract_dir(&self, source_locator: &str) -> Result<(PathBuf, String)> {
        let (source, contract) = source_locator
            .rsplit_once(':')
            .filter(|(path, name)| !path.is_empty() && !name.is_empty())
            .ok_or_else(|| {
                eyre!(
                    "Invalid source locator '{}', expected <path>:<contract>",
                    source_locator
                )
            })?;

        Ok((self.artifacts_dir.join(source), contract.to_string()))
    }

    fn artifact_path(&self, source_locator: &str) -> Result<PathBuf> {
        let (dir, contract) = self.contract_dir(source_locator)?;
        Ok(dir.join(format!("{}.json", contract)))
    }

    fn debug_path(&self, source_locator: &str) -> Result<PathBuf> {
        let (dir, contract) = self.contract_dir(source_locator)?;
        Ok(dir.join(format!("{}.dbg.json", contract)))
    }
}

impl ArtifactLoader for HardhatArtifactLoader {
    fn load(&self, source_locator: &str) -> Result<HardhatArtifact> {
        let path = self.artifact_path(source_locator)?;
        read_json(&path)
            .wrap_err_with(|| format!("Artifact not found for '{}'. Did you compile?", source_locator))
    }

    fn build_info(&self, source_locator: &str) -> Result<BuildInfo> {
        let debug_path = self.debug_path(source_locator)?;
        let debug: DebugFile = read_json(&debug_path)?;

        // buildInfo is relative to the debug file
        let base = debug_path.parent().unwrap_or_else(|| Path::new("."));
        read_json(&base.join(&debug.build_info))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&content).map_err(|e| eyre!("Failed to parse {}: {}", path.display(), e))
}
