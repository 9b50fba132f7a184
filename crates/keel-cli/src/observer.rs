//! Console progress output and manifest persistence during a run

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use console::style;
use keel_core::{
    DeploymentRecord, Registry, RunObserver, RunStage, RunState, VerificationOutcome,
    VerificationResult,
};

use crate::manifest::DeploymentManifest;

/// Prints each stage and keeps `deployments/<network>.json` current
pub struct ConsoleObserver {
    names: Vec<String>,
    manifest: Mutex<DeploymentManifest>,
    dir: PathBuf,
    /// Last write failure; cleared by the next successful write
    manifest_error: Mutex<Option<String>>,
}

impl ConsoleObserver {
    pub fn new(registry: &Registry, manifest: DeploymentManifest, dir: impl Into<PathBuf>) -> Self {
        Self {
            names: registry.iter().map(|s| s.name.clone()).collect(),
            manifest: Mutex::new(manifest),
            dir: dir.into(),
            manifest_error: Mutex::new(None),
        }
    }

    /// For verification of an existing manifest
    pub fn for_manifest(manifest: DeploymentManifest, dir: impl Into<PathBuf>) -> Self {
        Self {
            names: manifest
                .deployments
                .iter()
                .map(|r| r.name.clone())
                .collect(),
            manifest: Mutex::new(manifest),
            dir: dir.into(),
            manifest_error: Mutex::new(None),
        }
    }

    fn name(&self, index: usize) -> &str {
        self.names.get(index).map(String::as_str).unwrap_or("?")
    }

    /// Why the manifest on disk is behind the run, if it is
    pub fn manifest_error(&self) -> Option<String> {
        self.manifest_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, apply: impl FnOnce(&mut DeploymentManifest)) {
        // Every save writes the whole manifest, so a poisoned lock still holds usable data
        let mut manifest = self.manifest.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut manifest);

        let failure = match manifest.save(&self.dir) {
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to write deployment manifest");
                Some(format!("{:#}", e))
            }
        };
        *self.manifest_error.lock().unwrap_or_else(PoisonError::into_inner) = failure;
    }
}

impl RunObserver for ConsoleObserver {
    fn on_stage(&self, stage: &RunStage) {
        match stage {
            RunStage::Idle | RunStage::Done => {}
            RunStage::Deploying(i) => println!(
                "{} Deploying {} ({}/{})...",
                style("->").blue(),
                style(self.name(*i)).cyan(),
                i + 1,
                self.names.len()
            ),
            RunStage::Propagating => println!(
                "{} Waiting for the explorer to index the deployments...",
                style("->").blue()
            ),
            RunStage::Verifying(i) => println!(
                "{} Verifying {}...",
                style("->").blue(),
                style(self.name(*i)).cyan()
            ),
            RunStage::Failed { stage, cause } => println!(
                "{} Failed during {}: {}",
                style("x").red().bold(),
                stage,
                cause
            ),
        }
    }

    fn on_deployed(&self, record: &DeploymentRecord, state: &RunState) {
        println!(
            "   {} {} deployed at {}",
            style("*").green(),
            style(&record.name).cyan(),
            style(record.address).yellow()
        );
        self.update(|manifest| manifest.deployments = state.clone());
    }

    fn on_verified(&self, result: &VerificationResult) {
        match &result.outcome {
            VerificationOutcome::Verified => {
                println!("   {} {} verified", style("*").green(), style(&result.name).cyan())
            }
            VerificationOutcome::AlreadyVerified => println!(
                "   {} {} already verified",
                style("*").green(),
                style(&result.name).cyan()
            ),
            VerificationOutcome::Failed(reason) => println!(
                "   {} {} not verified: {}",
                style("!").yellow(),
                style(&result.name).cyan(),
                reason
            ),
        }

        self.update(|manifest| {
            manifest.verifications.retain(|v| v.name != result.name);
            manifest.verifications.push(result.clone());
        });
    }
}
