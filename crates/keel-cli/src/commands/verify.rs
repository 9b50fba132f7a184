use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use color_eyre::eyre::{eyre, Result};
use console::style;
use keel_core::{FixedDelay, VerificationRun};

use super::{build_verifier, conclude, until_interrupted};
use crate::artifact::{ArtifactLoader, HardhatArtifactLoader};
use crate::config::KeelConfig;
use crate::manifest::DeploymentManifest;
use crate::observer::ConsoleObserver;

/// Re-submit verification for the deployments recorded in the manifest
#[derive(Args)]
pub struct VerifyCommand {
    /// Network name from keel.toml
    #[arg(short, long)]
    pub network: String,

    /// Sleep for the propagation delay before the first submission
    #[arg(long)]
    pub wait: bool,
}

impl VerifyCommand {
    pub async fn run(self) -> Result<ExitCode> {
        let config = KeelConfig::load()?;
        let network = config.get_network(&self.network)?;
        let settings = &config.deploy;

        let manifest = DeploymentManifest::load(&settings.deployments_dir, &network.name)?;
        if manifest.deployments.is_empty() {
            return Err(eyre!(
                "The manifest of '{}' has no confirmed deployments",
                network.name
            ));
        }

        println!(
            "{} Verifying {} deployment(s) on {} (chain ID: {})",
            style("->").blue(),
            manifest.deployments.len(),
            style(&network.name).cyan(),
            manifest.chain_id
        );

        let loader: Arc<dyn ArtifactLoader> =
            Arc::new(HardhatArtifactLoader::new(&settings.artifacts_dir));
        let verifier = build_verifier(&network, settings, loader, true)?;

        let state = manifest.deployments.clone();
        let observer = ConsoleObserver::for_manifest(manifest, &settings.deployments_dir);

        let mut verification =
            VerificationRun::new(FixedDelay::new(settings.propagation_delay()), verifier);
        if let Some(deadline) = settings.deadline() {
            verification = verification.with_deadline(deadline);
        }
        let verification = verification.with_observer(observer);

        let report = until_interrupted(verification.run(state, self.wait)).await;
        Ok(conclude(report, verification.observer().manifest_error()))
    }
}
