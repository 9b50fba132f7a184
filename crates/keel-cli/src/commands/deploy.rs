use std::process::ExitCode;
use std::sync::Arc;

use alloy::primitives::utils::format_ether;
use clap::Args;
use color_eyre::eyre::{eyre, Result};
use console::style;
use dialoguer::Confirm;
use keel_core::{FixedDelay, Orchestrator, EXIT_SUCCESS};

use super::{build_verifier, conclude, until_interrupted};
use crate::artifact::{ArtifactLoader, HardhatArtifactLoader};
use crate::config::KeelConfig;
use crate::deployer::AlloyDeployer;
use crate::manifest::DeploymentManifest;
use crate::observer::ConsoleObserver;
use crate::rpc::{max_cost, preflight, Preflight};

/// Deploy every artifact in order, then verify them on the explorer
#[derive(Args)]
pub struct DeployCommand {
    /// Network name from keel.toml
    #[arg(short, long)]
    pub network: String,

    /// Stop after the last deployment is confirmed
    #[arg(long)]
    pub no_verify: bool,

    /// Do not ask for confirmation before broadcasting
    #[arg(short, long)]
    pub yes: bool,
}

impl DeployCommand {
    pub async fn run(self) -> Result<ExitCode> {
        let config = KeelConfig::load()?;
        let network = config.get_network(&self.network)?;
        let settings = &config.deploy;

        // Ordering problems must surface before any transaction is sent
        config.artifacts.validate()?;
        if config.artifacts.is_empty() {
            return Err(eyre!("No [[artifacts]] declared in keel.toml"));
        }

        let loader: Arc<dyn ArtifactLoader> =
            Arc::new(HardhatArtifactLoader::new(&settings.artifacts_dir));
        let deployer = AlloyDeployer::new(&network, &settings.private_key()?, loader.clone())?
            .with_retry(settings.retry())
            .with_confirmation_timeout(settings.confirmation_timeout());
        let verifier = build_verifier(&network, settings, loader, !self.no_verify)?;

        println!(
            "{} Connecting to {}...",
            style("->").blue(),
            style(&network.name).cyan()
        );
        let Preflight { chain_id, balance } = preflight(&network.rpc_url, deployer.from()).await?;

        println!(
            "{} Deploying {} artifact(s) to {} (chain ID: {}) from {}",
            style("->").blue(),
            config.artifacts.len(),
            style(&network.name).cyan(),
            chain_id,
            style(deployer.from()).yellow()
        );
        println!("   Balance: {} ETH", format_ether(balance));

        let cost = max_cost(network.gas_limit, network.gas_price, config.artifacts.len());
        if balance < cost {
            println!(
                "   {} Balance is below the worst-case fee of {} ETH",
                style("!").yellow(),
                format_ether(cost)
            );
        }

        for spec in &config.artifacts {
            println!("   {} {}", style(&spec.name).cyan(), style(&spec.source_locator).dim());
        }
        println!();

        if !self.yes {
            let confirmed = Confirm::new()
                .with_prompt("Broadcast these deployments?")
                .default(false)
                .interact()?;

            if !confirmed {
                println!("{} Cancelled", style("*").dim());
                return Ok(ExitCode::from(EXIT_SUCCESS));
            }
        }

        let observer = ConsoleObserver::new(
            &config.artifacts,
            DeploymentManifest::new(&network.name, chain_id),
            &settings.deployments_dir,
        );

        let mut orchestrator = Orchestrator::new(
            config.artifacts.clone(),
            deployer,
            FixedDelay::new(settings.propagation_delay()),
            verifier,
        )
        .skip_verification(self.no_verify);
        if let Some(deadline) = settings.deadline() {
            orchestrator = orchestrator.with_deadline(deadline);
        }
        let orchestrator = orchestrator.with_observer(observer);

        let report = until_interrupted(orchestrator.run()).await;

        if report.as_ref().is_some_and(|r| !r.deployments.is_empty()) {
            println!(
                "   Manifest: {}",
                style(
                    DeploymentManifest::path(&settings.deployments_dir, &network.name).display()
                )
                .dim()
            );
        }

        Ok(conclude(report, orchestrator.observer().manifest_error()))
    }
}
