//! CLI commands for keel

use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Subcommand;
use color_eyre::eyre::{eyre, Result};
use console::style;
use keel_core::{
    RunReport, RunStage, ServiceResponse, VerificationRequest, VerificationService, Verifier,
    EXIT_FAILURE,
};

use crate::artifact::ArtifactLoader;
use crate::config::{DeploySettings, NetworkConfig};
use crate::etherscan::EtherscanClient;

pub mod deploy;
pub mod plan;
pub mod verify;

/// All available CLI commands
#[derive(Subcommand)]
pub enum Command {
    /// Deploy every artifact in order, then verify them on the explorer
    Deploy(deploy::DeployCommand),

    /// Re-submit verification for the deployments recorded in the manifest
    Verify(verify::VerifyCommand),

    /// Validate the artifact registry and show the deployment plan
    Plan(plan::PlanCommand),
}

impl Command {
    /// Execute the command
    pub async fn run(self) -> Result<ExitCode> {
        match self {
            Command::Deploy(cmd) => cmd.run().await,
            Command::Verify(cmd) => cmd.run().await,
            Command::Plan(cmd) => cmd.run().await,
        }
    }
}

/// Stands in for the explorer on networks without a `[verifier]` table
struct NoVerifier {
    network: String,
}

#[async_trait::async_trait]
impl VerificationService for NoVerifier {
    async fn submit(&self, _request: &VerificationRequest) -> keel_core::Result<ServiceResponse> {
        Ok(ServiceResponse::Rejected(format!(
            "no verifier configured for network '{}'",
            self.network
        )))
    }
}

/// Build the verifier of a network.
///
/// Fails when verification is required but the network has no verifier.
fn build_verifier(
    network: &NetworkConfig,
    settings: &DeploySettings,
    loader: Arc<dyn ArtifactLoader>,
    required: bool,
) -> Result<Verifier<Box<dyn VerificationService>>> {
    let service: Box<dyn VerificationService> = match &network.verifier {
        Some(config) => {
            Box::new(EtherscanClient::new(config, loader).with_retry(settings.retry()))
        }
        None if required => {
            return Err(eyre!(
                "Network '{}' has no [networks.{}.verifier] table. Add one or pass --no-verify.",
                network.name,
                network.name
            ))
        }
        None => Box::new(NoVerifier {
            network: network.name.clone(),
        }),
    };

    Ok(Verifier::new(service)
        .with_retry(settings.retry())
        .with_timeout(settings.verification_timeout()))
}

/// Drive a run to completion unless the operator interrupts it
async fn until_interrupted(run: impl Future<Output = RunReport>) -> Option<RunReport> {
    tokio::select! {
        report = run => Some(report),
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Run interrupted");
            None
        }
    }
}

/// Print the outcome of a run and map it to the process exit code.
///
/// `manifest_error` is the reason the manifest on disk may be missing
/// confirmed deployments.
fn conclude(report: Option<RunReport>, manifest_error: Option<String>) -> ExitCode {
    println!();

    let Some(report) = report else {
        if manifest_error.is_none() {
            println!(
                "{} Interrupted. Confirmed deployments are kept in the manifest.",
                style("x").red().bold()
            );
        } else {
            println!("{} Interrupted.", style("x").red().bold());
        }
        warn_stale_manifest(manifest_error.as_deref());
        return ExitCode::from(EXIT_FAILURE);
    };

    match &report.stage {
        RunStage::Done => {
            let failed = report.failed_verifications().count();
            if failed == 0 {
                println!(
                    "{} {} contract(s) deployed, {} verified",
                    style("*").green().bold(),
                    report.deployments.len(),
                    report.verifications.len()
                );
            } else {
                println!(
                    "{} {} contract(s) deployed, {} of {} verification(s) failed",
                    style("!").yellow().bold(),
                    report.deployments.len(),
                    failed,
                    report.verifications.len()
                );
                println!(
                    "   Run {} to retry verification.",
                    style("keel verify --network <name>").yellow()
                );
            }
        }
        other => {
            println!("{} Run {}", style("x").red().bold(), other);
            if !report.deployments.is_empty() {
                println!(
                    "   {} contract(s) were confirmed before the failure",
                    report.deployments.len()
                );
            }
        }
    }
    warn_stale_manifest(manifest_error.as_deref());

    ExitCode::from(report.exit_code())
}

fn warn_stale_manifest(error: Option<&str>) {
    if let Some(error) = error {
        println!(
            "   {} The manifest could not be written ({}). It may be missing confirmed deployments.",
            style("!").yellow().bold(),
            error
        );
    }
}
