mod artifact;
mod commands;
mod config;
mod deployer;
mod etherscan;
mod manifest;
mod observer;
mod rpc;

use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Command;

#[derive(Parser)]
#[command(name = "keel")]
#[command(about = "Ordered contract deployment and explorer verification for Hardhat projects")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    // Secrets usually live in .env next to keel.toml
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keel=info,keel_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    cli.command.run().await
}
