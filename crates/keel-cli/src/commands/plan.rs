use std::process::ExitCode;

use clap::Args;
use color_eyre::eyre::{eyre, Result};
use console::style;
use keel_core::{json_to_sol_value, ArgRef, ArtifactSpec, EXIT_FAILURE, EXIT_SUCCESS};

use crate::artifact::{ArtifactLoader, HardhatArtifactLoader};
use crate::config::KeelConfig;

/// Validate the artifact registry and show the deployment plan
#[derive(Args)]
pub struct PlanCommand {
    /// Also resolve and show this network's settings
    #[arg(short, long)]
    pub network: Option<String>,
}

impl PlanCommand {
    pub async fn run(self) -> Result<ExitCode> {
        let config = KeelConfig::load()?;
        config.artifacts.validate()?;

        if let Some(name) = &self.network {
            let network = config.get_network(name)?;
            println!("{} Network {}", style("->").blue(), style(&network.name).cyan());
            println!("   RPC:       {}", network.rpc_url);
            println!("   Gas limit: {}", network.gas_limit);
            println!("   Gas price: {} wei", network.gas_price);
            match &network.verifier {
                Some(verifier) => println!("   Verifier:  {}", verifier.api_url),
                None => println!("   Verifier:  {}", style("none").dim()),
            }
            println!();
        }

        if config.artifacts.is_empty() {
            return Err(eyre!("No [[artifacts]] declared in keel.toml"));
        }

        let loader = HardhatArtifactLoader::new(&config.deploy.artifacts_dir);
        let mut problems = 0;

        println!("{} Deployment order", style("->").blue());
        for (index, spec) in config.artifacts.iter().enumerate() {
            let args: Vec<String> = spec.constructor_args.iter().map(describe_arg).collect();
            println!(
                "   {}. {}({}) {}",
                index + 1,
                style(&spec.name).cyan(),
                args.join(", "),
                style(&spec.source_locator).dim()
            );

            for problem in check_artifact(&loader, spec) {
                println!("      {} {}", style("!").yellow(), problem);
                problems += 1;
            }
        }

        println!();
        if problems > 0 {
            println!(
                "{} {} problem(s) found",
                style("x").red().bold(),
                problems
            );
            return Ok(ExitCode::from(EXIT_FAILURE));
        }

        println!(
            "{} {} artifact(s) ready to deploy",
            style("*").green().bold(),
            config.artifacts.len()
        );
        Ok(ExitCode::from(EXIT_SUCCESS))
    }
}

fn describe_arg(arg: &ArgRef) -> String {
    match arg {
        ArgRef::AddressOf { address_of } => format!("address_of({})", address_of),
        ArgRef::Literal(value) => value.to_string(),
    }
}

/// Check an artifact's build output against its argument template
fn check_artifact(loader: &dyn ArtifactLoader, spec: &ArtifactSpec) -> Vec<String> {
    let artifact = match loader.load(&spec.source_locator) {
        Ok(artifact) => artifact,
        Err(e) => return vec![e.to_string()],
    };

    let mut problems = Vec::new();

    if artifact.contract_name != spec.source_parts().map(|(_, c)| c).unwrap_or_default() {
        problems.push(format!(
            "artifact declares contract '{}' ({})",
            artifact.contract_name, artifact.source_name
        ));
    }

    match artifact.creation_code() {
        Ok(code) if code.is_empty() => problems.push("artifact has no creation code".to_string()),
        Ok(_) => {}
        Err(e) => problems.push(e.to_string()),
    }

    let inputs = match artifact.parsed_abi() {
        Ok(abi) => abi.constructor_inputs(),
        Err(e) => {
            problems.push(e.to_string());
            return problems;
        }
    };

    if inputs.len() != spec.constructor_args.len() {
        problems.push(format!(
            "constructor takes {} argument(s), {} given",
            inputs.len(),
            spec.constructor_args.len()
        ));
        return problems;
    }

    for (input, arg) in inputs.iter().zip(&spec.constructor_args) {
        match arg {
            ArgRef::AddressOf { address_of } if input.param_type != "address" => {
                problems.push(format!(
                    "'{}' is {} but receives the address of {}",
                    input.name, input.param_type, address_of
                ))
            }
            ArgRef::AddressOf { .. } => {}
            ArgRef::Literal(value) => {
                if let Err(e) = json_to_sol_value(&input.param_type, value) {
                    problems.push(format!("'{}': {}", input.name, e));
                }
            }
        }
    }

    problems
}
