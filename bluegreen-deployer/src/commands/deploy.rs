use anyhow::Result;
use bluegreen_models::DeploymentOutcome;
use bluegreen_orchestrations::blue_green_deploy;

use crate::cli::OutputFormat;
use crate::commands::{connect, env_lookup};
use crate::config::{self, Overrides};
use crate::lock::RunLock;

pub async fn run_deploy(overrides: Overrides, output: OutputFormat) -> Result<()> {
    let (api, config) = config::load_deploy(env_lookup, &overrides)?;
    let lock = RunLock::acquire(&crate::state_dir().join("locks"), &config.name)?;
    tracing::info!(
        deployment = %config.name,
        run_id = %config.provenance.run_id,
        lock = %lock.path().display(),
        "Bluegreen deployer"
    );

    let provider = connect(&api)?;
    let outcome = blue_green_deploy(&provider, &config).await?;

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Table => print_outcome(&outcome),
    }
    Ok(())
}

fn print_outcome(outcome: &DeploymentOutcome) {
    let phases: Vec<String> = outcome.phases.iter().map(|p| format!("{:?}", p)).collect();

    println!("Deployment: {} (run {})", outcome.deployment_name, outcome.run_id);
    println!("{}", "=".repeat(60));
    println!();
    println!("Target:");
    println!("  ID:                 {}", outcome.target_id);
    println!("  Image:              {}", outcome.image);
    println!("  Strategy:           {}", outcome.strategy);
    if outcome.replaced_via_fallback {
        println!("  Fallback:           in-place update failed, replaced");
    }
    println!("  Phases:             {}", phases.join(" -> "));
    println!();
    println!("Network:");
    let private = outcome.addresses.private_address.as_deref().unwrap_or("-");
    let public = outcome.addresses.public_address.as_deref().unwrap_or("-");
    println!("  Private Address:    {}", private);
    println!("  Public Address:     {}", public);
    println!("  Backend:            {}", outcome.backend);
    println!();
    println!("Cleanup:");
    for id in &outcome.retired_target_ids {
        println!("  Retired target:     {}", id);
    }
    for backend in &outcome.removed_backends {
        println!("  Removed backend:    {}", backend);
    }
    if outcome.retired_target_ids.is_empty() && outcome.removed_backends.is_empty() {
        println!("  (nothing to clean up)");
    }
    if !outcome.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &outcome.warnings {
            println!("  - {}", warning);
        }
    }
    println!();
    println!("Completed in {}s", outcome.elapsed_seconds);
}
