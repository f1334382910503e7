//! Read-only and single-step commands: targets, retire, addresses

use anyhow::Result;
use bluegreen_models::AddressKind;
use bluegreen_orchestrations::activities::resolve_address::resolve_addresses;
use bluegreen_orchestrations::activities::resolve_targets::resolve_targets;
use bluegreen_orchestrations::activities::retire_target::{retire_target, RetireOutcome};

use crate::cli::OutputFormat;
use crate::commands::{connect, env_lookup};
use crate::config;
use crate::lock::RunLock;

pub async fn run_targets(output: OutputFormat) -> Result<()> {
    let settings = config::load_inspect(env_lookup)?;
    let name = settings.name.as_str();
    let provider = connect(&settings.api)?;
    let targets = resolve_targets(&provider, name, &settings.timeouts).await?;

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
        return Ok(());
    }

    println!("{:<40} {:<10} {:<22} {}", "ID", "STATE", "CREATED", "IMAGE");
    println!("{}", "-".repeat(100));
    for target in &targets {
        let created = target
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        let image = if target.images.is_empty() {
            "-".to_string()
        } else {
            target.images.join(", ")
        };
        println!("{:<40} {:<10} {:<22} {}", target.id, target.state, created, image);
    }
    println!();
    println!("{} target(s) found for '{}'", targets.len(), name);
    if targets.len() > 1 {
        println!("Newest first; the next deploy updates {} and retires the rest", targets[0].id);
    }
    Ok(())
}

pub async fn run_retire(target_id: String) -> Result<()> {
    let settings = config::load_inspect(env_lookup)?;
    let _lock = RunLock::acquire(&crate::state_dir().join("locks"), &settings.name)?;
    let provider = connect(&settings.api)?;

    println!("Retiring target {}...", target_id);
    match retire_target(&provider, &target_id, &settings.timeouts).await? {
        RetireOutcome::Retired => println!("✓ Target {} deleted", target_id),
        RetireOutcome::AlreadyGone => println!("Target {} was already gone", target_id),
    }
    Ok(())
}

pub async fn run_addresses(target_id: String, output: OutputFormat) -> Result<()> {
    let settings = config::load_inspect(env_lookup)?;
    let provider = connect(&settings.api)?;
    let kinds = [AddressKind::Private, AddressKind::Public];
    let addresses = resolve_addresses(&provider, &target_id, &kinds).await;

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&addresses)?),
        OutputFormat::Table => {
            println!("Target: {}", target_id);
            let private = addresses.private_address.as_deref().unwrap_or("-");
            let public = addresses.public_address.as_deref().unwrap_or("-");
            println!("  Private Address:    {}", private);
            println!("  Public Address:     {}", public);
        }
    }
    Ok(())
}
