use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::Result;
use bluegreen_orchestrations::DeployError;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod config;
mod lock;

use cli::{Args, Command};
use config::{ConfigError, Overrides};

/// Local state directory (~/.bluegreen): logs and run locks
pub(crate) fn state_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".bluegreen")
}

/// Initialize tracing with two outputs:
/// 1. Console (stderr) - progress while the command runs
/// 2. File (~/.bluegreen/deploy.log) - appended record of every run
///
/// The returned guard flushes the file writer when dropped.
fn initialize_tracing() -> Result<WorkerGuard> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,bluegreen_orchestrations=debug,bluegreen_deployer=debug".into());

    let dir = state_dir();
    std::fs::create_dir_all(&dir)?;
    let file_appender = tracing_appender::rolling::never(&dir, "deploy.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let file_layer = fmt::layer().with_writer(file_writer).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

/// 2 for configuration problems, 1 for everything else
fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if cause.downcast_ref::<ConfigError>().is_some() {
            return 2;
        }
        if let Some(deploy) = cause.downcast_ref::<DeployError>() {
            return deploy.exit_code();
        }
    }
    1
}

/// What the operator sees when a command fails
fn failure_message(err: &anyhow::Error, elapsed: Duration) -> String {
    format!("{:#} (failed after {}s)", err, elapsed.as_secs())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let started = Instant::now();

    let _guard = match initialize_tracing() {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("⚠️  File logging disabled: {:#}", e);
            None
        }
    };

    let result = match args.command {
        Command::Deploy {
            image,
            strategy,
            no_cleanup_duplicates,
            no_fallback,
            traffic_address,
            smoke_path,
            output,
        } => {
            let overrides = Overrides {
                image,
                strategy: strategy.map(Into::into),
                no_cleanup_duplicates,
                no_fallback,
                traffic_address: traffic_address.map(Into::into),
                smoke_path,
            };
            commands::deploy::run_deploy(overrides, output).await
        }
        Command::Targets { output } => commands::inspect::run_targets(output).await,
        Command::Retire { target_id } => commands::inspect::run_retire(target_id).await,
        Command::Addresses { target_id, output } => {
            commands::inspect::run_addresses(target_id, output).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = failure_message(&e, started.elapsed());
            tracing::error!("{}", message);
            eprintln!("✗ {}", message);
            ExitCode::from(exit_code(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let missing =
            anyhow::Error::new(ConfigError::Missing(vec!["BLUEGREEN_NAME".to_string()]));
        assert_eq!(exit_code(&missing), 2);

        let config = anyhow::Error::new(DeployError::Configuration("bad template".to_string()));
        assert_eq!(exit_code(&config), 2);

        let verification = anyhow::Error::new(DeployError::Verification {
            target_id: "T1".to_string(),
            expected: "app:2".to_string(),
            reported: Vec::new(),
        });
        assert_eq!(exit_code(&verification), 1);

        let wrapped =
            anyhow::Error::new(ConfigError::Missing(Vec::new())).context("loading settings");
        assert_eq!(exit_code(&wrapped), 2);

        assert_eq!(exit_code(&anyhow::anyhow!("lock held")), 1);
    }

    #[test]
    fn test_failure_message_includes_elapsed_time() {
        let err = anyhow::anyhow!("health gate closed").context("deploying app");
        let message = failure_message(&err, Duration::from_millis(95_400));
        assert_eq!(message, "deploying app: health gate closed (failed after 95s)");
    }
}
