use bluegreen_models::{AddressKind, Strategy};
use clap::{Parser, Subcommand, ValueEnum};

/// Bluegreen - blue/green deployments of a container app behind a load balancer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Deploy the configured image and cut traffic over to it
    Deploy {
        /// Container image to deploy (default: $BLUEGREEN_IMAGE)
        #[arg(long)]
        image: Option<String>,

        /// How existing targets are brought to the new image
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Leave older duplicate targets in place after an update
        #[arg(long)]
        no_cleanup_duplicates: bool,

        /// Fail instead of replacing when an update cannot be verified
        #[arg(long)]
        no_fallback: bool,

        /// Which target address receives traffic
        #[arg(long, value_enum)]
        traffic_address: Option<AddressArg>,

        /// HTTP path that must answer 2xx before cutover (e.g. "/health")
        #[arg(long)]
        smoke_path: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },

    /// List targets for the configured deployment name
    Targets {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },

    /// Delete a target and wait until it is gone
    Retire {
        /// Target identifier
        target_id: String,
    },

    /// Resolve the private and public addresses of a target
    Addresses {
        /// Target identifier
        target_id: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyArg {
    Update,
    Replace,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Update => Strategy::Update,
            StrategyArg::Replace => Strategy::Replace,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressArg {
    Private,
    Public,
}

impl From<AddressArg> for AddressKind {
    fn from(arg: AddressArg) -> Self {
        match arg {
            AddressArg::Private => AddressKind::Private,
            AddressArg::Public => AddressKind::Public,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_flags() {
        let args = Args::parse_from([
            "bluegreen-deployer",
            "deploy",
            "--strategy",
            "replace",
            "--no-fallback",
            "--traffic-address",
            "public",
            "-o",
            "json",
        ]);

        match args.command {
            Command::Deploy {
                strategy,
                no_fallback,
                no_cleanup_duplicates,
                traffic_address,
                output,
                ..
            } => {
                assert_eq!(strategy.map(Strategy::from), Some(Strategy::Replace));
                assert!(no_fallback);
                assert!(!no_cleanup_duplicates);
                assert_eq!(traffic_address.map(AddressKind::from), Some(AddressKind::Public));
                assert_eq!(output, OutputFormat::Json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_retire_requires_target_id() {
        assert!(Args::try_parse_from(["bluegreen-deployer", "retire"]).is_err());
        let args = Args::parse_from(["bluegreen-deployer", "retire", "ocid1.target.a"]);
        assert!(matches!(
            args.command,
            Command::Retire { target_id } if target_id == "ocid1.target.a"
        ));
    }
}
