//! Bluegreen Orchestrations - blue/green deployment of a containerized app
//! behind a cloud load balancer.
//!
//! This crate provides multi-step flows (orchestrations) built from atomic,
//! idempotent control-plane steps (activities), all running against a
//! [`Provider`] implementation.
//!
//! # Usage
//!
//! ```rust,no_run
//! use bluegreen_orchestrations::{blue_green_deploy, DeployConfig, HttpProvider};
//!
//! # async fn example(config: DeployConfig) -> anyhow::Result<()> {
//! let endpoint = "https://control-plane.example.com";
//! let provider = HttpProvider::new(endpoint, "token", &config.compartment_id)?;
//! let outcome = blue_green_deploy(&provider, &config).await?;
//! println!("traffic now on {}", outcome.backend);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod poll;
pub mod provider;
pub mod provider_client;
pub mod types;

pub mod activities;
pub mod orchestrations;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use config::{DatastoreConfig, DeployConfig, Provenance, Sizing, Timeouts};
pub use error::{DeployError, ProviderError};
pub use orchestrations::blue_green::blue_green_deploy;
pub use provider::Provider;
pub use provider_client::HttpProvider;
pub use types::*;
