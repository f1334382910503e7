//! Error types for the deployment orchestrator

use std::time::Duration;

use bluegreen_models::{AddressKind, LifecycleState, OperationStatus};
use thiserror::Error;

/// Failure talking to the provider control plane
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// Network failure, throttling or a 5xx; may succeed on retry
    #[error("transient provider failure: {0}")]
    Transient(String),

    #[error("provider API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Errors surfaced by orchestration runs
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(
        "target {target_id} did not verify: expected image {expected}, provider reports {}",
        reported_images(.reported)
    )]
    Verification {
        target_id: String,
        expected: String,
        reported: Vec<String>,
    },

    #[error(
        "timed out after {}s waiting for {what} on {resource} (last state: {last_state})",
        .elapsed.as_secs()
    )]
    Timeout {
        what: String,
        resource: String,
        last_state: String,
        elapsed: Duration,
    },

    #[error("operation {operation} on {resource} ended {status}: {detail}")]
    OperationFailed {
        operation: String,
        resource: String,
        status: OperationStatus,
        detail: String,
    },

    #[error("target {target_id} entered {state} while waiting for {expected}")]
    UnexpectedState {
        target_id: String,
        state: LifecycleState,
        expected: String,
    },

    #[error("no {kind} address could be resolved for target {target_id}")]
    AddressUnavailable { target_id: String, kind: AddressKind },

    #[error("smoke test against {url} failed: {detail}")]
    SmokeTest { url: String, detail: String },

    #[error("cleanup incomplete: {}", .failures.join("; "))]
    PartialCleanup { failures: Vec<String> },
}

fn reported_images(reported: &[String]) -> String {
    if reported.is_empty() {
        "no image".to_string()
    } else {
        reported.join(", ")
    }
}

impl DeployError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            _ => 1,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Provider(e) if e.is_transient())
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;
