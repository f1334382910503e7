//! Output types for the orchestrations

use bluegreen_models::{BackendKey, DeployPhase, DeploymentTarget};
use serde::{Deserialize, Serialize};

// ============================================================================
// Deploy Target Orchestration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetDeployment {
    /// The single ACTIVE target now running the desired image
    pub target: DeploymentTarget,
    /// Update could not be verified and replace took over
    pub replaced_via_fallback: bool,
    /// Phases entered, in order
    pub phases: Vec<DeployPhase>,
    /// Targets deleted during this run
    pub retired_target_ids: Vec<String>,
    /// Older targets left running after an in-place update; retired only
    /// once traffic has moved
    pub duplicate_target_ids: Vec<String>,
}

// ============================================================================
// Cutover Orchestration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CutoverReport {
    pub backend: BackendKey,
    /// False if the backend was already registered
    pub created: bool,
    pub removed: Vec<BackendKey>,
    /// Backends that could not be removed, with the reason
    pub removal_failures: Vec<(BackendKey, String)>,
}
