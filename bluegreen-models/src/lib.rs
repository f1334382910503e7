//! Shared data model for blue/green deployments: compute targets, backend
//! entries, long-running operations and the outcome of a run.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ============================================================================
// Deployment Targets
// ============================================================================

/// Lifecycle state of a compute target as reported by the provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Creating,
    Active,
    Updating,
    Deleting,
    Deleted,
    Failed,
    Unknown,
}

impl LifecycleState {
    /// Parse a provider state string; anything unrecognized is `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CREATING" => Self::Creating,
            "ACTIVE" => Self::Active,
            "UPDATING" => Self::Updating,
            "DELETING" => Self::Deleting,
            "DELETED" => Self::Deleted,
            "FAILED" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "CREATING",
            Self::Active => "ACTIVE",
            Self::Updating => "UPDATING",
            Self::Deleting => "DELETING",
            Self::Deleted => "DELETED",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Deleted or on its way there
    pub fn is_gone_or_going(&self) -> bool {
        matches!(self, Self::Deleting | Self::Deleted)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted | Self::Failed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A provisioned compute runtime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentTarget {
    /// Provider-assigned identifier (immutable)
    pub id: String,
    /// Logical deployment name used for matching
    pub name: String,
    pub state: LifecycleState,
    pub created_at: Option<DateTime<Utc>>,
    /// Container images reported by the provider (may lag behind updates)
    pub images: Vec<String>,
    /// Free-form tags, including provenance
    pub tags: BTreeMap<String, String>,
}

impl DeploymentTarget {
    /// Build a target from a raw provider descriptor.
    ///
    /// Accepts both camelCase and snake_case field spellings. Returns `None`
    /// when the descriptor carries no identifier.
    pub fn from_descriptor(raw: &Value) -> Option<Self> {
        let id = string_field(raw, &["id", "identifier"])?;
        let name = string_field(raw, &["displayName", "display_name", "name"]).unwrap_or_default();
        let state = string_field(raw, &["lifecycleState", "lifecycle_state", "state"])
            .map(|s| LifecycleState::parse(&s))
            .unwrap_or(LifecycleState::Unknown);
        let created_keys = ["timeCreated", "time_created", "createdAt", "created_at"];
        let created_at = string_field(raw, &created_keys)
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc));

        let mut images = Vec::new();
        if let Some(containers) = raw.get("containers").and_then(Value::as_array) {
            for container in containers {
                if let Some(image) = string_field(container, &["imageUrl", "image_url", "image"]) {
                    images.push(image);
                }
            }
        }
        if images.is_empty() {
            if let Some(image) = string_field(raw, &["imageUrl", "image_url", "image"]) {
                images.push(image);
            }
        }

        let tags = raw
            .get("freeformTags")
            .or_else(|| raw.get("freeform_tags"))
            .or_else(|| raw.get("tags"))
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            id,
            name,
            state,
            created_at,
            images,
            tags,
        })
    }
}

/// First non-empty string value among `keys`
pub fn string_field(raw: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| raw.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Payload for creating or updating a compute target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetSpec {
    pub compartment_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_domain: Option<String>,
    pub subnet_id: String,
    pub shape: String,
    pub ocpus: f32,
    pub memory_gb: f32,
    pub image: String,
    pub container_port: u16,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub freeform_tags: BTreeMap<String, String>,
}

// ============================================================================
// Network
// ============================================================================

/// A network interface attached to a compute target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NetworkInterface {
    pub id: Option<String>,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
}

/// Which address of a target receives traffic
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    #[default]
    Private,
    Public,
}

impl AddressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Best-effort addresses of a target; either may be absent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ResolvedAddresses {
    pub private_address: Option<String>,
    pub public_address: Option<String>,
}

impl ResolvedAddresses {
    pub fn get(&self, kind: AddressKind) -> Option<&str> {
        match kind {
            AddressKind::Private => self.private_address.as_deref(),
            AddressKind::Public => self.public_address.as_deref(),
        }
    }

    pub fn has(&self, kind: AddressKind) -> bool {
        self.get(kind).is_some()
    }

    /// Fill `kind` only if it is still missing
    pub fn fill(&mut self, kind: AddressKind, address: Option<String>) {
        let slot = match kind {
            AddressKind::Private => &mut self.private_address,
            AddressKind::Public => &mut self.public_address,
        };
        if slot.is_none() {
            *slot = address;
        }
    }
}

// ============================================================================
// Backend Sets
// ============================================================================

/// Reference to a backend set on a traffic router
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendSetRef {
    pub load_balancer_id: String,
    pub name: String,
}

impl fmt::Display for BackendSetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.load_balancer_id, self.name)
    }
}

/// Identity of a backend: the (address, port) pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendKey {
    pub address: String,
    pub port: u16,
}

impl BackendKey {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for BackendKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Health of a backend as observed through the traffic router
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackendHealth {
    Ok,
    Warning,
    Critical,
    Unknown,
    /// The router does not know the backend yet (eventual consistency)
    NotFound,
}

impl BackendHealth {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OK" => Self::Ok,
            "WARNING" => Self::Warning,
            "CRITICAL" => Self::Critical,
            "NOT_FOUND" | "NOTFOUND" => Self::NotFound,
            _ => Self::Unknown,
        }
    }

    /// WARNING still receives traffic, so it counts as serving.
    pub fn is_serving(&self) -> bool {
        matches!(self, Self::Ok | Self::Warning)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Unknown => "UNKNOWN",
            Self::NotFound => "NOT_FOUND",
        }
    }
}

impl fmt::Display for BackendHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A backend registered in a backend set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendEntry {
    pub key: BackendKey,
    pub health: BackendHealth,
}

// ============================================================================
// Long-Running Operations
// ============================================================================

/// Handle to an asynchronous provider-side mutation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct OperationHandle(pub String);

impl OperationHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    InProgress,
    Succeeded,
    Failed,
    Canceled,
}

impl OperationStatus {
    /// Provider spellings vary ("ACCEPTED", "IN_PROGRESS", "CANCELLED", ...)
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUCCEEDED" | "SUCCESS" | "COMPLETED" => Self::Succeeded,
            "FAILED" | "FAILURE" => Self::Failed,
            "CANCELED" | "CANCELLED" => Self::Canceled,
            _ => Self::InProgress,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        };
        f.pad(s)
    }
}

/// Structured error detail attached to a failed operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationError {
    pub code: String,
    pub message: String,
    pub timestamp: Option<String>,
}

/// What the provider returned for a mutation call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MutationReceipt {
    /// Identifier of the affected resource, when reported
    pub resource_id: Option<String>,
    /// Handle to track completion; `None` for synchronous-looking responses
    pub operation: Option<OperationHandle>,
}

// ============================================================================
// Deployment Outcome
// ============================================================================

/// How existing targets are brought to the desired image
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Mutate the newest target in place, verify, fall back to replace
    #[default]
    Update,
    /// Delete every matching target, then create a fresh one
    Replace,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Replace => "replace",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Phases of the deployment state machine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeployPhase {
    NoTarget,
    Resolving,
    Creating,
    Updating,
    Verifying,
    ReplaceFallback,
    Deployed,
    Failed,
}

/// Result of one orchestration run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentOutcome {
    pub run_id: Uuid,
    pub deployment_name: String,
    /// Identifier of the winning target
    pub target_id: String,
    pub image: String,
    pub strategy: Strategy,
    pub addresses: ResolvedAddresses,
    /// Backend registered for the winning target
    pub backend: BackendKey,
    pub replaced_via_fallback: bool,
    pub phases: Vec<DeployPhase>,
    pub retired_target_ids: Vec<String>,
    pub removed_backends: Vec<BackendKey>,
    /// Non-fatal problems (secondary cleanup, backend removal)
    pub warnings: Vec<String>,
    pub elapsed_seconds: u64,
}
