//! In-memory provider used by unit and scenario tests.
//!
//! Mimics an eventually-consistent control plane: mutations return operation
//! handles that report IN_PROGRESS once before completing, targets show their
//! transitional state on the first read after a mutation, and newly created
//! backends can stay invisible for a configurable number of reads.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use bluegreen_models::{
    BackendEntry, BackendHealth, BackendKey, BackendSetRef, LifecycleState, MutationReceipt,
    NetworkInterface, OperationError, OperationHandle, OperationStatus, TargetSpec,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::Provider;

/// Every call made against the fake, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListTargets(String),
    GetTarget(String),
    CreateTarget(String),
    UpdateTarget(String, String),
    DeleteTarget(String),
    GetOperation(String),
    ListOperationErrors(String),
    ListInterfaces(String),
    GetInterface(String),
    ListBackends,
    CreateBackend(BackendKey),
    DeleteBackend(BackendKey),
    GetBackend(BackendKey),
    GetBackendHealth(BackendKey),
}

/// Mutating calls that can be made to fail transiently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutation {
    CreateTarget,
    UpdateTarget,
    DeleteTarget,
    CreateBackend,
    DeleteBackend,
}

/// Envelope used when answering `list_targets`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListShape {
    Array,
    Data,
    DataItems,
}

#[derive(Debug, Clone)]
struct FakeTarget {
    name: String,
    state: LifecycleState,
    created_at: DateTime<Utc>,
    images: Vec<String>,
    /// Reads left before a transitional state settles
    pending_reads: u32,
    extras: serde_json::Map<String, Value>,
    interfaces: Vec<NetworkInterface>,
    /// State still reported for this many reads after a delete
    stale: Option<(LifecycleState, u32)>,
}

#[derive(Debug)]
struct FakeState {
    targets: BTreeMap<String, FakeTarget>,
    next_id: u32,
    calls: Vec<Call>,
    list_shape: ListShape,
    page_size: Option<usize>,
    update_ignores_image: bool,
    hide_images: bool,
    omit_operations: bool,
    fail_operations: bool,
    fail_next_operation: bool,
    omit_created_ids: bool,
    failing_target_deletes: HashSet<String>,
    operations: HashMap<String, VecDeque<OperationStatus>>,
    operation_errors: Vec<OperationError>,
    network_interfaces: HashMap<String, NetworkInterface>,
    backends: BTreeMap<BackendKey, BackendHealth>,
    new_backend_health: BackendHealth,
    invisible_reads: u32,
    pending_visibility: HashMap<BackendKey, u32>,
    failing_backend_deletes: HashSet<BackendKey>,
    backend_counts: Vec<usize>,
    transient_failures: HashMap<Mutation, u32>,
    stale_delete_reads: u32,
    retry_tokens: Vec<String>,
}

pub struct FakeProvider {
    state: Mutex<FakeState>,
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap_or_else(Utc::now)
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                targets: BTreeMap::new(),
                next_id: 1,
                calls: Vec::new(),
                list_shape: ListShape::Array,
                page_size: None,
                update_ignores_image: false,
                hide_images: false,
                omit_operations: false,
                fail_operations: false,
                fail_next_operation: false,
                omit_created_ids: false,
                failing_target_deletes: HashSet::new(),
                operations: HashMap::new(),
                operation_errors: Vec::new(),
                network_interfaces: HashMap::new(),
                backends: BTreeMap::new(),
                new_backend_health: BackendHealth::Ok,
                invisible_reads: 0,
                pending_visibility: HashMap::new(),
                failing_backend_deletes: HashSet::new(),
                backend_counts: Vec::new(),
                transient_failures: HashMap::new(),
                stale_delete_reads: 0,
                retry_tokens: Vec::new(),
            }),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    // ------------------------------------------------------------------
    // Seeding and behaviour knobs
    // ------------------------------------------------------------------

    /// Seed a target created `minutes` after the fake's epoch
    pub fn add_target(
        &self,
        id: &str,
        name: &str,
        image: &str,
        state: LifecycleState,
        minutes: i64,
    ) {
        self.with_state(|s| {
            s.targets.insert(
                id.to_string(),
                FakeTarget {
                    name: name.to_string(),
                    state,
                    created_at: base_time() + Duration::minutes(minutes),
                    images: vec![image.to_string()],
                    pending_reads: 0,
                    extras: serde_json::Map::new(),
                    interfaces: Vec::new(),
                    stale: None,
                },
            );
        });
    }

    /// Merge extra fields into a target's descriptor
    pub fn set_descriptor_extras(&self, id: &str, extras: Value) {
        self.with_state(|s| {
            if let (Some(target), Value::Object(map)) = (s.targets.get_mut(id), extras) {
                target.extras.extend(map);
            }
        });
    }

    pub fn add_target_interface(&self, target_id: &str, interface: NetworkInterface) {
        self.with_state(|s| {
            if let Some(target) = s.targets.get_mut(target_id) {
                target.interfaces.push(interface);
            }
        });
    }

    pub fn add_network_interface(&self, interface: NetworkInterface) {
        self.with_state(|s| {
            if let Some(id) = interface.id.clone() {
                s.network_interfaces.insert(id, interface);
            }
        });
    }

    pub fn add_backend(&self, backend: BackendKey, health: BackendHealth) {
        self.with_state(|s| {
            s.backends.insert(backend, health);
        });
    }

    pub fn set_list_shape(&self, shape: ListShape) {
        self.with_state(|s| s.list_shape = shape);
    }

    /// Answer list calls in pages of `size` (implies the paginated envelope)
    pub fn set_page_size(&self, size: usize) {
        self.with_state(|s| s.page_size = Some(size));
    }

    /// Accept updates without actually replacing the running container
    pub fn set_update_ignores_image(&self, ignore: bool) {
        self.with_state(|s| s.update_ignores_image = ignore);
    }

    /// Leave the container image out of every descriptor
    pub fn set_hide_images(&self, hide: bool) {
        self.with_state(|s| s.hide_images = hide);
    }

    /// Mutations answer without an operation handle
    pub fn set_omit_operations(&self, omit: bool) {
        self.with_state(|s| s.omit_operations = omit);
    }

    pub fn set_fail_operations(&self, fail: bool, errors: Vec<OperationError>) {
        self.with_state(|s| {
            s.fail_operations = fail;
            s.operation_errors = errors;
        });
    }

    /// Only the next operation handed out ends FAILED
    pub fn fail_next_operation(&self) {
        self.with_state(|s| s.fail_next_operation = true);
    }

    /// Create calls answer without the new target's id
    pub fn set_omit_created_ids(&self, omit: bool) {
        self.with_state(|s| s.omit_created_ids = omit);
    }

    pub fn fail_target_delete(&self, id: &str) {
        self.with_state(|s| {
            s.failing_target_deletes.insert(id.to_string());
        });
    }

    /// The next `times` calls of `mutation` answer with a 503
    pub fn fail_transiently(&self, mutation: Mutation, times: u32) {
        self.with_state(|s| {
            s.transient_failures.insert(mutation, times);
        });
    }

    /// After a delete, reads keep reporting the pre-delete state this many times
    pub fn set_stale_delete_reads(&self, reads: u32) {
        self.with_state(|s| s.stale_delete_reads = reads);
    }

    pub fn set_new_backend_health(&self, health: BackendHealth) {
        self.with_state(|s| s.new_backend_health = health);
    }

    /// Newly created backends answer NotFound for this many direct reads
    pub fn set_invisible_reads(&self, reads: u32) {
        self.with_state(|s| s.invisible_reads = reads);
    }

    pub fn fail_backend_delete(&self, backend: BackendKey) {
        self.with_state(|s| {
            s.failing_backend_deletes.insert(backend);
        });
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn calls(&self) -> Vec<Call> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.with_state(|s| s.calls.iter().filter(|c| pred(c)).count())
    }

    pub fn target_ids(&self) -> Vec<String> {
        self.with_state(|s| s.targets.keys().cloned().collect())
    }

    pub fn target_images(&self, id: &str) -> Option<Vec<String>> {
        self.with_state(|s| s.targets.get(id).map(|t| t.images.clone()))
    }

    pub fn target_state(&self, id: &str) -> Option<LifecycleState> {
        self.with_state(|s| s.targets.get(id).map(|t| t.state))
    }

    pub fn backend_keys(&self) -> BTreeSet<BackendKey> {
        self.with_state(|s| s.backends.keys().cloned().collect())
    }

    /// Retry tokens sent with create calls, in order
    pub fn retry_tokens(&self) -> Vec<String> {
        self.with_state(|s| s.retry_tokens.clone())
    }

    /// Backend-set size recorded after every backend mutation
    pub fn backend_counts(&self) -> Vec<usize> {
        self.with_state(|s| s.backend_counts.clone())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn descriptor(state: &FakeState, id: &str, target: &FakeTarget) -> Value {
        let mut value = json!({
            "id": id,
            "displayName": target.name,
            "lifecycleState": target.state.as_str(),
            "timeCreated": target.created_at.to_rfc3339(),
            "freeformTags": {},
        });
        if !state.hide_images {
            value["containers"] = Value::Array(
                target.images.iter().map(|image| json!({ "imageUrl": image })).collect(),
            );
        }
        if let Value::Object(map) = &mut value {
            map.extend(target.extras.clone());
        }
        value
    }

    fn new_operation(state: &mut FakeState, id: Option<String>) -> MutationReceipt {
        if state.omit_operations {
            return MutationReceipt {
                resource_id: id,
                operation: None,
            };
        }
        let handle = format!("op-{}", state.next_id);
        state.next_id += 1;
        let fail_this = std::mem::take(&mut state.fail_next_operation);
        let terminal = if state.fail_operations || fail_this {
            OperationStatus::Failed
        } else {
            OperationStatus::Succeeded
        };
        state
            .operations
            .insert(handle.clone(), VecDeque::from([OperationStatus::InProgress, terminal]));
        MutationReceipt {
            resource_id: id,
            operation: Some(OperationHandle(handle)),
        }
    }

    fn injected_failure(state: &mut FakeState, mutation: Mutation) -> ProviderResult<()> {
        match state.transient_failures.get_mut(&mutation) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(ProviderError::Transient("HTTP 503".to_string()))
            }
            _ => Ok(()),
        }
    }

    fn record_backend_count(state: &mut FakeState) {
        let count = state.backends.len();
        state.backend_counts.push(count);
    }
}

#[async_trait]
impl Provider for FakeProvider {
    async fn list_targets(&self, name_filter: &str, page: Option<&str>) -> ProviderResult<Value> {
        self.with_state(|s| {
            s.calls.push(Call::ListTargets(name_filter.to_string()));
            let s: &FakeState = s;
            let all: Vec<Value> = s
                .targets
                .iter()
                .filter(|(_, t)| t.name == name_filter)
                .map(|(id, t)| Self::descriptor(s, id, t))
                .collect();

            if let Some(size) = s.page_size {
                let offset: usize = page.and_then(|p| p.parse().ok()).unwrap_or(0);
                let items: Vec<Value> = all.iter().skip(offset).take(size).cloned().collect();
                let mut envelope = json!({ "data": { "items": items } });
                if offset + size < all.len() {
                    envelope["opc-next-page"] = Value::String((offset + size).to_string());
                }
                return Ok(envelope);
            }

            Ok(match s.list_shape {
                ListShape::Array => Value::Array(all),
                ListShape::Data => json!({ "data": all }),
                ListShape::DataItems => json!({ "data": { "items": all } }),
            })
        })
    }

    async fn get_target(&self, target_id: &str) -> ProviderResult<Value> {
        self.with_state(|s| {
            s.calls.push(Call::GetTarget(target_id.to_string()));
            let Some(target) = s.targets.get_mut(target_id) else {
                return Err(ProviderError::not_found(format!("target {}", target_id)));
            };

            if let Some((shown, left)) = target.stale {
                target.stale = (left > 1).then_some((shown, left - 1));
                let mut stale = target.clone();
                stale.state = shown;
                return Ok(Self::descriptor(s, target_id, &stale));
            }

            if target.pending_reads > 0 {
                target.pending_reads -= 1;
            } else {
                match target.state {
                    LifecycleState::Creating | LifecycleState::Updating => {
                        target.state = LifecycleState::Active
                    }
                    LifecycleState::Deleting => {
                        s.targets.remove(target_id);
                        return Err(ProviderError::not_found(format!("target {}", target_id)));
                    }
                    _ => {}
                }
            }

            let target = s.targets.get(target_id).cloned();
            match target {
                Some(target) => Ok(Self::descriptor(s, target_id, &target)),
                None => Err(ProviderError::not_found(format!("target {}", target_id))),
            }
        })
    }

    async fn create_target(
        &self,
        spec: &TargetSpec,
        retry_token: &str,
    ) -> ProviderResult<MutationReceipt> {
        self.with_state(|s| {
            s.calls.push(Call::CreateTarget(spec.image.clone()));
            s.retry_tokens.push(retry_token.to_string());
            Self::injected_failure(s, Mutation::CreateTarget)?;
            let id = format!("target-new-{}", s.next_id);
            s.next_id += 1;
            let created_at =
                base_time() + Duration::days(1) + Duration::minutes(i64::from(s.next_id));
            s.targets.insert(
                id.clone(),
                FakeTarget {
                    name: spec.display_name.clone(),
                    state: LifecycleState::Creating,
                    created_at,
                    images: vec![spec.image.clone()],
                    pending_reads: 1,
                    extras: serde_json::Map::new(),
                    interfaces: Vec::new(),
                    stale: None,
                },
            );
            let reported_id = if s.omit_created_ids { None } else { Some(id) };
            Ok(Self::new_operation(s, reported_id))
        })
    }

    async fn update_target(
        &self,
        target_id: &str,
        spec: &TargetSpec,
    ) -> ProviderResult<MutationReceipt> {
        self.with_state(|s| {
            s.calls.push(Call::UpdateTarget(target_id.to_string(), spec.image.clone()));
            Self::injected_failure(s, Mutation::UpdateTarget)?;
            let ignore_image = s.update_ignores_image;
            let Some(target) = s.targets.get_mut(target_id) else {
                return Err(ProviderError::not_found(format!("target {}", target_id)));
            };
            if target.state == LifecycleState::Failed {
                return Err(ProviderError::Api {
                    status: 409,
                    message: format!("target {} is FAILED", target_id),
                });
            }
            target.state = LifecycleState::Updating;
            target.pending_reads = 1;
            if !ignore_image {
                target.images = vec![spec.image.clone()];
            }
            Ok(Self::new_operation(s, Some(target_id.to_string())))
        })
    }

    async fn delete_target(&self, target_id: &str) -> ProviderResult<MutationReceipt> {
        self.with_state(|s| {
            s.calls.push(Call::DeleteTarget(target_id.to_string()));
            Self::injected_failure(s, Mutation::DeleteTarget)?;
            if s.failing_target_deletes.contains(target_id) {
                return Err(ProviderError::Api {
                    status: 409,
                    message: format!("target {} is protected", target_id),
                });
            }
            let stale_reads = s.stale_delete_reads;
            let Some(target) = s.targets.get_mut(target_id) else {
                return Err(ProviderError::not_found(format!("target {}", target_id)));
            };
            if stale_reads > 0 {
                target.stale = Some((target.state, stale_reads));
            }
            target.state = LifecycleState::Deleting;
            target.pending_reads = 1;
            Ok(Self::new_operation(s, Some(target_id.to_string())))
        })
    }

    async fn get_operation_status(
        &self,
        operation: &OperationHandle,
    ) -> ProviderResult<OperationStatus> {
        self.with_state(|s| {
            s.calls.push(Call::GetOperation(operation.0.clone()));
            let Some(script) = s.operations.get_mut(operation.as_str()) else {
                return Err(ProviderError::not_found(format!("operation {}", operation)));
            };
            let status = script.front().copied().unwrap_or(OperationStatus::Succeeded);
            if script.len() > 1 {
                script.pop_front();
            }
            Ok(status)
        })
    }

    async fn list_operation_errors(
        &self,
        operation: &OperationHandle,
    ) -> ProviderResult<Vec<OperationError>> {
        self.with_state(|s| {
            s.calls.push(Call::ListOperationErrors(operation.0.clone()));
            Ok(s.operation_errors.clone())
        })
    }

    async fn list_network_interfaces_for_target(
        &self,
        target_id: &str,
    ) -> ProviderResult<Vec<NetworkInterface>> {
        self.with_state(|s| {
            s.calls.push(Call::ListInterfaces(target_id.to_string()));
            s.targets
                .get(target_id)
                .map(|t| t.interfaces.clone())
                .ok_or_else(|| ProviderError::not_found(format!("target {}", target_id)))
        })
    }

    async fn get_network_interface(&self, interface_id: &str) -> ProviderResult<NetworkInterface> {
        self.with_state(|s| {
            s.calls.push(Call::GetInterface(interface_id.to_string()));
            s.network_interfaces.get(interface_id).cloned().ok_or_else(|| {
                ProviderError::not_found(format!("network interface {}", interface_id))
            })
        })
    }

    async fn list_backends(&self, _set: &BackendSetRef) -> ProviderResult<Vec<BackendEntry>> {
        self.with_state(|s| {
            s.calls.push(Call::ListBackends);
            Ok(s
                .backends
                .iter()
                .map(|(key, health)| BackendEntry {
                    key: key.clone(),
                    health: *health,
                })
                .collect())
        })
    }

    async fn create_backend(
        &self,
        _set: &BackendSetRef,
        backend: &BackendKey,
        retry_token: &str,
    ) -> ProviderResult<MutationReceipt> {
        self.with_state(|s| {
            s.calls.push(Call::CreateBackend(backend.clone()));
            s.retry_tokens.push(retry_token.to_string());
            Self::injected_failure(s, Mutation::CreateBackend)?;
            let health = s.new_backend_health;
            s.backends.insert(backend.clone(), health);
            let invisible = s.invisible_reads;
            if invisible > 0 {
                s.pending_visibility.insert(backend.clone(), invisible);
            }
            Self::record_backend_count(s);
            Ok(Self::new_operation(s, None))
        })
    }

    async fn delete_backend(
        &self,
        _set: &BackendSetRef,
        backend: &BackendKey,
    ) -> ProviderResult<MutationReceipt> {
        self.with_state(|s| {
            s.calls.push(Call::DeleteBackend(backend.clone()));
            Self::injected_failure(s, Mutation::DeleteBackend)?;
            if s.failing_backend_deletes.contains(backend) {
                return Err(ProviderError::Api {
                    status: 409,
                    message: format!("backend {} is locked", backend),
                });
            }
            if s.backends.remove(backend).is_none() {
                return Err(ProviderError::not_found(format!("backend {}", backend)));
            }
            Self::record_backend_count(s);
            Ok(Self::new_operation(s, None))
        })
    }

    async fn get_backend(
        &self,
        _set: &BackendSetRef,
        backend: &BackendKey,
    ) -> ProviderResult<BackendEntry> {
        self.with_state(|s| {
            s.calls.push(Call::GetBackend(backend.clone()));
            if let Some(left) = s.pending_visibility.get_mut(backend) {
                if *left > 0 {
                    *left -= 1;
                    return Err(ProviderError::not_found(format!("backend {}", backend)));
                }
            }
            s.backends
                .get(backend)
                .map(|health| BackendEntry {
                    key: backend.clone(),
                    health: *health,
                })
                .ok_or_else(|| ProviderError::not_found(format!("backend {}", backend)))
        })
    }

    async fn get_backend_health(
        &self,
        _set: &BackendSetRef,
        backend: &BackendKey,
    ) -> ProviderResult<BackendHealth> {
        self.with_state(|s| {
            s.calls.push(Call::GetBackendHealth(backend.clone()));
            Ok(s.backends.get(backend).copied().unwrap_or(BackendHealth::NotFound))
        })
    }
}
