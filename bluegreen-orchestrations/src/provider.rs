//! The cloud control-plane operations the orchestrator depends on.
//!
//! Implementations are expected to be thin: no retries, no waiting. Retry and
//! poll policy live in the activities so every wait point shares the same
//! timeout semantics. Mutations may be retried after a transient failure, so
//! they must be safe to repeat.

use async_trait::async_trait;
use bluegreen_models::{
    BackendEntry, BackendHealth, BackendKey, BackendSetRef, MutationReceipt, NetworkInterface,
    OperationError, OperationHandle, OperationStatus, TargetSpec,
};
use serde_json::Value;

use crate::error::ProviderResult;

#[async_trait]
pub trait Provider: Send + Sync {
    /// List compute targets whose name matches `name_filter`.
    ///
    /// The raw response is returned untouched: providers answer with a flat
    /// array, a `{data: [...]}` envelope or a paginated `{data: {items: [...]}}`
    /// envelope, and normalization is the resolver's job.
    async fn list_targets(
        &self,
        name_filter: &str,
        page: Option<&str>,
    ) -> ProviderResult<Value>;

    /// Raw descriptor of a single target
    async fn get_target(&self, target_id: &str) -> ProviderResult<Value>;

    /// `retry_token` stays the same across retries of one logical create so
    /// the provider can deduplicate them
    async fn create_target(
        &self,
        spec: &TargetSpec,
        retry_token: &str,
    ) -> ProviderResult<MutationReceipt>;

    async fn update_target(
        &self,
        target_id: &str,
        spec: &TargetSpec,
    ) -> ProviderResult<MutationReceipt>;

    async fn delete_target(&self, target_id: &str) -> ProviderResult<MutationReceipt>;

    async fn get_operation_status(
        &self,
        operation: &OperationHandle,
    ) -> ProviderResult<OperationStatus>;

    async fn list_operation_errors(
        &self,
        operation: &OperationHandle,
    ) -> ProviderResult<Vec<OperationError>>;

    async fn list_network_interfaces_for_target(
        &self,
        target_id: &str,
    ) -> ProviderResult<Vec<NetworkInterface>>;

    async fn get_network_interface(&self, interface_id: &str) -> ProviderResult<NetworkInterface>;

    async fn list_backends(&self, set: &BackendSetRef) -> ProviderResult<Vec<BackendEntry>>;

    async fn create_backend(
        &self,
        set: &BackendSetRef,
        backend: &BackendKey,
        retry_token: &str,
    ) -> ProviderResult<MutationReceipt>;

    async fn delete_backend(
        &self,
        set: &BackendSetRef,
        backend: &BackendKey,
    ) -> ProviderResult<MutationReceipt>;

    /// Direct lookup of one backend; `NotFound` until the router has propagated it
    async fn get_backend(
        &self,
        set: &BackendSetRef,
        backend: &BackendKey,
    ) -> ProviderResult<BackendEntry>;

    async fn get_backend_health(
        &self,
        set: &BackendSetRef,
        backend: &BackendKey,
    ) -> ProviderResult<BackendHealth>;
}
