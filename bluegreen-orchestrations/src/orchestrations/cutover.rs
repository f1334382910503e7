//! Traffic cutover orchestration
//!
//! Registers the new backend, waits until the load balancer reports it
//! healthy, and only then removes every other backend. The backend set is
//! never left empty, and re-running against an already cut-over set changes
//! nothing.

use bluegreen_models::{BackendHealth, BackendKey, BackendSetRef};
use uuid::Uuid;

use crate::activities::wait_for_operation::wait_for_operation;
use crate::config::Timeouts;
use crate::error::{DeployError, ProviderError, Result};
use crate::poll::{poll_until, retry_transient, Check, Deadline, MUTATION_ATTEMPTS};
use crate::provider::Provider;
use crate::types::CutoverReport;

const LIST_ATTEMPTS: u32 = 3;

pub async fn cutover<P: Provider + ?Sized>(
    provider: &P,
    set: &BackendSetRef,
    backend: &BackendKey,
    timeouts: &Timeouts,
) -> Result<CutoverReport> {
    tracing::info!(backend_set = %set, backend = %backend, "Starting traffic cutover");

    // Step 1: Register the new backend
    let created = ensure_registered(provider, set, backend, timeouts).await?;

    // Step 2: Wait for it to become visible and healthy
    let deadline = Deadline::after(timeouts.health);
    wait_until_visible(provider, set, backend, timeouts, deadline).await?;
    let health = wait_until_serving(provider, set, backend, timeouts, deadline).await?;
    tracing::info!(backend = %backend, health = health.as_str(), "Backend is serving");

    // Step 3: Remove everything else
    let (removed, removal_failures) = remove_others(provider, set, backend, timeouts).await?;

    if removal_failures.is_empty() {
        tracing::info!(backend = %backend, removed = removed.len(), "Cutover complete");
    } else {
        let failures = removal_failures
            .iter()
            .map(|(key, e)| format!("{}: {}", key, e))
            .collect();
        let err = DeployError::PartialCleanup { failures };
        tracing::warn!(backend = %backend, "Cutover complete with leftovers: {}", err);
    }

    Ok(CutoverReport {
        backend: backend.clone(),
        created,
        removed,
        removal_failures,
    })
}

/// Add `backend` to the set unless it is already there.
///
/// **Idempotent:** Yes (returns false when nothing was created)
async fn ensure_registered<P: Provider + ?Sized>(
    provider: &P,
    set: &BackendSetRef,
    backend: &BackendKey,
    timeouts: &Timeouts,
) -> Result<bool> {
    let existing = retry_transient("list backends", LIST_ATTEMPTS, timeouts.poll_interval, || {
        provider.list_backends(set)
    })
    .await?;

    if existing.iter().any(|entry| &entry.key == backend) {
        tracing::info!(backend = %backend, "Backend already registered");
        return Ok(false);
    }

    tracing::info!(backend = %backend, "Registering backend");
    let retry_token = Uuid::new_v4().to_string();
    let retry_token = retry_token.as_str();
    let create = retry_transient(
        "create backend",
        MUTATION_ATTEMPTS,
        timeouts.poll_interval,
        move || provider.create_backend(set, backend, retry_token),
    );
    let receipt = match create.await {
        Ok(receipt) => receipt,
        Err(ProviderError::Api { status: 409, message }) => {
            tracing::info!(backend = %backend, "Backend registered concurrently: {}", message);
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };
    if let Some(operation) = &receipt.operation {
        wait_for_operation(provider, operation, &backend.to_string(), timeouts).await?;
    }
    Ok(true)
}

async fn wait_until_visible<P: Provider + ?Sized>(
    provider: &P,
    set: &BackendSetRef,
    backend: &BackendKey,
    timeouts: &Timeouts,
    deadline: Deadline,
) -> Result<()> {
    let resource = backend.to_string();
    poll_until(
        "backend registration",
        &resource,
        timeouts.health_poll_interval,
        deadline,
        move |_| async move {
            match provider.get_backend(set, backend).await {
                Ok(_) => Ok(Check::Ready(())),
                Err(e) if e.is_not_found() => Ok(Check::Pending("NOT_FOUND".to_string())),
                Err(e) => Err(DeployError::from(e)),
            }
        },
    )
    .await
}

async fn wait_until_serving<P: Provider + ?Sized>(
    provider: &P,
    set: &BackendSetRef,
    backend: &BackendKey,
    timeouts: &Timeouts,
    deadline: Deadline,
) -> Result<BackendHealth> {
    let resource = backend.to_string();
    poll_until(
        "backend health",
        &resource,
        timeouts.health_poll_interval,
        deadline,
        move |_| async move {
            let health = match provider.get_backend_health(set, backend).await {
                Ok(health) => health,
                Err(e) if e.is_not_found() => BackendHealth::NotFound,
                Err(e) => return Err(DeployError::from(e)),
            };
            if health.is_serving() {
                Ok(Check::Ready(health))
            } else {
                Ok(Check::Pending(health.as_str().to_string()))
            }
        },
    )
    .await
}

/// Delete every backend in the set other than `keep`, one at a time.
/// Failures are collected rather than aborting the rest.
async fn remove_others<P: Provider + ?Sized>(
    provider: &P,
    set: &BackendSetRef,
    keep: &BackendKey,
    timeouts: &Timeouts,
) -> Result<(Vec<BackendKey>, Vec<(BackendKey, String)>)> {
    let current = retry_transient("list backends", LIST_ATTEMPTS, timeouts.poll_interval, || {
        provider.list_backends(set)
    })
    .await?;

    let mut removed = Vec::new();
    let mut failures = Vec::new();
    for entry in current.into_iter().filter(|entry| &entry.key != keep) {
        let key = entry.key;
        tracing::info!(backend = %key, health = entry.health.as_str(), "Removing old backend");
        let key_ref = &key;
        let delete = retry_transient(
            "delete backend",
            MUTATION_ATTEMPTS,
            timeouts.poll_interval,
            move || provider.delete_backend(set, key_ref),
        );
        match delete.await {
            Ok(receipt) => {
                if let Some(operation) = &receipt.operation {
                    let resource = key.to_string();
                    let waited = wait_for_operation(provider, operation, &resource, timeouts).await;
                    if let Err(e) = waited {
                        tracing::warn!(backend = %key, "Backend removal did not complete: {}", e);
                        failures.push((key, e.to_string()));
                        continue;
                    }
                }
                removed.push(key);
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(backend = %key, "Backend already removed");
            }
            Err(e) => {
                tracing::warn!(backend = %key, "Failed to remove backend: {}", e);
                failures.push((key, e.to_string()));
            }
        }
    }
    Ok((removed, failures))
}
