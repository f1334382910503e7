//! Wait for long-running operations and for targets to settle

use bluegreen_models::{
    DeploymentTarget, LifecycleState, MutationReceipt, OperationHandle, OperationStatus,
};

use crate::config::Timeouts;
use crate::error::{DeployError, Result};
use crate::poll::{poll_until, Check, Deadline};
use crate::provider::Provider;

/// Poll an operation handle until it is terminal.
///
/// SUCCEEDED returns `Ok`. FAILED fetches and logs the provider's error
/// detail first; both FAILED and CANCELED end in [`DeployError::OperationFailed`].
pub async fn wait_for_operation<P: Provider + ?Sized>(
    provider: &P,
    operation: &OperationHandle,
    resource: &str,
    timeouts: &Timeouts,
) -> Result<()> {
    let status = poll_until(
        "operation",
        operation.as_str(),
        timeouts.poll_interval,
        Deadline::after(timeouts.operation),
        move |_| async move {
            let status = provider.get_operation_status(operation).await?;
            Ok::<_, DeployError>(if status.is_terminal() {
                Check::Ready(status)
            } else {
                Check::Pending(status.to_string())
            })
        },
    )
    .await?;

    match status {
        OperationStatus::Succeeded => Ok(()),
        OperationStatus::Failed => {
            let detail = match provider.list_operation_errors(operation).await {
                Ok(errors) if !errors.is_empty() => {
                    for err in &errors {
                        tracing::error!(
                            operation = %operation,
                            resource,
                            code = %err.code,
                            timestamp = err.timestamp.as_deref().unwrap_or("-"),
                            "operation error: {}",
                            err.message
                        );
                    }
                    errors
                        .iter()
                        .map(|e| format!("{}: {}", e.code, e.message))
                        .collect::<Vec<_>>()
                        .join("; ")
                }
                Ok(_) => "no error detail reported".to_string(),
                Err(e) => {
                    tracing::warn!(
                        operation = %operation,
                        "Failed to fetch operation errors: {}",
                        e
                    );
                    format!("error detail unavailable: {}", e)
                }
            };
            Err(DeployError::OperationFailed {
                operation: operation.to_string(),
                resource: resource.to_string(),
                status,
                detail,
            })
        }
        OperationStatus::Canceled | OperationStatus::InProgress => {
            tracing::error!(operation = %operation, resource, "operation ended {}", status);
            Err(DeployError::OperationFailed {
                operation: operation.to_string(),
                resource: resource.to_string(),
                status,
                detail: "operation was canceled".to_string(),
            })
        }
    }
}

/// Poll a target until it reports ACTIVE.
///
/// CREATING, UPDATING and not-yet-visible targets are waited on; a target
/// that fails or starts deleting ends the wait with an error.
pub async fn wait_until_active<P: Provider + ?Sized>(
    provider: &P,
    target_id: &str,
    timeouts: &Timeouts,
) -> Result<DeploymentTarget> {
    poll_until(
        "target to become ACTIVE",
        target_id,
        timeouts.poll_interval,
        Deadline::after(timeouts.target_state),
        move |_| async move {
            let raw = match provider.get_target(target_id).await {
                Ok(raw) => raw,
                Err(e) if e.is_not_found() => return Ok(Check::Pending("NOT_FOUND".to_string())),
                Err(e) => return Err(DeployError::from(e)),
            };
            let Some(target) = DeploymentTarget::from_descriptor(&raw) else {
                return Ok(Check::Pending("unparseable descriptor".to_string()));
            };
            match target.state {
                LifecycleState::Active => Ok(Check::Ready(target)),
                LifecycleState::Failed | LifecycleState::Deleting | LifecycleState::Deleted => {
                    Err(DeployError::UnexpectedState {
                        target_id: target_id.to_string(),
                        state: target.state,
                        expected: "ACTIVE".to_string(),
                    })
                }
                other => Ok(Check::Pending(other.to_string())),
            }
        },
    )
    .await
}

/// Poll a deleted target until it is no longer found or reports DELETED.
///
/// FAILED is not gone here: a stale read can still show the pre-delete state.
pub async fn wait_until_gone<P: Provider + ?Sized>(
    provider: &P,
    target_id: &str,
    timeouts: &Timeouts,
) -> Result<()> {
    poll_until(
        "target removal",
        target_id,
        timeouts.poll_interval,
        Deadline::after(timeouts.target_state),
        move |_| async move {
            let raw = match provider.get_target(target_id).await {
                Ok(raw) => raw,
                Err(e) if e.is_not_found() => return Ok(Check::Ready(())),
                Err(e) => return Err(DeployError::from(e)),
            };
            let state = DeploymentTarget::from_descriptor(&raw)
                .map(|t| t.state)
                .unwrap_or(LifecycleState::Unknown);
            if state == LifecycleState::Deleted {
                Ok(Check::Ready(()))
            } else {
                Ok(Check::Pending(state.to_string()))
            }
        },
    )
    .await
}

/// Wait for a create or update to land: the operation first (when the
/// provider handed one back), then the target itself reaching ACTIVE.
pub async fn await_active<P: Provider + ?Sized>(
    provider: &P,
    receipt: &MutationReceipt,
    target_id: &str,
    timeouts: &Timeouts,
) -> Result<DeploymentTarget> {
    match &receipt.operation {
        Some(operation) => wait_for_operation(provider, operation, target_id, timeouts).await?,
        None => tracing::debug!(target_id, "No operation handle returned, polling target state"),
    }
    wait_until_active(provider, target_id, timeouts).await
}

/// Wait for a delete to land, falling back to existence polling when the
/// provider returned no operation handle.
pub async fn await_gone<P: Provider + ?Sized>(
    provider: &P,
    receipt: &MutationReceipt,
    target_id: &str,
    timeouts: &Timeouts,
) -> Result<()> {
    match &receipt.operation {
        Some(operation) => wait_for_operation(provider, operation, target_id, timeouts).await?,
        None => tracing::debug!(target_id, "No operation handle returned, polling for removal"),
    }
    wait_until_gone(provider, target_id, timeouts).await
}
