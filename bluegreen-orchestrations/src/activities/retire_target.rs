//! Retire a compute target

use bluegreen_models::DeploymentTarget;

use crate::activities::wait_for_operation::await_gone;
use crate::config::Timeouts;
use crate::error::Result;
use crate::poll::{retry_transient, MUTATION_ATTEMPTS};
use crate::provider::Provider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetireOutcome {
    /// The target was already absent, deleting or deleted
    AlreadyGone,
    /// A delete was issued and has completed
    Retired,
}

/// Delete a target and wait until it is gone.
///
/// **Idempotent:** Yes (absent, DELETING and DELETED targets are a success)
pub async fn retire_target<P: Provider + ?Sized>(
    provider: &P,
    target_id: &str,
    timeouts: &Timeouts,
) -> Result<RetireOutcome> {
    match provider.get_target(target_id).await {
        Ok(raw) => {
            let state = DeploymentTarget::from_descriptor(&raw).map(|t| t.state);
            if let Some(state) = state.filter(|s| s.is_gone_or_going()) {
                tracing::info!(target_id, state = %state, "Target already being removed");
                return Ok(RetireOutcome::AlreadyGone);
            }
        }
        Err(e) if e.is_not_found() => {
            tracing::info!(target_id, "Target not found, nothing to retire");
            return Ok(RetireOutcome::AlreadyGone);
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!(target_id, "Deleting target");
    let delete = retry_transient(
        "delete target",
        MUTATION_ATTEMPTS,
        timeouts.poll_interval,
        move || provider.delete_target(target_id),
    );
    let receipt = match delete.await {
        Ok(receipt) => receipt,
        Err(e) if e.is_not_found() => {
            tracing::info!(target_id, "Target vanished before delete, nothing to retire");
            return Ok(RetireOutcome::AlreadyGone);
        }
        Err(e) => return Err(e.into()),
    };

    await_gone(provider, &receipt, target_id, timeouts).await?;
    tracing::info!(target_id, "Target retired");
    Ok(RetireOutcome::Retired)
}
