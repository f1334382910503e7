//! Blue/green deployment orchestration
//!
//! End-to-end run: get a target onto the desired image, find its address,
//! optionally smoke test it, move load balancer traffic over to it, and
//! only then retire older duplicate targets.

use bluegreen_models::{AddressKind, BackendKey, DeploymentOutcome, ResolvedAddresses};
use tokio::time::Instant;

use crate::activities::resolve_address::resolve_addresses;
use crate::activities::retire_target::{retire_target, RetireOutcome};
use crate::activities::smoke_test::smoke_test;
use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use crate::orchestrations::cutover::cutover;
use crate::orchestrations::deploy_target::deploy_target;
use crate::poll::{poll_until, Check, Deadline};
use crate::provider::Provider;

pub async fn blue_green_deploy<P: Provider + ?Sized>(
    provider: &P,
    config: &DeployConfig,
) -> Result<DeploymentOutcome> {
    let started = Instant::now();
    tracing::info!(
        deployment = %config.name,
        run_id = %config.provenance.run_id,
        image = %config.image,
        "Starting blue/green deployment"
    );

    let result = run(provider, config, started).await;
    if let Err(e) = &result {
        tracing::error!(
            deployment = %config.name,
            run_id = %config.provenance.run_id,
            elapsed_seconds = started.elapsed().as_secs(),
            "Blue/green deployment failed: {}",
            e
        );
    }
    result
}

async fn run<P: Provider + ?Sized>(
    provider: &P,
    config: &DeployConfig,
    started: Instant,
) -> Result<DeploymentOutcome> {
    // Step 1: Get one ACTIVE target on the desired image
    let deployment = deploy_target(provider, config).await?;
    let target_id = deployment.target.id.clone();

    // Step 2: Find the address traffic will be sent to
    let traffic = config.traffic_address;
    let addresses = wait_for_address(provider, config, &target_id, traffic).await?;
    let Some(address) = addresses.get(traffic).map(str::to_string) else {
        return Err(DeployError::AddressUnavailable { target_id, kind: traffic });
    };
    tracing::info!(
        target_id = %target_id,
        private = ?addresses.private_address,
        public = ?addresses.public_address,
        "Resolved target addresses"
    );

    // Step 3: Optional smoke test before any traffic moves
    if let Some(path) = &config.smoke_path {
        smoke_test(
            &address,
            config.container_port,
            path,
            config.timeouts.smoke_attempts,
            config.timeouts.poll_interval,
        )
        .await?;
    }

    // Step 4: Cut traffic over
    let backend = BackendKey::new(address, config.container_port);
    let report = cutover(provider, &config.backend_set, &backend, &config.timeouts).await?;

    let mut warnings: Vec<String> = report
        .removal_failures
        .iter()
        .map(|(key, reason)| format!("Failed to remove backend {}: {}", key, reason))
        .collect();

    // Step 5: Older duplicates only go once the new target is taking traffic
    let mut retired_target_ids = deployment.retired_target_ids;
    let duplicates = &deployment.duplicate_target_ids;
    if !duplicates.is_empty() {
        if config.cleanup_duplicates {
            let (retired, failures) = retire_duplicates(provider, config, duplicates).await;
            retired_target_ids.extend(retired);
            if !failures.is_empty() {
                let err = DeployError::PartialCleanup { failures };
                tracing::warn!("{}", err);
                warnings.push(err.to_string());
            }
        } else {
            tracing::warn!(ids = ?duplicates, "Leaving duplicate targets in place");
            warnings.push(format!("Duplicate targets left in place: {}", duplicates.join(", ")));
        }
    }

    let elapsed_seconds = started.elapsed().as_secs();
    tracing::info!(
        deployment = %config.name,
        target_id = %target_id,
        backend = %backend,
        elapsed_seconds,
        warnings = warnings.len(),
        "Blue/green deployment complete"
    );

    Ok(DeploymentOutcome {
        run_id: config.provenance.run_id,
        deployment_name: config.name.clone(),
        target_id,
        image: config.image.clone(),
        strategy: config.strategy,
        addresses,
        backend,
        replaced_via_fallback: deployment.replaced_via_fallback,
        phases: deployment.phases,
        retired_target_ids,
        removed_backends: report.removed,
        warnings,
        elapsed_seconds,
    })
}

/// Best-effort removal of older duplicates; failures are returned, not raised
async fn retire_duplicates<P: Provider + ?Sized>(
    provider: &P,
    config: &DeployConfig,
    duplicates: &[String],
) -> (Vec<String>, Vec<String>) {
    let mut retired = Vec::new();
    let mut failures = Vec::new();
    for id in duplicates {
        tracing::info!(target_id = %id, "Retiring duplicate target");
        match retire_target(provider, id, &config.timeouts).await {
            Ok(RetireOutcome::Retired) => retired.push(id.clone()),
            Ok(RetireOutcome::AlreadyGone) => {}
            Err(e) => failures.push(format!("{}: {}", id, e)),
        }
    }
    (retired, failures)
}

/// Resolve both address kinds, waiting for the traffic kind to show up.
/// A fresh target can report ACTIVE before its interface is attached.
async fn wait_for_address<P: Provider + ?Sized>(
    provider: &P,
    config: &DeployConfig,
    target_id: &str,
    traffic: AddressKind,
) -> Result<ResolvedAddresses> {
    let other = match traffic {
        AddressKind::Private => AddressKind::Public,
        AddressKind::Public => AddressKind::Private,
    };
    let wanted = [traffic, other];
    let wanted = &wanted;

    let resolved = poll_until(
        "target address",
        target_id,
        config.timeouts.poll_interval,
        Deadline::after(config.timeouts.target_state),
        move |_| async move {
            let addresses = resolve_addresses(provider, target_id, wanted).await;
            if addresses.has(traffic) {
                Ok::<_, DeployError>(Check::Ready(addresses))
            } else {
                Ok(Check::Pending(format!("no {} address", traffic.as_str())))
            }
        },
    )
    .await;

    match resolved {
        Ok(addresses) => Ok(addresses),
        Err(DeployError::Timeout { .. }) => Err(DeployError::AddressUnavailable {
            target_id: target_id.to_string(),
            kind: traffic,
        }),
        Err(e) => Err(e),
    }
}
