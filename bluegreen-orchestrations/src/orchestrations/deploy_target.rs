//! Deploy target orchestration
//!
//! Gets exactly one ACTIVE target running the desired image, either by
//! updating the newest existing target in place or by replacing every
//! matched target with a fresh one. An update that is rejected, fails, or
//! cannot be verified falls back to replace when allowed.
//!
//! Older duplicates left by an in-place update are only reported here. They
//! keep serving until traffic has moved, see [`super::blue_green`].

use std::collections::HashSet;

use bluegreen_models::{DeployPhase, DeploymentTarget, Strategy, TargetSpec};
use uuid::Uuid;

use crate::activities::render_spec::render_target_spec;
use crate::activities::resolve_targets::resolve_targets;
use crate::activities::retire_target::{retire_target, RetireOutcome};
use crate::activities::verify_image::{verify_image, ImageVerification};
use crate::activities::wait_for_operation::await_active;
use crate::config::DeployConfig;
use crate::error::{DeployError, ProviderError, Result};
use crate::poll::{poll_until, retry_transient, Check, Deadline, MUTATION_ATTEMPTS};
use crate::provider::Provider;
use crate::types::TargetDeployment;

pub async fn deploy_target<P: Provider + ?Sized>(
    provider: &P,
    config: &DeployConfig,
) -> Result<TargetDeployment> {
    tracing::info!(
        deployment = %config.name,
        image = %config.image,
        strategy = ?config.strategy,
        "Deploying target"
    );

    // Rendering first keeps configuration errors ahead of any provider call
    let spec = render_target_spec(config)?;

    let mut run = DeployRun {
        provider,
        config,
        spec,
        phases: Vec::new(),
        retired: Vec::new(),
        duplicates: Vec::new(),
    };

    match run.execute().await {
        Ok((target, replaced_via_fallback)) => {
            run.enter(DeployPhase::Deployed);
            tracing::info!(
                target_id = %target.id,
                replaced_via_fallback,
                retired = run.retired.len(),
                duplicates = run.duplicates.len(),
                "Target deployed"
            );
            Ok(TargetDeployment {
                target,
                replaced_via_fallback,
                phases: run.phases,
                retired_target_ids: run.retired,
                duplicate_target_ids: run.duplicates,
            })
        }
        Err(e) => {
            run.enter(DeployPhase::Failed);
            tracing::error!(phases = ?run.phases, "Target deployment failed: {}", e);
            Err(e)
        }
    }
}

/// Update failures that a fresh target can get past
fn update_rejected(err: &DeployError) -> bool {
    matches!(
        err,
        DeployError::Provider(ProviderError::Api { .. } | ProviderError::NotFound { .. })
            | DeployError::OperationFailed { .. }
            | DeployError::UnexpectedState { .. }
    )
}

struct DeployRun<'a, P: Provider + ?Sized> {
    provider: &'a P,
    config: &'a DeployConfig,
    spec: TargetSpec,
    phases: Vec<DeployPhase>,
    retired: Vec<String>,
    duplicates: Vec<String>,
}

impl<'a, P: Provider + ?Sized> DeployRun<'a, P> {
    fn enter(&mut self, phase: DeployPhase) {
        tracing::info!(deployment = %self.config.name, phase = ?phase, "Entering phase");
        self.phases.push(phase);
    }

    async fn resolve(&mut self) -> Result<Vec<DeploymentTarget>> {
        self.enter(DeployPhase::Resolving);
        let timeouts = &self.config.timeouts;
        let targets = resolve_targets(self.provider, &self.config.name, timeouts).await?;
        tracing::info!(
            matched = targets.len(),
            ids = ?targets.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            "Resolved existing targets"
        );
        Ok(targets)
    }

    async fn execute(&mut self) -> Result<(DeploymentTarget, bool)> {
        let existing = self.resolve().await?;
        match self.config.strategy {
            Strategy::Replace => self.replace(&existing).await.map(|target| (target, false)),
            Strategy::Update => self.update(&existing).await,
        }
    }

    async fn update(&mut self, existing: &[DeploymentTarget]) -> Result<(DeploymentTarget, bool)> {
        let Some(newest) = existing.first() else {
            self.enter(DeployPhase::NoTarget);
            tracing::info!("No existing target, creating one");
            return self.create(&HashSet::new()).await.map(|target| (target, false));
        };

        // Step 1: Update the newest target in place
        self.enter(DeployPhase::Updating);
        tracing::info!(
            target_id = %newest.id,
            from = ?newest.images,
            to = %self.config.image,
            "Updating target"
        );
        let target = match self.update_in_place(&newest.id).await {
            Ok(target) => target,
            Err(e) if self.config.fallback_to_replace && update_rejected(&e) => {
                return self.fall_back(&newest.id, &e.to_string()).await;
            }
            Err(e) => return Err(e),
        };

        // Step 2: Confirm the running image actually changed
        self.enter(DeployPhase::Verifying);
        let timeouts = &self.config.timeouts;
        match verify_image(self.provider, &target.id, &self.config.image, timeouts).await? {
            ImageVerification::Verified => {
                self.duplicates = existing[1..].iter().map(|t| t.id.clone()).collect();
                Ok((target, false))
            }
            ImageVerification::Unverifiable { reported } => {
                if !self.config.fallback_to_replace {
                    return Err(DeployError::Verification {
                        target_id: target.id,
                        expected: self.config.image.clone(),
                        reported,
                    });
                }
                let reason = format!("image not verified, provider reports {:?}", reported);
                self.fall_back(&target.id, &reason).await
            }
        }
    }

    async fn update_in_place(&self, target_id: &str) -> Result<DeploymentTarget> {
        let provider = self.provider;
        let spec = &self.spec;
        let timeouts = &self.config.timeouts;
        let receipt = retry_transient(
            "update target",
            MUTATION_ATTEMPTS,
            timeouts.poll_interval,
            move || provider.update_target(target_id, spec),
        )
        .await?;
        await_active(provider, &receipt, target_id, timeouts).await
    }

    /// Step 3: The update did not stick, start over from a fresh target
    async fn fall_back(
        &mut self,
        target_id: &str,
        reason: &str,
    ) -> Result<(DeploymentTarget, bool)> {
        self.enter(DeployPhase::ReplaceFallback);
        tracing::warn!(target_id, reason, "Update failed, falling back to replace");
        let current = self.resolve().await?;
        let target = self.replace(&current).await?;
        Ok((target, true))
    }

    /// Retire every given target, then create a fresh one. Any deletion
    /// failure aborts before the create.
    async fn replace(&mut self, existing: &[DeploymentTarget]) -> Result<DeploymentTarget> {
        let timeouts = &self.config.timeouts;
        for target in existing {
            if retire_target(self.provider, &target.id, timeouts).await? == RetireOutcome::Retired {
                self.retired.push(target.id.clone());
            }
        }
        let known: HashSet<String> = existing.iter().map(|t| t.id.clone()).collect();
        self.create(&known).await
    }

    async fn create(&mut self, known: &HashSet<String>) -> Result<DeploymentTarget> {
        self.enter(DeployPhase::Creating);
        tracing::info!(image = %self.config.image, "Creating target");

        let provider = self.provider;
        let spec = &self.spec;
        let timeouts = &self.config.timeouts;
        // One token for every attempt so a retried create is deduplicated
        let retry_token = Uuid::new_v4().to_string();
        let retry_token = retry_token.as_str();
        let receipt = retry_transient(
            "create target",
            MUTATION_ATTEMPTS,
            timeouts.poll_interval,
            move || provider.create_target(spec, retry_token),
        )
        .await?;

        let target_id = match &receipt.resource_id {
            Some(id) => id.clone(),
            None => {
                tracing::debug!("Create returned no target id, looking it up by name");
                self.find_created(known).await?
            }
        };
        tracing::info!(target_id = %target_id, "Target created, waiting for ACTIVE");
        await_active(provider, &receipt, &target_id, timeouts).await
    }

    /// Find the target a create produced when the provider did not say
    async fn find_created(&self, known: &HashSet<String>) -> Result<String> {
        let provider = self.provider;
        let name = self.config.name.as_str();
        let timeouts = &self.config.timeouts;
        poll_until(
            "new target to appear",
            name,
            timeouts.poll_interval,
            Deadline::after(timeouts.target_state),
            move |_| async move {
                let targets = resolve_targets(provider, name, timeouts).await?;
                match targets.into_iter().find(|t| !known.contains(&t.id)) {
                    Some(target) => Ok::<_, DeployError>(Check::Ready(target.id)),
                    None => Ok(Check::Pending("NOT_LISTED".to_string())),
                }
            },
        )
        .await
    }
}
