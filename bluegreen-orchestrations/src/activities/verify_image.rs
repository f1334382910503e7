//! Verify that a target actually runs the desired image.
//!
//! An in-place update can be accepted by the control plane without the
//! running container being replaced, and the reported image field lags
//! behind. Verification reads it a bounded number of times before deciding.

use bluegreen_models::DeploymentTarget;

use crate::config::Timeouts;
use crate::error::Result;
use crate::provider::Provider;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageVerification {
    Verified,
    /// No image reported, or only other images, after every attempt
    Unverifiable { reported: Vec<String> },
}

pub async fn verify_image<P: Provider + ?Sized>(
    provider: &P,
    target_id: &str,
    expected: &str,
    timeouts: &Timeouts,
) -> Result<ImageVerification> {
    let attempts = timeouts.verify_attempts.max(1);
    let mut reported = Vec::new();

    for attempt in 1..=attempts {
        match provider.get_target(target_id).await {
            Ok(raw) => {
                reported = DeploymentTarget::from_descriptor(&raw)
                    .map(|t| t.images)
                    .unwrap_or_default();
                if reported.iter().any(|image| image == expected) {
                    tracing::info!(target_id, image = expected, attempt, "Image verified");
                    return Ok(ImageVerification::Verified);
                }
                if reported.is_empty() {
                    tracing::debug!(target_id, attempt, attempts, "No image reported yet");
                } else {
                    tracing::debug!(
                        target_id,
                        attempt,
                        attempts,
                        reported = ?reported,
                        "Reported image differs"
                    );
                }
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(target_id, attempt, "Transient error reading target image: {}", e);
            }
            Err(e) => return Err(e.into()),
        }

        if attempt < attempts {
            tokio::time::sleep(timeouts.verify_backoff * attempt).await;
        }
    }

    tracing::warn!(
        target_id,
        expected,
        reported = ?reported,
        "Could not verify image after {} attempts",
        attempts
    );
    Ok(ImageVerification::Unverifiable { reported })
}
