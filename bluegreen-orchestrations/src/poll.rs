//! Bounded polling shared by every wait point.
//!
//! All waiting goes through [`poll_until`] or [`retry_transient`], which sleep
//! on the tokio clock. Tests run with a paused clock so deadlines elapse
//! instantly and deterministically.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{DeployError, ProviderResult, Result};

/// Outcome of a single check
#[derive(Debug)]
pub enum Check<T> {
    Ready(T),
    /// Not there yet; carries the observed state for reporting
    Pending(String),
}

/// A fixed point in time after which waiting gives up
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    at: Instant,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            at: started + timeout,
        }
    }

    pub fn elapsed(&self) -> Duration {
        Instant::now().saturating_duration_since(self.started)
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }
}

/// Check every `interval` until the check reports ready or `deadline` passes.
///
/// Transient provider errors count as "not yet" and are retried; any other
/// error ends the wait immediately. Running out of time is a
/// [`DeployError::Timeout`] carrying the last observed state.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    resource: &str,
    interval: Duration,
    deadline: Deadline,
    mut check: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Check<T>>>,
{
    let mut attempt = 0u32;
    let mut last_state = "not yet observed".to_string();

    loop {
        attempt += 1;
        match check(attempt).await {
            Ok(Check::Ready(value)) => {
                let elapsed_secs = deadline.elapsed().as_secs();
                tracing::debug!(what, resource, attempt, elapsed_secs, "wait complete");
                return Ok(value);
            }
            Ok(Check::Pending(state)) => {
                tracing::debug!(what, resource, attempt, state = %state, "still waiting");
                last_state = state;
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(what, resource, attempt, "transient error while waiting: {}", e);
                last_state = format!("transient error: {}", e);
            }
            Err(e) => return Err(e),
        }

        if deadline.expired() {
            return Err(DeployError::Timeout {
                what: what.to_string(),
                resource: resource.to_string(),
                last_state,
                elapsed: deadline.elapsed(),
            });
        }

        tokio::time::sleep(interval.min(deadline.remaining())).await;
    }
}

/// Attempts for a provider mutation before a transient failure is given up on
pub const MUTATION_ATTEMPTS: u32 = 3;

/// Retry a provider call with fixed backoff while it fails transiently
pub async fn retry_transient<T, F, Fut>(
    what: &str,
    attempts: u32,
    backoff: Duration,
    mut op: F,
) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_transient() && attempt < attempts => {
                tracing::warn!(what, attempt, attempts, "transient error, retrying: {}", e);
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_ready() {
        let deadline = Deadline::after(Duration::from_secs(60));
        let interval = Duration::from_secs(10);
        let value = poll_until("state", "t-1", interval, deadline, |attempt| async move {
            if attempt < 3 {
                Ok(Check::Pending(format!("attempt {}", attempt)))
            } else {
                Ok(Check::Ready(attempt))
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_times_out_with_last_state() {
        let start = Instant::now();
        let deadline = Deadline::after(Duration::from_secs(35));
        let interval = Duration::from_secs(10);
        let err = poll_until::<(), _, _>(
            "backend health",
            "10.0.0.5:8080",
            interval,
            deadline,
            |_| async { Ok(Check::Pending("CRITICAL".to_string())) },
        )
        .await
        .unwrap_err();

        match err {
            DeployError::Timeout {
                what,
                resource,
                last_state,
                elapsed,
            } => {
                assert_eq!(what, "backend health");
                assert_eq!(resource, "10.0.0.5:8080");
                assert_eq!(last_state, "CRITICAL");
                assert_eq!(elapsed, Duration::from_secs(35));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(start.elapsed(), Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_tolerates_transient_errors() {
        let deadline = Deadline::after(Duration::from_secs(10));
        let interval = Duration::from_secs(1);
        let value = poll_until("op", "wr-1", interval, deadline, |attempt| async move {
            if attempt == 1 {
                Err(ProviderError::Transient("connection reset".to_string()).into())
            } else {
                Ok(Check::Ready("done"))
            }
        })
        .await
        .unwrap();
        assert_eq!(value, "done");
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_stops_on_hard_error() {
        let calls = AtomicU32::new(0);
        let deadline = Deadline::after(Duration::from_secs(10));
        let err = poll_until::<(), _, _>("op", "wr-1", Duration::from_secs(1), deadline, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            let err = ProviderError::Api {
                status: 400,
                message: "bad".to_string(),
            };
            async move { Err(err.into()) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, DeployError::Provider(ProviderError::Api { status: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_transient_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let result: ProviderResult<()> = retry_transient("list", 3, Duration::from_secs(2), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Transient("503".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
