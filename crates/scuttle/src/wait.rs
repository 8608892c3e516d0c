//! Fixed-interval bounded polling.
//!
//! Every wait point in the orchestrator (cluster object drain, NAT gateway
//! release, stack deletion) goes through [`poll_until_drained`]: check a
//! remaining count, sleep a fixed interval, give up at a hard ceiling. Both
//! control planes are rate-limited shared resources, so there is no backoff
//! tuning and no parallel fan-out, just a predictable cadence with a bound.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

/// Interval/ceiling pair for one wait point.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Fixed delay between checks
    pub interval: Duration,
    /// Maximum total time to wait before giving up
    pub ceiling: Duration,
}

impl PollConfig {
    pub fn new(interval_secs: u64, ceiling_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs),
            ceiling: Duration::from_secs(ceiling_secs),
        }
    }
}

/// Why a wait ended without draining.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The ceiling elapsed with instances still present. The caller decides
    /// whether this escalates (finalizer strip) or becomes an error record.
    #[error("timed out waiting for {what} after {elapsed:?} ({remaining} remaining)")]
    Timeout {
        what: String,
        elapsed: Duration,
        remaining: usize,
    },

    /// The check itself failed; polling stops immediately.
    #[error(transparent)]
    Check(#[from] anyhow::Error),
}

/// Poll `check` on a fixed interval until it reports zero remaining instances
/// or the ceiling elapses.
///
/// The first check runs immediately, so an already-empty resource class costs
/// exactly one list call. Progress is logged on every non-empty poll.
pub async fn poll_until_drained<F, Fut>(
    config: PollConfig,
    check: F,
    what: &str,
) -> Result<(), WaitError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<usize>>,
{
    let started = Instant::now();

    loop {
        let remaining = check().await.map_err(WaitError::Check)?;
        if remaining == 0 {
            debug!(what, "Drained");
            return Ok(());
        }

        let elapsed = started.elapsed();
        if elapsed >= config.ceiling {
            return Err(WaitError::Timeout {
                what: what.to_string(),
                elapsed,
                remaining,
            });
        }

        info!(
            what,
            remaining,
            elapsed_secs = elapsed.as_secs(),
            ceiling_secs = config.ceiling.as_secs(),
            "Waiting for deletion"
        );
        tokio::time::sleep(config.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn empty_state_needs_one_check() {
        let checks = Arc::new(AtomicUsize::new(0));
        let checks_clone = checks.clone();

        let result = poll_until_drained(
            PollConfig::new(5, 30),
            || {
                let c = checks_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(0)
                }
            },
            "empty-class",
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(checks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drains_after_retries() {
        let checks = Arc::new(AtomicUsize::new(0));
        let checks_clone = checks.clone();

        let result = poll_until_drained(
            PollConfig::new(5, 60),
            || {
                let c = checks_clone.clone();
                async move {
                    let seen = c.fetch_add(1, Ordering::SeqCst);
                    Ok(3usize.saturating_sub(seen))
                }
            },
            "slow-class",
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(checks.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn ceiling_produces_timeout_with_remaining_count() {
        let result = poll_until_drained(PollConfig::new(5, 30), || async { Ok(2) }, "stuck-class")
            .await;

        match result {
            Err(WaitError::Timeout {
                what, remaining, ..
            }) => {
                assert_eq!(what, "stuck-class");
                assert_eq!(remaining, 2);
            }
            other => panic!("Expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn check_error_stops_polling() {
        let result = poll_until_drained(
            PollConfig::new(5, 30),
            || async { anyhow::bail!("list failed") },
            "broken-class",
        )
        .await;

        match result {
            Err(WaitError::Check(e)) => assert!(e.to_string().contains("list failed")),
            other => panic!("Expected check error, got {other:?}"),
        }
    }
}
