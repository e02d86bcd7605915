//! Bounded retry for optimistic WATCH/MULTI/EXEC transactions.
//!
//! A nil `EXEC` reply means a concurrent writer touched the watched key
//! between our read and our commit; the whole read-check-write cycle is
//! retried with jitter. Only observed conflicts are retried — precondition
//! mismatches the caller asked for are surfaced immediately by the
//! operation itself, and the budget is never exceeded.

use std::time::Duration;

use rand::Rng;
use stash_storage::{StoreError, StoreResult};

/// Outcome of one optimistic transaction attempt.
pub(crate) enum CasOutcome<T> {
    /// `EXEC` committed; carries the operation result.
    Committed(T),
    /// `EXEC` returned nil: a concurrent writer invalidated the watch.
    Conflict,
}

/// Runs `operation` until it commits, up to `attempts` tries.
///
/// Non-conflict errors propagate immediately. When every attempt conflicts,
/// the contention is surfaced as a precondition failure.
pub(crate) async fn with_cas_retry<T, F, Fut>(
    attempts: u32,
    base_delay: Duration,
    mut operation: F,
) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<CasOutcome<T>>>,
{
    for attempt in 1..=attempts {
        match operation().await? {
            CasOutcome::Committed(value) => return Ok(value),
            CasOutcome::Conflict if attempt < attempts => {
                let jitter = if base_delay.as_millis() > 0 {
                    let range = u64::try_from(base_delay.as_millis()).unwrap_or(u64::MAX);
                    Duration::from_millis(rand::rng().random_range(0..=range))
                } else {
                    Duration::ZERO
                };
                let delay = base_delay + jitter;
                tracing::debug!(
                    attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "optimistic transaction conflict, retrying after jitter",
                );
                tokio::time::sleep(delay).await;
            },
            CasOutcome::Conflict => {},
        }
    }

    Err(StoreError::precondition(format!(
        "write contention: optimistic transaction conflicted on all {attempts} attempts"
    )))
}
