//! Resubscribe policy: decides backoff delays when opening a live query fails.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::warn;

use crate::domain::StoreError;
use crate::ports::Subscription;

/// Backoff for re-opening a subscription.
///
/// Only the *open* is retried here. Errors delivered on an open subscription
/// are the store's to recover from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the second attempt.
    pub base_delay_ms: u64,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for a single delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// delay = base_delay * multiplier^(attempts - 1), capped at max_delay.
    ///
    /// Example with base=500ms, multiplier=2.0:
    /// - attempt 1 (first failure): 500ms
    /// - attempt 2: 1s
    /// - attempt 3: 2s
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base = self.base_delay_ms as f64;
        let exponent = attempts.saturating_sub(1).min(63) as i32;
        let delay_ms = base * self.multiplier.max(1.0).powi(exponent);
        let capped = delay_ms.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Opens a live query, backing off between failed attempts.
///
/// Returns `None` once `shutdown` flips (or its sender is gone).
pub async fn open_with_retry<T, F, Fut>(
    what: &str,
    policy: &RetryPolicy,
    shutdown: &mut watch::Receiver<bool>,
    mut open: F,
) -> Option<Subscription<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Subscription<T>, StoreError>>,
{
    let mut attempts = 0u32;
    loop {
        if *shutdown.borrow() {
            return None;
        }
        match open().await {
            Ok(subscription) => return Some(subscription),
            Err(err) => {
                attempts += 1;
                let delay = policy.next_delay(attempts);
                warn!(subscription = what, attempts, ?delay, error = %err, "subscribe failed, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            return None;
                        }
                    }
                }
            }
        }
    }
}
