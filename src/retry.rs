use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Fixed-bound, fixed-delay retry. Every error is treated as retryable
/// until the attempts run out.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn no_delay() -> Self {
        Self {
            delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Runs `op`, retrying after `policy.delay` while attempts remain.
/// Returns the first success immediately; after the final attempt the
/// last error is propagated unchanged.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.attempts => {
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {}ms...",
                    label,
                    attempt,
                    policy.attempts,
                    e,
                    policy.delay.as_millis()
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
