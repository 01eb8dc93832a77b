//! Retry with backoff.
//!
//! One policy type shared by every call site that retries an outbound
//! request: the notification dispatcher (exponential) and the model
//! client (linear, rate-limit errors only).

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// `base * 2^attempt`
    Exponential,
    /// `base * (attempt + 1)`
    Linear,
}

/// Bounded retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first one. Zero behaves like one.
    pub max_attempts: u32,
    /// Delay unit.
    pub base_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl BackoffPolicy {
    pub const fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    pub const fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            strategy: BackoffStrategy::Linear,
        }
    }

    /// Delay to wait after attempt `attempt` (0-based) failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.strategy {
            BackoffStrategy::Exponential => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(attempt)),
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt.saturating_add(1)),
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Run `op` until it succeeds, the error is not retryable, or the policy
/// runs out of attempts. Returns the last error on failure.
///
/// `op` receives the 0-based attempt index.
pub async fn retry<T, E, F, Fut, P>(policy: &BackoffPolicy, is_retryable: P, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let attempts = policy.attempts();
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let last = attempt + 1 >= attempts;
                if last || !is_retryable(&e) {
                    return Err(e);
                }
                let delay = policy.delay_for(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying after failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn exponential_delays_double() {
        let policy = BackoffPolicy::exponential(3, Duration::from_millis(500));
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
    }

    #[test]
    fn linear_delays_grow_by_base() {
        let policy = BackoffPolicy::linear(3, Duration::from_millis(500));
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1500));
    }

    #[test]
    fn huge_attempt_saturates() {
        let policy = BackoffPolicy::exponential(3, Duration::from_millis(500));
        assert!(policy.delay_for(200) >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_stops_on_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = BackoffPolicy::exponential(5, Duration::from_millis(10));
        let c = Arc::clone(&calls);
        let result: Result<u32, &str> = retry(&policy, |_| true, move |attempt| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                if attempt < 2 { Err("boom") } else { Ok(attempt) }
            }
        })
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = BackoffPolicy::exponential(3, Duration::from_millis(500));
        let c = Arc::clone(&calls);
        let start = tokio::time::Instant::now();
        let result: Result<(), &str> = retry(&policy, |_| true, move |_| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err("down")
            }
        })
        .await;
        assert_eq!(result, Err("down"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Sleeps after attempts 0 and 1 only.
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_skips_non_retryable_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = BackoffPolicy::linear(3, Duration::from_millis(500));
        let c = Arc::clone(&calls);
        let result: Result<(), &str> = retry(&policy, |e| *e == "busy", move |_| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err("fatal")
            }
        })
        .await;
        assert_eq!(result, Err("fatal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let policy = BackoffPolicy::exponential(0, Duration::from_millis(1));
        let result: Result<(), &str> = retry(&policy, |_| true, |_| async { Err("x") }).await;
        assert_eq!(result, Err("x"));
    }
}
