use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::error::ScrapeError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    /// Symmetric jitter, e.g. `0.25` for ±25%.
    pub jitter_fraction: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            multiplier: 2.0,
            jitter_fraction: 0.25,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Un-jittered delay before `attempt` (1-based). The first attempt runs
    /// immediately; attempt n >= 2 waits `base * multiplier^(n-2)`, capped.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2) as i32;
        let millis = self.base_delay_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        Duration::from_millis(millis.min(self.max_delay_ms as f64) as u64)
    }

    /// Jittered delay before `attempt`, never above the cap.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        if nominal.is_zero() {
            return nominal;
        }

        let jitter = self.jitter_fraction.clamp(0.0, 1.0);
        let factor = if jitter > 0.0 {
            1.0 + rand::rng().random_range(-jitter..=jitter)
        } else {
            1.0
        };
        let millis = (nominal.as_millis() as f64 * factor).max(0.0) as u64;

        Duration::from_millis(millis).min(self.max_delay())
    }
}

/// Run `operation` until it succeeds, fails terminally, or the policy's
/// attempts are used up. The closure receives the 1-based attempt number.
///
/// The error of the final attempt is returned to the caller, which owns the
/// decision of what one failed unit of work means.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, ScrapeError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ScrapeError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    log::debug!("{} succeeded on attempt {}/{}", label, attempt, max_attempts);
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => {
                log::warn!("{} failed terminally on attempt {}: {}", label, attempt, e);
                return Err(e);
            }
            Err(e) if attempt >= max_attempts => {
                log::warn!("{} failed after {} attempts: {}", label, attempt, e);
                return Err(e);
            }
            Err(e) => {
                attempt += 1;
                let delay = policy.delay_for_attempt(attempt);
                log::warn!(
                    "{} failed ({}), retrying in {:?} (attempt {}/{})",
                    label, e, delay, attempt, max_attempts
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
