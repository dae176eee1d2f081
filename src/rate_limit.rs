use governor::{DefaultKeyedRateLimiter, Quota};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use crate::models::DelayRange;

pub struct RateLimiter {
    delay_range: DelayRange,
    next_slot: Mutex<HashMap<String, Instant>>,
    quota: Option<DefaultKeyedRateLimiter<String>>,
}

impl RateLimiter {
    pub fn new(delay_range: DelayRange) -> Self {
        Self {
            delay_range,
            next_slot: Mutex::new(HashMap::new()),
            quota: None,
        }
    }

    /// Additionally cap navigations per domain per minute.
    pub fn with_quota(mut self, per_minute: Option<u32>) -> Self {
        self.quota = per_minute
            .and_then(NonZeroU32::new)
            .map(|n| DefaultKeyedRateLimiter::keyed(Quota::per_minute(n)));
        self
    }

    /// Grouping key for a URL: its host, or the whole URL when it has none.
    pub fn target_key(url: &Url) -> String {
        url.host_str()
            .map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
            .unwrap_or_else(|| url.as_str().to_string())
    }

    pub fn sample_delay(&self) -> Duration {
        self.delay_range.sample(&mut rand::rng())
    }

    /// Reserve the next slot for `key` and sleep until it arrives.
    pub async fn wait(&self, key: &str) {
        let ready_at = self.reserve(key, Instant::now());
        let wait = ready_at.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            log::debug!("Rate limiting {}: waiting {:?}", key, wait);
        }
        tokio::time::sleep_until(ready_at).await;

        if let Some(quota) = &self.quota {
            quota.until_key_ready(&key.to_string()).await;
        }
    }

    fn reserve(&self, key: &str, now: Instant) -> Instant {
        let delay = self.sample_delay();
        let mut slots = self
            .next_slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let start = slots.get(key).copied().filter(|t| *t > now).unwrap_or(now);
        let ready_at = start + delay;
        slots.insert(key.to_string(), ready_at);
        ready_at
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DelayRange::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_target_key_groups_by_host() {
        let a = Url::parse("https://www.Example.test/news/1").unwrap();
        let b = Url::parse("https://example.test/blog/2").unwrap();
        let c = Url::parse("https://other.test/").unwrap();

        assert_eq!(RateLimiter::target_key(&a), RateLimiter::target_key(&b));
        assert_ne!(RateLimiter::target_key(&a), RateLimiter::target_key(&c));
    }

    #[test]
    fn test_sampled_delays_within_range() {
        let limiter = RateLimiter::new(DelayRange::new(2.0, 5.0).unwrap());
        for _ in 0..1000 {
            let delay = limiter.sample_delay().as_secs_f64();
            assert!((2.0..=5.0).contains(&delay));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_domain_is_spaced() {
        let limiter = RateLimiter::new(DelayRange::new(1.0, 1.0).unwrap());
        let start = Instant::now();

        limiter.wait("example.test").await;
        limiter.wait("example.test").await;

        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_domains_are_not_serialized() {
        let limiter = Arc::new(RateLimiter::new(DelayRange::new(1.0, 1.0).unwrap()));
        let start = Instant::now();

        let a = tokio::spawn({
            let limiter = limiter.clone();
            async move { limiter.wait("a.test").await }
        });
        let b = tokio::spawn({
            let limiter = limiter.clone();
            async move { limiter.wait("b.test").await }
        });
        a.await.unwrap();
        b.await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_reservations_queue_behind_each_other() {
        let limiter = RateLimiter::new(DelayRange::new(3.0, 3.0).unwrap());
        let now = Instant::now();

        let first = limiter.reserve("example.test", now);
        let second = limiter.reserve("example.test", now);
        let other = limiter.reserve("other.test", now);

        assert_eq!(first - now, Duration::from_secs(3));
        assert_eq!(second - now, Duration::from_secs(6));
        assert_eq!(other - now, Duration::from_secs(3));
    }
}
