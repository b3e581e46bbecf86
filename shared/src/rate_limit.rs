//! Per-user minimum interval between alert triggers.
//!
//! State lives in process memory only: a cold start resets it and separate
//! Lambda instances each keep their own map.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

pub const ALERT_INTERVAL: Duration = Duration::from_secs(10);

pub struct RateLimiter {
    interval: Duration,
    last_triggered: DashMap<String, Instant>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(ALERT_INTERVAL)
    }
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_triggered: DashMap::new(),
        }
    }

    /// Time left before `subject` may trigger again, `None` if allowed now.
    pub fn retry_after(&self, subject: &str, now: Instant) -> Option<Duration> {
        let last = *self.last_triggered.get(subject)?;
        self.remaining(last, now)
    }

    pub fn allow(&self, subject: &str, now: Instant) -> bool {
        self.retry_after(subject, now).is_none()
    }

    pub fn record(&self, subject: &str, now: Instant) {
        self.evict_expired(now);
        self.last_triggered.insert(subject.to_string(), now);
    }

    /// Check and record in one step, holding the entry for `subject`.
    pub fn try_acquire(&self, subject: &str, now: Instant) -> Result<(), Duration> {
        // Must run before the entry guard is taken.
        self.evict_expired(now);
        match self.last_triggered.entry(subject.to_string()) {
            Entry::Occupied(mut entry) => {
                if let Some(wait) = self.remaining(*entry.get(), now) {
                    return Err(wait);
                }
                entry.insert(now);
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
            }
        }
        Ok(())
    }

    /// Number of subjects still inside their interval or not yet evicted.
    pub fn tracked(&self) -> usize {
        self.last_triggered.len()
    }

    /// Drop subjects whose interval has fully elapsed.
    fn evict_expired(&self, now: Instant) {
        self.last_triggered
            .retain(|_, last| self.remaining(*last, now).is_some());
    }

    fn remaining(&self, last: Instant, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(last);
        (elapsed < self.interval).then(|| self.interval - elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_trigger_within_interval_is_rejected() {
        let limiter = RateLimiter::default();
        let start = Instant::now();

        assert!(limiter.allow("alice", start));
        limiter.record("alice", start);

        assert!(!limiter.allow("alice", start + Duration::from_secs(9)));
        assert!(limiter.allow("alice", start + Duration::from_secs(11)));
    }

    #[test]
    fn test_subjects_are_independent() {
        let limiter = RateLimiter::default();
        let start = Instant::now();
        limiter.record("alice", start);
        assert!(limiter.allow("bob", start));
    }

    #[test]
    fn test_try_acquire_reports_remaining_wait() {
        let limiter = RateLimiter::default();
        let start = Instant::now();

        assert!(limiter.try_acquire("alice", start).is_ok());
        assert_eq!(
            limiter.try_acquire("alice", start + Duration::from_secs(9)),
            Err(Duration::from_secs(1))
        );
        // A rejected attempt does not push the window forward.
        assert!(limiter.try_acquire("alice", start + Duration::from_secs(10)).is_ok());
        assert!(limiter.try_acquire("alice", start + Duration::from_secs(15)).is_err());
    }

    #[test]
    fn test_elapsed_subjects_are_evicted() {
        let limiter = RateLimiter::default();
        let start = Instant::now();

        for user in ["alice", "bob", "carol"] {
            assert!(limiter.try_acquire(user, start).is_ok());
        }
        assert_eq!(limiter.tracked(), 3);

        limiter.record("dave", start + Duration::from_secs(5));
        assert_eq!(limiter.tracked(), 4);

        assert!(limiter.try_acquire("erin", start + Duration::from_secs(11)).is_ok());
        assert_eq!(limiter.tracked(), 2);
        assert!(!limiter.allow("dave", start + Duration::from_secs(11)));
        assert!(limiter.allow("alice", start + Duration::from_secs(11)));
    }
}
