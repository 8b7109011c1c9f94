//! Bounded exponential retry policy.
//!
//! Used to wait for asynchronous state transitions (a state machine becoming
//! `ACTIVE`) and to ride out transient conflicts (a version still referenced
//! by an alias whose update has not propagated yet).
//!
//! ```
//! use std::time::Duration;
//! use stepctl_remote::RetryPolicy;
//!
//! # async fn example() {
//! let policy = RetryPolicy::new(Duration::from_millis(10), Duration::from_millis(80), 3);
//! let mut attempts = policy.start();
//! while attempts.next().await {
//!     // try the operation, `break` on success
//! }
//! # }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy with a minimum delay, maximum delay and attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the second attempt.
    pub min_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::wait_for_active()
    }
}

impl RetryPolicy {
    /// Create a new policy.
    #[must_use]
    pub const fn new(min_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            min_delay,
            max_delay,
            max_attempts,
        }
    }

    /// Policy for polling a state machine until it is `ACTIVE`.
    #[must_use]
    pub const fn wait_for_active() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(10), 10)
    }

    /// Policy for deleting a version whose alias reference is still clearing.
    #[must_use]
    pub const fn delete_version() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(5), 5)
    }

    /// Delay to apply after the given number of failed attempts (1-based).
    #[must_use]
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(31);
        self.min_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Begin a sequence of attempts under this policy.
    #[must_use]
    pub const fn start(&self) -> Attempts {
        Attempts {
            policy: *self,
            attempt: 0,
        }
    }
}

/// A running sequence of attempts.
#[derive(Debug)]
pub struct Attempts {
    policy: RetryPolicy,
    attempt: u32,
}

impl Attempts {
    /// Wait for and grant the next attempt.
    ///
    /// The first call returns immediately. Later calls sleep for the backoff
    /// delay first. Returns `false` once the attempt budget is spent.
    pub async fn next(&mut self) -> bool {
        if self.attempt >= self.policy.max_attempts {
            return false;
        }
        if self.attempt > 0 {
            tokio::time::sleep(self.policy.delay_for(self.attempt)).await;
        }
        self.attempt += 1;
        true
    }

    /// Number of attempts granted so far.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_and_cap() {
        let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(5), 10);
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn grants_exactly_max_attempts() {
        let policy = RetryPolicy::new(Duration::from_millis(10), Duration::from_millis(20), 3);
        let mut attempts = policy.start();
        let mut count = 0;
        while attempts.next().await {
            count += 1;
        }
        assert_eq!(count, 3);
        assert_eq!(attempts.attempt(), 3);
        assert!(!attempts.next().await);
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_is_immediate() {
        let policy = RetryPolicy::new(Duration::from_secs(60), Duration::from_secs(60), 2);
        let start = tokio::time::Instant::now();
        let mut attempts = policy.start();
        assert!(attempts.next().await);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(attempts.next().await);
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn zero_budget_grants_nothing() {
        let policy = RetryPolicy::new(Duration::ZERO, Duration::ZERO, 0);
        assert!(!policy.start().next().await);
    }
}
