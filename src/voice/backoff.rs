//! Bounded exponential backoff for the signaling connection.

use std::time::Duration;

const DEFAULT_BASE: Duration = Duration::from_secs(1);
const DEFAULT_CAP: Duration = Duration::from_secs(5);
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// How often and how fast to retry a lost signaling connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// First delay. Defaults to **1 s**.
    pub base: Duration,
    /// Longest delay. Defaults to **5 s**.
    pub cap: Duration,
    /// Automatic attempts before giving up. Defaults to **3**.
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new() -> Self {
        Self {
            base: DEFAULT_BASE,
            cap: DEFAULT_CAP,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    #[must_use]
    pub fn with_cap(mut self, cap: Duration) -> Self {
        self.cap = cap;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// `min(base * 2^attempt, cap)`.
    ///
    /// ```
    /// use std::time::Duration;
    /// use escape_sync_client::voice::ReconnectPolicy;
    ///
    /// let policy = ReconnectPolicy::default();
    /// assert_eq!(policy.delay_for(0), Duration::from_secs(1));
    /// assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    /// assert_eq!(policy.delay_for(3), Duration::from_secs(5));
    /// ```
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.cap, |delay| delay.min(self.cap))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// What to do about a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffDecision {
    /// Schedule retry number `attempt` (0-based) after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// Attempts are used up. Reported once.
    Exhausted { attempts: u32 },
    /// Nothing to do: a retry is already pending, or the user has to
    /// reconnect by hand.
    Idle,
}

/// Retry bookkeeping for one signaling connection.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
    retry_pending: bool,
    exhausted: bool,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            retry_pending: false,
            exhausted: false,
        }
    }

    /// Attempts made since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// The connection dropped.
    pub fn on_disconnected(&mut self) -> BackoffDecision {
        if self.retry_pending || self.exhausted {
            return BackoffDecision::Idle;
        }
        if self.attempts < self.policy.max_attempts {
            self.retry_pending = true;
            BackoffDecision::Retry {
                attempt: self.attempts,
                delay: self.policy.delay_for(self.attempts),
            }
        } else {
            self.exhausted = true;
            BackoffDecision::Exhausted {
                attempts: self.attempts,
            }
        }
    }

    /// The scheduled retry fired and a reconnect is being made. Returns the
    /// attempt count after this one.
    pub fn on_retry(&mut self) -> u32 {
        self.retry_pending = false;
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// The connection is open again. Also used for a manual reconnect.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.retry_pending = false;
        self.exhausted = false;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn three_retries_then_exhausted_once() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());
        let mut delays = Vec::new();
        for _ in 0..3 {
            match backoff.on_disconnected() {
                BackoffDecision::Retry { delay, .. } => delays.push(delay.as_secs()),
                other => panic!("expected retry, got {other:?}"),
            }
            backoff.on_retry();
        }
        assert_eq!(delays, vec![1, 2, 4]);
        assert_eq!(
            backoff.on_disconnected(),
            BackoffDecision::Exhausted { attempts: 3 }
        );
        assert_eq!(backoff.on_disconnected(), BackoffDecision::Idle);
    }

    #[test]
    fn disconnect_while_retry_pending_is_idle() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());
        assert!(matches!(
            backoff.on_disconnected(),
            BackoffDecision::Retry { attempt: 0, .. }
        ));
        assert_eq!(backoff.on_disconnected(), BackoffDecision::Idle);
    }

    #[test]
    fn reset_restores_the_budget() {
        let mut backoff = Backoff::new(ReconnectPolicy::new().with_max_attempts(1));
        backoff.on_disconnected();
        backoff.on_retry();
        assert!(matches!(
            backoff.on_disconnected(),
            BackoffDecision::Exhausted { .. }
        ));
        backoff.reset();
        assert!(!backoff.is_exhausted());
        assert!(matches!(
            backoff.on_disconnected(),
            BackoffDecision::Retry { attempt: 0, .. }
        ));
    }

    #[test]
    fn delay_saturates_at_cap() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }
}
