//! Client-side redial delays: capped exponential backoff with jitter.
//!
//! The delay before attempt `n` (1-based) is drawn uniformly from the upper
//! half of `min(base * factor^(n-1), max_delay)`. Half-jitter keeps a crowd
//! of clients that lost the same server from redialing in lockstep while
//! still guaranteeing each waits at least half the nominal delay.

use std::time::Duration;

use rand::Rng;

/// How a client spaces out reconnection attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Nominal delay before the first attempt. Default: 1 second.
    pub base_delay: Duration,
    /// Growth factor per attempt. Default: 2.
    pub factor: u32,
    /// Upper bound on the nominal delay. Default: 10 seconds.
    pub max_delay: Duration,
    /// Attempts before giving up. `0` disables reconnection. Default: 10.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            factor: 2,
            max_delay: Duration::from_secs(10),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never redials.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// The un-jittered delay before `attempt` (1-based), or `None` once
    /// attempts are exhausted.
    pub fn ceiling(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let multiplier = self.factor.saturating_pow(attempt - 1);
        Some(self.base_delay.saturating_mul(multiplier).min(self.max_delay))
    }

    /// The jittered delay before `attempt`, using the thread-local RNG.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        self.delay_with(attempt, &mut rand::rng())
    }

    /// The jittered delay before `attempt`, drawing from `rng`.
    pub fn delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Option<Duration> {
        let ceiling = self.ceiling(attempt)?;
        let ceiling_ms = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        if ceiling_ms == 0 {
            return Some(Duration::ZERO);
        }
        let floor_ms = ceiling_ms / 2;
        Some(Duration::from_millis(rng.random_range(floor_ms..=ceiling_ms)))
    }

    /// Starts a fresh attempt counter over this policy.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            attempt: 0,
        }
    }
}

/// A running attempt counter over a [`ReconnectPolicy`].
///
/// ```rust
/// use watchparty_session::ReconnectPolicy;
///
/// let mut backoff = ReconnectPolicy::default().backoff();
/// let first = backoff.next_delay().unwrap();
/// assert!(first.as_millis() >= 500 && first.as_millis() <= 1000);
/// assert_eq!(backoff.attempt(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    /// Advances to the next attempt and returns how long to wait before it,
    /// or `None` once the policy's attempts are used up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let next = self.attempt.checked_add(1)?;
        let delay = self.policy.delay(next)?;
        self.attempt = next;
        Some(delay)
    }

    /// The number of attempts handed out so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Resets the counter after a successful reconnect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_ceiling_doubles_then_caps() {
        let policy = ReconnectPolicy::default();
        let secs: Vec<u64> = (1..=6)
            .map(|n| policy.ceiling(n).unwrap().as_secs())
            .collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn test_ceiling_none_after_max_attempts() {
        let policy = ReconnectPolicy::default();
        assert!(policy.ceiling(10).is_some());
        assert!(policy.ceiling(11).is_none());
        assert!(policy.ceiling(0).is_none());
    }

    #[test]
    fn test_delay_stays_in_upper_half_of_ceiling() {
        let policy = ReconnectPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 1..=10 {
            let ceiling = policy.ceiling(attempt).unwrap();
            for _ in 0..50 {
                let delay = policy.delay_with(attempt, &mut rng).unwrap();
                assert!(delay <= ceiling, "{delay:?} > {ceiling:?}");
                assert!(delay >= ceiling / 2, "{delay:?} < half of {ceiling:?}");
            }
        }
    }

    #[test]
    fn test_huge_attempt_count_saturates_instead_of_overflowing() {
        let policy = ReconnectPolicy {
            max_attempts: u32::MAX,
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.ceiling(200), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_disabled_policy_never_yields_a_delay() {
        let mut backoff = ReconnectPolicy::disabled().backoff();
        assert!(backoff.next_delay().is_none());
        assert_eq!(backoff.attempt(), 0);
    }

    #[test]
    fn test_backoff_exhausts_then_resets() {
        let policy = ReconnectPolicy {
            max_attempts: 3,
            ..ReconnectPolicy::default()
        };
        let mut backoff = policy.backoff();
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
        assert_eq!(backoff.attempt(), 3);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert!(backoff.next_delay().is_some());
    }

    #[test]
    fn test_zero_base_delay_yields_zero() {
        let policy = ReconnectPolicy {
            base_delay: Duration::ZERO,
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.delay(1), Some(Duration::ZERO));
    }
}
