//! Pure reconnection decision logic
//!
//! A [`ReconnectState`] is created fresh for each disconnect episode. Every
//! call to [`ReconnectState::next_decision`] says whether another attempt is
//! allowed and how long to wait before it; [`ReconnectState::record_failure`]
//! advances the attempt count and grows the delay geometrically up to the
//! ceiling.

use crate::config::ReconnectSection;
use std::time::Duration;

/// Backoff constants for one episode
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt
    pub first_delay: Duration,
    /// Multiplier applied after each failed attempt
    pub rate: f64,
    /// Upper bound for any single delay
    pub ceiling: Duration,
    /// Attempts allowed per episode
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            first_delay: Duration::from_secs(1),
            rate: 2.0,
            ceiling: Duration::from_secs(60),
            max_attempts: 12,
        }
    }
}

impl From<&ReconnectSection> for ReconnectPolicy {
    fn from(section: &ReconnectSection) -> Self {
        Self {
            first_delay: Duration::from_secs(section.first_delay_secs),
            rate: section.rate,
            ceiling: Duration::from_secs(section.max_delay_secs),
            max_attempts: section.max_attempts,
        }
    }
}

impl ReconnectPolicy {
    /// Delays an episode would wait if every attempt failed
    pub fn delay_schedule(&self) -> Vec<Duration> {
        let mut state = ReconnectState::new(self);
        let mut delays = Vec::with_capacity(self.max_attempts as usize);
        while let ReconnectionDecision::Proceed { delay, .. } = state.next_decision() {
            delays.push(delay);
            state.record_failure();
        }
        delays
    }

    /// Upper bound on the time an exhausted episode spends sleeping
    pub fn total_backoff(&self) -> Duration {
        self.delay_schedule().into_iter().sum()
    }
}

/// What the reconnect task should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectionDecision {
    /// Sleep `delay`, then make attempt number `attempt` (1-based)
    Proceed { attempt: u32, delay: Duration },
    /// All attempts used
    Exhausted { attempts: u32 },
}

/// Per-episode backoff state
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectState {
    attempts: u32,
    delay: Duration,
    rate: f64,
    ceiling: Duration,
    max_attempts: u32,
}

impl ReconnectState {
    pub fn new(policy: &ReconnectPolicy) -> Self {
        Self {
            attempts: 0,
            delay: policy.first_delay.min(policy.ceiling),
            rate: policy.rate,
            ceiling: policy.ceiling,
            max_attempts: policy.max_attempts,
        }
    }

    /// Failed attempts so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn current_delay(&self) -> Duration {
        self.delay
    }

    pub fn next_decision(&self) -> ReconnectionDecision {
        if self.attempts >= self.max_attempts {
            ReconnectionDecision::Exhausted {
                attempts: self.attempts,
            }
        } else {
            ReconnectionDecision::Proceed {
                attempt: self.attempts + 1,
                delay: self.delay,
            }
        }
    }

    /// Count a failed attempt and grow the delay
    ///
    /// Growth saturates at the ceiling, including when the product no longer
    /// fits in a `Duration`.
    pub fn record_failure(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
        self.delay = Duration::try_from_secs_f64(self.delay.as_secs_f64() * self.rate)
            .map_or(self.ceiling, |grown| grown.min(self.ceiling));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|s| Duration::from_secs(*s)).collect()
    }

    #[test]
    fn test_default_schedule() {
        let policy = ReconnectPolicy::default();
        assert_eq!(
            policy.delay_schedule(),
            secs(&[1, 2, 4, 8, 16, 32, 60, 60, 60, 60, 60, 60])
        );
        assert_eq!(policy.total_backoff(), Duration::from_secs(423));
    }

    #[test]
    fn test_first_decision_uses_first_delay() {
        let state = ReconnectState::new(&ReconnectPolicy::default());
        assert_eq!(
            state.next_decision(),
            ReconnectionDecision::Proceed {
                attempt: 1,
                delay: Duration::from_secs(1),
            }
        );
    }

    #[test]
    fn test_exhausted_after_max_attempts() {
        let policy = ReconnectPolicy {
            max_attempts: 3,
            ..ReconnectPolicy::default()
        };
        let mut state = ReconnectState::new(&policy);
        for _ in 0..3 {
            assert!(matches!(
                state.next_decision(),
                ReconnectionDecision::Proceed { .. }
            ));
            state.record_failure();
        }
        assert_eq!(
            state.next_decision(),
            ReconnectionDecision::Exhausted { attempts: 3 }
        );
    }

    #[test]
    fn test_first_delay_clamped_to_ceiling() {
        let policy = ReconnectPolicy {
            first_delay: Duration::from_secs(90),
            ceiling: Duration::from_secs(60),
            ..ReconnectPolicy::default()
        };
        let state = ReconnectState::new(&policy);
        assert_eq!(state.current_delay(), Duration::from_secs(60));
    }

    #[test]
    fn test_rate_one_keeps_delay_constant() {
        let policy = ReconnectPolicy {
            first_delay: Duration::from_secs(5),
            rate: 1.0,
            ceiling: Duration::from_secs(60),
            max_attempts: 4,
        };
        assert_eq!(policy.delay_schedule(), secs(&[5, 5, 5, 5]));
    }

    #[test]
    fn test_fractional_rate() {
        let policy = ReconnectPolicy {
            first_delay: Duration::from_secs(2),
            rate: 1.5,
            ceiling: Duration::from_secs(10),
            max_attempts: 6,
        };
        let schedule = policy.delay_schedule();
        assert_eq!(schedule[0], Duration::from_secs(2));
        assert_eq!(schedule[1], Duration::from_secs(3));
        assert_eq!(schedule[2], Duration::from_millis(4500));
        assert_eq!(schedule[5], Duration::from_secs(10));
    }

    #[test]
    fn test_huge_rate_saturates_at_ceiling() {
        let section = ReconnectSection {
            first_delay_secs: 1,
            rate: 1e20,
            max_delay_secs: 60,
            max_attempts: 4,
        };
        assert!(section.validate().is_ok());

        let policy = ReconnectPolicy::from(&section);
        assert_eq!(policy.delay_schedule(), secs(&[1, 60, 60, 60]));
    }

    #[test]
    fn test_overflowing_growth_saturates_at_ceiling() {
        let policy = ReconnectPolicy {
            first_delay: Duration::from_secs(1),
            rate: f64::MAX,
            ceiling: Duration::from_secs(30),
            max_attempts: 3,
        };
        assert_eq!(policy.delay_schedule(), secs(&[1, 30, 30]));
    }

    #[test]
    fn test_delay_never_exceeds_ceiling() {
        let policy = ReconnectPolicy {
            first_delay: Duration::from_secs(1),
            rate: 10.0,
            ceiling: Duration::from_secs(7),
            max_attempts: 20,
        };
        assert!(policy
            .delay_schedule()
            .iter()
            .all(|delay| *delay <= policy.ceiling));
    }

    #[test]
    fn test_policy_from_config_section() {
        let section = ReconnectSection {
            first_delay_secs: 3,
            rate: 3.0,
            max_delay_secs: 30,
            max_attempts: 5,
        };
        let policy = ReconnectPolicy::from(&section);
        assert_eq!(policy.delay_schedule(), secs(&[3, 9, 27, 30, 30]));
    }
}
