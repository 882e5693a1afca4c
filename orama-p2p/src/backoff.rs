//! Reconnection backoff state (§3 "Backoff state").

use crate::config::{BACKOFF_FLOOR, BACKOFF_JITTER, BACKOFF_MULTIPLIER, INITIAL_BACKOFF, MAX_BACKOFF};
use rand::Rng;
use std::time::Duration;

/// `(current_interval, consecutive_failures)`, mutated by one reconnection
/// loop per node.
#[derive(Debug, Clone)]
pub struct BackoffState {
    current_interval: Duration,
    consecutive_failures: u32,
}

impl BackoffState {
    pub fn new() -> Self {
        Self {
            current_interval: INITIAL_BACKOFF,
            consecutive_failures: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    /// Apply the §3 failure update: multiply by 1.5, cap at 10 min, then
    /// jitter ±20% (floor 1s). Returns the jittered sleep duration and
    /// advances `current_interval` to the pre-jitter capped value so the
    /// next failure multiplies from a stable base.
    pub fn on_failure(&mut self) -> Duration {
        self.consecutive_failures += 1;
        let next = self.current_interval.mul_f64(BACKOFF_MULTIPLIER);
        self.current_interval = next.min(MAX_BACKOFF);
        jitter(self.current_interval)
    }

    /// Reset on success (§3).
    pub fn on_success(&mut self) {
        self.current_interval = INITIAL_BACKOFF;
        self.consecutive_failures = 0;
    }
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::new()
    }
}

/// Jitter a base interval by ±20%, never below the 1s floor. Exposed
/// standalone so the jitter distribution itself is testable (property 3)
/// independent of the stateful `BackoffState` machinery.
pub fn jitter(base: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let factor = 1.0 + rng.gen_range(-BACKOFF_JITTER..=BACKOFF_JITTER);
    let jittered = base.mul_f64(factor.max(0.0));
    jittered.max(BACKOFF_FLOOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Property 3: next(10s) in (10s, 15s]; next(10min) = 10min; 100 samples
    // at base=10s all land in [8s, 12s] and never below the 1s floor.
    #[test]
    fn next_from_ten_seconds_is_between_ten_and_fifteen() {
        let mut state = BackoffState {
            current_interval: Duration::from_secs(10),
            consecutive_failures: 0,
        };
        let next = state.on_failure();
        assert!(next > Duration::from_secs(10));
        assert!(next <= Duration::from_secs(15));
    }

    #[test]
    fn next_from_max_stays_at_max() {
        let mut state = BackoffState {
            current_interval: MAX_BACKOFF,
            consecutive_failures: 0,
        };
        let next = state.on_failure();
        assert_eq!(state.current_interval, MAX_BACKOFF);
        // jitter still applies to the sleep duration itself
        assert!(next <= MAX_BACKOFF.mul_f64(1.2));
    }

    #[test]
    fn jitter_distribution_stays_within_bounds_and_above_floor() {
        for _ in 0..100 {
            let sample = jitter(Duration::from_secs(10));
            assert!(sample >= Duration::from_secs(8));
            assert!(sample <= Duration::from_secs(12));
            assert!(sample >= BACKOFF_FLOOR);
        }
    }

    #[test]
    fn success_resets_state() {
        let mut state = BackoffState::new();
        state.on_failure();
        state.on_failure();
        assert!(state.consecutive_failures() > 0);
        state.on_success();
        assert_eq!(state.consecutive_failures(), 0);
        assert_eq!(state.current_interval(), INITIAL_BACKOFF);
    }
}
