//! # Fibonacci Backoff
//!
//! Requeue delays after blocked cycles. The sequence grows more slowly than
//! exponential backoff: with a 10s minimum and 300s cap it runs
//! 10s, 10s, 20s, 30s, 50s, 80s, 130s, 210s, 300s (max).

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each delay is the sum of the previous two, capped at `max`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min: Duration,
    prev: Duration,
    current: Duration,
    max: Duration,
}

impl FibonacciBackoff {
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            prev: Duration::ZERO,
            current: min,
            max,
        }
    }

    /// Get the next delay and advance the sequence
    pub fn next_delay(&mut self) -> Duration {
        let result = self.current;
        let next = self.prev.saturating_add(self.current);
        self.prev = self.current;
        self.current = next.min(self.max);
        result
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min;
    }
}

/// Consecutive-failure backoff per cluster (`namespace/name`)
#[derive(Debug)]
pub struct BackoffTracker {
    min: Duration,
    max: Duration,
    states: Mutex<HashMap<String, FibonacciBackoff>>,
}

impl BackoffTracker {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Next delay for a cluster whose cycle was blocked
    pub fn failure(&self, key: &str) -> Duration {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states
            .entry(key.to_string())
            .or_insert_with(|| FibonacciBackoff::new(self.min, self.max))
            .next_delay()
    }

    /// Forget a cluster's failures after a cycle that was not blocked
    pub fn success(&self, key: &str) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.remove(key);
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.states.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let mut backoff = FibonacciBackoff::new(secs(10), secs(300));
        let delays: Vec<u64> = (0..10).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![10, 10, 20, 30, 50, 80, 130, 210, 300, 300]);
    }

    #[test]
    fn test_fibonacci_backoff_reset() {
        let mut backoff = FibonacciBackoff::new(secs(10), secs(300));
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.next_delay(), secs(20));

        backoff.reset();

        assert_eq!(backoff.next_delay(), secs(10));
        assert_eq!(backoff.next_delay(), secs(10));
        assert_eq!(backoff.next_delay(), secs(20));
    }

    #[test]
    fn test_tracker_keeps_clusters_apart() {
        let tracker = BackoffTracker::new(secs(10), secs(300));
        assert_eq!(tracker.failure("px/a"), secs(10));
        assert_eq!(tracker.failure("px/a"), secs(10));
        assert_eq!(tracker.failure("px/a"), secs(20));
        assert_eq!(tracker.failure("px/b"), secs(10));

        tracker.success("px/a");
        assert_eq!(tracker.tracked(), 1);
        assert_eq!(tracker.failure("px/a"), secs(10));
        assert_eq!(tracker.failure("px/a"), secs(10));
        assert_eq!(tracker.failure("px/a"), secs(20));
    }

    #[test]
    fn test_success_drops_cluster_state() {
        let tracker = BackoffTracker::new(secs(10), secs(300));
        tracker.failure("px/gone");
        tracker.failure("px/gone");
        tracker.success("px/gone");
        tracker.success("px/never-failed");
        assert_eq!(tracker.tracked(), 0);
    }
}
