//! Bounded-retry convergence waiting
//!
//! [`ConvergenceWaiter`] repeatedly invokes a probe until it reports ready,
//! reports a fatal error, or the timeout elapses. It is used inside components
//! (for example to wait until an installed definition is established) and by
//! external validators.
//!
//! The probe is invoked immediately; between attempts the waiter sleeps for
//! `min(poll_interval, time remaining)`, so it never returns a timeout before
//! the timeout has elapsed and never overshoots it by more than one probe
//! execution.

use crate::error::ConvergenceError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Result of a single probe attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome<T, E> {
    /// Converged, with the probe's payload
    Ready(T),
    /// Not yet; retry after the poll interval
    Pending(String),
    /// Give up immediately
    Failed(E),
}

impl<T, E> ProbeOutcome<T, E> {
    /// Shorthand for [`ProbeOutcome::Pending`]
    pub fn pending(reason: impl Into<String>) -> Self {
        ProbeOutcome::Pending(reason.into())
    }
}

/// Waits for a probe to converge within a deadline.
///
/// A waiter is a small value; clone it freely. Each call to
/// [`wait`](Self::wait) has its own deadline.
#[derive(Debug, Clone)]
pub struct ConvergenceWaiter {
    timeout: Duration,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl ConvergenceWaiter {
    /// Requires `0 < poll_interval <= timeout`.
    pub fn new(timeout: Duration, poll_interval: Duration) -> Result<Self, ConvergenceError> {
        if poll_interval.is_zero() {
            return Err(ConvergenceError::InvalidConfig(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if poll_interval > timeout {
            return Err(ConvergenceError::InvalidConfig(format!(
                "poll interval {poll_interval:?} exceeds timeout {timeout:?}"
            )));
        }
        Ok(Self {
            timeout,
            poll_interval,
            cancel: CancellationToken::new(),
        })
    }

    /// Abort waits when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Deadline applied to each wait
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Delay between probe runs
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Poll `probe` until it is ready.
    ///
    /// `operation` names what is being waited for in logs and errors.
    pub async fn wait<F, Fut, T, E>(&self, operation: &str, mut probe: F) -> Result<T, ConvergenceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProbeOutcome<T, E>>,
    {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut attempt: u32 = 0;
        let mut last_pending: Option<String> = None;

        loop {
            attempt += 1;
            let outcome = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    debug!(operation, attempt, "Wait cancelled during probe");
                    return Err(ConvergenceError::Cancelled {
                        operation: operation.to_string(),
                        last_pending,
                    });
                }
                outcome = probe() => outcome,
            };

            let reason = match outcome {
                ProbeOutcome::Ready(value) => {
                    debug!(operation, attempt, elapsed = ?start.elapsed(), "Converged");
                    return Ok(value);
                }
                ProbeOutcome::Failed(source) => {
                    debug!(operation, attempt, "Probe reported a fatal condition");
                    return Err(ConvergenceError::Probe {
                        operation: operation.to_string(),
                        source,
                    });
                }
                ProbeOutcome::Pending(reason) => reason,
            };

            let now = Instant::now();
            if now >= deadline {
                let elapsed = now - start;
                warn!(operation, attempt, reason = %reason, ?elapsed, "Timed out waiting for convergence");
                return Err(ConvergenceError::Timeout {
                    operation: operation.to_string(),
                    elapsed,
                    attempts: attempt,
                    last_pending: reason,
                });
            }

            debug!(operation, attempt, reason = %reason, "Not converged yet");
            last_pending = Some(reason);
            let pause = self.poll_interval.min(deadline - now);
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    debug!(operation, attempt, "Wait cancelled while sleeping");
                    return Err(ConvergenceError::Cancelled {
                        operation: operation.to_string(),
                        last_pending,
                    });
                }
                () = tokio::time::sleep(pause) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn waiter(timeout_ms: u64, interval_ms: u64) -> ConvergenceWaiter {
        ConvergenceWaiter::new(Duration::from_millis(timeout_ms), Duration::from_millis(interval_ms)).unwrap()
    }

    #[test]
    fn test_rejects_invalid_settings() {
        assert!(matches!(
            ConvergenceWaiter::new(Duration::from_secs(1), Duration::ZERO),
            Err(ConvergenceError::InvalidConfig(_))
        ));
        assert!(matches!(
            ConvergenceWaiter::new(Duration::from_secs(1), Duration::from_secs(2)),
            Err(ConvergenceError::InvalidConfig(_))
        ));
        assert!(ConvergenceWaiter::new(Duration::from_secs(1), Duration::from_secs(1)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_pending_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let w = waiter(1_000, 10);
        let start = Instant::now();

        let result: Result<&str, ConvergenceError<()>> = w
            .wait("three pendings", || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                        ProbeOutcome::pending("warming up")
                    } else {
                        ProbeOutcome::Ready("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(start.elapsed() <= w.timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_is_immediate() {
        let start = Instant::now();
        let w = waiter(1_000, 500);
        let result: Result<(), ConvergenceError<()>> = w
            .wait("immediate", || async { ProbeOutcome::Ready(()) })
            .await;
        assert!(result.is_ok());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_bounded_by_timeout_plus_one_probe() {
        let probe_cost = Duration::from_millis(7);
        let start = Instant::now();
        let w = waiter(100, 30);

        let result: Result<(), ConvergenceError<()>> = w
            .wait("never ready", || async move {
                tokio::time::sleep(probe_cost).await;
                ProbeOutcome::pending("still starting")
            })
            .await;

        let elapsed = start.elapsed();
        match result {
            Err(ConvergenceError::Timeout { last_pending, attempts, .. }) => {
                assert_eq!(last_pending, "still starting");
                assert!(attempts >= 2);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed <= Duration::from_millis(100) + probe_cost);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_is_clamped_to_remaining_time() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let start = Instant::now();
        let w = waiter(100, 60);

        let result: Result<(), ConvergenceError<()>> = w
            .wait("clamped", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { ProbeOutcome::pending("nope") }
            })
            .await;

        assert!(result.unwrap_err().is_timeout());
        // attempts at 0ms, 60ms and 100ms
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(start.elapsed() < Duration::from_millis(102));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tiny_timeout_still_probes_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let w = ConvergenceWaiter::new(Duration::from_nanos(1), Duration::from_nanos(1)).unwrap();

        let result: Result<(), ConvergenceError<()>> = w
            .wait("tiny", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { ProbeOutcome::pending("nope") }
            })
            .await;

        assert!(result.unwrap_err().is_timeout());
        assert!(calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let start = Instant::now();
        let w = waiter(10_000, 100);

        let result: Result<(), ConvergenceError<String>> = w
            .wait("fatal", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { ProbeOutcome::Failed("name conflict".to_string()) }
            })
            .await;

        match result {
            Err(ConvergenceError::Probe { source, operation }) => {
                assert_eq!(source, "name conflict");
                assert_eq!(operation, "fatal");
            }
            other => panic!("expected probe failure, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_sleep() {
        let token = CancellationToken::new();
        let w = waiter(60_000, 5_000).with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1_500)).await;
            token.cancel();
        });

        let start = Instant::now();
        let result: Result<(), ConvergenceError<()>> = w
            .wait("cancellable", || async { ProbeOutcome::pending("waiting on node") })
            .await;
        canceller.await.unwrap();

        match result {
            Err(ConvergenceError::Cancelled { last_pending, .. }) => {
                assert_eq!(last_pending.as_deref(), Some("waiting on node"));
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_waiters_do_not_share_deadlines() {
        let w = waiter(50, 10);
        let slow = w.wait("slow", || async { ProbeOutcome::<(), ()>::pending("slow") });
        let fast = w.wait("fast", || async { ProbeOutcome::<u8, ()>::Ready(1) });
        let (slow, fast) = tokio::join!(slow, fast);
        assert!(slow.unwrap_err().is_timeout());
        assert_eq!(fast.unwrap(), 1);
    }
}
