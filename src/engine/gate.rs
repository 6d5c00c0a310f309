//! Admission control for calls to the reasoning service.
//!
//! The gate enforces two limits with a single critical section:
//! - no more than `max_concurrent_requests` tasks running at once
//! - no more than `max_requests_per_minute` completions in any trailing
//!   60-second window
//!
//! Waiters take a ticket on arrival and only the ticket at the head of the
//! queue may be admitted, which keeps admission strictly FIFO. Running and
//! recently-finished tasks both count against the rate budget, so a burst of
//! concurrent admissions can never overshoot the window once they finish.

use crate::error::{GateError, ProviderError};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Length of the sliding rate window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Upper bound for a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(600);

/// Limits and retry policy for a [`RequestGate`].
#[derive(Debug, Clone, PartialEq)]
pub struct GateConfig {
    pub max_requests_per_minute: usize,
    pub max_concurrent_requests: usize,
    pub backoff_multiplier: f64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 50,
            max_concurrent_requests: 5,
            backoff_multiplier: 2.0,
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Live snapshot of the gate, taken under its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateStatus {
    pub active_requests: usize,
    pub queued_requests: usize,
    pub requests_in_last_minute: usize,
}

#[derive(Default)]
struct GateState {
    active: usize,
    /// Completion instants inside the rate window, oldest first.
    completions: VecDeque<Instant>,
    /// Waiting tickets in arrival order.
    queue: VecDeque<u64>,
    next_ticket: u64,
}

impl GateState {
    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.completions.front() {
            if now.duration_since(*oldest) >= RATE_WINDOW {
                self.completions.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Concurrency- and rate-limited executor with exponential backoff.
pub struct RequestGate {
    config: GateConfig,
    state: Mutex<GateState>,
    changed: Notify,
}

impl RequestGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            state: Mutex::new(GateState::default()),
            changed: Notify::new(),
        }
    }

    /// Run `task` under admission control, retrying retryable failures.
    ///
    /// Every attempt, retries included, waits for admission again. A
    /// non-retryable failure is returned immediately; once `max_retries`
    /// retries have failed the last error comes back wrapped in
    /// [`GateError::RetriesExhausted`].
    pub async fn execute<T, F, Fut>(&self, mut task: F) -> Result<T, GateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            let permit = self.admit().await;
            let outcome = task().await;
            drop(permit);

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() {
                debug!("Attempt {} failed with non-retryable error: {}", attempt + 1, err);
                return Err(GateError::Rejected(err));
            }

            if attempt >= self.config.max_retries {
                error!("Giving up after {} attempts: {}", attempt + 1, err);
                return Err(GateError::RetriesExhausted {
                    attempts: attempt + 1,
                    source: err,
                });
            }

            let delay = self.backoff_delay(attempt, err.retry_after());
            warn!(
                "Attempt {}/{} failed ({}), retrying in {:?}",
                attempt + 1,
                self.config.max_retries + 1,
                err,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// `base_delay × backoff_multiplier^attempt`, raised to the server's
    /// `Retry-After` hint when one was given.
    pub fn backoff_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let factor = self.config.backoff_multiplier.powi(attempt as i32);
        let delay = Duration::try_from_secs_f64(self.config.base_delay.as_secs_f64() * factor)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF);

        match retry_after {
            Some(hint) => delay.max(hint),
            None => delay,
        }
    }

    pub fn get_status(&self) -> GateStatus {
        let mut state = self.lock();
        state.prune(Instant::now());

        GateStatus {
            active_requests: state.active,
            queued_requests: state.queue.len(),
            requests_in_last_minute: state.completions.len(),
        }
    }

    /// Wait until this caller is at the head of the queue and both limits
    /// have room, then take a running slot.
    async fn admit(&self) -> GatePermit<'_> {
        let mut ticket = {
            let mut state = self.lock();
            let id = state.next_ticket;
            state.next_ticket += 1;
            state.queue.push_back(id);
            Ticket {
                gate: self,
                id,
                admitted: false,
            }
        };

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake_at = {
                let mut state = self.lock();
                let now = Instant::now();
                state.prune(now);

                let at_head = state.queue.front() == Some(&ticket.id);
                let has_slot = state.active < self.config.max_concurrent_requests;
                let has_budget =
                    state.active + state.completions.len() < self.config.max_requests_per_minute;

                if at_head && has_slot && has_budget {
                    state.queue.pop_front();
                    state.active += 1;
                    ticket.admitted = true;
                    drop(state);

                    // the next ticket may be admissible as well
                    self.changed.notify_waiters();
                    return GatePermit { gate: self };
                }

                if at_head && has_slot {
                    // rate-bound: budget frees up when the oldest completion ages out
                    state.completions.front().map(|oldest| *oldest + RATE_WINDOW)
                } else {
                    None
                }
            };

            match wake_at {
                Some(deadline) => {
                    debug!(
                        "Rate window full, waiting {:?} for admission",
                        deadline.saturating_duration_since(Instant::now())
                    );
                    tokio::select! {
                        _ = notified.as_mut() => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A place in the admission queue. Leaves the queue if dropped unadmitted.
struct Ticket<'a> {
    gate: &'a RequestGate,
    id: u64,
    admitted: bool,
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        if self.admitted {
            return;
        }
        let id = self.id;
        self.gate.lock().queue.retain(|queued| *queued != id);
        self.gate.changed.notify_waiters();
    }
}

/// A running slot. Releasing it records a completion in the rate window.
struct GatePermit<'a> {
    gate: &'a RequestGate,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.gate.lock();
            state.active -= 1;
            state.completions.push_back(Instant::now());
        }
        self.gate.changed.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn gate(max_concurrent: usize, per_minute: usize) -> RequestGate {
        RequestGate::new(GateConfig {
            max_requests_per_minute: per_minute,
            max_concurrent_requests: max_concurrent,
            backoff_multiplier: 2.0,
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        })
    }

    /// Tracks how many tasks are inside their critical section at once.
    #[derive(Default)]
    struct Probe {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Probe {
        async fn work(&self, millis: u64) -> Result<(), ProviderError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(millis)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_cap_two_of_five() {
        let gate = gate(2, 100);
        let probe = Probe::default();
        let start = Instant::now();

        let results = join_all((0..5).map(|_| gate.execute(|| probe.work(50)))).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(probe.peak.load(Ordering::SeqCst), 2);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(150), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(200), "{:?}", elapsed);
        assert_eq!(gate.get_status().requests_in_last_minute, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_active_and_queued() {
        let gate = Arc::new(gate(1, 100));
        let probe = Arc::new(Probe::default());

        let mut handles = Vec::new();
        for _ in 0..3 {
            let gate = Arc::clone(&gate);
            let probe = Arc::clone(&probe);
            handles.push(tokio::spawn(async move {
                gate.execute(|| probe.work(1000)).await
            }));
        }

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let status = gate.get_status();
        assert_eq!(status.active_requests, 1);
        assert_eq!(status.queued_requests, 2);
        assert_eq!(status.requests_in_last_minute, 0);

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        let status = gate.get_status();
        assert_eq!(status.active_requests, 0);
        assert_eq!(status.queued_requests, 0);
        assert_eq!(status.requests_in_last_minute, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_window_delays_admission() {
        let gate = gate(10, 3);
        let start = Instant::now();
        let started = Mutex::new(Vec::new());

        let results = join_all((0..5).map(|_| {
            let started = &started;
            gate.execute(move || async move {
                started.lock().unwrap().push(start.elapsed());
                Ok::<_, ProviderError>(())
            })
        }))
        .await;

        assert!(results.iter().all(Result::is_ok));
        let started = started.into_inner().unwrap();
        assert_eq!(started.len(), 5);
        assert!(started[..3].iter().all(|t| *t < Duration::from_secs(1)));
        assert!(started[3..].iter().all(|t| *t >= RATE_WINDOW));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_never_exceeds_quota() {
        let gate = Arc::new(gate(4, 6));
        let probe = Arc::new(Probe::default());

        let worker = {
            let gate = Arc::clone(&gate);
            let probe = Arc::clone(&probe);
            tokio::spawn(async move {
                join_all((0..20).map(|_| gate.execute(|| probe.work(500)))).await
            })
        };

        while !worker.is_finished() {
            let status = gate.get_status();
            assert!(status.requests_in_last_minute <= 6);
            assert!(status.active_requests <= 4);
            assert!(status.active_requests + status.requests_in_last_minute <= 6);
            tokio::time::sleep(Duration::from_millis(250)).await;
        }

        let results = worker.await.unwrap();
        assert!(results.iter().all(Result::is_ok));
        assert!(probe.peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_is_fifo() {
        let gate = gate(1, 100);
        let order = Mutex::new(Vec::new());

        join_all((0..6).map(|i| {
            let order = &order;
            gate.execute(move || async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                order.lock().unwrap().push(i);
                Ok::<_, ProviderError>(())
            })
        }))
        .await;

        assert_eq!(order.into_inner().unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhausts_retries_with_backoff() {
        let gate = gate(2, 100);
        let attempts = AtomicU32::new(0);
        let stamps = Mutex::new(Vec::new());

        let result: Result<(), GateError> = gate
            .execute(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                stamps.lock().unwrap().push(Instant::now());
                async { Err(ProviderError::RateLimited { retry_after: None }) }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        match result {
            Err(GateError::RetriesExhausted { attempts, source }) => {
                assert_eq!(attempts, 4);
                assert_eq!(source, ProviderError::RateLimited { retry_after: None });
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let stamps = stamps.into_inner().unwrap();
        let gaps: Vec<Duration> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_error_is_not_retried() {
        let gate = gate(2, 100);
        let attempts = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), GateError> = gate
            .execute(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Auth("invalid key".to_string())) }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(matches!(
            result,
            Err(GateError::Rejected(ProviderError::Auth(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_recovers() {
        let gate = gate(2, 100);
        let attempts = AtomicU32::new(0);

        let result = gate
            .execute(|| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ProviderError::Transient("connection reset".to_string()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // every attempt, failed or not, is recorded as a completion
        assert_eq!(gate.get_status().requests_in_last_minute, 3);
    }

    #[test]
    fn test_backoff_delay() {
        let gate = gate(1, 1);
        assert_eq!(gate.backoff_delay(0, None), Duration::from_millis(100));
        assert_eq!(gate.backoff_delay(1, None), Duration::from_millis(200));
        assert_eq!(gate.backoff_delay(3, None), Duration::from_millis(800));
        assert_eq!(
            gate.backoff_delay(0, Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(
            gate.backoff_delay(3, Some(Duration::from_millis(10))),
            Duration::from_millis(800)
        );
        assert_eq!(gate.backoff_delay(200, None), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn test_released_permit_wakes_next_waiter() {
        let gate = gate(1, 100);
        let first = gate.admit().await;

        let mut second = tokio_test::task::spawn(gate.admit());
        assert!(second.poll().is_pending());
        assert_eq!(gate.get_status().queued_requests, 1);

        drop(first);
        assert!(second.is_woken());
        let _permit = tokio_test::assert_ready!(second.poll());

        let status = gate.get_status();
        assert_eq!(status.active_requests, 1);
        assert_eq!(status.queued_requests, 0);
        assert_eq!(status.requests_in_last_minute, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_waiter_leaves_queue() {
        let gate = Arc::new(gate(1, 100));
        let probe = Arc::new(Probe::default());

        let holder = {
            let gate = Arc::clone(&gate);
            let probe = Arc::clone(&probe);
            tokio::spawn(async move { gate.execute(|| probe.work(1000)).await })
        };
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        let waited = tokio::time::timeout(
            Duration::from_millis(10),
            gate.execute(|| async { Ok::<_, ProviderError>(()) }),
        )
        .await;
        assert!(waited.is_err());
        assert_eq!(gate.get_status().queued_requests, 0);

        assert!(holder.await.unwrap().is_ok());
        assert!(gate
            .execute(|| async { Ok::<_, ProviderError>(()) })
            .await
            .is_ok());
    }
}
