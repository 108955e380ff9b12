//! Batch scheduler bounding in-flight page fetches
//!
//! This module handles:
//! - Splitting pending tasks into batches of at most `max_in_flight`
//! - Dispatching each batch fully in parallel and awaiting it as a unit
//! - Stopping dispatch of further batches once cancellation is requested
//!
//! Page fetches have roughly uniform latency (dominated by the provider's
//! challenge/render delay), so batch-boundary synchronization costs little
//! throughput compared to a sliding window.

use crate::collector::CollectionError;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Counters describing one limiter run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Tasks that were started (each exactly once)
    pub dispatched: usize,

    /// Batches that were started
    pub batches: usize,

    /// Tasks never started because cancellation was requested
    pub undispatched: usize,
}

impl DispatchReport {
    pub fn is_complete(&self) -> bool {
        self.undispatched == 0
    }
}

/// Outputs of every dispatched task, in completion order
#[derive(Debug)]
pub struct BatchRun<T> {
    pub results: Vec<T>,
    pub report: DispatchReport,
}

impl<T> BatchRun<T> {
    pub fn is_complete(&self) -> bool {
        self.report.is_complete()
    }
}

/// Runs tasks in fixed-size batches synchronized at batch boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyLimiter {
    max_in_flight: usize,
}

impl ConcurrencyLimiter {
    pub const DEFAULT_MAX_IN_FLIGHT: usize = 5;

    /// Creates a limiter
    ///
    /// # Returns
    ///
    /// * `Ok(ConcurrencyLimiter)` - A limiter with the given ceiling
    /// * `Err(CollectionError::InvalidArgument)` - `max_in_flight` is zero
    pub fn new(max_in_flight: usize) -> Result<Self, CollectionError> {
        if max_in_flight == 0 {
            return Err(CollectionError::InvalidArgument(
                "max concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(Self { max_in_flight })
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Runs every task, handing each output to `on_settled` as it completes
    ///
    /// The next batch is only dispatched after every task of the current batch
    /// has settled. `on_settled` runs on the caller's flow of control, so it
    /// may own mutable state without synchronization.
    pub async fn run_each<I, F, Fut, C>(
        &self,
        tasks: I,
        cancel: &CancellationToken,
        mut on_settled: C,
    ) -> DispatchReport
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut,
        Fut: Future,
        C: FnMut(Fut::Output),
    {
        let mut tasks = tasks.into_iter();
        let mut report = DispatchReport::default();

        loop {
            let batch: Vec<F> = tasks.by_ref().take(self.max_in_flight).collect();
            if batch.is_empty() {
                break;
            }

            if cancel.is_cancelled() {
                report.undispatched = batch.len() + tasks.count();
                tracing::debug!(
                    "Cancellation requested, {} task(s) left undispatched",
                    report.undispatched
                );
                break;
            }

            report.batches += 1;
            report.dispatched += batch.len();
            tracing::trace!(
                "Dispatching batch {} with {} task(s)",
                report.batches,
                batch.len()
            );

            let mut in_flight: FuturesUnordered<Fut> = batch.into_iter().map(|task| task()).collect();
            while let Some(output) = in_flight.next().await {
                on_settled(output);
            }
        }

        report
    }

    /// Runs every task and collects the outputs in completion order
    pub async fn run_all<I, F, Fut>(&self, tasks: I, cancel: &CancellationToken) -> BatchRun<Fut::Output>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let mut results = Vec::new();
        let report = self
            .run_each(tasks, cancel, |output| results.push(output))
            .await;
        BatchRun { results, report }
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self {
            max_in_flight: Self::DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Tracks how many tasks are running at once
    #[derive(Default)]
    struct InFlightGauge {
        current: AtomicUsize,
        peak: AtomicUsize,
        started: AtomicUsize,
    }

    impl InFlightGauge {
        async fn run(&self, sleep_ms: u64) {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_zero_ceiling_is_rejected() {
        assert!(matches!(
            ConcurrencyLimiter::new(0),
            Err(CollectionError::InvalidArgument(_))
        ));
        assert_eq!(ConcurrencyLimiter::default().max_in_flight(), 5);
    }

    #[tokio::test]
    async fn test_ceiling_is_never_exceeded() {
        let limiter = ConcurrencyLimiter::new(5).unwrap();
        let gauge = InFlightGauge::default();
        let cancel = CancellationToken::new();

        let tasks = (0..12).map(|i| {
            let gauge = &gauge;
            move || async move {
                gauge.run(10 + (i % 3) * 5).await;
                i
            }
        });
        let run = limiter.run_all(tasks, &cancel).await;

        assert_eq!(run.results.len(), 12);
        assert_eq!(gauge.started.load(Ordering::SeqCst), 12);
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 5);
        assert_eq!(run.report.batches, 3);
        assert_eq!(run.report.dispatched, 12);
        assert!(run.is_complete());
    }

    #[tokio::test]
    async fn test_every_task_attempted_exactly_once() {
        let limiter = ConcurrencyLimiter::new(4).unwrap();
        let cancel = CancellationToken::new();

        let tasks = (0u32..10).map(|i| move || async move { i });
        let run = limiter.run_all(tasks, &cancel).await;

        let mut seen = run.results;
        seen.sort_unstable();
        assert_eq!(seen, (0u32..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_batches_are_synchronized() {
        let limiter = ConcurrencyLimiter::new(2).unwrap();
        let cancel = CancellationToken::new();
        let events = Arc::new(Mutex::new(Vec::new()));

        // Task 0 is slow; task 2 (second batch) must not start before it ends
        let tasks = (0..4).map(|i| {
            let events = Arc::clone(&events);
            move || async move {
                events.lock().unwrap().push(format!("start {}", i));
                let delay = if i == 0 { 40 } else { 1 };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                events.lock().unwrap().push(format!("end {}", i));
            }
        });
        limiter.run_all(tasks, &cancel).await;

        let events = events.lock().unwrap();
        let end_0 = events.iter().position(|e| e == "end 0").unwrap();
        let start_2 = events.iter().position(|e| e == "start 2").unwrap();
        assert!(end_0 < start_2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_dispatches_nothing() {
        let limiter = ConcurrencyLimiter::new(3).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let tasks = (0..7).map(|i| move || async move { i });
        let run = limiter.run_all(tasks, &cancel).await;

        assert!(run.results.is_empty());
        assert_eq!(run.report.undispatched, 7);
        assert!(!run.is_complete());
    }

    #[tokio::test]
    async fn test_cancellation_stops_next_batch() {
        let limiter = ConcurrencyLimiter::new(2).unwrap();
        let cancel = CancellationToken::new();

        let tasks = (0..6).map(|i| {
            let cancel = cancel.clone();
            move || async move {
                if i == 1 {
                    cancel.cancel();
                }
                i
            }
        });
        let run = limiter.run_all(tasks, &cancel).await;

        // The first batch settles, the remaining two batches are skipped
        assert_eq!(run.results.len(), 2);
        assert_eq!(run.report.undispatched, 4);
    }

    #[tokio::test]
    async fn test_run_each_folds_on_caller() {
        let limiter = ConcurrencyLimiter::new(3).unwrap();
        let cancel = CancellationToken::new();
        let mut total = 0;

        let tasks = (1..=5).map(|i| move || async move { i * 10 });
        let report = limiter
            .run_each(tasks, &cancel, |value| total += value)
            .await;

        assert_eq!(total, 150);
        assert_eq!(report.batches, 2);
    }
}
