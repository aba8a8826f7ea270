//! Batch fan-out and fan-in.
//!
//! # Responsibilities
//! - Spawn one fetch task per URL, at most `workers` at a time
//! - Place each body at its input index regardless of completion order
//! - Stop the whole batch on the first failure
//!
//! # Design Decisions
//! - Worker slots are a per-call semaphore; nothing is shared between batches
//! - Each task owns one index and hands its body back through the join set,
//!   so the result buffer needs no locking
//! - The first failure is kept in a write-once cell; whoever wins the `set`
//!   cancels the batch token
//! - The batch token is a child of the caller's token and is cancelled when
//!   `dispatch` returns or is dropped; dropping the join set aborts stragglers

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::fetch::fetcher::{Fetch, FetchCause, FetchFailed};

/// Write-once slot for the first failure of a batch.
struct FirstFailure {
    slot: OnceLock<FetchFailed>,
    batch: CancellationToken,
}

impl FirstFailure {
    fn new(batch: CancellationToken) -> Self {
        Self {
            slot: OnceLock::new(),
            batch,
        }
    }

    /// Returns true if this call captured the failure.
    fn record(&self, err: FetchFailed) -> bool {
        if self.slot.set(err).is_ok() {
            self.batch.cancel();
            true
        } else {
            false
        }
    }

    fn get(&self) -> Option<FetchFailed> {
        self.slot.get().cloned()
    }
}

/// Fans a batch of URLs out to a [`Fetch`] implementation.
#[derive(Clone)]
pub struct Coordinator {
    fetcher: Arc<dyn Fetch>,
    workers: usize,
}

impl Coordinator {
    pub fn new(fetcher: Arc<dyn Fetch>, workers: usize) -> Self {
        Self {
            fetcher,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Fetch every URL and return the bodies in input order.
    ///
    /// Returns the first failure if any fetch failed; partial results are
    /// discarded in that case. If `parent` is cancelled before every URL was
    /// dispatched, the undispatched slots stay empty.
    pub async fn dispatch(
        &self,
        parent: &CancellationToken,
        urls: Vec<String>,
    ) -> Result<Vec<String>, FetchFailed> {
        let batch = parent.child_token();
        let _cancel_on_exit = batch.clone().drop_guard();

        let slots = Arc::new(Semaphore::new(self.workers));
        let failure = Arc::new(FirstFailure::new(batch.clone()));
        let mut results = vec![String::new(); urls.len()];
        let mut tasks = JoinSet::new();

        for (index, url) in urls.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = batch.cancelled() => {
                    tracing::debug!(dispatched = index, "Batch cancelled, dispatch stopped");
                    break;
                }
                permit = Arc::clone(&slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let fetcher = Arc::clone(&self.fetcher);
            let batch = batch.clone();
            let failure = Arc::clone(&failure);
            tasks.spawn(async move {
                let _permit = permit;
                let outcome = AssertUnwindSafe(fetcher.fetch(&batch, &url))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        let message = panic_message(panic.as_ref());
                        Err(FetchFailed::new(url.as_str(), FetchCause::Panicked(message)))
                    });

                match outcome {
                    Ok(body) => Some((index, body)),
                    Err(err) => {
                        if failure.record(err) {
                            tracing::debug!(index, url = %url, "First failure captured, cancelling batch");
                        }
                        None
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some((index, body))) => results[index] = body,
                Ok(None) => {}
                Err(e) => tracing::error!(error = %e, "Fetch task did not complete"),
            }
        }

        match failure.get() {
            Some(err) => Err(err),
            None => Ok(results),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Echoes the URL back after a per-URL delay, tracking concurrency.
    #[derive(Default)]
    struct ScriptedFetcher {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        cancelled: AtomicUsize,
        delays: Mutex<Vec<(String, Duration)>>,
        failing: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn delay(&self, url: &str, delay: Duration) {
            self.delays.lock().unwrap().push((url.to_string(), delay));
        }

        fn fail(&self, url: &str) {
            self.failing.lock().unwrap().push(url.to_string());
        }

        fn delay_for(&self, url: &str) -> Duration {
            self.delays
                .lock()
                .unwrap()
                .iter()
                .find(|(u, _)| u == url)
                .map(|(_, d)| *d)
                .unwrap_or(Duration::from_millis(5))
        }
    }

    #[async_trait]
    impl Fetch for ScriptedFetcher {
        async fn fetch(&self, ctx: &CancellationToken, url: &str) -> Result<String, FetchFailed> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _in_flight = InFlight::enter(&self.in_flight, &self.peak);

            let delay = self.delay_for(url);
            let should_fail = self.failing.lock().unwrap().iter().any(|u| u == url);
            tokio::select! {
                _ = ctx.cancelled() => {
                    self.cancelled.fetch_add(1, Ordering::SeqCst);
                    Err(FetchFailed::new(url, FetchCause::Cancelled))
                }
                _ = tokio::time::sleep(delay) => {
                    if should_fail {
                        Err(FetchFailed::new(url, FetchCause::Timeout))
                    } else {
                        Ok(url.to_string())
                    }
                }
            }
        }
    }

    /// Counts a fetch as in flight until dropped, including on abort.
    struct InFlight<'a>(&'a AtomicUsize);

    impl<'a> InFlight<'a> {
        fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
            let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            Self(counter)
        }
    }

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct PanickingFetcher;

    #[async_trait]
    impl Fetch for PanickingFetcher {
        async fn fetch(&self, _ctx: &CancellationToken, _url: &str) -> Result<String, FetchFailed> {
            panic!("upstream parser exploded");
        }
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("u{i}")).collect()
    }

    #[tokio::test]
    async fn results_follow_input_order() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        // Later URLs finish first.
        for (i, url) in urls(8).iter().enumerate() {
            fetcher.delay(url, Duration::from_millis(10 * (8 - i as u64)));
        }
        let coordinator = Coordinator::new(fetcher.clone(), 4);

        let results = coordinator
            .dispatch(&CancellationToken::new(), urls(8))
            .await
            .unwrap();
        assert_eq!(results, urls(8));
    }

    #[tokio::test]
    async fn never_exceeds_worker_limit() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        for url in urls(20) {
            fetcher.delay(&url, Duration::from_millis(20));
        }
        let coordinator = Coordinator::new(fetcher.clone(), 4);

        let results = coordinator
            .dispatch(&CancellationToken::new(), urls(20))
            .await
            .unwrap();
        assert_eq!(results.len(), 20);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 20);
        let peak = fetcher.peak.load(Ordering::SeqCst);
        assert!(peak <= 4, "peak concurrency was {peak}");
        assert!(peak >= 2, "fetches never overlapped");
    }

    #[tokio::test]
    async fn empty_batch_is_empty_result() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let coordinator = Coordinator::new(fetcher.clone(), 4);
        let results = coordinator
            .dispatch(&CancellationToken::new(), Vec::new())
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn first_failure_cancels_siblings() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.delay("slow-a", Duration::from_secs(10));
        fetcher.delay("slow-b", Duration::from_secs(10));
        fetcher.delay("bad", Duration::from_millis(10));
        fetcher.fail("bad");
        let coordinator = Coordinator::new(fetcher.clone(), 4);

        let started = std::time::Instant::now();
        let err = coordinator
            .dispatch(
                &CancellationToken::new(),
                vec!["slow-a".into(), "bad".into(), "slow-b".into()],
            )
            .await
            .unwrap_err();

        assert_eq!(err.url, "bad");
        assert!(matches!(err.cause, FetchCause::Timeout));
        assert_eq!(fetcher.cancelled.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn concurrent_failures_surface_exactly_one() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        for url in urls(4) {
            fetcher.delay(&url, Duration::from_millis(10));
            fetcher.fail(&url);
        }
        let coordinator = Coordinator::new(fetcher.clone(), 4);

        let err = coordinator
            .dispatch(&CancellationToken::new(), urls(4))
            .await
            .unwrap_err();
        assert!(urls(4).contains(&err.url));
    }

    #[tokio::test]
    async fn failure_stops_further_dispatch() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.delay("u0", Duration::from_millis(1));
        fetcher.fail("u0");
        for url in urls(20).into_iter().skip(1) {
            fetcher.delay(&url, Duration::from_millis(200));
        }
        let coordinator = Coordinator::new(fetcher.clone(), 4);

        assert!(coordinator
            .dispatch(&CancellationToken::new(), urls(20))
            .await
            .is_err());
        assert!(fetcher.calls.load(Ordering::SeqCst) <= 5);
    }

    #[tokio::test]
    async fn cancelled_parent_dispatches_nothing() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let coordinator = Coordinator::new(fetcher.clone(), 4);
        let parent = CancellationToken::new();
        parent.cancel();

        let results = coordinator.dispatch(&parent, urls(3)).await.unwrap();
        assert_eq!(results, vec![String::new(); 3]);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dropping_dispatch_cancels_in_flight_fetches() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        for url in urls(4) {
            fetcher.delay(&url, Duration::from_secs(10));
        }
        let coordinator = Coordinator::new(fetcher.clone(), 4);
        let parent = CancellationToken::new();

        let outcome = tokio::time::timeout(
            Duration::from_millis(100),
            coordinator.dispatch(&parent, urls(4)),
        )
        .await;
        assert!(outcome.is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fetcher.in_flight.load(Ordering::SeqCst), 0);
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn panicking_fetch_becomes_failure() {
        let coordinator = Coordinator::new(Arc::new(PanickingFetcher), 4);
        let err = coordinator
            .dispatch(&CancellationToken::new(), vec!["boom".into()])
            .await
            .unwrap_err();
        assert_eq!(err.url, "boom");
        assert!(err.to_string().contains("upstream parser exploded"));
    }
}
