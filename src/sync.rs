//! Periodic re-synchronization of remote poll state.
//!
//! Two feeds observe the same poll: [`StatusFeed`] (does a poll exist, is it
//! ongoing) and [`ResultsFeed`] (vote counts). Each runs its own
//! [`Synchronizer`] with its own cadence, so a slow status check never holds
//! back result freshness. They share nothing; other components reach them only
//! through an [`Invalidator`], which forces an early refresh and makes any
//! response already in flight stale.
//!
//! Because the two feeds observe the service at different instants they may
//! briefly disagree (results still counting while status reports expired).
//! Consumers must tolerate that.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_std::channel::{bounded, Receiver, Sender};
use async_std::future;
use async_std::task::{self, JoinHandle};
use async_trait::async_trait;
use log::*;

use crate::api_models::{ResultsReport, StatusReport};
use crate::config::{Cadence, SyncConfig};
use crate::models::{Candidate, PollStatus};
use crate::remote::{PollService, RemoteError};

/**
 * One kind of remote state a synchronizer keeps fresh
 */
#[async_trait]
pub trait Feed: Send + Sync + 'static {
    type Snapshot: Clone + Send + Sync + 'static;

    const NAME: &'static str;

    async fn fetch(&self, service: &dyn PollService) -> Result<Self::Snapshot, RemoteError>;

    /**
     * The lifecycle classification carried by a snapshot, used for cadence
     */
    fn status(snapshot: &Self::Snapshot) -> PollStatus;

    /**
     * Called with the previous and the new snapshot before the new one is
     * published
     */
    fn observe(_previous: Option<&Self::Snapshot>, _next: &Self::Snapshot) {}
}

pub struct StatusFeed;

#[async_trait]
impl Feed for StatusFeed {
    type Snapshot = StatusReport;

    const NAME: &'static str = "status";

    async fn fetch(&self, service: &dyn PollService) -> Result<StatusReport, RemoteError> {
        service.get_poll_status().await
    }

    fn status(snapshot: &StatusReport) -> PollStatus {
        snapshot.status
    }

    fn observe(previous: Option<&StatusReport>, next: &StatusReport) {
        let before = previous.map(|p| p.status);
        if before != Some(next.status) {
            info!("Poll status {:?} -> {}", before, next.status);
        }
    }
}

pub struct ResultsFeed;

#[async_trait]
impl Feed for ResultsFeed {
    type Snapshot = ResultsReport;

    const NAME: &'static str = "results";

    async fn fetch(&self, service: &dyn PollService) -> Result<ResultsReport, RemoteError> {
        service.get_poll_results().await
    }

    fn status(snapshot: &ResultsReport) -> PollStatus {
        snapshot.status
    }

    fn observe(previous: Option<&ResultsReport>, next: &ResultsReport) {
        let previous = previous.and_then(|p| p.candidates.as_deref());
        if let (Some(previous), Some(next)) = (previous, next.candidates.as_deref()) {
            for name in vote_regressions(previous, next) {
                warn!("Vote count for {} went down without a reset", name);
            }
        }
    }
}

/**
 * Names of candidates whose count is lower in `next` than in `previous`.
 *
 * Outside of a reset this is always empty; counts are published exactly as
 * the service reports them either way.
 */
pub fn vote_regressions(previous: &[Candidate], next: &[Candidate]) -> Vec<String> {
    next.iter()
        .filter(|n| {
            previous
                .iter()
                .any(|p| p.name == n.name && p.votes > n.votes)
        })
        .map(|n| n.name.clone())
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncState<T> {
    /**
     * Nothing fetched yet
     */
    Loading,
    Ready(T),
    /**
     * The retry budget ran out; carries the last failure
     */
    Unavailable(String),
}

impl<T> SyncState<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            SyncState::Ready(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}

struct Published<T> {
    state: SyncState<T>,
    last_status: Option<PollStatus>,
}

struct Inner<F: Feed> {
    feed: F,
    service: Arc<dyn PollService>,
    cadence: Cadence,
    retries: u32,
    retry_delay: Duration,
    published: Mutex<Published<F::Snapshot>>,
    epoch: Arc<AtomicU64>,
    wakeup_tx: Sender<()>,
    wakeup_rx: Receiver<()>,
}

/**
 * Keeps one feed's snapshot fresh at an interval that follows the poll's
 * status: `cadence.ongoing` while ongoing or not yet known, `cadence.idle`
 * otherwise.
 */
pub struct Synchronizer<F: Feed> {
    inner: Arc<Inner<F>>,
}

impl<F: Feed> Clone for Synchronizer<F> {
    fn clone(&self) -> Self {
        Synchronizer {
            inner: self.inner.clone(),
        }
    }
}

pub type StatusSynchronizer = Synchronizer<StatusFeed>;
pub type ResultsSynchronizer = Synchronizer<ResultsFeed>;

impl Synchronizer<StatusFeed> {
    pub fn for_status(service: Arc<dyn PollService>, config: &SyncConfig) -> Self {
        Synchronizer::new(StatusFeed, service, config.status, config)
    }
}

impl Synchronizer<ResultsFeed> {
    pub fn for_results(service: Arc<dyn PollService>, config: &SyncConfig) -> Self {
        Synchronizer::new(ResultsFeed, service, config.results, config)
    }
}

impl<F: Feed> Synchronizer<F> {
    pub fn new(feed: F, service: Arc<dyn PollService>, cadence: Cadence, config: &SyncConfig) -> Self {
        let (wakeup_tx, wakeup_rx) = bounded(1);

        Synchronizer {
            inner: Arc::new(Inner {
                feed,
                service,
                cadence,
                retries: config.retries,
                retry_delay: config.retry_delay,
                published: Mutex::new(Published {
                    state: SyncState::Loading,
                    last_status: None,
                }),
                epoch: Arc::new(AtomicU64::new(0)),
                wakeup_tx,
                wakeup_rx,
            }),
        }
    }

    fn published(&self) -> MutexGuard<'_, Published<F::Snapshot>> {
        self.inner
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SyncState<F::Snapshot> {
        self.published().state.clone()
    }

    /**
     * Status from the most recent successful fetch, kept across failures
     */
    pub fn last_status(&self) -> Option<PollStatus> {
        self.published().last_status
    }

    pub fn next_interval(&self) -> Duration {
        match self.last_status() {
            Some(status) if !status.is_ongoing() => self.inner.cadence.idle,
            _ => self.inner.cadence.ongoing,
        }
    }

    pub fn invalidator(&self) -> Invalidator {
        Invalidator {
            name: F::NAME,
            epoch: self.inner.epoch.clone(),
            wakeups: self.inner.wakeup_tx.clone(),
        }
    }

    /**
     * Fetch once (with retries) and publish the outcome.
     *
     * A response that comes back after an invalidation was requested is
     * dropped and the fetch is repeated.
     */
    pub async fn sync_once(&self) -> SyncState<F::Snapshot> {
        loop {
            // this fetch answers any wakeup already queued
            while self.inner.wakeup_rx.try_recv().is_ok() {}

            let epoch = self.inner.epoch.load(Ordering::SeqCst);
            let result = self.fetch_with_retry().await;

            if self.inner.epoch.load(Ordering::SeqCst) != epoch {
                debug!("Discarding stale {} response", F::NAME);
                continue;
            }

            return self.publish(result);
        }
    }

    async fn fetch_with_retry(&self) -> Result<F::Snapshot, RemoteError> {
        let mut attempt = 0;

        loop {
            match self.inner.feed.fetch(self.inner.service.as_ref()).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(err) if attempt < self.inner.retries => {
                    let delay = 1u32
                        .checked_shl(attempt)
                        .and_then(|factor| self.inner.retry_delay.checked_mul(factor))
                        .unwrap_or(self.inner.retry_delay);
                    warn!(
                        "Fetching {} failed ({}), retry {} of {} in {:?}",
                        F::NAME,
                        err,
                        attempt + 1,
                        self.inner.retries,
                        delay
                    );
                    task::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn publish(&self, result: Result<F::Snapshot, RemoteError>) -> SyncState<F::Snapshot> {
        let mut published = self.published();

        match result {
            Ok(snapshot) => {
                F::observe(published.state.ready(), &snapshot);
                published.last_status = Some(F::status(&snapshot));
                published.state = SyncState::Ready(snapshot);
            }
            Err(err) => {
                error!("Poll {} unavailable: {}", F::NAME, err);
                published.state = SyncState::Unavailable(err.to_string());
            }
        }

        published.state.clone()
    }

    /**
     * Run the fetch loop on its own task until the handle is stopped
     */
    pub fn spawn(&self) -> SyncHandle {
        let this = self.clone();
        let task = task::spawn(async move { this.run().await });

        SyncHandle {
            name: F::NAME,
            task,
        }
    }

    async fn run(self) {
        loop {
            self.sync_once().await;

            let wait = self.next_interval();
            debug!("Next {} sync in {:?}", F::NAME, wait);

            if let Ok(Ok(())) = future::timeout(wait, self.inner.wakeup_rx.recv()).await {
                debug!("{} invalidated, syncing early", F::NAME);
            }
        }
    }
}

/**
 * Handle other components use to force a synchronizer to refresh
 */
#[derive(Clone, Debug)]
pub struct Invalidator {
    name: &'static str,
    epoch: Arc<AtomicU64>,
    wakeups: Sender<()>,
}

impl Invalidator {
    pub fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        // a full channel already has a wakeup pending
        let _ = self.wakeups.try_send(());
        debug!("Invalidated {} cache", self.name);
    }
}

/**
 * Invalidate every synchronizer in the list
 */
pub fn invalidate_all(invalidators: &[Invalidator]) {
    for invalidator in invalidators {
        invalidator.invalidate();
    }
}

/**
 * A running fetch loop; stopping it cancels any fetch in flight
 */
pub struct SyncHandle {
    name: &'static str,
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub async fn stop(self) {
        self.task.cancel().await;
        debug!("Stopped {} synchronizer", self.name);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::api_models::PollDefinition;
    use crate::ledger::{LedgerClient, PollLedger};
    use crate::models::Identity;
    use crate::time::ManualClock;

    const NOW: i64 = 1_700_000_000_000;

    fn fast_config() -> SyncConfig {
        SyncConfig {
            retry_delay: Duration::from_millis(1),
            ..SyncConfig::default()
        }
    }

    fn ledger() -> PollLedger {
        PollLedger::new(Arc::new(ManualClock::new(NOW)), ["admin"])
    }

    fn open_poll(ledger: &PollLedger) {
        let definition = PollDefinition {
            candidates: vec!["Alice".into(), "Bob".into()],
            end_time: None,
        };
        ledger
            .create_or_update(&Identity::Principal("admin".into()), definition)
            .unwrap();
    }

    /**
     * Fails the first `failures` status fetches, then delegates
     */
    struct Flaky {
        inner: LedgerClient,
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PollService for Flaky {
        async fn get_poll_status(&self) -> Result<StatusReport, RemoteError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(RemoteError::Transport("connection reset".into()));
            }
            self.inner.get_poll_status().await
        }

        async fn get_poll_results(&self) -> Result<ResultsReport, RemoteError> {
            self.inner.get_poll_results().await
        }

        async fn vote(&self, candidate: &str) -> Result<String, RemoteError> {
            self.inner.vote(candidate).await
        }

        async fn create_or_update_poll(&self, definition: PollDefinition) -> Result<(), RemoteError> {
            self.inner.create_or_update_poll(definition).await
        }

        async fn reset_poll(&self) -> Result<(), RemoteError> {
            self.inner.reset_poll().await
        }
    }

    /**
     * Reads the ledger, then holds the first status response until released
     */
    struct Gated {
        inner: LedgerClient,
        gate: Receiver<()>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PollService for Gated {
        async fn get_poll_status(&self) -> Result<StatusReport, RemoteError> {
            let report = self.inner.get_poll_status().await;
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                let _ = self.gate.recv().await;
            }
            report
        }

        async fn get_poll_results(&self) -> Result<ResultsReport, RemoteError> {
            self.inner.get_poll_results().await
        }

        async fn vote(&self, candidate: &str) -> Result<String, RemoteError> {
            self.inner.vote(candidate).await
        }

        async fn create_or_update_poll(&self, definition: PollDefinition) -> Result<(), RemoteError> {
            self.inner.create_or_update_poll(definition).await
        }

        async fn reset_poll(&self) -> Result<(), RemoteError> {
            self.inner.reset_poll().await
        }
    }

    #[async_std::test]
    async fn test_sync_once_publishes_status() {
        let ledger = ledger();
        let sync = StatusSynchronizer::for_status(Arc::new(ledger.caller(Identity::Anonymous)), &fast_config());
        assert_eq!(sync.state(), SyncState::Loading);

        let state = sync.sync_once().await;
        assert_eq!(state.ready().map(|s| s.status), Some(PollStatus::Absent));
        assert_eq!(sync.last_status(), Some(PollStatus::Absent));
    }

    #[async_std::test]
    async fn test_interval_follows_status() {
        let ledger = ledger();
        let service: Arc<dyn PollService> = Arc::new(ledger.caller(Identity::Anonymous));
        let status = StatusSynchronizer::for_status(service.clone(), &fast_config());
        let results = ResultsSynchronizer::for_results(service, &fast_config());

        // unknown status polls fast
        assert_eq!(status.next_interval(), Duration::from_secs(5));
        assert_eq!(results.next_interval(), Duration::from_secs(3));

        status.sync_once().await;
        results.sync_once().await;
        assert_eq!(status.next_interval(), Duration::from_secs(30));
        assert_eq!(results.next_interval(), Duration::from_secs(30));

        open_poll(&ledger);
        status.sync_once().await;
        results.sync_once().await;
        assert_eq!(status.next_interval(), Duration::from_secs(5));
        assert_eq!(results.next_interval(), Duration::from_secs(3));
    }

    #[async_std::test]
    async fn test_two_retries_then_success() {
        let flaky = Arc::new(Flaky {
            inner: ledger().caller(Identity::Anonymous),
            failures: 2,
            calls: AtomicUsize::new(0),
        });
        let sync = StatusSynchronizer::for_status(flaky.clone(), &fast_config());

        assert!(sync.sync_once().await.ready().is_some());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[async_std::test]
    async fn test_unavailable_after_retry_budget() {
        let flaky = Arc::new(Flaky {
            inner: ledger().caller(Identity::Anonymous),
            failures: 3,
            calls: AtomicUsize::new(0),
        });
        let sync = StatusSynchronizer::for_status(flaky.clone(), &fast_config());

        match sync.sync_once().await {
            SyncState::Unavailable(reason) => assert!(reason.contains("connection reset")),
            other => panic!("unexpected state {:?}", other),
        }
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        // failures do not change the schedule
        assert_eq!(sync.next_interval(), Duration::from_secs(5));

        // the next tick recovers
        assert!(sync.sync_once().await.ready().is_some());
    }

    #[async_std::test]
    async fn test_failure_keeps_last_status_for_cadence() {
        let flaky = Arc::new(Flaky {
            inner: ledger().caller(Identity::Anonymous),
            failures: 0,
            calls: AtomicUsize::new(0),
        });
        let config = SyncConfig {
            retries: 0,
            ..fast_config()
        };
        let sync = StatusSynchronizer::for_status(flaky.clone(), &config);
        sync.sync_once().await;
        assert_eq!(sync.last_status(), Some(PollStatus::Absent));

        let failing = StatusSynchronizer::for_status(
            Arc::new(Flaky {
                inner: ledger().caller(Identity::Anonymous),
                failures: usize::MAX,
                calls: AtomicUsize::new(0),
            }),
            &config,
        );
        assert!(matches!(failing.sync_once().await, SyncState::Unavailable(_)));
        assert_eq!(failing.last_status(), None);
    }

    #[async_std::test]
    async fn test_invalidation_discards_in_flight_response() {
        let ledger = ledger();
        let (release, gate) = bounded(1);
        let gated = Arc::new(Gated {
            inner: ledger.caller(Identity::Anonymous),
            gate,
            calls: AtomicUsize::new(0),
        });
        let sync = StatusSynchronizer::for_status(gated.clone(), &fast_config());

        let background = sync.clone();
        let pending = task::spawn(async move { background.sync_once().await });
        task::sleep(Duration::from_millis(20)).await;

        // the first response (Absent) is in flight when the poll appears
        open_poll(&ledger);
        sync.invalidator().invalidate();
        release.send(()).await.unwrap();

        let state = pending.await;
        assert_eq!(state.ready().map(|s| s.status), Some(PollStatus::Ongoing));
        assert_eq!(gated.calls.load(Ordering::SeqCst), 2);
    }

    #[async_std::test]
    async fn test_loop_wakes_on_invalidate_and_stops() {
        let ledger = ledger();
        let flaky = Arc::new(Flaky {
            inner: ledger.caller(Identity::Anonymous),
            failures: 0,
            calls: AtomicUsize::new(0),
        });
        let config = SyncConfig {
            status: Cadence {
                ongoing: Duration::from_secs(3600),
                idle: Duration::from_secs(3600),
            },
            ..fast_config()
        };
        let sync = StatusSynchronizer::for_status(flaky.clone(), &config);
        let handle = sync.spawn();

        task::sleep(Duration::from_millis(50)).await;
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);

        open_poll(&ledger);
        sync.invalidator().invalidate();
        task::sleep(Duration::from_millis(50)).await;
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
        assert_eq!(sync.last_status(), Some(PollStatus::Ongoing));

        handle.stop().await;
        sync.invalidator().invalidate();
        task::sleep(Duration::from_millis(50)).await;
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_vote_regressions() {
        let before = vec![
            Candidate { name: "A".into(), votes: 3 },
            Candidate { name: "B".into(), votes: 1 },
        ];
        let after = vec![
            Candidate { name: "A".into(), votes: 2 },
            Candidate { name: "B".into(), votes: 4 },
            Candidate { name: "C".into(), votes: 0 },
        ];
        assert_eq!(vote_regressions(&before, &after), vec!["A".to_string()]);
        assert!(vote_regressions(&after, &after).is_empty());
    }
}
