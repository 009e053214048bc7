//! ActiveSetController - active set の購読と表示リストの再計算
//!
//! # 状態遷移
//! ```text
//! Uninitialized --(購読確立)--> Active --(teardown)--> Uninitialized
//! ```
//!
//! # 1 回の再計算
//! 1. author 解決（fan-out / fan-in、失敗は placeholder）
//! 2. 訪問者の view record を引いて eligibility 判定（fan-out / fan-in、失敗は非表示扱い）
//! 3. Selector で選ぶ
//! 4. キャッシュを差し替えてから DisplaySelection を publish
//!
//! 通知が溜まっていたら最新の 1 件だけを処理します（途中の状態は飛ばしてよい）。
//! teardown 後に終わった再計算の結果は捨てます。
//!
//! document と author は controller が書くフィールドなので、最後に解決したバッチを
//! 自分で保持し、再計算はそれに対して行います。キャッシュアクターの snapshot は
//! mailbox の処理待ちで 1 バッチ遅れることがあるため、そこからは counters だけを読みます。

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::authors::AuthorResolver;
use super::cache::{CacheHandle, CacheSnapshot, ListingWriter};
use super::gate::VisibilityGate;
use super::retry::{RetryPolicy, open_with_retry};
use super::selector::Selector;
use crate::domain::{
    AdDocument, Advertisement, AdvertisementId, DisplaySelection, EngineFault, StoreError,
    VisitorIdentity,
};
use crate::ports::{AdStore, ErrorReporter, IdentityProvider, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Uninitialized,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerCommand {
    /// Re-run eligibility + selection against the cached active set.
    Recompute,
}

/// State the engine handle reads while the controller runs.
pub struct ControllerSignals {
    pub state: watch::Sender<ControllerState>,
    pub loading: watch::Sender<bool>,
}

impl ControllerSignals {
    pub fn new() -> Self {
        Self {
            state: watch::channel(ControllerState::Uninitialized).0,
            loading: watch::channel(false).0,
        }
    }

    pub fn state(&self) -> ControllerState {
        *self.state.borrow()
    }

    pub fn loading(&self) -> bool {
        *self.loading.borrow()
    }

    pub fn reset(&self) {
        self.state.send_replace(ControllerState::Uninitialized);
        self.loading.send_replace(false);
    }
}

impl Default for ControllerSignals {
    fn default() -> Self {
        Self::new()
    }
}

/// Collaborators of one recomputation. Cheap to clone; kept by the engine so a
/// controller can be spawned again after teardown.
#[derive(Clone)]
pub struct Pipeline {
    pub store: Arc<dyn AdStore>,
    pub authors: AuthorResolver,
    pub gate: Arc<VisibilityGate>,
    pub selector: Arc<Selector>,
    pub identity: Arc<dyn IdentityProvider>,
    pub reporter: Arc<dyn ErrorReporter>,
    pub capacity: usize,
    pub retry: RetryPolicy,
}

impl Pipeline {
    /// Eligibility fan-out for the current visitor, then selection.
    pub async fn evaluate(&self, all: &[Advertisement]) -> DisplaySelection {
        let visitor = self.identity.current();
        let key = visitor.key();

        let verdicts = join_all(all.iter().map(|ad| self.check(ad.id(), key))).await;
        let eligible: Vec<Advertisement> = all
            .iter()
            .zip(verdicts)
            .filter(|(_, eligible)| *eligible)
            .map(|(ad, _)| ad.clone())
            .collect();

        debug!(
            visitor = %visitor,
            active = all.len(),
            eligible = eligible.len(),
            "eligibility evaluated"
        );
        self.selector.select(&eligible, all).for_visitor(key)
    }

    /// Lookup failures fail closed.
    async fn check(&self, ad: &AdvertisementId, visitor: &str) -> bool {
        match self.gate.check(self.store.as_ref(), ad, visitor).await {
            Ok(eligible) => eligible,
            Err(err) => {
                warn!(ad_id = %ad, error = %err, "view record lookup failed, treating as ineligible");
                self.reporter.report(EngineFault::Eligibility {
                    ad: ad.clone(),
                    visitor: visitor.to_string(),
                    source: err,
                });
                false
            }
        }
    }
}

pub struct ActiveSetController {
    pipeline: Pipeline,
    listing: ListingWriter,
    cache: CacheHandle,
    selection: Arc<watch::Sender<DisplaySelection>>,
    signals: Arc<ControllerSignals>,
    /// Last batch handed to the cache, in active-set order.
    resolved: Mutex<CacheSnapshot>,
}

impl ActiveSetController {
    pub fn new(
        pipeline: Pipeline,
        listing: ListingWriter,
        cache: CacheHandle,
        selection: Arc<watch::Sender<DisplaySelection>>,
        signals: Arc<ControllerSignals>,
    ) -> Self {
        Self {
            pipeline,
            listing,
            cache,
            selection,
            signals,
            resolved: Mutex::new(CacheSnapshot::from(Vec::new())),
        }
    }

    pub fn spawn(
        self,
        commands: mpsc::Receiver<ControllerCommand>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(commands, shutdown))
    }

    async fn subscribe(&self, shutdown: &mut watch::Receiver<bool>) -> Option<Subscription<Vec<AdDocument>>> {
        let store = &self.pipeline.store;
        let capacity = self.pipeline.capacity;
        open_with_retry("active-set", &self.pipeline.retry, shutdown, || {
            store.subscribe_active(capacity)
        })
        .await
    }

    async fn run(
        self,
        mut commands: mpsc::Receiver<ControllerCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let Some(mut subscription) = self.subscribe(&mut shutdown).await else {
            return;
        };
        self.signals.state.send_replace(ControllerState::Active);
        info!("active-set subscription established");

        let mut identity = self.pipeline.identity.changes();

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                notification = subscription.recv() => match notification {
                    Some(first) => {
                        if let Some(documents) = coalesce(first, &mut subscription) {
                            self.on_active_set(documents, &shutdown).await;
                        }
                    }
                    None => {
                        warn!("active-set subscription closed, resubscribing");
                        match self.subscribe(&mut shutdown).await {
                            Some(reopened) => subscription = reopened,
                            None => break,
                        }
                    }
                },
                Some(command) = commands.recv() => match command {
                    ControllerCommand::Recompute => self.recompute(&shutdown).await,
                },
                changed = identity_changed(&mut identity) => {
                    if changed {
                        debug!("visitor identity changed");
                        self.recompute(&shutdown).await;
                    } else {
                        identity = None;
                    }
                }
            }
        }
        debug!("active-set controller stopped");
    }

    async fn on_active_set(&self, documents: Vec<AdDocument>, shutdown: &watch::Receiver<bool>) {
        self.signals.loading.send_replace(true);
        debug!(count = documents.len(), "active set changed");

        let previous = self.current();
        let ads = self.pipeline.authors.resolve_batch(documents, &previous).await;
        let selection = self.pipeline.evaluate(&ads).await;

        if *shutdown.borrow() {
            debug!("torn down during recomputation, discarding batch");
            return;
        }
        let batch = CacheSnapshot::from(ads.clone());
        if self.listing.replace(ads).await.is_err() {
            debug!("cache closed, discarding batch");
            return;
        }
        *self.resolved.lock() = batch;
        self.publish(selection, shutdown);
        self.signals.loading.send_replace(false);
    }

    /// Without requerying storage. No-op while nothing is cached.
    async fn recompute(&self, shutdown: &watch::Receiver<bool>) {
        let cached = self.current();
        if cached.is_empty() {
            debug!("recompute skipped, active set is empty");
            return;
        }
        self.signals.loading.send_replace(true);
        let selection = self.pipeline.evaluate(&cached).await;
        self.publish(selection, shutdown);
        self.signals.loading.send_replace(false);
    }

    /// The last resolved batch with the counters the cache holds right now.
    fn current(&self) -> Vec<Advertisement> {
        let resolved = self.resolved.lock().clone();
        let live = self.cache.snapshot();
        let counters: HashMap<&AdvertisementId, _> =
            live.iter().map(|ad| (ad.id(), ad.counters)).collect();
        resolved
            .iter()
            .map(|ad| {
                let mut ad = ad.clone();
                if let Some(current) = counters.get(ad.id()) {
                    ad.counters = *current;
                }
                ad
            })
            .collect()
    }

    fn publish(&self, selection: DisplaySelection, shutdown: &watch::Receiver<bool>) {
        // teardown's send(true) waits for this guard
        let torn_down = shutdown.borrow();
        if *torn_down {
            debug!("torn down before publish, discarding selection");
            return;
        }
        info!(
            displayed = selection.len(),
            visitor = selection.visitor().unwrap_or_default(),
            "selection published"
        );
        self.selection.send_replace(selection);
    }
}

/// Drains everything already queued and keeps the newest good snapshot.
pub(crate) fn coalesce(
    first: Result<Vec<AdDocument>, StoreError>,
    subscription: &mut Subscription<Vec<AdDocument>>,
) -> Option<Vec<AdDocument>> {
    let mut latest = None;
    let mut skipped = 0usize;
    let mut next = Some(first);
    while let Some(notification) = next {
        match notification {
            Ok(documents) => {
                if latest.replace(documents).is_some() {
                    skipped += 1;
                }
            }
            Err(err) => warn!(error = %err, "active-set subscription error"),
        }
        next = subscription.try_recv().ok();
    }
    if skipped > 0 {
        debug!(skipped, "coalesced active-set notifications");
    }
    latest
}

async fn identity_changed(changes: &mut Option<watch::Receiver<VisitorIdentity>>) -> bool {
    match changes {
        Some(rx) => rx.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AdStatus, AuthorDisplay, AuthorId, AuthorProfile};
    use crate::engine::cache::{AdCache, CacheSnapshot, SpawnedCache};
    use crate::engine::gate::hours;
    use crate::engine::selector::SelectionPolicy;
    use crate::impls::{
        CachingAuthorDirectory, CollectingErrorReporter, InMemoryAdStore, SessionIdentity,
    };
    use crate::ports::{FixedClock, SeededRandom};
    use crate::test_support::{created_at, now, wait_for};
    use chrono::Duration;
    use std::net::{IpAddr, Ipv4Addr};

    struct Harness {
        store: Arc<InMemoryAdStore>,
        reporter: Arc<CollectingErrorReporter>,
        identity: Arc<SessionIdentity>,
        selection: watch::Receiver<DisplaySelection>,
        signals: Arc<ControllerSignals>,
        cache: CacheHandle,
        commands: mpsc::Sender<ControllerCommand>,
        shutdown: watch::Sender<bool>,
        join: JoinHandle<()>,
        _cache_join: JoinHandle<()>,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryAdStore::new());
        let reporter = Arc::new(CollectingErrorReporter::new());
        let identity = Arc::new(SessionIdentity::anonymous(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))));
        let clock = Arc::new(FixedClock::new(now()));

        let pipeline = Pipeline {
            store: store.clone(),
            authors: AuthorResolver::new(
                Arc::new(CachingAuthorDirectory::new(store.clone())),
                reporter.clone(),
            ),
            gate: Arc::new(VisibilityGate::new(hours(4.0), 3, clock)),
            selector: Arc::new(Selector::new(
                SelectionPolicy::default(),
                Arc::new(SeededRandom::new(7)),
            )),
            identity: identity.clone(),
            reporter: reporter.clone(),
            capacity: 16,
            retry: RetryPolicy::default(),
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (publish, _) = watch::channel(CacheSnapshot::from(Vec::new()));
        let SpawnedCache {
            handle,
            listing,
            counters: _,
            join: cache_join,
        } = AdCache::spawn("active", 16, Arc::new(publish), shutdown_rx.clone());

        let (selection_tx, selection) = watch::channel(DisplaySelection::empty());
        let signals = Arc::new(ControllerSignals::new());
        let (commands, commands_rx) = mpsc::channel(4);
        let join = ActiveSetController::new(
            pipeline,
            listing,
            handle.clone(),
            Arc::new(selection_tx),
            signals.clone(),
        )
        .spawn(commands_rx, shutdown_rx);

        Harness {
            store,
            reporter,
            identity,
            selection,
            signals,
            cache: handle,
            commands,
            shutdown,
            join,
            _cache_join: cache_join,
        }
    }

    fn active(id: &str, author: &str, minute: u32) -> AdDocument {
        AdDocument::new(id, author, created_at(minute))
            .with_status(AdStatus::Active)
            .approved(true)
    }

    #[tokio::test]
    async fn unresolved_author_is_published_with_placeholder() {
        let mut h = harness();
        h.store.put_author(AuthorProfile::new("u-x", "Xavier"));
        h.store
            .fail_author(&AuthorId::new("u-y"), StoreError::Unavailable("down".into()));

        h.store.upsert_ad(active("X", "u-x", 2)).await;
        h.store.upsert_ad(active("Y", "u-y", 1)).await;

        let selection = wait_for(&mut h.selection, |s| {
            s.items().iter().any(|a| a.id().as_str() == "X")
                && s.items().iter().any(|a| a.id().as_str() == "Y")
        })
        .await;

        for ad in selection.items() {
            match ad.id().as_str() {
                "X" => assert!(ad.author.is_resolved()),
                _ => assert_eq!(ad.author, AuthorDisplay::Unresolved(AuthorId::new("u-y"))),
            }
        }
        let faults: Vec<_> = h
            .reporter
            .faults()
            .into_iter()
            .filter(|f| matches!(f, EngineFault::AuthorResolution { .. }))
            .collect();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].advertisement().as_str(), "Y");
        assert_eq!(h.signals.state(), ControllerState::Active);
    }

    #[tokio::test]
    async fn failed_lookup_fails_closed() {
        let mut h = harness();
        h.store.put_author(AuthorProfile::new("u-1", "One"));
        let broken = AdvertisementId::new("broken");
        h.store
            .fail_view_lookups(&broken, StoreError::Unavailable("timeout".into()));

        h.store.upsert_ad(active("broken", "u-1", 1)).await;
        let selection = wait_for(&mut h.selection, |s| !s.is_empty()).await;

        // only reachable through the shuffled fill, never the priority slice
        assert!(selection.items().iter().all(|a| a.id() == &broken));
        assert_eq!(selection.len(), 1);
        assert!(h.reporter.faults().iter().any(|f| matches!(
            f,
            EngineFault::Eligibility { ad, .. } if ad == &broken
        )));
    }

    #[tokio::test]
    async fn capped_ad_leaves_priority_slice() {
        let mut h = harness();
        h.store.put_author(AuthorProfile::new("u-1", "One"));
        let visitor = h.identity.current().key().to_string();
        let capped = AdvertisementId::new("capped");
        h.store.set_view_record(
            &capped,
            &visitor,
            crate::domain::ViewRecord::new(vec![
                now() - Duration::hours(3),
                now() - Duration::hours(2),
                now() - Duration::hours(1),
            ]),
        );

        h.store.upsert_ad(active("capped", "u-1", 2)).await;
        h.store.upsert_ad(active("fresh", "u-1", 1)).await;

        // eligible = [fresh]; priority slice comes first
        let selection = wait_for(&mut h.selection, |s| s.len() == 3).await;
        assert_eq!(selection.items()[0].id().as_str(), "fresh");
        assert_eq!(selection.visitor(), Some(visitor.as_str()));
    }

    #[tokio::test]
    async fn identity_change_recomputes_against_cache() {
        let mut h = harness();
        h.store.put_author(AuthorProfile::new("u-1", "One"));
        h.store.upsert_ad(active("A", "u-1", 1)).await;
        let first = wait_for(&mut h.selection, |s| !s.is_empty()).await;
        assert!(first.visitor().is_some_and(|v| v != "member-42"));
        wait_for(&mut h.cache.subscribe(), |s| !s.is_empty()).await;

        h.identity.sign_in("member-42");
        let second = wait_for(&mut h.selection, |s| s.visitor() == Some("member-42")).await;
        assert_eq!(second.ids(), first.ids());
        assert_eq!(h.store.active_subscribers(), 1);
    }

    #[tokio::test]
    async fn sign_in_during_first_batch_is_not_lost() {
        let mut h = harness();
        h.store.put_author(AuthorProfile::new("u-1", "One"));
        h.store.set_lookup_delay(Some(std::time::Duration::from_millis(100)));
        h.store.upsert_ad(active("A", "u-1", 1)).await;

        let mut loading = h.signals.loading.subscribe();
        wait_for(&mut loading, |l| *l).await;
        h.identity.sign_in("member-42");

        let selection = wait_for(&mut h.selection, |s| s.visitor() == Some("member-42")).await;
        assert_eq!(selection.len(), 2);
        assert!(selection.items().iter().all(|a| a.id().as_str() == "A"));
    }

    #[tokio::test]
    async fn recompute_after_removal_never_brings_the_ad_back() {
        let h = harness();
        h.store.put_author(AuthorProfile::new("u-1", "One"));
        h.store.upsert_ad(active("A", "u-1", 1)).await;
        h.store.upsert_ad(active("B", "u-1", 2)).await;
        wait_for(&mut h.cache.subscribe(), |s| s.len() == 2).await;
        wait_for(&mut h.signals.loading.subscribe(), |l| !*l).await;

        h.store.set_lookup_delay(Some(std::time::Duration::from_millis(100)));
        h.store.remove_ad(&AdvertisementId::new("B")).await;
        let mut loading = h.signals.loading.subscribe();
        wait_for(&mut loading, |l| *l).await;
        h.commands.send(ControllerCommand::Recompute).await.unwrap();

        wait_for(&mut h.cache.subscribe(), |s| s.len() == 1).await;
        wait_for(&mut loading, |l| !*l).await;
        // let the queued command run
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;

        let selection = h.selection.borrow().clone();
        assert_eq!(selection.len(), 2);
        assert!(selection.items().iter().all(|a| a.id().as_str() == "A"));
    }

    #[tokio::test]
    async fn recompute_command_with_empty_cache_is_a_noop() {
        let h = harness();
        h.commands.send(ControllerCommand::Recompute).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(h.selection.borrow().is_empty());
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn results_finishing_after_teardown_are_discarded() {
        let h = harness();
        h.store.put_author(AuthorProfile::new("u-1", "One"));
        h.store.set_lookup_delay(Some(std::time::Duration::from_millis(150)));
        h.store.upsert_ad(active("A", "u-1", 1)).await;

        let mut loading = h.signals.loading.subscribe();
        wait_for(&mut loading, |l| *l).await;

        h.shutdown.send(true).unwrap();
        h.join.await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        assert!(h.selection.borrow().is_empty());
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn queued_notifications_coalesce_to_latest() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(Ok(vec![active("A", "u", 1)])).await.unwrap();
        tx.send(Err(StoreError::Unavailable("blip".into()))).await.unwrap();
        tx.send(Ok(vec![active("B", "u", 2), active("A", "u", 1)])).await.unwrap();

        let first = rx.recv().await.unwrap();
        let latest = coalesce(first, &mut rx).unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].id.as_str(), "B");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn only_errors_coalesce_to_nothing() {
        let (tx, mut rx) = mpsc::channel::<Result<Vec<AdDocument>, StoreError>>(2);
        tx.send(Err(StoreError::Closed)).await.unwrap();
        let first = rx.recv().await.unwrap();
        assert!(coalesce(first, &mut rx).is_none());
    }
}
