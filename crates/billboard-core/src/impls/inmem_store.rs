//! InMemoryAdStore - 開発・テスト用のドキュメントストア
//!
//! # 実装詳細
//! - 状態は `parking_lot::Mutex` で保護（await を跨がない）
//! - 変更通知は購読ごとの bounded mpsc に「完全なスナップショット」を送る
//! - 配送は `tokio::sync::Mutex` で直列化し、購読者ごとの到着順 = 変更順を保つ
//! - 失敗注入: view record / author lookup / subscribe / ストリーム上のエラー
//!
//! # 使用例
//! ```ignore
//! let store = InMemoryAdStore::new();
//! store.upsert_ad(doc).await;
//! store.push_counter_doc(&id, CounterKind::Clicks, json!({"clicked": 1})).await;
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use crate::domain::{
    AdDocument, AdvertisementId, AuthorId, AuthorProfile, CounterKind, StoreError, ViewRecord,
};
use crate::ports::{AdStore, Subscription};

type Sender<T> = mpsc::Sender<Result<T, StoreError>>;
type CounterKey = (AdvertisementId, CounterKind);

#[derive(Default)]
struct StoreState {
    ads: HashMap<AdvertisementId, AdDocument>,
    counter_docs: HashMap<CounterKey, Vec<serde_json::Value>>,
    view_records: HashMap<(AdvertisementId, String), ViewRecord>,
    authors: HashMap<AuthorId, AuthorProfile>,

    active_subs: Vec<Sender<Vec<AdDocument>>>,
    all_subs: Vec<Sender<Vec<AdDocument>>>,
    counter_subs: HashMap<CounterKey, Vec<Sender<Vec<serde_json::Value>>>>,

    failing_views: HashMap<AdvertisementId, StoreError>,
    failing_authors: HashMap<AuthorId, StoreError>,
    failing_subscribes: u32,
    lookup_delay: Option<Duration>,
    author_fetches: HashMap<AuthorId, usize>,
}

impl StoreState {
    /// Newest first; ties broken by id so the order is total.
    fn sorted(&self, filter: impl Fn(&AdDocument) -> bool) -> Vec<AdDocument> {
        let mut docs: Vec<AdDocument> = self.ads.values().filter(|d| filter(d)).cloned().collect();
        docs.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| a.id.cmp(&b.id)));
        docs
    }

    fn active(&self) -> Vec<AdDocument> {
        self.sorted(AdDocument::is_displayable)
    }

    fn all(&self) -> Vec<AdDocument> {
        self.sorted(|_| true)
    }

    fn take_subscribe_failure(&mut self) -> Option<StoreError> {
        if self.failing_subscribes == 0 {
            return None;
        }
        self.failing_subscribes -= 1;
        Some(StoreError::Unavailable("injected subscribe failure".into()))
    }
}

/// One batch of notifications, computed under the state lock and sent after it.
#[derive(Default)]
struct Outbox {
    lists: Vec<(Sender<Vec<AdDocument>>, Result<Vec<AdDocument>, StoreError>)>,
    counters: Vec<(Sender<Vec<serde_json::Value>>, Result<Vec<serde_json::Value>, StoreError>)>,
}

pub struct InMemoryAdStore {
    state: Mutex<StoreState>,
    delivery: tokio::sync::Mutex<()>,
}

impl InMemoryAdStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            delivery: tokio::sync::Mutex::new(()),
        }
    }

    async fn deliver(&self, build: impl FnOnce(&mut StoreState) -> Outbox) {
        let _delivery = self.delivery.lock().await;
        let outbox = {
            let mut state = self.state.lock();
            build(&mut state)
        };
        for (tx, item) in outbox.lists {
            let _ = tx.send(item).await;
        }
        for (tx, item) in outbox.counters {
            let _ = tx.send(item).await;
        }
    }

    fn list_notifications(state: &mut StoreState) -> Outbox {
        state.active_subs.retain(|tx| !tx.is_closed());
        state.all_subs.retain(|tx| !tx.is_closed());
        let active = state.active();
        let all = state.all();
        let mut outbox = Outbox::default();
        outbox
            .lists
            .extend(state.active_subs.iter().map(|tx| (tx.clone(), Ok(active.clone()))));
        outbox
            .lists
            .extend(state.all_subs.iter().map(|tx| (tx.clone(), Ok(all.clone()))));
        outbox
    }

    // ---------------------------------------------------------------
    // Mutations (each one notifies the affected live queries)
    // ---------------------------------------------------------------

    pub async fn upsert_ad(&self, doc: AdDocument) {
        self.deliver(|state| {
            trace!(ad_id = %doc.id, "upsert advertisement");
            state.ads.insert(doc.id.clone(), doc);
            Self::list_notifications(state)
        })
        .await;
    }

    pub async fn remove_ad(&self, id: &AdvertisementId) {
        self.deliver(|state| {
            state.ads.remove(id);
            Self::list_notifications(state)
        })
        .await;
    }

    pub async fn push_counter_doc(
        &self,
        ad: &AdvertisementId,
        kind: CounterKind,
        doc: serde_json::Value,
    ) {
        self.deliver(|state| {
            let key = (ad.clone(), kind);
            let docs = state.counter_docs.entry(key.clone()).or_default();
            docs.push(doc);
            let snapshot = docs.clone();
            let mut outbox = Outbox::default();
            if let Some(subs) = state.counter_subs.get_mut(&key) {
                subs.retain(|tx| !tx.is_closed());
                outbox
                    .counters
                    .extend(subs.iter().map(|tx| (tx.clone(), Ok(snapshot.clone()))));
            }
            outbox
        })
        .await;
    }

    /// Delivers an error on every open subscription of one counter stream.
    pub async fn fail_counter_stream(&self, ad: &AdvertisementId, kind: CounterKind, err: StoreError) {
        self.deliver(|state| {
            let mut outbox = Outbox::default();
            if let Some(subs) = state.counter_subs.get(&(ad.clone(), kind)) {
                outbox
                    .counters
                    .extend(subs.iter().map(|tx| (tx.clone(), Err(err.clone()))));
            }
            outbox
        })
        .await;
    }

    /// Delivers an error on every open active-set subscription.
    pub async fn fail_active_stream(&self, err: StoreError) {
        self.deliver(|state| {
            let mut outbox = Outbox::default();
            outbox
                .lists
                .extend(state.active_subs.iter().map(|tx| (tx.clone(), Err(err.clone()))));
            outbox
        })
        .await;
    }

    // ---------------------------------------------------------------
    // Point data (no live queries)
    // ---------------------------------------------------------------

    pub fn record_view(&self, ad: &AdvertisementId, visitor: &str, at: DateTime<Utc>) {
        let mut state = self.state.lock();
        state
            .view_records
            .entry((ad.clone(), visitor.to_string()))
            .or_default()
            .views
            .push(at);
    }

    pub fn set_view_record(&self, ad: &AdvertisementId, visitor: &str, record: ViewRecord) {
        self.state
            .lock()
            .view_records
            .insert((ad.clone(), visitor.to_string()), record);
    }

    pub fn put_author(&self, profile: AuthorProfile) {
        self.state.lock().authors.insert(profile.id.clone(), profile);
    }

    // ---------------------------------------------------------------
    // Failure injection
    // ---------------------------------------------------------------

    pub fn fail_view_lookups(&self, ad: &AdvertisementId, err: StoreError) {
        self.state.lock().failing_views.insert(ad.clone(), err);
    }

    pub fn fail_author(&self, id: &AuthorId, err: StoreError) {
        self.state.lock().failing_authors.insert(id.clone(), err);
    }

    pub fn heal_author(&self, id: &AuthorId) {
        self.state.lock().failing_authors.remove(id);
    }

    pub fn fail_next_subscribes(&self, n: u32) {
        self.state.lock().failing_subscribes = n;
    }

    /// Delays every view-record lookup.
    pub fn set_lookup_delay(&self, delay: Option<Duration>) {
        self.state.lock().lookup_delay = delay;
    }

    // ---------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------

    pub fn counter_subscribers(&self, ad: &AdvertisementId) -> usize {
        let state = self.state.lock();
        CounterKind::ALL
            .iter()
            .filter_map(|kind| state.counter_subs.get(&(ad.clone(), *kind)))
            .flatten()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    pub fn active_subscribers(&self) -> usize {
        let state = self.state.lock();
        state.active_subs.iter().filter(|tx| !tx.is_closed()).count()
    }

    /// Polls until `ad` has exactly `n` open counter subscriptions.
    pub async fn wait_for_counter_subscribers(&self, ad: &AdvertisementId, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while self.counter_subscribers(ad) != n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {n} counter subscribers for {ad}, have {}",
                self.counter_subscribers(ad)
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub fn author_fetches(&self, id: &AuthorId) -> usize {
        self.state.lock().author_fetches.get(id).copied().unwrap_or(0)
    }
}

impl Default for InMemoryAdStore {
    fn default() -> Self {
        Self::new()
    }
}

fn subscription<T>(capacity: usize, initial: T) -> (Sender<T>, Subscription<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    // fresh channel with room for at least one item
    let _ = tx.try_send(Ok(initial));
    (tx, rx)
}

#[async_trait]
impl AdStore for InMemoryAdStore {
    async fn subscribe_active(
        &self,
        capacity: usize,
    ) -> Result<Subscription<Vec<AdDocument>>, StoreError> {
        let _delivery = self.delivery.lock().await;
        let mut state = self.state.lock();
        if let Some(err) = state.take_subscribe_failure() {
            return Err(err);
        }
        let (tx, rx) = subscription(capacity, state.active());
        state.active_subs.push(tx);
        Ok(rx)
    }

    async fn subscribe_all(
        &self,
        capacity: usize,
    ) -> Result<Subscription<Vec<AdDocument>>, StoreError> {
        let _delivery = self.delivery.lock().await;
        let mut state = self.state.lock();
        if let Some(err) = state.take_subscribe_failure() {
            return Err(err);
        }
        let (tx, rx) = subscription(capacity, state.all());
        state.all_subs.push(tx);
        Ok(rx)
    }

    async fn subscribe_counter(
        &self,
        ad: &AdvertisementId,
        kind: CounterKind,
        capacity: usize,
    ) -> Result<Subscription<Vec<serde_json::Value>>, StoreError> {
        let _delivery = self.delivery.lock().await;
        let mut state = self.state.lock();
        if let Some(err) = state.take_subscribe_failure() {
            return Err(err);
        }
        let key = (ad.clone(), kind);
        let docs = state.counter_docs.get(&key).cloned().unwrap_or_default();
        let (tx, rx) = subscription(capacity, docs);
        state.counter_subs.entry(key).or_default().push(tx);
        Ok(rx)
    }

    async fn view_record(
        &self,
        ad: &AdvertisementId,
        visitor: &str,
    ) -> Result<Option<ViewRecord>, StoreError> {
        let delay = self.state.lock().lookup_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock();
        if let Some(err) = state.failing_views.get(ad) {
            return Err(err.clone());
        }
        Ok(state
            .view_records
            .get(&(ad.clone(), visitor.to_string()))
            .cloned())
    }

    async fn author(&self, id: &AuthorId) -> Result<Option<AuthorProfile>, StoreError> {
        let mut state = self.state.lock();
        *state.author_fetches.entry(id.clone()).or_default() += 1;
        if let Some(err) = state.failing_authors.get(id) {
            return Err(err.clone());
        }
        Ok(state.authors.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AdStatus;
    use chrono::TimeZone;
    use serde_json::json;

    fn doc(id: &str, minute: u32, active: bool) -> AdDocument {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap();
        let status = if active { AdStatus::Active } else { AdStatus::Draft };
        AdDocument::new(id, "u-1", created).with_status(status).approved(true)
    }

    #[tokio::test]
    async fn active_subscription_is_filtered_and_newest_first() {
        let store = InMemoryAdStore::new();
        store.upsert_ad(doc("old", 1, true)).await;
        store.upsert_ad(doc("draft", 2, false)).await;
        store.upsert_ad(doc("new", 3, true)).await;

        let mut rx = store.subscribe_active(4).await.unwrap();
        let first = rx.recv().await.unwrap().unwrap();
        let ids: Vec<&str> = first.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);

        store.remove_ad(&AdvertisementId::new("new")).await;
        let second = rx.recv().await.unwrap().unwrap();
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn counter_subscription_sends_full_snapshots() {
        let store = InMemoryAdStore::new();
        let id = AdvertisementId::new("a");
        store.push_counter_doc(&id, CounterKind::Clicks, json!({"clicked": 1})).await;

        let mut rx = store.subscribe_counter(&id, CounterKind::Clicks, 4).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap().len(), 1);

        store.push_counter_doc(&id, CounterKind::Clicks, json!({"clicked": 1})).await;
        assert_eq!(rx.recv().await.unwrap().unwrap().len(), 2);
        assert_eq!(store.counter_subscribers(&id), 1);

        drop(rx);
        assert_eq!(store.counter_subscribers(&id), 0);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_errors() {
        let store = InMemoryAdStore::new();
        let id = AdvertisementId::new("a");
        store.fail_view_lookups(&id, StoreError::Unavailable("down".into()));
        assert!(store.view_record(&id, "v").await.is_err());

        store.fail_next_subscribes(1);
        assert!(store.subscribe_active(1).await.is_err());
        assert!(store.subscribe_active(1).await.is_ok());
    }

    #[tokio::test]
    async fn views_append_in_order() {
        let store = InMemoryAdStore::new();
        let id = AdvertisementId::new("a");
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap();
        store.record_view(&id, "v", t1);
        store.record_view(&id, "v", t2);

        let record = store.view_record(&id, "v").await.unwrap().unwrap();
        assert_eq!(record.views, vec![t1, t2]);
        assert!(store.view_record(&id, "other").await.unwrap().is_none());
    }
}
