//! CounterAggregator - impressions / clicks / visits の集計
//!
//! # フロー
//! 1. キャッシュのスナップショットを watch で監視し、メンバー（広告 id）の増減を検出
//! 2. 新しい id ごとに 3 本のサブストリーム購読タスクを起動
//! 3. 通知が来るたびに *スナップショット全体* から合計を計算し直し、
//!    `CounterWriter` 経由で該当カウンタだけを書き換える（加算ではなく上書き）
//! 4. キャッシュから消えた id のタスクは abort（購読解除）
//!
//! 1 本のサブストリームは 1 タスクが順番に処理するので、同じフィールドへの更新は
//! 通知の配送順で適用されます。異なるストリーム間の順序は保証しません（書くフィールドが別）。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::cache::{CacheHandle, CounterWriter};
use super::retry::{RetryPolicy, open_with_retry};
use crate::domain::{AdvertisementId, CounterKind};
use crate::ports::AdStore;

pub struct CounterAggregator {
    store: Arc<dyn AdStore>,
    writer: CounterWriter,
    capacity: usize,
    retry: RetryPolicy,
    streams: HashMap<AdvertisementId, Vec<JoinHandle<()>>>,
}

impl CounterAggregator {
    pub fn new(
        store: Arc<dyn AdStore>,
        writer: CounterWriter,
        capacity: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            writer,
            capacity,
            retry,
            streams: HashMap::new(),
        }
    }

    /// Follows cache membership until `shutdown` flips, then cancels every sub-stream.
    pub fn spawn(self, cache: CacheHandle, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(cache, shutdown))
    }

    async fn run(mut self, cache: CacheHandle, mut shutdown: watch::Receiver<bool>) {
        let mut members = cache.subscribe();
        loop {
            let ids: HashSet<AdvertisementId> = members
                .borrow_and_update()
                .iter()
                .map(|ad| ad.id().clone())
                .collect();
            self.track(&ids, &shutdown);

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                changed = members.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        self.close_all();
    }

    /// Opens streams for new ids and closes streams of ids that left.
    fn track(&mut self, ids: &HashSet<AdvertisementId>, shutdown: &watch::Receiver<bool>) {
        let gone: Vec<AdvertisementId> = self
            .streams
            .keys()
            .filter(|id| !ids.contains(*id))
            .cloned()
            .collect();
        for id in gone {
            if let Some(handles) = self.streams.remove(&id) {
                debug!(ad_id = %id, "closing counter streams");
                handles.iter().for_each(JoinHandle::abort);
            }
        }

        for id in ids {
            if self.streams.contains_key(id) {
                continue;
            }
            debug!(ad_id = %id, "opening counter streams");
            let handles = CounterKind::ALL
                .iter()
                .map(|&kind| {
                    tokio::spawn(run_stream(
                        self.store.clone(),
                        id.clone(),
                        kind,
                        self.writer.clone(),
                        self.capacity,
                        self.retry.clone(),
                        shutdown.clone(),
                    ))
                })
                .collect();
            self.streams.insert(id.clone(), handles);
        }
    }

    fn close_all(&mut self) {
        for (_, handles) in self.streams.drain() {
            handles.iter().for_each(JoinHandle::abort);
        }
    }

    pub fn tracked(&self) -> usize {
        self.streams.len()
    }
}

async fn run_stream(
    store: Arc<dyn AdStore>,
    ad: AdvertisementId,
    kind: CounterKind,
    writer: CounterWriter,
    capacity: usize,
    retry: RetryPolicy,
    mut shutdown: watch::Receiver<bool>,
) {
    let label = format!("{ad}/{kind}");
    let Some(mut subscription) = open_with_retry(&label, &retry, &mut shutdown, || {
        store.subscribe_counter(&ad, kind, capacity)
    })
    .await
    else {
        return;
    };

    while let Some(notification) = subscription.recv().await {
        match notification {
            Ok(documents) => {
                let total = kind.tally(&documents);
                if writer.set(ad.clone(), kind, total).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                // counter stays stale until the next good snapshot
                warn!(ad_id = %ad, %kind, error = %err, "counter subscription error");
            }
        }
    }
    debug!(ad_id = %ad, %kind, "counter stream ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StoreError;
    use crate::engine::cache::{AdCache, CacheSnapshot};
    use crate::impls::InMemoryAdStore;
    use crate::test_support::{ad, wait_for};
    use serde_json::json;

    struct Harness {
        store: Arc<InMemoryAdStore>,
        cache: crate::engine::cache::SpawnedCache,
        shutdown: watch::Sender<bool>,
        join: JoinHandle<()>,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryAdStore::new());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (publish, _) = watch::channel(CacheSnapshot::from(Vec::new()));
        let cache = AdCache::spawn("test", 16, Arc::new(publish), shutdown_rx.clone());
        let aggregator = CounterAggregator::new(
            store.clone(),
            cache.counters.clone(),
            16,
            RetryPolicy::default(),
        );
        let join = aggregator.spawn(cache.handle.clone(), shutdown_rx);
        Harness {
            store,
            cache,
            shutdown,
            join,
        }
    }

    #[tokio::test]
    async fn impressions_equal_sum_of_documents() {
        let h = harness();
        let id = AdvertisementId::new("a");
        h.store.push_counter_doc(&id, CounterKind::Impressions, json!({"impression": 3})).await;
        h.store.push_counter_doc(&id, CounterKind::Impressions, json!({"impression": 4})).await;

        h.cache.listing.replace(vec![ad("a")]).await.unwrap();
        let mut rx = h.cache.handle.subscribe();
        wait_for(&mut rx, |s| s.first().is_some_and(|a| a.counters.impressions == 7)).await;

        h.store.push_counter_doc(&id, CounterKind::Impressions, json!({"impression": 5})).await;
        wait_for(&mut rx, |s| s.first().is_some_and(|a| a.counters.impressions == 12)).await;
    }

    #[tokio::test]
    async fn streams_update_disjoint_fields() {
        let h = harness();
        let id = AdvertisementId::new("a");
        h.cache.listing.replace(vec![ad("a")]).await.unwrap();

        h.store.push_counter_doc(&id, CounterKind::Clicks, json!({"clicked": 2})).await;
        h.store.push_counter_doc(&id, CounterKind::Visits, json!({"visits": ["t1", "t2", "t3"]})).await;
        h.store.push_counter_doc(&id, CounterKind::Impressions, json!({"impression": 9})).await;

        let mut rx = h.cache.handle.subscribe();
        let snap = wait_for(&mut rx, |s| {
            s.first().is_some_and(|a| {
                a.counters.clicks == 2 && a.counters.visits == 3 && a.counters.impressions == 9
            })
        })
        .await;
        assert_eq!(snap.len(), 1);
    }

    #[tokio::test]
    async fn stream_error_keeps_last_good_value() {
        let h = harness();
        let id = AdvertisementId::new("a");
        h.store.push_counter_doc(&id, CounterKind::Clicks, json!({"clicked": 5})).await;
        h.cache.listing.replace(vec![ad("a")]).await.unwrap();

        let mut rx = h.cache.handle.subscribe();
        wait_for(&mut rx, |s| s.first().is_some_and(|a| a.counters.clicks == 5)).await;

        h.store
            .fail_counter_stream(&id, CounterKind::Clicks, StoreError::Unavailable("blip".into()))
            .await;
        h.store.push_counter_doc(&id, CounterKind::Clicks, json!({"clicked": 1})).await;
        wait_for(&mut rx, |s| s.first().is_some_and(|a| a.counters.clicks == 6)).await;
    }

    #[tokio::test]
    async fn removed_ads_stop_their_streams() {
        let h = harness();
        h.cache.listing.replace(vec![ad("a"), ad("b")]).await.unwrap();
        let a = AdvertisementId::new("a");
        let b = AdvertisementId::new("b");

        let mut rx = h.cache.handle.subscribe();
        wait_for(&mut rx, |s| s.len() == 2).await;
        h.store.wait_for_counter_subscribers(&b, CounterKind::ALL.len()).await;

        h.cache.listing.replace(vec![ad("a")]).await.unwrap();
        h.store.wait_for_counter_subscribers(&b, 0).await;
        assert_eq!(h.store.counter_subscribers(&a), CounterKind::ALL.len());
    }

    #[tokio::test]
    async fn shutdown_cancels_every_stream() {
        let h = harness();
        h.cache.listing.replace(vec![ad("a")]).await.unwrap();
        let a = AdvertisementId::new("a");
        h.store.wait_for_counter_subscribers(&a, 3).await;

        h.shutdown.send(true).unwrap();
        h.join.await.unwrap();
        h.store.wait_for_counter_subscribers(&a, 0).await;
    }
}
