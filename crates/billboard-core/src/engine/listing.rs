//! Management listing - 広告主ダッシュボード向けの一覧
//!
//! 全広告（ステータス問わず、作成日時の新しい順）を購読し、
//! 管理者なら全件、それ以外は自分が作成した広告だけを見せます。
//! 一覧は専用のキャッシュと CounterAggregator を持つので、
//! impressions / clicks / visits もライブで更新されます。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::aggregator::CounterAggregator;
use super::authors::AuthorResolver;
use super::cache::{AdCache, CacheHandle, CacheSnapshot, ListingWriter};
use super::controller::coalesce;
use super::retry::{RetryPolicy, open_with_retry};
use super::workers::TaskGroup;
use crate::domain::{AdDocument, AuthorId};
use crate::ports::AdStore;

/// Who is looking at the listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewer {
    pub id: AuthorId,
    #[serde(default)]
    pub is_admin: bool,
}

impl Viewer {
    pub fn author(id: impl Into<AuthorId>) -> Self {
        Self {
            id: id.into(),
            is_admin: false,
        }
    }

    pub fn admin(id: impl Into<AuthorId>) -> Self {
        Self {
            id: id.into(),
            is_admin: true,
        }
    }
}

pub fn visible_to(document: &AdDocument, viewer: &Viewer) -> bool {
    viewer.is_admin || document.author_id == viewer.id
}

/// Running listing subscription. Dropping it without `teardown()` also stops
/// the tasks (the shutdown sender goes away).
pub struct ListingHandle {
    viewer: Viewer,
    cache: CacheHandle,
    loading: watch::Receiver<bool>,
    tasks: TaskGroup,
}

impl ListingHandle {
    pub fn spawn(
        viewer: Viewer,
        store: Arc<dyn AdStore>,
        authors: AuthorResolver,
        capacity: usize,
        retry: RetryPolicy,
    ) -> Self {
        let mut tasks = TaskGroup::new();
        let (publish, _) = watch::channel(CacheSnapshot::from(Vec::new()));
        let cache = AdCache::spawn("listing", capacity, Arc::new(publish), tasks.shutdown_signal());
        let handle = cache.handle.clone();
        tasks.push(cache.join);

        let aggregator =
            CounterAggregator::new(store.clone(), cache.counters, capacity, retry.clone());
        tasks.push(aggregator.spawn(handle.clone(), tasks.shutdown_signal()));

        let (loading_tx, loading) = watch::channel(false);
        let feed = ListingFeed {
            viewer: viewer.clone(),
            store,
            authors,
            writer: cache.listing,
            cache: handle.clone(),
            loading: loading_tx,
            capacity,
            retry,
        };
        tasks.push(tokio::spawn(feed.run(tasks.shutdown_signal())));

        info!(viewer = %viewer.id, admin = viewer.is_admin, "listing started");
        Self {
            viewer,
            cache: handle,
            loading,
            tasks,
        }
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        self.cache.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<CacheSnapshot> {
        self.cache.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    pub async fn teardown(self) {
        debug!(viewer = %self.viewer.id, "listing teardown");
        self.tasks.shutdown_and_join().await;
    }
}

struct ListingFeed {
    viewer: Viewer,
    store: Arc<dyn AdStore>,
    authors: AuthorResolver,
    writer: ListingWriter,
    cache: CacheHandle,
    loading: watch::Sender<bool>,
    capacity: usize,
    retry: RetryPolicy,
}

impl ListingFeed {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let store = &self.store;
        let capacity = self.capacity;
        let Some(mut subscription) = open_with_retry("listing", &self.retry, &mut shutdown, || {
            store.subscribe_all(capacity)
        })
        .await
        else {
            return;
        };

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
                            self.on_documents(documents, &shutdown).await;
                        }
                    }
                    None => {
                        warn!("listing subscription closed, resubscribing");
                        match open_with_retry("listing", &self.retry, &mut shutdown, || {
                            store.subscribe_all(capacity)
                        })
                        .await
                        {
                            Some(reopened) => subscription = reopened,
                            None => break,
                        }
                    }
                },
            }
        }
        debug!(viewer = %self.viewer.id, "listing feed stopped");
    }

    async fn on_documents(&self, documents: Vec<AdDocument>, shutdown: &watch::Receiver<bool>) {
        self.loading.send_replace(true);
        let visible: Vec<AdDocument> = documents
            .into_iter()
            .filter(|doc| visible_to(doc, &self.viewer))
            .collect();
        debug!(viewer = %self.viewer.id, count = visible.len(), "listing changed");

        let previous = self.cache.snapshot();
        let ads = self.authors.resolve_batch(visible, &previous).await;
        if !*shutdown.borrow() && self.writer.replace(ads).await.is_err() {
            debug!("listing cache closed, discarding batch");
        }
        self.loading.send_replace(false);
    }
}
