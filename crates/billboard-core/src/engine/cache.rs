//! AdCache - 広告レコードの単一 writer アクター
//!
//! キャッシュの更新はすべて 1 本の mpsc に直列化されます。
//! 書き込み側は 2 種類のハンドルに分かれていて、触れるフィールドが型で分離されています。
//! - `ListingWriter`（controller 用）: document と author を差し替える。counters は id ごとに保持
//! - `CounterWriter`（aggregator 用）: 1 件の 1 カウンタだけを書き換える
//!
//! 読み手は `CacheHandle` から watch で `Arc<[Advertisement]>` のスナップショットを受け取ります。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::domain::{Advertisement, AdvertisementId, CounterKind, EngineError};

/// Published snapshot of the cache, in listing order.
pub type CacheSnapshot = Arc<[Advertisement]>;

enum CacheCommand {
    ReplaceListing(Vec<Advertisement>),
    SetCounter {
        id: AdvertisementId,
        kind: CounterKind,
        value: u64,
    },
}

/// Read side of the cache.
#[derive(Clone)]
pub struct CacheHandle {
    snapshots: watch::Receiver<CacheSnapshot>,
}

impl CacheHandle {
    pub fn snapshot(&self) -> CacheSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CacheSnapshot> {
        self.snapshots.clone()
    }

    pub fn len(&self) -> usize {
        self.snapshots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.borrow().is_empty()
    }
}

/// Controller-owned fields: document + author.
#[derive(Clone)]
pub struct ListingWriter {
    tx: mpsc::Sender<CacheCommand>,
}

impl ListingWriter {
    pub async fn replace(&self, ads: Vec<Advertisement>) -> Result<(), EngineError> {
        self.tx
            .send(CacheCommand::ReplaceListing(ads))
            .await
            .map_err(|_| EngineError::ShutDown)
    }
}

/// Aggregator-owned fields: counters.
#[derive(Clone)]
pub struct CounterWriter {
    tx: mpsc::Sender<CacheCommand>,
}

impl CounterWriter {
    pub async fn set(
        &self,
        id: AdvertisementId,
        kind: CounterKind,
        value: u64,
    ) -> Result<(), EngineError> {
        self.tx
            .send(CacheCommand::SetCounter { id, kind, value })
            .await
            .map_err(|_| EngineError::ShutDown)
    }
}

pub struct SpawnedCache {
    pub handle: CacheHandle,
    pub listing: ListingWriter,
    pub counters: CounterWriter,
    pub join: JoinHandle<()>,
}

/// Cache state, owned by the actor task.
#[derive(Default)]
struct CacheState {
    order: Vec<AdvertisementId>,
    records: HashMap<AdvertisementId, Advertisement>,
}

impl CacheState {
    fn replace_listing(&mut self, ads: Vec<Advertisement>) {
        let mut records = HashMap::with_capacity(ads.len());
        let mut order = Vec::with_capacity(ads.len());
        for mut ad in ads {
            if let Some(previous) = self.records.get(ad.id()) {
                ad.counters = previous.counters;
            }
            order.push(ad.id().clone());
            records.insert(ad.id().clone(), ad);
        }
        self.order = order;
        self.records = records;
    }

    /// Returns false when nothing changed.
    fn set_counter(&mut self, id: &AdvertisementId, kind: CounterKind, value: u64) -> bool {
        let Some(record) = self.records.get_mut(id) else {
            return false;
        };
        if record.counters.get(kind) == value {
            return false;
        }
        record.counters.set(kind, value);
        true
    }

    fn snapshot(&self) -> CacheSnapshot {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect::<Vec<_>>()
            .into()
    }
}

pub struct AdCache;

impl AdCache {
    /// Spawns the actor. It publishes into `publish` and stops when `shutdown` flips to true
    /// or every writer is dropped.
    pub fn spawn(
        name: &'static str,
        capacity: usize,
        publish: Arc<watch::Sender<CacheSnapshot>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> SpawnedCache {
        let (tx, mut rx) = mpsc::channel::<CacheCommand>(capacity.max(1));
        let handle = CacheHandle {
            snapshots: publish.subscribe(),
        };

        let join = tokio::spawn(async move {
            let mut state = CacheState::default();
            loop {
                if *shutdown.borrow() {
                    break;
                }
                let command = tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                    command = rx.recv() => command,
                };
                let Some(command) = command else {
                    break;
                };

                let changed = match command {
                    CacheCommand::ReplaceListing(ads) => {
                        debug!(cache = name, count = ads.len(), "replacing listing");
                        state.replace_listing(ads);
                        true
                    }
                    CacheCommand::SetCounter { id, kind, value } => {
                        trace!(cache = name, ad_id = %id, %kind, value, "counter update");
                        state.set_counter(&id, kind, value)
                    }
                };
                if changed {
                    publish.send_replace(state.snapshot());
                }
            }
            debug!(cache = name, "cache actor stopped");
        });

        SpawnedCache {
            handle,
            listing: ListingWriter { tx: tx.clone() },
            counters: CounterWriter { tx },
            join,
        }
    }
}
