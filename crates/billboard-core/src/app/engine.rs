//! Engine - プレゼンテーション層から使うハンドル
//!
//! # ライフサイクル
//! - `activate()`: 未購読なら購読を開始（→ Active）。購読済みでキャッシュが空でなければ、
//!   storage を引き直さずに再計算だけ依頼する
//! - `recompute()`: 明示的な再計算（identity の切り替えなど）
//! - `teardown()`: 全購読を止めて Uninitialized に戻す。途中の結果は捨てる
//!
//! publish される値（selection / active set）は `watch` で配られ、
//! teardown → activate をまたいでも同じ receiver のまま使えます。

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info};

use super::builder::EngineBuilder;
use super::config::EngineConfig;
use crate::domain::{DisplaySelection, EngineError};
use crate::engine::{
    ActiveSetController, AdCache, CacheHandle, CacheSnapshot, ControllerCommand,
    ControllerSignals, CounterAggregator, ListingHandle, Pipeline, TaskGroup, Viewer,
};
use crate::observability::EngineStatus;

struct Running {
    tasks: TaskGroup,
    commands: mpsc::Sender<ControllerCommand>,
    cache: CacheHandle,
}

pub struct Engine {
    pipeline: Pipeline,
    config: EngineConfig,
    selection: Arc<watch::Sender<DisplaySelection>>,
    active: Arc<watch::Sender<CacheSnapshot>>,
    signals: Arc<ControllerSignals>,
    running: Mutex<Option<Running>>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub(crate) fn new(pipeline: Pipeline, config: EngineConfig) -> Self {
        Self {
            pipeline,
            config,
            selection: Arc::new(watch::channel(DisplaySelection::empty()).0),
            active: Arc::new(watch::channel(CacheSnapshot::from(Vec::new())).0),
            signals: Arc::new(ControllerSignals::new()),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribes on first call; later calls only request a recomputation.
    pub async fn activate(&self) -> Result<(), EngineError> {
        let mut running = self.running.lock().await;
        match running.as_ref() {
            None => {
                *running = Some(self.start());
                Ok(())
            }
            Some(current) if current.cache.is_empty() => {
                debug!("already subscribed, nothing cached yet");
                Ok(())
            }
            Some(current) => request_recompute(&current.commands),
        }
    }

    /// Fails with `ShutDown` while not activated.
    pub async fn recompute(&self) -> Result<(), EngineError> {
        let running = self.running.lock().await;
        match running.as_ref() {
            Some(current) => request_recompute(&current.commands),
            None => Err(EngineError::ShutDown),
        }
    }

    pub async fn teardown(&self) {
        let running = self.running.lock().await.take();
        if let Some(running) = running {
            running.tasks.shutdown_and_join().await;
        }
        self.signals.reset();
        self.active.send_replace(CacheSnapshot::from(Vec::new()));
        self.selection.send_replace(DisplaySelection::empty());
        info!("engine torn down");
    }

    pub fn selection(&self) -> watch::Receiver<DisplaySelection> {
        self.selection.subscribe()
    }

    pub fn current_selection(&self) -> DisplaySelection {
        self.selection.borrow().clone()
    }

    /// Full active set with live counters, newest first.
    pub fn active_set(&self) -> watch::Receiver<CacheSnapshot> {
        self.active.subscribe()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.signals.state(),
            loading: self.signals.loading(),
            cached: self.active.borrow().len(),
            displayed: self.selection.borrow().len(),
        }
    }

    /// Management listing for `viewer`. Independent of `activate()`.
    pub fn watch_listing(&self, viewer: Viewer) -> ListingHandle {
        ListingHandle::spawn(
            viewer,
            self.pipeline.store.clone(),
            self.pipeline.authors.clone(),
            self.pipeline.capacity,
            self.pipeline.retry.clone(),
        )
    }

    fn start(&self) -> Running {
        let mut tasks = TaskGroup::new();
        let capacity = self.pipeline.capacity;

        let cache = AdCache::spawn("active", capacity, self.active.clone(), tasks.shutdown_signal());
        let handle = cache.handle.clone();
        tasks.push(cache.join);

        let aggregator = CounterAggregator::new(
            self.pipeline.store.clone(),
            cache.counters,
            capacity,
            self.pipeline.retry.clone(),
        );
        tasks.push(aggregator.spawn(handle.clone(), tasks.shutdown_signal()));

        let (commands, commands_rx) = mpsc::channel(capacity);
        let controller = ActiveSetController::new(
            self.pipeline.clone(),
            cache.listing,
            handle.clone(),
            self.selection.clone(),
            self.signals.clone(),
        );
        tasks.push(controller.spawn(commands_rx, tasks.shutdown_signal()));

        info!(capacity, "engine activated");
        Running {
            tasks,
            commands,
            cache: handle,
        }
    }
}

/// A full queue already holds a pending recomputation.
fn request_recompute(commands: &mpsc::Sender<ControllerCommand>) -> Result<(), EngineError> {
    match commands.try_send(ControllerCommand::Recompute) {
        Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
        Err(mpsc::error::TrySendError::Closed(_)) => Err(EngineError::ShutDown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AdDocument, AdStatus, AuthorProfile, VisitorIdentity};
    use crate::engine::ControllerState;
    use crate::impls::{FixedIdentity, InMemoryAdStore};
    use crate::test_support::{created_at, wait_for};

    async fn engine_with_ads(ids: &[&str]) -> (Arc<InMemoryAdStore>, Engine) {
        let store = Arc::new(InMemoryAdStore::new());
        store.put_author(AuthorProfile::new("u-1", "One"));
        for (minute, id) in ids.iter().enumerate() {
            store
                .upsert_ad(
                    AdDocument::new(*id, "u-1", created_at(minute as u32))
                        .with_status(AdStatus::Active)
                        .approved(true),
                )
                .await;
        }
        let engine = Engine::builder()
            .store(store.clone())
            .identity(Arc::new(FixedIdentity(VisitorIdentity::Authenticated("v".into()))))
            .config(EngineConfig {
                seed: Some(3),
                ..EngineConfig::default()
            })
            .build()
            .unwrap();
        (store, engine)
    }

    #[tokio::test]
    async fn activate_subscribes_once() {
        let (store, engine) = engine_with_ads(&["A", "B"]).await;
        assert_eq!(engine.status().state, ControllerState::Uninitialized);

        engine.activate().await.unwrap();
        let mut selection = engine.selection();
        wait_for(&mut selection, |s| !s.is_empty()).await;
        assert_eq!(engine.status().state, ControllerState::Active);

        engine.activate().await.unwrap();
        engine.activate().await.unwrap();
        assert_eq!(store.active_subscribers(), 1);
        engine.teardown().await;
    }

    #[tokio::test]
    async fn recompute_requires_activation() {
        let (_store, engine) = engine_with_ads(&["A"]).await;
        assert!(matches!(engine.recompute().await, Err(EngineError::ShutDown)));
    }

    #[tokio::test]
    async fn status_reports_sizes() {
        let (_store, engine) = engine_with_ads(&["A", "B", "C"]).await;
        engine.activate().await.unwrap();

        let mut active = engine.active_set();
        wait_for(&mut active, |s| s.len() == 3).await;
        let mut selection = engine.selection();
        wait_for(&mut selection, |s| s.len() == 5).await;

        let status = engine.status();
        assert_eq!(status.cached, 3);
        assert_eq!(status.displayed, 5);
        engine.teardown().await;
    }

    #[tokio::test]
    async fn teardown_resets_and_reactivation_works() {
        let (store, engine) = engine_with_ads(&["A"]).await;
        let mut selection = engine.selection();

        engine.activate().await.unwrap();
        wait_for(&mut selection, |s| !s.is_empty()).await;

        engine.teardown().await;
        let status = engine.status();
        assert_eq!(status.state, ControllerState::Uninitialized);
        assert_eq!(status.cached, 0);
        assert!(engine.current_selection().is_empty());
        assert_eq!(store.active_subscribers(), 0);

        engine.activate().await.unwrap();
        wait_for(&mut selection, |s| !s.is_empty()).await;
        assert_eq!(store.active_subscribers(), 1);
        engine.teardown().await;
    }
}
