//! EngineBuilder - エンジンの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - build() 時に設定を検証（負の limit / priority_slots などはここで拒否）
//! - 必須の port（store, identity）が無ければ `EngineError::MissingPort`
//! - 任意の port は既定の実装で埋める

use std::sync::Arc;

use super::config::EngineConfig;
use super::engine::Engine;
use crate::domain::EngineError;
use crate::engine::{AuthorResolver, Pipeline, Selector, VisibilityGate};
use crate::impls::{CachingAuthorDirectory, TracingErrorReporter};
use crate::ports::{
    AdStore, AuthorDirectory, Clock, ErrorReporter, IdentityProvider, RandomSource, SeededRandom,
    SystemClock, ThreadRandom,
};

/// EngineBuilder はエンジンを構築
///
/// # 使用例
/// ```ignore
/// let engine = Engine::builder()
///     .store(store)
///     .identity(Arc::new(SessionIdentity::anonymous(addr)))
///     .config(EngineConfig::load("engine.json")?)
///     .build()?;
/// engine.activate().await?;
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    store: Option<Arc<dyn AdStore>>,
    authors: Option<Arc<dyn AuthorDirectory>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    reporter: Option<Arc<dyn ErrorReporter>>,
    clock: Option<Arc<dyn Clock>>,
    random: Option<Arc<dyn RandomSource>>,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(mut self, store: Arc<dyn AdStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to a `CachingAuthorDirectory` over the store.
    pub fn authors(mut self, authors: Arc<dyn AuthorDirectory>) -> Self {
        self.authors = Some(authors);
        self
    }

    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Defaults to `TracingErrorReporter`.
    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Overrides `config.seed`.
    pub fn random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = Some(random);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the configuration and wires the ports.
    pub fn build(self) -> Result<Engine, EngineError> {
        self.config.validate()?;
        let policy = self.config.selection_policy()?;

        let store = self.store.ok_or(EngineError::MissingPort("store"))?;
        let identity = self.identity.ok_or(EngineError::MissingPort("identity"))?;

        let authors: Arc<dyn AuthorDirectory> = match self.authors {
            Some(authors) => authors,
            None => Arc::new(CachingAuthorDirectory::new(store.clone())),
        };
        let reporter: Arc<dyn ErrorReporter> = match self.reporter {
            Some(reporter) => reporter,
            None => Arc::new(TracingErrorReporter),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let random: Arc<dyn RandomSource> = match (self.random, self.config.seed) {
            (Some(random), _) => random,
            (None, Some(seed)) => Arc::new(SeededRandom::new(seed)),
            (None, None) => Arc::new(ThreadRandom),
        };

        let pipeline = Pipeline {
            store,
            authors: AuthorResolver::new(authors, reporter.clone()),
            gate: Arc::new(VisibilityGate::new(
                self.config.cap(),
                self.config.burst_allowance,
                clock,
            )),
            selector: Arc::new(Selector::new(policy, random)),
            identity,
            reporter,
            capacity: self.config.queue_capacity,
            retry: self.config.retry.clone(),
        };
        Ok(Engine::new(pipeline, self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConfigError, VisitorIdentity};
    use crate::impls::{FixedIdentity, InMemoryAdStore};

    fn identity() -> Arc<dyn IdentityProvider> {
        Arc::new(FixedIdentity(VisitorIdentity::Authenticated("u-1".into())))
    }

    #[test]
    fn test_build_success() {
        let engine = EngineBuilder::new()
            .store(Arc::new(InMemoryAdStore::new()))
            .identity(identity())
            .build();
        assert!(engine.is_ok());
    }

    #[test]
    fn test_build_missing_store() {
        let result = EngineBuilder::new().identity(identity()).build();
        assert!(matches!(result, Err(EngineError::MissingPort("store"))));
    }

    #[test]
    fn test_build_missing_identity() {
        let result = EngineBuilder::new()
            .store(Arc::new(InMemoryAdStore::new()))
            .build();
        assert!(matches!(result, Err(EngineError::MissingPort("identity"))));
    }

    #[test]
    fn test_build_rejects_negative_limit() {
        let result = EngineBuilder::new()
            .store(Arc::new(InMemoryAdStore::new()))
            .identity(identity())
            .config(EngineConfig {
                limit: -1,
                ..EngineConfig::default()
            })
            .build();
        assert!(matches!(
            result,
            Err(EngineError::Config(ConfigError::NegativeLimit(-1)))
        ));
    }

    #[test]
    fn test_config_is_kept() {
        let engine = Engine::builder()
            .store(Arc::new(InMemoryAdStore::new()))
            .identity(identity())
            .config(EngineConfig {
                limit: 2,
                seed: Some(1),
                ..EngineConfig::default()
            })
            .build()
            .unwrap();
        assert_eq!(engine.config().limit, 2);
    }
}
