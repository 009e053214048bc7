//! billboard-core
//!
//! 広告の表示選択とエンゲージメント集計のエンジン。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, advertisement, counters, view_record, visitor, selection, errors）
//! - **ports**: 抽象化レイヤー（AdStore, AuthorDirectory, IdentityProvider, ErrorReporter, Clock, RandomSource）
//! - **engine**: VisibilityGate, Selector, AdCache, CounterAggregator, ActiveSetController, listing
//! - **app**: EngineConfig, EngineBuilder, Engine
//! - **impls**: 実装（InMemoryAdStore など開発用）
//! - **observability**: tracing の初期化と EngineStatus

pub mod domain;
pub mod ports;
pub mod engine;
pub mod app;
pub mod impls;
pub mod observability;

pub use app::{Engine, EngineBuilder, EngineConfig};
pub use observability::{EngineStatus, init_tracing};

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use chrono::{DateTime, TimeZone, Utc};
    use tokio::sync::watch;

    use crate::domain::{AdDocument, AdStatus, Advertisement, AuthorDisplay, AuthorProfile};

    /// Evaluation time used by clock-driven tests.
    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    pub fn created_at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, minute, 0).unwrap()
    }

    /// Active, approved record with a resolved author.
    pub fn ad(id: &str) -> Advertisement {
        let author = format!("u-{id}");
        let document = AdDocument::new(id, author.as_str(), created_at(0))
            .with_status(AdStatus::Active)
            .approved(true);
        Advertisement::new(
            document,
            AuthorDisplay::Resolved(AuthorProfile::new(author.as_str(), format!("Author {id}"))),
        )
    }

    /// Waits (up to 2s) until the watched value satisfies `pred`.
    pub async fn wait_for<T: Clone>(
        rx: &mut watch::Receiver<T>,
        pred: impl Fn(&T) -> bool,
    ) -> T {
        let wait = async {
            loop {
                {
                    let value = rx.borrow_and_update();
                    if pred(&value) {
                        return value.clone();
                    }
                }
                if rx.changed().await.is_err() {
                    let value = rx.borrow();
                    assert!(pred(&value), "watch closed before condition held");
                    return value.clone();
                }
            }
        };
        match tokio::time::timeout(Duration::from_secs(2), wait).await {
            Ok(value) => value,
            Err(_) => panic!("condition not met within 2s"),
        }
    }
}
