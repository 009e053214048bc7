//! Engine - 選択と集計のコンポーネント
//!
//! # 主要コンポーネント
//! - **VisibilityGate**: 訪問者ごとの frequency capping
//! - **Selector**: priority slice + シャッフルした fill
//! - **AdCache**: 広告レコードの単一 writer アクター
//! - **CounterAggregator**: impressions / clicks / visits のライブ集計
//! - **ActiveSetController**: active set の購読と再計算
//! - **ListingHandle**: 管理画面向けの一覧

pub mod aggregator;
pub mod authors;
pub mod cache;
pub mod controller;
pub mod gate;
pub mod listing;
pub mod retry;
pub mod selector;
pub mod workers;

pub use self::aggregator::CounterAggregator;
pub use self::authors::AuthorResolver;
pub use self::cache::{AdCache, CacheHandle, CacheSnapshot, CounterWriter, ListingWriter};
pub use self::controller::{
    ActiveSetController, ControllerCommand, ControllerSignals, ControllerState, Pipeline,
};
pub use self::gate::{VisibilityGate, is_eligible_at};
pub use self::listing::{ListingHandle, Viewer, visible_to};
pub use self::retry::RetryPolicy;
pub use self::selector::{SelectionPolicy, Selector};
pub use self::workers::TaskGroup;
