//! AdStore port - 変更通知付きドキュメントストア
//!
//! エンジンが必要とする最小の契約だけを定義します。
//! - active かつ approved な広告の live query（created 降順）
//! - 全広告の live query（管理画面用、created 降順）
//! - 広告ごとの 3 つのサブコレクション（impressions / clicks / visitors）の live query
//! - (広告, 訪問者) ごとの閲覧履歴の point lookup
//! - author 表示情報の point lookup
//!
//! # 購読の形
//! 各購読は bounded な `mpsc::Receiver` で、通知 1 件 = その時点の完全なスナップショット。
//! `Err` は一時的な失敗で、購読自体は続く（再試行はストア側の責務）。
//! 送信側が drop されたら購読終了。

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{
    AdDocument, AdvertisementId, AuthorId, AuthorProfile, CounterKind, StoreError, ViewRecord,
};

/// A live query: each item is the full current result set.
pub type Subscription<T> = mpsc::Receiver<Result<T, StoreError>>;

#[async_trait]
pub trait AdStore: Send + Sync {
    /// Active and approved advertisements, newest first.
    async fn subscribe_active(
        &self,
        capacity: usize,
    ) -> Result<Subscription<Vec<AdDocument>>, StoreError>;

    /// Every advertisement, newest first.
    async fn subscribe_all(
        &self,
        capacity: usize,
    ) -> Result<Subscription<Vec<AdDocument>>, StoreError>;

    /// Event documents of one counter sub-collection of one advertisement.
    async fn subscribe_counter(
        &self,
        ad: &AdvertisementId,
        kind: CounterKind,
        capacity: usize,
    ) -> Result<Subscription<Vec<serde_json::Value>>, StoreError>;

    /// View history of `visitor` for `ad`. `None` when no document exists.
    async fn view_record(
        &self,
        ad: &AdvertisementId,
        visitor: &str,
    ) -> Result<Option<ViewRecord>, StoreError>;

    /// Author display record. `None` when no document exists.
    async fn author(&self, id: &AuthorId) -> Result<Option<AuthorProfile>, StoreError>;
}
