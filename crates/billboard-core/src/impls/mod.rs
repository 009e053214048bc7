//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryAdStore**: live query 付きのインメモリ document store（失敗注入あり）
//! - **CachingAuthorDirectory**: cached → remote fetch の author 解決
//! - **SessionIdentity** / **FixedIdentity**: 訪問者 identity
//! - **TracingErrorReporter** / **CollectingErrorReporter**: fault の通知先
//!
//! # 本番用実装
//! 実際の document store へのアダプタは別クレートに置く想定です。

pub mod author_cache;
pub mod identity;
pub mod inmem_store;
pub mod reporters;

pub use self::author_cache::CachingAuthorDirectory;
pub use self::identity::{FixedIdentity, SessionIdentity};
pub use self::inmem_store::InMemoryAdStore;
pub use self::reporters::{CollectingErrorReporter, TracingErrorReporter};
