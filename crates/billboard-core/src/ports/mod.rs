//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。エンジンの外側にいる協調者
//! （ドキュメントストア、author ディレクトリ、ID 解決、エラー通知、時刻、乱数）への
//! インターフェースで、実装の詳細を隠蔽します。

pub mod ad_store;
pub mod author_directory;
pub mod clock;
pub mod error_reporter;
pub mod identity;
pub mod random;

pub use self::ad_store::{AdStore, Subscription};
pub use self::author_directory::AuthorDirectory;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::error_reporter::ErrorReporter;
pub use self::identity::IdentityProvider;
pub use self::random::{RandomSource, SeededRandom, ThreadRandom, fisher_yates};
