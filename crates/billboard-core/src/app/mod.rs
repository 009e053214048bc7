//! App - アプリケーション層
//!
//! ports と engine のコンポーネントを組み合わせて、
//! プレゼンテーション層から使う `Engine` ハンドルを組み立てます。
//!
//! # 主要コンポーネント
//! - **EngineConfig**: 設定（JSON、起動時に検証）
//! - **EngineBuilder**: ワイヤリングと fail-fast 検証
//! - **Engine**: activate / recompute / teardown と publish される値

pub mod builder;
pub mod config;
pub mod engine;

// 主要な型を再エクスポート
pub use self::builder::EngineBuilder;
pub use self::config::EngineConfig;
pub use self::engine::Engine;
