//! Errors - エラー型と分類
//!
//! - `StoreError`: ストレージ / 購読の失敗（一時的なものとして扱う）
//! - `ConfigError`: 設定の契約違反（起動時に fail-fast）
//! - `EngineError`: Engine API が返すエラー
//! - `EngineFault`: バッチを止めない非致命的な失敗（ErrorReporter に送る）

use std::path::PathBuf;

use thiserror::Error;

use super::ids::{AdvertisementId, AuthorId};

/// ErrorKind は失敗の運用分類
///
/// - Transient: subscription / lookup の一時的な失敗（保守的に扱い、ログだけ残す）
/// - Partial: 1 件だけの解決失敗（その 1 件を劣化させ、バッチは続行）
/// - Contract: 設定・呼び出し側の契約違反（境界で拒否）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Partial,
    Contract,
}

/// Failure reported by a storage collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("document decode failed: {0}")]
    Decode(String),

    #[error("subscription closed")]
    Closed,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Transient
    }
}

/// Rejected configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("selection limit must not be negative (got {0})")]
    NegativeLimit(i64),

    #[error("priority slots must not be negative (got {0})")]
    NegativePrioritySlots(i64),

    #[error("cap_hours must be a finite, non-negative number of hours (got {0})")]
    InvalidCapHours(f64),

    #[error("burst_allowance must be at least 1")]
    ZeroBurstAllowance,

    #[error("queue_capacity must be at least 1")]
    ZeroQueueCapacity,

    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Contract
    }
}

/// Errors returned from the `Engine` API.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("missing collaborator: {0}")]
    MissingPort(&'static str),

    #[error("engine has been torn down")]
    ShutDown,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Config(e) => e.kind(),
            EngineError::Store(e) => e.kind(),
            EngineError::MissingPort(_) => ErrorKind::Contract,
            EngineError::ShutDown => ErrorKind::Transient,
        }
    }
}

/// Non-fatal failure surfaced to the error-reporting collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineFault {
    #[error("author {author} of advertisement {ad} could not be resolved: {source}")]
    AuthorResolution {
        ad: AdvertisementId,
        author: AuthorId,
        #[source]
        source: StoreError,
    },

    #[error("eligibility check for advertisement {ad} (visitor {visitor}) failed: {source}")]
    Eligibility {
        ad: AdvertisementId,
        visitor: String,
        #[source]
        source: StoreError,
    },
}

impl EngineFault {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineFault::AuthorResolution { .. } => ErrorKind::Partial,
            EngineFault::Eligibility { .. } => ErrorKind::Transient,
        }
    }

    pub fn advertisement(&self) -> &AdvertisementId {
        match self {
            EngineFault::AuthorResolution { ad, .. } | EngineFault::Eligibility { ad, .. } => ad,
        }
    }
}
