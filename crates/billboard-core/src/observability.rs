//! Observability - ログ初期化とステータス表示

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

pub use crate::engine::ControllerState;

/// Point-in-time view of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub state: ControllerState,
    /// A recomputation is in flight.
    pub loading: bool,
    /// Records in the active-set cache.
    pub cached: usize,
    /// Entries in the published selection.
    pub displayed: usize,
}

/// Installs a fmt subscriber. `filter` wins over `RUST_LOG`; the fallback is `info`.
///
/// A second call (or a subscriber installed elsewhere) is a no-op.
pub fn init_tracing(filter: Option<&str>) {
    let env_filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_tracing(Some("debug"));
        init_tracing(None);
    }

    #[test]
    fn status_serializes_state_in_snake_case() {
        let status = EngineStatus {
            state: ControllerState::Uninitialized,
            loading: false,
            cached: 0,
            displayed: 0,
        };
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["state"], "uninitialized");
    }
}
