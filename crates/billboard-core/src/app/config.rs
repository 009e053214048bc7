//! EngineConfig - エンジンの設定
//!
//! JSON で読み込み、`validate()` で境界チェックします（負の limit などは丸めずに拒否）。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::ConfigError;
use crate::engine::gate::{DEFAULT_BURST_ALLOWANCE, DEFAULT_CAP_HOURS, hours};
use crate::engine::retry::RetryPolicy;
use crate::engine::selector::{DEFAULT_LIMIT, DEFAULT_PRIORITY_SLOTS, SelectionPolicy};

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frequency-cap window in hours.
    pub cap_hours: f64,

    /// Views tolerated inside one window before the cap applies.
    pub burst_allowance: usize,

    /// Maximum length of a selection.
    pub limit: i64,

    /// Width of the priority slice.
    pub priority_slots: i64,

    /// Drop repeated ids before truncation.
    pub dedupe: bool,

    /// Bound of every notification queue and of the cache mailbox.
    pub queue_capacity: usize,

    /// Fixed shuffle seed; `None` draws fresh randomness each time.
    pub seed: Option<u64>,

    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cap_hours: DEFAULT_CAP_HOURS,
            burst_allowance: DEFAULT_BURST_ALLOWANCE,
            limit: DEFAULT_LIMIT as i64,
            priority_slots: DEFAULT_PRIORITY_SLOTS as i64,
            dedupe: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            seed: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Reads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.cap_hours.is_finite() || self.cap_hours < 0.0 {
            return Err(ConfigError::InvalidCapHours(self.cap_hours));
        }
        if self.burst_allowance == 0 {
            return Err(ConfigError::ZeroBurstAllowance);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        self.selection_policy()?;
        Ok(())
    }

    pub fn selection_policy(&self) -> Result<SelectionPolicy, ConfigError> {
        SelectionPolicy::try_new(self.limit, self.priority_slots, self.dedupe)
    }

    pub fn cap(&self) -> chrono::Duration {
        hours(self.cap_hours)
    }
}
