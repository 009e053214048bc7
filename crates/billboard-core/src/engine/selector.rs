//! Selector - 表示する広告リストの組み立て
//!
//! 1. eligible の先頭 `priority_slots` 件（priority slice、順序はそのまま）
//! 2. active set 全体を毎回独立にシャッフルしたもの（fill）
//! 3. 1 + 2 を連結して `limit` 件に切り詰める
//!
//! 既定では id の重複を取り除かない（eligible な広告が 2 回出ることがある）。
//! `dedupe` を有効にすると、切り詰めの前に後から出てきた重複を落とします。

use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::{Advertisement, ConfigError, DisplaySelection};
use crate::ports::{RandomSource, fisher_yates};

pub const DEFAULT_LIMIT: usize = 5;
pub const DEFAULT_PRIORITY_SLOTS: usize = 5;

/// Validated selection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionPolicy {
    pub limit: usize,
    pub priority_slots: usize,
    pub dedupe: bool,
}

impl SelectionPolicy {
    /// Rejects negative sizes instead of clamping them.
    pub fn try_new(limit: i64, priority_slots: i64, dedupe: bool) -> Result<Self, ConfigError> {
        let limit = usize::try_from(limit).map_err(|_| ConfigError::NegativeLimit(limit))?;
        let priority_slots = usize::try_from(priority_slots)
            .map_err(|_| ConfigError::NegativePrioritySlots(priority_slots))?;
        Ok(Self {
            limit,
            priority_slots,
            dedupe,
        })
    }
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            priority_slots: DEFAULT_PRIORITY_SLOTS,
            dedupe: false,
        }
    }
}

pub struct Selector {
    policy: SelectionPolicy,
    random: Arc<dyn RandomSource>,
}

impl Selector {
    pub fn new(policy: SelectionPolicy, random: Arc<dyn RandomSource>) -> Self {
        Self { policy, random }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// `eligible` is expected in priority order (newest activation first).
    pub fn select(&self, eligible: &[Advertisement], all: &[Advertisement]) -> DisplaySelection {
        if all.is_empty() || self.policy.limit == 0 {
            return DisplaySelection::empty();
        }

        let mut order: Vec<usize> = (0..all.len()).collect();
        fisher_yates(&mut order, self.random.as_ref());

        let priority = eligible.iter().take(self.policy.priority_slots);
        let fill = order.iter().map(|&i| &all[i]);
        let candidates = priority.chain(fill);

        let items: Vec<Advertisement> = if self.policy.dedupe {
            let mut seen = HashSet::new();
            candidates
                .filter(|ad| seen.insert(ad.id().clone()))
                .take(self.policy.limit)
                .cloned()
                .collect()
        } else {
            candidates.take(self.policy.limit).cloned().collect()
        };

        DisplaySelection::new(items)
    }
}
