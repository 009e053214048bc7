//! VisibilityGate - 訪問者ごとの frequency capping
//!
//! # 判定
//! - 閲覧が `burst` 回未満なら常に表示可（履歴不足）
//! - それ以外は「`burst` 番目に新しい閲覧」からの経過時間が cap を *超えて* いれば表示可
//!
//! 最新ではなく `burst` 番目を見るので、短時間に `burst - 1` 回までは続けて表示でき、
//! その後の cooldown はバースト中で一番古い閲覧から数えられます。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::domain::{AdvertisementId, StoreError, ViewRecord};
use crate::ports::{AdStore, Clock};

pub const DEFAULT_CAP_HOURS: f64 = 4.0;
pub const DEFAULT_BURST_ALLOWANCE: usize = 3;

/// Pure eligibility rule. A missing record counts as no history.
pub fn is_eligible_at(
    record: Option<&ViewRecord>,
    now: DateTime<Utc>,
    cap: Duration,
    burst: usize,
) -> bool {
    let Some(anchor) = record.and_then(|r| r.nth_most_recent(burst)) else {
        return true;
    };
    now - anchor > cap
}

/// Converts fractional hours to a chrono duration (millisecond precision).
pub fn hours(value: f64) -> Duration {
    Duration::milliseconds((value * 3_600_000.0).round() as i64)
}

pub struct VisibilityGate {
    cap: Duration,
    burst: usize,
    clock: Arc<dyn Clock>,
}

impl VisibilityGate {
    pub fn new(cap: Duration, burst: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            cap,
            burst: burst.max(1),
            clock,
        }
    }

    pub fn with_defaults(clock: Arc<dyn Clock>) -> Self {
        Self::new(hours(DEFAULT_CAP_HOURS), DEFAULT_BURST_ALLOWANCE, clock)
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }

    pub fn is_eligible(&self, record: Option<&ViewRecord>) -> bool {
        is_eligible_at(record, self.clock.now(), self.cap, self.burst)
    }

    /// Looks up the view record and applies the rule. Lookup errors are returned
    /// to the caller, which decides to fail closed.
    pub async fn check(
        &self,
        store: &dyn AdStore,
        ad: &AdvertisementId,
        visitor: &str,
    ) -> Result<bool, StoreError> {
        let record = store.view_record(ad, visitor).await?;
        Ok(self.is_eligible(record.as_ref()))
    }
}
