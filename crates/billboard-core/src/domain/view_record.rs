//! Per (advertisement, visitor) view history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered timestamps of past views. Insertion order is temporal order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRecord {
    #[serde(default)]
    pub views: Vec<DateTime<Utc>>,
}

impl ViewRecord {
    pub fn new(views: Vec<DateTime<Utc>>) -> Self {
        Self { views }
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// The `n`-th most recent view (1 = latest).
    pub fn nth_most_recent(&self, n: usize) -> Option<DateTime<Utc>> {
        if n == 0 || n > self.views.len() {
            return None;
        }
        self.views.get(self.views.len() - n).copied()
    }
}
