//! Engagement counters and their sub-streams.

use serde::{Deserialize, Serialize};

/// Live engagement counters of one advertisement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub impressions: u64,
    pub clicks: u64,
    pub visits: u64,
}

impl Counters {
    pub fn get(&self, kind: CounterKind) -> u64 {
        match kind {
            CounterKind::Impressions => self.impressions,
            CounterKind::Clicks => self.clicks,
            CounterKind::Visits => self.visits,
        }
    }

    pub fn set(&mut self, kind: CounterKind, value: u64) {
        match kind {
            CounterKind::Impressions => self.impressions = value,
            CounterKind::Clicks => self.clicks = value,
            CounterKind::Visits => self.visits = value,
        }
    }
}

/// One of the three event sub-streams kept per advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    Impressions,
    Clicks,
    Visits,
}

impl CounterKind {
    pub const ALL: [CounterKind; 3] = [
        CounterKind::Impressions,
        CounterKind::Clicks,
        CounterKind::Visits,
    ];

    /// Name of the sub-collection under the advertisement document.
    pub fn collection(self) -> &'static str {
        match self {
            CounterKind::Impressions => "impressions",
            CounterKind::Clicks => "clicks",
            CounterKind::Visits => "visitors",
        }
    }

    /// Contribution of a single event document.
    ///
    /// - impressions: numeric field `impression`
    /// - clicks: numeric field `clicked`
    /// - visits: length of the `visits` array of a visitor document
    ///
    /// Missing, non-numeric and negative values contribute 0. Fractions are kept.
    pub fn contribution(self, document: &serde_json::Value) -> f64 {
        match self {
            CounterKind::Impressions => numeric_field(document, "impression"),
            CounterKind::Clicks => numeric_field(document, "clicked"),
            CounterKind::Visits => document
                .get("visits")
                .and_then(serde_json::Value::as_array)
                .map_or(0.0, |visits| visits.len() as f64),
        }
    }

    /// Total over the full current snapshot of the sub-stream.
    ///
    /// Raw values are summed first; only the total is truncated to a whole count.
    pub fn tally(self, documents: &[serde_json::Value]) -> u64 {
        let total: f64 = documents.iter().map(|doc| self.contribution(doc)).sum();
        if total.is_finite() && total > 0.0 {
            total as u64
        } else {
            0
        }
    }
}

impl std::fmt::Display for CounterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.collection())
    }
}

fn numeric_field(document: &serde_json::Value, field: &str) -> f64 {
    match document.get(field).and_then(serde_json::Value::as_f64) {
        Some(n) if n.is_finite() && n > 0.0 => n,
        _ => 0.0,
    }
}
