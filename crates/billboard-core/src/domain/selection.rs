//! DisplaySelection - the published, read-only list of ads to render.

use std::sync::Arc;

use super::advertisement::Advertisement;
use super::ids::AdvertisementId;

/// Ordered list of at most `limit` advertisements.
///
/// Replaced wholesale on every recomputation. Cloning shares the same snapshot,
/// so readers can never mutate what the engine published.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplaySelection {
    items: Arc<[Advertisement]>,
    visitor: Option<String>,
}

impl DisplaySelection {
    pub fn new(items: Vec<Advertisement>) -> Self {
        Self {
            items: items.into(),
            visitor: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Tag the selection with the visitor key it was computed for.
    pub fn for_visitor(mut self, visitor: impl Into<String>) -> Self {
        self.visitor = Some(visitor.into());
        self
    }

    pub fn visitor(&self) -> Option<&str> {
        self.visitor.as_deref()
    }

    pub fn items(&self) -> &[Advertisement] {
        &self.items
    }

    pub fn ids(&self) -> Vec<AdvertisementId> {
        self.items.iter().map(|ad| ad.id().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
