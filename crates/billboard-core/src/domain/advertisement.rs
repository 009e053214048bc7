//! Advertisement records.
//!
//! `AdDocument` is the storage projection. `Advertisement` is the engine record:
//! the document plus the resolved author and the live counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::counters::Counters;
use super::ids::{AdvertisementId, AuthorId};

/// Lifecycle status of an advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdStatus {
    Draft,
    Active,
    Paused,
    Ended,
    /// Unknown status strings are carried through instead of failing the decode.
    #[serde(untagged)]
    Other(String),
}

impl AdStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, AdStatus::Active)
    }
}

/// An advertisement as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdDocument {
    pub id: AdvertisementId,
    pub author_id: AuthorId,
    pub status: AdStatus,
    #[serde(default)]
    pub is_approved: bool,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub title: String,
    /// Free-form content; the engine never looks inside.
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default)]
    pub is_banner: bool,
}

impl AdDocument {
    pub fn new(
        id: impl Into<AdvertisementId>,
        author_id: impl Into<AuthorId>,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            author_id: author_id.into(),
            status: AdStatus::Draft,
            is_approved: false,
            created,
            updated: None,
            title: String::new(),
            content: serde_json::Value::Null,
            is_banner: false,
        }
    }

    pub fn with_status(mut self, status: AdStatus) -> Self {
        self.status = status;
        self
    }

    pub fn approved(mut self, is_approved: bool) -> Self {
        self.is_approved = is_approved;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Active and approved: member of the active set.
    pub fn is_displayable(&self) -> bool {
        self.status.is_active() && self.is_approved
    }
}

/// Display metadata of an author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorProfile {
    pub id: AuthorId,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl AuthorProfile {
    pub fn new(id: impl Into<AuthorId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_url: None,
        }
    }
}

/// Author as attached to an engine record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AuthorDisplay {
    Resolved(AuthorProfile),
    /// Placeholder published when the author lookup failed.
    Unresolved(AuthorId),
}

impl AuthorDisplay {
    pub fn is_resolved(&self) -> bool {
        matches!(self, AuthorDisplay::Resolved(_))
    }

    pub fn author_id(&self) -> &AuthorId {
        match self {
            AuthorDisplay::Resolved(profile) => &profile.id,
            AuthorDisplay::Unresolved(id) => id,
        }
    }
}

/// Engine record: document + author (controller-owned) and counters (aggregator-owned).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advertisement {
    pub document: AdDocument,
    pub author: AuthorDisplay,
    #[serde(default)]
    pub counters: Counters,
}

impl Advertisement {
    pub fn new(document: AdDocument, author: AuthorDisplay) -> Self {
        Self {
            document,
            author,
            counters: Counters::default(),
        }
    }

    pub fn id(&self) -> &AdvertisementId {
        &self.document.id
    }
}
