//! Domain identifiers (strongly-typed IDs).
//!
//! ストア側の ID は不透明な文字列（document id）なので、`Id<T>` は `String` を包みます。
//! Phantom type で `AdvertisementId` と `AuthorId` を混同できないようにしています。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// Debug 表示で使うラベル（例: "ad", "author"）
    fn label() -> &'static str;
}

/// ジェネリック ID 型
///
/// # 例
/// ```ignore
/// let ad: AdvertisementId = Id::new("ad-1");
/// let author: AuthorId = Id::new("user-9");
/// // ad と author は異なる型なので、混同できない
/// ```
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

// derive だと T にも境界が付いてしまうので手書きする
impl<T: IdMarker> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T: IdMarker> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: IdMarker> Eq for Id<T> {}

impl<T: IdMarker> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T: IdMarker> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: IdMarker> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T: IdMarker> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", T::label(), self.value)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.value)
    }
}

impl<T: IdMarker> From<&str> for Id<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> From<String> for Id<T> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Advertisement のマーカー型
pub enum Advertisement {}

impl IdMarker for Advertisement {
    fn label() -> &'static str {
        "ad"
    }
}

/// Author のマーカー型
pub enum Author {}

impl IdMarker for Author {
    fn label() -> &'static str {
        "author"
    }
}

/// Identifier of an advertisement document.
pub type AdvertisementId = Id<Advertisement>;

/// Identifier of the user who authored an advertisement.
pub type AuthorId = Id<Author>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_compare_by_value() {
        let a = AdvertisementId::new("ad-1");
        let b: AdvertisementId = "ad-1".into();
        assert_eq!(a, b);
        assert_ne!(a, AdvertisementId::new("ad-2"));
    }

    #[test]
    fn debug_shows_label_and_display_is_bare() {
        let author = AuthorId::new("u-7");
        assert_eq!(format!("{author:?}"), "author(u-7)");
        assert_eq!(author.to_string(), "u-7");
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = AdvertisementId::new("ad-42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ad-42\"");

        let back: AdvertisementId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
