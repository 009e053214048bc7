//! AuthorDirectory port - author 表示情報の解決
//!
//! キャッシュにあればそれを返し、なければリモート取得してキャッシュに入れる。

use async_trait::async_trait;

use crate::domain::{AuthorId, AuthorProfile, StoreError};

#[async_trait]
pub trait AuthorDirectory: Send + Sync {
    /// Cached lookup, no I/O.
    fn cached(&self, id: &AuthorId) -> Option<AuthorProfile>;

    /// Remote fetch keyed by author id. Implementations store the result.
    async fn fetch(&self, id: &AuthorId) -> Result<AuthorProfile, StoreError>;

    async fn resolve(&self, id: &AuthorId) -> Result<AuthorProfile, StoreError> {
        match self.cached(id) {
            Some(profile) => Ok(profile),
            None => self.fetch(id).await,
        }
    }
}
