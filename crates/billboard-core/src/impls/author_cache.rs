//! CachingAuthorDirectory - ローカルキャッシュ付きの author 解決
//!
//! cached → なければ store から fetch してキャッシュに保存。
//! 失敗は保存しないので、次のバッチで再試行されます。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::trace;

use crate::domain::{AuthorId, AuthorProfile, StoreError};
use crate::ports::{AdStore, AuthorDirectory};

pub struct CachingAuthorDirectory {
    store: Arc<dyn AdStore>,
    cache: RwLock<HashMap<AuthorId, AuthorProfile>>,
}

impl CachingAuthorDirectory {
    pub fn new(store: Arc<dyn AdStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Seeds the cache, e.g. with the signed-in user's own profile.
    pub fn prime(&self, profile: AuthorProfile) {
        self.cache.write().insert(profile.id.clone(), profile);
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}

#[async_trait]
impl AuthorDirectory for CachingAuthorDirectory {
    fn cached(&self, id: &AuthorId) -> Option<AuthorProfile> {
        self.cache.read().get(id).cloned()
    }

    async fn fetch(&self, id: &AuthorId) -> Result<AuthorProfile, StoreError> {
        let profile = self
            .store
            .author(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("author {id}")))?;
        trace!(author_id = %id, "author cached");
        self.cache.write().insert(id.clone(), profile.clone());
        Ok(profile)
    }
}
