//! Author resolution for a batch of advertisement documents.
//!
//! 全件を並行に解決し（fan-out）、全部そろってから返します（fan-in）。
//! 1 件の失敗はバッチを止めません。その広告は placeholder 付きで返し、
//! fault を reporter に 1 回だけ渡します。

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::domain::{
    AdDocument, Advertisement, AdvertisementId, AuthorDisplay, EngineFault,
};
use crate::ports::{AuthorDirectory, ErrorReporter};

#[derive(Clone)]
pub struct AuthorResolver {
    directory: Arc<dyn AuthorDirectory>,
    reporter: Arc<dyn ErrorReporter>,
}

impl AuthorResolver {
    pub fn new(directory: Arc<dyn AuthorDirectory>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            directory,
            reporter,
        }
    }

    /// Builds engine records for `documents`, keeping their order.
    ///
    /// A record from `previous` with the same id donates its counters, and its author
    /// when that author was resolved and the author id did not change.
    pub async fn resolve_batch(
        &self,
        documents: Vec<AdDocument>,
        previous: &[Advertisement],
    ) -> Vec<Advertisement> {
        let known: HashMap<&AdvertisementId, &Advertisement> =
            previous.iter().map(|ad| (ad.id(), ad)).collect();

        let lookups = documents.into_iter().map(|document| {
            let prior = known.get(&document.id).copied();
            async move {
                let author = match prior.map(|p| &p.author) {
                    Some(author @ AuthorDisplay::Resolved(profile))
                        if profile.id == document.author_id =>
                    {
                        author.clone()
                    }
                    _ => self.resolve_one(&document).await,
                };
                let mut ad = Advertisement::new(document, author);
                if let Some(prior) = prior {
                    ad.counters = prior.counters;
                }
                ad
            }
        });
        join_all(lookups).await
    }

    async fn resolve_one(&self, document: &AdDocument) -> AuthorDisplay {
        match self.directory.resolve(&document.author_id).await {
            Ok(profile) => {
                debug!(ad_id = %document.id, author_id = %profile.id, "author resolved");
                AuthorDisplay::Resolved(profile)
            }
            Err(err) => {
                warn!(
                    ad_id = %document.id,
                    author_id = %document.author_id,
                    error = %err,
                    "author resolution failed, using placeholder"
                );
                self.reporter.report(EngineFault::AuthorResolution {
                    ad: document.id.clone(),
                    author: document.author_id.clone(),
                    source: err,
                });
                AuthorDisplay::Unresolved(document.author_id.clone())
            }
        }
    }
}
