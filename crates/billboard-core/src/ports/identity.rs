//! IdentityProvider port - 現在の訪問者

use tokio::sync::watch;

use crate::domain::VisitorIdentity;

pub trait IdentityProvider: Send + Sync {
    fn current(&self) -> VisitorIdentity;

    /// Change feed, if the provider has one. Each change triggers a recomputation.
    fn changes(&self) -> Option<watch::Receiver<VisitorIdentity>> {
        None
    }
}
