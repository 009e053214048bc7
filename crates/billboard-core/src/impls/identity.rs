//! SessionIdentity - セッション中の訪問者 identity
//!
//! 未ログインなら IP 由来の匿名 id、ログイン中はユーザー id。
//! 切り替わると watch で通知され、controller が再計算します。

use std::net::IpAddr;

use tokio::sync::watch;
use tracing::debug;

use crate::domain::VisitorIdentity;
use crate::ports::IdentityProvider;

pub struct SessionIdentity {
    fallback: VisitorIdentity,
    current: watch::Sender<VisitorIdentity>,
}

impl SessionIdentity {
    pub fn anonymous(origin: IpAddr) -> Self {
        Self::new(VisitorIdentity::from_ip(origin))
    }

    /// `fallback` is restored on sign-out.
    pub fn new(fallback: VisitorIdentity) -> Self {
        let (current, _) = watch::channel(fallback.clone());
        Self { fallback, current }
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        self.switch(VisitorIdentity::Authenticated(user_id.into()));
    }

    pub fn sign_out(&self) {
        self.switch(self.fallback.clone());
    }

    fn switch(&self, next: VisitorIdentity) {
        let changed = self.current.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            debug!(authenticated = self.current.borrow().is_authenticated(), "visitor identity switched");
        }
    }
}

impl IdentityProvider for SessionIdentity {
    fn current(&self) -> VisitorIdentity {
        self.current.borrow().clone()
    }

    fn changes(&self) -> Option<watch::Receiver<VisitorIdentity>> {
        Some(self.current.subscribe())
    }
}

/// Identity that never changes.
pub struct FixedIdentity(pub VisitorIdentity);

impl IdentityProvider for FixedIdentity {
    fn current(&self) -> VisitorIdentity {
        self.0.clone()
    }
}
