//! Visitor identity used as the view-record lookup key.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Either an authenticated user id or an anonymous id derived from the network origin.
///
/// Exactly one is active per session. The engine only uses it as a lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum VisitorIdentity {
    Authenticated(String),
    Anonymous(String),
}

impl VisitorIdentity {
    /// Anonymous identity from an IP address (hex blake3 digest, deterministic).
    pub fn from_ip(addr: IpAddr) -> Self {
        let digest = match addr {
            IpAddr::V4(v4) => blake3::hash(&v4.octets()),
            IpAddr::V6(v6) => blake3::hash(&v6.octets()),
        };
        VisitorIdentity::Anonymous(hex::encode(digest.as_bytes()))
    }

    pub fn key(&self) -> &str {
        match self {
            VisitorIdentity::Authenticated(key) | VisitorIdentity::Anonymous(key) => key,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, VisitorIdentity::Authenticated(_))
    }
}

impl fmt::Display for VisitorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
