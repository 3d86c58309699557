//! Client key generation and handling.

use std::net::IpAddr;

/// Key used when no client identity can be resolved for a request.
pub const FALLBACK_KEY: &str = "unknown";

/// The identity a request is accounted under, typically its source address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientKey(String);

impl ClientKey {
    /// Create a key from an identity string.
    ///
    /// Blank identities collapse onto the fallback key.
    pub fn new(identity: impl Into<String>) -> Self {
        let identity = identity.into();
        let trimmed = identity.trim();
        if trimmed.is_empty() {
            Self::fallback()
        } else if trimmed.len() == identity.len() {
            Self(identity)
        } else {
            Self(trimmed.to_string())
        }
    }

    /// The shared catch-all key for unidentifiable clients.
    pub fn fallback() -> Self {
        Self(FALLBACK_KEY.to_string())
    }

    /// Whether this is the catch-all key.
    pub fn is_fallback(&self) -> bool {
        self.0 == FALLBACK_KEY
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<IpAddr> for ClientKey {
    fn from(ip: IpAddr) -> Self {
        // IPv4-mapped IPv6 peers share a key with their IPv4 form.
        let ip = match ip {
            IpAddr::V6(v6) => v6
                .to_ipv4_mapped()
                .map(IpAddr::V4)
                .unwrap_or(IpAddr::V6(v6)),
            v4 => v4,
        };
        Self(ip.to_string())
    }
}

impl From<&str> for ClientKey {
    fn from(identity: &str) -> Self {
        Self::new(identity)
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
