// delegation/src/context.rs
use common::{hash_string, Fingerprint};

/// Request attributes used to bind a login attempt to the client that started it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    pub ip: String,
    pub user_agent: String,
}

impl ClientContext {
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent: user_agent.into(),
        }
    }

    /// SHA-256 hashes of the raw attributes; raw values are never stored
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            ip_hash: hash_string(&self.ip),
            ua_hash: hash_string(&self.user_agent),
        }
    }
}
