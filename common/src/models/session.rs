// common/src/models/session.rs
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// Hashed client fingerprint recorded at nonce issuance and compared at login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub ip_hash: String,
    pub ua_hash: String,
}

/// Metadata from the SIWE message that established the session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiweProof {
    pub domain: String,
    pub uri: String,
    pub chain_id: u64,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
}

/// Authenticated session handed to the transport after a successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Lowercase wallet address
    pub address: String,
    /// Lowercase ephemeral key identity the wallet delegated to
    pub ephemeral_public_key: String,
    pub expires_at: DateTime<Utc>,
    pub proof: SiweProof,
    pub fingerprint: Fingerprint,
}

/// Response body for session lookups; omits the fingerprint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub address: String,
    pub ephemeral_public_key: String,
    pub expires_at: DateTime<Utc>,
    pub counter: u64,
}
