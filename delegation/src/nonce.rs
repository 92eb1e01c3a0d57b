// delegation/src/nonce.rs
use chrono::{DateTime, Duration, Utc};
use common::{generate_secure_token, Fingerprint};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

use crate::clock::Clock;
use crate::context::ClientContext;
use crate::error::AuthError;
use crate::eth;

/// Alphanumeric characters per nonce (> 256 bits of entropy)
pub const NONCE_LENGTH: usize = 44;

/// Issued login nonce, bound to one ephemeral key and one client fingerprint
#[derive(Debug, Clone)]
pub struct NonceRecord {
    pub value: String,
    pub ephemeral_public_key: String,
    pub ip_hash: String,
    pub ua_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NonceRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            ip_hash: self.ip_hash.clone(),
            ua_hash: self.ua_hash.clone(),
        }
    }
}

/// Response to a nonce request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceGrant {
    pub nonce: String,
    pub ephemeral_public_key: String,
}

/// Issues and consumes single-use login nonces
pub struct NonceIssuer {
    records: DashMap<String, NonceRecord>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl NonceIssuer {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            ttl,
            clock,
        }
    }

    /// Issue a nonce bound to `ephemeral_public_key` and the caller's fingerprint
    pub fn generate_nonce(
        &self,
        ephemeral_public_key: &str,
        context: &ClientContext,
    ) -> Result<NonceGrant, AuthError> {
        let key = eth::normalize_address(ephemeral_public_key).ok_or(AuthError::InvalidKeyFormat)?;

        let now = self.clock.now();
        let value = generate_secure_token(NONCE_LENGTH);
        let fingerprint = context.fingerprint();

        self.records.insert(value.clone(), NonceRecord {
            value: value.clone(),
            ephemeral_public_key: key.clone(),
            ip_hash: fingerprint.ip_hash,
            ua_hash: fingerprint.ua_hash,
            issued_at: now,
            expires_at: now + self.ttl,
        });

        tracing::debug!("Issued nonce for ephemeral key {}", key);

        Ok(NonceGrant {
            nonce: value,
            ephemeral_public_key: key,
        })
    }

    /// Remove the nonce and hand it to exactly one caller.
    ///
    /// Removal happens before the expiry check, so an expired nonce is also gone
    /// after the first attempt.
    pub fn consume(&self, value: &str) -> Result<NonceRecord, AuthError> {
        let (_, record) = self.records.remove(value).ok_or(AuthError::NonceInvalid)?;

        if record.is_expired(self.clock.now()) {
            return Err(AuthError::NonceExpired);
        }

        Ok(record)
    }

    /// Drop expired nonces, returning how many were removed
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.records.retain(|_, record| {
            let keep = !record.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
