// delegation/src/ephemeral.rs
//! Client-side custody of the ephemeral signing key.
//!
//! The secp256k1 secret is sealed with AES-256-GCM under a symmetric key that
//! never leaves the cipher instance. Plaintext key bytes only exist inside a
//! zeroizing buffer for the length of one `sign` call.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use zeroize::{Zeroize, Zeroizing};

use crate::error::KeyError;
use crate::eth;

/// Signature plus the counter value the server must see strictly increase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedMessage {
    pub signature: String,
    pub counter: u64,
}

struct SealedKey {
    cipher: Aes256Gcm,
    nonce: [u8; 12],
    ciphertext: Vec<u8>,
    public_key: String,
}

/// Generates, seals and signs with a short-lived delegated key
pub struct EphemeralKeyManager {
    sealed: Option<SealedKey>,
    counter: u64,
}

impl Default for EphemeralKeyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EphemeralKeyManager {
    pub fn new() -> Self {
        Self {
            sealed: None,
            counter: 0,
        }
    }

    /// Create a fresh keypair, replacing any previous one, and return its public identity
    pub fn generate(&mut self) -> Result<String, KeyError> {
        self.clear();

        let mut secret = Zeroizing::new([0u8; 32]);
        OsRng
            .try_fill_bytes(&mut secret[..])
            .map_err(|_| KeyError::KeyGenerationFailed)?;
        let signing_key =
            SigningKey::from_slice(&secret[..]).map_err(|_| KeyError::KeyGenerationFailed)?;
        let public_key = eth::address_of(signing_key.verifying_key());

        let mut wrapping_key = Zeroizing::new([0u8; 32]);
        OsRng
            .try_fill_bytes(&mut wrapping_key[..])
            .map_err(|_| KeyError::KeyGenerationFailed)?;
        let cipher = Aes256Gcm::new_from_slice(&wrapping_key[..])
            .map_err(|_| KeyError::KeyGenerationFailed)?;

        let mut nonce = [0u8; 12];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|_| KeyError::KeyGenerationFailed)?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), &secret[..])
            .map_err(|_| KeyError::KeyGenerationFailed)?;

        self.sealed = Some(SealedKey {
            cipher,
            nonce,
            ciphertext,
            public_key: public_key.clone(),
        });
        self.counter = 0;

        tracing::debug!("Generated ephemeral key {}", public_key);
        Ok(public_key)
    }

    /// Sign `message` and advance the local counter
    pub fn sign(&mut self, message: &str) -> Result<SignedMessage, KeyError> {
        let sealed = self.sealed.as_ref().ok_or(KeyError::NotInitialized)?;

        let signature = {
            let secret = Zeroizing::new(
                sealed
                    .cipher
                    .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_slice())
                    .map_err(|_| KeyError::SigningFailed)?,
            );
            let signing_key =
                SigningKey::from_slice(&secret[..]).map_err(|_| KeyError::SigningFailed)?;
            eth::sign_message(&signing_key, message.as_bytes())
                .map_err(|_| KeyError::SigningFailed)?
        };

        self.counter += 1;
        Ok(SignedMessage {
            signature: eth::encode_signature(&signature),
            counter: self.counter,
        })
    }

    /// Public identity of the current key, if one exists
    pub fn public_key(&self) -> Option<&str> {
        self.sealed.as_ref().map(|s| s.public_key.as_str())
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Wipe all key material and reset the counter. Safe to call repeatedly.
    pub fn clear(&mut self) {
        if let Some(mut sealed) = self.sealed.take() {
            sealed.ciphertext.zeroize();
            sealed.nonce.zeroize();
        }
        self.counter = 0;
    }
}

impl Drop for EphemeralKeyManager {
    fn drop(&mut self) {
        self.clear();
    }
}
