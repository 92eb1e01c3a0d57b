// delegation/src/eth.rs
//! Ethereum address handling and EIP-191 personal-message signatures.
//!
//! Both the wallet login signature and every ephemeral chat signature use the
//! same scheme: `keccak256("\x19Ethereum Signed Message:\n" + len + message)`
//! signed with secp256k1, serialized as 65 bytes `r || s || v`.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// Length of a `0x`-prefixed hex address
pub const ADDRESS_LENGTH: usize = 42;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureFault {
    #[error("signature is not valid hex")]
    Encoding,
    #[error("signature must be 65 bytes, got {0}")]
    Length(usize),
    #[error("unsupported recovery byte {0}")]
    RecoveryByte(u8),
    #[error("signature does not recover to a public key")]
    Unrecoverable,
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Digest signed by `personal_sign`
pub fn eip191_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

/// `0x` followed by exactly 40 hex digits, any case
pub fn is_hex_address(value: &str) -> bool {
    value.len() == ADDRESS_LENGTH
        && value.starts_with("0x")
        && value[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Lowercase form of a well-formed address
pub fn normalize_address(value: &str) -> Option<String> {
    let value = value.trim();
    is_hex_address(value).then(|| value.to_ascii_lowercase())
}

/// Lowercase address derived from an uncompressed public key
pub fn address_of(key: &VerifyingKey) -> String {
    let encoded = key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// Sign `message` EIP-191 style, returning `r || s || v` with `v` in {27, 28}
pub fn sign_message(key: &SigningKey, message: &[u8]) -> Result<[u8; 65], k256::ecdsa::Error> {
    let digest = eip191_hash(message);
    let (signature, recovery_id) = key.sign_prehash_recoverable(&digest)?;

    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&signature.to_bytes());
    out[64] = 27 + recovery_id.to_byte();
    Ok(out)
}

pub fn encode_signature(bytes: &[u8; 65]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn decode_signature(value: &str) -> Result<[u8; 65], SignatureFault> {
    let value = value.trim();
    let hex_part = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(hex_part).map_err(|_| SignatureFault::Encoding)?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| SignatureFault::Length(len))
}

/// Recover the lowercase address that produced `signature` over `message`
pub fn recover_address(message: &[u8], signature: &str) -> Result<String, SignatureFault> {
    let bytes = decode_signature(signature)?;

    let recovery_byte = match bytes[64] {
        v @ (0 | 1) => v,
        v @ (27 | 28) => v - 27,
        v => return Err(SignatureFault::RecoveryByte(v)),
    };

    let mut signature =
        Signature::from_slice(&bytes[..64]).map_err(|_| SignatureFault::Unrecoverable)?;
    let mut recovery_id = RecoveryId::from_byte(recovery_byte)
        .ok_or(SignatureFault::RecoveryByte(bytes[64]))?;

    // High-s signatures are malleable twins of a low-s one; flip parity to match
    if let Some(normalized) = signature.normalize_s() {
        signature = normalized;
        recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
    }

    let digest = eip191_hash(message);
    let key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
        .map_err(|_| SignatureFault::Unrecoverable)?;

    Ok(address_of(&key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SigningKey {
        SigningKey::from_slice(&[7u8; 32]).unwrap()
    }

    #[test]
    fn signature_recovers_signer() {
        let key = test_key();
        let sig = sign_message(&key, b"hello").unwrap();
        let recovered = recover_address(b"hello", &encode_signature(&sig)).unwrap();
        assert_eq!(recovered, address_of(key.verifying_key()));
    }

    #[test]
    fn other_message_recovers_other_address() {
        let key = test_key();
        let sig = encode_signature(&sign_message(&key, b"hello").unwrap());
        let recovered = recover_address(b"hello!", &sig).unwrap_or_default();
        assert_ne!(recovered, address_of(key.verifying_key()));
    }

    #[test]
    fn accepts_zero_based_recovery_byte() {
        let key = test_key();
        let mut sig = sign_message(&key, b"hello").unwrap();
        sig[64] -= 27;
        let recovered = recover_address(b"hello", &encode_signature(&sig)).unwrap();
        assert_eq!(recovered, address_of(key.verifying_key()));
    }

    #[test]
    fn rejects_bad_encodings() {
        assert_eq!(recover_address(b"x", "0xzz"), Err(SignatureFault::Encoding));
        assert_eq!(recover_address(b"x", "0xabcd"), Err(SignatureFault::Length(2)));
        assert_eq!(recover_address(b"x", ""), Err(SignatureFault::Length(0)));
    }

    #[test]
    fn address_shape() {
        assert!(is_hex_address("0xEEeeEEeeEEeeEEeeEEeeEEeeEEeeEEeeEEeeEEee"));
        assert!(!is_hex_address("EEeeEEeeEEeeEEeeEEeeEEeeEEeeEEeeEEeeEEee00"));
        assert!(!is_hex_address("0xEEee"));
        assert!(!is_hex_address("0xgggggggggggggggggggggggggggggggggggggggg"));
        assert_eq!(
            normalize_address(" 0xABCDEFabcdef0123456789ABCDEFabcdef012345 ").as_deref(),
            Some("0xabcdefabcdef0123456789abcdefabcdef012345")
        );
    }

    #[test]
    fn known_eip191_vector() {
        // keccak256 of the empty string
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }
}
