// common/src/token.rs
use rand::{thread_rng, Rng};
use rand::distributions::Alphanumeric;
use sha2::{Sha256, Digest};

/// Generate a cryptographically secure random alphanumeric token of specified length.
///
/// Each character carries log2(62) ~ 5.95 bits, so 44 characters exceed 256 bits.
pub fn generate_secure_token(length: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Hash a string using SHA-256
pub fn hash_string(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    format!("{:x}", result)
}
