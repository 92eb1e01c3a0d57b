// delegation/src/error.rs
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Coarse failure categories; the only distinction callers may rely on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCategory {
    InputValidation,
    NonceError,
    SignatureError,
    DelegationError,
    ReplayError,
    ConfigError,
}

/// Failures of the nonce and login handshake
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("ephemeral public key must be 0x followed by 40 hex characters")]
    InvalidKeyFormat,
    #[error("sign-in message is malformed: {0}")]
    MalformedMessage(String),
    #[error("sign-in domain {0} is not accepted")]
    DomainNotAllowed(String),
    #[error("sign-in message is not valid yet")]
    NotYetValid,
    #[error("wallet signature does not recover to the claimed address")]
    BadSignature,
    #[error("sign-in message carries no delegation claim")]
    NoDelegation,
    #[error("nonce is unknown or already used")]
    NonceInvalid,
    #[error("nonce has expired")]
    NonceExpired,
    #[error("delegated key differs from the key bound to the nonce")]
    EphemeralKeyMismatch,
    #[error("delegation expiration time is not in the future")]
    DelegationExpired,
    #[error("client fingerprint changed since the nonce was issued")]
    FingerprintMismatch,
}

impl AuthError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AuthError::InvalidKeyFormat
            | AuthError::MalformedMessage(_)
            | AuthError::DomainNotAllowed(_)
            | AuthError::NotYetValid => ErrorCategory::InputValidation,
            AuthError::NonceInvalid | AuthError::NonceExpired => ErrorCategory::NonceError,
            AuthError::BadSignature => ErrorCategory::SignatureError,
            AuthError::NoDelegation
            | AuthError::EphemeralKeyMismatch
            | AuthError::DelegationExpired
            | AuthError::FingerprintMismatch => ErrorCategory::DelegationError,
        }
    }

    /// Kind reported to callers. Parse faults collapse into `VerificationFailed`;
    /// their detail only reaches the logs.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::InvalidKeyFormat => ErrorKind::InvalidKeyFormat,
            AuthError::MalformedMessage(_) | AuthError::NotYetValid => {
                ErrorKind::VerificationFailed
            }
            AuthError::DomainNotAllowed(_) => ErrorKind::DomainNotAllowed,
            AuthError::BadSignature => ErrorKind::BadSignature,
            AuthError::NoDelegation => ErrorKind::NoDelegation,
            AuthError::NonceInvalid => ErrorKind::NonceInvalid,
            AuthError::NonceExpired => ErrorKind::NonceExpired,
            AuthError::EphemeralKeyMismatch => ErrorKind::EphemeralKeyMismatch,
            AuthError::DelegationExpired => ErrorKind::DelegationExpired,
            AuthError::FingerprintMismatch => ErrorKind::FingerprintMismatch,
        }
    }
}

/// Error codes that may appear in a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidKeyFormat,
    VerificationFailed,
    DomainNotAllowed,
    BadSignature,
    NoDelegation,
    NonceInvalid,
    NonceExpired,
    EphemeralKeyMismatch,
    DelegationExpired,
    FingerprintMismatch,
}

/// Why the validator refused a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    NoDelegation,
    ReplayOrStale,
    BadSignature,
    Replay,
    Flood,
}

impl RejectReason {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RejectReason::NoDelegation => ErrorCategory::DelegationError,
            RejectReason::BadSignature => ErrorCategory::SignatureError,
            RejectReason::ReplayOrStale | RejectReason::Replay | RejectReason::Flood => {
                ErrorCategory::ReplayError
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NoDelegation => "NoDelegation",
            RejectReason::ReplayOrStale => "ReplayOrStale",
            RejectReason::BadSignature => "BadSignature",
            RejectReason::Replay => "Replay",
            RejectReason::Flood => "Flood",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures of the client-side ephemeral key manager
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("secure randomness or key primitives unavailable")]
    KeyGenerationFailed,
    #[error("no ephemeral key has been generated")]
    NotInitialized,
    #[error("ephemeral key could not be unsealed or used for signing")]
    SigningFailed,
}

/// Service constructed without a required collaborator or with unusable settings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no clock source configured")]
    MissingClock,
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

impl ConfigError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::ConfigError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_faults_are_not_echoed() {
        let err = AuthError::MalformedMessage("line 3: expected URI".to_string());
        assert_eq!(err.kind(), ErrorKind::VerificationFailed);
        assert_eq!(err.category(), ErrorCategory::InputValidation);
    }

    #[test]
    fn reject_reasons_serialize_as_names() {
        assert_eq!(
            serde_json::to_string(&RejectReason::ReplayOrStale).unwrap(),
            "\"ReplayOrStale\""
        );
        assert_eq!(RejectReason::Flood.category(), ErrorCategory::ReplayError);
    }
}
