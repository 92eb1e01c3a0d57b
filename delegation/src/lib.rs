// delegation/src/lib.rs
//! Wallet login with ephemeral-key delegation.
//!
//! A wallet signs one SIWE message naming a short-lived key; after that every
//! chat message is signed by the delegated key and checked against a strictly
//! increasing counter and a short replay window.

pub mod clock;
pub mod context;
pub mod ephemeral;
pub mod error;
pub mod eth;
pub mod nonce;
pub mod replay;
pub mod service;
pub mod siwe;
pub mod store;
pub mod sweeper;
pub mod validator;
pub mod verifier;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::ClientContext;
pub use ephemeral::{EphemeralKeyManager, SignedMessage};
pub use error::{AuthError, ConfigError, ErrorCategory, ErrorKind, KeyError, RejectReason};
pub use nonce::{NonceGrant, NONCE_LENGTH};
pub use service::{DelegationService, DelegationServiceBuilder, ServiceStats, SweepReport};
pub use siwe::{DelegationClaim, SiweMessage};
pub use store::{Delegation, DelegationDescriptor};
pub use sweeper::{SweepNow, Sweeper};
pub use validator::{Validation, ANON_ADDRESS};
pub use verifier::VerifiedLogin;
