// delegation/src/verifier.rs
use common::{FingerprintPolicy, Session, SiweProof};
use serde::Serialize;
use std::sync::Arc;

use crate::clock::Clock;
use crate::context::ClientContext;
use crate::error::AuthError;
use crate::eth;
use crate::nonce::NonceIssuer;
use crate::siwe::SiweMessage;
use crate::store::{Delegation, DelegationDescriptor, DelegationStore, PutOutcome};

/// Successful login: the wallet, its delegation and the session grant
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedLogin {
    pub address: String,
    pub delegation: DelegationDescriptor,
    #[serde(skip)]
    pub session: Session,
}

/// Checks wallet-signed sign-in messages and records the delegation they carry
pub struct Verifier {
    nonces: Arc<NonceIssuer>,
    store: Arc<DelegationStore>,
    fingerprint_policy: FingerprintPolicy,
    allowed_domains: Vec<String>,
    clock: Arc<dyn Clock>,
}

impl Verifier {
    pub fn new(
        nonces: Arc<NonceIssuer>,
        store: Arc<DelegationStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            nonces,
            store,
            fingerprint_policy: FingerprintPolicy::default(),
            allowed_domains: Vec::new(),
            clock,
        }
    }

    pub fn with_fingerprint_policy(mut self, policy: FingerprintPolicy) -> Self {
        self.fingerprint_policy = policy;
        self
    }

    /// Restrict accepted sign-in domains; an empty list accepts any
    pub fn with_allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = domains.into_iter().map(|d| d.to_lowercase()).collect();
        self
    }

    pub fn verify(
        &self,
        context: &ClientContext,
        signature: &str,
        siwe_message: &str,
    ) -> Result<VerifiedLogin, AuthError> {
        let result = self.verify_inner(context, signature, siwe_message);
        if let Err(e) = &result {
            tracing::warn!("Login rejected ({:?}): {}", e.category(), e);
        }
        result
    }

    fn verify_inner(
        &self,
        context: &ClientContext,
        signature: &str,
        siwe_message: &str,
    ) -> Result<VerifiedLogin, AuthError> {
        let message: SiweMessage = siwe_message
            .parse()
            .map_err(|e: crate::siwe::ParseError| AuthError::MalformedMessage(e.to_string()))?;

        let domain = message.domain.to_lowercase();
        if !self.allowed_domains.is_empty() && !self.allowed_domains.contains(&domain) {
            return Err(AuthError::DomainNotAllowed(message.domain));
        }

        // The wallet signs the text exactly as submitted
        let address = eth::normalize_address(&message.address).ok_or(AuthError::BadSignature)?;
        match eth::recover_address(siwe_message.as_bytes(), signature) {
            Ok(signer) if signer == address => {}
            Ok(signer) => {
                tracing::debug!("Login signature recovered {} instead of {}", signer, address);
                return Err(AuthError::BadSignature);
            }
            Err(fault) => {
                tracing::debug!("Login signature unusable: {}", fault);
                return Err(AuthError::BadSignature);
            }
        }

        let claim = message.delegation_claim().ok_or(AuthError::NoDelegation)?;

        // From here on the nonce is gone whatever the outcome
        let nonce = self.nonces.consume(&message.nonce)?;

        if claim.ephemeral_public_key != nonce.ephemeral_public_key {
            return Err(AuthError::EphemeralKeyMismatch);
        }

        let now = self.clock.now();
        let expires_at = match message.expiration_time {
            Some(at) if at > now => at,
            _ => return Err(AuthError::DelegationExpired),
        };
        if message.not_before.is_some_and(|nb| nb > now) {
            return Err(AuthError::NotYetValid);
        }

        let fingerprint = context.fingerprint();
        if fingerprint != nonce.fingerprint() {
            match self.fingerprint_policy {
                FingerprintPolicy::Ignore => {}
                FingerprintPolicy::Log => {
                    tracing::warn!(
                        "Client fingerprint changed between nonce and login for {}",
                        address
                    );
                }
                FingerprintPolicy::Reject => return Err(AuthError::FingerprintMismatch),
            }
        }

        let delegation = Delegation::new(&address, &claim.ephemeral_public_key, expires_at, now);
        // Replay history is kept across rotation and re-login; entries are scoped by key
        let (outcome, stored) = self.store.put(delegation);
        match outcome {
            PutOutcome::Rotated => {
                tracing::info!(
                    "Rotated delegation for {} to {}",
                    address,
                    claim.ephemeral_public_key
                );
            }
            PutOutcome::Inserted => {
                tracing::info!("Delegated {} to {}", address, claim.ephemeral_public_key);
            }
            PutOutcome::Refreshed => {
                tracing::info!("Refreshed delegation for {}", address);
            }
        }

        let descriptor = stored.descriptor();
        let session = Session {
            address: address.clone(),
            ephemeral_public_key: descriptor.ephemeral_public_key.clone(),
            expires_at: descriptor.expiration,
            proof: SiweProof {
                domain: message.domain,
                uri: message.uri,
                chain_id: message.chain_id,
                nonce: message.nonce,
                issued_at: message.issued_at,
            },
            fingerprint,
        };

        Ok(VerifiedLogin {
            address,
            delegation: descriptor,
            session,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ephemeral::EphemeralKeyManager;
    use chrono::Duration;

    struct Harness {
        verifier: Verifier,
        nonces: Arc<NonceIssuer>,
        store: Arc<DelegationStore>,
        clock: Arc<ManualClock>,
        wallet: EphemeralKeyManager,
        wallet_address: String,
        ephemeral: String,
    }

    fn harness(policy: FingerprintPolicy) -> Harness {
        let clock = Arc::new(ManualClock::default());
        let nonces = Arc::new(NonceIssuer::new(Duration::minutes(30), clock.clone()));
        let store = Arc::new(DelegationStore::new(clock.clone()));
        let verifier = Verifier::new(nonces.clone(), store.clone(), clock.clone())
            .with_fingerprint_policy(policy);

        let mut wallet = EphemeralKeyManager::new();
        let wallet_address = wallet.generate().unwrap();
        let mut key = EphemeralKeyManager::new();
        let ephemeral = key.generate().unwrap();

        Harness { verifier, nonces, store, clock, wallet, wallet_address, ephemeral }
    }

    impl Harness {
        fn message(&self, nonce: &str, key: &str, expires_in: Option<Duration>) -> SiweMessage {
            let now = self.clock.now();
            SiweMessage {
                domain: "chat.example".to_string(),
                address: self.wallet_address.clone(),
                statement: Some(format!(
                    "Sign in to chat. {}",
                    SiweMessage::delegation_statement(key)
                )),
                uri: "https://chat.example".to_string(),
                version: "1".to_string(),
                chain_id: 1,
                nonce: nonce.to_string(),
                issued_at: now,
                expiration_time: expires_in.map(|d| now + d),
                not_before: None,
                request_id: None,
                resources: Vec::new(),
            }
        }

        fn sign(&mut self, message: &SiweMessage) -> (String, String) {
            let text = message.to_message();
            let signed = self.wallet.sign(&text).unwrap();
            (signed.signature, text)
        }
    }

    fn ctx() -> ClientContext {
        ClientContext::new("10.0.0.1", "test-agent")
    }

    #[test]
    fn valid_login_creates_delegation() {
        let mut h = harness(FingerprintPolicy::Log);
        let grant = h.nonces.generate_nonce(&h.ephemeral, &ctx()).unwrap();
        let message = h.message(&grant.nonce, &h.ephemeral, Some(Duration::minutes(30)));
        let (signature, text) = h.sign(&message);

        let login = h.verifier.verify(&ctx(), &signature, &text).unwrap();
        assert_eq!(login.address, h.wallet_address);
        assert_eq!(login.delegation.ephemeral_public_key, h.ephemeral);
        assert_eq!(login.delegation.counter, 0);
        assert_eq!(login.session.proof.nonce, grant.nonce);
        assert!(h.store.get(&h.wallet_address).is_some());
    }

    #[test]
    fn nonce_cannot_be_reused() {
        let mut h = harness(FingerprintPolicy::Log);
        let grant = h.nonces.generate_nonce(&h.ephemeral, &ctx()).unwrap();
        let message = h.message(&grant.nonce, &h.ephemeral, Some(Duration::minutes(30)));
        let (signature, text) = h.sign(&message);

        assert!(h.verifier.verify(&ctx(), &signature, &text).is_ok());
        assert_eq!(
            h.verifier.verify(&ctx(), &signature, &text).unwrap_err(),
            AuthError::NonceInvalid
        );
    }

    #[test]
    fn garbage_message_is_malformed() {
        let h = harness(FingerprintPolicy::Log);
        let err = h.verifier.verify(&ctx(), "0x00", "hello there").unwrap_err();
        assert!(matches!(err, AuthError::MalformedMessage(_)));
    }

    #[test]
    fn signature_by_other_wallet_is_rejected_without_consuming_nonce() {
        let mut h = harness(FingerprintPolicy::Log);
        let grant = h.nonces.generate_nonce(&h.ephemeral, &ctx()).unwrap();
        let message = h.message(&grant.nonce, &h.ephemeral, Some(Duration::minutes(30)));
        let text = message.to_message();

        let mut impostor = EphemeralKeyManager::new();
        impostor.generate().unwrap();
        let forged = impostor.sign(&text).unwrap();

        assert_eq!(
            h.verifier.verify(&ctx(), &forged.signature, &text).unwrap_err(),
            AuthError::BadSignature
        );
        assert_eq!(h.nonces.len(), 1);

        let (signature, text) = h.sign(&message);
        assert!(h.verifier.verify(&ctx(), &signature, &text).is_ok());
    }

    #[test]
    fn message_without_claim_has_no_delegation() {
        let mut h = harness(FingerprintPolicy::Log);
        let grant = h.nonces.generate_nonce(&h.ephemeral, &ctx()).unwrap();
        let mut message = h.message(&grant.nonce, &h.ephemeral, Some(Duration::minutes(30)));
        message.statement = Some("Sign in to chat.".to_string());
        let (signature, text) = h.sign(&message);

        assert_eq!(
            h.verifier.verify(&ctx(), &signature, &text).unwrap_err(),
            AuthError::NoDelegation
        );
    }

    #[test]
    fn claim_must_match_nonce_key() {
        let mut h = harness(FingerprintPolicy::Log);
        let grant = h.nonces.generate_nonce(&h.ephemeral, &ctx()).unwrap();
        let other = "0x2222222222222222222222222222222222222222";
        let message = h.message(&grant.nonce, other, Some(Duration::minutes(30)));
        let (signature, text) = h.sign(&message);

        assert_eq!(
            h.verifier.verify(&ctx(), &signature, &text).unwrap_err(),
            AuthError::EphemeralKeyMismatch
        );
        // The nonce was consumed by the failed attempt
        assert!(h.nonces.is_empty());
    }

    #[test]
    fn expiration_must_be_in_future() {
        let mut h = harness(FingerprintPolicy::Log);
        for expires_in in [None, Some(Duration::minutes(-1)), Some(Duration::zero())] {
            let grant = h.nonces.generate_nonce(&h.ephemeral, &ctx()).unwrap();
            let message = h.message(&grant.nonce, &h.ephemeral, expires_in);
            let (signature, text) = h.sign(&message);
            assert_eq!(
                h.verifier.verify(&ctx(), &signature, &text).unwrap_err(),
                AuthError::DelegationExpired
            );
        }
    }

    #[test]
    fn not_before_in_future_is_not_yet_valid() {
        let mut h = harness(FingerprintPolicy::Log);
        let grant = h.nonces.generate_nonce(&h.ephemeral, &ctx()).unwrap();
        let mut message = h.message(&grant.nonce, &h.ephemeral, Some(Duration::minutes(30)));
        message.not_before = Some(h.clock.now() + Duration::minutes(5));
        let (signature, text) = h.sign(&message);

        assert_eq!(
            h.verifier.verify(&ctx(), &signature, &text).unwrap_err(),
            AuthError::NotYetValid
        );
    }

    #[test]
    fn fingerprint_policy_controls_mismatch() {
        let other_ctx = ClientContext::new("10.9.9.9", "other-agent");

        let mut h = harness(FingerprintPolicy::Log);
        let grant = h.nonces.generate_nonce(&h.ephemeral, &ctx()).unwrap();
        let message = h.message(&grant.nonce, &h.ephemeral, Some(Duration::minutes(30)));
        let (signature, text) = h.sign(&message);
        assert!(h.verifier.verify(&other_ctx, &signature, &text).is_ok());

        let mut h = harness(FingerprintPolicy::Reject);
        let grant = h.nonces.generate_nonce(&h.ephemeral, &ctx()).unwrap();
        let message = h.message(&grant.nonce, &h.ephemeral, Some(Duration::minutes(30)));
        let (signature, text) = h.sign(&message);
        assert_eq!(
            h.verifier.verify(&other_ctx, &signature, &text).unwrap_err(),
            AuthError::FingerprintMismatch
        );
    }

    #[test]
    fn domain_allow_list_is_enforced() {
        let mut h = harness(FingerprintPolicy::Log);
        h.verifier = Verifier::new(h.nonces.clone(), h.store.clone(), h.clock.clone())
            .with_allowed_domains(vec!["Other.Example".to_string()]);

        let grant = h.nonces.generate_nonce(&h.ephemeral, &ctx()).unwrap();
        let message = h.message(&grant.nonce, &h.ephemeral, Some(Duration::minutes(30)));
        let (signature, text) = h.sign(&message);
        assert_eq!(
            h.verifier.verify(&ctx(), &signature, &text).unwrap_err(),
            AuthError::DomainNotAllowed("chat.example".to_string())
        );
    }
}
