// delegation/src/service.rs
use chrono::Duration;
use common::{AuthConfig, ChatFrame};
use serde::Serialize;
use std::sync::Arc;

use crate::clock::Clock;
use crate::context::ClientContext;
use crate::error::{AuthError, ConfigError};
use crate::nonce::{NonceGrant, NonceIssuer};
use crate::replay::{ReplayCache, ReplayPolicy};
use crate::store::{Delegation, DelegationStore};
use crate::validator::{Validation, Validator};
use crate::verifier::{VerifiedLogin, Verifier};

/// Entries removed by one cleanup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub nonces: usize,
    pub delegations: usize,
    pub replay_entries: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.nonces + self.delegations + self.replay_entries
    }
}

/// Live entry counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    pub nonces: usize,
    pub delegations: usize,
    pub replay_entries: usize,
}

/// Nonce issuance, login verification and message validation over shared state
pub struct DelegationService {
    nonces: Arc<NonceIssuer>,
    store: Arc<DelegationStore>,
    replay: Arc<ReplayCache>,
    verifier: Verifier,
    validator: Validator,
    clock: Arc<dyn Clock>,
    sweep_interval: std::time::Duration,
}

pub struct DelegationServiceBuilder {
    config: AuthConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl DelegationServiceBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<DelegationService, ConfigError> {
        let config = self.config;
        let clock = self.clock.ok_or(ConfigError::MissingClock)?;

        positive("nonce_ttl_secs", config.nonce_ttl_secs)?;
        positive("replay_retention_secs", config.replay_retention_secs)?;
        positive("burst_window_secs", config.burst_window_secs)?;
        if config.sweep_interval_secs == 0 {
            return Err(invalid("sweep_interval_secs", "must be greater than zero"));
        }
        if config.burst_limit == 0 {
            return Err(invalid("burst_limit", "must be greater than zero"));
        }
        if config.burst_window_secs > config.replay_retention_secs {
            return Err(invalid("burst_window_secs", "must not exceed replay_retention_secs"));
        }
        if config.replay_capacity_per_address < config.burst_limit {
            return Err(invalid("replay_capacity_per_address", "must be at least burst_limit"));
        }

        let nonce_ttl = Duration::seconds(config.nonce_ttl_secs);
        let nonces = Arc::new(NonceIssuer::new(nonce_ttl, clock.clone()));
        let store = Arc::new(DelegationStore::new(clock.clone()));
        let replay = Arc::new(ReplayCache::new(ReplayPolicy {
            retention: Duration::seconds(config.replay_retention_secs),
            burst_window: Duration::seconds(config.burst_window_secs),
            burst_limit: config.burst_limit,
            capacity_per_address: config.replay_capacity_per_address,
        }));

        let verifier = Verifier::new(nonces.clone(), store.clone(), clock.clone())
            .with_fingerprint_policy(config.fingerprint_policy)
            .with_allowed_domains(config.allowed_domains);
        let validator = Validator::new(store.clone(), replay.clone(), clock.clone());

        Ok(DelegationService {
            nonces,
            store,
            replay,
            verifier,
            validator,
            clock,
            sweep_interval: std::time::Duration::from_secs(config.sweep_interval_secs),
        })
    }
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidSetting {
        name,
        reason: reason.to_string(),
    }
}

fn positive(name: &'static str, value: i64) -> Result<(), ConfigError> {
    if value <= 0 {
        return Err(invalid(name, "must be greater than zero"));
    }
    Ok(())
}

impl DelegationService {
    pub fn builder(config: AuthConfig) -> DelegationServiceBuilder {
        DelegationServiceBuilder { config, clock: None }
    }

    pub fn generate_nonce(
        &self,
        ephemeral_public_key: &str,
        context: &ClientContext,
    ) -> Result<NonceGrant, AuthError> {
        self.nonces.generate_nonce(ephemeral_public_key, context)
    }

    pub fn verify(
        &self,
        context: &ClientContext,
        signature: &str,
        siwe_message: &str,
    ) -> Result<VerifiedLogin, AuthError> {
        self.verifier.verify(context, signature, siwe_message)
    }

    pub fn validate(&self, frame: &ChatFrame) -> Validation {
        self.validator.validate(frame)
    }

    /// Current delegation for `address`, if still active
    pub fn delegation(&self, address: &str) -> Option<Delegation> {
        self.store.get(address)
    }

    /// End a delegation. Its replay history ages out on its own, so captured
    /// messages stay rejected if the same key logs in again.
    pub fn revoke(&self, address: &str) -> Option<Delegation> {
        let removed = self.store.remove(address)?;
        tracing::info!("Revoked delegation for {}", removed.address);
        Some(removed)
    }

    pub fn sweep(&self) -> SweepReport {
        SweepReport {
            nonces: self.nonces.sweep(),
            delegations: self.store.sweep(),
            replay_entries: self.replay.sweep(self.clock.now()),
        }
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            nonces: self.nonces.len(),
            delegations: self.store.len(),
            replay_entries: self.replay.len(),
        }
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        self.sweep_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ephemeral::EphemeralKeyManager;
    use crate::error::RejectReason;
    use crate::siwe::SiweMessage;

    fn service(clock: Arc<ManualClock>) -> DelegationService {
        DelegationService::builder(AuthConfig::default()).clock(clock).build().unwrap()
    }

    fn login(
        service: &DelegationService,
        clock: &ManualClock,
        wallet: &mut EphemeralKeyManager,
        key: &str,
    ) -> String {
        let ctx = ClientContext::default();
        let grant = service.generate_nonce(key, &ctx).unwrap();
        let now = clock.now();
        let message = SiweMessage {
            domain: "chat.example".to_string(),
            address: wallet.public_key().unwrap().to_string(),
            statement: None,
            uri: "https://chat.example".to_string(),
            version: "1".to_string(),
            chain_id: 1,
            nonce: grant.nonce,
            issued_at: now,
            expiration_time: Some(now + Duration::minutes(30)),
            not_before: None,
            request_id: None,
            resources: vec![format!("urn:ephemeral-key:{}", key)],
        }
        .to_message();
        let signed = wallet.sign(&message).unwrap();
        service.verify(&ctx, &signed.signature, &message).unwrap().address
    }

    #[test]
    fn builder_requires_clock() {
        assert_eq!(
            DelegationService::builder(AuthConfig::default()).build().err(),
            Some(ConfigError::MissingClock)
        );
    }

    #[test]
    fn builder_rejects_unusable_settings() {
        let clock = Arc::new(ManualClock::default());
        let config = AuthConfig {
            burst_limit: 0,
            ..AuthConfig::default()
        };
        let err = DelegationService::builder(config).clock(clock.clone()).build().err();
        assert!(matches!(err, Some(ConfigError::InvalidSetting { name: "burst_limit", .. })));

        let config = AuthConfig {
            nonce_ttl_secs: 0,
            ..AuthConfig::default()
        };
        let err = DelegationService::builder(config).clock(clock.clone()).build().err();
        assert!(matches!(err, Some(ConfigError::InvalidSetting { name: "nonce_ttl_secs", .. })));

        // A burst window longer than retention would under-count the ceiling
        let config = AuthConfig {
            burst_window_secs: 600,
            replay_retention_secs: 300,
            ..AuthConfig::default()
        };
        let err = DelegationService::builder(config).clock(clock.clone()).build().err();
        assert!(matches!(err, Some(ConfigError::InvalidSetting { name: "burst_window_secs", .. })));

        let config = AuthConfig {
            burst_window_secs: 300,
            replay_retention_secs: 300,
            ..AuthConfig::default()
        };
        assert!(DelegationService::builder(config).clock(clock).build().is_ok());
    }

    #[test]
    fn revoke_ends_delegation() {
        let clock = Arc::new(ManualClock::default());
        let service = service(clock.clone());
        let mut wallet = EphemeralKeyManager::new();
        wallet.generate().unwrap();
        let mut key = EphemeralKeyManager::new();
        let ephemeral = key.generate().unwrap();

        let address = login(&service, &clock, &mut wallet, &ephemeral);
        let signed = key.sign("hi").unwrap();
        let frame = ChatFrame {
            message: "hi".to_string(),
            signature: signed.signature,
            counter: signed.counter,
            address: address.clone(),
        };

        assert!(service.revoke(&address).is_some());
        assert!(service.revoke(&address).is_none());
        assert_eq!(service.validate(&frame).reason, Some(RejectReason::NoDelegation));
    }

    #[test]
    fn sweep_reports_removed_entries() {
        let clock = Arc::new(ManualClock::default());
        let service = service(clock.clone());
        let mut wallet = EphemeralKeyManager::new();
        wallet.generate().unwrap();
        let mut key = EphemeralKeyManager::new();
        let ephemeral = key.generate().unwrap();

        let address = login(&service, &clock, &mut wallet, &ephemeral);
        service.generate_nonce(&ephemeral, &ClientContext::default()).unwrap();
        let signed = key.sign("hi").unwrap();
        let frame = ChatFrame {
            message: "hi".to_string(),
            signature: signed.signature,
            counter: signed.counter,
            address,
        };
        assert!(service.validate(&frame).valid);

        assert_eq!(
            service.stats(),
            ServiceStats {
                nonces: 1,
                delegations: 1,
                replay_entries: 1
            }
        );

        clock.advance(Duration::minutes(31));
        let report = service.sweep();
        assert_eq!(
            report,
            SweepReport {
                nonces: 1,
                delegations: 1,
                replay_entries: 1
            }
        );
        assert_eq!(report.total(), 3);
        assert_eq!(service.stats(), ServiceStats::default());
    }
}
