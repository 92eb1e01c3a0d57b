// delegation/src/validator.rs
use common::ChatFrame;
use serde::Serialize;
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::RejectReason;
use crate::eth;
use crate::replay::ReplayCache;
use crate::store::DelegationStore;

/// Sender address that skips delegation, counter and signature checks
pub const ANON_ADDRESS: &str = "anon";

/// Outcome of validating one chat frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
}

impl Validation {
    pub fn accepted() -> Self {
        Self { valid: true, reason: None }
    }

    pub fn rejected(reason: RejectReason) -> Self {
        Self { valid: false, reason: Some(reason) }
    }
}

impl From<Result<(), RejectReason>> for Validation {
    fn from(result: Result<(), RejectReason>) -> Self {
        match result {
            Ok(()) => Validation::accepted(),
            Err(reason) => Validation::rejected(reason),
        }
    }
}

/// Authenticates chat frames against the delegation store and replay cache
pub struct Validator {
    store: Arc<DelegationStore>,
    replay: Arc<ReplayCache>,
    clock: Arc<dyn Clock>,
}

impl Validator {
    pub fn new(
        store: Arc<DelegationStore>,
        replay: Arc<ReplayCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, replay, clock }
    }

    pub fn validate(&self, frame: &ChatFrame) -> Validation {
        // Anonymous senders are throttled by the transport, not here
        if frame.address == ANON_ADDRESS {
            return Validation::accepted();
        }

        let address = frame.address.trim().to_lowercase();
        let now = self.clock.now();

        // The whole check-then-advance sequence runs under the address's shard lock
        let outcome = self.store.with_active(&address, |delegation| {
            if frame.counter <= delegation.counter {
                return Err(RejectReason::ReplayOrStale);
            }

            if frame.signature.trim().is_empty() {
                return Err(RejectReason::BadSignature);
            }
            match eth::recover_address(frame.message.as_bytes(), &frame.signature) {
                Ok(signer) if signer == delegation.ephemeral_public_key => {}
                _ => return Err(RejectReason::BadSignature),
            }

            self.replay.check_and_record(
                &address,
                &delegation.ephemeral_public_key,
                frame.counter,
                &frame.message,
                now,
            )?;

            // Locked form of `DelegationStore::update_counter`
            delegation.record_use(frame.counter, now);
            Ok(())
        });

        let result = outcome.unwrap_or(Err(RejectReason::NoDelegation));
        if let Err(reason) = result {
            tracing::debug!(
                "Rejected message from {} at counter {}: {}",
                address,
                frame.counter,
                reason
            );
        }
        result.into()
    }
}
