// delegation/tests/support/mod.rs
#![allow(dead_code)]

use chrono::Duration;
use common::{AuthConfig, ChatFrame};
use delegation::{
    ClientContext, Clock, DelegationService, EphemeralKeyManager, ManualClock, SiweMessage,
};
use std::sync::Arc;

pub fn service(clock: Arc<ManualClock>) -> Arc<DelegationService> {
    service_with(AuthConfig::default(), clock)
}

pub fn service_with(config: AuthConfig, clock: Arc<ManualClock>) -> Arc<DelegationService> {
    Arc::new(
        DelegationService::builder(config)
            .clock(clock)
            .build()
            .expect("valid test configuration"),
    )
}

pub fn ctx() -> ClientContext {
    ClientContext::new("203.0.113.7", "integration-test")
}

/// A user: wallet key for login plus the delegated ephemeral key
pub struct TestUser {
    pub wallet: EphemeralKeyManager,
    pub key: EphemeralKeyManager,
    pub address: String,
    pub ephemeral: String,
}

impl TestUser {
    pub fn new() -> Self {
        let mut wallet = EphemeralKeyManager::new();
        let address = wallet.generate().expect("wallet key");
        let mut key = EphemeralKeyManager::new();
        let ephemeral = key.generate().expect("ephemeral key");
        Self { wallet, key, address, ephemeral }
    }

    /// Wallet-signed login message for `nonce`; returns `(signature, message)`
    pub fn sign_login(
        &mut self,
        clock: &ManualClock,
        nonce: &str,
        expires_in: Duration,
    ) -> (String, String) {
        let now = clock.now();
        let message = SiweMessage {
            domain: "chat.example".to_string(),
            address: self.address.clone(),
            statement: Some(format!(
                "Sign in to chat. {}",
                SiweMessage::delegation_statement(&self.ephemeral)
            )),
            uri: "https://chat.example/login".to_string(),
            version: "1".to_string(),
            chain_id: 1,
            nonce: nonce.to_string(),
            issued_at: now,
            expiration_time: Some(now + expires_in),
            not_before: None,
            request_id: None,
            resources: Vec::new(),
        }
        .to_message();
        let signed = self.wallet.sign(&message).expect("wallet signature");
        (signed.signature, message)
    }

    /// Full nonce plus verify handshake
    pub fn login(
        &mut self,
        service: &DelegationService,
        clock: &ManualClock,
        expires_in: Duration,
    ) {
        let grant = service.generate_nonce(&self.ephemeral, &ctx()).expect("nonce");
        let (signature, message) = self.sign_login(clock, &grant.nonce, expires_in);
        service.verify(&ctx(), &signature, &message).expect("login");
    }

    /// Chat frame signed by the ephemeral key at the next local counter
    pub fn frame(&mut self, text: &str) -> ChatFrame {
        let signed = self.key.sign(text).expect("ephemeral signature");
        ChatFrame {
            message: text.to_string(),
            signature: signed.signature,
            counter: signed.counter,
            address: self.address.clone(),
        }
    }
}
