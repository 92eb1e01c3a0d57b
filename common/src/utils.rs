// common/src/utils.rs
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use jsonwebtoken::{encode, decode, Header, Algorithm, Validation, EncodingKey, DecodingKey};
use serde::{Serialize, Deserialize};
use crate::models::session::Session;

/// Setup tracing for consistent logging across services
pub fn setup_tracing(level: &str) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Tracing subscriber already installed: {}", e);
    }
}

// Session token claims handed to the browser after a successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,       // wallet address
    pub eph: String,       // ephemeral public key
    pub exp: usize,        // delegation expiry
    pub iat: usize,        // issued at time
}

// Generate a session token that expires together with the delegation
pub fn generate_session_token(
    session: &Session,
    secret: &[u8],
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp().max(0) as usize;

    let claims = SessionClaims {
        sub: session.address.clone(),
        eph: session.ephemeral_public_key.clone(),
        iat: now,
        exp: session.expires_at.timestamp().max(0) as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret)
    )
}

// Validate a session token and return its claims
pub fn validate_session_token(
    token: &str,
    secret: &[u8],
) -> Result<SessionClaims, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);

    let token_data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret),
        &validation
    )?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::{Fingerprint, SiweProof};
    use chrono::{Duration, Utc};

    fn session(expires_in: Duration) -> Session {
        let now = Utc::now();
        Session {
            address: "0x71c7656ec7ab88b098defb751b7401b5f6d8976f".to_string(),
            ephemeral_public_key: "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee".to_string(),
            expires_at: now + expires_in,
            proof: SiweProof {
                domain: "chat.example".to_string(),
                uri: "https://chat.example".to_string(),
                chain_id: 1,
                nonce: "abcdefgh1234".to_string(),
                issued_at: now,
            },
            fingerprint: Fingerprint {
                ip_hash: String::new(),
                ua_hash: String::new(),
            },
        }
    }

    #[test]
    fn session_token_carries_delegation() {
        let token = generate_session_token(&session(Duration::minutes(30)), b"secret").unwrap();
        let claims = validate_session_token(&token, b"secret").unwrap();
        assert_eq!(claims.sub, "0x71c7656ec7ab88b098defb751b7401b5f6d8976f");
        assert_eq!(claims.eph, "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee");
    }

    #[test]
    fn session_token_rejects_wrong_secret() {
        let token = generate_session_token(&session(Duration::minutes(30)), b"secret").unwrap();
        assert!(validate_session_token(&token, b"other").is_err());
    }

    #[test]
    fn expired_session_token_is_rejected() {
        let token = generate_session_token(&session(Duration::hours(-2)), b"secret").unwrap();
        assert!(validate_session_token(&token, b"secret").is_err());
    }
}
