// common/src/config.rs
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use config::{Config as ConfigFile, File, Environment};

/// Central configuration for the chat server and the delegation core
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server_addr: String,
    pub log_level: String,

    // Login and delegation settings
    pub auth: AuthConfig,

    // Transport-level limits
    pub rate_limit: RateLimitConfig,
}

/// What to do when the client fingerprint at verify time differs from the one
/// recorded when the nonce was issued
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintPolicy {
    Ignore,
    Log,
    Reject,
}

impl Default for FingerprintPolicy {
    fn default() -> Self {
        FingerprintPolicy::Log
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub nonce_ttl_secs: i64,
    pub sweep_interval_secs: u64,
    pub replay_retention_secs: i64,
    pub burst_limit: usize,
    pub burst_window_secs: i64,
    pub replay_capacity_per_address: usize,
    pub fingerprint_policy: FingerprintPolicy,
    /// SIWE domains accepted at verify time; empty accepts any domain
    pub allowed_domains: Vec<String>,
    pub jwt_secret: String,
    pub session_cookie: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub nonce_requests_per_minute: usize,
    pub anonymous_messages_per_minute: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8080".to_string(),
            log_level: "info".to_string(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            nonce_ttl_secs: 30 * 60,
            sweep_interval_secs: 60,
            replay_retention_secs: 5 * 60,
            burst_limit: 10,
            burst_window_secs: 10,
            replay_capacity_per_address: 128,
            fingerprint_policy: FingerprintPolicy::Log,
            allowed_domains: Vec::new(),
            jwt_secret: "dev_secret".to_string(),
            session_cookie: "delegation_session".to_string(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            nonce_requests_per_minute: 20,
            anonymous_messages_per_minute: 30,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        // Get the run mode, defaulting to "development"
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        // Locate the config directory
        let config_dir = env::var("CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                // Check if we're in the project root or a subcrate
                let mut path = PathBuf::from("./config");
                if !path.exists() {
                    path = PathBuf::from("../config");
                }
                path
            });

        tracing::info!("Loading configuration from {}", config_dir.display());
        tracing::info!("Using run mode: {}", run_mode);

        let config = ConfigFile::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", run_mode))).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Environment variables with prefix "APP", e.g. APP__AUTH__NONCE_TTL_SECS
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load from files, falling back to plain environment variables
    pub fn from_env() -> Self {
        match Self::load() {
            Ok(config) => {
                tracing::info!("Configuration loaded from files and environment");
                config
            },
            Err(e) => {
                tracing::warn!("Failed to load configuration from files: {}", e);
                tracing::info!("Falling back to environment variables only");

                let mut config = Self::default();

                if let Ok(addr) = env::var("SERVER_ADDR") {
                    config.server_addr = addr;
                }
                if let Ok(level) = env::var("LOG_LEVEL") {
                    config.log_level = level;
                }
                if let Ok(secret) = env::var("JWT_SECRET") {
                    config.auth.jwt_secret = secret;
                }

                config.auth.nonce_ttl_secs = env::var("NONCE_TTL_SECS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or(config.auth.nonce_ttl_secs);

                config.auth.fingerprint_policy = match env::var("FINGERPRINT_POLICY")
                    .map(|v| v.to_lowercase())
                    .as_deref()
                {
                    Ok("ignore") => FingerprintPolicy::Ignore,
                    Ok("reject") => FingerprintPolicy::Reject,
                    _ => FingerprintPolicy::Log,
                };

                config
            }
        }
    }
}
