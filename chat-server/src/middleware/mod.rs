// chat-server/src/middleware/mod.rs
pub mod rate_limiter;
