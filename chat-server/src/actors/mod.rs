// chat-server/src/actors/mod.rs

pub mod chat_session_actor;
pub mod router_actor;
