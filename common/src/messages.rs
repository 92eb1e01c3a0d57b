// common/src/messages.rs
use actix::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Chat frame submitted by a client over the real-time socket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatFrame {
    pub message: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub counter: u64,
    pub address: String,
}

/// Accepted chat message fanned out to every connected client
#[derive(Debug, Clone, Serialize, Deserialize, Message)]
#[rtype(result = "()")]
pub struct ChatBroadcast {
    pub address: String,
    pub message: String,
    pub counter: u64,
    pub timestamp: u64,
}

/// Events the server writes back to a chat socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected {
        client_id: Uuid,
        address: Option<String>,
    },
    Message(ChatBroadcast),
    Rejected {
        reason: String,
        counter: u64,
    },
}
