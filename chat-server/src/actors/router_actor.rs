// chat-server/src/actors/router_actor.rs
use actix::{Actor, Addr, Context, Handler, Message, MessageResult};
use common::ChatBroadcast;
use dashmap::DashMap;
use uuid::Uuid;
use super::chat_session_actor::ChatSession;

/// Message for session registration
#[derive(Message)]
#[rtype(result = "()")]
pub struct Join {
    pub client_id: Uuid,
    pub addr: Addr<ChatSession>,
}

/// Message for session unregistration
#[derive(Message)]
#[rtype(result = "()")]
pub struct Leave {
    pub client_id: Uuid,
}

/// Number of open chat sockets
#[derive(Message)]
#[rtype(result = "usize")]
pub struct ConnectedCount;

/// Fans accepted chat messages out to every connected session
pub struct ChatRouter {
    sessions: DashMap<Uuid, Addr<ChatSession>>,
}

impl Default for ChatRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatRouter {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }
}

impl Actor for ChatRouter {
    type Context = Context<Self>;
}

impl Handler<Join> for ChatRouter {
    type Result = ();

    fn handle(&mut self, msg: Join, _ctx: &mut Self::Context) -> Self::Result {
        self.sessions.insert(msg.client_id, msg.addr);
        tracing::debug!("Session {} joined, {} connected", msg.client_id, self.sessions.len());
    }
}

impl Handler<Leave> for ChatRouter {
    type Result = ();

    fn handle(&mut self, msg: Leave, _ctx: &mut Self::Context) -> Self::Result {
        self.sessions.remove(&msg.client_id);
        tracing::debug!("Session {} left, {} connected", msg.client_id, self.sessions.len());
    }
}

impl Handler<ChatBroadcast> for ChatRouter {
    type Result = ();

    fn handle(&mut self, msg: ChatBroadcast, _ctx: &mut Self::Context) -> Self::Result {
        tracing::debug!(
            "Broadcasting message {} from {} to {} sessions",
            msg.counter,
            msg.address,
            self.sessions.len()
        );

        for session in self.sessions.iter() {
            session.value().do_send(msg.clone());
        }
    }
}

impl Handler<ConnectedCount> for ChatRouter {
    type Result = MessageResult<ConnectedCount>;

    fn handle(&mut self, _msg: ConnectedCount, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.sessions.len())
    }
}
