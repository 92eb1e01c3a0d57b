// chat-server/src/actors/chat_session_actor.rs
use actix::{Actor, ActorContext, Addr, AsyncContext, Handler, StreamHandler};
use actix_web_actors::ws;
use common::{ChatBroadcast, ChatFrame, ServerEvent};
use delegation::{DelegationService, ANON_ADDRESS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;
use super::router_actor::{ChatRouter, Join, Leave};
use crate::middleware::rate_limiter::SlidingWindow;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport-level admission for one socket, applied before validation
pub struct FrameGate {
    bound_address: Option<String>,
    anonymous: SlidingWindow,
}

impl FrameGate {
    pub fn new(bound_address: Option<String>, anonymous_per_minute: usize) -> Self {
        Self {
            bound_address: bound_address.map(|a| a.to_lowercase()),
            anonymous: SlidingWindow::new(anonymous_per_minute, Duration::from_secs(60)),
        }
    }

    /// A socket bound to a login may only speak as that address or anonymously
    pub fn admit(&mut self, frame: &ChatFrame, now: Instant) -> Result<(), &'static str> {
        if frame.address == ANON_ADDRESS {
            if !self.anonymous.try_acquire(now) {
                return Err("Flood");
            }
            return Ok(());
        }

        match &self.bound_address {
            Some(bound) if *bound != frame.address.trim().to_lowercase() => Err("AddressMismatch"),
            _ => Ok(()),
        }
    }
}

/// Actor managing one chat WebSocket connection
pub struct ChatSession {
    client_id: Uuid,
    service: Arc<DelegationService>,
    router: Addr<ChatRouter>,
    gate: FrameGate,
    last_heartbeat: Instant,
}

impl ChatSession {
    pub fn new(
        client_id: Uuid,
        service: Arc<DelegationService>,
        router: Addr<ChatRouter>,
        gate: FrameGate,
    ) -> Self {
        Self {
            client_id,
            service,
            router,
            gate,
            last_heartbeat: Instant::now(),
        }
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                tracing::warn!("Chat client heartbeat timeout: {}", act.client_id);
                ctx.stop();
                return;
            }

            ctx.ping(b"");
        });
    }

    fn send_event(&self, event: &ServerEvent, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::to_string(event) {
            Ok(json) => ctx.text(json),
            Err(e) => tracing::error!("Failed to serialize server event: {}", e),
        }
    }

    fn reject(&self, reason: &str, counter: u64, ctx: &mut ws::WebsocketContext<Self>) {
        self.send_event(&ServerEvent::Rejected {
            reason: reason.to_string(),
            counter,
        }, ctx);
    }

    fn handle_frame(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let frame: ChatFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("Unparseable frame from {}: {}", self.client_id, e);
                self.reject("MalformedFrame", 0, ctx);
                return;
            }
        };

        if let Err(reason) = self.gate.admit(&frame, Instant::now()) {
            tracing::warn!("Frame from {} refused at admission: {}", self.client_id, reason);
            self.reject(reason, frame.counter, ctx);
            return;
        }

        let validation = self.service.validate(&frame);
        match validation.reason {
            None => {
                self.router.do_send(ChatBroadcast {
                    address: frame.address,
                    message: frame.message,
                    counter: frame.counter,
                    timestamp: std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_secs(),
                });
            }
            Some(reason) => {
                self.reject(reason.as_str(), frame.counter, ctx);
            }
        }
    }
}

impl Actor for ChatSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("Chat client connected: {}", self.client_id);
        self.last_heartbeat = Instant::now();
        self.heartbeat(ctx);

        self.router.do_send(Join {
            client_id: self.client_id,
            addr: ctx.address(),
        });

        self.send_event(&ServerEvent::Connected {
            client_id: self.client_id,
            address: self.gate.bound_address.clone(),
        }, ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("Chat client disconnected: {}", self.client_id);
        self.router.do_send(Leave {
            client_id: self.client_id,
        });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ChatSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&msg);
            },
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            },
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.handle_frame(&text, ctx);
            },
            Ok(ws::Message::Close(reason)) => {
                tracing::info!("Chat client closing connection: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            },
            Err(e) => {
                tracing::warn!("Protocol error from {}: {}", self.client_id, e);
                ctx.stop();
            },
            _ => (),
        }
    }
}

impl Handler<ChatBroadcast> for ChatSession {
    type Result = ();

    fn handle(&mut self, msg: ChatBroadcast, ctx: &mut Self::Context) -> Self::Result {
        self.send_event(&ServerEvent::Message(msg), ctx);
    }
}
