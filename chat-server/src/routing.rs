// chat-server/src/routing.rs
use actix_web::{web, HttpRequest, HttpResponse, Error};
use actix_web_actors::ws;
use actix::Addr;
use common::Config;
use delegation::DelegationService;
use uuid::Uuid;

use crate::actors::{
    chat_session_actor::{ChatSession, FrameGate},
    router_actor::ChatRouter,
};
use crate::api::auth::session_claims;

/// Configure routes for the chat socket
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/ws/chat")
            .route(web::get().to(chat_ws_route))
    );
}

/// WebSocket route for chat connections. A valid session cookie binds the
/// socket to the logged-in address; without one the socket is unbound.
async fn chat_ws_route(
    req: HttpRequest,
    stream: web::Payload,
    service: web::Data<DelegationService>,
    router: web::Data<Addr<ChatRouter>>,
    config: web::Data<Config>,
) -> Result<HttpResponse, Error> {
    let client_id = Uuid::new_v4();
    let bound_address = session_claims(&req, &config).map(|claims| claims.sub);

    tracing::debug!("Opening chat socket {} bound to {:?}", client_id, bound_address);

    let gate = FrameGate::new(bound_address, config.rate_limit.anonymous_messages_per_minute);
    let session = ChatSession::new(
        client_id,
        service.into_inner(),
        router.get_ref().clone(),
        gate,
    );

    ws::start(session, &req, stream)
}
