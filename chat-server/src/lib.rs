// chat-server/src/lib.rs
pub mod actors;
pub mod api;
pub mod middleware;
pub mod routing;

use actix_web::web;

/// Register the login API, health check and chat socket
pub fn configure(cfg: &mut web::ServiceConfig) {
    api::configure(cfg);
    routing::routes(cfg);
}
