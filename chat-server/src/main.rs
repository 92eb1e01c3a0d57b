// chat-server/src/main.rs
use actix::Actor;
use actix_web::{web, App, HttpServer};
use chat_server::actors::router_actor::ChatRouter;
use chat_server::middleware::rate_limiter::RateLimiter;
use common::{setup_tracing, Config};
use delegation::{DelegationService, Sweeper, SystemClock};
use std::sync::Arc;
use std::time::Duration;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration, then install tracing at the configured level
    let config = Config::from_env();
    setup_tracing(&config.log_level);

    let service = DelegationService::builder(config.auth.clone())
        .clock(Arc::new(SystemClock))
        .build()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let service = Arc::new(service);

    // Periodic expiry of nonces, delegations and replay entries
    let _sweeper = Sweeper::new(service.clone()).start();

    // Initialize the chat router actor
    let router = ChatRouter::new().start();

    let server_addr = config.server_addr.clone();
    let nonce_limiter = RateLimiter::new(
        vec!["/auth/nonce".to_string()],
        config.rate_limit.nonce_requests_per_minute,
        Duration::from_secs(60),
    );

    tracing::info!("Starting chat server on {}", server_addr);

    // Create data references
    let service_data = web::Data::from(service);
    let router_data = web::Data::new(router);
    let config_data = web::Data::new(config);

    HttpServer::new(move || {
        App::new()
            .wrap(nonce_limiter.clone())
            .app_data(service_data.clone())
            .app_data(router_data.clone())
            .app_data(config_data.clone())
            .configure(chat_server::configure)
    })
    .bind(&server_addr)?
    .run()
    .await
}
