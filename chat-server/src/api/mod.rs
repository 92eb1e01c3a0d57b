// chat-server/src/api/mod.rs
pub mod auth;

pub fn configure(cfg: &mut actix_web::web::ServiceConfig) {
    cfg.service(
        actix_web::web::scope("/auth")
            .service(auth::request_nonce)
            .service(auth::verify_login)
            .service(auth::logout)
            .service(auth::current_session)
    )
    .service(auth::health);
}
