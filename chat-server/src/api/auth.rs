// chat-server/src/api/auth.rs
use actix::Addr;
use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder, cookie::{Cookie, SameSite}};
use actix_web::cookie::time::Duration as CookieDuration;
use actix_web::http::header;
use common::{
    generate_session_token, validate_session_token, Config, SessionClaims, SessionResponse,
};
use delegation::{eth, ClientContext, DelegationService, ErrorKind, SiweMessage};
use serde::Deserialize;
use serde_json::json;
use crate::actors::router_actor::{ChatRouter, ConnectedCount};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceRequest {
    pub ephemeral_public_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub signature: String,
    pub siwe_message: String,
    #[serde(default)]
    pub address: Option<String>,
}

/// IP and User-Agent of the caller, as seen behind any proxy headers
pub fn client_context(req: &HttpRequest) -> ClientContext {
    let ip = req.connection_info().realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();
    let user_agent = req.headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    ClientContext::new(ip, user_agent)
}

/// Claims from a valid session cookie, if the request carries one
pub fn session_claims(req: &HttpRequest, config: &Config) -> Option<SessionClaims> {
    let cookie = req.cookie(&config.auth.session_cookie)?;
    match validate_session_token(cookie.value(), config.auth.jwt_secret.as_bytes()) {
        Ok(claims) => Some(claims),
        Err(e) => {
            tracing::debug!("Ignoring invalid session cookie: {}", e);
            None
        }
    }
}

fn login_failed(kind: ErrorKind) -> HttpResponse {
    HttpResponse::Unauthorized().json(json!({
        "success": false,
        "error": kind
    }))
}

#[post("/nonce")]
pub async fn request_nonce(
    req: HttpRequest,
    body: web::Json<NonceRequest>,
    service: web::Data<DelegationService>,
) -> impl Responder {
    let context = client_context(&req);

    match service.generate_nonce(&body.ephemeral_public_key, &context) {
        Ok(grant) => HttpResponse::Ok().json(grant),
        Err(e) => {
            tracing::debug!("Nonce request refused: {}", e);
            HttpResponse::BadRequest().json(json!({
                "error": e.kind()
            }))
        }
    }
}

#[post("/verify")]
pub async fn verify_login(
    req: HttpRequest,
    body: web::Json<VerifyRequest>,
    service: web::Data<DelegationService>,
    config: web::Data<Config>,
) -> impl Responder {
    // A claimed address that disagrees with the signed message is refused
    // before the nonce is touched
    if let Some(claimed) = body.address.as_deref().filter(|a| !a.is_empty()) {
        let signed_for = body.siwe_message.parse::<SiweMessage>().ok()
            .and_then(|m| eth::normalize_address(&m.address));
        if let Some(signed_for) = signed_for {
            if eth::normalize_address(claimed).as_deref() != Some(signed_for.as_str()) {
                tracing::warn!(
                    "Login body address {} differs from signed address {}",
                    claimed,
                    signed_for
                );
                return login_failed(ErrorKind::BadSignature);
            }
        }
    }

    let context = client_context(&req);
    let login = match service.verify(&context, &body.signature, &body.siwe_message) {
        Ok(login) => login,
        Err(e) => return login_failed(e.kind()),
    };

    let token = match generate_session_token(&login.session, config.auth.jwt_secret.as_bytes()) {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("Failed to issue session token: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": ErrorKind::VerificationFailed
            }));
        }
    };

    let max_age = (login.session.expires_at - chrono::Utc::now()).num_seconds().max(0);
    let cookie = Cookie::build(config.auth.session_cookie.clone(), token)
        .path("/")
        .secure(true)
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(CookieDuration::seconds(max_age))
        .finish();

    HttpResponse::Ok()
        .cookie(cookie)
        .json(json!({
            "success": true,
            "address": login.address,
            "delegation": login.delegation
        }))
}

// End the delegation behind the session cookie, if any, and clear the cookie
#[post("/logout")]
pub async fn logout(
    req: HttpRequest,
    service: web::Data<DelegationService>,
    config: web::Data<Config>,
) -> impl Responder {
    let revoked = session_claims(&req, &config)
        .and_then(|claims| service.revoke(&claims.sub))
        .is_some();

    let cookie = Cookie::build(config.auth.session_cookie.clone(), "")
        .path("/")
        .max_age(CookieDuration::seconds(0))
        .finish();

    HttpResponse::Ok()
        .cookie(cookie)
        .json(json!({
            "success": true,
            "revoked": revoked
        }))
}

#[get("/session")]
pub async fn current_session(
    req: HttpRequest,
    service: web::Data<DelegationService>,
    config: web::Data<Config>,
) -> impl Responder {
    let claims = match session_claims(&req, &config) {
        Some(claims) => claims,
        None => {
            return HttpResponse::Unauthorized().json(json!({
                "error": "NoSession"
            }));
        }
    };

    // The cookie outlives a revoked or rotated delegation
    match service.delegation(&claims.sub) {
        Some(delegation) if delegation.ephemeral_public_key == claims.eph => {
            HttpResponse::Ok().json(SessionResponse {
                address: delegation.address,
                ephemeral_public_key: delegation.ephemeral_public_key,
                expires_at: delegation.expires_at,
                counter: delegation.counter,
            })
        }
        _ => HttpResponse::Unauthorized().json(json!({
            "error": ErrorKind::NoDelegation
        })),
    }
}

#[get("/health")]
pub async fn health(
    service: web::Data<DelegationService>,
    router: web::Data<Addr<ChatRouter>>,
) -> impl Responder {
    let connections = match router.send(ConnectedCount).await {
        Ok(count) => count,
        Err(e) => {
            tracing::error!("Chat router unavailable: {}", e);
            return HttpResponse::ServiceUnavailable().json(json!({
                "status": "degraded"
            }));
        }
    };

    HttpResponse::Ok().json(json!({
        "status": "ok",
        "connections": connections,
        "state": service.stats()
    }))
}
