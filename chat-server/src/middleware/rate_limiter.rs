// chat-server/src/middleware/rate_limiter.rs
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header,
    Error, ResponseError,
    HttpResponse
};
use dashmap::DashMap;
use futures_util::future::{LocalBoxFuture, Ready, ready};

// Tracked clients before idle windows are pruned
const PRUNE_THRESHOLD: usize = 1024;

/// Sliding-window counter: at most `limit` hits in any `window`
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    limit: usize,
    window: Duration,
    hits: VecDeque<Instant>,
}

impl SlidingWindow {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: VecDeque::new(),
        }
    }

    fn expire(&mut self, now: Instant) {
        while self.hits.front().is_some_and(|t| now.duration_since(*t) >= self.window) {
            self.hits.pop_front();
        }
    }

    /// Record a hit if the window has room
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.expire(now);
        if self.hits.len() >= self.limit {
            return false;
        }
        self.hits.push_back(now);
        true
    }

    pub fn is_idle(&mut self, now: Instant) -> bool {
        self.expire(now);
        self.hits.is_empty()
    }
}

// Custom error for rate limiting
#[derive(Debug)]
struct RateLimitExceeded {
    retry_after: Duration,
}

impl fmt::Display for RateLimitExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rate limit exceeded")
    }
}

impl ResponseError for RateLimitExceeded {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::TooManyRequests()
            .append_header((header::RETRY_AFTER, self.retry_after.as_secs().to_string()))
            .json(serde_json::json!({
                "error": "RateLimited"
            }))
    }
}

/// Per-IP limiter for the listed path prefixes
#[derive(Debug, Clone)]
pub struct RateLimiter {
    paths: Vec<String>,
    limit: usize,
    window: Duration,
    store: Arc<DashMap<String, SlidingWindow>>,
}

impl RateLimiter {
    pub fn new(paths: Vec<String>, limit: usize, window: Duration) -> Self {
        Self {
            paths,
            limit,
            window,
            store: Arc::new(DashMap::new()),
        }
    }

    fn is_rate_limited(&self, ip: &str) -> bool {
        let now = Instant::now();

        if self.store.len() > PRUNE_THRESHOLD {
            self.store.retain(|_, window| !window.is_idle(now));
        }

        let allowed = self
            .store
            .entry(ip.to_string())
            .or_insert_with(|| SlidingWindow::new(self.limit, self.window))
            .try_acquire(now);
        !allowed
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimiter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RateLimiterMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimiterMiddleware {
            service,
            limiter: self.clone(),
        }))
    }
}

pub struct RateLimiterMiddleware<S> {
    service: S,
    limiter: RateLimiter,
}

impl<S, B> Service<ServiceRequest> for RateLimiterMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<ServiceResponse<B>, Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Check if this path should be rate limited
        let should_rate_limit =
            self.limiter.paths.iter().any(|p| req.path().starts_with(p.as_str()));

        if should_rate_limit {
            let ip = req.connection_info().realip_remote_addr()
                .unwrap_or("unknown")
                .to_string();

            if self.limiter.is_rate_limited(&ip) {
                tracing::warn!("Rate limit exceeded for IP: {} on {}", ip, req.path());

                let retry_after = self.limiter.window;
                return Box::pin(async move {
                    Err(RateLimitExceeded { retry_after }.into())
                });
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            fut.await
        })
    }
}
