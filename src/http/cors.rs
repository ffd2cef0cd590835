//! CORS response headers.
//!
//! # Responsibilities
//! - Attach the full CORS header set to every response, including errors,
//!   preflights and recovered panics
//! - Echo the caller's origin when it is on the allow-list, otherwise send
//!   the configured default
//!
//! # Design Decisions
//! - Headers are set by outer layers, so no handler path can forget them
//! - Preflight answers come from the relay handler (204), not from a CORS layer

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

use crate::config::CorsConfig;
use crate::security::AccessGuard;

pub const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
pub const ALLOWED_HEADERS: &str = "Content-Type, Authorization, X-API-Key, Origin";

/// State for the origin-echo middleware.
#[derive(Clone)]
pub struct CorsState {
    guard: Arc<AccessGuard>,
    default_origin: HeaderValue,
}

impl CorsState {
    pub fn new(guard: Arc<AccessGuard>, config: &CorsConfig) -> Self {
        let default_origin = HeaderValue::from_str(&config.default_origin).unwrap_or_else(|_| {
            tracing::warn!(origin = %config.default_origin, "Invalid default CORS origin, using *");
            HeaderValue::from_static("*")
        });
        Self {
            guard,
            default_origin,
        }
    }

    /// The `Access-Control-Allow-Origin` value for a request origin.
    pub fn allow_origin_for(&self, origin: Option<&HeaderValue>) -> (HeaderValue, bool) {
        match origin {
            Some(value)
                if value
                    .to_str()
                    .is_ok_and(|o| self.guard.is_origin_allowed(o)) =>
            {
                (value.clone(), true)
            }
            _ => (self.default_origin.clone(), false),
        }
    }
}

/// Headers that do not depend on the request.
pub fn static_headers(config: &CorsConfig) -> [(HeaderName, HeaderValue); 3] {
    [
        (
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        ),
        (
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        ),
        (
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from(config.max_age_secs),
        ),
    ]
}

/// Middleware setting `Access-Control-Allow-Origin` on every response.
pub async fn cors_origin_middleware(
    State(cors): State<CorsState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let origin = request.headers().get(header::ORIGIN).cloned();
    let mut response = next.run(request).await;

    let (allow_origin, echoed) = cors.allow_origin_for(origin.as_ref());
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
    if echoed {
        headers.append(header::VARY, HeaderValue::from_static("origin"));
    }
    response
}
