//! HTTP server setup and the relay handler.
//!
//! # Responsibilities
//! - Create Axum Router with the single relay endpoint
//! - Wire up middleware (request ID, tracing, CORS, body limit, panic recovery)
//! - Run the request pipeline: access → quota → normalize → record → forward → translate
//! - Serve with graceful shutdown

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Method, Request},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use http_body_util::LengthLimitError;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::chat::reply::preview;
use crate::chat::RequestNormalizer;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::http::cors::{self, CorsState};
use crate::http::response;
use crate::observability::metrics;
use crate::resilience::Deadline;
use crate::security::{AccessGuard, QuotaTracker};
use crate::upstream::{ChatUpstream, Completion, UpstreamError, UpstreamForwarder};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub guard: Arc<AccessGuard>,
    pub quota: Arc<QuotaTracker>,
    pub normalizer: Arc<RequestNormalizer>,
    pub upstream: Arc<dyn ChatUpstream>,
    pub upstream_timeout: Duration,
    pub max_body_bytes: usize,
}

/// HTTP server for the chat relay.
pub struct HttpServer {
    router: Router,
    config: RelayConfig,
}

impl HttpServer {
    /// Create a server that forwards to the configured upstream.
    pub fn new(config: RelayConfig) -> Result<Self, UpstreamError> {
        let upstream = Arc::new(UpstreamForwarder::new(&config.upstream)?);
        Ok(Self::with_upstream(config, upstream))
    }

    /// Create a server around any upstream, with an in-memory quota window.
    pub fn with_upstream(config: RelayConfig, upstream: Arc<dyn ChatUpstream>) -> Self {
        let guard = AccessGuard::from_config(&config.access);
        let quota = QuotaTracker::in_memory(&config.quota, guard.privileged_identities().clone());
        Self::from_parts(config, guard, quota, upstream)
    }

    /// Create a server from fully built components.
    pub fn from_parts(
        config: RelayConfig,
        guard: AccessGuard,
        quota: QuotaTracker,
        upstream: Arc<dyn ChatUpstream>,
    ) -> Self {
        let guard = Arc::new(guard);
        let state = AppState {
            guard: guard.clone(),
            quota: Arc::new(quota),
            normalizer: Arc::new(RequestNormalizer::new(config.upstream.default_model.clone())),
            upstream,
            upstream_timeout: Duration::from_secs(config.upstream.timeout_secs),
            max_body_bytes: config.listener.max_body_bytes,
        };
        let cors_state = CorsState::new(guard, &config.cors);

        let router = Self::build_router(&config, state, cors_state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &RelayConfig, state: AppState, cors_state: CorsState) -> Router {
        let [methods, headers, max_age] = cors::static_headers(&config.cors);

        Router::new()
            .route("/", any(relay_handler))
            .route("/{*path}", any(relay_handler))
            .with_state(state)
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(middleware::from_fn_with_state(cors_state, cors::cors_origin_middleware))
            .layer(SetResponseHeaderLayer::overriding(methods.0, methods.1))
            .layer(SetResponseHeaderLayer::overriding(headers.0, headers.1))
            .layer(SetResponseHeaderLayer::overriding(max_age.0, max_age.1))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for serving or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.url,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

/// The relay endpoint. Dispatches on method.
async fn relay_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();

    let response = match method {
        Method::OPTIONS => response::preflight_response(),
        Method::GET => response::status_response(state.upstream.credential_configured()),
        Method::POST => relay_chat(&state, request)
            .await
            .unwrap_or_else(IntoResponse::into_response),
        ref other => RelayError::MethodNotAllowed(other.clone()).into_response(),
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

async fn relay_chat(state: &AppState, request: Request<Body>) -> Result<Response, RelayError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (parts, body) = request.into_parts();

    // 1. Identify and admit the caller
    let caller = state.guard.identify(&parts.headers, peer);
    let admission = state.guard.authorize(&caller).inspect_err(|e| {
        tracing::warn!(
            identity = %caller.identity,
            origin = ?caller.origin,
            key_presented = caller.presented_key,
            "Access denied"
        );
        metrics::record_auth_denied(e.status().as_u16());
    })?;
    tracing::debug!(identity = %caller.identity, admission = ?admission, "Caller admitted");

    // 2. Daily quota
    let decision = state.quota.admit(&caller.identity).await?;

    // 3. Read and normalize the body
    if declared_length(&parts.headers).is_some_and(|len| len > state.max_body_bytes) {
        return Err(RelayError::PayloadTooLarge(state.max_body_bytes));
    }
    let bytes = axum::body::to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|e| body_error(e, state.max_body_bytes))?;
    let chat = state.normalizer.normalize_bytes(&bytes)?;
    tracing::debug!(
        model = %chat.model,
        stream = chat.stream,
        message = %preview(&chat.text, 50),
        "Request normalized"
    );

    // 4. Charge the request before the upstream call
    state.quota.record(&caller.identity).await;

    // 5. Forward under the deadline
    let deadline = Deadline::after(state.upstream_timeout);
    let completion = state.upstream.complete(&chat, deadline).await?;
    if let Completion::Reply(text) = &completion {
        tracing::debug!(reply = %preview(text, 100), "Upstream reply received");
    }

    tracing::info!(
        identity = %caller.identity,
        model = %chat.model,
        remaining = decision.remaining.saturating_sub(1),
        "Chat relayed"
    );

    // 6. Translate
    Ok(response::completion_response(completion, &chat.model))
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn body_error(err: axum::Error, limit: usize) -> RelayError {
    let source = err.into_inner();
    if source.downcast_ref::<LengthLimitError>().is_some() {
        return RelayError::PayloadTooLarge(limit);
    }
    tracing::debug!(error = %source, "Failed to read request body");
    RelayError::Validation("request body could not be read".into())
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| err.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic payload".to_string());
    RelayError::Internal(format!("handler panicked: {detail}")).into_response()
}
