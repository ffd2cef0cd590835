//! Request forwarding to the upstream completion service.
//!
//! The whole exchange (headers and body) runs against one [`Deadline`]. When it
//! passes, the in-flight future is dropped, which closes the upstream connection.

use std::time::Instant;

use async_trait::async_trait;
use axum::http::{header, HeaderValue};
use futures_util::{StreamExt, TryStreamExt};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::chat::reply::preview;
use crate::chat::{extract_reply_text, ChatRequest};
use crate::config::{StreamMode, UpstreamConfig};
use crate::observability::metrics;
use crate::resilience::Deadline;
use crate::upstream::sse::SseAccumulator;
use crate::upstream::{ByteStream, ChatUpstream, Completion, UpstreamError};

/// Body sent to the upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamPayload {
    pub model: String,
    pub messages: Vec<UpstreamMessage>,
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamMessage {
    pub role: &'static str,
    pub content: String,
}

impl From<&ChatRequest> for UpstreamPayload {
    fn from(request: &ChatRequest) -> Self {
        Self {
            model: request.model.clone(),
            messages: vec![UpstreamMessage {
                role: "user",
                content: request.text.clone(),
            }],
            stream: request.stream,
        }
    }
}

/// HTTP client for the upstream completion endpoint.
#[derive(Clone)]
pub struct UpstreamForwarder {
    client: Client,
    url: String,
    api_key: Option<String>,
    stream_mode: StreamMode,
    error_body_limit: usize,
}

impl UpstreamForwarder {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .user_agent(concat!("chat-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(UpstreamError::Transport)?;

        Ok(Self {
            client,
            url: config.url.clone(),
            api_key: config
                .api_key
                .clone()
                .filter(|key| !key.trim().is_empty()),
            stream_mode: config.stream_mode,
            error_body_limit: config.error_body_limit,
        })
    }

    async fn read_reply(
        &self,
        response: reqwest::Response,
        deadline: Deadline,
    ) -> Result<String, UpstreamError> {
        let bytes = deadline
            .run(response.bytes())
            .await
            .map_err(|_| UpstreamError::Timeout(deadline.budget()))?
            .map_err(UpstreamError::Transport)?;
        let completion: Value = serde_json::from_slice(&bytes)?;
        Ok(extract_reply_text(&completion))
    }

    async fn reassemble(
        &self,
        response: reqwest::Response,
        deadline: Deadline,
    ) -> Result<String, UpstreamError> {
        let collect = async {
            let mut stream = std::pin::pin!(response.bytes_stream());
            let mut events = SseAccumulator::new();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(UpstreamError::Transport)?;
                if events.push(&chunk) {
                    break;
                }
            }
            Ok::<_, UpstreamError>(events.finish())
        };
        deadline
            .run(collect)
            .await
            .map_err(|_| UpstreamError::Timeout(deadline.budget()))?
    }
}

/// Hand the upstream body to the caller as-is, ending it when `deadline` passes.
fn passthrough(response: reqwest::Response, deadline: Deadline) -> ByteStream {
    let expiry = deadline.expiry();
    let cut = async move {
        expiry.await;
        warn!(budget = ?deadline.budget(), "Upstream stream cut at deadline");
        metrics::record_upstream_timeout();
    };
    Box::pin(
        response
            .bytes_stream()
            .map_err(std::io::Error::other)
            .take_until(cut),
    )
}

#[async_trait]
impl ChatUpstream for UpstreamForwarder {
    fn credential_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip(self, request, deadline), fields(model = %request.model, stream = request.stream))]
    async fn complete(
        &self,
        request: &ChatRequest,
        deadline: Deadline,
    ) -> Result<Completion, UpstreamError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(UpstreamError::MissingCredential)?;
        let payload = UpstreamPayload::from(request);
        let accept = if request.stream {
            "text/event-stream"
        } else {
            "application/json"
        };

        debug!(url = %self.url, "Calling upstream");
        let start = Instant::now();

        let send = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .header(header::ACCEPT, accept)
            .json(&payload)
            .send();

        let response = match deadline.run(send).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                metrics::record_upstream("transport_error", start);
                return Err(UpstreamError::Transport(e));
            }
            Err(_) => {
                metrics::record_upstream("timeout", start);
                metrics::record_upstream_timeout();
                return Err(UpstreamError::Timeout(deadline.budget()));
            }
        };

        let status = response.status();
        debug!(status = %status, "Upstream responded");

        if !status.is_success() {
            metrics::record_upstream("http_error", start);
            let body = deadline
                .run(response.text())
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default();
            return Err(UpstreamError::Status {
                status,
                body: preview(&body, self.error_body_limit).to_string(),
            });
        }

        if !request.stream {
            let text = self.read_reply(response, deadline).await;
            metrics::record_upstream(if text.is_ok() { "ok" } else { "read_error" }, start);
            return text.map(Completion::Reply);
        }

        match self.stream_mode {
            StreamMode::Passthrough => {
                metrics::record_upstream("stream_opened", start);
                let content_type = response
                    .headers()
                    .get(header::CONTENT_TYPE)
                    .cloned()
                    .unwrap_or_else(|| HeaderValue::from_static("text/event-stream"));
                Ok(Completion::Stream {
                    content_type,
                    body: passthrough(response, deadline),
                })
            }
            StreamMode::Buffered => {
                let text = self.reassemble(response, deadline).await;
                metrics::record_upstream(if text.is_ok() { "ok" } else { "read_error" }, start);
                text.map(Completion::Reply)
            }
        }
    }
}
