//! Upstream completion service access.
//!
//! # Data Flow
//! ```text
//! ChatRequest + Deadline
//!     → forwarder.rs (payload, bearer credential, deadline-bound POST)
//!     → non-stream: JSON body → reply text
//!     → stream, passthrough: upstream bytes handed to the caller untouched
//!     → stream, buffered (legacy): sse.rs reassembles `data:` events into text
//! ```
//!
//! # Design Decisions
//! - The HTTP layer only sees the [`ChatUpstream`] trait
//! - Timeouts are reported separately from upstream HTTP errors
//! - Error bodies are truncated before they can reach the caller

pub mod forwarder;
pub mod sse;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderValue, StatusCode};
use bytes::Bytes;
use futures_util::Stream;

use crate::chat::ChatRequest;
use crate::resilience::Deadline;

pub use forwarder::{UpstreamForwarder, UpstreamMessage, UpstreamPayload};
pub use sse::SseAccumulator;

/// Body stream handed to the client in passthrough mode.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Upstream failure modes.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream credential is not configured")]
    MissingCredential,

    #[error("upstream returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("upstream request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("upstream reply was not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),
}

/// What the upstream produced for one request.
pub enum Completion {
    /// Complete reply text.
    Reply(String),
    /// Live byte stream with the upstream's content type.
    Stream {
        content_type: HeaderValue,
        body: ByteStream,
    },
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Completion::Reply(text) => f.debug_tuple("Reply").field(text).finish(),
            Completion::Stream { content_type, .. } => f
                .debug_struct("Stream")
                .field("content_type", content_type)
                .finish_non_exhaustive(),
        }
    }
}

/// A chat completion service.
#[async_trait]
pub trait ChatUpstream: Send + Sync {
    /// Whether a credential is available for upstream calls.
    fn credential_configured(&self) -> bool;

    /// Complete `request`, finishing before `deadline`.
    async fn complete(
        &self,
        request: &ChatRequest,
        deadline: Deadline,
    ) -> Result<Completion, UpstreamError>;
}
