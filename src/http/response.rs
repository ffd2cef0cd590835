//! Response construction for the relay endpoint.
//!
//! # Responsibilities
//! - Turn an upstream completion into the client envelope
//! - Stream passthrough bodies without buffering
//! - Build preflight and status responses
//!
//! CORS headers are added by the outer layers, not here.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::chat::reply::now_iso;
use crate::chat::ChatReply;
use crate::upstream::{ByteStream, Completion};

/// Body of `GET`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusEnvelope {
    pub status: &'static str,
    pub timestamp: String,
    pub credential_configured: bool,
    pub version: &'static str,
}

pub fn status_response(credential_configured: bool) -> Response {
    Json(StatusEnvelope {
        status: "running",
        timestamp: now_iso(),
        credential_configured,
        version: env!("CARGO_PKG_VERSION"),
    })
    .into_response()
}

/// `OPTIONS` answer: no body.
pub fn preflight_response() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

pub fn completion_response(completion: Completion, model: &str) -> Response {
    match completion {
        Completion::Reply(text) => Json(ChatReply::new(text, model)).into_response(),
        Completion::Stream { content_type, body } => stream_response(content_type, body),
    }
}

fn stream_response(content_type: HeaderValue, body: ByteStream) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .header("x-accel-buffering", "no")
        .body(Body::from_stream(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_reply_envelope() {
        let response = completion_response(Completion::Reply("hi".into()), "bot");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["text"], "hi");
        assert_eq!(json["model"], "bot");
    }

    #[tokio::test]
    async fn test_stream_bytes_untouched() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"a\":1}\n\n")),
            Ok(Bytes::from_static(b"data: [DONE]\n\n")),
        ];
        let body: ByteStream = Box::pin(futures_util::stream::iter(chunks));
        let response = completion_response(
            Completion::Stream {
                content_type: HeaderValue::from_static("text/event-stream; charset=utf-8"),
                body,
            },
            "bot",
        );
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream; charset=utf-8"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"data: {\"a\":1}\n\ndata: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_preflight_has_no_body() {
        let response = preflight_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }
}
