//! Chat domain types.
//!
//! # Data Flow
//! ```text
//! POST body (shape A or B)
//!     → request.rs (shape detection, ChatRequest)
//!     → [upstream forwarder]
//!     → reply.rs (text extraction, ChatReply envelope)
//! ```

pub mod reply;
pub mod request;

pub use reply::{extract_reply_text, ChatReply, EMPTY_REPLY_PLACEHOLDER};
pub use request::{ChatRequest, LegacyRequest, RequestNormalizer};
