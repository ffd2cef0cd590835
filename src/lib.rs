//! Chat relay library.
//!
//! A small HTTP mediation layer in front of a chat-completion service:
//! callers are admitted by origin or pre-shared key, held to daily quotas,
//! and their legacy request shapes are normalized before forwarding.

pub mod chat;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod upstream;

pub use config::RelayConfig;
pub use error::RelayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
