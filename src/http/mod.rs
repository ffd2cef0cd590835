//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, body limit)
//!     → cors.rs (CORS headers on every response)
//!     → server.rs relay handler (method dispatch, pipeline)
//!     → response.rs (status, preflight, reply envelope or raw stream)
//!     → Send to client
//! ```

pub mod cors;
pub mod response;
pub mod server;

pub use server::{AppState, HttpServer};
