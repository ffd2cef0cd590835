//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → timeouts.rs (one deadline bounds the whole exchange)
//!     → On expiry: in-flight future dropped, TimeoutError surfaced
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - No retries on any path; chat completions are not idempotent

pub mod timeouts;

pub use timeouts::Deadline;
