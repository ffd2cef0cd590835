//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → access_control.rs (identify caller, admit by origin / key / privilege)
//!     → quota.rs (check daily caps for the identity)
//!     → Pass to normalization and forwarding
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input; forwarded-for headers only when configured
//! - Privileged identities bypass both stages

pub mod access_control;
pub mod quota;

pub use access_control::{AccessGuard, Admission, Caller};
pub use quota::{Clock, InMemoryQuotaStore, QuotaDecision, QuotaStore, QuotaTracker, SystemClock};
