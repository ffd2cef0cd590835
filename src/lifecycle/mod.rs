//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Ctrl-C received → Stop accepting → Drain in-flight requests → Exit
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
