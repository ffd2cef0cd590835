//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → environment overrides (credential, bind address, default model)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the access policy never changes at runtime
//! - All fields have defaults to allow minimal configs
//! - Secrets come from the environment so config files can be committed
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_from_env, ConfigError};
pub use schema::RelayConfig;
pub use schema::{
    AccessConfig, CorsConfig, ListenerConfig, ObservabilityConfig, QuotaConfig, StreamMode,
    UpstreamConfig,
};
