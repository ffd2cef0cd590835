//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once at startup
//! - Configure log level from config, overridable with `RUST_LOG`

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter for a configured level, e.g. `chat_relay=info,tower_http=info`.
pub fn default_filter(level: &str) -> String {
    format!("chat_relay={level},tower_http={level}")
}

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {e}");
    }
}
