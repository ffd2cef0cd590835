//! Chat relay server.
//!
//! ```text
//!     Browser / script                ┌──────────────────────────────────────────┐
//!     ────────────────────────────────▶  http::server (request ID, trace, CORS) │
//!                                     │      │                                   │
//!                                     │      ▼                                   │
//!                                     │  security::access_control → quota       │
//!                                     │      │                                   │
//!                                     │      ▼                                   │
//!                                     │  chat::request (shape A / shape B)       │
//!                                     │      │                                   │
//!                                     │      ▼                                   │
//!     ◀───────────────────────────────│  upstream::forwarder ──────────────────────▶ completion
//!        JSON envelope or raw stream  │  (deadline, passthrough / buffered)      │     service
//!                                     └──────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use chat_relay::config::{load_config, load_from_env};
use chat_relay::observability::{logging, metrics};
use chat_relay::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(about = "Access-controlled relay in front of a chat completion service", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults plus environment when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => load_from_env()?,
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "chat-relay starting");

    if !config.upstream.credential_configured() {
        tracing::warn!("No upstream credential configured; chat requests will fail");
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.url,
        default_model = %config.upstream.default_model,
        stream_mode = ?config.upstream.stream_mode,
        enforce = config.access.enforce,
        per_identity_daily = config.quota.per_identity_daily,
        global_daily = config.quota.global_daily,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        result = &mut server_task => result??,
        signal = shutdown.on_ctrl_c() => {
            signal?;
            server_task.await??;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
