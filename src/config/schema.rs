//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Root configuration for the chat relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Upstream completion service settings.
    pub upstream: UpstreamConfig,

    /// Caller admission policy.
    pub access: AccessConfig,

    /// Daily usage caps.
    pub quota: QuotaConfig,

    /// CORS response headers.
    pub cors: CorsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// How a `stream: true` request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// Forward upstream bytes to the caller as they arrive.
    #[default]
    Passthrough,
    /// Legacy: collect the whole event stream and answer with one JSON reply.
    Buffered,
}

/// Upstream completion service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Full URL of the chat completions endpoint.
    pub url: String,

    /// Bearer credential. Usually supplied through the environment.
    pub api_key: Option<String>,

    /// Model used when the caller names none.
    pub default_model: String,

    /// Hard wall-clock deadline for one upstream exchange, in seconds.
    pub timeout_secs: u64,

    /// Strategy for streamed requests.
    pub stream_mode: StreamMode,

    /// Number of characters of an upstream error body echoed to the caller.
    pub error_body_limit: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "https://api.poe.com/v1/chat/completions".to_string(),
            api_key: None,
            default_model: "Claude-3-Haiku-20240307".to_string(),
            timeout_secs: 60,
            stream_mode: StreamMode::Passthrough,
            error_body_limit: 200,
        }
    }
}

impl UpstreamConfig {
    /// True when a non-blank credential is present.
    pub fn credential_configured(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

/// Caller admission policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessConfig {
    /// When false every caller is admitted (quotas still apply).
    pub enforce: bool,

    /// Header carrying the pre-shared key.
    pub key_header: String,

    /// Origins allowed to call the relay. `*` admits any origin.
    pub allowed_origins: BTreeSet<String>,

    /// Pre-shared key -> label. The label becomes the caller identity.
    pub preshared_keys: BTreeMap<String, String>,

    /// Identities exempt from both the access check and quotas.
    pub privileged_identities: BTreeSet<String>,

    /// Derive identity from `X-Forwarded-For` / `X-Real-IP`.
    pub trust_forwarded_for: bool,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            enforce: true,
            key_header: "x-api-key".to_string(),
            allowed_origins: BTreeSet::new(),
            preshared_keys: BTreeMap::new(),
            privileged_identities: BTreeSet::new(),
            trust_forwarded_for: false,
        }
    }
}

/// Daily usage caps.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Requests per identity per calendar day.
    pub per_identity_daily: u32,

    /// Requests across all identities per calendar day.
    pub global_daily: u32,

    /// Offset from UTC, in hours, of the calendar used for the day boundary.
    pub utc_offset_hours: i32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            per_identity_daily: 50,
            global_daily: 1000,
            utc_offset_hours: 8,
        }
    }
}

/// CORS response header settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// `Access-Control-Allow-Origin` value when the caller's origin is not echoed.
    pub default_origin: String,

    /// `Access-Control-Max-Age` in seconds.
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            default_origin: "*".to_string(),
            max_age_secs: 86_400,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
