//! Caller identification and admission.
//!
//! # Responsibilities
//! - Derive the caller identity used as the quota key
//! - Admit callers by allowed origin or pre-shared key
//! - Let privileged identities through without any check
//!
//! # Design Decisions
//! - The policy is built once from config and never mutated
//! - `Origin` wins; `Referer` is only a fallback for clients that omit it
//! - 401 when nothing was presented, 403 when something was presented but matched nothing

use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, SocketAddr};

use axum::http::{header, HeaderMap, HeaderName};
use url::Url;

use crate::config::AccessConfig;
use crate::error::RelayError;

/// Who is calling, as far as the headers and socket tell us.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    /// Quota key.
    pub identity: String,
    /// Normalized origin, from `Origin` or the `Referer` fallback.
    pub origin: Option<String>,
    /// Whether a pre-shared key header was present at all.
    pub presented_key: bool,
    /// Label of the pre-shared key, when it matched.
    pub key_label: Option<String>,
    /// Exempt from access checks and quotas.
    pub privileged: bool,
}

/// Why a caller was let in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Privileged,
    Origin,
    PresharedKey,
    Unenforced,
}

/// Immutable admission policy.
#[derive(Clone, Debug)]
pub struct AccessGuard {
    enforce: bool,
    key_header: HeaderName,
    allowed_origins: BTreeSet<String>,
    any_origin: bool,
    preshared_keys: BTreeMap<String, String>,
    privileged_identities: BTreeSet<String>,
    trust_forwarded_for: bool,
}

impl AccessGuard {
    pub fn from_config(config: &AccessConfig) -> Self {
        let key_header = HeaderName::from_bytes(config.key_header.as_bytes()).unwrap_or_else(|_| {
            tracing::warn!(header = %config.key_header, "Invalid key header name, using x-api-key");
            HeaderName::from_static("x-api-key")
        });

        let any_origin = config.allowed_origins.iter().any(|o| o.trim() == "*");
        let allowed_origins = config
            .allowed_origins
            .iter()
            .filter(|o| o.trim() != "*")
            .map(|o| normalize_origin(o))
            .collect();

        Self {
            enforce: config.enforce,
            key_header,
            allowed_origins,
            any_origin,
            preshared_keys: config.preshared_keys.clone(),
            privileged_identities: config.privileged_identities.clone(),
            trust_forwarded_for: config.trust_forwarded_for,
        }
    }

    pub fn privileged_identities(&self) -> &BTreeSet<String> {
        &self.privileged_identities
    }

    /// True if `origin` is on the allow-list.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.any_origin || self.allowed_origins.contains(&normalize_origin(origin))
    }

    /// Resolve identity and credentials from the request.
    pub fn identify(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> Caller {
        let origin = request_origin(headers);

        let key = headers
            .get(&self.key_header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|k| !k.is_empty());
        let key_label = key.and_then(|k| self.preshared_keys.get(k)).cloned();

        let identity = match &key_label {
            Some(label) => format!("key:{label}"),
            None => self
                .forwarded_ip(headers)
                .or_else(|| peer.map(|addr| addr.ip()))
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        };
        let privileged = self.privileged_identities.contains(&identity);

        Caller {
            identity,
            origin,
            presented_key: key.is_some(),
            key_label,
            privileged,
        }
    }

    /// Decide whether `caller` may use the relay.
    pub fn authorize(&self, caller: &Caller) -> Result<Admission, RelayError> {
        // 1. Privileged callers skip everything
        if caller.privileged {
            return Ok(Admission::Privileged);
        }

        // 2. Relaxed deployments admit everyone
        if !self.enforce {
            return Ok(Admission::Unenforced);
        }

        // 3. Origin allow-list, then pre-shared key
        if caller.origin.as_deref().is_some_and(|o| self.is_origin_allowed(o)) {
            return Ok(Admission::Origin);
        }
        if caller.key_label.is_some() {
            return Ok(Admission::PresharedKey);
        }

        if caller.origin.is_none() && !caller.presented_key {
            Err(RelayError::Unauthorized(
                "an allowed origin or an API key is required".into(),
            ))
        } else {
            Err(RelayError::Forbidden(
                "use an allowed origin or a valid API key".into(),
            ))
        }
    }

    fn forwarded_ip(&self, headers: &HeaderMap) -> Option<IpAddr> {
        if !self.trust_forwarded_for {
            return None;
        }
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|ip| ip.trim().parse().ok());
        forwarded.or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(|ip| ip.trim().parse().ok())
        })
    }
}

/// The caller's origin: `Origin`, else scheme://host[:port] of `Referer`.
pub fn request_origin(headers: &HeaderMap) -> Option<String> {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|o| !o.is_empty() && *o != "null")
        .map(normalize_origin);

    origin.or_else(|| {
        headers
            .get(header::REFERER)
            .and_then(|v| v.to_str().ok())
            .and_then(|r| Url::parse(r.trim()).ok())
            .map(|url| url.origin().ascii_serialization())
            .filter(|o| o != "null")
            .map(|o| normalize_origin(&o))
    })
}

fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}
