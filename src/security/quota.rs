//! Daily usage quotas.
//!
//! # Responsibilities
//! - Count admitted requests per identity and globally
//! - Reset all counts the first time a request lands on a new calendar day
//! - Exempt privileged identities from counting
//!
//! # Design Decisions
//! - The calendar day is taken in a fixed UTC offset (UTC+8 by default)
//! - Counters live behind [`QuotaStore`] so a shared backing store can replace
//!   the in-memory one without touching call sites
//! - Check and record are separate calls, so concurrent requests may overshoot
//!   a cap slightly

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use dashmap::DashMap;

use crate::config::QuotaConfig;
use crate::error::RelayError;
use crate::observability::metrics;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Counter values for one identity within the stored day.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Usage {
    /// Day key the counts belong to. Empty before the first reset.
    pub day: String,
    pub identity: u32,
    pub global: u32,
}

/// Backing storage for the usage window.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Current counts for `identity`.
    async fn get(&self, identity: &str) -> Usage;

    /// Add one request for `identity` (and globally), returning the new counts.
    async fn increment(&self, identity: &str) -> Usage;

    /// Start an empty window for `day`. No-op if the store is already on `day`.
    async fn reset(&self, day: &str);
}

/// Process-local usage window.
#[derive(Debug, Default)]
pub struct InMemoryQuotaStore {
    day: Mutex<String>,
    per_identity: DashMap<String, u32>,
    global: AtomicU32,
}

impl InMemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_day(&self) -> String {
        self.day
            .lock()
            .map(|day| day.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn get(&self, identity: &str) -> Usage {
        Usage {
            day: self.current_day(),
            identity: self.per_identity.get(identity).map(|c| *c).unwrap_or(0),
            global: self.global.load(Ordering::Relaxed),
        }
    }

    async fn increment(&self, identity: &str) -> Usage {
        let identity_count = {
            let mut entry = self.per_identity.entry(identity.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            *entry
        };
        let global = self.global.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        Usage {
            day: self.current_day(),
            identity: identity_count,
            global,
        }
    }

    async fn reset(&self, day: &str) {
        let mut stored = self
            .day
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *stored == day {
            return;
        }
        tracing::info!(previous = %stored, day = %day, "Quota window rolled over");
        self.per_identity.clear();
        self.global.store(0, Ordering::Relaxed);
        *stored = day.to_string();
    }
}

/// Which cap denied a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    Identity,
    Global,
}

impl LimitScope {
    fn label(self) -> &'static str {
        match self {
            LimitScope::Identity => "identity",
            LimitScope::Global => "global",
        }
    }
}

/// Outcome of a quota check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaDecision {
    pub admitted: bool,
    /// Requests already recorded today for the identity.
    pub used: u32,
    /// Requests still allowed today, bounded by both caps.
    pub remaining: u32,
    /// The cap that denied the request, if any.
    pub denied_by: Option<LimitScope>,
}

impl QuotaDecision {
    fn unlimited() -> Self {
        Self {
            admitted: true,
            used: 0,
            remaining: u32::MAX,
            denied_by: None,
        }
    }
}

/// Enforces the per-identity and global daily caps.
pub struct QuotaTracker {
    store: Arc<dyn QuotaStore>,
    clock: Arc<dyn Clock>,
    per_identity_cap: u32,
    global_cap: u32,
    offset: FixedOffset,
    privileged: BTreeSet<String>,
}

impl QuotaTracker {
    pub fn new(
        config: &QuotaConfig,
        privileged: BTreeSet<String>,
        store: Arc<dyn QuotaStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let offset = FixedOffset::east_opt(config.utc_offset_hours.saturating_mul(3600))
            .unwrap_or_else(|| {
                tracing::warn!(hours = config.utc_offset_hours, "Invalid quota offset, using UTC");
                Utc.fix()
            });
        Self {
            store,
            clock,
            per_identity_cap: config.per_identity_daily,
            global_cap: config.global_daily,
            offset,
            privileged,
        }
    }

    /// In-memory tracker on the wall clock.
    pub fn in_memory(config: &QuotaConfig, privileged: BTreeSet<String>) -> Self {
        Self::new(
            config,
            privileged,
            Arc::new(InMemoryQuotaStore::new()),
            Arc::new(SystemClock),
        )
    }

    /// Calendar day, in the configured offset, for `now`.
    pub fn day_key(&self, now: DateTime<Utc>) -> String {
        now.with_timezone(&self.offset).format("%Y-%m-%d").to_string()
    }

    pub fn is_privileged(&self, identity: &str) -> bool {
        self.privileged.contains(identity)
    }

    /// Whether `identity` may make another request today.
    pub async fn check(&self, identity: &str) -> QuotaDecision {
        if self.is_privileged(identity) {
            return QuotaDecision::unlimited();
        }

        let usage = self.current_usage(identity).await;
        let identity_left = self.per_identity_cap.saturating_sub(usage.identity);
        let global_left = self.global_cap.saturating_sub(usage.global);

        let denied_by = if identity_left == 0 {
            Some(LimitScope::Identity)
        } else if global_left == 0 {
            Some(LimitScope::Global)
        } else {
            None
        };

        QuotaDecision {
            admitted: denied_by.is_none(),
            used: usage.identity,
            remaining: identity_left.min(global_left),
            denied_by,
        }
    }

    /// [`check`](Self::check), turning a denial into `QuotaExceeded`.
    pub async fn admit(&self, identity: &str) -> Result<QuotaDecision, RelayError> {
        let decision = self.check(identity).await;
        match decision.denied_by {
            None => Ok(decision),
            Some(scope) => {
                tracing::warn!(identity = %identity, scope = scope.label(), used = decision.used, "Quota exceeded");
                metrics::record_quota_denied(scope.label());
                let message = match scope {
                    LimitScope::Identity => format!(
                        "Daily limit reached: {} of {} requests used today, {} remaining",
                        decision.used, self.per_identity_cap, decision.remaining
                    ),
                    LimitScope::Global => format!(
                        "The service has reached its daily limit of {} requests, {} remaining today",
                        self.global_cap, decision.remaining
                    ),
                };
                Err(RelayError::QuotaExceeded(message))
            }
        }
    }

    /// Count one admitted request. Privileged identities are not counted.
    pub async fn record(&self, identity: &str) -> Option<Usage> {
        if self.is_privileged(identity) {
            return None;
        }
        self.roll_over().await;
        let usage = self.store.increment(identity).await;
        tracing::debug!(identity = %identity, used = usage.identity, global = usage.global, "Quota recorded");
        Some(usage)
    }

    async fn current_usage(&self, identity: &str) -> Usage {
        let today = self.day_key(self.clock.now());
        let usage = self.store.get(identity).await;
        if usage.day == today {
            return usage;
        }
        self.store.reset(&today).await;
        Usage {
            day: today,
            identity: 0,
            global: 0,
        }
    }

    async fn roll_over(&self) {
        let today = self.day_key(self.clock.now());
        self.store.reset(&today).await;
    }
}
