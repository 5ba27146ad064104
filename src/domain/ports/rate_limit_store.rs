//! Rate-limit counter port.
//!
//! Global and per-tenant windows are shared mutable state. The in-process
//! implementation assumes a single authoritative engine instance; a
//! multi-replica deployment substitutes an external atomic counter store
//! behind this same trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Scope a window counter applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateScope<'a> {
    Global,
    Tenant(&'a str),
}

/// Snapshot of the global windows for status reporting.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RateCounters {
    pub minute_count: u32,
    pub hour_count: u32,
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Whether one more execution fits inside the scope's minute and hour
    /// ceilings. Does not consume budget.
    async fn check(&self, scope: RateScope<'_>, now: DateTime<Utc>) -> bool;

    /// Consume one unit of budget in the scope's windows.
    async fn record(&self, scope: RateScope<'_>, now: DateTime<Utc>);

    /// Global counters for status reporting.
    async fn global_counters(&self, now: DateTime<Utc>) -> RateCounters;
}
