//! In-process implementation of the `RateLimitStore` port.
//!
//! Fixed minute/hour windows for the global scope and per tenant, reset
//! lazily on access. Suitable for a single authoritative engine instance;
//! multi-replica deployments swap in an external counter store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::models::config::RateLimitsConfig;
use crate::domain::ports::rate_limit_store::{RateCounters, RateLimitStore, RateScope};

#[derive(Debug, Clone, Copy, Default)]
struct WindowPair {
    minute_start: Option<DateTime<Utc>>,
    minute_count: u32,
    hour_start: Option<DateTime<Utc>>,
    hour_count: u32,
}

impl WindowPair {
    fn effective(&self, now: DateTime<Utc>) -> (u32, u32) {
        let minute = match self.minute_start {
            Some(start) if (now - start).num_seconds() < 60 => self.minute_count,
            _ => 0,
        };
        let hour = match self.hour_start {
            Some(start) if (now - start).num_seconds() < 3600 => self.hour_count,
            _ => 0,
        };
        (minute, hour)
    }

    fn record(&mut self, now: DateTime<Utc>) {
        let (minute, hour) = self.effective(now);
        if minute == 0 {
            self.minute_start = Some(now);
            self.minute_count = 0;
        }
        if hour == 0 {
            self.hour_start = Some(now);
            self.hour_count = 0;
        }
        self.minute_count += 1;
        self.hour_count += 1;
    }
}

struct Counters {
    global: WindowPair,
    tenants: HashMap<String, WindowPair>,
}

pub struct InMemoryRateLimitStore {
    config: RateLimitsConfig,
    counters: RwLock<Counters>,
}

impl InMemoryRateLimitStore {
    pub fn new(config: RateLimitsConfig) -> Self {
        Self {
            config,
            counters: RwLock::new(Counters {
                global: WindowPair::default(),
                tenants: HashMap::new(),
            }),
        }
    }

    fn ceilings(&self, scope: RateScope<'_>) -> (u32, u32) {
        match scope {
            RateScope::Global => (self.config.global_per_minute, self.config.global_per_hour),
            RateScope::Tenant(_) => (self.config.tenant_per_minute, self.config.tenant_per_hour),
        }
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn check(&self, scope: RateScope<'_>, now: DateTime<Utc>) -> bool {
        let (per_minute, per_hour) = self.ceilings(scope);
        let counters = self.counters.read().await;
        let window = match scope {
            RateScope::Global => counters.global,
            RateScope::Tenant(tenant_id) => counters
                .tenants
                .get(tenant_id)
                .copied()
                .unwrap_or_default(),
        };
        let (minute, hour) = window.effective(now);

        (per_minute == 0 || minute < per_minute) && (per_hour == 0 || hour < per_hour)
    }

    async fn record(&self, scope: RateScope<'_>, now: DateTime<Utc>) {
        let mut counters = self.counters.write().await;
        match scope {
            RateScope::Global => counters.global.record(now),
            RateScope::Tenant(tenant_id) => counters
                .tenants
                .entry(tenant_id.to_string())
                .or_default()
                .record(now),
        }
    }

    async fn global_counters(&self, now: DateTime<Utc>) -> RateCounters {
        let counters = self.counters.read().await;
        let (minute_count, hour_count) = counters.global.effective(now);
        RateCounters {
            minute_count,
            hour_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(per_minute: u32, per_hour: u32) -> InMemoryRateLimitStore {
        InMemoryRateLimitStore::new(RateLimitsConfig {
            global_per_minute: per_minute,
            global_per_hour: per_hour,
            tenant_per_minute: per_minute,
            tenant_per_hour: per_hour,
        })
    }

    #[tokio::test]
    async fn test_minute_ceiling_blocks_then_resets() {
        let store = store(2, 100);
        let now = Utc::now();

        assert!(store.check(RateScope::Global, now).await);
        store.record(RateScope::Global, now).await;
        store.record(RateScope::Global, now).await;
        assert!(!store.check(RateScope::Global, now).await);

        // Minute window lapses, the hour window still has headroom.
        let later = now + chrono::Duration::seconds(61);
        assert!(store.check(RateScope::Global, later).await);
    }

    #[tokio::test]
    async fn test_hour_ceiling_outlives_minute_reset() {
        let store = store(10, 2);
        let now = Utc::now();
        store.record(RateScope::Global, now).await;
        store.record(RateScope::Global, now).await;

        let later = now + chrono::Duration::seconds(120);
        assert!(!store.check(RateScope::Global, later).await);
    }

    #[tokio::test]
    async fn test_tenant_scopes_are_independent() {
        let store = store(1, 100);
        let now = Utc::now();
        store.record(RateScope::Tenant("t1"), now).await;

        assert!(!store.check(RateScope::Tenant("t1"), now).await);
        assert!(store.check(RateScope::Tenant("t2"), now).await);
    }

    #[tokio::test]
    async fn test_zero_ceiling_disables_check() {
        let store = store(0, 0);
        let now = Utc::now();
        for _ in 0..100 {
            store.record(RateScope::Global, now).await;
        }
        assert!(store.check(RateScope::Global, now).await);
    }
}
