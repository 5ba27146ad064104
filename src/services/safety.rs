//! Safety Guard: the ordered chain of admission checks that runs before a
//! rule's conditions are even considered.
//!
//! The first failing check short-circuits with its specific skip reason.
//! The order is part of the contract (cheap flag checks before history
//! lookups) and is relied on for diagnosability:
//!
//! 1.  global kill switch
//! 2.  tenant automation toggle (cached, fail-open)
//! 3.  rule enabled flag
//! 4.  global minute/hour windows
//! 5.  tenant minute/hour windows
//! 6.  rule window + rule daily cap
//! 7.  per-contact cooldown
//! 8.  per-contact daily cap
//! 9.  per-conversation cooldown
//! 10. loop detection
//! 11. business hours (only when the rule's filter requests it)
//! 12. reply-window gate (only for rules sending free-form messages)
//!
//! The guard never mutates counters; budget is consumed only after the
//! action executor completes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::errors::DomainResult;
use crate::domain::models::config::BusinessHours;
use crate::domain::models::context::EvaluationContext;
use crate::domain::models::execution::SkipReason;
use crate::domain::models::rule::AutomationRule;
use crate::domain::ports::rate_limit_store::{RateLimitStore, RateScope};
use crate::domain::ports::{ExecutionStore, TenantSettingsStore};

/// Loop detection threshold: attempts of one rule against one conversation.
pub const LOOP_THRESHOLD: u32 = 3;
/// Loop detection window in seconds.
pub const LOOP_WINDOW_SECS: i64 = 10;

/// Result of the admission chain.
#[derive(Debug, Clone)]
pub enum Admission {
    Allowed,
    Denied { reason: SkipReason, detail: String },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    fn denied(reason: SkipReason, detail: impl Into<String>) -> Self {
        Self::Denied {
            reason,
            detail: detail.into(),
        }
    }
}

/// Configuration for the safety guard.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// TTL of the tenant automation-enabled cache.
    pub tenant_cache_ttl: Duration,
    /// Fallback schedule when a tenant defines no business hours.
    pub default_business_hours: Option<BusinessHours>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            tenant_cache_ttl: Duration::from_secs(30),
            default_business_hours: None,
        }
    }
}

pub struct SafetyGuard {
    kill_switch: Arc<AtomicBool>,
    tenant_settings: Arc<dyn TenantSettingsStore>,
    rate_limits: Arc<dyn RateLimitStore>,
    executions: Arc<dyn ExecutionStore>,
    config: GuardConfig,
    tenant_cache: RwLock<HashMap<String, (bool, Instant)>>,
}

impl SafetyGuard {
    pub fn new(
        kill_switch: Arc<AtomicBool>,
        tenant_settings: Arc<dyn TenantSettingsStore>,
        rate_limits: Arc<dyn RateLimitStore>,
        executions: Arc<dyn ExecutionStore>,
        config: GuardConfig,
    ) -> Self {
        Self {
            kill_switch,
            tenant_settings,
            rate_limits,
            executions,
            config,
            tenant_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Run the full admission chain for one rule against one context.
    ///
    /// History-scoped checks are no-op passes when their scoping id is
    /// absent from the event. Store errors on history lookups propagate to
    /// the caller (recorded as an internal failure); the tenant-toggle
    /// read alone fails open.
    pub async fn admit(
        &self,
        rule: &AutomationRule,
        context: &EvaluationContext,
        now: DateTime<Utc>,
    ) -> DomainResult<Admission> {
        // 1. Kill switch: the deliberate emergency stop.
        if self.kill_switch.load(Ordering::SeqCst) {
            return Ok(Admission::denied(
                SkipReason::GlobalKillSwitch,
                "global kill switch engaged",
            ));
        }

        // 2. Tenant automation toggle.
        if !self.tenant_automation_enabled(&rule.tenant_id).await {
            return Ok(Admission::denied(
                SkipReason::WorkspaceDisabled,
                format!("automation disabled for tenant {}", rule.tenant_id),
            ));
        }

        // 3. Rule flag (the fetch path filters on it; testRule may not).
        if !rule.enabled || rule.is_deleted() {
            return Ok(Admission::denied(SkipReason::RuleDisabled, "rule disabled"));
        }

        // 4. Global windows.
        if !self.rate_limits.check(RateScope::Global, now).await {
            return Ok(Admission::denied(
                SkipReason::RateLimitExceeded,
                "global rate limit reached",
            ));
        }

        // 5. Tenant windows.
        if !self
            .rate_limits
            .check(RateScope::Tenant(&rule.tenant_id), now)
            .await
        {
            return Ok(Admission::denied(
                SkipReason::RateLimitExceeded,
                format!("tenant {} rate limit reached", rule.tenant_id),
            ));
        }

        // 6. Rule window and rule daily cap.
        let limit = &rule.rate_limit;
        if limit.max_executions > 0
            && rule
                .counters
                .effective_window_count(limit.window_seconds, now)
                >= limit.max_executions
        {
            return Ok(Admission::denied(
                SkipReason::RateLimitExceeded,
                format!(
                    "rule window limit {} per {}s reached",
                    limit.max_executions, limit.window_seconds
                ),
            ));
        }
        if limit.daily_execution_limit > 0
            && rule.counters.effective_daily_count(now) >= limit.daily_execution_limit
        {
            return Ok(Admission::denied(
                SkipReason::DailyLimitExceeded,
                format!("rule daily limit {} reached", limit.daily_execution_limit),
            ));
        }

        let contact_id = context.event.contact_id.as_deref();
        let conversation_id = context.event.conversation_id.as_deref();

        // 7. Per-contact cooldown.
        if limit.per_contact_cooldown_seconds > 0 {
            if let Some(contact_id) = contact_id {
                let since = now - chrono::Duration::seconds(limit.per_contact_cooldown_seconds as i64);
                if let Some(last) = self
                    .executions
                    .last_effective_for_contact(rule.id, contact_id, since)
                    .await?
                {
                    return Ok(Admission::denied(
                        SkipReason::ContactCooldown,
                        format!("last execution for contact at {last}"),
                    ));
                }
            }
        }

        // 8. Per-contact daily cap (resets at the UTC day boundary).
        if limit.max_per_contact_per_day > 0 {
            if let Some(contact_id) = contact_id {
                let day_start = now
                    .date_naive()
                    .and_hms_opt(0, 0, 0)
                    .map(|naive| naive.and_utc())
                    .unwrap_or(now);
                let today = self
                    .executions
                    .count_effective_for_contact_since(rule.id, contact_id, day_start)
                    .await?;
                if today >= limit.max_per_contact_per_day {
                    return Ok(Admission::denied(
                        SkipReason::DailyLimitExceeded,
                        format!(
                            "contact reached {} of {} daily executions",
                            today, limit.max_per_contact_per_day
                        ),
                    ));
                }
            }
        }

        // 9. Per-conversation cooldown.
        if limit.per_conversation_cooldown_seconds > 0 {
            if let Some(conversation_id) = conversation_id {
                let since =
                    now - chrono::Duration::seconds(limit.per_conversation_cooldown_seconds as i64);
                if let Some(last) = self
                    .executions
                    .last_effective_for_conversation(rule.id, conversation_id, since)
                    .await?
                {
                    return Ok(Admission::denied(
                        SkipReason::ConversationCooldown,
                        format!("last execution for conversation at {last}"),
                    ));
                }
            }
        }

        // 10. Loop detection. The count includes the current attempt's
        // pending record, so the LOOP_THRESHOLD-th attempt in the window
        // is the first one denied.
        if let Some(conversation_id) = conversation_id {
            let since = now - chrono::Duration::seconds(LOOP_WINDOW_SECS);
            let attempts = self
                .executions
                .count_attempts_for_conversation_since(rule.id, conversation_id, since)
                .await?;
            if attempts >= LOOP_THRESHOLD {
                return Ok(Admission::denied(
                    SkipReason::LoopDetected,
                    format!("{attempts} attempts within {LOOP_WINDOW_SECS}s"),
                ));
            }
        }

        // 11. Business hours, only when the rule asks for the gate.
        if rule.filters.business_hours_only {
            if let Some(admission) = self.check_business_hours(&rule.tenant_id, now).await {
                return Ok(admission);
            }
        }

        // 12. Reply-window gate for free-form message sends.
        if rule.needs_reply_window() {
            if let Some(expires_at) = context
                .conversation
                .as_ref()
                .and_then(|c| c.window_expires_at)
            {
                if expires_at <= now {
                    return Ok(Admission::denied(
                        SkipReason::NoReplyWindow,
                        format!("reply window expired at {expires_at}"),
                    ));
                }
            }
        }

        Ok(Admission::Allowed)
    }

    /// Tenant toggle read, cached with a short TTL. A store failure fails
    /// open: automation must not silently halt platform-wide on a
    /// transient read error.
    async fn tenant_automation_enabled(&self, tenant_id: &str) -> bool {
        {
            let cache = self.tenant_cache.read().await;
            if let Some((enabled, cached_at)) = cache.get(tenant_id) {
                if cached_at.elapsed() < self.config.tenant_cache_ttl {
                    return *enabled;
                }
            }
        }

        let enabled = match self.tenant_settings.automation_enabled(tenant_id).await {
            Ok(enabled) => enabled,
            Err(e) => {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    error = %e,
                    "Tenant settings read failed, failing open"
                );
                true
            }
        };

        let mut cache = self.tenant_cache.write().await;
        cache.insert(tenant_id.to_string(), (enabled, Instant::now()));
        enabled
    }

    /// Drop a tenant's cached toggle (called after an explicit update).
    pub async fn invalidate_tenant(&self, tenant_id: &str) {
        let mut cache = self.tenant_cache.write().await;
        cache.remove(tenant_id);
    }

    async fn check_business_hours(&self, tenant_id: &str, now: DateTime<Utc>) -> Option<Admission> {
        let tenant_hours = match self.tenant_settings.business_hours(tenant_id).await {
            Ok(hours) => hours,
            Err(e) => {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    error = %e,
                    "Business hours read failed, gate passes"
                );
                None
            }
        };

        let hours = tenant_hours.or_else(|| self.config.default_business_hours.clone())?;
        match hours.contains(now) {
            Some(true) => None,
            Some(false) => Some(Admission::denied(
                SkipReason::OutsideBusinessHours,
                "outside configured business hours",
            )),
            None => {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    timezone = %hours.timezone,
                    "Unparseable business hours, gate passes"
                );
                None
            }
        }
    }
}
