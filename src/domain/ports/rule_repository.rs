//! Repository port for automation rules.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::execution::ExecutionStatus;
use crate::domain::models::event::TriggerEvent;
use crate::domain::models::rule::AutomationRule;

/// Repository for persisting and querying automation rules.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Create a new rule.
    async fn create(&self, rule: &AutomationRule) -> DomainResult<()>;

    /// Get a rule by ID (including soft-deleted rules).
    async fn get(&self, id: Uuid) -> DomainResult<Option<AutomationRule>>;

    /// Update an existing rule's configuration.
    async fn update(&self, rule: &AutomationRule) -> DomainResult<()>;

    /// Soft-delete a rule. Execution history keeps referencing it.
    async fn soft_delete(&self, id: Uuid) -> DomainResult<()>;

    /// List all rules for a tenant, newest first.
    async fn list(&self, tenant_id: &str) -> DomainResult<Vec<AutomationRule>>;

    /// Enabled, non-deleted rules for a tenant and trigger, ordered by
    /// priority descending with creation order breaking ties.
    async fn list_enabled_for_trigger(
        &self,
        tenant_id: &str,
        trigger: TriggerEvent,
    ) -> DomainResult<Vec<AutomationRule>>;

    /// Enable or disable a rule. Returns false when the rule is unknown.
    async fn set_enabled(&self, id: Uuid, enabled: bool) -> DomainResult<bool>;

    /// Record a finalized outcome: bumps stats for every outcome, and
    /// window/daily counters only for executed attempts. Called exactly
    /// once per finalized execution, after the action executor completes.
    async fn record_outcome(
        &self,
        rule_id: Uuid,
        status: ExecutionStatus,
        executed: bool,
        now: DateTime<Utc>,
    ) -> DomainResult<()>;
}
