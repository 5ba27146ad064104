//! Storage port for the execution audit trail.
//!
//! The safety guard's cooldown/daily-cap/loop-detection queries and the
//! recorder's writes go through the same store, so a finalizing execution
//! is immediately visible to the next admission check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::execution::AutomationExecution;

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Append the pending record created at the start of processing.
    async fn begin(&self, execution: &AutomationExecution) -> DomainResult<()>;

    /// Write the final state of a record. Fails if already finalized.
    async fn finalize(&self, execution: &AutomationExecution) -> DomainResult<()>;

    /// Get an execution by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<AutomationExecution>>;

    /// Recent executions for a rule, newest first.
    async fn list_for_rule(
        &self,
        rule_id: Uuid,
        limit: u32,
    ) -> DomainResult<Vec<AutomationExecution>>;

    /// Completion time of the most recent success/partial execution of
    /// `rule_id` for `contact_id` since `since`. Dry-runs are ignored.
    async fn last_effective_for_contact(
        &self,
        rule_id: Uuid,
        contact_id: &str,
        since: DateTime<Utc>,
    ) -> DomainResult<Option<DateTime<Utc>>>;

    /// Same as `last_effective_for_contact`, scoped by conversation.
    async fn last_effective_for_conversation(
        &self,
        rule_id: Uuid,
        conversation_id: &str,
        since: DateTime<Utc>,
    ) -> DomainResult<Option<DateTime<Utc>>>;

    /// Success/partial executions of `rule_id` for `contact_id` started at
    /// or after `day_start`. Dry-runs are ignored.
    async fn count_effective_for_contact_since(
        &self,
        rule_id: Uuid,
        contact_id: &str,
        day_start: DateTime<Utc>,
    ) -> DomainResult<u32>;

    /// Attempts of `rule_id` against `conversation_id` started since
    /// `since`, counting pending and executed records but not skips or
    /// dry-runs. Includes the current attempt's own pending record.
    async fn count_attempts_for_conversation_since(
        &self,
        rule_id: Uuid,
        conversation_id: &str,
        since: DateTime<Utc>,
    ) -> DomainResult<u32>;

    /// Delete records started before `cutoff`. Returns rows removed.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> DomainResult<u64>;
}
