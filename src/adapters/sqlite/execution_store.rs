//! SQLite implementation of the ExecutionStore.
//!
//! One table backs both the recorder's writes and the safety guard's
//! history queries, so a finalizing execution is immediately visible to
//! the next admission check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_optional_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::execution::{
    ActionResult, AutomationExecution, ExecutionStatus, FailureReason, SkipReason,
};
use crate::domain::models::event::TriggerEvent;
use crate::domain::ports::ExecutionStore;

#[derive(Clone)]
pub struct SqliteExecutionStore {
    pool: SqlitePool,
}

impl SqliteExecutionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ExecutionRow {
    id: String,
    rule_id: String,
    tenant_id: String,
    trigger_event: String,
    conversation_id: Option<String>,
    contact_id: Option<String>,
    message_id: Option<String>,
    status: String,
    skip_reason: Option<String>,
    failure_reason: Option<String>,
    action_results: String,
    is_dry_run: i32,
    is_manual_test: i32,
    started_at: String,
    completed_at: Option<String>,
    duration_ms: Option<i64>,
}

fn row_to_execution(row: ExecutionRow) -> DomainResult<AutomationExecution> {
    let status = ExecutionStatus::parse_str(&row.status).ok_or_else(|| {
        DomainError::SerializationError(format!("Unknown execution status: {}", row.status))
    })?;
    let trigger_event = TriggerEvent::parse_str(&row.trigger_event).ok_or_else(|| {
        DomainError::SerializationError(format!("Unknown trigger event: {}", row.trigger_event))
    })?;
    let action_results: Vec<ActionResult> = serde_json::from_str(&row.action_results)?;

    Ok(AutomationExecution {
        id: parse_uuid(&row.id)?,
        rule_id: parse_uuid(&row.rule_id)?,
        tenant_id: row.tenant_id,
        trigger_event,
        conversation_id: row.conversation_id,
        contact_id: row.contact_id,
        message_id: row.message_id,
        status,
        skip_reason: row.skip_reason.as_deref().and_then(SkipReason::parse_str),
        failure_reason: row.failure_reason.as_deref().and_then(FailureReason::parse_str),
        action_results,
        is_dry_run: row.is_dry_run != 0,
        is_manual_test: row.is_manual_test != 0,
        started_at: parse_datetime(&row.started_at)?,
        completed_at: parse_optional_datetime(row.completed_at)?,
        duration_ms: row.duration_ms.map(|d| d as u64),
    })
}

#[async_trait]
impl ExecutionStore for SqliteExecutionStore {
    async fn begin(&self, execution: &AutomationExecution) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO automation_executions
               (id, rule_id, tenant_id, trigger_event, conversation_id, contact_id, message_id,
                status, skip_reason, failure_reason, action_results,
                is_dry_run, is_manual_test, started_at, completed_at, duration_ms)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL)"#,
        )
        .bind(execution.id.to_string())
        .bind(execution.rule_id.to_string())
        .bind(&execution.tenant_id)
        .bind(execution.trigger_event.as_str())
        .bind(&execution.conversation_id)
        .bind(&execution.contact_id)
        .bind(&execution.message_id)
        .bind(ExecutionStatus::Pending.as_str())
        .bind(None::<String>)
        .bind(None::<String>)
        .bind("[]")
        .bind(if execution.is_dry_run { 1i32 } else { 0i32 })
        .bind(if execution.is_manual_test { 1i32 } else { 0i32 })
        .bind(execution.started_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn finalize(&self, execution: &AutomationExecution) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE automation_executions SET
               status = ?, skip_reason = ?, failure_reason = ?,
               action_results = ?, completed_at = ?, duration_ms = ?
               WHERE id = ? AND completed_at IS NULL"#,
        )
        .bind(execution.status.as_str())
        .bind(execution.skip_reason.map(|r| r.as_str()))
        .bind(execution.failure_reason.map(|r| r.as_str()))
        .bind(serde_json::to_string(&execution.action_results)?)
        .bind(execution.completed_at.map(|t| t.to_rfc3339()))
        .bind(execution.duration_ms.map(|d| d as i64))
        .bind(execution.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::AlreadyFinalized(execution.id));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<AutomationExecution>> {
        let row: Option<ExecutionRow> =
            sqlx::query_as("SELECT * FROM automation_executions WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(row_to_execution).transpose()
    }

    async fn list_for_rule(
        &self,
        rule_id: Uuid,
        limit: u32,
    ) -> DomainResult<Vec<AutomationExecution>> {
        let rows: Vec<ExecutionRow> = sqlx::query_as(
            "SELECT * FROM automation_executions
             WHERE rule_id = ?
             ORDER BY started_at DESC
             LIMIT ?",
        )
        .bind(rule_id.to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_execution).collect()
    }

    async fn last_effective_for_contact(
        &self,
        rule_id: Uuid,
        contact_id: &str,
        since: DateTime<Utc>,
    ) -> DomainResult<Option<DateTime<Utc>>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT completed_at FROM automation_executions
             WHERE rule_id = ? AND contact_id = ?
               AND status IN ('success', 'partial')
               AND is_dry_run = 0
               AND completed_at >= ?
             ORDER BY completed_at DESC
             LIMIT 1",
        )
        .bind(rule_id.to_string())
        .bind(contact_id)
        .bind(since.to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(ts,)| parse_datetime(&ts)).transpose()
    }

    async fn last_effective_for_conversation(
        &self,
        rule_id: Uuid,
        conversation_id: &str,
        since: DateTime<Utc>,
    ) -> DomainResult<Option<DateTime<Utc>>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT completed_at FROM automation_executions
             WHERE rule_id = ? AND conversation_id = ?
               AND status IN ('success', 'partial')
               AND is_dry_run = 0
               AND completed_at >= ?
             ORDER BY completed_at DESC
             LIMIT 1",
        )
        .bind(rule_id.to_string())
        .bind(conversation_id)
        .bind(since.to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(ts,)| parse_datetime(&ts)).transpose()
    }

    async fn count_effective_for_contact_since(
        &self,
        rule_id: Uuid,
        contact_id: &str,
        day_start: DateTime<Utc>,
    ) -> DomainResult<u32> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM automation_executions
             WHERE rule_id = ? AND contact_id = ?
               AND status IN ('success', 'partial')
               AND is_dry_run = 0
               AND started_at >= ?",
        )
        .bind(rule_id.to_string())
        .bind(contact_id)
        .bind(day_start.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u32)
    }

    async fn count_attempts_for_conversation_since(
        &self,
        rule_id: Uuid,
        conversation_id: &str,
        since: DateTime<Utc>,
    ) -> DomainResult<u32> {
        // Pending and executed records count; skips and dry-runs do not.
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM automation_executions
             WHERE rule_id = ? AND conversation_id = ?
               AND status IN ('pending', 'success', 'partial', 'failed')
               AND is_dry_run = 0
               AND started_at >= ?",
        )
        .bind(rule_id.to_string())
        .bind(conversation_id)
        .bind(since.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u32)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> DomainResult<u64> {
        let result = sqlx::query("DELETE FROM automation_executions WHERE started_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
