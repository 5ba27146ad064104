//! SQLite implementation of the RuleRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_optional_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::execution::ExecutionStatus;
use crate::domain::models::event::TriggerEvent;
use crate::domain::models::rule::{
    AutomationRule, Condition, RuleAction, RuleCounters, RuleRateLimit, RuleStats, TriggerFilters,
};
use crate::domain::ports::RuleRepository;

#[derive(Clone)]
pub struct SqliteRuleRepository {
    pool: SqlitePool,
}

impl SqliteRuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RuleRow {
    id: String,
    tenant_id: String,
    name: String,
    description: String,
    enabled: i32,
    priority: i64,
    trigger_event: String,
    trigger_filters: String,
    conditions: String,
    actions: String,
    rate_limit: String,
    current_window_count: i64,
    current_window_start: Option<String>,
    daily_execution_count: i64,
    daily_execution_reset_at: Option<String>,
    total_matched: i64,
    total_succeeded: i64,
    total_partial: i64,
    total_failed: i64,
    total_skipped: i64,
    last_executed_at: Option<String>,
    last_success_at: Option<String>,
    last_failure_at: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

fn row_to_rule(row: RuleRow) -> DomainResult<AutomationRule> {
    let id = parse_uuid(&row.id)?;
    let trigger = TriggerEvent::parse_str(&row.trigger_event).ok_or_else(|| {
        DomainError::SerializationError(format!("Unknown trigger event: {}", row.trigger_event))
    })?;
    let filters: TriggerFilters = serde_json::from_str(&row.trigger_filters)?;
    let conditions: Vec<Condition> = serde_json::from_str(&row.conditions)?;
    let actions: Vec<RuleAction> = serde_json::from_str(&row.actions)?;
    let rate_limit: RuleRateLimit = serde_json::from_str(&row.rate_limit)?;

    Ok(AutomationRule {
        id,
        tenant_id: row.tenant_id,
        name: row.name,
        description: row.description,
        enabled: row.enabled != 0,
        priority: row.priority as i32,
        trigger,
        filters,
        conditions,
        actions,
        rate_limit,
        counters: RuleCounters {
            current_window_count: row.current_window_count as u32,
            current_window_start: parse_optional_datetime(row.current_window_start)?,
            daily_execution_count: row.daily_execution_count as u32,
            daily_execution_reset_at: parse_optional_datetime(row.daily_execution_reset_at)?,
        },
        stats: RuleStats {
            total_matched: row.total_matched as u64,
            total_succeeded: row.total_succeeded as u64,
            total_partial: row.total_partial as u64,
            total_failed: row.total_failed as u64,
            total_skipped: row.total_skipped as u64,
            last_executed_at: parse_optional_datetime(row.last_executed_at)?,
            last_success_at: parse_optional_datetime(row.last_success_at)?,
            last_failure_at: parse_optional_datetime(row.last_failure_at)?,
        },
        created_at: crate::adapters::sqlite::parse_datetime(&row.created_at)?,
        updated_at: crate::adapters::sqlite::parse_datetime(&row.updated_at)?,
        deleted_at: parse_optional_datetime(row.deleted_at)?,
    })
}

#[async_trait]
impl RuleRepository for SqliteRuleRepository {
    async fn create(&self, rule: &AutomationRule) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO automation_rules
               (id, tenant_id, name, description, enabled, priority,
                trigger_event, trigger_filters, conditions, actions, rate_limit,
                current_window_count, current_window_start,
                daily_execution_count, daily_execution_reset_at,
                total_matched, total_succeeded, total_partial, total_failed, total_skipped,
                last_executed_at, last_success_at, last_failure_at,
                created_at, updated_at, deleted_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(rule.id.to_string())
        .bind(&rule.tenant_id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(if rule.enabled { 1i32 } else { 0i32 })
        .bind(i64::from(rule.priority))
        .bind(rule.trigger.as_str())
        .bind(serde_json::to_string(&rule.filters)?)
        .bind(serde_json::to_string(&rule.conditions)?)
        .bind(serde_json::to_string(&rule.actions)?)
        .bind(serde_json::to_string(&rule.rate_limit)?)
        .bind(i64::from(rule.counters.current_window_count))
        .bind(rule.counters.current_window_start.map(|t| t.to_rfc3339()))
        .bind(i64::from(rule.counters.daily_execution_count))
        .bind(rule.counters.daily_execution_reset_at.map(|t| t.to_rfc3339()))
        .bind(rule.stats.total_matched as i64)
        .bind(rule.stats.total_succeeded as i64)
        .bind(rule.stats.total_partial as i64)
        .bind(rule.stats.total_failed as i64)
        .bind(rule.stats.total_skipped as i64)
        .bind(rule.stats.last_executed_at.map(|t| t.to_rfc3339()))
        .bind(rule.stats.last_success_at.map(|t| t.to_rfc3339()))
        .bind(rule.stats.last_failure_at.map(|t| t.to_rfc3339()))
        .bind(rule.created_at.to_rfc3339())
        .bind(rule.updated_at.to_rfc3339())
        .bind(rule.deleted_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<AutomationRule>> {
        let row: Option<RuleRow> = sqlx::query_as("SELECT * FROM automation_rules WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_rule).transpose()
    }

    async fn update(&self, rule: &AutomationRule) -> DomainResult<()> {
        sqlx::query(
            r#"UPDATE automation_rules SET
               name = ?, description = ?, enabled = ?, priority = ?,
               trigger_event = ?, trigger_filters = ?, conditions = ?, actions = ?,
               rate_limit = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(if rule.enabled { 1i32 } else { 0i32 })
        .bind(i64::from(rule.priority))
        .bind(rule.trigger.as_str())
        .bind(serde_json::to_string(&rule.filters)?)
        .bind(serde_json::to_string(&rule.conditions)?)
        .bind(serde_json::to_string(&rule.actions)?)
        .bind(serde_json::to_string(&rule.rate_limit)?)
        .bind(Utc::now().to_rfc3339())
        .bind(rule.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> DomainResult<()> {
        sqlx::query(
            "UPDATE automation_rules SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, tenant_id: &str) -> DomainResult<Vec<AutomationRule>> {
        let rows: Vec<RuleRow> = sqlx::query_as(
            "SELECT * FROM automation_rules
             WHERE tenant_id = ? AND deleted_at IS NULL
             ORDER BY created_at DESC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_rule).collect()
    }

    async fn list_enabled_for_trigger(
        &self,
        tenant_id: &str,
        trigger: TriggerEvent,
    ) -> DomainResult<Vec<AutomationRule>> {
        let rows: Vec<RuleRow> = sqlx::query_as(
            "SELECT * FROM automation_rules
             WHERE tenant_id = ? AND trigger_event = ? AND enabled = 1 AND deleted_at IS NULL
             ORDER BY priority DESC, created_at ASC",
        )
        .bind(tenant_id)
        .bind(trigger.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_rule).collect()
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> DomainResult<bool> {
        let result = sqlx::query(
            "UPDATE automation_rules SET enabled = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(if enabled { 1i32 } else { 0i32 })
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_outcome(
        &self,
        rule_id: Uuid,
        status: ExecutionStatus,
        executed: bool,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        // Read-modify-write on the counters. The engine serializes
        // attempts per conversation scope; cross-scope races on one rule's
        // counters stay within a single process and one event's width.
        let Some(rule) = self.get(rule_id).await? else {
            return Err(DomainError::RuleNotFound(rule_id));
        };

        let mut counters = rule.counters;
        if executed {
            counters.record(rule.rate_limit.window_seconds, now);
        }

        let (succeeded, partial, failed, skipped) = match status {
            ExecutionStatus::Success => (1i64, 0i64, 0i64, 0i64),
            ExecutionStatus::Partial => (0, 1, 0, 0),
            ExecutionStatus::Failed => (0, 0, 1, 0),
            ExecutionStatus::Skipped => (0, 0, 0, 1),
            ExecutionStatus::Pending => (0, 0, 0, 0),
        };
        let succeeded_effective = status.is_effective();

        sqlx::query(
            r#"UPDATE automation_rules SET
               current_window_count = ?,
               current_window_start = ?,
               daily_execution_count = ?,
               daily_execution_reset_at = ?,
               total_matched = total_matched + ?,
               total_succeeded = total_succeeded + ?,
               total_partial = total_partial + ?,
               total_failed = total_failed + ?,
               total_skipped = total_skipped + ?,
               last_executed_at = CASE WHEN ? THEN ? ELSE last_executed_at END,
               last_success_at = CASE WHEN ? THEN ? ELSE last_success_at END,
               last_failure_at = CASE WHEN ? THEN ? ELSE last_failure_at END,
               updated_at = ?
               WHERE id = ?"#,
        )
        .bind(i64::from(counters.current_window_count))
        .bind(counters.current_window_start.map(|t| t.to_rfc3339()))
        .bind(i64::from(counters.daily_execution_count))
        .bind(counters.daily_execution_reset_at.map(|t| t.to_rfc3339()))
        .bind(if executed { 1i64 } else { 0i64 })
        .bind(succeeded)
        .bind(partial)
        .bind(failed)
        .bind(skipped)
        .bind(executed)
        .bind(now.to_rfc3339())
        .bind(succeeded_effective)
        .bind(now.to_rfc3339())
        .bind(status == ExecutionStatus::Failed)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(rule_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
