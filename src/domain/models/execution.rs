//! Execution records: the immutable audit trail of every rule attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::event::TriggerEvent;

/// Lifecycle status of an execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Created at the start of processing; must be finalized exactly once.
    Pending,
    Success,
    Partial,
    Failed,
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Counts toward cooldowns and per-contact daily caps.
    pub fn is_effective(&self) -> bool {
        matches!(self, Self::Success | Self::Partial)
    }
}

/// Why a rule did not run. Skips are expected outcomes, never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    GlobalKillSwitch,
    WorkspaceDisabled,
    RuleDisabled,
    RateLimitExceeded,
    DailyLimitExceeded,
    ContactCooldown,
    ConversationCooldown,
    LoopDetected,
    OutsideBusinessHours,
    FilterNotMatched,
    ConditionNotMet,
    NoReplyWindow,
    DryRun,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GlobalKillSwitch => "global_kill_switch",
            Self::WorkspaceDisabled => "workspace_disabled",
            Self::RuleDisabled => "rule_disabled",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::DailyLimitExceeded => "daily_limit_exceeded",
            Self::ContactCooldown => "contact_cooldown",
            Self::ConversationCooldown => "conversation_cooldown",
            Self::LoopDetected => "loop_detected",
            Self::OutsideBusinessHours => "outside_business_hours",
            Self::FilterNotMatched => "filter_not_matched",
            Self::ConditionNotMet => "condition_not_met",
            Self::NoReplyWindow => "no_reply_window",
            Self::DryRun => "dry_run",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "global_kill_switch" => Some(Self::GlobalKillSwitch),
            "workspace_disabled" => Some(Self::WorkspaceDisabled),
            "rule_disabled" => Some(Self::RuleDisabled),
            "rate_limit_exceeded" => Some(Self::RateLimitExceeded),
            "daily_limit_exceeded" => Some(Self::DailyLimitExceeded),
            "contact_cooldown" => Some(Self::ContactCooldown),
            "conversation_cooldown" => Some(Self::ConversationCooldown),
            "loop_detected" => Some(Self::LoopDetected),
            "outside_business_hours" => Some(Self::OutsideBusinessHours),
            "filter_not_matched" => Some(Self::FilterNotMatched),
            "condition_not_met" => Some(Self::ConditionNotMet),
            "no_reply_window" => Some(Self::NoReplyWindow),
            "dry_run" => Some(Self::DryRun),
            _ => None,
        }
    }
}

/// Why an attempted execution failed. Failures are unexpected outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    ActionFailed,
    TemplateInvalid,
    InvalidRecipient,
    ProviderError,
    PermissionDenied,
    ResourceNotFound,
    InternalError,
    Timeout,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActionFailed => "action_failed",
            Self::TemplateInvalid => "template_invalid",
            Self::InvalidRecipient => "invalid_recipient",
            Self::ProviderError => "provider_error",
            Self::PermissionDenied => "permission_denied",
            Self::ResourceNotFound => "resource_not_found",
            Self::InternalError => "internal_error",
            Self::Timeout => "timeout",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "action_failed" => Some(Self::ActionFailed),
            "template_invalid" => Some(Self::TemplateInvalid),
            "invalid_recipient" => Some(Self::InvalidRecipient),
            "provider_error" => Some(Self::ProviderError),
            "permission_denied" => Some(Self::PermissionDenied),
            "resource_not_found" => Some(Self::ResourceNotFound),
            "internal_error" => Some(Self::InternalError),
            "timeout" => Some(Self::Timeout),
            _ => None,
        }
    }
}

/// Error raised by an action adapter. Each variant maps onto the closed
/// `FailureReason` taxonomy recorded in the audit trail.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("template rejected: {0}")]
    TemplateInvalid(String),

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("action timed out after {0}ms")]
    Timeout(u64),

    #[error("{0}")]
    Internal(String),
}

impl ActionError {
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::TemplateInvalid(_) => FailureReason::TemplateInvalid,
            Self::InvalidRecipient(_) => FailureReason::InvalidRecipient,
            Self::Provider(_) => FailureReason::ProviderError,
            Self::PermissionDenied(_) => FailureReason::PermissionDenied,
            Self::NotFound(_) => FailureReason::ResourceNotFound,
            Self::Timeout(_) => FailureReason::Timeout,
            Self::Internal(_) => FailureReason::InternalError,
        }
    }
}

/// Outcome of one action within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Failed,
    Skipped,
}

/// Per-action result recorded in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_type: String,
    pub index: u32,
    pub status: ActionStatus,
    pub error: Option<String>,
    pub failure_reason: Option<FailureReason>,
    /// Adapter-specific result (e.g. provider message id, deal id).
    pub result: Option<serde_json::Value>,
    pub duration_ms: u64,
}

/// One record per (rule, event) attempt. Append-only after finalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationExecution {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub tenant_id: String,
    pub trigger_event: TriggerEvent,
    pub conversation_id: Option<String>,
    pub contact_id: Option<String>,
    pub message_id: Option<String>,
    pub status: ExecutionStatus,
    pub skip_reason: Option<SkipReason>,
    pub failure_reason: Option<FailureReason>,
    pub action_results: Vec<ActionResult>,
    pub is_dry_run: bool,
    pub is_manual_test: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl AutomationExecution {
    /// Pending record created at the start of rule processing.
    pub fn begin(
        rule_id: Uuid,
        tenant_id: impl Into<String>,
        trigger_event: TriggerEvent,
        conversation_id: Option<String>,
        contact_id: Option<String>,
        message_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            rule_id,
            tenant_id: tenant_id.into(),
            trigger_event,
            conversation_id,
            contact_id,
            message_id,
            status: ExecutionStatus::Pending,
            skip_reason: None,
            failure_reason: None,
            action_results: Vec::new(),
            is_dry_run: false,
            is_manual_test: false,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.is_dry_run = true;
        self
    }

    pub fn manual_test(mut self) -> Self {
        self.is_manual_test = true;
        self
    }

    /// Finalize as skipped. Clears action results to preserve the record
    /// invariant: a skip carries a reason and no completed actions.
    pub fn finish_skipped(&mut self, reason: SkipReason, now: DateTime<Utc>) {
        self.status = ExecutionStatus::Skipped;
        self.skip_reason = Some(reason);
        self.failure_reason = None;
        self.action_results.clear();
        self.complete(now);
    }

    /// Finalize with executor results.
    pub fn finish_executed(
        &mut self,
        status: ExecutionStatus,
        failure_reason: Option<FailureReason>,
        action_results: Vec<ActionResult>,
        now: DateTime<Utc>,
    ) {
        debug_assert!(!matches!(status, ExecutionStatus::Skipped | ExecutionStatus::Pending));
        self.status = status;
        self.skip_reason = None;
        self.failure_reason = failure_reason;
        self.action_results = action_results;
        self.complete(now);
    }

    fn complete(&mut self, now: DateTime<Utc>) {
        self.completed_at = Some(now);
        let elapsed = (now - self.started_at).num_milliseconds();
        self.duration_ms = Some(elapsed.max(0) as u64);
    }

    pub fn is_finalized(&self) -> bool {
        self.completed_at.is_some()
    }
}
