//! Automation rule model: trigger, filters, conditions, actions, limits.
//!
//! A rule is tenant-scoped configuration. The engine mutates only its
//! runtime counters and stats; everything else is owned by the CRUD layer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::{Channel, MessageKind, TriggerEvent};

// ---------------------------------------------------------------------------
// Trigger filters
// ---------------------------------------------------------------------------

/// Coarse filters evaluated against the raw event before the safety guard
/// runs. A mismatch skips the rule without consuming any rate-limit budget.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerFilters {
    /// Match only events on this channel.
    pub channel: Option<Channel>,
    /// Match only these message kinds (empty = match all).
    #[serde(default)]
    pub message_kinds: Vec<MessageKind>,
    /// Match only if the message body contains at least one keyword.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Contact must carry all of these tags.
    #[serde(default)]
    pub required_tags: Vec<String>,
    /// Contact must carry none of these tags.
    #[serde(default)]
    pub excluded_tags: Vec<String>,
    /// Match only conversations from this source (e.g. an ad campaign).
    pub source: Option<String>,
    /// Gate execution on the tenant's business hours.
    #[serde(default)]
    pub business_hours_only: bool,
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// Comparison operator for a rule condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    IsEmpty,
    IsNotEmpty,
    In,
    NotIn,
    MatchesRegex,
    TimeWithin,
    DayOfWeek,
}

/// How a condition combines with its predecessor.
///
/// `Or` starts a new alternative group: `[{A,and},{B,or},{C,and}]`
/// evaluates as `(A) OR (B AND C)`, resolved left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

/// A single condition over the enriched evaluation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted path into the context, e.g. `message.body`, `contact.tags`.
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub logical: LogicalOperator,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: serde_json::Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
            logical: LogicalOperator::And,
        }
    }

    pub fn or(mut self) -> Self {
        self.logical = LogicalOperator::Or;
        self
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Strongly-typed config per action type, tagged on the wire.
///
/// String-valued fields support `{{path}}` placeholders resolved against
/// the evaluation context at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionConfig {
    SendTemplate {
        template_name: String,
        language: String,
        #[serde(default)]
        variables: HashMap<String, String>,
    },
    SendText {
        body: String,
    },
    SendMedia {
        media_url: String,
        media_kind: MessageKind,
        caption: Option<String>,
    },
    AssignConversation {
        assignee_id: String,
    },
    MoveStage {
        stage_id: String,
        /// Deal to move; defaults to the deal referenced by the event.
        deal_id: Option<String>,
    },
    CreateDeal {
        pipeline_id: String,
        stage_id: String,
        title: String,
        value: Option<f64>,
    },
    NotifyAgent {
        agent_id: String,
        message: String,
    },
    CallWebhook {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    UpdateContact {
        #[serde(default)]
        fields: HashMap<String, String>,
        #[serde(default)]
        add_tags: Vec<String>,
        #[serde(default)]
        remove_tags: Vec<String>,
    },
    AddNote {
        body: String,
    },
    CloseConversation,
    ResolveConversation,
}

impl ActionConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SendTemplate { .. } => "send_template",
            Self::SendText { .. } => "send_text",
            Self::SendMedia { .. } => "send_media",
            Self::AssignConversation { .. } => "assign_conversation",
            Self::MoveStage { .. } => "move_stage",
            Self::CreateDeal { .. } => "create_deal",
            Self::NotifyAgent { .. } => "notify_agent",
            Self::CallWebhook { .. } => "call_webhook",
            Self::UpdateContact { .. } => "update_contact",
            Self::AddNote { .. } => "add_note",
            Self::CloseConversation => "close_conversation",
            Self::ResolveConversation => "resolve_conversation",
        }
    }

    /// Whether the action delivers a free-form message into the
    /// conversation (subject to the 24h reply window). Template sends are
    /// exempt: templates are the provider's mechanism for re-opening a
    /// window.
    pub fn requires_reply_window(&self) -> bool {
        matches!(self, Self::SendText { .. } | Self::SendMedia { .. })
    }
}

/// One step in a rule's ordered action list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleAction {
    pub config: ActionConfig,
    pub order: u32,
    /// When true, a failure of this action does not stop the rest of the
    /// action list; the overall execution becomes PARTIAL instead of FAILED.
    #[serde(default)]
    pub continue_on_failure: bool,
}

impl RuleAction {
    pub fn new(order: u32, config: ActionConfig) -> Self {
        Self {
            config,
            order,
            continue_on_failure: false,
        }
    }

    pub fn continue_on_failure(mut self) -> Self {
        self.continue_on_failure = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Rate limits and runtime state
// ---------------------------------------------------------------------------

/// Per-rule rate-limit configuration. Zero disables the corresponding check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleRateLimit {
    /// Maximum executions per `window_seconds`.
    #[serde(default = "default_max_executions")]
    pub max_executions: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Rule-level daily ceiling across all contacts.
    #[serde(default)]
    pub daily_execution_limit: u32,
    #[serde(default)]
    pub per_contact_cooldown_seconds: u64,
    #[serde(default)]
    pub per_conversation_cooldown_seconds: u64,
    #[serde(default)]
    pub max_per_contact_per_day: u32,
}

const fn default_max_executions() -> u32 {
    60
}

const fn default_window_seconds() -> u64 {
    60
}

impl Default for RuleRateLimit {
    fn default() -> Self {
        Self {
            max_executions: default_max_executions(),
            window_seconds: default_window_seconds(),
            daily_execution_limit: 0,
            per_contact_cooldown_seconds: 0,
            per_conversation_cooldown_seconds: 0,
            max_per_contact_per_day: 0,
        }
    }
}

/// Engine-maintained counters enforcing the rule-level sliding window and
/// daily cap. The window resets lazily on access.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleCounters {
    pub current_window_count: u32,
    pub current_window_start: Option<DateTime<Utc>>,
    pub daily_execution_count: u32,
    pub daily_execution_reset_at: Option<DateTime<Utc>>,
}

impl RuleCounters {
    /// Executions inside the current window, treating an expired window as
    /// empty without mutating anything.
    pub fn effective_window_count(&self, window_seconds: u64, now: DateTime<Utc>) -> u32 {
        match self.current_window_start {
            Some(start) if (now - start).num_seconds() < window_seconds as i64 => {
                self.current_window_count
            }
            _ => 0,
        }
    }

    /// Executions today, treating a lapsed 24h period as empty.
    pub fn effective_daily_count(&self, now: DateTime<Utc>) -> u32 {
        match self.daily_execution_reset_at {
            Some(reset_at) if now < reset_at => self.daily_execution_count,
            _ => 0,
        }
    }

    /// Record one executed attempt, resetting lapsed windows first.
    pub fn record(&mut self, window_seconds: u64, now: DateTime<Utc>) {
        if self.effective_window_count(window_seconds, now) == 0 {
            self.current_window_start = Some(now);
            self.current_window_count = 0;
        }
        self.current_window_count += 1;

        if self.effective_daily_count(now) == 0 {
            self.daily_execution_reset_at = Some(now + chrono::Duration::hours(24));
            self.daily_execution_count = 0;
        }
        self.daily_execution_count += 1;
    }
}

/// Cumulative per-rule outcome totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleStats {
    pub total_matched: u64,
    pub total_succeeded: u64,
    pub total_partial: u64,
    pub total_failed: u64,
    pub total_skipped: u64,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// AutomationRule
// ---------------------------------------------------------------------------

/// A tenant-defined automation rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    /// Higher priority evaluates first; ties break on creation order.
    pub priority: i32,
    pub trigger: TriggerEvent,
    #[serde(default)]
    pub filters: TriggerFilters,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub actions: Vec<RuleAction>,
    #[serde(default)]
    pub rate_limit: RuleRateLimit,
    #[serde(default)]
    pub counters: RuleCounters,
    #[serde(default)]
    pub stats: RuleStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft delete: rules referenced by execution history are never
    /// hard-deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl AutomationRule {
    pub fn new(
        tenant_id: impl Into<String>,
        name: impl Into<String>,
        trigger: TriggerEvent,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            name: name.into(),
            description: String::new(),
            enabled: true,
            priority: 0,
            trigger,
            filters: TriggerFilters::default(),
            conditions: Vec::new(),
            actions: Vec::new(),
            rate_limit: RuleRateLimit::default(),
            counters: RuleCounters::default(),
            stats: RuleStats::default(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_filters(mut self, filters: TriggerFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RuleRateLimit) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Actions sorted by their `order` field.
    pub fn sorted_actions(&self) -> Vec<&RuleAction> {
        let mut actions: Vec<&RuleAction> = self.actions.iter().collect();
        actions.sort_by_key(|a| a.order);
        actions
    }

    /// Whether any action needs an open 24h reply window.
    pub fn needs_reply_window(&self) -> bool {
        self.actions.iter().any(|a| a.config.requires_reply_window())
    }
}
