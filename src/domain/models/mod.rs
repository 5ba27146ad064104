//! Domain models for the Meridian automation engine.

pub mod config;
pub mod context;
pub mod event;
pub mod execution;
pub mod rule;

pub use config::{
    BusinessHours, Config, DatabaseConfig, DayHours, EngineConfig, LoggingConfig, RateLimitsConfig,
};
pub use context::{ContactSnapshot, ConversationSnapshot, EvaluationContext};
pub use event::{AutomationEvent, Channel, EventId, MessageKind, SequenceNumber, TriggerEvent};
pub use execution::{
    ActionError, ActionResult, ActionStatus, AutomationExecution, ExecutionStatus, FailureReason,
    SkipReason,
};
pub use rule::{
    ActionConfig, AutomationRule, Condition, ConditionOperator, LogicalOperator, RuleAction,
    RuleCounters, RuleRateLimit, RuleStats, TriggerFilters,
};
