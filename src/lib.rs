//! Meridian: Automation Rule Engine
//!
//! Meridian reacts to business events inside a multi-tenant messaging
//! platform: it matches events against tenant-defined rules, enforces
//! layered safety guards (kill switch, rate limits, cooldowns, loop
//! detection), executes side-effecting actions and records an immutable
//! audit trail of every attempt.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, ports and errors
//! - **Service Layer** (`services`): the automation pipeline
//! - **Adapters** (`adapters`): SQLite repositories, HTTP webhook client
//! - **Infrastructure** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use meridian::services::AutomationEngine;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Wire adapters, build the engine, start it.
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    ActionConfig, AutomationEvent, AutomationExecution, AutomationRule, Condition,
    ConditionOperator, Config, EvaluationContext, ExecutionStatus, FailureReason, LogicalOperator,
    RuleAction, RuleRateLimit, SkipReason, TriggerEvent, TriggerFilters,
};
pub use domain::ports::{
    EntityStore, ExecutionStore, MessagingProvider, PipelineAdapter, RateLimitStore,
    RuleRepository, TenantSettingsStore, WebhookAdapter,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{AutomationEngine, EngineState, EngineStatus, EventBus};
