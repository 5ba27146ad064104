//! Service layer: the automation pipeline and its supporting pieces.

pub mod conditions;
pub mod engine;
pub mod enricher;
pub mod event_bus;
pub mod executor;
pub mod matcher;
pub mod rate_limit;
pub mod recorder;
pub mod safety;

pub use conditions::{ConditionCheck, ConditionEvaluation};
pub use engine::{AutomationEngine, EngineState, EngineStatus};
pub use enricher::ContextEnricher;
pub use event_bus::{EventBus, EventBusConfig};
pub use executor::{ActionExecutor, ExecutionOutcome};
pub use matcher::{RuleMatcher, RuleSimulation, SimulationReport, TestRuleOutcome};
pub use rate_limit::InMemoryRateLimitStore;
pub use recorder::ExecutionRecorder;
pub use safety::{Admission, GuardConfig, SafetyGuard, LOOP_THRESHOLD, LOOP_WINDOW_SECS};
