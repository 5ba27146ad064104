//! CLI command implementations and shared wiring.

pub mod executions;
pub mod rules;
pub mod run;
pub mod simulate;
pub mod test_rule;

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::adapters::http::HttpWebhookAdapter;
use crate::adapters::sqlite::{
    initialize_database, SqliteExecutionStore, SqliteRuleRepository, SqliteTenantSettingsStore,
};
use crate::domain::models::config::Config;
use crate::domain::ports::{
    ExecutionStore, NullEntityStore, NullMessagingProvider, NullPipelineAdapter, RuleRepository,
};
use crate::infrastructure::config::ConfigLoader;
use crate::services::{
    ActionExecutor, AutomationEngine, ContextEnricher, EventBus, EventBusConfig,
    ExecutionRecorder, GuardConfig, InMemoryRateLimitStore, RuleMatcher, SafetyGuard,
};

/// Everything a command needs: the wired engine plus direct handles to the
/// stores for inspection commands.
pub struct Runtime {
    pub config: Config,
    pub engine: Arc<AutomationEngine>,
    pub event_bus: Arc<EventBus>,
    pub rules: Arc<dyn RuleRepository>,
    pub executions: Arc<dyn ExecutionStore>,
}

/// Load config and assemble the engine.
///
/// The messaging and pipeline ports get null adapters here; the binary is
/// the integration seam where a deployment wires its real providers.
/// Webhooks go out over HTTP for real.
pub async fn build_runtime(config_path: Option<&Path>) -> Result<Runtime> {
    let config = match config_path {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };

    let database_url = format!("sqlite:{}", config.database.path);
    let pool = initialize_database(&database_url)
        .await
        .with_context(|| format!("Failed to open database at {}", config.database.path))?;

    let rules: Arc<dyn RuleRepository> = Arc::new(SqliteRuleRepository::new(pool.clone()));
    let executions: Arc<dyn ExecutionStore> = Arc::new(SqliteExecutionStore::new(pool.clone()));
    let tenant_settings = Arc::new(SqliteTenantSettingsStore::new(pool));

    let kill_switch = Arc::new(AtomicBool::new(false));
    let rate_limits = Arc::new(InMemoryRateLimitStore::new(config.rate_limits.clone()));
    let guard = Arc::new(SafetyGuard::new(
        kill_switch.clone(),
        tenant_settings.clone(),
        rate_limits.clone(),
        executions.clone(),
        GuardConfig {
            tenant_cache_ttl: Duration::from_secs(config.engine.tenant_cache_ttl_secs),
            default_business_hours: config.business_hours.clone(),
        },
    ));

    let enricher = Arc::new(ContextEnricher::new(Arc::new(NullEntityStore)));
    let action_timeout = Duration::from_millis(config.engine.action_timeout_ms);
    let webhook = Arc::new(
        HttpWebhookAdapter::new(action_timeout).context("Failed to build webhook client")?,
    );
    let executor = Arc::new(ActionExecutor::new(
        Arc::new(NullMessagingProvider),
        Arc::new(NullPipelineAdapter),
        webhook,
        action_timeout,
    ));

    let recorder = Arc::new(ExecutionRecorder::new(executions.clone()));
    let matcher = Arc::new(RuleMatcher::new(
        rules.clone(),
        enricher,
        guard.clone(),
        executor,
        recorder.clone(),
        rate_limits.clone(),
        Duration::from_millis(config.engine.inter_rule_delay_ms),
    ));

    let event_bus = Arc::new(EventBus::new(EventBusConfig::default()));
    let engine = Arc::new(AutomationEngine::new(
        matcher,
        guard,
        rules.clone(),
        tenant_settings,
        rate_limits,
        recorder,
        event_bus.clone(),
        kill_switch,
        config.engine.clone(),
    ));

    Ok(Runtime {
        config,
        engine,
        event_bus,
        rules,
        executions,
    })
}

/// Read an event from a JSON file (`-` means stdin).
pub fn read_event(path: &Path) -> Result<crate::domain::models::event::AutomationEvent> {
    let raw = if path.as_os_str() == "-" {
        use std::io::Read;
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event file {}", path.display()))?
    };
    serde_json::from_str(&raw).context("Failed to parse event JSON")
}

/// Print a serializable value as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
