//! Engine Controller: process-wide lifecycle around the rule pipeline.
//!
//! `STOPPED → STARTING → RUNNING → STOPPING → STOPPED`. While running, a
//! forwarder task subscribes to the EventBus, deduplicates short-window
//! duplicates, and feeds bounded per-partition queues consumed by a fixed
//! worker pool. Events are partitioned by tenant hash so per-tenant
//! ordering holds inside a partition and the bounded queues give
//! backpressure. `stop()` closes the queues and drains in-flight work.
//!
//! The global kill switch is orthogonal to this lifecycle: flipping it on
//! leaves the subscription alive, so events are still observed and
//! recorded, but every rule admission fails with `GLOBAL_KILL_SWITCH`.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::config::EngineConfig;
use crate::domain::models::event::AutomationEvent;
use crate::domain::models::execution::AutomationExecution;
use crate::domain::ports::rate_limit_store::{RateCounters, RateLimitStore};
use crate::domain::ports::{RuleRepository, TenantSettingsStore};
use crate::services::event_bus::EventBus;
use crate::services::matcher::{RuleMatcher, SimulationReport, TestRuleOutcome};
use crate::services::recorder::ExecutionRecorder;
use crate::services::safety::SafetyGuard;

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

/// Status report exposed to operators.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub running: bool,
    pub kill_switch: bool,
    pub queue_depth: usize,
    pub events_processed: u64,
    pub events_deduplicated: u64,
    pub executions_recorded: u64,
    pub recorder_write_failures: u64,
    pub global_counters: RateCounters,
}

/// Serializes concurrent event processing per conversation/contact scope,
/// so guard-rail queries never race for the same history slice.
#[derive(Default)]
struct ScopeLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ScopeLocks {
    async fn acquire(&self, key: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() > 4096 {
                locks.retain(|_, l| Arc::strong_count(l) > 1);
            }
            locks.entry(key.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct AutomationEngine {
    matcher: Arc<RuleMatcher>,
    guard: Arc<SafetyGuard>,
    rules: Arc<dyn RuleRepository>,
    tenant_settings: Arc<dyn TenantSettingsStore>,
    rate_limits: Arc<dyn RateLimitStore>,
    recorder: Arc<ExecutionRecorder>,
    event_bus: Arc<EventBus>,
    config: EngineConfig,
    kill_switch: Arc<AtomicBool>,
    state: Arc<RwLock<EngineState>>,
    running: Arc<AtomicBool>,
    queue_depth: Arc<AtomicUsize>,
    events_processed: Arc<AtomicU64>,
    events_deduplicated: Arc<AtomicU64>,
    scope_locks: Arc<ScopeLocks>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AutomationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        matcher: Arc<RuleMatcher>,
        guard: Arc<SafetyGuard>,
        rules: Arc<dyn RuleRepository>,
        tenant_settings: Arc<dyn TenantSettingsStore>,
        rate_limits: Arc<dyn RateLimitStore>,
        recorder: Arc<ExecutionRecorder>,
        event_bus: Arc<EventBus>,
        kill_switch: Arc<AtomicBool>,
        config: EngineConfig,
    ) -> Self {
        Self {
            matcher,
            guard,
            rules,
            tenant_settings,
            rate_limits,
            recorder,
            event_bus,
            config,
            kill_switch,
            state: Arc::new(RwLock::new(EngineState::Stopped)),
            running: Arc::new(AtomicBool::new(false)),
            queue_depth: Arc::new(AtomicUsize::new(0)),
            events_processed: Arc::new(AtomicU64::new(0)),
            events_deduplicated: Arc::new(AtomicU64::new(0)),
            scope_locks: Arc::new(ScopeLocks::default()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to the event stream and start the worker pool.
    pub async fn start(&self) -> DomainResult<()> {
        {
            let mut state = self.state.write().await;
            if *state != EngineState::Stopped {
                return Err(DomainError::InvalidStateTransition {
                    from: state.to_string(),
                    to: "starting".to_string(),
                    reason: "engine already started".to_string(),
                });
            }
            *state = EngineState::Starting;
        }

        self.running.store(true, Ordering::SeqCst);

        let partitions = self.config.worker_partitions.max(1);
        let mut senders = Vec::with_capacity(partitions);
        let mut tasks = self.tasks.lock().await;

        for partition in 0..partitions {
            let (tx, mut rx) = mpsc::channel::<AutomationEvent>(self.config.partition_queue_capacity);
            senders.push(tx);

            let matcher = self.matcher.clone();
            let scope_locks = self.scope_locks.clone();
            let queue_depth = self.queue_depth.clone();
            let events_processed = self.events_processed.clone();

            tasks.push(tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    queue_depth.fetch_sub(1, Ordering::SeqCst);
                    let scope = event_scope(&event);
                    let _guard = scope_locks.acquire(&scope).await;
                    matcher.process_event(event).await;
                    events_processed.fetch_add(1, Ordering::Relaxed);
                }
                tracing::debug!(partition, "Worker partition drained");
            }));
        }

        // Forwarder: broadcast -> dedup -> partition queues.
        let mut receiver = self.event_bus.subscribe();
        let running = self.running.clone();
        let queue_depth = self.queue_depth.clone();
        let events_deduplicated = self.events_deduplicated.clone();
        let dedup_window = Duration::from_secs(self.config.dedup_window_secs);

        tasks.push(tokio::spawn(async move {
            let mut dedup: HashMap<String, Instant> = HashMap::new();

            while running.load(Ordering::SeqCst) {
                let event = match tokio::time::timeout(Duration::from_secs(1), receiver.recv()).await
                {
                    Ok(Ok(event)) => event,
                    Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(n))) => {
                        tracing::warn!(missed = n, "Engine forwarder lagged behind the event bus");
                        continue;
                    }
                    Ok(Err(tokio::sync::broadcast::error::RecvError::Closed)) => break,
                    Err(_) => continue, // timeout: re-check the running flag
                };

                // Short-window dedup for at-least-once delivery.
                dedup.retain(|_, seen| seen.elapsed() < dedup_window);
                match dedup.entry(event.dedup_key()) {
                    std::collections::hash_map::Entry::Occupied(_) => {
                        events_deduplicated.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    std::collections::hash_map::Entry::Vacant(slot) => {
                        slot.insert(Instant::now());
                    }
                }

                let partition = partition_for(&event.tenant_id, senders.len());
                queue_depth.fetch_add(1, Ordering::SeqCst);
                if senders[partition].send(event).await.is_err() {
                    queue_depth.fetch_sub(1, Ordering::SeqCst);
                    break;
                }
            }
            // Dropping the senders closes the partition queues; workers
            // drain whatever is still in flight.
            drop(senders);
        }));

        // Retention sweep.
        let recorder = self.recorder.clone();
        let running = self.running.clone();
        let retention_days = self.config.execution_retention_days;
        tasks.push(tokio::spawn(async move {
            let mut last_sweep = Instant::now();
            while running.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(1)).await;
                if last_sweep.elapsed() < Duration::from_secs(3600) {
                    continue;
                }
                last_sweep = Instant::now();
                let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
                match recorder.purge_older_than(cutoff).await {
                    Ok(0) => {}
                    Ok(purged) => tracing::info!(purged, "Expired execution records"),
                    Err(e) => tracing::warn!(error = %e, "Execution retention sweep failed"),
                }
            }
        }));

        drop(tasks);
        {
            let mut state = self.state.write().await;
            *state = EngineState::Running;
        }
        tracing::info!(partitions, "Automation engine started");
        Ok(())
    }

    /// Unsubscribe and drain. Idempotent: stopping a stopped engine is a
    /// no-op.
    pub async fn stop(&self) {
        {
            let mut state = self.state.write().await;
            match *state {
                EngineState::Stopped | EngineState::Stopping => return,
                _ => *state = EngineState::Stopping,
            }
        }

        self.running.store(false, Ordering::SeqCst);

        let tasks: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().await;
            tasks.drain(..).collect()
        };
        for task in tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "Engine task ended abnormally");
                }
            }
        }

        {
            let mut state = self.state.write().await;
            *state = EngineState::Stopped;
        }
        tracing::info!("Automation engine stopped");
    }

    /// Flip the global kill switch. Running stays running; admissions fail.
    pub fn set_global_kill_switch(&self, engaged: bool) {
        self.kill_switch.store(engaged, Ordering::SeqCst);
        if engaged {
            tracing::warn!("Global kill switch ENGAGED: no automation will execute");
        } else {
            tracing::info!("Global kill switch released");
        }
    }

    pub fn kill_switch_engaged(&self) -> bool {
        self.kill_switch.load(Ordering::SeqCst)
    }

    /// Persist a tenant's automation toggle and drop its cache entry.
    pub async fn set_tenant_automation_enabled(
        &self,
        tenant_id: &str,
        enabled: bool,
    ) -> DomainResult<()> {
        self.tenant_settings
            .set_automation_enabled(tenant_id, enabled)
            .await?;
        self.guard.invalidate_tenant(tenant_id).await;
        tracing::info!(tenant_id, enabled, "Tenant automation toggled");
        Ok(())
    }

    /// Dry-run a single rule against an event. No side effects, no counter
    /// movement; the recorded execution is flagged `is_dry_run`.
    pub async fn test_rule(
        &self,
        rule_id: Uuid,
        event: AutomationEvent,
    ) -> DomainResult<TestRuleOutcome> {
        let rule = self
            .rules
            .get(rule_id)
            .await?
            .ok_or(DomainError::RuleNotFound(rule_id))?;
        Ok(self.matcher.test_rule(&rule, event).await)
    }

    /// Evaluate guards and conditions for every candidate rule without
    /// executing actions or mutating counters.
    pub async fn simulate_event(&self, event: AutomationEvent) -> SimulationReport {
        self.matcher.simulate_event(event).await
    }

    /// Process one event synchronously, bypassing the queue. Used by the
    /// CLI and tests; the same pipeline the workers run.
    pub async fn process_event_now(&self, event: AutomationEvent) -> Vec<AutomationExecution> {
        let scope = event_scope(&event);
        let _guard = self.scope_locks.acquire(&scope).await;
        let executions = self.matcher.process_event(event).await;
        self.events_processed.fetch_add(1, Ordering::Relaxed);
        executions
    }

    pub async fn status(&self) -> EngineStatus {
        let state = *self.state.read().await;
        EngineStatus {
            state,
            running: state == EngineState::Running,
            kill_switch: self.kill_switch.load(Ordering::SeqCst),
            queue_depth: self.queue_depth.load(Ordering::SeqCst),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            events_deduplicated: self.events_deduplicated.load(Ordering::Relaxed),
            executions_recorded: self.recorder.recorded(),
            recorder_write_failures: self.recorder.write_failures(),
            global_counters: self.rate_limits.global_counters(Utc::now()).await,
        }
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }
}

/// Serialization scope for an event: conversation when present, else
/// contact, else the tenant as a whole.
fn event_scope(event: &AutomationEvent) -> String {
    match (&event.conversation_id, &event.contact_id) {
        (Some(conversation), _) => format!("{}:conv:{}", event.tenant_id, conversation),
        (None, Some(contact)) => format!("{}:contact:{}", event.tenant_id, contact),
        (None, None) => format!("{}:tenant", event.tenant_id),
    }
}

fn partition_for(tenant_id: &str, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    tenant_id.hash(&mut hasher);
    (hasher.finish() as usize) % partitions.max(1)
}
