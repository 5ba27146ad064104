//! Execution Recorder: the single writer of the execution audit trail.
//!
//! A record is created pending at the start of rule processing and
//! finalized exactly once. Recorder write failures never propagate into
//! the dispatch loop: they are logged and surfaced through a counter in
//! the engine status.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::execution::AutomationExecution;
use crate::domain::ports::ExecutionStore;

pub struct ExecutionRecorder {
    store: Arc<dyn ExecutionStore>,
    write_failures: AtomicU64,
    recorded: AtomicU64,
}

impl ExecutionRecorder {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self {
            store,
            write_failures: AtomicU64::new(0),
            recorded: AtomicU64::new(0),
        }
    }

    /// Write the pending record. The write happens before the safety
    /// guard runs so loop detection sees the current attempt.
    pub async fn begin(&self, execution: &AutomationExecution) {
        if let Err(e) = self.store.begin(execution).await {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                execution_id = %execution.id,
                rule_id = %execution.rule_id,
                error = %e,
                "Failed to write pending execution record"
            );
        }
    }

    /// Write the final state. Must be called exactly once per record.
    pub async fn finalize(&self, execution: &AutomationExecution) {
        debug_assert!(execution.is_finalized());
        match self.store.finalize(execution).await {
            Ok(()) => {
                self.recorded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.write_failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    execution_id = %execution.id,
                    rule_id = %execution.rule_id,
                    status = execution.status.as_str(),
                    error = %e,
                    "Failed to finalize execution record"
                );
            }
        }
    }

    /// Expire records past the retention window.
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> DomainResult<u64> {
        self.store.purge_older_than(cutoff).await
    }

    pub fn recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }
}
