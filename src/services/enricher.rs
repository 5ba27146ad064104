//! Context Enricher: merges best-effort entity snapshots into the event.
//!
//! Loading failures are non-fatal: the snapshot is omitted, the failure
//! logged, and the pipeline proceeds with a partial context.

use std::sync::Arc;

use crate::domain::models::context::EvaluationContext;
use crate::domain::models::event::AutomationEvent;
use crate::domain::ports::EntityStore;

pub struct ContextEnricher {
    entity_store: Arc<dyn EntityStore>,
}

impl ContextEnricher {
    pub fn new(entity_store: Arc<dyn EntityStore>) -> Self {
        Self { entity_store }
    }

    /// Build the evaluation context for an event. Never fails.
    pub async fn enrich(&self, event: AutomationEvent) -> EvaluationContext {
        let mut context = EvaluationContext::new(event);

        if let Some(contact_id) = context.event.contact_id.clone() {
            match self
                .entity_store
                .contact(&context.event.tenant_id, &contact_id)
                .await
            {
                Ok(snapshot) => context.contact = snapshot,
                Err(e) => {
                    tracing::warn!(
                        tenant_id = %context.event.tenant_id,
                        contact_id = %contact_id,
                        error = %e,
                        "Contact snapshot load failed, continuing with partial context"
                    );
                }
            }
        }

        if let Some(conversation_id) = context.event.conversation_id.clone() {
            match self
                .entity_store
                .conversation(&context.event.tenant_id, &conversation_id)
                .await
            {
                Ok(snapshot) => context.conversation = snapshot,
                Err(e) => {
                    tracing::warn!(
                        tenant_id = %context.event.tenant_id,
                        conversation_id = %conversation_id,
                        error = %e,
                        "Conversation snapshot load failed, continuing with partial context"
                    );
                }
            }
        }

        context
    }
}
