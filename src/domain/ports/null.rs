//! Null implementations of the side-effecting ports.
//!
//! Used when no real provider is wired (local runs, simulation, tests):
//! every call logs at debug level and reports success without touching
//! anything outside the process.

use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::models::execution::ActionError;
use crate::domain::ports::crm::{ContactPatch, NewDeal, PipelineAdapter};
use crate::domain::ports::messaging::{
    MediaMessage, MessagingProvider, ProviderReceipt, TemplateMessage,
};
use crate::domain::ports::webhook::WebhookAdapter;

#[derive(Debug, Default, Clone, Copy)]
pub struct NullMessagingProvider;

#[async_trait]
impl MessagingProvider for NullMessagingProvider {
    async fn send_template(
        &self,
        tenant_id: &str,
        recipient: &str,
        message: &TemplateMessage,
    ) -> Result<ProviderReceipt, ActionError> {
        tracing::debug!(tenant_id, recipient, template = %message.template_name, "null send_template");
        Ok(ProviderReceipt {
            external_id: Uuid::new_v4().to_string(),
        })
    }

    async fn send_text(
        &self,
        tenant_id: &str,
        recipient: &str,
        _body: &str,
    ) -> Result<ProviderReceipt, ActionError> {
        tracing::debug!(tenant_id, recipient, "null send_text");
        Ok(ProviderReceipt {
            external_id: Uuid::new_v4().to_string(),
        })
    }

    async fn send_media(
        &self,
        tenant_id: &str,
        recipient: &str,
        message: &MediaMessage,
    ) -> Result<ProviderReceipt, ActionError> {
        tracing::debug!(tenant_id, recipient, url = %message.media_url, "null send_media");
        Ok(ProviderReceipt {
            external_id: Uuid::new_v4().to_string(),
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullPipelineAdapter;

#[async_trait]
impl PipelineAdapter for NullPipelineAdapter {
    async fn assign_conversation(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        assignee_id: &str,
    ) -> Result<(), ActionError> {
        tracing::debug!(tenant_id, conversation_id, assignee_id, "null assign_conversation");
        Ok(())
    }

    async fn move_stage(
        &self,
        tenant_id: &str,
        deal_id: &str,
        stage_id: &str,
    ) -> Result<(), ActionError> {
        tracing::debug!(tenant_id, deal_id, stage_id, "null move_stage");
        Ok(())
    }

    async fn create_deal(&self, tenant_id: &str, deal: &NewDeal) -> Result<String, ActionError> {
        tracing::debug!(tenant_id, title = %deal.title, "null create_deal");
        Ok(Uuid::new_v4().to_string())
    }

    async fn notify_agent(
        &self,
        tenant_id: &str,
        agent_id: &str,
        _message: &str,
    ) -> Result<(), ActionError> {
        tracing::debug!(tenant_id, agent_id, "null notify_agent");
        Ok(())
    }

    async fn update_contact(
        &self,
        tenant_id: &str,
        contact_id: &str,
        _patch: &ContactPatch,
    ) -> Result<(), ActionError> {
        tracing::debug!(tenant_id, contact_id, "null update_contact");
        Ok(())
    }

    async fn add_note(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        _body: &str,
    ) -> Result<(), ActionError> {
        tracing::debug!(tenant_id, conversation_id, "null add_note");
        Ok(())
    }

    async fn close_conversation(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        resolved: bool,
    ) -> Result<(), ActionError> {
        tracing::debug!(tenant_id, conversation_id, resolved, "null close_conversation");
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullWebhookAdapter;

#[async_trait]
impl WebhookAdapter for NullWebhookAdapter {
    async fn post(
        &self,
        url: &str,
        _payload: &serde_json::Value,
        _headers: &HashMap<String, String>,
    ) -> Result<u16, ActionError> {
        tracing::debug!(url, "null webhook post");
        Ok(200)
    }
}

/// Entity store that never finds anything; enrichment proceeds with a
/// bare event context.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEntityStore;

#[async_trait]
impl crate::domain::ports::entity_store::EntityStore for NullEntityStore {
    async fn contact(
        &self,
        _tenant_id: &str,
        _contact_id: &str,
    ) -> crate::domain::errors::DomainResult<Option<crate::domain::models::context::ContactSnapshot>>
    {
        Ok(None)
    }

    async fn conversation(
        &self,
        _tenant_id: &str,
        _conversation_id: &str,
    ) -> crate::domain::errors::DomainResult<
        Option<crate::domain::models::context::ConversationSnapshot>,
    > {
        Ok(None)
    }
}
