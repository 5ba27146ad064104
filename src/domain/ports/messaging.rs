//! Outbound messaging provider port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::models::event::MessageKind;
use crate::domain::models::execution::ActionError;

/// Template message resolved against the evaluation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateMessage {
    pub template_name: String,
    pub language: String,
    pub variables: HashMap<String, String>,
}

/// Media message resolved against the evaluation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaMessage {
    pub media_url: String,
    pub media_kind: MessageKind,
    pub caption: Option<String>,
}

/// Receipt returned by the provider for a delivered message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderReceipt {
    pub external_id: String,
}

/// Adapter over the outbound messaging provider. The wire format is the
/// adapter's concern; the engine only needs this contract.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send_template(
        &self,
        tenant_id: &str,
        recipient: &str,
        message: &TemplateMessage,
    ) -> Result<ProviderReceipt, ActionError>;

    async fn send_text(
        &self,
        tenant_id: &str,
        recipient: &str,
        body: &str,
    ) -> Result<ProviderReceipt, ActionError>;

    async fn send_media(
        &self,
        tenant_id: &str,
        recipient: &str,
        message: &MediaMessage,
    ) -> Result<ProviderReceipt, ActionError>;
}
