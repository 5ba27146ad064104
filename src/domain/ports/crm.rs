//! Pipeline/CRM adapter port: conversation assignment, deals, notes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::models::execution::ActionError;

/// Fields to create a deal with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDeal {
    pub pipeline_id: String,
    pub stage_id: String,
    pub title: String,
    pub value: Option<f64>,
    pub contact_id: Option<String>,
}

/// Contact mutation applied by the `update_contact` action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactPatch {
    pub fields: HashMap<String, String>,
    pub add_tags: Vec<String>,
    pub remove_tags: Vec<String>,
}

/// Adapter over the platform's pipeline/CRM subsystem.
#[async_trait]
pub trait PipelineAdapter: Send + Sync {
    async fn assign_conversation(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        assignee_id: &str,
    ) -> Result<(), ActionError>;

    async fn move_stage(
        &self,
        tenant_id: &str,
        deal_id: &str,
        stage_id: &str,
    ) -> Result<(), ActionError>;

    /// Returns the created deal's id.
    async fn create_deal(&self, tenant_id: &str, deal: &NewDeal) -> Result<String, ActionError>;

    async fn notify_agent(
        &self,
        tenant_id: &str,
        agent_id: &str,
        message: &str,
    ) -> Result<(), ActionError>;

    async fn update_contact(
        &self,
        tenant_id: &str,
        contact_id: &str,
        patch: &ContactPatch,
    ) -> Result<(), ActionError>;

    async fn add_note(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        body: &str,
    ) -> Result<(), ActionError>;

    /// Close a conversation; `resolved` marks it resolved rather than
    /// merely closed.
    async fn close_conversation(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        resolved: bool,
    ) -> Result<(), ActionError>;
}
