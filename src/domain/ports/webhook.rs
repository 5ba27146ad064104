//! Outbound webhook adapter port.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::models::execution::ActionError;

#[async_trait]
pub trait WebhookAdapter: Send + Sync {
    /// POST a JSON payload. Returns the HTTP status code on any response;
    /// transport failures surface as `ActionError`.
    async fn post(
        &self,
        url: &str,
        payload: &serde_json::Value,
        headers: &HashMap<String, String>,
    ) -> Result<u16, ActionError>;
}
