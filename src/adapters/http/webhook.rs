//! reqwest-backed webhook adapter.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::models::execution::ActionError;
use crate::domain::ports::WebhookAdapter;

pub struct HttpWebhookAdapter {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpWebhookAdapter {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("meridian/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl WebhookAdapter for HttpWebhookAdapter {
    async fn post(
        &self,
        url: &str,
        payload: &serde_json::Value,
        headers: &HashMap<String, String>,
    ) -> Result<u16, ActionError> {
        let mut request = self.client.post(url).json(payload);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ActionError::Timeout(self.timeout.as_millis() as u64)
            } else {
                ActionError::Provider(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(ActionError::Provider(format!(
                "webhook returned {}",
                status.as_u16()
            )));
        }
        Ok(status.as_u16())
    }
}
