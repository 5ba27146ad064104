//! Lookup port for contact and conversation snapshots.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::context::{ContactSnapshot, ConversationSnapshot};

/// Point lookups against the platform's entity storage. Missing records
/// return `Ok(None)`, never an error.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn contact(
        &self,
        tenant_id: &str,
        contact_id: &str,
    ) -> DomainResult<Option<ContactSnapshot>>;

    async fn conversation(
        &self,
        tenant_id: &str,
        conversation_id: &str,
    ) -> DomainResult<Option<ConversationSnapshot>>;
}
