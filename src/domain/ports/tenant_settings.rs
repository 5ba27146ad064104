//! Tenant settings port: automation toggle and business hours.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::config::BusinessHours;

#[async_trait]
pub trait TenantSettingsStore: Send + Sync {
    /// Whether automation is enabled for the tenant. Unknown tenants
    /// default to enabled.
    async fn automation_enabled(&self, tenant_id: &str) -> DomainResult<bool>;

    /// Flip the tenant's automation toggle.
    async fn set_automation_enabled(&self, tenant_id: &str, enabled: bool) -> DomainResult<()>;

    /// The tenant's business hours, if configured.
    async fn business_hours(&self, tenant_id: &str) -> DomainResult<Option<BusinessHours>>;
}
