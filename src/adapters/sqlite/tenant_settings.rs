//! SQLite implementation of the TenantSettingsStore.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::domain::errors::DomainResult;
use crate::domain::models::config::BusinessHours;
use crate::domain::ports::TenantSettingsStore;

#[derive(Clone)]
pub struct SqliteTenantSettingsStore {
    pool: SqlitePool,
}

impl SqliteTenantSettingsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn set_business_hours(
        &self,
        tenant_id: &str,
        hours: Option<&BusinessHours>,
    ) -> DomainResult<()> {
        let hours_json = hours.map(serde_json::to_string).transpose()?;
        sqlx::query(
            r#"INSERT INTO tenant_settings (tenant_id, automation_enabled, business_hours, updated_at)
               VALUES (?, 1, ?, ?)
               ON CONFLICT(tenant_id) DO UPDATE SET business_hours = excluded.business_hours,
                                                    updated_at = excluded.updated_at"#,
        )
        .bind(tenant_id)
        .bind(hours_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TenantSettingsStore for SqliteTenantSettingsStore {
    async fn automation_enabled(&self, tenant_id: &str) -> DomainResult<bool> {
        let row: Option<(i32,)> =
            sqlx::query_as("SELECT automation_enabled FROM tenant_settings WHERE tenant_id = ?")
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?;

        // Tenants without a settings row default to enabled.
        Ok(row.map(|(enabled,)| enabled != 0).unwrap_or(true))
    }

    async fn set_automation_enabled(&self, tenant_id: &str, enabled: bool) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO tenant_settings (tenant_id, automation_enabled, updated_at)
               VALUES (?, ?, ?)
               ON CONFLICT(tenant_id) DO UPDATE SET automation_enabled = excluded.automation_enabled,
                                                    updated_at = excluded.updated_at"#,
        )
        .bind(tenant_id)
        .bind(if enabled { 1i32 } else { 0i32 })
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn business_hours(&self, tenant_id: &str) -> DomainResult<Option<BusinessHours>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT business_hours FROM tenant_settings WHERE tenant_id = ?")
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?;

        match row.and_then(|(hours,)| hours) {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
