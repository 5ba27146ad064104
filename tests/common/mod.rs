//! Shared test harness: in-memory database, stub adapters, wired engine.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use meridian::adapters::sqlite::{
    create_migrated_test_pool, SqliteExecutionStore, SqliteRuleRepository,
    SqliteTenantSettingsStore,
};
use meridian::domain::errors::DomainResult;
use meridian::domain::models::config::{EngineConfig, RateLimitsConfig};
use meridian::domain::models::context::{ContactSnapshot, ConversationSnapshot};
use meridian::domain::models::execution::ActionError;
use meridian::domain::ports::crm::{ContactPatch, NewDeal, PipelineAdapter};
use meridian::domain::ports::messaging::{
    MediaMessage, MessagingProvider, ProviderReceipt, TemplateMessage,
};
use meridian::domain::ports::webhook::WebhookAdapter;
use meridian::domain::ports::{EntityStore, ExecutionStore, RuleRepository};
use meridian::services::{
    ActionExecutor, AutomationEngine, ContextEnricher, EventBus, EventBusConfig,
    ExecutionRecorder, GuardConfig, InMemoryRateLimitStore, RuleMatcher, SafetyGuard,
};

/// Messaging stub that counts sends and can be told to fail text sends.
#[derive(Default)]
pub struct StubMessaging {
    pub texts_sent: AtomicU32,
    pub templates_sent: AtomicU32,
    pub media_sent: AtomicU32,
    pub fail_texts: AtomicBool,
}

#[async_trait]
impl MessagingProvider for StubMessaging {
    async fn send_template(
        &self,
        _tenant_id: &str,
        _recipient: &str,
        _message: &TemplateMessage,
    ) -> Result<ProviderReceipt, ActionError> {
        self.templates_sent.fetch_add(1, Ordering::SeqCst);
        Ok(ProviderReceipt { external_id: "tmpl-1".into() })
    }

    async fn send_text(
        &self,
        _tenant_id: &str,
        _recipient: &str,
        _body: &str,
    ) -> Result<ProviderReceipt, ActionError> {
        if self.fail_texts.load(Ordering::SeqCst) {
            return Err(ActionError::Provider("stub text failure".into()));
        }
        self.texts_sent.fetch_add(1, Ordering::SeqCst);
        Ok(ProviderReceipt { external_id: "text-1".into() })
    }

    async fn send_media(
        &self,
        _tenant_id: &str,
        _recipient: &str,
        _message: &MediaMessage,
    ) -> Result<ProviderReceipt, ActionError> {
        self.media_sent.fetch_add(1, Ordering::SeqCst);
        Ok(ProviderReceipt { external_id: "media-1".into() })
    }
}

/// Pipeline stub counting every mutation.
#[derive(Default)]
pub struct StubPipeline {
    pub assigned: AtomicU32,
    pub notified: AtomicU32,
    pub deals_created: AtomicU32,
    pub closed: AtomicU32,
}

#[async_trait]
impl PipelineAdapter for StubPipeline {
    async fn assign_conversation(
        &self,
        _tenant_id: &str,
        _conversation_id: &str,
        _assignee_id: &str,
    ) -> Result<(), ActionError> {
        self.assigned.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn move_stage(
        &self,
        _tenant_id: &str,
        _deal_id: &str,
        _stage_id: &str,
    ) -> Result<(), ActionError> {
        Ok(())
    }

    async fn create_deal(&self, _tenant_id: &str, _deal: &NewDeal) -> Result<String, ActionError> {
        self.deals_created.fetch_add(1, Ordering::SeqCst);
        Ok("deal-1".into())
    }

    async fn notify_agent(
        &self,
        _tenant_id: &str,
        _agent_id: &str,
        _message: &str,
    ) -> Result<(), ActionError> {
        self.notified.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_contact(
        &self,
        _tenant_id: &str,
        _contact_id: &str,
        _patch: &ContactPatch,
    ) -> Result<(), ActionError> {
        Ok(())
    }

    async fn add_note(
        &self,
        _tenant_id: &str,
        _conversation_id: &str,
        _body: &str,
    ) -> Result<(), ActionError> {
        Ok(())
    }

    async fn close_conversation(
        &self,
        _tenant_id: &str,
        _conversation_id: &str,
        _resolved: bool,
    ) -> Result<(), ActionError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct StubWebhook;

#[async_trait]
impl WebhookAdapter for StubWebhook {
    async fn post(
        &self,
        _url: &str,
        _payload: &serde_json::Value,
        _headers: &HashMap<String, String>,
    ) -> Result<u16, ActionError> {
        Ok(200)
    }
}

/// Entity store backed by fixed snapshots.
#[derive(Default)]
pub struct StaticEntityStore {
    pub contacts: HashMap<String, ContactSnapshot>,
    pub conversations: HashMap<String, ConversationSnapshot>,
}

#[async_trait]
impl EntityStore for StaticEntityStore {
    async fn contact(
        &self,
        _tenant_id: &str,
        contact_id: &str,
    ) -> DomainResult<Option<ContactSnapshot>> {
        Ok(self.contacts.get(contact_id).cloned())
    }

    async fn conversation(
        &self,
        _tenant_id: &str,
        conversation_id: &str,
    ) -> DomainResult<Option<ConversationSnapshot>> {
        Ok(self.conversations.get(conversation_id).cloned())
    }
}

pub struct HarnessOptions {
    pub contacts: Vec<ContactSnapshot>,
    pub conversations: Vec<ConversationSnapshot>,
    pub rate_limits: RateLimitsConfig,
    pub engine: EngineConfig,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            contacts: Vec::new(),
            conversations: Vec::new(),
            rate_limits: RateLimitsConfig::default(),
            engine: EngineConfig {
                // Keep tests fast: no deliberate pacing between rules.
                inter_rule_delay_ms: 0,
                dedup_window_secs: 2,
                ..EngineConfig::default()
            },
        }
    }
}

pub struct Harness {
    pub engine: Arc<AutomationEngine>,
    pub event_bus: Arc<EventBus>,
    pub rules: Arc<dyn RuleRepository>,
    pub executions: Arc<dyn ExecutionStore>,
    pub tenant_settings: Arc<SqliteTenantSettingsStore>,
    pub messaging: Arc<StubMessaging>,
    pub pipeline: Arc<StubPipeline>,
}

pub async fn harness() -> Harness {
    harness_with(HarnessOptions::default()).await
}

pub async fn harness_with(options: HarnessOptions) -> Harness {
    let pool = create_migrated_test_pool()
        .await
        .expect("failed to create test database");

    let rules: Arc<dyn RuleRepository> = Arc::new(SqliteRuleRepository::new(pool.clone()));
    let executions: Arc<dyn ExecutionStore> = Arc::new(SqliteExecutionStore::new(pool.clone()));
    let tenant_settings = Arc::new(SqliteTenantSettingsStore::new(pool));

    let kill_switch = Arc::new(AtomicBool::new(false));
    let rate_limits = Arc::new(InMemoryRateLimitStore::new(options.rate_limits));
    let guard = Arc::new(SafetyGuard::new(
        kill_switch.clone(),
        tenant_settings.clone(),
        rate_limits.clone(),
        executions.clone(),
        GuardConfig {
            tenant_cache_ttl: Duration::from_millis(0),
            default_business_hours: None,
        },
    ));

    let mut entity_store = StaticEntityStore::default();
    for contact in options.contacts {
        entity_store.contacts.insert(contact.id.clone(), contact);
    }
    for conversation in options.conversations {
        entity_store
            .conversations
            .insert(conversation.id.clone(), conversation);
    }
    let enricher = Arc::new(ContextEnricher::new(Arc::new(entity_store)));

    let messaging = Arc::new(StubMessaging::default());
    let pipeline = Arc::new(StubPipeline::default());
    let executor = Arc::new(ActionExecutor::new(
        messaging.clone(),
        pipeline.clone(),
        Arc::new(StubWebhook),
        Duration::from_secs(2),
    ));

    let recorder = Arc::new(ExecutionRecorder::new(executions.clone()));
    let matcher = Arc::new(RuleMatcher::new(
        rules.clone(),
        enricher,
        guard.clone(),
        executor,
        recorder.clone(),
        rate_limits.clone(),
        Duration::from_millis(options.engine.inter_rule_delay_ms),
    ));

    let event_bus = Arc::new(EventBus::new(EventBusConfig::default()));
    let engine = Arc::new(AutomationEngine::new(
        matcher,
        guard,
        rules.clone(),
        tenant_settings.clone(),
        rate_limits,
        recorder,
        event_bus.clone(),
        kill_switch,
        options.engine,
    ));

    Harness {
        engine,
        event_bus,
        rules,
        executions,
        tenant_settings,
        messaging,
        pipeline,
    }
}
