//! Action Executor: runs a rule's ordered action list against the context.
//!
//! Actions execute sequentially to preserve causal ordering ("assign
//! before notify"). Each action resolves its config against the context,
//! invokes the matching adapter under a deadline, and records a result.
//! Dry-run mode resolves and validates only; no adapter is ever invoked.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use crate::domain::models::context::EvaluationContext;
use crate::domain::models::execution::{
    ActionError, ActionResult, ActionStatus, ExecutionStatus, FailureReason,
};
use crate::domain::models::rule::{ActionConfig, AutomationRule};
use crate::domain::ports::crm::{ContactPatch, NewDeal};
use crate::domain::ports::messaging::{MediaMessage, TemplateMessage};
use crate::domain::ports::{MessagingProvider, PipelineAdapter, WebhookAdapter};

/// Aggregate outcome of running a rule's actions.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub failure_reason: Option<FailureReason>,
    pub action_results: Vec<ActionResult>,
}

pub struct ActionExecutor {
    messaging: Arc<dyn MessagingProvider>,
    pipeline: Arc<dyn PipelineAdapter>,
    webhook: Arc<dyn WebhookAdapter>,
    action_timeout: Duration,
}

impl ActionExecutor {
    pub fn new(
        messaging: Arc<dyn MessagingProvider>,
        pipeline: Arc<dyn PipelineAdapter>,
        webhook: Arc<dyn WebhookAdapter>,
        action_timeout: Duration,
    ) -> Self {
        Self {
            messaging,
            pipeline,
            webhook,
            action_timeout,
        }
    }

    /// Execute the rule's actions in order. Stops at the first failure
    /// unless that action is marked `continue_on_failure`.
    pub async fn execute(
        &self,
        rule: &AutomationRule,
        context: &EvaluationContext,
    ) -> ExecutionOutcome {
        let mut results = Vec::new();
        let mut first_failure: Option<FailureReason> = None;
        let mut stopped_early = false;

        for (index, action) in rule.sorted_actions().into_iter().enumerate() {
            let started = Instant::now();
            let invocation = async {
                let resolved = resolve(&action.config, context)?;
                self.invoke(&rule.tenant_id, &resolved, context).await
            };

            let outcome = match tokio::time::timeout(self.action_timeout, invocation).await {
                Ok(result) => result,
                Err(_) => Err(ActionError::Timeout(self.action_timeout.as_millis() as u64)),
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(result) => {
                    results.push(ActionResult {
                        action_type: action.config.kind().to_string(),
                        index: index as u32,
                        status: ActionStatus::Success,
                        error: None,
                        failure_reason: None,
                        result,
                        duration_ms,
                    });
                }
                Err(error) => {
                    let reason = error.failure_reason();
                    tracing::warn!(
                        rule_id = %rule.id,
                        action = action.config.kind(),
                        index,
                        error = %error,
                        "Action failed"
                    );
                    results.push(ActionResult {
                        action_type: action.config.kind().to_string(),
                        index: index as u32,
                        status: ActionStatus::Failed,
                        error: Some(error.to_string()),
                        failure_reason: Some(reason),
                        result: None,
                        duration_ms,
                    });
                    first_failure.get_or_insert(reason);
                    if !action.continue_on_failure {
                        stopped_early = true;
                        break;
                    }
                }
            }
        }

        let any_success = results.iter().any(|r| r.status == ActionStatus::Success);
        let status = match first_failure {
            None => ExecutionStatus::Success,
            Some(_) if stopped_early || !any_success => ExecutionStatus::Failed,
            Some(_) => ExecutionStatus::Partial,
        };

        ExecutionOutcome {
            status,
            failure_reason: first_failure,
            action_results: results,
        }
    }

    /// Dry-run: resolve and validate every action's config without
    /// touching any adapter. Results carry validation outcomes only.
    pub fn validate(&self, rule: &AutomationRule, context: &EvaluationContext) -> Vec<ActionResult> {
        rule.sorted_actions()
            .into_iter()
            .enumerate()
            .map(|(index, action)| {
                let started = Instant::now();
                let outcome = resolve(&action.config, context);
                let duration_ms = started.elapsed().as_millis() as u64;
                match outcome {
                    Ok(resolved) => ActionResult {
                        action_type: action.config.kind().to_string(),
                        index: index as u32,
                        status: ActionStatus::Success,
                        error: None,
                        failure_reason: None,
                        result: serde_json::to_value(&resolved).ok(),
                        duration_ms,
                    },
                    Err(error) => ActionResult {
                        action_type: action.config.kind().to_string(),
                        index: index as u32,
                        status: ActionStatus::Failed,
                        error: Some(error.to_string()),
                        failure_reason: Some(error.failure_reason()),
                        result: None,
                        duration_ms,
                    },
                }
            })
            .collect()
    }

    async fn invoke(
        &self,
        tenant_id: &str,
        config: &ActionConfig,
        context: &EvaluationContext,
    ) -> Result<Option<serde_json::Value>, ActionError> {
        match config {
            ActionConfig::SendTemplate {
                template_name,
                language,
                variables,
            } => {
                let recipient = recipient(context)?;
                let receipt = self
                    .messaging
                    .send_template(
                        tenant_id,
                        &recipient,
                        &TemplateMessage {
                            template_name: template_name.clone(),
                            language: language.clone(),
                            variables: variables.clone(),
                        },
                    )
                    .await?;
                Ok(Some(json!({ "external_id": receipt.external_id })))
            }
            ActionConfig::SendText { body } => {
                let recipient = recipient(context)?;
                let receipt = self.messaging.send_text(tenant_id, &recipient, body).await?;
                Ok(Some(json!({ "external_id": receipt.external_id })))
            }
            ActionConfig::SendMedia {
                media_url,
                media_kind,
                caption,
            } => {
                let recipient = recipient(context)?;
                let receipt = self
                    .messaging
                    .send_media(
                        tenant_id,
                        &recipient,
                        &MediaMessage {
                            media_url: media_url.clone(),
                            media_kind: *media_kind,
                            caption: caption.clone(),
                        },
                    )
                    .await?;
                Ok(Some(json!({ "external_id": receipt.external_id })))
            }
            ActionConfig::AssignConversation { assignee_id } => {
                let conversation_id = conversation_id(context)?;
                self.pipeline
                    .assign_conversation(tenant_id, conversation_id, assignee_id)
                    .await?;
                Ok(Some(json!({ "assignee_id": assignee_id })))
            }
            ActionConfig::MoveStage { stage_id, deal_id } => {
                let deal_id = deal_id
                    .clone()
                    .or_else(|| {
                        context
                            .event
                            .metadata
                            .get("deal_id")
                            .and_then(|v| v.as_str())
                            .map(String::from)
                    })
                    .ok_or_else(|| ActionError::NotFound("no deal to move".into()))?;
                self.pipeline.move_stage(tenant_id, &deal_id, stage_id).await?;
                Ok(Some(json!({ "deal_id": deal_id, "stage_id": stage_id })))
            }
            ActionConfig::CreateDeal {
                pipeline_id,
                stage_id,
                title,
                value,
            } => {
                let deal_id = self
                    .pipeline
                    .create_deal(
                        tenant_id,
                        &NewDeal {
                            pipeline_id: pipeline_id.clone(),
                            stage_id: stage_id.clone(),
                            title: title.clone(),
                            value: *value,
                            contact_id: context.event.contact_id.clone(),
                        },
                    )
                    .await?;
                Ok(Some(json!({ "deal_id": deal_id })))
            }
            ActionConfig::NotifyAgent { agent_id, message } => {
                self.pipeline.notify_agent(tenant_id, agent_id, message).await?;
                Ok(None)
            }
            ActionConfig::CallWebhook { url, headers } => {
                let status = self.webhook.post(url, &context.to_json(), headers).await?;
                Ok(Some(json!({ "http_status": status })))
            }
            ActionConfig::UpdateContact {
                fields,
                add_tags,
                remove_tags,
            } => {
                let contact_id = context
                    .event
                    .contact_id
                    .as_deref()
                    .ok_or_else(|| ActionError::NotFound("event has no contact".into()))?;
                self.pipeline
                    .update_contact(
                        tenant_id,
                        contact_id,
                        &ContactPatch {
                            fields: fields.clone(),
                            add_tags: add_tags.clone(),
                            remove_tags: remove_tags.clone(),
                        },
                    )
                    .await?;
                Ok(None)
            }
            ActionConfig::AddNote { body } => {
                let conversation_id = conversation_id(context)?;
                self.pipeline.add_note(tenant_id, conversation_id, body).await?;
                Ok(None)
            }
            ActionConfig::CloseConversation => {
                let conversation_id = conversation_id(context)?;
                self.pipeline
                    .close_conversation(tenant_id, conversation_id, false)
                    .await?;
                Ok(None)
            }
            ActionConfig::ResolveConversation => {
                let conversation_id = conversation_id(context)?;
                self.pipeline
                    .close_conversation(tenant_id, conversation_id, true)
                    .await?;
                Ok(None)
            }
        }
    }
}

/// Resolve `{{path}}` placeholders and validate the config shape. This is
/// everything dry-run performs.
fn resolve(config: &ActionConfig, context: &EvaluationContext) -> Result<ActionConfig, ActionError> {
    let resolved = match config {
        ActionConfig::SendTemplate {
            template_name,
            language,
            variables,
        } => {
            if template_name.trim().is_empty() {
                return Err(ActionError::TemplateInvalid("empty template name".into()));
            }
            ActionConfig::SendTemplate {
                template_name: template_name.clone(),
                language: language.clone(),
                variables: variables
                    .iter()
                    .map(|(k, v)| (k.clone(), context.render(v)))
                    .collect(),
            }
        }
        ActionConfig::SendText { body } => {
            let body = context.render(body);
            if body.trim().is_empty() {
                return Err(ActionError::TemplateInvalid("message body is empty".into()));
            }
            ActionConfig::SendText { body }
        }
        ActionConfig::SendMedia {
            media_url,
            media_kind,
            caption,
        } => {
            let media_url = context.render(media_url);
            if !media_url.starts_with("http") {
                return Err(ActionError::TemplateInvalid(format!(
                    "invalid media url: {media_url}"
                )));
            }
            ActionConfig::SendMedia {
                media_url,
                media_kind: *media_kind,
                caption: caption.as_ref().map(|c| context.render(c)),
            }
        }
        ActionConfig::NotifyAgent { agent_id, message } => ActionConfig::NotifyAgent {
            agent_id: agent_id.clone(),
            message: context.render(message),
        },
        ActionConfig::CallWebhook { url, headers } => {
            let url = context.render(url);
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ActionError::Internal(format!("invalid webhook url: {url}")));
            }
            ActionConfig::CallWebhook {
                url,
                headers: headers.clone(),
            }
        }
        ActionConfig::AddNote { body } => ActionConfig::AddNote {
            body: context.render(body),
        },
        ActionConfig::CreateDeal {
            pipeline_id,
            stage_id,
            title,
            value,
        } => ActionConfig::CreateDeal {
            pipeline_id: pipeline_id.clone(),
            stage_id: stage_id.clone(),
            title: context.render(title),
            value: *value,
        },
        other => other.clone(),
    };

    // Sends need a reachable recipient even in dry-run validation.
    if matches!(
        resolved,
        ActionConfig::SendTemplate { .. } | ActionConfig::SendText { .. } | ActionConfig::SendMedia { .. }
    ) {
        recipient(context)?;
    }

    Ok(resolved)
}

/// The outbound recipient: the contact's phone when the snapshot has one,
/// falling back to the contact id.
fn recipient(context: &EvaluationContext) -> Result<String, ActionError> {
    if let Some(contact) = &context.contact {
        if let Some(phone) = &contact.phone {
            return Ok(phone.clone());
        }
        return Ok(contact.id.clone());
    }
    context
        .event
        .contact_id
        .clone()
        .ok_or_else(|| ActionError::InvalidRecipient("event has no contact".into()))
}

fn conversation_id(context: &EvaluationContext) -> Result<&str, ActionError> {
    context
        .event
        .conversation_id
        .as_deref()
        .ok_or_else(|| ActionError::NotFound("event has no conversation".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::event::{AutomationEvent, TriggerEvent};
    use crate::domain::models::rule::RuleAction;
    use crate::domain::ports::messaging::ProviderReceipt;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct StubMessaging {
        sent: AtomicU32,
        fail_texts: bool,
    }

    #[async_trait]
    impl MessagingProvider for StubMessaging {
        async fn send_template(
            &self,
            _t: &str,
            _r: &str,
            _m: &TemplateMessage,
        ) -> Result<ProviderReceipt, ActionError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(ProviderReceipt { external_id: "ext-1".into() })
        }

        async fn send_text(
            &self,
            _t: &str,
            _r: &str,
            _b: &str,
        ) -> Result<ProviderReceipt, ActionError> {
            if self.fail_texts {
                return Err(ActionError::Provider("upstream 500".into()));
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(ProviderReceipt { external_id: "ext-2".into() })
        }

        async fn send_media(
            &self,
            _t: &str,
            _r: &str,
            _m: &MediaMessage,
        ) -> Result<ProviderReceipt, ActionError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(ProviderReceipt { external_id: "ext-3".into() })
        }
    }

    #[derive(Default)]
    struct StubPipeline {
        assigned: AtomicU32,
        notified: AtomicU32,
    }

    #[async_trait]
    impl PipelineAdapter for StubPipeline {
        async fn assign_conversation(&self, _t: &str, _c: &str, _a: &str) -> Result<(), ActionError> {
            self.assigned.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn move_stage(&self, _t: &str, _d: &str, _s: &str) -> Result<(), ActionError> {
            Ok(())
        }
        async fn create_deal(&self, _t: &str, _d: &NewDeal) -> Result<String, ActionError> {
            Ok("deal-1".into())
        }
        async fn notify_agent(&self, _t: &str, _a: &str, _m: &str) -> Result<(), ActionError> {
            self.notified.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn update_contact(
            &self,
            _t: &str,
            _c: &str,
            _p: &ContactPatch,
        ) -> Result<(), ActionError> {
            Ok(())
        }
        async fn add_note(&self, _t: &str, _c: &str, _b: &str) -> Result<(), ActionError> {
            Ok(())
        }
        async fn close_conversation(&self, _t: &str, _c: &str, _r: bool) -> Result<(), ActionError> {
            Ok(())
        }
    }

    struct StubWebhook;

    #[async_trait]
    impl WebhookAdapter for StubWebhook {
        async fn post(
            &self,
            _u: &str,
            _p: &serde_json::Value,
            _h: &HashMap<String, String>,
        ) -> Result<u16, ActionError> {
            Ok(200)
        }
    }

    fn executor(messaging: Arc<StubMessaging>, pipeline: Arc<StubPipeline>) -> ActionExecutor {
        ActionExecutor::new(
            messaging,
            pipeline,
            Arc::new(StubWebhook),
            Duration::from_secs(5),
        )
    }

    fn context() -> EvaluationContext {
        let event = AutomationEvent::new("t1", TriggerEvent::MessageReceived)
            .with_contact("contact-1")
            .with_conversation("conv-1");
        let mut ctx = EvaluationContext::new(event);
        ctx.contact = Some(crate::domain::models::context::ContactSnapshot {
            id: "contact-1".into(),
            phone: Some("+15550001".into()),
            name: Some("Ada".into()),
            ..Default::default()
        });
        ctx
    }

    #[tokio::test]
    async fn test_all_actions_succeed() {
        let messaging = Arc::new(StubMessaging::default());
        let pipeline = Arc::new(StubPipeline::default());
        let executor = executor(messaging.clone(), pipeline.clone());

        let rule = AutomationRule::new("t1", "greet", TriggerEvent::MessageReceived)
            .with_action(RuleAction::new(
                1,
                ActionConfig::SendText { body: "Hi {{contact.name}}".into() },
            ))
            .with_action(RuleAction::new(
                2,
                ActionConfig::AssignConversation { assignee_id: "agent-1".into() },
            ));

        let outcome = executor.execute(&rule, &context()).await;
        assert_eq!(outcome.status, ExecutionStatus::Success);
        assert_eq!(outcome.action_results.len(), 2);
        assert!(outcome.failure_reason.is_none());
        assert_eq!(messaging.sent.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.assigned.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_partial_when_continue_on_failure() {
        let messaging = Arc::new(StubMessaging { fail_texts: true, ..Default::default() });
        let pipeline = Arc::new(StubPipeline::default());
        let executor = executor(messaging, pipeline.clone());

        // 3 actions; action 2 (the text send) fails but continues.
        let rule = AutomationRule::new("t1", "mixed", TriggerEvent::MessageReceived)
            .with_action(RuleAction::new(
                1,
                ActionConfig::AssignConversation { assignee_id: "agent-1".into() },
            ))
            .with_action(
                RuleAction::new(2, ActionConfig::SendText { body: "hello".into() })
                    .continue_on_failure(),
            )
            .with_action(RuleAction::new(
                3,
                ActionConfig::NotifyAgent { agent_id: "agent-1".into(), message: "fyi".into() },
            ));

        let outcome = executor.execute(&rule, &context()).await;
        assert_eq!(outcome.status, ExecutionStatus::Partial);
        assert_eq!(outcome.action_results.len(), 3);
        assert_eq!(outcome.action_results[0].status, ActionStatus::Success);
        assert_eq!(outcome.action_results[1].status, ActionStatus::Failed);
        assert_eq!(outcome.action_results[2].status, ActionStatus::Success);
        assert_eq!(outcome.failure_reason, Some(FailureReason::ProviderError));
        assert_eq!(pipeline.notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_stops_remaining_actions() {
        let messaging = Arc::new(StubMessaging { fail_texts: true, ..Default::default() });
        let pipeline = Arc::new(StubPipeline::default());
        let executor = executor(messaging, pipeline.clone());

        let rule = AutomationRule::new("t1", "strict", TriggerEvent::MessageReceived)
            .with_action(RuleAction::new(1, ActionConfig::SendText { body: "hello".into() }))
            .with_action(RuleAction::new(
                2,
                ActionConfig::NotifyAgent { agent_id: "agent-1".into(), message: "fyi".into() },
            ));

        let outcome = executor.execute(&rule, &context()).await;
        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert_eq!(outcome.action_results.len(), 1);
        assert_eq!(pipeline.notified.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dry_run_validates_without_side_effects() {
        let messaging = Arc::new(StubMessaging::default());
        let pipeline = Arc::new(StubPipeline::default());
        let executor = executor(messaging.clone(), pipeline);

        let rule = AutomationRule::new("t1", "dry", TriggerEvent::MessageReceived)
            .with_action(RuleAction::new(
                1,
                ActionConfig::SendText { body: "Hi {{contact.name}}".into() },
            ))
            .with_action(RuleAction::new(
                2,
                ActionConfig::SendMedia {
                    media_url: "not-a-url".into(),
                    media_kind: crate::domain::models::event::MessageKind::Image,
                    caption: None,
                },
            ));

        let results = executor.validate(&rule, &context());
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, ActionStatus::Success);
        // The rendered body is visible in the validation result.
        assert_eq!(results[0].result.as_ref().unwrap()["body"], "Hi Ada");
        assert_eq!(results[1].status, ActionStatus::Failed);
        assert_eq!(results[1].failure_reason, Some(FailureReason::TemplateInvalid));
        assert_eq!(messaging.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_recipient_is_invalid_recipient() {
        let messaging = Arc::new(StubMessaging::default());
        let pipeline = Arc::new(StubPipeline::default());
        let executor = executor(messaging, pipeline);

        let rule = AutomationRule::new("t1", "no-contact", TriggerEvent::SlaBreached)
            .with_action(RuleAction::new(1, ActionConfig::SendText { body: "hi".into() }));

        let event = AutomationEvent::new("t1", TriggerEvent::SlaBreached);
        let outcome = executor.execute(&rule, &EvaluationContext::new(event)).await;
        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert_eq!(outcome.failure_reason, Some(FailureReason::InvalidRecipient));
    }
}
