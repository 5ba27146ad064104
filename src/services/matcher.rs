//! Rule Matcher: orchestrates enrichment, filters, the safety guard, the
//! condition evaluator and the action executor for one event.
//!
//! Rules are processed strictly in order (priority descending, creation
//! order on ties) and sequentially, so rate-limit bookkeeping within one
//! event is race-free and per-tenant ordering stays deterministic.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::domain::models::context::EvaluationContext;
use crate::domain::models::event::AutomationEvent;
use crate::domain::models::execution::{
    ActionResult, AutomationExecution, ExecutionStatus, FailureReason, SkipReason,
};
use crate::domain::models::rule::{AutomationRule, TriggerFilters};
use crate::domain::ports::rate_limit_store::{RateLimitStore, RateScope};
use crate::domain::ports::RuleRepository;
use crate::services::conditions::{self, ConditionCheck};
use crate::services::enricher::ContextEnricher;
use crate::services::executor::ActionExecutor;
use crate::services::recorder::ExecutionRecorder;
use crate::services::safety::{Admission, SafetyGuard};

/// Per-rule detail returned by `simulate_event`.
#[derive(Debug, Clone, Serialize)]
pub struct RuleSimulation {
    pub rule_id: uuid::Uuid,
    pub rule_name: String,
    /// `None` means the rule would execute.
    pub skip_reason: Option<SkipReason>,
    pub detail: Option<String>,
    pub condition_checks: Vec<ConditionCheck>,
}

/// Result of `simulate_event`: guards + conditions evaluated, nothing
/// executed, nothing recorded, no counters mutated.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub matched_rule_count: usize,
    pub rules: Vec<RuleSimulation>,
}

/// Result of `test_rule`: the dry-run execution record plus the action
/// validation details that the record itself (being a skip) cannot carry.
#[derive(Debug, Clone, Serialize)]
pub struct TestRuleOutcome {
    pub execution: AutomationExecution,
    pub would_execute: bool,
    pub condition_checks: Vec<ConditionCheck>,
    pub validated_actions: Vec<ActionResult>,
}

pub struct RuleMatcher {
    rules: Arc<dyn RuleRepository>,
    enricher: Arc<ContextEnricher>,
    guard: Arc<SafetyGuard>,
    executor: Arc<ActionExecutor>,
    recorder: Arc<ExecutionRecorder>,
    rate_limits: Arc<dyn RateLimitStore>,
    inter_rule_delay: Duration,
}

impl RuleMatcher {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        enricher: Arc<ContextEnricher>,
        guard: Arc<SafetyGuard>,
        executor: Arc<ActionExecutor>,
        recorder: Arc<ExecutionRecorder>,
        rate_limits: Arc<dyn RateLimitStore>,
        inter_rule_delay: Duration,
    ) -> Self {
        Self {
            rules,
            enricher,
            guard,
            executor,
            recorder,
            rate_limits,
            inter_rule_delay,
        }
    }

    /// Process one event end to end. Returns the finalized execution
    /// records, one per candidate rule.
    pub async fn process_event(&self, event: AutomationEvent) -> Vec<AutomationExecution> {
        let tenant_id = event.tenant_id.clone();
        let trigger = event.event_type;
        let context = self.enricher.enrich(event).await;

        let candidates = match self.rules.list_enabled_for_trigger(&tenant_id, trigger).await {
            Ok(rules) => rules,
            Err(e) => {
                tracing::error!(
                    tenant_id = %tenant_id,
                    trigger = %trigger,
                    error = %e,
                    "Failed to load candidate rules"
                );
                return Vec::new();
            }
        };

        let mut executions = Vec::with_capacity(candidates.len());
        let mut previous_executed = false;

        for rule in &candidates {
            // Small pause between consecutive firing rules so one event
            // cannot burst the downstream provider.
            if previous_executed && !self.inter_rule_delay.is_zero() {
                tokio::time::sleep(self.inter_rule_delay).await;
            }

            let execution = self.process_rule(rule, &context).await;
            previous_executed = !matches!(execution.status, ExecutionStatus::Skipped);
            executions.push(execution);
        }

        executions
    }

    /// Run the full pipeline for one rule. Always returns a finalized
    /// record; failures from a single rule never abort its siblings.
    async fn process_rule(
        &self,
        rule: &AutomationRule,
        context: &EvaluationContext,
    ) -> AutomationExecution {
        let mut execution = AutomationExecution::begin(
            rule.id,
            rule.tenant_id.clone(),
            context.event.event_type,
            context.event.conversation_id.clone(),
            context.event.contact_id.clone(),
            context.event.message_id.clone(),
        );
        self.recorder.begin(&execution).await;

        // 1. Trigger filters: a mismatch consumes no rate-limit budget.
        if !filters_match(&rule.filters, context) {
            execution.finish_skipped(SkipReason::FilterNotMatched, Utc::now());
            self.finish(rule, &execution, false).await;
            return execution;
        }

        // 2. Safety guard.
        match self.guard.admit(rule, context, Utc::now()).await {
            Ok(Admission::Allowed) => {}
            Ok(Admission::Denied { reason, detail }) => {
                tracing::debug!(
                    rule_id = %rule.id,
                    rule_name = %rule.name,
                    reason = reason.as_str(),
                    detail = %detail,
                    "Rule skipped by safety guard"
                );
                execution.finish_skipped(reason, Utc::now());
                self.finish(rule, &execution, false).await;
                return execution;
            }
            Err(e) => {
                tracing::error!(
                    rule_id = %rule.id,
                    error = %e,
                    "Safety guard lookup failed"
                );
                execution.finish_executed(
                    ExecutionStatus::Failed,
                    Some(FailureReason::InternalError),
                    Vec::new(),
                    Utc::now(),
                );
                self.finish(rule, &execution, false).await;
                return execution;
            }
        }

        // 3. Conditions.
        let evaluation = conditions::evaluate(&rule.conditions, context);
        if !evaluation.matched {
            execution.finish_skipped(SkipReason::ConditionNotMet, Utc::now());
            self.finish(rule, &execution, false).await;
            return execution;
        }

        // 4. Actions.
        let outcome = self.executor.execute(rule, context).await;
        execution.finish_executed(
            outcome.status,
            outcome.failure_reason,
            outcome.action_results,
            Utc::now(),
        );

        tracing::info!(
            rule_id = %rule.id,
            rule_name = %rule.name,
            tenant_id = %rule.tenant_id,
            status = execution.status.as_str(),
            actions = execution.action_results.len(),
            "Rule executed"
        );

        self.finish(rule, &execution, true).await;
        execution
    }

    /// Finalize the record and settle counters. Window budget is consumed
    /// exactly once, only for attempts that reached the executor.
    async fn finish(&self, rule: &AutomationRule, execution: &AutomationExecution, executed: bool) {
        let now = Utc::now();

        if executed {
            self.rate_limits.record(RateScope::Global, now).await;
            self.rate_limits
                .record(RateScope::Tenant(&rule.tenant_id), now)
                .await;
        }

        if let Err(e) = self
            .rules
            .record_outcome(rule.id, execution.status, executed, now)
            .await
        {
            tracing::warn!(rule_id = %rule.id, error = %e, "Failed to persist rule outcome");
        }

        self.recorder.finalize(execution).await;
    }

    /// Evaluate guards and conditions for every candidate rule without
    /// executing or recording anything.
    pub async fn simulate_event(&self, event: AutomationEvent) -> SimulationReport {
        let tenant_id = event.tenant_id.clone();
        let trigger = event.event_type;
        let context = self.enricher.enrich(event).await;

        let candidates = self
            .rules
            .list_enabled_for_trigger(&tenant_id, trigger)
            .await
            .unwrap_or_default();

        let mut rules = Vec::with_capacity(candidates.len());
        let mut matched = 0;

        for rule in &candidates {
            let simulation = self.simulate_rule(rule, &context).await;
            if simulation.skip_reason.is_none() {
                matched += 1;
            }
            rules.push(simulation);
        }

        SimulationReport {
            matched_rule_count: matched,
            rules,
        }
    }

    async fn simulate_rule(
        &self,
        rule: &AutomationRule,
        context: &EvaluationContext,
    ) -> RuleSimulation {
        let mut simulation = RuleSimulation {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            skip_reason: None,
            detail: None,
            condition_checks: Vec::new(),
        };

        if !filters_match(&rule.filters, context) {
            simulation.skip_reason = Some(SkipReason::FilterNotMatched);
            return simulation;
        }

        match self.guard.admit(rule, context, Utc::now()).await {
            Ok(Admission::Allowed) => {}
            Ok(Admission::Denied { reason, detail }) => {
                simulation.skip_reason = Some(reason);
                simulation.detail = Some(detail);
                return simulation;
            }
            Err(e) => {
                simulation.skip_reason = Some(SkipReason::ConditionNotMet);
                simulation.detail = Some(format!("guard lookup failed: {e}"));
                return simulation;
            }
        }

        let evaluation = conditions::evaluate(&rule.conditions, context);
        simulation.condition_checks = evaluation.checks;
        if !evaluation.matched {
            simulation.skip_reason = Some(SkipReason::ConditionNotMet);
            simulation.detail = evaluation.reason;
        }
        simulation
    }

    /// Dry-run a single rule: guards and conditions are evaluated, action
    /// configs are resolved and validated, no side effect happens and no
    /// counter moves. The recorded execution is flagged `is_dry_run` and
    /// excluded from every history query, so repeated calls yield
    /// identical admission decisions.
    pub async fn test_rule(
        &self,
        rule: &AutomationRule,
        event: AutomationEvent,
    ) -> TestRuleOutcome {
        let context = self.enricher.enrich(event).await;
        let mut execution = AutomationExecution::begin(
            rule.id,
            rule.tenant_id.clone(),
            context.event.event_type,
            context.event.conversation_id.clone(),
            context.event.contact_id.clone(),
            context.event.message_id.clone(),
        )
        .dry_run()
        .manual_test();
        self.recorder.begin(&execution).await;

        let mut would_execute = false;
        let mut condition_checks = Vec::new();
        let mut validated_actions = Vec::new();

        let skip_reason = if !filters_match(&rule.filters, &context) {
            SkipReason::FilterNotMatched
        } else {
            match self.guard.admit(rule, &context, Utc::now()).await {
                Ok(Admission::Denied { reason, .. }) => reason,
                Err(e) => {
                    tracing::warn!(rule_id = %rule.id, error = %e, "Dry-run guard lookup failed");
                    SkipReason::DryRun
                }
                Ok(Admission::Allowed) => {
                    let evaluation = conditions::evaluate(&rule.conditions, &context);
                    condition_checks = evaluation.checks;
                    if evaluation.matched {
                        validated_actions = self.executor.validate(rule, &context);
                        would_execute = validated_actions
                            .iter()
                            .all(|r| r.status == crate::domain::models::execution::ActionStatus::Success);
                        SkipReason::DryRun
                    } else {
                        SkipReason::ConditionNotMet
                    }
                }
            }
        };

        execution.finish_skipped(skip_reason, Utc::now());
        self.recorder.finalize(&execution).await;

        TestRuleOutcome {
            execution,
            would_execute,
            condition_checks,
            validated_actions,
        }
    }
}

/// Evaluate a rule's trigger filters against the raw event/context.
fn filters_match(filters: &TriggerFilters, context: &EvaluationContext) -> bool {
    // Channel: from the event metadata, falling back to the snapshot.
    if let Some(expected) = filters.channel {
        let actual = context
            .event
            .metadata
            .get("channel")
            .and_then(|v| v.as_str())
            .and_then(|s| serde_json::from_value(serde_json::Value::String(s.to_string())).ok())
            .or_else(|| context.conversation.as_ref().and_then(|c| c.channel));
        if actual != Some(expected) {
            return false;
        }
    }

    // Message kind.
    if !filters.message_kinds.is_empty() {
        let actual = context
            .event
            .metadata
            .get("message_type")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok());
        match actual {
            Some(kind) if filters.message_kinds.contains(&kind) => {}
            _ => return false,
        }
    }

    // Keywords: the body must contain at least one.
    if !filters.keywords.is_empty() {
        let Some(body) = context.message_body() else {
            return false;
        };
        let body = body.to_lowercase();
        if !filters
            .keywords
            .iter()
            .any(|k| body.contains(&k.to_lowercase()))
        {
            return false;
        }
    }

    // Tags.
    let tags = context.contact_tags();
    if !filters.required_tags.is_empty()
        && !filters
            .required_tags
            .iter()
            .all(|t| tags.iter().any(|tag| tag.eq_ignore_ascii_case(t)))
    {
        return false;
    }
    if filters
        .excluded_tags
        .iter()
        .any(|t| tags.iter().any(|tag| tag.eq_ignore_ascii_case(t)))
    {
        return false;
    }

    // Source.
    if let Some(expected) = &filters.source {
        let actual = context
            .event
            .metadata
            .get("source")
            .and_then(|v| v.as_str())
            .map(String::from)
            .or_else(|| context.conversation.as_ref().and_then(|c| c.source.clone()));
        match actual {
            Some(source) if source.eq_ignore_ascii_case(expected) => {}
            _ => return false,
        }
    }

    // `business_hours_only` is enforced by the safety guard, not here.
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::context::ContactSnapshot;
    use crate::domain::models::event::{Channel, TriggerEvent};
    use serde_json::json;

    fn context(body: &str, tags: Vec<&str>) -> EvaluationContext {
        let event = AutomationEvent::new("t1", TriggerEvent::MessageReceived)
            .with_metadata("body", json!(body))
            .with_metadata("channel", json!("whatsapp"));
        let mut ctx = EvaluationContext::new(event);
        ctx.contact = Some(ContactSnapshot {
            id: "c1".into(),
            tags: tags.into_iter().map(String::from).collect(),
            ..Default::default()
        });
        ctx
    }

    #[test]
    fn test_keyword_filter() {
        let filters = TriggerFilters {
            keywords: vec!["refund".into(), "chargeback".into()],
            ..Default::default()
        };
        assert!(filters_match(&filters, &context("need a REFUND", vec![])));
        assert!(!filters_match(&filters, &context("hello there", vec![])));
    }

    #[test]
    fn test_tag_filters() {
        let filters = TriggerFilters {
            required_tags: vec!["vip".into()],
            excluded_tags: vec!["blocked".into()],
            ..Default::default()
        };
        assert!(filters_match(&filters, &context("x", vec!["VIP"])));
        assert!(!filters_match(&filters, &context("x", vec![])));
        assert!(!filters_match(&filters, &context("x", vec!["vip", "blocked"])));
    }

    #[test]
    fn test_channel_filter() {
        let filters = TriggerFilters {
            channel: Some(Channel::Whatsapp),
            ..Default::default()
        };
        assert!(filters_match(&filters, &context("x", vec![])));

        let other = TriggerFilters {
            channel: Some(Channel::Instagram),
            ..Default::default()
        };
        assert!(!filters_match(&other, &context("x", vec![])));
    }

    #[test]
    fn test_empty_filters_match_everything() {
        assert!(filters_match(&TriggerFilters::default(), &context("x", vec![])));
    }
}
