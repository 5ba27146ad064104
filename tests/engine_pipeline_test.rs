//! End-to-end pipeline tests: event in, execution records and side
//! effects out.

mod common;

use std::sync::atomic::Ordering;

use meridian::domain::models::context::{ContactSnapshot, ConversationSnapshot};
use meridian::domain::models::event::{AutomationEvent, TriggerEvent};
use meridian::domain::models::execution::{ActionStatus, ExecutionStatus, SkipReason};
use meridian::domain::models::rule::{
    ActionConfig, AutomationRule, Condition, ConditionOperator, RuleAction, TriggerFilters,
};
use serde_json::json;

use common::{harness_with, HarnessOptions};

fn vip_contact() -> ContactSnapshot {
    ContactSnapshot {
        id: "contact-x".into(),
        phone: Some("+15550001".into()),
        name: Some("Ada".into()),
        tags: vec!["vip".into()],
        custom_fields: Default::default(),
    }
}

fn refund_event(body: &str) -> AutomationEvent {
    AutomationEvent::new("tenant-1", TriggerEvent::MessageReceived)
        .with_contact("contact-x")
        .with_conversation("conv-1")
        .with_message(uuid::Uuid::new_v4().to_string())
        .with_metadata("body", json!(body))
}

/// A rule requiring the `vip` tag and a "refund" keyword assigns the
/// conversation: one SUCCESS execution with one action result.
#[tokio::test]
async fn test_end_to_end_vip_refund_assignment() {
    let harness = harness_with(HarnessOptions {
        contacts: vec![vip_contact()],
        conversations: vec![ConversationSnapshot {
            id: "conv-1".into(),
            ..Default::default()
        }],
        ..Default::default()
    })
    .await;

    let rule = AutomationRule::new("tenant-1", "vip-refund-routing", TriggerEvent::MessageReceived)
        .with_filters(TriggerFilters {
            required_tags: vec!["vip".into()],
            ..Default::default()
        })
        .with_condition(Condition::new(
            "message.body",
            ConditionOperator::Contains,
            json!("refund"),
        ))
        .with_action(RuleAction::new(
            1,
            ActionConfig::AssignConversation { assignee_id: "agent-9".into() },
        ));
    harness.rules.create(&rule).await.unwrap();

    let executions = harness
        .engine
        .process_event_now(refund_event("I want a refund for order 11"))
        .await;

    assert_eq!(executions.len(), 1);
    let execution = &executions[0];
    assert_eq!(execution.status, ExecutionStatus::Success);
    assert_eq!(execution.action_results.len(), 1);
    assert_eq!(execution.action_results[0].status, ActionStatus::Success);
    assert_eq!(harness.pipeline.assigned.load(Ordering::SeqCst), 1);

    // The record landed in the durable store.
    let stored = harness.executions.get(execution.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Success);
    assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn test_condition_not_met_is_recorded() {
    let harness = harness_with(HarnessOptions {
        contacts: vec![vip_contact()],
        ..Default::default()
    })
    .await;

    let rule = AutomationRule::new("tenant-1", "refund-only", TriggerEvent::MessageReceived)
        .with_condition(Condition::new(
            "message.body",
            ConditionOperator::Contains,
            json!("refund"),
        ))
        .with_action(RuleAction::new(
            1,
            ActionConfig::NotifyAgent { agent_id: "agent-1".into(), message: "hi".into() },
        ));
    harness.rules.create(&rule).await.unwrap();

    let executions = harness
        .engine
        .process_event_now(refund_event("just saying hello"))
        .await;

    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Skipped);
    assert_eq!(executions[0].skip_reason, Some(SkipReason::ConditionNotMet));
    assert!(executions[0].action_results.is_empty());
    assert_eq!(harness.pipeline.notified.load(Ordering::SeqCst), 0);
}

/// With the kill switch on, every rule for every tenant is skipped with
/// `GLOBAL_KILL_SWITCH`, even though all other guards would pass.
#[tokio::test]
async fn test_kill_switch_precedence() {
    let harness = harness_with(HarnessOptions {
        contacts: vec![vip_contact()],
        ..Default::default()
    })
    .await;

    let rule = AutomationRule::new("tenant-1", "always-notify", TriggerEvent::MessageReceived)
        .with_action(RuleAction::new(
            1,
            ActionConfig::NotifyAgent { agent_id: "agent-1".into(), message: "hi".into() },
        ));
    harness.rules.create(&rule).await.unwrap();

    harness.engine.set_global_kill_switch(true);
    let executions = harness.engine.process_event_now(refund_event("refund")).await;

    assert_eq!(executions[0].status, ExecutionStatus::Skipped);
    assert_eq!(executions[0].skip_reason, Some(SkipReason::GlobalKillSwitch));
    assert_eq!(harness.pipeline.notified.load(Ordering::SeqCst), 0);

    // Releasing the switch lets the same event through.
    harness.engine.set_global_kill_switch(false);
    let executions = harness.engine.process_event_now(refund_event("refund")).await;
    assert_eq!(executions[0].status, ExecutionStatus::Success);
}

/// Three actions where the middle one fails with `continue_on_failure`:
/// overall PARTIAL, three results recorded (2 success, 1 failed).
#[tokio::test]
async fn test_partial_execution_records_all_action_results() {
    let harness = harness_with(HarnessOptions {
        contacts: vec![vip_contact()],
        ..Default::default()
    })
    .await;
    harness.messaging.fail_texts.store(true, Ordering::SeqCst);

    let rule = AutomationRule::new("tenant-1", "three-step", TriggerEvent::MessageReceived)
        .with_action(RuleAction::new(
            1,
            ActionConfig::NotifyAgent { agent_id: "agent-1".into(), message: "step 1".into() },
        ))
        .with_action(
            RuleAction::new(2, ActionConfig::SendText { body: "step 2".into() })
                .continue_on_failure(),
        )
        .with_action(RuleAction::new(
            3,
            ActionConfig::NotifyAgent { agent_id: "agent-1".into(), message: "step 3".into() },
        ));
    harness.rules.create(&rule).await.unwrap();

    let executions = harness.engine.process_event_now(refund_event("anything")).await;

    let execution = &executions[0];
    assert_eq!(execution.status, ExecutionStatus::Partial);
    assert_eq!(execution.action_results.len(), 3);
    let statuses: Vec<ActionStatus> = execution.action_results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![ActionStatus::Success, ActionStatus::Failed, ActionStatus::Success]
    );
    assert_eq!(harness.pipeline.notified.load(Ordering::SeqCst), 2);
}

/// Rules evaluate in priority order, ties broken by creation order.
#[tokio::test]
async fn test_rules_fire_in_priority_order() {
    let harness = harness_with(HarnessOptions {
        contacts: vec![vip_contact()],
        ..Default::default()
    })
    .await;

    let low = AutomationRule::new("tenant-1", "low", TriggerEvent::MessageReceived)
        .with_priority(1)
        .with_action(RuleAction::new(
            1,
            ActionConfig::NotifyAgent { agent_id: "a".into(), message: "low".into() },
        ));
    let high = AutomationRule::new("tenant-1", "high", TriggerEvent::MessageReceived)
        .with_priority(10)
        .with_action(RuleAction::new(
            1,
            ActionConfig::NotifyAgent { agent_id: "a".into(), message: "high".into() },
        ));
    harness.rules.create(&low).await.unwrap();
    harness.rules.create(&high).await.unwrap();

    let executions = harness.engine.process_event_now(refund_event("x")).await;
    assert_eq!(executions.len(), 2);
    assert_eq!(executions[0].rule_id, high.id);
    assert_eq!(executions[1].rule_id, low.id);
}

/// Duplicate deliveries inside the dedup window collapse to one
/// processing pass when events flow through the running engine.
#[tokio::test]
async fn test_short_window_dedup_through_running_engine() {
    let harness = harness_with(HarnessOptions {
        contacts: vec![vip_contact()],
        ..Default::default()
    })
    .await;

    let rule = AutomationRule::new("tenant-1", "notify", TriggerEvent::MessageReceived)
        .with_action(RuleAction::new(
            1,
            ActionConfig::NotifyAgent { agent_id: "a".into(), message: "hi".into() },
        ));
    harness.rules.create(&rule).await.unwrap();

    harness.engine.start().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // Identical payloads (same message id and timestamp) -> same dedup key.
    let event = refund_event("hello");
    harness.event_bus.publish(event.clone());
    harness.event_bus.publish(event.clone());
    harness.event_bus.publish(event);

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    harness.engine.stop().await;

    assert_eq!(harness.pipeline.notified.load(Ordering::SeqCst), 1);
    let status = harness.engine.status().await;
    assert_eq!(status.events_deduplicated, 2);
}

#[tokio::test]
async fn test_engine_lifecycle_and_idempotent_stop() {
    let harness = harness_with(HarnessOptions::default()).await;

    assert_eq!(harness.engine.state().await, meridian::EngineState::Stopped);
    harness.engine.start().await.unwrap();
    assert_eq!(harness.engine.state().await, meridian::EngineState::Running);

    // A second start while running is rejected.
    assert!(harness.engine.start().await.is_err());

    harness.engine.stop().await;
    assert_eq!(harness.engine.state().await, meridian::EngineState::Stopped);
    // stop() is idempotent.
    harness.engine.stop().await;
    assert_eq!(harness.engine.state().await, meridian::EngineState::Stopped);

    // The engine can be started again after a full stop.
    harness.engine.start().await.unwrap();
    harness.engine.stop().await;
}
