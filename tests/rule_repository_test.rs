//! SQLite rule repository: round trips, trigger-scoped fetch ordering,
//! counter/stat settlement and soft deletion.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use meridian::adapters::sqlite::{create_migrated_test_pool, SqliteRuleRepository};
use meridian::domain::models::event::{Channel, TriggerEvent};
use meridian::domain::models::execution::ExecutionStatus;
use meridian::domain::models::rule::{
    ActionConfig, AutomationRule, Condition, ConditionOperator, RuleAction, RuleRateLimit,
    TriggerFilters,
};
use meridian::domain::ports::RuleRepository;

async fn repo() -> SqliteRuleRepository {
    let pool = create_migrated_test_pool().await.expect("test database");
    SqliteRuleRepository::new(pool)
}

fn full_rule() -> AutomationRule {
    AutomationRule::new("tenant-1", "welcome-vip", TriggerEvent::MessageReceived)
        .with_priority(5)
        .with_filters(TriggerFilters {
            channel: Some(Channel::Whatsapp),
            keywords: vec!["hello".into()],
            required_tags: vec!["vip".into()],
            ..Default::default()
        })
        .with_condition(Condition::new(
            "message.body",
            ConditionOperator::Contains,
            json!("hello"),
        ))
        .with_action(RuleAction::new(
            1,
            ActionConfig::SendText { body: "Welcome {{contact.name}}!".into() },
        ))
        .with_action(
            RuleAction::new(
                2,
                ActionConfig::CallWebhook { url: "https://example.test/hook".into(), headers: Default::default() },
            )
            .continue_on_failure(),
        )
        .with_rate_limit(RuleRateLimit {
            max_executions: 10,
            window_seconds: 120,
            per_contact_cooldown_seconds: 60,
            ..Default::default()
        })
}

#[tokio::test]
async fn test_create_get_round_trip() {
    let repo = repo().await;
    let rule = full_rule();
    repo.create(&rule).await.unwrap();

    let loaded = repo.get(rule.id).await.unwrap().unwrap();
    assert_eq!(loaded.name, "welcome-vip");
    assert_eq!(loaded.priority, 5);
    assert_eq!(loaded.trigger, TriggerEvent::MessageReceived);
    assert_eq!(loaded.filters.channel, Some(Channel::Whatsapp));
    assert_eq!(loaded.conditions.len(), 1);
    assert_eq!(loaded.actions.len(), 2);
    assert!(loaded.actions[1].continue_on_failure);
    assert_eq!(loaded.rate_limit.max_executions, 10);
    assert!(loaded.enabled);
    assert!(loaded.deleted_at.is_none());
}

#[tokio::test]
async fn test_get_unknown_rule_is_none() {
    let repo = repo().await;
    assert!(repo.get(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_trigger_fetch_orders_by_priority_then_creation() {
    let repo = repo().await;

    let mut low = AutomationRule::new("tenant-1", "low", TriggerEvent::ConversationCreated);
    low.priority = 1;
    low.created_at = Utc::now() - chrono::Duration::seconds(30);
    let mut high = AutomationRule::new("tenant-1", "high", TriggerEvent::ConversationCreated);
    high.priority = 9;
    let mut tie_older = AutomationRule::new("tenant-1", "tie-older", TriggerEvent::ConversationCreated);
    tie_older.priority = 9;
    tie_older.created_at = Utc::now() - chrono::Duration::seconds(60);

    // Unrelated trigger and disabled rules must not appear.
    let other_trigger = AutomationRule::new("tenant-1", "other", TriggerEvent::SlaBreached);
    let mut disabled = AutomationRule::new("tenant-1", "disabled", TriggerEvent::ConversationCreated);
    disabled.enabled = false;

    for rule in [&low, &high, &tie_older, &other_trigger, &disabled] {
        repo.create(rule).await.unwrap();
    }

    let candidates = repo
        .list_enabled_for_trigger("tenant-1", TriggerEvent::ConversationCreated)
        .await
        .unwrap();
    let names: Vec<&str> = candidates.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["tie-older", "high", "low"]);
}

#[tokio::test]
async fn test_record_outcome_settles_counters_and_stats() {
    let repo = repo().await;
    let rule = full_rule();
    repo.create(&rule).await.unwrap();
    let now = Utc::now();

    repo.record_outcome(rule.id, ExecutionStatus::Success, true, now)
        .await
        .unwrap();
    repo.record_outcome(rule.id, ExecutionStatus::Failed, true, now)
        .await
        .unwrap();
    repo.record_outcome(rule.id, ExecutionStatus::Skipped, false, now)
        .await
        .unwrap();

    let loaded = repo.get(rule.id).await.unwrap().unwrap();
    // Window budget moved only for the two executed attempts.
    assert_eq!(loaded.counters.current_window_count, 2);
    assert_eq!(loaded.counters.daily_execution_count, 2);
    assert_eq!(loaded.stats.total_matched, 2);
    assert_eq!(loaded.stats.total_succeeded, 1);
    assert_eq!(loaded.stats.total_failed, 1);
    assert_eq!(loaded.stats.total_skipped, 1);
    assert!(loaded.stats.last_executed_at.is_some());
    assert!(loaded.stats.last_success_at.is_some());
    assert!(loaded.stats.last_failure_at.is_some());
}

#[tokio::test]
async fn test_set_enabled_and_soft_delete() {
    let repo = repo().await;
    let rule = full_rule();
    repo.create(&rule).await.unwrap();

    assert!(repo.set_enabled(rule.id, false).await.unwrap());
    let loaded = repo.get(rule.id).await.unwrap().unwrap();
    assert!(!loaded.enabled);

    repo.soft_delete(rule.id).await.unwrap();
    // Soft-deleted rules stay readable by id (execution history references
    // them) but drop out of listings and candidate fetches.
    let loaded = repo.get(rule.id).await.unwrap().unwrap();
    assert!(loaded.deleted_at.is_some());
    assert!(repo.list("tenant-1").await.unwrap().is_empty());
    assert!(repo
        .list_enabled_for_trigger("tenant-1", TriggerEvent::MessageReceived)
        .await
        .unwrap()
        .is_empty());

    // Toggling a deleted rule reports not-found.
    assert!(!repo.set_enabled(rule.id, true).await.unwrap());
}

#[tokio::test]
async fn test_update_rewrites_configuration() {
    let repo = repo().await;
    let mut rule = full_rule();
    repo.create(&rule).await.unwrap();

    rule.name = "welcome-vip-v2".into();
    rule.priority = 7;
    rule.actions.push(RuleAction::new(3, ActionConfig::CloseConversation));
    repo.update(&rule).await.unwrap();

    let loaded = repo.get(rule.id).await.unwrap().unwrap();
    assert_eq!(loaded.name, "welcome-vip-v2");
    assert_eq!(loaded.priority, 7);
    assert_eq!(loaded.actions.len(), 3);
}
