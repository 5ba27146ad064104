//! Domain events consumed by the automation engine.
//!
//! Events arrive from the platform's ingestion layer with a tenant id and
//! correlation ids for the conversation/contact/message they refer to.
//! The engine treats them as read-only input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing sequence number assigned by the EventBus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of business events that can trigger automation rules.
///
/// Wire names are the dotted strings the ingestion layer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerEvent {
    #[serde(rename = "conversation.created")]
    ConversationCreated,
    #[serde(rename = "conversation.closed")]
    ConversationClosed,
    #[serde(rename = "conversation.resolved")]
    ConversationResolved,
    #[serde(rename = "conversation.reopened")]
    ConversationReopened,
    #[serde(rename = "customer.message.received")]
    MessageReceived,
    #[serde(rename = "agent.message.sent")]
    AgentMessageSent,
    #[serde(rename = "sla.breached")]
    SlaBreached,
    #[serde(rename = "contact.created")]
    ContactCreated,
    #[serde(rename = "contact.tag.added")]
    TagAdded,
    #[serde(rename = "conversation.agent.assigned")]
    AgentAssigned,
    #[serde(rename = "pipeline.stage.changed")]
    PipelineStageChanged,
}

impl TriggerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConversationCreated => "conversation.created",
            Self::ConversationClosed => "conversation.closed",
            Self::ConversationResolved => "conversation.resolved",
            Self::ConversationReopened => "conversation.reopened",
            Self::MessageReceived => "customer.message.received",
            Self::AgentMessageSent => "agent.message.sent",
            Self::SlaBreached => "sla.breached",
            Self::ContactCreated => "contact.created",
            Self::TagAdded => "contact.tag.added",
            Self::AgentAssigned => "conversation.agent.assigned",
            Self::PipelineStageChanged => "pipeline.stage.changed",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "conversation.created" => Some(Self::ConversationCreated),
            "conversation.closed" => Some(Self::ConversationClosed),
            "conversation.resolved" => Some(Self::ConversationResolved),
            "conversation.reopened" => Some(Self::ConversationReopened),
            "customer.message.received" => Some(Self::MessageReceived),
            "agent.message.sent" => Some(Self::AgentMessageSent),
            "sla.breached" => Some(Self::SlaBreached),
            "contact.created" => Some(Self::ContactCreated),
            "contact.tag.added" => Some(Self::TagAdded),
            "conversation.agent.assigned" => Some(Self::AgentAssigned),
            "pipeline.stage.changed" => Some(Self::PipelineStageChanged),
            _ => None,
        }
    }
}

impl std::fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Messaging channel a conversation lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Whatsapp,
    Instagram,
    Messenger,
    Webchat,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Whatsapp => write!(f, "whatsapp"),
            Self::Instagram => write!(f, "instagram"),
            Self::Messenger => write!(f, "messenger"),
            Self::Webchat => write!(f, "webchat"),
        }
    }
}

/// Kind of message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Location,
}

/// A business event delivered to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationEvent {
    #[serde(default)]
    pub id: EventId,
    /// Assigned by the EventBus on publish.
    #[serde(default = "zero_sequence")]
    pub sequence: SequenceNumber,
    pub tenant_id: String,
    pub event_type: TriggerEvent,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub conversation_id: Option<String>,
    pub contact_id: Option<String>,
    pub message_id: Option<String>,
    /// Event-type specific payload: message body/kind/channel, tag name,
    /// stage ids, SLA details. Loosely typed on purpose; rules address
    /// these fields through dotted condition paths.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

fn zero_sequence() -> SequenceNumber {
    SequenceNumber(0)
}

impl AutomationEvent {
    pub fn new(tenant_id: impl Into<String>, event_type: TriggerEvent) -> Self {
        Self {
            id: EventId::new(),
            sequence: SequenceNumber(0),
            tenant_id: tenant_id.into(),
            event_type,
            timestamp: Utc::now(),
            conversation_id: None,
            contact_id: None,
            message_id: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_conversation(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn with_contact(mut self, id: impl Into<String>) -> Self {
        self.contact_id = Some(id.into());
        self
    }

    pub fn with_message(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Key used by the engine's short-window deduplication.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.tenant_id,
            self.event_type,
            self.conversation_id.as_deref().unwrap_or("-"),
            self.message_id.as_deref().unwrap_or("-"),
            self.timestamp.timestamp(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_event_round_trip() {
        for event in [
            TriggerEvent::ConversationCreated,
            TriggerEvent::MessageReceived,
            TriggerEvent::SlaBreached,
            TriggerEvent::PipelineStageChanged,
        ] {
            assert_eq!(TriggerEvent::parse_str(event.as_str()), Some(event));
        }
        assert_eq!(TriggerEvent::parse_str("not.an.event"), None);
    }

    #[test]
    fn test_trigger_event_wire_name() {
        let json = serde_json::to_string(&TriggerEvent::MessageReceived).unwrap();
        assert_eq!(json, "\"customer.message.received\"");
    }

    #[test]
    fn test_dedup_key_distinguishes_messages() {
        let a = AutomationEvent::new("t1", TriggerEvent::MessageReceived).with_message("m1");
        let b = AutomationEvent::new("t1", TriggerEvent::MessageReceived).with_message("m2");
        assert_ne!(a.dedup_key(), b.dedup_key());
    }
}
