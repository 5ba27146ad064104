//! Evaluation context: the event merged with best-effort entity snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::event::{AutomationEvent, Channel};

/// Subset of contact fields the engine evaluates against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactSnapshot {
    pub id: String,
    pub phone: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub custom_fields: HashMap<String, Value>,
}

/// Subset of conversation fields the engine evaluates against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub id: String,
    pub status: Option<String>,
    pub assignee_id: Option<String>,
    pub source: Option<String>,
    pub channel: Option<Channel>,
    /// End of the 24h reply window, when known.
    pub window_expires_at: Option<DateTime<Utc>>,
}

/// Enriched context a rule is evaluated against. Snapshots are best-effort:
/// a failed load leaves the field `None` and the pipeline proceeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationContext {
    pub event: AutomationEvent,
    pub contact: Option<ContactSnapshot>,
    pub conversation: Option<ConversationSnapshot>,
}

impl EvaluationContext {
    pub fn new(event: AutomationEvent) -> Self {
        Self {
            event,
            contact: None,
            conversation: None,
        }
    }

    /// Resolve a dotted path against the context. Unknown paths resolve to
    /// `Null`, never an error.
    ///
    /// Supported roots: `event.*`, `message.*` (event metadata),
    /// `contact.*` (including `contact.custom.*`), `conversation.*`.
    /// A bare path with no known root falls back to event metadata.
    pub fn lookup(&self, path: &str) -> Value {
        let (root, rest) = match path.split_once('.') {
            Some((root, rest)) => (root, rest),
            None => ("", path),
        };

        match root {
            "event" => match rest {
                "type" => Value::String(self.event.event_type.as_str().to_string()),
                "tenant_id" => Value::String(self.event.tenant_id.clone()),
                "timestamp" => Value::String(self.event.timestamp.to_rfc3339()),
                "conversation_id" => opt_string(&self.event.conversation_id),
                "contact_id" => opt_string(&self.event.contact_id),
                "message_id" => opt_string(&self.event.message_id),
                other => self.event.metadata.get(other).cloned().unwrap_or(Value::Null),
            },
            "message" => self
                .event
                .metadata
                .get(rest)
                .cloned()
                .unwrap_or(Value::Null),
            "contact" => match &self.contact {
                Some(contact) => match rest {
                    "id" => Value::String(contact.id.clone()),
                    "phone" => opt_string(&contact.phone),
                    "name" => opt_string(&contact.name),
                    "tags" => Value::Array(
                        contact.tags.iter().map(|t| Value::String(t.clone())).collect(),
                    ),
                    other => match other.strip_prefix("custom.") {
                        Some(key) => contact.custom_fields.get(key).cloned().unwrap_or(Value::Null),
                        None => contact.custom_fields.get(other).cloned().unwrap_or(Value::Null),
                    },
                },
                None => Value::Null,
            },
            "conversation" => match &self.conversation {
                Some(conversation) => match rest {
                    "id" => Value::String(conversation.id.clone()),
                    "status" => opt_string(&conversation.status),
                    "assignee_id" => opt_string(&conversation.assignee_id),
                    "source" => opt_string(&conversation.source),
                    "channel" => conversation
                        .channel
                        .map(|c| Value::String(c.to_string()))
                        .unwrap_or(Value::Null),
                    _ => Value::Null,
                },
                None => Value::Null,
            },
            _ => self.event.metadata.get(path).cloned().unwrap_or(Value::Null),
        }
    }

    /// The message body, when the event carries one.
    pub fn message_body(&self) -> Option<&str> {
        self.event.metadata.get("body").and_then(Value::as_str)
    }

    /// Contact tags, empty when no snapshot loaded.
    pub fn contact_tags(&self) -> &[String] {
        self.contact.as_ref().map(|c| c.tags.as_slice()).unwrap_or(&[])
    }

    /// Substitute `{{path}}` placeholders with context values. Unknown
    /// paths render as an empty string.
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let path = after[..end].trim();
                    match self.lookup(path) {
                        Value::Null => {}
                        Value::String(s) => out.push_str(&s),
                        other => out.push_str(&other.to_string()),
                    }
                    rest = &after[end + 2..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    return out;
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Full context as a JSON document (webhook payloads, logging).
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn opt_string(value: &Option<String>) -> Value {
    value.clone().map(Value::String).unwrap_or(Value::Null)
}
