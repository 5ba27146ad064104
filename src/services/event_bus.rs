//! EventBus: the seam between the platform's event producers and the
//! engine.
//!
//! Broadcast-based with sequence numbering. The ingestion layer (or a
//! test) publishes `AutomationEvent`s; the engine controller subscribes.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

use crate::domain::models::event::{AutomationEvent, SequenceNumber};

/// Configuration for the EventBus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Channel capacity for the broadcast channel.
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Central event bus for delivering business events to the engine.
pub struct EventBus {
    sender: broadcast::Sender<AutomationEvent>,
    sequence: AtomicU64,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity);
        Self {
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    /// Publish an event, assigning its sequence number. Send errors are
    /// ignored; there may be no subscriber yet.
    pub fn publish(&self, mut event: AutomationEvent) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        event.sequence = SequenceNumber(seq);
        let _ = self.sender.send(event);
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<AutomationEvent> {
        self.sender.subscribe()
    }

    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.sequence.load(Ordering::SeqCst))
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::event::TriggerEvent;

    #[tokio::test]
    async fn test_sequence_assignment() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(AutomationEvent::new("t1", TriggerEvent::ConversationCreated));
        bus.publish(AutomationEvent::new("t1", TriggerEvent::ConversationClosed));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.sequence.0, 0);
        assert_eq!(second.sequence.0, 1);
        assert_eq!(bus.current_sequence().0, 2);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.publish(AutomationEvent::new("t1", TriggerEvent::SlaBreached));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
