//! Fan-out of parsed device events to subscribers.

use std::sync::Arc;
use log::trace;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::device::types::EventKind;

/// Notification name subscribers of the mirror UI listen for.
pub const NOTIFICATION: &str = "RETRIEVED_GESTURE";

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Sink for events that subscribers should see.
///
/// Publishing is fire-and-forget: there is no acknowledgement and a slow subscriber never
/// blocks the caller.
pub trait EventPublisher: Send + 'static {
    fn publish(&self, kind: EventKind, payload: &str);
}

impl<T: EventPublisher + Sync + ?Sized> EventPublisher for Arc<T> {
    fn publish(&self, kind: EventKind, payload: &str) {
        (**self).publish(kind, payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayMessage {
    pub notification: &'static str,
    pub kind: EventKind,
    pub payload: String,
}

/// Broadcast channel based publisher.
///
/// Subscribers only receive messages published after they subscribed. A subscriber that falls
/// more than the channel capacity behind loses the oldest messages.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RelayMessage>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayMessage> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, kind: EventKind, payload: &str) {
        let message = RelayMessage {
            notification: NOTIFICATION,
            kind,
            payload: payload.to_string(),
        };

        // no subscribers is not an error
        if let Ok(count) = self.sender.send(message) {
            trace!("Published {:?} {} to {} subscribers", kind, payload, count);
        }
    }
}
