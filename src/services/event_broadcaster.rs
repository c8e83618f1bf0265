//! Event broadcaster for WebSocket real-time updates.
//!
//! Uses tokio::sync::broadcast to fan-out events to all connected WebSocket
//! sessions. Subscribers are additive: each session gets its own receiver and
//! filters job-scoped events against its subscription set, so there is no
//! per-event handler slot to clobber. Slow receivers lag and miss events
//! rather than blocking publishers.

use tokio::sync::broadcast;

use crate::models::{WsEvent, WsEventMessage};

/// Default capacity for the broadcast channel.
const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Event broadcaster that distributes events to all connected WebSocket clients.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<WsEventMessage>,
}

impl EventBroadcaster {
    /// Create a new EventBroadcaster with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new EventBroadcaster with a specific capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to receive events.
    /// Returns a receiver that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<WsEventMessage> {
        self.sender.subscribe()
    }

    /// Publish an event, stamping it with the current time.
    /// Returns the number of receivers that received the event.
    /// If there are no subscribers, returns 0 (does not error).
    pub fn publish(&self, event: WsEvent) -> usize {
        self.send(WsEventMessage::new(event))
    }

    /// Broadcast a pre-stamped event message to all subscribers.
    pub fn send(&self, event: WsEventMessage) -> usize {
        // Ignore errors when there are no subscribers
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
