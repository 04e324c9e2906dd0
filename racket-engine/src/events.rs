//! Event bus for notifications leaving the economy core.
//!
//! External collaborators (transport, rendering) subscribe here and turn
//! [`GameEvent`]s into user-facing messages. Uses tokio broadcast channels
//! for fan-out to multiple receivers; sends to an empty bus are dropped
//! silently, the core never waits for a consumer.

use racket_domain::GameEvent;
use tokio::sync::broadcast;
use tracing::warn;

/// Broadcast bus for game notifications.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GameEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    ///
    /// Capacity determines how many events can be buffered before slow
    /// receivers start missing events (lagging).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send an event to all subscribers.
    ///
    /// Returns the number of receivers that got the event; zero when
    /// nobody is listening.
    pub fn send(&self, event: GameEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events sent after this call.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Receiving side of the event bus.
pub struct EventReceiver {
    receiver: broadcast::Receiver<GameEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Skips over lag gaps (logging them) and returns `None` once the bus
    /// is closed.
    pub async fn recv(&mut self) -> Option<GameEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event receiver lagged, notifications dropped");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Drain events that are already buffered, without waiting.
    pub fn drain(&mut self) -> Vec<GameEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn sample() -> GameEvent {
        GameEvent::AccountCreated {
            account: 1,
            starting_cash: dec!(500),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_send_without_receivers_is_dropped() {
        let bus = EventBus::new(8);
        assert_eq!(bus.send(sample()), 0);
    }

    #[tokio::test]
    async fn test_fan_out_to_multiple_receivers() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        assert_eq!(bus.send(sample()), 2);
        assert!(a.recv().await.is_some());
        assert!(b.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_drain_collects_buffered_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.send(sample());
        bus.send(sample());
        assert_eq!(rx.drain().len(), 2);
        assert!(rx.drain().is_empty());
    }
}
