//! Event-driven communication between the daemon's services.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::input::Button;

/// Application events.
///
/// Published on the [`EventBus`] and consumed by whoever is interested;
/// the coordinator watches for [`Event::SystemShutdown`].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SystemShutdown,
    /// A debounced physical button press was applied.
    ButtonPressed(Button),
    /// The whole-degree ambient temperature differs from the last sample.
    TemperatureChanged(i32),
    TimerArmed { id: Uuid, after: Duration },
    TimerExpired { id: Uuid },
}

/// Publish-subscribe bus shared by all services.
///
/// # Example
///
/// ```no_run
/// use rigd::event::{Event, EventBus};
///
/// let event_bus = EventBus::new();
/// let mut subscriber = event_bus.subscribe();
/// event_bus.publish(Event::TemperatureChanged(27)).unwrap();
///
/// // In async context, receive events:
/// // let event = subscriber.recv().await;
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns an error if there are no active subscribers.
    pub fn publish(&self, event: Event) -> Result<()> {
        self.sender.send(event)?;
        Ok(())
    }

    /// Publishes an event nobody is required to hear.
    pub fn notify(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn subscribers_see_published_events() {
        let event_bus = EventBus::new();
        let mut first = event_bus.subscribe();
        let mut second = event_bus.clone().subscribe();

        event_bus.publish(Event::ButtonPressed(Button::Speed)).unwrap();

        assert_eq!(first.recv().await.unwrap(), Event::ButtonPressed(Button::Speed));
        assert_eq!(second.recv().await.unwrap(), Event::ButtonPressed(Button::Speed));
    }

    #[test]
    fn publish_without_subscribers_fails() {
        let event_bus = EventBus::new();
        assert!(event_bus.publish(Event::SystemShutdown).is_err());
        event_bus.notify(Event::SystemShutdown);
    }

    #[tokio::test]
    async fn events_keep_publication_order() {
        let event_bus = EventBus::with_capacity(4);
        let mut receiver = event_bus.subscribe();
        let id = Uuid::new_v4();

        event_bus.notify(Event::TimerArmed {
            id,
            after: Duration::from_secs(60),
        });
        event_bus.notify(Event::TimerExpired { id });

        assert!(matches!(receiver.recv().await.unwrap(), Event::TimerArmed { .. }));
        assert_eq!(receiver.recv().await.unwrap(), Event::TimerExpired { id });
    }
}
