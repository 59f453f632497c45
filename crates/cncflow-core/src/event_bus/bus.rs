//! Event bus implementation.
//!
//! Distributes driver events to a variable fan-out set of clients:
//! synchronous handlers called on the publishing thread, plus a broadcast
//! channel for async consumers.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::events::{DriverEvent, EventCategory};

/// Subscription handle for unsubscribing from events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// Filter to receive only specific event categories
#[derive(Debug, Clone, Default)]
pub enum EventFilter {
    /// Receive all events.
    #[default]
    All,
    /// Receive events matching any of these categories.
    Categories(Vec<EventCategory>),
}

impl EventFilter {
    /// Check if an event matches this filter
    pub fn matches(&self, event: &DriverEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Categories(categories) => categories.contains(&event.category()),
        }
    }
}

type EventHandler = Box<dyn Fn(DriverEvent) + Send + Sync>;

/// Configuration for the event bus
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Channel capacity for the broadcast side.
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Broadcast sink for all client-facing driver events
///
/// The driver core calls a single `publish`; registered clients receive the
/// event either through a synchronous handler or by polling a broadcast
/// receiver from an async task.
pub struct EventBus {
    sender: broadcast::Sender<DriverEvent>,
    handlers: Arc<RwLock<HashMap<SubscriptionId, (EventFilter, EventHandler)>>>,
    config: EventBusConfig,
}

impl EventBus {
    /// Create a new event bus with default configuration
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create a new event bus with custom configuration
    pub fn with_config(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity);
        Self {
            sender,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Publish an event to all subscribers
    ///
    /// Dropped silently when nobody is listening; the driver must keep
    /// working with zero clients attached.
    pub fn publish(&self, event: DriverEvent) {
        tracing::trace!(event = event.wire_name(), "{}", event.description());

        let handlers = self.handlers.read();
        for (_, (filter, handler)) in handlers.iter() {
            if filter.matches(&event) {
                handler(event.clone());
            }
        }

        // Broadcast errors only mean there are no async receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe with a synchronous handler
    ///
    /// The handler runs on the publishing thread and must return quickly.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(DriverEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.handlers.write().insert(id, (filter, Box::new(handler)));
        tracing::debug!("Subscription {} added", id);
        id
    }

    /// Get a receiver for event polling from an async task
    pub fn receiver(&self) -> broadcast::Receiver<DriverEvent> {
        self.sender.subscribe()
    }

    /// Unsubscribe; returns true if the subscription existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.handlers.write().remove(&id).is_some();
        if removed {
            tracing::debug!("Subscription {} removed", id);
        }
        removed
    }

    /// Number of synchronous subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Get the current configuration
    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::WorkflowState;
    use crate::event_bus::events::{ConnectionEvent, WorkflowEvent};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn open_event() -> DriverEvent {
        DriverEvent::Connection(ConnectionEvent::Open {
            target: "/dev/ttyUSB0".to_string(),
        })
    }

    #[test]
    fn subscribe_and_unsubscribe() {
        let bus = EventBus::new();
        let id = bus.subscribe(EventFilter::All, |_| {});
        assert_eq!(bus.subscriber_count(), 1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn event_delivery() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        bus.subscribe(EventFilter::All, move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(open_event());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(open_event());
    }

    #[test]
    fn category_filtering() {
        let bus = EventBus::new();
        let conn = Arc::new(AtomicUsize::new(0));
        let work = Arc::new(AtomicUsize::new(0));

        let c = conn.clone();
        bus.subscribe(
            EventFilter::Categories(vec![EventCategory::Connection]),
            move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            },
        );
        let w = work.clone();
        bus.subscribe(
            EventFilter::Categories(vec![EventCategory::Workflow]),
            move |_| {
                w.fetch_add(1, Ordering::SeqCst);
            },
        );

        bus.publish(open_event());
        bus.publish(DriverEvent::Workflow(WorkflowEvent {
            state: WorkflowState::Running,
        }));

        assert_eq!(conn.load(Ordering::SeqCst), 1);
        assert_eq!(work.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn async_receiver() {
        let bus = EventBus::new();
        let mut receiver = bus.receiver();

        bus.publish(open_event());

        match receiver.try_recv() {
            Ok(DriverEvent::Connection(ConnectionEvent::Open { target })) => {
                assert_eq!(target, "/dev/ttyUSB0");
            }
            other => panic!("Wrong event received: {:?}", other),
        }
    }
}
