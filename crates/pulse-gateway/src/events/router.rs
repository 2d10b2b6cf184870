//! Event router
//!
//! Decodes inbound dispatch frames and delivers them to subscribers.
//! Delivery runs on one worker task per event type: events of the same
//! type arrive at subscribers in frame-arrival order, while different
//! types fan out concurrently. The producer side never blocks.

use super::registry::{DecoderFn, DecoderRegistry};
use super::types::{EventPayload, GatewayEvent};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::value::RawValue;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

/// A subscriber callback
pub type Handler = Arc<dyn Fn(&GatewayEvent) + Send + Sync>;

/// Routes decoded events to type-specific and catch-all subscribers
pub struct EventRouter {
    registry: DecoderRegistry,
    /// Type-specific subscribers
    handlers: DashMap<String, Vec<Handler>>,
    /// Subscribers receiving every event
    any_handlers: RwLock<Vec<Handler>>,
    /// Per-type delivery queues, created on first dispatch of a type
    queues: DashMap<String, mpsc::UnboundedSender<Arc<GatewayEvent>>>,
}

impl EventRouter {
    /// Create a router with the built-in decoders registered
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            registry: DecoderRegistry::new(),
            handlers: DashMap::new(),
            any_handlers: RwLock::new(Vec::new()),
            queues: DashMap::new(),
        })
    }

    /// Subscribe to one event type
    pub fn subscribe<F>(&self, event_type: &str, handler: F)
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        self.handlers
            .entry(event_type.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Subscribe to every event, including synthetic lifecycle events
    pub fn subscribe_all<F>(&self, handler: F)
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        self.any_handlers.write().push(Arc::new(handler));
    }

    /// Register (or replace) the payload decoder for an event type
    pub fn register_decoder(&self, event_type: &str, decoder: DecoderFn) {
        self.registry.register(event_type, decoder);
    }

    /// Decode a dispatch payload by its wire type string
    pub fn decode(
        &self,
        event_type: &str,
        raw: Option<&RawValue>,
    ) -> Result<EventPayload, serde_json::Error> {
        self.registry.decode(event_type, raw)
    }

    /// Deliver an event to subscribers.
    ///
    /// Never blocks the caller; delivery happens on the event type's
    /// worker task.
    pub fn dispatch(self: &Arc<Self>, event: GatewayEvent) {
        let event = Arc::new(event);
        let sender = self
            .queues
            .entry(event.event_type.clone())
            .or_insert_with(|| self.spawn_worker(&event.event_type))
            .clone();

        if sender.send(event).is_err() {
            // Worker gone, which only happens at teardown.
            tracing::debug!("event worker unavailable, dropping event");
        }
    }

    /// Spawn the delivery worker for one event type.
    ///
    /// The worker holds only a weak reference so dropping the router
    /// shuts the workers down.
    fn spawn_worker(self: &Arc<Self>, event_type: &str) -> mpsc::UnboundedSender<Arc<GatewayEvent>> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Arc<GatewayEvent>>();
        let router: Weak<Self> = Arc::downgrade(self);
        let event_type = event_type.to_string();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(router) = router.upgrade() else {
                    return;
                };
                router.deliver(&event_type, &event);
            }
        });

        tx
    }

    /// Invoke subscribers for one event, type-specific first
    fn deliver(&self, event_type: &str, event: &GatewayEvent) {
        if let Some(handlers) = self.handlers.get(event_type) {
            for handler in handlers.iter() {
                handler(event);
            }
        }
        let any = self.any_handlers.read().clone();
        for handler in any {
            handler(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::{event_type, Message};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn message_event(seq: u64, content: &str) -> GatewayEvent {
        GatewayEvent {
            sequence: Some(seq),
            event_type: event_type::MESSAGE_CREATE.to_string(),
            payload: EventPayload::MessageCreate(Box::new(Message {
                id: seq.to_string(),
                channel_id: "1".to_string(),
                author: None,
                content: content.to_string(),
                timestamp: None,
            })),
        }
    }

    #[tokio::test]
    async fn test_type_subscriber_receives_event() {
        let router = EventRouter::new();
        let count = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&count);
        router.subscribe(event_type::MESSAGE_CREATE, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        router.dispatch(message_event(1, "hello"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscriber_of_other_type_not_called() {
        let router = EventRouter::new();
        let count = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&count);
        router.subscribe(event_type::MESSAGE_DELETE, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        router.dispatch(message_event(1, "hello"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_any_subscriber_sees_everything() {
        let router = EventRouter::new();
        let count = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&count);
        router.subscribe_all(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        router.dispatch(message_event(1, "a"));
        router.dispatch(GatewayEvent::synthetic(EventPayload::Connected));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_same_type_delivery_is_ordered() {
        let router = EventRouter::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let seen = Arc::clone(&order);
        router.subscribe(event_type::MESSAGE_CREATE, move |event| {
            if let EventPayload::MessageCreate(message) = &event.payload {
                seen.lock().push(message.content.clone());
            }
        });

        for i in 0..20 {
            router.dispatch(message_event(i, &format!("m{i}")));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        let seen = order.lock();
        let expected: Vec<String> = (0..20).map(|i| format!("m{i}")).collect();
        assert_eq!(*seen, expected);
    }

    #[tokio::test]
    async fn test_dispatch_does_not_block_producer() {
        let router = EventRouter::new();
        // A slow subscriber must not stall dispatch.
        router.subscribe(event_type::MESSAGE_CREATE, |_| {
            std::thread::sleep(Duration::from_millis(20));
        });

        let started = std::time::Instant::now();
        for i in 0..10 {
            router.dispatch(message_event(i, "x"));
        }
        assert!(started.elapsed() < Duration::from_millis(20));
    }
}
