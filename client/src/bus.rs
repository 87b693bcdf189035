//! Ordered publish/subscribe bus for model change notifications.
//!
//! The bus is the single serialization point between the model and the view
//! layers: every published event is delivered to all handlers subscribed to
//! its topic, in subscription order, and a publish issued while another
//! delivery is in progress is queued rather than interleaved. Handlers run
//! synchronously on the session's cooperative thread; a panicking handler is
//! caught and logged so it cannot suppress delivery to the remaining
//! handlers.

use log::warn;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<E> = Box<dyn FnMut(&E)>;

struct Subscriber<E> {
    id: u64,
    topic: String,
    // Taken out of the slot while the handler runs so a handler may
    // subscribe/unsubscribe on the same bus without aliasing.
    handler: Option<Handler<E>>,
}

struct Inner<E> {
    subscribers: Vec<Subscriber<E>>,
    pending: VecDeque<(String, E)>,
    delivering: bool,
    next_id: u64,
}

/// Cheap-to-clone handle to a topic-scoped event bus.
///
/// Not `Send`: the bus lives on the session's single cooperative thread.
pub struct EventBus<E> {
    inner: Rc<RefCell<Inner<E>>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                subscribers: Vec::new(),
                pending: VecDeque::new(),
                delivering: false,
                next_id: 1,
            })),
        }
    }

    /// Registers a handler for `topic`. Handlers for one topic fire in the
    /// order they were subscribed.
    pub fn subscribe(&self, topic: &str, handler: impl FnMut(&E) + 'static) -> SubscriptionId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push(Subscriber {
            id,
            topic: topic.to_string(),
            handler: Some(Box::new(handler)),
        });
        SubscriptionId(id)
    }

    /// Removes a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|s| s.id != id.0);
        inner.subscribers.len() != before
    }

    /// Drops every subscription. Pending deliveries still drain, but find no
    /// handlers.
    pub fn clear(&self) {
        self.inner.borrow_mut().subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Delivers `event` to every handler currently subscribed to `topic`.
    ///
    /// Publishing with no subscribers is a no-op. A publish issued from
    /// inside a handler is queued and delivered after the current event has
    /// reached all of its handlers.
    pub fn publish(&self, topic: &str, event: E) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.pending.push_back((topic.to_string(), event));
            if inner.delivering {
                return;
            }
            inner.delivering = true;
        }

        while let Some((topic, event)) = {
            let mut inner = self.inner.borrow_mut();
            inner.pending.pop_front()
        } {
            self.deliver(&topic, &event);
        }

        self.inner.borrow_mut().delivering = false;
    }

    fn deliver(&self, topic: &str, event: &E) {
        let ids: Vec<u64> = self
            .inner
            .borrow()
            .subscribers
            .iter()
            .filter(|s| s.topic == topic)
            .map(|s| s.id)
            .collect();

        for id in ids {
            let taken = {
                let mut inner = self.inner.borrow_mut();
                inner
                    .subscribers
                    .iter_mut()
                    .find(|s| s.id == id)
                    .and_then(|s| s.handler.take())
            };

            // None means an earlier handler unsubscribed this one mid-event.
            let Some(mut handler) = taken else {
                continue;
            };

            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!(
                    "Handler {} for topic '{}' panicked; continuing delivery",
                    id, topic
                );
            }

            let mut inner = self.inner.borrow_mut();
            if let Some(slot) = inner.subscribers.iter_mut().find(|s| s.id == id) {
                slot.handler = Some(handler);
            }
        }
    }
}

impl<E: 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> Box<dyn FnMut(&u32)>) {
        let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |tag: &str| -> Box<dyn FnMut(&u32)> {
            let log = log_clone.clone();
            let tag = tag.to_string();
            Box::new(move |value: &u32| {
                log.borrow_mut().push(format!("{}:{}", tag, value));
            })
        };
        (log, make)
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus: EventBus<u32> = EventBus::new();
        bus.publish("anything", 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_delivery_in_subscription_order() {
        let bus: EventBus<u32> = EventBus::new();
        let (log, make) = recorder();

        bus.subscribe("tick", make("a"));
        bus.subscribe("tick", make("b"));
        bus.subscribe("other", make("c"));

        bus.publish("tick", 7);

        assert_eq!(*log.borrow(), vec!["a:7", "b:7"]);
    }

    #[test]
    fn test_nested_publish_is_queued_not_interleaved() {
        let bus: EventBus<u32> = EventBus::new();
        let (log, make) = recorder();

        // First handler republished a follow-up event; every handler must see
        // event 1 before anyone sees event 2.
        let nested_bus = bus.clone();
        let log_first = log.clone();
        bus.subscribe("tick", move |value: &u32| {
            log_first.borrow_mut().push(format!("first:{}", value));
            if *value == 1 {
                nested_bus.publish("tick", 2);
            }
        });
        bus.subscribe("tick", make("second"));

        bus.publish("tick", 1);

        assert_eq!(
            *log.borrow(),
            vec!["first:1", "second:1", "first:2", "second:2"]
        );
    }

    #[test]
    fn test_panicking_handler_does_not_block_others() {
        let bus: EventBus<u32> = EventBus::new();
        let (log, make) = recorder();

        bus.subscribe("tick", |_value: &u32| {
            panic!("boom");
        });
        bus.subscribe("tick", make("survivor"));

        bus.publish("tick", 3);

        assert_eq!(*log.borrow(), vec!["survivor:3"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus: EventBus<u32> = EventBus::new();
        let (log, make) = recorder();

        let sub = bus.subscribe("tick", make("gone"));
        bus.subscribe("tick", make("kept"));

        assert!(bus.unsubscribe(sub));
        assert!(!bus.unsubscribe(sub));

        bus.publish("tick", 9);
        assert_eq!(*log.borrow(), vec!["kept:9"]);
    }

    #[test]
    fn test_handler_may_unsubscribe_peer_mid_event() {
        let bus: EventBus<u32> = EventBus::new();
        let (log, make) = recorder();

        let slot: Rc<RefCell<Option<SubscriptionId>>> = Rc::new(RefCell::new(None));
        let bus_handle = bus.clone();
        let slot_clone = slot.clone();
        bus.subscribe("tick", move |_value: &u32| {
            if let Some(id) = slot_clone.borrow_mut().take() {
                bus_handle.unsubscribe(id);
            }
        });
        let victim = bus.subscribe("tick", make("victim"));
        *slot.borrow_mut() = Some(victim);

        bus.publish("tick", 1);
        bus.publish("tick", 2);

        // The victim never fires: it was removed before the first event
        // reached it.
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_clear_removes_everything() {
        let bus: EventBus<u32> = EventBus::new();
        let (log, make) = recorder();

        bus.subscribe("a", make("a"));
        bus.subscribe("b", make("b"));
        bus.clear();
        assert_eq!(bus.subscriber_count(), 0);

        bus.publish("a", 1);
        bus.publish("b", 1);
        assert!(log.borrow().is_empty());
    }
}
