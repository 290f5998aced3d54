//! Subscription registry.
//!
//! Tracks which topics are desired and which handlers consume each of
//! them, independent of connection lifecycle. The registry performs no
//! network I/O; the client schedules subscribe/unsubscribe frames when
//! registration changes the desired set.

use crate::handler::{Handler, HandlerId};
use parking_lot::RwLock;
use rbx_core::Topic;
use std::collections::HashMap;
use tracing::debug;

#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: RwLock<HashMap<Topic, Vec<Handler>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for a topic. Idempotent per handler identity.
    ///
    /// Returns `true` when the topic was not previously desired, i.e. a
    /// subscribe frame should be scheduled.
    pub fn register(&self, topic: Topic, handler: Handler) -> bool {
        let mut inner = self.inner.write();
        match inner.get_mut(&topic) {
            Some(handlers) => {
                if handlers.iter().all(|h| h.id() != handler.id()) {
                    handlers.push(handler);
                } else {
                    debug!(topic = %topic, id = handler.id(), "handler already registered");
                }
                false
            }
            None => {
                inner.insert(topic, vec![handler]);
                true
            }
        }
    }

    /// Remove one handler from a topic.
    ///
    /// Returns `true` when the topic has no handlers left and is no longer
    /// desired, i.e. an unsubscribe frame should be scheduled.
    pub fn unregister(&self, topic: &Topic, id: HandlerId) -> bool {
        let mut inner = self.inner.write();
        let Some(handlers) = inner.get_mut(topic) else {
            return false;
        };
        handlers.retain(|h| h.id() != id);
        if handlers.is_empty() {
            inner.remove(topic);
            true
        } else {
            false
        }
    }

    /// Handlers for a topic, in registration order.
    pub fn handlers(&self, topic: &Topic) -> Vec<Handler> {
        self.inner.read().get(topic).cloned().unwrap_or_default()
    }

    pub fn contains(&self, topic: &Topic) -> bool {
        self.inner.read().contains_key(topic)
    }

    /// The full desired set; re-sent verbatim after a reconnect.
    pub fn desired_topics(&self) -> Vec<Topic> {
        self.inner.read().keys().cloned().collect()
    }

    pub fn topic_count(&self) -> usize {
        self.inner.read().len()
    }

    /// Flag every view as no longer fresh. Called on disconnect.
    pub fn mark_all_stale(&self) {
        for handlers in self.inner.read().values() {
            for handler in handlers {
                handler.mark_stale();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Orderbook, RawHandler};

    fn raw(topic: &Topic) -> Handler {
        RawHandler::new(topic.clone(), |_, _, _| {}).into()
    }

    #[test]
    fn test_register_reports_new_topics() {
        let registry = SubscriptionRegistry::new();
        let topic = Topic::orderbook("BTC-USD");

        assert!(registry.register(topic.clone(), raw(&topic)));
        assert!(!registry.register(topic.clone(), raw(&topic)));
        assert_eq!(registry.handlers(&topic).len(), 2);
        assert_eq!(registry.desired_topics(), vec![topic]);
    }

    #[test]
    fn test_register_is_idempotent_per_handler() {
        let registry = SubscriptionRegistry::new();
        let topic = Topic::orderbook("BTC-USD");
        let book = Orderbook::new("BTC-USD");

        registry.register(topic.clone(), book.clone().into());
        registry.register(topic.clone(), book.clone().into());

        assert_eq!(registry.handlers(&topic).len(), 1);
    }

    #[test]
    fn test_unregister_last_handler_drops_topic() {
        let registry = SubscriptionRegistry::new();
        let topic = Topic::orderbook("BTC-USD");
        let a = Orderbook::new("BTC-USD");
        let b = Orderbook::new("BTC-USD");

        registry.register(topic.clone(), a.clone().into());
        registry.register(topic.clone(), b.clone().into());

        assert!(!registry.unregister(&topic, a.id()));
        assert!(registry.contains(&topic));
        assert!(registry.unregister(&topic, b.id()));
        assert!(!registry.contains(&topic));
        assert!(registry.desired_topics().is_empty());
    }

    #[test]
    fn test_unregister_unknown_topic_is_noop() {
        let registry = SubscriptionRegistry::new();
        assert!(!registry.unregister(&Topic::account(), 42));
    }

    #[test]
    fn test_desired_topics_survive_mark_all_stale() {
        let registry = SubscriptionRegistry::new();
        let book = Orderbook::new("BTC-USD");
        registry.register(book.topic(), book.clone().into());
        registry.register(Topic::account(), raw(&Topic::account()));

        let before = {
            let mut topics = registry.desired_topics();
            topics.sort_by_key(|t| t.channel());
            topics
        };
        registry.mark_all_stale();
        let after = {
            let mut topics = registry.desired_topics();
            topics.sort_by_key(|t| t.channel());
            topics
        };

        assert_eq!(before, after);
        assert!(book.is_stale());
    }
}
