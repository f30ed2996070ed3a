use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

/// Per-subscriber buffer used when the configuration does not provide one.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 32;

type Registry<T> = DashMap<String, TopicHub<T>>;

struct TopicHub<T> {
    sender: broadcast::Sender<T>,
    subscribers: HashSet<u64>,
}

impl<T: Clone> TopicHub<T> {
    fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self {
            sender,
            subscribers: HashSet::new(),
        }
    }
}

/// Topic based fan-out hub.
///
/// Publishing never waits on subscribers. Each subscriber owns a bounded ring; when it
/// falls behind, the oldest events are overwritten and skipped on its next receive.
pub struct Broadcaster<T> {
    topics: Arc<Registry<T>>,
    capacity: usize,
    next_id: AtomicU64,
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    /// Build a hub whose subscribers buffer up to `capacity` events each.
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber that will see every event published on `topic` from now on.
    pub fn subscribe(&self, topic: &str) -> Subscription<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut hub = self
            .topics
            .entry(topic.to_owned())
            .or_insert_with(|| TopicHub::new(self.capacity));
        hub.subscribers.insert(id);
        let receiver = hub.sender.subscribe();
        drop(hub);

        debug!(topic, subscription = id, "subscriber registered");
        Subscription {
            id,
            topic: topic.to_owned(),
            receiver,
            registry: Arc::clone(&self.topics),
        }
    }

    /// Remove a subscriber. Dropping the [`Subscription`] has the same effect.
    pub fn unsubscribe(&self, subscription: Subscription<T>) {
        drop(subscription);
    }

    /// Deliver `event` to the current subscribers of `topic` and return how many there were.
    pub fn publish(&self, topic: &str, event: T) -> usize {
        let Some(hub) = self.topics.get(topic) else {
            return 0;
        };
        hub.sender.send(event).unwrap_or(0)
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|hub| hub.subscribers.len())
            .unwrap_or(0)
    }

    /// Number of topics with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

/// A connection's binding to one topic.
pub struct Subscription<T: Clone> {
    id: u64,
    topic: String,
    receiver: broadcast::Receiver<T>,
    registry: Arc<Registry<T>>,
}

impl<T: Clone> Subscription<T> {
    /// Registry identifier of this subscription.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Topic this subscription listens on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next event, skipping whatever was overwritten while lagging.
    ///
    /// Returns `None` once the topic is gone.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        topic = %self.topic,
                        subscription = self.id,
                        skipped,
                        "subscriber lagged; dropping oldest events"
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

impl<T: Clone> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(mut hub) = self.registry.get_mut(&self.topic) {
            hub.subscribers.remove(&self.id);
        }
        self.registry
            .remove_if(&self.topic, |_, hub| hub.subscribers.is_empty());
        debug!(topic = %self.topic, subscription = self.id, "subscriber removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let hub = Broadcaster::<u64>::new(8);
        let mut first = hub.subscribe("playback");
        let mut second = hub.subscribe("playback");

        assert_eq!(hub.publish("playback", 7), 2);
        assert_eq!(first.recv().await, Some(7));
        assert_eq!(second.recv().await, Some(7));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let hub = Broadcaster::<u64>::new(8);
        assert_eq!(hub.publish("nobody", 1), 0);
        assert_eq!(hub.topic_count(), 0);
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let hub = Broadcaster::<u64>::new(8);
        let mut other = hub.subscribe("other");
        let _playback = hub.subscribe("playback");

        hub.publish("playback", 1);
        assert_eq!(other.try_recv(), None);
    }

    #[tokio::test]
    async fn slow_subscriber_keeps_newest_events() {
        let hub = Broadcaster::<u64>::new(4);
        let mut slow = hub.subscribe("playback");
        for revision in 1..=10 {
            hub.publish("playback", revision);
        }

        let mut received = Vec::new();
        while let Some(event) = slow.try_recv() {
            received.push(event);
        }
        assert_eq!(received, vec![7, 8, 9, 10]);
    }

    #[test]
    fn unsubscribe_prunes_empty_topics() {
        let hub = Broadcaster::<u64>::new(8);
        let first = hub.subscribe("playback");
        let second = hub.subscribe("playback");
        assert_eq!(hub.subscriber_count("playback"), 2);

        hub.unsubscribe(first);
        assert_eq!(hub.subscriber_count("playback"), 1);

        drop(second);
        assert_eq!(hub.subscriber_count("playback"), 0);
        assert_eq!(hub.topic_count(), 0);
    }
}
