//! Event bus consumer with acknowledgement, retry, and reconnection.
//!
//! # Pattern: Subscribe-Process-Reconnect Loop
//!
//! ```text
//! loop {
//!     subscribe
//!     for each delivery:
//!         handle (retrying with backoff)
//!         ok        -> ack, next
//!         exhausted -> nack, drop the subscription
//!     wait (capped backoff), resubscribe
//! }
//! ```
//!
//! A delivery is acknowledged only after its handler succeeded, so a crash
//! between the side effect and the ack causes a redelivery rather than a loss.
//! Shutdown is checked between deliveries, never in the middle of one.
//!
//! # Example
//!
//! ```rust,ignore
//! let consumer = EventConsumer::new(
//!     "stats-aggregator",
//!     vec!["todo-events".to_string()],
//!     event_bus,
//!     Arc::new(StatsAggregator::new(cache)),
//!     shutdown_tx.subscribe(),
//! );
//! let handle = consumer.spawn();
//! ```

use crate::metrics;
use crate::retry::{RetryPolicy, retry_with_backoff};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use todo_stats_core::event::SerializedEvent;
use todo_stats_core::event_bus::{EventBus, EventStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Error returned by an [`EventHandler`].
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Processing logic plugged into an [`EventConsumer`].
///
/// Handlers must tolerate duplicates: a delivery whose ack was lost is handled
/// again.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event was not processed; the consumer retries
    /// and eventually hands the event back to the bus.
    async fn handle(&self, event: &SerializedEvent) -> Result<(), HandlerError>;
}

/// How a subscription ended.
enum StreamEnd {
    Shutdown,
    Closed,
    Redeliver,
}

/// Long-lived consumer driving an [`EventHandler`] from an [`EventBus`].
pub struct EventConsumer {
    name: String,
    topics: Vec<String>,
    event_bus: Arc<dyn EventBus>,
    handler: Arc<dyn EventHandler>,
    shutdown: broadcast::Receiver<()>,
    handler_retry: RetryPolicy,
    reconnect: RetryPolicy,
}

impl EventConsumer {
    /// Create a consumer with default policies.
    ///
    /// - handler retries: 3, from 100ms
    /// - reconnect backoff: from 500ms, capped at 30s
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        topics: Vec<String>,
        event_bus: Arc<dyn EventBus>,
        handler: Arc<dyn EventHandler>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            name: name.into(),
            topics,
            event_bus,
            handler,
            shutdown,
            handler_retry: RetryPolicy::default(),
            reconnect: RetryPolicy::new(
                usize::MAX,
                Duration::from_millis(500),
                Duration::from_secs(30),
            ),
        }
    }

    /// Replace the policy for retrying a failing handler.
    #[must_use]
    pub fn with_handler_retry(mut self, policy: RetryPolicy) -> Self {
        self.handler_retry = policy;
        self
    }

    /// Replace the backoff between resubscription attempts.
    #[must_use]
    pub fn with_reconnect_backoff(mut self, policy: RetryPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Spawn the consumer as a background task.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run until shutdown is signalled (or the shutdown sender is dropped).
    pub async fn run(&mut self) {
        info!(consumer = %self.name, topics = ?self.topics, "Event consumer started");
        let mut attempt = 0;

        loop {
            let topics: Vec<&str> = self.topics.iter().map(String::as_str).collect();

            let subscribed = tokio::select! {
                _ = self.shutdown.recv() => break,
                result = self.event_bus.subscribe(&topics) => result,
            };

            match subscribed {
                Ok(stream) => {
                    info!(consumer = %self.name, "Subscribed to event bus");
                    let (end, progressed) = self.process_stream(stream).await;
                    if progressed {
                        attempt = 0;
                    }
                    match end {
                        StreamEnd::Shutdown => break,
                        StreamEnd::Closed => warn!(consumer = %self.name, "Event stream ended"),
                        StreamEnd::Redeliver => {
                            warn!(consumer = %self.name, "Dropped subscription to force redelivery");
                        }
                    }
                }
                Err(e) => {
                    error!(consumer = %self.name, error = %e, "Failed to subscribe to event bus");
                }
            }

            let delay = self.reconnect.delay_for_attempt(attempt);
            attempt = attempt.saturating_add(1);
            info!(consumer = %self.name, delay_ms = delay.as_millis(), "Resubscribing after delay");
            tokio::select! {
                _ = self.shutdown.recv() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        info!(consumer = %self.name, "Event consumer stopped");
    }

    /// Process deliveries until the stream ends, a delivery must be redelivered,
    /// or shutdown. Also reports whether any delivery was acknowledged.
    async fn process_stream(&mut self, mut stream: EventStream) -> (StreamEnd, bool) {
        let mut progressed = false;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.recv() => return (StreamEnd::Shutdown, progressed),
                next = stream.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    error!(consumer = %self.name, error = %e, "Error receiving event from stream");
                    continue;
                }
                None => return (StreamEnd::Closed, progressed),
            };

            let handler = Arc::clone(&self.handler);
            let event = &delivery.event;
            let handled = retry_with_backoff(&self.handler_retry, &self.name, || {
                let handler = Arc::clone(&handler);
                async move { handler.handle(event).await }
            })
            .await;

            match handled {
                Ok(()) => {
                    debug!(consumer = %self.name, event_type = %delivery.event.event_type, "Event handled");
                    delivery.ack();
                    progressed = true;
                }
                Err(e) => {
                    error!(
                        consumer = %self.name,
                        event_type = %delivery.event.event_type,
                        error = %e,
                        "Failed to handle event, handing it back for redelivery"
                    );
                    delivery.nack();
                    metrics::record_redelivered();
                    return (StreamEnd::Redeliver, progressed);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::aggregator::StatsAggregator;
    use serde_json::json;
    use todo_stats_core::counter::CounterKey;
    use todo_stats_testing::{InMemoryCounterCache, InMemoryEventBus};

    const TOPIC: &str = "todo-events";

    fn event(event_type: &str) -> SerializedEvent {
        SerializedEvent::new(event_type.to_string(), json!({"_id": "x"}), None)
    }

    fn fast() -> RetryPolicy {
        RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(5))
    }

    fn aggregator_consumer(
        bus: &InMemoryEventBus,
        cache: &InMemoryCounterCache,
        shutdown: &broadcast::Sender<()>,
    ) -> EventConsumer {
        EventConsumer::new(
            "test-aggregator",
            vec![TOPIC.to_string()],
            Arc::new(bus.with_group("aggregators")),
            Arc::new(StatsAggregator::new(Arc::new(cache.clone()))),
            shutdown.subscribe(),
        )
        .with_handler_retry(fast())
        .with_reconnect_backoff(RetryPolicy::new(
            usize::MAX,
            Duration::from_millis(1),
            Duration::from_millis(5),
        ))
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(check(), "condition not reached in time");
    }

    /// Subscriptions happen inside the spawned task; wait for the group to exist.
    async fn subscribed(bus: &InMemoryEventBus) {
        eventually(|| bus.has_group("aggregators")).await;
    }

    #[tokio::test]
    async fn counts_events_and_acknowledges_them() {
        let bus = InMemoryEventBus::new();
        let cache = InMemoryCounterCache::new();
        let (shutdown, _) = broadcast::channel(1);
        let handle = aggregator_consumer(&bus, &cache, &shutdown).spawn();
        subscribed(&bus).await;

        for kind in ["todo.created", "todo.created", "todo.completed", "todo.deleted"] {
            bus.publish(TOPIC, &event(kind)).await.unwrap();
        }

        eventually(|| cache.value(CounterKey::Deleted) == Some(1)).await;
        assert_eq!(cache.value(CounterKey::Created), Some(2));
        assert_eq!(cache.value(CounterKey::Completed), Some(1));
        assert_eq!(bus.pending("aggregators"), 0);

        shutdown.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn failed_event_is_redelivered_and_counted_once_it_succeeds() {
        let bus = InMemoryEventBus::new();
        let cache = InMemoryCounterCache::new();
        let (shutdown, _) = broadcast::channel(1);
        let handle = aggregator_consumer(&bus, &cache, &shutdown).spawn();
        subscribed(&bus).await;

        // Initial attempt and its single retry both fail.
        cache.fail_next_increments(2);
        bus.publish(TOPIC, &event("todo.created")).await.unwrap();

        eventually(|| cache.value(CounterKey::Created) == Some(1)).await;
        assert!(bus.redeliveries() >= 1);

        shutdown.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_consumers_never_lose_an_increment() {
        let bus = InMemoryEventBus::new();
        let cache = InMemoryCounterCache::new();
        let (shutdown, _) = broadcast::channel(1);
        let handles: Vec<_> = (0..3)
            .map(|_| aggregator_consumer(&bus, &cache, &shutdown).spawn())
            .collect();
        subscribed(&bus).await;

        for _ in 0..30 {
            bus.publish(TOPIC, &event("todo.created")).await.unwrap();
        }

        eventually(|| cache.value(CounterKey::Created) == Some(30)).await;

        shutdown.send(()).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn stops_on_shutdown_while_idle() {
        let bus = InMemoryEventBus::new();
        let cache = InMemoryCounterCache::new();
        let (shutdown, _) = broadcast::channel(1);
        let handle = aggregator_consumer(&bus, &cache, &shutdown).spawn();
        subscribed(&bus).await;

        shutdown.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
