//! In-memory event bus with consumer groups and redelivery.
//!
//! Mirrors the delivery semantics of the Kafka-backed bus closely enough to
//! test at-least-once behaviour:
//!
//! - each consumer group gets its own copy of every event published after the
//!   group first subscribed
//! - subscribers in one group share the group's queue
//! - a nacked or dropped delivery goes back to the front of the queue

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on lock poisoning

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use todo_stats_core::event::SerializedEvent;
use todo_stats_core::event_bus::{Delivery, EventBus, EventBusError, EventStream, Settlement};
use tokio::sync::Notify;

#[derive(Debug)]
struct Group {
    topics: Vec<String>,
    queue: VecDeque<SerializedEvent>,
    notify: Arc<Notify>,
}

#[derive(Debug, Default)]
struct BusState {
    groups: HashMap<String, Group>,
    published: Vec<(String, SerializedEvent)>,
    publish_failure: Option<EventBusError>,
    redeliveries: usize,
    closed: bool,
}

/// In-memory [`EventBus`].
///
/// Subscribing without a group name (see [`with_group`](Self::with_group))
/// puts the subscriber in a group named after its topics.
///
/// # Example
///
/// ```
/// use futures::StreamExt;
/// use serde_json::json;
/// use todo_stats_core::event::SerializedEvent;
/// use todo_stats_core::event_bus::EventBus;
/// use todo_stats_testing::InMemoryEventBus;
///
/// # tokio_test::block_on(async {
/// let bus = InMemoryEventBus::new();
/// let mut stream = bus.subscribe(&["todo-events"]).await.unwrap();
///
/// let event = SerializedEvent::new("todo.created".into(), json!({}), None);
/// bus.publish("todo-events", &event).await.unwrap();
///
/// let delivery = stream.next().await.unwrap().unwrap();
/// assert_eq!(delivery.event, event);
/// delivery.ack();
/// # });
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventBus {
    state: Arc<Mutex<BusState>>,
    group: Option<String>,
}

impl InMemoryEventBus {
    /// Create a new empty bus
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle to the same bus whose subscriptions join consumer group `group`.
    #[must_use]
    pub fn with_group(&self, group: impl Into<String>) -> Self {
        Self {
            state: Arc::clone(&self.state),
            group: Some(group.into()),
        }
    }

    /// Make every publish fail with `failure` (`None` restores publishing).
    pub fn set_publish_failure(&self, failure: Option<EventBusError>) {
        self.state.lock().unwrap().publish_failure = failure;
    }

    /// Every event published so far, in publish order
    #[must_use]
    pub fn published(&self) -> Vec<SerializedEvent> {
        self.state
            .lock()
            .unwrap()
            .published
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Events published to `topic`, in publish order
    #[must_use]
    pub fn published_to(&self, topic: &str) -> Vec<SerializedEvent> {
        self.state
            .lock()
            .unwrap()
            .published
            .iter()
            .filter(|(published_topic, _)| published_topic == topic)
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Events waiting in consumer group `group`
    #[must_use]
    pub fn pending(&self, group: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .groups
            .get(group)
            .map_or(0, |group| group.queue.len())
    }

    /// Whether consumer group `group` has subscribed
    #[must_use]
    pub fn has_group(&self, group: &str) -> bool {
        self.state.lock().unwrap().groups.contains_key(group)
    }

    /// Number of deliveries handed back for redelivery
    #[must_use]
    pub fn redeliveries(&self) -> usize {
        self.state.lock().unwrap().redeliveries
    }

    /// Whether [`EventBus::close`] has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn group_name(&self, topics: &[&str]) -> String {
        self.group.clone().unwrap_or_else(|| {
            let mut sorted: Vec<&str> = topics.to_vec();
            sorted.sort_unstable();
            sorted.join(",")
        })
    }

    fn settle(
        state: &Arc<Mutex<BusState>>,
        group: &str,
        event: SerializedEvent,
    ) -> impl FnOnce(Settlement) + Send + 'static {
        let state = Arc::clone(state);
        let group = group.to_string();
        move |settlement| {
            if settlement == Settlement::Nack {
                let mut state = state.lock().unwrap();
                state.redeliveries += 1;
                if let Some(group) = state.groups.get_mut(&group) {
                    group.queue.push_front(event);
                    group.notify.notify_one();
                }
            }
        }
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return Err(EventBusError::Closed);
            }
            if let Some(failure) = &state.publish_failure {
                return Err(failure.clone());
            }

            for group in state.groups.values_mut() {
                if group.topics.contains(&topic) {
                    group.queue.push_back(event.clone());
                    group.notify.notify_one();
                }
            }
            state.published.push((topic, event));
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let group_name = self.group_name(topics);
        let topics: Vec<String> = topics.iter().map(ToString::to_string).collect();
        Box::pin(async move {
            let notify = {
                let mut state = self.state.lock().unwrap();
                if state.closed {
                    return Err(EventBusError::SubscriptionFailed {
                        topics,
                        reason: "event bus closed".to_string(),
                    });
                }
                let group = state.groups.entry(group_name.clone()).or_insert_with(|| Group {
                    topics: Vec::new(),
                    queue: VecDeque::new(),
                    notify: Arc::new(Notify::new()),
                });
                for topic in topics {
                    if !group.topics.contains(&topic) {
                        group.topics.push(topic);
                    }
                }
                Arc::clone(&group.notify)
            };

            let state = Arc::clone(&self.state);
            let stream = async_stream::stream! {
                let done: () = loop {
                    let notified = notify.notified();
                    let next = state
                        .lock()
                        .unwrap()
                        .groups
                        .get_mut(&group_name)
                        .and_then(|group| group.queue.pop_front());

                    match next {
                        Some(event) => {
                            let settle = InMemoryEventBus::settle(&state, &group_name, event.clone());
                            yield Ok(Delivery::new(event, settle));
                        }
                        None => notified.await,
                    }
                };
                done
            };

            Ok(Box::pin(stream) as EventStream)
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        Box::pin(async move {
            self.state.lock().unwrap().closed = true;
            Ok(())
        })
    }
}
