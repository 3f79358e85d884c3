//! Fire-and-forget event publishing for the write path.
//!
//! [`EventPublisher::publish`] stamps the event and pushes it onto a bounded
//! queue without awaiting anything, so an HTTP handler can reply immediately.
//! A single worker task drains the queue into the [`EventBus`], which keeps
//! events in the order they were published.
//!
//! ```text
//! handler ──publish()──▶ [ bounded queue ] ──worker──▶ EventBus::publish
//!                                                        │
//!                                     fatal error ◀──────┘
//! ```
//!
//! - A full or closed queue drops the event with a warning.
//! - A non-fatal bus error drops the event with a warning; the failure is
//!   counted as `rejected`, apart from `transport` failures.
//! - A fatal bus error stops the worker and is reported through
//!   [`EventPublisher::fatal_error`]; the process is expected to exit.

use crate::metrics::{self, PublishFailure};
use std::sync::Arc;
use todo_stats_core::event::{Event, SerializedEvent, TodoEvent};
use todo_stats_core::event_bus::{EventBus, EventBusError};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default queue capacity.
pub const DEFAULT_BUFFER: usize = 1024;

/// Ordered, non-blocking publisher of [`TodoEvent`]s onto one topic.
pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
    sender: mpsc::Sender<SerializedEvent>,
    shutdown: watch::Sender<bool>,
    fatal: watch::Receiver<Option<EventBusError>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventPublisher {
    /// Start a publisher and its worker task.
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>, topic: impl Into<String>, buffer: usize) -> Self {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (fatal_tx, fatal) = watch::channel(None);

        let worker = tokio::spawn(run_worker(
            Arc::clone(&bus),
            topic.into(),
            receiver,
            shutdown_rx,
            fatal_tx,
        ));

        Self {
            bus,
            sender,
            shutdown,
            fatal,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue `event` for publishing. Never blocks and never fails the caller.
    pub fn publish(&self, event: TodoEvent) {
        let event_type = event.event_type();
        let serialized = match SerializedEvent::stamped(&event) {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!(event_type, error = %e, "Failed to serialize event, dropping it");
                metrics::record_publish_failure(event_type, PublishFailure::Enqueue);
                return;
            }
        };

        match self.sender.try_send(serialized) {
            Ok(()) => debug!(event_type, todo_id = %event.todo_id(), "Event queued"),
            Err(e) => {
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => "queue full",
                    mpsc::error::TrySendError::Closed(_) => "publisher closed",
                };
                warn!(event_type, todo_id = %event.todo_id(), reason, "Failed to queue event, dropping it");
                metrics::record_publish_failure(event_type, PublishFailure::Enqueue);
            }
        }
    }

    /// Resolve with the fatal bus error once one occurs.
    ///
    /// Resolves with `None` if the worker stops without a fatal error (after
    /// [`close`](Self::close)).
    pub async fn fatal_error(&self) -> Option<EventBusError> {
        let mut fatal = self.fatal.clone();
        fatal
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|error| error.clone())
    }

    /// Publish everything already queued, then close the bus connection.
    ///
    /// Events published after `close` are dropped.
    ///
    /// # Errors
    ///
    /// Returns the bus error if flushing or closing the connection fails.
    pub async fn close(&self) -> Result<(), EventBusError> {
        self.shutdown.send_replace(true);

        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                error!(error = %e, "Publisher worker panicked");
            }
        }

        self.bus.close().await?;
        info!("Event publisher closed");
        Ok(())
    }
}

async fn run_worker(
    bus: Arc<dyn EventBus>,
    topic: String,
    mut receiver: mpsc::Receiver<SerializedEvent>,
    mut shutdown: watch::Receiver<bool>,
    fatal: watch::Sender<Option<EventBusError>>,
) {
    loop {
        tokio::select! {
            biased;
            Some(event) = receiver.recv() => {
                if !send(bus.as_ref(), &topic, &event, &fatal).await {
                    return;
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    receiver.close();
    while let Some(event) = receiver.recv().await {
        if !send(bus.as_ref(), &topic, &event, &fatal).await {
            return;
        }
    }
    debug!(topic = %topic, "Publisher queue drained");
}

/// Publish one event. Returns `false` once the bus is unusable.
async fn send(
    bus: &dyn EventBus,
    topic: &str,
    event: &SerializedEvent,
    fatal: &watch::Sender<Option<EventBusError>>,
) -> bool {
    match bus.publish(topic, event).await {
        Ok(()) => {
            debug!(topic, event_type = %event.event_type, "Event published");
            metrics::record_published(&event.event_type);
            true
        }
        Err(e) if e.is_fatal() => {
            error!(topic, event_type = %event.event_type, error = %e, "Event bus unusable");
            metrics::record_publish_failure(&event.event_type, failure_reason(&e));
            fatal.send_replace(Some(e));
            false
        }
        Err(e) => {
            warn!(topic, event_type = %event.event_type, error = %e, "Failed to publish event");
            metrics::record_publish_failure(&event.event_type, failure_reason(&e));
            true
        }
    }
}

fn failure_reason(error: &EventBusError) -> PublishFailure {
    if error.is_fatal() {
        PublishFailure::Transport
    } else {
        PublishFailure::Rejected
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use todo_stats_core::event::TodoEventKind;
    use todo_stats_core::todo::TodoId;
    use todo_stats_testing::InMemoryEventBus;

    const TOPIC: &str = "todo-events";

    #[tokio::test]
    async fn events_reach_the_bus_in_publish_order() {
        let bus = InMemoryEventBus::new();
        let publisher = EventPublisher::new(Arc::new(bus.clone()), TOPIC, 16);
        let ids: Vec<_> = (0..5).map(|_| TodoId::generate()).collect();

        for id in &ids {
            publisher.publish(TodoEvent::Deleted(id.clone()));
        }
        publisher.close().await.unwrap();

        let published: Vec<_> = bus
            .published_to(TOPIC)
            .into_iter()
            .map(|event| event.payload["_id"].as_str().unwrap().to_string())
            .collect();
        let expected: Vec<_> = ids.iter().map(ToString::to_string).collect();
        assert_eq!(published, expected);
        assert!(bus.is_closed());
    }

    #[tokio::test]
    async fn published_events_are_stamped() {
        let bus = InMemoryEventBus::new();
        let publisher = EventPublisher::new(Arc::new(bus.clone()), TOPIC, 16);

        publisher.publish(TodoEvent::Completed(TodoId::generate()));
        publisher.close().await.unwrap();

        let event = bus.published().pop().unwrap();
        assert_eq!(event.kind(), Some(TodoEventKind::Completed));
        assert!(event.event_id().is_some());
    }

    #[tokio::test]
    async fn non_fatal_failures_drop_only_that_event() {
        let bus = InMemoryEventBus::new();
        let publisher = EventPublisher::new(Arc::new(bus.clone()), TOPIC, 16);

        bus.set_publish_failure(Some(EventBusError::PublishFailed {
            topic: TOPIC.to_string(),
            reason: "message too large".to_string(),
        }));
        publisher.publish(TodoEvent::Deleted(TodoId::generate()));
        tokio::time::sleep(Duration::from_millis(20)).await;

        bus.set_publish_failure(None);
        publisher.publish(TodoEvent::Deleted(TodoId::generate()));
        publisher.close().await.unwrap();

        assert_eq!(bus.published().len(), 1);
    }

    #[tokio::test]
    async fn fatal_failure_is_reported() {
        let bus = InMemoryEventBus::new();
        bus.set_publish_failure(Some(EventBusError::TransportError("broker down".into())));
        let publisher = EventPublisher::new(Arc::new(bus.clone()), TOPIC, 16);

        publisher.publish(TodoEvent::Deleted(TodoId::generate()));

        let fatal = tokio::time::timeout(Duration::from_secs(1), publisher.fatal_error())
            .await
            .unwrap();
        assert!(matches!(fatal, Some(EventBusError::TransportError(_))));
    }

    #[test]
    fn rejected_events_are_told_apart_from_transport_failures() {
        let rejected = EventBusError::PublishFailed {
            topic: TOPIC.to_string(),
            reason: "message too large".to_string(),
        };
        let transport = EventBusError::TransportError("all brokers down".to_string());

        assert_eq!(failure_reason(&rejected), PublishFailure::Rejected);
        assert_eq!(failure_reason(&transport), PublishFailure::Transport);
    }

    #[tokio::test]
    async fn publish_after_close_is_dropped() {
        let bus = InMemoryEventBus::new();
        let publisher = EventPublisher::new(Arc::new(bus.clone()), TOPIC, 16);
        publisher.close().await.unwrap();

        publisher.publish(TodoEvent::Deleted(TodoId::generate()));

        assert!(bus.published().is_empty());
        assert_eq!(publisher.fatal_error().await.map(|e| e.to_string()), None);
    }
}
