//! Behaviour of [`RedpandaEventBus`] when no broker is reachable.
//!
//! Nothing listens on port 1, so these run without Docker.

#![allow(clippy::expect_used)] // Test code uses expect for clear failure messages

use serde_json::json;
use std::time::Duration;
use todo_stats_core::event::SerializedEvent;
use todo_stats_core::event_bus::{EventBus, EventBusError};
use todo_stats_redpanda::RedpandaEventBus;

fn unreachable_bus() -> RedpandaEventBus {
    RedpandaEventBus::builder()
        .brokers("127.0.0.1:1")
        .timeout(Duration::from_secs(2))
        .build()
        .expect("Building the bus does not contact the broker")
}

#[tokio::test]
async fn connection_check_fails_without_a_broker() {
    let bus = unreachable_bus();

    let result = bus.check_connection("todo-events").await;

    assert!(
        matches!(result, Err(EventBusError::ConnectionFailed(_))),
        "got {result:?}"
    );
}

#[tokio::test]
async fn publish_without_a_broker_is_a_transport_error() {
    let bus = unreachable_bus();
    let event = SerializedEvent::new("todo.created".to_string(), json!({"_id": "x"}), None);

    let result = bus.publish("todo-events", &event).await;

    assert!(
        matches!(result, Err(EventBusError::TransportError(_))),
        "got {result:?}"
    );
    assert!(result.err().is_some_and(|e| e.is_fatal()));
}
