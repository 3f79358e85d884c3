//! Integration tests for [`RedpandaEventBus`] against a real Kafka instance.
//!
//! These tests cover:
//! - Publish/subscribe round-trip of the JSON envelope
//! - Commit after ack: a nacked delivery is read again on resubscribe
//! - Consumer groups sharing a topic
//! - Connection check against a running broker
//!
//! # Running These Tests
//!
//! They need Docker for testcontainers and take a while to start Kafka:
//! ```bash
//! cargo test -p todo-stats-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)] // Test code uses expect for clear failure messages
#![allow(clippy::panic)]

use futures::StreamExt;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};
use todo_stats_core::event::SerializedEvent;
use todo_stats_core::event_bus::{EventBus, EventStream};
use todo_stats_redpanda::RedpandaEventBus;

const WARMUP: &str = "warmup";

fn test_event(event_type: &str, n: u64) -> SerializedEvent {
    SerializedEvent::new(event_type.to_string(), json!({ "n": n }), None)
}

/// Start Kafka and wait until it accepts publishes.
async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    let brokers = format!("{host}:{port}");

    for attempt in 1..=60 {
        if let Ok(bus) = RedpandaEventBus::new(&brokers) {
            if bus.publish("warmup-topic", &test_event(WARMUP, 0)).await.is_ok() {
                tokio::time::sleep(Duration::from_millis(500)).await;
                return (kafka, brokers);
            }
        }
        if attempt < 60 {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
    panic!("Kafka failed to become ready");
}

/// Publish a warmup event so the topic exists before anyone subscribes.
async fn ensure_topic_exists(event_bus: &RedpandaEventBus, topic: &str) {
    for attempt in 1..=30 {
        if event_bus.publish(topic, &test_event(WARMUP, 0)).await.is_ok() {
            tokio::time::sleep(Duration::from_secs(3)).await;
            return;
        }
        assert!(attempt != 30, "Failed to create topic {topic}");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn bus(brokers: &str, group: &str) -> RedpandaEventBus {
    RedpandaEventBus::builder()
        .brokers(brokers)
        .consumer_group(group)
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create event bus")
}

/// Next non-warmup event type, acking everything received.
async fn next_event_type(stream: &mut EventStream) -> String {
    loop {
        let delivery = stream
            .next()
            .await
            .expect("stream ended")
            .expect("Failed to receive event");
        let event_type = delivery.event.event_type.clone();
        delivery.ack();
        if event_type != WARMUP {
            return event_type;
        }
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn publish_and_subscribe_round_trip() {
    let (_kafka, brokers) = start_kafka().await;
    let event_bus = bus(&brokers, "round-trip");
    ensure_topic_exists(&event_bus, "todo-events").await;

    let mut stream = event_bus
        .subscribe(&["todo-events"])
        .await
        .expect("Failed to subscribe");
    tokio::time::sleep(Duration::from_secs(2)).await;

    let created = SerializedEvent::new(
        "todo.created".to_string(),
        json!({"_id": "65a1f0c2e4b0a1b2c3d4e5f6", "title": "a"}),
        Some(json!({"event_id": "1"})),
    );
    event_bus
        .publish("todo-events", &created)
        .await
        .expect("Failed to publish");

    let received = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let delivery = stream.next().await.expect("stream ended").expect("receive failed");
            if delivery.event.event_type != WARMUP {
                let event = delivery.event.clone();
                delivery.ack();
                return event;
            }
            delivery.ack();
        }
    })
    .await
    .expect("Timeout waiting for event");

    assert_eq!(received, created);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn nacked_delivery_is_redelivered_after_resubscribe() {
    let (_kafka, brokers) = start_kafka().await;
    let event_bus = bus(&brokers, "redelivery");
    ensure_topic_exists(&event_bus, "redelivery-events").await;

    // Commit past the warmup so the group has an offset to resume from.
    let mut stream = event_bus
        .subscribe(&["redelivery-events"])
        .await
        .expect("Failed to subscribe");
    tokio::time::sleep(Duration::from_secs(2)).await;
    event_bus
        .publish("redelivery-events", &test_event("todo.deleted", 1))
        .await
        .expect("Failed to publish");

    let first = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let delivery = stream.next().await.expect("stream ended").expect("receive failed");
            if delivery.event.event_type == WARMUP {
                delivery.ack();
            } else {
                let event_type = delivery.event.event_type.clone();
                delivery.nack();
                return event_type;
            }
        }
    })
    .await
    .expect("Timeout waiting for event");
    assert_eq!(first, "todo.deleted");
    drop(stream);

    let mut stream = event_bus
        .subscribe(&["redelivery-events"])
        .await
        .expect("Failed to resubscribe");
    let again = tokio::time::timeout(Duration::from_secs(30), next_event_type(&mut stream))
        .await
        .expect("Timeout waiting for redelivery");

    assert_eq!(again, "todo.deleted");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn consumer_group_members_share_events() {
    let (_kafka, brokers) = start_kafka().await;
    let event_bus = bus(&brokers, "shared-group");
    ensure_topic_exists(&event_bus, "shared-events").await;

    let mut stream1 = event_bus
        .subscribe(&["shared-events"])
        .await
        .expect("Failed to subscribe consumer 1");
    let mut stream2 = event_bus
        .subscribe(&["shared-events"])
        .await
        .expect("Failed to subscribe consumer 2");
    tokio::time::sleep(Duration::from_secs(3)).await;

    for n in 0..10 {
        event_bus
            .publish("shared-events", &test_event(&format!("todo.created.{n}"), n))
            .await
            .expect("Failed to publish");
    }

    let mut received = HashSet::new();
    tokio::time::timeout(Duration::from_secs(15), async {
        while received.len() < 10 {
            tokio::select! {
                Some(Ok(delivery)) = stream1.next() => {
                    if delivery.event.event_type != WARMUP {
                        received.insert(delivery.event.event_type.clone());
                    }
                    delivery.ack();
                }
                Some(Ok(delivery)) = stream2.next() => {
                    if delivery.event.event_type != WARMUP {
                        received.insert(delivery.event.event_type.clone());
                    }
                    delivery.ack();
                }
            }
        }
    })
    .await
    .expect("Timeout waiting for events");

    assert_eq!(received.len(), 10);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn close_flushes_and_rejects_further_publishes() {
    let (_kafka, brokers) = start_kafka().await;
    let event_bus = bus(&brokers, "close");

    event_bus
        .publish("close-events", &test_event("todo.created", 1))
        .await
        .expect("Failed to publish");
    event_bus.close().await.expect("close should flush");

    assert!(
        event_bus
            .publish("close-events", &test_event("todo.created", 2))
            .await
            .is_err()
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn connection_check_succeeds_against_a_running_broker() {
    let (_kafka, brokers) = start_kafka().await;
    let event_bus = bus(&brokers, "connection-check");

    event_bus
        .check_connection("todo-events")
        .await
        .expect("broker should be reachable");
}
