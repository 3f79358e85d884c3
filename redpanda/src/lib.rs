//! Kafka-compatible event bus for the todo stats pipeline.
//!
//! [`RedpandaEventBus`] implements the [`EventBus`] trait from
//! `todo-stats-core` on top of rdkafka, so it works against Redpanda, Apache
//! Kafka, or any broker speaking the Kafka protocol.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  JSON envelope, key = event type  ┌──────────────┐
//! │  Todo API   │──────────────────────────────────▶│ todo-events  │
//! │ (producer)  │                                   │   (topic)    │
//! └─────────────┘                                   └──────┬───────┘
//!                                                          │
//!                            consumer group ───────────────┤
//!                                                          ▼
//!                                              ┌──────────────────────┐
//!                                              │ Stats Aggregator(s)  │
//!                                              │ ack ──▶ commit offset│
//!                                              └──────────────────────┘
//! ```
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - A message's offset is committed only after its [`Delivery`] is acked
//! - A nacked (or dropped) delivery stops the consumer task without
//!   committing, so the message is read again by the next subscription in
//!   the same consumer group
//! - Ordering is guaranteed within a partition; the message key is the event
//!   type, so events of one kind stay in order
//!
//! **Configuration options**:
//! - `consumer_group`: Explicit consumer group shared by all aggregator
//!   instances
//! - `buffer_size`: Deliveries buffered between the Kafka consumer and the
//!   subscriber (default: 1000)
//! - `auto_offset_reset`: Where a new group starts reading (default: "earliest")
//!
//! # Broker Outages
//!
//! [`RedpandaEventBus::check_connection`] fetches topic metadata, so a process
//! can refuse to start against an unreachable cluster. Once running, a publish
//! that times out while librdkafka reports every broker down is a
//! [`EventBusError::TransportError`], which the caller treats as fatal.
//!
//! # Example
//!
//! ```no_run
//! use todo_stats_redpanda::RedpandaEventBus;
//! use todo_stats_core::event_bus::EventBus;
//! use todo_stats_core::event::SerializedEvent;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("todo-stats-aggregator")
//!     .build()?;
//!
//! let mut stream = event_bus.subscribe(&["todo-events"]).await?;
//! while let Some(result) = stream.next().await {
//!     let delivery = result?;
//!     println!("Received: {}", delivery.event.event_type);
//!     delivery.ack();
//! }
//! # Ok(())
//! # }
//! ```

use rdkafka::client::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use todo_stats_core::event::SerializedEvent;
use todo_stats_core::event_bus::{Delivery, EventBus, EventBusError, EventStream, Settlement};
use tokio::sync::{mpsc, oneshot};

const DEFAULT_BUFFER_SIZE: usize = 1000;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Producer context recording cluster-wide outages reported by librdkafka.
///
/// `AllBrokersDown` reaches the client error callback only, never a delivery
/// report, so the flag carries it to [`EventBus::publish`].
struct OutageContext {
    brokers_down: Arc<AtomicBool>,
}

impl ClientContext for OutageContext {
    fn error(&self, error: KafkaError, reason: &str) {
        if matches!(
            error.rdkafka_error_code(),
            Some(RDKafkaErrorCode::AllBrokersDown | RDKafkaErrorCode::Fatal)
        ) {
            self.brokers_down.store(true, Ordering::Release);
        }
        tracing::warn!(error = %error, reason, "Kafka client error");
    }
}

/// Kafka-compatible [`EventBus`].
///
/// One producer is shared by all publishes. Each call to
/// [`subscribe`](EventBus::subscribe) creates its own consumer, owned by a
/// background task that forwards deliveries and commits acknowledged offsets.
///
/// # Configuration
///
/// - **Broker addresses**: Bootstrap servers (required)
/// - **Producer settings**: Acks, compression, timeout
/// - **Consumer settings**: Consumer group, buffer size, offset reset policy
pub struct RedpandaEventBus {
    producer: FutureProducer<OutageContext>,
    brokers_down: Arc<AtomicBool>,
    brokers: String,
    timeout: Duration,
    consumer_group: Option<String>,
    buffer_size: usize,
    auto_offset_reset: String,
    closed: Arc<AtomicBool>,
}

impl RedpandaEventBus {
    /// Create an event bus with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be
    /// created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Start configuring an event bus.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use todo_stats_redpanda::RedpandaEventBus;
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let event_bus = RedpandaEventBus::builder()
    ///     .brokers("localhost:9092")
    ///     .producer_acks("all")
    ///     .timeout(std::time::Duration::from_secs(5))
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// The configured brokers.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// The consumer group used by subscriptions on `topics`.
    ///
    /// Without an explicit group, one is derived from the sorted topic names
    /// so that every subscriber to the same topics shares a group.
    #[must_use]
    pub fn consumer_group_for(&self, topics: &[String]) -> String {
        if let Some(group) = &self.consumer_group {
            return group.clone();
        }
        let mut sorted = topics.to_vec();
        sorted.sort();
        format!("todo-stats-{}", sorted.join("-"))
    }

    /// Fetch metadata for `topic` to confirm a broker is reachable.
    ///
    /// Building the bus never contacts the cluster; call this before serving.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if no broker answers within
    /// the configured timeout.
    pub async fn check_connection(&self, topic: &str) -> Result<(), EventBusError> {
        let producer = self.producer.clone();
        let topic = topic.to_string();
        let timeout = self.timeout;

        let metadata = tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(Some(&topic), Timeout::After(timeout))
                .map(|metadata| metadata.brokers().len())
        })
        .await
        .map_err(|e| EventBusError::ConnectionFailed(format!("Metadata task failed: {e}")))?;

        let broker_count = metadata.map_err(|e| {
            EventBusError::ConnectionFailed(format!("Brokers '{}' unreachable: {e}", self.brokers))
        })?;
        tracing::info!(brokers = %self.brokers, broker_count, "Event bus reachable");
        Ok(())
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses.
    ///
    /// A leading `kafka://` scheme is stripped, so a connection URI and a
    /// plain `host:port` list are both accepted.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        let brokers = brokers.into();
        let brokers = brokers
            .strip_prefix("kafka://")
            .map_or_else(|| brokers.clone(), str::to_string);
        self.brokers = Some(brokers);
        self
    }

    /// Set the producer acknowledgment mode: "0", "1", or "all".
    ///
    /// Default: "all"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: "none", "gzip", "snappy", "lz4", "zstd".
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send and flush timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the consumer group ID for subscriptions.
    ///
    /// All aggregator instances configured with the same group share the
    /// topic's partitions, so each event is counted by one of them.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set how many deliveries may be buffered per subscription.
    ///
    /// A zero value is raised to one.
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Set where a consumer group with no committed offset starts reading:
    /// `"earliest"`, `"latest"`, or `"error"`.
    ///
    /// Default: "earliest", so events published before a group's first
    /// commit are still counted
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if:
    /// - Brokers not set
    /// - Cannot create producer
    /// - Invalid configuration
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let acks = self.producer_acks.as_deref().unwrap_or("all");
        let compression = self.compression.as_deref().unwrap_or("none");

        let brokers_down = Arc::new(AtomicBool::new(false));
        let context = OutageContext {
            brokers_down: Arc::clone(&brokers_down),
        };

        let producer: FutureProducer<OutageContext> = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", acks)
            .set("compression.type", compression)
            .create_with_context(context)
            .map_err(|e| EventBusError::ConnectionFailed(format!("Failed to create producer: {e}")))?;

        let buffer_size = self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let auto_offset_reset = self.auto_offset_reset.unwrap_or_else(|| "earliest".to_string());

        tracing::info!(
            brokers = %brokers,
            acks,
            compression,
            buffer_size,
            auto_offset_reset = %auto_offset_reset,
            "RedpandaEventBus created"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers_down,
            brokers,
            timeout,
            consumer_group: self.consumer_group,
            buffer_size,
            auto_offset_reset,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// Whether a Kafka error means the connection itself is unusable.
fn is_fatal_kafka_error(error: &KafkaError) -> bool {
    matches!(error, KafkaError::ClientCreation(_))
        || matches!(
            error.rdkafka_error_code(),
            Some(
                RDKafkaErrorCode::AllBrokersDown
                    | RDKafkaErrorCode::BrokerTransportFailure
                    | RDKafkaErrorCode::Authentication
                    | RDKafkaErrorCode::Fatal
            )
        )
}

/// Classify a failed send. A timeout is fatal once every broker is down.
fn publish_error(topic: String, error: &KafkaError, brokers_down: bool) -> EventBusError {
    let timed_out = matches!(error.rdkafka_error_code(), Some(RDKafkaErrorCode::MessageTimedOut));
    if is_fatal_kafka_error(error) || (brokers_down && timed_out) {
        EventBusError::TransportError(format!("Publish to '{topic}' failed: {error}"))
    } else {
        EventBusError::PublishFailed {
            topic,
            reason: error.to_string(),
        }
    }
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();

        Box::pin(async move {
            if self.closed.load(Ordering::Acquire) {
                return Err(EventBusError::Closed);
            }

            let payload = event.to_bytes().map_err(|e| EventBusError::PublishFailed {
                topic: topic.clone(),
                reason: e.to_string(),
            })?;

            // Events of one type land on one partition and stay ordered.
            let record = FutureRecord::to(&topic)
                .payload(&payload)
                .key(event.event_type.as_bytes());

            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    self.brokers_down.store(false, Ordering::Release);
                    tracing::debug!(
                        topic = %topic,
                        partition,
                        offset,
                        event_type = %event.event_type,
                        "Event published"
                    );
                    Ok(())
                },
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        event_type = %event.event_type,
                        error = %kafka_error,
                        "Failed to publish event"
                    );
                    Err(publish_error(
                        topic,
                        &kafka_error,
                        self.brokers_down.load(Ordering::Acquire),
                    ))
                },
            }
        })
    }

    #[allow(clippy::too_many_lines)] // Manual commit after acknowledgement
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();

        Box::pin(async move {
            if self.closed.load(Ordering::Acquire) {
                return Err(EventBusError::SubscriptionFailed {
                    topics,
                    reason: "event bus closed".to_string(),
                });
            }

            let consumer_group_id = self.consumer_group_for(&topics);

            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &self.brokers)
                .set("group.id", &consumer_group_id)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &self.auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                })?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to subscribe to topics: {e}"),
                })?;

            tracing::info!(
                topics = ?topics,
                consumer_group = %consumer_group_id,
                buffer_size = self.buffer_size,
                auto_offset_reset = %self.auto_offset_reset,
                "Subscribed to topics"
            );

            let (tx, mut rx) = mpsc::channel(self.buffer_size);

            tokio::spawn(async move {
                use futures::StreamExt;

                let mut stream = consumer.stream();

                loop {
                    let next = tokio::select! {
                        biased;
                        () = tx.closed() => break,
                        next = stream.next() => next,
                    };
                    let Some(msg_result) = next else { break };

                    let message = match msg_result {
                        Ok(message) => message,
                        Err(e) => {
                            let err = if is_fatal_kafka_error(&e) {
                                EventBusError::TransportError(format!("Failed to receive message: {e}"))
                            } else {
                                EventBusError::DeserializationFailed(format!(
                                    "Failed to receive message: {e}"
                                ))
                            };
                            if tx.send(Err(err)).await.is_err() {
                                break;
                            }
                            continue;
                        },
                    };

                    let decoded = message
                        .payload()
                        .ok_or_else(|| "message has no payload".to_string())
                        .and_then(|payload| SerializedEvent::from_bytes(payload).map_err(|e| e.to_string()));

                    let event = match decoded {
                        Ok(event) => event,
                        Err(reason) => {
                            // Undecodable messages are skipped for good.
                            if tx.send(Err(EventBusError::DeserializationFailed(reason))).await.is_err() {
                                break;
                            }
                            if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                                tracing::warn!(error = %e, "Failed to commit undecodable message");
                            }
                            continue;
                        },
                    };

                    tracing::trace!(
                        topic = message.topic(),
                        partition = message.partition(),
                        offset = message.offset(),
                        event_type = %event.event_type,
                        "Received event"
                    );

                    let (settled_tx, settled_rx) = oneshot::channel();
                    let delivery = Delivery::new(event, move |settlement| {
                        let _ = settled_tx.send(settlement);
                    });

                    if tx.send(Ok(delivery)).await.is_err() {
                        tracing::debug!("Subscriber dropped, exiting consumer task");
                        break;
                    }

                    match settled_rx.await {
                        Ok(Settlement::Ack) => {
                            if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                                tracing::warn!(
                                    topic = message.topic(),
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    error = %e,
                                    "Failed to commit offset (message may be redelivered)"
                                );
                            }
                        },
                        Ok(Settlement::Nack) | Err(_) => {
                            tracing::info!(
                                topic = message.topic(),
                                partition = message.partition(),
                                offset = message.offset(),
                                "Delivery not acknowledged, leaving offset uncommitted"
                            );
                            break;
                        },
                    }
                }

                tracing::debug!(consumer_group = %consumer_group_id, "Consumer task exiting");
            });

            let stream = async_stream::stream! {
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as EventStream)
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        Box::pin(async move {
            if self.closed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }

            let producer = self.producer.clone();
            let timeout = self.timeout;
            tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
                .await
                .map_err(|e| EventBusError::TransportError(format!("Flush task failed: {e}")))?
                .map_err(|e| EventBusError::TransportError(format!("Failed to flush producer: {e}")))?;

            tracing::info!(brokers = %self.brokers, "RedpandaEventBus closed");
            Ok(())
        })
    }
}
