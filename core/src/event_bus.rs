//! Event bus abstraction between the write path and the stats aggregator.
//!
//! The write path publishes a [`SerializedEvent`] after each committed
//! mutation; aggregators subscribe and receive [`Delivery`] values that must be
//! acknowledged once processed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌────────────────┐
//! │  Todo API   │────▶│  Event Bus   │────▶│ Stats          │
//! │ (publisher) │     │ (todo-events)│     │ Aggregator(s)  │
//! └─────────────┘     └──────────────┘     └───────┬────────┘
//!                                                  │ INCR, then ack
//!                                                  ▼
//!                                          ┌────────────────┐
//!                                          │ Counter Cache  │
//!                                          └────────────────┘
//! ```
//!
//! # Key Principles
//!
//! - **At-least-once delivery**: a delivery that is not acknowledged is
//!   redelivered, so a counter may be incremented twice for one event
//! - **Acknowledge after processing**: subscribers ack only once the side
//!   effect has happened
//! - **Ordered per producer**: events from one publisher arrive in publish order
//!
//! # Topic Naming Convention
//!
//! Topics follow the pattern `{aggregate-type}-events`; all to-do events go to
//! `todo-events`.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//!
//! let mut stream = event_bus.subscribe(&["todo-events"]).await?;
//! while let Some(result) = stream.next().await {
//!     let delivery = result?;
//!     handle(&delivery.event).await?;
//!     delivery.ack();
//! }
//! ```

use crate::event::SerializedEvent;
use futures::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Failed to deserialize an event
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Network or transport error; the connection is unusable
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The bus has been closed
    #[error("Event bus closed")]
    Closed,
}

impl EventBusError {
    /// Whether the bus connection is unusable.
    ///
    /// A fatal error terminates the producing process; any other error only
    /// loses the event it concerns.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_) | Self::TransportError(_))
    }
}

/// Outcome reported back to the bus for one delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
    /// Processed; the bus may forget the event for this consumer group.
    Ack,
    /// Not processed; the bus must deliver the event again.
    Nack,
}

type Settle = Box<dyn FnOnce(Settlement) + Send>;

/// One event handed to a subscriber, plus the means to settle it.
///
/// A delivery dropped without [`ack`](Self::ack) counts as a
/// [`nack`](Self::nack), so an event can never be lost by a subscriber that
/// bails out early.
pub struct Delivery {
    /// The delivered event.
    pub event: SerializedEvent,
    settle: Option<Settle>,
}

impl Delivery {
    /// Create a delivery whose settlement is reported to `settle`.
    #[must_use]
    pub fn new(event: SerializedEvent, settle: impl FnOnce(Settlement) + Send + 'static) -> Self {
        Self {
            event,
            settle: Some(Box::new(settle)),
        }
    }

    /// Create a delivery that needs no settlement.
    #[must_use]
    pub const fn unacknowledged(event: SerializedEvent) -> Self {
        Self {
            event,
            settle: None,
        }
    }

    /// Acknowledge the delivery.
    pub fn ack(mut self) {
        self.settle_with(Settlement::Ack);
    }

    /// Hand the delivery back for redelivery.
    pub fn nack(mut self) {
        self.settle_with(Settlement::Nack);
    }

    fn settle_with(&mut self, settlement: Settlement) {
        if let Some(settle) = self.settle.take() {
            settle(settlement);
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        self.settle_with(Settlement::Nack);
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("event", &self.event)
            .field("settled", &self.settle.is_none())
            .finish()
    }
}

/// Stream of deliveries from a subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Delivery, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// # Delivery Semantics
///
/// - Each consumer group receives every event published after it subscribed
/// - Within a group, each event goes to one subscriber at a time
/// - A nacked (or dropped) delivery is delivered again, possibly to another
///   subscriber of the same group
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so it can be held as `Arc<dyn EventBus>` by the publisher and consumer.
pub trait EventBus: Send + Sync {
    /// Publish an event to a topic.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the event was not accepted,
    /// or a fatal error ([`EventBusError::is_fatal`]) if the connection is
    /// unusable.
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics and receive a stream of deliveries.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;

    /// Flush pending publishes and release the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if pending events could not be flushed.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}
