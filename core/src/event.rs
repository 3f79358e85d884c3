//! Domain events and their wire envelope.
//!
//! Every committed mutation of a to-do item produces one [`TodoEvent`]. Events
//! travel over the bus as a [`SerializedEvent`]: a JSON envelope holding the
//! event type name, a JSON payload, and optional metadata.
//!
//! # Wire Format
//!
//! ```json
//! {
//!   "event_type": "todo.completed",
//!   "payload": { "_id": "65a1f0c2e4b0a1b2c3d4e5f6" },
//!   "metadata": { "event_id": "…", "emitted_at": "2024-01-12T10:00:00Z" }
//! }
//! ```
//!
//! # Example
//!
//! ```
//! use todo_stats_core::event::{SerializedEvent, TodoEvent, TodoEventKind};
//! use todo_stats_core::todo::TodoId;
//!
//! let event = TodoEvent::Deleted(TodoId::generate());
//! let serialized = SerializedEvent::stamped(&event).unwrap();
//!
//! assert_eq!(serialized.event_type, "todo.deleted");
//! assert_eq!(serialized.kind(), Some(TodoEventKind::Deleted));
//! ```

use crate::counter::CounterKey;
use crate::todo::{ID_FIELD, Todo, TodoId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Error types for event operations.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize an event.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize an event.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),
}

/// Something that happened and can be put on the bus.
///
/// `event_type()` is the stable routing name; `payload()` is the JSON body
/// subscribers receive.
pub trait Event: Send + Sync + 'static {
    /// Stable event type name (e.g. `"todo.created"`).
    fn event_type(&self) -> &'static str;

    /// JSON payload carried by the event.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the payload cannot be
    /// rendered as JSON.
    fn payload(&self) -> Result<Value, EventError>;
}

/// Events emitted by the write path.
#[derive(Clone, Debug, PartialEq)]
pub enum TodoEvent {
    /// An item was stored. Carries the stored item.
    Created(Todo),
    /// An item's `completed` flag was set to `true`.
    Completed(TodoId),
    /// An item was removed.
    Deleted(TodoId),
}

impl TodoEvent {
    /// The kind of this event.
    #[must_use]
    pub const fn kind(&self) -> TodoEventKind {
        match self {
            Self::Created(_) => TodoEventKind::Created,
            Self::Completed(_) => TodoEventKind::Completed,
            Self::Deleted(_) => TodoEventKind::Deleted,
        }
    }

    /// Identifier of the item the event is about.
    #[must_use]
    pub const fn todo_id(&self) -> &TodoId {
        match self {
            Self::Created(todo) => &todo.id,
            Self::Completed(id) | Self::Deleted(id) => id,
        }
    }
}

impl Event for TodoEvent {
    fn event_type(&self) -> &'static str {
        self.kind().event_type()
    }

    fn payload(&self) -> Result<Value, EventError> {
        match self {
            Self::Created(todo) => serde_json::to_value(todo)
                .map_err(|e| EventError::SerializationError(e.to_string())),
            Self::Completed(id) | Self::Deleted(id) => Ok(json!({ ID_FIELD: id.as_str() })),
        }
    }
}

/// The three event kinds the stats pipeline counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TodoEventKind {
    /// `todo.created`
    Created,
    /// `todo.completed`
    Completed,
    /// `todo.deleted`
    Deleted,
}

impl TodoEventKind {
    /// All kinds.
    pub const ALL: [Self; 3] = [Self::Created, Self::Completed, Self::Deleted];

    /// Wire name of this kind.
    #[must_use]
    pub const fn event_type(self) -> &'static str {
        match self {
            Self::Created => "todo.created",
            Self::Completed => "todo.completed",
            Self::Deleted => "todo.deleted",
        }
    }

    /// Look up a kind by wire name. Unknown names yield `None`.
    #[must_use]
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.event_type() == event_type)
    }

    /// Counter incremented for this kind.
    #[must_use]
    pub const fn counter_key(self) -> CounterKey {
        match self {
            Self::Created => CounterKey::Created,
            Self::Completed => CounterKey::Completed,
            Self::Deleted => CounterKey::Deleted,
        }
    }
}

impl fmt::Display for TodoEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_type())
    }
}

/// An event in wire form.
///
/// This is the unit the [`EventBus`](crate::event_bus::EventBus) publishes and
/// delivers. Subscribers route on `event_type` without knowing the payload
/// shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedEvent {
    /// Event type name (e.g. `"todo.created"`).
    pub event_type: String,

    /// JSON payload.
    pub payload: Value,

    /// Optional metadata.
    ///
    /// Events stamped by [`SerializedEvent::stamped`] carry:
    /// - `event_id`: UUID v4 unique per emission
    /// - `emitted_at`: RFC 3339 timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl SerializedEvent {
    /// Create a new serialized event.
    #[must_use]
    pub const fn new(event_type: String, payload: Value, metadata: Option<Value>) -> Self {
        Self {
            event_type,
            payload,
            metadata,
        }
    }

    /// Serialize an [`Event`] with the given metadata.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the payload cannot be
    /// rendered.
    pub fn from_event<E: Event>(event: &E, metadata: Option<Value>) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            payload: event.payload()?,
            metadata,
        })
    }

    /// Serialize an [`Event`] with a fresh `event_id` and `emitted_at`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the payload cannot be
    /// rendered.
    pub fn stamped<E: Event>(event: &E) -> Result<Self, EventError> {
        let metadata = json!({
            "event_id": Uuid::new_v4().to_string(),
            "emitted_at": Utc::now().to_rfc3339(),
        });
        Self::from_event(event, Some(metadata))
    }

    /// The counted kind of this event, if it is one.
    #[must_use]
    pub fn kind(&self) -> Option<TodoEventKind> {
        TodoEventKind::from_event_type(&self.event_type)
    }

    /// The `event_id` metadata entry, if present.
    #[must_use]
    pub fn event_id(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.get("event_id"))
            .and_then(Value::as_str)
    }

    /// Encode the envelope as JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Decode an envelope from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DeserializationError`] if the bytes are not a
    /// valid envelope.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerializedEvent {{ type: {} }}", self.event_type)
    }
}
