//! # Todo Stats Core
//!
//! Domain types and infrastructure traits for the to-do service and its
//! event-driven stats pipeline.
//!
//! ## Data Flow
//!
//! ```text
//! client ─▶ Todo API ─▶ TodoStore (durable write)
//!                │
//!                └─ on success ─▶ EventBus ─▶ Stats Aggregator ─▶ CounterCache
//!
//! client ─▶ Stats API ─▶ CounterCache
//! ```
//!
//! ## Modules
//!
//! - [`todo`]: items, identifiers, and field helpers
//! - [`event`]: domain events and the JSON wire envelope
//! - [`event_bus`]: publish/subscribe with acknowledged deliveries
//! - [`store`]: the item store trait
//! - [`counter`]: counter keys, the stats read model, and the cache trait
//! - [`error`]: the service error taxonomy
//!
//! Adapters live in sibling crates (`todo-stats-postgres`,
//! `todo-stats-redpanda`, `todo-stats-redis`); in-memory doubles live in
//! `todo-stats-testing`.

pub mod counter;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod store;
pub mod todo;

pub use counter::{CacheError, CounterCache, CounterKey, Stats};
pub use error::TodoError;
pub use event::{Event, EventError, SerializedEvent, TodoEvent, TodoEventKind};
pub use event_bus::{Delivery, EventBus, EventBusError, EventStream, Settlement};
pub use store::{StoreError, TodoStore};
pub use todo::{Document, Todo, TodoId};
