//! # Todo Stats Runtime
//!
//! The moving parts between the HTTP layer and the infrastructure adapters.
//!
//! ## Core Components
//!
//! - **[`TodoService`]**: CRUD over the item store; emits an event after each
//!   committed mutation
//! - **[`EventPublisher`]**: ordered, non-blocking hand-off of events to the bus
//! - **[`StatsAggregator`]**: one atomic counter increment per event
//! - **[`EventConsumer`]**: subscribe, handle, ack, and reconnect loop driving
//!   the aggregator
//! - **[`StatsService`]**: reads the three counters
//!
//! ## Example
//!
//! ```ignore
//! let publisher = Arc::new(EventPublisher::new(bus, "todo-events", 1024));
//! let todos = TodoService::new(store, Arc::clone(&publisher));
//!
//! let todo = todos.create(json!({"title": "buy milk"})).await?;
//! todos.update(todo.id.as_str(), json!({"completed": true})).await?;
//!
//! publisher.close().await?;
//! ```

pub mod aggregator;
pub mod consumer;
pub mod metrics;
pub mod publisher;
pub mod retry;
pub mod shutdown;
pub mod stats;
pub mod todos;

pub use aggregator::StatsAggregator;
pub use consumer::{EventConsumer, EventHandler};
pub use publisher::EventPublisher;
pub use retry::RetryPolicy;
pub use shutdown::{Signal, wait_for_signal};
pub use stats::StatsService;
pub use todos::TodoService;
