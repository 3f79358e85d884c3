//! Processes of the todo stats system.
//!
//! Three binaries share this crate:
//!
//! - `todo-api`: CRUD over `PostgreSQL`, publishing an event per mutation
//! - `stats-api`: serves the three counters from Redis
//! - `stats-aggregator`: consumes events and increments the counters
//!
//! Each binary follows the same steps: load its configuration ([`Config`], or
//! [`AggregatorConfig`] for the aggregator), initialise tracing, connect every
//! dependency ([`bootstrap`]), run until a [`lifecycle::Stop`], then close what
//! it owns and exit with the stop's code.

pub mod bootstrap;
pub mod config;
pub mod lifecycle;
pub mod telemetry;

pub use bootstrap::BootstrapError;
pub use config::{AggregatorConfig, Config};
pub use lifecycle::Stop;
