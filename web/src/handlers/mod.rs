//! HTTP request handlers.
//!
//! This module contains all HTTP handlers organized by domain.

pub mod health;
pub mod metrics;
pub mod stats;
pub mod todos;

pub use health::health_check;
