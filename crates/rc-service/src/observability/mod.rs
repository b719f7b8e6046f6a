//! Observability module for the room coordinator.
//!
//! Provides metrics definitions, middleware, and instrumentation helpers.

pub mod metrics;
