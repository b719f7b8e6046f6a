//! Middleware for the room coordinator HTTP surface.

pub mod http_metrics;
pub mod identity;
