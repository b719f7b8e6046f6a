//! Common types shared across Atrium components.

#![warn(clippy::pedantic)]

/// Module for API request and response types
pub mod api;

/// Module for change-notification event types
pub mod events;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for common data types
pub mod types;
