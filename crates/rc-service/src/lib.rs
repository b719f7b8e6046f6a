//! Room Coordinator (RC) Service Library
//!
//! This library provides the core functionality for the Atrium room
//! coordinator - a stateless HTTP API responsible for:
//!
//! - Room management (create, list, join codes)
//! - Bounded-capacity membership (join, leave, heartbeat)
//! - Presence sweeping of lapsed participants
//! - Role-derived permissions (global and per-room)
//! - Change notification fanout over WebSocket
//! - Theme suggestion generation via an external service
//!
//! # Architecture
//!
//! The RC follows the Handler -> Service -> Repository pattern:
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> repositories/*.rs
//! ```
//!
//! Membership mutations run in room-locked transactions: each join and
//! leave takes the room's row lock, recomputes occupancy from the exact
//! active count, and commits, so concurrent joins serialize per room and
//! the capacity limit holds without any in-place counter arithmetic.
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `fanout` - Broadcast registry for change notifications
//! - `handlers` - HTTP request handlers
//! - `middleware` - Identity extraction and HTTP metrics
//! - `models` - Data models
//! - `observability` - Prometheus metrics
//! - `repositories` - Database access
//! - `routes` - Axum router setup
//! - `services` - Role resolution and the suggestion client
//! - `tasks` - Background presence sweep

pub mod config;
pub mod errors;
pub mod fanout;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod tasks;
