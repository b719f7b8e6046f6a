//! HTTP request handlers for the room coordinator.

pub mod health;
pub mod membership;
pub mod messages;
pub mod metrics;
pub mod roles;
pub mod rooms;
pub mod sessions;
pub mod subscribe;

pub use health::{health_check, readiness_check};
pub use membership::{heartbeat, join_room, leave_room, list_participants};
pub use messages::{list_messages, list_suggestions, send_message};
pub use metrics::metrics_handler;
pub use roles::{get_global_roles, get_room_permissions, update_global_roles};
pub use rooms::{create_room, get_room, list_rooms, regenerate_join_code};
pub use sessions::list_sessions;
pub use subscribe::subscribe;
