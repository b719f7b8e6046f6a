//! Service layer for the room coordinator.
//!
//! # Components
//!
//! - `roles` - role resolution and permission derivation
//! - `suggestion_client` - HTTP client for the generative-text service

pub mod roles;
pub mod suggestion_client;

pub use roles::{derive_permissions, RoleResolution, RolesService, RoomPermissions};
pub use suggestion_client::mock::MockSuggestionClient;
pub use suggestion_client::{
    GeneratedSuggestion, HttpSuggestionClient, SuggestionClientTrait, SuggestionPrompt,
};
