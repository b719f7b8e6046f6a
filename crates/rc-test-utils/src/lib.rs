//! # RC Test Utilities
//!
//! Shared test utilities for the Room Coordinator (RC) service.
//!
//! This crate provides:
//! - Server test harness (`TestRcServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rc_test_utils::*;
//! use uuid::Uuid;
//!
//! #[sqlx::test(migrations = "../../migrations")]
//! async fn test_example(pool: PgPool) -> Result<()> {
//!     let server = TestRcServer::spawn(pool).await?;
//!     let client = server.client_for(Uuid::new_v4());
//!
//!     let response = client
//!         .get(format!("{}/api/v1/rooms", server.url()))
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod server_harness;

// Re-export commonly used items
pub use server_harness::*;
