//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. Use them for
//! sensitive values like API tokens and signing keys: `SecretString`
//! implements `Debug` with redaction, so any struct that derives `Debug`
//! around one gets safe logging behavior for free, and the inner value is
//! zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::SecretString;
//! use secrecy::ExposeSecret;
//!
//! #[derive(Debug)]
//! struct BackendCredentials {
//!     base_url: String,
//!     api_token: SecretString,  // Debug shows "[REDACTED]"
//! }
//!
//! let creds = BackendCredentials {
//!     base_url: "https://suggestions.internal".to_string(),
//!     api_token: SecretString::from("tok-123"),
//! };
//!
//! // Safe: the token is redacted
//! println!("{creds:?}");
//!
//! // Reading the value requires an explicit expose_secret() call
//! let token: &str = creds.api_token.expose_secret();
//! # let _ = token;
//! ```
//!
//! With the `serde` feature enabled, secrets deserialize from JSON and
//! environment-sourced config, but intentionally do not serialize.

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn debug_is_redacted() {
        let secret = SecretString::from("tok-supersecret");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("tok-supersecret"));
    }

    #[test]
    fn expose_secret_returns_inner_value() {
        let secret = SecretString::from("tok-123");
        assert_eq!(secret.expose_secret(), "tok-123");
    }

    #[test]
    fn struct_with_secret_redacts_only_the_secret() {
        #[allow(dead_code)]
        #[derive(Debug)]
        struct BackendCredentials {
            base_url: String,
            api_token: SecretString,
        }

        let creds = BackendCredentials {
            base_url: "https://suggestions.internal".to_string(),
            api_token: SecretString::from("tok-456"),
        };

        let debug_str = format!("{creds:?}");

        assert!(debug_str.contains("suggestions.internal"));
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("tok-456"));
    }

    #[test]
    fn deserializes_from_json() {
        #[allow(dead_code)]
        #[derive(Debug, serde::Deserialize)]
        struct Credentials {
            api_token: SecretString,
        }

        let creds: Credentials =
            serde_json::from_str(r#"{"api_token": "tok-789"}"#).unwrap();

        assert_eq!(creds.api_token.expose_secret(), "tok-789");
        assert!(!format!("{creds:?}").contains("tok-789"));
    }
}
