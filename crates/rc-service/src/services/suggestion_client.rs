//! Generative-text service HTTP client.
//!
//! The coordinator asks an external suggestion service for one
//! conversation prompt after every fifth human message in a room. The
//! feature is optional: without a configured base URL no client is built
//! and the trigger never fires.
//!
//! # Security
//!
//! - Optional bearer token authenticates the coordinator to the service
//! - Timeouts prevent hanging connections
//! - Errors are logged server-side and never surface to room members

use crate::errors::RcError;
use crate::observability::metrics;
use common::secret::{ExposeSecret, SecretString};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, instrument, warn};

/// Default timeout for suggestion requests in seconds. Generation can
/// take a while; the caller runs detached so nothing user-facing waits.
const SUGGESTION_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Prompt sent to the suggestion service.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestionPrompt {
    /// Theme of the room the suggestion is for.
    pub theme: String,

    /// Recent human messages, oldest first, as conversation context.
    pub recent_messages: Vec<String>,
}

/// Response from the suggestion service.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedSuggestion {
    /// The generated suggestion text.
    pub suggestion: String,
}

/// Trait for suggestion generation (enables mocking).
#[async_trait::async_trait]
pub trait SuggestionClientTrait: Send + Sync {
    /// Generate one suggestion for the given prompt.
    async fn generate(&self, prompt: &SuggestionPrompt) -> Result<GeneratedSuggestion, RcError>;
}

/// HTTP client for the suggestion service.
#[derive(Clone)]
pub struct HttpSuggestionClient {
    /// HTTP client with configured timeouts.
    client: Client,

    /// Base URL of the suggestion service.
    base_url: String,

    /// Bearer token for the suggestion service, when it requires one.
    api_token: Option<SecretString>,
}

impl HttpSuggestionClient {
    /// Create a new suggestion client.
    ///
    /// # Errors
    ///
    /// Returns `RcError::Internal` if the HTTP client cannot be built.
    pub fn new(base_url: String, api_token: Option<SecretString>) -> Result<Self, RcError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(SUGGESTION_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                error!(target: "rc.services.suggestion", error = %e, "Failed to build HTTP client");
                RcError::Internal
            })?;

        Ok(Self {
            client,
            base_url,
            api_token,
        })
    }
}

#[async_trait::async_trait]
impl SuggestionClientTrait for HttpSuggestionClient {
    #[instrument(skip_all, name = "rc.services.generate_suggestion")]
    async fn generate(&self, prompt: &SuggestionPrompt) -> Result<GeneratedSuggestion, RcError> {
        let url = format!("{}/v1/suggestions", self.base_url);
        let start = Instant::now();

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(prompt);
        if let Some(token) = &self.api_token {
            request = request.header("Authorization", format!("Bearer {}", token.expose_secret()));
        }

        let response = request.send().await.map_err(|e| {
            metrics::record_suggestion_request("error", start.elapsed());
            warn!(target: "rc.services.suggestion", error = %e, "Suggestion request failed");
            RcError::Internal
        })?;

        let status = response.status();
        if !status.is_success() {
            metrics::record_suggestion_request("error", start.elapsed());
            warn!(
                target: "rc.services.suggestion",
                status = %status,
                "Suggestion service returned an error status"
            );
            return Err(RcError::Internal);
        }

        let generated: GeneratedSuggestion = response.json().await.map_err(|e| {
            metrics::record_suggestion_request("error", start.elapsed());
            error!(target: "rc.services.suggestion", error = %e, "Failed to parse suggestion response");
            RcError::Internal
        })?;

        metrics::record_suggestion_request("success", start.elapsed());

        Ok(generated)
    }
}

/// Mock suggestion client module for testing.
pub mod mock {

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock suggestion client for unit testing.
    pub struct MockSuggestionClient {
        /// Responses to return (cycles through them).
        responses: Vec<String>,
        /// Number of calls made.
        call_count: AtomicUsize,
        /// Whether to return errors.
        return_error: bool,
    }

    impl MockSuggestionClient {
        /// Create a mock that always returns the given suggestion.
        pub fn returning(suggestion: &str) -> Self {
            Self {
                responses: vec![suggestion.to_string()],
                call_count: AtomicUsize::new(0),
                return_error: false,
            }
        }

        /// Create a mock that returns custom responses in sequence.
        pub fn with_responses(responses: Vec<String>) -> Self {
            Self {
                responses,
                call_count: AtomicUsize::new(0),
                return_error: false,
            }
        }

        /// Create a mock that returns errors.
        pub fn failing() -> Self {
            Self {
                responses: vec![],
                call_count: AtomicUsize::new(0),
                return_error: true,
            }
        }

        /// Get the number of calls made.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl SuggestionClientTrait for MockSuggestionClient {
        async fn generate(
            &self,
            _prompt: &SuggestionPrompt,
        ) -> Result<GeneratedSuggestion, RcError> {
            let count = self.call_count.fetch_add(1, Ordering::SeqCst);

            if self.return_error {
                return Err(RcError::Internal);
            }

            // Cycle through responses
            let suggestion = self
                .responses
                .get(count % self.responses.len().max(1))
                .cloned()
                .unwrap_or_else(|| "Keep the conversation going".to_string());

            Ok(GeneratedSuggestion { suggestion })
        }
    }

    #[cfg(test)]
    #[allow(clippy::unwrap_used, clippy::expect_used)]
    mod tests {
        use super::*;

        fn prompt() -> SuggestionPrompt {
            SuggestionPrompt {
                theme: "retro".to_string(),
                recent_messages: vec!["hello".to_string()],
            }
        }

        #[tokio::test]
        async fn test_mock_returning() {
            let mock = MockSuggestionClient::returning("Try an icebreaker");
            let generated = mock.generate(&prompt()).await.unwrap();

            assert_eq!(generated.suggestion, "Try an icebreaker");
            assert_eq!(mock.call_count(), 1);
        }

        #[tokio::test]
        async fn test_mock_cycles_responses() {
            let mock = MockSuggestionClient::with_responses(vec![
                "first".to_string(),
                "second".to_string(),
            ]);

            assert_eq!(mock.generate(&prompt()).await.unwrap().suggestion, "first");
            assert_eq!(mock.generate(&prompt()).await.unwrap().suggestion, "second");
            assert_eq!(mock.generate(&prompt()).await.unwrap().suggestion, "first");
        }

        #[tokio::test]
        async fn test_mock_failing() {
            let mock = MockSuggestionClient::failing();
            let result = mock.generate(&prompt()).await;

            assert!(matches!(result, Err(RcError::Internal)));
        }
    }
}
