//! Room coordinator configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Default room capacity (active participants per room).
pub const DEFAULT_ROOM_CAPACITY: i64 = 5;

/// Default liveness threshold in seconds. A participant whose last
/// heartbeat is older than this is demoted by the next sweep.
pub const DEFAULT_LIVENESS_TIMEOUT_SECONDS: u64 = 60;

/// Default sweep period in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 30;

/// Default heartbeat period hint for clients, in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECONDS: u64 = 15;

/// Default join code length.
pub const DEFAULT_JOIN_CODE_LENGTH: usize = 10;

/// Minimum accepted join code length.
pub const MIN_JOIN_CODE_LENGTH: usize = 6;

/// Maximum accepted join code length.
pub const MAX_JOIN_CODE_LENGTH: usize = 32;

/// Default per-subscriber fanout buffer (events).
pub const DEFAULT_FANOUT_BUFFER: usize = 64;

/// Room coordinator configuration.
///
/// Loaded from environment variables with sensible defaults.
/// Database URL and the suggestion-service token are redacted in Debug
/// output to prevent credential leakage.
#[derive(Clone)]
pub struct RcConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Server bind address (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Active participants allowed per room. One policy value shared by
    /// all rooms.
    pub room_capacity: i64,

    /// Seconds without a heartbeat before a participant counts as stale.
    pub liveness_timeout_seconds: u64,

    /// Seconds between presence sweep passes. Must be shorter than the
    /// liveness threshold; worst-case demotion latency is the sum of
    /// the two.
    pub sweep_interval_seconds: u64,

    /// Heartbeat period clients are expected to use, in seconds.
    /// Must leave room for missed beats before the liveness threshold.
    pub heartbeat_interval_seconds: u64,

    /// Length of generated join codes.
    pub join_code_length: usize,

    /// Base URL of the suggestion-generation service. Absent disables
    /// suggestion generation entirely.
    pub suggestion_service_url: Option<String>,

    /// Bearer token for the suggestion-generation service.
    pub suggestion_api_token: Option<SecretString>,

    /// Per-subscriber buffered fanout events before lag kicks in.
    pub fanout_buffer: usize,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for RcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RcConfig")
            .field("database_url", &"[REDACTED]")
            .field("listen_addr", &self.listen_addr)
            .field("room_capacity", &self.room_capacity)
            .field("liveness_timeout_seconds", &self.liveness_timeout_seconds)
            .field("sweep_interval_seconds", &self.sweep_interval_seconds)
            .field(
                "heartbeat_interval_seconds",
                &self.heartbeat_interval_seconds,
            )
            .field("join_code_length", &self.join_code_length)
            .field("suggestion_service_url", &self.suggestion_service_url)
            .field(
                "suggestion_api_token",
                &self.suggestion_api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("fanout_buffer", &self.fanout_buffer)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid room capacity configuration: {0}")]
    InvalidRoomCapacity(String),

    #[error("Invalid presence timing configuration: {0}")]
    InvalidPresenceTiming(String),

    #[error("Invalid join code length configuration: {0}")]
    InvalidJoinCodeLength(String),

    #[error("Invalid fanout buffer configuration: {0}")]
    InvalidFanoutBuffer(String),
}

impl RcConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = vars
            .get("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
            .clone();

        let listen_addr = vars
            .get("RC_LISTEN_ADDR")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());

        // Parse room capacity with validation
        let room_capacity = if let Some(value_str) = vars.get("RC_ROOM_CAPACITY") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidRoomCapacity(format!(
                    "RC_ROOM_CAPACITY must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value < 1 {
                return Err(ConfigError::InvalidRoomCapacity(format!(
                    "RC_ROOM_CAPACITY must be at least 1, got {}",
                    value
                )));
            }

            value
        } else {
            DEFAULT_ROOM_CAPACITY
        };

        let liveness_timeout_seconds = parse_seconds(
            vars,
            "RC_LIVENESS_TIMEOUT_SECS",
            DEFAULT_LIVENESS_TIMEOUT_SECONDS,
        )?;

        let sweep_interval_seconds = parse_seconds(
            vars,
            "RC_SWEEP_INTERVAL_SECS",
            DEFAULT_SWEEP_INTERVAL_SECONDS,
        )?;

        let heartbeat_interval_seconds = parse_seconds(
            vars,
            "RC_HEARTBEAT_INTERVAL_SECS",
            DEFAULT_HEARTBEAT_INTERVAL_SECONDS,
        )?;

        // The sweep must run often enough that the staleness bound
        // (sweep period + liveness threshold) stays meaningful, and
        // clients must beat faster than the threshold evicts them.
        if sweep_interval_seconds >= liveness_timeout_seconds {
            return Err(ConfigError::InvalidPresenceTiming(format!(
                "RC_SWEEP_INTERVAL_SECS ({}) must be less than RC_LIVENESS_TIMEOUT_SECS ({})",
                sweep_interval_seconds, liveness_timeout_seconds
            )));
        }

        if heartbeat_interval_seconds >= liveness_timeout_seconds {
            return Err(ConfigError::InvalidPresenceTiming(format!(
                "RC_HEARTBEAT_INTERVAL_SECS ({}) must be less than RC_LIVENESS_TIMEOUT_SECS ({})",
                heartbeat_interval_seconds, liveness_timeout_seconds
            )));
        }

        // Parse join code length with validation
        let join_code_length = if let Some(value_str) = vars.get("RC_JOIN_CODE_LENGTH") {
            let value: usize = value_str.parse().map_err(|e| {
                ConfigError::InvalidJoinCodeLength(format!(
                    "RC_JOIN_CODE_LENGTH must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if !(MIN_JOIN_CODE_LENGTH..=MAX_JOIN_CODE_LENGTH).contains(&value) {
                return Err(ConfigError::InvalidJoinCodeLength(format!(
                    "RC_JOIN_CODE_LENGTH must be between {} and {}, got {}",
                    MIN_JOIN_CODE_LENGTH, MAX_JOIN_CODE_LENGTH, value
                )));
            }

            value
        } else {
            DEFAULT_JOIN_CODE_LENGTH
        };

        let suggestion_service_url = vars.get("RC_SUGGESTION_SERVICE_URL").cloned();

        let suggestion_api_token = vars
            .get("RC_SUGGESTION_API_TOKEN")
            .map(|s| SecretString::from(s.clone()));

        // Parse fanout buffer with validation
        let fanout_buffer = if let Some(value_str) = vars.get("RC_FANOUT_BUFFER") {
            let value: usize = value_str.parse().map_err(|e| {
                ConfigError::InvalidFanoutBuffer(format!(
                    "RC_FANOUT_BUFFER must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidFanoutBuffer(
                    "RC_FANOUT_BUFFER must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_FANOUT_BUFFER
        };

        Ok(RcConfig {
            database_url,
            listen_addr,
            room_capacity,
            liveness_timeout_seconds,
            sweep_interval_seconds,
            heartbeat_interval_seconds,
            join_code_length,
            suggestion_service_url,
            suggestion_api_token,
            fanout_buffer,
        })
    }
}

/// Parse a positive seconds value from `vars`, falling back to `default`.
fn parse_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidPresenceTiming(format!(
            "{} must be a valid positive integer, got '{}': {}",
            name, value_str, e
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidPresenceTiming(format!(
            "{} must be greater than 0",
            name
        )));
    }

    Ok(value)
}
