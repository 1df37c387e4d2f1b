//! Error types for phase-flow.

use std::time::Duration;

/// Errors returned by the engine's entry points.
///
/// Only the session store can fail a turn; every other failure is recorded
/// in the session state instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Session storage errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider and capability errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },
}

/// A phase's field map failed schema or business-rule validation.
///
/// `field` names the offending field when the rule is field-local. The
/// message is shown to the user verbatim inside the remediation prompt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub field: Option<String>,
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    pub fn for_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }
}

/// Errors raised inside the parameter-collection state machine.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Failed to extract parameters for {phase} after {attempts} attempts and fallback: {reason}")]
    ParameterExtraction {
        phase: String,
        attempts: u32,
        reason: String,
    },

    #[error("{0}")]
    StateTransition(String),

    #[error("Phase {phase} failed: {reason}")]
    PhaseExecution { phase: String, reason: String },

    #[error("Phase {phase} timed out after {timeout:?}")]
    PhaseTimeout { phase: String, timeout: Duration },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
