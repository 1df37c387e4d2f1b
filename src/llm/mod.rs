//! LLM integration.
//!
//! - [`LlmProvider`]: backend-agnostic chat completion.
//! - [`RigAdapter`]: any rig completion model behind that trait.
//! - [`capabilities`]: classify / extract / free-text traits the engine
//!   consumes, with provider-backed implementations.

pub mod capabilities;
pub mod json;
pub mod provider;
pub mod rig_adapter;

pub use capabilities::{
    Capabilities, FreeTextGenerator, IntentClassifier, LlmFreeText, LlmIntentClassifier,
    LlmStructuredExtractor, StructuredExtractor,
};
pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;
use std::time::Duration;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::{ConfigError, LlmError};

/// Default per-request timeout for provider calls.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    /// Environment variable holding this backend's API key.
    pub fn api_key_var(self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl std::str::FromStr for LlmBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::InvalidValue {
                key: "PHASE_FLOW_LLM_BACKEND".to_string(),
                message: format!("unknown backend '{other}' (expected anthropic or openai)"),
            }),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub request_timeout: Duration,
}

impl LlmConfig {
    /// Read `PHASE_FLOW_LLM_BACKEND` (default `anthropic`), the backend's API
    /// key (required) and `PHASE_FLOW_LLM_TIMEOUT_SECS`. The model comes from
    /// the workflow config.
    pub fn from_env(model: impl Into<String>) -> Result<Self, ConfigError> {
        let backend = match std::env::var("PHASE_FLOW_LLM_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => LlmBackend::Anthropic,
        };

        let key_var = backend.api_key_var();
        let api_key =
            std::env::var(key_var).map_err(|_| ConfigError::MissingEnvVar(key_var.to_string()))?;

        let timeout_secs: u64 = std::env::var("PHASE_FLOW_LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        Ok(Self {
            backend,
            api_key: secrecy::SecretString::from(api_key),
            model: model.into(),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
    }
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {e}"),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(
        model,
        &config.model,
        "anthropic",
        config.request_timeout,
    )))
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {e}"),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(
        model,
        &config.model,
        "openai",
        config.request_timeout,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: LlmBackend, model: &str) -> LlmConfig {
        LlmConfig {
            backend,
            api_key: secrecy::SecretString::from("test-key"),
            model: model.to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn create_provider_constructs_without_network() {
        // rig clients accept any key at construction; auth fails on first request.
        let provider = create_provider(&config(LlmBackend::Anthropic, "claude-sonnet-4-20250514")).unwrap();
        assert_eq!(provider.model_name(), "claude-sonnet-4-20250514");
    }

    #[test]
    fn create_openai_provider_constructs() {
        let provider = create_provider(&config(LlmBackend::OpenAi, "gpt-4o")).unwrap();
        assert_eq!(provider.model_name(), "gpt-4o");
    }

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("Anthropic".parse::<LlmBackend>().unwrap(), LlmBackend::Anthropic);
        assert_eq!(" openai ".parse::<LlmBackend>().unwrap(), LlmBackend::OpenAi);
        let err = "gemini".parse::<LlmBackend>().unwrap_err();
        assert!(err.to_string().contains("PHASE_FLOW_LLM_BACKEND"));
        assert_eq!(LlmBackend::OpenAi.api_key_var(), "OPENAI_API_KEY");
    }
}
