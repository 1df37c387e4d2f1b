//! The three "understand this text" capabilities the workflow engine consumes,
//! with implementations backed by an [`LlmProvider`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::WorkflowConfig;
use crate::error::LlmError;
use crate::llm::json::extract_json_object;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::workflow::phase::{FieldMap, ParamSchema, PhaseSummary};
use crate::workflow::prompts;
use crate::workflow::state::SupervisorDecision;

/// Max tokens for classification (small JSON object).
const CLASSIFY_MAX_TOKENS: u32 = 256;

/// Max tokens for extraction calls.
const EXTRACT_MAX_TOKENS: u32 = 1024;

/// Picks the phase that should handle the conversation.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(
        &self,
        messages: &[ChatMessage],
        directory: &[PhaseSummary],
    ) -> Result<SupervisorDecision, LlmError>;
}

/// Schema-constrained extraction: every key in the output belongs to the schema.
#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    async fn extract_structured(
        &self,
        text: &str,
        phase_name: &str,
        schema: &ParamSchema,
    ) -> Result<FieldMap, LlmError>;
}

/// Unconstrained text generation (extraction fallback).
#[async_trait]
pub trait FreeTextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// The capability set handed to the engine.
#[derive(Clone)]
pub struct Capabilities {
    pub classifier: Arc<dyn IntentClassifier>,
    pub extractor: Arc<dyn StructuredExtractor>,
    pub free_text: Arc<dyn FreeTextGenerator>,
}

impl Capabilities {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        extractor: Arc<dyn StructuredExtractor>,
        free_text: Arc<dyn FreeTextGenerator>,
    ) -> Self {
        Self {
            classifier,
            extractor,
            free_text,
        }
    }

    /// All three capabilities over one provider, with temperatures from `config`.
    pub fn from_provider(llm: Arc<dyn LlmProvider>, config: &WorkflowConfig) -> Self {
        Self {
            classifier: Arc::new(LlmIntentClassifier::new(
                llm.clone(),
                config.supervisor_temperature,
            )),
            extractor: Arc::new(LlmStructuredExtractor::new(
                llm.clone(),
                config.default_temperature,
            )),
            free_text: Arc::new(LlmFreeText::new(llm, config.default_temperature)),
        }
    }
}

// ── Intent classification ───────────────────────────────────────────

pub struct LlmIntentClassifier {
    llm: Arc<dyn LlmProvider>,
    temperature: f32,
}

impl LlmIntentClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>, temperature: f32) -> Self {
        Self { llm, temperature }
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(
        &self,
        messages: &[ChatMessage],
        directory: &[PhaseSummary],
    ) -> Result<SupervisorDecision, LlmError> {
        let mut request_messages = Vec::with_capacity(messages.len() + 1);
        request_messages.push(ChatMessage::system(prompts::classification_prompt(directory)));
        request_messages.extend(messages.iter().cloned());

        let request = CompletionRequest::new(request_messages)
            .with_max_tokens(CLASSIFY_MAX_TOKENS)
            .with_temperature(self.temperature);
        let response = self.llm.complete(request).await?;

        debug!(
            model = self.llm.model_name(),
            raw = %response.content,
            "Classifier response"
        );

        parse_decision(&response.content).map_err(|reason| LlmError::InvalidResponse {
            provider: self.llm.model_name().to_string(),
            reason,
        })
    }
}

#[derive(Debug, serde::Deserialize)]
struct DecisionResponse {
    next_phase: String,
    #[serde(default)]
    intent: String,
    #[serde(default)]
    confidence: f32,
}

/// Parse classifier output into a decision, clamping confidence to `[0, 1]`.
fn parse_decision(raw: &str) -> Result<SupervisorDecision, String> {
    let json = extract_json_object(raw).ok_or_else(|| "no JSON object in response".to_string())?;
    let response: DecisionResponse =
        serde_json::from_str(json).map_err(|e| format!("JSON parse error: {e}"))?;

    let next_phase = response.next_phase.trim().to_string();
    if next_phase.is_empty() {
        return Err("next_phase is empty".into());
    }

    let confidence = if response.confidence.is_finite() {
        response.confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };

    Ok(SupervisorDecision {
        next_phase,
        intent: response.intent,
        confidence,
    })
}

// ── Structured extraction ───────────────────────────────────────────

pub struct LlmStructuredExtractor {
    llm: Arc<dyn LlmProvider>,
    temperature: f32,
}

impl LlmStructuredExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>, temperature: f32) -> Self {
        Self { llm, temperature }
    }
}

#[async_trait]
impl StructuredExtractor for LlmStructuredExtractor {
    async fn extract_structured(
        &self,
        text: &str,
        phase_name: &str,
        schema: &ParamSchema,
    ) -> Result<FieldMap, LlmError> {
        let prompt = prompts::structured_extraction_prompt(text, phase_name, schema);
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_max_tokens(EXTRACT_MAX_TOKENS)
            .with_temperature(self.temperature);
        let response = self.llm.complete(request).await?;

        parse_structured(&response.content, schema).map_err(|reason| LlmError::InvalidResponse {
            provider: self.llm.model_name().to_string(),
            reason,
        })
    }
}

/// Strict parse: the output must be a bare JSON object whose keys all belong
/// to `schema`. Anything else is a schema violation.
fn parse_structured(raw: &str, schema: &ParamSchema) -> Result<FieldMap, String> {
    let value: Value = serde_json::from_str(raw.trim())
        .map_err(|e| format!("output is not valid JSON: {e}"))?;
    let Value::Object(object) = value else {
        return Err("output is not a JSON object".into());
    };

    if let Some(unknown) = object.keys().find(|k| !schema.contains(k)) {
        return Err(format!("unexpected key '{unknown}' outside the schema"));
    }

    Ok(object.into_iter().collect())
}

// ── Free text ───────────────────────────────────────────────────────

pub struct LlmFreeText {
    llm: Arc<dyn LlmProvider>,
    temperature: f32,
}

impl LlmFreeText {
    pub fn new(llm: Arc<dyn LlmProvider>, temperature: f32) -> Self {
        Self { llm, temperature }
    }
}

#[async_trait]
impl FreeTextGenerator for LlmFreeText {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_max_tokens(EXTRACT_MAX_TOKENS)
            .with_temperature(self.temperature);
        let response = self.llm.complete(request).await?;
        Ok(response.content)
    }
}
