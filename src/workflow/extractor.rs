//! Parameter extraction: schema-constrained attempts with a free-text fallback.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::WorkflowConfig;
use crate::error::WorkflowError;
use crate::llm::capabilities::{Capabilities, FreeTextGenerator, StructuredExtractor};
use crate::llm::json::extract_json_object;

use super::phase::{FieldMap, ParamSchema, PhaseDefinition};
use super::prompts;

/// Strings that mean "the model found nothing" (compared trimmed, lower-cased).
const EMPTY_MARKERS: &[&str] = &["none", "null", ""];

/// Maps free-form text onto a phase's field schema.
///
/// Only confident values come back: nulls, "none"-style strings, unknown
/// keys, and computed fields are all dropped.
pub struct ParameterExtractor {
    structured: Arc<dyn StructuredExtractor>,
    free_text: Arc<dyn FreeTextGenerator>,
    attempts: u32,
    debug_mode: bool,
}

impl ParameterExtractor {
    pub fn new(capabilities: &Capabilities, config: &WorkflowConfig) -> Self {
        Self {
            structured: capabilities.extractor.clone(),
            free_text: capabilities.free_text.clone(),
            attempts: config.parameter_extraction_retries.max(1),
            debug_mode: config.debug_mode,
        }
    }

    /// Extract fields for `phase` from `text`.
    ///
    /// Tries the structured capability up to the phase's `retry_count` (or the
    /// configured default) times, then the free-text fallback. Errors only when both strategies fail.
    pub async fn extract(
        &self,
        text: &str,
        phase: &PhaseDefinition,
    ) -> Result<FieldMap, WorkflowError> {
        let attempts = phase.retry_count.map_or(self.attempts, |n| n.max(1));
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self
                .structured
                .extract_structured(text, &phase.name, &phase.schema)
                .await
            {
                Ok(raw) => {
                    let fields = self.clean(raw.into_iter(), &phase.schema);
                    info!(
                        phase = %phase.name,
                        attempt,
                        extracted = fields.len(),
                        "Extracted parameters"
                    );
                    return Ok(fields);
                }
                Err(e) => {
                    warn!(phase = %phase.name, attempt, error = %e, "Parameter extraction attempt failed");
                    last_error = e.to_string();
                }
            }
        }

        info!(phase = %phase.name, "Trying fallback extraction");
        match self.fallback(text, phase).await {
            Ok(fields) => {
                info!(
                    phase = %phase.name,
                    extracted = fields.len(),
                    "Fallback extraction succeeded"
                );
                Ok(fields)
            }
            Err(fallback_error) => {
                warn!(phase = %phase.name, error = %fallback_error, "Fallback extraction failed");
                Err(WorkflowError::ParameterExtraction {
                    phase: phase.name.clone(),
                    attempts,
                    reason: format!("{last_error}; fallback: {fallback_error}"),
                })
            }
        }
    }

    /// Best-effort variant for opportunistic passes: failures become an empty map.
    pub async fn extract_or_empty(&self, text: &str, phase: &PhaseDefinition) -> FieldMap {
        match self.extract(text, phase).await {
            Ok(fields) => fields,
            Err(e) => {
                warn!(phase = %phase.name, error = %e, "Proceeding without extracted parameters");
                FieldMap::new()
            }
        }
    }

    async fn fallback(&self, text: &str, phase: &PhaseDefinition) -> Result<FieldMap, String> {
        let prompt = prompts::fallback_extraction_prompt(text, &phase.name, &phase.schema);
        let output = self
            .free_text
            .generate(&prompt)
            .await
            .map_err(|e| e.to_string())?;

        let json = extract_json_object(&output)
            .ok_or_else(|| "no JSON object in fallback output".to_string())?;
        let value: Value =
            serde_json::from_str(json).map_err(|e| format!("JSON parse error: {e}"))?;
        let Value::Object(object) = value else {
            return Err("fallback output is not a JSON object".into());
        };

        Ok(self.clean(object.into_iter(), &phase.schema))
    }

    /// Keep only confident values for user-supplied schema fields.
    fn clean(
        &self,
        raw: impl Iterator<Item = (String, Value)>,
        schema: &ParamSchema,
    ) -> FieldMap {
        let mut kept = FieldMap::new();
        let mut dropped = Vec::new();

        for (key, value) in raw {
            if !schema.is_user_field(&key) {
                dropped.push(key);
                continue;
            }
            match value {
                Value::Null => dropped.push(key),
                Value::String(s) => {
                    let trimmed = s.trim();
                    if EMPTY_MARKERS.contains(&trimmed.to_lowercase().as_str()) {
                        dropped.push(key);
                    } else {
                        kept.insert(key, Value::String(trimmed.to_string()));
                    }
                }
                other => {
                    kept.insert(key, other);
                }
            }
        }

        if !dropped.is_empty() {
            if self.debug_mode {
                info!(?dropped, "Filtered out extracted values");
            } else {
                debug!(?dropped, "Filtered out extracted values");
            }
        }
        kept
    }
}
