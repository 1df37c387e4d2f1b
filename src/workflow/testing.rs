//! Deterministic capability fakes and phase handlers for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::{LlmError, ValidationError};
use crate::llm::capabilities::{Capabilities, FreeTextGenerator, IntentClassifier, StructuredExtractor};
use crate::llm::ChatMessage;

use super::phase::{
    FieldMap, FieldSpec, ParamSchema, PhaseDefinition, PhaseHandler, PhaseOutcome, PhaseRegistry,
    PhaseSummary,
};
use super::state::SupervisorDecision;

fn fake_error(reason: &str) -> LlmError {
    LlmError::RequestFailed {
        provider: "fake".into(),
        reason: reason.into(),
    }
}

/// Always returns the same decision (or error).
pub struct ScriptedClassifier {
    decision: Option<SupervisorDecision>,
    pub calls: AtomicU32,
}

impl ScriptedClassifier {
    pub fn routes_to(phase: &str, confidence: f32) -> Arc<Self> {
        Arc::new(Self {
            decision: Some(SupervisorDecision {
                next_phase: phase.to_string(),
                intent: format!("run {phase}"),
                confidence,
            }),
            calls: AtomicU32::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            decision: None,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl IntentClassifier for ScriptedClassifier {
    async fn classify(
        &self,
        _messages: &[ChatMessage],
        _directory: &[PhaseSummary],
    ) -> Result<SupervisorDecision, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.decision.clone().ok_or_else(|| fake_error("classifier offline"))
    }
}

/// Extracts `(token, field, value)` matches: when `token` appears in the
/// text (case-insensitive) and `field` is in the schema, `field = value`.
pub struct TableExtractor {
    table: Vec<(String, String, Value)>,
    fail: bool,
    pub calls: AtomicU32,
}

impl TableExtractor {
    pub fn new(table: &[(&str, &str, Value)]) -> Arc<Self> {
        Arc::new(Self {
            table: table
                .iter()
                .map(|(t, f, v)| (t.to_lowercase(), f.to_string(), v.clone()))
                .collect(),
            fail: false,
            calls: AtomicU32::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            table: Vec::new(),
            fail: true,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl StructuredExtractor for TableExtractor {
    async fn extract_structured(
        &self,
        text: &str,
        _phase_name: &str,
        schema: &ParamSchema,
    ) -> Result<FieldMap, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(fake_error("extractor offline"));
        }
        let lowered = text.to_lowercase();
        Ok(self
            .table
            .iter()
            .filter(|(token, field, _)| lowered.contains(token.as_str()) && schema.contains(field))
            .map(|(_, field, value)| (field.clone(), value.clone()))
            .collect())
    }
}

/// Free-text capability that is always down.
#[derive(Default)]
pub struct OfflineText {
    pub calls: AtomicU32,
}

#[async_trait]
impl FreeTextGenerator for OfflineText {
    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(fake_error("free text offline"))
    }
}

pub fn capabilities(
    classifier: Arc<ScriptedClassifier>,
    extractor: Arc<TableExtractor>,
) -> Capabilities {
    Capabilities::new(classifier, extractor, Arc::new(OfflineText::default()))
}

// ── Handlers ────────────────────────────────────────────────────────

/// Returns a fixed outcome and counts runs.
pub struct FixedOutcome {
    outcome: PhaseOutcome,
    pub runs: AtomicU32,
}

impl FixedOutcome {
    pub fn new(outcome: PhaseOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            runs: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl PhaseHandler for FixedOutcome {
    async fn execute(&self, _params: FieldMap) -> anyhow::Result<PhaseOutcome> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(self.outcome.clone())
    }
}

/// Rejects every field map with the given message.
pub struct Rejecting(pub String);

#[async_trait]
impl PhaseHandler for Rejecting {
    fn validate(&self, _params: &FieldMap) -> Result<FieldMap, ValidationError> {
        Err(ValidationError::new(self.0.clone()))
    }

    async fn execute(&self, _params: FieldMap) -> anyhow::Result<PhaseOutcome> {
        anyhow::bail!("execute must not run after failed validation")
    }
}

pub struct Panicking;

#[async_trait]
impl PhaseHandler for Panicking {
    async fn execute(&self, _params: FieldMap) -> anyhow::Result<PhaseOutcome> {
        panic!("ledger corrupted")
    }
}

/// Panics while validating.
pub struct PanickingValidator;

#[async_trait]
impl PhaseHandler for PanickingValidator {
    fn validate(&self, _params: &FieldMap) -> Result<FieldMap, ValidationError> {
        panic!("amount overflowed")
    }

    async fn execute(&self, _params: FieldMap) -> anyhow::Result<PhaseOutcome> {
        anyhow::bail!("execute must not run after a validation panic")
    }
}

pub struct Sleeping(pub Duration);

#[async_trait]
impl PhaseHandler for Sleeping {
    async fn execute(&self, _params: FieldMap) -> anyhow::Result<PhaseOutcome> {
        tokio::time::sleep(self.0).await;
        Ok(PhaseOutcome::completed(json!({})))
    }
}

pub struct Erroring;

#[async_trait]
impl PhaseHandler for Erroring {
    async fn execute(&self, _params: FieldMap) -> anyhow::Result<PhaseOutcome> {
        anyhow::bail!("upstream service unavailable")
    }
}

/// Two-field report phase (`user_name`, `report_type`) with `handler`.
pub fn report_phase(handler: Arc<dyn PhaseHandler>) -> PhaseDefinition {
    PhaseDefinition::new(
        "generate_report",
        "Generate user reports",
        ParamSchema::new(vec![
            FieldSpec::new("user_name", "The user's name").with_examples(["Alice", "John", "Sarah"]),
            FieldSpec::new("report_type", "Report type").with_examples(["monthly", "quarterly"]),
        ]),
        handler,
    )
}

pub fn data_phase() -> PhaseDefinition {
    PhaseDefinition::new(
        "process_data",
        "Analyze data",
        ParamSchema::new(vec![FieldSpec::new("data_source", "Source")]),
        FixedOutcome::new(PhaseOutcome::completed(json!({"ok": true}))),
    )
}

pub fn registry(phases: Vec<PhaseDefinition>) -> PhaseRegistry {
    PhaseRegistry::new(phases).unwrap()
}

/// Token table covering the report scenarios.
pub fn report_table() -> Vec<(&'static str, &'static str, Value)> {
    vec![
        ("alice", "user_name", json!("Alice")),
        ("bob", "user_name", json!("Bob")),
        ("monthly", "report_type", json!("monthly")),
        ("quarterly", "report_type", json!("quarterly")),
        ("hourly", "report_type", json!("hourly")),
    ]
}
