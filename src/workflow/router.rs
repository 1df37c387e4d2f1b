//! Intent routing: pick the phase for a turn and seed its parameters.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::WorkflowError;
use crate::llm::capabilities::IntentClassifier;

use super::extractor::ParameterExtractor;
use super::phase::PhaseRegistry;
use super::prompts::EMPTY_MESSAGE_ERROR;
use super::state::{SessionState, SupervisorDecision, WorkflowStatus};

/// Confidence assigned when the classifier names an unregistered phase.
const SUBSTITUTE_CONFIDENCE: f32 = 0.5;

/// Confidence assigned when classification itself failed.
const RECOVERY_CONFIDENCE: f32 = 0.1;

/// Decisions at or below this are logged as low-confidence. They still stand.
const LOW_CONFIDENCE: f32 = 0.3;

pub struct IntentRouter {
    classifier: Arc<dyn IntentClassifier>,
}

impl IntentRouter {
    pub fn new(classifier: Arc<dyn IntentClassifier>) -> Self {
        Self { classifier }
    }

    /// Route the latest user message.
    ///
    /// Returns the phase the executor should run, or `None` when the turn
    /// ended here (empty message). Always a registered phase name when `Some`.
    pub async fn route(
        &self,
        state: &mut SessionState,
        registry: &PhaseRegistry,
        extractor: &ParameterExtractor,
    ) -> Option<String> {
        let latest = state.latest_user_message().unwrap_or_default().to_string();

        if latest.trim().is_empty() {
            let err = WorkflowError::StateTransition(EMPTY_MESSAGE_ERROR.to_string());
            error!(thread_id = %state.thread_id, error = %err, "Empty or whitespace-only message provided");
            state.current_phase = None;
            state.supervisor = Some(SupervisorDecision {
                next_phase: "error".to_string(),
                intent: "critical_error".to_string(),
                confidence: 0.0,
            });
            state.fail(err.to_string());
            return None;
        }

        let history = state.chat_history();
        let mut decision = match self.classifier.classify(&history, &registry.directory()).await {
            Ok(decision) => decision,
            Err(e) => {
                error!(thread_id = %state.thread_id, error = %e, "Intent classification failed");
                let fallback = registry.first().name.clone();
                state.supervisor = Some(SupervisorDecision {
                    next_phase: fallback.clone(),
                    intent: "error_recovery".to_string(),
                    confidence: RECOVERY_CONFIDENCE,
                });
                state.current_phase = Some(fallback.clone());
                state.status = WorkflowStatus::Failed;
                state.awaiting_input = false;
                state.error_count += 1;
                state.error_message = Some(format!(
                    "❌ **Error**: Could not determine workflow intent: {e}"
                ));
                return Some(fallback);
            }
        };

        if !registry.contains(&decision.next_phase) {
            warn!(
                selected = %decision.next_phase,
                fallback = %registry.first().name,
                "Invalid phase selected, defaulting to first phase"
            );
            decision.next_phase = registry.first().name.clone();
            decision.confidence = SUBSTITUTE_CONFIDENCE;
        }

        if decision.confidence <= LOW_CONFIDENCE {
            info!(
                phase = %decision.next_phase,
                confidence = decision.confidence,
                "Low-confidence routing decision"
            );
        }

        info!(
            thread_id = %state.thread_id,
            phase = %decision.next_phase,
            intent = %decision.intent,
            confidence = decision.confidence,
            "Supervisor decision"
        );

        let phase_name = decision.next_phase.clone();
        state.supervisor = Some(decision);
        state.current_phase = Some(phase_name.clone());
        state.status = WorkflowStatus::CollectingParams;

        if let Some(phase) = registry.get(&phase_name) {
            let fields = extractor.extract_or_empty(&latest, phase).await;
            if !fields.is_empty() {
                let merged = state.merge_params(&phase_name, fields);
                info!(phase = %phase_name, merged, "Initial parameter extraction");
            }
        }

        Some(phase_name)
    }
}
