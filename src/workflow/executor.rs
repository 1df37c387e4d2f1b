//! Per-phase state machine: request missing fields, validate, execute.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::config::WorkflowConfig;
use crate::error::WorkflowError;

use super::extractor::ParameterExtractor;
use super::phase::{FieldMap, FieldSpec, PhaseDefinition, PhaseOutcome, PhaseResultStatus};
use super::prompts;
use super::state::{SessionState, WorkflowStatus};

/// Shown by the precondition when a failed state carries no message.
const GENERIC_FAILURE: &str = "❌ **Error**: Workflow failed";

pub struct PhaseExecutor {
    config: WorkflowConfig,
}

impl PhaseExecutor {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    /// Whether `value` counts as not provided.
    fn is_unset(&self, value: Option<&Value>) -> bool {
        match value {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty() || self.config.is_unset_sentinel(s),
            Some(_) => false,
        }
    }

    /// Required fields of `phase` that `params` does not provide, in schema order.
    pub fn missing_fields<'p>(&self, phase: &'p PhaseDefinition, params: &FieldMap) -> Vec<&'p FieldSpec> {
        phase
            .schema
            .required_fields()
            .filter(|f| self.is_unset(params.get(&f.name)))
            .collect()
    }

    pub fn is_complete(&self, phase: &PhaseDefinition, params: &FieldMap) -> bool {
        self.missing_fields(phase, params).is_empty()
    }

    /// Run one executor pass for `phase`. Never fails: every error ends up in `state`.
    pub async fn execute(
        &self,
        state: &mut SessionState,
        phase: &PhaseDefinition,
        extractor: &ParameterExtractor,
    ) {
        let name = phase.name.as_str();

        if state.status == WorkflowStatus::Failed {
            info!(phase = name, "Phase detected failed state from router");
            let message = state
                .error_message
                .clone()
                .unwrap_or_else(|| GENERIC_FAILURE.to_string());
            state.awaiting_input = false;
            state.push_assistant(message);
            return;
        }

        let mut params = state.phase_params(name);
        let mut missing = self.missing_fields(phase, &params);

        if !missing.is_empty() && !state.meta(name).request_sent {
            if let Some(latest) = state.latest_user_message().map(str::to_string) {
                let fields = extractor.extract_or_empty(&latest, phase).await;
                if !fields.is_empty() {
                    state.merge_params(name, fields);
                    params = state.phase_params(name);
                    missing = self.missing_fields(phase, &params);
                }
            }
        }

        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|f| f.name.as_str()).collect();
            info!(phase = name, missing = ?names, "Requesting missing parameters");

            let retry = state.meta(name).validation_failed;
            let message = prompts::parameter_request_message(&phase.display_name(), &missing, retry);

            state.meta_mut(name).request_sent = true;
            state.awaiting_input = true;
            state.status = WorkflowStatus::CollectingParams;
            state.current_phase = Some(name.to_string());
            state.push_assistant(message);
            return;
        }

        info!(phase = name, "All parameters available, validating");
        state.status = WorkflowStatus::Executing;

        let checked = std::panic::catch_unwind(AssertUnwindSafe(|| {
            phase
                .schema
                .check_shape(&params)
                .and_then(|()| phase.handler.validate(&params))
        }));
        let checked = match checked {
            Ok(checked) => checked,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(phase = name, error = %reason, "Parameter validation panicked");
                state.fail(prompts::phase_error_message(&phase.display_name(), &reason));
                return;
            }
        };

        let validated = match checked {
            Ok(validated) => validated,
            Err(e) => {
                warn!(phase = name, error = %e, "Parameter validation failed");
                let message = prompts::validation_error_message(&e.message, &phase.display_name());
                let meta = state.meta_mut(name);
                meta.validation_failed = true;
                meta.last_error = Some(e.message);
                state.awaiting_input = true;
                state.status = WorkflowStatus::CollectingParams;
                state.current_phase = Some(name.to_string());
                state.error_count += 1;
                state.push_assistant(message);
                return;
            }
        };

        let meta = state.meta_mut(name);
        meta.validation_failed = false;
        meta.last_error = None;

        match self.run_business_function(phase, validated).await {
            Ok(outcome) => self.apply_outcome(state, phase, outcome),
            Err(e) => {
                error!(phase = name, error = %e, "Phase execution failed");
                let detail = match e {
                    WorkflowError::PhaseExecution { reason, .. } => reason,
                    other => other.to_string(),
                };
                state.fail(prompts::phase_error_message(&phase.display_name(), &detail));
            }
        }
    }

    /// Run the handler under the phase timeout, converting errors and panics.
    async fn run_business_function(
        &self,
        phase: &PhaseDefinition,
        params: FieldMap,
    ) -> Result<PhaseOutcome, WorkflowError> {
        let timeout = Duration::from_secs(phase.timeout_seconds);
        let run = AssertUnwindSafe(phase.handler.execute(params)).catch_unwind();

        match tokio::time::timeout(timeout, run).await {
            Err(_) => Err(WorkflowError::PhaseTimeout {
                phase: phase.name.clone(),
                timeout,
            }),
            Ok(Err(panic)) => Err(WorkflowError::PhaseExecution {
                phase: phase.name.clone(),
                reason: panic_message(panic.as_ref()),
            }),
            Ok(Ok(Err(e))) => Err(WorkflowError::PhaseExecution {
                phase: phase.name.clone(),
                reason: format!("{e:#}"),
            }),
            Ok(Ok(Ok(outcome))) => Ok(outcome),
        }
    }

    fn apply_outcome(&self, state: &mut SessionState, phase: &PhaseDefinition, outcome: PhaseOutcome) {
        let name = phase.name.as_str();
        let asked = matches!(outcome.status, PhaseResultStatus::Incomplete) && outcome.message.is_some();
        let question_params = asked.then(|| state.phase_params(name));
        state.meta_mut(name).question_params = question_params;

        let message = outcome
            .message
            .clone()
            .unwrap_or_else(|| prompts::default_outcome_message(&outcome.status, &phase.display_name()));

        match &outcome.status {
            PhaseResultStatus::Completed | PhaseResultStatus::CompletedWithWarnings | PhaseResultStatus::Unknown(_) => {
                if let PhaseResultStatus::Unknown(tag) = &outcome.status {
                    warn!(phase = name, status = %tag, "Unknown phase status, treating as completed");
                } else {
                    info!(phase = name, status = %outcome.status, "Phase completed");
                }
                let record = json!({
                    "status": outcome.status.as_str(),
                    "message": outcome.message,
                    "data": outcome.data,
                });
                state.results.insert(name.to_string(), record);
                state.current_phase = None;
                state.awaiting_input = false;
                state.status = WorkflowStatus::Completed;
                state.push_assistant(message);
            }
            PhaseResultStatus::Incomplete => {
                info!(phase = name, "Phase incomplete, requesting more information");
                state.current_phase = Some(name.to_string());
                state.awaiting_input = true;
                state.status = WorkflowStatus::CollectingParams;
                state.push_assistant(message);
            }
            PhaseResultStatus::Failed => {
                error!(phase = name, "Phase reported failure");
                state.fail(message);
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
