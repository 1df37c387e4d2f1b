//! Turn orchestration: router → executor, session lifecycle, auto-continuation.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::WorkflowConfig;
use crate::error::Result;
use crate::llm::capabilities::Capabilities;
use crate::store::SessionStore;

use super::executor::PhaseExecutor;
use super::extractor::ParameterExtractor;
use super::phase::PhaseRegistry;
use super::prompts::CONTINUE_MESSAGE;
use super::router::IntentRouter;
use super::state::{SessionState, WorkflowStatus};

/// The conversational parameter-collection engine.
///
/// `Send + Sync`; share via `Arc`. Distinct thread ids are independent, but
/// calls for the same thread id must be serialized by the caller.
pub struct WorkflowEngine {
    registry: PhaseRegistry,
    store: Arc<dyn SessionStore>,
    router: IntentRouter,
    extractor: ParameterExtractor,
    executor: PhaseExecutor,
    config: WorkflowConfig,
}

impl WorkflowEngine {
    pub fn new(
        registry: PhaseRegistry,
        capabilities: Capabilities,
        store: Arc<dyn SessionStore>,
        config: WorkflowConfig,
    ) -> Self {
        info!(
            phases = ?registry.names(),
            auto_continue = config.enable_auto_continuation,
            max_iterations = config.max_iterations,
            "Workflow engine initialized"
        );
        Self {
            router: IntentRouter::new(capabilities.classifier.clone()),
            extractor: ParameterExtractor::new(&capabilities, &config),
            executor: PhaseExecutor::new(config.clone()),
            registry,
            store,
            config,
        }
    }

    pub fn registry(&self) -> &PhaseRegistry {
        &self.registry
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Load the persisted state for a thread.
    pub async fn get_state(&self, thread_id: &str) -> Result<Option<SessionState>> {
        Ok(self.store.get(thread_id).await?)
    }

    /// Start a workflow from a new request. Always begins from fresh state.
    pub async fn run_workflow(&self, message: &str, thread_id: &str) -> Result<SessionState> {
        info!(thread_id, message, "Starting workflow");

        let mut state = SessionState::new(thread_id);
        state.push_user(message);

        let routed = self
            .router
            .route(&mut state, &self.registry, &self.extractor)
            .await;
        if let Some(phase) = routed.as_deref().and_then(|name| self.registry.get(name)) {
            self.executor
                .execute(&mut state, phase, &self.extractor)
                .await;
        }

        if self.config.enable_auto_continuation {
            self.auto_continue(&mut state).await;
        }

        self.persist(&mut state).await?;
        Ok(state)
    }

    /// Feed a follow-up message to the thread's active phase.
    ///
    /// Degrades to [`run_workflow`](Self::run_workflow) when the thread is
    /// unknown, has no active phase, or ended in failure.
    pub async fn add_user_input(&self, message: &str, thread_id: &str) -> Result<SessionState> {
        info!(thread_id, message, "Adding user input");

        let Some(mut state) = self.store.get(thread_id).await? else {
            warn!(thread_id, "No existing state found, starting fresh workflow");
            return self.run_workflow(message, thread_id).await;
        };

        if state.status == WorkflowStatus::Failed {
            warn!(thread_id, "Thread ended in failure, starting fresh workflow");
            return self.run_workflow(message, thread_id).await;
        }

        let Some(phase) = state
            .current_phase
            .as_deref()
            .and_then(|name| self.registry.get(name))
        else {
            warn!(thread_id, "No current phase in state, starting fresh workflow");
            return self.run_workflow(message, thread_id).await;
        };

        let fields = self.extractor.extract_or_empty(message, phase).await;
        let merged = state.merge_params(&phase.name, fields);
        debug!(phase = %phase.name, merged, "Merged follow-up parameters");

        state.meta_mut(&phase.name).request_sent = false;
        state.push_user(message);
        state.awaiting_input = false;
        state.iteration_count += 1;

        self.executor
            .execute(&mut state, phase, &self.extractor)
            .await;

        self.persist(&mut state).await?;
        Ok(state)
    }

    /// Re-run the executor while the active phase has every field but the
    /// turn still waits on the user, up to `max_iterations` passes. Stops
    /// when nothing can change without new input: rejected values, or a
    /// question the phase already asked about the current params.
    async fn auto_continue(&self, state: &mut SessionState) {
        let mut passes = 0;

        while state.awaiting_input
            && state.results.is_empty()
            && passes < self.config.max_iterations
        {
            let Some(phase) = state
                .current_phase
                .as_deref()
                .and_then(|name| self.registry.get(name))
            else {
                break;
            };

            // Rejected values are unchanged until the user answers.
            if state.meta(&phase.name).validation_failed {
                break;
            }

            let params = state.phase_params(&phase.name);
            if state.meta(&phase.name).question_params.as_ref() == Some(&params) {
                debug!(phase = %phase.name, "Phase is waiting on an answer to its question");
                break;
            }

            let missing = self.executor.missing_fields(phase, &params);
            if !missing.is_empty() {
                let names: Vec<&str> = missing.iter().map(|f| f.name.as_str()).collect();
                debug!(phase = %phase.name, missing = ?names, "Still missing parameters");
                break;
            }

            passes += 1;
            info!(phase = %phase.name, iteration = passes, "Auto-continuation");
            state.push_user(CONTINUE_MESSAGE);
            state.iteration_count += 1;
            self.executor.execute(state, phase, &self.extractor).await;
        }
    }

    async fn persist(&self, state: &mut SessionState) -> Result<()> {
        state.touch();
        self.store.put(&state.thread_id, state).await?;
        info!(
            thread_id = %state.thread_id,
            status = %state.status,
            awaiting_input = state.awaiting_input,
            "Turn complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemorySessionStore;
    use crate::workflow::phase::{PhaseOutcome, PhaseRegistry, PhaseResultStatus};
    use crate::workflow::testing::*;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn engine_with(
        registry: PhaseRegistry,
        classifier: Arc<ScriptedClassifier>,
        table: Arc<TableExtractor>,
        config: WorkflowConfig,
    ) -> (WorkflowEngine, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemorySessionStore::new());
        let engine = WorkflowEngine::new(
            registry,
            capabilities(classifier, table),
            store.clone(),
            config,
        );
        (engine, store)
    }

    fn report_engine(handler: Arc<dyn crate::workflow::PhaseHandler>) -> (WorkflowEngine, Arc<InMemorySessionStore>) {
        engine_with(
            registry(vec![report_phase(handler), data_phase()]),
            ScriptedClassifier::routes_to("generate_report", 0.9),
            TableExtractor::new(&report_table()),
            WorkflowConfig::default(),
        )
    }

    #[tokio::test]
    async fn run_workflow_persists_fresh_state() {
        let (engine, store) = report_engine(FixedOutcome::new(PhaseOutcome::completed(json!({}))));

        let first = engine.run_workflow("Generate a report", "t-1").await.unwrap();
        assert_eq!(first.status, WorkflowStatus::CollectingParams);

        let second = engine.run_workflow("Generate a report", "t-1").await.unwrap();
        assert_eq!(second.messages.len(), 2);
        assert_eq!(second.error_count, 0);
        assert_eq!(store.get("t-1").await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn follow_up_only_extracts_for_current_phase() {
        let table = TableExtractor::new(&report_table());
        let (engine, _) = engine_with(
            registry(vec![
                report_phase(FixedOutcome::new(PhaseOutcome::completed(json!({})))),
                data_phase(),
            ]),
            ScriptedClassifier::routes_to("generate_report", 0.9),
            table.clone(),
            WorkflowConfig::default(),
        );

        let state = engine.run_workflow("Generate a report", "t-1").await.unwrap();
        assert!(state.awaiting_input);
        let calls_before = table.calls.load(Ordering::SeqCst);

        let state = engine.add_user_input("Bob, quarterly", "t-1").await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(state.iteration_count, 1);
        // One extraction for the follow-up, no routing pass.
        assert_eq!(table.calls.load(Ordering::SeqCst), calls_before + 1);
        let params = state.phase_params("generate_report");
        assert_eq!(params["user_name"], "Bob");
        assert_eq!(params["report_type"], "quarterly");
    }

    #[tokio::test]
    async fn add_user_input_without_state_starts_fresh() {
        let classifier = ScriptedClassifier::routes_to("generate_report", 0.9);
        let (engine, _) = engine_with(
            registry(vec![report_phase(FixedOutcome::new(PhaseOutcome::completed(json!({}))))]),
            classifier.clone(),
            TableExtractor::new(&report_table()),
            WorkflowConfig::default(),
        );

        let state = engine
            .add_user_input("Generate a monthly report for Alice", "unknown")
            .await
            .unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn add_user_input_after_completion_starts_fresh() {
        let classifier = ScriptedClassifier::routes_to("generate_report", 0.9);
        let (engine, _) = engine_with(
            registry(vec![report_phase(FixedOutcome::new(PhaseOutcome::completed(json!({}))))]),
            classifier.clone(),
            TableExtractor::new(&report_table()),
            WorkflowConfig::default(),
        );

        engine
            .run_workflow("Generate a monthly report for Alice", "t-1")
            .await
            .unwrap();
        let state = engine.add_user_input("Generate a report", "t-1").await.unwrap();
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);
        assert_eq!(state.status, WorkflowStatus::CollectingParams);
        assert_eq!(state.messages.len(), 2);
    }

    #[tokio::test]
    async fn auto_continuation_is_bounded() {
        let handler = FixedOutcome::new(PhaseOutcome::new(PhaseResultStatus::Incomplete, json!({})));
        let config = WorkflowConfig {
            max_iterations: 3,
            ..WorkflowConfig::default()
        };
        let (engine, _) = engine_with(
            registry(vec![report_phase(handler.clone())]),
            ScriptedClassifier::routes_to("generate_report", 0.9),
            TableExtractor::new(&report_table()),
            config,
        );

        let state = engine
            .run_workflow("Generate a monthly report for Alice", "t-1")
            .await
            .unwrap();

        // One run from the routed turn plus three continuation passes.
        assert_eq!(handler.runs.load(Ordering::SeqCst), 4);
        assert_eq!(state.iteration_count, 3);
        let continues = state
            .messages
            .iter()
            .filter(|m| m.content == CONTINUE_MESSAGE)
            .count();
        assert_eq!(continues, 3);
        assert_eq!(state.status, WorkflowStatus::CollectingParams);
    }

    #[tokio::test]
    async fn auto_continuation_stops_at_an_open_question() {
        let outcome = PhaseOutcome::new(PhaseResultStatus::Incomplete, json!({}))
            .with_message("Is the income really zero?");
        let handler = FixedOutcome::new(outcome);
        let (engine, _) = report_engine(handler.clone());

        let state = engine
            .run_workflow("Generate a monthly report for Alice", "t-1")
            .await
            .unwrap();

        assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
        assert_eq!(state.iteration_count, 0);
        assert_eq!(state.messages.len(), 2);
        assert!(state.awaiting_input);
        assert_eq!(state.last_assistant_message(), Some("Is the income really zero?"));
    }

    #[tokio::test]
    async fn auto_continuation_can_be_disabled() {
        let handler = FixedOutcome::new(PhaseOutcome::new(PhaseResultStatus::Incomplete, json!({})));
        let config = WorkflowConfig {
            enable_auto_continuation: false,
            ..WorkflowConfig::default()
        };
        let (engine, _) = engine_with(
            registry(vec![report_phase(handler.clone())]),
            ScriptedClassifier::routes_to("generate_report", 0.9),
            TableExtractor::new(&report_table()),
            config,
        );

        let state = engine
            .run_workflow("Generate a monthly report for Alice", "t-1")
            .await
            .unwrap();
        assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
        assert_eq!(state.iteration_count, 0);
    }

    #[tokio::test]
    async fn auto_continuation_skips_rejected_values() {
        let (engine, _) = report_engine(Arc::new(Rejecting("bad input".into())));

        let state = engine
            .run_workflow("Generate a monthly report for Alice", "t-1")
            .await
            .unwrap();
        assert_eq!(state.error_count, 1);
        assert_eq!(state.iteration_count, 0);
        assert_eq!(state.status, WorkflowStatus::CollectingParams);
    }

    #[tokio::test]
    async fn classifier_failure_ends_turn_failed() {
        let (engine, _) = engine_with(
            registry(vec![report_phase(FixedOutcome::new(PhaseOutcome::completed(json!({}))))]),
            ScriptedClassifier::failing(),
            TableExtractor::new(&report_table()),
            WorkflowConfig::default(),
        );

        let state = engine.run_workflow("Generate a report", "t-1").await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Failed);
        assert!(!state.awaiting_input);
        assert!(state.last_assistant_message().unwrap().contains("classifier offline"));
    }
}
