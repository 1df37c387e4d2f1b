//! Per-thread session state and the workflow status machine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{ChatMessage, Role};

use super::phase::FieldMap;

/// Status of a thread's workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Pending,
    CollectingParams,
    Executing,
    Completed,
    Failed,
}

impl WorkflowStatus {
    /// Whether the turn ended for good (no further input expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::CollectingParams => "collecting_params",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Router output: which phase handles the turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorDecision {
    pub next_phase: String,
    pub intent: String,
    /// In `[0, 1]`.
    pub confidence: f32,
}

/// One entry in the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Runtime bookkeeping for one phase, kept apart from its business fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseMeta {
    /// A missing-field prompt went out and no new input arrived since.
    pub request_sent: bool,
    /// The last complete field set failed validation.
    pub validation_failed: bool,
    pub last_error: Option<String>,
    /// Params the phase last answered with an `Incomplete` question.
    /// Re-running on the same params gets the same question back.
    #[serde(default)]
    pub question_params: Option<FieldMap>,
}

/// Persisted conversation + workflow state for one thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub thread_id: String,
    pub messages: Vec<ConversationEntry>,
    pub params: BTreeMap<String, FieldMap>,
    #[serde(default)]
    pub phase_meta: BTreeMap<String, PhaseMeta>,
    pub results: BTreeMap<String, Value>,
    pub supervisor: Option<SupervisorDecision>,
    pub current_phase: Option<String>,
    pub awaiting_input: bool,
    pub status: WorkflowStatus,
    pub error_count: u32,
    pub iteration_count: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    /// Fresh state: `Pending`, counters zeroed.
    pub fn new(thread_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            thread_id: thread_id.into(),
            messages: Vec::new(),
            params: BTreeMap::new(),
            phase_meta: BTreeMap::new(),
            results: BTreeMap::new(),
            supervisor: None,
            current_phase: None,
            awaiting_input: false,
            status: WorkflowStatus::Pending,
            error_count: 0,
            iteration_count: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ConversationEntry::new(Role::User, content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages
            .push(ConversationEntry::new(Role::Assistant, content));
    }

    /// Most recent user message, if any.
    pub fn latest_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Most recent assistant message: the turn's visible output.
    pub fn last_assistant_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    pub fn chat_history(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(|m| m.to_chat_message()).collect()
    }

    /// Business fields collected so far for `phase`.
    pub fn phase_params(&self, phase: &str) -> FieldMap {
        self.params.get(phase).cloned().unwrap_or_default()
    }

    /// Merge `fields` over the phase's existing map. Returns how many were written.
    pub fn merge_params(&mut self, phase: &str, fields: FieldMap) -> usize {
        let count = fields.len();
        self.params
            .entry(phase.to_string())
            .or_default()
            .extend(fields);
        count
    }

    pub fn meta(&self, phase: &str) -> PhaseMeta {
        self.phase_meta.get(phase).cloned().unwrap_or_default()
    }

    pub fn meta_mut(&mut self, phase: &str) -> &mut PhaseMeta {
        self.phase_meta.entry(phase.to_string()).or_default()
    }

    /// Mark the turn as failed with a user-visible message.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.status = WorkflowStatus::Failed;
        self.awaiting_input = false;
        self.error_count += 1;
        self.error_message = Some(message.clone());
        self.push_assistant(message);
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_display_matches_serde() {
        use WorkflowStatus::*;
        for status in [Pending, CollectingParams, Executing, Completed, Failed] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Failed.is_terminal());
        assert!(!WorkflowStatus::CollectingParams.is_terminal());
        assert!(!WorkflowStatus::Pending.is_terminal());
    }

    #[test]
    fn new_state_is_pending_and_zeroed() {
        let state = SessionState::new("t-1");
        assert_eq!(state.status, WorkflowStatus::Pending);
        assert_eq!(state.error_count, 0);
        assert_eq!(state.iteration_count, 0);
        assert!(state.current_phase.is_none());
        assert!(!state.awaiting_input);
    }

    #[test]
    fn merge_params_overwrites_and_keeps_existing() {
        let mut state = SessionState::new("t-1");
        let mut first = FieldMap::new();
        first.insert("user_name".into(), json!("Alice"));
        state.merge_params("generate_report", first);

        let mut second = FieldMap::new();
        second.insert("report_type".into(), json!("monthly"));
        second.insert("user_name".into(), json!("Bob"));
        assert_eq!(state.merge_params("generate_report", second), 2);

        let params = state.phase_params("generate_report");
        assert_eq!(params["user_name"], "Bob");
        assert_eq!(params["report_type"], "monthly");
    }

    #[test]
    fn latest_messages_by_role() {
        let mut state = SessionState::new("t-1");
        state.push_user("first");
        state.push_assistant("question?");
        state.push_user("second");
        assert_eq!(state.latest_user_message(), Some("second"));
        assert_eq!(state.last_assistant_message(), Some("question?"));
        assert_eq!(state.chat_history().len(), 3);
    }

    #[test]
    fn fail_sets_status_and_counts() {
        let mut state = SessionState::new("t-1");
        state.awaiting_input = true;
        state.fail("boom");
        assert_eq!(state.status, WorkflowStatus::Failed);
        assert_eq!(state.error_count, 1);
        assert!(!state.awaiting_input);
        assert_eq!(state.error_message.as_deref(), Some("boom"));
        assert_eq!(state.last_assistant_message(), Some("boom"));
    }

    #[test]
    fn state_serde_roundtrip() {
        let mut state = SessionState::new("t-1");
        state.push_user("Generate a report");
        state.current_phase = Some("generate_report".into());
        state.meta_mut("generate_report").request_sent = true;
        state.results.insert("x".into(), json!({"ok": true}));

        let json = serde_json::to_string(&state).unwrap();
        let parsed: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }
}
