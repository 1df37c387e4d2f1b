//! Phase definitions, parameter schemas, and the ordered phase registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigError, ValidationError};

/// Field name → value map for one phase.
pub type FieldMap = BTreeMap<String, Value>;

/// Default upper bound on a business function run.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

/// One required field in a phase's parameter schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    label: Option<String>,
    pub description: String,
    pub examples: Vec<String>,
    /// Derived by the phase itself; never requested from the user.
    pub computed: bool,
    /// Extracted when the user mentions it, but never requested.
    pub optional: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            description: description.into(),
            examples: Vec::new(),
            computed: false,
            optional: false,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_examples<I, S>(mut self, examples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.examples = examples.into_iter().map(Into::into).collect();
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Human label: explicit label, else the name title-cased (`user_name` → `User Name`).
    pub fn label(&self) -> String {
        if let Some(ref label) = self.label {
            return label.clone();
        }
        self.name
            .split('_')
            .filter(|w| !w.is_empty())
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Ordered required-field schema for a phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamSchema {
    fields: Vec<FieldSpec>,
}

impl ParamSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Fields the user is expected to supply, in schema order.
    pub fn user_input_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| !f.computed)
    }

    /// User fields that must be present before the phase can run.
    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.user_input_fields().filter(|f| !f.optional)
    }

    /// Whether `name` is a user-supplied field of this schema.
    pub fn is_user_field(&self, name: &str) -> bool {
        self.field(name).is_some_and(|f| !f.computed)
    }

    /// Structural check: every user field present in `params` must be a
    /// scalar (string, number, or bool).
    pub fn check_shape(&self, params: &FieldMap) -> Result<(), ValidationError> {
        for field in self.user_input_fields() {
            match params.get(&field.name) {
                Some(Value::Array(_)) | Some(Value::Object(_)) => {
                    return Err(ValidationError::for_field(
                        &field.name,
                        format!("{}: expected a single value, got a structured value", field.name),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Outcome tag returned by a business function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PhaseResultStatus {
    Completed,
    CompletedWithWarnings,
    Incomplete,
    Failed,
    /// A tag outside the known set (only reachable through deserialization).
    Unknown(String),
}

impl PhaseResultStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Completed => "completed",
            Self::CompletedWithWarnings => "completed_with_warnings",
            Self::Incomplete => "incomplete",
            Self::Failed => "failed",
            Self::Unknown(tag) => tag,
        }
    }
}

impl From<String> for PhaseResultStatus {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "completed" => Self::Completed,
            "completed_with_warnings" => Self::CompletedWithWarnings,
            "incomplete" => Self::Incomplete,
            "failed" => Self::Failed,
            _ => Self::Unknown(tag),
        }
    }
}

impl From<PhaseResultStatus> for String {
    fn from(status: PhaseResultStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for PhaseResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a business function produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseOutcome {
    pub status: PhaseResultStatus,
    /// User-facing message for this outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Business payload.
    #[serde(default)]
    pub data: Value,
}

impl PhaseOutcome {
    pub fn new(status: PhaseResultStatus, data: Value) -> Self {
        Self {
            status,
            message: None,
            data,
        }
    }

    pub fn completed(data: Value) -> Self {
        Self::new(PhaseResultStatus::Completed, data)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Business logic for one phase.
#[async_trait]
pub trait PhaseHandler: Send + Sync {
    /// Business-rule validation of a complete field map. Returns the
    /// normalized map the business function runs on.
    fn validate(&self, params: &FieldMap) -> Result<FieldMap, ValidationError> {
        Ok(params.clone())
    }

    /// Run the business function on validated parameters.
    async fn execute(&self, params: FieldMap) -> anyhow::Result<PhaseOutcome>;
}

/// A named unit of work with a required-field schema and a business handler.
#[derive(Clone)]
pub struct PhaseDefinition {
    pub name: String,
    pub description: String,
    pub schema: ParamSchema,
    pub handler: Arc<dyn PhaseHandler>,
    pub timeout_seconds: u64,
    /// Structured extraction attempts for this phase. `None` uses
    /// `WorkflowConfig::parameter_extraction_retries`.
    pub retry_count: Option<u32>,
}

impl PhaseDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ParamSchema,
        handler: Arc<dyn PhaseHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            handler,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            retry_count: None,
        }
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    /// `generate_report` → `generate report`.
    pub fn display_name(&self) -> String {
        self.name.replace('_', " ")
    }
}

impl std::fmt::Debug for PhaseDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("schema", &self.schema)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish_non_exhaustive()
    }
}

/// Name and description of a registered phase, as shown to the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub name: String,
    pub description: String,
}

/// Ordered collection of phase definitions, fixed at engine construction.
#[derive(Debug, Clone)]
pub struct PhaseRegistry {
    phases: Vec<PhaseDefinition>,
}

impl PhaseRegistry {
    /// Build a registry. Rejects an empty list and duplicate names.
    pub fn new(phases: Vec<PhaseDefinition>) -> Result<Self, ConfigError> {
        if phases.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "phases".to_string(),
                message: "at least one phase definition is required".to_string(),
            });
        }
        for (i, phase) in phases.iter().enumerate() {
            if phases[..i].iter().any(|p| p.name == phase.name) {
                return Err(ConfigError::InvalidValue {
                    key: "phases".to_string(),
                    message: format!("duplicate phase name '{}'", phase.name),
                });
            }
        }
        Ok(Self { phases })
    }

    pub fn get(&self, name: &str) -> Option<&PhaseDefinition> {
        self.phases.iter().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// First registered phase (fallback target for invalid routing).
    pub fn first(&self) -> &PhaseDefinition {
        // Non-empty by construction.
        &self.phases[0]
    }

    pub fn names(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn directory(&self) -> Vec<PhaseSummary> {
        self.phases
            .iter()
            .map(|p| PhaseSummary {
                name: p.name.clone(),
                description: p.description.clone(),
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PhaseDefinition> {
        self.phases.iter()
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}
