//! Configuration types.

/// Values that count as "not provided" when checking required fields.
pub const DEFAULT_UNSET_SENTINELS: &[&str] = &["none", "not specified", "null"];

/// Workflow engine configuration.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Upper bound on auto-continuation passes per `run_workflow` call.
    pub max_iterations: u32,
    /// Structured extraction attempts before falling back to free text.
    pub parameter_extraction_retries: u32,
    /// Model used for extraction and free-text fallback.
    pub default_llm_model: String,
    /// Temperature for extraction calls.
    pub default_temperature: f32,
    /// Temperature for routing (kept low for consistent decisions).
    pub supervisor_temperature: f32,
    /// Re-run the executor without a user turn once parameters are complete.
    pub enable_auto_continuation: bool,
    /// Log extraction diagnostics (filtered values, raw output) at info level.
    pub debug_mode: bool,
    /// Lower-cased values treated as missing by the missing-field check.
    pub unset_sentinels: Vec<String>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            parameter_extraction_retries: 3,
            default_llm_model: "claude-sonnet-4-20250514".to_string(),
            default_temperature: 0.7,
            supervisor_temperature: 0.1,
            enable_auto_continuation: true,
            debug_mode: false,
            unset_sentinels: DEFAULT_UNSET_SENTINELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl WorkflowConfig {
    /// Build a config from `PHASE_FLOW_*` environment variables, falling back
    /// to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_iterations: u32 = std::env::var("PHASE_FLOW_MAX_ITERATIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_iterations);

        let parameter_extraction_retries: u32 = std::env::var("PHASE_FLOW_EXTRACTION_RETRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.parameter_extraction_retries);

        let default_llm_model =
            std::env::var("PHASE_FLOW_MODEL").unwrap_or(defaults.default_llm_model);

        let default_temperature: f32 = std::env::var("PHASE_FLOW_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.default_temperature);

        let supervisor_temperature: f32 = std::env::var("PHASE_FLOW_SUPERVISOR_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.supervisor_temperature);

        let enable_auto_continuation = std::env::var("PHASE_FLOW_AUTO_CONTINUE")
            .ok()
            .and_then(|s| parse_bool(&s))
            .unwrap_or(defaults.enable_auto_continuation);

        let debug_mode = std::env::var("PHASE_FLOW_DEBUG")
            .ok()
            .and_then(|s| parse_bool(&s))
            .unwrap_or(defaults.debug_mode);

        Self {
            max_iterations,
            parameter_extraction_retries,
            default_llm_model,
            default_temperature,
            supervisor_temperature,
            enable_auto_continuation,
            debug_mode,
            unset_sentinels: defaults.unset_sentinels,
        }
    }

    /// Whether `value` (trimmed, case-insensitive) is one of the unset sentinels.
    pub fn is_unset_sentinel(&self, value: &str) -> bool {
        let lowered = value.trim().to_lowercase();
        self.unset_sentinels.iter().any(|s| *s == lowered)
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
