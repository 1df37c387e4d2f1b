//! Prompt builders and user-facing message templates for the workflow engine.

use super::phase::{FieldSpec, ParamSchema, PhaseResultStatus, PhaseSummary};

/// Shown when the triggering message is empty or whitespace.
pub const EMPTY_MESSAGE_ERROR: &str =
    "❌ **Error**: Empty message provided - cannot determine workflow intent";

/// Pseudo-user message appended before an auto-continuation pass.
pub const CONTINUE_MESSAGE: &str = "continue with execution";

/// Max examples quoted per field in a parameter request.
const MAX_PROMPT_EXAMPLES: usize = 3;

/// System prompt for the intent classifier.
pub fn classification_prompt(directory: &[PhaseSummary]) -> String {
    let phases = directory
        .iter()
        .map(|p| format!("- **{}**: {}", p.name, p.description))
        .collect::<Vec<_>>()
        .join("\n");
    let names = directory
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "\
You are an intelligent workflow supervisor. Analyze the user's request and decide which workflow phase to execute.

Available workflow phases:
{phases}

Return ONLY a JSON object (no markdown, no explanation) with:
- \"next_phase\": one of [{names}]
- \"intent\": brief summary of what the user wants to accomplish
- \"confidence\": number between 0.0 and 1.0 indicating your confidence in the decision

Choose the most appropriate phase based on keywords, context, and user intent."
    )
}

/// One `- name: description Examples: [..]` line per user-supplied field.
fn field_lines(schema: &ParamSchema) -> String {
    schema
        .user_input_fields()
        .map(|f| {
            let description = if f.description.is_empty() {
                format!("extract the {}", f.name.replace('_', " "))
            } else {
                f.description.clone()
            };
            let name = if f.optional {
                format!("{} (optional)", f.name)
            } else {
                f.name.clone()
            };
            if f.examples.is_empty() {
                format!("- {}: {}", name, description)
            } else {
                let examples = f
                    .examples
                    .iter()
                    .map(|e| format!("\"{e}\""))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("- {}: {} Examples: [{}]", name, description, examples)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt for the schema-constrained extraction capability.
pub fn structured_extraction_prompt(text: &str, phase_name: &str, schema: &ParamSchema) -> String {
    format!(
        "\
Extract parameters for {phase_name} from this message: \"{text}\"

Required parameters:
{fields}

IMPORTANT:
- If a parameter cannot be clearly determined from the message, set it to null
- Only extract parameters that are explicitly mentioned or clearly implied
- Do not guess or make assumptions about missing information

Return ONLY a JSON object whose keys are the parameter names above.",
        fields = field_lines(schema),
    )
}

/// Prompt for the unconstrained free-text fallback.
pub fn fallback_extraction_prompt(text: &str, phase_name: &str, schema: &ParamSchema) -> String {
    let example_key = schema
        .user_input_fields()
        .next()
        .map(|f| f.name.as_str())
        .unwrap_or("field");
    format!(
        "\
Extract parameters for {phase_name} from this message: \"{text}\"

Required parameters:
{fields}

Return a JSON object with extracted parameters. Use null for parameters that cannot be determined.
Only return the JSON object, nothing else.

Example: {{\"{example_key}\": \"value\"}}",
        fields = field_lines(schema),
    )
}

/// Prompt asking the user for the missing fields of a phase.
///
/// `retry` switches the intro after a validation failure.
pub fn parameter_request_message(display_name: &str, missing: &[&FieldSpec], retry: bool) -> String {
    let intro = if retry {
        "Let me help you provide the correct information:".to_string()
    } else {
        format!("I need some additional information for your {display_name}:")
    };

    let requests: Vec<String> = missing
        .iter()
        .filter(|f| !f.computed)
        .map(|f| {
            let description = if f.description.is_empty() {
                format!("the {}", f.name.replace('_', " "))
            } else {
                f.description.clone()
            };
            let examples: Vec<&str> = f
                .examples
                .iter()
                .take(MAX_PROMPT_EXAMPLES)
                .map(String::as_str)
                .collect();
            if examples.is_empty() {
                format!("• **{}**: {}", f.label(), description)
            } else {
                format!("• **{}**: {} (e.g., {})", f.label(), description, examples.join(", "))
            }
        })
        .collect();

    if requests.is_empty() {
        return "All required information has been collected. Processing your request...".to_string();
    }

    format!(
        "{intro}\n{}\nPlease provide these details and I'll continue with the workflow.",
        requests.join("\n")
    )
}

/// Known validation failure families with tailored remediation text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationCategory {
    Age,
    Amount,
    Date,
    Other,
}

impl ValidationCategory {
    /// Categorize by whole words of the lower-cased error text.
    ///
    /// Underscores split words, so `date_of_birth` mentions "date" while
    /// "message" does not mention "age". Checked in order: age, amount, date.
    pub fn from_error(error: &str) -> Self {
        let lowered = error.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has = |w: &str| words.contains(&w);

        if has("age") {
            Self::Age
        } else if has("currency") || has("amount") {
            Self::Amount
        } else if has("date") {
            Self::Date
        } else {
            Self::Other
        }
    }
}

/// Remediation message for a validation failure in `display_name`.
pub fn validation_error_message(error: &str, display_name: &str) -> String {
    match ValidationCategory::from_error(error) {
        ValidationCategory::Age => "\
❌ **Invalid Age Provided**

The age you entered is not valid. Please provide your age as:
- A number between 0 and 120
- Examples: \"45\", \"thirty-five\", \"aged 45\"

Please tell me your correct age."
            .to_string(),
        ValidationCategory::Amount => "\
❌ **Invalid Amount Provided**

The amount you entered is not valid. Please provide amounts as:
- £50000 or £50,000
- 50k or 50000
- \"fifty thousand pounds\"

Please provide the correct amount."
            .to_string(),
        ValidationCategory::Date => "\
❌ **Invalid Date Provided**

The date you entered is not valid. Please provide dates as:
- dd/mm/yyyy format (e.g., 15/03/2024)
- \"today\" for current date
- Month Year (e.g., \"March 2024\")

Please provide the correct date."
            .to_string(),
        ValidationCategory::Other => format!(
            "❌ **Invalid Input Provided**\n\n{error}\n\nPlease provide the correct information for {display_name}."
        ),
    }
}

/// Message used when a business outcome carries none.
pub fn default_outcome_message(status: &PhaseResultStatus, display_name: &str) -> String {
    let title = title_case(display_name);
    match status {
        PhaseResultStatus::Completed | PhaseResultStatus::CompletedWithWarnings => {
            format!("✅ {title} completed successfully!")
        }
        PhaseResultStatus::Incomplete => format!("⚠️ {title} needs additional information"),
        PhaseResultStatus::Failed => format!("❌ {title} failed validation"),
        PhaseResultStatus::Unknown(_) => "Workflow completed".to_string(),
    }
}

/// Message for an error, panic, or timeout raised by a business function.
pub fn phase_error_message(display_name: &str, error: &str) -> String {
    format!("❌ **Error in {display_name}**: {error}")
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
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
