//! `generate_report`: builds a titled report with simulated chart data.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::error::ValidationError;
use crate::workflow::{FieldMap, FieldSpec, ParamSchema, PhaseDefinition, PhaseHandler, PhaseOutcome};

use super::fields::required_str;

pub const PHASE_NAME: &str = "generate_report";

const REPORT_TYPES: &[&str] = &["daily", "weekly", "monthly", "quarterly", "annual"];

const CHART_POINTS: usize = 6;

pub fn definition() -> PhaseDefinition {
    PhaseDefinition::new(
        PHASE_NAME,
        "Generate user reports and analytics",
        ParamSchema::new(vec![
            FieldSpec::new(
                "user_name",
                "Extract the user's name (look for names like 'Alice', 'John', 'for user X')",
            )
            .with_examples(["Alice", "John", "Sarah"]),
            FieldSpec::new(
                "report_type",
                "Extract report type (monthly, quarterly, annual, daily, weekly)",
            )
            .with_examples(REPORT_TYPES.iter().copied()),
        ]),
        Arc::new(ReportHandler),
    )
    .with_timeout_seconds(180)
}

struct ReportHandler;

#[async_trait]
impl PhaseHandler for ReportHandler {
    fn validate(&self, params: &FieldMap) -> Result<FieldMap, ValidationError> {
        let user_name = required_str(params, "user_name")?;
        let report_type = required_str(params, "report_type")?.to_lowercase();
        if !REPORT_TYPES.contains(&report_type.as_str()) {
            return Err(ValidationError::for_field(
                "report_type",
                format!(
                    "Unsupported report type '{report_type}'. Choose one of: {}",
                    REPORT_TYPES.join(", ")
                ),
            ));
        }

        let mut validated = FieldMap::new();
        validated.insert("user_name".into(), json!(user_name));
        validated.insert("report_type".into(), json!(report_type));
        Ok(validated)
    }

    async fn execute(&self, params: FieldMap) -> anyhow::Result<PhaseOutcome> {
        let user_name = required_str(&params, "user_name")?;
        let report_type = required_str(&params, "report_type")?;
        info!(user_name = %user_name, report_type = %report_type, "Generating report");

        let name_len = user_name.chars().count();
        let chart_data: Vec<_> = (1..=CHART_POINTS)
            .map(|month| json!({ "month": month, "value": name_len * month * 10 }))
            .collect();

        Ok(PhaseOutcome::completed(json!({
            "report_title": format!("{} Report for {}", capitalize(&report_type), user_name),
            "chart_data": chart_data,
            "generated_at": Utc::now().to_rfc3339(),
            "workflow_type": "report_generation",
            "metadata": {
                "user_name": user_name,
                "report_type": report_type,
                "total_data_points": CHART_POINTS,
            },
        })))
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
