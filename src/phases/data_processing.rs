//! `process_data`: simulated analysis over a named data source.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::error::ValidationError;
use crate::workflow::{FieldMap, FieldSpec, ParamSchema, PhaseDefinition, PhaseHandler, PhaseOutcome};

use super::fields::required_str;

pub const PHASE_NAME: &str = "process_data";

pub fn definition() -> PhaseDefinition {
    PhaseDefinition::new(
        PHASE_NAME,
        "Process and analyze data from various sources",
        ParamSchema::new(vec![
            FieldSpec::new(
                "data_source",
                "Extract data source (sales, user_metrics, analytics, sales_data, etc.)",
            )
            .with_examples(["sales_data", "user_metrics", "analytics", "financial_data"]),
            FieldSpec::new(
                "analysis_type",
                "Extract analysis type (trend, performance, comparison, forecast, etc.)",
            )
            .with_examples(["trend", "performance", "comparison", "forecast"]),
        ]),
        Arc::new(DataProcessingHandler),
    )
}

struct DataProcessingHandler;

#[async_trait]
impl PhaseHandler for DataProcessingHandler {
    fn validate(&self, params: &FieldMap) -> Result<FieldMap, ValidationError> {
        let mut validated = FieldMap::new();
        validated.insert("data_source".into(), json!(required_str(params, "data_source")?));
        validated.insert(
            "analysis_type".into(),
            json!(required_str(params, "analysis_type")?.to_lowercase()),
        );
        Ok(validated)
    }

    async fn execute(&self, params: FieldMap) -> anyhow::Result<PhaseOutcome> {
        let data_source = required_str(&params, "data_source")?;
        let analysis_type = required_str(&params, "analysis_type")?;
        info!(data_source = %data_source, analysis_type = %analysis_type, "Processing data");

        let mut label = analysis_type.clone();
        if let Some(first) = label.get_mut(..1) {
            first.make_ascii_uppercase();
        }

        Ok(PhaseOutcome::completed(json!({
            "data_source": data_source,
            "analysis_type": analysis_type,
            "records_processed": 1000,
            "insights": [
                format!("{label} analysis completed"),
                "Anomalies detected: 5",
                "Performance improved by 15%",
            ],
            "processed_at": Utc::now().to_rfc3339(),
            "workflow_type": "data_processing",
            "metadata": {
                "processing_time_ms": 1500,
                "data_quality_score": 0.95,
            },
        }))
        .with_message(format!("✅ Processed {data_source} ({analysis_type} analysis)")))
    }
}
