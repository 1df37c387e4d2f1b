//! `client_demographics`: client personal details and income.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;

use serde_json::Value;

use crate::error::ValidationError;
use crate::workflow::{
    FieldMap, FieldSpec, ParamSchema, PhaseDefinition, PhaseHandler, PhaseOutcome,
    PhaseResultStatus,
};

use super::fields::{age_on, parse_currency, parse_date, required_str};

pub const PHASE_NAME: &str = "client_demographics";

const MAX_AGE: i32 = 120;

/// Statuses that imply the client has an income.
const EARNING_STATUSES: &[&str] = &["employed", "self-employed", "contractor"];

pub fn definition() -> PhaseDefinition {
    PhaseDefinition::new(
        PHASE_NAME,
        "Client demographics and income - collect client personal and income information",
        ParamSchema::new(vec![
            FieldSpec::new("client_name", "Full client name")
                .with_examples(["John Smith", "Sarah Johnson", "Mr. Robert Brown"]),
            FieldSpec::new("date_of_birth", "Client date of birth in dd/mm/yyyy format")
                .with_label("Date of Birth")
                .with_examples(["15/03/1978", "01/01/1980", "25/12/1975"]),
            FieldSpec::new("annual_income", "Annual gross income")
                .with_examples(["£45000", "45k", "£52,500"]),
            FieldSpec::new("employment_status", "Current employment status")
                .with_examples(["employed", "self-employed", "retired", "unemployed", "contractor"]),
            FieldSpec::new("age", "Age in years, derived from the date of birth").computed(),
            FieldSpec::new(
                "income_confirmed",
                "true only if the client explicitly confirms an annual income of zero",
            )
            .optional(),
        ]),
        Arc::new(DemographicsHandler),
    )
}

/// Typed view of a validated field map.
#[derive(Debug, Clone, PartialEq)]
struct ClientDemographics {
    client_name: String,
    date_of_birth: NaiveDate,
    annual_income: Decimal,
    employment_status: String,
    age: i32,
    income_confirmed: bool,
}

impl ClientDemographics {
    fn from_fields(params: &FieldMap, today: NaiveDate) -> Result<Self, ValidationError> {
        let client_name = required_str(params, "client_name")?;

        let date_of_birth = parse_date("date_of_birth", &required_str(params, "date_of_birth")?)?;
        if date_of_birth > today {
            return Err(ValidationError::for_field(
                "date_of_birth",
                "date_of_birth cannot be in the future",
            ));
        }
        let age = age_on(date_of_birth, today);
        if !(0..=MAX_AGE).contains(&age) {
            return Err(ValidationError::for_field(
                "age",
                format!("Age {age} derived from the date of birth must be between 0 and {MAX_AGE}"),
            ));
        }

        let annual_income = parse_currency("annual_income", &required_str(params, "annual_income")?)?;
        let employment_status = normalize_status(&required_str(params, "employment_status")?);

        Ok(Self {
            client_name,
            date_of_birth,
            annual_income,
            employment_status,
            age,
            income_confirmed: is_confirmed(params.get("income_confirmed")),
        })
    }

    fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("client_name".into(), json!(self.client_name));
        fields.insert(
            "date_of_birth".into(),
            json!(self.date_of_birth.format("%d/%m/%Y").to_string()),
        );
        fields.insert("annual_income".into(), json!(self.annual_income.to_string()));
        fields.insert("employment_status".into(), json!(self.employment_status));
        fields.insert("age".into(), json!(self.age));
        if self.income_confirmed {
            fields.insert("income_confirmed".into(), json!(true));
        }
        fields
    }

    fn is_earning(&self) -> bool {
        EARNING_STATUSES.contains(&self.employment_status.as_str())
    }
}

/// `true`, `"yes"`, `"confirmed"`; anything else counts as unconfirmed.
fn is_confirmed(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "yes" | "y" | "confirmed"
        ),
        _ => false,
    }
}

/// `Self Employed` / `self employed` → `self-employed`.
fn normalize_status(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn format_amount(amount: Decimal) -> String {
    let text = format!("{:.2}", amount.round_dp(2));
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if fraction == "00" {
        format!("£{grouped}")
    } else {
        format!("£{grouped}.{fraction}")
    }
}

struct DemographicsHandler;

#[async_trait]
impl PhaseHandler for DemographicsHandler {
    fn validate(&self, params: &FieldMap) -> Result<FieldMap, ValidationError> {
        ClientDemographics::from_fields(params, Utc::now().date_naive()).map(|c| c.to_fields())
    }

    async fn execute(&self, params: FieldMap) -> anyhow::Result<PhaseOutcome> {
        let client = ClientDemographics::from_fields(&params, Utc::now().date_naive())?;
        info!(client = %client.client_name, age = client.age, "Recording client demographics");

        let income = format_amount(client.annual_income);
        let data = json!({
            "client_name": client.client_name,
            "date_of_birth": client.date_of_birth.format("%d/%m/%Y").to_string(),
            "age": client.age,
            "annual_income": client.annual_income.to_string(),
            "annual_income_display": income,
            "employment_status": client.employment_status,
            "completed_at": Utc::now().to_rfc3339(),
            "workflow_type": "client_demographics",
        });

        let outcome = if client.annual_income.is_zero() && client.is_earning() {
            if client.income_confirmed {
                PhaseOutcome::new(PhaseResultStatus::CompletedWithWarnings, data).with_message(
                    format!(
                        "✅ Client demographics recorded for {} (note: £0 income confirmed while {})",
                        client.client_name, client.employment_status
                    ),
                )
            } else {
                PhaseOutcome::new(PhaseResultStatus::Incomplete, data).with_message(format!(
                    "⚠️ {} is {} but the annual income is £0. Please confirm that the income \
                     really is £0, or tell me the correct annual income.",
                    client.client_name, client.employment_status
                ))
            }
        } else if client.annual_income.is_zero() {
            PhaseOutcome::new(PhaseResultStatus::CompletedWithWarnings, data).with_message(format!(
                "✅ Client demographics recorded for {} (note: no annual income declared)",
                client.client_name
            ))
        } else {
            PhaseOutcome::completed(data).with_message(format!(
                "✅ Client demographics recorded for {}, age {}, income {}",
                client.client_name, client.age, income
            ))
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn params(dob: &str, income: &str, status: &str) -> FieldMap {
        let mut p = FieldMap::new();
        p.insert("client_name".into(), json!("Jane Doe"));
        p.insert("date_of_birth".into(), json!(dob));
        p.insert("annual_income".into(), json!(income));
        p.insert("employment_status".into(), json!(status));
        p
    }

    #[test]
    fn parses_and_computes_age() {
        let client =
            ClientDemographics::from_fields(&params("15/03/1978", "£45,000", "Self Employed"), today())
                .unwrap();
        assert_eq!(client.age, 46);
        assert_eq!(client.annual_income, dec!(45000));
        assert_eq!(client.employment_status, "self-employed");
        assert!(client.is_earning());

        let fields = client.to_fields();
        assert_eq!(fields["age"], 46);
        assert_eq!(fields["annual_income"], "45000");
    }

    #[test]
    fn invalid_income_is_a_currency_error() {
        let err = ClientDemographics::from_fields(&params("15/03/1978", "lots", "employed"), today())
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("annual_income"));
        assert!(err.message.contains("currency"));
    }

    #[test]
    fn implausible_age_is_rejected() {
        let err = ClientDemographics::from_fields(&params("01/01/1850", "45k", "retired"), today())
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("age"));
    }

    #[test]
    fn future_birth_date_is_rejected() {
        let err = ClientDemographics::from_fields(&params("01/01/2030", "45k", "retired"), today())
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("date_of_birth"));
    }

    #[test]
    fn confirmation_accepts_common_spellings() {
        assert!(is_confirmed(Some(&json!(true))));
        assert!(is_confirmed(Some(&json!(" Yes "))));
        assert!(is_confirmed(Some(&json!("confirmed"))));
        assert!(!is_confirmed(Some(&json!("no"))));
        assert!(!is_confirmed(Some(&json!(false))));
        assert!(!is_confirmed(None));
    }

    #[test]
    fn amount_formatting() {
        assert_eq!(format_amount(dec!(45000)), "£45,000");
        assert_eq!(format_amount(dec!(1234567.5)), "£1,234,567.50");
        assert_eq!(format_amount(dec!(999)), "£999");
    }

    #[tokio::test]
    async fn zero_income_rules() {
        let handler = DemographicsHandler;

        let validated = handler.validate(&params("15/03/1978", "0", "employed")).unwrap();
        let outcome = handler.execute(validated).await.unwrap();
        assert_eq!(outcome.status, PhaseResultStatus::Incomplete);

        let mut confirmed = params("15/03/1978", "0", "employed");
        confirmed.insert("income_confirmed".into(), json!("yes"));
        let validated = handler.validate(&confirmed).unwrap();
        assert_eq!(validated["income_confirmed"], true);
        let outcome = handler.execute(validated).await.unwrap();
        assert_eq!(outcome.status, PhaseResultStatus::CompletedWithWarnings);
        assert!(outcome.message.unwrap().contains("£0 income confirmed"));

        let validated = handler.validate(&params("15/03/1978", "0", "retired")).unwrap();
        let outcome = handler.execute(validated).await.unwrap();
        assert_eq!(outcome.status, PhaseResultStatus::CompletedWithWarnings);

        let validated = handler.validate(&params("15/03/1978", "52k", "employed")).unwrap();
        let outcome = handler.execute(validated).await.unwrap();
        assert_eq!(outcome.status, PhaseResultStatus::Completed);
        assert_eq!(outcome.data["annual_income_display"], "£52,000");
    }
}
