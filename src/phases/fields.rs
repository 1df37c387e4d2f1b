//! Field coercion shared by the built-in phases.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::ValidationError;
use crate::workflow::FieldMap;

/// `£45,000`, `45000.50`, `45k`, `1.5k`. Thousands separators must be well formed.
static CURRENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^£?\s*(\d{1,3}(?:,\d{3})+|\d+)(\.\d{1,2})?\s*(k)?$")
        .expect("currency regex is valid")
});

/// Accepted date layouts, tried in order.
const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d"];

/// A required scalar field as trimmed text.
pub fn required_str(params: &FieldMap, name: &str) -> Result<String, ValidationError> {
    let text = match params.get(name) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    };
    if text.is_empty() {
        return Err(ValidationError::for_field(name, format!("{name} is required")));
    }
    Ok(text)
}

/// Parse a non-negative currency amount.
pub fn parse_currency(field: &str, raw: &str) -> Result<Decimal, ValidationError> {
    let invalid = || ValidationError::for_field(field, format!("Invalid currency amount: '{raw}'"));

    let caps = CURRENCY_RE.captures(raw.trim()).ok_or_else(invalid)?;
    let whole = caps.get(1).map(|m| m.as_str().replace(',', "")).unwrap_or_default();
    let fraction = caps.get(2).map(|m| m.as_str()).unwrap_or("");

    let mut amount = Decimal::from_str(&format!("{whole}{fraction}")).map_err(|_| invalid())?;
    if caps.get(3).is_some() {
        amount = amount.checked_mul(Decimal::ONE_THOUSAND).ok_or_else(invalid)?;
    }
    Ok(amount.normalize())
}

/// Parse a calendar date (dd/mm/yyyy preferred).
pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, ValidationError> {
    let trimmed = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| {
            ValidationError::for_field(
                field,
                format!("{field}: '{raw}' is not a valid date (expected dd/mm/yyyy)"),
            )
        })
}

/// Whole years between `born` and `today`.
pub fn age_on(born: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - born.year();
    if (today.month(), today.day()) < (born.month(), born.day()) {
        age -= 1;
    }
    age
}
