//! Built-in demonstration phases.

pub mod data_processing;
pub mod demographics;
mod fields;
pub mod report;

use crate::error::ConfigError;
use crate::workflow::PhaseRegistry;

/// Registry of all built-in phases, report generation first.
pub fn builtin_registry() -> Result<PhaseRegistry, ConfigError> {
    PhaseRegistry::new(vec![
        report::definition(),
        data_processing::definition(),
        demographics::definition(),
    ])
}
