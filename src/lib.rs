//! phase-flow: conversational parameter collection for named workflow phases.

pub mod config;
pub mod error;
pub mod llm;
pub mod phases;
pub mod store;
pub mod workflow;

pub use config::WorkflowConfig;
pub use error::{Error, Result};
pub use workflow::WorkflowEngine;
