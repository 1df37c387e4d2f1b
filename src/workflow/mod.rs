//! Conversational parameter collection.
//!
//! A turn flows router → executor:
//! 1. [`IntentRouter`] classifies the latest message into a registered phase
//!    and seeds that phase's parameters from it.
//! 2. [`PhaseExecutor`] requests missing fields, or validates and runs the
//!    phase's business function once everything is known.
//!
//! [`WorkflowEngine`] owns the session lifecycle around that flow.

pub mod engine;
pub mod executor;
pub mod extractor;
pub mod phase;
pub mod prompts;
pub mod router;
pub mod state;

pub use engine::WorkflowEngine;
pub use executor::PhaseExecutor;
pub use extractor::ParameterExtractor;
pub use phase::{
    FieldMap, FieldSpec, ParamSchema, PhaseDefinition, PhaseHandler, PhaseOutcome,
    PhaseRegistry, PhaseResultStatus, PhaseSummary,
};
pub use router::IntentRouter;
pub use state::{ConversationEntry, PhaseMeta, SessionState, SupervisorDecision, WorkflowStatus};

#[cfg(test)]
pub(crate) mod testing;
