//! Triage core library
//!
//! Deterministic, I/O-free building blocks for the ticket triage pipeline:
//!
//! - `types`: evidence batches, decisions, evaluations and persisted runs
//! - `validation`: post-generation checks for model output (schema bounds and
//!   citation referential integrity)
//! - `evidence`: context assembly for generation prompts
//! - `chunker`: recursive character splitting for knowledge-base ingestion
//! - `state_machine`: pipeline states and legal transitions
//! - `error`: error taxonomy and the structured failure report

pub mod chunker;
pub mod error;
pub mod evidence;
pub mod state_machine;
pub mod types;
pub mod validation;

pub use error::{PipelineFailure, Stage, TriageError, TriageResult};
pub use state_machine::{PipelineState, StateMachine};
pub use types::{
    Action, Decision, DecisionOutput, Evaluation, EvidenceBatch, Route, Run, RunId, Snippet,
    SnippetId, TicketText, Urgency,
};
