//! Triage error taxonomy.
//!
//! | Code                  | Raised by                        | Reaches pipeline? |
//! |-----------------------|----------------------------------|-------------------|
//! | `INVALID_TICKET`      | ticket validation                | no, rejected first |
//! | `RETRIEVAL_FAILED`    | vector index / embedding service | yes               |
//! | `GENERATION_FAILED`   | decide / evaluate model calls    | yes               |
//! | `PERSISTENCE_FAILED`  | run store                        | yes               |
//! | `INGEST_FAILED`       | knowledge-base ingestion         | no                |
//! | `CONFIGURATION_ERROR` | startup                          | no                |
//! | `INTERNAL_ERROR`      | broken pipeline invariant        | yes               |
//!
//! None of these are retried. A pipeline failure is reported once as a
//! [`PipelineFailure`] and nothing is persisted.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state_machine::PipelineState;

/// Result alias for triage operations.
pub type TriageResult<T> = Result<T, TriageError>;

/// Which generation call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Decision,
    Evaluation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decision => write!(f, "decision"),
            Self::Evaluation => write!(f, "evaluation"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum TriageError {
    /// Caller-supplied ticket text failed basic constraints.
    #[error("Invalid ticket: {0}")]
    InvalidTicket(String),

    /// Vector index unreachable, unreadable, or the query could not be embedded.
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// Model call failed or returned output that violates the schema.
    #[error("Generation failed ({stage}): {message}")]
    Generation { stage: Stage, message: String },

    /// Store unreachable or write rejected.
    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Broken internal invariant (e.g. an illegal pipeline transition).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TriageError {
    pub fn generation(stage: Stage, message: impl Into<String>) -> Self {
        Self::Generation {
            stage,
            message: message.into(),
        }
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidTicket(_) => "INVALID_TICKET",
            Self::Retrieval(_) => "RETRIEVAL_FAILED",
            Self::Generation { .. } => "GENERATION_FAILED",
            Self::Persistence(_) => "PERSISTENCE_FAILED",
            Self::Ingestion(_) => "INGEST_FAILED",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Uniform structured error surfaced to callers.
///
/// Callers receive either a complete `{run_id, decision, evaluation}` or
/// exactly one of these, never a partially built pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineFailure {
    /// Machine-readable code (see module table).
    pub error_code: String,
    /// Human-readable summary.
    pub message: String,
    /// Raw error text from the failing collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Pipeline state that was active when the failure happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_state: Option<PipelineState>,
}

impl PipelineFailure {
    pub fn new(
        error_code: impl Into<String>,
        message: impl Into<String>,
        detail: Option<String>,
    ) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            detail,
            failed_state: None,
        }
    }

    /// Report a pipeline error, optionally tagged with the active state.
    pub fn from_error(err: &TriageError, failed_state: Option<PipelineState>) -> Self {
        let message = match (err, failed_state) {
            (TriageError::InvalidTicket(_), _) => "Ticket rejected".to_string(),
            (_, Some(state)) => format!("Decision pipeline failed while {}", state.describe()),
            (_, None) => "Decision pipeline failed".to_string(),
        };
        Self {
            error_code: err.error_code().to_string(),
            message,
            detail: Some(err.to_string()),
            failed_state,
        }
    }
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error_code, self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

impl std::error::Error for PipelineFailure {}
