//! Pipeline State Machine — explicit states and legal transition guards.
//!
//! Every triage run walks a single linear path:
//!
//! ```text
//! RETRIEVING_FOR_DECISION → GENERATING_DECISION → RETRIEVING_FOR_EVAL
//!     → GENERATING_EVALUATION → PERSISTING → DONE
//! ```
//!
//! `FAILED` is reachable from every non-terminal state. There are no retry
//! edges: a failure ends the run and nothing has been persisted yet.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// The set of pipeline states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    /// Fetching evidence for the decision call.
    RetrievingForDecision,
    /// Waiting on the decision model call.
    GeneratingDecision,
    /// Re-fetching evidence for the evaluation call.
    RetrievingForEval,
    /// Waiting on the evaluation model call.
    GeneratingEvaluation,
    /// Writing the run record.
    Persisting,
    /// Run recorded — terminal state.
    Done,
    /// Aborted — terminal state.
    Failed,
}

impl PipelineState {
    /// Whether this is a terminal state (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Lower-case phrase for log lines and failure messages.
    pub fn describe(self) -> &'static str {
        match self {
            Self::RetrievingForDecision => "retrieving evidence for the decision",
            Self::GeneratingDecision => "generating the decision",
            Self::RetrievingForEval => "retrieving evidence for the evaluation",
            Self::GeneratingEvaluation => "generating the evaluation",
            Self::Persisting => "persisting the run",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetrievingForDecision => write!(f, "RETRIEVING_FOR_DECISION"),
            Self::GeneratingDecision => write!(f, "GENERATING_DECISION"),
            Self::RetrievingForEval => write!(f, "RETRIEVING_FOR_EVAL"),
            Self::GeneratingEvaluation => write!(f, "GENERATING_EVALUATION"),
            Self::Persisting => write!(f, "PERSISTING"),
            Self::Done => write!(f, "DONE"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

fn is_legal_transition(from: PipelineState, to: PipelineState) -> bool {
    use PipelineState::*;

    if to == Failed && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (RetrievingForDecision, GeneratingDecision)
            | (GeneratingDecision, RetrievingForEval)
            | (RetrievingForEval, GeneratingEvaluation)
            | (GeneratingEvaluation, Persisting)
            | (Persisting, Done)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: PipelineState,
    pub to: PipelineState,
    /// Milliseconds since the state machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone)]
pub struct IllegalTransition {
    pub from: PipelineState,
    pub to: PipelineState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal state transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Tracks the current state of one triage run and its transition log.
pub struct StateMachine {
    current: PipelineState,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StateMachine {
    /// Create a new state machine starting at `RetrievingForDecision`.
    pub fn new() -> Self {
        Self {
            current: PipelineState::RetrievingForDecision,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> PipelineState {
        self.current
    }

    /// Attempt to advance to the next state.
    pub fn advance(
        &mut self,
        to: PipelineState,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        let record = TransitionRecord {
            from: self.current,
            to,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };

        tracing::debug!(
            from = %self.current,
            to = %to,
            elapsed_ms = record.elapsed_ms,
            "Pipeline transition"
        );

        self.transitions.push(record);
        self.current = to;
        Ok(())
    }

    /// Transition to `Failed` from any non-terminal state.
    pub fn fail(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(PipelineState::Failed, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.created_at.elapsed().as_millis() as u64
    }

    /// One-line history, e.g. `RETRIEVING_FOR_DECISION → DONE (12ms, 5 transitions) [...]`.
    pub fn summary(&self) -> String {
        let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        let mut out = format!(
            "{} → {} ({}ms, {} transitions)",
            PipelineState::RetrievingForDecision,
            self.current,
            self.elapsed_ms(),
            self.transitions.len(),
        );
        if !states.is_empty() {
            out.push_str(&format!(" [{}]", states.join(" → ")));
        }
        out
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
