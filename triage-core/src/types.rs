//! Triage domain types.
//!
//! ```text
//! retrieve ──► EvidenceBatch { batch_id, [Snippet S1..Sn] }
//!                  │
//! decide   ──► DecisionOutput ──validate──► Decision (citations ⊆ batch ids)
//!                  │
//! evaluate ──► Evaluation
//!                  │
//! record   ──► Run { id, ticket_text, decision, evaluation, model_version, created_at }
//! ```
//!
//! Snippet ids are positional within one retrieval call. They are only
//! meaningful together with the `EvidenceBatch` that produced them.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TriageError;

// ── Ticket ──────────────────────────────────────────────────────────────────

/// Free-text ticket content that passed the basic length constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TicketText(String);

impl TicketText {
    /// Minimum ticket length in characters.
    pub const MIN_CHARS: usize = 5;
    /// Maximum ticket length in characters.
    pub const MAX_CHARS: usize = 4000;

    /// Validate raw caller input.
    pub fn parse(raw: impl Into<String>) -> Result<Self, TriageError> {
        let raw = raw.into();
        let chars = raw.chars().count();
        if raw.trim().is_empty() {
            return Err(TriageError::InvalidTicket(
                "ticket_text must not be blank".into(),
            ));
        }
        if chars < Self::MIN_CHARS {
            return Err(TriageError::InvalidTicket(format!(
                "ticket_text has {chars} characters, minimum is {}",
                Self::MIN_CHARS
            )));
        }
        if chars > Self::MAX_CHARS {
            return Err(TriageError::InvalidTicket(format!(
                "ticket_text has {chars} characters, maximum is {}",
                Self::MAX_CHARS
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

}

impl AsRef<str> for TicketText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ── Evidence ────────────────────────────────────────────────────────────────

/// Positional snippet label (`S1`, `S2`, …) scoped to one retrieval batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SnippetId(String);

impl SnippetId {
    /// Label for the snippet at a zero-based position in its batch.
    pub fn positional(index: usize) -> Self {
        Self(format!("S{}", index + 1))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnippetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A labeled knowledge-base excerpt used as evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub id: SnippetId,
    /// Origin label, usually the knowledge-base file name.
    pub source: String,
    pub text: String,
}

/// Identity of a single retrieval call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(Uuid);

impl BatchId {
    fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered snippets returned by one retrieval call.
///
/// Ids are assigned here and nowhere else, so two batches never share an
/// id space even when both contain an `S1`.
#[derive(Debug, Clone)]
pub struct EvidenceBatch {
    batch_id: BatchId,
    snippets: Vec<Snippet>,
}

impl EvidenceBatch {
    /// Build a batch from `(source, text)` hits in relevance order.
    pub fn from_hits<I>(hits: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let snippets = hits
            .into_iter()
            .enumerate()
            .map(|(i, (source, text))| Snippet {
                id: SnippetId::positional(i),
                source,
                text,
            })
            .collect();
        Self {
            batch_id: BatchId::fresh(),
            snippets,
        }
    }

    /// A batch with no evidence (nothing relevant, or nothing ingested).
    pub fn empty() -> Self {
        Self::from_hits(std::iter::empty())
    }

    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    pub fn snippets(&self) -> &[Snippet] {
        &self.snippets
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Snippet> {
        self.snippets.iter().find(|s| s.id.as_str() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = &SnippetId> {
        self.snippets.iter().map(|s| &s.id)
    }
}

// ── Decision ────────────────────────────────────────────────────────────────

/// What should happen next with the ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    AutoResolve,
    Escalate,
    Route,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AutoResolve => write!(f, "auto_resolve"),
            Self::Escalate => write!(f, "escalate"),
            Self::Route => write!(f, "route"),
        }
    }
}

/// Owning queue for the ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Billing,
    Tech,
    Account,
    Sales,
    Other,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Billing => write!(f, "billing"),
            Self::Tech => write!(f, "tech"),
            Self::Account => write!(f, "account"),
            Self::Sales => write!(f, "sales"),
            Self::Other => write!(f, "other"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Decision fields as requested from the generation service.
///
/// This is the schema handed to the model. It becomes a [`Decision`] only
/// after [`crate::validation::validate_decision`] accepts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DecisionOutput {
    pub decision: Action,
    pub route: Route,
    pub urgency: Urgency,
    /// Confidence in the decision, 0.0 to 1.0.
    #[schemars(range(min = 0.0, max = 1.0))]
    pub confidence: f64,
    /// Between 1 and 6 short justifications.
    #[schemars(length(min = 1, max = 6))]
    pub reasons: Vec<String>,
    /// Reply to the customer, 10 to 2000 characters.
    #[schemars(length(min = 10, max = 2000))]
    pub draft_response: String,
    /// Snippet ids (e.g. "S1") that support the decision or draft.
    #[serde(default)]
    pub citations: Vec<String>,
}

/// A validated triage decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub decision: Action,
    pub route: Route,
    pub urgency: Urgency,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub draft_response: String,
    #[serde(default)]
    pub citations: Vec<SnippetId>,
    /// The evidence the generator was given for this decision.
    #[serde(default)]
    pub retrieved_snippets: Vec<Snippet>,
}

// ── Evaluation ──────────────────────────────────────────────────────────────

/// Structured critique of a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Evaluation {
    pub passed: bool,
    /// Overall quality score, 0.0 to 1.0.
    #[schemars(range(min = 0.0, max = 1.0))]
    pub score: f64,
    /// At most 10 concrete problems.
    #[serde(default)]
    #[schemars(length(max = 10))]
    pub issues: Vec<String>,
    /// How to fix the decision, at most 1000 characters.
    #[serde(default)]
    #[schemars(length(max = 1000))]
    pub suggested_fix: String,
}

// ── Run ─────────────────────────────────────────────────────────────────────

/// Store-assigned run identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RunId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One persisted ticket/decision/evaluation triple. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub ticket_text: String,
    pub decision: Decision,
    pub evaluation: Evaluation,
    pub model_version: String,
    pub created_at: DateTime<Utc>,
}
