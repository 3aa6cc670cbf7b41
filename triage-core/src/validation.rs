//! Post-generation validation of model output.
//!
//! The generation service only follows the schema on a best-effort basis.
//! Everything here is checked in code before a value is allowed to flow to
//! the next stage. Output that fails is rejected (fail-closed); it is never
//! repaired into something the model did not say.

use std::collections::HashSet;
use std::fmt;

use crate::types::{Decision, DecisionOutput, Evaluation, EvidenceBatch, SnippetId};

pub const MIN_REASONS: usize = 1;
pub const MAX_REASONS: usize = 6;
pub const DRAFT_MIN_CHARS: usize = 10;
pub const DRAFT_MAX_CHARS: usize = 2000;
pub const MAX_ISSUES: usize = 10;
pub const SUGGESTED_FIX_MAX_CHARS: usize = 1000;

/// A single broken invariant.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    ConfidenceOutOfRange(f64),
    ReasonCount(usize),
    DraftLength(usize),
    /// Cited id that is not in the evidence batch given to the generator.
    UnknownCitation(String),
    ScoreOutOfRange(f64),
    TooManyIssues(usize),
    SuggestedFixLength(usize),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfidenceOutOfRange(v) => write!(f, "confidence {v} outside [0, 1]"),
            Self::ReasonCount(n) => {
                write!(f, "{n} reasons, expected {MIN_REASONS}..={MAX_REASONS}")
            }
            Self::DraftLength(n) => write!(
                f,
                "draft_response has {n} characters, expected {DRAFT_MIN_CHARS}..={DRAFT_MAX_CHARS}"
            ),
            Self::UnknownCitation(id) => {
                write!(f, "citation {id:?} does not match any supplied snippet")
            }
            Self::ScoreOutOfRange(v) => write!(f, "score {v} outside [0, 1]"),
            Self::TooManyIssues(n) => write!(f, "{n} issues, at most {MAX_ISSUES} allowed"),
            Self::SuggestedFixLength(n) => write!(
                f,
                "suggested_fix has {n} characters, at most {SUGGESTED_FIX_MAX_CHARS} allowed"
            ),
        }
    }
}

/// Join violations into one detail string.
pub fn describe(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn unit_interval(v: f64) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

/// Turn raw model output into a [`Decision`] bound to `evidence`.
///
/// Citations are trimmed and de-duplicated (first occurrence wins) before
/// the referential check. The returned decision carries the batch's
/// snippets as `retrieved_snippets`.
pub fn validate_decision(
    output: DecisionOutput,
    evidence: &EvidenceBatch,
) -> Result<Decision, Vec<Violation>> {
    let mut violations =
        field_violations(&output.reasons, &output.draft_response, output.confidence);

    let mut seen = HashSet::new();
    let mut citations: Vec<SnippetId> = Vec::new();
    for raw in &output.citations {
        let id = raw.trim();
        if !seen.insert(id) {
            continue;
        }
        match evidence.get(id) {
            Some(snippet) => citations.push(snippet.id.clone()),
            None => violations.push(Violation::UnknownCitation(id.to_string())),
        }
    }

    if !violations.is_empty() {
        return Err(violations);
    }

    Ok(Decision {
        decision: output.decision,
        route: output.route,
        urgency: output.urgency,
        confidence: output.confidence,
        reasons: output.reasons,
        draft_response: output.draft_response,
        citations,
        retrieved_snippets: evidence.snippets().to_vec(),
    })
}

/// Re-check an already built decision against the evidence it claims.
pub fn check_decision(decision: &Decision, evidence: &EvidenceBatch) -> Result<(), Vec<Violation>> {
    let mut violations =
        field_violations(&decision.reasons, &decision.draft_response, decision.confidence);
    violations.extend(
        decision
            .citations
            .iter()
            .filter(|id| !evidence.contains(id.as_str()))
            .map(|id| Violation::UnknownCitation(id.to_string())),
    );
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn field_violations(reasons: &[String], draft: &str, confidence: f64) -> Vec<Violation> {
    let mut violations = Vec::new();
    if !unit_interval(confidence) {
        violations.push(Violation::ConfidenceOutOfRange(confidence));
    }
    if !(MIN_REASONS..=MAX_REASONS).contains(&reasons.len()) {
        violations.push(Violation::ReasonCount(reasons.len()));
    }
    let draft_chars = draft.chars().count();
    if !(DRAFT_MIN_CHARS..=DRAFT_MAX_CHARS).contains(&draft_chars) {
        violations.push(Violation::DraftLength(draft_chars));
    }
    violations
}

/// Drop issues beyond [`MAX_ISSUES`]. Returns how many were dropped.
pub fn truncate_issues(evaluation: &mut Evaluation) -> usize {
    let dropped = evaluation.issues.len().saturating_sub(MAX_ISSUES);
    evaluation.issues.truncate(MAX_ISSUES);
    dropped
}

/// Check evaluation bounds.
pub fn validate_evaluation(evaluation: Evaluation) -> Result<Evaluation, Vec<Violation>> {
    let mut violations = Vec::new();
    if !unit_interval(evaluation.score) {
        violations.push(Violation::ScoreOutOfRange(evaluation.score));
    }
    if evaluation.issues.len() > MAX_ISSUES {
        violations.push(Violation::TooManyIssues(evaluation.issues.len()));
    }
    let fix_chars = evaluation.suggested_fix.chars().count();
    if fix_chars > SUGGESTED_FIX_MAX_CHARS {
        violations.push(Violation::SuggestedFixLength(fix_chars));
    }
    if violations.is_empty() {
        Ok(evaluation)
    } else {
        Err(violations)
    }
}
