//! Context assembly: how evidence is presented to the generation service.
//!
//! Each snippet is rendered as `[S1] (source) text`, separated by a blank
//! line. The literal `None` stands in for an empty batch so the model can
//! tell "no evidence" apart from a formatting problem.

use crate::types::EvidenceBatch;

/// Placeholder used when a batch has no snippets.
pub const NO_EVIDENCE: &str = "None";

/// Render a batch for inclusion in a prompt.
pub fn format_snippets(batch: &EvidenceBatch) -> String {
    if batch.is_empty() {
        return NO_EVIDENCE.to_string();
    }
    batch
        .snippets()
        .iter()
        .map(|s| format!("[{}] ({}) {}", s.id, s.source, s.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
