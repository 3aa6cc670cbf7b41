//! System instructions and user messages for the two generation passes.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever preamble content changes.
//! The version is logged with every pipeline run so a stored decision can be
//! traced back to the instructions that produced it.

use schemars::{schema_for, JsonSchema};
use serde_json::{json, Value};
use triage_core::evidence::format_snippets;
use triage_core::{Decision, DecisionOutput, Evaluation, EvidenceBatch};

/// Prompt version. Bump on any preamble content change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// Decision pass preamble.
///
/// The citation and conservatism rules are instructions only; the
/// validator in `triage_core::validation` is what actually enforces the
/// citation contract.
pub const DECIDE_PREAMBLE: &str = "\
You are Sentinel, an enterprise operations assistant for support triage.
Your job: decide what action should happen next for this ticket.

You are given Knowledge Base snippets (internal policies and SOPs).
Rules:
- Prefer KB policy/SOP over guesswork.
- If you use any snippet to justify your decision or draft response, you MUST cite it.
- citations must be a list of snippet IDs like [\"S1\",\"S3\"].
- If no snippet is relevant, citations can be [].

Be conservative:
- If uncertain, choose \"escalate\" with lower confidence.
- Never promise actions you cannot guarantee (e.g. \"I refunded you\").
- Draft response must be professional and concise.

Respond with a single JSON object that matches the required schema exactly.";

/// Evaluation pass preamble.
pub const EVAL_PREAMBLE: &str = "\
You are Sentinel QA, an enterprise evaluator.

Evaluate the decision and response for:
1) Intent match: decision/route/urgency align with the ticket
2) Professional tone
3) No false promises or hallucinated actions
4) Reasons support the decision
5) Coherence of urgency and confidence
6) Groundedness: if policy/SOP claims are made, they must be supported by cited KB snippets.
   - If citations exist, they should be plausible for the claims.
   - If citations are empty but policy details appear, flag it.

Be strict. Provide issues clearly and suggest a fix.
Respond with a single JSON object that matches the required schema exactly.";

fn schema_block<T: JsonSchema>() -> String {
    let schema = schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string())
}

/// Full decision preamble including the output schema.
pub fn decide_instructions() -> String {
    format!(
        "{DECIDE_PREAMBLE}\n\nJSON schema:\n{}",
        schema_block::<DecisionOutput>()
    )
}

/// Full evaluation preamble including the output schema.
pub fn evaluate_instructions() -> String {
    format!(
        "{EVAL_PREAMBLE}\n\nJSON schema:\n{}",
        schema_block::<Evaluation>()
    )
}

/// Agent `additional_params` that constrain the reply to `T`'s JSON schema.
///
/// Flattened into the chat-completions body as an OpenAI `json_schema`
/// response format. Replies are still validated after parsing.
pub fn response_format<T: JsonSchema>(name: &str) -> Value {
    json!({
        "response_format": {
            "type": "json_schema",
            "json_schema": {
                "name": name,
                "schema": schema_for!(T),
            }
        }
    })
}

/// User message for the decision pass.
pub fn decide_message(ticket_text: &str, evidence: &EvidenceBatch) -> String {
    format!(
        "Ticket:\n{ticket_text}\n\n\
         Knowledge Base Snippets:\n{}\n\n\
         Return JSON that matches the schema. Remember: cite snippet IDs you used.",
        format_snippets(evidence)
    )
}

/// User message for the evaluation pass.
pub fn evaluate_message(
    ticket_text: &str,
    evidence: &EvidenceBatch,
    decision: &Decision,
) -> String {
    let decision_json =
        serde_json::to_string(decision).unwrap_or_else(|e| format!("<unserializable: {e}>"));
    format!(
        "Ticket:\n{ticket_text}\n\n\
         Knowledge Base Snippets:\n{}\n\n\
         Decision JSON:\n{decision_json}\n\n\
         Evaluate strictly. If citations are missing but policy claims appear, flag it.",
        format_snippets(evidence)
    )
}
