//! Decision agent: ticket + evidence in, validated [`Decision`] out.

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;
use tracing::debug;
use triage_core::validation::{describe, validate_decision};
use triage_core::{Decision, DecisionOutput, EvidenceBatch, Stage, TriageError, TriageResult};

use super::{extract_json_block, DecisionGenerator, OaiAgent};
use crate::prompts;

/// Build the decision agent.
///
/// No tools. Output is schema-constrained; the reply is still parsed fail-closed.
pub fn build_decider(client: &openai::CompletionsClient, model: &str) -> OaiAgent {
    client
        .agent(model)
        .name("decider")
        .description("Support triage decider. Returns a decision JSON object with citations.")
        .preamble(&prompts::decide_instructions())
        .temperature(0.2)
        .additional_params(prompts::response_format::<DecisionOutput>("triage_decision"))
        .build()
}

/// Parse a decider reply into a decision bound to `evidence`.
pub fn parse_decision_reply(reply: &str, evidence: &EvidenceBatch) -> TriageResult<Decision> {
    let fail = |msg: String| TriageError::generation(Stage::Decision, msg);

    let json =
        extract_json_block(reply).ok_or_else(|| fail("reply contained no JSON object".into()))?;
    let output: DecisionOutput = serde_json::from_str(json)
        .map_err(|e| fail(format!("reply does not match decision schema: {e}")))?;
    validate_decision(output, evidence).map_err(|violations| fail(describe(&violations)))
}

/// [`DecisionGenerator`] backed by a rig agent.
pub struct LlmDecisionGenerator {
    agent: OaiAgent,
}

impl LlmDecisionGenerator {
    pub fn new(agent: OaiAgent) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl DecisionGenerator for LlmDecisionGenerator {
    async fn decide(&self, ticket_text: &str, evidence: &EvidenceBatch) -> TriageResult<Decision> {
        let message = prompts::decide_message(ticket_text, evidence);
        let reply: String = self
            .agent
            .prompt(message)
            .await
            .map_err(|e| TriageError::generation(Stage::Decision, e.to_string()))?;
        debug!(reply_len = reply.len(), snippets = evidence.len(), "Decider replied");
        parse_decision_reply(&reply, evidence)
    }
}
