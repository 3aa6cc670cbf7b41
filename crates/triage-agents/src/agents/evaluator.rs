//! Evaluation agent: critiques a decision against re-retrieved evidence.

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;
use tracing::{debug, warn};
use triage_core::validation::{describe, truncate_issues, validate_evaluation, MAX_ISSUES};
use triage_core::{Decision, Evaluation, EvidenceBatch, Stage, TriageError, TriageResult};

use super::{extract_json_block, DecisionEvaluator, OaiAgent};
use crate::prompts;

/// Build the evaluator agent. Runs cooler than the decider.
pub fn build_evaluator(client: &openai::CompletionsClient, model: &str) -> OaiAgent {
    client
        .agent(model)
        .name("evaluator")
        .description("Strict QA evaluator for triage decisions. Returns an evaluation JSON object.")
        .preamble(&prompts::evaluate_instructions())
        .temperature(0.1)
        .additional_params(prompts::response_format::<Evaluation>("triage_evaluation"))
        .build()
}

/// Parse an evaluator reply.
///
/// Extra issues beyond [`MAX_ISSUES`] are dropped with a warning; any other
/// bound violation fails the call.
pub fn parse_evaluation_reply(reply: &str) -> TriageResult<Evaluation> {
    let fail = |msg: String| TriageError::generation(Stage::Evaluation, msg);

    let json =
        extract_json_block(reply).ok_or_else(|| fail("reply contained no JSON object".into()))?;
    let mut evaluation: Evaluation = serde_json::from_str(json)
        .map_err(|e| fail(format!("reply does not match evaluation schema: {e}")))?;

    let dropped = truncate_issues(&mut evaluation);
    if dropped > 0 {
        warn!(dropped, max = MAX_ISSUES, "Evaluator returned too many issues, truncating");
    }
    validate_evaluation(evaluation).map_err(|violations| fail(describe(&violations)))
}

/// [`DecisionEvaluator`] backed by a rig agent.
pub struct LlmDecisionEvaluator {
    agent: OaiAgent,
}

impl LlmDecisionEvaluator {
    pub fn new(agent: OaiAgent) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl DecisionEvaluator for LlmDecisionEvaluator {
    async fn evaluate(
        &self,
        ticket_text: &str,
        evidence: &EvidenceBatch,
        decision: &Decision,
    ) -> TriageResult<Evaluation> {
        let message = prompts::evaluate_message(ticket_text, evidence, decision);
        let reply: String = self
            .agent
            .prompt(message)
            .await
            .map_err(|e| TriageError::generation(Stage::Evaluation, e.to_string()))?;
        debug!(reply_len = reply.len(), "Evaluator replied");
        parse_evaluation_reply(&reply)
    }
}
