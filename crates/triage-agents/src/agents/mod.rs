//! Generation agents for the two model passes.
//!
//! Each agent is built via a free function that returns an [`OaiAgent`].
//! The pipeline only sees the [`DecisionGenerator`] and [`DecisionEvaluator`]
//! seams, so tests can swap the model out entirely.

pub mod decider;
pub mod evaluator;

use anyhow::Result;
use async_trait::async_trait;
use rig::agent::Agent;
use rig::providers::openai;
use triage_core::{Decision, Evaluation, EvidenceBatch, TriageResult};

use crate::config::{ClientSet, TriageConfig};

pub use decider::LlmDecisionGenerator;
pub use evaluator::LlmDecisionEvaluator;

pub type OaiAgent = Agent<openai::completion::CompletionModel>;

/// Produces a validated decision from a ticket and its evidence.
#[async_trait]
pub trait DecisionGenerator: Send + Sync {
    async fn decide(&self, ticket_text: &str, evidence: &EvidenceBatch) -> TriageResult<Decision>;
}

/// Critiques a decision against freshly retrieved evidence.
#[async_trait]
pub trait DecisionEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        ticket_text: &str,
        evidence: &EvidenceBatch,
        decision: &Decision,
    ) -> TriageResult<Evaluation>;
}

/// Builds both agents from a `TriageConfig`.
pub struct AgentFactory {
    pub clients: ClientSet,
    pub config: TriageConfig,
}

impl AgentFactory {
    pub fn new(config: &TriageConfig) -> Result<Self> {
        let clients = ClientSet::from_config(config)?;
        Ok(Self {
            clients,
            config: config.clone(),
        })
    }

    pub fn build_decider(&self) -> LlmDecisionGenerator {
        LlmDecisionGenerator::new(decider::build_decider(
            &self.clients.llm,
            &self.config.llm_endpoint.model,
        ))
    }

    pub fn build_evaluator(&self) -> LlmDecisionEvaluator {
        LlmDecisionEvaluator::new(evaluator::build_evaluator(
            &self.clients.llm,
            &self.config.llm_endpoint.model,
        ))
    }
}

/// Locate the JSON object in a model reply.
///
/// Prefers a ```json fenced block, then falls back to the first `{` through
/// the last `}`.
pub(crate) fn extract_json_block(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let json_start = start + 7;
        if let Some(end) = text[json_start..].find("```") {
            return Some(text[json_start..json_start + end].trim());
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}
