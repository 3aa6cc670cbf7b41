//! Triage pipeline: retrieve → decide → re-retrieve → evaluate → persist.
//!
//! Every stage runs at most once, strictly in order. The first failure moves
//! the state machine to `FAILED` and is reported as a [`PipelineFailure`];
//! nothing is persisted unless every earlier stage succeeded.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use triage_core::validation::{check_decision, describe};
use triage_core::{
    Decision, Evaluation, PipelineFailure, PipelineState, Run, RunId, Stage, StateMachine,
    TicketText, TriageError, TriageResult,
};

use crate::agents::{DecisionEvaluator, DecisionGenerator};
use crate::prompts::PROMPT_VERSION;
use crate::retriever::Retriever;
use crate::store::{clamp_history_limit, RunStore};

/// Successful pipeline result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageOutcome {
    pub run_id: RunId,
    pub decision: Decision,
    pub evaluation: Evaluation,
}

pub struct TriagePipeline {
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn DecisionGenerator>,
    evaluator: Arc<dyn DecisionEvaluator>,
    store: Arc<dyn RunStore>,
    top_k: usize,
    model_version: String,
}

impl TriagePipeline {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn DecisionGenerator>,
        evaluator: Arc<dyn DecisionEvaluator>,
        store: Arc<dyn RunStore>,
        top_k: usize,
        model_version: impl Into<String>,
    ) -> Self {
        Self {
            retriever,
            generator,
            evaluator,
            store,
            top_k,
            model_version: model_version.into(),
        }
    }

    /// Run the full pipeline for one ticket.
    ///
    /// Invalid ticket text is rejected before any collaborator is called.
    pub async fn decide_ticket(&self, ticket_text: &str) -> Result<TriageOutcome, PipelineFailure> {
        let ticket = TicketText::parse(ticket_text).map_err(|err| {
            warn!(error = %err, "Ticket rejected");
            PipelineFailure::from_error(&err, None)
        })?;

        let mut sm = StateMachine::new();
        match self.run_stages(&ticket, &mut sm).await {
            Ok(outcome) => {
                info!(
                    run_id = %outcome.run_id,
                    decision = %outcome.decision.decision,
                    route = %outcome.decision.route,
                    citations = outcome.decision.citations.len(),
                    passed = outcome.evaluation.passed,
                    score = outcome.evaluation.score,
                    prompt_version = PROMPT_VERSION,
                    summary = %sm.summary(),
                    "Ticket triaged"
                );
                Ok(outcome)
            }
            Err(err) => {
                let failed_state = sm.current();
                if let Err(e) = sm.fail(&err.to_string()) {
                    warn!(error = %e, "Could not record pipeline failure transition");
                }
                warn!(
                    state = %failed_state,
                    code = err.error_code(),
                    error = %err,
                    elapsed_ms = sm.elapsed_ms(),
                    "Triage pipeline failed"
                );
                Err(PipelineFailure::from_error(&err, Some(failed_state)))
            }
        }
    }

    async fn run_stages(
        &self,
        ticket: &TicketText,
        sm: &mut StateMachine,
    ) -> TriageResult<TriageOutcome> {
        let text = ticket.as_str();

        let evidence = self.retriever.retrieve(text, self.top_k).await?;
        step(sm, PipelineState::GeneratingDecision, &format!("{} snippets", evidence.len()))?;

        let decision = self.generator.decide(text, &evidence).await?;
        // Generators are external seams; never hand an unchecked decision to the evaluator.
        check_decision(&decision, &evidence)
            .map_err(|v| TriageError::generation(Stage::Decision, describe(&v)))?;
        step(
            sm,
            PipelineState::RetrievingForEval,
            &format!("{} citations", decision.citations.len()),
        )?;

        let eval_evidence = self.retriever.retrieve(text, self.top_k).await?;
        step(
            sm,
            PipelineState::GeneratingEvaluation,
            &format!("{} snippets", eval_evidence.len()),
        )?;

        let evaluation = self.evaluator.evaluate(text, &eval_evidence, &decision).await?;
        step(sm, PipelineState::Persisting, &format!("score {:.2}", evaluation.score))?;

        let run_id = self
            .store
            .record(text, &decision, &evaluation, &self.model_version)
            .await?;
        step(sm, PipelineState::Done, &format!("run {run_id}"))?;

        Ok(TriageOutcome {
            run_id,
            decision,
            evaluation,
        })
    }

    /// Recent runs, newest first.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<Run>, PipelineFailure> {
        self.store
            .list_recent(clamp_history_limit(limit))
            .await
            .map_err(|err| {
                warn!(error = %err, "History fetch failed");
                PipelineFailure::new(
                    err.error_code(),
                    "History fetch failed",
                    Some(err.to_string()),
                )
            })
    }
}

fn step(sm: &mut StateMachine, to: PipelineState, reason: &str) -> TriageResult<()> {
    sm.advance(to, Some(reason))
        .map_err(|e| TriageError::Internal(e.to_string()))
}
