//! Shared fakes for pipeline, ingestion and HTTP tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use mockall::mock;
use triage_agents::agents::decider::parse_decision_reply;
use triage_agents::agents::evaluator::parse_evaluation_reply;
use triage_agents::agents::{DecisionEvaluator, DecisionGenerator};
use triage_agents::embeddings::Embedder;
use triage_agents::index::{SearchHit, VectorIndex};
use triage_agents::ingest::{IngestReport, Ingestor};
use triage_agents::orchestrator::TriagePipeline;
use triage_agents::retriever::KbRetriever;
use triage_agents::store::RunStore;
use triage_core::{
    Decision, Evaluation, EvidenceBatch, Run, RunId, Stage, TriageError, TriageResult,
};

pub const MODEL: &str = "test-model";
pub const TOP_K: usize = 4;

pub const BILLING_TICKET: &str =
    "I was charged twice for my subscription this month. Please fix this.";

// ── Retrieval ───────────────────────────────────────────────────────────────

/// Index returning a fixed hit list and counting searches.
pub struct StaticIndex {
    hits: Vec<SearchHit>,
    searches: Mutex<usize>,
}

impl StaticIndex {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            searches: Mutex::new(0),
        }
    }

    pub fn searches(&self) -> usize {
        *self.searches.lock().unwrap()
    }
}

#[async_trait]
impl VectorIndex for StaticIndex {
    async fn search(&self, _query: &str, k: usize) -> Result<Vec<SearchHit>> {
        *self.searches.lock().unwrap() += 1;
        Ok(self.hits.iter().take(k).cloned().collect())
    }
}

/// Index whose backing service is down.
pub struct DownIndex;

#[async_trait]
impl VectorIndex for DownIndex {
    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<SearchHit>> {
        anyhow::bail!("vector store unreachable")
    }
}

/// Index that serves `healthy` searches, then goes down.
pub struct FailingAfterIndex {
    inner: StaticIndex,
    healthy: usize,
}

impl FailingAfterIndex {
    pub fn new(hits: Vec<SearchHit>, healthy: usize) -> Self {
        Self {
            inner: StaticIndex::new(hits),
            healthy,
        }
    }

    pub fn searches(&self) -> usize {
        self.inner.searches()
    }
}

#[async_trait]
impl VectorIndex for FailingAfterIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let hits = self.inner.search(query, k).await?;
        if self.inner.searches() > self.healthy {
            anyhow::bail!("vector store connection reset");
        }
        Ok(hits)
    }
}

pub fn hit(source: &str, content: &str) -> SearchHit {
    SearchHit {
        content: content.into(),
        source: source.into(),
        score: 0.9,
    }
}

pub fn billing_hits() -> Vec<SearchHit> {
    vec![
        hit(
            "knowledge_base/refund_policy.md",
            "Duplicate charges are refunded in full once Billing confirms the second charge.",
        ),
        hit(
            "knowledge_base/sla.md",
            "High urgency billing tickets receive a first response within 4 hours.",
        ),
    ]
}

// ── Generation ──────────────────────────────────────────────────────────────

/// Decision reply JSON with the given route and citations.
pub fn decision_reply(route: &str, citations: &[&str], draft: &str) -> String {
    serde_json::json!({
        "decision": "route",
        "route": route,
        "urgency": "high",
        "confidence": 0.85,
        "reasons": ["Customer reports a duplicate charge"],
        "draft_response": draft,
        "citations": citations,
    })
    .to_string()
}

pub fn billing_reply() -> String {
    decision_reply(
        "billing",
        &["S1"],
        "Sorry about the duplicate charge. Our billing team will confirm it and refund the extra payment.",
    )
}

/// Generator that parses a canned reply through the real decision validator.
pub struct ScriptedGenerator {
    reply: String,
    /// Snippet ids seen per call.
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedGenerator {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl DecisionGenerator for ScriptedGenerator {
    async fn decide(&self, _ticket_text: &str, evidence: &EvidenceBatch) -> TriageResult<Decision> {
        self.calls
            .lock()
            .unwrap()
            .push(evidence.ids().map(|id| id.to_string()).collect());
        parse_decision_reply(&self.reply, evidence)
    }
}

/// Generator that skips validation and returns a prebuilt decision.
pub struct RawGenerator(pub Decision);

#[async_trait]
impl DecisionGenerator for RawGenerator {
    async fn decide(
        &self,
        _ticket_text: &str,
        _evidence: &EvidenceBatch,
    ) -> TriageResult<Decision> {
        Ok(self.0.clone())
    }
}

/// Evaluator that parses a canned reply, or fails like a timed-out call.
pub struct ScriptedEvaluator {
    reply: Option<String>,
    /// (snippet ids, decision) per call.
    pub calls: Mutex<Vec<(Vec<String>, Decision)>>,
}

impl ScriptedEvaluator {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl DecisionEvaluator for ScriptedEvaluator {
    async fn evaluate(
        &self,
        _ticket_text: &str,
        evidence: &EvidenceBatch,
        decision: &Decision,
    ) -> TriageResult<Evaluation> {
        self.calls.lock().unwrap().push((
            evidence.ids().map(|id| id.to_string()).collect(),
            decision.clone(),
        ));
        match &self.reply {
            Some(reply) => parse_evaluation_reply(reply),
            None => Err(TriageError::generation(
                Stage::Evaluation,
                "request timed out after 60s",
            )),
        }
    }
}

pub fn passing_eval_reply() -> String {
    r#"{"passed": true, "score": 0.9, "issues": [], "suggested_fix": ""}"#.to_string()
}

// ── Embedding ───────────────────────────────────────────────────────────────

const VOCAB: [&str; 7] = ["refund", "charge", "billing", "outage", "sla", "password", "login"];

/// Deterministic keyword-count embedder.
pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                let mut v: Vec<f32> = VOCAB
                    .iter()
                    .map(|word| lower.matches(word).count() as f32)
                    .collect();
                v.push(0.1);
                v
            })
            .collect())
    }

    fn model(&self) -> &str {
        "keyword-test"
    }
}

// ── Ingestion ───────────────────────────────────────────────────────────────

pub struct FakeIngestor {
    pub result: TriageResult<IngestReport>,
}

#[async_trait]
impl Ingestor for FakeIngestor {
    async fn ingest(&self) -> TriageResult<IngestReport> {
        self.result.clone()
    }
}

// ── Mocks ───────────────────────────────────────────────────────────────────

mock! {
    pub Store {}

    #[async_trait]
    impl RunStore for Store {
        async fn record(
            &self,
            ticket_text: &str,
            decision: &Decision,
            evaluation: &Evaluation,
            model_version: &str,
        ) -> TriageResult<RunId>;

        async fn list_recent(&self, limit: i64) -> TriageResult<Vec<Run>>;
    }
}

mock! {
    pub Evaluator {}

    #[async_trait]
    impl DecisionEvaluator for Evaluator {
        async fn evaluate(
            &self,
            ticket_text: &str,
            evidence: &EvidenceBatch,
            decision: &Decision,
        ) -> TriageResult<Evaluation>;
    }
}

pub fn pipeline(
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn DecisionGenerator>,
    evaluator: Arc<dyn DecisionEvaluator>,
    store: Arc<dyn RunStore>,
) -> TriagePipeline {
    TriagePipeline::new(
        Arc::new(KbRetriever::new(index)),
        generator,
        evaluator,
        store,
        TOP_K,
        MODEL,
    )
}
