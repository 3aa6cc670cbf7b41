//! End-to-end pipeline behavior with in-process fakes.

mod common;

use std::sync::Arc;

use common::*;
use triage_agents::store::{MemoryRunStore, RunStore, MAX_HISTORY_LIMIT};
use triage_core::{
    Action, Decision, Evaluation, PipelineState, Route, SnippetId, TriageError, Urgency,
};

#[tokio::test]
async fn test_duplicate_billing_routes_to_billing_with_citation() {
    let index = Arc::new(StaticIndex::new(billing_hits()));
    let generator = Arc::new(ScriptedGenerator::new(billing_reply()));
    let evaluator = Arc::new(ScriptedEvaluator::new(passing_eval_reply()));
    let store = Arc::new(MemoryRunStore::new());
    let pipeline = pipeline(index.clone(), generator.clone(), evaluator.clone(), store.clone());

    let outcome = pipeline.decide_ticket(BILLING_TICKET).await.unwrap();

    assert_eq!(outcome.decision.route, Route::Billing);
    assert_eq!(outcome.decision.citations, vec![SnippetId::positional(0)]);
    let cited = &outcome.decision.retrieved_snippets[0];
    assert_eq!(cited.id.as_str(), "S1");
    assert_eq!(cited.source, "refund_policy.md");
    assert!(cited.text.contains("Duplicate charges"));
    assert!(outcome.evaluation.passed);

    // Two independent retrievals, one call per generation stage.
    assert_eq!(index.searches(), 2);
    assert_eq!(generator.call_count(), 1);
    assert_eq!(evaluator.call_count(), 1);
    let (eval_ids, eval_decision) = evaluator.calls.lock().unwrap()[0].clone();
    assert_eq!(eval_ids, vec!["S1", "S2"]);
    assert_eq!(eval_decision, outcome.decision);

    let runs = store.list_recent(10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, outcome.run_id);
    assert_eq!(runs[0].ticket_text, BILLING_TICKET);
    assert_eq!(runs[0].model_version, MODEL);
    assert_eq!(runs[0].decision, outcome.decision);
}

#[tokio::test]
async fn test_short_ticket_rejected_before_any_call() {
    let index = Arc::new(StaticIndex::new(billing_hits()));
    let generator = Arc::new(ScriptedGenerator::new(billing_reply()));
    let mut evaluator = MockEvaluator::new();
    evaluator.expect_evaluate().never();
    let mut store = MockStore::new();
    store.expect_record().never();

    let pipeline = pipeline(
        index.clone(),
        generator.clone(),
        Arc::new(evaluator),
        Arc::new(store),
    );

    for ticket in ["hey", "    ", ""] {
        let failure = pipeline.decide_ticket(ticket).await.unwrap_err();
        assert_eq!(failure.error_code, "INVALID_TICKET");
        assert_eq!(failure.failed_state, None);
    }
    assert_eq!(index.searches(), 0);
    assert_eq!(generator.call_count(), 0);
}

#[tokio::test]
async fn test_oversized_ticket_rejected() {
    let index = Arc::new(StaticIndex::new(billing_hits()));
    let pipeline = pipeline(
        index.clone(),
        Arc::new(ScriptedGenerator::new(billing_reply())),
        Arc::new(ScriptedEvaluator::new(passing_eval_reply())),
        Arc::new(MemoryRunStore::new()),
    );
    let failure = pipeline.decide_ticket(&"x".repeat(4001)).await.unwrap_err();
    assert_eq!(failure.error_code, "INVALID_TICKET");
    assert_eq!(index.searches(), 0);
}

#[tokio::test]
async fn test_empty_index_yields_uncited_decision_and_flagged_evaluation() {
    let index = Arc::new(StaticIndex::new(Vec::new()));
    let generator = Arc::new(ScriptedGenerator::new(decision_reply(
        "billing",
        &[],
        "Per our policy, duplicate charges are refunded within 5 business days.",
    )));
    let evaluator = Arc::new(ScriptedEvaluator::new(
        r#"{
            "passed": false,
            "score": 0.35,
            "issues": ["Draft states refund policy details with no cited snippet"],
            "suggested_fix": "Remove the refund timeline or cite the policy snippet."
        }"#,
    ));
    let store = Arc::new(MemoryRunStore::new());
    let pipeline = pipeline(index, generator.clone(), evaluator.clone(), store.clone());

    let outcome = pipeline.decide_ticket(BILLING_TICKET).await.unwrap();

    assert!(outcome.decision.citations.is_empty());
    assert!(outcome.decision.retrieved_snippets.is_empty());
    assert_eq!(generator.calls.lock().unwrap()[0], Vec::<String>::new());
    assert!(!outcome.evaluation.passed);
    assert!(outcome.evaluation.issues[0].contains("no cited snippet"));
    let (eval_ids, _) = evaluator.calls.lock().unwrap()[0].clone();
    assert!(eval_ids.is_empty());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_evaluation_failure_writes_nothing() {
    let evaluator = Arc::new(ScriptedEvaluator::failing());
    let mut store = MockStore::new();
    store.expect_record().never();

    let pipeline = pipeline(
        Arc::new(StaticIndex::new(billing_hits())),
        Arc::new(ScriptedGenerator::new(billing_reply())),
        evaluator.clone(),
        Arc::new(store),
    );

    let failure = pipeline.decide_ticket(BILLING_TICKET).await.unwrap_err();
    assert_eq!(failure.error_code, "GENERATION_FAILED");
    assert_eq!(failure.failed_state, Some(PipelineState::GeneratingEvaluation));
    assert_eq!(
        failure.message,
        "Decision pipeline failed while generating the evaluation"
    );
    assert!(failure.detail.unwrap().contains("timed out"));
    assert_eq!(evaluator.call_count(), 1);
}

#[tokio::test]
async fn test_invalid_citation_never_reaches_evaluator() {
    let mut evaluator = MockEvaluator::new();
    evaluator.expect_evaluate().never();
    let mut store = MockStore::new();
    store.expect_record().never();

    let pipeline = pipeline(
        Arc::new(StaticIndex::new(billing_hits())),
        Arc::new(ScriptedGenerator::new(decision_reply(
            "billing",
            &["S1", "S7"],
            "Our billing team will look at the duplicate charge.",
        ))),
        Arc::new(evaluator),
        Arc::new(store),
    );

    let failure = pipeline.decide_ticket(BILLING_TICKET).await.unwrap_err();
    assert_eq!(failure.error_code, "GENERATION_FAILED");
    assert_eq!(failure.failed_state, Some(PipelineState::GeneratingDecision));
    assert!(failure.detail.unwrap().contains("S7"));
}

#[tokio::test]
async fn test_unvalidated_generator_output_is_rechecked() {
    let decision = Decision {
        decision: Action::AutoResolve,
        route: Route::Account,
        urgency: Urgency::Low,
        confidence: 0.7,
        reasons: vec!["Password reset request".into()],
        draft_response: "You can reset your password from the login page.".into(),
        citations: vec![SnippetId::positional(6)],
        retrieved_snippets: Vec::new(),
    };
    let mut evaluator = MockEvaluator::new();
    evaluator.expect_evaluate().never();
    let mut store = MockStore::new();
    store.expect_record().never();

    let pipeline = pipeline(
        Arc::new(StaticIndex::new(billing_hits())),
        Arc::new(RawGenerator(decision)),
        Arc::new(evaluator),
        Arc::new(store),
    );

    let failure = pipeline
        .decide_ticket("I forgot my password and cannot log in.")
        .await
        .unwrap_err();
    assert_eq!(failure.error_code, "GENERATION_FAILED");
    assert_eq!(failure.failed_state, Some(PipelineState::GeneratingDecision));
}

#[tokio::test]
async fn test_retrieval_failure_stops_before_generation() {
    let generator = Arc::new(ScriptedGenerator::new(billing_reply()));
    let mut store = MockStore::new();
    store.expect_record().never();

    let pipeline = pipeline(
        Arc::new(DownIndex),
        generator.clone(),
        Arc::new(ScriptedEvaluator::new(passing_eval_reply())),
        Arc::new(store),
    );

    let failure = pipeline.decide_ticket(BILLING_TICKET).await.unwrap_err();
    assert_eq!(failure.error_code, "RETRIEVAL_FAILED");
    assert_eq!(failure.failed_state, Some(PipelineState::RetrievingForDecision));
    assert!(failure.detail.unwrap().contains("unreachable"));
    assert_eq!(generator.call_count(), 0);
}

#[tokio::test]
async fn test_second_retrieval_failure_skips_evaluation() {
    let index = Arc::new(FailingAfterIndex::new(billing_hits(), 1));
    let generator = Arc::new(ScriptedGenerator::new(billing_reply()));
    let mut evaluator = MockEvaluator::new();
    evaluator.expect_evaluate().never();
    let mut store = MockStore::new();
    store.expect_record().never();

    let pipeline = pipeline(
        index.clone(),
        generator.clone(),
        Arc::new(evaluator),
        Arc::new(store),
    );

    let failure = pipeline.decide_ticket(BILLING_TICKET).await.unwrap_err();
    assert_eq!(failure.error_code, "RETRIEVAL_FAILED");
    assert_eq!(failure.failed_state, Some(PipelineState::RetrievingForEval));
    assert!(failure.detail.unwrap().contains("connection reset"));
    assert_eq!(index.searches(), 2);
    assert_eq!(generator.call_count(), 1);
}

#[tokio::test]
async fn test_persistence_failure_is_reported() {
    let mut store = MockStore::new();
    store
        .expect_record()
        .times(1)
        .returning(|_, _, _, _| Err(TriageError::Persistence("connection refused".into())));

    let pipeline = pipeline(
        Arc::new(StaticIndex::new(billing_hits())),
        Arc::new(ScriptedGenerator::new(billing_reply())),
        Arc::new(ScriptedEvaluator::new(passing_eval_reply())),
        Arc::new(store),
    );

    let failure = pipeline.decide_ticket(BILLING_TICKET).await.unwrap_err();
    assert_eq!(failure.error_code, "PERSISTENCE_FAILED");
    assert_eq!(failure.failed_state, Some(PipelineState::Persisting));
}

#[tokio::test]
async fn test_list_recent_clamps_and_orders() {
    let store = Arc::new(MemoryRunStore::new());
    let pipeline = pipeline(
        Arc::new(StaticIndex::new(billing_hits())),
        Arc::new(ScriptedGenerator::new(billing_reply())),
        Arc::new(ScriptedEvaluator::new(passing_eval_reply())),
        store.clone(),
    );

    let outcome = pipeline.decide_ticket(BILLING_TICKET).await.unwrap();
    let evaluation = Evaluation {
        passed: true,
        score: 0.9,
        issues: Vec::new(),
        suggested_fix: String::new(),
    };
    for i in 0..205 {
        store
            .record(&format!("filler ticket {i}"), &outcome.decision, &evaluation, MODEL)
            .await
            .unwrap();
    }

    let many = pipeline.list_recent(500).await.unwrap();
    assert_eq!(many.len() as i64, MAX_HISTORY_LIMIT);
    assert!(many.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    assert_eq!(many[0].ticket_text, "filler ticket 204");

    let one = pipeline.list_recent(0).await.unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].id, many[0].id);
}

#[tokio::test]
async fn test_history_failure_is_structured() {
    let mut store = MockStore::new();
    store
        .expect_list_recent()
        .returning(|_| Err(TriageError::Persistence("relation \"runs\" does not exist".into())));
    let pipeline = pipeline(
        Arc::new(StaticIndex::new(Vec::new())),
        Arc::new(ScriptedGenerator::new(billing_reply())),
        Arc::new(ScriptedEvaluator::new(passing_eval_reply())),
        Arc::new(store),
    );

    let failure = pipeline.list_recent(30).await.unwrap_err();
    assert_eq!(failure.error_code, "PERSISTENCE_FAILED");
    assert_eq!(failure.message, "History fetch failed");
}
