//! Run recorder: one append-only row per successful pipeline execution.

use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::{Client, NoTls, Row};
use tracing::error;
use triage_core::{Decision, Evaluation, Run, RunId, TriageError, TriageResult};
use uuid::Uuid;

pub const DEFAULT_HISTORY_LIMIT: i64 = 30;
pub const MAX_HISTORY_LIMIT: i64 = 200;

/// Clamp a requested history size into `[1, MAX_HISTORY_LIMIT]`.
pub fn clamp_history_limit(limit: i64) -> i64 {
    limit.clamp(1, MAX_HISTORY_LIMIT)
}

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist a completed run and return its store-assigned id.
    async fn record(
        &self,
        ticket_text: &str,
        decision: &Decision,
        evaluation: &Evaluation,
        model_version: &str,
    ) -> TriageResult<RunId>;

    /// Most recent runs, newest first. `limit` is clamped, never rejected.
    async fn list_recent(&self, limit: i64) -> TriageResult<Vec<Run>>;
}

fn persistence(context: &str, err: impl std::fmt::Display) -> TriageError {
    TriageError::Persistence(format!("{context}: {err}"))
}

// ── Postgres ────────────────────────────────────────────────────────────────

const SCHEMA_SQL: &str = "\
CREATE TABLE IF NOT EXISTS runs (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    ticket_text TEXT NOT NULL,
    decision_json JSONB NOT NULL,
    evaluation_json JSONB NOT NULL,
    model_version TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS runs_created_at_idx ON runs (created_at DESC);";

const INSERT_RUN: &str = "\
INSERT INTO runs (ticket_text, decision_json, evaluation_json, model_version)
VALUES ($1, $2, $3, $4)
RETURNING id";

const SELECT_RECENT: &str = "\
SELECT id, ticket_text, decision_json, evaluation_json, model_version, created_at
FROM runs
ORDER BY created_at DESC
LIMIT $1";

pub struct PgRunStore {
    client: Client,
}

impl PgRunStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .context("Failed to connect to Postgres")?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "Postgres connection closed with error");
            }
        });
        Ok(Self { client })
    }

    /// Create the `runs` table and its index if absent.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.client
            .batch_execute(SCHEMA_SQL)
            .await
            .context("Failed to create runs schema")
    }
}

fn run_from_row(row: &Row) -> TriageResult<Run> {
    let read = |e: tokio_postgres::Error| persistence("malformed runs row", e);
    let id: Uuid = row.try_get("id").map_err(read)?;
    let decision_json: serde_json::Value = row.try_get("decision_json").map_err(read)?;
    let evaluation_json: serde_json::Value = row.try_get("evaluation_json").map_err(read)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(read)?;

    Ok(Run {
        id: RunId::from(id),
        ticket_text: row.try_get("ticket_text").map_err(read)?,
        decision: serde_json::from_value(decision_json)
            .map_err(|e| persistence("stored decision is unreadable", e))?,
        evaluation: serde_json::from_value(evaluation_json)
            .map_err(|e| persistence("stored evaluation is unreadable", e))?,
        model_version: row.try_get("model_version").map_err(read)?,
        created_at,
    })
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn record(
        &self,
        ticket_text: &str,
        decision: &Decision,
        evaluation: &Evaluation,
        model_version: &str,
    ) -> TriageResult<RunId> {
        let decision_json =
            serde_json::to_value(decision).map_err(|e| persistence("encode decision", e))?;
        let evaluation_json =
            serde_json::to_value(evaluation).map_err(|e| persistence("encode evaluation", e))?;
        let row = self
            .client
            .query_one(
                INSERT_RUN,
                &[&ticket_text, &decision_json, &evaluation_json, &model_version],
            )
            .await
            .map_err(|e| persistence("insert run", e))?;
        let id: Uuid = row.try_get("id").map_err(|e| persistence("read run id", e))?;
        Ok(RunId::from(id))
    }

    async fn list_recent(&self, limit: i64) -> TriageResult<Vec<Run>> {
        let limit = clamp_history_limit(limit);
        let rows = self
            .client
            .query(SELECT_RECENT, &[&limit])
            .await
            .map_err(|e| persistence("query runs", e))?;
        rows.iter().map(run_from_row).collect()
    }
}

// ── In-memory ───────────────────────────────────────────────────────────────

/// Process-local store. Runs are lost on restart.
#[derive(Default)]
pub struct MemoryRunStore {
    runs: Mutex<Vec<Run>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.runs.lock().map(|runs| runs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn record(
        &self,
        ticket_text: &str,
        decision: &Decision,
        evaluation: &Evaluation,
        model_version: &str,
    ) -> TriageResult<RunId> {
        let run = Run {
            id: RunId::new(),
            ticket_text: ticket_text.to_string(),
            decision: decision.clone(),
            evaluation: evaluation.clone(),
            model_version: model_version.to_string(),
            created_at: Utc::now(),
        };
        let id = run.id;
        self.runs
            .lock()
            .map_err(|_| TriageError::Persistence("run store lock poisoned".into()))?
            .push(run);
        Ok(id)
    }

    async fn list_recent(&self, limit: i64) -> TriageResult<Vec<Run>> {
        let limit = clamp_history_limit(limit) as usize;
        let runs = self
            .runs
            .lock()
            .map_err(|_| TriageError::Persistence("run store lock poisoned".into()))?;
        // Later inserts first, then a stable sort so equal timestamps keep that order.
        let mut recent: Vec<Run> = runs.iter().rev().cloned().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(limit);
        Ok(recent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::{Action, Route, Urgency};

    fn decision() -> Decision {
        Decision {
            decision: Action::Escalate,
            route: Route::Tech,
            urgency: Urgency::Medium,
            confidence: 0.4,
            reasons: vec!["unclear failure".into()],
            draft_response: "We are looking into this for you.".into(),
            citations: vec![],
            retrieved_snippets: vec![],
        }
    }

    fn evaluation() -> Evaluation {
        Evaluation {
            passed: true,
            score: 0.8,
            issues: vec![],
            suggested_fix: String::new(),
        }
    }

    #[test]
    fn test_clamp_history_limit() {
        assert_eq!(clamp_history_limit(0), 1);
        assert_eq!(clamp_history_limit(-5), 1);
        assert_eq!(clamp_history_limit(30), 30);
        assert_eq!(clamp_history_limit(500), MAX_HISTORY_LIMIT);
    }

    #[tokio::test]
    async fn test_memory_store_newest_first() {
        let store = MemoryRunStore::new();
        let mut ids = Vec::new();
        for i in 0..3 {
            let ticket = format!("ticket number {i}");
            ids.push(
                store
                    .record(&ticket, &decision(), &evaluation(), "test-model")
                    .await
                    .unwrap(),
            );
        }
        let runs = store.list_recent(10).await.unwrap();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].id, ids[2]);
        assert_eq!(runs[2].id, ids[0]);
        assert!(runs.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        assert_eq!(runs[0].model_version, "test-model");
    }

    #[tokio::test]
    async fn test_memory_store_clamps_limit() {
        let store = MemoryRunStore::new();
        for _ in 0..3 {
            store
                .record("printer on fire", &decision(), &evaluation(), "m")
                .await
                .unwrap();
        }
        assert_eq!(store.list_recent(0).await.unwrap().len(), 1);
        assert_eq!(store.list_recent(500).await.unwrap().len(), 3);
        assert_eq!(store.len(), 3);
    }
}
