//! Knowledge-base retrieval: query text in, positionally labelled evidence out.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use triage_core::{EvidenceBatch, TriageError, TriageResult};

use crate::index::VectorIndex;

/// Label used when a chunk carries no source path.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Fetch evidence for a ticket.
///
/// Every call yields a fresh batch; ids restart at `S1`.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, top_k: usize) -> TriageResult<EvidenceBatch>;
}

pub struct KbRetriever {
    index: Arc<dyn VectorIndex>,
}

impl KbRetriever {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Retriever for KbRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> TriageResult<EvidenceBatch> {
        if top_k == 0 {
            return Err(TriageError::Retrieval("top_k must be at least 1".into()));
        }
        let hits = self
            .index
            .search(query, top_k)
            .await
            .map_err(|e| TriageError::Retrieval(format!("{e:#}")))?;

        let batch = EvidenceBatch::from_hits(
            hits.into_iter()
                .take(top_k)
                .map(|hit| (source_label(&hit.source), hit.content)),
        );
        debug!(batch = %batch.batch_id(), snippets = batch.len(), "Retrieved evidence");
        Ok(batch)
    }
}

/// File-name component of a recorded source path, or `unknown`.
pub fn source_label(raw: &str) -> String {
    raw.rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_SOURCE)
        .to_string()
}
