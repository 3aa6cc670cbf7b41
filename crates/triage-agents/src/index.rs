//! Persistent local vector index.
//!
//! The whole collection lives in one JSON file under the index directory.
//! Each write goes through its own temp file and a rename, so a reader never
//! sees a half-written index and concurrent rebuilds do not clobber each
//! other. Searches re-read the file, so a rebuild is visible to the next
//! query without a restart.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::embeddings::Embedder;

/// Collection name; also the index file stem.
pub const COLLECTION: &str = "sentinel_kb";

/// One ranked match.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub content: String,
    /// Source path as recorded at ingest time (may be empty).
    pub source: String,
    pub score: f32,
}

/// Nearest-neighbour search over the knowledge base.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `k` hits, most similar first.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    /// Content hash of `source` + `content`.
    pub id: String,
    #[serde(default)]
    pub source: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFile {
    pub collection: String,
    pub embedding_model: String,
    pub dimensions: usize,
    pub built_at: DateTime<Utc>,
    pub chunks: Vec<IndexedChunk>,
}

impl IndexFile {
    pub fn new(embedding_model: &str, chunks: Vec<IndexedChunk>) -> Self {
        let dimensions = chunks.first().map(|c| c.embedding.len()).unwrap_or(0);
        Self {
            collection: COLLECTION.to_string(),
            embedding_model: embedding_model.to_string(),
            dimensions,
            built_at: Utc::now(),
            chunks,
        }
    }
}

/// Stable chunk id: first 16 hex chars of blake3(source NUL content).
pub fn chunk_id(source: &str, content: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(source.as_bytes());
    hasher.update(&[0]);
    hasher.update(content.as_bytes());
    let hex = hasher.finalize().to_hex();
    hex.as_str()[..16].to_string()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

pub struct LocalVectorIndex {
    dir: PathBuf,
    embedder: Arc<dyn Embedder>,
}

impl LocalVectorIndex {
    pub fn new(dir: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            dir: dir.into(),
            embedder,
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(format!("{COLLECTION}.json"))
    }

    /// Read the index. `Ok(None)` when nothing has been ingested yet.
    pub async fn load(&self) -> Result<Option<IndexFile>> {
        let path = self.index_path();
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read index {}", path.display()))
            }
        };
        let file: IndexFile = serde_json::from_str(&raw)
            .with_context(|| format!("Index {} is corrupt", path.display()))?;
        Ok(Some(file))
    }

    /// Replace the index atomically.
    pub async fn write(&self, file: &IndexFile) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create index dir {}", self.dir.display()))?;
        let path = self.index_path();
        let tmp = self.temp_path();
        let body = serde_json::to_vec(file).context("Failed to serialize index")?;
        if let Err(e) = tokio::fs::write(&tmp, body).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("Failed to write {}", tmp.display()));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e)
                .with_context(|| format!("Failed to move index into place at {}", path.display()));
        }
        Ok(())
    }

    /// Unique per write; same directory as the index so the rename stays on one filesystem.
    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!("{COLLECTION}.json.{}.tmp", uuid::Uuid::new_v4().simple()))
    }
}

#[async_trait]
impl VectorIndex for LocalVectorIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let Some(index) = self.load().await? else {
            warn!(
                path = %self.index_path().display(),
                "Vector index not built yet, returning no evidence"
            );
            return Ok(Vec::new());
        };
        if k == 0 || index.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .context("Failed to embed query")?
            .into_iter()
            .next()
            .context("Embedder returned no vector for query")?;
        if query_vec.len() != index.dimensions {
            bail!(
                "Query embedding has {} dimensions, index {} has {} (model {})",
                query_vec.len(),
                index.collection,
                index.dimensions,
                index.embedding_model
            );
        }

        let mut scored: Vec<(usize, f32)> = index
            .chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| (i, cosine_similarity(&query_vec, &chunk.embedding)))
            .collect();
        // Stable: equal scores keep index order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        debug!(k, total = index.chunks.len(), "Vector search completed");
        Ok(scored
            .into_iter()
            .map(|(i, score)| {
                let chunk = &index.chunks[i];
                SearchHit {
                    content: chunk.content.clone(),
                    source: chunk.source.clone(),
                    score,
                }
            })
            .collect())
    }
}
