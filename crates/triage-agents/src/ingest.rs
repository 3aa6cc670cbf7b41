//! Knowledge-base ingestion: documents on disk to a rebuilt vector index.
//!
//! Only `.md` and `.txt` files directly inside the KB directory are read.
//! Each run replaces the index wholesale, so ingesting the same folder twice
//! leaves the same chunk set behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};
use triage_core::chunker::{ChunkerConfig, RecursiveSplitter};
use triage_core::{TriageError, TriageResult};

use crate::embeddings::Embedder;
use crate::index::{chunk_id, IndexFile, IndexedChunk, LocalVectorIndex};

const KB_EXTENSIONS: [&str; 2] = ["md", "txt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks_indexed: usize,
}

/// Rebuilds the knowledge-base index on demand.
#[async_trait]
pub trait Ingestor: Send + Sync {
    async fn ingest(&self) -> TriageResult<IngestReport>;
}

pub struct KbIngestor {
    kb_dir: PathBuf,
    index: Arc<LocalVectorIndex>,
    embedder: Arc<dyn Embedder>,
    splitter: RecursiveSplitter,
}

impl KbIngestor {
    pub fn new(
        kb_dir: impl Into<PathBuf>,
        index: Arc<LocalVectorIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> TriageResult<Self> {
        Self::with_chunker(kb_dir, index, embedder, ChunkerConfig::default())
    }

    pub fn with_chunker(
        kb_dir: impl Into<PathBuf>,
        index: Arc<LocalVectorIndex>,
        embedder: Arc<dyn Embedder>,
        chunker: ChunkerConfig,
    ) -> TriageResult<Self> {
        Ok(Self {
            kb_dir: kb_dir.into(),
            index,
            embedder,
            splitter: RecursiveSplitter::new(chunker)?,
        })
    }
}

#[async_trait]
impl Ingestor for KbIngestor {
    async fn ingest(&self) -> TriageResult<IngestReport> {
        let documents = collect_documents(&self.kb_dir).await?;

        let mut sources = Vec::new();
        let mut contents = Vec::new();
        for (path, text) in &documents {
            let source = path.to_string_lossy().to_string();
            for chunk in self.splitter.split(text) {
                sources.push(source.clone());
                contents.push(chunk);
            }
        }

        let embeddings = if contents.is_empty() {
            Vec::new()
        } else {
            self.embedder
                .embed(&contents)
                .await
                .map_err(|e| TriageError::Ingestion(format!("embedding failed: {e:#}")))?
        };
        if embeddings.len() != contents.len() {
            return Err(TriageError::Ingestion(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                contents.len()
            )));
        }

        let chunks: Vec<IndexedChunk> = sources
            .into_iter()
            .zip(contents)
            .zip(embeddings)
            .map(|((source, content), embedding)| IndexedChunk {
                id: chunk_id(&source, &content),
                source,
                content,
                embedding,
            })
            .collect();
        let report = IngestReport {
            documents: documents.len(),
            chunks_indexed: chunks.len(),
        };

        let file = IndexFile::new(self.embedder.model(), chunks);
        self.index
            .write(&file)
            .await
            .map_err(|e| TriageError::Ingestion(format!("{e:#}")))?;

        info!(
            kb_dir = %self.kb_dir.display(),
            documents = report.documents,
            chunks = report.chunks_indexed,
            "Knowledge base ingested"
        );
        Ok(report)
    }
}

/// Read every KB document, sorted by path so chunk order is stable.
async fn collect_documents(kb_dir: &Path) -> TriageResult<Vec<(PathBuf, String)>> {
    let mut entries = tokio::fs::read_dir(kb_dir).await.map_err(|e| {
        TriageError::Ingestion(format!("KB folder not found: {} ({e})", kb_dir.display()))
    })?;

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| TriageError::Ingestion(format!("failed to list {}: {e}", kb_dir.display())))?
    {
        let path = entry.path();
        let is_kb_file = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| KB_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if is_kb_file && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            TriageError::Ingestion(format!("failed to read {}: {e}", path.display()))
        })?;
        if text.trim().is_empty() {
            warn!(path = %path.display(), "KB document is empty");
        }
        documents.push((path, text));
    }
    Ok(documents)
}
