//! Builds the live pipeline and ingestor from a [`TriageConfig`].

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::agents::AgentFactory;
use crate::config::TriageConfig;
use crate::embeddings::{Embedder, OpenAiEmbedder};
use crate::index::LocalVectorIndex;
use crate::ingest::KbIngestor;
use crate::orchestrator::TriagePipeline;
use crate::retriever::KbRetriever;
use crate::store::{MemoryRunStore, PgRunStore, RunStore};

/// Embedder, index and ingestor. Needs neither the chat model nor the database.
pub struct KnowledgeBase {
    pub index: Arc<LocalVectorIndex>,
    pub ingestor: Arc<KbIngestor>,
}

impl KnowledgeBase {
    pub fn from_config(config: &TriageConfig) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(
            &config.embedding_endpoint,
            config.embed_timeout_secs,
        )?);
        let index = Arc::new(LocalVectorIndex::new(&config.index_dir, embedder.clone()));
        let ingestor = Arc::new(
            KbIngestor::new(&config.kb_dir, index.clone(), embedder)
                .context("Failed to configure knowledge-base chunker")?,
        );
        Ok(Self { index, ingestor })
    }
}

pub struct TriageRuntime {
    pub pipeline: Arc<TriagePipeline>,
    pub ingestor: Arc<KbIngestor>,
}

impl TriageRuntime {
    pub async fn from_config(config: &TriageConfig) -> Result<Self> {
        let kb = KnowledgeBase::from_config(config)?;
        let factory = AgentFactory::new(config)?;
        let store = open_store(config).await?;

        let pipeline = TriagePipeline::new(
            Arc::new(KbRetriever::new(kb.index)),
            Arc::new(factory.build_decider()),
            Arc::new(factory.build_evaluator()),
            store,
            config.rag_top_k,
            config.model_version(),
        );

        info!(
            llm = %config.llm_endpoint.url,
            model = %config.llm_endpoint.model,
            embed_model = %config.embedding_endpoint.model,
            top_k = config.rag_top_k,
            index_dir = %config.index_dir.display(),
            "Triage runtime ready"
        );
        Ok(Self {
            pipeline: Arc::new(pipeline),
            ingestor: kb.ingestor,
        })
    }
}

/// Postgres when `database_url` is set, otherwise a process-local store.
pub async fn open_store(config: &TriageConfig) -> Result<Arc<dyn RunStore>> {
    match config.database_url.as_deref() {
        Some(url) => {
            let store = PgRunStore::connect(url).await?;
            store.ensure_schema().await?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL not set, runs are kept in memory only");
            Ok(Arc::new(MemoryRunStore::new()))
        }
    }
}
