use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rig::providers::openai;
use serde::Deserialize;

pub const DEFAULT_LLM_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini-2024-07-18";
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";

/// OpenAI-compatible inference endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Endpoint {
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Chat model used for both the decision and the evaluation pass.
    pub llm_endpoint: Endpoint,
    /// Embedding model used for ingestion and query embedding.
    pub embedding_endpoint: Endpoint,
    /// Postgres connection string (None = process-local run store).
    pub database_url: Option<String>,
    /// Snippets requested per retrieval call.
    pub rag_top_k: usize,
    /// Directory holding the persisted vector index.
    pub index_dir: PathBuf,
    /// Directory of `.md` / `.txt` knowledge-base documents.
    pub kb_dir: PathBuf,
    /// Allowed CORS origins for the HTTP boundary.
    pub cors_origins: Vec<String>,
    /// Transport timeout for embedding requests, in seconds.
    pub embed_timeout_secs: u64,
}

impl Default for TriageConfig {
    fn default() -> Self {
        let llm_url = env_or("TRIAGE_LLM_URL", DEFAULT_LLM_URL);
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        Self {
            llm_endpoint: Endpoint {
                url: llm_url.clone(),
                api_key: api_key.clone(),
                model: std::env::var("TRIAGE_LLM_MODEL")
                    .or_else(|_| std::env::var("OPENAI_MODEL"))
                    .unwrap_or_else(|_| DEFAULT_LLM_MODEL.into()),
            },
            embedding_endpoint: Endpoint {
                url: env_or("TRIAGE_EMBED_URL", &llm_url),
                api_key: std::env::var("TRIAGE_EMBED_API_KEY").unwrap_or(api_key),
                model: env_or("TRIAGE_EMBED_MODEL", DEFAULT_EMBED_MODEL),
            },
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            rag_top_k: std::env::var("RAG_TOP_K")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(4),
            index_dir: PathBuf::from(env_or("INDEX_DIR", "kb_index")),
            kb_dir: PathBuf::from(env_or("KB_DIR", "knowledge_base")),
            cors_origins: parse_origins(&env_or("CORS_ORIGINS", "http://localhost:3000")),
            embed_timeout_secs: 30,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

/// Split a comma-separated origin list, dropping blanks.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(String::from)
        .collect()
}

/// Optional TOML overlay. Every field is optional; present fields win over
/// the environment.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub llm: Option<Endpoint>,
    pub embedding: Option<Endpoint>,
    pub database_url: Option<String>,
    pub rag_top_k: Option<usize>,
    pub index_dir: Option<PathBuf>,
    pub kb_dir: Option<PathBuf>,
    pub cors_origins: Option<String>,
    pub embed_timeout_secs: Option<u64>,
}

impl TriageConfig {
    /// Environment defaults, overlaid with `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = path {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let file: ConfigFile = toml::from_str(&raw)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            config.apply(file);
        }
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, file: ConfigFile) {
        if let Some(llm) = file.llm {
            self.llm_endpoint = llm;
        }
        if let Some(embedding) = file.embedding {
            self.embedding_endpoint = embedding;
        }
        if file.database_url.is_some() {
            self.database_url = file.database_url;
        }
        if let Some(k) = file.rag_top_k {
            self.rag_top_k = k;
        }
        if let Some(dir) = file.index_dir {
            self.index_dir = dir;
        }
        if let Some(dir) = file.kb_dir {
            self.kb_dir = dir;
        }
        if let Some(origins) = file.cors_origins {
            self.cors_origins = parse_origins(&origins);
        }
        if let Some(secs) = file.embed_timeout_secs {
            self.embed_timeout_secs = secs;
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.rag_top_k > 0, "rag_top_k must be positive");
        anyhow::ensure!(
            !self.llm_endpoint.model.trim().is_empty(),
            "llm model must not be empty"
        );
        Ok(())
    }

    /// Version string recorded on every run.
    pub fn model_version(&self) -> &str {
        &self.llm_endpoint.model
    }
}

/// Pre-built rig CompletionsClient for the chat endpoint.
///
/// Decision and evaluation share one client; they differ only in preamble.
pub struct ClientSet {
    pub llm: openai::CompletionsClient,
}

impl ClientSet {
    pub fn from_config(config: &TriageConfig) -> Result<Self> {
        let api_key = if config.llm_endpoint.api_key.is_empty() {
            "not-needed"
        } else {
            config.llm_endpoint.api_key.as_str()
        };
        let llm = openai::CompletionsClient::builder()
            .api_key(api_key)
            .base_url(&config.llm_endpoint.url)
            .build()
            .context("Failed to build chat completions client")?;
        Ok(Self { llm })
    }
}

/// Check if an inference endpoint is reachable (GET /models).
pub async fn check_endpoint(url: &str, api_key: Option<&str>) -> bool {
    let models_url = format!("{}/models", url.trim_end_matches('/'));
    let mut req = reqwest::Client::new()
        .get(&models_url)
        .timeout(std::time::Duration::from_secs(5));
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        req = req.bearer_auth(key);
    }
    match req.send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}
