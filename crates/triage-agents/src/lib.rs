pub mod agents;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod ingest;
pub mod orchestrator;
pub mod prompts;
pub mod retriever;
pub mod runtime;
pub mod server;
pub mod store;
