use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use triage_agents::config::{check_endpoint, TriageConfig};
use triage_agents::ingest::Ingestor;
use triage_agents::runtime::{open_store, KnowledgeBase, TriageRuntime};
use triage_agents::server::{self, AppState};
use triage_agents::store::{clamp_history_limit, RunStore, DEFAULT_HISTORY_LIMIT};

#[derive(Parser)]
#[command(name = "triage-agents")]
#[command(about = "Support ticket triage with grounded decisions and QA evaluation")]
#[command(version)]
struct Cli {
    /// Optional TOML config overlay
    #[arg(long, env = "TRIAGE_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: IpAddr,

        #[arg(short, long, default_value = "8000", env = "PORT")]
        port: u16,
    },

    /// Rebuild the knowledge-base index
    Ingest,

    /// Triage one ticket and print the outcome as JSON
    Decide {
        /// Ticket text
        ticket: String,
    },

    /// Print recent runs as JSON
    History {
        #[arg(short, long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = TriageConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port } => {
            let runtime = TriageRuntime::from_config(&config).await?;
            let api_key = Some(config.llm_endpoint.api_key.as_str());
            if !check_endpoint(&config.llm_endpoint.url, api_key).await {
                warn!(url = %config.llm_endpoint.url, "LLM endpoint not reachable at startup");
            }
            let state = AppState {
                pipeline: runtime.pipeline,
                ingestor: runtime.ingestor,
            };
            let router = server::create_router(state, &config.cors_origins);
            server::serve(router, SocketAddr::new(host, port)).await?;
        }
        Commands::Ingest => {
            let kb = KnowledgeBase::from_config(&config)?;
            let report = kb.ingestor.ingest().await?;
            info!(
                documents = report.documents,
                chunks = report.chunks_indexed,
                "Ingestion complete"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Decide { ticket } => {
            let runtime = TriageRuntime::from_config(&config).await?;
            match runtime.pipeline.decide_ticket(&ticket).await {
                Ok(outcome) => println!("{}", serde_json::to_string_pretty(&outcome)?),
                Err(failure) => {
                    eprintln!("{}", serde_json::to_string_pretty(&failure)?);
                    std::process::exit(1);
                }
            }
        }
        Commands::History { limit } => {
            let store = open_store(&config).await?;
            let items = store.list_recent(clamp_history_limit(limit)).await?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
    }

    Ok(())
}
