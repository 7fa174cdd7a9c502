//! corpus-rag command line
//!
//! ```bash
//! corpus-rag --config rag.toml serve        # sync, then serve the HTTP API
//! corpus-rag --config rag.toml sync --force # rebuild the index from scratch
//! corpus-rag ask "What is the total due?"   # stream one answer to stdout
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use corpus_rag::{
    config::RagConfig,
    enrichment::build_enrichers,
    index::{IndexHandle, VectorIndex},
    monitor::ConnectivityMonitor,
    providers::{acquire_backend, ModelBackend},
    server::{state::AppState, RagServer},
    CorpusSynchronizer, Error, QueryPipeline, StreamEvent,
};

/// Incremental corpus indexing and streaming retrieval-augmented answers
#[derive(Parser)]
#[command(name = "corpus-rag", version, about)]
struct Cli {
    /// Path to a TOML configuration file; defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync the corpus, then serve the HTTP API until Ctrl-C
    Serve,

    /// Sync the corpus directory into the persisted index
    Sync {
        /// Discard the persisted index and rebuild from scratch
        #[arg(long)]
        force: bool,
    },

    /// Ask one question and stream the answer to stdout
    Ask {
        /// The question
        question: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "corpus_rag=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = RagConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Corpus: {}", config.corpus.dir.display());
    tracing::info!("  - Index: {}", config.index.storage_dir.display());
    tracing::info!("  - Embedding model: {} ({} dims)", config.llm.embed_model, config.embeddings.dimensions);
    tracing::info!("  - LLM model: {}", config.llm.generate_model);
    tracing::info!(
        "  - Chunking: {} / {} overlap",
        config.chunking.chunk_size,
        config.chunking.chunk_overlap
    );

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Sync { force } => sync(config, force).await,
        Commands::Ask { question } => ask(config, question).await,
    }
}

async fn serve(config: RagConfig) -> anyhow::Result<()> {
    let backend: Arc<dyn ModelBackend> = acquire_backend(&config).await?;
    let monitor = ConnectivityMonitor::new(backend.clone(), &config.monitor).spawn();

    let index = IndexHandle::new(VectorIndex::new(config.embeddings.dimensions));
    let state = AppState::new(config.clone(), backend, index, monitor.signal())?;

    match state
        .synchronizer()
        .sync(state.index(), &config.corpus.dir, false)
        .await
    {
        Ok(report) => tracing::info!(
            "Index ready: {} nodes ({} added)",
            report.total_nodes,
            report.nodes_added
        ),
        Err(e) if e.is_recoverable() => {
            tracing::warn!("Initial sync skipped: {}", e);
            let existing = state.synchronizer().open_index().await?;
            tracing::info!("Serving existing index with {} nodes", existing.len());
            state.index().replace(existing);
        }
        Err(e) => {
            monitor.shutdown().await;
            return Err(e.into());
        }
    }

    let server = RagServer::new(state);
    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nEndpoints:");
    println!("  POST /api/chat/stream - Ask questions (server-sent events)");
    println!("  POST /api/sync        - Sync the corpus");
    println!("  GET  /api/index/stats - Index statistics");
    println!("\nPress Ctrl+C to stop\n");

    let result = server
        .start(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
            }
            tracing::info!("Shutting down");
        })
        .await;

    monitor.shutdown().await;
    result.map_err(Into::into)
}

async fn sync(config: RagConfig, force: bool) -> anyhow::Result<()> {
    let backend: Arc<dyn ModelBackend> = acquire_backend(&config).await?;
    let enrichers = build_enrichers(&config.enrichment, backend.clone());
    let synchronizer = CorpusSynchronizer::new(&config, backend, enrichers)?;
    let index = IndexHandle::new(VectorIndex::new(config.embeddings.dimensions));

    let report = synchronizer.sync(&index, &config.corpus.dir, force).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn ask(config: RagConfig, question: String) -> anyhow::Result<()> {
    let backend: Arc<dyn ModelBackend> = acquire_backend(&config).await?;
    let monitor = ConnectivityMonitor::new(backend.clone(), &config.monitor).spawn();

    let synchronizer = CorpusSynchronizer::new(&config, backend.clone(), Vec::new())?;
    let index = IndexHandle::new(synchronizer.open_index().await?);
    if index.snapshot().is_empty() {
        tracing::warn!("Index is empty; run `corpus-rag sync` first");
    }

    let pipeline = QueryPipeline::new(backend, index, monitor.signal(), &config);
    let mut answer = pipeline.query(question);
    let mut failure = None;

    let mut stdout = std::io::stdout();
    while let Some(event) = answer.next().await {
        match event {
            StreamEvent::Content { text } => {
                write!(stdout, "{}", text)?;
                stdout.flush()?;
            }
            StreamEvent::End => writeln!(stdout)?,
            StreamEvent::Error { text } => failure = Some(text),
        }
    }
    drop(answer);
    monitor.shutdown().await;

    match failure {
        Some(text) => Err(Error::BackendUnavailable(text).into()),
        None => Ok(()),
    }
}
