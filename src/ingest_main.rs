//! Knowledge-base ingestion CLI.
//!
//! Shares the config file and index database with the server, so
//! ingestion can run while the server is serving.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use concierge_backend::config::{AppConfig, AppPaths};
use concierge_backend::llm::HttpEmbedder;
use concierge_backend::logging;
use concierge_backend::rag::{IngestService, SqliteVectorStore};

#[derive(Parser)]
#[command(name = "ingest", about = "Manage the concierge knowledge base")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a single document (.txt, .md, .pdf, .docx)
    File { path: PathBuf },
    /// Ingest every supported document under a directory
    Dir { path: PathBuf },
    /// Ingest raw text
    Text {
        text: String,
        #[arg(long, default_value = "manual")]
        source: String,
    },
    /// Remove every chunk from the knowledge base
    Clear,
    /// Print the indexed chunk count
    Count,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = AppPaths::new();
    logging::init(&paths);
    let config = AppConfig::load(&paths.config_path)
        .with_context(|| format!("loading {}", paths.config_path.display()))?;

    let store = Arc::new(SqliteVectorStore::with_path(paths.index_db_path.clone()).await?);
    let embedder = Arc::new(HttpEmbedder::new(
        config.llm.embedding_base_url.clone(),
        config.embedding_api_key(),
        config.llm.embedding_model.clone(),
        Duration::from_secs(config.llm.request_timeout_secs),
    )?);
    let service = IngestService::new(
        store,
        embedder,
        config.knowledge.chunk_size,
        config.knowledge.chunk_overlap,
    );

    match cli.command {
        Command::File { path } => {
            let added = service.ingest_file(&path).await?;
            println!("Added {} chunks from {}", added, path.display());
            println!("Knowledge base now has {} chunks", service.count().await?);
        }
        Command::Dir { path } => {
            let report = service.ingest_directory(&path).await?;
            println!(
                "Ingested {} files ({} chunks)",
                report.files_ingested, report.chunks_added
            );
            for (path, reason) in &report.skipped {
                println!("  skipped {}: {}", path.display(), reason);
            }
            println!("Knowledge base now has {} chunks", service.count().await?);
        }
        Command::Text { text, source } => {
            let added = service.ingest_text(&text, &source).await?;
            println!("Added {} chunks under source '{}'", added, source);
            println!("Knowledge base now has {} chunks", service.count().await?);
        }
        Command::Clear => {
            let removed = service.clear_all().await?;
            println!("Knowledge base cleared ({} chunks removed)", removed);
        }
        Command::Count => {
            println!("{}", service.count().await?);
        }
    }

    Ok(())
}
