//! scribe CLI - ingest validated transcripts and query the hybrid index.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use scribe_core::{ChunkIndex, Embedder, ScribeConfig, SearchMode};
use scribe_embed::{HashedEmbedder, OnnxEmbedder};
use scribe_index::SqliteIndex;
use scribe_pipeline::{rebuild_index, Pipeline};
use scribe_query::QueryEngine;

/// scribe - chunk, index and search validated transcripts
#[derive(Parser)]
#[command(name = "scribe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: the user config dir, then ./scribe.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Index database path, overriding the configured one
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed and index transcript files
    Ingest {
        /// File or directory of validated transcript JSON (default: the
        /// configured input directory)
        input: Option<PathBuf>,

        /// Fixed run tag for this invocation's chunk artifacts
        #[arg(long)]
        tag: Option<String>,
    },

    /// Search the index
    Search {
        /// Search query
        query: String,

        /// Search mode: vector, lexical or hybrid
        #[arg(short, long, default_value = "hybrid")]
        mode: String,

        /// Maximum number of results to print
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Rebuild the lexical index from persisted chunk artifacts
    RebuildIndex,

    /// Run the HTTP query service
    Serve,

    /// Show index statistics
    Stats,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(cli: &Cli) -> Result<ScribeConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => ScribeConfig::load(path)?,
        None => ScribeConfig::load_default()?,
    };
    if let Some(db) = &cli.database {
        config.database.path = db.clone();
    }
    Ok(config)
}

/// ONNX model when one is configured, deterministic hashed embedder
/// otherwise.
fn build_embedder(config: &ScribeConfig) -> Result<Arc<dyn Embedder>, Box<dyn std::error::Error>> {
    let emb = &config.embedding;
    match (&emb.model_path, &emb.tokenizer_path) {
        (Some(model), Some(tokenizer)) => Ok(Arc::new(OnnxEmbedder::with_config(
            model,
            tokenizer,
            emb.dimension,
            emb.batch_size,
        )?)),
        (None, None) => {
            warn!(
                dimension = emb.hashed_dimension,
                "no embedding model configured, using the hashed embedder"
            );
            Ok(Arc::new(HashedEmbedder::new(emb.hashed_dimension)))
        }
        _ => Err("embedding.model_path and embedding.tokenizer_path must be set together".into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(&cli)?;
    let index: Arc<dyn ChunkIndex> = Arc::new(SqliteIndex::open(&config.database.path)?);

    match cli.command {
        Commands::Ingest { input, tag } => {
            let embedder = build_embedder(&config)?;

            let mut pipeline_config = config.pipeline.clone();
            if let Some(tag) = tag {
                pipeline_config.run_tag = Some(tag);
            }
            let input = input.unwrap_or_else(|| pipeline_config.input_dir.clone());

            let pipeline = Pipeline::new(
                index,
                embedder,
                config.chunking.clone(),
                pipeline_config,
            );

            if input.is_file() {
                let run_tag = pipeline.run_tag();
                let outcome = pipeline.process_file(&input, &run_tag).await?;
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                let summary = pipeline.process_dir(&input).await?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
        }

        Commands::Search {
            query,
            mode,
            top_k,
        } => {
            let embedder = build_embedder(&config)?;
            let mode: SearchMode = mode.parse()?;

            let engine = QueryEngine::new(index, embedder, config.search.clone());
            let mut response = engine.search(&query, mode).await?;
            if let Some(k) = top_k {
                response.results.truncate(k);
            }
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Commands::RebuildIndex => {
            let documents = rebuild_index(index.as_ref(), &config.pipeline.output_dir).await?;
            println!("Indexed {documents} document(s)");
        }

        Commands::Serve => {
            let embedder = build_embedder(&config)?;
            scribe_server::run_server(&config, index, embedder).await?;
        }

        Commands::Stats => {
            let stats = index.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
