//! File-level ingestion: fingerprint, ledger check, chunk, embed, index.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};
use ulid::Ulid;

use scribe_chunk::build_chunks;
use scribe_core::{
    fingerprint_file, Chunk, ChunkIndex, ChunkingConfig, Embedder, EmbedOutcome, FileOutcome,
    LedgerEntry, PipelineConfig, Result, RunSummary, ScribeError, SegmentFile,
};

use crate::status::{StatusEvent, StatusSink};

/// Vector upserts are sent in bounded batches to respect transport and
/// statement-size limits.
const UPSERT_BATCH: usize = 512;

/// Embed every chunk's text and upsert the vectors by chunk id.
///
/// Returns `{0, 0}` without touching the store when `chunks` is empty.
/// The embedder batches model inference internally; upserts go out in
/// batches of at most [`UPSERT_BATCH`]. Batches already upserted before
/// a failure remain valid (at-least-once, no rollback).
pub async fn embed_and_upsert<I, E>(
    embedder: &E,
    index: &I,
    chunks: &[Chunk],
) -> Result<EmbedOutcome>
where
    I: ChunkIndex + ?Sized,
    E: Embedder + ?Sized,
{
    if chunks.is_empty() {
        return Ok(EmbedOutcome::empty());
    }

    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    let vectors = embedder.embed(&texts).await?;

    if vectors.len() != chunks.len() {
        return Err(ScribeError::embedding(format!(
            "embedder returned {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        )));
    }

    let dimension = vectors
        .first()
        .map(Vec::len)
        .filter(|&d| d > 0)
        .ok_or_else(|| ScribeError::embedding("embedder produced a zero-dimension vector"))?;

    // Fatal on mismatch with an existing collection; tolerant of racing
    // first-time creation.
    index.ensure_dimension(dimension).await?;

    let entries: Vec<(Ulid, Vec<f32>)> = chunks
        .iter()
        .map(|c| c.id)
        .zip(vectors)
        .collect();

    for batch in entries.chunks(UPSERT_BATCH) {
        index.upsert_embeddings(batch).await?;
    }

    debug!(count = entries.len(), dimension, "vectors upserted");

    Ok(EmbedOutcome {
        count: entries.len(),
        dimension,
    })
}

/// Batch ingestion pipeline over one index store and one embedder.
pub struct Pipeline<I: ?Sized, E: ?Sized> {
    index: Arc<I>,
    embedder: Arc<E>,
    chunking: ChunkingConfig,
    config: PipelineConfig,
    status: StatusSink,
}

impl<I, E> Pipeline<I, E>
where
    I: ChunkIndex + ?Sized,
    E: Embedder + ?Sized,
{
    pub fn new(
        index: Arc<I>,
        embedder: Arc<E>,
        chunking: ChunkingConfig,
        config: PipelineConfig,
    ) -> Self {
        let status = StatusSink::new(config.status_url.clone());
        Self {
            index,
            embedder,
            chunking,
            config,
            status,
        }
    }

    /// Run tag for this invocation: configured value or clock-derived.
    pub fn run_tag(&self) -> String {
        self.config
            .run_tag
            .clone()
            .unwrap_or_else(|| {
                let secs = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                format!("run-{secs}")
            })
    }

    /// Process a single validated transcript file.
    ///
    /// The ledger is consulted before any chunking or embedding work; an
    /// already-ledgered fingerprint short-circuits to the prior outcome.
    /// The ledger entry is written only after chunk artifact, lexical
    /// documents and vectors have all been persisted.
    pub async fn process_file(&self, path: &Path, run_tag: &str) -> Result<FileOutcome> {
        let fingerprint = fingerprint_file(path)?;

        if let Some(prior) = self.index.ledger_lookup(&fingerprint).await? {
            info!(input = %path.display(), "fingerprint already ledgered, skipping");
            return Ok(FileOutcome {
                entry: prior,
                skipped: true,
            });
        }

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                ScribeError::invalid_argument(format!("unusable input path: {}", path.display()))
            })?
            .to_string();

        let raw = std::fs::read_to_string(path)?;
        let segments = serde_json::from_str::<SegmentFile>(&raw)?.into_segments();

        let chunks = build_chunks(&segments, Some(&stem), &self.chunking);

        let artifact = self.write_artifact(run_tag, &stem, &chunks)?;

        self.index.upsert_chunks(&chunks).await?;
        let embedded = embed_and_upsert(self.embedder.as_ref(), self.index.as_ref(), &chunks).await?;

        let entry = LedgerEntry {
            input_ref: path.display().to_string(),
            output_ref: artifact,
            chunk_count: chunks.len(),
            dimension: embedded.dimension,
            run_tag: run_tag.to_string(),
        };
        self.index.ledger_record(&fingerprint, &entry).await?;

        self.status.notify(StatusEvent {
            stage: "indexed".to_string(),
            input: entry.input_ref.clone(),
            chunk_count: entry.chunk_count,
            dimension: entry.dimension,
            run_tag: run_tag.to_string(),
        });

        info!(
            input = %path.display(),
            chunks = entry.chunk_count,
            dimension = entry.dimension,
            "file processed"
        );

        Ok(FileOutcome {
            entry,
            skipped: false,
        })
    }

    /// Process every `.json` file under the input directory, in sorted
    /// order. Files are independent units of work; one file's failure
    /// does not roll back the others.
    pub async fn process_dir(&self, input: &Path) -> Result<RunSummary> {
        let run_tag = self.run_tag();
        let files = scan_json_files(input)?;

        let mut summary = RunSummary {
            run_tag: run_tag.clone(),
            files: 0,
            files_skipped: 0,
            chunks: 0,
        };

        for file in files {
            match self.process_file(&file, &run_tag).await {
                Ok(outcome) => {
                    summary.files += 1;
                    if outcome.skipped {
                        summary.files_skipped += 1;
                    } else {
                        summary.chunks += outcome.entry.chunk_count;
                    }
                }
                Err(e) => {
                    warn!(input = %file.display(), error = %e, "file failed, continuing");
                }
            }
        }

        info!(
            run_tag = %summary.run_tag,
            files = summary.files,
            skipped = summary.files_skipped,
            chunks = summary.chunks,
            "ingest run finished"
        );

        Ok(summary)
    }

    /// Persist the chunk artifact for one input under
    /// `output_dir/<run_tag>/<stem>.json`, returning its path.
    fn write_artifact(&self, run_tag: &str, stem: &str, chunks: &[Chunk]) -> Result<String> {
        let dir = self.config.output_dir.join(run_tag);
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{stem}.json"));
        let json = serde_json::to_string_pretty(chunks)?;
        std::fs::write(&path, json)?;

        Ok(path.display().to_string())
    }
}

/// Recursively collect `.json` files, sorted for a stable processing
/// order.
fn scan_json_files(root: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("json"))
            {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}
