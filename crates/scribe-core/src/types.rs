//! Core domain types for transcript chunking and hybrid retrieval.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Speaker label used when the transcription stage did not diarize.
pub const DEFAULT_SPEAKER: &str = "SPEAKER_00";

fn default_speaker() -> String {
    DEFAULT_SPEAKER.to_string()
}

fn default_confidence() -> f32 {
    0.9
}

/// A validated transcript segment, produced upstream by the validation
/// stage. Immutable input to chunking.
///
/// The serde shape is tolerant of the validator's output variants:
/// `text_validated` is preferred over `text`, `start`/`end` are accepted
/// for the timestamps, and missing confidences default to 0.9.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(alias = "start")]
    pub start_time: f64,

    #[serde(alias = "end")]
    pub end_time: f64,

    #[serde(default = "default_speaker")]
    pub speaker: String,

    #[serde(alias = "text_validated")]
    pub text: String,

    #[serde(default = "default_confidence")]
    pub confidence_medical: f32,

    #[serde(default = "default_confidence")]
    pub confidence_contextual: f32,
}

impl Segment {
    /// Whitespace-delimited token count of the segment text. This is the
    /// cheap approximation the whole chunk-size model is calibrated
    /// against; see `ChunkingConfig`.
    pub fn token_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Mean of the two validation confidences.
    pub fn confidence(&self) -> f32 {
        (self.confidence_medical + self.confidence_contextual) / 2.0
    }
}

/// Top-level shape of a validated transcript file: either a bare segment
/// array or an object wrapping one under `segments`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SegmentFile {
    Wrapped { segments: Vec<Segment> },
    Bare(Vec<Segment>),
}

impl SegmentFile {
    pub fn into_segments(self) -> Vec<Segment> {
        match self {
            Self::Wrapped { segments } => segments,
            Self::Bare(segments) => segments,
        }
    }
}

/// A retrieval-ready chunk assembled from one or more contiguous segments.
///
/// `id` is generated once at creation and never mutated; it is the join
/// key across the lexical index, the vector table and the chunk artifacts
/// on disk. Re-chunking the same input produces new ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier (ULID), serialized as `chunk_id`.
    #[serde(rename = "chunk_id")]
    pub id: Ulid,

    /// Identifier of the source transcript, if known.
    pub source_id: Option<String>,

    /// Start of the first contributing segment (seconds).
    pub start_time: f64,

    /// End of the last contributing segment (seconds).
    pub end_time: f64,

    /// Dominant speaker across the contributing segments.
    pub speaker: String,

    /// Space-joined validated segment texts.
    pub text: String,

    /// Mean over contributing segments of the per-segment confidence mean.
    pub validation_confidence: f32,

    /// Topic tags, populated by a later enrichment stage.
    #[serde(default)]
    pub topic_tags: Vec<String>,

    /// Named entities, populated by a later enrichment stage.
    #[serde(default)]
    pub entities: Vec<String>,
}

impl Chunk {
    /// Whitespace token count of the chunk text.
    pub fn token_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Which index legs a query touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Vector,
    Lexical,
    Hybrid,
}

impl std::str::FromStr for SearchMode {
    type Err = crate::error::ScribeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vector" => Ok(Self::Vector),
            "lexical" => Ok(Self::Lexical),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(crate::error::ScribeError::invalid_argument(format!(
                "unknown search mode: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Vector => "vector",
            Self::Lexical => "lexical",
            Self::Hybrid => "hybrid",
        };
        write!(f, "{s}")
    }
}

/// A single ranked result, reconstructed from the stored payload of
/// whichever index produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: Ulid,

    /// Native index score, or the fused RRF score in hybrid mode.
    pub score: f32,

    pub source_id: Option<String>,
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    pub speaker: Option<String>,

    #[serde(default)]
    pub topic_tags: Vec<String>,

    #[serde(default)]
    pub entities: Vec<String>,

    pub validation_confidence: Option<f32>,

    /// Which index produced the payload ("bm25", "vector", "hybrid").
    pub provenance: Option<String>,
}

/// Response envelope for the query interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub mode: SearchMode,
    pub results: Vec<SearchHit>,
}

/// Outcome of one embed-and-upsert pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedOutcome {
    /// Vectors upserted.
    pub count: usize,

    /// Embedding dimension, 0 when nothing was embedded.
    pub dimension: usize,
}

impl EmbedOutcome {
    pub fn empty() -> Self {
        Self { count: 0, dimension: 0 }
    }
}

/// Resumability ledger record keyed by content fingerprint. A fingerprint
/// present in the ledger is never reprocessed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Path or URI of the raw input.
    pub input_ref: String,

    /// Path of the chunk artifact produced from it.
    pub output_ref: String,

    /// Number of chunks the input produced.
    pub chunk_count: usize,

    /// Embedding dimension at the time of processing.
    pub dimension: usize,

    /// Tag of the ingest run that processed the input.
    pub run_tag: String,
}

/// Result of processing one input file.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    /// Ledger record for the file (prior record when skipped).
    pub entry: LedgerEntry,

    /// True when the fingerprint was already ledgered and no work ran.
    pub skipped: bool,
}

/// Summary of a directory ingest run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_tag: String,
    pub files: usize,
    pub files_skipped: usize,
    pub chunks: usize,
}

/// Counters over the index store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub chunks: u64,
    pub embeddings: u64,
    pub ledger_entries: u64,
    pub storage_bytes: u64,
}
