//! SQLite-backed index store implementation.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};
use ulid::Ulid;

use scribe_core::{
    Chunk, ChunkIndex, IndexStats, LedgerEntry, Result, ScribeError, SearchHit,
};

use crate::schema::SCHEMA;

const META_DIMENSION: &str = "dimension";

/// SQLite-based index store.
///
/// Uses a blocking Mutex around the connection; every write method runs
/// inside one transaction, so readers never observe a partially
/// committed batch.
pub struct SqliteIndex {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteIndex {
    /// Open or create the index database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| ScribeError::index(format!("Failed to open database: {e}")))?;

        Self::init(conn, path)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ScribeError::index(format!("Failed to open in-memory database: {e}")))?;

        Self::init(conn, Path::new(":memory:"))
    }

    fn init(conn: Connection, path: &Path) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA busy_timeout = 30000;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(|e| ScribeError::index(format!("Failed to configure connection: {e}")))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| ScribeError::index(format!("Failed to initialize schema: {e}")))?;

        info!("Index database opened at {:?}", path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Execute a blocking operation on the connection.
    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ScribeError::index(e.to_string()))?;
        f(&conn)
    }

    /// Convert f32 vector to bytes (little-endian).
    fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
        v.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Convert little-endian bytes back to an f32 vector.
    fn bytes_to_vec(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    /// Escape FTS5 query special characters, term by term. Bare operator
    /// keywords (AND, OR, NOT, NEAR) are quoted too so they match as
    /// plain terms instead of being parsed as syntax.
    fn escape_fts5_query(query: &str) -> String {
        query
            .split_whitespace()
            .map(|term| {
                let keyword = matches!(term, "AND" | "OR" | "NOT" | "NEAR");
                if keyword || term.contains(|c: char| "+-*()\":.".contains(c)) {
                    format!("\"{}\"", term.replace('"', "\"\""))
                } else {
                    term.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Build a search hit from the stored payload, falling back to the
    /// raw indexed columns when the payload is missing or unreadable.
    #[allow(clippy::too_many_arguments)]
    fn row_to_hit(
        payload: &str,
        score: f32,
        provenance: &str,
        chunk_id: &str,
        source_id: Option<String>,
        speaker: Option<String>,
        start_time: f64,
        end_time: f64,
        text: String,
        validation_confidence: Option<f32>,
    ) -> SearchHit {
        if let Ok(chunk) = serde_json::from_str::<Chunk>(payload) {
            return SearchHit {
                chunk_id: chunk.id,
                score,
                source_id: chunk.source_id,
                text: chunk.text,
                start_time: chunk.start_time,
                end_time: chunk.end_time,
                speaker: Some(chunk.speaker),
                topic_tags: chunk.topic_tags,
                entities: chunk.entities,
                validation_confidence: Some(chunk.validation_confidence),
                provenance: Some(provenance.to_string()),
            };
        }

        SearchHit {
            chunk_id: Ulid::from_string(chunk_id).unwrap_or_else(|_| Ulid::nil()),
            score,
            source_id,
            text,
            start_time,
            end_time,
            speaker,
            topic_tags: Vec::new(),
            entities: Vec::new(),
            validation_confidence,
            provenance: Some(provenance.to_string()),
        }
    }

    fn stored_dimension(conn: &Connection) -> Result<Option<usize>> {
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = ?1",
                params![META_DIMENSION],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| ScribeError::index(e.to_string()))?;

        match value {
            Some(v) => v
                .parse::<usize>()
                .map(Some)
                .map_err(|e| ScribeError::index(format!("corrupt dimension metadata: {e}"))),
            None => Ok(None),
        }
    }

    fn now_secs() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

#[async_trait]
impl ChunkIndex for SqliteIndex {
    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| ScribeError::index(e.to_string()))?;

            {
                let mut stmt = tx
                    .prepare(
                        r#"
                        INSERT INTO chunks (chunk_id, source_id, speaker, start_time,
                                            end_time, text, validation_confidence, payload)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                        ON CONFLICT(chunk_id) DO UPDATE SET
                            source_id = excluded.source_id,
                            speaker = excluded.speaker,
                            start_time = excluded.start_time,
                            end_time = excluded.end_time,
                            text = excluded.text,
                            validation_confidence = excluded.validation_confidence,
                            payload = excluded.payload
                        "#,
                    )
                    .map_err(|e| ScribeError::index(e.to_string()))?;

                for chunk in chunks {
                    let payload = serde_json::to_string(chunk)?;
                    stmt.execute(params![
                        chunk.id.to_string(),
                        chunk.source_id,
                        chunk.speaker,
                        chunk.start_time,
                        chunk.end_time,
                        chunk.text,
                        chunk.validation_confidence,
                        payload,
                    ])
                    .map_err(|e| ScribeError::index(format!("Failed to upsert chunk: {e}")))?;
                }
            }

            tx.commit().map_err(|e| ScribeError::index(e.to_string()))?;

            debug!("Upserted {} chunk documents", chunks.len());
            Ok(chunks.len())
        })
    }

    async fn ensure_dimension(&self, dimension: usize) -> Result<()> {
        if dimension == 0 {
            return Err(ScribeError::invalid_argument("embedding dimension must be non-zero"));
        }

        self.with_conn(|conn| {
            // INSERT OR IGNORE tolerates racing creation attempts; the
            // read-back catches a genuine mismatch.
            conn.execute(
                "INSERT OR IGNORE INTO index_meta (key, value) VALUES (?1, ?2)",
                params![META_DIMENSION, dimension.to_string()],
            )
            .map_err(|e| ScribeError::index(e.to_string()))?;

            match Self::stored_dimension(conn)? {
                Some(existing) if existing != dimension => Err(ScribeError::DimensionMismatch {
                    existing,
                    actual: dimension,
                }),
                _ => Ok(()),
            }
        })
    }

    async fn upsert_embeddings(&self, entries: &[(Ulid, Vec<f32>)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        self.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| ScribeError::index(e.to_string()))?;

            {
                let mut stmt = tx
                    .prepare(
                        r#"
                        INSERT INTO embeddings (chunk_id, vector) VALUES (?1, ?2)
                        ON CONFLICT(chunk_id) DO UPDATE SET vector = excluded.vector
                        "#,
                    )
                    .map_err(|e| ScribeError::index(e.to_string()))?;

                for (chunk_id, vector) in entries {
                    stmt.execute(params![chunk_id.to_string(), Self::vec_to_bytes(vector)])
                        .map_err(|e| {
                            ScribeError::index(format!("Failed to upsert embedding: {e}"))
                        })?;
                }
            }

            tx.commit().map_err(|e| ScribeError::index(e.to_string()))?;

            debug!("Upserted {} vectors", entries.len());
            Ok(())
        })
    }

    async fn vector_search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        if query.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query = query.to_vec();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT e.chunk_id, e.vector, c.payload, c.source_id, c.speaker,
                           c.start_time, c.end_time, c.text, c.validation_confidence
                    FROM embeddings e
                    JOIN chunks c ON c.chunk_id = e.chunk_id
                    "#,
                )
                .map_err(|e| ScribeError::index(e.to_string()))?;

            let mut scored: Vec<(f32, SearchHit)> = stmt
                .query_map([], |row| {
                    let chunk_id: String = row.get(0)?;
                    let vector: Vec<u8> = row.get(1)?;
                    let payload: String = row.get(2)?;
                    let source_id: Option<String> = row.get(3)?;
                    let speaker: Option<String> = row.get(4)?;
                    let start_time: f64 = row.get(5)?;
                    let end_time: f64 = row.get(6)?;
                    let text: String = row.get(7)?;
                    let confidence: Option<f32> = row.get(8)?;
                    Ok((
                        chunk_id, vector, payload, source_id, speaker, start_time, end_time,
                        text, confidence,
                    ))
                })
                .map_err(|e| ScribeError::index(e.to_string()))?
                .filter_map(|row| row.ok())
                .filter_map(
                    |(id, bytes, payload, source_id, speaker, start, end, text, conf)| {
                        let stored = Self::bytes_to_vec(&bytes);
                        if stored.len() != query.len() {
                            return None;
                        }
                        // Vectors are unit-normalized, so the dot product
                        // is the cosine similarity.
                        let score: f32 =
                            stored.iter().zip(query.iter()).map(|(a, b)| a * b).sum();
                        let hit = Self::row_to_hit(
                            &payload, score, "vector", &id, source_id, speaker, start, end,
                            text, conf,
                        );
                        Some((score, hit))
                    },
                )
                .collect();

            scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(top_k);

            Ok(scored.into_iter().map(|(_, hit)| hit).collect())
        })
    }

    async fn lexical_search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let escaped = Self::escape_fts5_query(query);
        if escaped.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT c.chunk_id, bm25(chunks_fts) AS score, c.payload, c.source_id,
                           c.speaker, c.start_time, c.end_time, c.text, c.validation_confidence
                    FROM chunks_fts
                    JOIN chunks c ON c.rowid = chunks_fts.rowid
                    WHERE chunks_fts MATCH ?1
                    ORDER BY score
                    LIMIT ?2
                    "#,
                )
                .map_err(|e| ScribeError::index(e.to_string()))?;

            let hits = stmt
                .query_map(params![escaped, top_k as i64], |row| {
                    let chunk_id: String = row.get(0)?;
                    let score: f64 = row.get(1)?;
                    let payload: String = row.get(2)?;
                    let source_id: Option<String> = row.get(3)?;
                    let speaker: Option<String> = row.get(4)?;
                    let start_time: f64 = row.get(5)?;
                    let end_time: f64 = row.get(6)?;
                    let text: String = row.get(7)?;
                    let confidence: Option<f32> = row.get(8)?;

                    // bm25() returns lower-is-better; negate so every leg
                    // exposes higher-is-better scores.
                    Ok(Self::row_to_hit(
                        &payload,
                        (-score) as f32,
                        "bm25",
                        &chunk_id,
                        source_id,
                        speaker,
                        start_time,
                        end_time,
                        text,
                        confidence,
                    ))
                })
                .map_err(|e| ScribeError::index(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| ScribeError::index(e.to_string()))?;

            Ok(hits)
        })
    }

    async fn ledger_lookup(&self, fingerprint: &str) -> Result<Option<LedgerEntry>> {
        let fingerprint = fingerprint.to_string();
        self.with_conn(move |conn| {
            let entry = conn
                .query_row(
                    r#"
                    SELECT input_ref, output_ref, chunk_count, dimension, run_tag
                    FROM ledger WHERE fingerprint = ?1
                    "#,
                    params![fingerprint],
                    |row| {
                        Ok(LedgerEntry {
                            input_ref: row.get(0)?,
                            output_ref: row.get(1)?,
                            chunk_count: row.get::<_, i64>(2)? as usize,
                            dimension: row.get::<_, i64>(3)? as usize,
                            run_tag: row.get(4)?,
                        })
                    },
                )
                .optional()
                .map_err(|e| ScribeError::index(e.to_string()))?;

            Ok(entry)
        })
    }

    async fn ledger_record(&self, fingerprint: &str, entry: &LedgerEntry) -> Result<()> {
        let fingerprint = fingerprint.to_string();
        let entry = entry.clone();
        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT OR REPLACE INTO ledger
                    (fingerprint, input_ref, output_ref, chunk_count, dimension, run_tag, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    fingerprint,
                    entry.input_ref,
                    entry.output_ref,
                    entry.chunk_count as i64,
                    entry.dimension as i64,
                    entry.run_tag,
                    Self::now_secs(),
                ],
            )
            .map_err(|e| ScribeError::index(format!("Failed to record ledger entry: {e}")))?;

            debug!(%fingerprint, "ledger entry recorded");
            Ok(())
        })
    }

    async fn stats(&self) -> Result<IndexStats> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<u64> {
                conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                    .map(|n| n as u64)
                    .map_err(|e| ScribeError::index(e.to_string()))
            };

            let chunks = count("SELECT COUNT(*) FROM chunks")?;
            let embeddings = count("SELECT COUNT(*) FROM embeddings")?;
            let ledger_entries = count("SELECT COUNT(*) FROM ledger")?;

            let page_count: u64 = conn
                .query_row("PRAGMA page_count", [], |row| row.get::<_, i64>(0))
                .unwrap_or(0) as u64;
            let page_size: u64 = conn
                .query_row("PRAGMA page_size", [], |row| row.get::<_, i64>(0))
                .unwrap_or(4096) as u64;

            Ok(IndexStats {
                chunks,
                embeddings,
                ledger_entries,
                storage_bytes: page_count * page_size,
            })
        })
    }
}
