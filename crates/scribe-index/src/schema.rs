//! Database schema definitions.

/// Main schema SQL for initializing the index database.
pub const SCHEMA: &str = r#"
-- Chunk documents, keyed by chunk_id. The payload column is the full
-- serialized chunk, denormalized for result assembly.
CREATE TABLE IF NOT EXISTS chunks (
    chunk_id TEXT PRIMARY KEY,
    source_id TEXT,
    speaker TEXT,
    start_time REAL NOT NULL,
    end_time REAL NOT NULL,
    text TEXT NOT NULL,
    validation_confidence REAL,
    payload TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_chunks_source_id ON chunks(source_id);

-- FTS5 virtual table over the text field for lexical search
CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    text,
    content=chunks,
    content_rowid=rowid
);

-- Triggers to keep FTS5 in sync with the chunks table
CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(rowid, text) VALUES (NEW.rowid, NEW.text);
END;

CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, text) VALUES ('delete', OLD.rowid, OLD.text);
END;

CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, text) VALUES ('delete', OLD.rowid, OLD.text);
    INSERT INTO chunks_fts(rowid, text) VALUES (NEW.rowid, NEW.text);
END;

-- One dense vector per chunk, little-endian f32 blobs
CREATE TABLE IF NOT EXISTS embeddings (
    chunk_id TEXT PRIMARY KEY REFERENCES chunks(chunk_id) ON DELETE CASCADE,
    vector BLOB NOT NULL
);

-- Collection-level metadata (embedding dimension)
CREATE TABLE IF NOT EXISTS index_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Resumability ledger, keyed by content fingerprint
CREATE TABLE IF NOT EXISTS ledger (
    fingerprint TEXT PRIMARY KEY,
    input_ref TEXT NOT NULL,
    output_ref TEXT NOT NULL,
    chunk_count INTEGER NOT NULL,
    dimension INTEGER NOT NULL,
    run_tag TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
"#;

/// Schema version for migrations.
pub const SCHEMA_VERSION: u32 = 1;
