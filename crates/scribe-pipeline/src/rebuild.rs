//! Lexical index rebuild from persisted chunk artifacts.

use std::path::Path;

use tracing::{info, warn};

use scribe_core::{Chunk, ChunkIndex, Result};

/// Scan every chunk artifact under `chunks_root` and upsert its chunks
/// by id. The whole pass commits atomically; resubmitted chunk ids
/// overwrite rather than duplicate. Returns the number of documents
/// indexed. Artifacts that fail to parse are skipped with a warning, a
/// rebuild should index everything it can.
///
/// Artifacts are read in sorted path order, so a chunk id repeated
/// across runs deterministically resolves to the copy from the artifact
/// latest in that order.
pub async fn rebuild_index<I>(index: &I, chunks_root: &Path) -> Result<usize>
where
    I: ChunkIndex + ?Sized,
{
    let mut files: Vec<std::path::PathBuf> = Vec::new();
    let mut stack = vec![chunks_root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                // A missing chunks root just means nothing to index yet.
                if dir == chunks_root && e.kind() == std::io::ErrorKind::NotFound {
                    return Ok(0);
                }
                return Err(e.into());
            }
        };

        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
    }

    files.sort();

    let mut all: Vec<Chunk> = Vec::new();
    for path in &files {
        let raw = std::fs::read_to_string(path)?;
        match serde_json::from_str::<Vec<Chunk>>(&raw) {
            Ok(chunks) => all.extend(chunks),
            Err(e) => {
                warn!(artifact = %path.display(), error = %e, "skipping unreadable artifact");
            }
        }
    }

    // Later artifacts win for a repeated chunk_id; dedupe here so the
    // reported count matches the documents actually indexed.
    let mut deduped: Vec<Chunk> = Vec::with_capacity(all.len());
    let mut seen = std::collections::HashSet::new();
    for chunk in all.into_iter().rev() {
        if seen.insert(chunk.id) {
            deduped.push(chunk);
        }
    }
    deduped.reverse();

    let indexed = index.upsert_chunks(&deduped).await?;

    info!(documents = indexed, root = %chunks_root.display(), "lexical index rebuilt");

    Ok(indexed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_index::SqliteIndex;
    use ulid::Ulid;

    fn chunk(id: Ulid, text: &str) -> Chunk {
        Chunk {
            id,
            source_id: Some("visit-3".into()),
            start_time: 0.0,
            end_time: 2.0,
            speaker: "clinician".into(),
            text: text.into(),
            validation_confidence: 0.88,
            topic_tags: vec![],
            entities: vec![],
        }
    }

    fn write_artifact(dir: &Path, name: &str, chunks: &[Chunk]) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(
            dir.join(name),
            serde_json::to_string_pretty(chunks).unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_rebuild_counts_documents() {
        let dir = tempfile::tempdir().unwrap();
        let index = SqliteIndex::open_memory().unwrap();

        write_artifact(
            &dir.path().join("run-1"),
            "a.json",
            &[chunk(Ulid::new(), "first visit notes"), chunk(Ulid::new(), "second topic")],
        );
        write_artifact(
            &dir.path().join("run-2"),
            "b.json",
            &[chunk(Ulid::new(), "third topic")],
        );

        let indexed = rebuild_index(&index, dir.path()).await.unwrap();
        assert_eq!(indexed, 3);
        assert_eq!(index.stats().await.unwrap().chunks, 3);
    }

    #[tokio::test]
    async fn test_rebuild_upserts_shared_ids_once() {
        let dir = tempfile::tempdir().unwrap();
        let index = SqliteIndex::open_memory().unwrap();

        let shared = Ulid::new();
        write_artifact(&dir.path().join("run-1"), "a.json", &[chunk(shared, "old text")]);
        write_artifact(&dir.path().join("run-2"), "b.json", &[chunk(shared, "new text")]);

        let indexed = rebuild_index(&index, dir.path()).await.unwrap();
        assert_eq!(indexed, 1);
        assert_eq!(index.stats().await.unwrap().chunks, 1);

        // Sorted path order makes run-2's copy the winner.
        let hits = index.lexical_search("text", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "new text");
        assert!(index.lexical_search("old", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_missing_root_is_zero() {
        let index = SqliteIndex::open_memory().unwrap();
        let indexed = rebuild_index(&index, Path::new("/nonexistent/chunks"))
            .await
            .unwrap();
        assert_eq!(indexed, 0);
    }

    #[tokio::test]
    async fn test_rebuild_skips_unreadable_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let index = SqliteIndex::open_memory().unwrap();

        write_artifact(&dir.path().join("run-1"), "good.json", &[chunk(Ulid::new(), "kept")]);
        std::fs::write(dir.path().join("run-1/bad.json"), "{not json").unwrap();

        let indexed = rebuild_index(&index, dir.path()).await.unwrap();
        assert_eq!(indexed, 1);
    }
}
