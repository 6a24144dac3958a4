//! Hybrid search query engine.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use scribe_core::{
    ChunkIndex, Embedder, Result, SearchConfig, SearchHit, SearchMode, SearchResponse,
};

use crate::fusion::fuse;

/// Hybrid search engine over one index store and one embedder.
///
/// In `hybrid` mode the two legs run concurrently and a failed leg
/// degrades to an empty ranking instead of failing the query; in the
/// pure modes the single leg's errors propagate.
pub struct QueryEngine<I: ?Sized, E: ?Sized> {
    index: Arc<I>,
    embedder: Arc<E>,
    config: SearchConfig,
}

impl<I, E> QueryEngine<I, E>
where
    I: ChunkIndex + ?Sized,
    E: Embedder + ?Sized,
{
    pub fn new(index: Arc<I>, embedder: Arc<E>, config: SearchConfig) -> Self {
        Self {
            index,
            embedder,
            config,
        }
    }

    /// Run a query in the given mode.
    pub async fn search(&self, query: &str, mode: SearchMode) -> Result<SearchResponse> {
        let start = Instant::now();

        let results = match mode {
            SearchMode::Vector => self.vector_leg(query).await?,
            SearchMode::Lexical => {
                self.index
                    .lexical_search(query, self.config.top_k_lexical)
                    .await?
            }
            SearchMode::Hybrid => self.hybrid(query).await?,
        };

        info!(
            %mode,
            results = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "search completed"
        );

        Ok(SearchResponse {
            query: query.to_string(),
            mode,
            results,
        })
    }

    async fn vector_leg(&self, query: &str) -> Result<Vec<SearchHit>> {
        let query_vector = self.embedder.embed_query(query).await?;
        self.index
            .vector_search(&query_vector, self.config.top_k_vector)
            .await
    }

    async fn hybrid(&self, query: &str) -> Result<Vec<SearchHit>> {
        let (vector, lexical) = tokio::join!(
            self.vector_leg(query),
            self.index.lexical_search(query, self.config.top_k_lexical)
        );

        // Either leg failing degrades to an empty ranking for that leg.
        let vector = vector.unwrap_or_else(|e| {
            warn!(error = %e, "vector leg failed, fusing lexical ranking only");
            Vec::new()
        });
        let lexical = lexical.unwrap_or_else(|e| {
            warn!(error = %e, "lexical leg failed, fusing vector ranking only");
            Vec::new()
        });

        debug!(
            vector = vector.len(),
            lexical = lexical.len(),
            "fusing rankings"
        );

        Ok(fuse(
            vector,
            lexical,
            self.config.vector_weight,
            self.config.rrf_k,
        ))
    }
}
