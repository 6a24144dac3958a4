//! scribe-server - HTTP query service
//!
//! Exposes the hybrid search engine over a small JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/search?q=...&mode=hybrid` | Run a search query |
//! | `POST` | `/rebuild-index` | Rebuild the lexical index from chunk artifacts |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Error responses carry a machine-readable code and a message:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! All origins are permitted so browser-based review tooling can call the
//! service directly.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use scribe_core::{ChunkIndex, Embedder, Result, ScribeConfig, ScribeError, SearchMode};
use scribe_pipeline::rebuild_index;
use scribe_query::QueryEngine;

/// Shared state handed to every route handler.
#[derive(Clone)]
struct AppState {
    engine: Arc<QueryEngine<dyn ChunkIndex, dyn Embedder>>,
    index: Arc<dyn ChunkIndex>,
    chunks_root: PathBuf,
}

/// Start the query service on the configured bind address.
///
/// Runs until the process is terminated. The index store and embedder
/// are shared with any concurrently running ingest.
pub async fn run_server(
    config: &ScribeConfig,
    index: Arc<dyn ChunkIndex>,
    embedder: Arc<dyn Embedder>,
) -> Result<()> {
    let bind = config.server.bind.clone();
    let app = router(
        index,
        embedder,
        config.search.clone(),
        config.pipeline.output_dir.clone(),
    );

    info!(%bind, "query service listening");

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| ScribeError::internal(format!("server error: {e}")))?;

    Ok(())
}

/// Build the service router. Split out from [`run_server`] so tests can
/// drive it without binding a socket.
pub fn router(
    index: Arc<dyn ChunkIndex>,
    embedder: Arc<dyn Embedder>,
    search: scribe_core::SearchConfig,
    chunks_root: PathBuf,
) -> Router {
    let state = AppState {
        engine: Arc::new(QueryEngine::new(index.clone(), embedder, search)),
        index,
        chunks_root,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search", get(handle_search))
        .route("/rebuild-index", post(handle_rebuild))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<ScribeError> for AppError {
    fn from(e: ScribeError) -> Self {
        match e {
            ScribeError::InvalidArgument { message } => bad_request(message),
            other => {
                error!(error = %other, "request failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal".to_string(),
                    message: other.to_string(),
                }
            }
        }
    }
}

// ============ Handlers ============

#[derive(Deserialize)]
struct SearchParams {
    q: String,
    mode: Option<String>,
}

/// Query-string extractor whose rejection carries the module's JSON
/// error envelope instead of axum's plain-text 400.
struct SearchQuery(SearchParams);

impl<S> FromRequestParts<S> for SearchQuery
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let Query(params) = Query::<SearchParams>::from_request_parts(parts, state)
            .await
            .map_err(|e| bad_request(e.body_text()))?;
        Ok(Self(params))
    }
}

async fn handle_search(
    State(state): State<AppState>,
    SearchQuery(params): SearchQuery,
) -> std::result::Result<Json<scribe_core::SearchResponse>, AppError> {
    let query = params.q.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let mode = match params.mode.as_deref() {
        None => SearchMode::Hybrid,
        Some(raw) => raw.parse()?,
    };

    let response = state.engine.search(query, mode).await?;
    Ok(Json(response))
}

#[derive(Serialize)]
struct RebuildResponse {
    documents_indexed: usize,
}

async fn handle_rebuild(
    State(state): State<AppState>,
) -> std::result::Result<Json<RebuildResponse>, AppError> {
    let documents_indexed = rebuild_index(state.index.as_ref(), &state.chunks_root).await?;
    Ok(Json(RebuildResponse { documents_indexed }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use ulid::Ulid;

    use scribe_core::{Chunk, SearchConfig};
    use scribe_embed::HashedEmbedder;
    use scribe_index::SqliteIndex;

    async fn test_router() -> (Router, Arc<SqliteIndex>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(SqliteIndex::open_memory().unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(HashedEmbedder::new(64));
        let app = router(
            index.clone(),
            embedder,
            SearchConfig::default(),
            dir.path().join("chunks"),
        );
        (app, index, dir)
    }

    fn chunk(text: &str) -> Chunk {
        Chunk {
            id: Ulid::new(),
            source_id: Some("visit-1".into()),
            start_time: 0.0,
            end_time: 3.0,
            speaker: "clinician".into(),
            text: text.into(),
            validation_confidence: 0.9,
            topic_tags: vec![],
            entities: vec![],
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _index, _dir) = test_router().await;
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_search_lexical() {
        let (app, index, _dir) = test_router().await;
        index
            .upsert_chunks(&[chunk("reviewed the insulin schedule")])
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::get("/search?q=insulin&mode=lexical")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["mode"], "lexical");
        assert_eq!(body["results"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_rejects_empty_query() {
        let (app, _index, _dir) = test_router().await;
        let response = app
            .oneshot(
                Request::get("/search?q=%20%20")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_search_without_query_param_uses_error_envelope() {
        let (app, _index, _dir) = test_router().await;
        let response = app
            .oneshot(Request::get("/search").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // The extractor rejection must carry the same JSON shape as
        // handler-level errors.
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "bad_request");
        assert!(body["error"]["message"].is_string());
    }

    #[tokio::test]
    async fn test_search_rejects_unknown_mode() {
        let (app, _index, _dir) = test_router().await;
        let response = app
            .oneshot(
                Request::get("/search?q=insulin&mode=semantic")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rebuild_index_endpoint() {
        let (app, _index, dir) = test_router().await;

        let run_dir = dir.path().join("chunks/run-1");
        std::fs::create_dir_all(&run_dir).unwrap();
        std::fs::write(
            run_dir.join("visit-1.json"),
            serde_json::to_string(&vec![chunk("physical therapy referral")]).unwrap(),
        )
        .unwrap();

        let response = app
            .oneshot(
                Request::post("/rebuild-index")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["documents_indexed"], 1);
    }
}
