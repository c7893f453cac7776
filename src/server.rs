//! HTTP search API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/search/{query}` | First page, default limit |
//! | `GET`  | `/search/{query}/{limit}` | First page, explicit limit |
//! | `GET`  | `/search/{query}/{limit}/{page}` | Zero-based page |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Every search route accepts `?year=<int>`. The body is the serialized
//! [`SearchResult`](crate::models::SearchResult):
//!
//! ```json
//! { "query": "...", "results": [...], "years": [[1923, 4]],
//!   "collections": [["lambda", 4]],
//!   "meta": { "total": 4, "page": 0, "limit": 10, "returned": 4 } }
//! ```
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "limit must be an integer" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the results page is
//! served from a different origin.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::db;
use crate::error::SearchError;
use crate::models::{SearchQuery, SearchResult};
use crate::search::SearchService;
use crate::store::SqliteItemStore;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    search: Arc<SearchService>,
}

/// Starts the HTTP server on `[server].bind` and runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let service = SearchService::new(Arc::new(SqliteItemStore::new(pool)), &config.search);
    let app = router(service);

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "search API listening");
    println!("Search API listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router around a search service.
pub fn router(service: SearchService) -> Router {
    let state = AppState {
        search: Arc::new(service),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search/{query}", get(handle_search))
        .route("/search/{query}/", get(handle_search))
        .route("/search/{query}/{limit}", get(handle_search_limit))
        .route("/search/{query}/{limit}/{page}", get(handle_search_page))
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

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidParameter(msg) => bad_request(msg),
            SearchError::Store(e) => {
                error!(error = %e, "search failed");
                internal("search failed")
            }
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /search/... ============

#[derive(Debug, Deserialize)]
struct SearchParams {
    year: Option<String>,
}

/// Parse a path or query segment as an integer, naming it in the error.
fn parse_int<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, AppError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| bad_request(format!("{} must be an integer, got {:?}", name, raw)))
}

async fn run_query(
    state: &AppState,
    query: String,
    limit: Option<&str>,
    page: Option<&str>,
    params: &SearchParams,
) -> Result<Json<SearchResult>, AppError> {
    let limit = match limit {
        Some(raw) => parse_int::<i64>("limit", raw)?,
        None => state.search.default_limit(),
    };
    let page = match page {
        Some(raw) => parse_int::<i64>("page", raw)?,
        None => 0,
    };
    let year = match params.year.as_deref() {
        Some(raw) if !raw.trim().is_empty() => Some(parse_int::<i32>("year", raw)?),
        _ => None,
    };

    let request = SearchQuery {
        query,
        year,
        limit,
        page,
    };
    let result = state.search.search(&request).await?;
    Ok(Json(result))
}

async fn handle_search(
    State(state): State<AppState>,
    Path(query): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResult>, AppError> {
    run_query(&state, query, None, None, &params).await
}

async fn handle_search_limit(
    State(state): State<AppState>,
    Path((query, limit)): Path<(String, String)>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResult>, AppError> {
    run_query(&state, query, Some(&limit), None, &params).await
}

async fn handle_search_page(
    State(state): State<AppState>,
    Path((query, limit, page)): Path<(String, String, String)>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResult>, AppError> {
    run_query(&state, query, Some(&limit), Some(&page), &params).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::migrate;
    use crate::store::{ItemRecord, ItemStore};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    async fn spawn_app() -> (TempDir, String) {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("srv.sqlite")).await.unwrap();
        migrate::apply_schema(&pool).await.unwrap();
        let store = SqliteItemStore::new(pool);

        for (i, year) in [1921, 1921, 1922].iter().enumerate() {
            store
                .upsert_item(&ItemRecord {
                    id: format!("item{}", i),
                    collection: "lambda".into(),
                    title: format!("Issue {}", i),
                    image_url: None,
                    date: NaiveDate::from_ymd_opt(*year, 2, 1).unwrap(),
                    year: *year,
                    full_text: "the harbour froze solid".into(),
                })
                .await
                .unwrap();
        }

        let app = router(SearchService::new(Arc::new(store), &SearchConfig::default()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (tmp, format!("http://{}", addr))
    }

    async fn get_json(url: &str) -> (u16, serde_json::Value) {
        let resp = reqwest::get(url).await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (_tmp, base) = spawn_app().await;
        let (status, body) = get_json(&format!("{}/health", base)).await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_search_routes() {
        let (_tmp, base) = spawn_app().await;

        let (status, body) = get_json(&format!("{}/search/harbour", base)).await;
        assert_eq!(status, 200);
        assert_eq!(body["meta"]["total"], 3);
        assert_eq!(body["meta"]["limit"], 10);
        assert_eq!(body["years"][0][0], 1921);
        assert_eq!(body["years"][0][1], 2);
        assert_eq!(body["collections"][0][0], "lambda");
        assert!(body["results"][0]["snippets"][0]
            .as_str()
            .unwrap()
            .contains("<b>harbour</b>"));

        let (status, body) = get_json(&format!("{}/search/harbour/", base)).await;
        assert_eq!(status, 200);
        assert_eq!(body["meta"]["total"], 3);

        let (_, body) = get_json(&format!("{}/search/harbour/2/1", base)).await;
        assert_eq!(body["meta"]["page"], 1);
        assert_eq!(body["meta"]["returned"], 1);

        let (_, body) = get_json(&format!("{}/search/harbour/10?year=1922", base)).await;
        assert_eq!(body["meta"]["total"], 1);
        assert_eq!(body["results"][0]["year"], 1922);
    }

    #[tokio::test]
    async fn test_bad_parameters() {
        let (_tmp, base) = spawn_app().await;

        for path in [
            "/search/harbour/ten",
            "/search/harbour/10/first",
            "/search/harbour?year=nineteen",
            "/search/harbour/0",
            "/search/harbour/1000",
        ] {
            let (status, body) = get_json(&format!("{}{}", base, path)).await;
            assert_eq!(status, 400, "{}", path);
            assert_eq!(body["error"]["code"], "bad_request", "{}", path);
        }
    }
}
