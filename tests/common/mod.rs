//! Fake catalog served by axum on an ephemeral port, with request counters.
#![allow(dead_code)]

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Debug, Default)]
pub struct Counters {
    pub search: AtomicUsize,
    pub details: AtomicUsize,
    pub downloads: AtomicUsize,
    pub images: AtomicUsize,
    /// Arrival time of every metadata request.
    pub details_at: Mutex<Vec<Instant>>,
}

impl Counters {
    /// Requests for per-item artifacts (everything but listing).
    pub fn item_requests(&self) -> usize {
        self.details.load(Ordering::SeqCst)
            + self.downloads.load(Ordering::SeqCst)
            + self.images.load(Ordering::SeqCst)
    }

    pub fn searches(&self) -> usize {
        self.search.load(Ordering::SeqCst)
    }

    /// Metadata request arrival times, oldest first.
    pub fn details_times(&self) -> Vec<Instant> {
        let mut times = self.details_at.lock().unwrap().clone();
        times.sort();
        times
    }
}

#[derive(Debug, Clone)]
pub struct FakeItem {
    pub id: String,
    pub title: Option<String>,
    pub year: Option<String>,
    pub date: Option<String>,
    /// OCR text; `None` leaves it out of the manifest.
    pub text: Option<String>,
    /// Manifest lists the OCR file but downloading it returns 404.
    pub text_gone: bool,
}

impl FakeItem {
    pub fn new(id: &str, year: i32, text: &str) -> Self {
        Self {
            id: id.to_string(),
            title: Some(format!("Issue {}", id)),
            year: Some(year.to_string()),
            date: Some(format!("{}-05-02", year)),
            text: Some(text.to_string()),
            text_gone: false,
        }
    }

    pub fn without_text(mut self) -> Self {
        self.text = None;
        self
    }

    pub fn without_title(mut self) -> Self {
        self.title = None;
        self
    }

    pub fn with_date(mut self, date: Option<&str>) -> Self {
        self.date = date.map(str::to_string);
        self
    }

    pub fn with_year(mut self, year: Option<&str>) -> Self {
        self.year = year.map(str::to_string);
        self
    }

    pub fn with_text_gone(mut self) -> Self {
        self.text_gone = true;
        self
    }

    fn ocr_file(&self) -> String {
        format!("{}_djvu.txt", self.id)
    }
}

#[derive(Clone)]
struct FakeState {
    base: String,
    collections: Arc<HashMap<String, Vec<FakeItem>>>,
    counters: Arc<Counters>,
}

impl FakeState {
    fn item(&self, id: &str) -> Option<&FakeItem> {
        self.collections
            .values()
            .flat_map(|items| items.iter())
            .find(|i| i.id == id)
    }
}

pub struct FakeCatalog {
    pub base_url: String,
    pub counters: Arc<Counters>,
}

/// Serve `collections` until the test runtime shuts down.
pub async fn spawn(collections: Vec<(&str, Vec<FakeItem>)>) -> FakeCatalog {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let counters = Arc::new(Counters::default());

    let state = FakeState {
        base: base_url.clone(),
        collections: Arc::new(
            collections
                .into_iter()
                .map(|(name, items)| (name.to_string(), items))
                .collect(),
        ),
        counters: counters.clone(),
    };

    let app = Router::new()
        .route("/advancedsearch.php", get(advanced_search))
        .route("/details/{id}", get(details))
        .route("/download/{id}/{file}", get(download))
        .route("/services/img/{id}", get(image))
        .with_state(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeCatalog { base_url, counters }
}

async fn advanced_search(
    State(state): State<FakeState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.counters.search.fetch_add(1, Ordering::SeqCst);

    let collection = params
        .get("q")
        .and_then(|q| q.strip_prefix("collection:"))
        .unwrap_or_default();
    let rows: usize = params.get("rows").and_then(|r| r.parse().ok()).unwrap_or(50);
    let page: usize = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);

    let items = state
        .collections
        .get(collection)
        .cloned()
        .unwrap_or_default();
    let start = (page.saturating_sub(1) * rows).min(items.len());
    let end = (start + rows).min(items.len());
    let docs: Vec<_> = items[start..end]
        .iter()
        .map(|i| json!({ "identifier": i.id }))
        .collect();

    Json(json!({
        "responseHeader": { "status": 0 },
        "response": { "numFound": items.len(), "start": start, "docs": docs }
    }))
    .into_response()
}

async fn details(State(state): State<FakeState>, Path(id): Path<String>) -> Response {
    state.counters.details.fetch_add(1, Ordering::SeqCst);
    state.counters.details_at.lock().unwrap().push(Instant::now());

    let Some(item) = state.item(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mut metadata = serde_json::Map::new();
    metadata.insert("identifier".into(), json!([item.id]));
    if let Some(ref t) = item.title {
        metadata.insert("title".into(), json!([t]));
    }
    if let Some(ref y) = item.year {
        metadata.insert("year".into(), json!([y]));
    }
    if let Some(ref d) = item.date {
        metadata.insert("date".into(), json!([d]));
    }

    let mut files = serde_json::Map::new();
    files.insert(format!("/{}.pdf", item.id), json!({ "format": "Text PDF" }));
    if item.text.is_some() || item.text_gone {
        files.insert(format!("/{}", item.ocr_file()), json!({ "format": "DjVuTXT" }));
    }

    Json(json!({
        "metadata": metadata,
        "misc": { "image": format!("{}/services/img/{}", state.base, item.id) },
        "files": files,
    }))
    .into_response()
}

async fn download(
    State(state): State<FakeState>,
    Path((id, file)): Path<(String, String)>,
) -> Response {
    state.counters.downloads.fetch_add(1, Ordering::SeqCst);

    match state.item(&id) {
        Some(item) if !item.text_gone && file == item.ocr_file() => match &item.text {
            Some(text) => text.clone().into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        },
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn image(State(state): State<FakeState>, Path(id): Path<String>) -> Response {
    state.counters.images.fetch_add(1, Ordering::SeqCst);

    if state.item(&id).is_some() {
        b"GIF89a".to_vec().into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}
