//! HTTP surface.
//!
//! Thin axum handlers over the builders and the cache coordinator. The
//! three index endpoints share one cached-serving path: consult the
//! cache, on a miss build under the current generation, hand the body
//! to a background cache write, and answer with `x-cache: MISS`. Single
//! lookups and writes go straight to the row store.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::{header, HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::cache::{CacheCoordinator, CachedResponse, PendingWrites};
use crate::config::AppConfig;
use crate::error::{IndexError, Result};
use crate::index::{categories, recordings, songs};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::store::{column_query, is_row_id, CellUpdate, Row, RowStore};

pub const SONG_INDEX_PATH: &str = "/api/song-index";
pub const RECORDINGS_INDEX_PATH: &str = "/api/recordings-index";
pub const CATEGORY_INDEX_PREFIX: &str = "/api/category-index";

/// Rows fetched per custom-id search attempt.
const SONG_SEARCH_LIMIT: u32 = 5;

/// Shared per-process state behind every handler.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn RowStore>,
    pub coordinator: Arc<CacheCoordinator>,
    pub pending_writes: Arc<PendingWrites>,
    /// Absent unless the server was started with metrics enabled.
    pub metrics: Option<Arc<Metrics>>,
}

pub type SharedState = Arc<AppState>;

/// Canonical cache identity of one request.
pub fn cache_key(method: &str, path: &str) -> String {
    format!("{} {}", method, path)
}

/// The finite set of derived-index keys invalidation purges: the two
/// main indexes plus one per configured category.
pub fn derived_cache_keys(config: &AppConfig) -> Vec<String> {
    let mut keys = vec![
        cache_key("GET", SONG_INDEX_PATH),
        cache_key("GET", RECORDINGS_INDEX_PATH),
    ];
    for slug in config.tables.categories.keys() {
        keys.push(cache_key(
            "GET",
            &format!("{}/{}", CATEGORY_INDEX_PREFIX, slug),
        ));
    }
    keys
}

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/api/song-index", get(song_index))
        .route("/api/recordings-index", get(recordings_index))
        .route("/api/category-index/{category}", get(category_index))
        .route("/api/song/{id}", get(song_lookup))
        .route(
            "/api/recording/{row_id}",
            get(recording_lookup).put(update_recording),
        )
        .route("/api/invalidate-cache", post(invalidate_cache))
        .route("/api/last-updated", get(last_updated))
        .route("/api/stats", get(stats))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Cached index serving
// ============================================================================

fn record<F: Fn(&Metrics)>(state: &AppState, f: F) {
    if let Some(metrics) = &state.metrics {
        f(metrics);
    }
}

fn cached_body_response(cached: &CachedResponse, cache_status: &'static str) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, cached.content_type.clone()),
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", cached.max_age_secs),
            ),
            (
                HeaderName::from_static("x-cache"),
                cache_status.to_string(),
            ),
        ],
        cached.body.clone(),
    )
        .into_response()
}

/// Serve one derived index through the cache. On a miss the builder
/// runs under the generation current at build start, the response is
/// answered immediately, and the cache write happens off the request
/// path (tracked for the shutdown drain).
async fn serve_cached_index<F, Fut>(state: SharedState, key: String, build: F) -> Result<Response>
where
    F: FnOnce(SharedState, u64) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    record(&state, Metrics::record_request);

    if let Some(cached) = state.coordinator.lookup(&key) {
        record(&state, Metrics::record_cache_hit);
        return Ok(cached_body_response(&cached, "HIT"));
    }
    record(&state, Metrics::record_cache_miss);

    let started = Instant::now();
    let generation = state.coordinator.generation();
    let body = build(Arc::clone(&state), generation).await?;
    if let Some(metrics) = &state.metrics {
        metrics.record_build(started.elapsed().as_millis() as u64);
    }

    let response = CachedResponse {
        body,
        content_type: "application/json".to_string(),
        max_age_secs: state.config.cache.index_ttl_secs,
    };
    state
        .pending_writes
        .spawn_write(Arc::clone(&state.coordinator), key, response.clone());
    Ok(cached_body_response(&response, "MISS"))
}

// ============================================================================
// Index handlers
// ============================================================================

pub async fn song_index(State(state): State<SharedState>) -> Result<Response> {
    let key = cache_key("GET", SONG_INDEX_PATH);
    serve_cached_index(state, key, |state, generation| async move {
        songs::build_song_index(state.store.as_ref(), &state.config, generation).await
    })
    .await
}

pub async fn recordings_index(State(state): State<SharedState>) -> Result<Response> {
    let key = cache_key("GET", RECORDINGS_INDEX_PATH);
    serve_cached_index(state, key, |state, generation| async move {
        recordings::build_recordings_index(state.store.as_ref(), &state.config, generation).await
    })
    .await
}

/// Unknown slugs fail inside the builder with `NotFound`, before any
/// upstream call, so they are never cached.
pub async fn category_index(
    State(state): State<SharedState>,
    Path(category): Path<String>,
) -> Result<Response> {
    let key = cache_key("GET", &format!("{}/{}", CATEGORY_INDEX_PREFIX, category));
    serve_cached_index(state, key, move |state, generation| async move {
        categories::build_category_index(state.store.as_ref(), &state.config, &category, generation)
            .await
    })
    .await
}

// ============================================================================
// Single lookups
// ============================================================================

/// Resolve a song by row id or custom id. Row ids (the store's `i-`
/// prefix) fetch directly; anything else searches the custom-id column
/// with the literal forms the store may hold: fenced `#id`, plain
/// `#id`, bare `id`. First non-empty result wins. A failed search logs
/// a warning and falls through to the next form; the upstream error
/// surfaces only when every form fails.
async fn find_song(state: &AppState, id: &str) -> Result<Row> {
    let table = &state.config.tables.songs;
    if is_row_id(id) {
        return state.store.get_row(table, id).await;
    }

    let column = &state.config.columns.song.custom_id;
    let candidates = [
        format!("```#{}```", id),
        format!("#{}", id),
        id.to_string(),
    ];
    let mut last_error = None;
    let mut any_succeeded = false;
    for candidate in &candidates {
        let query = column_query(column, candidate);
        match state
            .store
            .search_rows(table, &query, SONG_SEARCH_LIMIT)
            .await
        {
            Ok(rows) => {
                any_succeeded = true;
                if let Some(row) = rows.into_iter().next() {
                    return Ok(row);
                }
            }
            Err(err) => {
                warn!(id = %id, error = %err, "custom-id search failed, trying next form");
                last_error = Some(err);
            }
        }
    }
    match last_error {
        Some(err) if !any_succeeded => Err(err),
        _ => Err(IndexError::NotFound(format!("song '{}' not found", id))),
    }
}

fn single_lookup_response(state: &AppState, body: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", state.config.cache.index_ttl_secs),
            ),
        ],
        body,
    )
        .into_response()
}

/// Returns the raw row; consumers needing the full field set resolve
/// columns themselves.
pub async fn song_lookup(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response> {
    record(&state, Metrics::record_request);
    let row = find_song(&state, &id).await?;
    let body = serde_json::to_string(&row)?;
    Ok(single_lookup_response(&state, body))
}

pub async fn recording_lookup(
    State(state): State<SharedState>,
    Path(row_id): Path<String>,
) -> Result<Response> {
    record(&state, Metrics::record_request);
    let row = state
        .store
        .get_row(&state.config.tables.recordings, &row_id)
        .await?;
    let entry = recordings::recording_from_row(&row, &state.config.columns.recording)
        .ok_or_else(|| {
            IndexError::NotFound(format!("recording '{}' has no playable file", row_id))
        })?;
    let body = serde_json::to_string(&entry)?;
    Ok(single_lookup_response(&state, body))
}

// ============================================================================
// Rating writes
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UpdateRowBody {
    pub cells: Vec<CellUpdate>,
}

/// Check a rating write against the allow-list before anything reaches
/// the store: known columns only, integer values 1..=5 (numeric strings
/// accepted, matching the cell grammar).
pub fn validate_rating_update(cells: &[CellUpdate], allowed: &[String]) -> Result<()> {
    if cells.is_empty() {
        return Err(IndexError::ValidationRejected(
            "no cells to update".to_string(),
        ));
    }
    for cell in cells {
        if !allowed.iter().any(|column| column == &cell.column) {
            return Err(IndexError::ValidationRejected(format!(
                "column '{}' is not writable",
                cell.column
            )));
        }
        let rating = match &cell.value {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        let Some(rating) = rating else {
            return Err(IndexError::ValidationRejected(format!(
                "rating must be an integer, got {}",
                cell.value
            )));
        };
        if !(1..=5).contains(&rating) {
            return Err(IndexError::ValidationRejected(format!(
                "rating {} outside 1-5",
                rating
            )));
        }
    }
    Ok(())
}

pub async fn update_recording(
    State(state): State<SharedState>,
    Path(row_id): Path<String>,
    Json(body): Json<UpdateRowBody>,
) -> Result<Response> {
    record(&state, Metrics::record_request);
    validate_rating_update(&body.cells, &state.config.writes.rating_columns)?;
    state
        .store
        .update_row(&state.config.tables.recordings, &row_id, &body.cells)
        .await?;
    info!(row_id = %row_id, cells = body.cells.len(), "rating updated");
    Ok(Json(json!({ "ok": true, "rowId": row_id })).into_response())
}

// ============================================================================
// Invalidation + service endpoints
// ============================================================================

/// Advance the generation and purge every derived key. The marker is
/// persisted and the purge finished before the acknowledgment goes out.
pub async fn invalidate_cache(State(state): State<SharedState>) -> Result<Response> {
    record(&state, Metrics::record_request);
    record(&state, Metrics::record_invalidation);

    let generation = state.coordinator.advance_generation()?;
    let purged = state.coordinator.purge_derived();
    info!(generation, purged, "cache invalidated");

    Ok(Json(json!({
        "ok": true,
        "generation": generation,
        "purged": purged,
    }))
    .into_response())
}

pub async fn last_updated(State(state): State<SharedState>) -> Response {
    record(&state, Metrics::record_request);
    (
        StatusCode::OK,
        [(header::CACHE_CONTROL, "no-cache".to_string())],
        Json(json!({ "generation": state.coordinator.generation() })),
    )
        .into_response()
}

pub async fn stats(State(state): State<SharedState>) -> Json<MetricsSnapshot> {
    match &state.metrics {
        Some(metrics) => {
            metrics.record_request();
            Json(metrics.snapshot())
        }
        None => Json(MetricsSnapshot::default()),
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

// ============================================================================
// Error mapping
// ============================================================================

impl IntoResponse for IndexError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(code = self.code(), "request failed: {}", self);
        }
        let body = Json(json!({ "error": self.to_string(), "code": self.code() }));
        (status, body).into_response()
    }
}
