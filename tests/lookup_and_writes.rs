//! Single lookups and the rating write path.
//!
//! Validates that:
//! - Row ids resolve directly; custom ids try the fenced, plain-hash,
//!   and bare column forms in order and take the first hit
//! - A failed search form falls through to the next; the upstream error
//!   surfaces only when every form fails
//! - Unresolvable song ids answer 404
//! - Single lookups carry Cache-Control but bypass the response cache
//! - Recording lookups mirror index entries; rows without a playable
//!   first file answer 404
//! - Invalid rating writes are rejected before anything reaches the
//!   store; valid writes forward the cells unchanged
//! - /health and /api/stats answer without upstream access

mod common;

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use songdex::cache::PendingWrites;
use songdex::server::{self, AppState, UpdateRowBody};
use songdex::store::CellUpdate;

use common::{row, server_with, test_config, MockRowStore, TestServer};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn parts(resp: Response) -> (StatusCode, String, Value) {
    let (head, body) = resp.into_parts();
    let cache_control = head
        .headers
        .get("cache-control")
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let payload = serde_json::from_slice(&bytes).unwrap();
    (head.status, cache_control, payload)
}

fn fixture() -> TestServer {
    let songs = vec![
        row(
            "i-song-152",
            Some("Fenced"),
            &[("c-name", json!("Fenced")), ("c-custom", json!("```#152```"))],
        ),
        row(
            "i-song-77",
            Some("Plain"),
            &[("c-name", json!("Plain")), ("c-custom", json!("#77"))],
        ),
        row(
            "i-song-33",
            Some("Bare"),
            &[("c-name", json!("Bare")), ("c-custom", json!("33"))],
        ),
    ];

    let recordings = vec![
        row(
            "i-rec-ok",
            None,
            &[
                ("c-song", json!([{ "name": "#152" }])),
                (
                    "c-files",
                    json!([{ "url": "https://cdn.example.com/take.mp3", "name": "```take.mp3```" }]),
                ),
                ("c-rating", json!("4")),
                ("c-performers", json!("```Choir```")),
            ],
        ),
        row(
            "i-rec-bad",
            None,
            &[("c-files", json!([{ "name": "missing-url.mp3" }]))],
        ),
    ];

    let store = MockRowStore::new()
        .with_table("grid-songs", songs)
        .with_table("grid-recordings", recordings);
    server_with(test_config(&[]), store)
}

async fn update(
    t: &TestServer,
    row_id: &str,
    cells: Vec<CellUpdate>,
) -> Result<Response, songdex::IndexError> {
    server::update_recording(
        State(t.state.clone()),
        Path(row_id.to_string()),
        Json(UpdateRowBody { cells }),
    )
    .await
}

fn cell(column: &str, value: Value) -> CellUpdate {
    CellUpdate {
        column: column.to_string(),
        value,
    }
}

// ---------------------------------------------------------------------------
// Song lookup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_row_id_resolves_directly() {
    let t = fixture();

    let resp = server::song_lookup(State(t.state.clone()), Path("i-song-152".to_string()))
        .await
        .unwrap();
    let (status, cache_control, body) = parts(resp).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache_control, "public, max-age=300");
    // Raw row, not an index entry.
    assert_eq!(body["id"], json!("i-song-152"));
    assert!(body.get("values").is_some());

    // Single lookups never populate the response cache.
    assert!(t.state.coordinator.lookup("GET /api/song/i-song-152").is_none());
}

#[tokio::test]
async fn test_custom_id_tries_fenced_then_plain_then_bare() {
    let t = fixture();

    let cases = [("152", "i-song-152"), ("77", "i-song-77"), ("33", "i-song-33")];
    for (id, expected_row) in cases {
        let resp = server::song_lookup(State(t.state.clone()), Path(id.to_string()))
            .await
            .unwrap();
        let (status, _, body) = parts(resp).await;
        assert_eq!(status, StatusCode::OK, "lookup {}", id);
        assert_eq!(body["id"], json!(expected_row), "lookup {}", id);
    }
}

#[tokio::test]
async fn test_failed_search_form_falls_through_to_the_next() {
    let t = fixture();
    // Fenced-form queries error; the plain #id form still matches.
    t.store.fail_searches_containing("```");

    let resp = server::song_lookup(State(t.state.clone()), Path("77".to_string()))
        .await
        .unwrap();
    let (status, _, body) = parts(resp).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], json!("i-song-77"));
}

#[tokio::test]
async fn test_upstream_error_surfaces_only_when_every_form_fails() {
    let t = fixture();
    t.store.fail_searches_containing("c-custom:");

    let err = server::song_lookup(State(t.state.clone()), Path("77".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);

    // One failing form plus clean-but-empty ones still answers 404.
    let t = fixture();
    t.store.fail_searches_containing("```");
    let err = server::song_lookup(State(t.state.clone()), Path("9999".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_song_answers_not_found() {
    let t = fixture();

    let err = server::song_lookup(State(t.state.clone()), Path("404".to_string()))
        .await
        .unwrap_err();
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let payload: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(payload["code"], json!("NOT_FOUND"));
}

// ---------------------------------------------------------------------------
// Recording lookup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_recording_lookup_mirrors_index_entry_shape() {
    let t = fixture();

    let resp = server::recording_lookup(State(t.state.clone()), Path("i-rec-ok".to_string()))
        .await
        .unwrap();
    let (status, cache_control, body) = parts(resp).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache_control, "public, max-age=300");
    assert_eq!(body["rowId"], json!("i-rec-ok"));
    assert_eq!(body["url"], json!("https://cdn.example.com/take.mp3"));
    assert_eq!(body["title"], json!("take.mp3"));
    assert_eq!(body["performers"], json!("Choir"));
    assert_eq!(body["rating"], json!(4));
    // No group to rank against on a single lookup.
    assert!(body.get("position").is_none());
}

#[tokio::test]
async fn test_recording_without_playable_file_answers_not_found() {
    let t = fixture();

    let err = server::recording_lookup(State(t.state.clone()), Path("i-rec-bad".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Rating writes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_rating_write_forwards_cells_unchanged() {
    let t = fixture();

    let resp = update(&t, "i-rec-ok", vec![cell("c-rating", json!(4))])
        .await
        .unwrap();
    let (status, _, body) = parts(resp).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["rowId"], json!("i-rec-ok"));

    let updates = t.store.recorded_updates();
    assert_eq!(updates.len(), 1);
    let (table, row_id, cells) = &updates[0];
    assert_eq!(table, "grid-recordings");
    assert_eq!(row_id, "i-rec-ok");
    assert_eq!(cells, &vec![cell("c-rating", json!(4))]);
}

#[tokio::test]
async fn test_disallowed_column_never_reaches_the_store() {
    let t = fixture();

    let err = update(&t, "i-rec-ok", vec![cell("c-performers", json!(3))])
        .await
        .unwrap_err();
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let payload: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(payload["code"], json!("VALIDATION_REJECTED"));

    assert!(t.store.recorded_updates().is_empty());
}

#[tokio::test]
async fn test_out_of_range_and_non_integer_ratings_rejected() {
    let t = fixture();

    for value in [json!(0), json!(6), json!("loud"), json!(2.5)] {
        let err = update(&t, "i-rec-ok", vec![cell("c-rating", value.clone())])
            .await
            .unwrap_err();
        assert_eq!(
            err.into_response().status(),
            StatusCode::BAD_REQUEST,
            "value {}",
            value
        );
    }
    assert!(t.store.recorded_updates().is_empty());
}

// ---------------------------------------------------------------------------
// Service endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health_reports_version() {
    let Json(body) = server::health().await;
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["version"], json!(env!("CARGO_PKG_VERSION")));
}

#[tokio::test]
async fn test_stats_counts_requests_when_enabled() {
    let t = fixture();

    let _ = server::song_lookup(State(t.state.clone()), Path("i-song-152".to_string())).await;
    let Json(snapshot) = server::stats(State(t.state.clone())).await;
    // The stats call itself is counted too.
    assert_eq!(snapshot.requests_total, 2);
}

#[tokio::test]
async fn test_stats_zeroed_when_metrics_disabled() {
    let t = fixture();
    let disabled = Arc::new(AppState {
        config: test_config(&[]),
        store: t.store.clone(),
        coordinator: t.state.coordinator.clone(),
        pending_writes: Arc::new(PendingWrites::default()),
        metrics: None,
    });

    let Json(snapshot) = server::stats(State(disabled)).await;
    assert_eq!(snapshot.requests_total, 0);
    assert_eq!(snapshot.cache_hits, 0);
    assert_eq!(snapshot.index_builds, 0);
}
