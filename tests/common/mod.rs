//! Shared fixtures: an in-memory row store double, row builders, and a
//! fully wired server state for exercising handlers directly.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use songdex::cache::{CacheCoordinator, MemoryResponseCache, PendingWrites};
use songdex::config::{
    AppConfig, CacheConfig, ColumnConfig, RecordingColumns, ServerConfig, SongColumns,
    StoreConfig, TableConfig, WriteConfig,
};
use songdex::error::{IndexError, Result};
use songdex::kv::FileKvStore;
use songdex::metrics::Metrics;
use songdex::server::{derived_cache_keys, AppState, SharedState};
use songdex::store::value::CellValue;
use songdex::store::{CellUpdate, Row, RowPage, RowStore};

// ---------------------------------------------------------------------------
// Row builders
// ---------------------------------------------------------------------------

/// Build a row from raw cell JSON, the way the store would return it.
pub fn row(id: &str, name: Option<&str>, cells: &[(&str, serde_json::Value)]) -> Row {
    Row {
        id: id.to_string(),
        name: name.map(str::to_string),
        values: cells
            .iter()
            .map(|(column, value)| {
                let cell: CellValue = serde_json::from_value(value.clone()).unwrap();
                (column.to_string(), cell)
            })
            .collect(),
    }
}

/// A recording row pointing at a parent song, with one playable file.
pub fn recording_row(id: &str, song_custom_id: &str, url: &str, rating: &str) -> Row {
    row(
        id,
        None,
        &[
            (
                "c-song",
                json!([{ "rowId": format!("i-parent-{}", song_custom_id), "name": format!("```#{}```", song_custom_id) }]),
            ),
            ("c-files", json!([{ "url": url, "name": "take.mp3" }])),
            ("c-rating", json!(rating)),
        ],
    )
}

// ---------------------------------------------------------------------------
// In-memory row store
// ---------------------------------------------------------------------------

/// Row store double backed by fixed tables. Pagination uses numeric
/// offset tokens; searches understand the `column:"value"` query syntax
/// against raw text cells and can be armed to fail; updates are
/// recorded, never applied.
pub struct MockRowStore {
    tables: BTreeMap<String, Vec<Row>>,
    pub updates: Mutex<Vec<(String, String, Vec<CellUpdate>)>>,
    pub list_calls: AtomicU64,
    search_failures: Mutex<Vec<String>>,
}

impl MockRowStore {
    pub fn new() -> Self {
        MockRowStore {
            tables: BTreeMap::new(),
            updates: Mutex::new(Vec::new()),
            list_calls: AtomicU64::new(0),
            search_failures: Mutex::new(Vec::new()),
        }
    }

    pub fn with_table(mut self, table: &str, rows: Vec<Row>) -> Self {
        self.tables.insert(table.to_string(), rows);
        self
    }

    pub fn recorded_updates(&self) -> Vec<(String, String, Vec<CellUpdate>)> {
        self.updates.lock().unwrap().clone()
    }

    /// Arm a search failure: any later query containing the marker
    /// answers `UpstreamUnavailable` instead of matching.
    pub fn fail_searches_containing(&self, marker: &str) {
        self.search_failures.lock().unwrap().push(marker.to_string());
    }
}

#[async_trait]
impl RowStore for MockRowStore {
    async fn list_rows(
        &self,
        table: &str,
        page_token: Option<&str>,
        limit: u32,
    ) -> Result<RowPage> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        let rows = self
            .tables
            .get(table)
            .ok_or_else(|| IndexError::NotFound(format!("table '{}'", table)))?;
        let start = page_token
            .and_then(|token| token.parse::<usize>().ok())
            .unwrap_or(0);
        let end = (start + limit as usize).min(rows.len());
        let next_page_token = (end < rows.len()).then(|| end.to_string());
        Ok(RowPage {
            items: rows[start..end].to_vec(),
            next_page_token,
        })
    }

    async fn get_row(&self, table: &str, row_id: &str) -> Result<Row> {
        self.tables
            .get(table)
            .and_then(|rows| rows.iter().find(|r| r.id == row_id))
            .cloned()
            .ok_or_else(|| IndexError::NotFound(format!("row '{}' in '{}'", row_id, table)))
    }

    async fn search_rows(&self, table: &str, query: &str, limit: u32) -> Result<Vec<Row>> {
        if self
            .search_failures
            .lock()
            .unwrap()
            .iter()
            .any(|marker| query.contains(marker.as_str()))
        {
            return Err(IndexError::UpstreamUnavailable {
                collection: table.to_string(),
                status: 400,
            });
        }

        let Some((column, quoted)) = query.split_once(':') else {
            return Ok(Vec::new());
        };
        // column_query escapes with {:?}, which matches JSON string
        // escaping for the values these tests use.
        let value: String = serde_json::from_str(quoted).unwrap_or_default();
        Ok(self
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| {
                        matches!(r.value(column), Some(CellValue::Text(s)) if *s == value)
                    })
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update_row(&self, table: &str, row_id: &str, cells: &[CellUpdate]) -> Result<()> {
        self.updates.lock().unwrap().push((
            table.to_string(),
            row_id.to_string(),
            cells.to_vec(),
        ));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config + server wiring
// ---------------------------------------------------------------------------

pub fn test_config(categories: &[&str]) -> AppConfig {
    AppConfig {
        store: StoreConfig {
            base_url: "https://rows.example.com/v1".to_string(),
            doc_id: "doc-test".to_string(),
            timeout_secs: 5,
            page_size: 500,
        },
        tables: TableConfig {
            songs: "grid-songs".to_string(),
            recordings: "grid-recordings".to_string(),
            categories: categories
                .iter()
                .map(|slug| (slug.to_string(), format!("grid-{}", slug)))
                .collect(),
        },
        columns: ColumnConfig {
            song: SongColumns {
                name: "c-name".to_string(),
                custom_id: "c-custom".to_string(),
                composer: "c-composer".to_string(),
                court: "c-court".to_string(),
                scale: "c-scale".to_string(),
                rhythm: "c-rhythm".to_string(),
                lyrics: "c-lyrics".to_string(),
                collections: "c-collections".to_string(),
                occasions: "c-occasions".to_string(),
                themes: "c-themes".to_string(),
            },
            recording: RecordingColumns {
                song: "c-song".to_string(),
                files: "c-files".to_string(),
                notes: "c-notes".to_string(),
                performers: "c-performers".to_string(),
                album: "c-album".to_string(),
                rating: "c-rating".to_string(),
            },
        },
        cache: CacheConfig::default(),
        server: ServerConfig::default(),
        writes: WriteConfig {
            rating_columns: vec!["c-rating".to_string()],
        },
    }
}

/// A wired server state over the mock store. The temp dir backs the
/// generation marker and must outlive the state.
pub struct TestServer {
    pub state: SharedState,
    pub store: Arc<MockRowStore>,
    _data_dir: TempDir,
}

pub fn server_with(config: AppConfig, store: MockRowStore) -> TestServer {
    let data_dir = TempDir::new().unwrap();
    let kv = FileKvStore::open(data_dir.path()).unwrap();
    let coordinator = CacheCoordinator::new(
        Box::new(kv),
        Box::new(MemoryResponseCache::default()),
        derived_cache_keys(&config),
    )
    .unwrap();

    let store = Arc::new(store);
    let state = Arc::new(AppState {
        config,
        store: store.clone(),
        coordinator: Arc::new(coordinator),
        pending_writes: Arc::new(PendingWrites::default()),
        metrics: Some(Arc::new(Metrics::new())),
    });
    TestServer {
        state,
        store,
        _data_dir: data_dir,
    }
}
