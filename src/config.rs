//! Static service configuration.
//!
//! Everything the pipeline needs to know about the upstream document
//! (table ids, column ids, category slugs, cache TTLs) is loaded once
//! from a YAML file and injected into the components that need it;
//! builders never consult ambient globals. The bearer credential is
//! deliberately not part of this structure: it is read from the
//! environment at startup and lives only inside the HTTP client, so
//! config values can be printed and logged freely.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// Environment variable holding the row store bearer credential.
pub const API_TOKEN_ENV: &str = "SONGDEX_API_TOKEN";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub tables: TableConfig,
    pub columns: ColumnConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub writes: WriteConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Base URL of the row store API, without a trailing slash.
    pub base_url: String,
    /// Document the source tables live in.
    pub doc_id: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TableConfig {
    pub songs: String,
    pub recordings: String,
    /// Category slug (URL segment) to table id. Ordered so the derived
    /// cache key enumeration is stable.
    #[serde(default)]
    pub categories: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColumnConfig {
    pub song: SongColumns,
    pub recording: RecordingColumns,
}

/// Column ids of the songs table used by the entity index.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SongColumns {
    pub name: String,
    pub custom_id: String,
    pub composer: String,
    pub court: String,
    pub scale: String,
    pub rhythm: String,
    pub lyrics: String,
    pub collections: String,
    pub occasions: String,
    pub themes: String,
}

/// Column ids of the recordings table used by both recording-facing
/// builders.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordingColumns {
    /// Back-reference to the parent song.
    pub song: String,
    pub files: String,
    pub notes: String,
    pub performers: String,
    pub album: String,
    pub rating: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_index_ttl_secs")]
    pub index_ttl_secs: u64,
    /// Directory the generation marker is persisted under.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WriteConfig {
    /// Columns a rating update is allowed to touch. Empty means the
    /// write endpoint rejects everything.
    #[serde(default)]
    pub rating_columns: Vec<String>,
}

fn default_timeout_secs() -> u64 {
    25
}

fn default_page_size() -> u32 {
    500
}

fn default_index_ttl_secs() -> u64 {
    300
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            index_ttl_secs: default_index_ttl_secs(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_bind(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.store.base_url.trim().is_empty() {
            return Err(IndexError::InvalidConfig("store.base_url is empty".into()));
        }
        if self.store.doc_id.trim().is_empty() {
            return Err(IndexError::InvalidConfig("store.doc_id is empty".into()));
        }
        if self.store.page_size == 0 {
            return Err(IndexError::InvalidConfig("store.page_size must be > 0".into()));
        }
        for (slug, table) in &self.tables.categories {
            if slug.trim().is_empty() || table.trim().is_empty() {
                return Err(IndexError::InvalidConfig(
                    "tables.categories entries must have non-empty slug and table id".into(),
                ));
            }
        }
        Ok(())
    }

    /// Table id for a category slug, if configured.
    pub fn category_table(&self, slug: &str) -> Option<&str> {
        self.tables.categories.get(slug).map(String::as_str)
    }
}

/// Bearer credential from the hosting environment. Returns `None` when
/// unset or blank so the caller can fail with a pointed message.
pub fn api_token_from_env() -> Option<String> {
    std::env::var(API_TOKEN_ENV)
        .ok()
        .filter(|token| !token.trim().is_empty())
}
