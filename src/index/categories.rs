//! Category lookup indexes.
//!
//! One document per configured category collection (composers, courts,
//! albums, ...), keyed by display name for O(1) consumer lookup. The
//! custom-id and image fields come from best-effort whole-row scans:
//! the source collections have no designated columns for them, so we
//! scan every cell and fall back to null. The scans stay isolated in
//! this module; nothing else may depend on them.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::Serialize;

use crate::config::AppConfig;
use crate::error::{IndexError, Result};
use crate::store::reader::fetch_all_rows;
use crate::store::value::{clean_text, CellValue};
use crate::store::{Row, RowStore};

/// One category row's payload. Heuristic misses serialize as explicit
/// nulls, never omitted keys.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryEntry {
    pub row_id: String,
    pub custom_id: Option<String>,
    pub image: Option<String>,
}

/// One category's lookup document, keyed by display name.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryIndex {
    pub generation: u64,
    pub category: String,
    pub count: u32,
    pub entries: BTreeMap<String, CategoryEntry>,
}

fn custom_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"#(\d+)").expect("valid literal pattern"))
}

fn image_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(image|/blobs/|\.(png|jpe?g|gif|webp|svg)([?#]|$))")
            .expect("valid literal pattern")
    })
}

/// Scan text cells, in column-id order, for a `#`-prefixed digit run.
/// First match wins; cells with a `#` but no adjacent digits do not
/// stop the scan.
fn scan_custom_id(row: &Row) -> Option<String> {
    for value in row.values.values() {
        let CellValue::Text(raw) = value else {
            continue;
        };
        if !raw.contains('#') {
            continue;
        }
        let cleaned = clean_text(raw);
        if let Some(captures) = custom_id_pattern().captures(&cleaned) {
            return Some(captures[1].to_string());
        }
    }
    None
}

/// Scan reference cells, in column-id order, for the first URL that
/// looks like an image: a known raster extension, an "image" substring,
/// or a hosted-blob path.
fn scan_image_url(row: &Row) -> Option<String> {
    for value in row.values.values() {
        let Some(reference) = value.references().first().copied() else {
            continue;
        };
        let Some(url) = reference.url.as_deref() else {
            continue;
        };
        if image_url_pattern().is_match(url) {
            return Some(url.to_string());
        }
    }
    None
}

/// Build one category's entries. Nameless rows are skipped; when two
/// rows share a display name the first one seen stays canonical.
pub fn assemble_category_index(category: &str, rows: &[Row], generation: u64) -> CategoryIndex {
    let mut entries: BTreeMap<String, CategoryEntry> = BTreeMap::new();

    for row in rows {
        let Some(name) = row.display_name() else {
            continue;
        };
        entries.entry(name).or_insert_with(|| CategoryEntry {
            row_id: row.id.clone(),
            custom_id: scan_custom_id(row),
            image: scan_image_url(row),
        });
    }

    CategoryIndex {
        generation,
        category: category.to_string(),
        count: entries.len() as u32,
        entries,
    }
}

/// Fetch one configured category collection and serialize its index.
/// Unknown slugs are a [`IndexError::NotFound`], checked before any
/// upstream call.
pub async fn build_category_index(
    store: &dyn RowStore,
    config: &AppConfig,
    category: &str,
    generation: u64,
) -> Result<String> {
    let table = config
        .category_table(category)
        .ok_or_else(|| IndexError::NotFound(format!("unknown category '{}'", category)))?;
    let rows = fetch_all_rows(store, table, config.store.page_size).await?;
    let index = assemble_category_index(category, &rows, generation);
    Ok(serde_json::to_string(&index)?)
}
