//! Song index.
//!
//! The primary listing document: one entry per named song, denormalized
//! for client-side search and filtering, each carrying a summary of its
//! best available recording. Built from two collections fetched
//! concurrently; either fetch failing aborts the build so a partial
//! join can never be cached.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{AppConfig, SongColumns};
use crate::error::Result;
use crate::store::reader::fetch_all_rows;
use crate::store::value::{resolve_relation, CellValue};
use crate::store::{Row, RowStore};

use super::best::{group_candidates, select_best, BestMatch};
use super::{cell_text, non_empty};

/// Longest lyrics excerpt carried by an index entry; the full text
/// stays behind the single-song endpoint.
const LYRICS_EXCERPT_CHARS: usize = 80;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SongIndexEntry {
    /// Custom id when the song has one, row id otherwise.
    pub id: String,
    pub row_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composer_row_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub court: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub court_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub court_row_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rhythm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occasions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub themes: Option<String>,
    pub has_recordings: bool,
    pub recording_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_recording_row_id: Option<String>,
    /// 0 means recordings exist but none is rated; absent means no
    /// recordings at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_recording_rating: Option<u8>,
}

/// The full song index document, entries in source row order.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongIndex {
    pub generation: u64,
    pub count: u32,
    pub songs: Vec<SongIndexEntry>,
}

/// Truncate to the excerpt length on a character boundary; untouched
/// when already short enough.
fn excerpt(text: String) -> String {
    match text.char_indices().nth(LYRICS_EXCERPT_CHARS) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text,
    }
}

/// Build one index entry. `None` when the row has no display name;
/// nameless rows are drafts in the source and never indexed.
fn song_entry(
    row: &Row,
    best: &BTreeMap<String, BestMatch>,
    columns: &SongColumns,
) -> Option<SongIndexEntry> {
    let name = cell_text(row, &columns.name)?;
    let custom_id = row.value(&columns.custom_id).and_then(CellValue::custom_id);

    let composer_rel = resolve_relation(row.value(&columns.composer));
    let composer = non_empty(composer_rel.text);
    let composer_id = composer_rel.custom_id.or_else(|| composer.clone());

    let court_rel = resolve_relation(row.value(&columns.court));
    let court = non_empty(court_rel.text);
    let court_id = court_rel.custom_id.or_else(|| court.clone());

    // Best-match lookup joins on custom id only; songs without one
    // never carry a recording summary.
    let summary = custom_id.as_deref().and_then(|id| best.get(id));

    Some(SongIndexEntry {
        id: custom_id.clone().unwrap_or_else(|| row.id.clone()),
        row_id: row.id.clone(),
        name,
        composer,
        composer_id,
        composer_row_id: composer_rel.row_id,
        court,
        court_id,
        court_row_id: court_rel.row_id,
        scale: cell_text(row, &columns.scale),
        rhythm: cell_text(row, &columns.rhythm),
        lyrics: cell_text(row, &columns.lyrics).map(excerpt),
        collections: cell_text(row, &columns.collections),
        occasions: cell_text(row, &columns.occasions),
        themes: cell_text(row, &columns.themes),
        has_recordings: summary.is_some(),
        recording_count: summary.map_or(0, |s| s.count),
        best_recording_row_id: summary.map(|s| s.row_id.clone()),
        best_recording_rating: summary.map(|s| s.rating),
    })
}

pub fn assemble_song_index(
    songs: &[Row],
    best: &BTreeMap<String, BestMatch>,
    columns: &SongColumns,
    generation: u64,
) -> SongIndex {
    let entries: Vec<SongIndexEntry> = songs
        .iter()
        .filter_map(|row| song_entry(row, best, columns))
        .collect();
    SongIndex {
        generation,
        count: entries.len() as u32,
        songs: entries,
    }
}

/// Fetch both collections concurrently and serialize the joined index.
pub async fn build_song_index(
    store: &dyn RowStore,
    config: &AppConfig,
    generation: u64,
) -> Result<String> {
    let page_size = config.store.page_size;
    let (songs, recordings) = tokio::try_join!(
        fetch_all_rows(store, &config.tables.songs, page_size),
        fetch_all_rows(store, &config.tables.recordings, page_size),
    )?;
    let best = select_best(&group_candidates(&recordings, &config.columns.recording));
    let index = assemble_song_index(&songs, &best, &config.columns.song, generation);
    Ok(serde_json::to_string(&index)?)
}
