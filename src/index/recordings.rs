//! Recordings index.
//!
//! Groups every playable take by its parent song and ranks each group
//! by rating. Unlike best-match selection, this index fans out over
//! files: a recording row with three attached files contributes three
//! entries, all sharing the row's rating and metadata.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{AppConfig, RecordingColumns};
use crate::error::Result;
use crate::store::reader::fetch_all_rows;
use crate::store::value::{clean_text, resolve_relation};
use crate::store::{Row, RowStore};

use super::{cell_text, non_empty, parse_rating};

/// One playable take in a song's group.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordingEntry {
    pub row_id: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    pub rating: u8,
    /// 1-based rank within the song's group after rating sort. Absent
    /// on single-row lookups, which have no group to rank against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
}

/// The full recordings index document.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingsIndex {
    pub generation: u64,
    /// Number of songs with at least one playable take, not total takes.
    pub count: u32,
    pub recordings: BTreeMap<String, Vec<RecordingEntry>>,
}

/// Group recording rows by parent custom id, fanning out one entry per
/// playable file. Rows are skipped wholesale when their parent
/// reference yields no custom id or their first file is unplayable;
/// past that gate, individual url-less files are skipped without
/// discarding their siblings.
pub fn group_recordings(
    rows: &[Row],
    columns: &RecordingColumns,
) -> BTreeMap<String, Vec<RecordingEntry>> {
    let mut groups: BTreeMap<String, Vec<RecordingEntry>> = BTreeMap::new();

    for row in rows {
        let Some(parent_id) = resolve_relation(row.value(&columns.song)).custom_id else {
            continue;
        };

        let files = match row.value(&columns.files) {
            Some(cell) => cell.references(),
            None => continue,
        };
        if files.first().map_or(true, |f| f.url.is_none()) {
            continue;
        }

        let rating = parse_rating(row.value(&columns.rating));
        let notes = cell_text(row, &columns.notes);
        let performers = cell_text(row, &columns.performers);
        let album = cell_text(row, &columns.album);

        let group = groups.entry(parent_id).or_default();
        for file in files {
            let Some(url) = file.url.clone() else {
                continue;
            };
            group.push(RecordingEntry {
                row_id: row.id.clone(),
                url,
                title: file.name.as_deref().map(clean_text).and_then(non_empty),
                notes: notes.clone(),
                performers: performers.clone(),
                album: album.clone(),
                rating,
                position: None,
            });
        }
    }

    groups
}

/// Sort each group by rating, best first, and assign 1-based positions.
/// The sort is stable, so equally rated takes keep their source order.
pub fn rank_groups(groups: &mut BTreeMap<String, Vec<RecordingEntry>>) {
    for entries in groups.values_mut() {
        entries.sort_by(|a, b| b.rating.cmp(&a.rating));
        for (idx, entry) in entries.iter_mut().enumerate() {
            entry.position = Some(idx as u32 + 1);
        }
    }
}

pub fn assemble_recordings_index(
    rows: &[Row],
    columns: &RecordingColumns,
    generation: u64,
) -> RecordingsIndex {
    let mut groups = group_recordings(rows, columns);
    rank_groups(&mut groups);
    RecordingsIndex {
        generation,
        count: groups.len() as u32,
        recordings: groups,
    }
}

/// Fetch the recordings collection and serialize the ranked index.
pub async fn build_recordings_index(
    store: &dyn RowStore,
    config: &AppConfig,
    generation: u64,
) -> Result<String> {
    let rows = fetch_all_rows(store, &config.tables.recordings, config.store.page_size).await?;
    let index = assemble_recordings_index(&rows, &config.columns.recording, generation);
    Ok(serde_json::to_string(&index)?)
}

/// Build a standalone entry for one recording row, used by the single
/// lookup endpoint. Returns `None` when the row has no playable first
/// file.
pub fn recording_from_row(row: &Row, columns: &RecordingColumns) -> Option<RecordingEntry> {
    let files = row.value(&columns.files)?.references();
    let url = files.first()?.url.clone()?;
    Some(RecordingEntry {
        row_id: row.id.clone(),
        url,
        title: files
            .first()
            .and_then(|f| f.name.as_deref())
            .map(clean_text)
            .and_then(non_empty),
        notes: cell_text(row, &columns.notes),
        performers: cell_text(row, &columns.performers),
        album: cell_text(row, &columns.album),
        rating: parse_rating(row.value(&columns.rating)),
        position: None,
    })
}
