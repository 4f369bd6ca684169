//! Best-recording selection.
//!
//! For each song we pick a single representative recording out of its
//! eligible rows. Eligibility requires a playable first file; ranking
//! is by rating with earlier rows winning ties, so a rebuild over the
//! same snapshot always picks the same row.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::RecordingColumns;
use crate::store::value::resolve_relation;
use crate::store::Row;

use super::parse_rating;

/// One eligible recording row, reduced to what selection needs.
#[derive(Debug, Clone)]
pub struct RecordingCandidate {
    pub row_id: String,
    pub url: String,
    pub rating: u8,
}

/// The selected recording for one song.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BestMatch {
    pub row_id: String,
    pub rating: u8,
    /// Eligible rows for the song, not total files.
    pub count: u32,
}

/// Group recording rows by the custom id of the song they point back
/// to. Rows whose parent reference yields no custom id, and rows
/// without a playable first file, are dropped here and never counted.
pub fn group_candidates(
    rows: &[Row],
    columns: &RecordingColumns,
) -> BTreeMap<String, Vec<RecordingCandidate>> {
    let mut groups: BTreeMap<String, Vec<RecordingCandidate>> = BTreeMap::new();

    for row in rows {
        let Some(parent_id) = resolve_relation(row.value(&columns.song)).custom_id else {
            continue;
        };

        let files = match row.value(&columns.files) {
            Some(cell) => cell.references(),
            None => continue,
        };
        let Some(url) = files.first().and_then(|f| f.url.clone()) else {
            continue;
        };

        let rating = parse_rating(row.value(&columns.rating));
        groups.entry(parent_id).or_default().push(RecordingCandidate {
            row_id: row.id.clone(),
            url,
            rating,
        });
    }

    groups
}

/// Pick the best candidate per song: highest rating wins, first listed
/// wins ties. Groups that ended up empty are skipped.
pub fn select_best(groups: &BTreeMap<String, Vec<RecordingCandidate>>) -> BTreeMap<String, BestMatch> {
    let mut best = BTreeMap::new();

    for (song_id, candidates) in groups {
        let Some(first) = candidates.first() else {
            continue;
        };
        let mut winner = first;
        for candidate in &candidates[1..] {
            if candidate.rating > winner.rating {
                winner = candidate;
            }
        }
        best.insert(
            song_id.clone(),
            BestMatch {
                row_id: winner.row_id.clone(),
                rating: winner.rating,
                count: candidates.len() as u32,
            },
        );
    }

    best
}
