//! Derived index builders.
//!
//! Each submodule turns raw store rows into one serialized, cacheable
//! document: the song index, the recordings index, and the per-category
//! name indexes. Builders are pure once the rows are in hand, so the
//! same snapshot always yields byte-identical output.

pub mod best;
pub mod categories;
pub mod recordings;
pub mod songs;

use crate::store::value::CellValue;
use crate::store::Row;

pub(crate) fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Display text of one cell, `None` when the cell is absent or blank.
pub(crate) fn cell_text(row: &Row, column: &str) -> Option<String> {
    row.value(column).map(CellValue::text).and_then(non_empty)
}

/// Parse a rating cell into the 1..=5 scale. Anything else, including
/// absent cells, fractional numbers, and out-of-range integers, maps
/// to 0 (unrated).
pub(crate) fn parse_rating(cell: Option<&CellValue>) -> u8 {
    let text = match cell {
        Some(value) => value.text(),
        None => return 0,
    };
    match text.trim().parse::<i64>() {
        Ok(n) if (1..=5).contains(&n) => n as u8,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rating_accepts_scale() {
        for n in 1..=5i64 {
            let cell = CellValue::Number(n as f64);
            assert_eq!(parse_rating(Some(&cell)), n as u8);
        }
    }

    #[test]
    fn test_parse_rating_rejects_out_of_range() {
        assert_eq!(parse_rating(Some(&CellValue::Number(0.0))), 0);
        assert_eq!(parse_rating(Some(&CellValue::Number(6.0))), 0);
        assert_eq!(parse_rating(Some(&CellValue::Number(-3.0))), 0);
        assert_eq!(parse_rating(Some(&CellValue::Text("12".to_string()))), 0);
    }

    #[test]
    fn test_parse_rating_rejects_garbage() {
        assert_eq!(parse_rating(None), 0);
        assert_eq!(parse_rating(Some(&CellValue::Empty)), 0);
        assert_eq!(parse_rating(Some(&CellValue::Text("great".to_string()))), 0);
        // Fractional values are unrated, not truncated.
        assert_eq!(parse_rating(Some(&CellValue::Text("4.5".to_string()))), 0);
        assert_eq!(parse_rating(Some(&CellValue::Number(4.5))), 0);
    }

    #[test]
    fn test_parse_rating_trims_text() {
        let cell = CellValue::Text(" 4 ".to_string());
        assert_eq!(parse_rating(Some(&cell)), 4);
    }
}
