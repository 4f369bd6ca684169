//! Row store types and the client boundary.
//!
//! The external store is reachable only through its paginated HTTP API;
//! everything above this module talks to the [`RowStore`] trait so the
//! pipeline can be exercised against an in-memory double.

pub mod http;
pub mod reader;
pub mod value;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use value::{clean_text, CellValue};

/// Prefix the store assigns to generated row ids.
pub const ROW_ID_PREFIX: &str = "i-";

/// Whether an identifier is a store-assigned row id (as opposed to a
/// human-assigned custom id).
pub fn is_row_id(id: &str) -> bool {
    id.starts_with(ROW_ID_PREFIX)
}

/// One record from a source collection. Cell values are kept in an
/// ordered map so whole-row scans are deterministic across rebuilds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub values: BTreeMap<String, CellValue>,
}

impl Row {
    pub fn value(&self, column: &str) -> Option<&CellValue> {
        self.values.get(column)
    }

    /// Store-assigned display name, cleaned. `None` when missing or
    /// nothing renderable remains.
    pub fn display_name(&self) -> Option<String> {
        let cleaned = clean_text(self.name.as_deref()?);
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned)
        }
    }
}

/// One page of a paginated list response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowPage {
    #[serde(default)]
    pub items: Vec<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// One cell mutation in a row update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellUpdate {
    pub column: String,
    pub value: serde_json::Value,
}

/// Column-scoped search query in the store's `column:"value"` syntax.
pub fn column_query(column: &str, value: &str) -> String {
    format!("{}:{:?}", column, value)
}

/// Client boundary to the external row store.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// One page of a collection, optionally continuing from a token.
    async fn list_rows(&self, table: &str, page_token: Option<&str>, limit: u32)
        -> Result<RowPage>;

    /// A single row by store id.
    async fn get_row(&self, table: &str, row_id: &str) -> Result<Row>;

    /// Rows matching a column-scoped query, in store order.
    async fn search_rows(&self, table: &str, query: &str, limit: u32) -> Result<Vec<Row>>;

    /// Apply cell updates to a row.
    async fn update_row(&self, table: &str, row_id: &str, cells: &[CellUpdate]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_row_id() {
        assert!(is_row_id("i-abc123"));
        assert!(!is_row_id("4054"));
        assert!(!is_row_id("#4054"));
        assert!(!is_row_id(""));
    }

    #[test]
    fn test_column_query_quotes_and_escapes() {
        assert_eq!(column_query("c-x", "#152"), "c-x:\"#152\"");
        assert_eq!(column_query("c-x", "a\"b"), "c-x:\"a\\\"b\"");
    }

    #[test]
    fn test_row_display_name_cleans_fences() {
        let row = Row {
            id: "i-1".to_string(),
            name: Some("```Shira```".to_string()),
            values: BTreeMap::new(),
        };
        assert_eq!(row.display_name().as_deref(), Some("Shira"));

        let blank = Row {
            id: "i-2".to_string(),
            name: Some("``` ```".to_string()),
            values: BTreeMap::new(),
        };
        assert_eq!(blank.display_name(), None);

        let missing = Row {
            id: "i-3".to_string(),
            name: None,
            values: BTreeMap::new(),
        };
        assert_eq!(missing.display_name(), None);
    }

    #[test]
    fn test_row_deserializes_with_sparse_fields() {
        let row: Row = serde_json::from_str(
            r#"{"id": "i-5", "values": {"c-a": "x", "c-b": null}}"#,
        )
        .unwrap();
        assert_eq!(row.id, "i-5");
        assert_eq!(row.name, None);
        assert_eq!(row.values.len(), 2);
        assert_eq!(row.value("c-b"), Some(&CellValue::Empty));
        assert_eq!(row.value("c-missing"), None);
    }
}
