//! Cell values and extraction.
//!
//! The row store returns heterogeneous cell JSON: bare scalars, strings
//! wrapped in inert formatting fences, single row references, attachment
//! objects, or arrays of any of these. [`CellValue`] models that space as
//! an explicit tagged union, and the extractors are total over it:
//! malformed or unexpected shapes degrade to an empty string or `None`,
//! never an error. A missing cell on one row must not be able to abort an
//! index build.

use serde::{Deserialize, Serialize};

/// Inert formatting fence the store wraps rich-text scalars in.
const FORMAT_FENCE: &str = "```";

/// Separator used when flattening a list cell to display text.
const LIST_SEPARATOR: &str = ", ";

/// A row reference or attachment object inside a cell. All fields are
/// optional so unknown object shapes still deserialize and degrade to
/// empty extraction instead of failing the whole row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One cell as returned by the store's rich value format.
///
/// Untagged: every JSON value maps to exactly one variant, so row
/// deserialization is total. `List` must stay declared before
/// `Reference` so arrays are never positionally matched against the
/// reference struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<CellValue>),
    Reference(Reference),
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Empty
    }
}

impl CellValue {
    /// Display text for any cell: fences stripped, trimmed, list members
    /// joined with `", "`. Shapes with nothing displayable yield `""`.
    pub fn text(&self) -> String {
        match self {
            CellValue::Empty | CellValue::Bool(_) => String::new(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Text(s) => clean_text(s),
            CellValue::Reference(r) => r.name.as_deref().map(clean_text).unwrap_or_default(),
            CellValue::List(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(CellValue::text)
                    .filter(|part| !part.is_empty())
                    .collect();
                parts.join(LIST_SEPARATOR)
            }
        }
    }

    /// Stable row id of the first reference the cell holds, if any.
    pub fn row_id(&self) -> Option<&str> {
        match self {
            CellValue::Reference(r) => r.row_id.as_deref().filter(|id| !id.is_empty()),
            CellValue::List(items) => items.first().and_then(CellValue::row_id),
            _ => None,
        }
    }

    /// Human-assigned custom identifier from a reference's display name
    /// or a plain scalar: fences stripped, one leading `#` stripped,
    /// trimmed. `None` when nothing remains.
    pub fn custom_id(&self) -> Option<String> {
        match self {
            CellValue::Text(s) => normalize_custom_id(s),
            CellValue::Number(n) => normalize_custom_id(&n.to_string()),
            CellValue::Reference(r) => normalize_custom_id(r.name.as_deref()?),
            CellValue::List(items) => match items.first()? {
                CellValue::Reference(r) => normalize_custom_id(r.name.as_deref()?),
                _ => None,
            },
            _ => None,
        }
    }

    /// All reference members of the cell, in source order. A scalar cell
    /// has none; non-reference list members are skipped.
    pub fn references(&self) -> Vec<&Reference> {
        match self {
            CellValue::Reference(r) => vec![r],
            CellValue::List(items) => items
                .iter()
                .filter_map(|item| match item {
                    CellValue::Reference(r) => Some(r),
                    _ => None,
                })
                .collect(),
            _ => vec![],
        }
    }
}

/// Strip formatting fences and trim.
pub fn clean_text(raw: &str) -> String {
    raw.replace(FORMAT_FENCE, "").trim().to_string()
}

fn normalize_custom_id(raw: &str) -> Option<String> {
    let cleaned = raw.replace(FORMAT_FENCE, "");
    let cleaned = cleaned.trim();
    let cleaned = cleaned.strip_prefix('#').unwrap_or(cleaned).trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

// ============================================================================
// Relation resolution
// ============================================================================

/// A foreign relation cell resolved to its primary member.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedRelation {
    pub row_id: Option<String>,
    pub custom_id: Option<String>,
    pub text: String,
}

/// Resolve a relation cell to its first member. List cells resolve the
/// first element in stable source order, never re-sorted, so rebuilds
/// over unchanged data are deterministic.
pub fn resolve_relation(cell: Option<&CellValue>) -> ResolvedRelation {
    let Some(value) = cell else {
        return ResolvedRelation::default();
    };
    let primary = match value {
        CellValue::List(items) => match items.first() {
            Some(first) => first,
            None => return ResolvedRelation::default(),
        },
        other => other,
    };
    ResolvedRelation {
        row_id: primary.row_id().map(str::to_string),
        custom_id: primary.custom_id(),
        text: primary.text(),
    }
}
