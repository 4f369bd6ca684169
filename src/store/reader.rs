//! Paginated collection reads.

use tracing::debug;

use crate::error::Result;

use super::{Row, RowStore};

/// Fetch every row of a collection by following continuation tokens
/// until the store stops returning one. Pages are concatenated in
/// source order. Zero-row collections yield an empty vec. Failures are
/// surfaced as-is; retry policy belongs to the caller.
pub async fn fetch_all_rows(store: &dyn RowStore, table: &str, page_size: u32) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    let mut page_token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = store
            .list_rows(table, page_token.as_deref(), page_size)
            .await?;
        pages += 1;
        rows.extend(page.items);
        match page.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => break,
        }
    }

    debug!(table, pages, rows = rows.len(), "fetched collection");
    Ok(rows)
}
