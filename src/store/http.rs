//! HTTP client for the row store API.
//!
//! Thin reqwest wrapper behind [`RowStore`]. The bearer credential is
//! injected at construction, attached per request, and kept out of
//! `Debug` output and error messages.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::warn;

use crate::config::StoreConfig;
use crate::error::{IndexError, Result};

use super::{CellUpdate, Row, RowPage, RowStore};

/// Value format requested from the store so cells carry reference
/// objects instead of flattened display strings.
const VALUE_FORMAT: &str = "rich";

pub struct HttpRowStore {
    client: reqwest::Client,
    base_url: String,
    doc_id: String,
    api_token: String,
    timeout_ms: u64,
}

impl HttpRowStore {
    pub fn new(config: &StoreConfig, api_token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IndexError::InvalidConfig(format!("http client: {}", e)))?;
        Ok(HttpRowStore {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            doc_id: config.doc_id.clone(),
            api_token,
            timeout_ms: config.timeout_secs.saturating_mul(1000),
        })
    }

    fn rows_url(&self, table: &str) -> String {
        format!(
            "{}/docs/{}/tables/{}/rows",
            self.base_url, self.doc_id, table
        )
    }

    fn send_error(&self, collection: &str, err: reqwest::Error) -> IndexError {
        if err.is_timeout() {
            IndexError::UpstreamTimeout {
                collection: collection.to_string(),
                timeout_ms: self.timeout_ms,
            }
        } else {
            IndexError::UpstreamUnavailable {
                collection: collection.to_string(),
                status: err.status().map(|s| s.as_u16()).unwrap_or(0),
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        collection: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .client
            .get(url)
            .query(query)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| self.send_error(collection, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(IndexError::NotFound(format!(
                "row store has no such entity in '{}'",
                collection
            )));
        }
        if !status.is_success() {
            warn!(collection, status = status.as_u16(), "row store request failed");
            return Err(IndexError::UpstreamUnavailable {
                collection: collection.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                IndexError::MalformedUpstreamData {
                    collection: collection.to_string(),
                    detail: e.to_string(),
                }
            } else {
                self.send_error(collection, e)
            }
        })
    }
}

impl fmt::Debug for HttpRowStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The credential is deliberately omitted.
        f.debug_struct("HttpRowStore")
            .field("base_url", &self.base_url)
            .field("doc_id", &self.doc_id)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RowStore for HttpRowStore {
    async fn list_rows(
        &self,
        table: &str,
        page_token: Option<&str>,
        limit: u32,
    ) -> Result<RowPage> {
        let mut query: Vec<(&str, String)> = vec![
            ("limit", limit.to_string()),
            ("valueFormat", VALUE_FORMAT.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        self.get_json(table, &self.rows_url(table), &query).await
    }

    async fn get_row(&self, table: &str, row_id: &str) -> Result<Row> {
        let url = format!("{}/{}", self.rows_url(table), row_id);
        self.get_json(table, &url, &[("valueFormat", VALUE_FORMAT.to_string())])
            .await
    }

    async fn search_rows(&self, table: &str, query: &str, limit: u32) -> Result<Vec<Row>> {
        let params = vec![
            ("limit", limit.to_string()),
            ("valueFormat", VALUE_FORMAT.to_string()),
            ("query", query.to_string()),
        ];
        let page: RowPage = self.get_json(table, &self.rows_url(table), &params).await?;
        Ok(page.items)
    }

    async fn update_row(&self, table: &str, row_id: &str, cells: &[CellUpdate]) -> Result<()> {
        let url = format!("{}/{}", self.rows_url(table), row_id);
        let body = serde_json::json!({ "row": { "cells": cells } });
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.send_error(table, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(IndexError::NotFound(format!("row '{}' in '{}'", row_id, table)));
        }
        if !status.is_success() {
            warn!(table, status = status.as_u16(), "row store update failed");
            return Err(IndexError::UpstreamUnavailable {
                collection: table.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
