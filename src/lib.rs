//! Songdex - derived-index service for a songs-and-recordings archive.
//!
//! The archive lives in an external document store exposed through a
//! paginated row API. This crate rebuilds the derived artifacts the
//! site serves (song index, recordings index, per-category indexes),
//! caches them under a persistent generation marker, and fronts the
//! store for single lookups and rating writes.
//!
//! Layout:
//!   - `store`: row model, cell value decoding, HTTP client, pagination
//!   - `index`: the pure builders for each derived index
//!   - `cache` + `kv`: response cache, generation marker, write tracking
//!   - `server`: axum handlers and the router
//!   - `metrics`: optional runtime counters behind `/api/stats`

pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod kv;
pub mod metrics;
pub mod server;
pub mod store;

pub use error::{IndexError, Result};
