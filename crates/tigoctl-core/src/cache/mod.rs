//! Local files kept per account.
//!
//! This module provides the `CacheManager` for:
//! - Account-info snapshots (`accounts/<number>.json`), written on every lookup
//! - Acceptance history (`history/<number>.json`), an append-only JSON array

pub mod manager;

pub use manager::{CacheManager, CachedData, HistoryEntry};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed cache file: {0}")]
    Json(#[from] serde_json::Error),
}
