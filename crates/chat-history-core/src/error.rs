use std::path::PathBuf;

use crate::model::StoreName;

/// Failures that abort an export before any output is produced.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ExportError {
    #[error("source unreadable at {}: {reason}", path.display())]
    SourceUnreadable { path: PathBuf, reason: String },
    #[error("no account matched [{}]; available: [{}]", requested.join(", "), available.join(", "))]
    NoMatchingAccounts { requested: Vec<String>, available: Vec<String> },
    #[error("store {store} unreadable for account {account}: {reason}")]
    StoreUnreadable { account: String, store: StoreName, reason: String },
}

/// One stored version that could not be interpreted; the version is skipped.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
#[error("{store} record at position {position}: {reason}")]
pub struct RecordDecodeError {
    pub store: StoreName,
    /// Ordinal of the version in store order, the `original_store_index` it
    /// would have carried. File-backed sources put the file line in `reason`.
    pub position: usize,
    pub reason: String,
}

impl RecordDecodeError {
    pub fn new(store: StoreName, position: usize, reason: impl Into<String>) -> Self {
        Self { store, position, reason: reason.into() }
    }
}
