//! Store reader over a decoded snapshot: `<root>/<account>/<StoreName>.ndjson`.
//!
//! Each non-blank line holds one stored version:
//! `{"value": {...}, "update_marker": 12, "deleted": false, "key": "optional"}`.
//! Lines are read as bytes; a line that is not valid UTF-8 JSON only skips that
//! version. Record positions count non-blank lines.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chat_history_core::{
    ExportError, RawRecord, RecordDecodeError, RecordSource, StoreName, StoredVersion,
};

pub const STORE_FILE_EXTENSION: &str = "ndjson";

/// Directory holding one snapshot subdirectory per account.
#[derive(Debug, Clone)]
pub struct SnapshotRoot {
    root: PathBuf,
}

impl SnapshotRoot {
    /// # Errors
    /// Returns [`ExportError::SourceUnreadable`] when `root` is not a readable directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ExportError> {
        let root = root.into();
        if let Err(err) = fs::read_dir(&root) {
            return Err(ExportError::SourceUnreadable { path: root, reason: err.to_string() });
        }
        Ok(Self { root })
    }

    /// Account directory names in sorted order.
    ///
    /// # Errors
    /// Returns [`ExportError::SourceUnreadable`] when the root cannot be listed.
    pub fn accounts(&self) -> Result<Vec<String>, ExportError> {
        list_account_dirs(&self.root).map_err(|err| ExportError::SourceUnreadable {
            path: self.root.clone(),
            reason: format!("{err:#}"),
        })
    }

    /// Accounts to export: all of them when `requested` is empty, otherwise the
    /// requested names that exist, in sorted order.
    ///
    /// # Errors
    /// Returns [`ExportError::NoMatchingAccounts`] when a non-empty filter matches nothing.
    pub fn select_accounts(&self, requested: &[String]) -> Result<Vec<String>, ExportError> {
        let available = self.accounts()?;
        if requested.is_empty() {
            return Ok(available);
        }

        let selected = available
            .iter()
            .filter(|account| requested.contains(account))
            .cloned()
            .collect::<Vec<_>>();
        if selected.is_empty() {
            return Err(ExportError::NoMatchingAccounts {
                requested: requested.to_vec(),
                available,
            });
        }
        Ok(selected)
    }

    /// # Errors
    /// Returns [`ExportError::SourceUnreadable`] when the account directory is missing.
    pub fn account(&self, name: &str) -> Result<NdjsonAccountSource, ExportError> {
        let dir = self.root.join(name);
        if !dir.is_dir() {
            return Err(ExportError::SourceUnreadable {
                path: dir,
                reason: "account directory not found".to_string(),
            });
        }
        Ok(NdjsonAccountSource { account: name.to_string(), dir })
    }
}

/// One account's store files.
#[derive(Debug, Clone)]
pub struct NdjsonAccountSource {
    account: String,
    dir: PathBuf,
}

impl NdjsonAccountSource {
    #[must_use]
    pub fn store_path(&self, store: StoreName) -> PathBuf {
        self.dir.join(format!("{}.{STORE_FILE_EXTENSION}", store.as_str()))
    }
}

impl RecordSource for NdjsonAccountSource {
    fn account(&self) -> &str {
        &self.account
    }

    fn read_store(
        &self,
        store: StoreName,
    ) -> Result<Vec<Result<RawRecord, RecordDecodeError>>, ExportError> {
        let path = self.store_path(store);
        if !path.exists() {
            tracing::debug!(
                account = %self.account,
                store = %store,
                "store file absent, reading as empty"
            );
            return Ok(Vec::new());
        }

        let lines = read_store_lines(&path).map_err(|err| ExportError::StoreUnreadable {
            account: self.account.clone(),
            store,
            reason: format!("{err:#}"),
        })?;

        Ok(lines
            .into_iter()
            .enumerate()
            .map(|(position, line)| decode_line(store, position, &line))
            .collect())
    }
}

/// A non-blank store line with its 1-based line number in the file.
struct StoreLine {
    number: usize,
    bytes: Vec<u8>,
}

fn decode_line(
    store: StoreName,
    position: usize,
    line: &StoreLine,
) -> Result<RawRecord, RecordDecodeError> {
    let stored = serde_json::from_slice::<StoredVersion>(&line.bytes).map_err(|err| {
        let reason = format!("line {}: invalid line: {err}", line.number);
        RecordDecodeError::new(store, position, reason)
    })?;
    RawRecord::from_stored(store, position, stored).map_err(|err| RecordDecodeError {
        reason: format!("line {}: {}", line.number, err.reason),
        ..err
    })
}

fn read_store_lines(path: &Path) -> Result<Vec<StoreLine>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open store file {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut lines = Vec::new();

    for (index, line) in reader.split(b'\n').enumerate() {
        let bytes = line.with_context(|| {
            format!("failed to read line {} from {}", index + 1, path.display())
        })?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        lines.push(StoreLine { number: index + 1, bytes });
    }

    Ok(lines)
}

fn list_account_dirs(root: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(root)
        .with_context(|| format!("failed to list snapshot root {}", root.display()))?;
    let mut accounts = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", root.display()))?;
        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to stat {}", entry.path().display()))?;
        if file_type.is_dir() {
            accounts.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    accounts.sort();
    Ok(accounts)
}
