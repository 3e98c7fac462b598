use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chat_history_core::{tabular_row, ExportAggregate, TABULAR_COLUMNS};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const CLI_CONTRACT_VERSION: &str = "export.v1";
pub const MESSAGES_JSON_FILE: &str = "messages.json";
pub const MESSAGES_CSV_FILE: &str = "messages.csv";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const STAGING_DIR_PREFIX: &str = ".chx-staging-";

#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
    Both,
}

impl OutputFormat {
    fn writes_json(self) -> bool {
        matches!(self, Self::Json | Self::Both)
    }

    fn writes_csv(self) -> bool {
        matches!(self, Self::Csv | Self::Both)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportFileDigest {
    pub path: String,
    pub sha256: String,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportManifest {
    pub contract_version: String,
    pub account: String,
    pub exported_at: String,
    pub files: Vec<ExportFileDigest>,
}

pub fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

/// Write every account's export into a staging directory under `out`, then move
/// each account directory into place, replacing an earlier export of it.
///
/// A failed write removes the staging directory and leaves existing account
/// directories untouched.
///
/// # Errors
/// Returns an error when any file cannot be written or moved into place.
pub fn write_exports(
    out: &Path,
    aggregates: &[ExportAggregate],
    format: OutputFormat,
    exported_at: &str,
) -> Result<Vec<(PathBuf, ExportManifest)>> {
    let created_out = !out.exists();
    let staging = out.join(format!("{STAGING_DIR_PREFIX}{}", std::process::id()));
    if staging.exists() {
        fs::remove_dir_all(&staging).with_context(|| {
            format!("failed to clear stale staging directory {}", staging.display())
        })?;
    }

    let staged = aggregates
        .iter()
        .map(|aggregate| {
            let dir = staging.join(&aggregate.account);
            write_account_export(&dir, aggregate, format, exported_at)
        })
        .collect::<Result<Vec<_>>>();
    let manifests = match staged {
        Ok(manifests) => manifests,
        Err(err) => {
            let _ = fs::remove_dir_all(&staging);
            if created_out {
                let _ = fs::remove_dir(out);
            }
            return Err(err);
        }
    };

    let mut published = Vec::with_capacity(manifests.len());
    for (aggregate, manifest) in aggregates.iter().zip(manifests) {
        let target = out.join(&aggregate.account);
        if target.is_dir() {
            fs::remove_dir_all(&target).with_context(|| {
                format!("failed to replace export directory {}", target.display())
            })?;
        }
        fs::rename(staging.join(&aggregate.account), &target)
            .with_context(|| format!("failed to publish export directory {}", target.display()))?;
        tracing::debug!(account = %aggregate.account, dir = %target.display(), "export published");
        published.push((target, manifest));
    }
    fs::remove_dir_all(&staging)
        .with_context(|| format!("failed to remove staging directory {}", staging.display()))?;

    Ok(published)
}

/// Write one account's export files and their manifest into `out_dir`.
///
/// # Errors
/// Returns an error when the directory or any file cannot be written.
pub fn write_account_export(
    out_dir: &Path,
    aggregate: &ExportAggregate,
    format: OutputFormat,
    exported_at: &str,
) -> Result<ExportManifest> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create export directory {}", out_dir.display()))?;

    let mut files = Vec::new();
    if format.writes_json() {
        tracing::info!(account = %aggregate.account, "writing JSON");
        let (sha256, records) =
            write_json_file(&out_dir.join(MESSAGES_JSON_FILE), aggregate, exported_at)?;
        files.push(ExportFileDigest { path: MESSAGES_JSON_FILE.to_string(), sha256, records });
    }
    if format.writes_csv() {
        tracing::info!(account = %aggregate.account, "writing CSV");
        let (sha256, records) = write_csv_file(&out_dir.join(MESSAGES_CSV_FILE), aggregate)?;
        files.push(ExportFileDigest { path: MESSAGES_CSV_FILE.to_string(), sha256, records });
    }

    let manifest = ExportManifest {
        contract_version: CLI_CONTRACT_VERSION.to_string(),
        account: aggregate.account.clone(),
        exported_at: exported_at.to_string(),
        files,
    };
    let manifest_path = out_dir.join(MANIFEST_FILE);
    let manifest_json =
        serde_json::to_vec_pretty(&manifest).context("failed to serialize export manifest")?;
    fs::write(&manifest_path, manifest_json).with_context(|| {
        format!("failed to write export manifest {}", manifest_path.display())
    })?;

    Ok(manifest)
}

fn write_json_file(
    path: &Path,
    aggregate: &ExportAggregate,
    exported_at: &str,
) -> Result<(String, usize)> {
    let mut value = serde_json::to_value(aggregate).context("failed to serialize aggregate")?;
    if let Value::Object(object) = &mut value {
        object.insert("exported_at".to_string(), Value::String(exported_at.to_string()));
    }
    let bytes = serde_json::to_vec_pretty(&with_contract_version(value))
        .context("failed to serialize aggregate JSON")?;
    fs::write(path, &bytes)
        .with_context(|| format!("failed to write export file {}", path.display()))?;

    Ok((format!("{:x}", Sha256::digest(&bytes)), aggregate.message_count))
}

fn write_csv_file(path: &Path, aggregate: &ExportAggregate) -> Result<(String, usize)> {
    let file = File::create(path)
        .with_context(|| format!("failed to create export file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let mut hasher = Sha256::new();

    let header = csv_record(&TABULAR_COLUMNS);
    let rows =
        aggregate.messages.iter().map(|message| csv_record(tabular_row(message).as_slice()));
    for line in std::iter::once(header).chain(rows) {
        writer
            .write_all(line.as_bytes())
            .with_context(|| format!("failed to write export file {}", path.display()))?;
        hasher.update(line.as_bytes());
    }

    writer.flush().with_context(|| format!("failed to flush export file {}", path.display()))?;

    Ok((format!("{:x}", hasher.finalize()), aggregate.messages.len()))
}

/// One CSV line, CRLF-terminated, quoting cells per RFC 4180.
pub fn csv_record<S: AsRef<str>>(cells: &[S]) -> String {
    let mut line =
        cells.iter().map(|cell| csv_quote(cell.as_ref())).collect::<Vec<_>>().join(",");
    line.push_str("\r\n");
    line
}

fn csv_quote(cell: &str) -> Cow<'_, str> {
    if cell.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", cell.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(cell)
    }
}
