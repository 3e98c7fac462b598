use std::path::PathBuf;

use anyhow::{Context, Result};
use chat_history_core::{
    export_account, AssetResolver, ExportConfig, ResolutionMode, TimestampZone,
};
use chat_history_source::SnapshotRoot;
use clap::{Parser, ValueEnum};
use serde_json::{json, Value};
use time::{OffsetDateTime, UtcOffset};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod output;

use output::{with_contract_version, write_exports, OutputFormat};

#[derive(Debug, Parser)]
#[command(name = "chx")]
#[command(about = "Export reconciled chat history from a client data snapshot")]
struct Cli {
    /// Client data root; asset images live under `<root>/users/<account>/images`.
    #[arg(long, default_value = "zentaoclient")]
    root: PathBuf,

    /// Decoded store snapshot directory. Defaults to `<root>/store`.
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Account to export. Repeatable; all accounts when omitted.
    #[arg(long = "account", alias = "db-name")]
    accounts: Vec<String>,

    #[arg(long, default_value = "output")]
    out: PathBuf,

    #[arg(long, default_value_t = false)]
    include_deleted: bool,

    /// Emit every stored message version instead of one per message.
    #[arg(long, default_value_t = false)]
    include_duplicates: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Both)]
    format: OutputFormat,

    #[arg(long, value_enum, default_value_t = TimezoneArg::Local)]
    timezone: TimezoneArg,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TimezoneArg {
    Local,
    Utc,
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn main() -> Result<()> {
    // Must run before any other thread exists.
    let local_offset = UtcOffset::current_local_offset();
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let timezone = match cli.timezone {
        TimezoneArg::Utc => TimestampZone::Utc,
        TimezoneArg::Local => match local_offset {
            Ok(offset) => TimestampZone::Fixed(offset),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "local offset indeterminate, rendering timestamps in UTC"
                );
                TimestampZone::Utc
            }
        },
    };
    let config = ExportConfig {
        mode: if cli.include_duplicates {
            ResolutionMode::PreserveDuplicates
        } else {
            ResolutionMode::Deduplicate
        },
        include_deleted: cli.include_deleted,
        timezone,
    };

    emit_json(run_export(&cli, &config)?)
}

fn run_export(cli: &Cli, config: &ExportConfig) -> Result<Value> {
    let store_dir = cli.store_dir.clone().unwrap_or_else(|| cli.root.join("store"));
    let snapshot = SnapshotRoot::open(&store_dir)?;
    let accounts = snapshot.select_accounts(&cli.accounts)?;

    // Every account is reconciled before anything is written.
    let mut aggregates = Vec::with_capacity(accounts.len());
    for account in &accounts {
        let source = snapshot.account(account)?;
        let assets = AssetResolver::new(cli.root.join("users").join(account).join("images"))
            .with_display_base(&cli.root);
        let aggregate = export_account(&source, &assets, config)
            .with_context(|| format!("failed to export account {account}"))?;
        tracing::info!(
            account = %account,
            messages = aggregate.message_count,
            "account reconciled"
        );
        aggregates.push(aggregate);
    }

    let exported_at = OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")?;

    let published = write_exports(&cli.out, &aggregates, cli.format, &exported_at)?;
    let summaries = aggregates
        .iter()
        .zip(published)
        .map(|(aggregate, (out_dir, manifest))| {
            json!({
                "account": aggregate.account,
                "message_count": aggregate.message_count,
                "out_dir": out_dir.display().to_string(),
                "files": manifest.files,
            })
        })
        .collect::<Vec<_>>();

    Ok(json!({ "accounts": summaries }))
}
