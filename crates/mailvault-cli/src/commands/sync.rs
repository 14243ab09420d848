//! Sync command - runs a full or incremental sync against a source
//!
//! Provides the `mailvault sync full`/`mailvault sync incremental` CLI
//! commands which:
//! 1. Load configuration and open the database
//! 2. Build the remote adapter for the requested source kind
//! 3. Run the ingest controller and display progress and results

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use mailvault_audit::AuditLogger;
use mailvault_core::config::Config;
use mailvault_core::domain::SourceKind;
use mailvault_core::ports::{RemoteAdapter, Store, SystemClock};
use mailvault_ingest::{run_full_sync, run_incremental_sync, FullSyncOptions, NullSyncProgress};
use mailvault_provider_json::JsonProviderAdapter;
use mailvault_provider_mailbox::{ImapConfig, MailboxProviderAdapter};
use mailvault_store::{DatabasePool, SqliteStore};
use mailvault_transport::{RateLimiter, RequestEngine};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum SyncCommand {
    /// Run (or resume) a full sync over `list_messages` pagination
    Full(FullArgs),
    /// Run (or resume) an incremental sync over `list_history` replay
    Incremental(IncrementalArgs),
}

/// Arguments shared by both sync modes: how to identify the source and
/// reach the remote adapter behind it.
#[derive(Debug, Args)]
pub struct RemoteArgs {
    /// Stable identifier for the mail source (typically the mailbox address)
    #[arg(long)]
    pub identifier: String,

    /// Which remote adapter variant this source speaks
    #[arg(long, value_enum)]
    pub kind: SourceKindArg,

    /// Base URL of the JSON HTTP API (json-api sources only)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Bearer access token (json-api sources only), read from the named
    /// environment variable
    #[arg(long)]
    pub token_env: Option<String>,

    /// IMAP host (mailbox-protocol sources only)
    #[arg(long)]
    pub imap_host: Option<String>,

    /// IMAP port (mailbox-protocol sources only)
    #[arg(long, default_value_t = 993)]
    pub imap_port: u16,

    /// IMAP username (mailbox-protocol sources only)
    #[arg(long)]
    pub imap_user: Option<String>,

    /// Name of the environment variable holding the IMAP password
    /// (mailbox-protocol sources only)
    #[arg(long)]
    pub imap_password_env: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceKindArg {
    JsonApi,
    Mailbox,
}

impl From<SourceKindArg> for SourceKind {
    fn from(value: SourceKindArg) -> Self {
        match value {
            SourceKindArg::JsonApi => SourceKind::JsonApi,
            SourceKindArg::Mailbox => SourceKind::MailboxProtocol,
        }
    }
}

#[derive(Debug, Args)]
pub struct FullArgs {
    #[command(flatten)]
    pub remote: RemoteArgs,

    /// Start a fresh run even if one is already active, failing it first
    #[arg(long)]
    pub no_resume: bool,
}

#[derive(Debug, Args)]
pub struct IncrementalArgs {
    #[command(flatten)]
    pub remote: RemoteArgs,
}

impl SyncCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        match self {
            SyncCommand::Full(args) => run_full(args, format).await,
            SyncCommand::Incremental(args) => run_incremental(args, format).await,
        }
    }
}

pub(crate) async fn open_store(config: &Config) -> Result<Arc<dyn Store>> {
    let pool = DatabasePool::new(&config.store.database_path)
        .await
        .context("failed to open database")?;
    Ok(Arc::new(SqliteStore::new(pool.pool().clone())))
}

pub(crate) fn build_adapter(
    remote: &RemoteArgs,
    config: &Config,
    clock: Arc<SystemClock>,
) -> Result<Arc<dyn RemoteAdapter>> {
    match remote.kind {
        SourceKindArg::JsonApi => {
            let base_url = remote
                .base_url
                .clone()
                .context("--base-url is required for json-api sources")?;
            let token_env = remote
                .token_env
                .clone()
                .context("--token-env is required for json-api sources")?;
            let access_token = std::env::var(&token_env)
                .with_context(|| format!("environment variable {token_env} is not set"))?;

            let effective_rate = mailvault_core::config::effective_refill_rate(
                config.rate_limiting.requested_qps,
                config.rate_limiting.default_refill_rate,
            );
            let limiter = Arc::new(RateLimiter::new(config.rate_limiting.capacity as f64, effective_rate, clock.clone()));
            let engine = Arc::new(RequestEngine::new(Client::new(), base_url, limiter, clock));
            Ok(Arc::new(JsonProviderAdapter::new(
                engine,
                access_token,
                config.rate_limiting.batch_fetch_concurrency,
            )))
        }
        SourceKindArg::Mailbox => {
            let host = remote.imap_host.clone().context("--imap-host is required for mailbox sources")?;
            let username = remote.imap_user.clone().context("--imap-user is required for mailbox sources")?;
            let password_env = remote
                .imap_password_env
                .clone()
                .context("--imap-password-env is required for mailbox sources")?;
            let password = std::env::var(&password_env)
                .with_context(|| format!("environment variable {password_env} is not set"))?;

            let effective_rate = mailvault_core::config::effective_refill_rate(
                config.rate_limiting.requested_qps,
                config.rate_limiting.default_refill_rate,
            );
            let limiter = Arc::new(RateLimiter::new(config.rate_limiting.capacity as f64, effective_rate, clock));
            let imap_config = ImapConfig {
                host,
                port: remote.imap_port,
                username,
                password,
            };
            Ok(Arc::new(MailboxProviderAdapter::new(imap_config, limiter, 200)))
        }
    }
}

async fn run_full(args: &FullArgs, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(matches!(format, OutputFormat::Json));
    let config = Config::load_or_default(&Config::default_path());

    let store = open_store(&config).await?;
    let clock = Arc::new(SystemClock);
    let adapter = build_adapter(&args.remote, &config, clock.clone())?;
    let audit = Arc::new(AuditLogger::new(store.clone()));

    let source_kind: SourceKind = args.remote.kind.into();
    let source = store
        .get_or_create_source(&args.remote.identifier, source_kind)
        .await
        .context("failed to look up or create source")?;

    info!(identifier = %args.remote.identifier, "starting full sync");
    formatter.info(&format!("Starting full sync for {}", args.remote.identifier));

    let opts = FullSyncOptions { no_resume: args.no_resume };
    let cancellation = CancellationToken::new();
    let run = run_full_sync(
        store,
        adapter,
        clock,
        audit,
        &config.attachments.dir,
        source.id(),
        source_kind,
        opts,
        &NullSyncProgress,
        &cancellation,
    )
    .await
    .context("full sync failed")?;

    print_run_result(&*formatter, format, &run);
    Ok(())
}

async fn run_incremental(args: &IncrementalArgs, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(matches!(format, OutputFormat::Json));
    let config = Config::load_or_default(&Config::default_path());

    let store = open_store(&config).await?;
    let clock = Arc::new(SystemClock);
    let adapter = build_adapter(&args.remote, &config, clock.clone())?;
    let audit = Arc::new(AuditLogger::new(store.clone()));

    let source_kind: SourceKind = args.remote.kind.into();
    let source = store
        .get_or_create_source(&args.remote.identifier, source_kind)
        .await
        .context("failed to look up or create source")?;

    if source.cursor().is_none() {
        bail!("source has no history cursor yet; run 'mailvault sync full' first");
    }

    info!(identifier = %args.remote.identifier, "starting incremental sync");
    formatter.info(&format!("Starting incremental sync for {}", args.remote.identifier));

    let cancellation = CancellationToken::new();
    let run = run_incremental_sync(
        store,
        adapter,
        clock,
        audit,
        &config.attachments.dir,
        &source,
        &NullSyncProgress,
        &cancellation,
    )
    .await
    .context("incremental sync failed")?;

    print_run_result(&*formatter, format, &run);
    Ok(())
}

fn print_run_result(formatter: &dyn crate::output::OutputFormatter, format: OutputFormat, run: &mailvault_core::domain::SyncRun) {
    let checkpoint = run.checkpoint();
    let duration_ms = run
        .completed_at()
        .map(|done| (done - run.started_at()).num_milliseconds().max(0) as u64)
        .unwrap_or(0);

    if matches!(format, OutputFormat::Json) {
        let json = serde_json::json!({
            "status": run.status().to_string(),
            "processed": checkpoint.processed,
            "added": checkpoint.added,
            "updated": checkpoint.updated,
            "errors": checkpoint.errors,
            "duration_ms": duration_ms,
        });
        formatter.print_json(&json);
        return;
    }

    match run.status() {
        mailvault_core::domain::SyncStatus::Completed => {
            formatter.success(&format!("Sync completed: {}", run.summary()));
        }
        mailvault_core::domain::SyncStatus::Failed(reason) => {
            formatter.error(&format!("Sync failed: {reason}"));
        }
        mailvault_core::domain::SyncStatus::Active => {
            formatter.info(&format!("Sync left active (cancelled): {}", run.summary()));
        }
    }

    formatter.info(&format!(
        "Processed: {}  Added: {}  Updated: {}  Errors: {}",
        checkpoint.processed, checkpoint.added, checkpoint.updated, checkpoint.errors
    ));
}
