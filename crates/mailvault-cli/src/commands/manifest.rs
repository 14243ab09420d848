//! Manifest command - create, list, execute, and cancel deletion manifests (§4.9)

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};
use mailvault_core::config::Config;
use mailvault_core::domain::{DeleteMethod, DeletionManifest, ManifestId, RemoteMessageId};
use mailvault_core::ports::SystemClock;
use mailvault_deletion::{execute_manifest, ExecuteOptions, ManifestStore, NullDeletionProgress};
use tokio_util::sync::CancellationToken;

use crate::commands::sync::{build_adapter, open_store, RemoteArgs, SourceKindArg};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ManifestCommand {
    /// Create a new pending manifest targeting a list of remote message ids
    Create(CreateArgs),
    /// List manifests under one status, or every status
    List(ListArgs),
    /// Execute (or resume) a manifest's deletion batch
    Execute(ExecuteArgs),
    /// Cancel a pending or in-progress manifest
    Cancel(CancelArgs),
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    /// Source identifier the targeted messages belong to
    #[arg(long)]
    pub identifier: String,

    /// Which remote adapter variant this source speaks
    #[arg(long, value_enum)]
    pub kind: SourceKindArg,

    /// Short slug used to build the manifest id
    #[arg(long)]
    pub slug: String,

    /// Free-form description of why this manifest was created
    #[arg(long, default_value = "")]
    pub description: String,

    /// Comma-separated remote message ids to target
    #[arg(long, value_delimiter = ',')]
    pub ids: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Restrict to one status (pending, in_progress, completed, failed); all if omitted
    #[arg(long)]
    pub status: Option<ManifestStatusArg>,
}

#[derive(Debug, Args)]
pub struct ExecuteArgs {
    #[command(flatten)]
    pub remote: RemoteArgs,

    /// Manifest id to execute
    pub id: String,

    /// Deletion method
    #[arg(long, value_enum, default_value = "trash")]
    pub method: DeleteMethodArg,

    /// Items per batch-delete call
    #[arg(long, default_value_t = 500)]
    pub batch_size: usize,

    /// Resume an in-progress manifest instead of requiring it to be pending
    #[arg(long)]
    pub resume: bool,
}

#[derive(Debug, Args)]
pub struct CancelArgs {
    /// Manifest id to cancel
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ManifestStatusArg {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl From<ManifestStatusArg> for mailvault_core::domain::ManifestStatus {
    fn from(value: ManifestStatusArg) -> Self {
        use mailvault_core::domain::ManifestStatus;
        match value {
            ManifestStatusArg::Pending => ManifestStatus::Pending,
            ManifestStatusArg::InProgress => ManifestStatus::InProgress,
            ManifestStatusArg::Completed => ManifestStatus::Completed,
            ManifestStatusArg::Failed => ManifestStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DeleteMethodArg {
    Trash,
    Delete,
}

impl From<DeleteMethodArg> for DeleteMethod {
    fn from(value: DeleteMethodArg) -> Self {
        match value {
            DeleteMethodArg::Trash => DeleteMethod::Trash,
            DeleteMethodArg::Delete => DeleteMethod::Delete,
        }
    }
}

impl ManifestCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        match self {
            ManifestCommand::Create(args) => create(args, format).await,
            ManifestCommand::List(args) => list(args, format).await,
            ManifestCommand::Execute(args) => run_execute(args, format).await,
            ManifestCommand::Cancel(args) => cancel(args, format).await,
        }
    }
}

async fn create(args: &CreateArgs, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(matches!(format, OutputFormat::Json));
    let config = Config::load_or_default(&Config::default_path());

    let store = open_store(&config).await?;
    let source_kind: mailvault_core::domain::SourceKind = args.kind.into();
    let source = store
        .get_or_create_source(&args.identifier, source_kind)
        .await
        .context("failed to look up or create source")?;

    let target_ids: Vec<RemoteMessageId> = args
        .ids
        .iter()
        .map(|id| RemoteMessageId::new(id.trim()))
        .collect::<Result<_, _>>()
        .context("invalid remote message id in --ids")?;

    if target_ids.is_empty() {
        anyhow::bail!("--ids must name at least one remote message id");
    }

    let manifest_store = ManifestStore::new(config.deletion.manifests_dir.as_path()).context("failed to open manifest store")?;
    let manifest = DeletionManifest::new(
        source.id(),
        &args.slug,
        "mailvault-cli",
        &args.description,
        serde_json::Value::Null,
        target_ids,
        Utc::now(),
    );
    let manifest = manifest_store.create(manifest).context("failed to persist manifest")?;

    if matches!(format, OutputFormat::Json) {
        formatter.print_json(&serde_json::json!({
            "id": manifest.id().to_string(),
            "status": manifest.status().to_string(),
            "target_count": manifest.target_ids().len(),
        }));
    } else {
        formatter.success(&format!("Created manifest {}", manifest.id()));
        formatter.info(&format!("Targets: {}", manifest.target_ids().len()));
    }

    Ok(())
}

async fn list(args: &ListArgs, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(matches!(format, OutputFormat::Json));
    let config = Config::load_or_default(&Config::default_path());
    let manifest_store = ManifestStore::new(config.deletion.manifests_dir.as_path()).context("failed to open manifest store")?;

    let manifests = match args.status {
        Some(status) => manifest_store.list(status.into()).context("failed to list manifests")?,
        None => manifest_store.list_all().context("failed to list manifests")?,
    };

    if matches!(format, OutputFormat::Json) {
        let json: Vec<_> = manifests
            .iter()
            .map(|m| {
                serde_json::json!({
                    "id": m.id().to_string(),
                    "status": m.status().to_string(),
                    "source_id": m.source_id().to_string(),
                    "created_at": m.created_at().to_rfc3339(),
                    "target_count": m.target_ids().len(),
                })
            })
            .collect();
        formatter.print_json(&serde_json::json!({ "manifests": json }));
        return Ok(());
    }

    if manifests.is_empty() {
        formatter.info("No manifests found.");
        return Ok(());
    }

    formatter.success(&format!("{} manifest(s)", manifests.len()));
    formatter.info("");
    for m in &manifests {
        formatter.info(&format!(
            "  {}  {:<11}  {} target(s)  created {}",
            m.id(),
            m.status(),
            m.target_ids().len(),
            m.created_at().format("%Y-%m-%d %H:%M:%S")
        ));
    }

    Ok(())
}

async fn run_execute(args: &ExecuteArgs, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(matches!(format, OutputFormat::Json));
    let config = Config::load_or_default(&Config::default_path());

    let manifest_store = ManifestStore::new(config.deletion.manifests_dir.as_path()).context("failed to open manifest store")?;
    let clock = Arc::new(SystemClock);
    let adapter = build_adapter(&args.remote, &config, clock.clone())?;
    let manifest_id = ManifestId::new(&args.id).context("invalid manifest id")?;

    let opts = ExecuteOptions {
        method: args.method.into(),
        batch_size: args.batch_size,
        resume: args.resume,
    };
    let cancellation = CancellationToken::new();

    let manifest = execute_manifest(
        &manifest_store,
        adapter,
        clock.as_ref(),
        &manifest_id,
        opts,
        &NullDeletionProgress,
        &cancellation,
    )
    .await
    .context("manifest execution failed")?;

    let execution = manifest.execution();

    if matches!(format, OutputFormat::Json) {
        formatter.print_json(&serde_json::json!({
            "id": manifest.id().to_string(),
            "status": manifest.status().to_string(),
            "succeeded": execution.map(|e| e.succeeded).unwrap_or(0),
            "failed": execution.map(|e| e.failed).unwrap_or(0),
        }));
        return Ok(());
    }

    formatter.success(&format!("Manifest {} is now {}", manifest.id(), manifest.status()));
    if let Some(exec) = execution {
        formatter.info(&format!("Succeeded: {}  Failed: {}", exec.succeeded, exec.failed));
    }

    Ok(())
}

async fn cancel(args: &CancelArgs, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(matches!(format, OutputFormat::Json));
    let config = Config::load_or_default(&Config::default_path());
    let manifest_store = ManifestStore::new(config.deletion.manifests_dir.as_path()).context("failed to open manifest store")?;

    let manifest_id = ManifestId::new(&args.id).context("invalid manifest id")?;
    manifest_store.cancel(&manifest_id).context("failed to cancel manifest")?;

    if matches!(format, OutputFormat::Json) {
        formatter.print_json(&serde_json::json!({ "id": manifest_id.to_string(), "cancelled": true }));
    } else {
        formatter.success(&format!("Cancelled manifest {manifest_id}"));
    }

    Ok(())
}
