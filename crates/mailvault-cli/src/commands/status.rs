//! Status command - displays source and sync run status
//!
//! Provides the `mailvault status` CLI command which shows, for a given
//! source identifier, whether it has ever synced, its current history
//! cursor, and the active full/incremental run if one is in flight.

use anyhow::{Context, Result};
use clap::Args;
use mailvault_core::config::Config;
use mailvault_core::domain::SyncKind;
use mailvault_store::{DatabasePool, SqliteStore};
use mailvault_core::ports::Store;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Source identifier to show status for (typically the mailbox address)
    pub identifier: String,
}

impl StatusCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        let config = Config::load_or_default(&Config::default_path());

        if !config.store.database_path.exists() {
            formatter.error("No database found. Run 'mailvault sync full' first.");
            return Ok(());
        }

        let pool = DatabasePool::new(&config.store.database_path)
            .await
            .context("failed to open database")?;
        let store = SqliteStore::new(pool.pool().clone());

        let source = store
            .get_source_by_identifier(&self.identifier)
            .await
            .context("failed to query source")?;

        let Some(source) = source else {
            if matches!(format, OutputFormat::Json) {
                formatter.print_json(&serde_json::json!({
                    "identifier": self.identifier,
                    "known": false,
                }));
            } else {
                formatter.info(&format!("No source named '{}' has synced yet.", self.identifier));
            }
            return Ok(());
        };

        let full_run = store.get_active_sync(source.id(), SyncKind::Full).await.context("failed to query active full sync")?;
        let incremental_run = store
            .get_active_sync(source.id(), SyncKind::Incremental)
            .await
            .context("failed to query active incremental sync")?;

        if matches!(format, OutputFormat::Json) {
            let json = serde_json::json!({
                "identifier": source.identifier(),
                "kind": source.kind().to_string(),
                "cursor": source.cursor().map(|c| c.value()),
                "active_full_sync": full_run.as_ref().map(run_summary_json),
                "active_incremental_sync": incremental_run.as_ref().map(run_summary_json),
            });
            formatter.print_json(&json);
            return Ok(());
        }

        formatter.success(&format!("Source: {}", source.identifier()));
        formatter.info(&format!("Kind:   {}", source.kind()));
        formatter.info(&format!(
            "Cursor: {}",
            source.cursor().map(|c| c.value().to_string()).unwrap_or_else(|| "(none, needs a full sync)".to_string())
        ));
        formatter.info("");

        match full_run {
            Some(run) => formatter.info(&format!("Active full sync:        {}", run.summary())),
            None => formatter.info("Active full sync:        none"),
        }
        match incremental_run {
            Some(run) => formatter.info(&format!("Active incremental sync: {}", run.summary())),
            None => formatter.info("Active incremental sync: none"),
        }

        Ok(())
    }
}

fn run_summary_json(run: &mailvault_core::domain::SyncRun) -> serde_json::Value {
    let checkpoint = run.checkpoint();
    serde_json::json!({
        "status": run.status().to_string(),
        "started_at": run.started_at().to_rfc3339(),
        "processed": checkpoint.processed,
        "added": checkpoint.added,
        "updated": checkpoint.updated,
        "errors": checkpoint.errors,
    })
}
