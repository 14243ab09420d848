//! mailvault CLI - command-line interface for the mail mirror daemon
//!
//! Provides commands for:
//! - Running a full or incremental sync against a source
//! - Viewing sync/source status
//! - Managing deletion manifests (§4.9)
//! - Viewing audit log entries
//! - Managing configuration
//! - Generating shell completions

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::audit::AuditCommand;
use commands::completions::CompletionsCommand;
use commands::config::ConfigCommand;
use commands::manifest::ManifestCommand;
use commands::status::StatusCommand;
use commands::sync::SyncCommand;
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "mailvault", version, about = "Local durable mirror of a remote mail account")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a full or incremental sync against a source
    #[command(subcommand)]
    Sync(SyncCommand),
    /// Show source and sync run status
    Status(StatusCommand),
    /// View audit log entries
    Audit(AuditCommand),
    /// Manage deletion manifests
    #[command(subcommand)]
    Manifest(ManifestCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Commands::Sync(cmd) => cmd.execute(format).await,
        Commands::Status(cmd) => cmd.execute(format).await,
        Commands::Audit(cmd) => cmd.execute(format).await,
        Commands::Manifest(cmd) => cmd.execute(format).await,
        Commands::Config(cmd) => cmd.execute(format).await,
        Commands::Completions(cmd) => cmd.execute(format).await,
    }
}
