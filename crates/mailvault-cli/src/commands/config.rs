//! Config command - view and manage mailvault configuration
//!
//! Provides the `mailvault config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON)
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors

use anyhow::{Context, Result};
use clap::Subcommand;
use mailvault_core::config::Config;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "rate_limiting.requested_qps")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(format).await,
            ConfigCommand::Set { key, value } => self.execute_set(key, value, format).await,
            ConfigCommand::Validate => self.execute_validate(format).await,
        }
    }

    async fn execute_show(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));

        let config_path = Config::default_path();
        let config = Config::load_or_default(&config_path);

        info!(config_path = %config_path.display(), "showing configuration");

        if matches!(format, OutputFormat::Json) {
            let json = serde_json::to_value(&config).context("failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", config_path.display()));
            formatter.info("");

            let yaml = serde_yaml::to_string(&config).context("failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }

        Ok(())
    }

    async fn execute_set(&self, key: &str, value: &str, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));

        let config_path = Config::default_path();
        let mut config = Config::load_or_default(&config_path);

        info!(key = %key, value = %value, "setting configuration value");

        match apply_config_value(&mut config, key, value) {
            Ok(()) => {
                let errors = config.validate();
                if !errors.is_empty() {
                    let error_msgs: Vec<String> = errors.iter().map(|e| format!("{}: {}", e.field, e.message)).collect();
                    if matches!(format, OutputFormat::Json) {
                        formatter.print_json(&serde_json::json!({
                            "success": false,
                            "key": key,
                            "value": value,
                            "errors": error_msgs,
                        }));
                    } else {
                        formatter.error(&format!("Invalid value for '{}': {}", key, error_msgs.join("; ")));
                    }
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    std::fs::create_dir_all(parent).context("failed to create configuration directory")?;
                }

                let yaml = serde_yaml::to_string(&config).context("failed to serialize configuration")?;
                std::fs::write(&config_path, &yaml).context("failed to write configuration file")?;

                if matches!(format, OutputFormat::Json) {
                    formatter.print_json(&serde_json::json!({
                        "success": true,
                        "key": key,
                        "value": value,
                        "config_path": config_path.display().to_string(),
                    }));
                } else {
                    formatter.success(&format!("Set {} = {}", key, value));
                    formatter.info(&format!("Saved to {}", config_path.display()));
                }
            }
            Err(e) => {
                if matches!(format, OutputFormat::Json) {
                    formatter.print_json(&serde_json::json!({
                        "success": false,
                        "key": key,
                        "value": value,
                        "error": e.to_string(),
                    }));
                } else {
                    formatter.error(&format!("Failed to set '{}': {}", key, e));
                    formatter.info("");
                    formatter.info("Supported keys:");
                    formatter.info("  store.database_path                  - SQLite database path");
                    formatter.info("  rate_limiting.capacity                - Token bucket capacity");
                    formatter.info("  rate_limiting.default_refill_rate     - Max refill rate (tokens/sec)");
                    formatter.info("  rate_limiting.requested_qps           - Requested refill rate (tokens/sec)");
                    formatter.info("  rate_limiting.batch_fetch_concurrency - Concurrent raw-message fetches");
                    formatter.info("  attachments.dir                       - Attachment storage root");
                    formatter.info("  deletion.manifests_dir                - Deletion manifest storage root");
                    formatter.info("  deletion.batch_chunk_size             - Batch-delete chunk size");
                    formatter.info("  logging.level                         - trace|debug|info|warn|error");
                    formatter.info("  logging.json                         - true|false");
                }
            }
        }

        Ok(())
    }

    async fn execute_validate(&self, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(matches!(format, OutputFormat::Json));
        let config_path = Config::default_path();

        let config = match Config::load(&config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                if !config_path.exists() {
                    if matches!(format, OutputFormat::Json) {
                        formatter.print_json(&serde_json::json!({
                            "valid": false,
                            "config_path": config_path.display().to_string(),
                            "errors": ["configuration file not found; using defaults"],
                        }));
                    } else {
                        formatter.info(&format!("Configuration file not found at {}", config_path.display()));
                        formatter.info("Using default configuration. Run 'mailvault config set <key> <value>' to create one.");
                    }
                    return Ok(());
                }

                if matches!(format, OutputFormat::Json) {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": config_path.display().to_string(),
                        "errors": [format!("failed to parse configuration: {e}")],
                    }));
                } else {
                    formatter.error(&format!("Failed to parse configuration: {e}"));
                    formatter.info(&format!("File: {}", config_path.display()));
                }
                return Ok(());
            }
        };

        info!(config_path = %config_path.display(), "validating configuration");
        let errors = config.validate();

        if matches!(format, OutputFormat::Json) {
            let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": config_path.display().to_string(),
                "errors": error_strings,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", config_path.display()));
        } else {
            formatter.error(&format!("Configuration has {} error{}:", errors.len(), if errors.len() == 1 { "" } else { "s" }));
            formatter.info(&format!("File: {}", config_path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }

        Ok(())
    }
}

/// Applies a dot-notation `key = value` pair to `config`, parsing `value`
/// according to the target field's type.
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "store.database_path" => config.store.database_path = value.into(),
        "rate_limiting.capacity" => {
            config.rate_limiting.capacity = value.parse().with_context(|| format!("'{value}' is not a valid integer"))?
        }
        "rate_limiting.default_refill_rate" => {
            config.rate_limiting.default_refill_rate =
                value.parse().with_context(|| format!("'{value}' is not a valid number"))?
        }
        "rate_limiting.requested_qps" => {
            config.rate_limiting.requested_qps = value.parse().with_context(|| format!("'{value}' is not a valid number"))?
        }
        "rate_limiting.batch_fetch_concurrency" => {
            config.rate_limiting.batch_fetch_concurrency =
                value.parse().with_context(|| format!("'{value}' is not a valid integer"))?
        }
        "attachments.dir" => config.attachments.dir = value.into(),
        "deletion.manifests_dir" => config.deletion.manifests_dir = value.into(),
        "deletion.batch_chunk_size" => {
            config.deletion.batch_chunk_size = value.parse().with_context(|| format!("'{value}' is not a valid integer"))?
        }
        "logging.level" => config.logging.level = value.to_string(),
        "logging.json" => {
            config.logging.json = value.parse().with_context(|| format!("'{value}' is not a valid boolean"))?
        }
        other => anyhow::bail!("unknown configuration key '{other}'"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sets_a_string_field() {
        let mut config = Config::default();
        apply_config_value(&mut config, "logging.level", "debug").unwrap();
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn sets_a_numeric_field() {
        let mut config = Config::default();
        apply_config_value(&mut config, "rate_limiting.requested_qps", "42.5").unwrap();
        assert_eq!(config.rate_limiting.requested_qps, 42.5);
    }

    #[test]
    fn sets_a_boolean_field() {
        let mut config = Config::default();
        apply_config_value(&mut config, "logging.json", "true").unwrap();
        assert!(config.logging.json);
    }

    #[test]
    fn rejects_unknown_keys() {
        let mut config = Config::default();
        assert!(apply_config_value(&mut config, "nonsense.key", "1").is_err());
    }

    #[test]
    fn rejects_malformed_numbers() {
        let mut config = Config::default();
        assert!(apply_config_value(&mut config, "rate_limiting.capacity", "not-a-number").is_err());
    }
}
