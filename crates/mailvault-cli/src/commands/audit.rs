//! Audit command - view audit log entries
//!
//! Provides the `mailvault audit` CLI command which:
//! 1. Queries audit log entries with filters (time, action)
//! 2. Formats entries in a table with timestamp, action, result, and details
//! 3. Supports relative and absolute time parsing for the --since flag
//!
//! Queries the `audit_log` table directly through `mailvault-store`'s
//! [`audit_entry_from_row`] rather than through the `Store` port: reading
//! the audit trail is CLI-only inspection, not something the ingest or
//! deletion controllers need, so it has no place on the port (see
//! `DESIGN.md`).

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::Args;
use mailvault_core::config::Config;
use mailvault_store::{audit_entry_from_row, DatabasePool};
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct AuditCommand {
    /// Show entries since this time (e.g., "1h", "2d", "2024-01-01")
    #[arg(long)]
    pub since: Option<String>,

    /// Filter by action type (substring match)
    #[arg(long)]
    pub action: Option<String>,

    /// Maximum number of entries to show
    #[arg(long, default_value = "50")]
    pub limit: u32,
}

impl AuditCommand {
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

        let since = match &self.since {
            Some(since_str) => {
                let parsed = parse_since(since_str).with_context(|| {
                    format!(
                        "invalid --since value: '{since_str}'. Expected formats: '1h', '30m', '2d', '1w', '2024-01-01', '2024-01-01T12:00:00'"
                    )
                })?;
                info!(since = %parsed, "filtering audit entries since");
                parsed
            }
            None => Utc::now() - chrono::Duration::days(7),
        };

        let rows = sqlx::query("SELECT * FROM audit_log WHERE timestamp >= ? ORDER BY timestamp DESC LIMIT ?")
            .bind(since.to_rfc3339())
            .bind(self.limit as i64)
            .fetch_all(pool.pool())
            .await
            .context("failed to query audit entries")?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(audit_entry_from_row(row).context("failed to decode audit entry")?);
        }

        info!(count = entries.len(), "retrieved audit entries");

        let display_entries: Vec<_> = entries
            .iter()
            .filter(|entry| match &self.action {
                Some(action_filter) => entry.action().to_string().contains(action_filter.as_str()),
                None => true,
            })
            .collect();

        if matches!(format, OutputFormat::Json) {
            let entries_json: Vec<serde_json::Value> = display_entries
                .iter()
                .map(|entry| {
                    serde_json::json!({
                        "timestamp": entry.timestamp().to_rfc3339(),
                        "action": entry.action().to_string(),
                        "source_id": entry.source_id().map(|id| id.to_string()),
                        "sync_run_id": entry.sync_run_id().map(|id| id.to_string()),
                        "result": if entry.result().is_success() { "success" } else { "failed" },
                        "details": entry.details(),
                        "duration_ms": entry.duration_ms(),
                    })
                })
                .collect();

            formatter.print_json(&serde_json::json!({
                "since": since.to_rfc3339(),
                "limit": self.limit,
                "count": display_entries.len(),
                "entries": entries_json,
            }));
            return Ok(());
        }

        if display_entries.is_empty() {
            formatter.info("No audit entries found for the specified criteria.");
            return Ok(());
        }

        formatter.success(&format!("Audit Log ({} entries)", display_entries.len()));
        formatter.info("");
        formatter.info("  Timestamp                Action             Result   Details");
        formatter.info("  ----------------------- ------------------ -------- -------");

        for entry in &display_entries {
            let timestamp = entry.timestamp().format("%Y-%m-%d %H:%M:%S");
            let action = entry.action().to_string();
            let result = if entry.result().is_success() { "OK     " } else { "FAILED " };
            let details = format_details(entry.details());

            formatter.info(&format!("  {} {:<18} {} {}", timestamp, action, result, details));
        }

        if display_entries.len() as u32 >= self.limit {
            formatter.info("");
            formatter.info(&format!("Showing {} entries (limit). Use --limit to show more.", self.limit));
        }

        Ok(())
    }
}

/// Parses the `--since` argument into a `DateTime<Utc>`.
///
/// Supports relative durations ("1h", "30m", "2d", "1w") and absolute
/// dates/datetimes ("2024-01-01", "2024-01-01T12:00:00").
fn parse_since(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if let Some(duration) = parse_relative_duration(input) {
        return Ok(Utc::now() - duration);
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let datetime = date.and_hms_opt(0, 0, 0).context("failed to create datetime from date")?;
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(datetime, Utc));
    }

    if let Ok(datetime) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(datetime, Utc));
    }

    anyhow::bail!("could not parse '{input}' as a time. Use relative (1h, 30m, 2d, 1w) or absolute (2024-01-01) format.")
}

fn parse_relative_duration(input: &str) -> Option<chrono::Duration> {
    if input.len() < 2 {
        return None;
    }

    let (num_str, unit) = input.split_at(input.len() - 1);
    let num: i64 = num_str.parse().ok()?;

    match unit {
        "m" => Some(chrono::Duration::minutes(num)),
        "h" => Some(chrono::Duration::hours(num)),
        "d" => Some(chrono::Duration::days(num)),
        "w" => Some(chrono::Duration::weeks(num)),
        _ => None,
    }
}

fn format_details(details: &serde_json::Value) -> String {
    match details {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => truncate_string(s, 40),
        serde_json::Value::Object(map) => {
            let mut parts = Vec::new();
            if let Some(reason) = map.get("reason").and_then(|v| v.as_str()) {
                parts.push(truncate_string(reason, 30));
            }
            if let Some(message) = map.get("message").and_then(|v| v.as_str()) {
                parts.push(truncate_string(message, 30));
            }

            if parts.is_empty() {
                match map.iter().next() {
                    Some((key, value)) => truncate_string(&format!("{key}={value}"), 40),
                    None => String::new(),
                }
            } else {
                parts.join(", ")
            }
        }
        other => truncate_string(&other.to_string(), 40),
    }
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_relative_duration_minutes() {
        assert_eq!(parse_relative_duration("30m").unwrap(), chrono::Duration::minutes(30));
    }

    #[test]
    fn parse_relative_duration_hours() {
        assert_eq!(parse_relative_duration("1h").unwrap(), chrono::Duration::hours(1));
    }

    #[test]
    fn parse_relative_duration_days() {
        assert_eq!(parse_relative_duration("2d").unwrap(), chrono::Duration::days(2));
    }

    #[test]
    fn parse_relative_duration_weeks() {
        assert_eq!(parse_relative_duration("1w").unwrap(), chrono::Duration::weeks(1));
    }

    #[test]
    fn parse_relative_duration_invalid() {
        assert!(parse_relative_duration("abc").is_none());
        assert!(parse_relative_duration("1x").is_none());
        assert!(parse_relative_duration("h").is_none());
    }

    #[test]
    fn parse_since_relative() {
        let parsed = parse_since("1h").unwrap();
        let diff = Utc::now() - parsed;
        assert!(diff.num_seconds() >= 3595 && diff.num_seconds() <= 3605);
    }

    #[test]
    fn parse_since_date() {
        let parsed = parse_since("2024-01-15").unwrap();
        assert_eq!(parsed.format("%Y-%m-%d").to_string(), "2024-01-15");
    }

    #[test]
    fn parse_since_datetime() {
        let parsed = parse_since("2024-01-15T14:30:00").unwrap();
        assert_eq!(parsed.format("%Y-%m-%dT%H:%M:%S").to_string(), "2024-01-15T14:30:00");
    }

    #[test]
    fn parse_since_invalid() {
        assert!(parse_since("not-a-time").is_err());
        assert!(parse_since("").is_err());
    }

    #[test]
    fn truncate_string_short() {
        assert_eq!(truncate_string("hello", 10), "hello");
    }

    #[test]
    fn truncate_string_long() {
        assert_eq!(truncate_string("this is a very long string", 15), "this is a ve...");
    }

    #[test]
    fn format_details_null() {
        assert_eq!(format_details(&serde_json::Value::Null), "");
    }

    #[test]
    fn format_details_string() {
        assert_eq!(format_details(&serde_json::Value::String("hello".to_string())), "hello");
    }

    #[test]
    fn format_details_object_with_reason() {
        let val = serde_json::json!({"reason": "superseded by a fresh run"});
        assert!(format_details(&val).contains("superseded by a fresh run"));
    }
}
