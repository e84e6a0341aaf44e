//! Output formatting utilities

use chrono::{DateTime, Duration, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{settings::Style, Table, Tabled};
use thiserror::Error;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => print_json(&items),
    }
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    if let Ok(json) = serde_json::to_string_pretty(value) {
        println!("{}", json);
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "analyzed" | "active" => status.green().to_string(),
        "degraded" | "skipped" | "insufficient_data" | "acknowledged" => {
            status.yellow().to_string()
        }
        "unhealthy" | "error" | "failed" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color severity based on value
pub fn color_severity(severity: &str) -> String {
    match severity.to_lowercase().as_str() {
        "critical" => severity.red().bold().to_string(),
        "high" => severity.red().to_string(),
        "medium" | "warning" => severity.yellow().to_string(),
        "low" | "info" => severity.blue().to_string(),
        _ => severity.to_string(),
    }
}

/// Format an RFC 3339 timestamp for display
pub fn format_timestamp(ts: &str) -> String {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| ts.to_string())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("empty period")]
    Empty,
    #[error("invalid period amount in {0:?}")]
    InvalidAmount(String),
    #[error("unknown period unit in {0:?} (expected m, h, d or w)")]
    UnknownUnit(String),
}

/// Parse a look-back period such as `30m`, `24h`, `7d` or `2w`
pub fn parse_period(input: &str) -> Result<Duration, PeriodError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(PeriodError::Empty);
    }

    let split = input.char_indices().last().map_or(0, |(i, _)| i);
    let (amount, unit) = input.split_at(split);
    let amount: i64 = amount
        .parse()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| PeriodError::InvalidAmount(input.to_string()))?;

    match unit {
        "m" => Ok(Duration::minutes(amount)),
        "h" => Ok(Duration::hours(amount)),
        "d" => Ok(Duration::days(amount)),
        "w" => Ok(Duration::weeks(amount)),
        _ => Err(PeriodError::UnknownUnit(input.to_string())),
    }
}

/// Start of a look-back period ending now
pub fn period_start(since: &str) -> Result<DateTime<Utc>, PeriodError> {
    Ok(Utc::now() - parse_period(since)?)
}
