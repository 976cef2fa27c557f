//! CLI to Config conversion utilities

use crate::config::cli;
use crate::container::ContainerKind;
use anyhow::{Context, Result};

/// Parse a duration string (e.g., "60s", "5m", "1h") to seconds
pub fn parse_duration(s: &str) -> Result<u64> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier) = if s.ends_with("sec") || s.ends_with('s') {
        (s.trim_end_matches("sec").trim_end_matches('s'), 1u64)
    } else if s.ends_with("min") || s.ends_with('m') {
        (s.trim_end_matches("min").trim_end_matches('m'), 60)
    } else if s.ends_with("hr") || s.ends_with('h') {
        (s.trim_end_matches("hr").trim_end_matches('h'), 3600)
    } else {
        (s.as_str(), 1)
    };

    let num: u64 = num_str
        .parse()
        .with_context(|| format!("Invalid duration format: {}", s))?;

    Ok(num * multiplier)
}

/// Parse a short delay (e.g., "500ms", "1s") to milliseconds
pub fn parse_delay_ms(s: &str) -> Result<u64> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 1u64)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1000)
    } else {
        (s.as_str(), 1)
    };

    let num: u64 = num_str
        .parse()
        .with_context(|| format!("Invalid delay format: {}", s))?;

    Ok(num * multiplier)
}

/// Convert CLI ContainerType to ContainerKind
pub fn convert_container_type(cli_type: cli::ContainerType) -> ContainerKind {
    match cli_type {
        cli::ContainerType::Collection => ContainerKind::Collection,
        cli::ContainerType::Table => ContainerKind::Table,
    }
}
