//! TOML configuration file parsing

use super::*;
use crate::config::cli::Cli;
use crate::config::cli_convert::{convert_container_type, parse_delay_ms, parse_duration};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config =
        ::toml::from_str(contents).context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config> {
    // Workload
    if let Some(agents) = cli.agents {
        config.workload.agents = agents;
    }
    if let Some(rate) = cli.rate {
        config.workload.rate = rate;
    }
    if let Some(batch_size) = cli.batch_size {
        config.workload.batch_size = batch_size;
    }
    if let Some(vector_length) = cli.vector_length {
        config.workload.vector_length = vector_length;
    }
    if cli.ordered {
        config.workload.ordered_inserts = true;
    }

    // Phases
    if let Some(ref warmup) = cli.warmup {
        config.phases.warmup_secs = parse_duration(warmup).context("Invalid warm-up duration")?;
    }
    if let Some(fraction) = cli.warmup_fraction {
        config.phases.warmup_rate_fraction = fraction;
    }
    if let Some(ref duration) = cli.duration {
        config.phases.test_secs = parse_duration(duration).context("Invalid test duration")?;
    }
    if let Some(ref delay) = cli.settle_delay {
        config.phases.settle_delay_ms = parse_delay_ms(delay).context("Invalid settle delay")?;
    }

    // Container
    if let Some(kind) = cli.container_type {
        config.container.kind = convert_container_type(kind);
    }
    if let Some(ref name) = cli.name {
        config.container.name = name.clone();
    }
    if let Some(latency) = cli.write_latency_ms {
        config.container.backend.latency_ms = latency;
    }
    if let Some(every) = cli.fail_every {
        config.container.backend.fail_every = Some(every);
    }
    if let Some(max_batch) = cli.max_backend_batch {
        config.container.backend.max_batch = max_batch;
    }

    // Runtime
    if cli.debug {
        config.runtime.debug = true;
    }
    if cli.skip_validation {
        config.runtime.skip_validation = true;
    }
    if let Some(ref path) = cli.json_output {
        config.runtime.json_output = Some(path.clone());
    }

    Ok(config)
}

/// Build the effective configuration: TOML file if given, then CLI overrides
pub fn load_config(cli: &Cli) -> Result<Config> {
    let base = match cli.config {
        Some(ref path) => parse_toml_file(path)?,
        None => Config::default(),
    };
    merge_cli_with_config(cli, base)
}
