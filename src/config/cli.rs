//! CLI argument parsing using clap

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Container style
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ContainerType {
    /// Document collection with exact counts
    Collection,
    /// Table without count support
    Table,
}

/// insertpulse - phased, rate-limited insert benchmark
#[derive(Parser, Debug)]
#[command(name = "insertpulse")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file; command-line options override it
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    // === Workload Options ===
    /// Number of concurrent agents
    #[arg(short = 'a', long)]
    pub agents: Option<usize>,

    /// Maximum insert calls per second across all agents
    #[arg(short = 'r', long)]
    pub rate: Option<u32>,

    /// Items per insert call
    #[arg(short = 'b', long)]
    pub batch_size: Option<usize>,

    /// Vector dimension (0 disables vectors)
    #[arg(long)]
    pub vector_length: Option<usize>,

    /// Stop multi-item inserts at the first failing item
    #[arg(long)]
    pub ordered: bool,

    // === Phase Options ===
    /// Warm-up duration (e.g., 20s, 1m); 0 skips the warm-up
    #[arg(long)]
    pub warmup: Option<String>,

    /// Warm-up rate as a fraction of --rate
    #[arg(long)]
    pub warmup_fraction: Option<f64>,

    /// Main test duration (e.g., 60s, 5m, 1h)
    #[arg(short = 'd', long)]
    pub duration: Option<String>,

    /// Pause between container reset and phase start (e.g., 1s, 0)
    #[arg(long)]
    pub settle_delay: Option<String>,

    // === Container Options ===
    /// Container style
    #[arg(long, value_enum)]
    pub container_type: Option<ContainerType>,

    /// Container name
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// Simulated latency added to every write, in milliseconds
    #[arg(long)]
    pub write_latency_ms: Option<u64>,

    /// Fail every Nth write call (requires --skip-validation)
    #[arg(long)]
    pub fail_every: Option<u64>,

    /// Largest batch the backend accepts per call
    #[arg(long)]
    pub max_backend_batch: Option<usize>,

    // === Runtime Options ===
    /// Skip the insert/read-back validation before the phases
    #[arg(long, env = "INSERTPULSE_SKIP_VALIDATION")]
    pub skip_validation: bool,

    /// Write a JSON report to this file
    #[arg(long)]
    pub json_output: Option<PathBuf>,

    /// Print debug output
    #[arg(long)]
    pub debug: bool,

    /// Validate and print the configuration, then exit
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate CLI arguments that can be checked before merging
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.agents == Some(0) {
            anyhow::bail!("agents must be at least 1");
        }
        if self.rate == Some(0) {
            anyhow::bail!("rate must be at least 1");
        }
        if self.batch_size == Some(0) {
            anyhow::bail!("batch_size must be at least 1");
        }
        if let Some(fraction) = self.warmup_fraction {
            if !(fraction > 0.0 && fraction <= 1.0) {
                anyhow::bail!("warmup_fraction must be in (0, 1], got {}", fraction);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options() {
        let cli = Cli::try_parse_from([
            "insertpulse",
            "-a",
            "4",
            "--rate",
            "250",
            "--batch-size",
            "10",
            "--duration",
            "2m",
            "--container-type",
            "table",
            "--ordered",
        ])
        .unwrap();
        assert_eq!(cli.agents, Some(4));
        assert_eq!(cli.rate, Some(250));
        assert_eq!(cli.batch_size, Some(10));
        assert_eq!(cli.duration.as_deref(), Some("2m"));
        assert_eq!(cli.container_type, Some(ContainerType::Table));
        assert!(cli.ordered);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero() {
        let cli = Cli::try_parse_from(["insertpulse", "--agents", "0"]).unwrap();
        assert!(cli.validate().is_err());

        let cli = Cli::try_parse_from(["insertpulse", "--warmup-fraction", "1.5"]).unwrap();
        assert!(cli.validate().is_err());
    }
}
