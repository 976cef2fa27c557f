//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.

pub mod cli;
pub mod cli_convert;
pub mod toml;
pub mod validator;

use crate::container::{BackendOptions, ContainerKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete benchmark configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub workload: WorkloadConfig,
    #[serde(default)]
    pub phases: PhaseConfig,
    #[serde(default)]
    pub container: ContainerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl Config {
    /// Warm-up rate: a fraction of the main rate, never below 1
    pub fn warmup_rate(&self) -> u32 {
        let rate = (f64::from(self.workload.rate) * self.phases.warmup_rate_fraction).round();
        (rate as u32).max(1)
    }

    pub fn warmup_duration(&self) -> Duration {
        Duration::from_secs(self.phases.warmup_secs)
    }

    pub fn test_duration(&self) -> Duration {
        Duration::from_secs(self.phases.test_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.phases.settle_delay_ms)
    }
}

/// What each agent sends and how fast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Concurrent agents per phase
    #[serde(default = "default_agents")]
    pub agents: usize,
    /// Maximum insert calls per second, shared by all agents
    #[serde(default = "default_rate")]
    pub rate: u32,
    /// Items per insert call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Vector dimension; 0 disables vectors
    #[serde(default = "default_vector_length")]
    pub vector_length: usize,
    /// Stop a multi-item insert at the first failing item
    #[serde(default)]
    pub ordered_inserts: bool,
}

fn default_agents() -> usize {
    10
}

fn default_rate() -> u32 {
    100
}

fn default_batch_size() -> usize {
    20
}

fn default_vector_length() -> usize {
    1500
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            agents: default_agents(),
            rate: default_rate(),
            batch_size: default_batch_size(),
            vector_length: default_vector_length(),
            ordered_inserts: false,
        }
    }
}

/// Warm-up and main test timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// Warm-up length in seconds; 0 skips the warm-up
    #[serde(default = "default_warmup_secs")]
    pub warmup_secs: u64,
    /// Warm-up rate as a fraction of `workload.rate`
    #[serde(default = "default_warmup_rate_fraction")]
    pub warmup_rate_fraction: f64,
    /// Main test length in seconds
    #[serde(default = "default_test_secs")]
    pub test_secs: u64,
    /// Pause between the container reset and agent start
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

fn default_warmup_secs() -> u64 {
    20
}

fn default_warmup_rate_fraction() -> f64 {
    0.25
}

fn default_test_secs() -> u64 {
    60
}

fn default_settle_delay_ms() -> u64 {
    1000
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            warmup_secs: default_warmup_secs(),
            warmup_rate_fraction: default_warmup_rate_fraction(),
            test_secs: default_test_secs(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

/// Which container to write into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    #[serde(default)]
    pub kind: ContainerKind,
    #[serde(default = "default_container_name")]
    pub name: String,
    #[serde(flatten)]
    pub backend: BackendOptions,
}

fn default_container_name() -> String {
    "insert_test".to_string()
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            kind: ContainerKind::default(),
            name: default_container_name(),
            backend: BackendOptions::new(),
        }
    }
}

/// Runtime switches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Print DEBUG lines
    #[serde(default)]
    pub debug: bool,
    /// Skip the pre-run insert/read-back validation
    #[serde(default)]
    pub skip_validation: bool,
    /// Write a JSON report to this path
    #[serde(default)]
    pub json_output: Option<PathBuf>,
}
