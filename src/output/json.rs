//! JSON output formatting
//!
//! One document per run: host and timing information, the effective
//! configuration, and a block per phase with call counts, throughput and
//! latency percentiles.

use crate::config::Config;
use crate::coordinator::phase::PhaseReport;
use crate::coordinator::RunReport;
use crate::stats::LatencySummary;
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Run information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRunInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// RFC 3339
    pub start_time: String,
    pub end_time: String,
    pub version: String,
}

/// Per-phase results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonPhase {
    pub label: String,
    pub state: String,
    pub target_rate: u32,
    pub agents: usize,
    pub batch_size: usize,
    pub elapsed_secs: f64,
    pub ok_calls: u64,
    pub failed_calls: u64,
    pub ops_per_sec: f64,
    pub records_per_sec: f64,
    pub stragglers: usize,
    pub latency: LatencySummary,
    pub failed_latency: LatencySummary,
}

impl JsonPhase {
    pub fn from_report(phase: &PhaseReport) -> Self {
        let snap = phase.snapshot();
        Self {
            label: phase.label.clone(),
            state: phase.state.to_string(),
            target_rate: phase.target_rate,
            agents: phase.agent_count,
            batch_size: snap.batch_size,
            elapsed_secs: phase.elapsed.as_secs_f64(),
            ok_calls: snap.ok_calls,
            failed_calls: snap.failed_calls,
            ops_per_sec: snap.ops_per_sec,
            records_per_sec: snap.records_per_sec,
            stragglers: phase.stragglers,
            latency: snap.ok_latency,
            failed_latency: snap.failed_latency,
        }
    }
}

/// Complete JSON report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonReport {
    pub run_info: JsonRunInfo,
    pub config: Config,
    pub phases: Vec<JsonPhase>,
}

/// Build the report for a finished run
pub fn build_report(
    report: &RunReport,
    config: &Config,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
) -> JsonReport {
    JsonReport {
        run_info: JsonRunInfo {
            hostname: get_hostname(),
            start_time: start_time.to_rfc3339(),
            end_time: end_time.to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        config: config.clone(),
        phases: report.phases().map(JsonPhase::from_report).collect(),
    }
}

/// Write the report as pretty-printed JSON
pub fn write_json_output(output_path: &Path, report: &JsonReport) -> Result<()> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create JSON output: {}", output_path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .with_context(|| format!("Failed to write JSON output: {}", output_path.display()))?;
    Ok(())
}

fn get_hostname() -> Option<String> {
    hostname::get().ok().and_then(|h| h.into_string().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::mock::MockContainer;
    use crate::coordinator::phase::PhaseRunner;
    use crate::item::id::ItemIdGenerator;
    use crate::item::ItemGenerator;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn short_run() -> RunReport {
        let generator = Arc::new(ItemGenerator::new(ItemIdGenerator::increasing(0), 0));
        let runner = PhaseRunner::new(Arc::new(MockContainer::new()), generator, 4)
            .with_settle_delay(Duration::ZERO);
        let main = runner
            .run_phase("Main Test", Duration::from_millis(300), 40, 2)
            .unwrap();
        RunReport { warmup: None, main }
    }

    #[test]
    fn test_write_and_read_back() {
        let run = short_run();
        let config = Config::default();
        let start = Utc::now();
        let report = build_report(&run, &config, start, Utc::now());

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        write_json_output(&path, &report).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let phases = value["phases"].as_array().unwrap();
        assert_eq!(phases.len(), 1);
        assert_eq!(phases[0]["label"], "Main Test");
        assert_eq!(phases[0]["state"], "COMPLETE");
        assert_eq!(phases[0]["batch_size"], 4);
        assert_eq!(
            phases[0]["ok_calls"].as_u64().unwrap(),
            run.main.snapshot().ok_calls
        );
        assert!(phases[0]["latency"]["p99_ms"].is_number());
        assert_eq!(value["config"]["workload"]["agents"], 10);

        let started = value["run_info"]["start_time"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(started).is_ok());
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let run = short_run();
        let report = build_report(&run, &Config::default(), Utc::now(), Utc::now());
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("no_such_dir").join("report.json");
        assert!(write_json_output(&path, &report).is_err());
    }
}
