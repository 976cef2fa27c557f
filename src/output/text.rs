//! Human-readable text output

use crate::config::Config;
use crate::coordinator::phase::PhaseReport;
use crate::coordinator::RunReport;
use crate::stats::LatencySummary;
use crate::util::time::format_rate;

/// Print the results of every phase of a run
pub fn print_results(report: &RunReport, config: &Config) {
    println!("═══════════════════════════════════════════════════════════");
    println!("                    TEST RESULTS");
    println!("═══════════════════════════════════════════════════════════");
    println!();
    println!(
        "Container: {} '{}', {} agents, batch size {}, vector length {}",
        config.container.kind,
        config.container.name,
        config.workload.agents,
        config.workload.batch_size,
        config.workload.vector_length
    );

    for phase in report.phases() {
        println!();
        print_phase(phase);
    }

    println!();
    println!("═══════════════════════════════════════════════════════════");
}

/// Print one phase block
pub fn print_phase(phase: &PhaseReport) {
    let snap = phase.snapshot();
    println!(
        "Phase '{}' ({:.3}s at max {} ops/sec):",
        phase.label,
        phase.elapsed.as_secs_f64(),
        phase.target_rate
    );

    println!("  Calls:");
    println!("    OK:     {}", format_number(snap.ok_calls));
    println!("    Failed: {}", format_number(snap.failed_calls));
    if snap.total_calls() > 0 {
        let success = snap.ok_calls as f64 / snap.total_calls() as f64 * 100.0;
        println!("    Success rate: {:.2}%", success);
    }

    println!("  Throughput:");
    println!("    {} ops/sec", format_rate(snap.ops_per_sec));
    println!("    {} records/sec", format_rate(snap.records_per_sec));

    println!("  Latency (successful calls):");
    print_latency(&snap.ok_latency);
    if snap.failed_latency.count > 0 {
        println!("  Latency (failed calls):");
        print_latency(&snap.failed_latency);
    }

    if phase.stragglers > 0 {
        println!("  WARNING: {} agent(s) did not finish in time", phase.stragglers);
    }
}

fn print_latency(latency: &LatencySummary) {
    if latency.count == 0 {
        println!("    (no samples)");
        return;
    }
    println!("    Min:  {:.2} ms", latency.min_ms);
    println!("    Mean: {:.2} ms", latency.mean_ms);
    println!("    p50:  {:.2} ms", latency.p50_ms);
    println!("    p95:  {:.2} ms", latency.p95_ms);
    println!("    p99:  {:.2} ms", latency.p99_ms);
    println!("    Max:  {:.2} ms", latency.max_ms);
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();

    for (count, c) in s.chars().rev().enumerate() {
        if count > 0 && count % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    result.chars().rev().collect()
}
