//! InsertPulse CLI entry point

use anyhow::{Context, Result};
use insertpulse::config::{cli::Cli, toml::load_config, validator, Config};
use insertpulse::container::{create_container, Container};
use insertpulse::coordinator::BenchmarkClient;
use insertpulse::output::{json, text};
use std::process::ExitCode;
use std::sync::Arc;

const EXIT_CONFIG: u8 = 1;
const EXIT_CONTAINER: u8 = 2;
const EXIT_INITIALIZE: u8 = 3;
const EXIT_VALIDATE: u8 = 4;
const EXIT_RUN: u8 = 5;

fn main() -> ExitCode {
    println!("InsertPulse v{}", env!("CARGO_PKG_VERSION"));
    println!("Rate-limited insert benchmark");
    println!();

    let cli = Cli::parse_args();
    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => return fail(EXIT_CONFIG, "Invalid configuration", &e),
    };
    print_configuration(&config);

    if cli.dry_run {
        println!();
        println!("Dry run mode - configuration validated successfully");
        return ExitCode::SUCCESS;
    }

    match run(Arc::new(config)) {
        Ok(()) => {
            println!("DONE!");
            ExitCode::SUCCESS
        }
        Err((code, stage, e)) => fail(code, stage, &e),
    }
}

fn build_config(cli: &Cli) -> Result<Config> {
    cli.validate()?;
    let config = load_config(cli)?;
    validator::validate_config(&config).context("Configuration validation failed")?;
    Ok(config)
}

type StageError = (u8, &'static str, anyhow::Error);

fn run(config: Arc<Config>) -> std::result::Result<(), StageError> {
    let debug = config.runtime.debug;

    println!();
    println!("Opening container:");
    let container =
        open_container(&config).map_err(|e| (EXIT_CONTAINER, "Failed to open container", e))?;
    let client = BenchmarkClient::new(container, Arc::clone(&config));

    println!("Initializing container:");
    client
        .initialize()
        .map_err(|e| (EXIT_INITIALIZE, "Failed to initialize container", e))?;

    if config.runtime.skip_validation {
        println!("Skipping validation");
    } else {
        println!("Validating inserts:");
        client
            .validate()
            .map_err(|e| (EXIT_VALIDATE, "Validation failed", e))?;
    }

    println!();
    println!("Starting test...");
    println!();
    let start_time = chrono::Utc::now();
    let report = client
        .run_warmup_and_test()
        .map_err(|e| (EXIT_RUN, "Test run failed", e))?;
    let end_time = chrono::Utc::now();

    println!();
    text::print_results(&report, &config);

    if let Some(ref path) = config.runtime.json_output {
        let json_report = json::build_report(&report, &config, start_time, end_time);
        json::write_json_output(path, &json_report)
            .map_err(|e| (EXIT_RUN, "Failed to write JSON report", e))?;
        println!("JSON report written to {}", path.display());
    }
    if debug {
        println!("DEBUG: run finished at {}", end_time.to_rfc3339());
    }
    Ok(())
}

fn open_container(config: &Config) -> Result<Arc<dyn Container>> {
    let settings = &config.container;
    let container = create_container(settings.kind, &settings.name, &settings.backend);
    // Probe once so a broken backend fails here rather than mid-run
    container
        .count_up_to(1)
        .with_context(|| format!("{} '{}' is not reachable", settings.kind, settings.name))?;
    println!("  opened {} '{}'", container.kind(), container.name());
    Ok(container)
}

fn fail(code: u8, stage: &str, error: &anyhow::Error) -> ExitCode {
    eprintln!("ERROR: {}: {:#}", stage, error);
    ExitCode::from(code)
}

/// Display the effective configuration
fn print_configuration(config: &Config) {
    let workload = &config.workload;
    let phases = &config.phases;
    let container = &config.container;

    println!("Configuration:");
    println!("  Container: {} '{}'", container.kind, container.name);
    if container.backend.latency_ms > 0 {
        println!("  Simulated write latency: {} ms", container.backend.latency_ms);
    }
    if let Some(every) = container.backend.fail_every {
        println!("  Injected failure: every {} writes", every);
    }
    println!("  Max backend batch: {}", container.backend.max_batch);
    println!(
        "  Agents: {} ({} CPUs available)",
        workload.agents,
        num_cpus::get()
    );
    println!("  Max rate: {} ops/sec", workload.rate);
    println!("  Batch size: {}", workload.batch_size);
    if workload.vector_length > 0 {
        println!("  Vector length: {}", workload.vector_length);
    } else {
        println!("  Vector: NONE");
    }
    println!("  Ordered inserts: {}", workload.ordered_inserts);
    if phases.warmup_secs > 0 {
        println!(
            "  Warm-up: {}s at {} ops/sec",
            phases.warmup_secs,
            config.warmup_rate()
        );
    } else {
        println!("  Warm-up: disabled");
    }
    println!("  Main test: {}s at {} ops/sec", phases.test_secs, workload.rate);
    if let Some(ref path) = config.runtime.json_output {
        println!("  JSON output: {}", path.display());
    }
}
