//! Coordinator module
//!
//! Drives a benchmark run against one container: reset, a short insert and
//! read-back validation, then the warm-up and main test phases.

pub mod phase;

use crate::config::Config;
use crate::container::{Container, ContainerError, ItemCount};
use crate::item::id::ItemIdGenerator;
use crate::item::{Item, ItemGenerator};
use crate::util::time::format_secs;
use crate::Result;
use anyhow::Context;
use phase::{PhaseReport, PhaseRunner};
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

/// Items inserted one by one during validation
pub const VALIDATE_SINGLE_ITEMS: usize = 8;

/// Batches inserted during validation
pub const VALIDATE_BATCHES: usize = 5;

/// Label of the warm-up phase
pub const WARMUP_LABEL: &str = "Warm-up";

/// Label of the measured phase
pub const MAIN_TEST_LABEL: &str = "Main Test";

/// Both phases of a run
#[derive(Debug)]
pub struct RunReport {
    /// `None` when the warm-up was disabled
    pub warmup: Option<PhaseReport>,
    pub main: PhaseReport,
}

impl RunReport {
    pub fn phases(&self) -> impl Iterator<Item = &PhaseReport> {
        self.warmup.iter().chain(std::iter::once(&self.main))
    }
}

/// Benchmark driver for one container
pub struct BenchmarkClient {
    container: Arc<dyn Container>,
    config: Arc<Config>,
}

impl BenchmarkClient {
    pub fn new(container: Arc<dyn Container>, config: Arc<Config>) -> Self {
        Self { container, config }
    }

    pub fn container(&self) -> &Arc<dyn Container> {
        &self.container
    }

    fn describe(&self) -> String {
        format!("{} '{}'", self.container.kind(), self.container.name())
    }

    /// Empty the container and confirm it is empty
    pub fn initialize(&self) -> Result<()> {
        print!("  resetting {}: ", self.describe());
        flush();
        let deleted = self
            .container
            .delete_all()
            .with_context(|| format!("Failed to reset {}", self.describe()))?;
        match deleted {
            ItemCount::Exact(n) => println!("deleted {} items", n),
            ItemCount::Unsupported => println!("done (backend does not report counts)"),
        }
        self.container
            .validate_empty()
            .with_context(|| format!("{} is not usable", self.describe()))?;
        Ok(())
    }

    /// Insert, read back and verify a handful of items, then wipe them
    ///
    /// Uses a decreasing id sequence so validation ids never collide with
    /// the ids of the measured phases.
    pub fn validate(&self) -> Result<()> {
        let workload = &self.config.workload;
        let generator = ItemGenerator::new(ItemIdGenerator::decreasing(0), workload.vector_length);

        println!("  will insert {} items, one by one:", VALIDATE_SINGLE_ITEMS);
        for i in 0..VALIDATE_SINGLE_ITEMS {
            let start = Instant::now();
            let item = generator.generate_one();
            self.container
                .insert_one(&item)
                .with_context(|| format!("Failed to insert validation item '{}'", item.id))?;
            print!(
                "    inserted item #{}/{}: {} (in {})",
                i + 1,
                VALIDATE_SINGLE_ITEMS,
                item.id,
                format_secs(start.elapsed())
            );
            flush();
            self.verify_stored(&item)?;
            println!(" (verified: OK)");
        }

        let half_batch = (workload.batch_size / 2).max(1);
        println!(
            "  will now insert {} batches of {} items (ordered: {}):",
            VALIDATE_BATCHES, half_batch, workload.ordered_inserts
        );
        for i in 0..VALIDATE_BATCHES {
            let start = Instant::now();
            let items = generator.generate_batch(half_batch);
            let complete = self
                .container
                .insert_many(&items, workload.ordered_inserts)
                .with_context(|| format!("Failed to insert validation batch #{}", i + 1))?;
            if !complete {
                anyhow::bail!("Validation batch #{} was only partially inserted", i + 1);
            }
            print!(
                "    inserted batch #{}/{} (in {})",
                i + 1,
                VALIDATE_BATCHES,
                format_secs(start.elapsed())
            );
            flush();
            for item in &items {
                self.verify_stored(item)?;
            }
            println!(" (verified: OK)");
        }

        let expected = (VALIDATE_SINGLE_ITEMS + VALIDATE_BATCHES * half_batch) as u64;
        print!(
            "  all inserted and verified: should now have {} items, verify: ",
            expected
        );
        flush();
        match self.container.count_up_to(expected + 100)? {
            ItemCount::Exact(n) if n == expected => println!("OK (had expected number)"),
            ItemCount::Exact(n) => {
                println!("FAIL");
                anyhow::bail!("Expected to have {} items, had {}", expected, n);
            }
            ItemCount::Unsupported => println!("MAYBE-OK (backend does not support counting)"),
        }

        print!("  and now delete all items: ");
        flush();
        let deleted = self.container.delete_all()?;
        print!("deleted {}; validate: ", deleted);
        flush();
        self.container.validate_empty()?;
        println!("OK, now empty");
        Ok(())
    }

    fn verify_stored(&self, expected: &Item) -> Result<()> {
        let actual = self
            .container
            .find_by_key(&expected.id)?
            .ok_or_else(|| ContainerError::NotFound(expected.id.clone()))?;
        Item::verify_similarity(expected, &actual)
    }

    /// Run the warm-up phase (if enabled) and the main test
    ///
    /// Both phases draw ids from one increasing generator starting at cycle 0.
    pub fn run_warmup_and_test(&self) -> Result<RunReport> {
        let config = &self.config;
        let generator = Arc::new(ItemGenerator::new(
            ItemIdGenerator::increasing(0),
            config.workload.vector_length,
        ));
        let runner = PhaseRunner::new(
            Arc::clone(&self.container),
            generator,
            config.workload.batch_size,
        )
        .with_ordered(config.workload.ordered_inserts)
        .with_settle_delay(config.settle_delay())
        .with_debug(config.runtime.debug);

        let warmup = if config.phases.warmup_secs > 0 {
            Some(runner.run_phase(
                WARMUP_LABEL,
                config.warmup_duration(),
                config.warmup_rate(),
                config.workload.agents,
            )?)
        } else {
            None
        };
        let main = runner.run_phase(
            MAIN_TEST_LABEL,
            config.test_duration(),
            config.workload.rate,
            config.workload.agents,
        )?;
        Ok(RunReport { warmup, main })
    }
}

fn flush() {
    let _ = std::io::stdout().flush();
}
