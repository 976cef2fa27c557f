//! Phase execution
//!
//! A phase resets the container, then releases a fresh pool of agent threads
//! through a start gate so they all start together. The orchestrating thread
//! prints progress while the agents run, waits a bounded grace period after
//! the deadline, and returns whatever was collected.
//!
//! ```text
//! Pending -> Running -> Draining -> Complete
//! ```
//!
//! Agents still busy after the grace period are detached and counted as
//! stragglers; the phase completes anyway. The next phase joins them before
//! it resets the container, so a late insert never lands in a fresh phase.

use crate::container::Container;
use crate::item::ItemGenerator;
use crate::ratelimit::RateLimiter;
use crate::stats::{MetricsSnapshot, PhaseMetrics};
use crate::util::time::{format_duration, report_interval};
use crate::worker::{Agent, AgentReport};
use crate::Result;
use anyhow::Context;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long past the deadline agents may take to finish
pub const GRACE_PERIOD: Duration = Duration::from_secs(1);

/// Default pause between the container reset and agent start
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Lifecycle of a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseState {
    Pending,
    Running,
    /// Past the deadline, waiting for agents
    Draining,
    Complete,
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhaseState::Pending => "PENDING",
            PhaseState::Running => "RUNNING",
            PhaseState::Draining => "DRAINING",
            PhaseState::Complete => "COMPLETE",
        };
        f.write_str(name)
    }
}

/// Outcome of one phase
#[derive(Debug)]
pub struct PhaseReport {
    pub label: String,
    pub state: PhaseState,
    pub target_rate: u32,
    pub agent_count: usize,
    /// Figures frozen when the phase completed
    pub metrics: MetricsSnapshot,
    /// Wall time from phase start to the end of draining
    pub elapsed: Duration,
    /// Agents that had not finished when the grace period ran out
    pub stragglers: usize,
    /// Per-agent results, for agents that finished
    pub agents: Vec<AgentReport>,
}

impl PhaseReport {
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.clone()
    }
}

type AgentOutcome = (usize, Result<AgentReport>);

/// Runs phases against one container with one shared item generator
///
/// Reusing the generator across phases keeps ids unique for the whole run.
pub struct PhaseRunner {
    container: Arc<dyn Container>,
    generator: Arc<ItemGenerator>,
    batch_size: usize,
    ordered: bool,
    settle_delay: Duration,
    debug: bool,
    /// Agent threads detached by earlier phases
    detached: Mutex<Vec<JoinHandle<()>>>,
}

impl PhaseRunner {
    pub fn new(
        container: Arc<dyn Container>,
        generator: Arc<ItemGenerator>,
        batch_size: usize,
    ) -> Self {
        Self {
            container,
            generator,
            batch_size,
            ordered: false,
            settle_delay: DEFAULT_SETTLE_DELAY,
            debug: false,
            detached: Mutex::new(Vec::new()),
        }
    }

    pub fn with_ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Run one phase of `duration` at up to `target_rate` batches per second
    ///
    /// # Errors
    ///
    /// Fails if the container cannot be reset, the rate is zero, agent
    /// threads cannot be spawned, or an agent reported a duplicate id. In the
    /// last case the error is returned only after the phase has drained.
    pub fn run_phase(
        &self,
        label: &str,
        duration: Duration,
        target_rate: u32,
        agent_count: usize,
    ) -> Result<PhaseReport> {
        if agent_count == 0 {
            anyhow::bail!("Phase '{}' needs at least one agent", label);
        }
        let mut state = PhaseState::Pending;
        println!(
            "Running phase '{}' for {} with {} agents; max {} ops/sec",
            label,
            format_duration(duration),
            agent_count,
            target_rate
        );

        self.join_detached(label);
        let deleted = self.container.delete_all().with_context(|| {
            format!(
                "Failed to reset {} '{}' before phase '{}'",
                self.container.kind(),
                self.container.name(),
                label
            )
        })?;
        if self.debug {
            println!("DEBUG: phase '{}' reset container ({} deleted)", label, deleted);
        }
        if !self.settle_delay.is_zero() {
            thread::sleep(self.settle_delay);
        }

        let limiter = Arc::new(RateLimiter::new(target_rate)?);
        let metrics = Arc::new(PhaseMetrics::new(self.batch_size));
        let gate = StartGate::new();
        let (tx, rx) = channel::unbounded::<AgentOutcome>();
        let started = Instant::now();
        let deadline = started + duration;

        // Dropping the gate on an early return sends spawned agents home
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(agent_count);
        for id in 0..agent_count {
            let agent = Agent::new(
                id,
                Arc::clone(&self.container),
                Arc::clone(&self.generator),
                self.batch_size,
                self.ordered,
            )
            .with_verbose(self.debug);
            let agent_label = label.to_string();
            let limiter = Arc::clone(&limiter);
            let metrics = Arc::clone(&metrics);
            let ticket = gate.ticket();
            let tx = tx.clone();

            let handle = thread::Builder::new()
                .name(format!("agent-{}", id))
                .spawn(move || {
                    if !ticket.wait() {
                        return;
                    }
                    let outcome = agent.run(&agent_label, deadline, &limiter, &metrics);
                    let _ = tx.send((agent.id(), outcome));
                })
                .with_context(|| format!("Failed to spawn agent #{} for phase '{}'", id, label))?;
            handles.push(handle);
        }
        // Only agents hold senders now; disconnect means all of them exited
        drop(tx);

        gate.open(agent_count);
        state = self.transition(label, state, PhaseState::Running);

        let mut collector = OutcomeCollector::new(agent_count);
        let interval = report_interval(duration);
        while !collector.all_done() && Instant::now() < deadline {
            let wake = (Instant::now() + interval).min(deadline);
            collector.collect_until(&rx, wake);
            println!(
                " {}: {:.2} secs -> {}{}",
                label,
                started.elapsed().as_secs_f64(),
                metrics.summary_text(),
                metrics.throughput_text()
            );
        }

        state = self.transition(label, state, PhaseState::Draining);
        collector.collect_until(&rx, deadline + GRACE_PERIOD);
        collector.collect_ready(&rx);

        let mut stragglers = Vec::new();
        for (id, handle) in handles.into_iter().enumerate() {
            if collector.has_reported(id) {
                let _ = handle.join();
            } else if handle.is_finished() {
                if handle.join().is_err() {
                    eprintln!("ERROR: [Agent #{}] panicked during phase '{}'", id, label);
                }
            } else {
                // It stops on its own once its current call returns
                stragglers.push(handle);
            }
        }
        let straggler_count = stragglers.len();
        if straggler_count > 0 {
            eprintln!(
                "WARN: {} agent(s) still running {} after the end of phase '{}'; \
                 reporting collected metrics",
                straggler_count,
                format_duration(GRACE_PERIOD),
                label
            );
            lock_handles(&self.detached).extend(stragglers);
        }

        let elapsed = started.elapsed();
        let final_metrics = metrics.snapshot_over(elapsed);
        state = self.transition(label, state, PhaseState::Complete);
        println!(
            "\nCompleted phase ('{}') in {:.2} seconds: {}",
            label,
            elapsed.as_secs_f64(),
            metrics.summary_text()
        );

        let (agents, failure) = collector.finish();
        if let Some(err) = failure {
            return Err(err.context(format!("Phase '{}' aborted", label)));
        }

        Ok(PhaseReport {
            label: label.to_string(),
            state,
            target_rate,
            agent_count,
            metrics: final_metrics,
            elapsed,
            stragglers: straggler_count,
            agents,
        })
    }

    /// Wait for agents left running by earlier phases
    fn join_detached(&self, label: &str) {
        let handles: Vec<_> = lock_handles(&self.detached).drain(..).collect();
        if handles.is_empty() {
            return;
        }
        println!(
            "Waiting for {} agent(s) from the previous phase before '{}'",
            handles.len(),
            label
        );
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn transition(&self, label: &str, from: PhaseState, to: PhaseState) -> PhaseState {
        if self.debug {
            println!("DEBUG: phase '{}' {} -> {}", label, from, to);
        }
        to
    }
}

fn lock_handles(handles: &Mutex<Vec<JoinHandle<()>>>) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
    handles.lock().unwrap_or_else(|e| e.into_inner())
}

/// Holds spawned agents until every one of them is ready
///
/// [`open`](StartGate::open) releases them together. Dropping the gate
/// without opening it releases them too, but their tickets report that the
/// phase never started.
struct StartGate {
    ready_tx: Sender<()>,
    ready_rx: Receiver<()>,
    open_tx: Sender<()>,
    open_rx: Receiver<()>,
    opened: Arc<AtomicBool>,
}

struct GateTicket {
    ready_tx: Sender<()>,
    open_rx: Receiver<()>,
    opened: Arc<AtomicBool>,
}

impl StartGate {
    fn new() -> Self {
        let (ready_tx, ready_rx) = channel::unbounded();
        let (open_tx, open_rx) = channel::bounded(0);
        Self {
            ready_tx,
            ready_rx,
            open_tx,
            open_rx,
            opened: Arc::new(AtomicBool::new(false)),
        }
    }

    fn ticket(&self) -> GateTicket {
        GateTicket {
            ready_tx: self.ready_tx.clone(),
            open_rx: self.open_rx.clone(),
            opened: Arc::clone(&self.opened),
        }
    }

    /// Wait for `parties` tickets to arrive, then release them all
    fn open(self, parties: usize) {
        for _ in 0..parties {
            if self.ready_rx.recv().is_err() {
                break;
            }
        }
        self.opened.store(true, Ordering::Release);
        // Disconnecting the channel wakes every waiting ticket
        drop(self.open_tx);
    }
}

impl GateTicket {
    /// Block until the gate opens or is dropped; `true` means start
    fn wait(self) -> bool {
        let _ = self.ready_tx.send(());
        let _ = self.open_rx.recv();
        self.opened.load(Ordering::Acquire)
    }
}

/// Gathers agent results as they arrive on the channel
struct OutcomeCollector {
    reported: Vec<bool>,
    remaining: usize,
    disconnected: bool,
    reports: Vec<AgentReport>,
    failure: Option<anyhow::Error>,
}

impl OutcomeCollector {
    fn new(agent_count: usize) -> Self {
        Self {
            reported: vec![false; agent_count],
            remaining: agent_count,
            disconnected: false,
            reports: Vec::with_capacity(agent_count),
            failure: None,
        }
    }

    fn all_done(&self) -> bool {
        self.remaining == 0 || self.disconnected
    }

    fn has_reported(&self, id: usize) -> bool {
        self.reported.get(id).copied().unwrap_or(false)
    }

    /// Receive outcomes until `until`, or until nothing more can arrive
    fn collect_until(&mut self, rx: &Receiver<AgentOutcome>, until: Instant) {
        while !self.all_done() {
            match rx.recv_deadline(until) {
                Ok((id, outcome)) => self.record(id, outcome),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => self.disconnected = true,
            }
        }
    }

    /// Take whatever already arrived without waiting
    fn collect_ready(&mut self, rx: &Receiver<AgentOutcome>) {
        while let Ok((id, outcome)) = rx.try_recv() {
            self.record(id, outcome);
        }
    }

    fn record(&mut self, id: usize, outcome: Result<AgentReport>) {
        if let Some(flag) = self.reported.get_mut(id) {
            *flag = true;
        }
        self.remaining = self.remaining.saturating_sub(1);
        match outcome {
            Ok(report) => self.reports.push(report),
            Err(err) => {
                eprintln!("ERROR: {:#}", err);
                self.failure.get_or_insert(err);
            }
        }
    }

    fn finish(mut self) -> (Vec<AgentReport>, Option<anyhow::Error>) {
        self.reports.sort_by_key(|r| r.agent_id);
        (self.reports, self.failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::mock::{ContainerCall, MockContainer};
    use crate::item::id::ItemIdGenerator;

    fn runner(mock: &MockContainer, batch_size: usize) -> PhaseRunner {
        let generator = Arc::new(ItemGenerator::new(ItemIdGenerator::increasing(0), 0));
        PhaseRunner::new(Arc::new(mock.clone()), generator, batch_size)
            .with_settle_delay(Duration::ZERO)
    }

    #[test]
    fn test_phase_end_to_end() {
        let mock = MockContainer::new();
        let report = runner(&mock, 10)
            .run_phase("Main Test", Duration::from_secs(2), 100, 4)
            .unwrap();

        assert_eq!(report.state, PhaseState::Complete);
        assert_eq!(report.stragglers, 0);
        assert_eq!(report.agents.len(), 4);
        assert!(report.elapsed >= Duration::from_secs(2));
        assert!(report.elapsed < Duration::from_millis(3200));

        let snap = report.snapshot();
        assert_eq!(snap.failed_calls, 0);
        assert!(snap.ok_calls > 0);
        // rate * seconds * (1 + burst fraction)
        assert!(snap.total_calls() <= 220, "calls: {}", snap.total_calls());
        assert!(snap.total_calls() >= 150, "calls: {}", snap.total_calls());
        assert_eq!(mock.stored_count() as u64, snap.ok_calls * 10);

        let per_agent: u64 = report.agents.iter().map(|a| a.ok_batches).sum();
        assert_eq!(per_agent, snap.ok_calls);
    }

    #[test]
    fn test_reset_happens_before_any_insert() {
        let mock = MockContainer::new();
        runner(&mock, 5)
            .run_phase("reset", Duration::from_millis(300), 50, 2)
            .unwrap();

        let calls = mock.calls();
        assert_eq!(calls[0], ContainerCall::DeleteAll);
        assert_eq!(calls.iter().filter(|c| **c == ContainerCall::DeleteAll).count(), 1);
        assert!(calls[1..].iter().all(|c| c.is_insert()));
    }

    #[test]
    fn test_phases_share_generator() {
        let mock = MockContainer::new();
        let runner = runner(&mock, 2);
        runner
            .run_phase("first", Duration::from_millis(300), 20, 2)
            .unwrap();
        // Ids of the second phase must continue where the first stopped
        let last_cycle = runner.generator.ids().current_cycle();
        assert!(last_cycle > 0);
        runner
            .run_phase("second", Duration::from_millis(300), 20, 2)
            .unwrap();
        assert!(runner.generator.ids().current_cycle() > last_cycle);
    }

    #[test]
    fn test_failing_backend_completes() {
        let mock = MockContainer::new();
        mock.set_should_fail(true);
        let report = runner(&mock, 5)
            .run_phase("failing", Duration::from_millis(500), 100, 3)
            .unwrap();

        let snap = report.snapshot();
        assert_eq!(snap.ok_calls, 0);
        assert!(snap.failed_calls > 0);
        assert_eq!(report.state, PhaseState::Complete);
        assert_eq!(mock.stored_count(), 0);
    }

    #[test]
    fn test_batch_of_one_uses_single_insert() {
        let mock = MockContainer::new();
        runner(&mock, 1)
            .run_phase("single", Duration::from_millis(300), 50, 2)
            .unwrap();

        let inserts: Vec<_> = mock.calls().into_iter().filter(|c| c.is_insert()).collect();
        assert!(!inserts.is_empty());
        assert!(inserts.iter().all(|c| matches!(c, ContainerCall::InsertOne(_))));
    }

    #[test]
    fn test_duplicate_id_fails_phase() {
        let mock = MockContainer::new();
        mock.set_report_duplicates(true);
        let err = runner(&mock, 3)
            .run_phase("dup", Duration::from_millis(300), 50, 2)
            .unwrap_err();
        assert!(err.to_string().contains("Phase 'dup' aborted"));
        assert!(format!("{:#}", err).contains("duplicate key"));
    }

    #[test]
    fn test_stragglers_are_detached() {
        let mock = MockContainer::new();
        mock.set_write_latency(Duration::from_secs(3));
        let start = Instant::now();
        let report = runner(&mock, 1)
            .run_phase("slow", Duration::from_millis(200), 10, 2)
            .unwrap();

        // Deadline plus grace, not the 3 s write latency
        assert!(start.elapsed() < Duration::from_millis(2500));
        assert_eq!(report.state, PhaseState::Complete);
        assert_eq!(report.stragglers, 2);
        assert!(report.agents.is_empty());
    }

    #[test]
    fn test_finished_phase_figures_are_frozen() {
        let mock = MockContainer::new();
        let runner = runner(&mock, 2);
        let warm = runner
            .run_phase("warm", Duration::from_millis(500), 100, 2)
            .unwrap();
        let at_completion = warm.snapshot();
        assert!(at_completion.ok_calls > 0);
        assert_eq!(at_completion.elapsed_secs, warm.elapsed.as_secs_f64());
        let expected = at_completion.total_calls() as f64 / warm.elapsed.as_secs_f64();
        assert!((at_completion.ops_per_sec - expected).abs() < 1e-6);

        runner
            .run_phase("main", Duration::from_millis(800), 100, 2)
            .unwrap();
        assert_eq!(warm.snapshot(), at_completion);
    }

    #[test]
    fn test_stragglers_joined_before_next_reset() {
        let mock = MockContainer::new();
        mock.set_write_latency(Duration::from_millis(1500));
        let runner = runner(&mock, 1);
        let slow = runner
            .run_phase("slow", Duration::from_millis(100), 10, 1)
            .unwrap();
        assert_eq!(slow.stragglers, 1);

        mock.set_write_latency(Duration::ZERO);
        let next = runner
            .run_phase("next", Duration::from_millis(300), 20, 1)
            .unwrap();
        // The straggler's late insert landed before the reset, not after it
        assert_eq!(next.stragglers, 0);
        assert_eq!(mock.stored_count() as u64, next.snapshot().ok_calls);
    }

    #[test]
    fn test_gate_releases_waiting_agents_when_dropped() {
        let gate = StartGate::new();
        let waiting: Vec<_> = (0..3)
            .map(|_| {
                let ticket = gate.ticket();
                thread::spawn(move || ticket.wait())
            })
            .collect();
        // Spawning stopped short of the planned agent count
        drop(gate);
        for handle in waiting {
            assert!(!handle.join().unwrap());
        }
    }

    #[test]
    fn test_gate_open_starts_every_agent() {
        let gate = StartGate::new();
        let waiting: Vec<_> = (0..3)
            .map(|_| {
                let ticket = gate.ticket();
                thread::spawn(move || ticket.wait())
            })
            .collect();
        gate.open(3);
        for handle in waiting {
            assert!(handle.join().unwrap());
        }
    }

    #[test]
    fn test_zero_agents_rejected() {
        let mock = MockContainer::new();
        assert!(runner(&mock, 1)
            .run_phase("empty", Duration::from_secs(1), 10, 0)
            .is_err());
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PhaseState::Draining.to_string(), "DRAINING");
        assert_eq!(PhaseState::Complete.to_string(), "COMPLETE");
    }
}
