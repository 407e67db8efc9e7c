//! Engine session manager — serialized ownership of the engine context.
//!
//! One engine instance lives in a slot behind a fair `tokio::sync::Mutex`.
//! A caller that gets the slot takes the engine out, runs the whole
//! clear → build → solve → extract cycle on a blocking worker, and puts
//! the (cleared) engine back. Callers queue in arrival order.
//!
//! A worker that exceeds the solve timeout is abandoned: it is told to stop
//! through a cancel flag, keeps its engine instance until it returns, and
//! the slot is re-seeded with a fresh instance from the factory. Each
//! instance carries a generation number; only the current generation may
//! publish session state.

use crate::state::{SessionState, StateCell};
use crate::timeline::SolveTimeline;
use oilstab_config::AppConfig;
use oilstab_core::{
    ConvergenceStatus, EngineFactory, ProcessEngine, Result, SessionError, SimulationResult,
    TimeoutPhase,
};
use oilstab_process::{ProcessTopology, RecycleSolver, ValidatedRequest, extract};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct EngineSlot {
    engine: Option<Box<dyn ProcessEngine>>,
    generation: u64,
}

/// Publishes state on behalf of one engine generation.
#[derive(Clone)]
struct StateReporter {
    cell: Arc<StateCell>,
    live_generation: Arc<StdMutex<u64>>,
    generation: u64,
}

impl StateReporter {
    fn set(&self, state: SessionState) {
        let live = lock(&self.live_generation);
        if *live == self.generation {
            self.cell.advance(state);
        }
    }
}

/// Clears the engine when the cycle ends, however it ends.
struct ClearOnDrop<'a> {
    engine: &'a mut dyn ProcessEngine,
    reporter: &'a StateReporter,
}

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.reporter.set(SessionState::Error);
        }
        self.reporter.set(SessionState::Clearing);
        self.engine.clear();
    }
}

fn run_cycle(
    engine: &mut dyn ProcessEngine,
    request: &ValidatedRequest,
    config: &AppConfig,
    cancel: &AtomicBool,
    reporter: &StateReporter,
) -> Result<SimulationResult> {
    reporter.set(SessionState::Clearing);
    engine.clear();

    reporter.set(SessionState::Building);
    let topology =
        ProcessTopology::oil_stabilization(request, config.engine.isentropic_efficiency);
    let edge = topology.bind(engine)?;

    reporter.set(SessionState::Solving);
    let report = RecycleSolver::new(&config.solver).solve(engine, &edge, cancel)?;

    reporter.set(SessionState::Extracting);
    let result = extract(
        engine,
        config.engine.tvp_reference_temperature_c,
        report.iterations,
    )?;
    Ok(result)
}

/// Everything a blocking worker needs, moved onto its thread.
struct Worker {
    request_id: Uuid,
    generation: u64,
    request: ValidatedRequest,
    config: AppConfig,
    cancel: Arc<AtomicBool>,
    reporter: StateReporter,
    timeline: Arc<SolveTimeline>,
}

impl Worker {
    fn run(
        self,
        mut engine: Box<dyn ProcessEngine>,
    ) -> (Box<dyn ProcessEngine>, Result<SimulationResult>) {
        self.timeline.start(self.request_id, self.generation);
        let outcome = {
            let mut guard = ClearOnDrop {
                engine: engine.as_mut(),
                reporter: &self.reporter,
            };
            let outcome = run_cycle(
                &mut *guard.engine,
                &self.request,
                &self.config,
                &self.cancel,
                &self.reporter,
            );
            if outcome.is_err() {
                self.reporter.set(SessionState::Error);
            }
            outcome
        };
        let status = match &outcome {
            Ok(result) => result.convergence_status,
            Err(e) => e.status(),
        };
        self.timeline.finish(self.request_id, status);
        (engine, outcome)
    }
}

/// Leaves the queue when dropped.
struct QueueTicket<'a> {
    waiting: &'a AtomicUsize,
    depth: usize,
}

impl<'a> QueueTicket<'a> {
    fn join(waiting: &'a AtomicUsize) -> Self {
        let depth = waiting.fetch_add(1, Ordering::AcqRel) + 1;
        Self { waiting, depth }
    }
}

impl Drop for QueueTicket<'_> {
    fn drop(&mut self) {
        self.waiting.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Marks a cycle in flight; resets bookkeeping when the owning call ends.
struct InFlight<'a> {
    manager: &'a SessionManager,
    cancel: Arc<AtomicBool>,
    finished: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *lock(&self.manager.cycle_started) = None;
        if !self.finished {
            // The caller went away mid-cycle; stop its worker and keep it silent.
            self.cancel.store(true, Ordering::Release);
            self.manager.retire_generation();
            self.manager.recover_state();
        }
        self.manager.state.advance(SessionState::Idle);
    }
}

#[derive(Debug, Default)]
struct SessionStats {
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    timed_out: AtomicU64,
    abandoned_workers: AtomicU64,
}

/// Health snapshot for probes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Liveness {
    pub ready: bool,
    pub state: SessionState,
    /// Callers waiting for the session, not counting the one running.
    pub queue_depth: usize,
    pub engine_generation: u64,
    pub engine_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_elapsed_ms: Option<u64>,
    pub completed: u64,
    pub failed: u64,
    pub rejected: u64,
    pub timed_out: u64,
    pub abandoned_workers: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Owner of the shared engine context.
pub struct SessionManager {
    slot: Arc<Mutex<EngineSlot>>,
    factory: Arc<dyn EngineFactory>,
    config: AppConfig,
    waiting: AtomicUsize,
    state: Arc<StateCell>,
    live_generation: Arc<StdMutex<u64>>,
    engine_available: AtomicBool,
    cycle_started: StdMutex<Option<Instant>>,
    timeline: Arc<SolveTimeline>,
    stats: SessionStats,
}

impl SessionManager {
    /// Seed the slot from `factory`. A failing factory leaves the manager
    /// not ready; every later call retries the factory.
    pub fn new(factory: Arc<dyn EngineFactory>, config: AppConfig) -> Self {
        let engine = Self::seed(factory.as_ref());
        let engine_available = AtomicBool::new(engine.is_some());
        info!(
            max_queue_depth = config.session.max_queue_depth,
            solve_timeout_ms = config.session.solve_timeout_ms,
            engine_available = engine.is_some(),
            "Session manager started"
        );
        Self {
            slot: Arc::new(Mutex::new(EngineSlot {
                engine,
                generation: 1,
            })),
            factory,
            config,
            waiting: AtomicUsize::new(0),
            state: Arc::new(StateCell::default()),
            live_generation: Arc::new(StdMutex::new(1)),
            engine_available,
            cycle_started: StdMutex::new(None),
            timeline: Arc::new(SolveTimeline::default()),
            stats: SessionStats::default(),
        }
    }

    fn seed(factory: &dyn EngineFactory) -> Option<Box<dyn ProcessEngine>> {
        match factory.create() {
            Ok(mut engine) => {
                engine.clear();
                Some(engine)
            }
            Err(e) => {
                warn!(error = %e, "Engine factory failed");
                None
            }
        }
    }

    /// Silence every worker of the current generation.
    fn retire_generation(&self) -> u64 {
        let mut live = lock(&self.live_generation);
        *live += 1;
        *live
    }

    fn reseed(&self, slot: &mut EngineSlot) {
        slot.generation = self.retire_generation();
        slot.engine = Self::seed(self.factory.as_ref());
        self.engine_available
            .store(slot.engine.is_some(), Ordering::Release);
        info!(
            generation = slot.generation,
            available = slot.engine.is_some(),
            "Engine slot re-seeded"
        );
    }

    /// Walk the published state through `Error` and `Clearing` after a
    /// cycle was taken away from its worker. Call only after retiring the
    /// worker's generation.
    fn recover_state(&self) {
        if self.state.get().can_transition_to(SessionState::Error) {
            self.state.advance(SessionState::Error);
        }
        self.state.advance(SessionState::Clearing);
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Recently published states, oldest first.
    pub fn state_history(&self) -> Vec<SessionState> {
        self.state.history()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn timeline(&self) -> &SolveTimeline {
        &self.timeline
    }

    pub fn queue_depth(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    /// Wait for the session and report whether the engine holds no units.
    /// `None` when the slot is empty.
    pub async fn engine_is_clear(&self) -> Option<bool> {
        let slot = self.slot.lock().await;
        slot.engine.as_ref().map(|engine| engine.is_clear())
    }

    async fn acquire(&self, request_id: Uuid) -> Result<OwnedMutexGuard<EngineSlot>> {
        if let Ok(slot) = self.slot.clone().try_lock_owned() {
            return Ok(slot);
        }

        let ticket = QueueTicket::join(&self.waiting);
        let limit = self.config.session.max_queue_depth;
        if ticket.depth > limit {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            let retry_after_ms = self.config.session.retry_after_ms;
            warn!(%request_id, waiting = ticket.depth - 1, limit, "Session busy, rejecting");
            return Err(SessionError::Busy {
                depth: ticket.depth - 1,
                limit,
                retry_after_ms,
            }
            .into());
        }

        debug!(%request_id, position = ticket.depth, "Waiting for session");
        let acquire_timeout = self.config.session.acquire_timeout();
        match tokio::time::timeout(acquire_timeout, self.slot.clone().lock_owned()).await {
            Ok(slot) => Ok(slot),
            Err(_) => {
                self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                warn!(%request_id, timeout_ms = self.config.session.acquire_timeout_ms, "Session acquisition timed out");
                Err(SessionError::Timeout {
                    phase: TimeoutPhase::Acquire,
                    after_ms: self.config.session.acquire_timeout_ms,
                }
                .into())
            }
        }
    }

    /// Run one build-and-solve cycle for a validated request.
    pub async fn simulate(&self, request: ValidatedRequest) -> Result<SimulationResult> {
        let request_id = Uuid::new_v4();
        let mut slot = self.acquire(request_id).await?;

        let started = Instant::now();
        *lock(&self.cycle_started) = Some(started);
        let cancel = Arc::new(AtomicBool::new(false));
        let mut in_flight = InFlight {
            manager: self,
            cancel: cancel.clone(),
            finished: false,
        };
        let outcome = self
            .run_owned(&mut slot, request_id, request, cancel)
            .await;
        in_flight.finished = true;
        drop(in_flight);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(result) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                info!(
                    %request_id,
                    elapsed_ms,
                    iterations = result.recycle_iterations,
                    tvp_bara = result.tvp_bara,
                    "Simulation completed"
                );
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(%request_id, elapsed_ms, status = %e.status(), error = %e, "Simulation failed");
            }
        }
        outcome
    }

    async fn run_owned(
        &self,
        slot: &mut EngineSlot,
        request_id: Uuid,
        request: ValidatedRequest,
        cancel: Arc<AtomicBool>,
    ) -> Result<SimulationResult> {
        if slot.engine.is_none() {
            self.reseed(slot);
        }
        let Some(engine) = slot.engine.take() else {
            return Err(SessionError::Unavailable("engine factory could not create an engine".into()).into());
        };

        let worker = Worker {
            request_id,
            generation: slot.generation,
            request,
            config: self.config.clone(),
            cancel: cancel.clone(),
            reporter: StateReporter {
                cell: self.state.clone(),
                live_generation: self.live_generation.clone(),
                generation: slot.generation,
            },
            timeline: self.timeline.clone(),
        };

        debug!(%request_id, generation = slot.generation, "Cycle started");
        let mut handle = tokio::task::spawn_blocking(move || worker.run(engine));
        let solve_timeout = self.config.session.solve_timeout();

        match tokio::time::timeout(solve_timeout, &mut handle).await {
            Ok(Ok((engine, outcome))) => {
                slot.engine = Some(engine);
                outcome
            }
            Ok(Err(join_error)) => {
                warn!(%request_id, error = %join_error, "Simulation worker failed");
                self.timeline
                    .finish(request_id, ConvergenceStatus::NonConvergent);
                self.reseed(slot);
                self.recover_state();
                Err(SessionError::WorkerFailed(join_error.to_string()).into())
            }
            Err(_) => {
                cancel.store(true, Ordering::Release);
                self.stats.abandoned_workers.fetch_add(1, Ordering::Relaxed);
                self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                warn!(
                    %request_id,
                    timeout_ms = self.config.session.solve_timeout_ms,
                    "Solve timed out, abandoning worker"
                );
                self.reseed(slot);
                self.recover_state();
                Err(SessionError::Timeout {
                    phase: TimeoutPhase::Solve,
                    after_ms: self.config.session.solve_timeout_ms,
                }
                .into())
            }
        }
    }

    /// Readiness for probes. Never waits for the session.
    pub fn liveness(&self) -> Liveness {
        let started = *lock(&self.cycle_started);
        let elapsed = started.map(|t| t.elapsed());
        let wedged_after = self.config.session.solve_timeout() * 2;
        let engine_available = self.engine_available.load(Ordering::Acquire);

        let reason = if !engine_available {
            Some("engine factory failed; no engine instance available".to_string())
        } else {
            elapsed
                .filter(|e| *e > wedged_after)
                .map(|e| format!("cycle running for {}ms", e.as_millis()))
        };

        Liveness {
            ready: reason.is_none(),
            state: self.state(),
            queue_depth: self.queue_depth(),
            engine_generation: *lock(&self.live_generation),
            engine_available,
            cycle_elapsed_ms: elapsed.map(|e: Duration| e.as_millis() as u64),
            completed: self.stats.completed.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            rejected: self.stats.rejected.load(Ordering::Relaxed),
            timed_out: self.stats.timed_out.load(Ordering::Relaxed),
            abandoned_workers: self.stats.abandoned_workers.load(Ordering::Relaxed),
            reason,
        }
    }
}
