//! Session manager behaviour against the reference engine, with faults
//! injected through a wrapping engine.

use oilstab_config::AppConfig;
use oilstab_core::{
    ConvergenceStatus, EngineError, EngineFactory, ProcessEngine, SessionError, SimulationError,
    SimulationRequest, StreamSnapshot, TimeoutPhase, UnitOperation,
};
use oilstab_engine::ReferenceEngine;
use oilstab_process::{ValidatedRequest, validate};
use oilstab_session::{SessionManager, SessionState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Log = Arc<Mutex<Vec<String>>>;

#[derive(Clone, Default)]
struct Faults {
    pass_delay: Duration,
    /// Reject this unit the given number of times.
    reject_unit: Option<(&'static str, usize)>,
    panic_on_pass: bool,
}

struct FaultyEngine {
    inner: ReferenceEngine,
    faults: Faults,
    log: Log,
}

impl FaultyEngine {
    fn record(&self, op: &str) {
        self.log.lock().unwrap().push(op.to_string());
    }
}

impl ProcessEngine for FaultyEngine {
    fn clear(&mut self) {
        self.record("clear");
        self.inner.clear();
    }
    fn is_clear(&self) -> bool {
        self.inner.is_clear()
    }
    fn add_unit(&mut self, unit: &UnitOperation) -> Result<(), EngineError> {
        self.record("add");
        if let Some((name, remaining)) = &mut self.faults.reject_unit {
            if *name == unit.name() && *remaining > 0 {
                *remaining -= 1;
                return Err(EngineError::InvalidSpecification {
                    unit: unit.name().to_string(),
                    reason: "rejected by test".into(),
                });
            }
        }
        self.inner.add_unit(unit)
    }
    fn run_pass(&mut self) -> Result<(), EngineError> {
        self.record("pass");
        if self.faults.panic_on_pass {
            panic!("engine crashed");
        }
        std::thread::sleep(self.faults.pass_delay);
        self.inner.run_pass()
    }
    fn stream(&self, name: &str) -> Result<StreamSnapshot, EngineError> {
        self.inner.stream(name)
    }
    fn set_stream_flows(&mut self, name: &str, flows: &[f64]) -> Result<(), EngineError> {
        self.inner.set_stream_flows(name, flows)
    }
    fn compressor_power_kw(&self, unit: &str) -> Result<f64, EngineError> {
        self.inner.compressor_power_kw(unit)
    }
    fn true_vapor_pressure_bara(&self, stream: &str, t: f64) -> Result<f64, EngineError> {
        self.inner.true_vapor_pressure_bara(stream, t)
    }
    fn cricondenbar_bara(&self, stream: &str) -> Result<f64, EngineError> {
        self.inner.cricondenbar_bara(stream)
    }
}

/// Factory whose n-th instance gets `faults(n)`. Instance 0 seeds the manager.
fn faulty_factory(
    faults: impl Fn(usize) -> Faults + Send + Sync + 'static,
) -> (Arc<dyn EngineFactory>, Log) {
    let log: Log = Arc::default();
    let created = AtomicUsize::new(0);
    let shared = log.clone();
    let factory: Arc<dyn EngineFactory> =
        Arc::new(move || -> Result<Box<dyn ProcessEngine>, EngineError> {
            let n = created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FaultyEngine {
                inner: ReferenceEngine::new(),
                faults: faults(n),
                log: shared.clone(),
            }))
        });
    (factory, log)
}

fn reference_manager(config: AppConfig) -> SessionManager {
    SessionManager::new(Arc::new(oilstab_engine::create_engine), config)
}

fn nominal() -> ValidatedRequest {
    validate(SimulationRequest::nominal()).unwrap()
}

/// Published states of a cycle that failed while solving.
const FAILED_WHILE_SOLVING: [SessionState; 7] = [
    SessionState::Idle,
    SessionState::Clearing,
    SessionState::Building,
    SessionState::Solving,
    SessionState::Error,
    SessionState::Clearing,
    SessionState::Idle,
];

fn assert_legal_path(history: &[SessionState]) {
    for step in history.windows(2) {
        assert!(
            step[0].can_transition_to(step[1]),
            "illegal step {} -> {} in {history:?}",
            step[0],
            step[1]
        );
    }
}

fn slow(pass_delay_ms: u64) -> Faults {
    Faults {
        pass_delay: Duration::from_millis(pass_delay_ms),
        ..Faults::default()
    }
}

#[tokio::test]
async fn nominal_request_succeeds_and_leaves_session_clear() {
    let manager = reference_manager(AppConfig::default());
    assert_eq!(manager.state(), SessionState::Idle);
    assert_eq!(manager.engine_is_clear().await, Some(true));

    let result = manager.simulate(nominal()).await.unwrap();
    assert_eq!(result.convergence_status, ConvergenceStatus::Success);
    assert!(result.stable_oil_flow_rate > 0.0);
    assert_eq!(result.compressor_power_kw.len(), 4);

    assert_eq!(manager.state(), SessionState::Idle);
    assert_eq!(manager.engine_is_clear().await, Some(true));
    let liveness = manager.liveness();
    assert!(liveness.ready);
    assert_eq!(liveness.completed, 1);
}

#[tokio::test]
async fn engine_is_cleared_before_build_and_after_teardown() {
    let (factory, log) = faulty_factory(|_| Faults::default());
    let manager = SessionManager::new(factory, AppConfig::default());
    log.lock().unwrap().clear();

    manager.simulate(nominal()).await.unwrap();

    let ops = log.lock().unwrap().clone();
    let first_add = ops.iter().position(|op| op == "add").unwrap();
    assert!(ops[..first_add].iter().any(|op| op == "clear"));
    assert_eq!(ops.last().map(String::as_str), Some("clear"));
}

#[tokio::test]
async fn build_error_clears_session_and_next_request_succeeds() {
    let (factory, log) = faulty_factory(|n| Faults {
        reject_unit: (n == 0).then_some(("rich gas mixer", 1)),
        ..Faults::default()
    });
    let manager = SessionManager::new(factory, AppConfig::default());

    let err = manager.simulate(nominal()).await.unwrap_err();
    assert_eq!(err.status(), ConvergenceStatus::BuildError);
    assert!(err.to_string().contains("rich gas mixer"));
    assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("clear"));
    assert_eq!(manager.state(), SessionState::Idle);
    assert_eq!(manager.engine_is_clear().await, Some(true));
    assert_eq!(
        manager.state_history(),
        [
            SessionState::Idle,
            SessionState::Clearing,
            SessionState::Building,
            SessionState::Error,
            SessionState::Clearing,
            SessionState::Idle,
        ]
    );

    manager.simulate(nominal()).await.unwrap();
}

#[tokio::test]
async fn iteration_cap_is_non_convergent_and_recoverable() {
    let mut config = AppConfig::default();
    config.solver.max_recycle_iterations = 1;
    let manager = reference_manager(config);

    let err = manager.simulate(nominal()).await.unwrap_err();
    assert_eq!(err.status(), ConvergenceStatus::NonConvergent);
    assert_eq!(manager.engine_is_clear().await, Some(true));

    // Without reflux the loop carries nothing and converges on the first pass.
    let mut request = SimulationRequest::nominal();
    request.reflux_ratio = 0.0;
    let result = manager.simulate(validate(request).unwrap()).await.unwrap();
    assert_eq!(result.recycle_iterations, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn full_queue_rejects_immediately_with_retry_hint() {
    let (factory, _) = faulty_factory(|_| slow(150));
    let mut config = AppConfig::default();
    config.session.max_queue_depth = 1;
    let manager = Arc::new(SessionManager::new(factory, config));

    let running = tokio::spawn({
        let m = manager.clone();
        async move { m.simulate(nominal()).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    let queued = tokio::spawn({
        let m = manager.clone();
        async move { m.simulate(nominal()).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.queue_depth(), 1);

    let started = std::time::Instant::now();
    let err = manager.simulate(nominal()).await.unwrap_err();
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(err.status(), ConvergenceStatus::Busy);
    assert_eq!(err.retry_after(), Some(Duration::from_millis(2000)));

    running.await.unwrap().unwrap();
    queued.await.unwrap().unwrap();
    assert_eq!(manager.liveness().rejected, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn acquisition_times_out_behind_a_long_solve() {
    let (factory, _) = faulty_factory(|_| slow(150));
    let mut config = AppConfig::default();
    config.session.acquire_timeout_ms = 100;
    let manager = Arc::new(SessionManager::new(factory, config));

    let running = tokio::spawn({
        let m = manager.clone();
        async move { m.simulate(nominal()).await }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;

    let err = manager.simulate(nominal()).await.unwrap_err();
    assert_eq!(err.status(), ConvergenceStatus::Timeout);
    assert!(matches!(
        err,
        SimulationError::Session(SessionError::Timeout {
            phase: TimeoutPhase::Acquire,
            ..
        })
    ));
    running.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn solve_timeout_abandons_worker_and_reseeds_engine() {
    let (factory, _) = faulty_factory(|n| if n == 0 { slow(1_000) } else { Faults::default() });
    let mut config = AppConfig::default();
    config.session.solve_timeout_ms = 200;
    let manager = SessionManager::new(factory, config);
    let mut states = manager.subscribe();

    let err = manager.simulate(nominal()).await.unwrap_err();
    assert!(matches!(
        err,
        SimulationError::Session(SessionError::Timeout {
            phase: TimeoutPhase::Solve,
            after_ms: 200
        })
    ));
    assert_eq!(err.status(), ConvergenceStatus::Timeout);
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), SessionState::Idle);
    assert_eq!(manager.state_history(), FAILED_WHILE_SOLVING);

    let liveness = manager.liveness();
    assert_eq!(liveness.engine_generation, 2);
    assert_eq!(liveness.abandoned_workers, 1);
    assert!(liveness.ready);

    let result = manager.simulate(nominal()).await.unwrap();
    assert!(result.stable_oil_flow_rate > 0.0);
    assert_eq!(manager.state(), SessionState::Idle);
    assert!(manager.timeline().overlapping().is_empty());

    // The abandoned worker finishes its pass later and must stay silent.
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert_eq!(manager.state(), SessionState::Idle);
    assert_legal_path(&manager.state_history());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_panic_is_reported_and_engine_replaced() {
    let (factory, _) = faulty_factory(|n| Faults {
        panic_on_pass: n == 0,
        ..Faults::default()
    });
    let manager = SessionManager::new(factory, AppConfig::default());

    let err = manager.simulate(nominal()).await.unwrap_err();
    assert!(matches!(
        err,
        SimulationError::Session(SessionError::WorkerFailed(_))
    ));
    assert_eq!(err.status(), ConvergenceStatus::NonConvergent);
    assert_eq!(manager.liveness().engine_generation, 2);
    assert_eq!(manager.state_history(), FAILED_WHILE_SOLVING);

    manager.simulate(nominal()).await.unwrap();
    assert_eq!(manager.engine_is_clear().await, Some(true));
    assert_legal_path(&manager.state_history());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dropped_caller_stops_its_worker() {
    let (factory, log) = faulty_factory(|n| if n == 0 { slow(300) } else { Faults::default() });
    let manager = Arc::new(SessionManager::new(factory, AppConfig::default()));

    let task = tokio::spawn({
        let m = manager.clone();
        async move { m.simulate(nominal()).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert_eq!(manager.state(), SessionState::Idle);
    assert_eq!(manager.state_history(), FAILED_WHILE_SOLVING);

    // Uncancelled, the nominal case would run three passes in this window.
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    let passes = log.lock().unwrap().iter().filter(|op| *op == "pass").count();
    assert_eq!(passes, 1);

    manager.simulate(nominal()).await.unwrap();
    assert_eq!(manager.state(), SessionState::Idle);
    assert_legal_path(&manager.state_history());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_are_serialized() {
    let (factory, _) = faulty_factory(|_| slow(10));
    let manager = Arc::new(SessionManager::new(factory, AppConfig::default()));

    let handles: Vec<_> = [5.0, 6.0, 7.0, 8.0]
        .into_iter()
        .map(|flow| {
            let m = manager.clone();
            tokio::spawn(async move {
                let mut request = SimulationRequest::nominal();
                request.well_flow_rate = flow;
                m.simulate(validate(request).unwrap()).await
            })
        })
        .collect();

    let mut oil_flows = Vec::new();
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        oil_flows.push(result.stable_oil_flow_rate);
    }
    // Oil flow scales with well flow, so every caller got its own answer.
    assert!(oil_flows.windows(2).all(|w| w[1] > w[0]), "{oil_flows:?}");

    let timeline = manager.timeline();
    assert_eq!(timeline.len(), 4);
    assert!(timeline.overlapping().is_empty());
    assert!(
        timeline
            .records()
            .iter()
            .all(|r| r.status == Some(ConvergenceStatus::Success))
    );
    assert_eq!(manager.queue_depth(), 0);
    assert_eq!(manager.state(), SessionState::Idle);
    assert_legal_path(&manager.state_history());
}

#[tokio::test]
async fn identical_requests_give_identical_results() {
    let manager = reference_manager(AppConfig::default());
    let first = manager.simulate(nominal()).await.unwrap();
    let second = manager.simulate(nominal()).await.unwrap();
    assert_eq!(first, second);
}
