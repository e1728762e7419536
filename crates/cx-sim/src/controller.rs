//! Run controller: owns one simulation's lifecycle.
//!
//! ```text
//! Idle -> Running -> {Paused <-> Running} -> {Completed | Failed | Aborted}
//! ```
//!
//! Every operation takes `&self` and may be called from any thread. The step
//! loop runs on a dedicated worker thread; `pause`, `resume`, `abort`,
//! `reset_solver` and parameter changes while paused reach it as commands
//! that it handles between steps.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cx_compiler::{CompiledRoutineSet, RoutineCache};
use cx_core::Stopwatch;
use cx_model::EquationModel;
use cx_results::ResultsStore;
use cx_solver::{SolverError, SolverHandle};
use tracing::{info, warn};

use crate::config::RunConfiguration;
use crate::error::{SimError, SimResult};
use crate::recorder::Recorder;
use crate::shared::Shared;
use crate::status::{RunEvent, RunState, RunStatus};
use crate::worker::{Command, Worker};

/// How long a paused worker may take to answer a parameter change.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);
const JOIN_POLL: Duration = Duration::from_millis(100);

struct WorkerLink {
    commands: Sender<Command>,
    thread: JoinHandle<()>,
}

pub struct RunController {
    model: Arc<EquationModel>,
    routines: Arc<CompiledRoutineSet>,
    recorder: Recorder,
    store: Arc<ResultsStore>,
    /// Parameter values for the next run; mirrors the worker's copy while
    /// a run is active.
    parameters: Mutex<Vec<f64>>,
    shared: Arc<Shared>,
    worker: Mutex<Option<WorkerLink>>,
}

impl RunController {
    /// Controller for `model` using already compiled routines.
    pub fn new(model: Arc<EquationModel>, routines: Arc<CompiledRoutineSet>) -> SimResult<Self> {
        let recorder = Recorder::for_model(&model);
        let store = Arc::new(ResultsStore::new(recorder.columns().to_vec()));
        Self::with_store(model, routines, store)
    }

    /// Controller recording into an existing store, whose columns must
    /// match the model's visible variables.
    pub fn with_store(
        model: Arc<EquationModel>,
        routines: Arc<CompiledRoutineSet>,
        store: Arc<ResultsStore>,
    ) -> SimResult<Self> {
        if routines.fingerprint() != model.fingerprint() {
            return Err(SimError::invalid_config(
                "routines were compiled for a different model",
            ));
        }
        let recorder = Recorder::for_model(&model);
        if store.columns() != recorder.columns() {
            return Err(SimError::invalid_config(
                "results store columns do not match the model",
            ));
        }
        let parameters = Mutex::new(model.constants().to_vec());
        Ok(Self {
            model,
            routines,
            recorder,
            store,
            parameters,
            shared: Arc::new(Shared::default()),
            worker: Mutex::new(None),
        })
    }

    /// Controller using the process-wide routine cache.
    pub fn compile(model: Arc<EquationModel>) -> SimResult<Self> {
        let routines = RoutineCache::global().get_or_compile(&model)?;
        Self::new(model, routines)
    }

    pub fn model(&self) -> &Arc<EquationModel> {
        &self.model
    }

    pub fn routines(&self) -> &Arc<CompiledRoutineSet> {
        &self.routines
    }

    pub fn store(&self) -> &Arc<ResultsStore> {
        &self.store
    }

    pub fn status(&self) -> RunStatus {
        self.shared.lock().run.status
    }

    /// Fraction of the simulated interval covered, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        self.shared.lock().run.progress
    }

    pub fn run_state(&self) -> RunState {
        self.shared.lock().run.clone()
    }

    /// Cause of the last failed run.
    pub fn error(&self) -> Option<SolverError> {
        self.shared.lock().error.clone()
    }

    /// Wall-clock time spent computing, excluding pauses.
    pub fn elapsed(&self) -> Duration {
        self.shared.lock().elapsed
    }

    pub fn parameters(&self) -> Vec<f64> {
        self.parameters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Event stream for status changes, recorded points and progress.
    pub fn subscribe(&self) -> Receiver<RunEvent> {
        let (tx, rx) = mpsc::channel();
        self.shared.subscribe(tx);
        rx
    }

    fn worker_slot(&self) -> MutexGuard<'_, Option<WorkerLink>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, slot: &Option<WorkerLink>, cmd: Command) -> SimResult<()> {
        slot.as_ref()
            .ok_or(SimError::WorkerUnavailable)?
            .commands
            .send(cmd)
            .map_err(|_| SimError::WorkerUnavailable)
    }

    /// Join the worker thread. With `hang_up` the command channel is closed
    /// first, which makes a live worker stop as `Aborted`; without it the
    /// worker runs to its own end.
    fn reap(&self, slot: &mut Option<WorkerLink>, hang_up: bool) {
        let Some(WorkerLink { commands, thread }) = slot.take() else {
            return;
        };
        if hang_up {
            drop(commands);
        }
        let joined = thread.join();
        if joined.is_err() {
            let mut inner = self.shared.lock();
            warn!("Run worker panicked");
            if !inner.run.status.is_terminal() {
                inner.error = Some(SolverError::Numeric {
                    what: "run worker panicked".to_string(),
                });
                self.shared.transition(&mut inner, RunStatus::Failed);
            }
        }
    }

    /// Start a new run from the model's initial values.
    ///
    /// Allowed from `Idle` and from any terminal status; previous results
    /// are cleared. Consistent algebraic values are solved for before the
    /// run enters `Running`; if none exist the controller stays `Idle` and
    /// [`SimError::Initialization`] is returned.
    pub fn start(&self, config: RunConfiguration) -> SimResult<()> {
        config.validate()?;
        let mut slot = self.worker_slot();
        let status = self.status();
        if status.is_active() {
            return Err(SimError::InvalidTransition {
                operation: "start",
                status,
            });
        }
        self.reap(&mut slot, true);

        self.store.clear()?;
        let lease = self.store.lease()?;
        let parameters = self.parameters();

        let solver = SolverHandle::initialize(
            Arc::clone(&self.routines),
            parameters.clone(),
            config.start_time,
            self.model.initial_states(),
            self.model.initial_algebraic(),
            &config.solver_config(),
            self.model.is_stiff(),
        );
        let solver = match solver {
            Ok(solver) => solver,
            Err(e) => {
                warn!(model = self.model.name(), error = %e, "Run initialisation failed");
                let mut inner = self.shared.lock();
                inner.run = RunState::default();
                inner.run.status = status;
                self.shared.transition(&mut inner, RunStatus::Idle);
                return Err(match e {
                    SolverError::InvalidConfig { what } => SimError::InvalidConfiguration { what },
                    source => SimError::Initialization { source },
                });
            }
        };

        let point = solver.point().clone();

        {
            let mut inner = self.shared.lock();
            inner.run = RunState {
                status: inner.run.status,
                time: point.t,
                states: point.y.clone(),
                algebraic: point.z.clone(),
                step_count: 0,
                progress: 0.0,
            };
            inner.error = None;
            inner.elapsed = Duration::ZERO;
            self.shared.emit(RunEvent::Progress(0.0));
            self.shared.transition(&mut inner, RunStatus::Running);

            let values = self.recorder.values(&point.y, &point.z, &parameters);
            if lease.record(config.start_time, values) {
                self.shared.emit(RunEvent::PointRecorded {
                    index: 0,
                    time: config.start_time,
                });
            }
        }

        info!(
            model = self.model.name(),
            solver = ?config.solver,
            start = config.start_time,
            end = config.end_time,
            "Run started"
        );

        let (tx, rx) = mpsc::channel();
        let worker = Worker {
            config: config.clone(),
            solver,
            routines: Arc::clone(&self.routines),
            stiff: self.model.is_stiff(),
            parameters: parameters.clone(),
            recorder: self.recorder.clone(),
            lease: Some(lease),
            shared: Arc::clone(&self.shared),
            commands: rx,
            deferred: Vec::new(),
            next_sample: 1,
            prev: point.clone(),
            parameters_dirty: false,
            paused: false,
            step_count: 0,
            stopwatch: Stopwatch::new(),
        };

        let spawned = thread::Builder::new()
            .name(format!("cx-run-{}", self.model.name()))
            .spawn(move || worker.run());
        match spawned {
            Ok(thread) => {
                *slot = Some(WorkerLink {
                    commands: tx,
                    thread,
                });
                Ok(())
            }
            Err(e) => {
                let mut inner = self.shared.lock();
                self.shared.transition(&mut inner, RunStatus::Idle);
                Err(SimError::Spawn(e))
            }
        }
    }

    /// Ask the worker to pause at the next step boundary.
    pub fn pause(&self) -> SimResult<()> {
        let slot = self.worker_slot();
        let status = self.status();
        if status != RunStatus::Running {
            return Err(SimError::InvalidTransition {
                operation: "pause",
                status,
            });
        }
        self.send(&slot, Command::Pause)
    }

    /// Continue a paused run.
    pub fn resume(&self) -> SimResult<()> {
        let slot = self.worker_slot();
        let status = self.status();
        if status != RunStatus::Paused {
            return Err(SimError::InvalidTransition {
                operation: "resume",
                status,
            });
        }
        self.send(&slot, Command::Resume)
    }

    /// Abort a running or paused run.
    ///
    /// The status switches to `Aborted` at once and nothing more is
    /// recorded. Returns after the worker has released the store, which
    /// waits for a step in progress to finish.
    pub fn abort(&self) -> SimResult<()> {
        let mut slot = self.worker_slot();
        {
            let mut inner = self.shared.lock();
            let status = inner.run.status;
            if !status.is_active() {
                return Err(SimError::InvalidTransition {
                    operation: "abort",
                    status,
                });
            }
            self.shared.transition(&mut inner, RunStatus::Aborted);
        }
        let _ = self.send(&slot, Command::Abort);
        self.reap(&mut slot, true);
        info!(model = self.model.name(), "Run aborted");
        Ok(())
    }

    /// Rebuild the solver from the current state at the next step boundary.
    pub fn reset_solver(&self) -> SimResult<()> {
        let slot = self.worker_slot();
        let status = self.status();
        if !status.is_active() {
            return Err(SimError::InvalidTransition {
                operation: "reset the solver",
                status,
            });
        }
        self.send(&slot, Command::ResetSolver)
    }

    /// Change one parameter (constants, then external inputs).
    ///
    /// Rejected with [`SimError::ConcurrentMutation`] while running. While
    /// paused the change applies from the resumed run on.
    pub fn set_parameter(&self, index: usize, value: f64) -> SimResult<()> {
        if !value.is_finite() {
            return Err(SimError::NonFiniteParameter { value });
        }
        let slot = self.worker_slot();
        let len = self.model.parameter_count();
        if index >= len {
            return Err(SimError::ParameterIndex { index, len });
        }

        match self.status() {
            RunStatus::Running => {
                warn!(index, "Parameter change rejected while running");
                Err(SimError::ConcurrentMutation)
            }
            RunStatus::Paused => {
                let (reply, answer) = mpsc::channel();
                self.send(
                    &slot,
                    Command::SetParameter {
                        index,
                        value,
                        reply,
                    },
                )?;
                answer
                    .recv_timeout(REPLY_TIMEOUT)
                    .map_err(|_| SimError::WorkerUnavailable)??;
                self.parameters.lock().unwrap_or_else(PoisonError::into_inner)[index] = value;
                Ok(())
            }
            _ => {
                self.parameters.lock().unwrap_or_else(PoisonError::into_inner)[index] = value;
                Ok(())
            }
        }
    }

    /// [`RunController::set_parameter`] by variable name.
    pub fn set_parameter_by_name(&self, name: &str, value: f64) -> SimResult<()> {
        let index = self
            .model
            .parameter_index(name)
            .ok_or_else(|| SimError::invalid_config(format!("no parameter named '{name}'")))?;
        self.set_parameter(index, value)
    }

    /// Block until `done(status)` holds, up to `timeout`.
    pub fn wait_for_status(
        &self,
        done: impl Fn(RunStatus) -> bool,
        timeout: Duration,
    ) -> SimResult<RunStatus> {
        let (status, timed_out) = self.shared.wait_for(done, timeout);
        if timed_out {
            Err(SimError::Timeout)
        } else {
            Ok(status)
        }
    }

    /// Block until the run reaches a terminal status, up to `timeout`.
    pub fn wait_until_finished(&self, timeout: Duration) -> SimResult<RunStatus> {
        self.wait_for_status(RunStatus::is_terminal, timeout)
    }

    /// Wait for the run to end on its own and return the final status.
    ///
    /// A paused run never exits on its own; joining it is an error.
    pub fn join(&self) -> SimResult<RunStatus> {
        loop {
            let (status, _) = self
                .shared
                .wait_for(|s| s != RunStatus::Running, JOIN_POLL);
            if status == RunStatus::Running {
                continue;
            }
            let mut slot = self.worker_slot();
            // Re-check under the slot lock; a resume may have slipped in.
            match self.status() {
                RunStatus::Running => continue,
                RunStatus::Paused => {
                    return Err(SimError::InvalidTransition {
                        operation: "join",
                        status: RunStatus::Paused,
                    });
                }
                _ => {
                    self.reap(&mut slot, false);
                    return Ok(self.status());
                }
            }
        }
    }
}

impl Drop for RunController {
    fn drop(&mut self) {
        if self.status().is_active() {
            let _ = self.abort();
        }
        let mut slot = self.worker_slot();
        self.reap(&mut slot, true);
    }
}
