//! The step loop running on a run's worker thread.
//!
//! Commands from the controller arrive over a channel and are only looked at
//! between solver steps, so a step always runs to completion on a
//! consistent parameter set.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Instant;

use cx_compiler::CompiledRoutineSet;
use cx_core::Stopwatch;
use cx_results::StoreLease;
use cx_solver::{SolverError, SolverHandle, SolverPoint, SolverResult};
use tracing::{debug, error, info};

use crate::config::RunConfiguration;
use crate::error::{SimError, SimResult};
use crate::recorder::Recorder;
use crate::shared::Shared;
use crate::status::{RunEvent, RunStatus};

pub(crate) enum Command {
    Pause,
    Resume,
    Abort,
    ResetSolver,
    SetParameter {
        index: usize,
        value: f64,
        reply: Sender<SimResult<()>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub(crate) struct Worker {
    pub config: RunConfiguration,
    pub solver: SolverHandle,
    pub routines: Arc<CompiledRoutineSet>,
    pub stiff: bool,
    pub parameters: Vec<f64>,
    pub recorder: Recorder,
    pub lease: Option<StoreLease>,
    pub shared: Arc<Shared>,
    pub commands: Receiver<Command>,
    /// Commands received mid-step, handled at the next step boundary.
    pub deferred: Vec<Command>,
    /// Index of the next recorded point; the start point is index 0.
    pub next_sample: u64,
    /// Last accepted point, left end for interpolation.
    pub prev: SolverPoint,
    pub parameters_dirty: bool,
    pub paused: bool,
    pub step_count: u64,
    pub stopwatch: Stopwatch,
}

impl Worker {
    pub fn run(mut self) {
        self.stopwatch.start();
        loop {
            if self.drain_commands() == Flow::Stop {
                break;
            }
            if self.paused {
                let flow = match self.commands.recv() {
                    Ok(cmd) => self.handle(cmd),
                    // Controller dropped.
                    Err(_) => self.finish(RunStatus::Aborted),
                };
                if flow == Flow::Stop {
                    break;
                }
                continue;
            }
            if self.advance() == Flow::Stop {
                break;
            }
        }
        debug!(steps = self.step_count, "Run worker exiting");
    }

    fn drain_commands(&mut self) -> Flow {
        for cmd in std::mem::take(&mut self.deferred) {
            if self.handle(cmd) == Flow::Stop {
                return Flow::Stop;
            }
        }
        loop {
            match self.commands.try_recv() {
                Ok(cmd) => {
                    if self.handle(cmd) == Flow::Stop {
                        return Flow::Stop;
                    }
                }
                Err(TryRecvError::Empty) => return Flow::Continue,
                Err(TryRecvError::Disconnected) => return self.finish(RunStatus::Aborted),
            }
        }
    }

    fn handle(&mut self, cmd: Command) -> Flow {
        match cmd {
            Command::Pause => {
                if !self.paused {
                    let mut inner = self.shared.lock();
                    if inner.run.status == RunStatus::Running {
                        self.paused = true;
                        self.stopwatch.stop();
                        self.shared.transition(&mut inner, RunStatus::Paused);
                    }
                }
                Flow::Continue
            }
            Command::Resume => {
                if !self.paused {
                    return Flow::Continue;
                }
                if let Err(e) = self.prepare_resume() {
                    return self.fail(e);
                }
                let mut inner = self.shared.lock();
                if inner.run.status == RunStatus::Paused {
                    self.paused = false;
                    self.stopwatch.start();
                    self.shared.transition(&mut inner, RunStatus::Running);
                }
                Flow::Continue
            }
            Command::Abort => self.finish(RunStatus::Aborted),
            Command::ResetSolver => {
                let p = self.solver.point().clone();
                match self.solver.reset(p.t, p.y) {
                    Ok(()) => {
                        self.prev = self.solver.point().clone();
                        Flow::Continue
                    }
                    Err(e) => self.fail(e),
                }
            }
            Command::SetParameter {
                index,
                value,
                reply,
            } => {
                let result = if !self.paused {
                    Err(SimError::ConcurrentMutation)
                } else if index >= self.parameters.len() {
                    Err(SimError::ParameterIndex {
                        index,
                        len: self.parameters.len(),
                    })
                } else {
                    self.parameters[index] = value;
                    self.parameters_dirty = true;
                    debug!(index, value, "Parameter changed while paused");
                    Ok(())
                };
                let _ = reply.send(result);
                Flow::Continue
            }
        }
    }

    /// Bring the solver in line with any change made while paused.
    fn prepare_resume(&mut self) -> SolverResult<()> {
        let warm = self.solver.supports_warm_continuation();
        if self.parameters_dirty {
            self.parameters_dirty = false;
            if warm && self.config.warm_resume_after_parameter_change {
                self.solver.set_constants(self.parameters.clone())?;
            } else {
                let p = self.solver.point().clone();
                self.solver = SolverHandle::initialize(
                    Arc::clone(&self.routines),
                    self.parameters.clone(),
                    p.t,
                    p.y,
                    p.z,
                    &self.config.solver_config(),
                    self.stiff,
                )?;
                debug!(t = p.t, "Solver rebuilt after parameter change");
            }
        } else if !warm {
            let p = self.solver.point().clone();
            self.solver.reset(p.t, p.y)?;
        }
        self.prev = self.solver.point().clone();
        Ok(())
    }

    fn advance(&mut self) -> Flow {
        if let Some(max_steps) = self.config.max_steps {
            if self.step_count >= max_steps {
                return self.fail(SolverError::MaxStepsExceeded {
                    max_steps,
                    time: self.prev.t,
                });
            }
        }

        let result = self.solver.step(self.config.end_time);
        self.step_count += 1;
        if let Some(e) = result.outcome.into_error() {
            return self.fail(e);
        }

        let current = self.solver.point().clone();
        let flow = self.record_samples(&current);
        self.prev = current;
        flow
    }

    /// Record every sample time in `(prev.t, current.t]`, then complete the
    /// run if the end time is reached.
    fn record_samples(&mut self, current: &SolverPoint) -> Flow {
        let t = current.t;
        let tiny = 1e-12 * t.abs().max(1.0);
        let end = self.config.end_time;

        loop {
            let ts = self.config.sample_time(self.next_sample);
            if ts > t + tiny {
                break;
            }
            let (y, z) = if (ts - t).abs() <= tiny {
                (current.y.clone(), current.z.clone())
            } else {
                self.solver.interpolate(&self.prev, current, ts)
            };
            if self.record(ts, &y, &z) == Flow::Stop {
                return Flow::Stop;
            }
            self.next_sample += 1;
            if ts >= end {
                break;
            }
            if self.throttle() == Flow::Stop {
                return Flow::Stop;
            }
        }

        self.publish(current);
        if t >= end - tiny {
            return self.finish(RunStatus::Completed);
        }
        Flow::Continue
    }

    fn record(&mut self, t: f64, y: &[f64], z: &[f64]) -> Flow {
        let values = self.recorder.values(y, z, &self.parameters);
        let Some(lease) = self.lease.as_ref() else {
            return Flow::Stop;
        };
        let mut inner = self.shared.lock();
        // An abort issued during the step discards it.
        if inner.run.status == RunStatus::Aborted {
            return Flow::Stop;
        }
        if lease.record(t, values) {
            let progress = self.config.progress_at(t).max(inner.run.progress);
            inner.run.progress = progress;
            self.shared.emit(RunEvent::PointRecorded {
                index: lease.store().len() - 1,
                time: t,
            });
            self.shared.emit(RunEvent::Progress(progress));
        }
        Flow::Continue
    }

    fn publish(&mut self, p: &SolverPoint) {
        let mut inner = self.shared.lock();
        inner.run.time = p.t;
        inner.run.states.clone_from(&p.y);
        inner.run.algebraic.clone_from(&p.z);
        inner.run.step_count = self.step_count;
        inner.run.progress = self.config.progress_at(p.t).max(inner.run.progress);
        inner.elapsed = self.stopwatch.elapsed();
    }

    /// Optional wall-clock delay between recorded points. Any command cuts
    /// it short; only an abort is acted on before the step is done.
    fn throttle(&mut self) -> Flow {
        let Some(delay) = self.config.delay() else {
            return Flow::Continue;
        };
        if !self.deferred.is_empty() {
            return Flow::Continue;
        }
        let deadline = Instant::now() + delay;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Flow::Continue;
            }
            match self.commands.recv_timeout(deadline - now) {
                Ok(Command::Abort) => return self.finish(RunStatus::Aborted),
                Ok(cmd) => {
                    self.deferred.push(cmd);
                    return Flow::Continue;
                }
                Err(RecvTimeoutError::Timeout) => return Flow::Continue,
                Err(RecvTimeoutError::Disconnected) => return self.finish(RunStatus::Aborted),
            }
        }
    }

    fn fail(&mut self, e: SolverError) -> Flow {
        error!(error = %e, t = self.prev.t, "Run failed");
        {
            let mut inner = self.shared.lock();
            if inner.run.status.is_terminal() {
                return Flow::Stop;
            }
            inner.error = Some(e.clone());
            self.shared.emit(RunEvent::Failed {
                error: e.to_string(),
            });
        }
        self.finish(RunStatus::Failed)
    }

    /// Release the store and publish the terminal status, unless the
    /// controller already did.
    fn finish(&mut self, to: RunStatus) -> Flow {
        self.stopwatch.stop();
        self.lease.take();

        let mut inner = self.shared.lock();
        inner.elapsed = self.stopwatch.elapsed();
        if inner.run.status.is_terminal() {
            return Flow::Stop;
        }
        if to == RunStatus::Completed {
            inner.run.progress = 1.0;
            info!(
                steps = self.step_count,
                elapsed_ms = inner.elapsed.as_millis() as u64,
                "Run completed"
            );
            self.shared.emit(RunEvent::Progress(1.0));
            self.shared.emit(RunEvent::Completed {
                elapsed: inner.elapsed,
            });
        }
        self.shared.transition(&mut inner, to);
        Flow::Stop
    }
}
