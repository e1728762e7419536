//! Run execution and caching service.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cx_compiler::{CompiledRoutineSet, RoutineCache};
use cx_model::EquationModel;
use cx_results::{ResultsTable, RunArchive, RunManifest, compute_run_id, timestamp_now};
use cx_sim::{RunConfiguration, RunController, RunEvent, RunStatus};
use cx_solver::SolverRegistry;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::model_file;
use crate::progress::{RunProgressEvent, RunStage};

/// Options for running simulations.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Return an archived run with the same id instead of running again.
    pub use_cache: bool,
    /// Archive completed runs next to the model file.
    pub save: bool,
    pub engine_version: String,
    /// Abort the run after this much wall-clock time.
    pub timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            save: true,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            timeout: None,
        }
    }
}

/// Request to execute a run of a model file.
pub struct RunRequest<'a> {
    pub model_path: &'a Path,
    pub config: RunConfiguration,
    /// Parameter overrides by variable name.
    pub parameters: Vec<(String, f64)>,
    pub options: RunOptions,
}

/// Response from a run execution.
#[derive(Debug, Clone)]
pub struct RunResponse {
    pub run_id: String,
    pub manifest: RunManifest,
    pub loaded_from_cache: bool,
    pub table: ResultsTable,
}

fn emit(
    progress_cb: &mut Option<&mut dyn FnMut(RunProgressEvent)>,
    event: impl FnOnce() -> RunProgressEvent,
) {
    if let Some(cb) = progress_cb.as_deref_mut() {
        cb(event());
    }
}

/// Compiled routines for `model`, shared through the process-wide cache.
pub fn compile_model(model: &EquationModel) -> AppResult<Arc<CompiledRoutineSet>> {
    Ok(RoutineCache::global().get_or_compile(model)?)
}

/// Registry name of the solver a configuration resolves to for `model`.
pub fn solver_name(config: &RunConfiguration, model: &EquationModel) -> String {
    let kind = config.solver.resolve(model.is_stiff());
    SolverRegistry::builtin()
        .solvers()
        .iter()
        .find(|d| d.kind == kind)
        .map(|d| d.name.to_string())
        .unwrap_or_else(|| format!("{kind:?}"))
}

/// Execute or load a run.
pub fn run_model(request: &RunRequest) -> AppResult<RunResponse> {
    run_model_with_progress(request, None)
}

/// Execute or load a run, streaming progress events.
pub fn run_model_with_progress(
    request: &RunRequest,
    mut progress_cb: Option<&mut dyn FnMut(RunProgressEvent)>,
) -> AppResult<RunResponse> {
    let started = Instant::now();
    let secs = || started.elapsed().as_secs_f64();

    emit(&mut progress_cb, || {
        RunProgressEvent::stage(RunStage::LoadingModel, secs(), "Loading model")
    });
    request.config.validate()?;
    let model = Arc::new(model_file::load_model(request.model_path)?);

    emit(&mut progress_cb, || {
        RunProgressEvent::stage(RunStage::Compiling, secs(), "Compiling model")
    });
    let routines = compile_model(&model)?;
    let controller = RunController::new(Arc::clone(&model), routines)?;
    for (name, value) in &request.parameters {
        controller.set_parameter_by_name(name, *value)?;
    }

    emit(&mut progress_cb, || {
        RunProgressEvent::stage(RunStage::CheckingCache, secs(), "Checking run archive")
    });
    let run_id = compute_run_id(
        &model.fingerprint().to_string(),
        &request.config,
        &controller.parameters(),
        &request.options.engine_version,
    );
    let archive = RunArchive::for_model_file(request.model_path)?;

    if request.options.use_cache && archive.has_run(&run_id) {
        emit(&mut progress_cb, || {
            RunProgressEvent::stage(RunStage::LoadingCachedResult, secs(), "Loading archived run")
        });
        let manifest = archive.load_manifest(&run_id)?;
        let table = archive.load_table(&run_id)?;
        info!(run_id = %run_id, "Loaded archived run");
        emit(&mut progress_cb, || {
            RunProgressEvent::stage(RunStage::Completed, secs(), "Loaded archived run")
        });
        return Ok(RunResponse {
            run_id,
            manifest,
            loaded_from_cache: true,
            table,
        });
    }

    let status = drive(
        &controller,
        request.config.clone(),
        request.options.timeout,
        &mut |fraction: f64| emit(&mut progress_cb, || RunProgressEvent::running(secs(), fraction)),
    )?;

    let snapshot = controller.store().snapshot();
    let manifest = RunManifest {
        run_id: run_id.clone(),
        model_name: model.name().to_string(),
        model_fingerprint: model.fingerprint().to_string(),
        timestamp: timestamp_now(),
        solver: solver_name(&request.config, &model),
        start_time: request.config.start_time,
        end_time: request.config.end_time,
        status: status.to_string(),
        error: controller.error().map(|e| e.to_string()),
        elapsed_ms: controller.elapsed().as_millis() as u64,
        point_count: snapshot.len(),
        columns: snapshot.columns().to_vec(),
    };

    if request.options.save && status == RunStatus::Completed {
        emit(&mut progress_cb, || {
            RunProgressEvent::stage(RunStage::Saving, secs(), "Archiving run")
        });
        archive.save_run(&manifest, &snapshot)?;
    }

    emit(&mut progress_cb, || {
        RunProgressEvent::stage(RunStage::Completed, secs(), format!("Run {status}"))
    });
    Ok(RunResponse {
        run_id,
        manifest,
        loaded_from_cache: false,
        table: snapshot.table(&[])?,
    })
}

/// Start `controller` and block until the run ends, reporting progress.
///
/// Returns the terminal status; a run still going after `timeout` is
/// aborted.
pub fn drive(
    controller: &RunController,
    config: RunConfiguration,
    timeout: Option<Duration>,
    on_progress: &mut dyn FnMut(f64),
) -> AppResult<RunStatus> {
    let events = controller.subscribe();
    controller.start(config)?;
    let started = Instant::now();

    loop {
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(RunEvent::Progress(fraction)) => on_progress(fraction),
            Ok(RunEvent::StatusChanged { to, .. }) if to.is_terminal() => break,
            Ok(_) => {}
            Err(_) => {
                if controller.status().is_terminal() {
                    break;
                }
            }
        }
        if let Some(limit) = timeout {
            if started.elapsed() > limit {
                warn!(limit_s = limit.as_secs_f64(), "Run timed out, aborting");
                // Fails only if the run finished in the meantime.
                let _ = controller.abort();
                break;
            }
        }
    }

    let status = controller.join()?;
    if status == RunStatus::Failed {
        if let Some(e) = controller.error() {
            warn!(model = controller.model().name(), error = %e, "Run failed");
        }
    }
    Ok(status)
}

/// Archived runs for the model file at `model_path`, newest first.
pub fn list_runs(model_path: &Path, model_name: Option<&str>) -> AppResult<Vec<RunManifest>> {
    let archive = RunArchive::for_model_file(model_path)?;
    Ok(archive.list_runs(model_name)?)
}

/// Manifest and results of an archived run.
pub fn load_run(model_path: &Path, run_id: &str) -> AppResult<(RunManifest, ResultsTable)> {
    let archive = RunArchive::for_model_file(model_path)?;
    if !archive.has_run(run_id) {
        return Err(AppError::RunNotFound(run_id.to_string()));
    }
    Ok((archive.load_manifest(run_id)?, archive.load_table(run_id)?))
}
