//! Lifecycle tests for the run controller.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use cx_core::Tolerances;
use cx_model::{EquationModel, Expr, ModelBuilder};
use cx_sim::{RunConfiguration, RunController, RunEvent, RunStatus, SimError};
use cx_solver::{SolverError, SolverKind};

const WAIT: Duration = Duration::from_secs(30);

fn decay(k: f64) -> Arc<EquationModel> {
    let mut b = ModelBuilder::new("decay");
    b.add_constant("k", k);
    b.add_state("y", 1.0, -Expr::var("k") * Expr::var("y"));
    Arc::new(b.build().unwrap())
}

fn fixed(kind: SolverKind, step: f64, output_interval: f64) -> RunConfiguration {
    RunConfiguration {
        solver: kind,
        step,
        output_interval,
        ..RunConfiguration::default()
    }
}

fn final_y(ctrl: &RunController) -> f64 {
    let snap = ctrl.store().snapshot();
    *snap.column("y").unwrap().last().unwrap()
}

/// Block until `n` points have been recorded.
fn wait_for_points(events: &Receiver<RunEvent>, n: usize) {
    loop {
        match events.recv_timeout(WAIT).unwrap() {
            RunEvent::PointRecorded { index, .. } if index + 1 >= n => return,
            _ => {}
        }
    }
}

#[test]
fn decay_runs_to_completion() {
    let ctrl = RunController::compile(decay(1.0)).unwrap();
    ctrl.start(fixed(SolverKind::Rk4, 0.01, 0.1)).unwrap();

    assert_eq!(ctrl.wait_until_finished(WAIT).unwrap(), RunStatus::Completed);
    assert_eq!(ctrl.join().unwrap(), RunStatus::Completed);

    let snap = ctrl.store().snapshot();
    assert_eq!(snap.len(), 11);
    assert_eq!(snap.times().first().copied(), Some(0.0));
    assert_eq!(snap.last().unwrap().time, 1.0);
    assert!((final_y(&ctrl) - 0.367879).abs() < 1e-4);
    assert_eq!(ctrl.progress(), 1.0);
    assert!(ctrl.error().is_none());
    assert!(!ctrl.store().is_in_use());
}

#[test]
fn recorded_times_strictly_increase() {
    let ctrl = RunController::compile(decay(2.0)).unwrap();
    let config = RunConfiguration {
        solver: SolverKind::AdaptiveHeunEuler,
        output_interval: 0.07,
        ..RunConfiguration::default()
    };
    ctrl.start(config.clone()).unwrap();
    ctrl.wait_until_finished(WAIT).unwrap();

    let times = ctrl.store().snapshot().times();
    assert_eq!(times.len() as u64, config.sample_count());
    assert!(times.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(*times.last().unwrap(), 1.0);
}

#[test]
fn events_follow_the_lifecycle() {
    let ctrl = RunController::compile(decay(1.0)).unwrap();
    let events = ctrl.subscribe();
    ctrl.start(fixed(SolverKind::Euler, 0.05, 0.25)).unwrap();
    ctrl.wait_until_finished(WAIT).unwrap();
    ctrl.join().unwrap();

    let events: Vec<RunEvent> = events.try_iter().collect();
    let indices: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::PointRecorded { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);

    let completed = events
        .iter()
        .position(|e| matches!(e, RunEvent::Completed { .. }))
        .unwrap();
    let switched = events
        .iter()
        .position(|e| {
            *e == RunEvent::StatusChanged {
                from: RunStatus::Running,
                to: RunStatus::Completed,
            }
        })
        .unwrap();
    assert!(completed < switched);
    assert!(matches!(
        events.first(),
        Some(RunEvent::Progress(p)) if *p == 0.0
    ));
}

#[test]
fn abort_keeps_points_recorded_so_far() {
    let ctrl = RunController::compile(decay(1.0)).unwrap();
    let events = ctrl.subscribe();
    let config = RunConfiguration {
        delay_ms: 300,
        ..fixed(SolverKind::Euler, 0.01, 0.01)
    };
    ctrl.start(config).unwrap();

    wait_for_points(&events, 3);
    ctrl.abort().unwrap();

    assert_eq!(ctrl.status(), RunStatus::Aborted);
    assert_eq!(ctrl.store().len(), 3);
    assert!(!ctrl.store().is_in_use());
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(ctrl.store().len(), 3);
}

#[test]
fn abort_requires_an_active_run() {
    let ctrl = RunController::compile(decay(1.0)).unwrap();
    assert!(matches!(
        ctrl.abort(),
        Err(SimError::InvalidTransition {
            status: RunStatus::Idle,
            ..
        })
    ));
    assert!(matches!(
        ctrl.pause(),
        Err(SimError::InvalidTransition { .. })
    ));
}

#[test]
fn pause_and_resume_do_not_change_the_trajectory() {
    let config = fixed(SolverKind::Euler, 0.01, 0.05);

    let reference = RunController::compile(decay(1.0)).unwrap();
    reference.start(config.clone()).unwrap();
    reference.wait_until_finished(WAIT).unwrap();
    let expected = reference.store().snapshot();

    let ctrl = RunController::compile(decay(1.0)).unwrap();
    let events = ctrl.subscribe();
    ctrl.start(RunConfiguration {
        delay_ms: 20,
        ..config
    })
    .unwrap();
    wait_for_points(&events, 4);
    ctrl.pause().unwrap();
    assert_eq!(
        ctrl.wait_for_status(|s| s == RunStatus::Paused, WAIT).unwrap(),
        RunStatus::Paused
    );

    let paused_len = ctrl.store().len();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(ctrl.store().len(), paused_len);
    assert!(matches!(ctrl.join(), Err(SimError::InvalidTransition { .. })));

    ctrl.resume().unwrap();
    assert_eq!(ctrl.wait_until_finished(WAIT).unwrap(), RunStatus::Completed);
    assert_eq!(ctrl.store().snapshot(), expected);
}

#[test]
fn parameter_change_rejected_while_running() {
    let config = fixed(SolverKind::Rk4, 0.01, 0.05);

    let reference = RunController::compile(decay(1.0)).unwrap();
    reference.start(config.clone()).unwrap();
    reference.wait_until_finished(WAIT).unwrap();
    let expected = reference.store().snapshot();

    let ctrl = RunController::compile(decay(1.0)).unwrap();
    let events = ctrl.subscribe();
    ctrl.start(RunConfiguration {
        delay_ms: 20,
        ..config
    })
    .unwrap();
    wait_for_points(&events, 2);

    assert!(matches!(
        ctrl.set_parameter(0, 5.0),
        Err(SimError::ConcurrentMutation)
    ));
    assert_eq!(ctrl.parameters(), vec![1.0]);

    // The run carries on as if the change was never asked for.
    assert_eq!(ctrl.wait_until_finished(WAIT).unwrap(), RunStatus::Completed);
    assert_eq!(ctrl.store().snapshot(), expected);
}

#[test]
fn join_waits_for_a_running_run_to_complete() {
    let ctrl = RunController::compile(decay(1.0)).unwrap();
    let events = ctrl.subscribe();
    ctrl.start(RunConfiguration {
        delay_ms: 20,
        ..fixed(SolverKind::Euler, 0.01, 0.05)
    })
    .unwrap();
    wait_for_points(&events, 2);
    assert_eq!(ctrl.status(), RunStatus::Running);

    assert_eq!(ctrl.join().unwrap(), RunStatus::Completed);
    assert_eq!(ctrl.store().len(), 21);
    assert_eq!(ctrl.store().snapshot().last().unwrap().time, 1.0);
    assert!(!ctrl.store().is_in_use());
}

#[test]
fn parameter_change_while_paused_applies_after_resume() {
    let ctrl = RunController::compile(decay(1.0)).unwrap();
    let events = ctrl.subscribe();
    ctrl.start(RunConfiguration {
        delay_ms: 10,
        ..fixed(SolverKind::Rk4, 0.01, 0.05)
    })
    .unwrap();
    wait_for_points(&events, 3);
    ctrl.pause().unwrap();
    ctrl.wait_for_status(|s| s == RunStatus::Paused, WAIT).unwrap();

    let tp = ctrl.run_state().time;
    ctrl.set_parameter_by_name("k", 2.0).unwrap();
    assert_eq!(ctrl.parameters(), vec![2.0]);
    ctrl.resume().unwrap();
    assert_eq!(ctrl.wait_until_finished(WAIT).unwrap(), RunStatus::Completed);

    let expected = (-tp).exp() * (-2.0 * (1.0 - tp)).exp();
    assert!((final_y(&ctrl) - expected).abs() < 1e-5);
    let k = ctrl.store().snapshot().column("k").unwrap();
    assert_eq!(k.first().copied(), Some(1.0));
    assert_eq!(k.last().copied(), Some(2.0));
}

#[test]
fn parameter_changes_between_runs() {
    let ctrl = RunController::compile(decay(1.0)).unwrap();
    assert!(matches!(
        ctrl.set_parameter(3, 1.0),
        Err(SimError::ParameterIndex { index: 3, len: 1 })
    ));
    assert!(matches!(
        ctrl.set_parameter(0, f64::NAN),
        Err(SimError::NonFiniteParameter { .. })
    ));
    assert!(ctrl.set_parameter_by_name("nope", 1.0).is_err());

    ctrl.set_parameter(0, 0.5).unwrap();
    ctrl.start(fixed(SolverKind::Rk4, 0.01, 0.5)).unwrap();
    ctrl.wait_until_finished(WAIT).unwrap();
    assert!((final_y(&ctrl) - (-0.5f64).exp()).abs() < 1e-8);
}

#[test]
fn inconsistent_algebraic_system_stays_idle() {
    let mut b = ModelBuilder::new("broken");
    b.add_state("y", 1.0, Expr::num(0.0));
    b.add_algebraic("z", 0.0);
    b.add_residual(Expr::num(1.0));
    let ctrl = RunController::compile(Arc::new(b.build().unwrap())).unwrap();

    let err = ctrl.start(RunConfiguration::default()).unwrap_err();
    assert!(matches!(err, SimError::Initialization { .. }), "{err}");
    assert_eq!(ctrl.status(), RunStatus::Idle);
    assert!(ctrl.store().is_empty());
    assert!(!ctrl.store().is_in_use());
}

#[test]
fn invalid_configuration_is_rejected() {
    let ctrl = RunController::compile(decay(1.0)).unwrap();
    let err = ctrl
        .start(RunConfiguration {
            end_time: -1.0,
            ..RunConfiguration::default()
        })
        .unwrap_err();
    assert!(matches!(err, SimError::InvalidConfiguration { .. }));
    assert_eq!(ctrl.status(), RunStatus::Idle);
}

#[test]
fn tighter_tolerance_gives_smaller_error() {
    let exact = (-1.0f64).exp();
    let mut errors = Vec::new();
    for tol in [1e-3, 1e-6] {
        let ctrl = RunController::compile(decay(1.0)).unwrap();
        ctrl.start(RunConfiguration {
            solver: SolverKind::AdaptiveHeunEuler,
            tolerances: Tolerances { abs: tol, rel: tol },
            ..RunConfiguration::default()
        })
        .unwrap();
        assert_eq!(ctrl.wait_until_finished(WAIT).unwrap(), RunStatus::Completed);
        errors.push((final_y(&ctrl) - exact).abs());
    }
    assert!(errors[1] < errors[0], "{errors:?}");
}

#[test]
fn store_cannot_be_cleared_during_a_run() {
    let ctrl = RunController::compile(decay(1.0)).unwrap();
    let events = ctrl.subscribe();
    ctrl.start(RunConfiguration {
        delay_ms: 500,
        ..fixed(SolverKind::Euler, 0.01, 0.01)
    })
    .unwrap();
    wait_for_points(&events, 2);

    assert!(ctrl.store().clear().is_err());
    assert!(matches!(
        ctrl.start(RunConfiguration::default()),
        Err(SimError::InvalidTransition {
            operation: "start",
            ..
        })
    ));
    ctrl.abort().unwrap();
    ctrl.store().clear().unwrap();
    assert!(ctrl.store().is_empty());
}

#[test]
fn restart_after_completion_replaces_results() {
    let ctrl = RunController::compile(decay(1.0)).unwrap();
    let config = fixed(SolverKind::Rk4, 0.01, 0.1);
    ctrl.start(config.clone()).unwrap();
    ctrl.wait_until_finished(WAIT).unwrap();
    let first = ctrl.store().snapshot();

    ctrl.start(config).unwrap();
    assert_eq!(ctrl.wait_until_finished(WAIT).unwrap(), RunStatus::Completed);
    let second = ctrl.store().snapshot();

    assert_eq!(second.len(), 11);
    assert_eq!(first, second);
    // The first snapshot still reads the first run's points.
    assert_eq!(first.len(), 11);
}

#[test]
fn step_limit_fails_the_run() {
    let ctrl = RunController::compile(decay(1.0)).unwrap();
    ctrl.start(RunConfiguration {
        max_steps: Some(5),
        ..fixed(SolverKind::Euler, 0.01, 0.01)
    })
    .unwrap();

    assert_eq!(ctrl.wait_until_finished(WAIT).unwrap(), RunStatus::Failed);
    assert!(matches!(
        ctrl.error(),
        Some(SolverError::MaxStepsExceeded { max_steps: 5, .. })
    ));
    assert_eq!(ctrl.store().len(), 6);
    assert!(!ctrl.store().is_in_use());
}

#[test]
fn domain_error_fails_the_run() {
    let mut b = ModelBuilder::new("pole");
    b.add_state("y", 0.0, Expr::num(1.0) / (Expr::time() - 0.5));
    let ctrl = RunController::compile(Arc::new(b.build().unwrap())).unwrap();
    ctrl.start(fixed(SolverKind::Euler, 0.1, 0.1)).unwrap();

    assert_eq!(ctrl.wait_until_finished(WAIT).unwrap(), RunStatus::Failed);
    assert!(matches!(ctrl.error(), Some(SolverError::Domain(_))));
    let times = ctrl.store().snapshot().times();
    assert_eq!(times.last().copied(), Some(0.4));
}

#[test]
fn routines_for_another_model_are_rejected() {
    let a = decay(1.0);
    let mut other = ModelBuilder::new("growth");
    other.add_state("x", 1.0, Expr::var("x"));
    let b = Arc::new(other.build().unwrap());
    let routines = cx_compiler::RoutineCache::global().get_or_compile(&a).unwrap();
    assert!(matches!(
        RunController::new(b, routines),
        Err(SimError::InvalidConfiguration { .. })
    ));
}
