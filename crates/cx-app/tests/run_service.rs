use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use cx_app::{
    AppError, ModelFile, RunOptions, RunProgressEvent, RunRequest, RunStage, SweepCase,
    extract_series, linear_cases, list_runs, load_run, query, run_model, run_model_with_progress,
    run_sweep,
};
use cx_sim::{RunConfiguration, RunStatus};
use cx_solver::SolverKind;

const DECAY: &str = r#"
name: decay
components:
  - name: cell
    constants:
      - { name: k, value: 1.0, unit: 1/s }
    states:
      - { name: y, value: 1.0, rate: "-k * y" }
    algebraic:
      - { name: twice, value: 0.0 }
    residuals:
      - "twice - 2 * y"
"#;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{nanos}"));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_model(dir: &PathBuf) -> PathBuf {
    let path = dir.join("decay.yaml");
    fs::write(&path, DECAY).unwrap();
    path
}

fn config() -> RunConfiguration {
    RunConfiguration {
        solver: SolverKind::Rk4,
        step: 0.01,
        output_interval: 0.1,
        ..RunConfiguration::default()
    }
}

#[test]
fn run_is_archived_and_reused() {
    let dir = unique_temp_dir("cx-app-archive");
    let model_path = write_model(&dir);

    let request = RunRequest {
        model_path: &model_path,
        config: config(),
        parameters: Vec::new(),
        options: RunOptions::default(),
    };
    let first = run_model(&request).unwrap();
    assert!(!first.loaded_from_cache);
    assert_eq!(first.manifest.status, "completed");
    assert_eq!(first.manifest.solver, "rk4");
    assert_eq!(first.manifest.point_count, 11);

    let y = extract_series(&first.table, "y").unwrap();
    assert_eq!(y.len(), 11);
    assert!((y[10].1 - (-1.0f64).exp()).abs() < 1e-6);
    let twice = extract_series(&first.table, "cell/twice").unwrap();
    assert!((twice[10].1 - 2.0 * y[10].1).abs() < 1e-6);

    let second = run_model(&request).unwrap();
    assert!(second.loaded_from_cache);
    assert_eq!(second.run_id, first.run_id);
    assert_eq!(second.table.headers, first.table.headers);
    assert_eq!(second.table.row_count(), first.table.row_count());

    let runs = list_runs(&model_path, Some("decay")).unwrap();
    assert_eq!(runs.len(), 1);
    let (manifest, table) = load_run(&model_path, &first.run_id).unwrap();
    assert_eq!(manifest.run_id, first.run_id);
    assert_eq!(query::get_run_summary(&table).unwrap().point_count, 11);

    assert!(matches!(
        load_run(&model_path, "missing"),
        Err(AppError::RunNotFound(_))
    ));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn parameter_overrides_change_the_run() {
    let dir = unique_temp_dir("cx-app-params");
    let model_path = write_model(&dir);

    let base = run_model(&RunRequest {
        model_path: &model_path,
        config: config(),
        parameters: Vec::new(),
        options: RunOptions {
            save: false,
            ..RunOptions::default()
        },
    })
    .unwrap();
    let faster = run_model(&RunRequest {
        model_path: &model_path,
        config: config(),
        parameters: vec![("k".to_string(), 2.0)],
        options: RunOptions {
            save: false,
            ..RunOptions::default()
        },
    })
    .unwrap();

    assert_ne!(base.run_id, faster.run_id);
    let y = extract_series(&faster.table, "y").unwrap();
    assert!((y.last().unwrap().1 - (-2.0f64).exp()).abs() < 1e-6);
    assert!(list_runs(&model_path, None).unwrap().is_empty());

    let unknown = run_model(&RunRequest {
        model_path: &model_path,
        config: config(),
        parameters: vec![("nope".to_string(), 2.0)],
        options: RunOptions::default(),
    });
    assert!(matches!(unknown, Err(AppError::Simulation(_))));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn progress_reaches_completion() {
    let dir = unique_temp_dir("cx-app-progress");
    let model_path = write_model(&dir);

    let mut events: Vec<RunProgressEvent> = Vec::new();
    let mut cb = |e: RunProgressEvent| events.push(e);
    run_model_with_progress(
        &RunRequest {
            model_path: &model_path,
            config: config(),
            parameters: Vec::new(),
            options: RunOptions {
                use_cache: false,
                save: false,
                ..RunOptions::default()
            },
        },
        Some(&mut cb),
    )
    .unwrap();

    assert_eq!(events.first().unwrap().stage, RunStage::LoadingModel);
    assert_eq!(events.last().unwrap().stage, RunStage::Completed);
    let fractions: Vec<f64> = events.iter().filter_map(|e| e.fraction).collect();
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(fractions.last().copied(), Some(1.0));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn missing_model_file_is_reported() {
    let dir = unique_temp_dir("cx-app-missing");
    let path = dir.join("absent.yaml");
    let err = run_model(&RunRequest {
        model_path: &path,
        config: config(),
        parameters: Vec::new(),
        options: RunOptions::default(),
    })
    .unwrap_err();
    assert!(matches!(err, AppError::ModelFileRead { .. }));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn sweep_runs_cases_in_parallel() {
    let model = Arc::new(ModelFile::from_yaml_str(DECAY).unwrap().to_model().unwrap());
    let mut cases = linear_cases("k", 0.5, 2.0, 4);
    cases.push(SweepCase::new("bad").with("missing", 1.0));

    let err = run_sweep(Arc::clone(&model), &config(), &cases, Some(2)).unwrap_err();
    assert!(matches!(err, AppError::Simulation(_)));

    cases.pop();
    let outcomes = run_sweep(model, &config(), &cases, Some(2)).unwrap();
    assert_eq!(outcomes.len(), 4);
    for (outcome, k) in outcomes.iter().zip([0.5, 1.0, 1.5, 2.0]) {
        assert_eq!(outcome.status, RunStatus::Completed);
        let last = outcome.last.as_ref().unwrap();
        assert_eq!(last.time, 1.0);
        let y = extract_series(&outcome.table, "y").unwrap();
        assert!((y.last().unwrap().1 - (-k as f64).exp()).abs() < 1e-6, "k = {k}");
    }
}
