//! Parameter sweeps: one compiled model run under many parameter sets.
//!
//! Every case gets its own [`RunController`]; all of them share the same
//! read-only routine set.

use std::sync::Arc;

use cx_model::EquationModel;
use cx_results::{RecordedPoint, ResultsTable};
use cx_sim::{RunConfiguration, RunController, RunStatus};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::run_service::{compile_model, drive};

#[derive(Debug, Clone, PartialEq)]
pub struct SweepCase {
    pub label: String,
    /// Parameter overrides by variable name.
    pub parameters: Vec<(String, f64)>,
}

impl SweepCase {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.parameters.push((name.into(), value));
        self
    }
}

#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub label: String,
    pub status: RunStatus,
    pub error: Option<String>,
    pub last: Option<RecordedPoint>,
    pub table: ResultsTable,
}

/// Cases `name = start + i * (stop - start) / (count - 1)` for `i < count`.
pub fn linear_cases(name: &str, start: f64, stop: f64, count: usize) -> Vec<SweepCase> {
    let step = if count > 1 {
        (stop - start) / (count - 1) as f64
    } else {
        0.0
    };
    (0..count)
        .map(|i| {
            let value = if i + 1 == count && count > 1 {
                stop
            } else {
                start + i as f64 * step
            };
            SweepCase::new(format!("{name}={value}")).with(name, value)
        })
        .collect()
}

fn run_case(
    model: &Arc<EquationModel>,
    routines: &Arc<cx_compiler::CompiledRoutineSet>,
    config: &RunConfiguration,
    case: &SweepCase,
) -> AppResult<SweepOutcome> {
    let controller = RunController::new(Arc::clone(model), Arc::clone(routines))?;
    for (name, value) in &case.parameters {
        controller.set_parameter_by_name(name, *value)?;
    }
    let status = drive(&controller, config.clone(), None, &mut |_: f64| {})?;
    let snapshot = controller.store().snapshot();
    Ok(SweepOutcome {
        label: case.label.clone(),
        status,
        error: controller.error().map(|e| e.to_string()),
        last: snapshot.last().cloned(),
        table: snapshot.table(&[])?,
    })
}

/// Run every case in parallel, on `threads` workers or rayon's default
/// pool. Outcomes come back in case order.
pub fn run_sweep(
    model: Arc<EquationModel>,
    config: &RunConfiguration,
    cases: &[SweepCase],
    threads: Option<usize>,
) -> AppResult<Vec<SweepOutcome>> {
    config.validate()?;
    let routines = compile_model(&model)?;
    info!(model = model.name(), cases = cases.len(), "Starting sweep");

    let sweep = || -> AppResult<Vec<SweepOutcome>> {
        cases
            .par_iter()
            .map(|case| run_case(&model, &routines, config, case))
            .collect()
    };

    match threads {
        Some(n) => ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map_err(|e| AppError::InvalidInput(format!("thread pool: {e}")))?
            .install(sweep),
        None => sweep(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_cases_hit_both_ends() {
        let cases = linear_cases("k", 0.5, 2.0, 4);
        let values: Vec<f64> = cases.iter().map(|c| c.parameters[0].1).collect();
        assert_eq!(values, vec![0.5, 1.0, 1.5, 2.0]);
        assert_eq!(cases[0].label, "k=0.5");
        assert_eq!(linear_cases("k", 3.0, 9.0, 1)[0].parameters, vec![("k".to_string(), 3.0)]);
    }
}
