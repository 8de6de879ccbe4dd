//! HiGHS mixed-integer back end.
//!
//! Solves the [`MilpForm`] of a model with the HiGHS MIP solver. Squared
//! objective terms are minimized as absolute values, so `Optimal` here
//! means optimal for that linear objective. The reported objective value
//! is still the model's own (squared) one.

use super::milp::MilpForm;
use super::model::CpModel;
use super::solver::{CpSolution, CpSolver, SolverConfig, SolverStatus};
use highs::{Col, HighsModelStatus, RowProblem, Sense};
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// [`CpSolver`] backed by the HiGHS MIP solver.
///
/// The model hint, when feasible, is passed as a starting solution and
/// is also the fallback if HiGHS stops without a better one.
#[derive(Debug, Clone, Copy, Default)]
pub struct HighsSolver;

impl HighsSolver {
    pub fn new() -> Self {
        Self
    }
}

fn build_problem(form: &MilpForm) -> RowProblem {
    let mut problem = RowProblem::default();
    let cols: Vec<Col> = form
        .columns
        .iter()
        .map(|col| {
            if col.integer {
                problem.add_integer_column(col.cost, col.lower..=col.upper)
            } else {
                problem.add_column(col.cost, col.lower..=col.upper)
            }
        })
        .collect();
    for row in &form.rows {
        let factors: Vec<(Col, f64)> = row.factors.iter().map(|&(c, a)| (cols[c], a)).collect();
        problem.add_row(row.lower..=row.upper, factors);
    }
    problem
}

fn finish(model: &CpModel, status: SolverStatus, values: Vec<bool>, start: Instant) -> CpSolution {
    let objective_value = i64::try_from(model.evaluate(&values)).unwrap_or(i64::MAX);
    CpSolution {
        status,
        objective_value: Some(objective_value),
        values,
        solve_time_ms: start.elapsed().as_millis() as u64,
        nodes: 0,
    }
}

impl CpSolver for HighsSolver {
    #[instrument(skip_all, fields(model = %model.name, vars = model.var_count()))]
    fn solve(&self, model: &CpModel, config: &SolverConfig) -> CpSolution {
        let start = Instant::now();
        if let Err(e) = model.validate() {
            warn!(error = %e, "rejecting invalid model");
            return CpSolution::empty(SolverStatus::ModelInvalid);
        }
        if let Err(e) = config.validate() {
            warn!(error = %e, "rejecting invalid solver configuration");
            return CpSolution::empty(SolverStatus::ModelInvalid);
        }

        let form = MilpForm::from_model(model);
        let hint = model.feasible_hint().map(<[bool]>::to_vec);
        debug!(
            columns = form.columns.len(),
            rows = form.rows.len(),
            hinted = hint.is_some(),
            "linearized model"
        );
        if config.stop_after_first {
            if let Some(values) = hint {
                return finish(model, SolverStatus::Feasible, values, start);
            }
        }

        let mut highs = build_problem(&form).optimise(Sense::Minimise);
        highs.make_quiet();
        highs.set_option("time_limit", config.time_limit_ms as f64 / 1000.0);
        highs.set_option("random_seed", (config.seed % i32::MAX as u64) as i32);
        highs.set_option("threads", config.num_workers.min(i32::MAX as usize) as i32);
        highs.set_option("mip_rel_gap", 0.0);
        if config.stop_after_first {
            highs.set_option("mip_max_improving_sols", 1);
        }
        if let Some(values) = &hint {
            let start_columns = form.extend(values);
            if let Err(err) = highs.try_set_solution(Some(&start_columns), None, None, None) {
                warn!(?err, "HiGHS rejected the hint; continuing without it");
            }
        }

        let solved = highs.solve();
        let highs_status = solved.status();
        let columns = solved.get_solution().columns().to_vec();
        let found = Some(form.read_back(&columns))
            .filter(|values| !columns.is_empty() && model.is_satisfied_by(values));
        debug!(?highs_status, found = found.is_some(), "HiGHS finished");

        match (highs_status, found, hint) {
            (HighsModelStatus::Optimal, Some(values), _) => {
                finish(model, SolverStatus::Optimal, values, start)
            }
            (HighsModelStatus::Infeasible, None, None) => {
                let mut solution = CpSolution::empty(SolverStatus::Infeasible);
                solution.solve_time_ms = start.elapsed().as_millis() as u64;
                solution
            }
            (_, Some(values), Some(hint)) => {
                let better = if model.evaluate(&hint) < model.evaluate(&values) {
                    hint
                } else {
                    values
                };
                finish(model, SolverStatus::Feasible, better, start)
            }
            (_, Some(values), None) | (_, None, Some(values)) => {
                finish(model, SolverStatus::Feasible, values, start)
            }
            (_, None, None) => {
                let mut solution = CpSolution::empty(SolverStatus::Timeout);
                solution.solve_time_ms = start.elapsed().as_millis() as u64;
                solution
            }
        }
    }
}
