//! Formation entry point.

use super::bounds::Bounds;
use super::builder::{LabModel, LabPlan, ModelBuilder};
use super::engine::{Engine, TimeShare};
use super::extract::{extract_solution, solver_failure};
use super::objective::ObjectiveComposer;
use super::types::{Formation, LabFailure, LabOutcome, SolveStatus};
use crate::cp::{CpSolver, SearchSolver};
use crate::error::FormationError;
use crate::roster::{LabId, Roster};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Default solver seed.
pub const DEFAULT_SEED: u64 = 42;

/// Allocates a roster to teams, lab by lab.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use team_former::roster::{Roster, StudentRecord};
/// use team_former::teams::{Bounds, SolveStatus, TeamFormer};
///
/// let roster = Roster::new(vec![
///     StudentRecord::new("1", "M", 62.0),
///     StudentRecord::new("1", "M", 71.0),
///     StudentRecord::new("1", "F", 80.0),
///     StudentRecord::new("1", "F", 55.0),
/// ])
/// .unwrap();
/// let bounds = Bounds::new(2, 4, 2).with_max_solve_time(Duration::from_secs(5));
///
/// let formation = TeamFormer::new(bounds).form(&roster).unwrap();
/// assert_eq!(formation.status, SolveStatus::Optimal);
/// assert_eq!(formation.team_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct TeamFormer<S: CpSolver = SearchSolver> {
    bounds: Bounds,
    seed: u64,
    workers: usize,
    solver: S,
}

impl TeamFormer {
    pub fn new(bounds: Bounds) -> Self {
        Self {
            bounds,
            seed: DEFAULT_SEED,
            workers: 1,
            solver: SearchSolver::new(),
        }
    }
}

impl<S: CpSolver> TeamFormer<S> {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Portfolio workers per lab; more than one needs the `parallel` feature.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Replaces the optimization engine.
    pub fn with_solver<T: CpSolver>(self, solver: T) -> TeamFormer<T> {
        TeamFormer {
            bounds: self.bounds,
            seed: self.seed,
            workers: self.workers,
            solver,
        }
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Allocates every lab of the roster.
    ///
    /// `max_solve_time` covers the whole run; labs are solved in sorted
    /// order, each with an equal share of the time still left. Labs that
    /// cannot be allocated are reported in the [`Formation`], they do not
    /// abort the run.
    #[instrument(skip_all, fields(students = roster.len()))]
    pub fn form(&self, roster: &Roster) -> Result<Formation, FormationError> {
        let plans = ModelBuilder::new(roster, &self.bounds).build()?;
        let to_solve = plans.iter().filter(|p| matches!(p, LabPlan::Model(_))).count();
        let mut share = TimeShare::new(self.bounds.max_solve_time, to_solve);
        let class_mean = roster.mean_score();

        let mut outcomes = Vec::with_capacity(plans.len());
        for plan in plans {
            let outcome = match plan {
                LabPlan::Model(mut lab) => {
                    let budget = share.next_budget();
                    self.solve_model(&mut lab, class_mean, budget)?
                }
                LabPlan::Diagnosed {
                    lab,
                    students,
                    diagnosis,
                } => LabOutcome::Failed(LabFailure {
                    lab,
                    students,
                    status: SolveStatus::Infeasible,
                    diagnosis,
                }),
            };
            outcomes.push(outcome);
        }

        let formation = Formation::new(outcomes);
        let failed = formation.failures().count();
        if failed == 0 {
            info!(
                status = %formation.status,
                teams = formation.team_count(),
                "formation complete"
            );
        } else {
            for failure in formation.failures() {
                warn!(%failure, "lab not allocated");
            }
            info!(
                status = %formation.status,
                teams = formation.team_count(),
                failed,
                "formation incomplete"
            );
        }
        Ok(formation)
    }

    /// Re-solves a single lab with the full time budget, e.g. to retry a
    /// lab that timed out. The lab keeps the team numbers it has in a
    /// full run, so the result can be merged with [`Formation::merge`].
    #[instrument(skip_all, fields(lab = %lab))]
    pub fn solve_lab(&self, roster: &Roster, lab: &LabId) -> Result<LabOutcome, FormationError> {
        let plan = ModelBuilder::new(roster, &self.bounds)
            .build()?
            .into_iter()
            .find(|p| p.lab() == lab)
            .ok_or_else(|| FormationError::UnknownLab(lab.clone()))?;

        match plan {
            LabPlan::Model(mut model) => {
                self.solve_model(&mut model, roster.mean_score(), self.bounds.max_solve_time)
            }
            LabPlan::Diagnosed {
                lab,
                students,
                diagnosis,
            } => Ok(LabOutcome::Failed(LabFailure {
                lab,
                students,
                status: SolveStatus::Infeasible,
                diagnosis,
            })),
        }
    }

    fn solve_model(
        &self,
        lab: &mut LabModel,
        class_mean: f64,
        budget: Duration,
    ) -> Result<LabOutcome, FormationError> {
        ObjectiveComposer::new(&self.bounds, class_mean).compose(lab)?;
        let engine = Engine::new(&self.solver, self.seed, self.workers);
        let (status, solution) = engine.solve(lab, budget)?;
        if status.is_success() {
            let solved = extract_solution(lab, status, &solution, class_mean)?;
            Ok(LabOutcome::Solved(solved))
        } else {
            Ok(LabOutcome::Failed(solver_failure(lab, status)))
        }
    }
}
