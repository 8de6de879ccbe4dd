//! Adapter between lab models and a [`CpSolver`].

use super::builder::LabModel;
use super::types::SolveStatus;
use crate::cp::{CpSolution, CpSolver, SolverConfig, SolverStatus};
use crate::error::FormationError;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Maps a solver status onto the formation statuses. `ModelInvalid` has no
/// counterpart: a model this crate built is never invalid.
pub fn translate_status(status: SolverStatus) -> Option<SolveStatus> {
    match status {
        SolverStatus::Optimal => Some(SolveStatus::Optimal),
        SolverStatus::Feasible => Some(SolveStatus::Feasible),
        SolverStatus::Infeasible => Some(SolveStatus::Infeasible),
        SolverStatus::Timeout => Some(SolveStatus::TimeoutNoSolution),
        SolverStatus::ModelInvalid => None,
    }
}

/// Splits one wall-clock budget across labs solved one after another.
///
/// Each lab gets an equal share of what is left, so time a fast lab does
/// not use passes on to the labs after it.
#[derive(Debug, Clone)]
pub struct TimeShare {
    deadline: Instant,
    remaining: usize,
}

impl TimeShare {
    pub fn new(total: Duration, labs: usize) -> Self {
        Self {
            deadline: Instant::now() + total,
            remaining: labs,
        }
    }

    /// Budget for the next lab.
    pub fn next_budget(&mut self) -> Duration {
        let left = self.deadline.saturating_duration_since(Instant::now());
        let share = left / self.remaining.max(1) as u32;
        self.remaining = self.remaining.saturating_sub(1);
        share
    }
}

/// Runs lab models through a solver with a fixed seed and worker count.
#[derive(Debug)]
pub struct Engine<'s, S: CpSolver> {
    solver: &'s S,
    seed: u64,
    workers: usize,
}

impl<'s, S: CpSolver> Engine<'s, S> {
    pub fn new(solver: &'s S, seed: u64, workers: usize) -> Self {
        Self {
            solver,
            seed,
            workers,
        }
    }

    /// Solver configuration for one lab.
    pub fn config(&self, budget: Duration) -> SolverConfig {
        let ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX).max(1);
        SolverConfig::default()
            .with_time_limit_ms(ms)
            .with_seed(self.seed)
            .with_num_workers(self.workers.max(1))
    }

    pub fn solve(
        &self,
        lab: &LabModel,
        budget: Duration,
    ) -> Result<(SolveStatus, CpSolution), FormationError> {
        let config = self.config(budget);
        debug!(lab = %lab.lab, budget_ms = config.time_limit_ms, "solving lab");
        let solution = self.solver.solve(&lab.model, &config);
        match translate_status(solution.status) {
            Some(status) => {
                debug!(
                    lab = %lab.lab,
                    %status,
                    objective = ?solution.objective_value,
                    nodes = solution.nodes,
                    ms = solution.solve_time_ms,
                    "lab solved"
                );
                Ok((status, solution))
            }
            None => {
                warn!(lab = %lab.lab, "solver rejected lab model");
                Err(FormationError::InvalidModel {
                    lab: lab.lab.clone(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cp::{CpModel, SearchSolver};
    use crate::roster::{LabId, StudentId};
    use crate::teams::builder::SlotRange;

    struct Rejecting;

    impl CpSolver for Rejecting {
        fn solve(&self, _model: &CpModel, _config: &SolverConfig) -> CpSolution {
            CpSolution::empty(SolverStatus::ModelInvalid)
        }
    }

    fn empty_lab() -> LabModel {
        LabModel {
            lab: LabId::new("z"),
            students: vec![StudentId(0)],
            scores: vec![1.0],
            slots: SlotRange { offset: 0, len: 0 },
            model: CpModel::new("z"),
            assign: vec![Vec::new()],
            active: Vec::new(),
        }
    }

    #[test]
    fn test_translate_status() {
        assert_eq!(
            translate_status(SolverStatus::Timeout),
            Some(SolveStatus::TimeoutNoSolution)
        );
        assert_eq!(translate_status(SolverStatus::Optimal), Some(SolveStatus::Optimal));
        assert_eq!(translate_status(SolverStatus::ModelInvalid), None);
    }

    #[test]
    fn test_time_share() {
        let mut share = TimeShare::new(Duration::from_secs(30), 3);
        let first = share.next_budget();
        assert!(first <= Duration::from_secs(10));
        assert!(first > Duration::from_secs(9));
        let second = share.next_budget();
        assert!(second > Duration::from_secs(9));
        // The last lab takes everything that is left.
        let third = share.next_budget();
        assert!(third > Duration::from_secs(28));
    }

    #[test]
    fn test_config_carries_seed_and_workers() {
        let solver = SearchSolver::new();
        let engine = Engine::new(&solver, 9, 0);
        let config = engine.config(Duration::from_micros(10));
        assert_eq!(config.time_limit_ms, 1);
        assert_eq!(config.seed, 9);
        assert_eq!(config.num_workers, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_model_is_an_error() {
        let engine = Engine::new(&Rejecting, 1, 1);
        let err = engine.solve(&empty_lab(), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, FormationError::InvalidModel { lab } if lab.as_str() == "z"));
    }
}
