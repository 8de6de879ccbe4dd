//! CP solver interface and the search-based implementation.

use super::lns::{Lns, LnsParams};
use super::model::CpModel;
use super::search::{clamp_objective, Incumbent, Interrupt, Limits, Search, Shared};
use super::store::{Compiled, Store};
use super::variables::VarId;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Status of the solver after execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SolverStatus {
    /// Proven optimal solution found.
    Optimal,
    /// Feasible (but not necessarily optimal) solution found.
    Feasible,
    /// No feasible solution exists.
    Infeasible,
    /// Model or configuration is invalid or malformed.
    ModelInvalid,
    /// Time limit reached before any solution was found.
    Timeout,
}

impl SolverStatus {
    /// Get a human-readable string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            SolverStatus::Optimal => "optimal",
            SolverStatus::Feasible => "feasible",
            SolverStatus::Infeasible => "infeasible",
            SolverStatus::ModelInvalid => "model_invalid",
            SolverStatus::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Solution from a CP solver.
#[derive(Debug, Clone)]
pub struct CpSolution {
    /// Solver status.
    pub status: SolverStatus,
    /// Objective function value (if a solution was found).
    pub objective_value: Option<i64>,
    /// Boolean variable assignments, indexed by [`VarId`].
    pub values: Vec<bool>,
    /// Solve time in milliseconds.
    pub solve_time_ms: u64,
    /// Search nodes explored across all workers.
    pub nodes: u64,
}

impl CpSolution {
    /// Creates an empty solution with the given status.
    pub fn empty(status: SolverStatus) -> Self {
        Self {
            status,
            objective_value: None,
            values: Vec::new(),
            solve_time_ms: 0,
            nodes: 0,
        }
    }

    /// Whether a feasible solution was found.
    pub fn is_solution_found(&self) -> bool {
        matches!(self.status, SolverStatus::Optimal | SolverStatus::Feasible)
    }

    /// Value of a variable; `false` when no solution was found.
    pub fn value(&self, var: VarId) -> bool {
        self.values.get(var.index()).copied().unwrap_or(false)
    }
}

/// Solver configuration.
///
/// # Examples
///
/// ```
/// use team_former::cp::SolverConfig;
///
/// let config = SolverConfig::default()
///     .with_time_limit_ms(5_000)
///     .with_seed(7)
///     .with_lns_iterations(100);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Maximum wall-clock solve time in milliseconds.
    pub time_limit_ms: u64,
    /// Number of portfolio workers (needs the `parallel` feature to run
    /// more than one).
    pub num_workers: usize,
    /// Seed for tie-breaking and neighbourhood selection. Worker `w`
    /// uses `seed + w`.
    pub seed: u64,
    /// Stop after finding the first feasible solution.
    pub stop_after_first: bool,
    /// Node budget of the first complete search; doubled on each restart.
    pub initial_node_limit: u64,
    /// Neighbourhoods tried between two complete-search restarts.
    pub lns_iterations: usize,
    /// Node budget of one neighbourhood repair.
    pub lns_node_limit: u64,
    /// Minimum fraction of decisions relaxed per neighbourhood.
    pub min_destroy_degree: f64,
    /// Maximum fraction of decisions relaxed per neighbourhood.
    pub max_destroy_degree: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_limit_ms: 60_000,
            num_workers: 1,
            seed: 42,
            stop_after_first: false,
            initial_node_limit: 20_000,
            lns_iterations: 200,
            lns_node_limit: 2_000,
            min_destroy_degree: 0.1,
            max_destroy_degree: 0.4,
        }
    }
}

impl SolverConfig {
    pub fn with_time_limit_ms(mut self, ms: u64) -> Self {
        self.time_limit_ms = ms;
        self
    }

    pub fn with_num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_stop_after_first(mut self, stop: bool) -> Self {
        self.stop_after_first = stop;
        self
    }

    pub fn with_initial_node_limit(mut self, nodes: u64) -> Self {
        self.initial_node_limit = nodes;
        self
    }

    pub fn with_lns_iterations(mut self, n: usize) -> Self {
        self.lns_iterations = n;
        self
    }

    pub fn with_lns_node_limit(mut self, nodes: u64) -> Self {
        self.lns_node_limit = nodes;
        self
    }

    pub fn with_destroy_degree(mut self, min: f64, max: f64) -> Self {
        self.min_destroy_degree = min;
        self.max_destroy_degree = max;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.time_limit_ms == 0 {
            return Err("time_limit_ms must be positive".into());
        }
        if self.num_workers == 0 {
            return Err("num_workers must be at least 1".into());
        }
        if self.initial_node_limit == 0 || self.lns_node_limit == 0 {
            return Err("node limits must be positive".into());
        }
        if !(self.min_destroy_degree > 0.0 && self.min_destroy_degree <= 1.0) {
            return Err(format!(
                "min_destroy_degree must be in (0, 1], got {}",
                self.min_destroy_degree
            ));
        }
        if !(self.max_destroy_degree >= self.min_destroy_degree && self.max_destroy_degree <= 1.0) {
            return Err(format!(
                "max_destroy_degree must be in [min_destroy_degree, 1], got {}",
                self.max_destroy_degree
            ));
        }
        Ok(())
    }

    fn lns_params(&self) -> LnsParams {
        LnsParams {
            node_limit: self.lns_node_limit,
            min_degree: self.min_destroy_degree,
            max_degree: self.max_destroy_degree,
        }
    }
}

/// Trait for CP solver implementations.
///
/// Implementors provide the actual constraint solving logic and must
/// return control once `config.time_limit_ms` has elapsed.
pub trait CpSolver {
    /// Solves the model and returns a solution.
    fn solve(&self, model: &CpModel, config: &SolverConfig) -> CpSolution;
}

/// Propagation-based branch and bound with large neighbourhood search.
///
/// Each worker alternates complete depth-first searches under a growing
/// node budget with rounds of LNS around its incumbent. A feasible model
/// hint is the first incumbent, so a hinted model never comes back
/// without a solution. A complete search that exhausts its tree proves
/// the best known objective optimal (or the model infeasible). With the
/// `parallel` feature, `num_workers > 1` runs a portfolio of differently
/// seeded workers that share their bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchSolver;

impl SearchSolver {
    pub fn new() -> Self {
        Self
    }
}

impl CpSolver for SearchSolver {
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

        let compiled = Compiled::new(model);
        let mut root = Store::new(&compiled);
        if root.propagate_root().is_err() {
            debug!("root propagation failed");
            let mut solution = CpSolution::empty(SolverStatus::Infeasible);
            solution.solve_time_ms = start.elapsed().as_millis() as u64;
            return solution;
        }

        let deadline = start + Duration::from_millis(config.time_limit_ms);
        let shared = Shared::new();
        let seed = model.feasible_hint().map(|values| {
            let objective = clamp_objective(model.evaluate(values));
            shared.offer(objective);
            debug!(objective, "starting from hint");
            Incumbent {
                objective,
                values: values.to_vec(),
            }
        });
        let reports = run_portfolio(&root, config, &shared, deadline, seed.as_ref());

        let proven = reports.iter().any(|r| r.proven);
        let nodes = reports.iter().map(|r| r.nodes).sum();
        let best = reports
            .into_iter()
            .filter_map(|r| r.best)
            .min_by_key(|inc| inc.objective);

        let status = match (&best, proven) {
            (Some(_), true) => SolverStatus::Optimal,
            (Some(_), false) => SolverStatus::Feasible,
            (None, true) => SolverStatus::Infeasible,
            (None, false) => SolverStatus::Timeout,
        };
        debug!(%status, nodes, "search finished");

        CpSolution {
            status,
            objective_value: best.as_ref().map(|inc| inc.objective),
            values: best.map(|inc| inc.values).unwrap_or_default(),
            solve_time_ms: start.elapsed().as_millis() as u64,
            nodes,
        }
    }
}

#[derive(Debug)]
struct WorkerReport {
    best: Option<Incumbent>,
    proven: bool,
    nodes: u64,
}

#[cfg(feature = "parallel")]
fn run_portfolio(
    root: &Store<'_>,
    config: &SolverConfig,
    shared: &Shared,
    deadline: Instant,
    seed: Option<&Incumbent>,
) -> Vec<WorkerReport> {
    use rayon::prelude::*;

    if config.num_workers <= 1 {
        return vec![run_worker(root, config, shared, deadline, seed, 0)];
    }
    (0..config.num_workers)
        .into_par_iter()
        .map(|worker| run_worker(root, config, shared, deadline, seed, worker))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn run_portfolio(
    root: &Store<'_>,
    config: &SolverConfig,
    shared: &Shared,
    deadline: Instant,
    seed: Option<&Incumbent>,
) -> Vec<WorkerReport> {
    if config.num_workers > 1 {
        debug!(
            requested = config.num_workers,
            "built without `parallel`; running a single worker"
        );
    }
    vec![run_worker(root, config, shared, deadline, seed, 0)]
}

fn run_worker(
    root: &Store<'_>,
    config: &SolverConfig,
    shared: &Shared,
    deadline: Instant,
    seed: Option<&Incumbent>,
    worker: usize,
) -> WorkerReport {
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(worker as u64));
    let mut lns = Lns::new(root, config.lns_params());
    let mut best: Option<Incumbent> = seed.cloned();
    let mut node_limit = config.initial_node_limit;
    let mut proven = false;
    let mut nodes = 0u64;
    let mut restart = 0usize;

    if config.stop_after_first && best.is_some() {
        return WorkerReport {
            best,
            proven,
            nodes,
        };
    }

    loop {
        // An incumbent is improved locally before the next complete search.
        if let Some(incumbent) = best.as_mut() {
            if config.lns_iterations > 0 {
                let round = lns.round(incumbent, config.lns_iterations, shared, deadline, &mut rng);
                match round {
                    Ok(improvements) => {
                        debug!(worker, restart, improvements, objective = incumbent.objective, "lns round")
                    }
                    Err(_) => break,
                }
            }
        }

        let limits = Limits {
            deadline,
            node_limit,
            stop_after_first: config.stop_after_first,
        };
        // Worker 0 starts with the plain positional value order.
        let randomize = worker > 0 || restart > 0;
        let outcome = Search::new(root.clone(), shared, limits, &mut rng, randomize).run();
        nodes += outcome.nodes;
        keep_better(&mut best, outcome.incumbent);

        match outcome.result {
            Ok(()) => {
                proven = true;
                shared.mark_proven();
                break;
            }
            Err(Interrupt::NodeLimit) => {}
            Err(Interrupt::Deadline | Interrupt::Stopped | Interrupt::FirstSolution) => break,
        }

        restart += 1;
        node_limit = node_limit.saturating_mul(2);
    }

    WorkerReport {
        best,
        proven,
        nodes: nodes + lns.nodes,
    }
}

fn keep_better(best: &mut Option<Incumbent>, candidate: Option<Incumbent>) {
    if let Some(candidate) = candidate {
        if best.as_ref().is_none_or(|b| candidate.objective < b.objective) {
            *best = Some(candidate);
        }
    }
}
