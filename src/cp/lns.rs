//! Large neighbourhood search around an incumbent.
//!
//! Each iteration keeps most exactly-one groups at their incumbent choice,
//! relaxes the rest, and re-solves the freed part exactly with a
//! node-limited branch and bound. Destroy operators are picked by
//! roulette wheel over adaptive weights.
//!
//! # References
//!
//! - Shaw (1998), "Using Constraint Programming and Local Search Methods
//!   to Solve Vehicle Routing Problems"
//! - Ropke & Pisinger (2006), "An Adaptive Large Neighborhood Search
//!   Heuristic for the Pickup and Delivery Problem with Time Windows"

use super::search::{Incumbent, Interrupt, Limits, Search, Shared};
use super::store::{Compiled, Store};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Instant;
use tracing::trace;

const SEGMENT_LENGTH: usize = 20;
const REACTION_FACTOR: f64 = 0.2;
const MIN_WEIGHT: f64 = 0.1;
const SCORE_NEW_BEST: f64 = 33.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Destroy {
    /// Uniformly random groups.
    Random,
    /// Groups whose chosen variable shares a constraint with a random
    /// seed group's choice.
    Related,
}

const OPERATORS: [Destroy; 2] = [Destroy::Random, Destroy::Related];

/// Tracks per-operator statistics for adaptive weight updates.
#[derive(Debug, Clone)]
struct OperatorStats {
    weight: f64,
    segment_score: f64,
    segment_uses: usize,
}

impl OperatorStats {
    fn new() -> Self {
        Self {
            weight: 1.0,
            segment_score: 0.0,
            segment_uses: 0,
        }
    }

    fn record(&mut self, score: f64) {
        self.segment_score += score;
        self.segment_uses += 1;
    }

    /// w_new = w * (1 - rho) + rho * (pi_j / theta_j)
    fn update_weight(&mut self) {
        if self.segment_uses > 0 {
            let avg_score = self.segment_score / self.segment_uses as f64;
            self.weight = self.weight * (1.0 - REACTION_FACTOR) + avg_score * REACTION_FACTOR;
            self.weight = self.weight.max(MIN_WEIGHT);
        }
        self.segment_score = 0.0;
        self.segment_uses = 0;
    }
}

fn roulette_select<R: Rng>(stats: &[OperatorStats], rng: &mut R) -> usize {
    let total: f64 = stats.iter().map(|s| s.weight).sum();
    if total <= 0.0 || stats.is_empty() {
        return 0;
    }

    let mut roll = rng.random_range(0.0..total);
    for (i, stat) in stats.iter().enumerate() {
        roll -= stat.weight;
        if roll <= 0.0 {
            return i;
        }
    }
    stats.len() - 1
}

/// Neighbourhood settings taken from the solver configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LnsParams {
    pub(crate) node_limit: u64,
    pub(crate) min_degree: f64,
    pub(crate) max_degree: f64,
}

pub(crate) struct Lns<'a> {
    model: &'a Compiled,
    root: &'a Store<'a>,
    params: LnsParams,
    group_of: Vec<Option<usize>>,
    stats: Vec<OperatorStats>,
    iterations: usize,
    pub(crate) nodes: u64,
}

impl<'a> Lns<'a> {
    pub(crate) fn new(root: &'a Store<'a>, params: LnsParams) -> Self {
        let model = root.model();
        let mut group_of = vec![None; model.n_vars];
        for (g, vars) in model.groups.iter().enumerate() {
            for &v in vars {
                group_of[v].get_or_insert(g);
            }
        }
        Self {
            model,
            root,
            params,
            group_of,
            stats: OPERATORS.iter().map(|_| OperatorStats::new()).collect(),
            iterations: 0,
            nodes: 0,
        }
    }

    /// Runs up to `iterations` neighbourhoods, improving `incumbent` in
    /// place. Returns the number of improvements.
    pub(crate) fn round(
        &mut self,
        incumbent: &mut Incumbent,
        iterations: usize,
        shared: &Shared,
        deadline: Instant,
        rng: &mut StdRng,
    ) -> Result<usize, Interrupt> {
        if self.model.groups.is_empty() {
            return Ok(0);
        }
        let mut improvements = 0;
        for _ in 0..iterations {
            if shared.is_proven() {
                return Err(Interrupt::Stopped);
            }
            if Instant::now() >= deadline {
                return Err(Interrupt::Deadline);
            }

            let op = roulette_select(&self.stats, rng);
            let degree = rng.random_range(self.params.min_degree..=self.params.max_degree);
            let relaxed = match OPERATORS[op] {
                Destroy::Random => self.random_groups(degree, rng),
                Destroy::Related => self.related_groups(incumbent, degree, rng),
            };

            let mut score = 0.0;
            if let Some(store) = self.fix_outside(incumbent, &relaxed, deadline)? {
                let limits = Limits {
                    deadline,
                    node_limit: self.params.node_limit,
                    stop_after_first: false,
                };
                let outcome = Search::new(store, shared, limits, rng, true).run();
                self.nodes += outcome.nodes;
                if let Some(better) = outcome.incumbent {
                    if better.objective < incumbent.objective {
                        trace!(
                            operator = ?OPERATORS[op],
                            from = incumbent.objective,
                            to = better.objective,
                            "neighbourhood improved incumbent"
                        );
                        *incumbent = better;
                        improvements += 1;
                        score = SCORE_NEW_BEST;
                    }
                }
                if let Err(interrupt @ (Interrupt::Deadline | Interrupt::Stopped)) = outcome.result {
                    return Err(interrupt);
                }
            }

            self.stats[op].record(score);
            self.iterations += 1;
            if self.iterations % SEGMENT_LENGTH == 0 {
                for stat in &mut self.stats {
                    stat.update_weight();
                }
            }
        }
        Ok(improvements)
    }

    fn target_size(&self, degree: f64) -> usize {
        let groups = self.model.groups.len();
        ((groups as f64 * degree).ceil() as usize).clamp(1, groups)
    }

    fn random_groups(&self, degree: f64, rng: &mut StdRng) -> Vec<bool> {
        let groups = self.model.groups.len();
        let mut order: Vec<usize> = (0..groups).collect();
        order.shuffle(rng);
        let mut relaxed = vec![false; groups];
        for &g in order.iter().take(self.target_size(degree)) {
            relaxed[g] = true;
        }
        relaxed
    }

    fn related_groups(&self, incumbent: &Incumbent, degree: f64, rng: &mut StdRng) -> Vec<bool> {
        let groups = self.model.groups.len();
        let target = self.target_size(degree);
        let mut relaxed = vec![false; groups];
        let mut count = 0;
        let mut attempts = 0;
        while count < target && attempts < 4 * groups {
            attempts += 1;
            let seed = rng.random_range(0..groups);
            let Some(&chosen) = self.model.groups[seed].iter().find(|&&v| incumbent.values[v]) else {
                continue;
            };
            for &c in &self.model.watches[chosen] {
                for &(v, _) in &self.model.constraints[c].terms {
                    if !incumbent.values[v] {
                        continue;
                    }
                    if let Some(g) = self.group_of[v] {
                        if !relaxed[g] {
                            relaxed[g] = true;
                            count += 1;
                        }
                    }
                }
            }
        }
        relaxed
    }

    /// Root store with every non-relaxed group pinned to its incumbent
    /// choice; `None` if pinning fails propagation.
    fn fix_outside(
        &self,
        incumbent: &Incumbent,
        relaxed: &[bool],
        deadline: Instant,
    ) -> Result<Option<Store<'a>>, Interrupt> {
        let mut store = self.root.clone();
        for (g, vars) in self.model.groups.iter().enumerate() {
            if relaxed[g] {
                continue;
            }
            if Instant::now() >= deadline {
                return Err(Interrupt::Deadline);
            }
            if let Some(&chosen) = vars.iter().find(|&&v| incumbent.values[v]) {
                if store.decide(chosen, true).is_err() {
                    return Ok(None);
                }
            }
        }
        Ok(Some(store))
    }
}
