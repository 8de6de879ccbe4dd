//! Depth-first branch and bound over a [`Store`].

use super::store::Store;
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Instant;
use tracing::trace;

/// State shared between portfolio workers: the best objective found by
/// anyone, and whether some worker has already closed the search.
#[derive(Debug)]
pub(crate) struct Shared {
    best: AtomicI64,
    proven: AtomicBool,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            best: AtomicI64::new(i64::MAX),
            proven: AtomicBool::new(false),
        }
    }

    /// Objective a new solution has to beat.
    pub(crate) fn bound(&self) -> i128 {
        self.best.load(Ordering::Relaxed) as i128
    }

    pub(crate) fn offer(&self, objective: i64) {
        self.best.fetch_min(objective, Ordering::Relaxed);
    }

    pub(crate) fn mark_proven(&self) {
        self.proven.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_proven(&self) -> bool {
        self.proven.load(Ordering::Relaxed)
    }
}

/// Objective as stored in the shared bound.
pub(crate) fn clamp_objective(objective: i128) -> i64 {
    i64::try_from(objective).unwrap_or(i64::MAX - 1)
}

/// A complete assignment and its objective.
#[derive(Debug, Clone)]
pub(crate) struct Incumbent {
    pub(crate) objective: i64,
    pub(crate) values: Vec<bool>,
}

/// Why a search stopped before exhausting its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupt {
    Deadline,
    NodeLimit,
    FirstSolution,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits {
    pub(crate) deadline: Instant,
    pub(crate) node_limit: u64,
    pub(crate) stop_after_first: bool,
}

/// Result of one search: `Ok` means the tree was exhausted.
#[derive(Debug)]
pub(crate) struct SearchOutcome {
    pub(crate) result: Result<(), Interrupt>,
    pub(crate) nodes: u64,
    pub(crate) incumbent: Option<Incumbent>,
}

enum Branch {
    Group(usize),
    Var(usize),
    Leaf,
}

pub(crate) struct Search<'a, 'r> {
    store: Store<'a>,
    shared: &'a Shared,
    limits: Limits,
    rng: &'r mut StdRng,
    randomize: bool,
    nodes: u64,
    incumbent: Option<Incumbent>,
}

impl<'a, 'r> Search<'a, 'r> {
    /// `randomize` breaks ties between equally bounded candidates at
    /// random instead of by position in their group.
    pub(crate) fn new(
        store: Store<'a>,
        shared: &'a Shared,
        limits: Limits,
        rng: &'r mut StdRng,
        randomize: bool,
    ) -> Self {
        Self {
            store,
            shared,
            limits,
            rng,
            randomize,
            nodes: 0,
            incumbent: None,
        }
    }

    pub(crate) fn run(mut self) -> SearchOutcome {
        let result = self.descend();
        SearchOutcome {
            result,
            nodes: self.nodes,
            incumbent: self.incumbent,
        }
    }

    fn tick(&mut self) -> Result<(), Interrupt> {
        self.nodes += 1;
        if self.nodes > self.limits.node_limit {
            return Err(Interrupt::NodeLimit);
        }
        self.check_clock()
    }

    /// Every node costs work proportional to the model, so the clock is
    /// read at each step that touches the whole store.
    fn check_clock(&self) -> Result<(), Interrupt> {
        if self.shared.is_proven() {
            return Err(Interrupt::Stopped);
        }
        if Instant::now() >= self.limits.deadline {
            return Err(Interrupt::Deadline);
        }
        Ok(())
    }

    fn descend(&mut self) -> Result<(), Interrupt> {
        self.tick()?;

        let bound = self.shared.bound();
        let lower = self.store.lower_bound();
        if lower >= bound {
            return Ok(());
        }
        self.check_clock()?;
        if self.store.fix_by_cost(lower, bound).is_err() {
            return Ok(());
        }

        match self.next_branch() {
            Branch::Group(group) => {
                for var in self.order_candidates(group)? {
                    self.try_branch(var, true)?;
                }
            }
            Branch::Var(var) => {
                let prefer_true = self.store.model().cost[var] < 0;
                self.try_branch(var, prefer_true)?;
                self.try_branch(var, !prefer_true)?;
            }
            Branch::Leaf => {
                let objective = self.store.lower_bound();
                self.record(objective)?;
            }
        }
        Ok(())
    }

    fn try_branch(&mut self, var: usize, value: bool) -> Result<(), Interrupt> {
        let mark = self.store.mark();
        let result = match self.store.decide(var, value) {
            Ok(()) => self.descend(),
            Err(_) => Ok(()),
        };
        self.store.undo_to(mark);
        result
    }

    /// Undecided exactly-one group with the fewest open candidates, then
    /// any open variable.
    fn next_branch(&self) -> Branch {
        let model = self.store.model();
        let mut best: Option<(usize, usize)> = None;
        for (group, vars) in model.groups.iter().enumerate() {
            if vars.iter().any(|&v| self.store.is_true(v)) {
                continue;
            }
            let open = vars.iter().filter(|&&v| self.store.value(v).is_none()).count();
            if best.is_none_or(|(count, _)| open < count) {
                best = Some((open, group));
            }
        }
        if let Some((_, group)) = best {
            return Branch::Group(group);
        }
        match (0..model.n_vars).find(|&v| self.store.value(v).is_none()) {
            Some(var) => Branch::Var(var),
            None => Branch::Leaf,
        }
    }

    /// Tries each open candidate and orders them by the resulting
    /// objective bound. Candidates that fail propagation are dropped.
    fn order_candidates(&mut self, group: usize) -> Result<Vec<usize>, Interrupt> {
        let model = self.store.model();
        let mut scored: Vec<(i128, u32, usize)> = Vec::with_capacity(model.groups[group].len());
        for (pos, &var) in model.groups[group].iter().enumerate() {
            if self.store.value(var).is_some() {
                continue;
            }
            self.check_clock()?;
            let mark = self.store.mark();
            if self.store.decide(var, true).is_ok() {
                let tie = if self.randomize {
                    self.rng.random::<u32>()
                } else {
                    pos as u32
                };
                scored.push((self.store.lower_bound(), tie, var));
            }
            self.store.undo_to(mark);
        }
        scored.sort_unstable();
        Ok(scored.into_iter().map(|(_, _, var)| var).collect())
    }

    fn record(&mut self, objective: i128) -> Result<(), Interrupt> {
        if objective >= self.shared.bound() {
            return Ok(());
        }
        let objective = clamp_objective(objective);
        self.shared.offer(objective);
        self.incumbent = Some(Incumbent {
            objective,
            values: self.store.snapshot(),
        });
        trace!(objective, nodes = self.nodes, "improving solution");
        if self.limits.stop_after_first {
            return Err(Interrupt::FirstSolution);
        }
        Ok(())
    }
}
