//! Compiled constraints and the trail-based domain store.
//!
//! The public [`CpModel`] is name-oriented and convenient to build; the
//! search works on this flattened, index-based form instead.

use super::model::{Constraint, CpModel};
use std::collections::VecDeque;

/// Raised when propagation empties a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Conflict;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Kind {
    Linear { lo: i64, hi: i64 },
    NotEqual { value: i64 },
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledConstraint {
    pub(crate) kind: Kind,
    pub(crate) terms: Vec<(usize, i64)>,
}

/// Index-based view of a [`CpModel`].
#[derive(Debug, Clone)]
pub(crate) struct Compiled {
    pub(crate) n_vars: usize,
    pub(crate) fixed: Vec<Option<bool>>,
    pub(crate) constraints: Vec<CompiledConstraint>,
    /// Constraints each variable appears in.
    pub(crate) watches: Vec<Vec<usize>>,
    /// Exactly-one groups, the branching decisions.
    pub(crate) groups: Vec<Vec<usize>>,
    /// Linear objective coefficient per variable.
    pub(crate) cost: Vec<i64>,
    /// Weighted squared objective expressions.
    pub(crate) squared: Vec<(i64, Vec<(usize, i64)>)>,
}

impl Compiled {
    pub(crate) fn new(model: &CpModel) -> Self {
        let n_vars = model.var_count();
        let mut constraints = Vec::with_capacity(model.constraint_count());
        let mut groups = Vec::new();

        for constraint in &model.constraints {
            match constraint {
                Constraint::ExactlyOne { vars } => {
                    let vars: Vec<usize> = vars.iter().map(|v| v.0).collect();
                    constraints.push(CompiledConstraint {
                        kind: Kind::Linear { lo: 1, hi: 1 },
                        terms: vars.iter().map(|&v| (v, 1)).collect(),
                    });
                    groups.push(vars);
                }
                Constraint::Linear { terms, lo, hi } => constraints.push(CompiledConstraint {
                    kind: Kind::Linear { lo: *lo, hi: *hi },
                    terms: terms.iter().map(|&(v, c)| (v.0, c)).collect(),
                }),
                Constraint::NotEqual { terms, value } => constraints.push(CompiledConstraint {
                    kind: Kind::NotEqual { value: *value },
                    terms: terms.iter().map(|&(v, c)| (v.0, c)).collect(),
                }),
            }
        }

        let mut watches = vec![Vec::new(); n_vars];
        for (idx, c) in constraints.iter().enumerate() {
            for &(v, _) in &c.terms {
                if watches[v].last() != Some(&idx) {
                    watches[v].push(idx);
                }
            }
        }

        let mut cost = vec![0i64; n_vars];
        let mut squared = Vec::new();
        if let Some(objective) = &model.objective {
            for &(v, c) in &objective.linear {
                cost[v.0] = cost[v.0].saturating_add(c);
            }
            for term in &objective.squared {
                if term.weight > 0 && !term.terms.is_empty() {
                    squared.push((term.weight, term.terms.iter().map(|&(v, c)| (v.0, c)).collect()));
                }
            }
        }

        Self {
            n_vars,
            fixed: model.bool_vars.iter().map(|v| v.fixed).collect(),
            constraints,
            watches,
            groups,
            cost,
            squared,
        }
    }
}

/// Partial assignment with an undo trail and a propagation queue.
#[derive(Debug, Clone)]
pub(crate) struct Store<'m> {
    model: &'m Compiled,
    values: Vec<Option<bool>>,
    trail: Vec<usize>,
    queue: VecDeque<usize>,
    queued: Vec<bool>,
}

impl<'m> Store<'m> {
    pub(crate) fn new(model: &'m Compiled) -> Self {
        Self {
            model,
            values: vec![None; model.n_vars],
            trail: Vec::with_capacity(model.n_vars),
            queue: VecDeque::new(),
            queued: vec![false; model.constraints.len()],
        }
    }

    pub(crate) fn model(&self) -> &'m Compiled {
        self.model
    }

    /// Applies fixed variables and runs every constraint once.
    pub(crate) fn propagate_root(&mut self) -> Result<(), Conflict> {
        for v in 0..self.model.n_vars {
            if let Some(val) = self.model.fixed[v] {
                self.assign(v, val)?;
            }
        }
        for idx in 0..self.model.constraints.len() {
            self.enqueue(idx);
        }
        self.propagate()
    }

    pub(crate) fn value(&self, var: usize) -> Option<bool> {
        self.values[var]
    }

    pub(crate) fn mark(&self) -> usize {
        self.trail.len()
    }

    pub(crate) fn undo_to(&mut self, mark: usize) {
        while self.trail.len() > mark {
            if let Some(v) = self.trail.pop() {
                self.values[v] = None;
            }
        }
    }

    /// Assigns a variable and propagates to fixpoint.
    pub(crate) fn decide(&mut self, var: usize, value: bool) -> Result<(), Conflict> {
        self.assign(var, value)?;
        self.propagate()
    }

    fn assign(&mut self, var: usize, value: bool) -> Result<(), Conflict> {
        match self.values[var] {
            Some(current) if current == value => Ok(()),
            Some(_) => Err(Conflict),
            None => {
                self.values[var] = Some(value);
                self.trail.push(var);
                let model = self.model;
                for &idx in &model.watches[var] {
                    self.enqueue(idx);
                }
                Ok(())
            }
        }
    }

    fn enqueue(&mut self, idx: usize) {
        if !self.queued[idx] {
            self.queued[idx] = true;
            self.queue.push_back(idx);
        }
    }

    pub(crate) fn propagate(&mut self) -> Result<(), Conflict> {
        while let Some(idx) = self.queue.pop_front() {
            self.queued[idx] = false;
            if let Err(conflict) = self.propagate_constraint(idx) {
                for stale in self.queue.drain(..) {
                    self.queued[stale] = false;
                }
                return Err(conflict);
            }
        }
        Ok(())
    }

    fn propagate_constraint(&mut self, idx: usize) -> Result<(), Conflict> {
        let model = self.model;
        let constraint = &model.constraints[idx];
        match constraint.kind {
            Kind::Linear { lo, hi } => self.propagate_linear(&constraint.terms, lo, hi),
            Kind::NotEqual { value } => self.propagate_not_equal(&constraint.terms, value),
        }
    }

    fn propagate_linear(&mut self, terms: &[(usize, i64)], lo: i64, hi: i64) -> Result<(), Conflict> {
        let (mut min, mut max) = (0i64, 0i64);
        for &(v, a) in terms {
            match self.values[v] {
                Some(true) => {
                    min += a;
                    max += a;
                }
                Some(false) => {}
                None if a > 0 => max += a,
                None => min += a,
            }
        }
        if max < lo || min > hi {
            return Err(Conflict);
        }

        for &(v, a) in terms {
            if self.values[v].is_some() || a == 0 {
                continue;
            }
            if a > 0 {
                if min + a > hi {
                    self.assign(v, false)?;
                } else if max - a < lo {
                    self.assign(v, true)?;
                }
            } else if min - a > hi {
                self.assign(v, true)?;
            } else if max + a < lo {
                self.assign(v, false)?;
            }
        }
        Ok(())
    }

    fn propagate_not_equal(&mut self, terms: &[(usize, i64)], value: i64) -> Result<(), Conflict> {
        let mut fixed_sum = 0i64;
        let mut open = None;
        let mut open_count = 0usize;
        for &(v, a) in terms {
            match self.values[v] {
                Some(true) => fixed_sum += a,
                Some(false) => {}
                None if a == 0 => {}
                None => {
                    open_count += 1;
                    open = Some((v, a));
                }
            }
        }
        match (open_count, open) {
            (0, _) if fixed_sum == value => Err(Conflict),
            (1, Some((v, a))) => {
                if fixed_sum == value {
                    self.assign(v, true)
                } else if fixed_sum + a == value {
                    self.assign(v, false)
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    /// Lower bound of the objective over all completions of this store.
    ///
    /// Exact once every variable is assigned.
    pub(crate) fn lower_bound(&self) -> i128 {
        let mut bound = 0i128;
        for (v, &c) in self.model.cost.iter().enumerate() {
            match self.values[v] {
                Some(true) => bound += c as i128,
                None if c < 0 => bound += c as i128,
                _ => {}
            }
        }
        for (weight, terms) in &self.model.squared {
            let (mut fixed, mut neg, mut pos) = (0i128, 0i128, 0i128);
            for &(v, a) in terms {
                match self.values[v] {
                    Some(true) => fixed += a as i128,
                    Some(false) => {}
                    None if a < 0 => neg += a as i128,
                    None => pos += a as i128,
                }
            }
            let (low, high) = (fixed + neg, fixed + pos);
            let nearest = if low > 0 {
                low
            } else if high < 0 {
                high
            } else {
                0
            };
            bound += *weight as i128 * nearest * nearest;
        }
        bound
    }

    /// Fixes to false every open variable whose linear cost alone would
    /// lift the bound to `cutoff` or beyond, then propagates.
    pub(crate) fn fix_by_cost(&mut self, lower_bound: i128, cutoff: i128) -> Result<(), Conflict> {
        let mut changed = false;
        for v in 0..self.model.n_vars {
            let c = self.model.cost[v];
            if c > 0 && self.values[v].is_none() && lower_bound + c as i128 >= cutoff {
                self.assign(v, false)?;
                changed = true;
            }
        }
        if changed {
            self.propagate()?;
        }
        Ok(())
    }

    pub(crate) fn is_true(&self, var: usize) -> bool {
        self.values[var] == Some(true)
    }

    /// Snapshot of the assignment; open variables read as `false`.
    pub(crate) fn snapshot(&self) -> Vec<bool> {
        self.values.iter().map(|v| v.unwrap_or(false)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cp::{CpModel, Objective, SquaredTerm};

    fn pair_model() -> CpModel {
        let mut model = CpModel::new("pair");
        let a = model.new_bool_var("a");
        let b = model.new_bool_var("b");
        let c = model.new_bool_var("c");
        model.add_exactly_one(vec![a, b, c]);
        model
    }

    #[test]
    fn test_exactly_one_forces_last_candidate() {
        let model = pair_model();
        let compiled = Compiled::new(&model);
        let mut store = Store::new(&compiled);
        store.propagate_root().unwrap();

        store.decide(0, false).unwrap();
        store.decide(1, false).unwrap();
        assert_eq!(store.value(2), Some(true));
    }

    #[test]
    fn test_exactly_one_clears_others() {
        let model = pair_model();
        let compiled = Compiled::new(&model);
        let mut store = Store::new(&compiled);
        store.propagate_root().unwrap();

        store.decide(1, true).unwrap();
        assert_eq!(store.value(0), Some(false));
        assert_eq!(store.value(2), Some(false));
        assert!(store.decide(0, true).is_err());
    }

    #[test]
    fn test_undo_restores_domains() {
        let model = pair_model();
        let compiled = Compiled::new(&model);
        let mut store = Store::new(&compiled);
        store.propagate_root().unwrap();

        let mark = store.mark();
        store.decide(0, true).unwrap();
        store.undo_to(mark);
        assert!((0..3).all(|v| store.value(v).is_none()));
    }

    #[test]
    fn test_linkage_with_negative_coefficient() {
        // x1 + x2 - 2y in [0, 0]  (y iff both x)
        let mut model = CpModel::new("link");
        let x1 = model.new_bool_var("x1");
        let x2 = model.new_bool_var("x2");
        let y = model.new_bool_var("y");
        model.add_linear(vec![(x1, 1), (x2, 1), (y, -2)], 0, 0);
        let compiled = Compiled::new(&model);
        let mut store = Store::new(&compiled);
        store.propagate_root().unwrap();

        store.decide(x1.index(), true).unwrap();
        assert_eq!(store.value(y.index()), Some(true));
        assert_eq!(store.value(x2.index()), Some(true));
    }

    #[test]
    fn test_not_equal_forces_partner() {
        // a + b != 1
        let mut model = CpModel::new("ne");
        let a = model.new_bool_var("a");
        let b = model.new_bool_var("b");
        model.add_not_equal(vec![(a, 1), (b, 1)], 1);
        let compiled = Compiled::new(&model);
        let mut store = Store::new(&compiled);
        store.propagate_root().unwrap();

        store.decide(a.index(), true).unwrap();
        assert_eq!(store.value(b.index()), Some(true));

        let mut store = Store::new(&compiled);
        store.propagate_root().unwrap();
        store.decide(a.index(), false).unwrap();
        assert_eq!(store.value(b.index()), Some(false));
    }

    #[test]
    fn test_root_conflict() {
        let mut model = CpModel::new("empty");
        model.add_exactly_one(Vec::new());
        let compiled = Compiled::new(&model);
        let mut store = Store::new(&compiled);
        assert!(store.propagate_root().is_err());
    }

    #[test]
    fn test_lower_bound_and_cost_fixing() {
        let mut model = CpModel::new("lb");
        let a = model.new_bool_var("a");
        let b = model.new_bool_var("b");
        model.set_objective(
            Objective::minimize(vec![(a, 10)])
                .with_squared(SquaredTerm::new(1, vec![(a, 3), (b, 2)])),
        );
        let compiled = Compiled::new(&model);
        let mut store = Store::new(&compiled);
        store.propagate_root().unwrap();
        assert_eq!(store.lower_bound(), 0);

        store.decide(b.index(), true).unwrap();
        // b fixed: squared inner in [2, 5] -> at least 4
        assert_eq!(store.lower_bound(), 4);

        let lb = store.lower_bound();
        store.fix_by_cost(lb, 12).unwrap();
        assert_eq!(store.value(a.index()), Some(false));
        assert_eq!(store.lower_bound(), 4);
    }
}
