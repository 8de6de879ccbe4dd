//! Mixed-integer linear form of a [`CpModel`].
//!
//! LP-based back ends cannot take `!=` constraints or squared objective
//! terms directly. This module rewrites them with auxiliary columns:
//!
//! - `sum a_i x_i != v` gets a binary side selector `z`, with
//!   `sum a_i x_i <= v - 1` when `z = 0` and `sum a_i x_i >= v + 1`
//!   when `z = 1` (big-M taken from the expression's range).
//! - `w * (sum a_i x_i)^2` becomes `w * u` with a continuous `u >= 0`
//!   and `u >= +-sum a_i x_i`, i.e. the absolute value of the expression.
//!
//! Model variables keep their indices: column `i` is [`VarId`] `i`, and
//! auxiliary columns follow.
//!
//! [`VarId`]: super::VarId

use super::model::{Constraint, CpModel};
use super::variables::Term;

/// One column of the linear program.
#[derive(Debug, Clone, PartialEq)]
pub struct MilpColumn {
    pub lower: f64,
    pub upper: f64,
    /// Objective coefficient.
    pub cost: f64,
    pub integer: bool,
}

/// One row: `lower <= sum coef * column <= upper`.
#[derive(Debug, Clone, PartialEq)]
pub struct MilpRow {
    pub lower: f64,
    pub upper: f64,
    pub factors: Vec<(usize, f64)>,
}

#[derive(Debug, Clone)]
enum Aux {
    /// Side selector of a `!=` constraint.
    Side { terms: Vec<Term>, value: i64 },
    /// Absolute value of a squared objective expression.
    Magnitude { terms: Vec<Term> },
}

/// A [`CpModel`] rewritten as a minimization MILP.
#[derive(Debug, Clone)]
pub struct MilpForm {
    pub columns: Vec<MilpColumn>,
    pub rows: Vec<MilpRow>,
    model_vars: usize,
    aux: Vec<Aux>,
}

fn activity(terms: &[Term], values: &[bool]) -> i64 {
    terms
        .iter()
        .filter(|(v, _)| values[v.index()])
        .map(|&(_, c)| c)
        .sum()
}

fn range(terms: &[Term]) -> (i64, i64) {
    terms.iter().fold((0, 0), |(lo, hi), &(_, c)| {
        if c < 0 {
            (lo + c, hi)
        } else {
            (lo, hi + c)
        }
    })
}

fn factors(terms: &[Term]) -> Vec<(usize, f64)> {
    terms.iter().map(|&(v, c)| (v.index(), c as f64)).collect()
}

impl MilpForm {
    pub fn from_model(model: &CpModel) -> Self {
        let mut columns: Vec<MilpColumn> = model
            .bool_vars
            .iter()
            .map(|var| {
                let (lower, upper) = match var.fixed {
                    Some(value) => (f64::from(u8::from(value)), f64::from(u8::from(value))),
                    None => (0.0, 1.0),
                };
                MilpColumn {
                    lower,
                    upper,
                    cost: 0.0,
                    integer: true,
                }
            })
            .collect();
        let mut rows = Vec::with_capacity(model.constraint_count());
        let mut aux = Vec::new();

        for constraint in &model.constraints {
            match constraint {
                Constraint::ExactlyOne { vars } => rows.push(MilpRow {
                    lower: 1.0,
                    upper: 1.0,
                    factors: vars.iter().map(|v| (v.index(), 1.0)).collect(),
                }),
                Constraint::Linear { terms, lo, hi } => rows.push(MilpRow {
                    lower: *lo as f64,
                    upper: *hi as f64,
                    factors: factors(terms),
                }),
                Constraint::NotEqual { terms, value } => {
                    let (min, max) = range(terms);
                    if *value < min || *value > max {
                        continue;
                    }
                    let side = columns.len();
                    columns.push(MilpColumn {
                        lower: 0.0,
                        upper: 1.0,
                        cost: 0.0,
                        integer: true,
                    });
                    // side = 0: activity <= value - 1
                    let mut below = factors(terms);
                    below.push((side, -((max - value + 1) as f64)));
                    rows.push(MilpRow {
                        lower: f64::NEG_INFINITY,
                        upper: (value - 1) as f64,
                        factors: below,
                    });
                    // side = 1: activity >= value + 1
                    let mut above = factors(terms);
                    above.push((side, -((value + 1 - min) as f64)));
                    rows.push(MilpRow {
                        lower: min as f64,
                        upper: f64::INFINITY,
                        factors: above,
                    });
                    aux.push(Aux::Side {
                        terms: terms.clone(),
                        value: *value,
                    });
                }
            }
        }

        if let Some(objective) = &model.objective {
            for &(v, c) in &objective.linear {
                columns[v.index()].cost += c as f64;
            }
            for term in &objective.squared {
                if term.weight == 0 || term.terms.is_empty() {
                    continue;
                }
                let magnitude = columns.len();
                columns.push(MilpColumn {
                    lower: 0.0,
                    upper: f64::INFINITY,
                    cost: term.weight as f64,
                    integer: false,
                });
                for sign in [1.0, -1.0] {
                    let mut row: Vec<(usize, f64)> = term
                        .terms
                        .iter()
                        .map(|&(v, c)| (v.index(), -sign * c as f64))
                        .collect();
                    row.push((magnitude, 1.0));
                    rows.push(MilpRow {
                        lower: 0.0,
                        upper: f64::INFINITY,
                        factors: row,
                    });
                }
                aux.push(Aux::Magnitude {
                    terms: term.terms.clone(),
                });
            }
        }

        Self {
            columns,
            rows,
            model_vars: model.var_count(),
            aux,
        }
    }

    /// Column values for a full model assignment, auxiliary columns
    /// included. Used to hand a starting solution to a back end.
    pub fn extend(&self, values: &[bool]) -> Vec<f64> {
        let mut columns: Vec<f64> = values.iter().map(|&v| f64::from(u8::from(v))).collect();
        for aux in &self.aux {
            columns.push(match aux {
                Aux::Side { terms, value } => f64::from(u8::from(activity(terms, values) > *value)),
                Aux::Magnitude { terms } => activity(terms, values).unsigned_abs() as f64,
            });
        }
        columns
    }

    /// Model assignment read back from column values.
    pub fn read_back(&self, columns: &[f64]) -> Vec<bool> {
        (0..self.model_vars)
            .map(|i| columns.get(i).is_some_and(|&x| x > 0.5))
            .collect()
    }

    /// Whether column values satisfy every row within `tolerance`.
    pub fn satisfies(&self, columns: &[f64], tolerance: f64) -> bool {
        columns.len() == self.columns.len()
            && self.columns.iter().zip(columns).all(|(col, &x)| {
                x >= col.lower - tolerance && x <= col.upper + tolerance
            })
            && self.rows.iter().all(|row| {
                let act: f64 = row.factors.iter().map(|&(c, a)| a * columns[c]).sum();
                act >= row.lower - tolerance && act <= row.upper + tolerance
            })
    }

    /// Objective value of column values.
    pub fn cost(&self, columns: &[f64]) -> f64 {
        self.columns.iter().zip(columns).map(|(col, &x)| col.cost * x).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cp::{BoolVar, Objective, SquaredTerm};

    /// Every assignment of three variables.
    fn all_assignments() -> Vec<Vec<bool>> {
        (0..8u8)
            .map(|bits| (0..3).map(|i| bits & (1 << i) != 0).collect())
            .collect()
    }

    #[test]
    fn test_not_equal_rows_match_the_constraint() {
        let mut model = CpModel::new("ne");
        let a = model.new_bool_var("a");
        let b = model.new_bool_var("b");
        let c = model.new_bool_var("c");
        model.add_not_equal(vec![(a, 1), (b, 1), (c, 1)], 1);
        let form = MilpForm::from_model(&model);
        assert_eq!(form.columns.len(), 4);
        assert_eq!(form.rows.len(), 2);

        for values in all_assignments() {
            let extended = form.extend(&values);
            assert_eq!(form.satisfies(&extended, 1e-9), model.is_satisfied_by(&values));
            // No choice of the selector rescues a forbidden assignment.
            let mut flipped = extended.clone();
            flipped[3] = 1.0 - flipped[3];
            if !model.is_satisfied_by(&values) {
                assert!(!form.satisfies(&flipped, 1e-9));
            }
        }
    }

    #[test]
    fn test_unreachable_not_equal_adds_nothing() {
        let mut model = CpModel::new("ne");
        let a = model.new_bool_var("a");
        model.add_not_equal(vec![(a, 1)], 5);
        let form = MilpForm::from_model(&model);
        assert_eq!(form.columns.len(), 1);
        assert!(form.rows.is_empty());
    }

    #[test]
    fn test_squared_term_becomes_magnitude() {
        let mut model = CpModel::new("abs");
        let a = model.new_bool_var("a");
        let b = model.new_bool_var("b");
        model.add_bool_var(BoolVar::fixed("c", true));
        model.set_objective(
            Objective::minimize(vec![(a, 10)])
                .with_squared(SquaredTerm::new(3, vec![(a, 2), (b, -5)])),
        );
        let form = MilpForm::from_model(&model);
        assert_eq!(form.columns[2].lower, 1.0);
        assert_eq!(form.columns[2].upper, 1.0);
        assert!(!form.columns[3].integer);

        let values = [true, true, true];
        let extended = form.extend(&values);
        // |2 - 5| = 3
        assert_eq!(extended[3], 3.0);
        assert!(form.satisfies(&extended, 1e-9));
        assert_eq!(form.cost(&extended), 10.0 + 3.0 * 3.0);
        assert_eq!(form.read_back(&extended), values.to_vec());

        // The magnitude cannot undercut the expression.
        let mut short = extended;
        short[3] = 2.0;
        assert!(!form.satisfies(&short, 1e-9));
    }

    #[test]
    fn test_read_back_rounds() {
        let mut model = CpModel::new("round");
        model.new_bool_var("a");
        model.new_bool_var("b");
        let form = MilpForm::from_model(&model);
        assert_eq!(form.read_back(&[0.9999, 1e-7]), vec![true, false]);
        assert_eq!(form.read_back(&[]), vec![false, false]);
    }
}
