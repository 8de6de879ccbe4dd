//! CP model definition.

use super::variables::{BoolVar, SquaredTerm, Term, VarId};
use std::collections::HashMap;
use thiserror::Error;

/// A constraint in the CP model.
///
/// All constraints range over boolean variables with integer
/// coefficients. Domain-specific meaning (team capacity, balance, ...)
/// is attached by the consumer layer that builds the model.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Exactly one of the variables is true.
    ///
    /// Exactly-one groups double as the solver's branching decisions.
    ExactlyOne {
        /// Variables of the group, in preferred branching order.
        vars: Vec<VarId>,
    },

    /// Bounded linear constraint: `lo <= sum coef_i * x_i <= hi`.
    Linear {
        /// (variable, coefficient) pairs.
        terms: Vec<Term>,
        /// Lower bound (inclusive).
        lo: i64,
        /// Upper bound (inclusive).
        hi: i64,
    },

    /// Forbidden value: `sum coef_i * x_i != value`.
    NotEqual {
        /// (variable, coefficient) pairs.
        terms: Vec<Term>,
        /// The excluded value.
        value: i64,
    },
}

impl Constraint {
    /// Variables referenced by this constraint.
    pub fn vars(&self) -> Box<dyn Iterator<Item = VarId> + '_> {
        match self {
            Constraint::ExactlyOne { vars } => Box::new(vars.iter().copied()),
            Constraint::Linear { terms, .. } | Constraint::NotEqual { terms, .. } => {
                Box::new(terms.iter().map(|&(v, _)| v))
            }
        }
    }
}

/// Minimization objective: a linear part plus weighted squared expressions.
///
/// ```text
/// minimize  sum_i c_i * x_i  +  sum_k w_k * (sum_j a_kj * x_j)^2
/// ```
#[derive(Debug, Clone, Default)]
pub struct Objective {
    /// (variable, coefficient) pairs of the linear part.
    pub linear: Vec<Term>,
    /// Weighted squared expressions.
    pub squared: Vec<SquaredTerm>,
}

impl Objective {
    /// Creates an objective with only a linear part.
    pub fn minimize(linear: Vec<Term>) -> Self {
        Self {
            linear,
            squared: Vec::new(),
        }
    }

    /// Adds a weighted squared expression.
    pub fn with_squared(mut self, term: SquaredTerm) -> Self {
        self.squared.push(term);
        self
    }

    /// Evaluates the objective under a full assignment.
    pub fn evaluate(&self, values: &[bool]) -> i128 {
        let linear: i128 = self
            .linear
            .iter()
            .filter(|(v, _)| values[v.0])
            .map(|&(_, c)| c as i128)
            .sum();
        linear + self.squared.iter().map(|s| s.evaluate(values)).sum::<i128>()
    }
}

/// Structural problems detected by [`CpModel::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("constraint {constraint} references undefined variable #{var}")]
    UndefinedVariable { constraint: usize, var: usize },

    #[error("objective references undefined variable #{0}")]
    UndefinedObjectiveVariable(usize),

    #[error("constraint {constraint}: lower bound {lo} exceeds upper bound {hi}")]
    EmptyRange { constraint: usize, lo: i64, hi: i64 },

    #[error("squared objective term has negative weight {0}")]
    NegativeWeight(i64),

    #[error("duplicate variable name: {0}")]
    DuplicateName(String),

    #[error("solution hint has {got} values for {expected} variables")]
    HintLength { expected: usize, got: usize },
}

/// A constraint programming model over boolean variables.
///
/// # Examples
///
/// ```
/// use team_former::cp::{CpModel, Objective};
///
/// let mut model = CpModel::new("example");
/// let a = model.new_bool_var("a");
/// let b = model.new_bool_var("b");
/// model.add_exactly_one(vec![a, b]);
/// model.set_objective(Objective::minimize(vec![(a, 3), (b, 1)]));
/// assert!(model.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct CpModel {
    /// Model name.
    pub name: String,
    /// Boolean variables, indexed by [`VarId`].
    pub bool_vars: Vec<BoolVar>,
    /// Constraints.
    pub constraints: Vec<Constraint>,
    /// Objective function.
    pub objective: Option<Objective>,
    /// Complete starting assignment, indexed by [`VarId`].
    pub hint: Option<Vec<bool>>,
    names: HashMap<String, VarId>,
}

impl CpModel {
    /// Creates a new empty model.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bool_vars: Vec::new(),
            constraints: Vec::new(),
            objective: None,
            hint: None,
            names: HashMap::new(),
        }
    }

    /// Adds a boolean variable and returns its handle.
    pub fn add_bool_var(&mut self, var: BoolVar) -> VarId {
        let id = VarId(self.bool_vars.len());
        self.names.entry(var.name.clone()).or_insert(id);
        self.bool_vars.push(var);
        id
    }

    /// Convenience: add a free boolean variable.
    pub fn new_bool_var(&mut self, name: impl Into<String>) -> VarId {
        self.add_bool_var(BoolVar::new(name))
    }

    /// Looks up a variable by name.
    pub fn var(&self, name: &str) -> Option<VarId> {
        self.names.get(name).copied()
    }

    /// Name of a variable.
    pub fn name_of(&self, var: VarId) -> Option<&str> {
        self.bool_vars.get(var.0).map(|v| v.name.as_str())
    }

    /// Convenience: add an exactly-one constraint.
    pub fn add_exactly_one(&mut self, vars: Vec<VarId>) {
        self.constraints.push(Constraint::ExactlyOne { vars });
    }

    /// Convenience: add `lo <= sum terms <= hi`.
    pub fn add_linear(&mut self, terms: Vec<Term>, lo: i64, hi: i64) {
        self.constraints.push(Constraint::Linear { terms, lo, hi });
    }

    /// Convenience: add `sum terms != value`.
    pub fn add_not_equal(&mut self, terms: Vec<Term>, value: i64) {
        self.constraints.push(Constraint::NotEqual { terms, value });
    }

    /// Sets the objective function.
    pub fn set_objective(&mut self, objective: Objective) {
        self.objective = Some(objective);
    }

    /// Sets a complete starting assignment.
    ///
    /// Solvers start from the hint when it satisfies the model and ignore
    /// it otherwise, so a hint can only improve the first incumbent.
    pub fn set_hint(&mut self, values: Vec<bool>) {
        self.hint = Some(values);
    }

    /// The hint, if it satisfies every constraint.
    pub fn feasible_hint(&self) -> Option<&[bool]> {
        self.hint
            .as_deref()
            .filter(|values| self.is_satisfied_by(values))
    }

    /// Objective value of a full assignment; zero without an objective.
    pub fn evaluate(&self, values: &[bool]) -> i128 {
        self.objective
            .as_ref()
            .map_or(0, |objective| objective.evaluate(values))
    }

    /// Validates the model for consistency.
    ///
    /// Checks that all referenced variables exist, that linear ranges are
    /// non-empty, that squared weights are non-negative, that variable
    /// names are unique and that a hint covers every variable.
    pub fn validate(&self) -> Result<(), ModelError> {
        let n = self.bool_vars.len();
        if self.names.len() != n {
            let mut seen = HashMap::new();
            for var in &self.bool_vars {
                if seen.insert(var.name.as_str(), ()).is_some() {
                    return Err(ModelError::DuplicateName(var.name.clone()));
                }
            }
        }

        for (idx, constraint) in self.constraints.iter().enumerate() {
            if let Some(v) = constraint.vars().find(|v| v.0 >= n) {
                return Err(ModelError::UndefinedVariable {
                    constraint: idx,
                    var: v.0,
                });
            }
            if let Constraint::Linear { lo, hi, .. } = constraint {
                if lo > hi {
                    return Err(ModelError::EmptyRange {
                        constraint: idx,
                        lo: *lo,
                        hi: *hi,
                    });
                }
            }
        }

        if let Some(objective) = &self.objective {
            let referenced = objective
                .linear
                .iter()
                .chain(objective.squared.iter().flat_map(|s| s.terms.iter()));
            for &(v, _) in referenced {
                if v.0 >= n {
                    return Err(ModelError::UndefinedObjectiveVariable(v.0));
                }
            }
            if let Some(s) = objective.squared.iter().find(|s| s.weight < 0) {
                return Err(ModelError::NegativeWeight(s.weight));
            }
        }
        if let Some(hint) = &self.hint {
            if hint.len() != n {
                return Err(ModelError::HintLength {
                    expected: n,
                    got: hint.len(),
                });
            }
        }
        Ok(())
    }

    /// Returns the number of boolean variables.
    pub fn var_count(&self) -> usize {
        self.bool_vars.len()
    }

    /// Returns the number of constraints.
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Checks a full assignment against every constraint.
    pub fn is_satisfied_by(&self, values: &[bool]) -> bool {
        if values.len() != self.bool_vars.len() {
            return false;
        }
        let fixed_ok = self
            .bool_vars
            .iter()
            .zip(values)
            .all(|(var, &val)| var.fixed.is_none_or(|f| f == val));
        fixed_ok
            && self.constraints.iter().all(|c| match c {
                Constraint::ExactlyOne { vars } => {
                    vars.iter().filter(|v| values[v.0]).count() == 1
                }
                Constraint::Linear { terms, lo, hi } => {
                    let act = activity(terms, values);
                    *lo <= act && act <= *hi
                }
                Constraint::NotEqual { terms, value } => activity(terms, values) != *value,
            })
    }
}

fn activity(terms: &[Term], values: &[bool]) -> i64 {
    terms
        .iter()
        .filter(|(v, _)| values[v.0])
        .map(|&(_, c)| c)
        .sum()
}
