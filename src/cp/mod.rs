//! Constraint Programming (CP) framework.
//!
//! Provides a domain-agnostic model for constrained optimization over
//! boolean decision variables, and a propagation-based solver for it.
//!
//! # Key Components
//!
//! - **Variables**: [`BoolVar`], addressed by [`VarId`]
//! - **Constraints**: [`Constraint`] — ExactlyOne, Linear, NotEqual
//! - **Objective**: [`Objective`] — linear terms plus weighted squares of
//!   linear expressions ([`SquaredTerm`])
//! - **Model**: [`CpModel`] — container for variables, constraints, objective
//! - **Solver**: [`CpSolver`] trait and the [`SearchSolver`] implementation;
//!   `HighsSolver` with the `highs` feature
//! - **Linear form**: [`MilpForm`], the model with `!=` and squares
//!   rewritten for MIP solvers
//!
//! # Design
//!
//! The model layer knows nothing about teams, labs or students; consumers
//! translate their domain into variables and constraints. [`SearchSolver`]
//! combines bound propagation, depth-first branch and bound, and large
//! neighbourhood search under a wall-clock limit. Other back ends can be
//! plugged in through [`CpSolver`].
//!
//! # References
//!
//! Rossi, van Beek & Walsh (2006), "Handbook of Constraint Programming"

#[cfg(feature = "highs")]
mod highs;
mod lns;
mod milp;
mod model;
mod search;
mod solver;
mod store;
mod variables;

#[cfg(feature = "highs")]
pub use highs::HighsSolver;
pub use milp::{MilpColumn, MilpForm, MilpRow};
pub use model::{Constraint, CpModel, ModelError, Objective};
pub use solver::{CpSolution, CpSolver, SearchSolver, SolverConfig, SolverStatus};
pub use variables::{BoolVar, SquaredTerm, Term, VarId};
