//! Error types.
//!
//! Infeasible labs and exhausted time budgets are not errors: they come
//! back as [`LabOutcome`](crate::teams::LabOutcome) values so that the
//! labs that did solve stay usable.

use crate::roster::{LabId, StudentId};
use thiserror::Error;

/// Inconsistent [`Bounds`](crate::teams::Bounds), detected before any
/// model is built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("team sizes must be positive (min_team_size = {min}, max_team_size = {max})")]
    ZeroTeamSize { min: usize, max: usize },

    #[error("max_team_size ({max}) is smaller than min_team_size ({min})")]
    MaxBelowMin { min: usize, max: usize },

    #[error("max_teams must be positive")]
    ZeroTeamPool,

    #[error("wam_weight must be a finite non-negative number, got {0}")]
    InvalidWeight(f64),

    #[error("max_solve_time must be positive")]
    ZeroSolveTime,

    #[error("objective coefficients for lab {lab} overflow; lower wam_weight or rescale scores")]
    ObjectiveOverflow { lab: LabId },
}

/// Problems with the input roster.
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("roster is empty")]
    Empty,

    #[error("row {row}: lab label is empty")]
    EmptyLab { row: usize },

    #[error("row {row}: score {score} is not a finite number")]
    NonFiniteScore { row: usize, score: f64 },

    #[error("duplicate student id {0}")]
    DuplicateId(StudentId),

    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("row {row}: cannot parse score '{value}'")]
    InvalidScore { row: usize, value: String },

    #[cfg(feature = "io")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of a formation run that are not per-lab outcomes.
#[derive(Debug, Error)]
pub enum FormationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("solver rejected the model built for lab {lab}")]
    InvalidModel { lab: LabId },

    #[error("inconsistent solution for lab {lab}: student {student} placed in {placements} teams")]
    Inconsistent {
        lab: LabId,
        student: StudentId,
        placements: usize,
    },

    #[error("lab {0} is not in the roster")]
    UnknownLab(LabId),
}
