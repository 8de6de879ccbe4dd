//! Team formation.
//!
//! A roster is split by lab. For each lab the [`ModelBuilder`] emits a CP
//! model over "student `s` sits in slot `t`" and "slot `t` is used"
//! booleans (with a constructive [`greedy_teams`] hint), the
//! [`ObjectiveComposer`] adds a lexicographic objective
//! (fewest teams, then balanced score sums), the engine solves it within
//! the lab's share of the time budget, and the extractor reads the teams
//! back.
//!
//! Labs succeed or fail independently: a [`Formation`] carries one
//! [`LabOutcome`] per lab, and [`Formation::assignment`] yields the full
//! student-to-team mapping only when every lab was allocated.

mod bounds;
mod builder;
mod engine;
mod extract;
mod former;
mod greedy;
mod objective;
mod types;

pub use bounds::{
    Bounds, DEFAULT_MAX_SOLVE_TIME, DEFAULT_MAX_TEAM_SIZE, DEFAULT_MIN_TEAM_SIZE,
    DEFAULT_WAM_WEIGHT,
};
pub use builder::{allocate_slots, diagnose, LabModel, LabPlan, ModelBuilder, SlotRange};
pub use engine::{translate_status, Engine, TimeShare};
pub use extract::{extract_solution, solver_failure};
pub use former::{TeamFormer, DEFAULT_SEED};
pub use greedy::greedy_teams;
pub use objective::{ObjectiveComposer, ObjectiveWeights, SCORE_SCALE, WEIGHT_SCALE};
pub use types::{
    Assignment, Diagnosis, Formation, FormationFailure, LabFailure, LabOutcome, LabSolution,
    SolveStatus, Team,
};
