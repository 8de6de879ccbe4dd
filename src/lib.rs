//! Constraint-based team formation.
//!
//! Splits a class into the fewest teams that satisfy hard rules, then
//! balances the teams' scores:
//!
//! - every team stays within one lab,
//! - team sizes lie in `[min_team_size, max_team_size]`,
//! - no team has exactly one member of the `M` or of the `F` category,
//! - team numbers come from the shared pool `1..=max_teams`.
//!
//! Among allocations with the fewest teams, the preferred one minimizes
//! the sum over teams of `(score_sum - size * class_mean)^2`, weighted by
//! `wam_weight`.
//!
//! # Modules
//!
//! - [`roster`]: normalized students (lab, gender category, score) and,
//!   with the `io` feature, CSV ingestion and export.
//! - [`teams`]: bounds, per-lab model building, objective composition,
//!   solving and result extraction, behind [`teams::TeamFormer`].
//! - [`cp`]: the domain-agnostic boolean CP model, its
//!   propagation-based branch-and-bound solver, and its linear form for
//!   the HiGHS back end (`highs` feature).
//! - [`error`]: configuration, roster and formation errors.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use team_former::roster::{Roster, StudentRecord};
//! use team_former::teams::{Bounds, TeamFormer};
//!
//! let roster = Roster::new(vec![
//!     StudentRecord::new("1", "M", 70.0),
//!     StudentRecord::new("1", "M", 64.0),
//!     StudentRecord::new("1", "F", 81.0),
//!     StudentRecord::new("1", "F", 59.0),
//!     StudentRecord::new("1", "x", 75.0),
//!     StudentRecord::new("1", "x", 66.0),
//! ])
//! .unwrap();
//! let bounds = Bounds::for_roster(&roster, 3, 4).with_max_solve_time(Duration::from_secs(5));
//!
//! let formation = TeamFormer::new(bounds).form(&roster).unwrap();
//! let assignment = formation.assignment().unwrap();
//! assert_eq!(assignment.len(), 6);
//! assert_eq!(assignment.team_count(), 2);
//! ```

pub mod cp;
pub mod error;
pub mod roster;
pub mod teams;
