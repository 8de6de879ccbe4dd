//! Roster normalization.
//!
//! Reduces input records to the three attributes the team model uses
//! (lab, gender category, score) and gives every student a stable id.
//! With the `io` feature, rosters can be read from and teams written to CSV.

#[cfg(feature = "io")]
mod io;
mod types;

#[cfg(feature = "io")]
pub use io::{read_roster_csv, write_teams_csv, ColumnMap, RosterTable};
pub use types::{Gender, LabId, Roster, Student, StudentId, StudentRecord};
