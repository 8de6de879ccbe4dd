//! Formation results.

use crate::roster::{Gender, LabId, StudentId};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Terminal outcome of one solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SolveStatus {
    /// Proven best assignment.
    Optimal,
    /// Valid assignment found within the time budget; optimality unproven.
    Feasible,
    /// Proven that no valid assignment exists.
    Infeasible,
    /// Time budget exhausted before any valid assignment was found.
    TimeoutNoSolution,
}

impl SolveStatus {
    pub fn is_success(self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SolveStatus::Optimal => "optimal",
            SolveStatus::Feasible => "feasible",
            SolveStatus::Infeasible => "infeasible",
            SolveStatus::TimeoutNoSolution => "timeout_no_solution",
        }
    }

    fn severity(self) -> u8 {
        match self {
            SolveStatus::Optimal => 0,
            SolveStatus::Feasible => 1,
            SolveStatus::TimeoutNoSolution => 2,
            SolveStatus::Infeasible => 3,
        }
    }

    /// The more severe of two statuses.
    pub fn worst(self, other: SolveStatus) -> SolveStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a lab has no allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Diagnosis {
    /// Fewer students than the minimum team size.
    LabTooSmall { size: usize, min: usize },
    /// No team count splits the lab into sizes within the bounds.
    SizeMismatch { size: usize, min: usize, max: usize },
    /// Exactly one member of a balanced category in the whole lab.
    LoneGender { gender: Gender },
    /// The lab's share of the team-number pool is too small.
    InsufficientSlots { available: usize, required: usize },
    /// The search proved no assignment satisfies the constraints.
    NoFeasibleAssignment,
    /// The time budget ran out before a valid assignment was found.
    TimeBudgetExhausted,
}

impl Diagnosis {
    /// Suggested change to the bounds.
    pub fn remedy(&self) -> &'static str {
        match self {
            Diagnosis::LabTooSmall { .. } => "lower min_team_size",
            Diagnosis::SizeMismatch { .. } => "widen the team size range",
            Diagnosis::LoneGender { .. } => "move a student of that category into or out of the lab",
            Diagnosis::InsufficientSlots { .. } => "raise max_teams",
            Diagnosis::NoFeasibleAssignment => "lower min_team_size or raise max_team_size",
            Diagnosis::TimeBudgetExhausted => "raise max_solve_time or lower wam_weight",
        }
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnosis::LabTooSmall { size, min } => {
                write!(f, "{size} students, fewer than min_team_size {min}")
            }
            Diagnosis::SizeMismatch { size, min, max } => {
                write!(f, "{size} students cannot be split into teams of {min} to {max}")
            }
            Diagnosis::LoneGender { gender } => {
                write!(f, "only one student of category {gender}")
            }
            Diagnosis::InsufficientSlots {
                available,
                required,
            } => write!(f, "{available} team numbers available, {required} required"),
            Diagnosis::NoFeasibleAssignment => f.write_str("no assignment satisfies the constraints"),
            Diagnosis::TimeBudgetExhausted => f.write_str("time budget exhausted without a solution"),
        }
    }
}

/// One active team.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Team {
    /// Team number from the pool `1..=max_teams`; not necessarily contiguous.
    pub number: usize,
    pub lab: LabId,
    /// Members in roster order.
    pub members: Vec<StudentId>,
    pub mean_score: f64,
    /// `sum(score - class_mean)` over the members.
    pub score_offset: f64,
}

impl Team {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// The team's contribution to the balance term.
    pub fn deviation(&self) -> f64 {
        self.score_offset * self.score_offset
    }
}

/// A lab that received an allocation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LabSolution {
    pub lab: LabId,
    /// `Optimal` or `Feasible`.
    pub status: SolveStatus,
    pub teams: Vec<Team>,
    /// Sum of [`Team::deviation`] over the lab's teams.
    pub deviation: f64,
    /// Raw objective reported by the solver.
    pub objective: i64,
    pub solve_time_ms: u64,
}

/// A lab that did not receive an allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LabFailure {
    pub lab: LabId,
    pub students: usize,
    /// `Infeasible` or `TimeoutNoSolution`.
    pub status: SolveStatus,
    pub diagnosis: Diagnosis,
}

impl fmt::Display for LabFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lab {} ({}): {}; {}",
            self.lab,
            self.status,
            self.diagnosis,
            self.diagnosis.remedy()
        )
    }
}

/// Per-lab result of a formation run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LabOutcome {
    Solved(LabSolution),
    Failed(LabFailure),
}

impl LabOutcome {
    pub fn lab(&self) -> &LabId {
        match self {
            LabOutcome::Solved(s) => &s.lab,
            LabOutcome::Failed(f) => &f.lab,
        }
    }

    pub fn status(&self) -> SolveStatus {
        match self {
            LabOutcome::Solved(s) => s.status,
            LabOutcome::Failed(f) => f.status,
        }
    }

    pub fn as_solution(&self) -> Option<&LabSolution> {
        match self {
            LabOutcome::Solved(s) => Some(s),
            LabOutcome::Failed(_) => None,
        }
    }

    pub fn as_failure(&self) -> Option<&LabFailure> {
        match self {
            LabOutcome::Solved(_) => None,
            LabOutcome::Failed(f) => Some(f),
        }
    }
}

/// Complete mapping from student to team number.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Assignment {
    pub status: SolveStatus,
    teams: BTreeMap<StudentId, usize>,
}

impl Assignment {
    pub fn team_of(&self, student: StudentId) -> Option<usize> {
        self.teams.get(&student).copied()
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StudentId, usize)> + '_ {
        self.teams.iter().map(|(&s, &t)| (s, t))
    }

    /// Number of distinct teams used.
    pub fn team_count(&self) -> usize {
        let mut numbers: Vec<usize> = self.teams.values().copied().collect();
        numbers.sort_unstable();
        numbers.dedup();
        numbers.len()
    }
}

/// Labs that could not be allocated, as an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no team allocation ({status}){}", failure_lines(.failures))]
pub struct FormationFailure {
    pub status: SolveStatus,
    pub failures: Vec<LabFailure>,
}

fn failure_lines(failures: &[LabFailure]) -> String {
    failures.iter().map(|f| format!("\n  {f}")).collect()
}

/// Result of a formation run: one outcome per lab, labs in sorted order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Formation {
    /// Most severe lab status.
    pub status: SolveStatus,
    pub labs: Vec<LabOutcome>,
}

impl Formation {
    pub fn new(labs: Vec<LabOutcome>) -> Self {
        let status = labs
            .iter()
            .map(LabOutcome::status)
            .fold(SolveStatus::Optimal, SolveStatus::worst);
        Self { status, labs }
    }

    /// Replaces the outcome of the same lab, e.g. after a retry.
    pub fn merge(&mut self, outcome: LabOutcome) {
        match self.labs.iter_mut().find(|o| o.lab() == outcome.lab()) {
            Some(slot) => *slot = outcome,
            None => {
                self.labs.push(outcome);
                self.labs.sort_by(|a, b| a.lab().cmp(b.lab()));
            }
        }
        *self = Self::new(std::mem::take(&mut self.labs));
    }

    pub fn solutions(&self) -> impl Iterator<Item = &LabSolution> {
        self.labs.iter().filter_map(LabOutcome::as_solution)
    }

    pub fn failures(&self) -> impl Iterator<Item = &LabFailure> {
        self.labs.iter().filter_map(LabOutcome::as_failure)
    }

    pub fn is_complete(&self) -> bool {
        self.labs.iter().all(|o| o.status().is_success())
    }

    pub fn teams(&self) -> impl Iterator<Item = &Team> {
        self.solutions().flat_map(|s| s.teams.iter())
    }

    pub fn team_count(&self) -> usize {
        self.solutions().map(|s| s.teams.len()).sum()
    }

    /// Total balance term over all solved labs.
    pub fn deviation(&self) -> f64 {
        self.solutions().map(|s| s.deviation).sum()
    }

    /// Placements of the students in solved labs only.
    pub fn placements(&self) -> BTreeMap<StudentId, usize> {
        self.teams()
            .flat_map(|team| team.members.iter().map(move |&m| (m, team.number)))
            .collect()
    }

    /// The full student-to-team mapping, or the labs that prevent it.
    pub fn assignment(&self) -> Result<Assignment, FormationFailure> {
        let failures: Vec<LabFailure> = self.failures().cloned().collect();
        if !failures.is_empty() {
            return Err(FormationFailure {
                status: self.status,
                failures,
            });
        }
        Ok(Assignment {
            status: self.status,
            teams: self.placements(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(number: usize, lab: &str, members: &[usize]) -> Team {
        Team {
            number,
            lab: LabId::new(lab),
            members: members.iter().map(|&m| StudentId(m)).collect(),
            mean_score: 0.0,
            score_offset: 1.5,
        }
    }

    fn solved(lab: &str, status: SolveStatus, teams: Vec<Team>) -> LabOutcome {
        let deviation = teams.iter().map(Team::deviation).sum();
        LabOutcome::Solved(LabSolution {
            lab: LabId::new(lab),
            status,
            teams,
            deviation,
            objective: 0,
            solve_time_ms: 0,
        })
    }

    fn failed(lab: &str, status: SolveStatus) -> LabOutcome {
        LabOutcome::Failed(LabFailure {
            lab: LabId::new(lab),
            students: 2,
            status,
            diagnosis: Diagnosis::LabTooSmall { size: 2, min: 3 },
        })
    }

    #[test]
    fn test_status_worst() {
        assert_eq!(SolveStatus::Optimal.worst(SolveStatus::Feasible), SolveStatus::Feasible);
        assert_eq!(
            SolveStatus::Infeasible.worst(SolveStatus::TimeoutNoSolution),
            SolveStatus::Infeasible
        );
        assert!(SolveStatus::Feasible.is_success());
        assert!(!SolveStatus::TimeoutNoSolution.is_success());
    }

    #[test]
    fn test_complete_formation_yields_assignment() {
        let formation = Formation::new(vec![
            solved("1", SolveStatus::Optimal, vec![team(1, "1", &[0, 2]), team(2, "1", &[1, 3])]),
            solved("2", SolveStatus::Feasible, vec![team(5, "2", &[4, 5])]),
        ]);
        assert_eq!(formation.status, SolveStatus::Feasible);
        assert_eq!(formation.team_count(), 3);
        assert!((formation.deviation() - 3.0 * 2.25).abs() < 1e-12);

        let assignment = formation.assignment().unwrap();
        assert_eq!(assignment.len(), 6);
        assert_eq!(assignment.team_count(), 3);
        assert_eq!(assignment.team_of(StudentId(3)), Some(2));
        assert_eq!(assignment.team_of(StudentId(5)), Some(5));
        assert_eq!(assignment.team_of(StudentId(9)), None);
    }

    #[test]
    fn test_failed_lab_blocks_assignment_but_keeps_placements() {
        let formation = Formation::new(vec![
            solved("1", SolveStatus::Optimal, vec![team(1, "1", &[0, 1, 2])]),
            failed("2", SolveStatus::Infeasible),
        ]);
        assert_eq!(formation.status, SolveStatus::Infeasible);
        assert!(!formation.is_complete());
        assert_eq!(formation.placements().len(), 3);

        let failure = formation.assignment().unwrap_err();
        assert_eq!(failure.failures.len(), 1);
        assert_eq!(failure.failures[0].lab, LabId::new("2"));
        let message = failure.to_string();
        assert!(message.starts_with("no team allocation (infeasible)\n  lab 2"));
        assert!(message.contains("lab 2"));
        assert!(message.contains("lower min_team_size"));
    }

    #[test]
    fn test_merge_replaces_lab() {
        let mut formation = Formation::new(vec![
            solved("1", SolveStatus::Optimal, vec![team(1, "1", &[0, 1])]),
            failed("2", SolveStatus::TimeoutNoSolution),
        ]);
        assert_eq!(formation.status, SolveStatus::TimeoutNoSolution);

        formation.merge(solved("2", SolveStatus::Optimal, vec![team(3, "2", &[2, 3])]));
        assert_eq!(formation.status, SolveStatus::Optimal);
        assert_eq!(formation.labs.len(), 2);
        assert!(formation.assignment().is_ok());
    }
}
