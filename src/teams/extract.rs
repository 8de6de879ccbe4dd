//! Reading teams back out of solver values.

use super::builder::LabModel;
use super::types::{Diagnosis, LabFailure, LabSolution, SolveStatus, Team};
use crate::cp::CpSolution;
use crate::error::FormationError;

/// Turns a successful lab solve into teams.
///
/// Every lab student must sit in exactly one slot; anything else is
/// reported as [`FormationError::Inconsistent`].
pub fn extract_solution(
    lab: &LabModel,
    status: SolveStatus,
    solution: &CpSolution,
    class_mean: f64,
) -> Result<LabSolution, FormationError> {
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); lab.active.len()];
    for (i, row) in lab.assign.iter().enumerate() {
        let slots: Vec<usize> = row
            .iter()
            .enumerate()
            .filter(|&(_, &var)| solution.value(var))
            .map(|(t, _)| t)
            .collect();
        match slots.as_slice() {
            [t] => members[*t].push(i),
            _ => {
                return Err(FormationError::Inconsistent {
                    lab: lab.lab.clone(),
                    student: lab.students[i],
                    placements: slots.len(),
                })
            }
        }
    }

    let teams: Vec<Team> = members
        .into_iter()
        .enumerate()
        .filter(|(_, m)| !m.is_empty())
        .map(|(t, m)| {
            let total: f64 = m.iter().map(|&i| lab.scores[i]).sum();
            Team {
                number: lab.slots.team_number(t),
                lab: lab.lab.clone(),
                mean_score: total / m.len() as f64,
                score_offset: total - class_mean * m.len() as f64,
                members: m.into_iter().map(|i| lab.students[i]).collect(),
            }
        })
        .collect();

    Ok(LabSolution {
        lab: lab.lab.clone(),
        status,
        deviation: teams.iter().map(Team::deviation).sum(),
        teams,
        objective: solution.objective_value.unwrap_or_default(),
        solve_time_ms: solution.solve_time_ms,
    })
}

/// Failure record for a lab the solver could not allocate.
pub fn solver_failure(lab: &LabModel, status: SolveStatus) -> LabFailure {
    let diagnosis = match status {
        SolveStatus::TimeoutNoSolution => Diagnosis::TimeBudgetExhausted,
        _ => Diagnosis::NoFeasibleAssignment,
    };
    LabFailure {
        lab: lab.lab.clone(),
        students: lab.students.len(),
        status,
        diagnosis,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cp::{CpModel, SolverStatus, VarId};
    use crate::roster::{LabId, StudentId};
    use crate::teams::builder::SlotRange;

    /// Three students, two slots, slice starting at team 5.
    fn lab() -> LabModel {
        let mut model = CpModel::new("lab_b");
        let assign: Vec<Vec<VarId>> = (0..3)
            .map(|i| (0..(i + 1).min(2)).map(|t| model.new_bool_var(format!("x_{i}_{t}"))).collect())
            .collect();
        let active = (0..2).map(|t| model.new_bool_var(format!("y_{t}"))).collect();
        LabModel {
            lab: LabId::new("b"),
            students: vec![StudentId(4), StudentId(7), StudentId(9)],
            scores: vec![50.0, 70.0, 90.0],
            slots: SlotRange { offset: 4, len: 2 },
            model,
            assign,
            active,
        }
    }

    fn solution(lab: &LabModel, placed: &[(usize, usize)]) -> CpSolution {
        let mut values = vec![false; lab.model.var_count()];
        for &(i, t) in placed {
            values[lab.assign[i][t].index()] = true;
        }
        CpSolution {
            status: SolverStatus::Optimal,
            objective_value: Some(12),
            values,
            solve_time_ms: 3,
            nodes: 10,
        }
    }

    #[test]
    fn test_extract_teams() {
        let lab = lab();
        let solved = extract_solution(
            &lab,
            SolveStatus::Optimal,
            &solution(&lab, &[(0, 0), (1, 1), (2, 0)]),
            60.0,
        )
        .unwrap();

        assert_eq!(solved.teams.len(), 2);
        let first = &solved.teams[0];
        assert_eq!(first.number, 5);
        assert_eq!(first.members, vec![StudentId(4), StudentId(9)]);
        assert!((first.mean_score - 70.0).abs() < 1e-12);
        assert!((first.score_offset - 20.0).abs() < 1e-12);

        let second = &solved.teams[1];
        assert_eq!(second.number, 6);
        assert_eq!(second.members, vec![StudentId(7)]);
        assert!((solved.deviation - (400.0 + 100.0)).abs() < 1e-9);
        assert_eq!(solved.objective, 12);
    }

    #[test]
    fn test_unused_slot_leaves_a_gap() {
        let lab = lab();
        let solved = extract_solution(
            &lab,
            SolveStatus::Feasible,
            &solution(&lab, &[(0, 0), (1, 0), (2, 0)]),
            70.0,
        )
        .unwrap();
        assert_eq!(solved.teams.len(), 1);
        assert_eq!(solved.teams[0].number, 5);
        assert!(solved.deviation.abs() < 1e-9);
    }

    #[test]
    fn test_double_placement_is_inconsistent() {
        let lab = lab();
        let err = extract_solution(
            &lab,
            SolveStatus::Optimal,
            &solution(&lab, &[(0, 0), (1, 0), (1, 1), (2, 0)]),
            70.0,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            FormationError::Inconsistent {
                student: StudentId(7),
                placements: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_placement_is_inconsistent() {
        let lab = lab();
        let err = extract_solution(&lab, SolveStatus::Optimal, &solution(&lab, &[(0, 0)]), 70.0)
            .unwrap_err();
        assert!(matches!(
            err,
            FormationError::Inconsistent {
                placements: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_solver_failure_diagnosis() {
        let lab = lab();
        let timeout = solver_failure(&lab, SolveStatus::TimeoutNoSolution);
        assert_eq!(timeout.diagnosis, Diagnosis::TimeBudgetExhausted);
        assert_eq!(timeout.students, 3);
        let infeasible = solver_failure(&lab, SolveStatus::Infeasible);
        assert_eq!(infeasible.diagnosis, Diagnosis::NoFeasibleAssignment);
    }
}
