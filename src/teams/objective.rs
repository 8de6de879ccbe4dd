//! Lexicographic objective: team count first, score balance second.
//!
//! ```text
//! minimize  W * sum_t y[t]  +  c * sum_t (sum_s d_s * x[s,t])^2
//! ```
//!
//! `d_s` is the student's score offset from the class mean in hundredths,
//! so the inner sum is the team's score sum minus `size * class_mean`.
//! `c = round(1000 * wam_weight)`. `W` exceeds the largest balance term
//! the whole lab can produce, so no amount of balance ever pays for an
//! extra team.

use super::bounds::Bounds;
use super::builder::LabModel;
use crate::cp::{Objective, SquaredTerm};
use crate::error::ConfigError;
use tracing::{debug, warn};

/// Score offsets are expressed in hundredths.
pub const SCORE_SCALE: f64 = 100.0;
/// `wam_weight` is expressed in thousandths.
pub const WEIGHT_SCALE: f64 = 1000.0;

/// Coefficients chosen for one lab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectiveWeights {
    /// Cost of one active team.
    pub team: i64,
    /// Weight of each squared team offset; zero when balancing is off.
    pub deviation: i64,
    /// Scaled score offset per lab student.
    pub offsets: Vec<i64>,
}

/// Composes the objective of each lab model.
#[derive(Debug, Clone)]
pub struct ObjectiveComposer<'a> {
    bounds: &'a Bounds,
    class_mean: f64,
}

fn to_i64(value: f64) -> Option<i64> {
    // 2^62 leaves headroom for the sums below.
    (value.is_finite() && value.abs() < 4.0e18).then_some(value.round() as i64)
}

impl<'a> ObjectiveComposer<'a> {
    pub fn new(bounds: &'a Bounds, class_mean: f64) -> Self {
        Self { bounds, class_mean }
    }

    /// Sets the objective of `lab` and returns the coefficients used.
    pub fn compose(&self, lab: &mut LabModel) -> Result<ObjectiveWeights, ConfigError> {
        let overflow = || ConfigError::ObjectiveOverflow {
            lab: lab.lab.clone(),
        };

        let offsets = lab
            .scores
            .iter()
            .map(|&score| to_i64((score - self.class_mean) * SCORE_SCALE))
            .collect::<Option<Vec<i64>>>()
            .ok_or_else(overflow)?;
        let deviation = to_i64(self.bounds.wam_weight * WEIGHT_SCALE).ok_or_else(overflow)?;
        if deviation == 0 && self.bounds.wam_weight > 0.0 {
            warn!(
                lab = %lab.lab,
                wam_weight = self.bounds.wam_weight,
                "wam_weight rounds to zero thousandths; score balancing is off"
            );
        }

        let slots = lab.active.len() as i128;
        let team = if deviation == 0 {
            1
        } else {
            let widest = offsets.iter().map(|d| (*d as i128).abs()).max().unwrap_or(0);
            (self.bounds.max_team_size as i128)
                .checked_mul(widest)
                .and_then(|s| s.checked_mul(s))
                .and_then(|s| s.checked_mul(deviation as i128))
                .and_then(|s| s.checked_mul(slots))
                .and_then(|s| s.checked_add(1))
                .ok_or_else(overflow)?
        };
        // The whole objective stays below (slots + 1) * team.
        let ceiling = team.checked_mul(slots + 1).ok_or_else(overflow)?;
        if ceiling > i64::MAX as i128 {
            return Err(overflow());
        }
        let team = team as i64;

        let mut objective = Objective::minimize(lab.active.iter().map(|&y| (y, team)).collect());
        if deviation > 0 {
            for t in 0..lab.active.len() {
                let terms: Vec<_> = lab
                    .slot_members(t)
                    .filter(|&(i, _)| offsets[i] != 0)
                    .map(|(i, v)| (v, offsets[i]))
                    .collect();
                if !terms.is_empty() {
                    objective = objective.with_squared(SquaredTerm::new(deviation, terms));
                }
            }
        }
        lab.model.set_objective(objective);

        debug!(lab = %lab.lab, team, deviation, "composed objective");
        Ok(ObjectiveWeights {
            team,
            deviation,
            offsets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::{Roster, StudentRecord};
    use crate::teams::builder::{LabPlan, ModelBuilder};

    fn lab_model(scores: &[f64], bounds: &Bounds) -> (LabModel, f64) {
        let genders = ["x"; 16];
        let roster = Roster::new(
            scores
                .iter()
                .zip(genders)
                .map(|(&score, g)| StudentRecord::new("1", g, score)),
        )
        .unwrap();
        let mut plans = ModelBuilder::new(&roster, bounds).build().unwrap();
        match plans.remove(0) {
            LabPlan::Model(model) => (*model, roster.mean_score()),
            LabPlan::Diagnosed { diagnosis, .. } => panic!("unexpected diagnosis {diagnosis}"),
        }
    }

    #[test]
    fn test_offsets_and_weights() {
        let bounds = Bounds::new(2, 3, 2).with_wam_weight(0.05);
        let (mut lab, mean) = lab_model(&[60.0, 70.0, 80.0, 90.0], &bounds);
        let weights = ObjectiveComposer::new(&bounds, mean).compose(&mut lab).unwrap();

        assert_eq!(weights.offsets, vec![-1500, -500, 500, 1500]);
        assert_eq!(weights.deviation, 50);
        // 1 + slots * c * (max_size * max|d|)^2
        assert_eq!(weights.team, 1 + 2 * 50 * (3 * 1500i64).pow(2));
        let objective = lab.model.objective.as_ref().unwrap();
        assert_eq!(objective.linear.len(), 2);
        assert_eq!(objective.squared.len(), 2);
    }

    #[test]
    fn test_team_weight_dominates_balance() {
        let bounds = Bounds::new(2, 4, 2).with_wam_weight(0.05);
        let (mut lab, _) = lab_model(&[10.0, 20.0, 90.0, 100.0], &bounds);
        // Against a mean of zero a single team of everyone is the worst
        // balanced split there is.
        ObjectiveComposer::new(&bounds, 0.0).compose(&mut lab).unwrap();
        let objective = lab.model.objective.clone().unwrap();

        let mut one_team = vec![false; lab.model.var_count()];
        for row in &lab.assign {
            one_team[row[0].index()] = true;
        }
        one_team[lab.active[0].index()] = true;

        // {10, 100} + {20, 90}: better balanced but two teams.
        let mut two_teams = vec![false; lab.model.var_count()];
        for (i, t) in [(0, 0), (1, 1), (2, 1), (3, 0)] {
            two_teams[lab.assign[i][t].index()] = true;
        }
        two_teams[lab.active[0].index()] = true;
        two_teams[lab.active[1].index()] = true;

        assert!(lab.model.is_satisfied_by(&one_team));
        assert!(lab.model.is_satisfied_by(&two_teams));
        assert!(objective.evaluate(&one_team) < objective.evaluate(&two_teams));
        let balance = |values: &[bool]| objective.squared.iter().map(|s| s.evaluate(values)).sum::<i128>();
        assert!(balance(&one_team) > balance(&two_teams));
    }

    #[test]
    fn test_zero_weight_counts_teams_only() {
        let bounds = Bounds::new(2, 3, 2).with_wam_weight(0.0);
        let (mut lab, mean) = lab_model(&[60.0, 70.0, 80.0, 90.0], &bounds);
        let weights = ObjectiveComposer::new(&bounds, mean).compose(&mut lab).unwrap();

        assert_eq!(weights.team, 1);
        assert_eq!(weights.deviation, 0);
        assert!(lab.model.objective.as_ref().unwrap().squared.is_empty());
    }

    #[test]
    fn test_tiny_weight_rounds_to_zero() {
        let bounds = Bounds::new(2, 3, 2).with_wam_weight(0.0004);
        let (mut lab, mean) = lab_model(&[60.0, 70.0, 80.0, 90.0], &bounds);
        let weights = ObjectiveComposer::new(&bounds, mean).compose(&mut lab).unwrap();

        assert_eq!(weights.deviation, 0);
        assert_eq!(weights.team, 1);
        assert!(lab.model.objective.as_ref().unwrap().squared.is_empty());

        let bounds = bounds.with_wam_weight(0.0006);
        let (mut lab, mean) = lab_model(&[60.0, 70.0, 80.0, 90.0], &bounds);
        let weights = ObjectiveComposer::new(&bounds, mean).compose(&mut lab).unwrap();
        assert_eq!(weights.deviation, 1);
    }

    #[test]
    fn test_overflow_is_a_config_error() {
        let bounds = Bounds::new(2, 3, 2).with_wam_weight(1.0e6);
        let (mut lab, mean) = lab_model(&[0.0, 1.0e9, 0.0, 1.0e9], &bounds);
        let err = ObjectiveComposer::new(&bounds, mean).compose(&mut lab).unwrap_err();
        assert!(matches!(err, ConfigError::ObjectiveOverflow { .. }));
    }
}
