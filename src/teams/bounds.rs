//! Formation bounds.

use crate::error::ConfigError;
use crate::roster::Roster;
use std::time::Duration;

pub const DEFAULT_MIN_TEAM_SIZE: usize = 4;
pub const DEFAULT_MAX_TEAM_SIZE: usize = 5;
pub const DEFAULT_WAM_WEIGHT: f64 = 0.05;
pub const DEFAULT_MAX_SOLVE_TIME: Duration = Duration::from_secs(60);

/// User-supplied limits for one formation run. Read-only while solving.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use team_former::teams::Bounds;
///
/// let bounds = Bounds::new(3, 5, 10)
///     .with_wam_weight(0.1)
///     .with_max_solve_time(Duration::from_secs(30));
/// assert!(bounds.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bounds {
    /// Smallest allowed team.
    pub min_team_size: usize,
    /// Largest allowed team.
    pub max_team_size: usize,
    /// Size of the shared team-number pool `1..=max_teams`.
    pub max_teams: usize,
    /// Weight of the score-balance term. Team count always dominates;
    /// zero disables balancing.
    pub wam_weight: f64,
    /// Wall-clock budget for the whole run.
    pub max_solve_time: Duration,
}

impl Bounds {
    /// Bounds with the default weight and time budget.
    pub fn new(min_team_size: usize, max_team_size: usize, max_teams: usize) -> Self {
        Self {
            min_team_size,
            max_team_size,
            max_teams,
            wam_weight: DEFAULT_WAM_WEIGHT,
            max_solve_time: DEFAULT_MAX_SOLVE_TIME,
        }
    }

    /// Bounds whose team pool is the most teams the roster could fill:
    /// `len / min_team_size` (at least one).
    pub fn for_roster(roster: &Roster, min_team_size: usize, max_team_size: usize) -> Self {
        let max_teams = roster
            .len()
            .checked_div(min_team_size)
            .unwrap_or(0)
            .max(1);
        Self::new(min_team_size, max_team_size, max_teams)
    }

    pub fn with_max_teams(mut self, n: usize) -> Self {
        self.max_teams = n;
        self
    }

    pub fn with_wam_weight(mut self, weight: f64) -> Self {
        self.wam_weight = weight;
        self
    }

    pub fn with_max_solve_time(mut self, time: Duration) -> Self {
        self.max_solve_time = time;
        self
    }

    /// Validates the bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_team_size == 0 || self.max_team_size == 0 {
            return Err(ConfigError::ZeroTeamSize {
                min: self.min_team_size,
                max: self.max_team_size,
            });
        }
        if self.max_team_size < self.min_team_size {
            return Err(ConfigError::MaxBelowMin {
                min: self.min_team_size,
                max: self.max_team_size,
            });
        }
        if self.max_teams == 0 {
            return Err(ConfigError::ZeroTeamPool);
        }
        if !self.wam_weight.is_finite() || self.wam_weight < 0.0 {
            return Err(ConfigError::InvalidWeight(self.wam_weight));
        }
        if self.max_solve_time.is_zero() {
            return Err(ConfigError::ZeroSolveTime);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::StudentRecord;

    #[test]
    fn test_defaults() {
        let bounds = Bounds::new(DEFAULT_MIN_TEAM_SIZE, DEFAULT_MAX_TEAM_SIZE, 8);
        assert!((bounds.wam_weight - 0.05).abs() < 1e-12);
        assert_eq!(bounds.max_solve_time, Duration::from_secs(60));
        assert!(bounds.validate().is_ok());
    }

    #[test]
    fn test_for_roster() {
        let records = (0..10).map(|i| StudentRecord::new("1", "M", i as f64));
        let roster = Roster::new(records).unwrap();
        assert_eq!(Bounds::for_roster(&roster, 3, 5).max_teams, 3);
        assert_eq!(Bounds::for_roster(&roster, 20, 25).max_teams, 1);
        assert_eq!(Bounds::for_roster(&roster, 0, 5).max_teams, 1);
    }

    #[test]
    fn test_validate_rejects_inconsistent_bounds() {
        assert_eq!(
            Bounds::new(0, 5, 3).validate(),
            Err(ConfigError::ZeroTeamSize { min: 0, max: 5 })
        );
        assert_eq!(
            Bounds::new(5, 4, 3).validate(),
            Err(ConfigError::MaxBelowMin { min: 5, max: 4 })
        );
        assert_eq!(Bounds::new(3, 4, 0).validate(), Err(ConfigError::ZeroTeamPool));
        assert!(matches!(
            Bounds::new(3, 4, 2).with_wam_weight(-0.5).validate(),
            Err(ConfigError::InvalidWeight(_))
        ));
        assert!(matches!(
            Bounds::new(3, 4, 2).with_wam_weight(f64::NAN).validate(),
            Err(ConfigError::InvalidWeight(_))
        ));
        assert_eq!(
            Bounds::new(3, 4, 2).with_max_solve_time(Duration::ZERO).validate(),
            Err(ConfigError::ZeroSolveTime)
        );
    }
}
