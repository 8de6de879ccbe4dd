//! Per-lab CP models.
//!
//! The team-number pool is split into disjoint contiguous slices, one per
//! lab, so every lab is an independent model. Within a lab, student `i`
//! (in roster order) may only take slots `0..=i`: any partition can be
//! relabelled so that slot `t` holds a student with index at least `t`,
//! and together with `y[t] >= y[t+1]` this removes most slot symmetry
//! without cutting off any partition.

use super::bounds::Bounds;
use super::greedy::greedy_teams;
use super::types::Diagnosis;
use crate::cp::{BoolVar, CpModel, VarId};
use crate::error::ConfigError;
use crate::roster::{Gender, LabId, Roster, Student, StudentId};
use tracing::debug;

/// A lab's contiguous slice of the team-number pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRange {
    /// Number of slots preceding this slice.
    pub offset: usize,
    pub len: usize,
}

impl SlotRange {
    /// One-based team number of local slot `t`.
    pub fn team_number(&self, t: usize) -> usize {
        self.offset + t + 1
    }

    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Smallest team count that fits `n` students.
fn min_teams(n: usize, max_team_size: usize) -> usize {
    n.div_ceil(max_team_size)
}

/// Largest team count that fits `n` students.
fn max_useful_teams(n: usize, min_team_size: usize) -> usize {
    n / min_team_size
}

/// Splits `1..=max_teams` between labs of the given sizes.
///
/// Every lab wants `n / min_team_size` slots. When the pool cannot cover
/// all wishes, each lab first gets its minimum `ceil(n / max_team_size)`
/// (in lab order, as long as the pool lasts) and the rest is dealt one
/// slot at a time, round-robin. A size of zero asks for nothing.
pub fn allocate_slots(lab_sizes: &[usize], bounds: &Bounds) -> Vec<SlotRange> {
    let wish: Vec<usize> = lab_sizes
        .iter()
        .map(|&n| max_useful_teams(n, bounds.min_team_size))
        .collect();
    let total: usize = wish.iter().sum();

    let lens = if total <= bounds.max_teams {
        wish
    } else {
        let mut pool = bounds.max_teams;
        let mut lens: Vec<usize> = lab_sizes
            .iter()
            .zip(&wish)
            .map(|(&n, &w)| {
                let need = min_teams(n, bounds.max_team_size).min(w).min(pool);
                pool -= need;
                need
            })
            .collect();
        while pool > 0 {
            let mut dealt = false;
            for (len, &w) in lens.iter_mut().zip(&wish) {
                if pool > 0 && *len < w {
                    *len += 1;
                    pool -= 1;
                    dealt = true;
                }
            }
            if !dealt {
                break;
            }
        }
        lens
    };

    let mut offset = 0;
    lens.into_iter()
        .map(|len| {
            let range = SlotRange { offset, len };
            offset += len;
            range
        })
        .collect()
}

/// Reasons a lab cannot be split that need no search to establish.
/// Slot shortage is checked separately once the pool is allocated.
pub fn diagnose(students: &[&Student], bounds: &Bounds) -> Option<Diagnosis> {
    let n = students.len();
    if n < bounds.min_team_size {
        return Some(Diagnosis::LabTooSmall {
            size: n,
            min: bounds.min_team_size,
        });
    }
    if min_teams(n, bounds.max_team_size) > max_useful_teams(n, bounds.min_team_size) {
        return Some(Diagnosis::SizeMismatch {
            size: n,
            min: bounds.min_team_size,
            max: bounds.max_team_size,
        });
    }
    Gender::BALANCED
        .into_iter()
        .find(|g| students.iter().filter(|s| &s.gender == g).count() == 1)
        .map(|gender| Diagnosis::LoneGender { gender })
}

/// The CP model of one lab and the handles needed to read a solution back.
#[derive(Debug, Clone)]
pub struct LabModel {
    pub lab: LabId,
    /// Lab members in roster order.
    pub students: Vec<StudentId>,
    /// Scores, parallel to `students`.
    pub scores: Vec<f64>,
    pub slots: SlotRange,
    pub model: CpModel,
    /// `assign[i][t]`: student `i` sits in local slot `t`, for `t <= i`.
    pub assign: Vec<Vec<VarId>>,
    /// `active[t]`: local slot `t` is used.
    pub active: Vec<VarId>,
}

impl LabModel {
    /// Students that may sit in slot `t`, with their assignment variable.
    pub fn slot_members(&self, t: usize) -> impl Iterator<Item = (usize, VarId)> + '_ {
        self.assign
            .iter()
            .enumerate()
            .filter_map(move |(i, row)| row.get(t).map(|&v| (i, v)))
    }
}

/// Outcome of building one lab.
#[derive(Debug, Clone)]
pub enum LabPlan {
    /// A model to hand to the solver.
    Model(Box<LabModel>),
    /// Infeasible before search.
    Diagnosed {
        lab: LabId,
        students: usize,
        diagnosis: Diagnosis,
    },
}

impl LabPlan {
    pub fn lab(&self) -> &LabId {
        match self {
            LabPlan::Model(m) => &m.lab,
            LabPlan::Diagnosed { lab, .. } => lab,
        }
    }
}

/// Builds one [`LabPlan`] per lab, labs in sorted order.
pub struct ModelBuilder<'a> {
    roster: &'a Roster,
    bounds: &'a Bounds,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(roster: &'a Roster, bounds: &'a Bounds) -> Self {
        Self { roster, bounds }
    }

    pub fn build(&self) -> Result<Vec<LabPlan>, ConfigError> {
        self.bounds.validate()?;
        let labs = self.roster.labs();

        let diagnoses: Vec<Option<Diagnosis>> =
            labs.values().map(|students| diagnose(students, self.bounds)).collect();
        // Labs that are infeasible anyway do not take slots from the pool.
        let sizes: Vec<usize> = labs
            .values()
            .zip(&diagnoses)
            .map(|(students, d)| if d.is_some() { 0 } else { students.len() })
            .collect();
        let ranges = allocate_slots(&sizes, self.bounds);

        let plans = labs
            .into_iter()
            .zip(diagnoses)
            .zip(ranges)
            .map(|(((lab, students), diagnosis), slots)| {
                let required = min_teams(students.len(), self.bounds.max_team_size);
                let diagnosis = diagnosis.or_else(|| {
                    (slots.len < required).then_some(Diagnosis::InsufficientSlots {
                        available: slots.len,
                        required,
                    })
                });
                match diagnosis {
                    Some(diagnosis) => {
                        debug!(%lab, %diagnosis, "lab infeasible before search");
                        LabPlan::Diagnosed {
                            lab: lab.clone(),
                            students: students.len(),
                            diagnosis,
                        }
                    }
                    None => LabPlan::Model(Box::new(self.build_lab(lab, &students, slots))),
                }
            })
            .collect();
        Ok(plans)
    }

    fn build_lab(&self, lab: &LabId, students: &[&Student], slots: SlotRange) -> LabModel {
        let n = students.len();
        let (min, max) = (self.bounds.min_team_size, self.bounds.max_team_size);
        let mut model = CpModel::new(format!("lab_{lab}"));

        let assign: Vec<Vec<VarId>> = (0..n)
            .map(|i| {
                (0..slots.len.min(i + 1))
                    .map(|t| model.new_bool_var(format!("x_{i}_{t}")))
                    .collect()
            })
            .collect();
        // The first ceil(n / max) slots are always in use.
        let required = min_teams(n, max);
        let active: Vec<VarId> = (0..slots.len)
            .map(|t| {
                if t < required {
                    model.add_bool_var(BoolVar::fixed(format!("y_{t}"), true))
                } else {
                    model.new_bool_var(format!("y_{t}"))
                }
            })
            .collect();

        for row in &assign {
            model.add_exactly_one(row.clone());
        }

        for (t, &y) in active.iter().enumerate() {
            let members: Vec<(usize, VarId)> = assign
                .iter()
                .enumerate()
                .filter_map(|(i, row)| row.get(t).map(|&v| (i, v)))
                .collect();
            let size: Vec<_> = members.iter().map(|&(_, v)| (v, 1)).collect();

            let mut at_least = size.clone();
            at_least.push((y, -(min as i64)));
            model.add_linear(at_least, 0, n as i64);

            let mut at_most = size;
            at_most.push((y, -(max as i64)));
            model.add_linear(at_most, -(max as i64), 0);

            for gender in Gender::BALANCED {
                let terms: Vec<_> = members
                    .iter()
                    .filter(|&&(i, _)| students[i].gender == gender)
                    .map(|&(_, v)| (v, 1))
                    .collect();
                if !terms.is_empty() {
                    model.add_not_equal(terms, 1);
                }
            }
        }

        for pair in active.windows(2) {
            model.add_linear(vec![(pair[0], 1), (pair[1], -1)], 0, 1);
        }
        model.add_linear(
            active.iter().map(|&y| (y, 1)).collect(),
            required as i64,
            max_useful_teams(n, min) as i64,
        );

        let hint = greedy_teams(students, min, max, slots.len, self.roster.mean_score());
        if let Some(slot_of) = &hint {
            let mut values = vec![false; model.var_count()];
            for (i, &t) in slot_of.iter().enumerate() {
                values[assign[i][t].index()] = true;
            }
            for &t in slot_of {
                values[active[t].index()] = true;
            }
            model.set_hint(values);
        }

        debug!(
            %lab,
            students = n,
            slots = slots.len,
            vars = model.var_count(),
            constraints = model.constraint_count(),
            hinted = hint.is_some(),
            "built lab model"
        );
        LabModel {
            lab: lab.clone(),
            students: students.iter().map(|s| s.id).collect(),
            scores: students.iter().map(|s| s.score).collect(),
            slots,
            model,
            assign,
            active,
        }
    }
}
