//! Constructive first teaming for a lab.
//!
//! Gives the solver a feasible starting point so that even a very short
//! budget ends with an allocation. The fewest teams are tried first. For
//! a team count `k`, men are spread evenly over the first `a` teams and
//! women over the last `b`, with `a` and `b` chosen so that every such
//! team gets at least two. Everyone else then tops up the smallest
//! teams. Students are finally dealt, largest score offset first, to the
//! team whose running offset sum they bring closest to zero.

use crate::roster::{Gender, Student};

const MEN: usize = 0;
const WOMEN: usize = 1;
const OTHERS: usize = 2;

fn category(gender: &Gender) -> usize {
    match gender {
        Gender::Male => MEN,
        Gender::Female => WOMEN,
        Gender::Other(_) => OTHERS,
    }
}

/// `count` spread over `teams` teams; the first `count % teams` get one more.
fn spread(count: usize, teams: usize) -> Vec<usize> {
    (0..teams)
        .map(|j| count / teams + usize::from(j < count % teams))
        .collect()
}

/// Team counts worth trying for `count` balanced students over `k` teams.
fn team_choices(count: usize, k: usize) -> Vec<usize> {
    if count == 0 {
        vec![0]
    } else {
        (1..=k.min(count / 2)).rev().collect()
    }
}

/// Per-team quotas `[men, women, others]`, if the split fits the size bounds.
fn quotas(
    counts: [usize; 3],
    k: usize,
    male_teams: usize,
    female_teams: usize,
    min: usize,
    max: usize,
) -> Option<Vec<[usize; 3]>> {
    let mut quota = vec![[0usize; 3]; k];
    for (j, c) in spread(counts[MEN], male_teams).into_iter().enumerate() {
        quota[j][MEN] = c;
    }
    // Women fill from the far end so that the two groups overlap last.
    for (j, c) in spread(counts[WOMEN], female_teams).into_iter().enumerate() {
        quota[k - 1 - j][WOMEN] = c;
    }

    let load = |q: &[usize; 3]| q.iter().sum::<usize>();
    if quota.iter().any(|q| load(q) > max) {
        return None;
    }
    let capacity: usize = quota.iter().map(|q| max - load(q)).sum();
    let deficit: usize = quota.iter().map(|q| min.saturating_sub(load(q))).sum();
    if counts[OTHERS] < deficit || counts[OTHERS] > capacity {
        return None;
    }

    for _ in 0..counts[OTHERS] {
        let smallest = (0..k)
            .filter(|&j| load(&quota[j]) < max)
            .min_by_key(|&j| load(&quota[j]))?;
        quota[smallest][OTHERS] += 1;
    }
    quota.iter().all(|q| load(q) >= min).then_some(quota)
}

/// Local slot of every student, or `None` if no teaming was found.
///
/// Slots are numbered by each team's first member, so a student at lab
/// position `i` always lands in a slot `t <= i`, and slots `0..k` are
/// the used ones.
pub fn greedy_teams(
    students: &[&Student],
    min: usize,
    max: usize,
    slots: usize,
    class_mean: f64,
) -> Option<Vec<usize>> {
    let n = students.len();
    if n == 0 || min == 0 || max < min {
        return None;
    }
    let mut counts = [0usize; 3];
    for s in students {
        counts[category(&s.gender)] += 1;
    }

    let fewest = n.div_ceil(max);
    let most = slots.min(n / min);
    let quota = (fewest..=most).find_map(|k| {
        team_choices(counts[MEN], k).into_iter().find_map(|a| {
            team_choices(counts[WOMEN], k)
                .into_iter()
                .find_map(|b| quotas(counts, k, a, b, min, max))
        })
    })?;
    let k = quota.len();

    let offsets: Vec<f64> = students.iter().map(|s| s.score - class_mean).collect();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| offsets[j].abs().total_cmp(&offsets[i].abs()).then(i.cmp(&j)));

    let mut left = quota;
    let mut sums = vec![0.0f64; k];
    let mut teams: Vec<Vec<usize>> = vec![Vec::new(); k];
    for i in order {
        let c = category(&students[i].gender);
        let team = (0..k)
            .filter(|&j| left[j][c] > 0)
            .min_by(|&p, &q| {
                (sums[p] + offsets[i])
                    .abs()
                    .total_cmp(&(sums[q] + offsets[i]).abs())
            })?;
        left[team][c] -= 1;
        sums[team] += offsets[i];
        teams[team].push(i);
    }

    teams.sort_by_key(|members| members.iter().copied().min());
    let mut slot_of = vec![0usize; n];
    for (t, members) in teams.iter().enumerate() {
        for &i in members {
            slot_of[i] = t;
        }
    }
    Some(slot_of)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::{Roster, StudentRecord};

    fn students(genders: &[&str], scores: &[f64]) -> Roster {
        Roster::new(
            genders
                .iter()
                .zip(scores)
                .map(|(&g, &s)| StudentRecord::new("lab", g, s)),
        )
        .unwrap()
    }

    fn check(slot_of: &[usize], lab: &[&Student], min: usize, max: usize, slots: usize) -> usize {
        let k = slot_of.iter().max().map_or(0, |&t| t + 1);
        assert!(k <= slots);
        for (i, &t) in slot_of.iter().enumerate() {
            assert!(t <= i, "student {i} in slot {t}");
        }
        for t in 0..k {
            let members: Vec<_> = (0..lab.len()).filter(|&i| slot_of[i] == t).collect();
            assert!((min..=max).contains(&members.len()), "slot {t} has {}", members.len());
            for g in Gender::BALANCED {
                assert_ne!(members.iter().filter(|&&i| lab[i].gender == g).count(), 1);
            }
        }
        k
    }

    #[test]
    fn test_spread() {
        assert_eq!(spread(7, 3), vec![3, 2, 2]);
        assert_eq!(spread(0, 2), vec![0, 0]);
    }

    #[test]
    fn test_fewest_teams_without_lone_members() {
        // 5 men, 3 women, 2 others in teams of 3..=4
        let r = students(
            &["M", "F", "M", "x", "M", "F", "M", "y", "F", "M"],
            &[50.0, 90.0, 70.0, 60.0, 80.0, 40.0, 65.0, 75.0, 55.0, 85.0],
        );
        let lab: Vec<&Student> = r.students().iter().collect();
        let slot_of = greedy_teams(&lab, 3, 4, 3, r.mean_score()).unwrap();
        assert_eq!(check(&slot_of, &lab, 3, 4, 3), 3);
    }

    #[test]
    fn test_mixed_teams_when_groups_must_share() {
        // Two teams of 4: men and women cannot each have their own teams.
        let r = students(&["M", "M", "M", "F", "F", "F", "M", "F"], &[1.0; 8]);
        let lab: Vec<&Student> = r.students().iter().collect();
        let slot_of = greedy_teams(&lab, 4, 4, 2, 1.0).unwrap();
        assert_eq!(check(&slot_of, &lab, 4, 4, 2), 2);
    }

    #[test]
    fn test_no_teaming_with_a_lone_man() {
        let r = students(&["M", "F", "F", "F"], &[1.0; 4]);
        let lab: Vec<&Student> = r.students().iter().collect();
        assert_eq!(greedy_teams(&lab, 2, 4, 2, 1.0), None);
    }

    #[test]
    fn test_no_teaming_beyond_slots() {
        let r = students(&["x"; 9], &[1.0; 9]);
        let lab: Vec<&Student> = r.students().iter().collect();
        assert_eq!(greedy_teams(&lab, 3, 3, 2, 1.0), None);
        assert!(greedy_teams(&lab, 3, 3, 3, 1.0).is_some());
    }

    #[test]
    fn test_scores_are_spread_over_teams() {
        // Two strong and two weak students in two teams of two.
        let r = students(&["x", "x", "x", "x"], &[90.0, 91.0, 50.0, 49.0]);
        let lab: Vec<&Student> = r.students().iter().collect();
        let slot_of = greedy_teams(&lab, 2, 2, 2, r.mean_score()).unwrap();
        assert_ne!(slot_of[0], slot_of[1]);
        assert_ne!(slot_of[2], slot_of[3]);
    }

    #[test]
    fn test_large_lab() {
        let genders = ["M", "F", "M", "x", "F"];
        let records = (0..320).map(|i| {
            StudentRecord::new("big", genders[i % 5], 40.0 + ((i * 37) % 50) as f64)
        });
        let r = Roster::new(records).unwrap();
        let lab: Vec<&Student> = r.students().iter().collect();
        let slot_of = greedy_teams(&lab, 4, 5, 80, r.mean_score()).unwrap();
        assert_eq!(check(&slot_of, &lab, 4, 5, 80), 64);
    }
}
