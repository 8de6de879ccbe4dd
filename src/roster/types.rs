//! Roster data types.

use crate::error::RosterError;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Stable student identifier, assigned once when the roster is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StudentId(pub usize);

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Categorical lab label. Teams never span two labs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LabId(String);

impl LabId {
    /// Creates a lab label; surrounding whitespace is dropped.
    pub fn new(label: impl AsRef<str>) -> Self {
        Self(label.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LabId {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

/// Self-reported gender category.
///
/// Only [`Gender::Male`] and [`Gender::Female`] take part in the
/// no-lone-member rule; every other value is carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Gender {
    Male,
    Female,
    Other(String),
}

impl Gender {
    /// The categories the balance rule applies to.
    pub const BALANCED: [Gender; 2] = [Gender::Male, Gender::Female];

    /// Parses a category. Only the exact codes `M` and `F` (surrounding
    /// whitespace aside) are balanced; anything else is kept verbatim.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "M" => Gender::Male,
            "F" => Gender::Female,
            other => Gender::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
            Gender::Other(raw) => raw,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A normalized student. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Student {
    pub id: StudentId,
    pub lab: LabId,
    pub gender: Gender,
    /// Performance score (WAM).
    pub score: f64,
}

/// Raw input shape before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentRecord {
    pub lab: String,
    pub gender: String,
    pub score: f64,
}

impl StudentRecord {
    pub fn new(lab: impl Into<String>, gender: impl Into<String>, score: f64) -> Self {
        Self {
            lab: lab.into(),
            gender: gender.into(),
            score,
        }
    }
}

/// The validated set of students to allocate.
///
/// # Examples
///
/// ```
/// use team_former::roster::{Roster, StudentRecord};
///
/// let roster = Roster::new(vec![
///     StudentRecord::new("1", "M", 70.0),
///     StudentRecord::new("1", "F", 80.0),
///     StudentRecord::new("2", "x", 60.0),
/// ])
/// .unwrap();
/// assert_eq!(roster.len(), 3);
/// assert_eq!(roster.labs().len(), 2);
/// assert!((roster.mean_score() - 70.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct Roster {
    students: Vec<Student>,
}

impl Roster {
    /// Normalizes raw records, assigning ids `0..n` in input order.
    pub fn new(records: impl IntoIterator<Item = StudentRecord>) -> Result<Self, RosterError> {
        let students = records
            .into_iter()
            .enumerate()
            .map(|(row, record)| Student {
                id: StudentId(row),
                lab: LabId::new(&record.lab),
                gender: Gender::parse(&record.gender),
                score: record.score,
            })
            .collect();
        Self::from_students(students)
    }

    /// Validates already-identified students.
    pub fn from_students(students: Vec<Student>) -> Result<Self, RosterError> {
        if students.is_empty() {
            return Err(RosterError::Empty);
        }
        let mut seen = HashSet::with_capacity(students.len());
        for (row, student) in students.iter().enumerate() {
            if student.lab.as_str().is_empty() {
                return Err(RosterError::EmptyLab { row });
            }
            if !student.score.is_finite() {
                return Err(RosterError::NonFiniteScore {
                    row,
                    score: student.score,
                });
            }
            if !seen.insert(student.id) {
                return Err(RosterError::DuplicateId(student.id));
            }
        }
        Ok(Self { students })
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    pub fn get(&self, id: StudentId) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    /// Students grouped by lab, labs in sorted order, students in roster order.
    pub fn labs(&self) -> BTreeMap<&LabId, Vec<&Student>> {
        let mut labs: BTreeMap<&LabId, Vec<&Student>> = BTreeMap::new();
        for student in &self.students {
            labs.entry(&student.lab).or_default().push(student);
        }
        labs
    }

    /// Class-wide mean score.
    pub fn mean_score(&self) -> f64 {
        self.students.iter().map(|s| s.score).sum::<f64>() / self.students.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gender_parse() {
        assert_eq!(Gender::parse("M"), Gender::Male);
        assert_eq!(Gender::parse(" F "), Gender::Female);
        assert_eq!(Gender::parse("NB"), Gender::Other("NB".into()));
        // Near misses are not coerced into the balanced categories.
        assert_eq!(Gender::parse("f"), Gender::Other("f".into()));
        assert_eq!(Gender::parse("Female"), Gender::Other("Female".into()));
        assert_eq!(Gender::parse("male"), Gender::Other("male".into()));
        assert_eq!(Gender::parse(""), Gender::Other(String::new()));
        assert_eq!(Gender::Other("X".into()).code(), "X");
    }

    #[test]
    fn test_roster_assigns_ids_in_order() {
        let roster = Roster::new(vec![
            StudentRecord::new("2", "M", 50.0),
            StudentRecord::new(" 1 ", "F", 60.0),
        ])
        .unwrap();

        assert_eq!(roster.students()[0].id, StudentId(0));
        assert_eq!(roster.students()[1].lab, LabId::new("1"));
        assert_eq!(roster.get(StudentId(1)).unwrap().gender, Gender::Female);

        let labs: Vec<_> = roster.labs().keys().map(|l| l.to_string()).collect();
        assert_eq!(labs, vec!["1", "2"]);
    }

    #[test]
    fn test_roster_rejects_bad_input() {
        assert!(matches!(Roster::new(Vec::new()), Err(RosterError::Empty)));
        assert!(matches!(
            Roster::new(vec![StudentRecord::new("  ", "M", 1.0)]),
            Err(RosterError::EmptyLab { row: 0 })
        ));
        assert!(matches!(
            Roster::new(vec![
                StudentRecord::new("1", "M", 1.0),
                StudentRecord::new("1", "M", f64::NAN)
            ]),
            Err(RosterError::NonFiniteScore { row: 1, .. })
        ));
    }

    #[test]
    fn test_duplicate_ids() {
        let student = Student {
            id: StudentId(4),
            lab: LabId::new("a"),
            gender: Gender::Male,
            score: 1.0,
        };
        let result = Roster::from_students(vec![student.clone(), student]);
        assert!(matches!(result, Err(RosterError::DuplicateId(StudentId(4)))));
    }
}
