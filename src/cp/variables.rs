//! CP variable types.

/// Handle to a boolean variable inside a [`CpModel`](super::CpModel).
///
/// Ids are dense indices assigned in creation order, so they can be used
/// to index solution vectors directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VarId(pub(crate) usize);

impl VarId {
    /// Position of the variable in the model's creation order.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A boolean variable (true/false decision).
#[derive(Debug, Clone)]
pub struct BoolVar {
    /// Variable name.
    pub name: String,
    /// Fixed value, if any.
    pub fixed: Option<bool>,
}

impl BoolVar {
    /// Creates a new boolean variable.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fixed: None,
        }
    }

    /// Creates a fixed boolean variable.
    pub fn fixed(name: impl Into<String>, value: bool) -> Self {
        Self {
            name: name.into(),
            fixed: Some(value),
        }
    }
}

/// A weighted linear term `coef * var`.
pub type Term = (VarId, i64);

/// A weighted square of a linear expression: `weight * (sum coef_i * x_i)^2`.
///
/// Used to express quadratic penalties over 0-1 variables without
/// auxiliary integer variables.
#[derive(Debug, Clone)]
pub struct SquaredTerm {
    /// Non-negative multiplier applied to the squared expression.
    pub weight: i64,
    /// Terms of the inner linear expression.
    pub terms: Vec<Term>,
}

impl SquaredTerm {
    /// Creates a squared term.
    pub fn new(weight: i64, terms: Vec<Term>) -> Self {
        Self { weight, terms }
    }

    /// Evaluates the term under a full assignment.
    pub fn evaluate(&self, values: &[bool]) -> i128 {
        let inner: i128 = self
            .terms
            .iter()
            .filter(|(v, _)| values[v.0])
            .map(|&(_, c)| c as i128)
            .sum();
        self.weight as i128 * inner * inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_var() {
        let b = BoolVar::new("flag");
        assert!(b.fixed.is_none());

        let f = BoolVar::fixed("flag2", true);
        assert_eq!(f.fixed, Some(true));
    }

    #[test]
    fn test_squared_term_evaluate() {
        let term = SquaredTerm::new(2, vec![(VarId(0), 3), (VarId(1), -5), (VarId(2), 4)]);
        // (3 - 5)^2 * 2 = 8
        assert_eq!(term.evaluate(&[true, true, false]), 8);
        // nothing selected
        assert_eq!(term.evaluate(&[false, false, false]), 0);
    }
}
