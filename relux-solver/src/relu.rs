//! ReLU pair registry.
//!
//! Each rectifier constraint `f = max(0, b)` is a pair of variables
//! registered here. The registry answers b/f membership and partner lookup;
//! the solver keeps the dissolution state (split or merged pairs)
//! separately, since it is snapshotted and restored by the decision stack.

use relux_core::{Result, SolverError, Var};
use rustc_hash::FxHashMap;

/// How a pair left the active set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DissolutionKind {
    /// Inactive branch: `ub(b) <= 0` and f fixed at zero.
    Split,
    /// Active branch: b identified with f, `lb(f) >= 0`.
    Merge,
}

/// The set of registered `(b, f)` pairs with both-way lookup.
#[derive(Debug, Clone, Default)]
pub struct ReluPairs {
    pairs: Vec<(Var, Var)>,
    b_to_f: FxHashMap<Var, Var>,
    f_to_b: FxHashMap<Var, Var>,
}

impl ReluPairs {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the pair `(b, f)`.
    pub fn add_pair(&mut self, b: Var, f: Var) {
        self.pairs.push((b, f));
        self.b_to_f.insert(b, f);
        self.f_to_b.insert(f, b);
    }

    /// Is `var` the b member of some pair?
    #[must_use]
    pub fn is_b(&self, var: Var) -> bool {
        self.b_to_f.contains_key(&var)
    }

    /// Is `var` the f member of some pair?
    #[must_use]
    pub fn is_f(&self, var: Var) -> bool {
        self.f_to_b.contains_key(&var)
    }

    /// Does `var` belong to any pair?
    #[must_use]
    pub fn is_relu(&self, var: Var) -> bool {
        self.is_b(var) || self.is_f(var)
    }

    /// The other member of `var`'s pair.
    pub fn partner(&self, var: Var) -> Result<Var> {
        if let Some(&f) = self.b_to_f.get(&var) {
            return Ok(f);
        }
        if let Some(&b) = self.f_to_b.get(&var) {
            return Ok(b);
        }
        Err(SolverError::NotReluVariable(var))
    }

    /// The f member of `var`'s pair (`var` itself when it is the f).
    pub fn to_f(&self, var: Var) -> Result<Var> {
        if self.is_f(var) {
            Ok(var)
        } else {
            self.partner(var)
        }
    }

    /// All registered pairs, in registration order.
    #[must_use]
    pub fn pairs(&self) -> &[(Var, Var)] {
        &self.pairs
    }

    /// Number of registered pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Is the registry empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_and_partner() {
        let mut pairs = ReluPairs::new();
        pairs.add_pair(1, 2);
        pairs.add_pair(3, 4);

        assert!(pairs.is_b(1));
        assert!(pairs.is_f(2));
        assert!(pairs.is_relu(3));
        assert!(!pairs.is_relu(0));

        assert_eq!(pairs.partner(1).unwrap(), 2);
        assert_eq!(pairs.partner(4).unwrap(), 3);
        assert_eq!(pairs.to_f(3).unwrap(), 4);
        assert_eq!(pairs.to_f(4).unwrap(), 4);
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn test_non_relu_errors() {
        let pairs = ReluPairs::new();
        assert_eq!(pairs.partner(7), Err(SolverError::NotReluVariable(7)));
    }
}
