//! Type-safe wrappers for analysis variables and signed literals.
//!
//! These newtypes enforce a compile-time distinction between basic-event
//! variable IDs and signed literals, preventing index mixups in the solver
//! code.

use std::fmt;

/// A variable identifier (1-indexed).
///
/// A variable stands for one basic event of the analyzed fault tree. IDs are
/// assigned once, when the PDAG is built, and stay stable across the whole
/// analysis; 0 is reserved for terminals and sentinels.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Var(u32);

impl Var {
    /// Creates a new variable with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if `id == 0`. Variables must be 1-indexed.
    pub fn new(id: u32) -> Self {
        assert_ne!(id, 0, "Variable IDs must be >= 1");
        Var(id)
    }

    /// Returns the raw variable ID as a `u32`.
    pub fn id(self) -> u32 {
        self.0
    }

    /// Returns the variable ID as a `usize` for array indexing.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

impl From<Var> for u32 {
    fn from(var: Var) -> Self {
        var.0
    }
}

/// A signed literal: a variable together with a complement flag.
///
/// Products (cut sets and prime implicants) are ordered sequences of
/// literals. The ordering is by variable first, positive polarity before
/// negative, which keeps product listings stable.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Lit {
    var: Var,
    complement: bool,
}

impl Lit {
    /// A positive (non-complemented) literal.
    pub fn pos(var: Var) -> Self {
        Lit { var, complement: false }
    }

    /// A complemented literal.
    pub fn neg(var: Var) -> Self {
        Lit { var, complement: true }
    }

    /// The underlying variable.
    pub fn var(self) -> Var {
        self.var
    }

    /// True if the literal is complemented.
    pub fn is_complement(self) -> bool {
        self.complement
    }
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", if self.complement { "~" } else { "" }, self.var)
    }
}
