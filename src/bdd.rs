//! Reduced Ordered Binary Decision Diagrams with complement edges.
//!
//! The [`Bdd`] manager owns node storage and the operation cache; all
//! construction goes through [`Bdd::mk_node`], which enforces the two
//! canonicity rules (no duplicate `(var, low, high)` triples, and a high
//! edge that is never complemented), so equal functions are pointer-equal.
//!
//! Variables are 1-indexed positions in the solver's chosen ordering: a
//! smaller variable sits closer to the root. The analysis maps basic events
//! and module pseudo-variables onto this order before building.

use log::debug;

use crate::cache::{OpCache, OpKey};
use crate::reference::Ref;
use crate::table::Table;
use crate::utils::{pairing3, MyHash};

/// A BDD node: a decision on `var` with two children.
///
/// The canonical Shannon form is `f = (v and high) or (not v and low)`.
/// `high` is never stored complemented.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BddNode {
    pub var: u32,
    pub low: Ref,
    pub high: Ref,
}

impl Default for BddNode {
    fn default() -> Self {
        BddNode { var: 0, low: Ref::positive(0), high: Ref::positive(0) }
    }
}

impl MyHash for BddNode {
    fn hash(&self) -> u64 {
        pairing3(self.var as u64, self.low.raw() as u64, self.high.raw() as u64)
    }
}

/// The BDD manager.
pub struct Bdd {
    table: Table<BddNode>,
    ite_cache: OpCache<OpKey, Ref>,
    pub one: Ref,
    pub zero: Ref,
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new()
    }
}

impl Bdd {
    pub fn new() -> Self {
        let mut table = Table::new(16);
        // The single terminal occupies index 1; FALSE is its complement.
        let terminal = table.add(BddNode::default());
        debug_assert_eq!(terminal, 1);
        Bdd {
            table,
            ite_cache: OpCache::new(),
            one: Ref::positive(1),
            zero: Ref::negative(1),
        }
    }

    /// Number of allocated nodes (terminal included).
    pub fn size(&self) -> usize {
        self.table.size()
    }

    pub fn variable(&self, index: u32) -> u32 {
        self.table[index as usize].var
    }
    pub fn low(&self, index: u32) -> Ref {
        self.table[index as usize].low
    }
    pub fn high(&self, index: u32) -> Ref {
        self.table[index as usize].high
    }

    pub fn is_one(&self, node: Ref) -> bool {
        node == self.one
    }
    pub fn is_zero(&self, node: Ref) -> bool {
        node == self.zero
    }
    pub fn is_terminal(&self, node: Ref) -> bool {
        node.index() == 1
    }

    /// Hash-consing constructor maintaining canonicity.
    pub fn mk_node(&mut self, var: u32, low: Ref, high: Ref) -> Ref {
        assert_ne!(var, 0, "Variable index must not be zero");

        // Canonicity: the high edge is never complemented.
        if high.is_negated() {
            return -self.mk_node(var, -low, -high);
        }
        // Redundancy: both children equal.
        if low == high {
            return low;
        }
        let index = self.table.put(BddNode { var, low, high });
        Ref::positive(index as u32)
    }

    pub fn mk_var(&mut self, var: u32) -> Ref {
        self.mk_node(var, self.zero, self.one)
    }

    /// Cofactors of `node` with respect to variable `v`, which must not be
    /// below the node's own top variable.
    pub fn top_cofactors(&self, node: Ref, v: u32) -> (Ref, Ref) {
        assert_ne!(v, 0, "Variable index must not be zero");

        let index = node.index();
        if self.is_terminal(node) || v < self.variable(index) {
            return (node, node);
        }
        assert_eq!(v, self.variable(index));
        if node.is_negated() {
            (-self.low(index), -self.high(index))
        } else {
            (self.low(index), self.high(index))
        }
    }

    /// The ITE operation: `ite(f, g, h) = (f and g) or (not f and h)`.
    pub fn apply_ite(&mut self, f: Ref, g: Ref, h: Ref) -> Ref {
        // Terminal cases.
        if self.is_one(f) {
            return g;
        }
        if self.is_zero(f) {
            return h;
        }
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }

        // Standard triples: reduce g/h to constants where possible.
        let (mut f, mut g, mut h) = (f, g, h);
        if g == f {
            g = self.one; // ite(F,F,H) == ite(F,1,H)
        } else if g == -f {
            g = self.zero; // ite(F,~F,H) == ite(F,0,H)
        }
        if h == f {
            h = self.zero; // ite(F,G,F) == ite(F,G,0)
        } else if h == -f {
            h = self.one; // ite(F,G,~F) == ite(F,G,1)
        }
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }

        // Canonical negations: F and G regular.
        if f.is_negated() {
            f = -f;
            std::mem::swap(&mut g, &mut h);
        }
        let mut negate = false;
        if g.is_negated() {
            negate = true;
            g = -g;
            h = -h;
        }

        let key = OpKey::Ite(f, g, h);
        if let Some(cached) = self.ite_cache.get(&key) {
            return if negate { -cached } else { cached };
        }

        // Top variable of the triple.
        let mut m = self.variable(f.index());
        for operand in [g, h] {
            if !self.is_terminal(operand) {
                m = m.min(self.variable(operand.index()));
            }
        }
        debug_assert_ne!(m, 0);

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let low = self.apply_ite(f0, g0, h0);
        let high = self.apply_ite(f1, g1, h1);
        let result = self.mk_node(m, low, high);
        debug!("ite({}, {}, {}) -> {}", f, g, h, result);

        self.ite_cache.insert(key, result);
        if negate {
            -result
        } else {
            result
        }
    }

    pub fn apply_and(&mut self, u: Ref, v: Ref) -> Ref {
        let zero = self.zero;
        self.apply_ite(u, v, zero)
    }

    pub fn apply_or(&mut self, u: Ref, v: Ref) -> Ref {
        let one = self.one;
        self.apply_ite(u, one, v)
    }

    pub fn apply_xor(&mut self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, -v, v)
    }

    /// K-out-of-N over arbitrary operands, by the Shannon recursion on the
    /// argument list.
    pub fn apply_atleast(&mut self, k: u32, args: &[Ref]) -> Ref {
        let mut memo = std::collections::HashMap::new();
        self.atleast_rec(k, args, 0, &mut memo)
    }

    fn atleast_rec(
        &mut self,
        k: u32,
        args: &[Ref],
        start: usize,
        memo: &mut std::collections::HashMap<(u32, usize), Ref>,
    ) -> Ref {
        let remaining = (args.len() - start) as u32;
        if k == 0 {
            return self.one;
        }
        if k > remaining {
            return self.zero;
        }
        if let Some(&cached) = memo.get(&(k, start)) {
            return cached;
        }
        let first = args[start];
        let with_first = self.atleast_rec(k - 1, args, start + 1, memo);
        let without_first = self.atleast_rec(k, args, start + 1, memo);
        let result = self.apply_ite(first, with_first, without_first);
        memo.insert((k, start), result);
        result
    }

    /// Probability of the function by memoized Shannon expansion in
    /// variable order. `var_prob[v]` is the probability of variable `v`
    /// (1-indexed).
    pub fn probability(&self, f: Ref, var_prob: &[f64]) -> f64 {
        let mut cache = std::collections::HashMap::new();
        self.probability_rec(f, var_prob, &mut cache)
    }

    fn probability_rec(
        &self,
        f: Ref,
        var_prob: &[f64],
        cache: &mut std::collections::HashMap<u32, f64>,
    ) -> f64 {
        if self.is_one(f) {
            return 1.0;
        }
        if self.is_zero(f) {
            return 0.0;
        }
        let index = f.index();
        let positive = match cache.get(&index) {
            Some(&p) => p,
            None => {
                let p_var = var_prob[self.variable(index) as usize];
                let p_high = self.probability_rec(self.high(index), var_prob, cache);
                let p_low = self.probability_rec(self.low(index), var_prob, cache);
                let p = p_var * p_high + (1.0 - p_var) * p_low;
                cache.insert(index, p);
                p
            }
        };
        if f.is_negated() {
            1.0 - positive
        } else {
            positive
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminals() {
        let bdd = Bdd::new();
        assert!(bdd.is_one(bdd.one));
        assert!(bdd.is_zero(bdd.zero));
        assert_eq!(-bdd.one, bdd.zero);
    }

    #[test]
    fn test_mk_node_canonicity() {
        let mut bdd = Bdd::new();
        let x1 = bdd.mk_var(1);
        let x1_again = bdd.mk_var(1);
        assert_eq!(x1, x1_again);

        // A complemented high edge is normalized away.
        let one = bdd.one;
        let zero = bdd.zero;
        let direct = bdd.mk_node(2, one, zero);
        assert!(!bdd.high(direct.index()).is_negated());
        let var = bdd.mk_var(2);
        assert_eq!(direct, -var);
    }

    #[test]
    fn test_apply_ite_terminal_cases() {
        let mut bdd = Bdd::new();
        let g = bdd.mk_var(2);
        let h = bdd.mk_var(3);
        let one = bdd.one;
        let zero = bdd.zero;
        assert_eq!(bdd.apply_ite(one, g, h), g);
        assert_eq!(bdd.apply_ite(zero, g, h), h);

        let f = bdd.mk_var(1);
        assert_eq!(bdd.apply_ite(f, g, g), g);
        assert_eq!(bdd.apply_ite(f, one, zero), f);
        assert_eq!(bdd.apply_ite(f, zero, one), -f);
    }

    #[test]
    fn test_and_or_de_morgan() {
        let mut bdd = Bdd::new();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let and = bdd.apply_and(x, y);
        let or = bdd.apply_or(-x, -y);
        assert_eq!(-and, or);
    }

    #[test]
    fn test_xor() {
        let mut bdd = Bdd::new();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let xor = bdd.apply_xor(x, y);
        let left = bdd.apply_and(x, -y);
        let right = bdd.apply_and(-x, y);
        let manual = bdd.apply_or(left, right);
        assert_eq!(xor, manual);
        assert_eq!(bdd.apply_xor(x, x), bdd.zero);
    }

    #[test]
    fn test_atleast() {
        let mut bdd = Bdd::new();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let z = bdd.mk_var(3);
        let args = vec![x, y, z];
        let two_of_three = bdd.apply_atleast(2, &args);

        let xy = bdd.apply_and(x, y);
        let xz = bdd.apply_and(x, z);
        let yz = bdd.apply_and(y, z);
        let or1 = bdd.apply_or(xy, xz);
        let manual = bdd.apply_or(or1, yz);
        assert_eq!(two_of_three, manual);

        let all = bdd.apply_atleast(3, &args);
        let and1 = bdd.apply_and(x, y);
        let manual_all = bdd.apply_and(and1, z);
        assert_eq!(all, manual_all);

        let any = bdd.apply_atleast(1, &args);
        let or_a = bdd.apply_or(x, y);
        let manual_any = bdd.apply_or(or_a, z);
        assert_eq!(any, manual_any);
    }

    #[test]
    fn test_probability() {
        let mut bdd = Bdd::new();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        // P(x or y) = 1 - 0.9 * 0.8 = 0.28
        let or = bdd.apply_or(x, y);
        let probs = vec![0.0, 0.1, 0.2]; // 1-indexed
        assert!((bdd.probability(or, &probs) - 0.28).abs() < 1e-12);
        // P(x and y) = 0.02
        let and = bdd.apply_and(x, y);
        assert!((bdd.probability(and, &probs) - 0.02).abs() < 1e-12);
        // P(xor) = 0.1*0.8 + 0.9*0.2 = 0.26
        let xor = bdd.apply_xor(x, y);
        assert!((bdd.probability(xor, &probs) - 0.26).abs() < 1e-12);
        // Complement edge.
        assert!((bdd.probability(-or, &probs) - 0.72).abs() < 1e-12);
    }

    #[test]
    fn test_probability_atleast() {
        let mut bdd = Bdd::new();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let z = bdd.mk_var(3);
        let args = vec![x, y, z];
        let vote = bdd.apply_atleast(2, &args);
        let probs = vec![0.0, 0.1, 0.1, 0.1];
        // 3 * p^2 (1-p) + p^3 = 0.028
        assert!((bdd.probability(vote, &probs) - 0.028).abs() < 1e-12);
    }
}
