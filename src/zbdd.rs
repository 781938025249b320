//! Zero-suppressed Binary Decision Diagrams for sets of products.
//!
//! The [`Zbdd`] manager represents families of products (sets of signed
//! literals encoded as plain `u32` variables). [`Zbdd::mk_node`] applies the
//! zero-suppression rule: a node whose `high` child is the empty family is
//! elided, which is what makes sparse product sets compact.
//!
//! The minimization operations are the heart of the cut-set post-processor:
//! [`Zbdd::minimize`] removes non-minimal products under set inclusion via
//! the subsumed-difference [`Zbdd::without`], and [`Zbdd::join`] is the
//! order-bounded product used by AND gates and module expansion.
//!
//! References in this manager are always positive; polarity of literals
//! lives in the variable encoding chosen by the solver (even = positive
//! literal, odd = complemented).

use log::debug;

use crate::cache::{OpCache, OpKey};
use crate::reference::Ref;
use crate::table::Table;
use crate::utils::{pairing3, MyHash};

/// A ZBDD node: `low` holds products without `var`, `high` products that
/// contain it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ZbddNode {
    pub var: u32,
    pub low: Ref,
    pub high: Ref,
}

impl Default for ZbddNode {
    fn default() -> Self {
        ZbddNode { var: 0, low: Ref::positive(0), high: Ref::positive(0) }
    }
}

impl MyHash for ZbddNode {
    fn hash(&self) -> u64 {
        pairing3(self.var as u64, self.low.raw() as u64, self.high.raw() as u64)
    }
}

/// Budget value meaning "no order bound".
pub const UNBOUNDED: u32 = u32::MAX;

fn dec(budget: u32) -> u32 {
    if budget == UNBOUNDED {
        budget
    } else {
        budget - 1
    }
}

/// The ZBDD manager.
pub struct Zbdd {
    table: Table<ZbddNode>,
    cache: OpCache<OpKey, Ref>,
    zero: Ref,
    one: Ref,
}

impl Default for Zbdd {
    fn default() -> Self {
        Zbdd::new()
    }
}

impl Zbdd {
    pub fn new() -> Self {
        let mut table = Table::new(16);
        let zero = table.add(ZbddNode::default());
        let one = table.add(ZbddNode::default());
        debug_assert_eq!((zero, one), (1, 2));
        Zbdd {
            table,
            cache: OpCache::new(),
            zero: Ref::positive(1),
            one: Ref::positive(2),
        }
    }

    /// The empty family (no products).
    pub fn zero(&self) -> Ref {
        self.zero
    }
    /// The family of only the empty product (the Boolean base/unity set).
    pub fn one(&self) -> Ref {
        self.one
    }

    pub fn is_zero(&self, node: Ref) -> bool {
        node == self.zero
    }
    pub fn is_one(&self, node: Ref) -> bool {
        node == self.one
    }
    pub fn is_terminal(&self, node: Ref) -> bool {
        node.index() <= 2
    }

    pub fn var(&self, node: Ref) -> u32 {
        self.table[node.index() as usize].var
    }
    pub fn low(&self, node: Ref) -> Ref {
        self.table[node.index() as usize].low
    }
    pub fn high(&self, node: Ref) -> Ref {
        self.table[node.index() as usize].high
    }

    pub fn size(&self) -> usize {
        self.table.size()
    }

    /// Hash-consing constructor with the zero-suppression rule.
    pub fn mk_node(&mut self, var: u32, low: Ref, high: Ref) -> Ref {
        assert_ne!(var, 0, "Variable index must not be zero");
        assert!(!low.is_negated() && !high.is_negated());

        if self.is_zero(high) {
            return low; // zero-suppression
        }
        debug_assert!(
            self.is_terminal(low) || self.var(low) > var,
            "ZBDD ordering violated on the low edge"
        );
        debug_assert!(
            self.is_terminal(high) || self.var(high) > var,
            "ZBDD ordering violated on the high edge"
        );
        let index = self.table.put(ZbddNode { var, low, high });
        Ref::positive(index as u32)
    }

    /// The family of exactly one product over the given variables.
    pub fn product(&mut self, vars: impl IntoIterator<Item = u32>) -> Ref {
        let mut vars: Vec<u32> = vars.into_iter().collect();
        vars.sort_unstable();
        vars.dedup();
        let mut current = self.one;
        for var in vars.into_iter().rev() {
            let zero = self.zero;
            current = self.mk_node(var, zero, current);
        }
        current
    }

    /// True if the empty product belongs to the family.
    pub fn contains_empty(&self, node: Ref) -> bool {
        if self.is_one(node) {
            return true;
        }
        if self.is_zero(node) {
            return false;
        }
        self.contains_empty(self.low(node))
    }
}

// Set operations.
impl Zbdd {
    /// Set union of two families.
    pub fn union(&mut self, f: Ref, g: Ref) -> Ref {
        if self.is_zero(f) {
            return g;
        }
        if self.is_zero(g) || f == g {
            return f;
        }

        let key = OpKey::commutative_union(f, g);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let result = if self.is_one(f) {
            let var = self.var(g);
            let low = self.union(self.low(g), self.one);
            let high = self.high(g);
            self.mk_node(var, low, high)
        } else if self.is_one(g) {
            let var = self.var(f);
            let low = self.union(self.low(f), self.one);
            let high = self.high(f);
            self.mk_node(var, low, high)
        } else {
            let i = self.var(f);
            let j = self.var(g);
            if i < j {
                let low = self.union(self.low(f), g);
                let high = self.high(f);
                self.mk_node(i, low, high)
            } else if j < i {
                let low = self.union(f, self.low(g));
                let high = self.high(g);
                self.mk_node(j, low, high)
            } else {
                let low = self.union(self.low(f), self.low(g));
                let high = self.union(self.high(f), self.high(g));
                self.mk_node(i, low, high)
            }
        };

        self.cache.insert(key, result);
        result
    }

    /// Removes products with more than `budget` variables.
    pub fn truncate(&mut self, f: Ref, budget: u32) -> Ref {
        if self.is_terminal(f) || budget == UNBOUNDED {
            return f;
        }
        if budget == 0 {
            return if self.contains_empty(f) { self.one } else { self.zero };
        }

        let key = OpKey::Truncate(f, budget);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let var = self.var(f);
        let low = self.truncate(self.low(f), budget);
        let high = self.truncate(self.high(f), budget - 1);
        let result = self.mk_node(var, low, high);

        self.cache.insert(key, result);
        result
    }

    /// The product-wise combination of two families (every product of `f`
    /// united with every product of `g`), dropping products that would
    /// exceed `budget` variables. This is the AND of product sets.
    pub fn join(&mut self, f: Ref, g: Ref, budget: u32) -> Ref {
        if self.is_zero(f) || self.is_zero(g) {
            return self.zero;
        }
        if self.is_one(f) {
            return self.truncate(g, budget);
        }
        if self.is_one(g) {
            return self.truncate(f, budget);
        }
        if budget == 0 {
            // Only the combination of two empty products can survive.
            return if self.contains_empty(f) && self.contains_empty(g) {
                self.one
            } else {
                self.zero
            };
        }

        let key = OpKey::commutative_join(f, g, budget);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let i = self.var(f);
        let j = self.var(g);
        let result = if i == j {
            let low = self.join(self.low(f), self.low(g), budget);
            let h1 = self.join(self.high(f), self.high(g), dec(budget));
            let h2 = self.join(self.high(f), self.low(g), dec(budget));
            let h3 = self.join(self.low(f), self.high(g), dec(budget));
            let high = self.union(h1, h2);
            let high = self.union(high, h3);
            self.mk_node(i, low, high)
        } else if i < j {
            let low = self.join(self.low(f), g, budget);
            let high = self.join(self.high(f), g, dec(budget));
            self.mk_node(i, low, high)
        } else {
            let low = self.join(f, self.low(g), budget);
            let high = self.join(f, self.high(g), dec(budget));
            self.mk_node(j, low, high)
        };

        self.cache.insert(key, result);
        result
    }

    /// Subsumed difference: products of `f` that are not a superset of (or
    /// equal to) any product of `g`.
    pub fn without(&mut self, f: Ref, g: Ref) -> Ref {
        if self.is_zero(f) || f == g {
            return self.zero;
        }
        if self.is_zero(g) {
            return f;
        }
        if self.contains_empty(g) {
            return self.zero; // the empty product subsumes everything
        }
        if self.is_one(f) {
            return self.one;
        }

        let key = OpKey::Without(f, g);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let i = self.var(f);
        let j = self.var(g);
        let result = if j < i {
            self.without(f, self.low(g))
        } else if i < j {
            let low = self.without(self.low(f), g);
            let high = self.without(self.high(f), g);
            self.mk_node(i, low, high)
        } else {
            let low = self.without(self.low(f), self.low(g));
            let with_var = self.without(self.high(f), self.high(g));
            let high = self.without(with_var, self.low(g));
            self.mk_node(i, low, high)
        };

        self.cache.insert(key, result);
        result
    }

    /// Minimal products under set inclusion:
    /// `min(P) = { p in P : no q in P, q strictly subset of p }`.
    pub fn minimize(&mut self, f: Ref) -> Ref {
        if self.is_terminal(f) {
            return f;
        }
        if self.contains_empty(f) {
            return self.one; // the unity product absorbs the family
        }

        let key = OpKey::Minimize(f);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let var = self.var(f);
        let low = self.minimize(self.low(f));
        let high = self.minimize(self.high(f));
        let high = self.without(high, low);
        let result = self.mk_node(var, low, high);
        debug!("minimize({}) -> {}", f, result);

        self.cache.insert(key, result);
        result
    }

    /// Products containing `var`, with `var` removed from each.
    pub fn subset1(&mut self, f: Ref, var: u32) -> Ref {
        if self.is_terminal(f) {
            return self.zero;
        }
        let top = self.var(f);
        if top > var {
            return self.zero;
        }
        if top == var {
            return self.high(f);
        }

        let key = OpKey::Subset1(f, var);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }
        let low = self.subset1(self.low(f), var);
        let high = self.subset1(self.high(f), var);
        let result = self.mk_node(top, low, high);
        self.cache.insert(key, result);
        result
    }

    /// Products not containing `var`.
    pub fn subset0(&mut self, f: Ref, var: u32) -> Ref {
        if self.is_terminal(f) {
            return f;
        }
        let top = self.var(f);
        if top > var {
            return f;
        }
        if top == var {
            return self.low(f);
        }

        let key = OpKey::Subset0(f, var);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }
        let low = self.subset0(self.low(f), var);
        let high = self.subset0(self.high(f), var);
        let result = self.mk_node(top, low, high);
        self.cache.insert(key, result);
        result
    }
}

// Product enumeration.
impl Zbdd {
    /// Iterates over the products of a family as sorted variable lists.
    pub fn products(&self, node: Ref) -> ZbddProducts<'_> {
        ZbddProducts::new(self, node)
    }

    /// The number of products in the family.
    pub fn count(&self, node: Ref) -> usize {
        self.products(node).count()
    }
}

/// Depth-first iterator over the products of one family.
pub struct ZbddProducts<'a> {
    zbdd: &'a Zbdd,
    stack: Vec<(Ref, Vec<u32>)>,
}

impl<'a> ZbddProducts<'a> {
    fn new(zbdd: &'a Zbdd, node: Ref) -> Self {
        ZbddProducts { zbdd, stack: vec![(node, Vec::new())] }
    }
}

impl Iterator for ZbddProducts<'_> {
    type Item = Vec<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((node, product)) = self.stack.pop() {
            if self.zbdd.is_zero(node) {
                continue;
            }
            if self.zbdd.is_one(node) {
                return Some(product);
            }
            let var = self.zbdd.var(node);
            self.stack.push((self.zbdd.low(node), product.clone()));
            let mut with_var = product;
            with_var.push(var);
            self.stack.push((self.zbdd.high(node), with_var));
        }
        None
    }
}
