//! Operation caches for memoized BDD/ZBDD computations.

use std::cell::Cell;
use std::collections::HashMap;
use std::hash::Hash;

use crate::reference::Ref;

/// Operation tags for cache keys.
///
/// One cache per manager holds the results of all binary set operations;
/// the tag keeps results of different operations on the same operands
/// apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKey {
    Ite(Ref, Ref, Ref),
    Union(Ref, Ref),
    /// Order-bounded product of families; the third field is the remaining
    /// size budget.
    Join(Ref, Ref, u32),
    /// Subsumed difference: products of the first family not covered by a
    /// subset in the second.
    Without(Ref, Ref),
    Minimize(Ref),
    Truncate(Ref, u32),
    /// Products containing the variable, with the variable removed.
    Subset1(Ref, u32),
    /// Products not containing the variable.
    Subset0(Ref, u32),
}

impl OpKey {
    /// Normalizes operand order for commutative operations.
    pub fn commutative_union(f: Ref, g: Ref) -> Self {
        if f.raw() <= g.raw() {
            OpKey::Union(f, g)
        } else {
            OpKey::Union(g, f)
        }
    }

    pub fn commutative_join(f: Ref, g: Ref, budget: u32) -> Self {
        if f.raw() <= g.raw() {
            OpKey::Join(f, g, budget)
        } else {
            OpKey::Join(g, f, budget)
        }
    }
}

/// A `HashMap`-backed memoization cache with hit/miss counters.
pub struct OpCache<K, V> {
    map: HashMap<K, V>,
    hits: Cell<usize>,
    misses: Cell<usize>,
}

impl<K, V> Default for OpCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> OpCache<K, V> {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    /// Number of cache hits so far.
    pub fn hits(&self) -> usize {
        self.hits.get()
    }
    /// Number of cache misses so far.
    pub fn misses(&self) -> usize {
        self.misses.get()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl<K, V> OpCache<K, V>
where
    K: Eq + Hash,
    V: Copy,
{
    /// Get the cached result.
    pub fn get(&self, key: &K) -> Option<V> {
        match self.map.get(key) {
            Some(value) => {
                self.hits.set(self.hits.get() + 1);
                Some(*value)
            }
            None => {
                self.misses.set(self.misses.get() + 1);
                None
            }
        }
    }

    /// Insert a result into the cache.
    pub fn insert(&mut self, key: K, value: V) {
        self.map.insert(key, value);
    }
}
