//! Shared cut-set solver infrastructure.
//!
//! [`CutSetSolver`] drives one of the three engines over a preprocessed
//! PDAG and post-processes the result into minimal products:
//!
//! - literals are encoded as ZBDD variables `2*(position+1)` (positive) and
//!   `2*(position+1)+1` (complemented), where `position` is the node's slot
//!   in the solver's variable order;
//! - modules are pseudo-literals: each module is solved as its own
//!   sub-problem, stays opaque through minimization, and is expanded
//!   afterwards (module independence preserves minimality; the order bound
//!   is re-enforced during expansion);
//! - the variable order is the depth-first discovery order from the root
//!   with every module's variables placed contiguously after the module
//!   itself; the heuristic is pluggable through [`VariableOrdering`].
//!
//! Without `prime_implicants`, complemented literals are dropped from
//! products (the classical conservative cut-set treatment of non-coherent
//! functions). With it, the BDD engine computes exact prime implicants by
//! the consensus recursion.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::analysis::CancelToken;
use crate::bdd::Bdd;
use crate::error::{Error, Result};
use crate::mocus;
use crate::pdag::{GateKind, Pdag, TRUE};
use crate::products::Product;
use crate::reference::Ref;
use crate::settings::Algorithm;
use crate::types::{Lit, Var};
use crate::zbdd::{Zbdd, UNBOUNDED};

/// The pluggable BDD/ZBDD variable ordering heuristic.
///
/// Returns the PDAG node indices (variables and, when modules are kept
/// opaque, module gates) of the sub-graph under `root`, top of the order
/// first. Implementations must be deterministic.
pub trait VariableOrdering {
    fn order(&self, pdag: &Pdag, modules_as_leaves: bool) -> Vec<u32>;
}

/// The default heuristic: depth-first discovery order from the root
/// (a reverse-topological layout of the preprocessed graph), with each
/// module's variables contiguous after the module pseudo-variable.
pub struct TopologicalOrdering;

impl VariableOrdering for TopologicalOrdering {
    fn order(&self, pdag: &Pdag, modules_as_leaves: bool) -> Vec<u32> {
        let mut order = Vec::new();
        let root = pdag.root();
        if !pdag.is_gate(root) {
            if pdag.is_variable(root) {
                order.push(root.index());
            }
            return order;
        }
        let mut seen = HashSet::new();
        seen.insert(root.index());
        discover(pdag, root.index(), modules_as_leaves, &mut seen, &mut order);
        order
    }
}

fn discover(
    pdag: &Pdag,
    gate_index: u32,
    modules_as_leaves: bool,
    seen: &mut HashSet<u32>,
    order: &mut Vec<u32>,
) {
    for &arg in &pdag.gate(gate_index).args {
        let index = arg.index();
        if pdag.is_constant(arg) || !seen.insert(index) {
            continue;
        }
        if pdag.is_variable(arg) {
            order.push(index);
        } else if modules_as_leaves && pdag.gate(index).module {
            // The module pseudo-variable, then its own leaves right after.
            order.push(index);
            discover(pdag, index, modules_as_leaves, seen, order);
        } else {
            discover(pdag, index, modules_as_leaves, seen, order);
        }
    }
}

/// One qualitative analysis: PDAG in, minimal products out.
pub struct CutSetSolver<'a> {
    pdag: &'a Pdag,
    cancel: &'a CancelToken,
    limit: u32,
    prime_implicants: bool,
    modules_as_leaves: bool,
    zbdd: Zbdd,
    /// position -> PDAG node index.
    order: Vec<u32>,
    /// PDAG node index -> position.
    position: HashMap<u32, usize>,
    /// Solved module families.
    module_cache: HashMap<u32, Ref>,
    bdd: Bdd,
    bdd_memo: HashMap<u32, Ref>,
    mcs_memo: HashMap<(u32, u32), Ref>,
    pi_memo: HashMap<(u32, u32), Ref>,
    zdirect_memo: HashMap<u32, Ref>,
}

impl<'a> CutSetSolver<'a> {
    pub fn new(
        pdag: &'a Pdag,
        limit_order: usize,
        prime_implicants: bool,
        cancel: &'a CancelToken,
    ) -> Self {
        Self::with_ordering(pdag, limit_order, prime_implicants, cancel, &TopologicalOrdering)
    }

    pub fn with_ordering(
        pdag: &'a Pdag,
        limit_order: usize,
        prime_implicants: bool,
        cancel: &'a CancelToken,
        ordering: &dyn VariableOrdering,
    ) -> Self {
        let limit = if limit_order == 0 { UNBOUNDED } else { limit_order as u32 };
        // Prime implicants may complement module pseudo-literals, which the
        // expansion cannot resolve, so modules stay inline in that mode.
        let modules_as_leaves = !prime_implicants;
        let order = ordering.order(pdag, modules_as_leaves);
        let position = order.iter().enumerate().map(|(p, &node)| (node, p)).collect();
        CutSetSolver {
            pdag,
            cancel,
            limit,
            prime_implicants,
            modules_as_leaves,
            zbdd: Zbdd::new(),
            order,
            position,
            module_cache: HashMap::new(),
            bdd: Bdd::new(),
            bdd_memo: HashMap::new(),
            mcs_memo: HashMap::new(),
            pi_memo: HashMap::new(),
            zdirect_memo: HashMap::new(),
        }
    }

    /// Runs the chosen engine and returns the minimal products.
    pub fn solve(&mut self, algorithm: Algorithm) -> Result<Vec<Product>> {
        let root = self.pdag.root();
        let mut family = if self.pdag.is_constant(root) {
            if root == TRUE {
                self.zbdd.one()
            } else {
                self.zbdd.zero()
            }
        } else if self.pdag.is_variable(root) {
            self.leaf_family(root)
        } else if root.is_negated() {
            return Err(Error::Logic(
                "the preprocessed root still carries a complement".to_string(),
            ));
        } else {
            self.solve_gate(root.index(), algorithm)?
        };

        family = self.expand_modules(family, algorithm)?;
        family = self.zbdd.truncate(family, self.limit);
        family = self.zbdd.minimize(family);
        debug!(
            "solved with {}: {} products, {} zbdd nodes",
            algorithm,
            self.zbdd.count(family),
            self.zbdd.size()
        );
        Ok(self.extract(family))
    }

    fn solve_gate(&mut self, sub_root: u32, algorithm: Algorithm) -> Result<Ref> {
        if let Some(&cached) = self.module_cache.get(&sub_root) {
            return Ok(cached);
        }
        let raw = match algorithm {
            Algorithm::Bdd => self.solve_bdd(sub_root)?,
            Algorithm::Zbdd => self.solve_zbdd(sub_root)?,
            Algorithm::Mocus => self.solve_mocus(sub_root)?,
        };
        let truncated = self.zbdd.truncate(raw, self.limit);
        let family = self.zbdd.minimize(truncated);
        self.module_cache.insert(sub_root, family);
        Ok(family)
    }

    /// Substitutes every module pseudo-literal with the module's own
    /// minimal products. Positions are processed in order, so a module's
    /// nested modules (placed after it) are expanded in later iterations.
    fn expand_modules(&mut self, mut family: Ref, algorithm: Algorithm) -> Result<Ref> {
        if !self.modules_as_leaves {
            return Ok(family);
        }
        for p in 0..self.order.len() {
            let node_index = self.order[p];
            if !self.pdag.is_gate(Ref::positive(node_index)) {
                continue;
            }
            self.cancel.check()?;
            let pseudo = pos_literal(p);
            let with_module = self.zbdd.subset1(family, pseudo);
            if self.zbdd.is_zero(with_module) {
                continue;
            }
            let without_module = self.zbdd.subset0(family, pseudo);
            let module_family = self.solve_gate(node_index, algorithm)?;
            let substituted = self.zbdd.join(with_module, module_family, self.limit);
            family = self.zbdd.union(without_module, substituted);
            family = self.zbdd.truncate(family, self.limit);
            debug!("expanded module at node {}", node_index);
        }
        Ok(family)
    }

    fn extract(&self, family: Ref) -> Vec<Product> {
        let mut products = Vec::new();
        for zvars in self.zbdd.products(family) {
            let literals = zvars
                .into_iter()
                .map(|zvar| {
                    let node = self.order[(zvar / 2 - 1) as usize];
                    debug_assert!(self.pdag.is_variable(Ref::positive(node)));
                    if zvar % 2 == 1 {
                        Lit::neg(Var::new(node))
                    } else {
                        Lit::pos(Var::new(node))
                    }
                })
                .collect();
            products.push(Product::new(literals));
        }
        products
    }

    /// The family of a leaf reference. Complemented literals survive only
    /// in prime-implicant mode; otherwise they are dropped (the product
    /// keeps its other literals).
    fn leaf_family(&mut self, node: Ref) -> Ref {
        let p = self.position[&node.index()];
        if !node.is_negated() {
            let zvar = pos_literal(p);
            self.zbdd.product([zvar])
        } else if self.prime_implicants {
            let zvar = neg_literal(p);
            self.zbdd.product([zvar])
        } else {
            self.zbdd.one()
        }
    }
}

fn pos_literal(position: usize) -> u32 {
    2 * (position as u32 + 1)
}

fn neg_literal(position: usize) -> u32 {
    2 * (position as u32 + 1) + 1
}

// The BDD engine.
impl CutSetSolver<'_> {
    fn solve_bdd(&mut self, sub_root: u32) -> Result<Ref> {
        let f = self.bdd_of(Ref::positive(sub_root), sub_root)?;
        if self.prime_implicants {
            Ok(self.pi_from_bdd(f, self.limit))
        } else {
            Ok(self.mcs_from_bdd(f, self.limit))
        }
    }

    /// Bottom-up BDD construction over the solver's variable order.
    fn bdd_of(&mut self, node: Ref, sub_root: u32) -> Result<Ref> {
        if self.pdag.is_constant(node) {
            return Ok(if node == TRUE { self.bdd.one } else { self.bdd.zero });
        }
        let index = node.index();
        let positive = if self.pdag.is_variable(node) {
            let var = self.position[&index] as u32 + 1;
            self.bdd.mk_var(var)
        } else if index != sub_root && self.modules_as_leaves && self.pdag.gate(index).module {
            let var = self.position[&index] as u32 + 1;
            self.bdd.mk_var(var)
        } else if let Some(&cached) = self.bdd_memo.get(&index) {
            cached
        } else {
            self.cancel.check()?;
            let gate = self.pdag.gate(index).clone();
            let mut operands = Vec::with_capacity(gate.args.len());
            for &arg in &gate.args {
                operands.push(self.bdd_of(arg, sub_root)?);
            }
            let result = match gate.kind {
                GateKind::And => {
                    let mut acc = self.bdd.one;
                    for operand in operands {
                        acc = self.bdd.apply_and(acc, operand);
                    }
                    acc
                }
                GateKind::Or => {
                    let mut acc = self.bdd.zero;
                    for operand in operands {
                        acc = self.bdd.apply_or(acc, operand);
                    }
                    acc
                }
                GateKind::Xor => {
                    let mut acc = self.bdd.zero;
                    for operand in operands {
                        acc = self.bdd.apply_xor(acc, operand);
                    }
                    acc
                }
                GateKind::AtLeast(k) => self.bdd.apply_atleast(k, &operands),
                GateKind::Null => operands[0],
            };
            self.bdd_memo.insert(index, result);
            result
        };
        Ok(if node.is_negated() { -positive } else { positive })
    }

    /// Minimal cut sets from the BDD: high branches contribute the decision
    /// variable, low branches contribute nothing, so complemented literals
    /// never enter the products.
    fn mcs_from_bdd(&mut self, f: Ref, budget: u32) -> Ref {
        if self.bdd.is_one(f) {
            return self.zbdd.one();
        }
        if self.bdd.is_zero(f) {
            return self.zbdd.zero();
        }
        if let Some(&cached) = self.mcs_memo.get(&(f.raw(), budget)) {
            return cached;
        }
        let v = self.bdd.variable(f.index());
        let (f0, f1) = self.bdd.top_cofactors(f, v);
        let with_var = if budget > 0 {
            let z1 = self.mcs_from_bdd(f1, decrement(budget));
            let zero = self.zbdd.zero();
            self.zbdd.mk_node(2 * v, zero, z1)
        } else {
            self.zbdd.zero()
        };
        let z0 = self.mcs_from_bdd(f0, budget);
        let result = self.zbdd.union(with_var, z0);
        self.mcs_memo.insert((f.raw(), budget), result);
        result
    }

    /// Prime implicants by the consensus recursion:
    /// `PI(f) = PI(f0 and f1)  union  v . (PI(f1) \ PI(f0 and f1))
    ///                         union  ~v . (PI(f0) \ PI(f0 and f1))`.
    fn pi_from_bdd(&mut self, f: Ref, budget: u32) -> Ref {
        if self.bdd.is_one(f) {
            return self.zbdd.one();
        }
        if self.bdd.is_zero(f) {
            return self.zbdd.zero();
        }
        if let Some(&cached) = self.pi_memo.get(&(f.raw(), budget)) {
            return cached;
        }
        let v = self.bdd.variable(f.index());
        let (f0, f1) = self.bdd.top_cofactors(f, v);
        let consensus = self.bdd.apply_and(f0, f1);
        let p_consensus = self.pi_from_bdd(consensus, budget);
        let (with_pos, with_neg) = if budget > 0 {
            let p1 = self.pi_from_bdd(f1, decrement(budget));
            let p0 = self.pi_from_bdd(f0, decrement(budget));
            let p1 = self.zbdd.without(p1, p_consensus);
            let p0 = self.zbdd.without(p0, p_consensus);
            let zero = self.zbdd.zero();
            let with_pos = self.zbdd.mk_node(2 * v, zero, p1);
            let with_neg = self.zbdd.mk_node(2 * v + 1, zero, p0);
            (with_pos, with_neg)
        } else {
            (self.zbdd.zero(), self.zbdd.zero())
        };
        let result = self.zbdd.union(with_pos, with_neg);
        let result = self.zbdd.union(p_consensus, result);
        self.pi_memo.insert((f.raw(), budget), result);
        result
    }
}

// The direct ZBDD engine.
impl CutSetSolver<'_> {
    fn solve_zbdd(&mut self, sub_root: u32) -> Result<Ref> {
        self.zbdd_of(Ref::positive(sub_root), sub_root)
    }

    fn zbdd_of(&mut self, node: Ref, sub_root: u32) -> Result<Ref> {
        if self.pdag.is_constant(node) {
            return Ok(if node == TRUE { self.zbdd.one() } else { self.zbdd.zero() });
        }
        if self.pdag.is_variable(node) {
            return Ok(self.leaf_family(node));
        }
        let index = node.index();
        if node.is_negated() {
            return Err(Error::Logic(
                "the ZBDD engine requires complements at the leaves".to_string(),
            ));
        }
        if index != sub_root && self.modules_as_leaves && self.pdag.gate(index).module {
            let p = self.position[&index];
            let zvar = pos_literal(p);
            return Ok(self.zbdd.product([zvar]));
        }
        if let Some(&cached) = self.zdirect_memo.get(&index) {
            return Ok(cached);
        }
        self.cancel.check()?;
        let gate = self.pdag.gate(index).clone();
        let mut operands = Vec::with_capacity(gate.args.len());
        for &arg in &gate.args {
            operands.push(self.zbdd_of(arg, sub_root)?);
        }
        let result = match gate.kind {
            GateKind::And => {
                let mut acc = self.zbdd.one();
                for operand in operands {
                    acc = self.zbdd.join(acc, operand, self.limit);
                }
                acc
            }
            GateKind::Or => {
                let mut acc = self.zbdd.zero();
                for operand in operands {
                    acc = self.zbdd.union(acc, operand);
                }
                acc
            }
            kind => {
                return Err(Error::Logic(format!(
                    "the ZBDD engine requires an AND/OR graph, found {:?}",
                    kind
                )))
            }
        };
        self.zdirect_memo.insert(index, result);
        Ok(result)
    }
}

// The MOCUS engine.
impl CutSetSolver<'_> {
    fn solve_mocus(&mut self, sub_root: u32) -> Result<Ref> {
        let candidates = mocus::expand(
            self.pdag,
            sub_root,
            self.limit,
            self.modules_as_leaves,
            self.cancel,
        )?;
        let mut family = self.zbdd.zero();
        for candidate in candidates {
            let mut zvars = Vec::with_capacity(candidate.len());
            for element in candidate {
                let p = self.position[&element.index()];
                if self.pdag.is_variable(element) {
                    if element.is_negated() {
                        continue; // conservative: complements leave the cut set
                    }
                    zvars.push(pos_literal(p));
                } else {
                    zvars.push(pos_literal(p)); // module pseudo-literal
                }
            }
            let product = self.zbdd.product(zvars);
            family = self.zbdd.union(family, product);
        }
        Ok(family)
    }
}

/// The monolithic top-event BDD used by exact quantification: modules are
/// inlined, every leaf is a basic-event variable.
pub struct TopFunction {
    bdd: Bdd,
    root: Ref,
    /// BDD variable (1-indexed) -> PDAG variable index.
    var_map: Vec<u32>,
}

impl TopFunction {
    pub fn new(pdag: &Pdag, cancel: &CancelToken) -> Result<Self> {
        let mut solver = CutSetSolver::with_ordering(
            pdag,
            0,
            true, // keeps modules inline
            cancel,
            &TopologicalOrdering,
        );
        let root_ref = pdag.root();
        let root = if pdag.is_constant(root_ref) {
            if root_ref == TRUE {
                solver.bdd.one
            } else {
                solver.bdd.zero
            }
        } else {
            let sub_root = root_ref.index();
            solver.bdd_of(root_ref, sub_root)?
        };
        let mut var_map = vec![0; solver.order.len() + 1];
        for (p, &node) in solver.order.iter().enumerate() {
            var_map[p + 1] = node;
        }
        Ok(TopFunction { bdd: solver.bdd, root, var_map })
    }

    /// Exact probability; `var_prob` is indexed by PDAG variable.
    pub fn probability(&self, var_prob: &[f64]) -> f64 {
        let mut ordered = vec![0.0; self.var_map.len()];
        for (bdd_var, &pdag_var) in self.var_map.iter().enumerate().skip(1) {
            ordered[bdd_var] = var_prob[pdag_var as usize];
        }
        self.bdd.probability(self.root, &ordered)
    }

    /// `P(top | var = state)` by conditioning the variable's probability.
    pub fn conditional(&self, var: Var, state: bool, var_prob: &[f64]) -> f64 {
        let mut conditioned = var_prob.to_vec();
        conditioned[var.index()] = if state { 1.0 } else { 0.0 };
        self.probability(&conditioned)
    }
}

fn decrement(budget: u32) -> u32 {
    if budget == UNBOUNDED {
        budget
    } else {
        budget - 1
    }
}
