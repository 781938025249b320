//! The PDAG simplification and normalization pipeline.
//!
//! A deterministic sequence of locally idempotent rewrite passes:
//!
//! 1. negation push-down (De Morgan), so only leaf edges carry signs;
//! 2. constant propagation and null-gate elimination, to a fixpoint;
//! 3. K/N and XOR lowering to pure AND/OR when the solver requires it;
//! 4. unit propagation of variables whose probability is the constant
//!    0 or 1;
//! 5. coalescing of single-parent same-type gates and common-subexpression
//!    collapse through the unique table, to a fixpoint;
//! 6. module detection over DFS visit times.
//!
//! Each rewriting pass either strictly reduces the reachable node count or
//! runs a bounded number of times, so the pipeline terminates. Passes
//! allocate replacement nodes instead of editing shared ones; unreachable
//! slots are simply never visited again (the arena outlives the analysis).
//!
//! The cancellation flag is checked at the top of every pass.

use std::collections::HashMap;

use log::debug;

use crate::analysis::CancelToken;
use crate::error::Result;
use crate::pdag::{GateKind, Pdag, FALSE, TRUE};
use crate::reference::Ref;

/// What the consuming solver can digest.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProcessingTarget {
    /// BDD: ATLEAST and XOR stay first-class.
    General,
    /// MOCUS and direct ZBDD: pure AND/OR with signs at the leaves.
    AndOr,
}

/// One run of the pipeline over one PDAG.
pub struct Preprocessor<'a> {
    pdag: &'a mut Pdag,
    cancel: &'a CancelToken,
}

impl<'a> Preprocessor<'a> {
    pub fn new(pdag: &'a mut Pdag, cancel: &'a CancelToken) -> Self {
        Preprocessor { pdag, cancel }
    }

    /// Runs the full pipeline.
    ///
    /// `var_constants` lists variables whose probability is a constant 0 or
    /// 1; they are propagated as Boolean constants (unit propagation).
    pub fn run(
        &mut self,
        target: ProcessingTarget,
        var_constants: &[(u32, bool)],
    ) -> Result<()> {
        debug!(
            "preprocessing: {} nodes, target {:?}",
            self.pdag.size(),
            target
        );

        self.cancel.check()?;
        self.normalize_negations();
        self.cancel.check()?;
        self.propagate_constants();

        if target == ProcessingTarget::AndOr {
            self.cancel.check()?;
            self.lower_atleast();
            self.expand_xor();
            self.normalize_negations();
            self.propagate_constants();
        }

        if !var_constants.is_empty() {
            self.cancel.check()?;
            if self.substitute_variables(var_constants) {
                self.propagate_constants();
            }
        }

        let bound = self.pdag.size() + 2;
        for _ in 0..bound {
            self.cancel.check()?;
            let mut changed = self.coalesce();
            changed |= self.pdag.dedup();
            if changed {
                self.propagate_constants();
            } else {
                break;
            }
        }

        self.cancel.check()?;
        self.detect_modules();
        debug!(
            "preprocessed: root = {}, {} reachable gates",
            self.pdag.root(),
            self.pdag.topological_gates().len()
        );
        Ok(())
    }
}

// Negation push-down.
impl Preprocessor<'_> {
    /// Pushes complements off gates down to the leaves via De Morgan, so
    /// that every gate reference in the graph is positive.
    fn normalize_negations(&mut self) {
        let mut memo = HashMap::new();
        let root = self.pdag.root();
        let new_root = self.push_down(root, &mut memo);
        self.pdag.set_root(new_root);
    }

    fn push_down(&mut self, node: Ref, memo: &mut HashMap<(u32, bool), Ref>) -> Ref {
        if !self.pdag.is_gate(node) {
            return node; // constants and literals keep their signs
        }
        let key = (node.index(), node.is_negated());
        if let Some(&cached) = memo.get(&key) {
            return cached;
        }
        let gate = self.pdag.gate(node.index()).clone();
        let result = if node.is_negated() {
            let n = gate.args.len() as u32;
            match gate.kind {
                GateKind::And => {
                    let args = gate.args.iter().map(|&a| self.push_down(-a, memo)).collect();
                    self.pdag.add_gate(GateKind::Or, args)
                }
                GateKind::Or => {
                    let args = gate.args.iter().map(|&a| self.push_down(-a, memo)).collect();
                    self.pdag.add_gate(GateKind::And, args)
                }
                GateKind::AtLeast(k) => {
                    // not(k of n) == (n - k + 1) of n over complements
                    let args = gate.args.iter().map(|&a| self.push_down(-a, memo)).collect();
                    self.pdag.add_gate(GateKind::AtLeast(n - k + 1), args)
                }
                GateKind::Xor => {
                    // not(a xor b) == (not a) xor b
                    let mut args: Vec<Ref> = gate.args.clone();
                    args[0] = -args[0];
                    let args = args.iter().map(|&a| self.push_down(a, memo)).collect();
                    self.pdag.add_gate(GateKind::Xor, args)
                }
                GateKind::Null => self.push_down(-gate.args[0], memo),
            }
        } else {
            let args: Vec<Ref> = gate.args.iter().map(|&a| self.push_down(a, memo)).collect();
            if args == gate.args {
                node
            } else {
                self.pdag.add_gate(gate.kind, args)
            }
        };
        memo.insert(key, result);
        result
    }
}

// Constant propagation.
impl Preprocessor<'_> {
    /// Folds constants and degenerate gates bottom-up, including tautology
    /// and contradiction detection on commutative gates.
    fn propagate_constants(&mut self) -> bool {
        let mut memo = HashMap::new();
        let root = self.pdag.root();
        let new_root = self.simplify(root, &mut memo);
        let changed = new_root != root;
        self.pdag.set_root(new_root);
        changed
    }

    fn simplify(&mut self, node: Ref, memo: &mut HashMap<u32, Ref>) -> Ref {
        if !self.pdag.is_gate(node) {
            return node;
        }
        let index = node.index();
        if let Some(&cached) = memo.get(&index) {
            return compose_sign(cached, node.is_negated());
        }
        let gate = self.pdag.gate(index).clone();
        let args: Vec<Ref> = gate.args.iter().map(|&a| self.simplify(a, memo)).collect();
        let result = match gate.kind {
            GateKind::And => self.simplify_and_or(GateKind::And, args, &gate, index),
            GateKind::Or => self.simplify_and_or(GateKind::Or, args, &gate, index),
            GateKind::Xor => self.simplify_xor(args, &gate, index),
            GateKind::AtLeast(k) => self.simplify_atleast(k, args, &gate, index),
            GateKind::Null => args[0],
        };
        memo.insert(index, result);
        compose_sign(result, node.is_negated())
    }

    fn simplify_and_or(
        &mut self,
        kind: GateKind,
        args: Vec<Ref>,
        original: &crate::pdag::GateNode,
        index: u32,
    ) -> Ref {
        // AND is dual to OR: swap the roles of the constants.
        let (absorbing, neutral) = match kind {
            GateKind::And => (FALSE, TRUE),
            _ => (TRUE, FALSE),
        };
        let mut kept: Vec<Ref> = Vec::with_capacity(args.len());
        for arg in args {
            if arg == absorbing {
                return absorbing;
            }
            if arg == neutral {
                continue;
            }
            kept.push(arg);
        }
        kept.sort_by_key(|r| r.raw());
        kept.dedup();
        // A gate with both x and ~x: contradiction for AND, tautology for OR.
        for pair in kept.windows(2) {
            if pair[0].index() == pair[1].index() {
                return absorbing;
            }
        }
        match kept.len() {
            0 => neutral,
            1 => kept[0],
            _ => {
                if kept == original.args && kind == original.kind {
                    Ref::positive(index)
                } else {
                    self.pdag.add_gate(kind, kept)
                }
            }
        }
    }

    fn simplify_xor(
        &mut self,
        args: Vec<Ref>,
        original: &crate::pdag::GateNode,
        index: u32,
    ) -> Ref {
        // XOR is parity: constants and sign flips fold into one bit, equal
        // operands cancel pairwise, x xor ~x contributes the bit.
        let mut parity = false;
        let mut kept: Vec<Ref> = Vec::new();
        for arg in args {
            if arg == TRUE {
                parity = !parity;
            } else if arg == FALSE {
                continue;
            } else {
                kept.push(arg);
            }
        }
        kept.sort_by_key(|r| r.raw());
        let mut reduced: Vec<Ref> = Vec::with_capacity(kept.len());
        for arg in kept {
            match reduced.last() {
                Some(&last) if last == arg => {
                    reduced.pop(); // a xor a == 0
                }
                Some(&last) if last.index() == arg.index() => {
                    reduced.pop(); // a xor ~a == 1
                    parity = !parity;
                }
                _ => reduced.push(arg),
            }
        }
        let result = match reduced.len() {
            0 => FALSE,
            1 => reduced[0],
            _ => {
                if reduced == original.args && original.kind == GateKind::Xor {
                    Ref::positive(index)
                } else {
                    self.pdag.add_gate(GateKind::Xor, reduced)
                }
            }
        };
        compose_sign(result, parity)
    }

    fn simplify_atleast(
        &mut self,
        k: u32,
        args: Vec<Ref>,
        original: &crate::pdag::GateNode,
        index: u32,
    ) -> Ref {
        let mut k = k as i64;
        let mut kept: Vec<Ref> = Vec::new();
        for arg in args {
            if arg == TRUE {
                k -= 1;
            } else if arg == FALSE {
                continue;
            } else {
                kept.push(arg);
            }
        }
        kept.sort_by_key(|r| r.raw());
        // Exactly one of (x, ~x) holds, so each such pair pays one vote.
        let mut reduced: Vec<Ref> = Vec::with_capacity(kept.len());
        for arg in kept {
            match reduced.last() {
                Some(&last) if last.index() == arg.index() && last != arg => {
                    reduced.pop();
                    k -= 1;
                }
                _ => reduced.push(arg),
            }
        }
        let n = reduced.len() as i64;
        if k <= 0 {
            return TRUE;
        }
        if k > n {
            return FALSE;
        }
        if n == 1 {
            return reduced[0];
        }
        if k == 1 {
            return self.pdag.add_gate(GateKind::Or, reduced);
        }
        if k == n {
            return self.pdag.add_gate(GateKind::And, reduced);
        }
        if reduced == original.args && original.kind == GateKind::AtLeast(k as u32) {
            Ref::positive(index)
        } else {
            self.pdag.add_gate(GateKind::AtLeast(k as u32), reduced)
        }
    }
}

// Lowering for AND/OR-only solvers.
impl Preprocessor<'_> {
    /// Shannon decomposition of K/N gates:
    /// `atleast(k, x:xs) = (x and atleast(k-1, xs)) or atleast(k, xs)`.
    fn lower_atleast(&mut self) {
        let order = self.pdag.topological_gates();
        let mut replacement: HashMap<u32, Ref> = HashMap::new();
        for index in order {
            self.rewrite_args(index, &replacement);
            let gate = self.pdag.gate(index);
            if let GateKind::AtLeast(k) = gate.kind {
                let args = gate.args.clone();
                let mut memo = HashMap::new();
                let expanded = self.expand_atleast(k, &args, 0, &mut memo);
                debug!("lowered atleast({}, {}) at {} to {}", k, args.len(), index, expanded);
                replacement.insert(index, expanded);
            }
        }
        let root = self.pdag.root();
        self.pdag.set_root(compose(&replacement, root));
    }

    fn expand_atleast(
        &mut self,
        k: u32,
        args: &[Ref],
        start: usize,
        memo: &mut HashMap<(u32, usize), Ref>,
    ) -> Ref {
        let rest = &args[start..];
        let n = rest.len() as u32;
        if k == 0 {
            return TRUE;
        }
        if k > n {
            return FALSE;
        }
        if k == n {
            return if n == 1 {
                rest[0]
            } else {
                self.pdag.add_gate(GateKind::And, rest.to_vec())
            };
        }
        if k == 1 {
            return self.pdag.add_gate(GateKind::Or, rest.to_vec());
        }
        if let Some(&cached) = memo.get(&(k, start)) {
            return cached;
        }
        let first = args[start];
        let with_first_rest = self.expand_atleast(k - 1, args, start + 1, memo);
        let with_first = self.pdag.add_gate(GateKind::And, vec![first, with_first_rest]);
        let without_first = self.expand_atleast(k, args, start + 1, memo);
        let result = self.pdag.add_gate(GateKind::Or, vec![with_first, without_first]);
        memo.insert((k, start), result);
        result
    }

    /// `a xor b == (a and not b) or (not a and b)`, folded left for wider
    /// gates.
    fn expand_xor(&mut self) {
        let order = self.pdag.topological_gates();
        let mut replacement: HashMap<u32, Ref> = HashMap::new();
        for index in order {
            self.rewrite_args(index, &replacement);
            let gate = self.pdag.gate(index);
            if gate.kind != GateKind::Xor {
                continue;
            }
            let args = gate.args.clone();
            let mut acc = args[0];
            for &next in &args[1..] {
                let left = self.pdag.add_gate(GateKind::And, vec![acc, -next]);
                let right = self.pdag.add_gate(GateKind::And, vec![-acc, next]);
                acc = self.pdag.add_gate(GateKind::Or, vec![left, right]);
            }
            debug!("expanded xor at {} to {}", index, acc);
            replacement.insert(index, acc);
        }
        let root = self.pdag.root();
        self.pdag.set_root(compose(&replacement, root));
    }

    fn rewrite_args(&mut self, index: u32, replacement: &HashMap<u32, Ref>) {
        if replacement.is_empty() {
            return;
        }
        let gate = self.pdag.gate_mut(index);
        let mut args = std::mem::take(&mut gate.args);
        for arg in args.iter_mut() {
            *arg = compose(replacement, *arg);
        }
        args.sort_by_key(|r| r.raw());
        self.pdag.gate_mut(index).args = args;
    }
}

// Boolean optimization.
impl Preprocessor<'_> {
    /// Unit propagation: variables with constant probability 0 or 1 become
    /// graph constants.
    fn substitute_variables(&mut self, var_constants: &[(u32, bool)]) -> bool {
        let replacement: HashMap<u32, Ref> = var_constants
            .iter()
            .map(|&(var, value)| (var, if value { TRUE } else { FALSE }))
            .collect();
        let mut changed = false;
        for index in self.pdag.topological_gates() {
            let gate = self.pdag.gate_mut(index);
            for i in 0..gate.args.len() {
                let arg = gate.args[i];
                let rewritten = compose(&replacement, arg);
                if rewritten != arg {
                    gate.args[i] = rewritten;
                    changed = true;
                }
            }
        }
        let root = self.pdag.root();
        let new_root = compose(&replacement, root);
        if new_root != root {
            self.pdag.set_root(new_root);
            changed = true;
        }
        if changed {
            debug!("unit propagation replaced constant-probability variables");
        }
        changed
    }

    /// Inlines an AND/OR gate into its unique parent of the same type.
    fn coalesce(&mut self) -> bool {
        let order = self.pdag.topological_gates();
        let mut parents: HashMap<u32, u32> = HashMap::new();
        let root = self.pdag.root();
        if self.pdag.is_gate(root) {
            *parents.entry(root.index()).or_insert(0) += 1;
        }
        for &index in &order {
            for &arg in &self.pdag.gate(index).args {
                if self.pdag.is_gate(arg) {
                    *parents.entry(arg.index()).or_insert(0) += 1;
                }
            }
        }

        let mut changed = false;
        for &index in &order {
            let kind = self.pdag.gate(index).kind;
            if !matches!(kind, GateKind::And | GateKind::Or) {
                continue;
            }
            let args = self.pdag.gate(index).args.clone();
            let mut new_args: Vec<Ref> = Vec::with_capacity(args.len());
            let mut merged = false;
            for arg in args {
                if !arg.is_negated() && self.pdag.is_gate(arg) {
                    let child = self.pdag.gate(arg.index());
                    if child.kind == kind && !child.module && parents.get(&arg.index()) == Some(&1) {
                        new_args.extend(child.args.iter().copied());
                        merged = true;
                        continue;
                    }
                }
                new_args.push(arg);
            }
            if merged {
                new_args.sort_by_key(|r| r.raw());
                self.pdag.gate_mut(index).args = new_args;
                changed = true;
                debug!("coalesced children into gate {}", index);
            }
        }
        changed
    }
}

// Module detection.
impl Preprocessor<'_> {
    /// Finds gates whose subgraphs share nothing with the rest of the
    /// graph, by DFS visit times: a gate is a module iff every descendant
    /// is first seen after the gate's entry and last seen before its exit.
    fn detect_modules(&mut self) {
        let root = self.pdag.root();
        if !self.pdag.is_gate(root) {
            return;
        }
        let n = self.pdag.size();
        let mut first = vec![0u64; n];
        let mut last = vec![0u64; n];
        let mut enter = vec![0u64; n];
        let mut exit = vec![0u64; n];
        let mut time = 0u64;
        self.pdag.next_pass();
        assign_time(self.pdag, root, &mut time, &mut first, &mut last, &mut enter, &mut exit);

        let order = self.pdag.topological_gates();
        // Clear stale marks before recomputing.
        for &index in &order {
            self.pdag.gate_mut(index).module = false;
        }

        let mut min_t = vec![u64::MAX; n];
        let mut max_t = vec![0u64; n];
        let mut is_module = vec![false; n];
        for &index in &order {
            let gate = self.pdag.gate(index);
            let mut lo = u64::MAX;
            let mut hi = 0u64;
            for &arg in &gate.args {
                let i = arg.index() as usize;
                if self.pdag.is_constant(arg) {
                    continue;
                }
                let (a_lo, a_hi) = if self.pdag.is_variable(arg) || is_module[i] {
                    (first[i], last[i])
                } else {
                    (first[i].min(min_t[i]), last[i].max(max_t[i]))
                };
                lo = lo.min(a_lo);
                hi = hi.max(a_hi);
            }
            let g = index as usize;
            min_t[g] = lo;
            max_t[g] = hi;
            if index != root.index() && lo != u64::MAX && lo > enter[g] && hi < exit[g] {
                is_module[g] = true;
            }
        }
        for &index in &order {
            if is_module[index as usize] {
                self.pdag.gate_mut(index).module = true;
                debug!("gate {} is a module", index);
            }
        }
    }
}

fn assign_time(
    pdag: &mut Pdag,
    node: Ref,
    time: &mut u64,
    first: &mut [u64],
    last: &mut [u64],
    enter: &mut [u64],
    exit: &mut [u64],
) {
    let i = node.index() as usize;
    if pdag.is_constant(node) {
        return;
    }
    *time += 1;
    if pdag.is_variable(node) {
        if first[i] == 0 {
            first[i] = *time;
        }
        last[i] = *time;
        return;
    }
    if !pdag.visit(node.index()) {
        last[i] = *time; // revisit: record, do not descend
        return;
    }
    first[i] = *time;
    enter[i] = *time;
    for arg in pdag.gate(node.index()).args.clone() {
        assign_time(pdag, arg, time, first, last, enter, exit);
    }
    *time += 1;
    exit[i] = *time;
    last[i] = *time;
}

fn compose(replacement: &HashMap<u32, Ref>, node: Ref) -> Ref {
    match replacement.get(&node.index()) {
        Some(&target) => compose_sign(target, node.is_negated()),
        None => node,
    }
}

fn compose_sign(node: Ref, negate: bool) -> Ref {
    if negate {
        -node
    } else {
        node
    }
}
