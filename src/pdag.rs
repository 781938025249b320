//! The Propagation Directed Acyclic Graph: the solver-facing Boolean IR.
//!
//! A [`Pdag`] is an arena of nodes addressed by integer index. Children are
//! held as signed [`Ref`]s (index plus complement bit); NOT/NOR/NAND never
//! become nodes, they are absorbed into edge signs at build time. Index 0 is
//! the shared constant node: `Ref::positive(0)` is TRUE, `Ref::negative(0)`
//! is FALSE. Variables occupy indices `1..=n_vars` in order of first
//! encounter, which makes `Var` ids the ordinal basic-event ids of the
//! analysis. Gates follow.
//!
//! Nodes are never freed; the arena lives exactly as long as the analysis of
//! one top gate. The preprocessor is the only mutator and uses the graph's
//! monotonically increasing pass number as its visit marker.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::error::{Error, Result};
use crate::model::{Arg, BasicEventId, Connective, EventRef, GateId, Model};
use crate::reference::Ref;

/// The TRUE constant of every PDAG.
pub const TRUE: Ref = Ref::positive(0);
/// The FALSE constant of every PDAG.
pub const FALSE: Ref = Ref::negative(0);

/// Gate types of the PDAG; NOT-like connectives are edge signs instead.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum GateKind {
    And,
    Or,
    /// K-out-of-N voting over the argument list.
    AtLeast(u32),
    Xor,
    /// Single-argument pass-through; removed by constant propagation.
    Null,
}

/// A typed gate with ordered signed arguments.
#[derive(Debug, Clone)]
pub struct GateNode {
    pub kind: GateKind,
    pub args: Vec<Ref>,
    /// Set by module detection: the subgraph below this gate shares nothing
    /// with the rest of the graph and is solved independently.
    pub module: bool,
}

/// One arena slot.
#[derive(Debug, Clone)]
pub enum PdagNode {
    /// The shared Boolean constant (index 0 only).
    Constant,
    /// A leaf variable standing for one basic event.
    Variable { event: BasicEventId },
    Gate(GateNode),
}

/// The propagation graph of one top gate.
pub struct Pdag {
    nodes: Vec<PdagNode>,
    root: Ref,
    n_vars: u32,
    /// `variables[i]` is the model event of variable `i + 1`.
    variables: Vec<BasicEventId>,
    /// Visit marks, parallel to `nodes`.
    marks: Vec<u32>,
    pass: u32,
}

impl Pdag {
    /// Builds the PDAG of one top gate from the model.
    ///
    /// `ccf` substitutes every CCF-group member with the OR of its expanded
    /// events (the model must have been through
    /// [`Model::apply_ccf`][crate::model::Model::apply_ccf]).
    pub fn new(model: &Model, top: GateId, ccf: bool) -> Result<Self> {
        let mut pdag = Pdag {
            nodes: vec![PdagNode::Constant],
            root: TRUE,
            n_vars: 0,
            variables: Vec::new(),
            marks: vec![0],
            pass: 0,
        };

        // Variables first, in deterministic encounter order, so that they
        // occupy indices 1..=V of the arena.
        let mut seen_gates = HashSet::new();
        let mut seen_events = HashSet::new();
        pdag.collect_variables(model, top, ccf, &mut seen_gates, &mut seen_events);

        let mut builder = Builder {
            model,
            ccf,
            gate_memo: HashMap::new(),
            substitute_memo: HashMap::new(),
            var_of: pdag
                .variables
                .iter()
                .enumerate()
                .map(|(i, &event)| (event, Ref::positive(i as u32 + 1)))
                .collect(),
        };
        pdag.root = builder.build_gate(&mut pdag, top)?;
        debug!(
            "built pdag: root = {}, {} variables, {} nodes",
            pdag.root,
            pdag.n_vars,
            pdag.nodes.len()
        );
        Ok(pdag)
    }

    fn collect_variables(
        &mut self,
        model: &Model,
        gate: GateId,
        ccf: bool,
        seen_gates: &mut HashSet<GateId>,
        seen_events: &mut HashSet<BasicEventId>,
    ) {
        if !seen_gates.insert(gate) {
            return;
        }
        for arg in model.gate(gate).args() {
            match arg.event {
                EventRef::Gate(child) => {
                    self.collect_variables(model, child, ccf, seen_gates, seen_events)
                }
                EventRef::Basic(event) => {
                    let substitutes = if ccf {
                        model.basic_event(event).ccf_substitutes.clone()
                    } else {
                        None
                    };
                    match substitutes {
                        Some(events) => {
                            for sub in events {
                                self.add_variable(sub, seen_events);
                            }
                        }
                        None => self.add_variable(event, seen_events),
                    }
                }
                EventRef::House(_) => {}
            }
        }
    }

    fn add_variable(&mut self, event: BasicEventId, seen: &mut HashSet<BasicEventId>) {
        if !seen.insert(event) {
            return;
        }
        self.n_vars += 1;
        self.variables.push(event);
        self.nodes.push(PdagNode::Variable { event });
        self.marks.push(0);
    }
}

struct Builder<'a> {
    model: &'a Model,
    ccf: bool,
    gate_memo: HashMap<GateId, Ref>,
    substitute_memo: HashMap<BasicEventId, Ref>,
    var_of: HashMap<BasicEventId, Ref>,
}

impl Builder<'_> {
    fn build_gate(&mut self, pdag: &mut Pdag, id: GateId) -> Result<Ref> {
        if let Some(&cached) = self.gate_memo.get(&id) {
            return Ok(cached);
        }
        let gate = self.model.gate(id);
        let mut args = Vec::with_capacity(gate.args().len());
        for arg in gate.args() {
            args.push(self.build_arg(pdag, arg)?);
        }
        let result = match gate.connective() {
            Connective::And | Connective::Inhibit => pdag.add_gate(GateKind::And, args),
            Connective::Or => pdag.add_gate(GateKind::Or, args),
            Connective::Nand => -pdag.add_gate(GateKind::And, args),
            Connective::Nor => -pdag.add_gate(GateKind::Or, args),
            Connective::Not => -args[0],
            Connective::Null => args[0],
            Connective::Xor => pdag.add_gate(GateKind::Xor, args),
            Connective::AtLeast => {
                let min = gate.min_number().ok_or_else(|| {
                    Error::Logic(format!("ATLEAST gate {} without a vote number", gate.name()))
                })?;
                pdag.add_gate(GateKind::AtLeast(min as u32), args)
            }
        };
        self.gate_memo.insert(id, result);
        Ok(result)
    }

    fn build_arg(&mut self, pdag: &mut Pdag, arg: &Arg) -> Result<Ref> {
        let positive = match arg.event {
            EventRef::Gate(gate) => self.build_gate(pdag, gate)?,
            EventRef::House(house) => {
                if self.model.house_event(house).state() {
                    TRUE
                } else {
                    FALSE
                }
            }
            EventRef::Basic(event) => self.build_basic(pdag, event)?,
        };
        Ok(if arg.complement { -positive } else { positive })
    }

    fn build_basic(&mut self, pdag: &mut Pdag, event: BasicEventId) -> Result<Ref> {
        let substitutes = if self.ccf {
            self.model.basic_event(event).ccf_substitutes.clone()
        } else {
            None
        };
        let Some(events) = substitutes else {
            return self.variable(event);
        };
        if let Some(&cached) = self.substitute_memo.get(&event) {
            return Ok(cached);
        }
        let result = match events.len() {
            // Every failure mode of this member has zero probability.
            0 => FALSE,
            1 => self.variable(events[0])?,
            _ => {
                let args = events
                    .iter()
                    .map(|&sub| self.variable(sub))
                    .collect::<Result<Vec<_>>>()?;
                pdag.add_gate(GateKind::Or, args)
            }
        };
        self.substitute_memo.insert(event, result);
        Ok(result)
    }

    fn variable(&self, event: BasicEventId) -> Result<Ref> {
        self.var_of.get(&event).copied().ok_or_else(|| {
            Error::Logic(format!(
                "basic event {} was not collected as a variable",
                self.model.basic_event(event).name()
            ))
        })
    }
}

impl Pdag {
    pub fn root(&self) -> Ref {
        self.root
    }

    pub fn set_root(&mut self, root: Ref) {
        self.root = root;
    }

    pub fn n_vars(&self) -> u32 {
        self.n_vars
    }

    /// The model events backing variables `1..=n_vars`, in variable order.
    pub fn variables(&self) -> &[BasicEventId] {
        &self.variables
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, index: u32) -> &PdagNode {
        &self.nodes[index as usize]
    }

    pub fn is_constant(&self, node: Ref) -> bool {
        node.index() == 0
    }

    pub fn is_variable(&self, node: Ref) -> bool {
        matches!(self.nodes[node.index() as usize], PdagNode::Variable { .. })
    }

    pub fn is_gate(&self, node: Ref) -> bool {
        matches!(self.nodes[node.index() as usize], PdagNode::Gate(_))
    }

    pub fn gate(&self, index: u32) -> &GateNode {
        match &self.nodes[index as usize] {
            PdagNode::Gate(gate) => gate,
            _ => panic!("node {} is not a gate", index),
        }
    }

    pub fn gate_mut(&mut self, index: u32) -> &mut GateNode {
        match &mut self.nodes[index as usize] {
            PdagNode::Gate(gate) => gate,
            _ => panic!("node {} is not a gate", index),
        }
    }

    /// Appends a gate node; arguments are sorted by stable node index so
    /// that structurally equal gates collide in the unique table.
    pub fn add_gate(&mut self, kind: GateKind, mut args: Vec<Ref>) -> Ref {
        args.sort_by_key(|r| r.raw());
        let index = self.nodes.len() as u32;
        self.nodes.push(PdagNode::Gate(GateNode { kind, args, module: false }));
        self.marks.push(0);
        Ref::positive(index)
    }

    /// Gate indices reachable from the root, children before parents.
    pub fn topological_gates(&self) -> Vec<u32> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        self.postorder(self.root, &mut visited, &mut order);
        order
    }

    fn postorder(&self, node: Ref, visited: &mut HashSet<u32>, order: &mut Vec<u32>) {
        let index = node.index();
        if !self.is_gate(node) || !visited.insert(index) {
            return;
        }
        for &arg in &self.gate(index).args.clone() {
            self.postorder(arg, visited, order);
        }
        order.push(index);
    }

    /// True if no edge carries a complement and no gate is non-monotone.
    pub fn coherent(&self) -> bool {
        if self.root.is_negated() && !self.is_constant(self.root) {
            return false;
        }
        for &index in &self.topological_gates() {
            let gate = self.gate(index);
            if matches!(gate.kind, GateKind::Xor) {
                return false;
            }
            if gate.args.iter().any(|arg| arg.is_negated() && arg.index() != 0) {
                return false;
            }
        }
        true
    }

    /// Starts a new traversal pass; all visit marks become stale.
    pub fn next_pass(&mut self) -> u32 {
        self.pass += 1;
        self.pass
    }

    /// Marks a node visited in the current pass; true on the first visit.
    pub fn visit(&mut self, index: u32) -> bool {
        if self.marks[index as usize] == self.pass {
            false
        } else {
            self.marks[index as usize] = self.pass;
            true
        }
    }

    /// Common-subexpression collapse through the structural unique table.
    ///
    /// The table is keyed by `(type, sorted signed-argument list)` and
    /// rebuilt from scratch: the preprocessor calls this after rewriting
    /// passes rather than maintaining the table incrementally.
    pub fn dedup(&mut self) -> bool {
        let order = self.topological_gates();
        let mut table: HashMap<(GateKind, Vec<u32>), Ref> = HashMap::new();
        let mut replacement: HashMap<u32, Ref> = HashMap::new();
        let mut changed = false;

        for index in order {
            let gate = self.gate_mut(index);
            let kind = gate.kind;
            let mut args: Vec<Ref> = std::mem::take(&mut gate.args);
            for arg in args.iter_mut() {
                *arg = compose(&replacement, *arg);
            }
            args.sort_by_key(|r| r.raw());
            let key = (kind, args.iter().map(|r| r.raw()).collect::<Vec<_>>());
            match table.get(&key) {
                Some(&existing) => {
                    debug!("dedup: gate {} collapses into {}", index, existing);
                    replacement.insert(index, existing);
                    changed = true;
                }
                None => {
                    table.insert(key, Ref::positive(index));
                    self.gate_mut(index).args = args;
                }
            }
        }
        self.root = compose(&replacement, self.root);
        changed
    }
}

fn compose(replacement: &HashMap<u32, Ref>, node: Ref) -> Ref {
    match replacement.get(&node.index()) {
        Some(&target) => {
            if node.is_negated() {
                -target
            } else {
                target
            }
        }
        None => node,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Connective;

    fn two_event_model(connective: Connective) -> (Model, GateId) {
        let mut model = Model::new("m");
        let a = model.add_basic_event("A", 0.1).unwrap();
        let b = model.add_basic_event("B", 0.2).unwrap();
        let top = model.add_gate("Top", connective, [a, b]).unwrap();
        (model, top)
    }

    #[test]
    fn test_build_or() {
        let (model, top) = two_event_model(Connective::Or);
        let pdag = Pdag::new(&model, top, false).unwrap();
        assert_eq!(pdag.n_vars(), 2);
        assert!(pdag.is_gate(pdag.root()));
        assert!(!pdag.root().is_negated());
        let gate = pdag.gate(pdag.root().index());
        assert_eq!(gate.kind, GateKind::Or);
        assert_eq!(gate.args, vec![Ref::positive(1), Ref::positive(2)]);
        assert!(pdag.coherent());
    }

    #[test]
    fn test_build_nor_as_signed_or() {
        let (model, top) = two_event_model(Connective::Nor);
        let pdag = Pdag::new(&model, top, false).unwrap();
        assert!(pdag.root().is_negated());
        assert_eq!(pdag.gate(pdag.root().index()).kind, GateKind::Or);
        assert!(!pdag.coherent());
    }

    #[test]
    fn test_not_absorbed_into_sign() {
        let mut model = Model::new("m");
        let a = model.add_basic_event("A", 0.1).unwrap();
        let b = model.add_basic_event("B", 0.2).unwrap();
        let inner = model.add_gate("Inner", Connective::Not, [a]).unwrap();
        let top = model
            .add_gate("Top", Connective::And, [Arg::new(inner), Arg::new(b)])
            .unwrap();
        let pdag = Pdag::new(&model, top, false).unwrap();
        let gate = pdag.gate(pdag.root().index());
        assert_eq!(gate.kind, GateKind::And);
        // NOT(A) is the negative edge to variable 1, no extra node.
        assert!(gate.args.contains(&Ref::negative(1)));
        assert_eq!(pdag.size(), 4); // constant + 2 variables + 1 gate
    }

    #[test]
    fn test_house_events_become_constants() {
        let mut model = Model::new("m");
        let a = model.add_basic_event("A", 0.1).unwrap();
        let h = model.add_house_event("H", false).unwrap();
        let top = model
            .add_gate("Top", Connective::And, [Arg::new(a), Arg::new(h)])
            .unwrap();
        let pdag = Pdag::new(&model, top, false).unwrap();
        let gate = pdag.gate(pdag.root().index());
        assert!(gate.args.contains(&FALSE));
        assert_eq!(pdag.n_vars(), 1);
    }

    #[test]
    fn test_shared_gate_single_node() {
        let mut model = Model::new("m");
        let a = model.add_basic_event("A", 0.1).unwrap();
        let b = model.add_basic_event("B", 0.2).unwrap();
        let c = model.add_basic_event("C", 0.3).unwrap();
        let shared = model.add_gate("Shared", Connective::And, [a, b]).unwrap();
        let left = model
            .add_gate("Left", Connective::Or, [Arg::new(shared), Arg::new(c)])
            .unwrap();
        let right = model
            .add_gate("Right", Connective::Or, [Arg::new(shared), Arg::new(a)])
            .unwrap();
        let top = model
            .add_gate("Top", Connective::And, [Arg::new(left), Arg::new(right)])
            .unwrap();
        let pdag = Pdag::new(&model, top, false).unwrap();
        // constant + 3 vars + 4 gates: the shared gate is built once.
        assert_eq!(pdag.size(), 8);
        assert_eq!(pdag.topological_gates().len(), 4);
    }

    #[test]
    fn test_dedup_collapses_equal_structure() {
        let mut model = Model::new("m");
        let a = model.add_basic_event("A", 0.1).unwrap();
        let b = model.add_basic_event("B", 0.2).unwrap();
        let g1 = model.add_gate("G1", Connective::And, [a, b]).unwrap();
        let g2 = model.add_gate("G2", Connective::And, [b, a]).unwrap();
        let top = model
            .add_gate("Top", Connective::Or, [Arg::new(g1), Arg::new(g2)])
            .unwrap();
        let mut pdag = Pdag::new(&model, top, false).unwrap();
        assert!(pdag.dedup());
        let root = pdag.gate(pdag.root().index());
        // Both arguments now reference the same AND node.
        assert_eq!(root.args[0], root.args[1]);
    }

    #[test]
    fn test_visit_marks() {
        let (model, top) = two_event_model(Connective::Or);
        let mut pdag = Pdag::new(&model, top, false).unwrap();
        pdag.next_pass();
        let root = pdag.root().index();
        assert!(pdag.visit(root));
        assert!(!pdag.visit(root));
        pdag.next_pass();
        assert!(pdag.visit(root));
    }
}
