//! MOCUS: top-down cut-set candidate expansion.
//!
//! Operates on an AND/OR-normalized PDAG. A candidate is a sorted tuple of
//! signed references (literals, pending gates, and module pseudo-literals).
//! Gates are processed in reverse topological order, parents before
//! children, so every candidate mentioning a gate is fully materialized by
//! the time that gate is expanded:
//!
//! - an AND gate concatenates its arguments into each candidate holding it;
//! - an OR gate replicates each such candidate once per argument.
//!
//! Candidates that acquire both `x` and `~x` are contradictions and are
//! dropped, as are candidates whose size exceeds the order limit (each
//! pending gate or module expands to at least one literal, so the tuple
//! size is a sound lower bound on the final product order).
//!
//! The surviving candidates are handed to the ZBDD minimizer by the solver.

use std::collections::HashSet;

use log::debug;

use crate::analysis::CancelToken;
use crate::error::{Error, Result};
use crate::pdag::{GateKind, Pdag, FALSE, TRUE};
use crate::reference::Ref;
use crate::zbdd::UNBOUNDED;

/// Expands the sub-problem rooted at `sub_root` into raw cut-set
/// candidates over literals and module pseudo-literals.
pub fn expand(
    pdag: &Pdag,
    sub_root: u32,
    limit: u32,
    modules_as_leaves: bool,
    cancel: &CancelToken,
) -> Result<Vec<Vec<Ref>>> {
    // Gates of this sub-problem, parents before children; module gates
    // below the sub-root stay opaque.
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    gate_order(pdag, sub_root, modules_as_leaves, &mut visited, &mut order);
    order.reverse();

    let mut candidates: Vec<Vec<Ref>> = vec![vec![Ref::positive(sub_root)]];
    for &gate_index in &order {
        cancel.check()?;
        let gate = pdag.gate(gate_index);
        let gate_ref = Ref::positive(gate_index);
        let mut next: Vec<Vec<Ref>> = Vec::with_capacity(candidates.len());
        let mut dedup: HashSet<Vec<u32>> = HashSet::new();
        let mut push = |candidate: Vec<Ref>, next: &mut Vec<Vec<Ref>>| {
            if limit != UNBOUNDED && candidate.len() as u32 > limit {
                return; // order cutoff
            }
            if dedup.insert(candidate.iter().map(|r| r.raw()).collect()) {
                next.push(candidate);
            }
        };
        for candidate in candidates {
            let Ok(at) = candidate.binary_search_by_key(&gate_ref.raw(), |r| r.raw()) else {
                push(candidate, &mut next);
                continue;
            };
            let mut rest = candidate;
            rest.remove(at);
            match gate.kind {
                GateKind::And => {
                    if let Some(merged) = insert_all(&rest, &gate.args) {
                        push(merged, &mut next);
                    }
                }
                GateKind::Or => {
                    for &arg in &gate.args {
                        if let Some(extended) = insert_all(&rest, &[arg]) {
                            push(extended, &mut next);
                        }
                    }
                }
                kind => {
                    return Err(Error::Logic(format!(
                        "MOCUS requires an AND/OR graph, found {:?}",
                        kind
                    )))
                }
            }
        }
        candidates = next;
        debug!(
            "mocus: expanded gate {}, {} candidates",
            gate_index,
            candidates.len()
        );
    }
    Ok(candidates)
}

/// Merges new elements into a sorted candidate. Returns `None` on a
/// contradiction (`x` together with `~x`).
fn insert_all(candidate: &[Ref], args: &[Ref]) -> Option<Vec<Ref>> {
    let mut merged = candidate.to_vec();
    for &arg in args {
        if arg == TRUE {
            continue; // neutral under conjunction
        }
        if arg == FALSE {
            return None;
        }
        match merged.binary_search_by_key(&arg.raw(), |r| r.raw()) {
            Ok(_) => {}
            Err(at) => {
                // The complement sits next to the literal in raw order.
                if merged.iter().any(|&r| r == -arg) {
                    return None;
                }
                merged.insert(at, arg);
            }
        }
    }
    Some(merged)
}

fn gate_order(
    pdag: &Pdag,
    index: u32,
    modules_as_leaves: bool,
    visited: &mut HashSet<u32>,
    order: &mut Vec<u32>,
) {
    if !visited.insert(index) {
        return;
    }
    for &arg in &pdag.gate(index).args {
        if !pdag.is_gate(arg) {
            continue;
        }
        if modules_as_leaves && pdag.gate(arg.index()).module {
            continue; // opaque sub-problem
        }
        gate_order(pdag, arg.index(), modules_as_leaves, visited, order);
    }
    order.push(index);
}
