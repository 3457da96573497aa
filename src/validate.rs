//! Structural invariant checking.
//!
//! Walks a graph and reports violations of the structural contract as
//! human-readable strings: parent/child link symmetry, argument
//! consistency, operator arities, constant-state cleanliness, and
//! acyclicity. The test suite runs this after every preprocessing pass;
//! embedders can use it to vet hand-built graphs.

use std::collections::HashSet;
use std::rc::Rc;

use crate::gate::{Operator, State};
use crate::graph::BooleanGraph;
use crate::node::{GateRef, NodeRef};

impl BooleanGraph {
    /// Checks the structural invariants of the graph.
    ///
    /// Returns a list of violations; an empty list means the graph is
    /// well-formed.
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let root = self.root();
        if !root.borrow().base().parents().is_empty() {
            violations.push(format!("root G{} has parents", root.borrow().index()));
        }
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        validate_gate(&root, &mut visited, &mut path, &mut violations);
        violations
    }
}

fn validate_gate(
    gate: &GateRef,
    visited: &mut HashSet<i32>,
    path: &mut Vec<i32>,
    violations: &mut Vec<String>,
) {
    let index = gate.borrow().index();
    if path.contains(&index) {
        violations.push(format!("cycle through G{}", index));
        return;
    }
    if !visited.insert(index) {
        return;
    }
    path.push(index);

    check_arity(gate, violations);
    check_args(gate, violations);

    let children: Vec<GateRef> = gate.borrow().gate_args().values().cloned().collect();
    for child in &children {
        validate_gate(child, visited, path, violations);
    }
    path.pop();
}

fn check_arity(gate: &GateRef, violations: &mut Vec<String>) {
    let g = gate.borrow();
    let num_args = g.args().len();
    if g.state() != State::Normal {
        if num_args != 0 {
            violations.push(format!("constant G{} still has {} argument(s)", g.index(), num_args));
        }
        return;
    }
    let arity_ok = match g.operator() {
        Operator::And | Operator::Or | Operator::Nand | Operator::Nor => num_args >= 2,
        Operator::Not | Operator::Null => num_args == 1,
        Operator::Xor => num_args == 2,
        Operator::Atleast => g.vote_number() >= 2 && num_args as i32 > g.vote_number(),
    };
    if !arity_ok {
        violations.push(format!(
            "G{}:{} has {} argument(s) (vote number {})",
            g.index(),
            g.operator(),
            num_args,
            g.vote_number()
        ));
    }
}

fn check_args(gate: &GateRef, violations: &mut Vec<String>) {
    let g = gate.borrow();
    let index = g.index();
    for &arg in g.args() {
        if arg > 0 && g.args().contains(&-arg) {
            violations.push(format!("G{} holds both polarities of node {}", index, arg));
        }
        let Some(child) = g.arg(arg) else {
            violations.push(format!("argument {} of G{} resolves to no node", arg, index));
            continue;
        };
        // The child must point back at this gate, and only via live links.
        let back = child.with_base(|base| base.parents().get(&index).cloned());
        match back.and_then(|weak| weak.upgrade()) {
            Some(parent) if Rc::ptr_eq(&parent, gate) => {}
            _ => violations.push(format!(
                "node {} does not list its parent G{}",
                arg.abs(),
                index
            )),
        }
        check_parent_entries(&child, violations);
    }
    // Every table entry must be reflected in the unified argument set.
    let table_len = g.gate_args().len() + g.variable_args().len() + g.constant_args().len();
    if table_len != g.args().len() {
        violations.push(format!(
            "G{} argument tables disagree with the signed index set",
            index
        ));
    }
}

/// Every parent entry of a node must be a live gate that actually holds
/// the node as an argument.
fn check_parent_entries(node: &NodeRef, violations: &mut Vec<String>) {
    let index = node.index();
    let parents: Vec<(i32, Option<GateRef>)> = node.with_base(|base| {
        base.parents()
            .iter()
            .map(|(&p, weak)| (p, weak.upgrade()))
            .collect()
    });
    for (parent_index, parent) in parents {
        let Some(parent) = parent else {
            violations.push(format!(
                "node {} keeps an expired parent entry for G{}",
                index, parent_index
            ));
            continue;
        };
        let p = parent.borrow();
        if !p.args().contains(&index) && !p.args().contains(&-index) {
            violations.push(format!(
                "G{} does not hold node {} it is registered as parent of",
                parent_index, index
            ));
        }
    }
}
