//! Truth evaluation of a Boolean graph.
//!
//! Interprets the graph as a Boolean function over a total assignment of
//! its variables. This is the semantic oracle of the test suite — the
//! preprocessor must never change the value of the root under any
//! assignment — and a convenience for embedders that want to spot-check a
//! structure.

use std::collections::HashMap;

use crate::gate::{Operator, State};
use crate::graph::BooleanGraph;
use crate::node::GateRef;

/// A total assignment of truth values keyed by variable index.
pub type Assignment = HashMap<i32, bool>;

impl BooleanGraph {
    /// Evaluates the root under the given assignment.
    ///
    /// # Panics
    ///
    /// Panics if the assignment misses a variable reachable from the root.
    pub fn evaluate(&self, assignment: &Assignment) -> bool {
        let mut memo = HashMap::new();
        eval_gate(&self.root(), assignment, &mut memo)
    }
}

fn eval_gate(gate: &GateRef, assignment: &Assignment, memo: &mut HashMap<i32, bool>) -> bool {
    let g = gate.borrow();
    match g.state() {
        State::Null => return false,
        State::Unity => return true,
        State::Normal => {}
    }
    if let Some(&value) = memo.get(&g.index()) {
        return value;
    }

    let mut arg_values = Vec::with_capacity(g.args().len());
    for &arg in g.args() {
        let magnitude = crate::node::arg_index(arg);
        let value = if let Some(child) = g.gate_args().get(&arg) {
            eval_gate(child, assignment, memo)
        } else if g.variable_args().contains_key(&arg) {
            *assignment
                .get(&magnitude)
                .unwrap_or_else(|| panic!("assignment misses variable x{}", magnitude))
        } else if let Some(constant) = g.constant_args().get(&arg) {
            constant.borrow().value()
        } else {
            unreachable!("argument {} of G{} resolves to no node", arg, g.index())
        };
        arg_values.push(if arg < 0 { !value } else { value });
    }

    let value = match g.operator() {
        Operator::And => arg_values.iter().all(|&v| v),
        Operator::Or => arg_values.iter().any(|&v| v),
        Operator::Nand => !arg_values.iter().all(|&v| v),
        Operator::Nor => !arg_values.iter().any(|&v| v),
        Operator::Xor => {
            debug_assert_eq!(arg_values.len(), 2);
            arg_values[0] ^ arg_values[1]
        }
        Operator::Not => {
            debug_assert_eq!(arg_values.len(), 1);
            !arg_values[0]
        }
        Operator::Null => {
            debug_assert_eq!(arg_values.len(), 1);
            arg_values[0]
        }
        Operator::Atleast => {
            let failed = arg_values.iter().filter(|&&v| v).count() as i32;
            failed >= g.vote_number()
        }
    };
    memo.insert(g.index(), value);
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Operator;

    #[test]
    fn test_eval_and_or() {
        let mut graph = BooleanGraph::new();
        let root = graph.gate(Operator::And);
        let child = graph.gate(Operator::Or);
        let a = graph.variable();
        let b = graph.variable();
        let c = graph.variable();
        let (ai, bi, ci) = (a.borrow().index(), b.borrow().index(), c.borrow().index());
        let child_index = child.borrow().index();
        graph.connect(&child, bi, &b);
        graph.connect(&child, ci, &c);
        graph.connect(&root, ai, &a);
        graph.connect(&root, child_index, &child);
        graph.set_root(root).unwrap();

        // a AND (b OR c)
        let eval = |av, bv, cv| {
            let assignment = Assignment::from([(ai, av), (bi, bv), (ci, cv)]);
            graph.evaluate(&assignment)
        };
        assert!(eval(true, true, false));
        assert!(eval(true, false, true));
        assert!(!eval(true, false, false));
        assert!(!eval(false, true, true));
    }

    #[test]
    fn test_eval_negative_edge() {
        let mut graph = BooleanGraph::new();
        let root = graph.gate(Operator::Or);
        let a = graph.variable();
        let b = graph.variable();
        let (ai, bi) = (a.borrow().index(), b.borrow().index());
        graph.connect(&root, -ai, &a);
        graph.connect(&root, bi, &b);
        graph.set_root(root).unwrap();

        // ~a OR b
        assert!(graph.evaluate(&Assignment::from([(ai, false), (bi, false)])));
        assert!(!graph.evaluate(&Assignment::from([(ai, true), (bi, false)])));
    }

    #[test]
    fn test_eval_vote_gate() {
        let mut graph = BooleanGraph::new();
        let root = graph.vote_gate(2).unwrap();
        let a = graph.variable();
        let b = graph.variable();
        let c = graph.variable();
        let (ai, bi, ci) = (a.borrow().index(), b.borrow().index(), c.borrow().index());
        graph.connect(&root, ai, &a);
        graph.connect(&root, bi, &b);
        graph.connect(&root, ci, &c);
        graph.set_root(root).unwrap();

        let eval = |av, bv, cv| {
            let assignment = Assignment::from([(ai, av), (bi, bv), (ci, cv)]);
            graph.evaluate(&assignment)
        };
        assert!(!eval(true, false, false));
        assert!(eval(true, true, false));
        assert!(eval(true, false, true));
        assert!(eval(true, true, true));
        assert!(!eval(false, false, false));
    }

    #[test]
    fn test_eval_xor_and_constants() {
        let mut graph = BooleanGraph::new();
        let root = graph.gate(Operator::Xor);
        let a = graph.variable();
        let ai = a.borrow().index();
        let top = graph.constant(true);
        let top_index = top.borrow().index();
        graph.connect(&root, ai, &a);
        graph.connect(&root, top_index, &top);
        graph.set_root(root).unwrap();

        // a XOR True == ~a
        assert!(graph.evaluate(&Assignment::from([(ai, false)])));
        assert!(!graph.evaluate(&Assignment::from([(ai, true)])));
    }
}
