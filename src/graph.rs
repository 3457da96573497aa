//! The Boolean graph: a rooted DAG of gates over variable and constant
//! leaves.
//!
//! The graph owns the root gate; everything else is held alive by parent
//! edges. Construction goes through the factory methods here so the graph
//! can track its `coherent`/`normal` flags and register the constants and
//! NULL gates that Phase I of preprocessing eliminates.
//!
//! The traversal clearers at the bottom reset the bookkeeping scratchpads
//! (gate marks, node visits, occurrence counts, optimization values).
//! Every algorithm that reads one of those fields clears it first; the
//! fields are meaningless between algorithms.

use std::rc::Rc;

use log::debug;

use crate::error::GraphError;
use crate::gate::{Gate, Operator};
use crate::node::{ConstantRef, GateRef, NodeRef, VariableRef, WeakConstant, WeakGate};
use crate::node::{Constant, Variable};

/// A rooted Boolean DAG under construction or preprocessing.
pub struct BooleanGraph {
    root: Option<GateRef>,
    coherent: bool,
    normal: bool,
    num_variables: usize,
    pub(crate) constants: Vec<WeakConstant>,
    pub(crate) null_gates: Vec<WeakGate>,
    pub(crate) const_gates: Vec<WeakGate>,
}

impl Default for BooleanGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl BooleanGraph {
    /// Creates an empty graph with no root.
    pub fn new() -> Self {
        Self {
            root: None,
            coherent: true,
            normal: true,
            num_variables: 0,
            constants: Vec::new(),
            null_gates: Vec::new(),
            const_gates: Vec::new(),
        }
    }

    /// The root gate.
    ///
    /// # Panics
    ///
    /// Panics if no root has been installed.
    pub fn root(&self) -> GateRef {
        self.root.clone().expect("Boolean graph has no root gate")
    }

    /// Installs (or replaces) the root gate. The previous root is dropped,
    /// which frees any subgraph only it kept alive.
    ///
    /// Installation seals the new root's subgraph: every ATLEAST gate must
    /// have more arguments than its vote number, and a single-argument
    /// AND/OR/XOR (NAND/NOR) gate is retyped into the NULL (NOT)
    /// pass-through it denotes.
    pub fn set_root(&mut self, gate: GateRef) -> Result<(), GraphError> {
        self.seal_gates(&gate, &mut Vec::new())?;
        self.root = Some(gate);
        Ok(())
    }

    /// Re-points the root without validation; preprocessing rewrites
    /// maintain the invariants themselves.
    pub(crate) fn replace_root(&mut self, gate: GateRef) {
        self.root = Some(gate);
    }

    fn seal_gates(&mut self, gate: &GateRef, seen: &mut Vec<i32>) -> Result<(), GraphError> {
        let index = gate.borrow().index();
        if seen.contains(&index) {
            return Ok(());
        }
        seen.push(index);
        let mut retyped_to_null = false;
        {
            let mut g = gate.borrow_mut();
            if g.state() != crate::gate::State::Normal {
                // Contradictory or tautological arguments collapsed the
                // gate during construction; Phase I propagates it out.
                drop(g);
                self.const_gates.push(Rc::downgrade(gate));
                return Ok(());
            }
            if g.operator() == Operator::Atleast && g.args().len() as i32 <= g.vote_number() {
                return Err(GraphError::VoteNumberExceedsArity {
                    index: g.index(),
                    vote_number: g.vote_number(),
                    num_args: g.args().len(),
                });
            }
            if g.args().len() == 1 {
                match g.operator() {
                    Operator::And | Operator::Or | Operator::Xor => {
                        g.set_operator(Operator::Null);
                        retyped_to_null = true;
                    }
                    Operator::Nand | Operator::Nor => g.set_operator(Operator::Not),
                    _ => {}
                }
            }
        }
        if retyped_to_null {
            self.null_gates.push(Rc::downgrade(gate));
        }
        let children: Vec<GateRef> = gate.borrow().gate_args().values().cloned().collect();
        for child in &children {
            self.seal_gates(child, seen)?;
        }
        Ok(())
    }

    /// True if the source formula used no negation: no complemented edges
    /// and no NOT/NAND/NOR/XOR operators.
    pub fn coherent(&self) -> bool {
        self.coherent
    }

    /// True if the operator set is already {AND, OR, NULL, ATLEAST}.
    pub fn normal(&self) -> bool {
        self.normal
    }

    pub(crate) fn set_normal(&mut self, normal: bool) {
        self.normal = normal;
    }

    /// Number of variables created through this graph.
    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    /// Creates a fresh variable leaf.
    pub fn variable(&mut self) -> VariableRef {
        self.num_variables += 1;
        Variable::new()
    }

    /// Creates a constant leaf and registers it for Phase I elimination.
    pub fn constant(&mut self, value: bool) -> ConstantRef {
        let constant = Constant::new(value);
        self.constants.push(Rc::downgrade(&constant));
        constant
    }

    /// Creates a gate of any operator except ATLEAST (which needs a vote
    /// number; see [`vote_gate`][Self::vote_gate]).
    pub fn gate(&mut self, operator: Operator) -> GateRef {
        debug_assert_ne!(operator, Operator::Atleast, "vote gates need a vote number");
        match operator {
            Operator::Xor | Operator::Not | Operator::Nand | Operator::Nor => {
                self.coherent = false;
                self.normal = false;
            }
            _ => {}
        }
        let gate = Gate::new(operator);
        if operator == Operator::Null {
            self.null_gates.push(Rc::downgrade(&gate));
        }
        debug!("created {}", gate.borrow());
        gate
    }

    /// Creates a K-of-N vote gate.
    pub fn vote_gate(&mut self, vote_number: i32) -> Result<GateRef, GraphError> {
        if vote_number < 2 {
            return Err(GraphError::VoteNumberTooSmall(vote_number));
        }
        let gate = Gate::new(Operator::Atleast);
        gate.borrow_mut().set_vote_number(vote_number);
        debug!("created {}", gate.borrow());
        Ok(gate)
    }

    /// Adds an edge from `parent` to `child` under the signed index `arg`.
    /// A negative index makes the edge a complement and the graph
    /// non-coherent.
    pub fn connect(&mut self, parent: &GateRef, arg: i32, child: impl Into<NodeRef>) {
        if arg < 0 {
            self.coherent = false;
        }
        let node = child.into();
        parent.borrow_mut().add_arg(arg, &node);
    }
}

// Traversal bookkeeping clearers.
impl BooleanGraph {
    /// Resets the traversal mark of every reachable gate to false.
    ///
    /// The walk prunes at unmarked gates: algorithms that mark gates do so
    /// for everything they reach, so an unmarked gate has an unmarked
    /// subtree.
    pub fn clear_gate_marks(&self) {
        if let Some(root) = &self.root {
            Self::clear_gate_marks_from(root);
        }
    }

    fn clear_gate_marks_from(gate: &GateRef) {
        if !gate.borrow().mark() {
            return;
        }
        gate.borrow_mut().set_mark(false);
        let children: Vec<GateRef> = gate.borrow().gate_args().values().cloned().collect();
        for child in &children {
            Self::clear_gate_marks_from(child);
        }
    }

    /// Clears the visit-time slots of every reachable node.
    pub fn clear_node_visits(&self) {
        self.clear_gate_marks();
        if let Some(root) = &self.root {
            Self::clear_node_visits_from(root);
        }
        self.clear_gate_marks();
    }

    fn clear_node_visits_from(gate: &GateRef) {
        if gate.borrow().mark() {
            return;
        }
        {
            let mut g = gate.borrow_mut();
            g.set_mark(true);
            g.base_mut().clear_visits();
            for var in g.variable_args().values() {
                var.borrow_mut().base_mut().clear_visits();
            }
            for constant in g.constant_args().values() {
                constant.borrow_mut().base_mut().clear_visits();
            }
        }
        let children: Vec<GateRef> = gate.borrow().gate_args().values().cloned().collect();
        for child in &children {
            Self::clear_node_visits_from(child);
        }
    }

    /// Clears the positive/negative occurrence counters of every node.
    pub fn clear_node_counts(&self) {
        self.clear_gate_marks();
        if let Some(root) = &self.root {
            Self::clear_node_counts_from(root);
        }
        self.clear_gate_marks();
    }

    fn clear_node_counts_from(gate: &GateRef) {
        if gate.borrow().mark() {
            return;
        }
        {
            let mut g = gate.borrow_mut();
            g.set_mark(true);
            g.base_mut().reset_count();
            for var in g.variable_args().values() {
                var.borrow_mut().base_mut().reset_count();
            }
            for constant in g.constant_args().values() {
                constant.borrow_mut().base_mut().reset_count();
            }
        }
        let children: Vec<GateRef> = gate.borrow().gate_args().values().cloned().collect();
        for child in &children {
            Self::clear_node_counts_from(child);
        }
    }

    /// Clears the optimization value of every node.
    pub fn clear_opti_values(&self) {
        self.clear_gate_marks();
        if let Some(root) = &self.root {
            Self::clear_opti_values_from(root);
        }
        self.clear_gate_marks();
    }

    fn clear_opti_values_from(gate: &GateRef) {
        if gate.borrow().mark() {
            return;
        }
        {
            let mut g = gate.borrow_mut();
            g.set_mark(true);
            g.base_mut().set_opti_value(0);
            for var in g.variable_args().values() {
                var.borrow_mut().base_mut().set_opti_value(0);
            }
            for constant in g.constant_args().values() {
                constant.borrow_mut().base_mut().set_opti_value(0);
            }
        }
        let children: Vec<GateRef> = gate.borrow().gate_args().values().cloned().collect();
        for child in &children {
            Self::clear_opti_values_from(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_track_construction() {
        let mut graph = BooleanGraph::new();
        assert!(graph.coherent());
        assert!(graph.normal());

        let root = graph.gate(Operator::And);
        let x = graph.variable();
        let y = graph.variable();
        let (xi, yi) = (x.borrow().index(), y.borrow().index());
        graph.connect(&root, xi, &x);
        graph.connect(&root, yi, &y);
        graph.set_root(root).unwrap();
        assert!(graph.coherent());
        assert!(graph.normal());
    }

    #[test]
    fn test_negative_edge_clears_coherence() {
        let mut graph = BooleanGraph::new();
        let root = graph.gate(Operator::Or);
        let x = graph.variable();
        let y = graph.variable();
        let (xi, yi) = (x.borrow().index(), y.borrow().index());
        graph.connect(&root, -xi, &x);
        graph.connect(&root, yi, &y);
        assert!(!graph.coherent());
        assert!(graph.normal());
    }

    #[test]
    fn test_negative_operator_clears_both_flags() {
        let mut graph = BooleanGraph::new();
        let _gate = graph.gate(Operator::Nand);
        assert!(!graph.coherent());
        assert!(!graph.normal());
    }

    #[test]
    fn test_vote_gate_validation() {
        let mut graph = BooleanGraph::new();
        assert_eq!(
            graph.vote_gate(1).err(),
            Some(GraphError::VoteNumberTooSmall(1))
        );

        let vote = graph.vote_gate(2).unwrap();
        let x = graph.variable();
        let y = graph.variable();
        let (xi, yi) = (x.borrow().index(), y.borrow().index());
        graph.connect(&vote, xi, &x);
        graph.connect(&vote, yi, &y);
        // 2-of-2 is an AND gate in disguise; the builder rejects it.
        assert!(matches!(
            graph.set_root(vote.clone()),
            Err(GraphError::VoteNumberExceedsArity { .. })
        ));

        let z = graph.variable();
        let zi = z.borrow().index();
        graph.connect(&vote, zi, &z);
        assert!(graph.set_root(vote).is_ok());
    }

    #[test]
    fn test_clearers_reset_bookkeeping() {
        let mut graph = BooleanGraph::new();
        let root = graph.gate(Operator::And);
        let child = graph.gate(Operator::Or);
        let x = graph.variable();
        let y = graph.variable();
        let (xi, yi) = (x.borrow().index(), y.borrow().index());
        let child_index = child.borrow().index();
        graph.connect(&child, xi, &x);
        graph.connect(&child, yi, &y);
        graph.connect(&root, child_index, &child);
        graph.connect(&root, xi, &x);
        graph.set_root(root.clone()).unwrap();

        root.borrow_mut().set_mark(true);
        child.borrow_mut().set_mark(true);
        graph.clear_gate_marks();
        assert!(!root.borrow().mark());
        assert!(!child.borrow().mark());

        x.borrow_mut().base_mut().visit(1);
        child.borrow_mut().base_mut().visit(2);
        graph.clear_node_visits();
        assert!(!x.borrow().base().visited());
        assert!(!child.borrow().base().visited());

        x.borrow_mut().base_mut().add_count(true);
        graph.clear_node_counts();
        assert_eq!(x.borrow().base().pos_count(), 0);

        child.borrow_mut().base_mut().set_opti_value(3);
        graph.clear_opti_values();
        assert_eq!(child.borrow().base().opti_value(), 0);
    }
}
