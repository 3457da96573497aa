//! Decomposition of common nodes (Shannon expansion along shared setups).
//!
//! Where a shared node reaches an AND/NAND ancestor, the node is True in
//! the rest of that ancestor's subgraph; under OR/NOR it is False. The
//! ancestor is a decomposition destination: the paths from it down to the
//! node's other occurrences are cloned and the node is replaced by its
//! implied constant there. Clones are memoized per propagated state so
//! shared sub-DAGs are copied at most twice, and single-parent gates are
//! rewritten in place instead of cloned.

use std::collections::HashMap;
use std::rc::Rc;

use log::trace;

use crate::gate::{Operator, State};
use crate::node::{GateRef, NodeRef, WeakGate};

use super::Preprocessor;

impl Preprocessor<'_> {
    /// Processes all shared nodes, deepest first so that higher
    /// decompositions do not multiply the parents of deeper ones.
    pub(super) fn decompose_common_nodes(&mut self) -> bool {
        debug_assert!(self.const_gates.is_empty());
        debug_assert!(self.null_gates.is_empty());

        self.graph.clear_node_visits();
        let (common_gates, common_variables) = self.gather_common_nodes();
        self.graph.clear_node_visits();

        let mut changed = false;
        // Gates first; variables may lose their extra parents along the way.
        for weak in common_gates.iter().rev() {
            if let Some(gate) = weak.upgrade() {
                if self.process_decomposition_common_node(NodeRef::Gate(gate)) {
                    changed = true;
                }
            }
        }
        for weak in common_variables.iter().rev() {
            if let Some(var) = weak.upgrade() {
                if self.process_decomposition_common_node(NodeRef::Variable(var)) {
                    changed = true;
                }
            }
        }
        changed
    }

    fn process_decomposition_common_node(&mut self, node: NodeRef) -> bool {
        debug_assert!(self.const_gates.is_empty());
        debug_assert!(self.null_gates.is_empty());

        if node.parent_count() < 2 {
            return false;
        }

        let parents: Vec<GateRef> = node.with_base(|base| {
            base.parents().values().filter_map(|weak| weak.upgrade()).collect()
        });

        // Determine whether any setup allows decomposition at all.
        let possible = parents.iter().any(|parent| {
            matches!(
                parent.borrow().operator(),
                Operator::And | Operator::Nand | Operator::Or | Operator::Nor
            )
        });
        if !possible {
            return false;
        }

        let index = node.index();
        // Mark the ancestors of every parent.
        for parent in &parents {
            debug_assert_ne!(parent.borrow().base().last_visit(), index);
            Self::mark_decomposition_destinations(parent, index);
        }
        // A parent that got marked while walking the others' ancestors
        // encloses further occurrences of the node: a destination.
        let mut dest: Vec<WeakGate> = Vec::new();
        for parent in &parents {
            if parent.borrow().base().last_visit() == index {
                match parent.borrow().operator() {
                    Operator::And | Operator::Nand | Operator::Or | Operator::Nor => {
                        dest.push(Rc::downgrade(parent));
                    }
                    _ => {}
                }
            } else {
                // Mark for processing by the destination.
                parent.borrow_mut().base_mut().visit(index);
            }
        }
        if dest.is_empty() {
            return false; // No setups are found.
        }

        trace!("Processing decomposition for node {}", index);
        self.process_decomposition_destinations(&node, &dest);
        true
    }

    fn mark_decomposition_destinations(parent: &GateRef, index: i32) {
        let ancestors: Vec<GateRef> = parent.borrow().base().parents().values()
            .filter_map(|weak| weak.upgrade())
            .collect();
        for ancestor in ancestors {
            if ancestor.borrow().base().last_visit() == index {
                continue;
            }
            ancestor.borrow_mut().base_mut().visit(index);
            if ancestor.borrow().is_module() {
                continue; // Stay within the sub-graph.
            }
            Self::mark_decomposition_destinations(&ancestor, index);
        }
    }

    fn process_decomposition_destinations(&mut self, node: &NodeRef, dest: &[WeakGate]) {
        let mut clones_true: HashMap<i32, GateRef> = HashMap::new();
        let mut clones_false: HashMap<i32, GateRef> = HashMap::new();
        for weak in dest {
            let Some(parent) = weak.upgrade() else {
                continue; // Removed by constant propagation.
            };

            // An ancestor link may have processed this destination already.
            if !node.with_base(|base| base.parents().contains_key(&parent.borrow().index())) {
                continue;
            }

            let mut state = match parent.borrow().operator() {
                Operator::And | Operator::Nand => true,
                Operator::Or | Operator::Nor => false,
                _ => {
                    debug_assert!(false, "unexpected destination operator");
                    continue;
                }
            };
            let sign = if parent.borrow().args().contains(&node.index()) { 1 } else { -1 };
            if sign < 0 {
                state = !state;
            }
            trace!("Processing decomposition destination G{}", parent.borrow().index());
            let clones = if state { &mut clones_true } else { &mut clones_false };
            self.process_decomposition_ancestors(&parent, node, state, true, clones);
        }
        self.clear_const_gates(); // The actual propagation of the constants.
        self.clear_null_gates();
    }

    /// Walks from a destination toward the node, cloning shared gates on
    /// the way and substituting the implied constant at the node's other
    /// occurrences.
    fn process_decomposition_ancestors(
        &mut self,
        ancestor: &GateRef,
        node: &NodeRef,
        state: bool,
        destination: bool,
        clones: &mut HashMap<i32, GateRef>,
    ) {
        if !destination
            && node.with_base(|base| base.parents().contains_key(&ancestor.borrow().index()))
        {
            trace!("Reached decomposition sub-parent G{}", ancestor.borrow().index());
            let sign = if ancestor.borrow().args().contains(&node.index()) { 1 } else { -1 };
            self.process_constant_arg(ancestor, sign * node.index(), state);

            if ancestor.borrow().state() != State::Normal {
                self.const_gates.push(Rc::downgrade(ancestor));
                return;
            } else if ancestor.borrow().operator() == Operator::Null {
                self.null_gates.push(Rc::downgrade(ancestor));
            }
        }
        let mut to_swap: Vec<(i32, GateRef)> = Vec::new(); // For common gates.
        let mut ancestors: Vec<GateRef> = Vec::new(); // To work on next.
        let children: Vec<(i32, GateRef)> = ancestor
            .borrow()
            .gate_args()
            .iter()
            .map(|(&arg, child)| (arg, child.clone()))
            .collect();
        for (arg, gate) in &children {
            if gate.borrow().base().last_visit() != node.index() {
                continue;
            }
            let gate_index = gate.borrow().index();
            if let Some(copy) = clones.get(&gate_index) {
                // Already processed gate.
                to_swap.push((*arg, copy.clone()));
            } else if gate.borrow().base().parents().len() == 1 {
                // Avoid revisiting in destination linking.
                gate.borrow_mut().base_mut().clear_visits();
                ancestors.push(gate.clone()); // Unprocessed gate.
            } else {
                debug_assert!(gate.borrow().base().parents().len() > 1);
                let copy = gate.borrow().clone_gate();
                clones.insert(gate_index, copy.clone());
                to_swap.push((*arg, copy.clone()));
                ancestors.push(copy); // Process only the new clones.
            }
        }
        // Swapping first reduces the sharing in the sub-graph.
        for (arg, copy) in &to_swap {
            ancestor.borrow_mut().erase_arg(*arg);
            let sign = if *arg > 0 { 1 } else { -1 };
            let copy_index = copy.borrow().index();
            ancestor.borrow_mut().add_gate_arg(sign * copy_index, copy);
        }
        for gate in &ancestors {
            self.process_decomposition_ancestors(gate, node, state, false, clones);
        }
    }
}
