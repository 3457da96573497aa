//! Operator normalization, complement propagation, and gate coalescing.
//!
//! Normalization reduces the operator set. The partial pass (Phase I)
//! rewrites NOT into NULL and NOR/NAND into OR/AND after lifting their
//! negation into the parent edges; the full pass (Phase III) additionally
//! expands XOR and vote gates into AND/OR structure. Complement propagation
//! (Phase IV) then pushes the remaining negative edges down to the
//! variables, and coalescing flattens same-operator chains.

use std::collections::HashMap;
use std::rc::Rc;

use log::trace;

use crate::gate::{Gate, Operator, State};
use crate::node::GateRef;

use super::Preprocessor;

impl Preprocessor<'_> {
    /// Normalizes operators across the graph. The full pass also expands
    /// XOR and vote gates; the partial pass keeps them for analyses that
    /// can handle them natively.
    ///
    /// The root's own negation is absorbed into the root sign.
    pub(super) fn normalize_gates(&mut self, full: bool) {
        debug_assert!(self.const_gates.is_empty());
        debug_assert!(self.null_gates.is_empty());
        let root = self.graph.root();
        match root.borrow().operator() {
            Operator::Nor | Operator::Nand | Operator::Not => self.root_sign = -self.root_sign,
            _ => {}
        }
        // Negative gates pass their negation up into the parent edge.
        self.graph.clear_gate_marks();
        Self::notify_parents_of_negative_gates(&root);

        self.graph.clear_gate_marks();
        self.normalize_gate(&root, full); // Registers NULL gates only.

        debug_assert!(self.const_gates.is_empty());
        self.clear_null_gates();
    }

    /// Flips the incoming edges of NOT/NAND/NOR children so the children
    /// can later retype into their positive counterparts.
    fn notify_parents_of_negative_gates(gate: &GateRef) {
        if gate.borrow().mark() {
            return;
        }
        gate.borrow_mut().set_mark(true);
        let children: Vec<(i32, GateRef)> = gate
            .borrow()
            .gate_args()
            .iter()
            .map(|(&arg, child)| (arg, child.clone()))
            .collect();
        let mut to_negate = Vec::new(); // Args to get the negation.
        for (arg, child) in &children {
            Self::notify_parents_of_negative_gates(child);
            match child.borrow().operator() {
                Operator::Nor | Operator::Nand | Operator::Not => to_negate.push(*arg),
                _ => {}
            }
        }
        for arg in to_negate {
            gate.borrow_mut().invert_arg(arg); // No constants or duplicates.
        }
    }

    /// Rewrites one gate's operator, depth-first.
    fn normalize_gate(&mut self, gate: &GateRef, full: bool) {
        if gate.borrow().mark() {
            return;
        }
        gate.borrow_mut().set_mark(true);
        debug_assert_eq!(gate.borrow().state(), State::Normal);
        debug_assert!(!gate.borrow().args().is_empty());
        // Depth-first traversal before the arguments may get changed.
        let children: Vec<GateRef> = gate.borrow().gate_args().values().cloned().collect();
        for child in &children {
            self.normalize_gate(child, full);
        }

        // Negation is already in the parent edges.
        let operator = gate.borrow().operator();
        match operator {
            Operator::Not => {
                debug_assert_eq!(gate.borrow().args().len(), 1);
                gate.borrow_mut().set_operator(Operator::Null);
                self.null_gates.push(Rc::downgrade(gate)); // Register for removal.
            }
            Operator::Nor | Operator::Or => {
                debug_assert!(gate.borrow().args().len() > 1);
                gate.borrow_mut().set_operator(Operator::Or);
            }
            Operator::Nand | Operator::And => {
                debug_assert!(gate.borrow().args().len() > 1);
                gate.borrow_mut().set_operator(Operator::And);
            }
            Operator::Xor => {
                debug_assert_eq!(gate.borrow().args().len(), 2);
                if full {
                    Self::normalize_xor_gate(gate);
                }
            }
            Operator::Atleast => {
                debug_assert!(gate.borrow().args().len() > 2);
                debug_assert!(gate.borrow().vote_number() > 1);
                if full {
                    Self::normalize_atleast_gate(gate);
                }
            }
            Operator::Null => {
                self.null_gates.push(Rc::downgrade(gate)); // Register for removal.
            }
        }
    }

    /// Expands `a XOR b` into `(a AND ~b) OR (~a AND b)`.
    fn normalize_xor_gate(gate: &GateRef) {
        debug_assert_eq!(gate.borrow().args().len(), 2);
        let gate_one = Gate::new(Operator::And);
        let gate_two = Gate::new(Operator::And);
        gate_one.borrow_mut().set_mark(true);
        gate_two.borrow_mut().set_mark(true);

        gate.borrow_mut().set_operator(Operator::Or);
        let args: Vec<i32> = gate.borrow().args().iter().copied().collect();
        let (first, second) = (args[0], args[1]);

        gate.borrow().share_arg(first, &gate_one);
        gate.borrow().share_arg(first, &gate_two);
        gate_two.borrow_mut().invert_arg(first);

        gate.borrow().share_arg(second, &gate_one);
        gate_one.borrow_mut().invert_arg(second);
        gate.borrow().share_arg(second, &gate_two);

        gate.borrow_mut().erase_all_args();
        let index_one = gate_one.borrow().index();
        gate.borrow_mut().add_gate_arg(index_one, &gate_one);
        let index_two = gate_two.borrow().index();
        gate.borrow_mut().add_gate_arg(index_two, &gate_two);
    }

    /// Expands a K/N vote gate by the recurrence
    /// `K/N = (x AND (K-1)/(N-1)) OR K/(N-1)` over its first argument.
    fn normalize_atleast_gate(gate: &GateRef) {
        debug_assert_eq!(gate.borrow().operator(), Operator::Atleast);
        let vote_number = gate.borrow().vote_number();

        debug_assert!(vote_number > 0);
        debug_assert!(gate.borrow().args().len() > 1);
        if gate.borrow().args().len() as i32 == vote_number {
            gate.borrow_mut().set_operator(Operator::And);
            return;
        }
        if vote_number == 1 {
            gate.borrow_mut().set_operator(Operator::Or);
            return;
        }

        let args: Vec<i32> = gate.borrow().args().iter().copied().collect();
        let first = args[0];

        let first_arg = Gate::new(Operator::And);
        gate.borrow().share_arg(first, &first_arg);

        let grand_arg = Gate::new(Operator::Atleast);
        grand_arg.borrow_mut().set_vote_number(vote_number - 1);
        let grand_index = grand_arg.borrow().index();
        first_arg.borrow_mut().add_gate_arg(grand_index, &grand_arg);

        let second_arg = Gate::new(Operator::Atleast);
        second_arg.borrow_mut().set_vote_number(vote_number);

        for &arg in &args[1..] {
            gate.borrow().share_arg(arg, &grand_arg);
            gate.borrow().share_arg(arg, &second_arg);
        }

        first_arg.borrow_mut().set_mark(true);
        second_arg.borrow_mut().set_mark(true);
        grand_arg.borrow_mut().set_mark(true);

        gate.borrow_mut().set_operator(Operator::Or);
        gate.borrow_mut().erase_all_args();
        let first_index = first_arg.borrow().index();
        gate.borrow_mut().add_gate_arg(first_index, &first_arg);
        let second_index = second_arg.borrow().index();
        gate.borrow_mut().add_gate_arg(second_index, &second_arg);

        Self::normalize_atleast_gate(&grand_arg);
        Self::normalize_atleast_gate(&second_arg);
    }

    /// Replaces every complemented gate edge by an edge to the complement
    /// gate (operator swapped, arguments inverted). Complements are
    /// memoized per traversal so repeated negations share one gate; a
    /// single-parent child is rewritten in place instead of cloned.
    ///
    /// Assumes a fully normalized graph: child gates are AND or OR.
    pub(super) fn propagate_complements(
        &mut self,
        gate: &GateRef,
        complements: &mut HashMap<i32, GateRef>,
    ) {
        if gate.borrow().mark() {
            return;
        }
        gate.borrow_mut().set_mark(true);
        let children: Vec<(i32, GateRef)> = gate
            .borrow()
            .gate_args()
            .iter()
            .map(|(&arg, child)| (arg, child.clone()))
            .collect();
        let mut to_swap = Vec::new(); // Negative args to get swapped.
        for (arg, child) in &children {
            let mut next = child.clone();
            if *arg < 0 {
                to_swap.push(*arg);
                let child_index = child.borrow().index();
                if complements.contains_key(&child_index) {
                    continue;
                }
                let operator = child.borrow().operator();
                // A vote gate keeps its operator under complementation:
                // ~@(k, xs) is @(n-k+1, ~xs).
                let (complement_type, complement_vote) = match operator {
                    Operator::Or => (Operator::And, 0),
                    Operator::And => (Operator::Or, 0),
                    Operator::Atleast => {
                        let c = child.borrow();
                        (Operator::Atleast, c.args().len() as i32 - c.vote_number() + 1)
                    }
                    _ => unreachable!("complement of a non-normalized gate"),
                };
                let complement = if child.borrow().base().parents().len() == 1 {
                    // The only parent is this traversal; rewrite in place.
                    let mut c = child.borrow_mut();
                    c.set_operator(complement_type);
                    if complement_type == Operator::Atleast {
                        c.set_vote_number(complement_vote);
                    }
                    c.invert_args();
                    child.clone()
                } else {
                    let clone = child.borrow().clone_gate();
                    let mut c = clone.borrow_mut();
                    c.set_operator(complement_type);
                    if complement_type == Operator::Atleast {
                        c.set_vote_number(complement_vote);
                    }
                    c.invert_args();
                    drop(c);
                    clone
                };
                complements.insert(child_index, complement.clone());
                next = complement;
            }
            self.propagate_complements(&next, complements);
        }

        for arg in to_swap {
            debug_assert!(arg < 0);
            gate.borrow_mut().erase_arg(arg);
            let complement = complements
                .get(&-arg)
                .cloned()
                .expect("complement must be memoized");
            let complement_index = complement.borrow().index();
            gate.borrow_mut().add_gate_arg(complement_index, &complement);
            debug_assert_eq!(gate.borrow().state(), State::Normal); // No duplicates.
        }
    }

    /// Runs [`join_gates`][Self::join_gates] from the root to a fixed
    /// point, draining any constant gates the joins produce.
    pub(super) fn coalesce_gates(&mut self, common: bool) {
        let mut graph_changed = true;
        while graph_changed {
            debug_assert!(self.const_gates.is_empty());
            debug_assert!(self.null_gates.is_empty());

            graph_changed = false;
            self.graph.clear_gate_marks();
            let root = self.graph.root();
            if root.borrow().state() == State::Normal {
                self.join_gates(&root, common); // Registers const gates.
            }

            if !self.const_gates.is_empty() {
                self.clear_const_gates();
                graph_changed = true;
            }
        }
    }

    /// Collapses positive same-operator child gates into their parents.
    /// In the strict mode only single-parent children are inlined; the
    /// layered (`common`) mode also inlines shared children, trading graph
    /// size for flatness. Modules are never crossed.
    pub(super) fn join_gates(&mut self, gate: &GateRef, common: bool) -> bool {
        if gate.borrow().mark() {
            return false;
        }
        gate.borrow_mut().set_mark(true);
        let operator = gate.borrow().operator();
        // What kind of arg gate are we searching for?
        let target_type = match operator {
            Operator::Nand | Operator::And => {
                debug_assert!(gate.borrow().args().len() > 1);
                Some(Operator::And)
            }
            Operator::Nor | Operator::Or => {
                debug_assert!(gate.borrow().args().len() > 1);
                Some(Operator::Or)
            }
            _ => None,
        };
        debug_assert!(!gate.borrow().args().is_empty());
        let children: Vec<(i32, GateRef)> = gate
            .borrow()
            .gate_args()
            .iter()
            .map(|(&arg, child)| (arg, child.clone()))
            .collect();
        let mut to_join = Vec::new(); // Gate arguments of the same logic.
        let mut changed = false;
        for (arg, child) in &children {
            if self.join_gates(child, common) {
                changed = true;
            }

            let Some(target_type) = target_type else {
                continue; // Joining with the parent is impossible.
            };
            if *arg < 0 {
                continue; // Cannot join a negative arg gate.
            }
            if child.borrow().is_module() {
                continue; // Preserve modules.
            }
            if !common && child.borrow().base().parents().len() > 1 {
                continue; // Shared children are for the layered mode.
            }
            if child.borrow().operator() == target_type {
                to_join.push(child.clone());
            }
        }

        for child in &to_join {
            trace!(
                "G{}: joining child gate G{}",
                gate.borrow().index(),
                child.borrow().index()
            );
            gate.borrow_mut().join_gate(child);
            changed = true;
            if gate.borrow().state() != State::Normal {
                // The parent is constant; no need to join the rest.
                self.const_gates.push(Rc::downgrade(gate));
                break;
            }
            debug_assert!(gate.borrow().args().len() > 1); // No NULL gates out of joins.
        }
        changed
    }
}
