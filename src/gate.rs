//! Gates and their structural operations.
//!
//! A [`Gate`] is an internal node of a Boolean graph: an operator applied to
//! a set of signed argument references. The operations here form the whole
//! algebraic surface the preprocessor rewrites through. Every operation
//! either preserves the structural invariants of the graph (no duplicate
//! signed argument, never both polarities of one child, parent/child link
//! symmetry) or transitions the gate into a constant state for the caller
//! to propagate.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use log::trace;

use crate::node::{ConstantRef, GateRef, NodeBase, NodeRef, VariableRef, WeakGate};

/// Gate operators.
///
/// `Nand`, `Nor`, `Not` disappear during normalization; `Null` is the
/// identity gate of arity one; `Atleast` is the K-of-N vote gate.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Operator {
    And,
    Or,
    Nand,
    Nor,
    Xor,
    Not,
    Null,
    Atleast,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Nand => "NAND",
            Operator::Nor => "NOR",
            Operator::Xor => "XOR",
            Operator::Not => "NOT",
            Operator::Null => "NULL",
            Operator::Atleast => "ATLEAST",
        };
        write!(f, "{}", name)
    }
}

/// Constant states a gate can collapse into.
///
/// A gate in `Null` or `Unity` state is a constant awaiting propagation; it
/// keeps its operator tag until the worklists drain it out of the graph.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum State {
    Normal,
    /// Constant False.
    Null,
    /// Constant True.
    Unity,
}

/// An internal node: an operator over signed argument references.
///
/// Arguments are kept in three tables by child kind, all keyed by the
/// signed index; `args` is the unified signed-index view. Children hold
/// weak back-references to this gate keyed by its index.
pub struct Gate {
    base: NodeBase,
    operator: Operator,
    state: State,
    vote_number: i32,
    mark: bool,
    module: bool,
    args: BTreeSet<i32>,
    gate_args: BTreeMap<i32, GateRef>,
    variable_args: BTreeMap<i32, VariableRef>,
    constant_args: BTreeMap<i32, ConstantRef>,
    self_weak: WeakGate,
}

impl Gate {
    /// Creates a detached gate with a fresh index.
    pub fn new(operator: Operator) -> GateRef {
        Rc::new_cyclic(|weak| {
            RefCell::new(Gate {
                base: NodeBase::new(),
                operator,
                state: State::Normal,
                vote_number: 0,
                mark: false,
                module: false,
                args: BTreeSet::new(),
                gate_args: BTreeMap::new(),
                variable_args: BTreeMap::new(),
                constant_args: BTreeMap::new(),
                self_weak: weak.clone(),
            })
        })
    }

    pub fn index(&self) -> i32 {
        self.base.index()
    }

    pub fn base(&self) -> &NodeBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Retypes the gate. Arity adjustments are the caller's responsibility.
    pub fn set_operator(&mut self, operator: Operator) {
        self.operator = operator;
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn vote_number(&self) -> i32 {
        self.vote_number
    }

    pub fn set_vote_number(&mut self, vote_number: i32) {
        self.vote_number = vote_number;
    }

    pub fn mark(&self) -> bool {
        self.mark
    }

    pub fn set_mark(&mut self, mark: bool) {
        self.mark = mark;
    }

    pub fn is_module(&self) -> bool {
        self.module
    }

    /// Marks this gate as an independent module.
    pub fn turn_module(&mut self) {
        self.module = true;
    }

    /// The unified signed-index view of all arguments.
    pub fn args(&self) -> &BTreeSet<i32> {
        &self.args
    }

    pub fn gate_args(&self) -> &BTreeMap<i32, GateRef> {
        &self.gate_args
    }

    pub fn variable_args(&self) -> &BTreeMap<i32, VariableRef> {
        &self.variable_args
    }

    pub fn constant_args(&self) -> &BTreeMap<i32, ConstantRef> {
        &self.constant_args
    }

    /// Looks up an argument of any kind by its signed index.
    pub fn arg(&self, arg: i32) -> Option<NodeRef> {
        if let Some(gate) = self.gate_args.get(&arg) {
            Some(NodeRef::Gate(gate.clone()))
        } else if let Some(var) = self.variable_args.get(&arg) {
            Some(NodeRef::Variable(var.clone()))
        } else {
            self.constant_args.get(&arg).map(|c| NodeRef::Constant(c.clone()))
        }
    }
}

// Structural mutators.
impl Gate {
    /// Adds an argument of any node kind under the given signed index.
    ///
    /// Duplicate and complement admissions do not add an edge; they rewrite
    /// the gate instead (drop, constant transition, or vote-gate expansion),
    /// so the caller must inspect `state()` and `operator()` afterwards.
    pub fn add_arg(&mut self, arg: i32, node: &NodeRef) {
        match node {
            NodeRef::Gate(gate) => self.add_gate_arg(arg, gate),
            NodeRef::Variable(var) => self.add_variable_arg(arg, var),
            NodeRef::Constant(constant) => self.add_constant_arg(arg, constant),
        }
    }

    pub fn add_gate_arg(&mut self, arg: i32, gate: &GateRef) {
        if !self.admit_arg(arg) {
            return;
        }
        debug_assert_eq!(crate::node::arg_index(arg), gate.borrow().index());
        self.args.insert(arg);
        self.gate_args.insert(arg, gate.clone());
        gate.borrow_mut()
            .base_mut()
            .add_parent(self.base.index(), self.self_weak.clone());
    }

    pub fn add_variable_arg(&mut self, arg: i32, var: &VariableRef) {
        if !self.admit_arg(arg) {
            return;
        }
        debug_assert_eq!(crate::node::arg_index(arg), var.borrow().index());
        self.args.insert(arg);
        self.variable_args.insert(arg, var.clone());
        var.borrow_mut()
            .base_mut()
            .add_parent(self.base.index(), self.self_weak.clone());
    }

    pub fn add_constant_arg(&mut self, arg: i32, constant: &ConstantRef) {
        if !self.admit_arg(arg) {
            return;
        }
        debug_assert_eq!(crate::node::arg_index(arg), constant.borrow().index());
        self.args.insert(arg);
        self.constant_args.insert(arg, constant.clone());
        constant
            .borrow_mut()
            .base_mut()
            .add_parent(self.base.index(), self.self_weak.clone());
    }

    /// Checks an argument for admission; handles duplicates and complements.
    /// Returns true if the edge should actually be inserted.
    fn admit_arg(&mut self, arg: i32) -> bool {
        debug_assert_ne!(arg, 0);
        debug_assert_eq!(self.state, State::Normal);
        debug_assert!(
            !((self.operator == Operator::Not || self.operator == Operator::Null)
                && !self.args.is_empty()),
            "single-argument gate overflow"
        );
        debug_assert!(!(self.operator == Operator::Xor && self.args.len() > 1));
        if self.args.contains(&arg) {
            self.process_duplicate_arg(arg);
            false
        } else if self.args.contains(&-arg) {
            self.process_complement_arg(arg);
            false
        } else {
            true
        }
    }

    /// An argument identical to an existing one (same sign).
    fn process_duplicate_arg(&mut self, arg: i32) {
        match self.operator {
            // Idempotent operators drop the duplicate; a gate left with
            // the duplicated argument alone is a pass-through.
            Operator::And | Operator::Or => {
                if self.args.len() == 1 {
                    self.operator = Operator::Null;
                }
            }
            Operator::Nand | Operator::Nor => {
                if self.args.len() == 1 {
                    self.operator = Operator::Not;
                }
            }
            // x XOR x is constant False.
            Operator::Xor => self.nullify(),
            Operator::Atleast => self.process_vote_duplicate_arg(arg),
            Operator::Not | Operator::Null => {
                debug_assert!(false, "duplicate argument on single-argument gate")
            }
        }
    }

    /// A duplicate argument of a vote gate:
    /// `@(k, [x, x, ys]) = (x AND @(k-2, ys)) OR @(k, ys)`.
    ///
    /// Degenerate vote numbers collapse the sub-expressions to AND/OR or to
    /// the bare argument, down to a NULL pass-through of x itself.
    fn process_vote_duplicate_arg(&mut self, arg: i32) {
        debug_assert_eq!(self.operator, Operator::Atleast);
        trace!("G{}: duplicate argument {} of a vote gate", self.index(), arg);
        let k = self.vote_number;
        if self.args.len() == 1 {
            // @(2, [x, x]) is x.
            debug_assert_eq!(k, 2);
            self.operator = Operator::Null;
            return;
        }
        let rest: Vec<i32> = self.args.iter().copied().filter(|&a| a != arg).collect();
        if k == 2 {
            if rest.len() == 1 {
                // @(2, [x, x, y]) is x: the pair alone reaches the vote.
                self.erase_arg(rest[0]);
                self.operator = Operator::Null;
                return;
            }
            // @(2, [x, x, ys]) = x OR @(2, ys)
            let rest_gate = Gate::new(if rest.len() == 2 {
                Operator::And
            } else {
                Operator::Atleast
            });
            if rest.len() > 2 {
                rest_gate.borrow_mut().set_vote_number(2);
            }
            for &a in &rest {
                self.share_arg(a, &rest_gate);
            }
            for &a in &rest {
                self.erase_arg(a);
            }
            self.operator = Operator::Or;
            self.vote_number = 0;
            let index = rest_gate.borrow().index();
            self.add_gate_arg(index, &rest_gate);
            return;
        }
        // General case: k >= 3, so both sub-expressions materialize.
        let high = Gate::new(if k == 3 { Operator::Or } else { Operator::Atleast });
        if k > 3 {
            high.borrow_mut().set_vote_number(k - 2);
        }
        let low = Gate::new(if k == rest.len() as i32 {
            Operator::And
        } else {
            Operator::Atleast
        });
        if k < rest.len() as i32 {
            low.borrow_mut().set_vote_number(k);
        }
        for &a in &rest {
            self.share_arg(a, &high);
            self.share_arg(a, &low);
        }
        let first = Gate::new(Operator::And);
        self.share_arg(arg, &first);
        {
            let index = high.borrow().index();
            first.borrow_mut().add_gate_arg(index, &high);
        }
        self.erase_all_args();
        self.operator = Operator::Or;
        self.vote_number = 0;
        let first_index = first.borrow().index();
        self.add_gate_arg(first_index, &first);
        let low_index = low.borrow().index();
        self.add_gate_arg(low_index, &low);
    }

    /// An argument that is the complement of an existing one.
    fn process_complement_arg(&mut self, arg: i32) {
        trace!("G{}: complement argument {}", self.index(), arg);
        match self.operator {
            Operator::And | Operator::Nor => self.nullify(),
            Operator::Or | Operator::Nand | Operator::Xor => self.make_unity(),
            Operator::Atleast => {
                // @(k, [x, ~x, ys]) = @(k-1, ys): the pair always supplies
                // exactly one failure.
                self.erase_arg(-arg);
                debug_assert!(self.vote_number > 1);
                self.vote_number -= 1;
                if self.vote_number == 1 {
                    self.operator = Operator::Or;
                } else if self.vote_number == self.args.len() as i32 {
                    self.operator = Operator::And;
                }
            }
            Operator::Not | Operator::Null => {
                debug_assert!(false, "complement argument on single-argument gate")
            }
        }
    }

    /// Detaches one argument. The gate keeps its operator; callers that can
    /// shrink a gate below its arity retype it themselves.
    pub fn erase_arg(&mut self, arg: i32) {
        debug_assert!(self.args.contains(&arg));
        self.args.remove(&arg);
        let index = self.base.index();
        if let Some(gate) = self.gate_args.remove(&arg) {
            gate.borrow_mut().base_mut().erase_parent(index);
        } else if let Some(var) = self.variable_args.remove(&arg) {
            var.borrow_mut().base_mut().erase_parent(index);
        } else if let Some(constant) = self.constant_args.remove(&arg) {
            constant.borrow_mut().base_mut().erase_parent(index);
        }
    }

    /// Detaches every argument.
    pub fn erase_all_args(&mut self) {
        let index = self.base.index();
        self.args.clear();
        for (_, gate) in std::mem::take(&mut self.gate_args) {
            gate.borrow_mut().base_mut().erase_parent(index);
        }
        for (_, var) in std::mem::take(&mut self.variable_args) {
            var.borrow_mut().base_mut().erase_parent(index);
        }
        for (_, constant) in std::mem::take(&mut self.constant_args) {
            constant.borrow_mut().base_mut().erase_parent(index);
        }
    }

    /// Flips the polarity of one argument edge.
    ///
    /// Never creates a duplicate: the child occurs exactly once.
    pub fn invert_arg(&mut self, arg: i32) {
        debug_assert!(self.args.contains(&arg));
        debug_assert!(!self.args.contains(&-arg));
        self.args.remove(&arg);
        self.args.insert(-arg);
        if let Some(gate) = self.gate_args.remove(&arg) {
            self.gate_args.insert(-arg, gate);
        } else if let Some(var) = self.variable_args.remove(&arg) {
            self.variable_args.insert(-arg, var);
        } else if let Some(constant) = self.constant_args.remove(&arg) {
            self.constant_args.insert(-arg, constant);
        }
    }

    /// Flips the polarity of every argument edge.
    pub fn invert_args(&mut self) {
        let args: Vec<i32> = self.args.iter().copied().collect();
        for arg in args {
            self.invert_arg(arg);
        }
    }

    /// Copies one argument edge into another gate, preserving polarity.
    pub fn share_arg(&self, arg: i32, recipient: &GateRef) {
        if let Some(gate) = self.gate_args.get(&arg) {
            recipient.borrow_mut().add_gate_arg(arg, gate);
        } else if let Some(var) = self.variable_args.get(&arg) {
            recipient.borrow_mut().add_variable_arg(arg, var);
        } else if let Some(constant) = self.constant_args.get(&arg) {
            recipient.borrow_mut().add_constant_arg(arg, constant);
        } else {
            debug_assert!(false, "sharing a missing argument");
        }
    }

    /// Moves one argument edge into another gate, preserving polarity.
    pub fn transfer_arg(&mut self, arg: i32, recipient: &GateRef) {
        self.share_arg(arg, recipient);
        self.erase_arg(arg);
    }

    /// Merges all arguments of a positive same-logic child gate into this
    /// gate and removes the child edge.
    ///
    /// The merge can collapse this gate into a constant state; in that case
    /// the remaining arguments are already detached and the child edge is
    /// gone with them.
    pub fn join_gate(&mut self, child: &GateRef) {
        let child_index = child.borrow().index();
        debug_assert!(self.args.contains(&child_index), "positive child edge expected");
        let (gates, vars, constants) = {
            let c = child.borrow();
            (
                c.gate_args.iter().map(|(&a, g)| (a, g.clone())).collect::<Vec<_>>(),
                c.variable_args.iter().map(|(&a, v)| (a, v.clone())).collect::<Vec<_>>(),
                c.constant_args.iter().map(|(&a, k)| (a, k.clone())).collect::<Vec<_>>(),
            )
        };
        for (arg, gate) in gates {
            self.add_gate_arg(arg, &gate);
            if self.state != State::Normal {
                return;
            }
        }
        for (arg, var) in vars {
            self.add_variable_arg(arg, &var);
            if self.state != State::Normal {
                return;
            }
        }
        for (arg, constant) in constants {
            self.add_constant_arg(arg, &constant);
            if self.state != State::Normal {
                return;
            }
        }
        self.args.remove(&child_index);
        self.gate_args.remove(&child_index);
        child.borrow_mut().base_mut().erase_parent(self.base.index());
    }

    /// Inlines a NULL child gate: the edge to it is replaced by an edge to
    /// its lone argument, with polarities composed.
    pub fn join_null_gate(&mut self, arg: i32) {
        debug_assert_ne!(arg, 0);
        debug_assert!(self.args.contains(&arg));
        let null_gate = match self.gate_args.get(&arg) {
            Some(gate) => gate.clone(),
            None => {
                debug_assert!(false, "NULL argument is not a gate");
                return;
            }
        };
        self.args.remove(&arg);
        self.gate_args.remove(&arg);
        null_gate.borrow_mut().base_mut().erase_parent(self.base.index());

        let sign = if arg > 0 { 1 } else { -1 };
        let grand_arg;
        let grand_node;
        {
            let null_gate = null_gate.borrow();
            debug_assert_eq!(null_gate.operator, Operator::Null);
            debug_assert_eq!(null_gate.args.len(), 1);
            grand_arg = match null_gate.args.iter().next() {
                Some(&a) => a,
                None => return,
            };
            grand_node = null_gate.arg(grand_arg);
        }
        if let Some(node) = grand_node {
            self.add_arg(sign * grand_arg, &node);
        }
    }

    /// Copies this gate: same operator, vote number, and argument edges.
    /// The children gain the clone as a new parent; the clone starts with
    /// no parents of its own.
    pub fn clone_gate(&self) -> GateRef {
        trace!("G{}: cloning", self.index());
        let clone = Gate::new(self.operator);
        {
            let mut c = clone.borrow_mut();
            c.vote_number = self.vote_number;
            c.args = self.args.clone();
            let clone_index = c.base.index();
            let clone_weak = c.self_weak.clone();
            for (&arg, gate) in &self.gate_args {
                c.gate_args.insert(arg, gate.clone());
                gate.borrow_mut().base_mut().add_parent(clone_index, clone_weak.clone());
            }
            for (&arg, var) in &self.variable_args {
                c.variable_args.insert(arg, var.clone());
                var.borrow_mut().base_mut().add_parent(clone_index, clone_weak.clone());
            }
            for (&arg, constant) in &self.constant_args {
                c.constant_args.insert(arg, constant.clone());
                constant
                    .borrow_mut()
                    .base_mut()
                    .add_parent(clone_index, clone_weak.clone());
            }
        }
        clone
    }

    /// Transitions into constant True, detaching all children.
    pub fn make_unity(&mut self) {
        debug_assert_eq!(self.state, State::Normal);
        self.state = State::Unity;
        self.erase_all_args();
    }

    /// Transitions into constant False, detaching all children.
    pub fn nullify(&mut self) {
        debug_assert_eq!(self.state, State::Normal);
        self.state = State::Null;
        self.erase_all_args();
    }

    /// Notification that one of this gate's arguments has failed during
    /// failure propagation. Sets the gate's own failure flag when the
    /// operator's failure criterion is met.
    ///
    /// Only meaningful on coherent (all-positive) structures.
    pub(crate) fn arg_failed(&mut self) {
        if self.base.opti_value() == 1 {
            return;
        }
        debug_assert_eq!(self.base.opti_value(), 0);
        match self.operator {
            Operator::Or | Operator::Null => self.base.set_opti_value(1),
            Operator::And => {
                if self.failed_arg_count() == self.args.len() as i32 {
                    self.base.set_opti_value(1);
                }
            }
            Operator::Atleast => {
                if self.failed_arg_count() >= self.vote_number {
                    self.base.set_opti_value(1);
                }
            }
            _ => debug_assert!(false, "failure propagation through a non-coherent operator"),
        }
    }

    fn failed_arg_count(&self) -> i32 {
        let mut count = 0;
        for gate in self.gate_args.values() {
            if gate.borrow().base.opti_value() == 1 {
                count += 1;
            }
        }
        for var in self.variable_args.values() {
            if var.borrow().base().opti_value() == 1 {
                count += 1;
            }
        }
        count
    }
}

impl Drop for Gate {
    /// Unlinks the dying gate from its children's parent maps so that
    /// shared children never count a dead parent. Worklists tolerate
    /// expired entries; parent maps must not.
    fn drop(&mut self) {
        let index = self.base.index();
        for gate in self.gate_args.values() {
            gate.borrow_mut().base_mut().erase_parent(index);
        }
        for var in self.variable_args.values() {
            var.borrow_mut().base_mut().erase_parent(index);
        }
        for constant in self.constant_args.values() {
            constant.borrow_mut().base_mut().erase_parent(index);
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            State::Normal => write!(f, "G{}:{}({})", self.index(), self.operator, self.args.len()),
            State::Null => write!(f, "G{}:\u{22a5}", self.index()),
            State::Unity => write!(f, "G{}:\u{22a4}", self.index()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Variable;

    fn var_arg(gate: &GateRef) -> VariableRef {
        let var = Variable::new();
        let index = var.borrow().index();
        gate.borrow_mut().add_variable_arg(index, &var);
        var
    }

    #[test]
    fn test_add_arg_links_parent() {
        let gate = Gate::new(Operator::And);
        let var = var_arg(&gate);
        let g = gate.borrow();
        assert_eq!(g.args().len(), 1);
        assert!(var.borrow().base().parents().contains_key(&g.index()));
    }

    #[test]
    fn test_duplicate_arg_dropped_for_and() {
        let gate = Gate::new(Operator::And);
        let var = var_arg(&gate);
        let index = var.borrow().index();
        gate.borrow_mut().add_variable_arg(index, &var);
        assert_eq!(gate.borrow().args().len(), 1);
        assert_eq!(gate.borrow().state(), State::Normal);
    }

    #[test]
    fn test_complement_arg_nullifies_and() {
        let gate = Gate::new(Operator::And);
        let var = var_arg(&gate);
        let index = var.borrow().index();
        gate.borrow_mut().add_variable_arg(-index, &var);
        assert_eq!(gate.borrow().state(), State::Null);
        assert!(gate.borrow().args().is_empty());
        assert!(var.borrow().base().parents().is_empty());
    }

    #[test]
    fn test_complement_arg_makes_or_unity() {
        let gate = Gate::new(Operator::Or);
        let var = var_arg(&gate);
        let index = var.borrow().index();
        gate.borrow_mut().add_variable_arg(-index, &var);
        assert_eq!(gate.borrow().state(), State::Unity);
    }

    #[test]
    fn test_xor_duplicate_is_constant_false() {
        let gate = Gate::new(Operator::Xor);
        let var = var_arg(&gate);
        let index = var.borrow().index();
        gate.borrow_mut().add_variable_arg(index, &var);
        assert_eq!(gate.borrow().state(), State::Null);
    }

    #[test]
    fn test_vote_complement_decrements() {
        // @(2, [x, ~x, y, z]) = @(1, [y, z]) = OR(y, z)
        let gate = Gate::new(Operator::Atleast);
        gate.borrow_mut().set_vote_number(2);
        let x = var_arg(&gate);
        let _y = var_arg(&gate);
        let _z = var_arg(&gate);
        let x_index = x.borrow().index();
        gate.borrow_mut().add_variable_arg(-x_index, &x);
        let g = gate.borrow();
        assert_eq!(g.operator(), Operator::Or);
        assert_eq!(g.args().len(), 2);
        assert!(x.borrow().base().parents().is_empty());
    }

    #[test]
    fn test_vote_duplicate_expands() {
        // @(2, [x, x, y, z]) = x OR @(2, [y, z]) = x OR (y AND z)
        let gate = Gate::new(Operator::Atleast);
        gate.borrow_mut().set_vote_number(2);
        let x = var_arg(&gate);
        let _y = var_arg(&gate);
        let _z = var_arg(&gate);
        let x_index = x.borrow().index();
        gate.borrow_mut().add_variable_arg(x_index, &x);
        let g = gate.borrow();
        assert_eq!(g.operator(), Operator::Or);
        assert_eq!(g.args().len(), 2);
        assert!(g.args().contains(&x_index));
        let (_, rest) = g.gate_args().iter().next().map(|(&a, g)| (a, g.clone())).unwrap();
        assert_eq!(rest.borrow().operator(), Operator::And);
        assert_eq!(rest.borrow().args().len(), 2);
    }

    #[test]
    fn test_invert_args() {
        let gate = Gate::new(Operator::Or);
        let x = var_arg(&gate);
        let y = var_arg(&gate);
        gate.borrow_mut().invert_args();
        let g = gate.borrow();
        assert!(g.args().contains(&-x.borrow().index()));
        assert!(g.args().contains(&-y.borrow().index()));
        assert_eq!(g.args().len(), 2);
    }

    #[test]
    fn test_join_gate_flattens() {
        let parent = Gate::new(Operator::And);
        let _p = var_arg(&parent);
        let child = Gate::new(Operator::And);
        let _a = var_arg(&child);
        let _b = var_arg(&child);
        let child_index = child.borrow().index();
        parent.borrow_mut().add_gate_arg(child_index, &child);

        parent.borrow_mut().join_gate(&child);
        let g = parent.borrow();
        assert_eq!(g.args().len(), 3);
        assert!(g.gate_args().is_empty());
        assert!(child.borrow().base().parents().is_empty());
    }

    #[test]
    fn test_join_null_gate_composes_signs() {
        let parent = Gate::new(Operator::And);
        let _p = var_arg(&parent);
        let null_gate = Gate::new(Operator::Null);
        let x = Variable::new();
        let x_index = x.borrow().index();
        null_gate.borrow_mut().add_variable_arg(-x_index, &x);
        let null_index = null_gate.borrow().index();
        parent.borrow_mut().add_gate_arg(-null_index, &null_gate);

        parent.borrow_mut().join_null_gate(-null_index);
        let g = parent.borrow();
        assert!(g.args().contains(&x_index), "two negations must cancel");
        assert!(g.gate_args().is_empty());
    }

    #[test]
    fn test_clone_shares_children() {
        let gate = Gate::new(Operator::Or);
        let x = var_arg(&gate);
        let _y = var_arg(&gate);
        let clone = gate.borrow().clone_gate();
        assert_ne!(clone.borrow().index(), gate.borrow().index());
        assert_eq!(clone.borrow().args(), gate.borrow().args());
        assert!(clone.borrow().base().parents().is_empty());
        assert_eq!(x.borrow().base().parents().len(), 2);
    }

    #[test]
    fn test_nullify_detaches_children() {
        let gate = Gate::new(Operator::And);
        let x = var_arg(&gate);
        gate.borrow_mut().nullify();
        assert_eq!(gate.borrow().state(), State::Null);
        assert!(gate.borrow().args().is_empty());
        assert!(x.borrow().base().parents().is_empty());
    }
}
