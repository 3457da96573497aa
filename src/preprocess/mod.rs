//! The Boolean graph preprocessor.
//!
//! Preprocessing rewrites a freshly constructed fault-tree graph into a
//! semantically equivalent but simpler and more uniform graph for the
//! downstream cut-set algorithms. The work is staged into five phases:
//!
//! 1. **Phase I**: constant elimination, partial operator normalization,
//!    NULL-gate removal.
//! 2. **Phase II**: structural dedup, module detection, common-argument
//!    merging, Boolean optimization (coherent graphs), common-node
//!    decomposition, distributivity, gate coalescing.
//! 3. **Phase III** (non-normal graphs): full normalization (XOR and vote
//!    gates expanded), then Phase II again.
//! 4. **Phase IV** (non-coherent graphs): complement propagation, then
//!    Phase II again.
//! 5. **Phase V**: layered coalescing around one more Phase II.
//!
//! Every algorithm here assumes a valid, well-formed graph and leaves a
//! valid, well-formed, semantically equivalent graph behind. Gates that
//! collapse into constants or into single-argument pass-throughs are not
//! removed on the spot; they go onto the `const_gates`/`null_gates`
//! worklists and are drained between steps, which lets rewrites cascade
//! without mutating sibling lists mid-iteration. Worklist entries are weak
//! and may expire when an unrelated rewrite drops the gate first.
//!
//! The traversal scratchpads (gate marks, visit times, occurrence counts,
//! optimization values) are owned by whichever algorithm is running; each
//! clears what it reads on entry and leaves the fields undefined on exit.

mod decompose;
mod distrib;
mod merge;
mod modules;
mod normalize;
mod optimize;

use std::rc::Rc;

use log::debug;

use crate::gate::{Gate, Operator, State};
use crate::graph::BooleanGraph;
use crate::node::{ConstantRef, GateRef, WeakGate};

/// Preprocesses a fault-tree graph in place.
///
/// On return the graph is normal: the root is a lone variable behind a NULL
/// gate, a constant-state gate, or an AND/OR-rooted DAG free of constants,
/// NULL gates, and negative operators.
///
/// The root must have no parents and no gate marks may be set.
pub fn process_fault_tree(graph: &mut BooleanGraph) {
    Preprocessor::new(graph).process();
}

/// The preprocessing engine: phase driver, worklists, and the root sign.
///
/// `root_sign` absorbs the negation of the root formula (from NOT/NAND/NOR
/// roots) so the graph itself stays positive until the sign is resolved at
/// the end or pushed back in during complement propagation.
pub struct Preprocessor<'a> {
    graph: &'a mut BooleanGraph,
    root_sign: i32,
    const_gates: Vec<WeakGate>,
    null_gates: Vec<WeakGate>,
}

impl<'a> Preprocessor<'a> {
    pub fn new(graph: &'a mut BooleanGraph) -> Self {
        Self {
            graph,
            root_sign: 1,
            const_gates: Vec::new(),
            null_gates: Vec::new(),
        }
    }

    /// Runs all phases. See [`process_fault_tree`].
    pub fn process(mut self) {
        {
            let root = self.graph.root();
            debug_assert!(root.borrow().base().parents().is_empty());
            debug_assert!(!root.borrow().mark());
        }
        self.run();
        debug_assert!(self.const_gates.iter().all(|g| g.upgrade().is_none()));
        debug_assert!(self.null_gates.iter().all(|g| g.upgrade().is_none()));
        // Whatever survives preprocessing is in the normal operator set.
        self.graph.set_normal(true);
    }

    fn run(&mut self) {
        debug!("Preprocessing Phase I...");
        self.phase_one();
        if self.check_root_gate() {
            return;
        }

        debug!("Preprocessing Phase II...");
        self.phase_two();
        if self.check_root_gate() {
            return;
        }

        if !self.graph.normal() {
            debug!("Preprocessing Phase III...");
            self.phase_three();
            self.graph.set_normal(true);
            if self.check_root_gate() {
                return;
            }
        }

        if !self.graph.coherent() {
            debug!("Preprocessing Phase IV...");
            self.phase_four();
            if self.check_root_gate() {
                return;
            }
        }

        debug!("Preprocessing Phase V...");
        self.phase_five();

        self.check_root_gate(); // Cleanup of a trailing NULL or constant root.
    }

    fn phase_one(&mut self) {
        if !self.graph.constants.is_empty() {
            debug!("Removing constants...");
            self.remove_constants();
        }
        if !self.graph.const_gates.is_empty() {
            debug!("Removing constant gates...");
            debug_assert!(self.const_gates.is_empty());
            self.const_gates = std::mem::take(&mut self.graph.const_gates);
            self.clear_const_gates();
        }
        if !self.graph.coherent() {
            debug!("Partial normalization of gates...");
            self.normalize_gates(false);
        }
        if !self.graph.null_gates.is_empty() {
            debug!("Removing NULL gates...");
            self.remove_null_gates();
        }
    }

    fn phase_two(&mut self) {
        debug!("Detecting multiple definitions...");
        while self.process_multiple_definitions() {}

        if self.check_root_gate() {
            return;
        }

        debug!("Detecting modules...");
        self.detect_modules();

        debug!("Merging common arguments...");
        self.merge_common_args();

        if self.graph.coherent() {
            debug!("Boolean optimization...");
            self.boolean_optimization();
        }

        if self.check_root_gate() {
            return;
        }

        debug!("Decomposition of common nodes...");
        self.decompose_common_nodes();

        if self.check_root_gate() {
            return;
        }

        debug!("Processing distributivity...");
        self.graph.clear_gate_marks();
        let root = self.graph.root();
        self.detect_distributivity(&root);
        self.clear_const_gates();
        self.clear_null_gates();

        debug!("Coalescing gates...");
        self.coalesce_gates(false);

        if self.check_root_gate() {
            return;
        }

        debug!("Detecting modules...");
        self.detect_modules();
    }

    fn phase_three(&mut self) {
        debug_assert!(!self.graph.normal());
        debug!("Full normalization of gates...");
        self.normalize_gates(true);

        if self.check_root_gate() {
            return;
        }
        self.phase_two();
    }

    fn phase_four(&mut self) {
        debug_assert!(!self.graph.coherent());
        debug!("Propagating complements...");
        if self.root_sign < 0 {
            let root = self.graph.root();
            let operator = root.borrow().operator();
            debug_assert!(matches!(
                operator,
                Operator::Or | Operator::And | Operator::Null
            ));
            match operator {
                Operator::Or => root.borrow_mut().set_operator(Operator::And),
                Operator::And => root.borrow_mut().set_operator(Operator::Or),
                _ => {}
            }
            root.borrow_mut().invert_args();
            self.root_sign = 1;
        }
        self.graph.clear_gate_marks();
        let root = self.graph.root();
        let mut complements = std::collections::HashMap::new();
        self.propagate_complements(&root, &mut complements);

        if self.check_root_gate() {
            return;
        }
        self.phase_two();
    }

    fn phase_five(&mut self) {
        debug!("Coalescing gates...");
        self.coalesce_gates(true);

        if self.check_root_gate() {
            return;
        }
        self.phase_two();
        if self.check_root_gate() {
            return;
        }

        // A second layered pass; occasionally the intervening Phase II
        // opens new joins.
        debug!("Coalescing gates...");
        self.coalesce_gates(true);
    }

    /// Inspects the root after a phase. Returns true when preprocessing is
    /// finished: the root has become a constant, or it is a NULL gate over
    /// a single variable. A NULL root over a gate is unwrapped with its
    /// sign folded into `root_sign`.
    fn check_root_gate(&mut self) -> bool {
        let root = self.graph.root();
        let state = root.borrow().state();
        if state != State::Normal {
            // The root gate has become constant.
            if self.root_sign < 0 {
                let new_root = Gate::new(Operator::Null);
                match state {
                    State::Null => new_root.borrow_mut().make_unity(),
                    State::Unity => new_root.borrow_mut().nullify(),
                    State::Normal => unreachable!(),
                }
                self.graph.replace_root(new_root);
                self.root_sign = 1;
            }
            return true;
        }
        if root.borrow().operator() == Operator::Null {
            // Special case: a pass-through root.
            debug_assert_eq!(root.borrow().args().len(), 1);
            let gate_child: Option<(i32, GateRef)> = root
                .borrow()
                .gate_args()
                .iter()
                .next()
                .map(|(&arg, gate)| (arg, gate.clone()));
            if let Some((arg, child)) = gate_child {
                self.graph.replace_root(child.clone()); // Drops the old root.
                debug_assert!(child.borrow().base().parents().is_empty());
                if arg < 0 {
                    self.root_sign = -self.root_sign;
                }
            } else {
                debug_assert_eq!(root.borrow().variable_args().len(), 1);
                if self.root_sign < 0 {
                    root.borrow_mut().invert_args();
                }
                self.root_sign = 1;
                return true; // Only one variable argument remains.
            }
        }
        false
    }
}

// Constant and NULL-gate propagation.
impl Preprocessor<'_> {
    /// Eliminates all constant leaves registered during construction.
    fn remove_constants(&mut self) {
        debug_assert!(self.const_gates.is_empty());
        let constants = std::mem::take(&mut self.graph.constants);
        for weak in &constants {
            if let Some(constant) = weak.upgrade() {
                self.propagate_constant(&constant);
                debug_assert_eq!(Rc::strong_count(&constant), 1);
            }
        }
        debug_assert!(self.const_gates.is_empty());
    }

    /// Eliminates the NULL gates registered during construction.
    fn remove_null_gates(&mut self) {
        debug_assert!(self.null_gates.is_empty());
        debug_assert!(!self.graph.null_gates.is_empty());
        self.null_gates = std::mem::take(&mut self.graph.null_gates);

        let root = self.graph.root();
        if self.null_gates.len() == 1
            && self
                .null_gates
                .first()
                .and_then(|weak| weak.upgrade())
                .is_some_and(|gate| Rc::ptr_eq(&gate, &root))
        {
            // A single NULL gate as the root is the root-check's business.
            self.null_gates.clear();
            return;
        }

        self.clear_null_gates();
        debug_assert!(self.null_gates.is_empty());
    }

    /// Propagates one constant leaf out of all its parents.
    fn propagate_constant(&mut self, constant: &ConstantRef) {
        loop {
            let (index, value, parent) = {
                let c = constant.borrow();
                let parent = c.base().parents().values().next().and_then(|w| w.upgrade());
                (c.index(), c.value(), parent)
            };
            let Some(parent) = parent else {
                break;
            };
            let sign = if parent.borrow().args().contains(&index) { 1 } else { -1 };
            self.process_constant_arg(&parent, sign * index, value);

            if parent.borrow().state() != State::Normal {
                self.propagate_const_gate(&parent);
            } else if parent.borrow().operator() == Operator::Null {
                self.propagate_null_gate(&parent);
            }
        }
    }

    /// Rewrites a parent of a constant argument according to the argument's
    /// effective truth value (edge sign folded in).
    fn process_constant_arg(&mut self, gate: &GateRef, arg: i32, state: bool) {
        let state = if arg < 0 { !state } else { state };
        if state {
            self.process_true_arg(gate, arg);
        } else {
            self.process_false_arg(gate, arg);
        }
    }

    fn process_true_arg(&mut self, gate: &GateRef, arg: i32) {
        let operator = gate.borrow().operator();
        match operator {
            Operator::Null | Operator::Or => gate.borrow_mut().make_unity(),
            Operator::Nand | Operator::And => self.remove_constant_arg(gate, arg),
            Operator::Nor | Operator::Not => gate.borrow_mut().nullify(),
            Operator::Xor => {
                // Becomes the negation of the other argument.
                debug_assert_eq!(gate.borrow().args().len(), 2);
                let mut g = gate.borrow_mut();
                g.erase_arg(arg);
                debug_assert_eq!(g.args().len(), 1);
                g.set_operator(Operator::Not);
            }
            Operator::Atleast => {
                // K/N becomes (K-1)/(N-1).
                debug_assert!(gate.borrow().args().len() > 2);
                let mut g = gate.borrow_mut();
                g.erase_arg(arg);
                let k = g.vote_number() - 1;
                g.set_vote_number(k);
                if k == 1 {
                    g.set_operator(Operator::Or);
                }
            }
        }
    }

    fn process_false_arg(&mut self, gate: &GateRef, arg: i32) {
        let operator = gate.borrow().operator();
        match operator {
            Operator::Nor | Operator::Xor | Operator::Or => self.remove_constant_arg(gate, arg),
            Operator::Null | Operator::And => gate.borrow_mut().nullify(),
            Operator::Nand | Operator::Not => gate.borrow_mut().make_unity(),
            Operator::Atleast => {
                // K/N becomes K/(N-1).
                debug_assert!(gate.borrow().args().len() > 2);
                let mut g = gate.borrow_mut();
                g.erase_arg(arg);
                if g.vote_number() == g.args().len() as i32 {
                    g.set_operator(Operator::And);
                }
            }
        }
    }

    /// Erases a neutral constant argument; a gate shrunk to one argument
    /// retypes into its single-argument form.
    fn remove_constant_arg(&mut self, gate: &GateRef, arg: i32) {
        let mut g = gate.borrow_mut();
        debug_assert!(g.args().len() > 1, "one-argument gates must have become constant");
        g.erase_arg(arg);
        if g.args().len() == 1 {
            match g.operator() {
                Operator::Xor | Operator::Or | Operator::And => g.set_operator(Operator::Null),
                Operator::Nor | Operator::Nand => g.set_operator(Operator::Not),
                _ => debug_assert!(false, "unexpected one-argument gate"),
            }
        } // Vote gates are adjusted by the callers.
    }

    /// Propagates a constant-state gate out of all its parents.
    fn propagate_const_gate(&mut self, gate: &GateRef) {
        debug_assert_ne!(gate.borrow().state(), State::Normal);

        loop {
            let (index, state, parent) = {
                let g = gate.borrow();
                let parent = g.base().parents().values().next().and_then(|w| w.upgrade());
                (g.index(), g.state(), parent)
            };
            let Some(parent) = parent else {
                break;
            };
            let sign = if parent.borrow().args().contains(&index) { 1 } else { -1 };
            let value = state == State::Unity;
            self.process_constant_arg(&parent, sign * index, value);

            if parent.borrow().state() != State::Normal {
                self.propagate_const_gate(&parent);
            } else if parent.borrow().operator() == Operator::Null {
                self.propagate_null_gate(&parent);
            }
        }
    }

    /// Inlines a NULL (pass-through) gate into all its parents.
    fn propagate_null_gate(&mut self, gate: &GateRef) {
        debug_assert_eq!(gate.borrow().operator(), Operator::Null);

        loop {
            let (index, parent) = {
                let g = gate.borrow();
                let parent = g.base().parents().values().next().and_then(|w| w.upgrade());
                (g.index(), parent)
            };
            let Some(parent) = parent else {
                break;
            };
            let sign = if parent.borrow().args().contains(&index) { 1 } else { -1 };
            parent.borrow_mut().join_null_gate(sign * index);

            if parent.borrow().state() != State::Normal {
                self.propagate_const_gate(&parent);
            } else if parent.borrow().operator() == Operator::Null {
                self.propagate_null_gate(&parent);
            }
        }
    }

    /// Drains the constant-gate worklist, skipping expired entries.
    fn clear_const_gates(&mut self) {
        self.graph.clear_gate_marks(); // New gates may appear without marks.
        let worklist = std::mem::take(&mut self.const_gates);
        for weak in &worklist {
            if let Some(gate) = weak.upgrade() {
                self.propagate_const_gate(&gate);
            }
        }
    }

    /// Drains the NULL-gate worklist, skipping expired entries.
    fn clear_null_gates(&mut self) {
        self.graph.clear_gate_marks(); // New gates may appear without marks.
        let worklist = std::mem::take(&mut self.null_gates);
        for weak in &worklist {
            if let Some(gate) = weak.upgrade() {
                self.propagate_null_gate(&gate);
            }
        }
    }

    /// Rewires every parent of `gate` onto `replacement`, preserving edge
    /// polarity, and registers any degenerated parents on the worklists.
    fn replace_gate(&mut self, gate: &GateRef, replacement: &GateRef) {
        debug_assert!(!gate.borrow().base().parents().is_empty());
        loop {
            let (index, parent) = {
                let g = gate.borrow();
                let parent = g.base().parents().values().next().and_then(|w| w.upgrade());
                (g.index(), parent)
            };
            let Some(parent) = parent else {
                break;
            };
            let sign = if parent.borrow().args().contains(&(-index)) { -1 } else { 1 };
            let replacement_index = replacement.borrow().index();
            {
                let mut p = parent.borrow_mut();
                p.erase_arg(sign * index);
                p.add_gate_arg(sign * replacement_index, replacement);
            }

            self.register_rewritten(&parent);
        }
    }

    /// Registers a gate on the constant or NULL worklist if a rewrite left
    /// it degenerate.
    fn register_rewritten(&mut self, gate: &GateRef) {
        let (state, operator) = {
            let g = gate.borrow();
            (g.state(), g.operator())
        };
        if state != State::Normal {
            self.const_gates.push(Rc::downgrade(gate));
        } else if operator == Operator::Null {
            self.null_gates.push(Rc::downgrade(gate));
        }
    }

    /// Collects the gates and variables reachable from the root that have
    /// more than one parent. Breadth-first; depends on cleared node visits.
    fn gather_common_nodes(&mut self) -> (Vec<WeakGate>, Vec<crate::node::WeakVariable>) {
        let mut common_gates = Vec::new();
        let mut common_variables = Vec::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(self.graph.root());
        while let Some(gate) = queue.pop_front() {
            let children: Vec<GateRef> = gate.borrow().gate_args().values().cloned().collect();
            for child in children {
                if child.borrow().base().visited() {
                    continue;
                }
                child.borrow_mut().base_mut().visit(1);
                if child.borrow().base().parents().len() > 1 {
                    common_gates.push(Rc::downgrade(&child));
                }
                queue.push_back(child);
            }
            let variables: Vec<crate::node::VariableRef> =
                gate.borrow().variable_args().values().cloned().collect();
            for var in variables {
                if var.borrow().base().visited() {
                    continue;
                }
                var.borrow_mut().base_mut().visit(1);
                if var.borrow().base().parents().len() > 1 {
                    common_variables.push(Rc::downgrade(&var));
                }
            }
        }
        (common_gates, common_variables)
    }
}
