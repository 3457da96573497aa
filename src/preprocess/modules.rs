//! Module detection.
//!
//! A module is a gate whose subgraph shares no node with the rest of the
//! graph; it can be analyzed independently and later rewrites must not
//! reach across it. Detection assigns DFS enter/exit times to every node
//! and marks a gate a module exactly when all descendant visit intervals
//! nest inside its own. Arguments that are modular together but not alone
//! are then grouped into fresh module gates.

use log::trace;

use crate::gate::{Gate, Operator};
use crate::node::{GateRef, NodeRef};

use super::Preprocessor;

/// Overlap of two closed visit-time ranges.
fn detect_overlap(a_min: i32, a_max: i32, b_min: i32, b_max: i32) -> bool {
    debug_assert!(a_min < a_max);
    debug_assert!(b_min < b_max);
    a_min.max(b_min) <= a_max.min(b_max)
}

impl Preprocessor<'_> {
    /// Assigns visit times and (re-)marks the modules of the graph.
    pub(super) fn detect_modules(&mut self) {
        debug_assert!(self.const_gates.is_empty());
        debug_assert!(self.null_gates.is_empty());
        self.graph.clear_node_visits();

        let root = self.graph.root();
        Self::assign_timing(0, &root);

        self.graph.clear_gate_marks();
        self.find_modules(&root);

        debug_assert!(!root.borrow().base().revisited());
        debug_assert_eq!(root.borrow().base().min_time(), 1);
        debug_assert_eq!(
            root.borrow().base().max_time(),
            root.borrow().base().exit_time()
        );
    }

    /// Depth-first timing: a gate is entered once and exited once;
    /// a variable leaf enters and exits at the same tick.
    fn assign_timing(mut time: i32, gate: &GateRef) -> i32 {
        time += 1;
        if gate.borrow_mut().base_mut().visit(time) {
            return time; // Revisited gate.
        }
        debug_assert!(gate.borrow().constant_args().is_empty());

        let children: Vec<GateRef> = gate.borrow().gate_args().values().cloned().collect();
        for child in &children {
            time = Self::assign_timing(time, child);
        }

        let variables: Vec<crate::node::VariableRef> =
            gate.borrow().variable_args().values().cloned().collect();
        for var in &variables {
            time += 1;
            var.borrow_mut().base_mut().visit(time); // Enter the leaf.
            var.borrow_mut().base_mut().visit(time); // Exit at the same time.
        }

        time += 1;
        let re_visited = gate.borrow_mut().base_mut().visit(time); // Exit the gate.
        debug_assert!(!re_visited); // No cyclic visiting.
        time
    }

    /// Bottom-up module marking by interval nesting, followed by grouping
    /// of modular arguments into new module gates.
    fn find_modules(&mut self, gate: &GateRef) {
        if gate.borrow().mark() {
            return;
        }
        gate.borrow_mut().set_mark(true);
        let enter_time = gate.borrow().base().enter_time();
        let exit_time = gate.borrow().base().exit_time();
        let mut min_time = enter_time;
        let mut max_time = exit_time;

        let mut non_shared_args: Vec<(i32, NodeRef)> = Vec::new();
        let mut modular_args: Vec<(i32, NodeRef)> = Vec::new();
        let mut non_modular_args: Vec<(i32, NodeRef)> = Vec::new();

        let children: Vec<(i32, GateRef)> = gate
            .borrow()
            .gate_args()
            .iter()
            .map(|(&arg, child)| (arg, child.clone()))
            .collect();
        for (arg, child) in &children {
            self.find_modules(child);
            if child.borrow().is_module() && !child.borrow().base().revisited() {
                debug_assert_eq!(child.borrow().base().parents().len(), 1);
                debug_assert!(child.borrow().base().parents().contains_key(&gate.borrow().index()));

                // The child's visits nest inside this gate's interval.
                non_shared_args.push((*arg, NodeRef::Gate(child.clone())));
                continue;
            }
            let min = child.borrow().base().min_time();
            let max = child.borrow().base().max_time();
            debug_assert!(min > 0);
            debug_assert!(max > min);
            if min > enter_time && max < exit_time {
                modular_args.push((*arg, NodeRef::Gate(child.clone())));
            } else {
                non_modular_args.push((*arg, NodeRef::Gate(child.clone())));
            }
            min_time = min_time.min(min);
            max_time = max_time.max(max);
        }

        let variables: Vec<(i32, crate::node::VariableRef)> = gate
            .borrow()
            .variable_args()
            .iter()
            .map(|(&arg, var)| (arg, var.clone()))
            .collect();
        for (arg, var) in &variables {
            let min = var.borrow().base().enter_time();
            let max = var.borrow().base().last_visit();
            debug_assert!(min > 0);
            debug_assert!(max > 0);
            if min == max {
                debug_assert!(min > enter_time && max < exit_time);
                debug_assert_eq!(var.borrow().base().parents().len(), 1);

                // The single-parent argument.
                non_shared_args.push((*arg, NodeRef::Variable(var.clone())));
                continue;
            }
            debug_assert!(max > min);
            {
                // Cache the interval for the filtering below.
                let mut v = var.borrow_mut();
                v.base_mut().set_min_time(min);
                v.base_mut().set_max_time(max);
            }
            if min > enter_time && max < exit_time {
                modular_args.push((*arg, NodeRef::Variable(var.clone())));
            } else {
                non_modular_args.push((*arg, NodeRef::Variable(var.clone())));
            }
            min_time = min_time.min(min);
            max_time = max_time.max(max);
        }

        // Determine if this gate is a module itself.
        if !gate.borrow().is_module() && min_time == enter_time && max_time == exit_time {
            trace!("G{} is an original module", gate.borrow().index());
            debug_assert!(non_modular_args.is_empty());
            gate.borrow_mut().turn_module();
        }

        max_time = max_time.max(gate.borrow().base().last_visit());
        gate.borrow_mut().base_mut().set_min_time(min_time);
        gate.borrow_mut().base_mut().set_max_time(max_time);

        self.process_modular_args(gate, &non_shared_args, &mut modular_args, &mut non_modular_args);
    }

    fn process_modular_args(
        &mut self,
        gate: &GateRef,
        non_shared_args: &[(i32, NodeRef)],
        modular_args: &mut Vec<(i32, NodeRef)>,
        non_modular_args: &mut Vec<(i32, NodeRef)>,
    ) {
        debug_assert_eq!(
            gate.borrow().args().len(),
            non_shared_args.len() + modular_args.len() + non_modular_args.len()
        );
        match gate.borrow().operator() {
            Operator::Nor | Operator::Or | Operator::Nand | Operator::And => {}
            _ => return, // Cannot create sub-modules for other types.
        }
        self.create_new_module(gate, non_shared_args);

        Self::filter_modular_args(modular_args, non_modular_args);
        debug_assert_ne!(modular_args.len(), 1); // A lone modular arg is non-shared.
        let groups = Self::group_modular_args(modular_args);
        self.create_new_modules(gate, modular_args, &groups);
    }

    /// Wraps a strict subset of a gate's arguments into a fresh module
    /// gate of the same logic. Empty, singleton, and whole-argument sets
    /// produce nothing.
    fn create_new_module(&mut self, gate: &GateRef, args: &[(i32, NodeRef)]) -> Option<GateRef> {
        if args.len() < 2 {
            return None;
        }
        if args.len() == gate.borrow().args().len() {
            debug_assert!(gate.borrow().is_module());
            return None;
        }
        debug_assert!(args.len() < gate.borrow().args().len());
        let operator = match gate.borrow().operator() {
            Operator::Nand | Operator::And => Operator::And,
            Operator::Nor | Operator::Or => Operator::Or,
            _ => return None,
        };
        let module = Gate::new(operator);
        module.borrow_mut().turn_module();
        module.borrow_mut().set_mark(true);
        for (arg, _) in args {
            gate.borrow_mut().transfer_arg(*arg, &module);
        }
        let module_index = module.borrow().index();
        gate.borrow_mut().add_gate_arg(module_index, &module);
        debug_assert!(gate.borrow().args().len() > 1);
        trace!(
            "G{}: new module G{} with {} arguments",
            gate.borrow().index(),
            module_index,
            args.len()
        );
        Some(module)
    }

    /// Iteratively demotes modular arguments whose visit interval overlaps
    /// a non-modular argument; each demotion can cascade.
    fn filter_modular_args(
        modular_args: &mut Vec<(i32, NodeRef)>,
        non_modular_args: &mut Vec<(i32, NodeRef)>,
    ) {
        if modular_args.is_empty() || non_modular_args.is_empty() {
            return;
        }
        let mut still_modular: Vec<(i32, NodeRef)> = Vec::new();
        let mut new_non_modular: Vec<(i32, NodeRef)> = Vec::new();
        for (arg, node) in modular_args.drain(..) {
            let (min, max) = node.with_base(|base| (base.min_time(), base.max_time()));
            let overlaps = non_modular_args.iter().any(|(_, other)| {
                let (o_min, o_max) = other.with_base(|base| (base.min_time(), base.max_time()));
                detect_overlap(min, max, o_min, o_max)
            });
            if overlaps {
                new_non_modular.push((arg, node));
            } else {
                still_modular.push((arg, node));
            }
        }
        Self::filter_modular_args(&mut still_modular, &mut new_non_modular);
        *modular_args = still_modular;
        non_modular_args.append(&mut new_non_modular);
    }

    /// Groups the surviving modular arguments into maximal
    /// overlap-connected components.
    fn group_modular_args(modular_args: &[(i32, NodeRef)]) -> Vec<Vec<(i32, NodeRef)>> {
        if modular_args.is_empty() {
            return Vec::new();
        }
        debug_assert!(modular_args.len() > 1);
        let mut groups: Vec<Vec<(i32, NodeRef)>> = Vec::new();
        let mut member_list: std::collections::VecDeque<(i32, NodeRef)> =
            modular_args.iter().cloned().collect();
        while let Some(first_member) = member_list.pop_front() {
            let (mut low, mut high) =
                first_member.1.with_base(|base| (base.min_time(), base.max_time()));
            let mut group = vec![first_member];

            let mut prev_size = 0;
            while prev_size < group.len() {
                prev_size = group.len();
                let mut remaining = std::collections::VecDeque::new();
                while let Some(member) = member_list.pop_front() {
                    let (min, max) = member.1.with_base(|base| (base.min_time(), base.max_time()));
                    if detect_overlap(min, max, low, high) {
                        low = low.min(min);
                        high = high.max(max);
                        group.push(member);
                    } else {
                        remaining.push_back(member);
                    }
                }
                member_list = remaining;
            }
            debug_assert!(group.len() > 1);
            groups.push(group);
        }
        trace!("Grouped modular args in {} group(s)", groups.len());
        debug_assert!(!groups.is_empty());
        groups
    }

    /// Turns each non-trivial group into its own module gate under a
    /// common module parent.
    fn create_new_modules(
        &mut self,
        gate: &GateRef,
        modular_args: &[(i32, NodeRef)],
        groups: &[Vec<(i32, NodeRef)>],
    ) {
        if modular_args.is_empty() {
            return;
        }
        debug_assert!(modular_args.len() > 1);
        debug_assert!(!groups.is_empty());
        if modular_args.len() == gate.borrow().args().len() && groups.len() == 1 {
            debug_assert!(gate.borrow().is_module());
            return;
        }
        let main_arg: GateRef = if modular_args.len() == gate.borrow().args().len() {
            debug_assert!(groups.len() > 1);
            debug_assert!(gate.borrow().is_module());
            gate.clone()
        } else {
            match self.create_new_module(gate, modular_args) {
                Some(module) => module,
                None => {
                    debug_assert!(false, "modular arguments must form a module");
                    return;
                }
            }
        };
        for group in groups {
            self.create_new_module(&main_arg, group);
        }
    }
}
