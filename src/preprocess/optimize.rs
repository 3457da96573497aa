//! Boolean optimization through failure propagation.
//!
//! For every node shared by multiple parents, assume the node fails and
//! propagate the failure upward through each operator's failure criterion.
//! Parents whose failure is absorbed by a higher "destination" gate are
//! redundant: there the node behaves like constant False. Destinations
//! gain the node as a direct argument (OR) or get an OR wrapper (AND and
//! vote gates, whose vote number is deliberately left untouched).
//!
//! Works on coherent graphs only; all edges are positive.

use std::collections::BTreeMap;
use std::rc::Rc;

use log::trace;

use crate::gate::{Gate, Operator, State};
use crate::node::{GateRef, NodeRef, WeakGate};

use super::Preprocessor;

impl Preprocessor<'_> {
    pub(super) fn boolean_optimization(&mut self) {
        debug_assert!(self.const_gates.is_empty());
        debug_assert!(self.null_gates.is_empty());
        self.graph.clear_node_visits();
        self.graph.clear_gate_marks();

        let (common_gates, common_variables) = self.gather_common_nodes();

        for weak in &common_gates {
            if let Some(gate) = weak.upgrade() {
                self.process_common_node(NodeRef::Gate(gate));
            }
        }
        for weak in &common_variables {
            if let Some(var) = weak.upgrade() {
                self.process_common_node(NodeRef::Variable(var));
            }
        }
    }

    /// Runs one failure-propagation round for a single shared node.
    fn process_common_node(&mut self, node: NodeRef) {
        debug_assert!(self.const_gates.is_empty());
        debug_assert!(self.null_gates.is_empty());

        if node.parent_count() == 1 {
            return; // The other parents are deleted.
        }

        let root = self.graph.root();
        self.graph.clear_opti_values();

        debug_assert_eq!(node.with_base(|base| base.opti_value()), 0);
        node.with_base_mut(|base| base.set_opti_value(1));
        let mut mult_tot = node.parent_count() as i32; // Total multiplicity.
        debug_assert!(mult_tot > 1);
        mult_tot += self.propagate_failure(&node);

        // The results of the failure propagation.
        let mut destinations: BTreeMap<i32, WeakGate> = BTreeMap::new();
        let num_dest = if root.borrow().base().opti_value() == 1 {
            // The root gate itself failed.
            destinations.insert(root.borrow().index(), Rc::downgrade(&root));
            1
        } else {
            debug_assert_eq!(root.borrow().base().opti_value(), 0);
            Self::collect_failure_destinations(&root, node.index(), &mut destinations)
        };

        if num_dest == 0 {
            return; // No failure destination detected.
        }
        debug_assert!(!destinations.is_empty());
        if num_dest < mult_tot {
            // Redundancy detection.
            trace!("Optimizing failure of node {}", node.index());
            self.process_redundant_parents(&node, &mut destinations);
            self.process_failure_destinations(&node, &destinations);
            self.clear_const_gates();
            self.clear_null_gates();
        }
    }

    /// Notifies parents of a failed node and recurses into parents that
    /// fail in turn. Returns the accumulated multiplicity of shared failed
    /// gates.
    fn propagate_failure(&mut self, node: &NodeRef) -> i32 {
        debug_assert_eq!(node.with_base(|base| base.opti_value()), 1);
        let mut mult_tot = 0;
        let parents: Vec<GateRef> = node.with_base(|base| {
            base.parents().values().filter_map(|weak| weak.upgrade()).collect()
        });
        for parent in parents {
            if parent.borrow().base().opti_value() == 1 {
                continue;
            }
            parent.borrow_mut().arg_failed(); // Send a notification.
            if parent.borrow().base().opti_value() == 1 {
                // The parent failed.
                let mult = parent.borrow().base().parents().len() as i32;
                if mult > 1 {
                    mult_tot += mult;
                }
                mult_tot += self.propagate_failure(&NodeRef::Gate(parent));
            }
        }
        mult_tot
    }

    /// Descends from the root through non-failed gates and collects failed
    /// gates other than the origin node: the failure destinations.
    /// Gates are tagged 3 when they hold the origin directly, 2 otherwise.
    fn collect_failure_destinations(
        gate: &GateRef,
        index: i32,
        destinations: &mut BTreeMap<i32, WeakGate>,
    ) -> i32 {
        debug_assert_eq!(gate.borrow().base().opti_value(), 0);
        {
            let mut g = gate.borrow_mut();
            let value = if g.args().contains(&index) { 3 } else { 2 };
            g.base_mut().set_opti_value(value);
        }
        let mut num_dest = 0;
        let children: Vec<GateRef> = gate.borrow().gate_args().values().cloned().collect();
        for child in &children {
            let opti_value = child.borrow().base().opti_value();
            if opti_value == 0 {
                num_dest += Self::collect_failure_destinations(child, index, destinations);
            } else if opti_value == 1 && child.borrow().index() != index {
                num_dest += 1;
                destinations.insert(child.borrow().index(), Rc::downgrade(child));
            } // Gates tagged 2 or 3 are already processed.
        }
        num_dest
    }

    /// Treats the node as constant False in parents whose failure is
    /// absorbed by a destination. An OR destination that is itself a
    /// parent keeps the node and leaves the redundancy list.
    fn process_redundant_parents(
        &mut self,
        node: &NodeRef,
        destinations: &mut BTreeMap<i32, WeakGate>,
    ) {
        let mut redundant_parents: Vec<WeakGate> = Vec::new();
        let parents: Vec<GateRef> = node.with_base(|base| {
            base.parents().values().filter_map(|weak| weak.upgrade()).collect()
        });
        for parent in parents {
            if parent.borrow().base().opti_value() < 3 {
                if parent.borrow().operator() == Operator::Or
                    && destinations.remove(&parent.borrow().index()).is_some()
                {
                    continue; // The destination itself covers this parent.
                }
                redundant_parents.push(Rc::downgrade(&parent));
            }
        }
        // The node behaves like constant False for redundant parents.
        for weak in &redundant_parents {
            let Some(parent) = weak.upgrade() else {
                continue;
            };
            self.process_constant_arg(&parent, node.index(), false);
            self.register_rewritten(&parent);
        }
    }

    /// Injects the node into its failure destinations: OR gates take it as
    /// a direct argument; AND and vote gates are wrapped in a fresh OR of
    /// the gate and the node.
    fn process_failure_destinations(&mut self, node: &NodeRef, destinations: &BTreeMap<i32, WeakGate>) {
        for weak in destinations.values() {
            let Some(target) = weak.upgrade() else {
                continue; // Removed by constant propagation.
            };
            debug_assert_ne!(target.borrow().operator(), Operator::Null);
            let operator = target.borrow().operator();
            match operator {
                Operator::Or => {
                    target.borrow_mut().add_arg(node.index(), node);
                }
                Operator::And | Operator::Atleast => {
                    let new_gate = Gate::new(Operator::Or);
                    let root = self.graph.root();
                    if Rc::ptr_eq(&target, &root) {
                        self.graph.replace_root(new_gate.clone());
                    } else {
                        self.replace_gate(&target, &new_gate);
                    }
                    let target_index = target.borrow().index();
                    new_gate.borrow_mut().add_gate_arg(target_index, &target);
                    new_gate.borrow_mut().add_arg(node.index(), node);
                }
                _ => debug_assert!(false, "unexpected destination operator"),
            }
            debug_assert_eq!(target.borrow().state(), State::Normal);
        }
    }
}
