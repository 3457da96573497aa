//! Distributivity detection and factoring.
//!
//! `(a AND x) OR (a AND y) OR ...` becomes `a AND (x OR y OR ...)`, and
//! dually for AND over OR. Choosing the best grouping of candidates is
//! combinatorial; the greedy strategy here chains options in a
//! subset-to-superset order over their common-parent sets and factors the
//! longest chain first. The grouping deliberately does not branch on a
//! shared base option, so some opportunities are left on the table.

use std::collections::BTreeMap;

use log::trace;

use crate::gate::{Gate, Operator, State};
use crate::node::GateRef;

use super::merge::{is_subset, sorted_difference, CommonArgs, CommonParents};
use super::Preprocessor;

/// Options chained for one factoring: each entry is a common argument set
/// with the gates that share it, ordered subset first.
type MergeGroup = Vec<(CommonArgs, CommonParents)>;

impl Preprocessor<'_> {
    /// Walks the graph and factors distributive argument groups.
    /// May register constant and NULL gates for the caller to drain.
    pub(super) fn detect_distributivity(&mut self, gate: &GateRef) -> bool {
        if gate.borrow().mark() {
            return false;
        }
        gate.borrow_mut().set_mark(true);
        debug_assert_eq!(gate.borrow().state(), State::Normal);
        let distr_type = match gate.borrow().operator() {
            Operator::And | Operator::Nand => Some(Operator::Or),
            Operator::Or | Operator::Nor => Some(Operator::And),
            _ => None,
        };
        let mut changed = false;
        let mut candidates: Vec<GateRef> = Vec::new();
        let children: Vec<(i32, GateRef)> = gate
            .borrow()
            .gate_args()
            .iter()
            .map(|(&arg, child)| (arg, child.clone()))
            .collect();
        // Collect child gates of the distributivity type.
        for (arg, child) in &children {
            if self.detect_distributivity(child) {
                changed = true;
            }
            let Some(distr_type) = distr_type else {
                continue; // Distributivity is not possible.
            };
            if *arg < 0 {
                continue; // Does not work on negation.
            }
            if child.borrow().state() != State::Normal {
                continue; // No arguments.
            }
            if child.borrow().is_module() {
                continue; // Can't have common arguments.
            }
            if child.borrow().operator() == distr_type {
                candidates.push(child.clone());
            }
        }
        if let Some(distr_type) = distr_type {
            if self.handle_distributive_args(gate, distr_type, &candidates) {
                changed = true;
            }
        }
        changed
    }

    fn handle_distributive_args(
        &mut self,
        gate: &GateRef,
        distr_type: Operator,
        candidates: &[GateRef],
    ) -> bool {
        if candidates.len() < 2 {
            return false;
        }
        // The optimal combination is combinatorial; the problem mirrors
        // merging common arguments of gates.
        let group: Vec<(GateRef, Vec<i32>)> = candidates
            .iter()
            .map(|candidate| {
                let args = candidate.borrow().args().iter().copied().collect();
                (candidate.clone(), args)
            })
            .collect();
        trace!("Considering {} distributivity candidates", group.len());
        let options = Self::group_common_parents(1, &group);
        if options.is_empty() {
            return false;
        }
        trace!("Got {} distributive option(s)", options.len());

        let mut table = Self::group_distributive_args(options);
        debug_assert!(!table.is_empty());
        trace!("Found {} distributive group(s)", table.len());
        // Only single-parent gates can be moved below a new sub-parent;
        // clone the shared members of each base option first.
        for merge_group in &mut table {
            let base_option = &merge_group[0];
            let mut to_swap: Vec<(GateRef, GateRef)> = Vec::new();
            for member in base_option.1.values() {
                debug_assert!(!member.borrow().base().parents().is_empty());
                if member.borrow().base().parents().len() > 1 {
                    let clone = member.borrow().clone_gate();
                    clone.borrow_mut().set_mark(true);
                    to_swap.push((member.clone(), clone));
                }
            }
            for (member, clone) in &to_swap {
                let member_index = member.borrow().index();
                let clone_index = clone.borrow().index();
                gate.borrow_mut().erase_arg(member_index);
                gate.borrow_mut().add_gate_arg(clone_index, clone);
                for option in merge_group.iter_mut() {
                    if option.1.remove(&member_index).is_some() {
                        option.1.insert(clone_index, clone.clone());
                    }
                }
            }
        }

        for merge_group in &mut table {
            self.transform_distributive_args(gate, distr_type, merge_group);
        }
        debug_assert!(!gate.borrow().args().is_empty());
        true
    }

    /// Greedily isolates chains of options in subset-to-superset
    /// relationship (arguments growing, parents shrinking).
    fn group_distributive_args(options: BTreeMap<CommonArgs, CommonParents>) -> Vec<MergeGroup> {
        debug_assert!(!options.is_empty());
        let mut all_options: Vec<(CommonArgs, CommonParents)> = options.into_iter().collect();
        // Ascending size of common arguments.
        all_options.sort_by_key(|option| option.0.len());

        let mut groups: Vec<MergeGroup> = Vec::new();
        while !all_options.is_empty() {
            let mut best_group: Vec<usize> = Vec::new();
            for i in 0..all_options.len() {
                let mut chain = vec![i];
                for j in (i + 1)..all_options.len() {
                    let back = &all_options[*chain.last().expect("chain is non-empty")];
                    let candidate = &all_options[j];
                    if !is_subset(&back.0, &candidate.0) {
                        continue; // Does not include all the arguments.
                    }
                    let parents_match = candidate.1.keys().all(|k| back.1.contains_key(k));
                    if !parents_match {
                        continue;
                    }
                    chain.push(j);
                }
                if chain.len() > best_group.len() {
                    // The more members, the merrier.
                    best_group = chain;
                } else if chain.len() == best_group.len()
                    && all_options[chain[0]].1.len() < all_options[best_group[0]].1.len()
                {
                    // The fewer parents, the more room for others.
                    best_group = chain;
                }
            }
            let mut merge_group: MergeGroup = Vec::new();
            for &i in &best_group {
                merge_group.push((all_options[i].0.clone(), all_options[i].1.clone()));
                all_options[i].1.clear(); // Take the best group out of play.
            }
            let base_parents: Vec<i32> = merge_group[0].1.keys().copied().collect();
            groups.push(merge_group);

            for option in all_options.iter_mut() {
                for key in &base_parents {
                    option.1.remove(key);
                }
            }
            all_options.retain(|option| option.1.len() > 1);
        }
        groups
    }

    /// Materializes one factoring: a new parent of the distributive type
    /// holding the common part, a new sub-parent of the dual type holding
    /// the residues, recursively for the chained supersets.
    fn transform_distributive_args(
        &mut self,
        gate: &GateRef,
        distr_type: Operator,
        group: &mut MergeGroup,
    ) {
        if group.is_empty() {
            return;
        }
        let (args, gates) = group.remove(0);

        let new_parent = if gate.borrow().args().len() == gates.len() {
            // Reuse the gate to avoid extra merging operations.
            let operator = gate.borrow().operator();
            match operator {
                Operator::And | Operator::Or => gate.borrow_mut().set_operator(distr_type),
                Operator::Nand => gate.borrow_mut().set_operator(Operator::Nor),
                Operator::Nor => gate.borrow_mut().set_operator(Operator::Nand),
                _ => {}
            }
            gate.clone()
        } else {
            let new_parent = Gate::new(distr_type);
            new_parent.borrow_mut().set_mark(true);
            let new_index = new_parent.borrow().index();
            gate.borrow_mut().add_gate_arg(new_index, &new_parent);
            new_parent
        };

        let sub_parent = Gate::new(if distr_type == Operator::And {
            Operator::Or
        } else {
            Operator::And
        });
        sub_parent.borrow_mut().set_mark(true);
        let sub_index = sub_parent.borrow().index();
        new_parent.borrow_mut().add_gate_arg(sub_index, &sub_parent);

        // The common part of the distributive equation, shared from a
        // representative of the common parents.
        let representative = gates
            .values()
            .next()
            .cloned()
            .expect("distributive group has parents");
        for &index in &args {
            // May be negative.
            representative.borrow().share_arg(index, &new_parent);
        }

        // The residues of the sub-equations.
        for member in gates.values() {
            debug_assert_eq!(member.borrow().base().parents().len(), 1);
            let member_index = member.borrow().index();
            gate.borrow_mut().erase_arg(member_index);

            sub_parent.borrow_mut().add_gate_arg(member_index, member);
            for &index in &args {
                member.borrow_mut().erase_arg(index);
            }
            let remaining = member.borrow().args().len();
            if remaining == 1 {
                member.borrow_mut().set_operator(Operator::Null);
                self.null_gates.push(std::rc::Rc::downgrade(member));
            } else if remaining == 0 {
                if member.borrow().operator() == Operator::And {
                    member.borrow_mut().make_unity();
                } else {
                    debug_assert_eq!(member.borrow().operator(), Operator::Or);
                    member.borrow_mut().nullify();
                }
                self.const_gates.push(std::rc::Rc::downgrade(member));
            }
        }
        // The chained supersets lose the factored arguments.
        for (super_args, _) in group.iter_mut() {
            *super_args = sorted_difference(super_args, &args);
        }
        self.transform_distributive_args(&sub_parent, distr_type, group);
    }
}
