//! Structural dedup of multiply defined gates and merging of common
//! arguments.
//!
//! Two gates are multiple definitions of one another when they have the
//! same operator, the same vote number, and the same signed argument set;
//! one canonical gate replaces the rest. Common-argument merging then
//! factors argument sets shared by two or more same-operator gates into a
//! new child gate, one group at a time, largest argument sets first.

use std::collections::BTreeMap;
use std::rc::Rc;

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use log::trace;

use crate::gate::{Gate, Operator, State};
use crate::node::{GateRef, WeakGate};

use super::Preprocessor;

/// The structural identity of a gate: operator, vote number, and the
/// sorted signed argument indices.
#[derive(Hash, PartialEq, Eq)]
struct GateSignature {
    operator: Operator,
    vote_number: i32,
    args: Vec<i32>,
}

impl GateSignature {
    fn of(gate: &GateRef) -> Self {
        let g = gate.borrow();
        Self {
            operator: g.operator(),
            // Retyped gates may keep a stale vote number; it only
            // distinguishes vote gates.
            vote_number: if g.operator() == Operator::Atleast {
                g.vote_number()
            } else {
                0
            },
            args: g.args().iter().copied().collect(), // Already sorted.
        }
    }
}

/// A sorted argument set common to several gates.
pub(super) type CommonArgs = Vec<i32>;
/// Gates sharing a common argument set, ordered by index.
pub(super) type CommonParents = BTreeMap<i32, GateRef>;

/// Intersection of two sorted index vectors.
pub(super) fn sorted_intersection(a: &[i32], b: &[i32]) -> Vec<i32> {
    let mut result = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                result.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    result
}

/// True if sorted `sub` is a subset of sorted `sup`.
pub(super) fn is_subset(sub: &[i32], sup: &[i32]) -> bool {
    sub.iter().all(|x| sup.binary_search(x).is_ok())
}

/// Elements of sorted `a` not in sorted `b`.
pub(super) fn sorted_difference(a: &[i32], b: &[i32]) -> Vec<i32> {
    a.iter().copied().filter(|x| b.binary_search(x).is_err()).collect()
}

impl Preprocessor<'_> {
    /// Finds structurally identical gates and collapses each equivalence
    /// class onto one canonical representative. Returns true if anything
    /// was rewired; the caller iterates to a fixed point because replacing
    /// gates can make parents identical in turn.
    pub(super) fn process_multiple_definitions(&mut self) -> bool {
        debug_assert!(self.null_gates.is_empty());
        debug_assert!(self.const_gates.is_empty());

        self.graph.clear_gate_marks();
        // The canonical gate and its duplicate definitions.
        let mut multi_def: BTreeMap<i32, (GateRef, Vec<WeakGate>)> = BTreeMap::new();
        let mut unique_gates: HashMap<GateSignature, GateRef> = HashMap::new();
        let root = self.graph.root();
        Self::detect_multiple_definitions(&root, &mut multi_def, &mut unique_gates);
        drop(unique_gates); // Release the extra canonical handles.
        self.graph.clear_gate_marks();

        if multi_def.is_empty() {
            return false;
        }
        trace!("{} gates are multiply defined", multi_def.len());
        for (canonical, duplicates) in multi_def.values() {
            for duplicate in duplicates {
                if let Some(duplicate) = duplicate.upgrade() {
                    self.replace_gate(&duplicate, canonical);
                }
            }
        }
        self.clear_const_gates();
        self.clear_null_gates();
        true
    }

    fn detect_multiple_definitions(
        gate: &GateRef,
        multi_def: &mut BTreeMap<i32, (GateRef, Vec<WeakGate>)>,
        unique_gates: &mut HashMap<GateSignature, GateRef>,
    ) {
        if gate.borrow().mark() {
            return;
        }
        gate.borrow_mut().set_mark(true);
        debug_assert_eq!(gate.borrow().state(), State::Normal);

        if !gate.borrow().is_module() {
            // Modules are unique by definition.
            match unique_gates.entry(GateSignature::of(gate)) {
                Entry::Occupied(entry) => {
                    // The gate is a duplicate of the canonical one.
                    let canonical = entry.get().clone();
                    debug_assert!(canonical.borrow().mark());
                    multi_def
                        .entry(canonical.borrow().index())
                        .or_insert_with(|| (canonical.clone(), Vec::new()))
                        .1
                        .push(Rc::downgrade(gate));
                    return;
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(gate.clone());
                }
            }
        }
        let children: Vec<GateRef> = gate.borrow().gate_args().values().cloned().collect();
        for child in &children {
            Self::detect_multiple_definitions(child, multi_def, unique_gates);
        }
    }

    /// Merges common arguments under AND gates, then under OR gates.
    pub(super) fn merge_common_args(&mut self) -> bool {
        debug_assert!(self.null_gates.is_empty());
        debug_assert!(self.const_gates.is_empty());
        let mut changed = false;

        trace!("Merging common arguments for AND gates...");
        if self.merge_common_args_of(Operator::And) {
            changed = true;
        }
        trace!("Merging common arguments for OR gates...");
        if self.merge_common_args_of(Operator::Or) {
            changed = true;
        }

        debug_assert!(self.null_gates.is_empty());
        debug_assert!(self.const_gates.is_empty());
        changed
    }

    fn merge_common_args_of(&mut self, op: Operator) -> bool {
        debug_assert!(op == Operator::And || op == Operator::Or);
        self.graph.clear_node_counts();
        self.graph.clear_gate_marks();
        let root = self.graph.root();
        Self::mark_common_args(&root, op);
        self.graph.clear_gate_marks();
        let mut group: Vec<(GateRef, Vec<i32>)> = Vec::new();
        Self::gather_common_args(&root, op, &mut group);

        let parents = Self::group_common_parents(2, &group);
        if parents.is_empty() {
            return false; // No candidates for merging.
        }

        trace!("Merging {} groups of common arguments", parents.len());
        // Processing is greedy: groups are taken smallest-first off a table
        // sorted by descending argument-set size, and every merge
        // invalidates its participants (via the opti value) and rewrites
        // the supersets still in the table to refer to the new gate.
        self.graph.clear_opti_values();
        let mut table: Vec<(CommonArgs, CommonParents)> = parents.into_iter().collect();
        table.sort_by(|lhs, rhs| rhs.0.len().cmp(&lhs.0.len()));
        while let Some((common_args, common_parents)) = table.pop() {
            let mut useful_parents: Vec<GateRef> = Vec::new(); // With full arg sets.
            for parent in common_parents.values() {
                if parent.borrow().base().opti_value() != 0 {
                    // A previous merge took arguments away from this parent.
                    debug_assert_eq!(parent.borrow().base().opti_value(), 1);
                    let p = parent.borrow();
                    if !common_args.iter().all(|arg| p.args().contains(arg)) {
                        continue;
                    }
                }
                useful_parents.push(parent.clone());
            }

            if useful_parents.len() < 2 {
                continue; // No point in merging.
            }
            trace!("Merging {} args into a new gate", common_args.len());
            let merge_gate = Gate::new(op);
            for &index in &common_args {
                useful_parents[0].borrow().share_arg(index, &merge_gate);
                for parent in &useful_parents {
                    parent.borrow_mut().erase_arg(index);
                }
            }
            let merge_index = merge_gate.borrow().index();
            for parent in &useful_parents {
                parent.borrow_mut().add_gate_arg(merge_index, &merge_gate);
                parent.borrow_mut().base_mut().set_opti_value(1); // Processed.
                if parent.borrow().args().len() == 1 {
                    parent.borrow_mut().set_operator(Operator::Null);
                    self.null_gates.push(Rc::downgrade(parent));
                }
                debug_assert_eq!(parent.borrow().state(), State::Normal);
            }
            // Supersets still in the table now contain the merge gate.
            for (set_args, _) in table.iter_mut() {
                if set_args.len() <= common_args.len() {
                    continue;
                }
                if !is_subset(&common_args, set_args) {
                    continue;
                }
                let mut diff = sorted_difference(set_args, &common_args);
                debug_assert!(diff.last().map_or(true, |&last| merge_index > last));
                diff.push(merge_index); // Sequential indexing keeps it sorted.
                *set_args = diff;
            }
        }
        self.clear_null_gates();
        true
    }

    /// First merge pass: counts positive and negative occurrences of every
    /// argument under gates of the given operator.
    fn mark_common_args(gate: &GateRef, op: Operator) {
        if gate.borrow().mark() {
            return;
        }
        gate.borrow_mut().set_mark(true);

        let in_group = gate.borrow().operator() == op;

        let children: Vec<(i32, GateRef)> = gate
            .borrow()
            .gate_args()
            .iter()
            .map(|(&arg, child)| (arg, child.clone()))
            .collect();
        for (arg, child) in &children {
            debug_assert_eq!(child.borrow().state(), State::Normal);
            Self::mark_common_args(child, op);
            if in_group {
                child.borrow_mut().base_mut().add_count(*arg > 0);
            }
        }

        if !in_group {
            return; // No need to count leaf variables.
        }

        let variables: Vec<(i32, crate::node::VariableRef)> = gate
            .borrow()
            .variable_args()
            .iter()
            .map(|(&arg, var)| (arg, var.clone()))
            .collect();
        for (arg, var) in &variables {
            var.borrow_mut().base_mut().add_count(*arg > 0);
        }
        debug_assert!(gate.borrow().constant_args().is_empty());
    }

    /// Second merge pass: collects, per gate of the operator, the sorted
    /// signed arguments that occur under two or more group gates.
    fn gather_common_args(gate: &GateRef, op: Operator, group: &mut Vec<(GateRef, Vec<i32>)>) {
        if gate.borrow().mark() {
            return;
        }
        gate.borrow_mut().set_mark(true);

        let in_group = gate.borrow().operator() == op;

        let mut common_args: Vec<i32> = Vec::new();
        let children: Vec<(i32, GateRef)> = gate
            .borrow()
            .gate_args()
            .iter()
            .map(|(&arg, child)| (arg, child.clone()))
            .collect();
        for (arg, child) in &children {
            debug_assert_eq!(child.borrow().state(), State::Normal);
            Self::gather_common_args(child, op, group);
            if !in_group {
                continue;
            }
            let count = if *arg > 0 {
                child.borrow().base().pos_count()
            } else {
                child.borrow().base().neg_count()
            };
            if count > 1 {
                common_args.push(*arg);
            }
        }

        if !in_group {
            return;
        }

        for (&arg, var) in gate.borrow().variable_args() {
            let count = if arg > 0 {
                var.borrow().base().pos_count()
            } else {
                var.borrow().base().neg_count()
            };
            if count > 1 {
                common_args.push(arg);
            }
        }
        debug_assert!(gate.borrow().constant_args().is_empty());

        if common_args.len() < 2 {
            return; // Can't be merged anyway.
        }
        common_args.sort_unstable();
        group.push((gate.clone(), common_args));
    }

    /// Pairs up the group members and records, for every argument set
    /// common to a pair (of at least `num_common_args` arguments), the set
    /// of gates sharing it.
    pub(super) fn group_common_parents(
        num_common_args: usize,
        group: &[(GateRef, Vec<i32>)],
    ) -> BTreeMap<CommonArgs, CommonParents> {
        let mut parents: BTreeMap<CommonArgs, CommonParents> = BTreeMap::new();
        for i in 0..group.len().saturating_sub(1) {
            let args_gate = &group[i].1;
            debug_assert!(args_gate.len() > 1);
            for j in (i + 1)..group.len() {
                let args_comp = &group[j].1;
                debug_assert!(args_comp.len() > 1);

                let common = sorted_intersection(args_gate, args_comp);
                if common.len() < num_common_args {
                    continue; // Doesn't satisfy.
                }
                let common_parents = parents.entry(common).or_default();
                let (lhs, rhs) = (&group[i].0, &group[j].0);
                common_parents.insert(lhs.borrow().index(), lhs.clone());
                common_parents.insert(rhs.borrow().index(), rhs.clone());
            }
        }
        parents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::BooleanGraph;
    use crate::preprocess::Preprocessor;

    #[test]
    fn test_sorted_set_helpers() {
        assert_eq!(sorted_intersection(&[-3, 1, 4], &[-3, 2, 4]), vec![-3, 4]);
        assert!(is_subset(&[-3, 4], &[-3, 1, 4]));
        assert!(!is_subset(&[-3, 5], &[-3, 1, 4]));
        assert_eq!(sorted_difference(&[-3, 1, 4], &[-3, 4]), vec![1]);
    }

    #[test]
    fn test_multiple_definitions_collapse() {
        // Two identical AND(a, b) gates under different parents merge into
        // one shared gate.
        let mut graph = BooleanGraph::new();
        let root = graph.gate(Operator::And);
        let left = graph.gate(Operator::Or);
        let right = graph.gate(Operator::Or);
        let dup_one = graph.gate(Operator::And);
        let dup_two = graph.gate(Operator::And);
        let a = graph.variable();
        let b = graph.variable();
        let x = graph.variable();
        let (ai, bi, xi) = (a.borrow().index(), b.borrow().index(), x.borrow().index());
        graph.connect(&dup_one, ai, &a);
        graph.connect(&dup_one, bi, &b);
        graph.connect(&dup_two, ai, &a);
        graph.connect(&dup_two, bi, &b);
        let (d1, d2) = (dup_one.borrow().index(), dup_two.borrow().index());
        graph.connect(&left, d1, &dup_one);
        graph.connect(&left, xi, &x);
        graph.connect(&right, d2, &dup_two);
        graph.connect(&right, xi, &x);
        let (li, ri) = (left.borrow().index(), right.borrow().index());
        graph.connect(&root, li, &left);
        graph.connect(&root, ri, &right);
        graph.set_root(root.clone()).unwrap();

        let mut preprocessor = Preprocessor::new(&mut graph);
        assert!(preprocessor.process_multiple_definitions());

        // The canonical definition is the first one encountered; both
        // parents now share it.
        let canonical = if left.borrow().args().contains(&d1) { d1 } else { d2 };
        assert!(left.borrow().args().contains(&canonical));
        assert!(right.borrow().args().contains(&canonical));
        let shared = left.borrow().gate_args().get(&canonical).cloned().unwrap();
        assert_eq!(shared.borrow().base().parents().len(), 2);

        // A second round finds the parents now identical in turn; the root
        // collapses into a pass-through of the surviving parent.
        assert!(preprocessor.process_multiple_definitions());
        assert_eq!(root.borrow().operator(), Operator::Null);
        assert!(!preprocessor.process_multiple_definitions());
    }

    #[test]
    fn test_merge_common_args_factors_pairs() {
        // AND(a, b, x) and AND(a, b, y) share {a, b}; the pair moves into
        // one new gate referenced by both.
        let mut graph = BooleanGraph::new();
        let root = graph.gate(Operator::Or);
        let left = graph.gate(Operator::And);
        let right = graph.gate(Operator::And);
        let a = graph.variable();
        let b = graph.variable();
        let x = graph.variable();
        let y = graph.variable();
        let (ai, bi) = (a.borrow().index(), b.borrow().index());
        let (xi, yi) = (x.borrow().index(), y.borrow().index());
        graph.connect(&left, ai, &a);
        graph.connect(&left, bi, &b);
        graph.connect(&left, xi, &x);
        graph.connect(&right, ai, &a);
        graph.connect(&right, bi, &b);
        graph.connect(&right, yi, &y);
        let (li, ri) = (left.borrow().index(), right.borrow().index());
        graph.connect(&root, li, &left);
        graph.connect(&root, ri, &right);
        graph.set_root(root).unwrap();

        let mut preprocessor = Preprocessor::new(&mut graph);
        assert!(preprocessor.merge_common_args());

        assert_eq!(left.borrow().args().len(), 2); // {merge gate, x}
        assert_eq!(right.borrow().args().len(), 2); // {merge gate, y}
        let merge = left
            .borrow()
            .gate_args()
            .values()
            .next()
            .cloned()
            .expect("left gained a merge gate");
        assert_eq!(merge.borrow().operator(), Operator::And);
        assert!(merge.borrow().args().contains(&ai));
        assert!(merge.borrow().args().contains(&bi));
        assert_eq!(merge.borrow().base().parents().len(), 2);
    }
}
