//! End-to-end preprocessing tests.
//!
//! Every scenario is checked two ways: structurally, against the expected
//! output shape, and semantically, by enumerating all variable assignments
//! before and after preprocessing and comparing truth tables.

use fault_graph::{
    process_fault_tree, Assignment, BooleanGraph, GateRef, Operator, State, VariableRef,
};

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use test_log::test;

// ─── Helpers ───────────────────────────────────────────────────────────────────

fn truth_table(graph: &BooleanGraph, vars: &[VariableRef]) -> Vec<bool> {
    let indices: Vec<i32> = vars.iter().map(|v| v.borrow().index()).collect();
    (0..1u32 << vars.len())
        .map(|bits| {
            let assignment: Assignment = indices
                .iter()
                .enumerate()
                .map(|(i, &index)| (index, (bits >> i) & 1 == 1))
                .collect();
            graph.evaluate(&assignment)
        })
        .collect()
}

/// All gates reachable from the root.
fn collect_gates(graph: &BooleanGraph) -> Vec<GateRef> {
    let mut gates = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut stack = vec![graph.root()];
    while let Some(gate) = stack.pop() {
        if !seen.insert(gate.borrow().index()) {
            continue;
        }
        for child in gate.borrow().gate_args().values() {
            stack.push(child.clone());
        }
        gates.push(gate);
    }
    gates
}

/// Preprocesses the graph and checks the universal postconditions:
/// unchanged truth table, structural validity, no constants, no negative
/// operators.
fn check_preprocessing(graph: &mut BooleanGraph, vars: &[VariableRef]) {
    let before = truth_table(graph, vars);
    process_fault_tree(graph);
    let after = truth_table(graph, vars);
    assert_eq!(before, after, "preprocessing changed the Boolean function");

    assert_eq!(graph.validate(), Vec::<String>::new());
    assert!(graph.normal());
    for gate in collect_gates(graph) {
        let g = gate.borrow();
        assert!(g.constant_args().is_empty(), "constants must not survive");
        assert!(
            !matches!(
                g.operator(),
                Operator::Not | Operator::Nand | Operator::Nor | Operator::Xor
            ),
            "negative operators must not survive: {}",
            g
        );
    }
}

// ─── Seed Scenarios ────────────────────────────────────────────────────────────

#[test]
fn absorption_reduces_to_single_variable() {
    // AND(a, OR(a, b)) == a
    let mut graph = BooleanGraph::new();
    let root = graph.gate(Operator::And);
    let child = graph.gate(Operator::Or);
    let a = graph.variable();
    let b = graph.variable();
    let (ai, bi) = (a.borrow().index(), b.borrow().index());
    let child_index = child.borrow().index();
    graph.connect(&child, ai, &a);
    graph.connect(&child, bi, &b);
    graph.connect(&root, ai, &a);
    graph.connect(&root, child_index, &child);
    graph.set_root(root).unwrap();

    check_preprocessing(&mut graph, &[a.clone(), b]);

    let root = graph.root();
    assert_eq!(root.borrow().operator(), Operator::Null);
    assert!(root.borrow().args().contains(&ai));
}

#[test]
fn de_morgan_pushes_negation_to_leaves() {
    // NOT(OR(AND(a, b), c)) == AND(OR(~a, ~b), ~c)
    let mut graph = BooleanGraph::new();
    let root = graph.gate(Operator::Not);
    let or_gate = graph.gate(Operator::Or);
    let and_gate = graph.gate(Operator::And);
    let a = graph.variable();
    let b = graph.variable();
    let c = graph.variable();
    let (ai, bi, ci) = (a.borrow().index(), b.borrow().index(), c.borrow().index());
    graph.connect(&and_gate, ai, &a);
    graph.connect(&and_gate, bi, &b);
    let and_index = and_gate.borrow().index();
    graph.connect(&or_gate, and_index, &and_gate);
    graph.connect(&or_gate, ci, &c);
    let or_index = or_gate.borrow().index();
    graph.connect(&root, or_index, &or_gate);
    graph.set_root(root).unwrap();

    check_preprocessing(&mut graph, &[a, b, c.clone()]);

    let root = graph.root();
    assert_eq!(root.borrow().operator(), Operator::And);
    assert!(root.borrow().args().contains(&-ci));
}

#[test]
fn xor_normalizes_to_and_or() {
    // XOR(a, b) == OR(AND(a, ~b), AND(~a, b))
    let mut graph = BooleanGraph::new();
    let root = graph.gate(Operator::Xor);
    let a = graph.variable();
    let b = graph.variable();
    let (ai, bi) = (a.borrow().index(), b.borrow().index());
    graph.connect(&root, ai, &a);
    graph.connect(&root, bi, &b);
    graph.set_root(root).unwrap();

    check_preprocessing(&mut graph, &[a, b]);

    let root = graph.root();
    assert_eq!(root.borrow().operator(), Operator::Or);
    let children: Vec<GateRef> = root.borrow().gate_args().values().cloned().collect();
    assert_eq!(children.len(), 2);
    assert!(children
        .iter()
        .any(|g| g.borrow().args().contains(&ai) && g.borrow().args().contains(&-bi)));
    assert!(children
        .iter()
        .any(|g| g.borrow().args().contains(&-ai) && g.borrow().args().contains(&bi)));
}

#[test]
fn vote_gate_survives_normal_graphs() {
    // A normal coherent graph needs no full normalization, so the vote
    // gate stays for analyses that handle it natively.
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

    check_preprocessing(&mut graph, &[a, b, c]);
    assert_eq!(graph.root().borrow().operator(), Operator::Atleast);
}

#[test]
fn vote_gate_expands_in_non_normal_graphs() {
    // AND(@(2, [a, b, c]), NOT(d)): the NOT triggers full normalization,
    // which expands the vote gate into AND/OR structure.
    let mut graph = BooleanGraph::new();
    let root = graph.gate(Operator::And);
    let vote = graph.vote_gate(2).unwrap();
    let not_gate = graph.gate(Operator::Not);
    let a = graph.variable();
    let b = graph.variable();
    let c = graph.variable();
    let d = graph.variable();
    let (ai, bi, ci, di) = (
        a.borrow().index(),
        b.borrow().index(),
        c.borrow().index(),
        d.borrow().index(),
    );
    graph.connect(&vote, ai, &a);
    graph.connect(&vote, bi, &b);
    graph.connect(&vote, ci, &c);
    graph.connect(&not_gate, di, &d);
    let vote_index = vote.borrow().index();
    let not_index = not_gate.borrow().index();
    graph.connect(&root, vote_index, &vote);
    graph.connect(&root, not_index, &not_gate);
    graph.set_root(root).unwrap();

    check_preprocessing(&mut graph, &[a, b, c, d]);
    for gate in collect_gates(&graph) {
        assert_ne!(gate.borrow().operator(), Operator::Atleast);
    }
}

#[test]
fn independent_subtrees_stay_flagged_as_modules() {
    let mut graph = BooleanGraph::new();
    let root = graph.gate(Operator::And);
    let left = graph.gate(Operator::Or);
    let right = graph.gate(Operator::Or);
    let x = graph.variable();
    let y = graph.variable();
    let u = graph.variable();
    let v = graph.variable();
    let (xi, yi) = (x.borrow().index(), y.borrow().index());
    let (ui, vi) = (u.borrow().index(), v.borrow().index());
    graph.connect(&left, xi, &x);
    graph.connect(&left, yi, &y);
    graph.connect(&right, ui, &u);
    graph.connect(&right, vi, &v);
    let (li, ri) = (left.borrow().index(), right.borrow().index());
    graph.connect(&root, li, &left);
    graph.connect(&root, ri, &right);
    graph.set_root(root).unwrap();

    check_preprocessing(&mut graph, &[x, y, u, v]);

    let root = graph.root();
    assert!(root.borrow().is_module());
    for child in root.borrow().gate_args().values() {
        assert!(child.borrow().is_module());
    }
}

#[test]
fn multiple_definitions_collapse_to_shared_structure() {
    // Both branches contain their own copy of AND(a, b).
    let mut graph = BooleanGraph::new();
    let root = graph.gate(Operator::And);
    let left = graph.gate(Operator::Or);
    let right = graph.gate(Operator::Or);
    let dup_one = graph.gate(Operator::And);
    let dup_two = graph.gate(Operator::And);
    let a = graph.variable();
    let b = graph.variable();
    let x = graph.variable();
    let y = graph.variable();
    let (ai, bi) = (a.borrow().index(), b.borrow().index());
    let (xi, yi) = (x.borrow().index(), y.borrow().index());
    graph.connect(&dup_one, ai, &a);
    graph.connect(&dup_one, bi, &b);
    graph.connect(&dup_two, ai, &a);
    graph.connect(&dup_two, bi, &b);
    let (d1, d2) = (dup_one.borrow().index(), dup_two.borrow().index());
    graph.connect(&left, d1, &dup_one);
    graph.connect(&left, xi, &x);
    graph.connect(&right, d2, &dup_two);
    graph.connect(&right, yi, &y);
    let (li, ri) = (left.borrow().index(), right.borrow().index());
    graph.connect(&root, li, &left);
    graph.connect(&root, ri, &right);
    graph.set_root(root).unwrap();

    check_preprocessing(&mut graph, &[a, b, x, y]);

    // At most one copy of AND(a, b) can survive.
    let copies = collect_gates(&graph)
        .iter()
        .filter(|gate| {
            let g = gate.borrow();
            g.operator() == Operator::And
                && g.args().len() == 2
                && g.args().contains(&ai)
                && g.args().contains(&bi)
        })
        .count();
    assert!(copies <= 1, "duplicate definitions survived: {}", copies);
}

#[test]
fn distributivity_factors_common_argument() {
    // OR(AND(a, b), AND(a, c)) == AND(a, OR(b, c))
    let mut graph = BooleanGraph::new();
    let root = graph.gate(Operator::Or);
    let left = graph.gate(Operator::And);
    let right = graph.gate(Operator::And);
    let a = graph.variable();
    let b = graph.variable();
    let c = graph.variable();
    let (ai, bi, ci) = (a.borrow().index(), b.borrow().index(), c.borrow().index());
    graph.connect(&left, ai, &a);
    graph.connect(&left, bi, &b);
    graph.connect(&right, ai, &a);
    graph.connect(&right, ci, &c);
    let (li, ri) = (left.borrow().index(), right.borrow().index());
    graph.connect(&root, li, &left);
    graph.connect(&root, ri, &right);
    graph.set_root(root).unwrap();

    check_preprocessing(&mut graph, &[a, b, c]);

    let root = graph.root();
    assert_eq!(root.borrow().operator(), Operator::And);
    assert!(root.borrow().args().contains(&ai));
    let sub = root
        .borrow()
        .gate_args()
        .values()
        .next()
        .cloned()
        .expect("factored sub-gate");
    assert_eq!(sub.borrow().operator(), Operator::Or);
    assert!(sub.borrow().args().contains(&bi));
    assert!(sub.borrow().args().contains(&ci));
}

// ─── Laws ──────────────────────────────────────────────────────────────────────

#[test]
fn constant_true_under_or_absorbs_everything() {
    let mut graph = BooleanGraph::new();
    let root = graph.gate(Operator::Or);
    let a = graph.variable();
    let ai = a.borrow().index();
    let top = graph.constant(true);
    let top_index = top.borrow().index();
    graph.connect(&root, ai, &a);
    graph.connect(&root, top_index, &top);
    graph.set_root(root).unwrap();

    process_fault_tree(&mut graph);
    assert_eq!(graph.root().borrow().state(), State::Unity);
}

#[test]
fn double_negation_cancels() {
    // NOT(NOT(AND(a, b))) == AND(a, b)
    let mut graph = BooleanGraph::new();
    let outer = graph.gate(Operator::Not);
    let inner = graph.gate(Operator::Not);
    let and_gate = graph.gate(Operator::And);
    let a = graph.variable();
    let b = graph.variable();
    let (ai, bi) = (a.borrow().index(), b.borrow().index());
    graph.connect(&and_gate, ai, &a);
    graph.connect(&and_gate, bi, &b);
    let and_index = and_gate.borrow().index();
    graph.connect(&inner, and_index, &and_gate);
    let inner_index = inner.borrow().index();
    graph.connect(&outer, inner_index, &inner);
    graph.set_root(outer).unwrap();

    check_preprocessing(&mut graph, &[a, b]);

    let root = graph.root();
    assert_eq!(root.borrow().operator(), Operator::And);
    assert!(root.borrow().args().contains(&ai));
    assert!(root.borrow().args().contains(&bi));
}

#[test]
fn preprocessing_is_idempotent() {
    let mut graph = BooleanGraph::new();
    let root = graph.gate(Operator::Or);
    let left = graph.gate(Operator::And);
    let right = graph.gate(Operator::And);
    let a = graph.variable();
    let b = graph.variable();
    let c = graph.variable();
    let (ai, bi, ci) = (a.borrow().index(), b.borrow().index(), c.borrow().index());
    graph.connect(&left, ai, &a);
    graph.connect(&left, bi, &b);
    graph.connect(&right, ai, &a);
    graph.connect(&right, ci, &c);
    let (li, ri) = (left.borrow().index(), right.borrow().index());
    graph.connect(&root, li, &left);
    graph.connect(&root, ri, &right);
    graph.set_root(root).unwrap();

    let vars = [a, b, c];
    check_preprocessing(&mut graph, &vars);
    let first_table = truth_table(&graph, &vars);
    let first_size = collect_gates(&graph).len();

    process_fault_tree(&mut graph);
    assert_eq!(truth_table(&graph, &vars), first_table);
    assert_eq!(collect_gates(&graph).len(), first_size);
    assert_eq!(graph.validate(), Vec::<String>::new());
}

#[test]
fn coherent_inputs_stay_coherent() {
    // Only AND/OR/ATLEAST in, only positive edges out.
    let mut graph = BooleanGraph::new();
    let root = graph.gate(Operator::And);
    let vote = graph.vote_gate(2).unwrap();
    let or_gate = graph.gate(Operator::Or);
    let a = graph.variable();
    let b = graph.variable();
    let c = graph.variable();
    let d = graph.variable();
    let (ai, bi, ci, di) = (
        a.borrow().index(),
        b.borrow().index(),
        c.borrow().index(),
        d.borrow().index(),
    );
    graph.connect(&vote, ai, &a);
    graph.connect(&vote, bi, &b);
    graph.connect(&vote, ci, &c);
    graph.connect(&or_gate, ci, &c);
    graph.connect(&or_gate, di, &d);
    let (vi, oi) = (vote.borrow().index(), or_gate.borrow().index());
    graph.connect(&root, vi, &vote);
    graph.connect(&root, oi, &or_gate);
    graph.set_root(root).unwrap();

    check_preprocessing(&mut graph, &[a, b, c, d]);
    for gate in collect_gates(&graph) {
        for &arg in gate.borrow().args() {
            assert!(arg > 0, "coherent graphs must stay negation-free");
        }
    }
}

// ─── Randomized Equivalence ────────────────────────────────────────────────────

/// Builds a random fault tree over the given variables, mixing all
/// operators and polarities.
fn random_tree(
    graph: &mut BooleanGraph,
    vars: &[VariableRef],
    rng: &mut ChaCha8Rng,
    depth: u32,
) -> GateRef {
    let operator = match rng.gen_range(0..7) {
        0 => Operator::And,
        1 => Operator::Or,
        2 => Operator::Nand,
        3 => Operator::Nor,
        4 => Operator::Xor,
        5 => Operator::Not,
        _ => Operator::Atleast,
    };
    if operator == Operator::Atleast {
        let gate = graph.vote_gate(2).unwrap();
        let mut picks: Vec<&VariableRef> = vars.iter().collect();
        picks.shuffle(rng);
        for var in picks.into_iter().take(3) {
            let index = var.borrow().index();
            graph.connect(&gate, index, var);
        }
        return gate;
    }
    let gate = graph.gate(operator);
    let num_args = match operator {
        Operator::Not => 1,
        Operator::Xor => 2,
        _ => rng.gen_range(2..=3),
    };
    for _ in 0..num_args {
        if gate.borrow().state() != State::Normal {
            break; // A contradictory pick collapsed the gate already.
        }
        let negate = rng.gen_bool(0.3);
        if depth > 0 && rng.gen_bool(0.5) {
            let child = random_tree(graph, vars, rng, depth - 1);
            let index = child.borrow().index();
            graph.connect(&gate, if negate { -index } else { index }, &child);
        } else {
            let var = vars.choose(rng).unwrap();
            let index = var.borrow().index();
            graph.connect(&gate, if negate { -index } else { index }, var);
        }
    }
    gate
}

#[test]
fn random_graphs_preprocess_to_equivalent_graphs() {
    for seed in 0..24 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut graph = BooleanGraph::new();
        let vars: Vec<VariableRef> = (0..5).map(|_| graph.variable()).collect();
        let root = random_tree(&mut graph, &vars, &mut rng, 3);
        if graph.set_root(root).is_err() {
            continue; // Degenerate vote gate arity; not a preprocessing case.
        }

        let before = truth_table(&graph, &vars);
        process_fault_tree(&mut graph);
        let after = truth_table(&graph, &vars);
        assert_eq!(before, after, "function changed for seed {}", seed);
        assert_eq!(graph.validate(), Vec::<String>::new(), "seed {}", seed);
    }
}

#[test]
fn random_coherent_graphs_preprocess_to_equivalent_graphs() {
    for seed in 100..112 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut graph = BooleanGraph::new();
        let vars: Vec<VariableRef> = (0..6).map(|_| graph.variable()).collect();

        // Coherent: AND/OR over shared variables only.
        let root = graph.gate(if rng.gen_bool(0.5) { Operator::And } else { Operator::Or });
        for _ in 0..3 {
            let child = graph.gate(if rng.gen_bool(0.5) { Operator::And } else { Operator::Or });
            for _ in 0..rng.gen_range(2..=4) {
                let var = vars.choose(&mut rng).unwrap();
                let index = var.borrow().index();
                graph.connect(&child, index, var);
            }
            let child_index = child.borrow().index();
            graph.connect(&root, child_index, &child);
        }
        graph.set_root(root).unwrap();

        let before = truth_table(&graph, &vars);
        process_fault_tree(&mut graph);
        assert_eq!(before, truth_table(&graph, &vars), "seed {}", seed);
        assert_eq!(graph.validate(), Vec::<String>::new(), "seed {}", seed);
    }
}
