//! Graphviz export for inspecting Boolean graphs.

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::gate::{Operator, State};
use crate::graph::BooleanGraph;
use crate::node::GateRef;

impl BooleanGraph {
    /// Renders the graph in Graphviz dot format.
    ///
    /// Gates are circles labeled with their operator (vote gates carry the
    /// vote number), modules get a double outline, variables are boxes,
    /// and complemented edges are dashed.
    pub fn to_dot(&self) -> Result<String, std::fmt::Error> {
        let mut dot = String::new();
        writeln!(dot, "digraph boolean_graph {{")?;
        writeln!(dot, "rankdir=TB;")?;
        writeln!(dot, "node [shape=circle];")?;

        let mut seen = HashSet::new();
        write_gate(&mut dot, &self.root(), &mut seen)?;

        writeln!(dot, "}}")?;
        Ok(dot)
    }
}

fn write_gate(dot: &mut String, gate: &GateRef, seen: &mut HashSet<i32>) -> std::fmt::Result {
    let g = gate.borrow();
    if !seen.insert(g.index()) {
        return Ok(());
    }

    let label = match g.state() {
        State::Null => "\u{22a5}".to_string(),
        State::Unity => "\u{22a4}".to_string(),
        State::Normal => match g.operator() {
            Operator::Atleast => format!("{}/{}", g.vote_number(), g.args().len()),
            operator => operator.to_string(),
        },
    };
    let shape = if g.is_module() { ", peripheries=2" } else { "" };
    writeln!(dot, "  g{} [label=\"{}\"{}];", g.index(), label, shape)?;

    for (&arg, child) in g.gate_args() {
        let style = if arg < 0 { " [style=dashed]" } else { "" };
        writeln!(dot, "  g{} -> g{}{};", g.index(), child.borrow().index(), style)?;
        write_gate(dot, child, seen)?;
    }
    for (&arg, var) in g.variable_args() {
        let index = var.borrow().index();
        if seen.insert(index) {
            writeln!(dot, "  x{} [shape=box, label=\"x{}\"];", index, index)?;
        }
        let style = if arg < 0 { " [style=dashed]" } else { "" };
        writeln!(dot, "  g{} -> x{}{};", g.index(), index, style)?;
    }
    for (&arg, constant) in g.constant_args() {
        let index = constant.borrow().index();
        if seen.insert(index) {
            let label = if constant.borrow().value() { "\u{22a4}" } else { "\u{22a5}" };
            writeln!(dot, "  k{} [shape=box, label=\"{}\"];", index, label)?;
        }
        let style = if arg < 0 { " [style=dashed]" } else { "" };
        writeln!(dot, "  g{} -> k{}{};", g.index(), index, style)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_output_mentions_every_node() {
        let mut graph = BooleanGraph::new();
        let root = graph.gate(Operator::And);
        let child = graph.gate(Operator::Or);
        let a = graph.variable();
        let b = graph.variable();
        let (ai, bi) = (a.borrow().index(), b.borrow().index());
        let child_index = child.borrow().index();
        graph.connect(&child, ai, &a);
        graph.connect(&child, -bi, &b);
        graph.connect(&root, child_index, &child);
        graph.connect(&root, ai, &a);
        graph.set_root(root).unwrap();

        let dot = graph.to_dot().unwrap();
        assert!(dot.contains("digraph"));
        assert!(dot.contains("AND"));
        assert!(dot.contains("OR"));
        assert!(dot.contains(&format!("x{}", ai)));
        assert!(dot.contains("style=dashed"));
    }
}
