//! # fault-graph: Boolean graphs for fault tree analysis
//!
//! **`fault-graph`** is a library for representing fault trees as Boolean
//! graphs and preprocessing them into a simpler, more uniform shape for
//! downstream reliability analyses (minimal cut set enumeration, BDD
//! construction, probability calculations).
//!
//! ## What is a Boolean graph?
//!
//! A fault tree is a Boolean formula over named basic events. Translated
//! directly, it becomes a rooted DAG whose internal nodes are gates (AND,
//! OR, NOT, NAND, NOR, XOR, K-of-N vote gates, and the identity NULL gate)
//! and whose leaves are variables and, transiently, constants. Children
//! are referenced through *signed* indices: the sign of the index is the
//! polarity of the edge, so negating a whole subgraph is one sign flip.
//!
//! ## What does preprocessing do?
//!
//! Directly translated graphs are full of noise: constants, pass-through
//! gates, duplicated structure, XOR and vote operators that cut-set
//! algorithms would rather not see. [`process_fault_tree`] rewrites the
//! graph in place — constant propagation, normalization, de Morgan
//! complement push-down, coalescing, structural dedup, module detection,
//! common-argument factoring, failure-propagation optimization, and
//! Shannon decomposition of shared nodes — while preserving the Boolean
//! function of the root exactly. The output uses only AND and OR gates
//! (plus NULL around a degenerate root), with modules flagged for
//! independent analysis.
//!
//! ## Quick start
//!
//! ```rust
//! use fault_graph::{process_fault_tree, BooleanGraph, Operator};
//!
//! // Build AND(a, OR(a, b)).
//! let mut graph = BooleanGraph::new();
//! let root = graph.gate(Operator::And);
//! let child = graph.gate(Operator::Or);
//! let a = graph.variable();
//! let b = graph.variable();
//! let (ai, bi) = (a.borrow().index(), b.borrow().index());
//! let child_index = child.borrow().index();
//! graph.connect(&child, ai, &a);
//! graph.connect(&child, bi, &b);
//! graph.connect(&root, ai, &a);
//! graph.connect(&root, child_index, &child);
//! graph.set_root(root).unwrap();
//!
//! process_fault_tree(&mut graph);
//!
//! // Absorption: the whole tree reduces to the variable `a` behind a
//! // single pass-through gate.
//! let root = graph.root();
//! assert_eq!(root.borrow().operator(), Operator::Null);
//! assert!(root.borrow().args().contains(&ai));
//! ```
//!
//! ## Core components
//!
//! - [`graph`]: the [`BooleanGraph`] manager — construction surface,
//!   bookkeeping clearers, and the root.
//! - [`gate`]: gates and the structural operations preprocessing rewrites
//!   through.
//! - [`node`]: node identity, signed references, and traversal
//!   bookkeeping.
//! - [`preprocess`]: the five-phase preprocessor.
//! - [`eval`]: truth evaluation under variable assignments.
//! - [`validate`]: structural invariant checking.
//! - [`dot`]: Graphviz export.

pub mod dot;
pub mod error;
pub mod eval;
pub mod gate;
pub mod graph;
pub mod node;
pub mod preprocess;
pub mod validate;

pub use error::GraphError;
pub use eval::Assignment;
pub use gate::{Gate, Operator, State};
pub use graph::BooleanGraph;
pub use node::{ConstantRef, GateRef, NodeRef, VariableRef};
pub use preprocess::{process_fault_tree, Preprocessor};
