//! Reactive evaluation of data trees.
//!
//! Property values may embed code in `{{ ... }}` bindings. The evaluator
//! builds a graph from each binding to the properties it reads, evaluates
//! bindings in dependency order, and on later passes re-runs only what a
//! change can reach.

pub mod binding;
mod error;
mod evaluator;
mod expr;
mod graph;
pub mod guard;
mod tree;

pub use error::{EvalError, EvalErrorKind};
pub use evaluator::{BindingValues, DataTreeEvaluator, EvalPass, TriggerResult};
pub use expr::{ExpressionEvaluator, RhaiEvaluator, ScriptError, ScriptErrorKind};
pub use graph::{DependencyGraph, NodeKey, Ordering};
pub use guard::{ActionDescription, EvalMode};
pub use tree::{DataTree, DiffEvent, Entity, EntityKind, TreeDiff, split_path};
