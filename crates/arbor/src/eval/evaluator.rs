//! The data-tree evaluator: full and incremental passes over the
//! dependency graph, plus one-shot trigger and expression evaluation.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt, mem,
    sync::Arc,
    time::Instant,
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::{
    binding::{Segment, is_dynamic, segments, sole_code, template_references},
    error::{EvalError, EvalErrorKind},
    expr::{ExpressionEvaluator, RhaiEvaluator, ScriptError, ScriptErrorKind},
    graph::{DependencyGraph, Ordering},
    guard::{ActionDescription, EvalMode, run_in_frame},
    tree::{DataTree, DiffEvent, Entity, TreeDiff, split_path},
};
use crate::config::EvalConfig;

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalPass {
    /// Dynamic paths evaluated in this pass, in evaluation order.
    pub evaluation_order: Vec<String>,
    /// Changes to the unevaluated tree since the previous pass.
    pub uneval_updates: Vec<TreeDiff>,
    /// Errors raised in this pass.
    pub errors: Vec<EvalError>,
    /// True if the pass rebuilt the graph from scratch.
    pub is_create_first_tree: bool,
}

/// Outcome of running a trigger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResult {
    /// Value of the last code segment, or null on error.
    pub result: Value,
    /// Side effects requested before the trigger finished or failed.
    pub triggers: Vec<ActionDescription>,
    /// Errors raised by the trigger.
    pub errors: Vec<EvalError>,
}

/// Outcome of evaluating action bindings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindingValues {
    /// One value per binding, null where evaluation failed.
    pub values: Vec<Value>,
    /// Errors, with the failing binding as context.
    pub errors: Vec<EvalError>,
}

/// References made by every binding inside a property value, or `None` if
/// the value holds no binding.
fn dynamic_refs(value: &Value) -> Option<Vec<String>> {
    /// Walk nested values.
    fn walk(v: &Value, dynamic: &mut bool, out: &mut Vec<String>) {
        match v {
            Value::String(s) if is_dynamic(s) => {
                *dynamic = true;
                for r in template_references(s) {
                    if !out.contains(&r) {
                        out.push(r);
                    }
                }
            }
            Value::Array(a) => a.iter().for_each(|v| walk(v, dynamic, out)),
            Value::Object(m) => m.values().for_each(|v| walk(v, dynamic, out)),
            _ => {}
        }
    }
    let mut dynamic = false;
    let mut out = Vec::new();
    walk(value, &mut dynamic, &mut out);
    dynamic.then_some(out)
}

/// Map a script failure to its error kind.
fn script_error(e: ScriptError, runtime: EvalErrorKind) -> EvalError {
    let kind = match e.kind {
        ScriptErrorKind::Parse => EvalErrorKind::Parse,
        ScriptErrorKind::Runtime => runtime,
    };
    EvalError::new(kind, e.message)
}

/// Evaluates a data tree in dependency order and keeps it current.
pub struct DataTreeEvaluator {
    /// Runs binding code.
    evaluator: Arc<dyn ExpressionEvaluator>,
    /// One node per non-trigger property path.
    graph: DependencyGraph,
    /// Raw references of every dynamic node.
    refs: BTreeMap<String, Vec<String>>,
    /// Cached sort of the graph.
    ordering: Ordering,
    /// Last tree received.
    unevaluated: DataTree,
    /// Last evaluated tree.
    evaluated: DataTree,
    /// Set when the graph held a cycle; forces a full rebuild.
    needs_rebuild: bool,
}

impl fmt::Debug for DataTreeEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataTreeEvaluator")
            .field("nodes", &self.graph.len())
            .field("cyclic", &self.ordering.cyclic)
            .field("needs_rebuild", &self.needs_rebuild)
            .finish_non_exhaustive()
    }
}

impl DataTreeEvaluator {
    /// An evaluator with no tree, using `evaluator` for binding code.
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self {
            evaluator,
            graph: DependencyGraph::new(),
            refs: BTreeMap::new(),
            ordering: Ordering::default(),
            unevaluated: DataTree::new(),
            evaluated: DataTree::new(),
            needs_rebuild: true,
        }
    }

    /// An evaluator backed by rhai.
    pub fn with_rhai(config: &EvalConfig) -> Self {
        Self::new(Arc::new(RhaiEvaluator::new(config)))
    }

    /// The evaluated tree.
    pub fn eval_tree(&self) -> &DataTree {
        &self.evaluated
    }

    /// The last unevaluated tree.
    pub fn unevaluated_tree(&self) -> &DataTree {
        &self.unevaluated
    }

    /// The dependency graph.
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Cached evaluation order over every acyclic node.
    pub fn sorted_paths(&self) -> &[String] {
        &self.ordering.order
    }

    /// Paths on a dependency cycle.
    pub fn cyclic_paths(&self) -> &BTreeSet<String> {
        &self.ordering.cyclic
    }

    /// True if the current graph holds a cycle.
    pub fn has_cyclical_dependency(&self) -> bool {
        !self.ordering.cyclic.is_empty()
    }

    /// Map from each path to the paths that depend on it.
    pub fn inverse_dependency_map(&self) -> BTreeMap<String, Vec<String>> {
        self.graph.inverse_dependency_map()
    }

    /// Drop compiled code.
    pub fn clear_cache(&self) {
        self.evaluator.clear_cache();
    }

    /// Graph paths a node's raw references point to. A reference resolves
    /// to its `Entity.property` prefix; a bare entity name means every
    /// property of that entity other than the node itself.
    fn resolve(&self, node: &str, refs: &[String]) -> Vec<String> {
        let mut out = Vec::new();
        for r in refs {
            let mut parts = r.split('.');
            let Some(entity) = parts.next() else {
                continue;
            };
            let Some(e) = self.unevaluated.entity(entity) else {
                continue;
            };
            match parts.next() {
                Some(prop) => {
                    let path = format!("{entity}.{prop}");
                    if self.graph.contains(&path) {
                        out.push(path);
                    }
                }
                None => out.extend(
                    e.properties
                        .keys()
                        .map(|k| format!("{entity}.{k}"))
                        .filter(|p| p != node && self.graph.contains(p)),
                ),
            }
        }
        out
    }

    /// Re-resolve the dependencies of `paths`. Returns the paths whose
    /// dependency set changed.
    fn rewire(&mut self, paths: &[String]) -> Vec<String> {
        let mut changed = Vec::new();
        for path in paths {
            let deps = self
                .refs
                .get(path)
                .map(|r| self.resolve(path, r))
                .unwrap_or_default();
            if self
                .graph
                .set_dependencies(path, deps.iter().map(String::as_str))
            {
                changed.push(path.clone());
            }
        }
        changed
    }

    /// Rebuild the graph from `tree` and evaluate every dynamic node.
    /// Nodes on a cycle keep the value they had before, or null.
    pub fn create_first_tree(&mut self, tree: DataTree) -> EvalPass {
        let start = Instant::now();
        let previous = mem::take(&mut self.evaluated);
        let uneval_updates = tree.diff(&self.unevaluated);
        self.unevaluated = tree;
        self.graph = DependencyGraph::new();
        self.refs.clear();

        let paths: Vec<String> = self
            .unevaluated
            .paths()
            .filter(|p| !self.unevaluated.is_trigger(p))
            .collect();
        for path in &paths {
            self.graph.add_node(path);
            if let Some(r) = self.unevaluated.get(path).and_then(dynamic_refs) {
                self.refs.insert(path.clone(), r);
            }
        }
        self.rewire(&paths);
        self.ordering = self.graph.order();

        self.evaluated = self.unevaluated.clone();
        let mut errors = Vec::new();
        for path in &self.ordering.cyclic {
            let last = previous.get(path).cloned().unwrap_or(Value::Null);
            self.evaluated.set(path, last);
            errors.push(EvalError::cycle(path));
        }
        let order: Vec<String> = self
            .ordering
            .order
            .iter()
            .filter(|p| self.refs.contains_key(*p))
            .cloned()
            .collect();
        self.evaluate_nodes(&order, &mut errors);
        self.needs_rebuild = self.has_cyclical_dependency();
        debug!(
            nodes = self.graph.len(),
            evaluated = order.len(),
            cyclic = self.ordering.cyclic.len(),
            elapsed = ?start.elapsed(),
            "full evaluation done"
        );
        EvalPass {
            evaluation_order: order,
            uneval_updates,
            errors,
            is_create_first_tree: true,
        }
    }

    /// Evaluate `tree` against the previous one, re-running only changed
    /// nodes and their transitive dependents. Falls back to a full rebuild
    /// after a pass that found a cycle.
    pub fn update_data_tree(&mut self, tree: DataTree) -> EvalPass {
        if self.needs_rebuild {
            return self.create_first_tree(tree);
        }
        let start = Instant::now();
        let updates = tree.diff(&self.unevaluated);
        self.unevaluated = tree;
        self.sync_entities();
        if updates.is_empty() {
            return EvalPass::default();
        }

        let mut seeds = BTreeSet::new();
        let mut edited = Vec::new();
        let mut structural = false;
        for d in &updates {
            let path = &d.property_path;
            let drop_node = d.event == DiffEvent::Delete || self.unevaluated.is_trigger(path);
            if drop_node {
                if self.graph.contains(path) {
                    seeds.extend(self.graph.dependents(path).into_iter().map(String::from));
                    self.graph.remove_node(path);
                    self.refs.remove(path);
                    structural = true;
                }
            } else {
                if !self.graph.contains(path) {
                    self.graph.add_node(path);
                    structural = true;
                }
                match self.unevaluated.get(path).and_then(dynamic_refs) {
                    Some(r) => self.refs.insert(path.clone(), r),
                    None => self.refs.remove(path),
                };
                seeds.insert(path.clone());
                edited.push(path.clone());
            }
            self.sync_value(d);
        }

        let targets: Vec<String> = if structural {
            self.graph.paths().map(String::from).collect()
        } else {
            edited
        };
        let rewired = self.rewire(&targets);
        if structural || !rewired.is_empty() {
            self.ordering = self.graph.order();
        }
        seeds.extend(rewired);

        let dirty = self.graph.with_dependents(seeds.iter().map(String::as_str));
        let mut errors = Vec::new();
        for path in self.ordering.cyclic.intersection(&dirty) {
            if self.evaluated.get(path).is_none() {
                self.evaluated.set(path, Value::Null);
            }
            errors.push(EvalError::cycle(path));
        }
        let order: Vec<String> = self
            .ordering
            .order
            .iter()
            .filter(|p| dirty.contains(*p) && self.refs.contains_key(*p))
            .cloned()
            .collect();
        self.evaluate_nodes(&order, &mut errors);
        self.needs_rebuild = self.has_cyclical_dependency();
        debug!(
            changed = updates.len(),
            evaluated = order.len(),
            elapsed = ?start.elapsed(),
            "incremental evaluation done"
        );
        EvalPass {
            evaluation_order: order,
            uneval_updates: updates,
            errors,
            is_create_first_tree: false,
        }
    }

    /// Bring entity membership and metadata of the evaluated tree in line
    /// with the unevaluated tree.
    fn sync_entities(&mut self) {
        let gone: Vec<String> = self
            .evaluated
            .entities()
            .map(|(n, _)| n)
            .filter(|n| !self.unevaluated.has_entity(n))
            .cloned()
            .collect();
        for name in gone {
            self.evaluated.remove(&name);
        }
        for (name, e) in self.unevaluated.entities() {
            match self.evaluated.entity_mut(name) {
                Some(ev) => {
                    ev.kind = e.kind;
                    ev.trigger_paths.clone_from(&e.trigger_paths);
                }
                None => {
                    let mut fresh = Entity::new(e.kind);
                    fresh.trigger_paths.clone_from(&e.trigger_paths);
                    self.evaluated.insert(name.clone(), fresh);
                }
            }
        }
    }

    /// Apply one diff entry to the evaluated tree. Dynamic values are left
    /// for evaluation.
    fn sync_value(&mut self, d: &TreeDiff) {
        let path = &d.property_path;
        if d.event == DiffEvent::Delete {
            if let Some((entity, prop)) = split_path(path)
                && let Some(e) = self.evaluated.entity_mut(entity)
            {
                e.properties.remove(prop);
            }
            return;
        }
        if !self.refs.contains_key(path)
            && let Some(raw) = self.unevaluated.get(path).cloned()
        {
            self.evaluated.set(path, raw);
        }
    }

    /// Evaluate `order` in sequence, writing results into the evaluated
    /// tree. Failures become null.
    fn evaluate_nodes(&mut self, order: &[String], errors: &mut Vec<EvalError>) {
        for path in order {
            let Some(raw) = self.unevaluated.get(path) else {
                continue;
            };
            let scope = self.node_scope(path);
            let value = match self.resolve_value(raw, &scope) {
                Ok(v) => v,
                Err(e) => {
                    debug!(path = %path, error = %e.message, "evaluation failed");
                    errors.push(e.at(path.as_str()));
                    Value::Null
                }
            };
            self.evaluated.set(path, value);
        }
    }

    /// Evaluated entities referenced by a node.
    fn node_scope(&self, path: &str) -> Map<String, Value> {
        let mut scope = Map::new();
        for r in self.refs.get(path).into_iter().flatten() {
            let entity = r.split('.').next().unwrap_or(r);
            if !scope.contains_key(entity)
                && let Some(v) = self.evaluated.entity_value(entity)
            {
                scope.insert(entity.to_string(), v);
            }
        }
        scope
    }

    /// Every evaluated entity.
    fn global_scope(&self) -> Map<String, Value> {
        match self.evaluated.to_value() {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    /// Evaluate every binding inside a raw property value.
    fn resolve_value(&self, raw: &Value, scope: &Map<String, Value>) -> Result<Value, EvalError> {
        Ok(match raw {
            Value::String(s) => self.template(s, scope)?,
            Value::Array(a) => Value::Array(
                a.iter()
                    .map(|v| self.resolve_value(v, scope))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(m) => Value::Object(
                m.iter()
                    .map(|(k, v)| Ok((k.clone(), self.resolve_value(v, scope)?)))
                    .collect::<Result<_, EvalError>>()?,
            ),
            other => other.clone(),
        })
    }

    /// Evaluate a template string. A string that is a single binding yields
    /// the binding's value; otherwise segment values are joined as text.
    fn template(&self, s: &str, scope: &Map<String, Value>) -> Result<Value, EvalError> {
        if !is_dynamic(s) {
            return Ok(Value::String(s.to_string()));
        }
        if let Some(code) = sole_code(s) {
            return self.run(code, scope);
        }
        let mut out = String::new();
        for seg in segments(s) {
            match seg {
                Segment::Text(t) => out.push_str(t),
                Segment::Code(code) => match self.run(code, scope)? {
                    Value::String(v) => out.push_str(&v),
                    Value::Null => {}
                    v => out.push_str(&v.to_string()),
                },
            }
        }
        Ok(Value::String(out))
    }

    /// Run binding code in a binding frame.
    fn run(&self, code: &str, scope: &Map<String, Value>) -> Result<Value, EvalError> {
        let (res, report) = run_in_frame(EvalMode::Binding, || self.evaluator.evaluate(code, scope));
        if let Some(name) = report.violation {
            return Err(EvalError::new(
                EvalErrorKind::ActionCalledInSyncField,
                format!(
                    "Found a reference to {name} during evaluation. Sync fields cannot execute framework actions."
                ),
            ));
        }
        res.map_err(|e| script_error(e, EvalErrorKind::Evaluation))
    }

    /// Run trigger code against the current evaluated tree. `code` may be
    /// raw code or a template whose segments run in order. The result is
    /// never cached.
    pub fn evaluate_trigger(
        &self,
        code: &str,
        callback_data: Vec<Value>,
        global_context: Map<String, Value>,
    ) -> TriggerResult {
        let mut scope = self.global_scope();
        scope.extend(global_context);
        scope.insert("arguments".into(), Value::Array(callback_data));
        let codes: Vec<&str> = segments(code)
            .into_iter()
            .filter_map(|s| match s {
                Segment::Code(c) => Some(c),
                Segment::Text(_) => None,
            })
            .collect();
        let codes = if codes.is_empty() { vec![code] } else { codes };
        let (res, report) = run_in_frame(EvalMode::Trigger, || {
            let mut last = Value::Null;
            for c in codes {
                last = self.evaluator.evaluate(c, &scope)?;
            }
            Ok(last)
        });
        let (result, errors) = match res {
            Ok(v) => (v, Vec::new()),
            Err(e) => {
                debug!(error = %e, "trigger failed");
                (Value::Null, vec![script_error(e, EvalErrorKind::Trigger)])
            }
        };
        TriggerResult {
            result,
            triggers: report.actions,
            errors,
        }
    }

    /// Evaluate action parameter bindings with `executionParams` in scope.
    pub fn evaluate_action_bindings(&self, bindings: &[String], params: Value) -> BindingValues {
        let mut scope = self.global_scope();
        scope.insert("executionParams".into(), params);
        let mut out = BindingValues::default();
        for b in bindings {
            match self.template(b, &scope) {
                Ok(v) => out.values.push(v),
                Err(e) => {
                    out.values.push(Value::Null);
                    out.errors.push(e.with_context(Value::String(b.clone())));
                }
            }
        }
        out
    }

    /// Evaluate one expression against every evaluated entity. Accepts a
    /// template or bare code.
    pub fn evaluate_expression(&self, expression: &str) -> Result<Value, EvalError> {
        let scope = self.global_scope();
        if is_dynamic(expression) {
            self.template(expression, &scope)
        } else {
            self.run(expression, &scope)
        }
    }
}
