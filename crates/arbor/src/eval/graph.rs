//! Dependency graph over property paths.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use slotmap::{SlotMap, new_key_type};

new_key_type! {
    /// Key of a node in the dependency graph.
    pub struct NodeKey;
}

/// A property path with its edges.
#[derive(Debug, Clone, Default)]
struct Node {
    /// `Entity.property` path.
    path: String,
    /// Nodes this node reads.
    deps: BTreeSet<NodeKey>,
    /// Nodes that read this node.
    dependents: BTreeSet<NodeKey>,
}

/// Result of ordering the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ordering {
    /// Every acyclic node, dependencies before dependents.
    pub order: Vec<String>,
    /// Nodes on a cycle: members of a strongly connected component with
    /// more than one node, or with a self-loop.
    pub cyclic: BTreeSet<String>,
}

/// Directed graph from each node to the nodes it depends on.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Node storage.
    nodes: SlotMap<NodeKey, Node>,
    /// Path lookup.
    index: BTreeMap<String, NodeKey>,
}

impl DependencyGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert a node if it does not exist.
    pub fn add_node(&mut self, path: &str) -> NodeKey {
        if let Some(k) = self.index.get(path) {
            return *k;
        }
        let k = self.nodes.insert(Node {
            path: path.to_string(),
            ..Node::default()
        });
        self.index.insert(path.to_string(), k);
        k
    }

    /// True if the path is a node.
    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    /// All node paths, sorted.
    pub fn paths(&self) -> impl Iterator<Item = &str> + '_ {
        self.index.keys().map(String::as_str)
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, path: &str) {
        let Some(k) = self.index.remove(path) else {
            return;
        };
        let Some(node) = self.nodes.remove(k) else {
            return;
        };
        for d in node.deps {
            if let Some(n) = self.nodes.get_mut(d) {
                n.dependents.remove(&k);
            }
        }
        for d in node.dependents {
            if let Some(n) = self.nodes.get_mut(d) {
                n.deps.remove(&k);
            }
        }
    }

    /// Replace a node's dependencies. Paths that are not nodes are ignored.
    /// Returns true if the dependency set changed.
    pub fn set_dependencies<'a>(&mut self, path: &str, deps: impl IntoIterator<Item = &'a str>) -> bool {
        let k = self.add_node(path);
        let new: BTreeSet<NodeKey> = deps
            .into_iter()
            .filter_map(|d| self.index.get(d).copied())
            .collect();
        let old = self
            .nodes
            .get(k)
            .map(|n| n.deps.clone())
            .unwrap_or_default();
        if old == new {
            return false;
        }
        for d in old.difference(&new) {
            if let Some(n) = self.nodes.get_mut(*d) {
                n.dependents.remove(&k);
            }
        }
        for d in new.difference(&old) {
            if let Some(n) = self.nodes.get_mut(*d) {
                n.dependents.insert(k);
            }
        }
        if let Some(n) = self.nodes.get_mut(k) {
            n.deps = new;
        }
        true
    }

    /// Paths a node depends on, sorted.
    pub fn dependencies(&self, path: &str) -> Vec<&str> {
        self.edges(path, |n| &n.deps)
    }

    /// Paths that depend on a node, sorted.
    pub fn dependents(&self, path: &str) -> Vec<&str> {
        self.edges(path, |n| &n.dependents)
    }

    /// Resolve one edge set to sorted paths.
    fn edges(&self, path: &str, pick: impl Fn(&Node) -> &BTreeSet<NodeKey>) -> Vec<&str> {
        let Some(n) = self.index.get(path).and_then(|k| self.nodes.get(*k)) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = pick(n)
            .iter()
            .filter_map(|k| self.nodes.get(*k).map(|n| n.path.as_str()))
            .collect();
        out.sort_unstable();
        out
    }

    /// The given paths plus everything that transitively depends on them.
    pub fn with_dependents<'a>(&self, paths: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<NodeKey> = paths
            .into_iter()
            .filter_map(|p| self.index.get(p).copied())
            .collect();
        while let Some(k) = queue.pop_front() {
            if !seen.insert(k) {
                continue;
            }
            if let Some(n) = self.nodes.get(k) {
                queue.extend(n.dependents.iter().copied());
            }
        }
        seen.into_iter()
            .filter_map(|k| self.nodes.get(k).map(|n| n.path.clone()))
            .collect()
    }

    /// Map from each path to the paths that depend on it. Paths without
    /// dependents are omitted.
    pub fn inverse_dependency_map(&self) -> BTreeMap<String, Vec<String>> {
        self.index
            .keys()
            .filter_map(|p| {
                let deps: Vec<String> = self.dependents(p).into_iter().map(String::from).collect();
                (!deps.is_empty()).then(|| (p.clone(), deps))
            })
            .collect()
    }

    /// Strongly connected components, each emitted after every component
    /// it depends on.
    pub fn components(&self) -> Vec<Vec<NodeKey>> {
        Tarjan::new(self).run()
    }

    /// Topologically order the acyclic part of the graph and collect the
    /// nodes on cycles. Nodes that merely depend on a cycle stay in the
    /// order.
    pub fn order(&self) -> Ordering {
        let mut out = Ordering::default();
        for comp in self.components() {
            let cyclic = comp.len() > 1
                || comp
                    .first()
                    .and_then(|k| self.nodes.get(*k).map(|n| n.deps.contains(k)))
                    .unwrap_or(false);
            for k in comp {
                let Some(n) = self.nodes.get(k) else {
                    continue;
                };
                if cyclic {
                    out.cyclic.insert(n.path.clone());
                } else {
                    out.order.push(n.path.clone());
                }
            }
        }
        out
    }
}

/// Iterative Tarjan's algorithm.
struct Tarjan<'a> {
    /// Graph being searched.
    graph: &'a DependencyGraph,
    /// Discovery index per node.
    index: BTreeMap<NodeKey, usize>,
    /// Lowest reachable index per node.
    low: BTreeMap<NodeKey, usize>,
    /// Nodes on the component stack.
    on_stack: BTreeSet<NodeKey>,
    /// Component stack.
    stack: Vec<NodeKey>,
    /// Next discovery index.
    next: usize,
    /// Finished components.
    out: Vec<Vec<NodeKey>>,
}

impl<'a> Tarjan<'a> {
    /// Prepare a search.
    fn new(graph: &'a DependencyGraph) -> Self {
        Self {
            graph,
            index: BTreeMap::new(),
            low: BTreeMap::new(),
            on_stack: BTreeSet::new(),
            stack: Vec::new(),
            next: 0,
            out: Vec::new(),
        }
    }

    /// Search from every node in path order.
    fn run(mut self) -> Vec<Vec<NodeKey>> {
        let roots: Vec<NodeKey> = self.graph.index.values().copied().collect();
        for root in roots {
            if !self.index.contains_key(&root) {
                self.visit(root);
            }
        }
        self.out
    }

    /// Mark a node discovered.
    fn discover(&mut self, k: NodeKey) {
        self.index.insert(k, self.next);
        self.low.insert(k, self.next);
        self.next += 1;
        self.stack.push(k);
        self.on_stack.insert(k);
    }

    /// Depth-first search with an explicit call stack of (node, pending
    /// children).
    fn visit(&mut self, root: NodeKey) {
        let children = |g: &DependencyGraph, k: NodeKey| -> Vec<NodeKey> {
            g.nodes
                .get(k)
                .map(|n| n.deps.iter().copied().collect())
                .unwrap_or_default()
        };
        self.discover(root);
        let mut calls = vec![(root, children(self.graph, root), 0usize)];
        while let Some((k, kids, pos)) = calls.last_mut() {
            let k = *k;
            if let Some(&child) = kids.get(*pos) {
                *pos += 1;
                if !self.index.contains_key(&child) {
                    self.discover(child);
                    let grand = children(self.graph, child);
                    calls.push((child, grand, 0));
                } else if self.on_stack.contains(&child) {
                    let low = self.low[&k].min(self.index[&child]);
                    self.low.insert(k, low);
                }
                continue;
            }
            calls.pop();
            if let Some((parent, _, _)) = calls.last() {
                let low = self.low[parent].min(self.low[&k]);
                self.low.insert(*parent, low);
            }
            if self.low[&k] == self.index[&k] {
                let mut comp = Vec::new();
                while let Some(top) = self.stack.pop() {
                    self.on_stack.remove(&top);
                    comp.push(top);
                    if top == k {
                        break;
                    }
                }
                self.out.push(comp);
            }
        }
    }
}
