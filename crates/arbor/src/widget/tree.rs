use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fmt,
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use super::{Widget, WidgetId};

/// Arena of widgets keyed by id.
///
/// Entries are shared, so cloning a tree is cheap and mutation through
/// [`WidgetTree::get_mut`] copies only the touched widget. Comparing two
/// snapshots with [`WidgetTree::changed_since`] is a pointer comparison per
/// entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetTree {
    /// Widget storage.
    widgets: BTreeMap<WidgetId, Arc<Widget>>,
}

/// A broken structural invariant reported by [`WidgetTree::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeViolation {
    /// A children list names a widget that is not in the tree.
    DanglingChild {
        /// Parent holding the reference.
        parent: WidgetId,
        /// Missing child.
        child: WidgetId,
    },
    /// A child's `parent_id` does not point back at the listing parent.
    ParentMismatch {
        /// Child widget.
        child: WidgetId,
        /// Parent whose children list contains the child.
        listed_by: WidgetId,
        /// The child's recorded parent.
        recorded: Option<WidgetId>,
    },
    /// A widget names a parent that does not list it.
    Orphan {
        /// Orphaned widget.
        widget: WidgetId,
        /// Recorded parent.
        parent: WidgetId,
    },
    /// A child of a layered container is not in exactly one layer.
    LayerMembership {
        /// Container owning the layers.
        container: WidgetId,
        /// Child widget.
        child: WidgetId,
        /// How many layers reference the child.
        count: usize,
    },
    /// A layer references a widget that is not a child of the container.
    ForeignLayerChild {
        /// Container owning the layers.
        container: WidgetId,
        /// Referenced widget.
        child: WidgetId,
    },
    /// A persisted layer has no children.
    EmptyLayer {
        /// Container owning the layers.
        container: WidgetId,
        /// Layer index.
        layer: usize,
    },
    /// A layer's fill flag disagrees with its children.
    StaleFillFlag {
        /// Container owning the layers.
        container: WidgetId,
        /// Layer index.
        layer: usize,
    },
}

impl fmt::Display for TreeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DanglingChild { parent, child } => {
                write!(f, "{parent} lists missing child {child}")
            }
            Self::ParentMismatch {
                child,
                listed_by,
                recorded,
            } => write!(
                f,
                "{child} is listed by {listed_by} but records parent {recorded:?}"
            ),
            Self::Orphan { widget, parent } => {
                write!(f, "{widget} records parent {parent} which does not list it")
            }
            Self::LayerMembership {
                container,
                child,
                count,
            } => write!(f, "{child} appears in {count} layers of {container}"),
            Self::ForeignLayerChild { container, child } => {
                write!(f, "layer of {container} references non-child {child}")
            }
            Self::EmptyLayer { container, layer } => {
                write!(f, "layer {layer} of {container} is empty")
            }
            Self::StaleFillFlag { container, layer } => {
                write!(f, "layer {layer} of {container} has a stale fill flag")
            }
        }
    }
}

impl WidgetTree {
    /// Construct an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of widgets.
    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    /// True if the tree holds no widgets.
    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    /// Insert or replace a widget, returning the previous entry.
    pub fn insert(&mut self, widget: Widget) -> Option<Arc<Widget>> {
        self.widgets.insert(widget.widget_id.clone(), Arc::new(widget))
    }

    /// Remove a widget entry. Links are not touched.
    pub fn remove(&mut self, id: &WidgetId) -> Option<Arc<Widget>> {
        self.widgets.remove(id)
    }

    /// Borrow a widget.
    pub fn get(&self, id: &WidgetId) -> Option<&Widget> {
        self.widgets.get(id).map(Arc::as_ref)
    }

    /// Borrow a widget mutably, copying it first if the entry is shared with
    /// another snapshot.
    pub fn get_mut(&mut self, id: &WidgetId) -> Option<&mut Widget> {
        self.widgets.get_mut(id).map(Arc::make_mut)
    }

    /// True if the tree holds the id.
    pub fn contains(&self, id: &WidgetId) -> bool {
        self.widgets.contains_key(id)
    }

    /// Iterate widgets in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Widget> + '_ {
        self.widgets.values().map(Arc::as_ref)
    }

    /// Iterate ids in order.
    pub fn ids(&self) -> impl Iterator<Item = &WidgetId> + '_ {
        self.widgets.keys()
    }

    /// Resolve the canvas that owns the layers of a container: the container
    /// itself if it is a canvas, otherwise its first child.
    pub fn canvas_of(&self, container_id: &WidgetId) -> Option<&WidgetId> {
        let container = self.widgets.get(container_id)?;
        if container.is_canvas() {
            return Some(&container.widget_id);
        }
        let canvas_id = container.children.first()?;
        self.widgets.get(canvas_id).map(|w| &w.widget_id)
    }

    /// All descendants of a widget in depth-first order, excluding the widget.
    pub fn descendants(&self, id: &WidgetId) -> Vec<WidgetId> {
        let mut out = Vec::new();
        let mut stack: Vec<WidgetId> = match self.get(id) {
            Some(w) => w.children.iter().rev().cloned().collect(),
            None => return out,
        };
        let mut seen = HashSet::new();
        while let Some(next) = stack.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(w) = self.get(&next) {
                stack.extend(w.children.iter().rev().cloned());
            }
            out.push(next);
        }
        out
    }

    /// Ids whose entries differ from `older`, including added and removed ids.
    pub fn changed_since(&self, older: &Self) -> BTreeSet<WidgetId> {
        let mut changed = BTreeSet::new();
        for (id, widget) in &self.widgets {
            match older.widgets.get(id) {
                Some(prev) if Arc::ptr_eq(prev, widget) => {}
                _ => {
                    changed.insert(id.clone());
                }
            }
        }
        for id in older.widgets.keys() {
            if !self.widgets.contains_key(id) {
                changed.insert(id.clone());
            }
        }
        changed
    }

    /// Check parent/child links and layer membership, returning every
    /// violation found.
    pub fn validate(&self) -> Vec<TreeViolation> {
        let mut out = Vec::new();
        for widget in self.iter() {
            for child in &widget.children {
                match self.get(child) {
                    None => out.push(TreeViolation::DanglingChild {
                        parent: widget.widget_id.clone(),
                        child: child.clone(),
                    }),
                    Some(c) if c.parent_id.as_ref() != Some(&widget.widget_id) => {
                        out.push(TreeViolation::ParentMismatch {
                            child: child.clone(),
                            listed_by: widget.widget_id.clone(),
                            recorded: c.parent_id.clone(),
                        })
                    }
                    Some(_) => {}
                }
            }
            if let Some(parent) = &widget.parent_id {
                let listed = self
                    .get(parent)
                    .is_some_and(|p| p.children.contains(&widget.widget_id));
                if !listed {
                    out.push(TreeViolation::Orphan {
                        widget: widget.widget_id.clone(),
                        parent: parent.clone(),
                    });
                }
            }
            self.validate_layers(widget, &mut out);
        }
        out
    }

    /// Layer checks for a single container.
    fn validate_layers(&self, widget: &Widget, out: &mut Vec<TreeViolation>) {
        if widget.flex_layers.is_empty() {
            return;
        }
        let container = &widget.widget_id;
        for (idx, layer) in widget.flex_layers.iter().enumerate() {
            if layer.children.is_empty() {
                out.push(TreeViolation::EmptyLayer {
                    container: container.clone(),
                    layer: idx,
                });
            }
            let fill = layer
                .children
                .iter()
                .any(|c| self.get(&c.id).is_some_and(Widget::is_fill));
            if fill != layer.has_fill_child {
                out.push(TreeViolation::StaleFillFlag {
                    container: container.clone(),
                    layer: idx,
                });
            }
            for c in &layer.children {
                if !widget.children.contains(&c.id) {
                    out.push(TreeViolation::ForeignLayerChild {
                        container: container.clone(),
                        child: c.id.clone(),
                    });
                }
            }
        }
        for child in &widget.children {
            let count = widget
                .flex_layers
                .iter()
                .flat_map(|l| l.children.iter())
                .filter(|c| &c.id == child)
                .count();
            if count != 1 {
                out.push(TreeViolation::LayerMembership {
                    container: container.clone(),
                    child: child.clone(),
                    count,
                });
            }
        }
    }
}

impl FromIterator<Widget> for WidgetTree {
    fn from_iter<T: IntoIterator<Item = Widget>>(iter: T) -> Self {
        let mut tree = Self::new();
        for w in iter {
            tree.insert(w);
        }
        tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        layout::{Alignment, FlexLayer, LayerChild},
        widget::CANVAS_WIDGET,
    };

    fn widget(id: &str, parent: Option<&str>, children: &[&str]) -> Widget {
        let mut w = Widget::new(id, "TEXT_WIDGET");
        w.parent_id = parent.map(WidgetId::from);
        w.children = children.iter().map(|c| WidgetId::from(*c)).collect();
        w
    }

    #[test]
    fn clone_shares_until_mutated() {
        let tree: WidgetTree = [widget("0", None, &["a"]), widget("a", Some("0"), &[])]
            .into_iter()
            .collect();
        let mut next = tree.clone();
        assert!(next.changed_since(&tree).is_empty());
        next.get_mut(&"a".into()).unwrap().position.bottom_row = 4;
        assert_eq!(
            next.changed_since(&tree).into_iter().collect::<Vec<_>>(),
            vec![WidgetId::from("a")]
        );
        assert_eq!(tree.get(&"a".into()).unwrap().position.bottom_row, 0);
    }

    #[test]
    fn validate_reports_broken_links() {
        let tree: WidgetTree = [
            widget("0", None, &["a", "ghost"]),
            widget("a", Some("x"), &[]),
            widget("b", Some("0"), &[]),
        ]
        .into_iter()
        .collect();
        let v = tree.validate();
        assert!(v.contains(&TreeViolation::DanglingChild {
            parent: "0".into(),
            child: "ghost".into()
        }));
        assert!(v.iter().any(|e| matches!(e, TreeViolation::ParentMismatch { .. })));
        assert!(v.contains(&TreeViolation::Orphan {
            widget: "b".into(),
            parent: "0".into()
        }));
    }

    #[test]
    fn validate_checks_layers() {
        let mut root = widget("0", None, &["a", "b"]);
        root.widget_type = CANVAS_WIDGET.into();
        root.flex_layers = vec![
            FlexLayer {
                children: vec![LayerChild::new("a", Alignment::Start)],
                has_fill_child: true,
            },
            FlexLayer::default(),
        ];
        let tree: WidgetTree = [root, widget("a", Some("0"), &[]), widget("b", Some("0"), &[])]
            .into_iter()
            .collect();
        let v = tree.validate();
        assert!(v.contains(&TreeViolation::EmptyLayer {
            container: "0".into(),
            layer: 1
        }));
        assert!(v.contains(&TreeViolation::StaleFillFlag {
            container: "0".into(),
            layer: 0
        }));
        assert!(v.contains(&TreeViolation::LayerMembership {
            container: "0".into(),
            child: "b".into(),
            count: 0
        }));
    }

    #[test]
    fn canvas_and_descendants() {
        let mut canvas = widget("c", Some("box"), &["leaf"]);
        canvas.widget_type = CANVAS_WIDGET.into();
        let tree: WidgetTree = [
            widget("box", None, &["c"]),
            canvas,
            widget("leaf", Some("c"), &[]),
        ]
        .into_iter()
        .collect();
        assert_eq!(tree.canvas_of(&"box".into()), Some(&WidgetId::from("c")));
        assert_eq!(tree.canvas_of(&"c".into()), Some(&WidgetId::from("c")));
        assert_eq!(
            tree.descendants(&"box".into()),
            vec![WidgetId::from("c"), WidgetId::from("leaf")]
        );
    }
}
