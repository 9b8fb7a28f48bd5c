use serde::{Deserialize, Serialize};

use crate::widget::{Widget, WidgetId, WidgetTree};

/// Alignment bucket of a child inside a flex layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    /// Packed against the leading edge.
    #[default]
    Start,
    /// Centred in the layer.
    Center,
    /// Packed against the trailing edge.
    End,
}

/// A child reference inside a flex layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerChild {
    /// Widget id.
    pub id: WidgetId,
    /// Alignment bucket.
    pub align: Alignment,
}

impl LayerChild {
    /// Construct a layer child.
    pub fn new(id: impl Into<WidgetId>, align: Alignment) -> Self {
        Self {
            id: id.into(),
            align,
        }
    }
}

/// One row of widgets in a vertical stack.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlexLayer {
    /// Ordered children: start bucket, then center, then end.
    pub children: Vec<LayerChild>,
    /// True iff any child has fill sizing.
    #[serde(default)]
    pub has_fill_child: bool,
}

/// A layer split into its alignment buckets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Buckets {
    /// Start-aligned children.
    pub start: Vec<WidgetId>,
    /// Center-aligned children.
    pub center: Vec<WidgetId>,
    /// End-aligned children.
    pub end: Vec<WidgetId>,
}

impl Buckets {
    /// True if all buckets are empty.
    pub fn is_empty(&self) -> bool {
        self.start.is_empty() && self.center.is_empty() && self.end.is_empty()
    }

    /// Mutable access to the bucket for an alignment.
    pub fn bucket_mut(&mut self, align: Alignment) -> &mut Vec<WidgetId> {
        match align {
            Alignment::Start => &mut self.start,
            Alignment::Center => &mut self.center,
            Alignment::End => &mut self.end,
        }
    }
}

impl FlexLayer {
    /// Build a layer from children, deriving the fill flag from the tree.
    /// Children missing from the tree are dropped.
    pub fn from_children(children: Vec<LayerChild>, tree: &WidgetTree) -> Self {
        let children: Vec<LayerChild> = children
            .into_iter()
            .filter(|c| tree.contains(&c.id))
            .collect();
        let mut layer = Self {
            children,
            has_fill_child: false,
        };
        layer.refresh_fill(tree);
        layer
    }

    /// Concatenate buckets back into a layer in start, center, end order.
    pub fn from_buckets(buckets: Buckets, tree: &WidgetTree) -> Self {
        let Buckets { start, center, end } = buckets;
        let children = start
            .into_iter()
            .map(|id| LayerChild::new(id, Alignment::Start))
            .chain(center.into_iter().map(|id| LayerChild::new(id, Alignment::Center)))
            .chain(end.into_iter().map(|id| LayerChild::new(id, Alignment::End)))
            .collect();
        Self::from_children(children, tree)
    }

    /// True if the layer has no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// True if the layer references the widget.
    pub fn contains(&self, id: &WidgetId) -> bool {
        self.children.iter().any(|c| &c.id == id)
    }

    /// Widget ids in layer order.
    pub fn ids(&self) -> impl Iterator<Item = &WidgetId> + '_ {
        self.children.iter().map(|c| &c.id)
    }

    /// Recompute `has_fill_child` from the current tree.
    pub fn refresh_fill(&mut self, tree: &WidgetTree) {
        self.has_fill_child = self
            .children
            .iter()
            .any(|c| tree.get(&c.id).is_some_and(Widget::is_fill));
    }

    /// Split into alignment buckets. A layer with a fill child behaves as a
    /// single start bucket.
    pub fn spread(&self) -> Buckets {
        let mut out = Buckets::default();
        for child in &self.children {
            let align = if self.has_fill_child {
                Alignment::Start
            } else {
                child.align
            };
            out.bucket_mut(align).push(child.id.clone());
        }
        out
    }

    /// Copy of the layer without the given ids, fill flag refreshed.
    pub fn without(&self, ids: &[WidgetId], tree: &WidgetTree) -> Self {
        let children = self
            .children
            .iter()
            .filter(|c| !ids.contains(&c.id))
            .cloned()
            .collect();
        Self::from_children(children, tree)
    }
}

/// One single-child start layer per child, in order. Children missing from
/// the tree are skipped.
pub fn wrap_children(children: &[WidgetId], tree: &WidgetTree) -> Vec<FlexLayer> {
    children
        .iter()
        .filter(|id| tree.contains(id))
        .map(|id| FlexLayer::from_children(vec![LayerChild::new(id.clone(), Alignment::Start)], tree))
        .collect()
}

/// Children of all layers, in order.
pub fn flatten_layers(layers: &[FlexLayer]) -> Vec<WidgetId> {
    layers.iter().flat_map(FlexLayer::ids).cloned().collect()
}

/// Drop the given ids from every layer, pruning layers left empty.
pub fn remove_from_layers(
    layers: &[FlexLayer],
    ids: &[WidgetId],
    tree: &WidgetTree,
) -> Vec<FlexLayer> {
    layers
        .iter()
        .map(|l| l.without(ids, tree))
        .filter(|l| !l.is_empty())
        .collect()
}

/// Index of the layer holding a widget.
pub fn layer_index_of(layers: &[FlexLayer], id: &WidgetId) -> Option<usize> {
    layers.iter().position(|l| l.contains(id))
}

/// Number of children sharing the widget's layer, the widget included.
pub fn sibling_count(layers: &[FlexLayer], id: &WidgetId) -> usize {
    layer_index_of(layers, id).map_or(0, |i| layers[i].children.len())
}

/// Position of the widget inside its layer.
pub fn index_in_layer(layers: &[FlexLayer], id: &WidgetId) -> Option<usize> {
    layers
        .iter()
        .find_map(|l| l.children.iter().position(|c| &c.id == id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::{ResponsiveBehavior, Widget};

    fn tree(ids: &[(&str, ResponsiveBehavior)]) -> WidgetTree {
        ids.iter()
            .map(|(id, rb)| {
                let mut w = Widget::new(*id, "TEXT_WIDGET");
                w.responsive_behavior = *rb;
                w
            })
            .collect()
    }

    fn ids(v: &[&str]) -> Vec<WidgetId> {
        v.iter().map(|s| WidgetId::from(*s)).collect()
    }

    #[test]
    fn wrap_then_flatten() {
        let t = tree(&[
            ("a", ResponsiveBehavior::Hug),
            ("b", ResponsiveBehavior::Fill),
            ("c", ResponsiveBehavior::Hug),
        ]);
        let layers = wrap_children(&ids(&["c", "a", "missing", "b"]), &t);
        assert_eq!(layers.len(), 3);
        assert!(layers[2].has_fill_child);
        assert!(!layers[0].has_fill_child);
        assert_eq!(flatten_layers(&layers), ids(&["c", "a", "b"]));
    }

    #[test]
    fn spread_and_rebuild() {
        let t = tree(&[
            ("a", ResponsiveBehavior::Hug),
            ("b", ResponsiveBehavior::Hug),
            ("c", ResponsiveBehavior::Hug),
        ]);
        let layer = FlexLayer::from_children(
            vec![
                LayerChild::new("c", Alignment::End),
                LayerChild::new("a", Alignment::Start),
                LayerChild::new("b", Alignment::Center),
            ],
            &t,
        );
        let buckets = layer.spread();
        assert_eq!(buckets.end, ids(&["c"]));
        let rebuilt = FlexLayer::from_buckets(buckets, &t);
        assert_eq!(rebuilt.ids().cloned().collect::<Vec<_>>(), ids(&["a", "b", "c"]));
    }

    #[test]
    fn fill_layer_spreads_to_start() {
        let t = tree(&[("a", ResponsiveBehavior::Fill), ("b", ResponsiveBehavior::Hug)]);
        let layer = FlexLayer::from_children(
            vec![
                LayerChild::new("a", Alignment::Start),
                LayerChild::new("b", Alignment::End),
            ],
            &t,
        );
        let b = layer.spread();
        assert_eq!(b.start, ids(&["a", "b"]));
        assert!(b.end.is_empty());
    }

    #[test]
    fn removal_prunes_and_refreshes() {
        let t = tree(&[("a", ResponsiveBehavior::Fill), ("b", ResponsiveBehavior::Hug)]);
        let layers = vec![
            FlexLayer::from_children(
                vec![
                    LayerChild::new("a", Alignment::Start),
                    LayerChild::new("b", Alignment::Start),
                ],
                &t,
            ),
            FlexLayer::from_children(vec![LayerChild::new("x", Alignment::Start)], &t),
        ];
        assert!(layers[0].has_fill_child);
        let out = remove_from_layers(&layers, &ids(&["a"]), &t);
        assert_eq!(out.len(), 1);
        assert!(!out[0].has_fill_child);
        assert_eq!(layer_index_of(&out, &"b".into()), Some(0));
        assert_eq!(sibling_count(&out, &"b".into()), 1);
        assert_eq!(index_in_layer(&out, &"b".into()), Some(0));
        assert_eq!(layer_index_of(&out, &"a".into()), None);
    }
}
