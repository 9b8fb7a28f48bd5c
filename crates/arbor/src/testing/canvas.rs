//! Builders for canvases laid out in flex layers.

use crate::{
    layout::{Alignment, FlexLayer, LayerChild, LayoutMutator},
    widget::{CANVAS_WIDGET, GridPosition, MAIN_CONTAINER_ID, ResponsiveBehavior, Widget, WidgetId, WidgetTree},
};

/// A child placed by [`CanvasBuilder`].
#[derive(Debug, Clone)]
pub struct Child {
    /// Widget id.
    pub id: String,
    /// Bucket.
    pub align: Alignment,
    /// Width in columns.
    pub columns: i32,
    /// Height in rows.
    pub rows: i32,
    /// Fill sizing.
    pub fill: bool,
}

impl Child {
    /// A hug child, 4 rows tall.
    pub fn hug(id: &str, align: Alignment, columns: i32) -> Self {
        Self {
            id: id.to_string(),
            align,
            columns,
            rows: 4,
            fill: false,
        }
    }

    /// A fill child, 4 rows tall.
    pub fn fill(id: &str, align: Alignment) -> Self {
        Self {
            fill: true,
            ..Self::hug(id, align, 0)
        }
    }
}

/// Builds a main canvas with children arranged in layers.
#[derive(Debug, Clone, Default)]
pub struct CanvasBuilder {
    /// Layers, top to bottom.
    layers: Vec<Vec<Child>>,
}

impl CanvasBuilder {
    /// An empty main canvas.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer.
    pub fn layer(mut self, children: Vec<Child>) -> Self {
        self.layers.push(children);
        self
    }

    /// Build the tree and lay it out with `mutator`.
    pub fn build_with(self, mutator: &LayoutMutator) -> WidgetTree {
        let mut tree = WidgetTree::new();
        let mut root = Widget::new(MAIN_CONTAINER_ID, CANVAS_WIDGET);
        root.position = GridPosition::new(0, 0, 0, mutator.config().grid_columns);
        for layer in &self.layers {
            for c in layer {
                let mut w = Widget::new(c.id.as_str(), "TEXT_WIDGET");
                w.parent_id = Some(MAIN_CONTAINER_ID.into());
                w.position = GridPosition::new(0, c.rows, 0, c.columns);
                w.responsive_behavior = if c.fill {
                    ResponsiveBehavior::Fill
                } else {
                    ResponsiveBehavior::Hug
                };
                root.children.push(c.id.as_str().into());
                tree.insert(w);
            }
        }
        let layers: Vec<FlexLayer> = self
            .layers
            .iter()
            .map(|l| {
                FlexLayer::from_children(
                    l.iter()
                        .map(|c| LayerChild::new(c.id.as_str(), c.align))
                        .collect(),
                    &tree,
                )
            })
            .filter(|l| !l.is_empty())
            .collect();
        root.flex_layers = layers;
        tree.insert(root);
        let main: WidgetId = MAIN_CONTAINER_ID.into();
        mutator.update_size_of_all_children(&mut tree, &main);
        mutator.update_widget_positions(&mut tree, &main);
        tree
    }

    /// Build with the default mutator.
    pub fn build(self) -> WidgetTree {
        self.build_with(&LayoutMutator::default())
    }
}
