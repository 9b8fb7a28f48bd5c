use std::{collections::BTreeSet, slice};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    Alignment, Buckets, FlexLayer, HighlightInfo, LayerChild, layer_index_of, remove_from_layers,
    wrap_children,
};
use crate::{
    config::LayoutConfig,
    widget::{
        CONTAINER_WIDGET, GridPosition, LayoutDirection, MAIN_CONTAINER_ID, ResponsiveBehavior,
        Widget, WidgetId, WidgetTree,
    },
};

/// Where a drop lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropTarget {
    /// Canvas receiving the widgets.
    pub parent_id: WidgetId,
    /// Insertion point in the canvas's children list.
    pub index: usize,
    /// Target layer.
    pub layer_index: usize,
    /// Insertion point inside the alignment bucket.
    pub row_index: usize,
    /// Alignment bucket.
    pub alignment: Alignment,
    /// Insert a new layer rather than joining one.
    pub is_new_layer: bool,
    /// Layout direction of the canvas.
    pub direction: LayoutDirection,
}

impl DropTarget {
    /// Target described by a selected highlight.
    pub fn from_highlight(h: &HighlightInfo, direction: LayoutDirection) -> Self {
        Self {
            parent_id: h.canvas_id.clone(),
            index: h.index,
            layer_index: h.layer_index,
            row_index: h.row_index,
            alignment: h.alignment,
            is_new_layer: h.is_new_layer,
            direction,
        }
    }
}

/// Applies layout mutations to a widget tree.
///
/// Every operation works in place on a tree; clone the tree first to keep
/// the previous snapshot, which is cheap. Widget ids that are missing from the
/// tree are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutMutator {
    /// Grid settings.
    config: LayoutConfig,
}

impl LayoutMutator {
    /// Construct a mutator.
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    /// Grid settings.
    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Move widgets to a drop target.
    pub fn reorder_children(&self, tree: &mut WidgetTree, moved: &[WidgetId], target: &DropTarget) {
        let parent_id = &target.parent_id;
        if !tree.contains(parent_id) {
            debug!(parent = %parent_id, "drop target missing, skipping");
            return;
        }
        let moved: Vec<WidgetId> = moved
            .iter()
            .filter(|id| {
                if !tree.contains(id) {
                    debug!(widget = %id, "moved widget missing, skipping");
                    return false;
                }
                if is_ancestor_or_self(tree, id, parent_id) {
                    debug!(widget = %id, parent = %parent_id, "cannot drop a widget into itself");
                    return false;
                }
                true
            })
            .cloned()
            .collect();
        if moved.is_empty() {
            return;
        }

        self.update_relationships(tree, &moved, parent_id);

        let incoming: Vec<LayerChild> = moved
            .iter()
            .map(|id| LayerChild::new(id.clone(), target.alignment))
            .collect();
        if target.direction == LayoutDirection::Vertical {
            let layers = tree
                .get(parent_id)
                .map(|p| remove_from_layers(&p.flex_layers, &moved, tree))
                .unwrap_or_default();
            let layers = if target.is_new_layer || target.layer_index >= layers.len() {
                insert_layer(layers, FlexLayer::from_children(incoming, tree), target.layer_index)
            } else {
                merge_into_layer(layers, tree, &moved, target)
            };
            if let Some(p) = tree.get_mut(parent_id) {
                p.flex_layers = layers;
            }
        } else if let Some(row) = tree
            .get(parent_id)
            .filter(|p| !p.flex_layers.is_empty())
            .map(|p| single_row(&p.flex_layers, tree))
        {
            // A horizontal canvas with layers keeps them as one row.
            let remaining = remove_from_layers(slice::from_ref(&row), &moved, tree);
            let layers = if remaining.is_empty() {
                insert_layer(remaining, FlexLayer::from_children(incoming, tree), 0)
            } else {
                let in_row = DropTarget {
                    layer_index: 0,
                    is_new_layer: false,
                    ..target.clone()
                };
                merge_into_layer(remaining, tree, &moved, &in_row)
            };
            if let Some(p) = tree.get_mut(parent_id) {
                p.flex_layers = layers;
            }
        }

        if let Some(p) = tree.get_mut(parent_id) {
            p.children.retain(|c| !moved.contains(c));
            let pos = target.index.min(p.children.len());
            p.children.splice(pos..pos, moved.iter().cloned());
        }

        self.update_size_of_all_children(tree, parent_id);
        let height = self.update_widget_positions(tree, parent_id);
        self.grow_container(tree, parent_id, height);
    }

    /// Detach moved widgets from previous parents and reparent them.
    fn update_relationships(&self, tree: &mut WidgetTree, moved: &[WidgetId], parent_id: &WidgetId) {
        let mut previous = BTreeSet::new();
        for id in moved {
            let Some(prev) = tree.get(id).and_then(|w| w.parent_id.clone()) else {
                continue;
            };
            if &prev == parent_id {
                continue;
            }
            if let Some(p) = tree.get(&prev) {
                let layers = remove_from_layers(&p.flex_layers, moved, tree);
                if let Some(p) = tree.get_mut(&prev) {
                    p.children.retain(|c| c != id);
                    p.flex_layers = layers;
                }
            }
            if let Some(w) = tree.get_mut(id) {
                w.parent_id = Some(parent_id.clone());
            }
            previous.insert(prev);
        }
        for prev in previous {
            self.update_size_of_all_children(tree, &prev);
            self.update_widget_positions(tree, &prev);
        }
    }

    /// Give fill children of a layer an equal share of the columns left over
    /// by hug children. The share is floored and the remainder left unused.
    pub fn update_flex_child_columns(&self, tree: &mut WidgetTree, layer_index: usize, parent_id: &WidgetId) {
        let Some(layer) = tree
            .get(parent_id)
            .and_then(|p| p.flex_layers.get(layer_index))
            .filter(|l| l.has_fill_child)
            .cloned()
        else {
            return;
        };
        let mut hug = 0;
        let mut fills = Vec::new();
        for id in layer.ids() {
            match tree.get(id) {
                Some(w) if w.is_fill() => fills.push(id.clone()),
                Some(w) => hug += w.position.columns().max(0),
                None => {}
            }
        }
        if fills.is_empty() {
            return;
        }
        let per_fill = (self.config.grid_columns - hug).max(0) / fills.len() as i32;
        for id in &fills {
            update_position(tree, id, |p| p.right_column = p.left_column + per_fill);
        }
    }

    /// Recompute fill columns for every layer of a canvas.
    pub fn update_size_of_all_children(&self, tree: &mut WidgetTree, parent_id: &WidgetId) {
        let count = tree.get(parent_id).map_or(0, |p| p.flex_layers.len());
        for i in 0..count {
            self.update_flex_child_columns(tree, i, parent_id);
        }
    }

    /// Recompute fill columns for the layer holding `widget_id`.
    pub fn update_children_size(&self, tree: &mut WidgetTree, parent_id: &WidgetId, widget_id: &WidgetId) {
        let Some(idx) = tree
            .get(parent_id)
            .and_then(|p| layer_index_of(&p.flex_layers, widget_id))
        else {
            return;
        };
        self.update_flex_child_columns(tree, idx, parent_id);
    }

    /// Remove a deleted widget from its parent's layers and resize the layer
    /// it left. The parent's children list is not touched.
    pub fn update_flex_layers_on_delete(&self, tree: &mut WidgetTree, widget_id: &WidgetId, parent_id: &WidgetId) {
        let Some(parent) = tree.get(parent_id) else {
            return;
        };
        let Some(idx) = layer_index_of(&parent.flex_layers, widget_id) else {
            return;
        };
        let layers = remove_from_layers(&parent.flex_layers, slice::from_ref(widget_id), tree);
        if let Some(p) = tree.get_mut(parent_id) {
            p.flex_layers = layers;
        }
        self.update_flex_child_columns(tree, idx, parent_id);
    }

    /// Switch a widget between fill and hug, refresh its layer's fill flag
    /// and resize the layer.
    pub fn update_fill_child_status(&self, tree: &mut WidgetTree, widget_id: &WidgetId, fill: bool) {
        let Some(parent_id) = tree.get(widget_id).and_then(|w| w.parent_id.clone()) else {
            return;
        };
        if let Some(w) = tree.get_mut(widget_id) {
            w.responsive_behavior = if fill {
                ResponsiveBehavior::Fill
            } else {
                ResponsiveBehavior::Hug
            };
        }
        let Some(canvas_id) = tree.canvas_of(&parent_id).cloned() else {
            return;
        };
        let Some(idx) = tree
            .get(&canvas_id)
            .and_then(|c| layer_index_of(&c.flex_layers, widget_id))
        else {
            return;
        };
        let Some(mut layer) = tree.get(&canvas_id).map(|c| c.flex_layers[idx].clone()) else {
            return;
        };
        layer.refresh_fill(tree);
        if let Some(c) = tree.get_mut(&canvas_id) {
            c.flex_layers[idx] = layer;
        }
        self.update_flex_child_columns(tree, idx, &canvas_id);
    }

    /// Convert a container's canvas to auto-layout: one start layer per child.
    pub fn wrap_container(&self, tree: &mut WidgetTree, container_id: &WidgetId) {
        let Some(canvas_id) = tree.canvas_of(container_id).cloned() else {
            return;
        };
        let layers = match tree.get(&canvas_id) {
            Some(c) if !c.children.is_empty() => wrap_children(&c.children, tree),
            _ => return,
        };
        if let Some(c) = tree.get_mut(&canvas_id) {
            c.flex_layers = layers;
        }
        self.update_size_of_all_children(tree, &canvas_id);
    }

    /// Clear every layer of a container's canvas.
    pub fn remove_child_layers(&self, tree: &mut WidgetTree, container_id: &WidgetId) {
        let Some(canvas_id) = tree.canvas_of(container_id).cloned() else {
            return;
        };
        if let Some(c) = tree.get_mut(&canvas_id) {
            c.flex_layers.clear();
        }
    }

    /// Stretch fill children to the full grid width, recursively.
    pub fn alter_layout_for_mobile(&self, tree: &mut WidgetTree, parent_id: &WidgetId) {
        let Some(children) = self.stack_children(tree, parent_id) else {
            return;
        };
        let grid = self.config.grid_columns;
        for child in &children {
            self.alter_layout_for_mobile(tree, child);
            if tree.get(child).is_some_and(Widget::is_fill) {
                update_position(tree, child, |p| {
                    p.left_column = 0;
                    p.right_column = grid;
                });
            }
        }
    }

    /// Re-split fill children across their layers, recursively.
    pub fn alter_layout_for_desktop(&self, tree: &mut WidgetTree, parent_id: &WidgetId) {
        let Some(children) = self.stack_children(tree, parent_id) else {
            return;
        };
        self.update_size_of_all_children(tree, parent_id);
        for child in &children {
            self.alter_layout_for_desktop(tree, child);
        }
    }

    /// Children of a widget that lays them out as a stack.
    fn stack_children(&self, tree: &WidgetTree, parent_id: &WidgetId) -> Option<Vec<WidgetId>> {
        let parent = tree.get(parent_id)?;
        if !parent.is_vertical_stack() || parent.children.is_empty() {
            return None;
        }
        Some(parent.children.clone())
    }

    /// Delete widgets and their descendants, cleaning up parent links and
    /// layers.
    pub fn remove_widgets(&self, tree: &mut WidgetTree, ids: &[WidgetId]) {
        let mut touched = BTreeSet::new();
        for id in ids {
            let Some(widget) = tree.get(id) else {
                debug!(widget = %id, "widget already removed, skipping");
                continue;
            };
            let parent = widget.parent_id.clone();
            let doomed = tree.descendants(id);
            if let Some(parent_id) = &parent {
                self.update_flex_layers_on_delete(tree, id, parent_id);
                if let Some(p) = tree.get_mut(parent_id) {
                    p.children.retain(|c| c != id);
                }
                touched.insert(parent_id.clone());
            }
            for d in doomed {
                tree.remove(&d);
                touched.remove(&d);
            }
            tree.remove(id);
            touched.remove(id);
        }
        for parent_id in touched {
            self.update_size_of_all_children(tree, &parent_id);
            let height = self.update_widget_positions(tree, &parent_id);
            self.grow_container(tree, &parent_id, height);
        }
    }

    /// Stack a canvas's layers from its padding and place each layer's
    /// buckets along the row. Returns the total height in rows.
    pub fn update_widget_positions(&self, tree: &mut WidgetTree, parent_id: &WidgetId) -> i32 {
        let Some(parent) = tree.get(parent_id) else {
            return 0;
        };
        let layers = if parent.flex_layers.is_empty() {
            vec![FlexLayer::from_children(
                parent
                    .children
                    .iter()
                    .map(|id| LayerChild::new(id.clone(), Alignment::Start))
                    .collect(),
                tree,
            )]
        } else {
            parent.flex_layers.clone()
        };
        let mut top = self.config.container_padding;
        for layer in layers.iter().filter(|l| !l.is_empty()) {
            let mut height = 0;
            for id in layer.ids() {
                let Some(rows) = tree.get(id).map(|w| w.position.rows().max(0)) else {
                    continue;
                };
                update_position(tree, id, |p| {
                    p.top_row = top;
                    p.bottom_row = top + rows;
                });
                height = height.max(rows);
            }
            self.place_columns(tree, &layer.spread());
            top += height;
        }
        top
    }

    /// Lay out a layer's buckets: start from the left edge, center
    /// centred, end flush right. Widths are preserved.
    fn place_columns(&self, tree: &mut WidgetTree, buckets: &Buckets) {
        let grid = self.config.grid_columns;
        let width = |ids: &[WidgetId]| -> i32 {
            ids.iter()
                .filter_map(|id| tree.get(id))
                .map(|w| w.position.columns().max(0))
                .sum()
        };
        let center_start = ((grid - width(&buckets.center)) / 2).max(0);
        let end_start = (grid - width(&buckets.end)).max(0);
        for (ids, mut left) in [
            (&buckets.start, 0),
            (&buckets.center, center_start),
            (&buckets.end, end_start),
        ] {
            for id in ids {
                let Some(cols) = tree.get(id).map(|w| w.position.columns().max(0)) else {
                    continue;
                };
                update_position(tree, id, |p| {
                    p.left_column = left;
                    p.right_column = left + cols;
                });
                left += cols;
            }
        }
    }

    /// Grow a bordered container wrapping `canvas_id` to hold `height` rows.
    fn grow_container(&self, tree: &mut WidgetTree, canvas_id: &WidgetId, height: i32) {
        let Some(gp_id) = tree.get(canvas_id).and_then(|c| c.parent_id.clone()) else {
            return;
        };
        let wraps = tree
            .get(&gp_id)
            .is_some_and(|g| g.widget_type == CONTAINER_WIDGET && g.widget_id != MAIN_CONTAINER_ID);
        if wraps {
            update_position(tree, &gp_id, |p| p.bottom_row = p.top_row + height);
        }
    }
}

/// Apply an edit to a widget's position, writing only if it changes so that
/// untouched widgets keep sharing storage with older snapshots.
fn update_position(tree: &mut WidgetTree, id: &WidgetId, edit: impl FnOnce(&mut GridPosition)) {
    let Some(mut pos) = tree.get(id).map(|w| w.position) else {
        return;
    };
    edit(&mut pos);
    if tree.get(id).is_some_and(|w| w.position != pos)
        && let Some(w) = tree.get_mut(id)
    {
        w.position = pos;
    }
}

/// True if `candidate` is `of` or one of its ancestors.
fn is_ancestor_or_self(tree: &WidgetTree, candidate: &WidgetId, of: &WidgetId) -> bool {
    let mut cur = Some(of.clone());
    for _ in 0..=tree.len() {
        let Some(id) = cur else {
            return false;
        };
        if &id == candidate {
            return true;
        }
        cur = tree.get(&id).and_then(|w| w.parent_id.clone());
    }
    false
}

/// Insert a layer, clamping the index to the end.
fn insert_layer(mut layers: Vec<FlexLayer>, layer: FlexLayer, index: usize) -> Vec<FlexLayer> {
    if layer.is_empty() {
        return layers;
    }
    let pos = index.min(layers.len());
    layers.insert(pos, layer);
    layers
}

/// Every child of `layers` as a single row, in layer order.
fn single_row(layers: &[FlexLayer], tree: &WidgetTree) -> FlexLayer {
    FlexLayer::from_children(
        layers.iter().flat_map(|l| l.children.iter().cloned()).collect(),
        tree,
    )
}

/// Merge moved widgets into an existing layer's alignment bucket. The layer
/// is rebuilt in start, center, end order.
fn merge_into_layer(
    mut layers: Vec<FlexLayer>,
    tree: &WidgetTree,
    moved: &[WidgetId],
    target: &DropTarget,
) -> Vec<FlexLayer> {
    let li = target.layer_index;
    let mut buckets = Buckets::default();
    for child in &layers[li].children {
        buckets.bucket_mut(child.align).push(child.id.clone());
    }
    let bucket = buckets.bucket_mut(target.alignment);
    let pos = target.row_index.min(bucket.len());
    bucket.splice(pos..pos, moved.iter().cloned());
    layers[li] = FlexLayer::from_buckets(buckets, tree);
    layers
}
