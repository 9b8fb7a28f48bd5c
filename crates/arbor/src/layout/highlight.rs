use std::{
    collections::{BTreeMap, HashMap},
    hash::BuildHasher,
};

use arbor_geom::{Direction, Point, Rect};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Alignment, FlexLayer, LayerChild};
use crate::{
    config::HighlightConfig,
    widget::{WidgetId, WidgetTree},
};

/// Live measurement of rendered widgets, in page coordinates.
pub trait Measure {
    /// Bounding rectangle of a rendered widget, or `None` if it is not on
    /// screen.
    fn bounding_rect(&self, id: &WidgetId) -> Option<Rect>;
}

impl<S: BuildHasher> Measure for HashMap<WidgetId, Rect, S> {
    fn bounding_rect(&self, id: &WidgetId) -> Option<Rect> {
        self.get(id).copied()
    }
}

impl Measure for BTreeMap<WidgetId, Rect> {
    fn bounding_rect(&self, id: &WidgetId) -> Option<Rect> {
        self.get(id).copied()
    }
}

/// Orientation of a highlight bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// A horizontal bar: drop as a new layer.
    Horizontal,
    /// A vertical bar: drop into an existing row.
    Vertical,
}

/// A candidate drop position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightInfo {
    /// Create a new layer rather than joining an existing one.
    pub is_new_layer: bool,
    /// Insertion point in the container's children list.
    pub index: usize,
    /// Target layer.
    pub layer_index: usize,
    /// Insertion point inside the alignment bucket.
    pub row_index: usize,
    /// Alignment bucket.
    pub alignment: Alignment,
    /// Bar rectangle, container-local.
    #[serde(flatten)]
    pub rect: Rect,
    /// Bar orientation.
    pub orientation: Orientation,
    /// Canvas the highlight belongs to.
    pub canvas_id: WidgetId,
}

impl HighlightInfo {
    /// True for vertical bars.
    pub fn is_vertical(&self) -> bool {
        self.orientation == Orientation::Vertical
    }
}

/// Result of a nearest-highlight query.
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightSelection {
    /// Nearest candidate.
    pub selected: HighlightInfo,
    /// Remaining candidates, nearest first.
    pub rest: Vec<HighlightInfo>,
}

/// Computes drop highlights for one canvas.
///
/// Child rectangles are measured on every call. The canvas rectangle is
/// cached until [`HighlightCalculator::invalidate_container_rect`].
#[derive(Debug, Clone)]
pub struct HighlightCalculator {
    /// Canvas being dropped into.
    canvas_id: WidgetId,
    /// Tuning constants.
    config: HighlightConfig,
    /// Cached canvas rect, page coordinates.
    container: Option<Rect>,
}

/// Inputs shared by one highlight computation.
struct Pass<'a, M: Measure + ?Sized> {
    /// Measurement source.
    measure: &'a M,
    /// Tuning constants.
    config: &'a HighlightConfig,
    /// Canvas rect, page coordinates.
    container: Rect,
    /// Canvas id stamped on every highlight.
    canvas_id: &'a WidgetId,
}

impl<M: Measure + ?Sized> Pass<'_, M> {
    /// Container-local rect of a widget.
    fn local(&self, id: &WidgetId) -> Option<Rect> {
        self.measure
            .bounding_rect(id)
            .map(|r| r.relative_to(self.container.tl()))
    }

    /// Container-local rect of a layer: the vertical span of its children,
    /// stretched across the container.
    fn layer_rect(&self, layer: &FlexLayer) -> Option<Rect> {
        let span = layer
            .ids()
            .filter_map(|id| self.local(id))
            .reduce(|a, b| a.union(&b))?;
        Some(Rect::new(0.0, span.y, self.container.w, span.h))
    }

    /// Highlight with the fields common to every bar.
    #[allow(clippy::too_many_arguments)]
    fn bar(
        &self,
        is_new_layer: bool,
        index: usize,
        layer_index: usize,
        row_index: usize,
        alignment: Alignment,
        rect: Rect,
        orientation: Orientation,
    ) -> HighlightInfo {
        HighlightInfo {
            is_new_layer,
            index,
            layer_index,
            row_index,
            alignment,
            rect,
            orientation,
            canvas_id: self.canvas_id.clone(),
        }
    }

    /// Bar anchored on the container for an empty container or bucket.
    /// `stacked` selects a horizontal new-layer bar.
    fn initial(
        &self,
        index: usize,
        alignment: Alignment,
        layer_index: usize,
        rect: Rect,
        stacked: bool,
        is_new_layer: bool,
    ) -> HighlightInfo {
        let cfg = self.config;
        let x = match alignment {
            Alignment::Start => 0.0,
            Alignment::Center => self.container.w / 2.0,
            Alignment::End => self.container.w - cfg.drag_margin * 2.0,
        };
        let (bar, orientation) = if stacked {
            (
                Rect::new(x, rect.y, rect.w, cfg.bar_thickness),
                Orientation::Horizontal,
            )
        } else {
            (
                Rect::new(
                    x,
                    rect.y + cfg.drag_margin,
                    cfg.bar_thickness,
                    (rect.h - cfg.drag_margin * 2.0).max(0.0),
                ),
                Orientation::Vertical,
            )
        };
        self.bar(is_new_layer, index, layer_index, 0, alignment, bar, orientation)
    }

    /// One vertical bar before each child plus a trailing bar.
    fn row(
        &self,
        children: &[WidgetId],
        first_index: usize,
        layer_index: usize,
        alignment: Alignment,
    ) -> Vec<HighlightInfo> {
        let cfg = self.config;
        let mut out = Vec::new();
        let mut last = None;
        for (row_index, c) in children.iter().enumerate() {
            let Some(r) = self.local(c) else {
                debug!(widget = %c, "child not measurable, skipping bar");
                continue;
            };
            let x = (r.x - cfg.child_gap).max(0.0);
            out.push(self.bar(
                false,
                first_index + row_index,
                layer_index,
                row_index,
                alignment,
                Rect::new(x, r.y, cfg.bar_thickness, r.h),
                Orientation::Vertical,
            ));
            last = Some(r);
        }
        if let Some(r) = last {
            out.push(self.bar(
                false,
                first_index + children.len(),
                layer_index,
                children.len(),
                alignment,
                Rect::new(r.right(), r.y, cfg.bar_thickness, r.h),
                Orientation::Vertical,
            ));
        }
        out
    }

    /// Bars for one alignment bucket. An empty bucket yields a single
    /// anchored bar unless the row is already full.
    #[allow(clippy::too_many_arguments)]
    fn bucket(
        &self,
        children: &[WidgetId],
        first_index: usize,
        layer_index: usize,
        alignment: Alignment,
        layer_rect: Rect,
        layer_empty: bool,
        occupied: f64,
    ) -> Vec<HighlightInfo> {
        let bars = self.row(children, first_index, layer_index, alignment);
        if !bars.is_empty() {
            return bars;
        }
        if !layer_empty && occupied > self.config.row_overflow_threshold * self.container.w {
            return Vec::new();
        }
        vec![self.initial(
            first_index,
            alignment,
            layer_index,
            layer_rect,
            false,
            layer_empty,
        )]
    }

    /// Vertical bars for a layer with the dragged widgets already removed.
    fn layer(
        &self,
        layer: &FlexLayer,
        layer_index: usize,
        layer_rect: Rect,
        first_index: usize,
    ) -> Vec<HighlightInfo> {
        let buckets = layer.spread();
        let empty = buckets.is_empty();
        let occupied: f64 = layer
            .ids()
            .filter_map(|id| self.local(id))
            .map(|r| r.w)
            .sum();
        let mut curr = first_index;
        let start = self.bucket(
            &buckets.start,
            curr,
            layer_index,
            Alignment::Start,
            layer_rect,
            empty,
            occupied,
        );
        let mut out = start.clone();
        if layer.has_fill_child {
            return out;
        }
        curr += buckets.start.len();
        let center = self.bucket(
            &buckets.center,
            curr,
            layer_index,
            Alignment::Center,
            layer_rect,
            empty,
            occupied,
        );
        curr += buckets.center.len();
        let end = self.bucket(
            &buckets.end,
            curr,
            layer_index,
            Alignment::End,
            layer_rect,
            empty,
            occupied,
        );
        let left_of_start = |h: &HighlightInfo| start.iter().any(|s| s.rect.x > h.rect.x);
        let right_of_end = |h: &HighlightInfo| end.iter().any(|e| e.rect.x < h.rect.x);
        // Bars go out start, end, center.
        out.extend(end.iter().filter(|e| !left_of_start(*e)).cloned());
        out.extend(
            center
                .iter()
                .filter(|c| {
                    start.is_empty() || end.is_empty() || !(left_of_start(*c) || right_of_end(*c))
                })
                .cloned(),
        );
        out
    }

    /// Highlights for a vertical stack of layers.
    fn vertical_stack(
        &self,
        layers: &[FlexLayer],
        tree: &WidgetTree,
        dragged: &[WidgetId],
    ) -> Vec<HighlightInfo> {
        let cfg = self.config;
        let mut out = Vec::new();
        let mut rects = Vec::new();
        let mut child_count = 0;
        let mut discarded = 0;
        for (index, layer) in layers.iter().enumerate() {
            let filtered = layer.without(dragged, tree);
            let Some(rect) = self.layer_rect(layer) else {
                debug!(layer = index, "layer not measurable, skipping");
                discarded += 1;
                continue;
            };
            let layer_index = index - discarded;
            if !filtered.is_empty() {
                rects.push(rect);
                out.push(self.bar(
                    true,
                    child_count,
                    layer_index,
                    0,
                    Alignment::Start,
                    Rect::new(
                        0.0,
                        (rect.y - cfg.bar_thickness).max(0.0),
                        self.container.w,
                        cfg.bar_thickness,
                    ),
                    Orientation::Horizontal,
                ));
            }
            out.extend(self.layer(&filtered, layer_index, rect, child_count));
            if filtered.is_empty() {
                discarded += 1;
            }
            child_count += filtered.children.len();
        }
        let y = rects.last().map_or(0.0, Rect::bottom);
        out.push(self.bar(
            true,
            child_count,
            rects.len(),
            0,
            Alignment::Start,
            Rect::new(0.0, y, self.container.w, cfg.bar_thickness),
            Orientation::Horizontal,
        ));
        out
    }
}

impl HighlightCalculator {
    /// Construct a calculator for a canvas.
    pub fn new(canvas_id: impl Into<WidgetId>, config: HighlightConfig) -> Self {
        Self {
            canvas_id: canvas_id.into(),
            config,
            container: None,
        }
    }

    /// Canvas this calculator serves.
    pub fn canvas_id(&self) -> &WidgetId {
        &self.canvas_id
    }

    /// Tuning constants.
    pub fn config(&self) -> &HighlightConfig {
        &self.config
    }

    /// Forget the cached canvas rect, e.g. after a scroll or resize.
    pub fn invalidate_container_rect(&mut self) {
        self.container = None;
    }

    /// The canvas rect, measured once and cached.
    pub fn container_rect<M: Measure + ?Sized>(&mut self, measure: &M) -> Option<Rect> {
        if self.container.is_none() {
            self.container = measure.bounding_rect(&self.canvas_id);
        }
        self.container
    }

    /// Compute every drop highlight for the dragged widgets.
    ///
    /// Returns nothing while the canvas is being resized, when nothing is
    /// dragged, or when the canvas is missing or not measurable.
    pub fn calculate<M: Measure + ?Sized>(
        &mut self,
        tree: &WidgetTree,
        dragged: &[WidgetId],
        measure: &M,
        resizing: bool,
    ) -> Vec<HighlightInfo> {
        if resizing || dragged.is_empty() {
            return Vec::new();
        }
        let Some(container) = self.container_rect(measure) else {
            debug!(canvas = %self.canvas_id, "canvas not measurable");
            return Vec::new();
        };
        let Some(canvas) = tree.get(&self.canvas_id) else {
            debug!(canvas = %self.canvas_id, "canvas not in tree");
            return Vec::new();
        };
        let pass = Pass {
            measure,
            config: &self.config,
            container,
            canvas_id: &self.canvas_id,
        };
        let local = Rect::new(0.0, 0.0, container.w, container.h);
        let stacked = canvas.is_vertical_stack();
        if canvas.children.is_empty() || (stacked && canvas.flex_layers.is_empty()) {
            return vec![pass.initial(0, Alignment::Start, 0, local, stacked, true)];
        }
        if stacked {
            return pass.vertical_stack(&canvas.flex_layers, tree, dragged);
        }
        let row = if canvas.flex_layers.is_empty() {
            FlexLayer::from_children(
                canvas
                    .children
                    .iter()
                    .map(|id| LayerChild::new(id.clone(), Alignment::Start))
                    .collect(),
                tree,
            )
        } else {
            FlexLayer::from_children(
                canvas
                    .flex_layers
                    .iter()
                    .flat_map(|l| l.children.iter().cloned())
                    .collect(),
                tree,
            )
        };
        pass.layer(&row.without(dragged, tree), 0, local, 0)
    }

    /// Synthetic highlight covering the whole canvas.
    fn fallback(&self, stacked: bool) -> Option<HighlightInfo> {
        let container = self.container?;
        let pass = Pass {
            measure: &NoMeasure,
            config: &self.config,
            container,
            canvas_id: &self.canvas_id,
        };
        let local = Rect::new(0.0, 0.0, container.w, container.h);
        Some(pass.initial(0, Alignment::Start, 0, local, stacked, true))
    }

    /// Distance from a pointer to a highlight, biased towards the direction
    /// of travel.
    pub fn distance(&self, h: &HighlightInfo, pos: Point, direction: Option<Direction>) -> f64 {
        let vertical_drag = direction.is_some_and(Direction::is_vertical);
        let mut dx = if h.is_vertical() && vertical_drag {
            0.0
        } else {
            h.rect.x - pos.x
        };
        let mut dy = if !h.is_vertical() && !vertical_drag {
            0.0
        } else {
            h.rect.y - pos.y
        };
        let th = self.config.proximity_threshold;
        let penalty = self.config.direction_penalty;
        match direction {
            Some(Direction::Left) if dx > th => dx += penalty,
            Some(Direction::Right) if dx < -th => dx -= penalty,
            Some(Direction::Up) if dy > th => dy += penalty,
            Some(Direction::Down) if dy < -th => dy -= penalty,
            _ => {}
        }
        dx.hypot(dy)
    }

    /// Pick the nearest viable highlight for a pointer position.
    ///
    /// With no candidates the whole canvas becomes the drop target, provided
    /// the canvas has been measured.
    pub fn select(
        &self,
        highlights: &[HighlightInfo],
        pos: Point,
        direction: Option<Direction>,
        stacked: bool,
    ) -> Option<HighlightSelection> {
        let fallback;
        let base = if highlights.is_empty() {
            fallback = [self.fallback(stacked)?];
            &fallback[..]
        } else {
            highlights
        };
        let mut viable = viable(base, pos, direction, stacked);
        viable.sort_by(|a, b| {
            self.distance(a, pos, direction)
                .total_cmp(&self.distance(b, pos, direction))
        });
        let mut it = viable.into_iter();
        let selected = it.next()?;
        Some(HighlightSelection {
            selected,
            rest: it.collect(),
        })
    }
}

/// Measurement source with nothing on screen.
struct NoMeasure;

impl Measure for NoMeasure {
    fn bounding_rect(&self, _id: &WidgetId) -> Option<Rect> {
        None
    }
}

/// Filter candidates by drag direction and pointer position.
fn viable(
    base: &[HighlightInfo],
    pos: Point,
    direction: Option<Direction>,
    stacked: bool,
) -> Vec<HighlightInfo> {
    let Some(direction) = direction else {
        return base.to_vec();
    };
    let spans = |h: &&HighlightInfo| h.rect.spans_y(pos.y);
    if !stacked {
        let hits: Vec<_> = base.iter().filter(spans).cloned().collect();
        if hits.is_empty() {
            return base.last().cloned().into_iter().collect();
        }
        return hits;
    }
    if direction.is_vertical() {
        return base.iter().filter(|h| !h.is_vertical()).cloned().collect();
    }
    let hits: Vec<_> = base
        .iter()
        .filter(|h| h.is_vertical())
        .filter(spans)
        .cloned()
        .collect();
    if hits.is_empty() {
        return base
            .iter()
            .filter(|h| !h.is_vertical())
            .last()
            .cloned()
            .into_iter()
            .collect();
    }
    hits
}

/// Highlight state for one drag gesture.
#[derive(Debug, Clone)]
pub struct DragSession {
    /// Calculator for the target canvas.
    calculator: HighlightCalculator,
    /// Widgets being dragged.
    dragged: Vec<WidgetId>,
    /// Candidates from the last calculation.
    highlights: Vec<HighlightInfo>,
    /// Most recently selected candidate.
    last_active: Option<HighlightInfo>,
    /// Whether the canvas is a vertical stack.
    stacked: bool,
}

impl DragSession {
    /// Begin a drag of `dragged` over the calculator's canvas.
    pub fn new(calculator: HighlightCalculator, dragged: Vec<WidgetId>) -> Self {
        Self {
            calculator,
            dragged,
            highlights: Vec::new(),
            last_active: None,
            stacked: true,
        }
    }

    /// Recompute candidates from the current tree and measurements.
    pub fn recalculate<M: Measure + ?Sized>(
        &mut self,
        tree: &WidgetTree,
        measure: &M,
        resizing: bool,
    ) -> &[HighlightInfo] {
        self.last_active = None;
        self.stacked = tree
            .get(self.calculator.canvas_id())
            .is_none_or(|c| c.is_vertical_stack());
        self.highlights = self
            .calculator
            .calculate(tree, &self.dragged, measure, resizing);
        &self.highlights
    }

    /// Candidates from the last calculation.
    pub fn highlights(&self) -> &[HighlightInfo] {
        &self.highlights
    }

    /// Mutable access to the calculator, e.g. to invalidate its cache.
    pub fn calculator_mut(&mut self) -> &mut HighlightCalculator {
        &mut self.calculator
    }

    /// Select the nearest candidate for a pointer move and remember it.
    pub fn highlight_drop_position(
        &mut self,
        pos: Point,
        direction: Option<Direction>,
    ) -> Option<HighlightSelection> {
        let sel = self
            .calculator
            .select(&self.highlights, pos, direction, self.stacked)?;
        self.last_active = Some(sel.selected.clone());
        Some(sel)
    }

    /// The drop target: the last selected candidate, or the nearest one to
    /// `pos` if nothing has been selected yet.
    pub fn drop_info(&mut self, pos: Point) -> Option<HighlightInfo> {
        if let Some(h) = &self.last_active {
            return Some(h.clone());
        }
        let sel = self
            .calculator
            .select(&self.highlights, pos, None, self.stacked)?;
        self.last_active = Some(sel.selected.clone());
        Some(sel.selected)
    }

    /// Discard all highlight state.
    pub fn end(&mut self) {
        self.highlights.clear();
        self.last_active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        layout::wrap_children,
        widget::{CANVAS_WIDGET, LayoutDirection, Widget},
    };

    fn canvas(children: &[&str], direction: LayoutDirection) -> WidgetTree {
        let mut c = Widget::new("c", CANVAS_WIDGET);
        c.direction = Some(direction);
        c.children = children.iter().map(|s| WidgetId::from(*s)).collect();
        let mut tree: WidgetTree = children
            .iter()
            .map(|id| {
                let mut w = Widget::new(*id, "TEXT_WIDGET");
                w.parent_id = Some("c".into());
                w
            })
            .collect();
        if direction == LayoutDirection::Vertical {
            c.flex_layers = wrap_children(&c.children, &tree);
        }
        tree.insert(c);
        tree
    }

    fn measure(rects: &[(&str, Rect)]) -> HashMap<WidgetId, Rect> {
        rects.iter().map(|(id, r)| (WidgetId::from(*id), *r)).collect()
    }

    fn calc() -> HighlightCalculator {
        HighlightCalculator::new("c", HighlightConfig::default())
    }

    #[test]
    fn resizing_yields_nothing() {
        let tree = canvas(&["a"], LayoutDirection::Vertical);
        let m = measure(&[("c", Rect::new(0.0, 0.0, 400.0, 400.0))]);
        assert!(calc().calculate(&tree, &["a".into()], &m, true).is_empty());
    }

    #[test]
    fn empty_container_single_highlight() {
        let tree = canvas(&[], LayoutDirection::Vertical);
        let m = measure(&[("c", Rect::new(10.0, 10.0, 400.0, 300.0))]);
        let hs = calc().calculate(&tree, &["x".into()], &m, false);
        assert_eq!(hs.len(), 1);
        assert!(hs[0].is_new_layer);
        assert_eq!(hs[0].rect.w, 400.0);
        assert_eq!(hs[0].orientation, Orientation::Horizontal);
    }

    #[test]
    fn vertical_stack_bars() {
        let tree = canvas(&["a", "b"], LayoutDirection::Vertical);
        let m = measure(&[
            ("c", Rect::new(100.0, 100.0, 400.0, 400.0)),
            ("a", Rect::new(110.0, 110.0, 100.0, 40.0)),
            ("b", Rect::new(110.0, 160.0, 100.0, 40.0)),
        ]);
        let hs = calc().calculate(&tree, &["x".into()], &m, false);
        let horizontal: Vec<_> = hs.iter().filter(|h| !h.is_vertical()).collect();
        assert_eq!(horizontal.len(), 3);
        assert_eq!(horizontal[0].rect.y, 6.0);
        assert_eq!(horizontal[1].layer_index, 1);
        assert_eq!(horizontal[1].index, 1);
        assert_eq!(horizontal[2].layer_index, 2);
        assert_eq!(horizontal[2].rect.y, 100.0);

        // First layer: bar before "a", trailing bar, then end and center.
        let first: Vec<_> = hs
            .iter()
            .filter(|h| h.is_vertical() && h.layer_index == 0)
            .collect();
        assert_eq!(first[0].rect.x, 2.0);
        assert_eq!(first[1].rect.x, 110.0);
        assert_eq!(first[1].row_index, 1);
        assert!(first.iter().any(|h| h.alignment == Alignment::End));
    }

    #[test]
    fn dragged_layer_is_discounted() {
        let tree = canvas(&["a", "b"], LayoutDirection::Vertical);
        let m = measure(&[
            ("c", Rect::new(0.0, 0.0, 400.0, 400.0)),
            ("a", Rect::new(0.0, 0.0, 100.0, 40.0)),
            ("b", Rect::new(0.0, 50.0, 100.0, 40.0)),
        ]);
        let hs = calc().calculate(&tree, &["a".into()], &m, false);
        let horizontal: Vec<_> = hs.iter().filter(|h| !h.is_vertical()).collect();
        // One bar above "b" and the trailing bar.
        assert_eq!(horizontal.len(), 2);
        assert!(horizontal[0].is_new_layer);
        let above_b = horizontal.iter().find(|h| h.rect.y == 46.0).unwrap();
        assert_eq!(above_b.layer_index, 0);
        assert_eq!(hs.last().unwrap().layer_index, 1);
    }

    #[test]
    fn full_row_suppresses_empty_buckets() {
        let tree = canvas(&["a"], LayoutDirection::Horizontal);
        let m = measure(&[
            ("c", Rect::new(0.0, 0.0, 100.0, 50.0)),
            ("a", Rect::new(0.0, 0.0, 98.0, 50.0)),
        ]);
        let hs = calc().calculate(&tree, &["x".into()], &m, false);
        assert_eq!(hs.len(), 2);
        assert!(hs.iter().all(|h| h.alignment == Alignment::Start));
    }

    #[test]
    fn directional_bias() {
        let c = calc();
        let mk = |x: f64| HighlightInfo {
            is_new_layer: false,
            index: 0,
            layer_index: 0,
            row_index: 0,
            alignment: Alignment::Start,
            rect: Rect::new(x, 0.0, 4.0, 40.0),
            orientation: Orientation::Vertical,
            canvas_id: "c".into(),
        };
        let pos = Point::new(100.0, 10.0);
        let right = mk(130.0);
        let left = mk(60.0);
        let toward = c.distance(&right, pos, Some(Direction::Right));
        assert!(toward < c.distance(&left, pos, Some(Direction::Right)));
        assert!(c.distance(&right, pos, Some(Direction::Left)) > 2000.0);
        let sel = c
            .select(&[left.clone(), right.clone()], pos, Some(Direction::Left), false)
            .unwrap();
        assert_eq!(sel.selected, left);
        assert_eq!(sel.rest, vec![right]);
    }

    #[test]
    fn horizontal_drag_falls_back_to_last_horizontal_bar() {
        let tree = canvas(&["a"], LayoutDirection::Vertical);
        let m = measure(&[
            ("c", Rect::new(0.0, 0.0, 400.0, 400.0)),
            ("a", Rect::new(0.0, 0.0, 100.0, 40.0)),
        ]);
        let mut session = DragSession::new(calc(), vec!["x".into()]);
        session.recalculate(&tree, &m, false);
        let sel = session
            .highlight_drop_position(Point::new(50.0, 300.0), Some(Direction::Right))
            .unwrap();
        assert!(!sel.selected.is_vertical());
        assert_eq!(sel.selected.layer_index, 1);
        assert_eq!(session.drop_info(Point::zero()), Some(sel.selected));
        session.end();
        assert!(session.highlights().is_empty());
    }

    #[test]
    fn cached_container_rect() {
        let mut c = calc();
        let mut m = measure(&[("c", Rect::new(0.0, 0.0, 10.0, 10.0))]);
        assert_eq!(c.container_rect(&m).unwrap().w, 10.0);
        m.insert("c".into(), Rect::new(0.0, 0.0, 20.0, 10.0));
        assert_eq!(c.container_rect(&m).unwrap().w, 10.0);
        c.invalidate_container_rect();
        assert_eq!(c.container_rect(&m).unwrap().w, 20.0);
    }

    #[test]
    fn unmeasured_child_keeps_positions() {
        let tree = canvas(&["a", "b", "d"], LayoutDirection::Horizontal);
        let m = measure(&[
            ("c", Rect::new(0.0, 0.0, 400.0, 50.0)),
            ("a", Rect::new(0.0, 0.0, 50.0, 50.0)),
            ("d", Rect::new(120.0, 0.0, 50.0, 50.0)),
        ]);
        let hs = calc().calculate(&tree, &["x".into()], &m, false);
        let start: Vec<_> = hs
            .iter()
            .filter(|h| h.alignment == Alignment::Start)
            .map(|h| (h.index, h.row_index))
            .collect();
        // "b" is not on screen but still holds slot 1.
        assert_eq!(start, vec![(0, 0), (2, 2), (3, 3)]);
    }

    #[test]
    fn buckets_emit_start_end_center() {
        let tree = canvas(&["a"], LayoutDirection::Horizontal);
        let m = measure(&[
            ("c", Rect::new(0.0, 0.0, 400.0, 50.0)),
            ("a", Rect::new(0.0, 0.0, 100.0, 50.0)),
        ]);
        let hs = calc().calculate(&tree, &["x".into()], &m, false);
        let order: Vec<_> = hs.iter().map(|h| h.alignment).collect();
        assert_eq!(
            order,
            vec![Alignment::Start, Alignment::Start, Alignment::End, Alignment::Center]
        );
    }
}
