use std::collections::BTreeMap;

use arbor_geom::Rect;

use super::Measure;
use crate::widget::{WidgetId, WidgetTree};

/// Measures widgets from their grid positions instead of a live screen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridMeasure {
    /// Rectangles by widget.
    rects: BTreeMap<WidgetId, Rect>,
}

impl GridMeasure {
    /// Measure every widget in `tree`.
    pub fn new(tree: &WidgetTree, column_width: f64, row_height: f64) -> Self {
        Self {
            rects: grid_rects(tree, column_width, row_height),
        }
    }

    /// All measured rectangles.
    pub fn rects(&self) -> &BTreeMap<WidgetId, Rect> {
        &self.rects
    }
}

impl Measure for GridMeasure {
    fn bounding_rect(&self, id: &WidgetId) -> Option<Rect> {
        self.rects.get(id).copied()
    }
}

/// Rectangles for every widget, one column `column_width` pixels wide and
/// one row `row_height` pixels tall. Children are offset by their parent.
/// Widgets with no rows get the height of their content.
fn grid_rects(tree: &WidgetTree, column_width: f64, row_height: f64) -> BTreeMap<WidgetId, Rect> {
    let mut out = BTreeMap::new();
    let roots: Vec<&WidgetId> = tree
        .iter()
        .filter(|w| w.parent_id.as_ref().is_none_or(|p| !tree.contains(p)))
        .map(|w| &w.widget_id)
        .collect();
    let mut stack: Vec<(&WidgetId, f64, f64)> = roots.into_iter().map(|id| (id, 0.0, 0.0)).collect();
    while let Some((id, ox, oy)) = stack.pop() {
        let Some(w) = tree.get(id) else {
            continue;
        };
        let p = w.position;
        let x = ox + f64::from(p.left_column) * column_width;
        let y = oy + f64::from(p.top_row) * row_height;
        let content = w
            .children
            .iter()
            .filter_map(|c| tree.get(c))
            .map(|c| c.position.bottom_row)
            .max()
            .unwrap_or(0);
        let rows = if p.rows() > 0 { p.rows() } else { content };
        out.insert(
            id.clone(),
            Rect::new(x, y, f64::from(p.columns()) * column_width, f64::from(rows) * row_height),
        );
        for c in &w.children {
            stack.push((c, x, y));
        }
    }
    out
}
