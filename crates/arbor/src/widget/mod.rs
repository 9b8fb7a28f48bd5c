//! Widget records and the copy-on-write widget arena.

/// Widget identifiers.
mod id;
/// Widget tree arena.
mod tree;

use serde::{Deserialize, Serialize};

pub use id::WidgetId;
pub use tree::{TreeViolation, WidgetTree};

use crate::layout::FlexLayer;

/// Widget id of the root canvas.
pub const MAIN_CONTAINER_ID: &str = "0";
/// Widget type of canvases, which own flex layers directly.
pub const CANVAS_WIDGET: &str = "CANVAS_WIDGET";
/// Widget type of bordered containers wrapping a canvas.
pub const CONTAINER_WIDGET: &str = "CONTAINER_WIDGET";

/// Responsive sizing mode along the main axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResponsiveBehavior {
    /// Grow to consume available space.
    Fill,
    /// Size to content.
    #[default]
    Hug,
}

/// Direction of a layout container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayoutDirection {
    /// Children stack in rows (flex layers).
    Vertical,
    /// Children sit in a single aligned row.
    Horizontal,
}

/// Grid position in abstract row/column units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridPosition {
    /// First occupied row.
    pub top_row: i32,
    /// Row just past the last occupied row.
    pub bottom_row: i32,
    /// First occupied column.
    pub left_column: i32,
    /// Column just past the last occupied column.
    pub right_column: i32,
}

impl GridPosition {
    /// Construct a position from its four edges.
    pub fn new(top_row: i32, bottom_row: i32, left_column: i32, right_column: i32) -> Self {
        Self {
            top_row,
            bottom_row,
            left_column,
            right_column,
        }
    }

    /// Height in rows.
    pub fn rows(&self) -> i32 {
        self.bottom_row - self.top_row
    }

    /// Width in columns.
    pub fn columns(&self) -> i32 {
        self.right_column - self.left_column
    }
}

/// A node in the widget tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    /// Unique widget id.
    pub widget_id: WidgetId,
    /// Display name, also the entity name used by bindings.
    #[serde(default)]
    pub widget_name: String,
    /// Widget type tag, e.g. `CANVAS_WIDGET`.
    #[serde(rename = "type")]
    pub widget_type: String,
    /// Parent widget; `None` only for the root.
    #[serde(default)]
    pub parent_id: Option<WidgetId>,
    /// Ordered children.
    #[serde(default)]
    pub children: Vec<WidgetId>,
    /// Grid position.
    #[serde(flatten)]
    pub position: GridPosition,
    /// Responsive sizing mode.
    #[serde(default)]
    pub responsive_behavior: ResponsiveBehavior,
    /// Layout direction for auto-layout containers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<LayoutDirection>,
    /// Flex layers for auto-layout canvases.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flex_layers: Vec<FlexLayer>,
}

impl Widget {
    /// Construct a hug widget with no children.
    pub fn new(id: impl Into<WidgetId>, widget_type: impl Into<String>) -> Self {
        let widget_id = id.into();
        Self {
            widget_name: widget_id.to_string(),
            widget_id,
            widget_type: widget_type.into(),
            parent_id: None,
            children: Vec::new(),
            position: GridPosition::default(),
            responsive_behavior: ResponsiveBehavior::Hug,
            direction: None,
            flex_layers: Vec::new(),
        }
    }

    /// True if the widget is a canvas.
    pub fn is_canvas(&self) -> bool {
        self.widget_type == CANVAS_WIDGET
    }

    /// True if the widget has fill sizing.
    pub fn is_fill(&self) -> bool {
        self.responsive_behavior == ResponsiveBehavior::Fill
    }

    /// True if this widget lays out its children as a vertical stack of
    /// flex layers. Only an explicit horizontal direction opts out, and the
    /// main container is always a vertical stack.
    pub fn is_vertical_stack(&self) -> bool {
        self.widget_id == MAIN_CONTAINER_ID || self.direction != Some(LayoutDirection::Horizontal)
    }
}
