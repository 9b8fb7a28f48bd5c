use serde::{Deserialize, Serialize};

use super::{Error, Point, Result};

/// A rectangle in pixel coordinates, anchored at its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    #[serde(rename = "width")]
    pub w: f64,
    /// Height.
    #[serde(rename = "height")]
    pub h: f64,
}

impl Rect {
    /// Construct a rectangle. Negative extents are accepted as-is; use
    /// [`Rect::try_new`] to reject them.
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Construct a rectangle, failing on negative or non-finite extents.
    pub fn try_new(x: f64, y: f64, w: f64, h: f64) -> Result<Self> {
        if !(x.is_finite() && y.is_finite() && w.is_finite() && h.is_finite()) {
            return Err(Error::Geometry(format!(
                "non-finite rect: ({x}, {y}, {w}, {h})"
            )));
        }
        if w < 0.0 || h < 0.0 {
            return Err(Error::Geometry(format!("negative extent: {w}x{h}")));
        }
        Ok(Self { x, y, w, h })
    }

    /// The zero rectangle at the origin.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Top-left corner.
    pub fn tl(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Right edge.
    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// True if `y` falls within the vertical span of the rect, edges included.
    pub fn spans_y(&self, y: f64) -> bool {
        y >= self.y && y <= self.bottom()
    }

    /// True if the point falls inside the rect, edges included.
    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && self.spans_y(p.y)
    }

    /// Express this rect relative to an origin point.
    pub fn relative_to(&self, origin: Point) -> Self {
        Self {
            x: self.x - origin.x,
            y: self.y - origin.y,
            w: self.w,
            h: self.h,
        }
    }

    /// The smallest rect enclosing both rects.
    pub fn union(&self, other: &Self) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let r = self.right().max(other.right());
        let b = self.bottom().max(other.bottom());
        Self {
            x,
            y,
            w: r - x,
            h: b - y,
        }
    }
}
