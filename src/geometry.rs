//! Geometry and visibility checks
//!
//! Pure functions answering "is this element visible in the current viewport"
//! and "what are its pixel bounds". Everything else in the crate builds on
//! these.

use crate::dom::ComputedStyle;
use serde::{Deserialize, Serialize};

/// A rendered box in CSS pixels, relative to the viewport origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// True when the box has a positive rendered area.
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// Shift the box by the given offset (document -> viewport coordinates).
    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Partial overlap with the viewport counts as intersecting.
    pub fn intersects(&self, viewport: &Viewport) -> bool {
        self.top() < viewport.height
            && self.bottom() > 0.0
            && self.left() < viewport.width
            && self.right() > 0.0
    }
}

/// Visible window dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1280.0, 720.0)
    }
}

/// Whole-pixel rectangle reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Bounds {
    pub fn from_rect(rect: &Rect) -> Self {
        Self {
            x: round_half_up(rect.x),
            y: round_half_up(rect.y),
            width: round_half_up(rect.width),
            height: round_half_up(rect.height),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// Rounds like the DOM's `Math.round`: halves go toward positive infinity.
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Style-level visibility: rendered, not hidden, not fully transparent.
pub fn is_style_visible(style: &ComputedStyle) -> bool {
    style.display != "none" && style.visibility != "hidden" && !is_zero_opacity(&style.opacity)
}

/// Cheap subtree short-circuit used by the traversal.
pub fn is_style_hidden(style: &ComputedStyle) -> bool {
    style.display == "none" || style.visibility == "hidden"
}

fn is_zero_opacity(opacity: &str) -> bool {
    match opacity.trim().parse::<f64>() {
        Ok(value) => value == 0.0,
        Err(_) => false,
    }
}

/// An element is visible when its style allows rendering, its box has area,
/// and the box intersects the viewport.
///
/// Elements without a layout box are never visible.
pub fn is_visible(style: Option<&ComputedStyle>, rect: Option<&Rect>, viewport: &Viewport) -> bool {
    let (Some(style), Some(rect)) = (style, rect) else {
        return false;
    };

    is_style_visible(style) && rect.has_area() && rect.intersects(viewport)
}

/// Integer bounds of a layout box, zero-sized when the element has none.
pub fn bounds_of(rect: Option<&Rect>) -> Bounds {
    rect.map(Bounds::from_rect).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style() -> ComputedStyle {
        ComputedStyle::default()
    }

    #[test]
    fn test_visible_inside_viewport() {
        let viewport = Viewport::new(1024.0, 768.0);
        let rect = Rect::new(0.0, 0.0, 100.0, 30.0);
        assert!(is_visible(Some(&style()), Some(&rect), &viewport));
    }

    #[test]
    fn test_partial_intersection_counts() {
        let viewport = Viewport::new(1024.0, 768.0);
        let rect = Rect::new(-50.0, 740.0, 100.0, 50.0);
        assert!(is_visible(Some(&style()), Some(&rect), &viewport));
    }

    #[test]
    fn test_outside_viewport_is_not_visible() {
        let viewport = Viewport::new(1024.0, 768.0);
        let above = Rect::new(0.0, -100.0, 100.0, 50.0);
        let below = Rect::new(0.0, 800.0, 100.0, 50.0);
        let touching = Rect::new(0.0, 768.0, 100.0, 50.0);
        assert!(!is_visible(Some(&style()), Some(&above), &viewport));
        assert!(!is_visible(Some(&style()), Some(&below), &viewport));
        assert!(!is_visible(Some(&style()), Some(&touching), &viewport));
    }

    #[test]
    fn test_style_rules() {
        let viewport = Viewport::new(1024.0, 768.0);
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);

        let mut hidden = style();
        hidden.visibility = "hidden".to_string();
        assert!(!is_visible(Some(&hidden), Some(&rect), &viewport));

        let mut none = style();
        none.display = "none".to_string();
        assert!(!is_visible(Some(&none), Some(&rect), &viewport));

        let mut transparent = style();
        transparent.opacity = "0".to_string();
        assert!(!is_visible(Some(&transparent), Some(&rect), &viewport));

        let mut faint = style();
        faint.opacity = "0.01".to_string();
        assert!(is_visible(Some(&faint), Some(&rect), &viewport));
    }

    #[test]
    fn test_zero_area_and_missing_layout() {
        let viewport = Viewport::new(1024.0, 768.0);
        let flat = Rect::new(0.0, 0.0, 100.0, 0.0);
        assert!(!is_visible(Some(&style()), Some(&flat), &viewport));
        assert!(!is_visible(Some(&style()), None, &viewport));
        assert!(!is_visible(None, Some(&Rect::new(0.0, 0.0, 5.0, 5.0)), &viewport));
    }

    #[test]
    fn test_bounds_rounding_matches_dom() {
        let bounds = Bounds::from_rect(&Rect::new(10.5, -0.5, 199.4, 39.6));
        assert_eq!(
            bounds,
            Bounds {
                x: 11,
                y: 0,
                width: 199,
                height: 40
            }
        );
        assert_eq!(bounds_of(None), Bounds::default());
    }
}
