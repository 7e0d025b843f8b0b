//! Geometry shared by the table detector and the page image inventory.
//!
//! The table detector reports boxes in PDF user space (origin bottom-left,
//! y grows upward). Image placements use the raster frame (origin top-left,
//! y grows downward). [`unify`] maps the former onto the latter so the two can
//! be compared directly.

use crate::error::{Error, Result};
use serde::Serialize;

/// Axis-aligned rectangle `(x1, y1, x2, y2)`.
///
/// A `Rect` carries no frame of its own; callers know which frame it is in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Rect {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Reorder corners so that `x1 <= x2` and `y1 <= y2`.
    pub fn normalized(self) -> Self {
        Self {
            x1: self.x1.min(self.x2),
            y1: self.y1.min(self.y2),
            x2: self.x1.max(self.x2),
            y2: self.y1.max(self.y2),
        }
    }

    /// Shift by `(dx, dy)`.
    pub fn translated(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x1 + dx, self.y1 + dy, self.x2 + dx, self.y2 + dy)
    }

    /// Smallest rectangle containing every point.
    pub fn bounding(points: &[(f64, f64)]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut rect = Rect::new(first.0, first.1, first.0, first.1);
        for &(x, y) in rest {
            rect.x1 = rect.x1.min(x);
            rect.y1 = rect.y1.min(y);
            rect.x2 = rect.x2.max(x);
            rect.y2 = rect.y2.max(y);
        }
        Some(rect)
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }

    /// True when the rectangle encloses no area.
    pub fn is_empty(&self) -> bool {
        self.x1 >= self.x2 || self.y1 >= self.y2
    }

    /// Non-empty overlap test.
    ///
    /// Rectangles that only share an edge do not intersect, and an empty
    /// rectangle intersects nothing.
    pub fn intersects(&self, other: &Rect) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.x1 < other.x2 && other.x1 < self.x2 && self.y1 < other.y2 && other.y1 < self.y2
    }

    /// Approximate equality used by tests and round-trip checks.
    pub fn approx_eq(&self, other: &Rect, tolerance: f64) -> bool {
        (self.x1 - other.x1).abs() <= tolerance
            && (self.y1 - other.y1).abs() <= tolerance
            && (self.x2 - other.x2).abs() <= tolerance
            && (self.y2 - other.y2).abs() <= tolerance
    }
}

impl From<[f64; 4]> for Rect {
    fn from(value: [f64; 4]) -> Self {
        Rect::new(value[0], value[1], value[2], value[3])
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:.2}, {:.2}, {:.2}, {:.2})",
            self.x1, self.y1, self.x2, self.y2
        )
    }
}

/// Reject page heights that cannot anchor a vertical flip.
pub fn check_page_height(page_height: f64) -> Result<()> {
    if !page_height.is_finite() || page_height <= 0.0 {
        return Err(Error::InputGeometry {
            reason: format!("page height must be positive, got {}", page_height),
        });
    }
    Ok(())
}

/// Mirror a rectangle vertically within a page of the given height.
///
/// The flip is its own inverse; the result is normalized.
fn flip(rect: Rect, page_height: f64) -> Rect {
    Rect::new(rect.x1, page_height - rect.y2, rect.x2, page_height - rect.y1).normalized()
}

/// Convert a detector box (bottom-left origin) into the top-left frame used
/// by image placements.
///
/// `(x1, y1, x2, y2)` becomes `(x1, H - y2, x2, H - y1)`, with corners
/// normalized so `y1 <= y2` holds whatever order the detector used.
pub fn unify(bbox: Rect, page_height: f64) -> Result<Rect> {
    check_page_height(page_height)?;
    if !bbox.is_finite() {
        return Err(Error::InputGeometry {
            reason: format!("cell box has non-finite coordinates: {}", bbox),
        });
    }
    Ok(flip(bbox.normalized(), page_height))
}

/// Inverse of [`unify`]: map a top-left-frame rectangle back to the
/// detector's bottom-left frame.
pub fn to_detector_frame(rect: Rect, page_height: f64) -> Result<Rect> {
    check_page_height(page_height)?;
    if !rect.is_finite() {
        return Err(Error::InputGeometry {
            reason: format!("rectangle has non-finite coordinates: {}", rect),
        });
    }
    Ok(flip(rect.normalized(), page_height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_unify_flips_vertical_axis() {
        let bbox = Rect::new(50.0, 600.0, 150.0, 700.0);
        let unified = unify(bbox, 792.0).unwrap();
        assert_eq!(unified, Rect::new(50.0, 92.0, 150.0, 192.0));
    }

    #[test]
    fn test_unify_normalizes_inverted_corners() {
        // Detector handed the box top-down
        let bbox = Rect::new(150.0, 700.0, 50.0, 600.0);
        let unified = unify(bbox, 792.0).unwrap();
        assert!(unified.y1 <= unified.y2);
        assert!(unified.x1 <= unified.x2);
        assert_eq!(unified, Rect::new(50.0, 92.0, 150.0, 192.0));
    }

    #[rstest]
    #[case(Rect::new(10.0, 20.0, 30.0, 40.0), 100.0)]
    #[case(Rect::new(0.0, 0.0, 612.0, 792.0), 792.0)]
    #[case(Rect::new(72.125, 301.5, 190.75, 333.25), 841.89)]
    #[case(Rect::new(5.0, 90.0, 6.0, 120.0), 100.0)]
    fn test_round_trip_recovers_bbox(#[case] bbox: Rect, #[case] height: f64) {
        let unified = unify(bbox, height).unwrap();
        let back = to_detector_frame(unified, height).unwrap();
        assert!(back.approx_eq(&bbox, 1e-9), "{} != {}", back, bbox);
    }

    #[rstest]
    #[case(0.0)]
    #[case(-10.0)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    fn test_unify_rejects_bad_page_height(#[case] height: f64) {
        let result = unify(Rect::new(0.0, 0.0, 10.0, 10.0), height);
        assert!(matches!(result, Err(Error::InputGeometry { .. })));
    }

    #[test]
    fn test_unify_rejects_non_finite_bbox() {
        let result = unify(Rect::new(0.0, f64::NAN, 10.0, 10.0), 100.0);
        assert!(matches!(result, Err(Error::InputGeometry { .. })));
    }

    #[test]
    fn test_intersects_requires_area() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&a));
        assert!(a.intersects(&Rect::new(9.0, 9.0, 20.0, 20.0)));
        // Shared edge only
        assert!(!a.intersects(&Rect::new(10.0, 0.0, 20.0, 10.0)));
        // Disjoint
        assert!(!a.intersects(&Rect::new(11.0, 11.0, 20.0, 20.0)));
        // Degenerate
        assert!(!a.intersects(&Rect::new(5.0, 5.0, 5.0, 8.0)));
    }

    #[test]
    fn test_intersects_is_not_containment() {
        let cell = Rect::new(0.0, 0.0, 10.0, 10.0);
        let image = Rect::new(-5.0, -5.0, 3.0, 3.0);
        assert!(cell.intersects(&image));
        assert!(image.intersects(&cell));
    }

    #[test]
    fn test_bounding() {
        let rect = Rect::bounding(&[(3.0, 4.0), (-1.0, 8.0), (2.0, -2.0)]).unwrap();
        assert_eq!(rect, Rect::new(-1.0, -2.0, 3.0, 8.0));
        assert!(Rect::bounding(&[]).is_none());
    }
}
