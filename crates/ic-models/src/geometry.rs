//! Bounding boxes and the planar geometry used for attribution.
//!
//! All boxes share one frame of reference (pixels or normalized units);
//! nothing here converts between the two.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for geometry operations.
pub type GeometryResult<T> = Result<T, GeometryError>;

/// Errors raised for malformed box tuples.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("Bounding box needs {expected} coordinates, got {found}")]
    Arity { expected: usize, found: usize },

    #[error("Bounding box coordinate is not finite: {0}")]
    NonFinite(f64),
}

/// A point in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box in `(top, left, bottom, right)` order.
///
/// `top < bottom` and `left < right` are the producer's responsibility and
/// are not checked here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: f64,
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
}

impl BoundingBox {
    /// Number of coordinates in a box tuple.
    pub const ARITY: usize = 4;

    /// Create a new bounding box.
    pub fn new(top: f64, left: f64, bottom: f64, right: f64) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    /// Build a box from a `(top, left, bottom, right)` slice.
    pub fn from_slice(coords: &[f64]) -> GeometryResult<Self> {
        let [top, left, bottom, right] = coords else {
            return Err(GeometryError::Arity {
                expected: Self::ARITY,
                found: coords.len(),
            });
        };
        let bbox = Self::new(*top, *left, *bottom, *right);
        bbox.check_finite()?;
        Ok(bbox)
    }

    /// Fail on the first NaN or infinite coordinate.
    pub fn check_finite(&self) -> GeometryResult<()> {
        match self.to_array().into_iter().find(|c| !c.is_finite()) {
            Some(bad) => Err(GeometryError::NonFinite(bad)),
            None => Ok(()),
        }
    }

    /// Convert from the detector-native `(left, top, width, height)` form.
    pub fn from_xywh(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            bottom: top + height,
            right: left + width,
        }
    }

    /// Coordinates in `(top, left, bottom, right)` order.
    pub fn to_array(&self) -> [f64; 4] {
        [self.top, self.left, self.bottom, self.right]
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// Center of the box.
    #[inline]
    pub fn center(&self) -> Point {
        center(self)
    }
}

/// Center of a single box: `((left + right) / 2, (top + bottom) / 2)`.
pub fn center(bbox: &BoundingBox) -> Point {
    Point {
        x: (bbox.left + bbox.right) / 2.0,
        y: (bbox.top + bbox.bottom) / 2.0,
    }
}

/// Mean of the box centers, or `None` for an empty slice.
pub fn centroid(boxes: &[BoundingBox]) -> Option<Point> {
    if boxes.is_empty() {
        return None;
    }

    let n = boxes.len() as f64;
    let (sum_x, sum_y) = boxes
        .iter()
        .map(center)
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));

    Some(Point::new(sum_x / n, sum_y / n))
}

/// Euclidean distance between two points.
pub fn distance(a: Point, b: Point) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 20.0);
        assert_eq!(center(&bbox), Point::new(10.0, 5.0));
        assert_eq!(bbox.center(), Point::new(10.0, 5.0));
    }

    #[test]
    fn test_centroid_of_many() {
        let boxes = [
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            BoundingBox::new(10.0, 10.0, 20.0, 20.0),
        ];
        assert_eq!(centroid(&boxes), Some(Point::new(10.0, 10.0)));
    }

    #[test]
    fn test_centroid_empty_is_none() {
        assert_eq!(centroid(&[]), None);
    }

    #[test]
    fn test_distance() {
        assert_eq!(distance(Point::new(0.0, 0.0), Point::new(3.0, 4.0)), 5.0);
        assert_eq!(distance(Point::new(1.5, 1.5), Point::new(1.5, 1.5)), 0.0);
    }

    #[test]
    fn test_from_slice_arity() {
        assert_eq!(
            BoundingBox::from_slice(&[1.0, 2.0, 3.0]),
            Err(GeometryError::Arity {
                expected: 4,
                found: 3
            })
        );
        assert_eq!(
            BoundingBox::from_slice(&[1.0, 2.0, 3.0, 4.0]).unwrap(),
            BoundingBox::new(1.0, 2.0, 3.0, 4.0)
        );
    }

    #[test]
    fn test_from_slice_rejects_nan() {
        assert!(matches!(
            BoundingBox::from_slice(&[1.0, f64::NAN, 3.0, 4.0]),
            Err(GeometryError::NonFinite(_))
        ));
    }

    #[test]
    fn test_check_finite() {
        assert!(BoundingBox::new(0.0, 1.0, 2.0, 3.0).check_finite().is_ok());
        assert!(BoundingBox::new(0.0, f64::INFINITY, 2.0, 3.0)
            .check_finite()
            .is_err());
    }

    #[test]
    fn test_from_xywh() {
        let bbox = BoundingBox::from_xywh(0.25, 0.1, 0.5, 0.2);
        assert_eq!(bbox.top, 0.1);
        assert_eq!(bbox.left, 0.25);
        assert!((bbox.bottom - 0.3).abs() < 1e-12);
        assert!((bbox.right - 0.75).abs() < 1e-12);
    }
}
