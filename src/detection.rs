use geo::{Area, Centroid, LineString, Polygon};
use nalgebra::Point2;

/// A single sensor observation of a candidate object in one frame.
///
/// Detections are produced by the sensor pipeline and never modified by the trackers.
///
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    class_id: i32,
    center: Point2<f32>,
    corners: [(f32, f32); 4],
}

impl Detection {
    /// Creates a detection from the sensor-reported center and bounding quad
    ///
    /// # Parameters
    /// * `class_id` - class reported by the sensor classifier
    /// * `center_x`, `center_y` - object center in sensor units
    /// * `corners` - bounding quad corners in the order reported by the sensor
    ///
    pub fn new(class_id: i32, center_x: f32, center_y: f32, corners: [(f32, f32); 4]) -> Self {
        Self {
            class_id,
            center: Point2::new(center_x, center_y),
            corners,
        }
    }

    /// Creates a detection with a collapsed quad, all corners are located at the center
    ///
    pub fn point(class_id: i32, center_x: f32, center_y: f32) -> Self {
        Self::new(class_id, center_x, center_y, [(center_x, center_y); 4])
    }

    /// Creates a detection when only the quad is known; the center is the quad centroid.
    ///
    /// Degenerate quads (zero area) fall back to the mean of the corners.
    ///
    pub fn from_corners(class_id: i32, corners: [(f32, f32); 4]) -> Self {
        let center = quad(&corners)
            .centroid()
            .map(|c| Point2::new(c.x(), c.y()))
            .filter(|c| c.x.is_finite() && c.y.is_finite())
            .unwrap_or_else(|| {
                let (sx, sy) = corners
                    .iter()
                    .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
                Point2::new(sx / 4.0, sy / 4.0)
            });

        Self {
            class_id,
            center,
            corners,
        }
    }

    pub fn class_id(&self) -> i32 {
        self.class_id
    }

    pub fn center(&self) -> Point2<f32> {
        self.center
    }

    pub fn center_x(&self) -> f32 {
        self.center.x
    }

    pub fn center_y(&self) -> f32 {
        self.center.y
    }

    pub fn corners(&self) -> &[(f32, f32); 4] {
        &self.corners
    }

    /// Unsigned area of the bounding quad
    ///
    pub fn area(&self) -> f32 {
        quad(&self.corners).unsigned_area()
    }
}

fn quad(corners: &[(f32, f32); 4]) -> Polygon<f32> {
    Polygon::new(LineString::from(corners.to_vec()), vec![])
}

#[cfg(test)]
mod tests {
    use crate::detection::Detection;
    use crate::EPS;

    #[test]
    fn centroid_of_quad() {
        let d = Detection::from_corners(3, [(0.0, 0.0), (4.0, 0.0), (4.0, 2.0), (0.0, 2.0)]);
        assert_eq!(d.class_id(), 3);
        assert!((d.center_x() - 2.0).abs() < EPS);
        assert!((d.center_y() - 1.0).abs() < EPS);
        assert!((d.area() - 8.0).abs() < EPS);
    }

    #[test]
    fn degenerate_quad() {
        let d = Detection::from_corners(1, [(1.0, 1.0), (3.0, 3.0), (1.0, 1.0), (3.0, 3.0)]);
        assert!((d.center_x() - 2.0).abs() < EPS);
        assert!((d.center_y() - 2.0).abs() < EPS);
        assert!(d.area().abs() < EPS);
    }

    #[test]
    fn point_detection() {
        let d = Detection::point(1, 5.0, 3.0);
        assert_eq!(d.center_x(), 5.0);
        assert_eq!(d.center_y(), 3.0);
        assert_eq!(d.corners(), &[(5.0, 3.0); 4]);
    }
}
