//! Planar geometry helpers shared by projection and decomposition.
//!
//! All coordinates are `geo::Point<f64>` in a local metric projection, so
//! Euclidean distances are meters.

use crate::units::Meters;
use geo::line_measures::Distance;
use geo::{Euclidean, Point};

/// Euclidean distance between two points.
pub fn distance(a: Point<f64>, b: Point<f64>) -> Meters {
    Meters(Euclidean.distance(a, b))
}

/// Result of projecting a point onto a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentProjection {
    /// Closest point on the segment (the foot point).
    pub foot: Point<f64>,
    /// Position of the foot along the segment, clamped to `[0, 1]`
    /// (0 = segment start, 1 = segment end).
    pub param: f64,
    /// Distance from the query point to the foot point.
    pub distance: Meters,
}

/// Project `p` onto the segment from `a` to `b`.
///
/// The foot point is clamped to the segment, so the result is the closest
/// point on the segment itself, never on its infinite extension. A
/// zero-length segment is treated as the single point `a` (param 0).
pub fn project_point_to_segment(p: Point<f64>, a: Point<f64>, b: Point<f64>) -> SegmentProjection {
    let vx = b.x() - a.x();
    let vy = b.y() - a.y();
    let len2 = vx * vx + vy * vy;

    if len2 < 1e-24 {
        return SegmentProjection {
            foot: a,
            param: 0.0,
            distance: distance(p, a),
        };
    }

    let wx = p.x() - a.x();
    let wy = p.y() - a.y();
    let param = ((wx * vx + wy * vy) / len2).clamp(0.0, 1.0);
    let foot = Point::new(a.x() + param * vx, a.y() + param * vy);

    SegmentProjection {
        foot,
        param,
        distance: distance(p, foot),
    }
}

/// Angle in degrees at vertex `at` between the rays `at -> p` and `at -> q`.
///
/// Returns a value in `[0, 180]`; two segments continuing straight through
/// `at` yield 180. Degenerate rays (zero length) yield 0.
pub fn angle_between_deg(at: Point<f64>, p: Point<f64>, q: Point<f64>) -> f64 {
    let ux = p.x() - at.x();
    let uy = p.y() - at.y();
    let vx = q.x() - at.x();
    let vy = q.y() - at.y();

    let nu = (ux * ux + uy * uy).sqrt();
    let nv = (vx * vx + vy * vy).sqrt();
    if nu < 1e-12 || nv < 1e-12 {
        return 0.0;
    }

    let cos = ((ux * vx + uy * vy) / (nu * nv)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((distance(a, b).value() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_projection_interior() {
        let proj = project_point_to_segment(
            Point::new(5.0, 3.0),
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
        );
        assert!((proj.param - 0.5).abs() < 1e-12);
        assert!((proj.foot.x() - 5.0).abs() < 1e-12);
        assert!((proj.foot.y()).abs() < 1e-12);
        assert!((proj.distance.value() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_projection_clamps_to_endpoints() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 0.0);

        let before = project_point_to_segment(Point::new(-4.0, 3.0), a, b);
        assert_eq!(before.param, 0.0);
        assert!((before.distance.value() - 5.0).abs() < 1e-12);

        let after = project_point_to_segment(Point::new(14.0, 3.0), a, b);
        assert_eq!(after.param, 1.0);
        assert!((after.distance.value() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_projection_zero_length_segment() {
        let a = Point::new(2.0, 2.0);
        let proj = project_point_to_segment(Point::new(5.0, 6.0), a, a);
        assert_eq!(proj.param, 0.0);
        assert!((proj.distance.value() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_angle_straight_through() {
        let angle = angle_between_deg(
            Point::new(0.0, 0.0),
            Point::new(-10.0, 0.0),
            Point::new(10.0, 0.0),
        );
        assert!((angle - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_angle_perpendicular() {
        let angle = angle_between_deg(
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
        );
        assert!((angle - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_angle_degenerate_ray() {
        let at = Point::new(1.0, 1.0);
        assert_eq!(angle_between_deg(at, at, Point::new(5.0, 5.0)), 0.0);
    }
}
