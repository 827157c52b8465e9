//! Geographic utilities (distance, projection, bounds support).

use crate::GpsPoint;

/// Earth radius in meters (mean radius).
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Calculate the haversine distance between two points in meters.
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let dlat = (p2.latitude - p1.latitude).to_radians();
    let dlon = (p2.longitude - p1.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Calculate the total distance of a point sequence in meters.
pub fn route_distance(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Result of projecting a point onto a segment.
#[derive(Debug, Clone, Copy)]
pub struct SegmentProjection {
    /// Closest point on the segment
    pub point: GpsPoint,
    /// Geodesic distance from the query point to the closest point, in meters
    pub distance_m: f64,
    /// Position along the segment, clamped to [0, 1]
    pub t: f64,
}

/// Project a point onto the segment `a`-`b`.
///
/// The projection is computed in a local equirectangular plane (longitude
/// scaled by cos(latitude)), which is accurate at the path-network scales
/// this crate works with; the reported distance is geodesic.
pub fn project_onto_segment(p: &GpsPoint, a: &GpsPoint, b: &GpsPoint) -> SegmentProjection {
    let ref_lat = ((a.latitude + b.latitude) / 2.0).to_radians();
    let scale = ref_lat.cos();

    let ax = a.longitude * scale;
    let ay = a.latitude;
    let bx = b.longitude * scale;
    let by = b.latitude;
    let px = p.longitude * scale;
    let py = p.latitude;

    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;

    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0)
    };

    let closest = GpsPoint::new(a.latitude + t * (b.latitude - a.latitude), a.longitude + t * (b.longitude - a.longitude));
    let distance_m = haversine_distance(p, &closest);

    SegmentProjection {
        point: closest,
        distance_m,
        t,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        // London to Paris, roughly 344 km
        let london = GpsPoint::new(51.5074, -0.1278);
        let paris = GpsPoint::new(48.8566, 2.3522);
        let d = haversine_distance(&london, &paris);
        assert!(d > 330_000.0 && d < 360_000.0);
    }

    #[test]
    fn test_haversine_zero() {
        let p = GpsPoint::new(54.4539, -3.2117);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_route_distance_monotonic() {
        let points = vec![
            GpsPoint::new(54.0, -3.0),
            GpsPoint::new(54.01, -3.0),
            GpsPoint::new(54.02, -3.0),
        ];
        let full = route_distance(&points);
        let half = route_distance(&points[..2]);
        assert!(full > half);
        assert!(half > 1_000.0); // 0.01 deg lat is ~1.1 km
    }

    #[test]
    fn test_project_onto_segment_midpoint() {
        let a = GpsPoint::new(54.0, -3.0);
        let b = GpsPoint::new(54.0, -2.9);
        let p = GpsPoint::new(54.001, -2.95);

        let proj = project_onto_segment(&p, &a, &b);
        assert!((proj.t - 0.5).abs() < 0.01);
        // ~111 m north of the segment
        assert!(proj.distance_m > 80.0 && proj.distance_m < 150.0);
    }

    #[test]
    fn test_project_onto_segment_clamps_to_endpoint() {
        let a = GpsPoint::new(54.0, -3.0);
        let b = GpsPoint::new(54.0, -2.9);
        let p = GpsPoint::new(54.0, -3.1); // west of a

        let proj = project_onto_segment(&p, &a, &b);
        assert_eq!(proj.t, 0.0);
        assert!((proj.point.longitude - a.longitude).abs() < 1e-9);
    }

    #[test]
    fn test_project_degenerate_segment() {
        let a = GpsPoint::new(54.0, -3.0);
        let p = GpsPoint::new(54.001, -3.0);
        let proj = project_onto_segment(&p, &a, &a);
        assert_eq!(proj.t, 0.0);
        assert!(proj.distance_m > 100.0 && proj.distance_m < 120.0);
    }
}
