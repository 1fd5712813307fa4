//! # Geographic Utilities
//!
//! Distance and interpolation primitives shared by the interpolator, the
//! similarity test and the median synthesizer.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance_km`] | Great-circle distance between two GPS points, in km |
//! | [`polyline_length_km`] | Total length of a polyline in km |
//! | [`cumulative_distances_km`] | Running arc length at every vertex |
//! | [`lerp_point`] | Linear interpolation between two points, antimeridian-aware |
//!
//! ## Algorithm Notes
//!
//! The haversine formula treats the Earth as a sphere (mean radius 6,371 km).
//! For the short spans a hand-drawn route covers this is well within a meter
//! of the ellipsoidal distance up to ~100 km. Within a single segment, points
//! are placed by linear interpolation of the coordinates, which matches the
//! straight segments drawn on a Web Mercator map at these scales.
//!
//! All functions expect WGS84 coordinates (latitude/longitude in degrees).

use geo::{Distance, Haversine, Point};

use crate::GpsPoint;

/// Calculate the great-circle distance between two GPS points in kilometers.
///
/// # Example
///
/// ```rust
/// use route_clusterer::{GpsPoint, geo_utils};
///
/// let a = GpsPoint::new(0.0, 0.0);
/// let b = GpsPoint::new(1.0, 0.0);
///
/// let distance = geo_utils::haversine_distance_km(&a, &b);
/// assert!((distance - 111.2).abs() < 0.5); // one degree of latitude
/// ```
#[inline]
pub fn haversine_distance_km(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2) / 1000.0
}

/// Calculate the total length of a polyline in kilometers.
///
/// Empty or single-point polylines return 0.0.
pub fn polyline_length_km(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance_km(&w[0], &w[1]))
        .sum()
}

/// Running arc length (km) at each vertex of a polyline.
///
/// The first entry is always 0.0 and the last is the total length.
pub fn cumulative_distances_km(points: &[GpsPoint]) -> Vec<f64> {
    let mut cumulative = Vec::with_capacity(points.len());
    let mut total = 0.0;

    for (i, point) in points.iter().enumerate() {
        if i > 0 {
            total += haversine_distance_km(&points[i - 1], point);
        }
        cumulative.push(total);
    }

    cumulative
}

/// Point at fraction `t` (0..=1) of the straight segment from `from` to `to`.
///
/// The longitude step takes the short way round, so a segment crossing the
/// antimeridian stays on its side of the globe. The result is wrapped back
/// into [-180, 180].
#[inline]
pub fn lerp_point(from: &GpsPoint, to: &GpsPoint, t: f64) -> GpsPoint {
    let longitude = from.longitude + t * wrap_longitude(to.longitude - from.longitude);
    GpsPoint::new(
        from.latitude + t * (to.latitude - from.latitude),
        wrap_longitude(longitude),
    )
}

/// Bring a longitude (or longitude difference) into [-180, 180].
#[inline]
fn wrap_longitude(lng: f64) -> f64 {
    if lng > 180.0 {
        lng - 360.0
    } else if lng < -180.0 {
        lng + 360.0
    } else {
        lng
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_haversine_distance_same_point() {
        let p = GpsPoint::new(43.65, -79.38);
        assert_eq!(haversine_distance_km(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_distance_known_value() {
        // London to Paris is approximately 344 km
        let london = GpsPoint::new(51.5074, -0.1278);
        let paris = GpsPoint::new(48.8566, 2.3522);
        let dist = haversine_distance_km(&london, &paris);
        assert!(approx_eq(dist, 343.56, 5.0));
    }

    #[test]
    fn test_polyline_length_empty_and_single() {
        assert_eq!(polyline_length_km(&[]), 0.0);
        assert_eq!(polyline_length_km(&[GpsPoint::new(43.65, -79.38)]), 0.0);
    }

    #[test]
    fn test_polyline_length_sums_segments() {
        let track = vec![
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(0.0, 0.5),
            GpsPoint::new(0.0, 1.0),
        ];
        let direct = haversine_distance_km(&track[0], &track[2]);
        assert!(approx_eq(polyline_length_km(&track), direct, 1e-9));
    }

    #[test]
    fn test_cumulative_distances() {
        let track = vec![
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(0.0, 0.5),
            GpsPoint::new(0.0, 1.0),
        ];
        let cumulative = cumulative_distances_km(&track);
        assert_eq!(cumulative.len(), 3);
        assert_eq!(cumulative[0], 0.0);
        assert!(approx_eq(cumulative[1] * 2.0, cumulative[2], 1e-9));
        assert!(approx_eq(cumulative[2], polyline_length_km(&track), 1e-12));
    }

    #[test]
    fn test_lerp_point() {
        let a = GpsPoint::new(10.0, 20.0);
        let b = GpsPoint::new(12.0, 16.0);
        assert_eq!(lerp_point(&a, &b, 0.0), a);
        assert_eq!(lerp_point(&a, &b, 1.0), b);
        let mid = lerp_point(&a, &b, 0.5);
        assert!(approx_eq(mid.latitude, 11.0, 1e-12));
        assert!(approx_eq(mid.longitude, 18.0, 1e-12));
    }

    #[test]
    fn test_lerp_point_across_antimeridian() {
        let west = GpsPoint::new(0.0, 179.99);
        let east = GpsPoint::new(0.0, -179.99);

        let mid = lerp_point(&west, &east, 0.5);
        assert!(approx_eq(mid.longitude.abs(), 180.0, 1e-9));

        let quarter = lerp_point(&west, &east, 0.25);
        assert!(approx_eq(quarter.longitude, 179.995, 1e-9));
        let three_quarters = lerp_point(&west, &east, 0.75);
        assert!(approx_eq(three_quarters.longitude, -179.995, 1e-9));
        assert!(three_quarters.is_valid());

        // Same segment drawn the other way
        let back = lerp_point(&east, &west, 0.25);
        assert!(approx_eq(back.longitude, -179.995, 1e-9));
    }
}
