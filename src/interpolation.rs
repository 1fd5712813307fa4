//! Arc-length interpolation of routes.
//!
//! Every route is resampled to the same number of points before it is compared
//! or averaged, so routes drawn with very different vertex densities line up
//! point-for-point by distance travelled.

use log::debug;

use crate::error::{OptionExt, Result, RouteClusterError};
use crate::geo_utils::{cumulative_distances_km, lerp_point};
use crate::{GpsPoint, InterpolatedRoute, Route};

/// Routes shorter than this (1 mm) cannot be parameterized by arc length.
pub const MIN_ROUTE_LENGTH_KM: f64 = 1e-6;

/// Largest point count a route may be resampled to.
pub const MAX_RESAMPLE_COUNT: usize = 1_000;

/// Resample a route to `count` points evenly spaced by arc length.
///
/// See [`interpolate_points`].
pub fn interpolate_route(route: &Route, count: usize) -> Result<InterpolatedRoute> {
    interpolate_points(route.points(), count)
}

/// Resample a polyline to exactly `count` points, evenly spaced by arc length.
///
/// Point `i` sits at arc length `total * i / (count - 1)` along the polyline.
/// The first and last points are copied from the input unchanged.
///
/// # Errors
///
/// - [`RouteClusterError::DegenerateRoute`] for fewer than 2 points or a total
///   length below [`MIN_ROUTE_LENGTH_KM`]
/// - [`RouteClusterError::InvalidConfig`] when `count < 2`
/// - [`RouteClusterError::GeometryComputation`] when a segment length is not finite
///
/// # Example
/// ```
/// use route_clusterer::{interpolate_points, GpsPoint};
///
/// let line = vec![GpsPoint::new(0.0, 0.0), GpsPoint::new(0.0, 1.0)];
/// let resampled = interpolate_points(&line, 5).unwrap();
///
/// assert_eq!(resampled.len(), 5);
/// assert_eq!(resampled.points[0], line[0]);
/// assert_eq!(resampled.points[4], line[1]);
/// assert!((resampled.points[2].longitude - 0.5).abs() < 1e-9);
/// ```
pub fn interpolate_points(points: &[GpsPoint], count: usize) -> Result<InterpolatedRoute> {
    if points.len() < 2 {
        return Err(RouteClusterError::DegenerateRoute {
            route_index: None,
            point_count: points.len(),
            length_km: 0.0,
        });
    }
    if count < 2 {
        return Err(RouteClusterError::InvalidConfig {
            message: format!("interpolation needs at least 2 output points, got {}", count),
        });
    }
    if count > MAX_RESAMPLE_COUNT {
        return Err(RouteClusterError::InvalidConfig {
            message: format!(
                "interpolation supports at most {} output points, got {}",
                MAX_RESAMPLE_COUNT, count
            ),
        });
    }

    let cumulative = cumulative_distances_km(points);
    let total = *cumulative.last().ok_or_geometry("empty cumulative distances")?;

    if !total.is_finite() {
        return Err(RouteClusterError::GeometryComputation {
            message: format!("route arc length is not finite ({})", total),
        });
    }
    if total < MIN_ROUTE_LENGTH_KM {
        return Err(RouteClusterError::DegenerateRoute {
            route_index: None,
            point_count: points.len(),
            length_km: total,
        });
    }

    let first = points[0];
    let last = points[points.len() - 1];
    let step = total / (count - 1) as f64;

    let mut resampled = Vec::with_capacity(count);
    resampled.push(first);

    // Index of the segment [segment, segment + 1] holding the current target
    let mut segment = 0;
    for i in 1..count - 1 {
        let target = step * i as f64;

        while segment + 2 < points.len() && cumulative[segment + 1] < target {
            segment += 1;
        }

        let seg_start = cumulative[segment];
        let seg_len = cumulative[segment + 1] - seg_start;
        let ratio = if seg_len > 0.0 {
            ((target - seg_start) / seg_len).clamp(0.0, 1.0)
        } else {
            0.0
        };

        resampled.push(lerp_point(&points[segment], &points[segment + 1], ratio));
    }

    resampled.push(last);

    debug!(
        "[RouteClusterer] Interpolated {} vertices ({:.3} km) to {} points",
        points.len(),
        total,
        count
    );

    Ok(InterpolatedRoute { points: resampled })
}
