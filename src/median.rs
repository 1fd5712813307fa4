//! Median line synthesis.
//!
//! The "median" line of a cluster is the coordinate-wise mean of its members
//! after resampling them to the same point count: point `i` of the median is
//! the average latitude and longitude of point `i` of every member. It is a
//! mean trajectory, not a geometric median, and one stray member pulls it
//! proportionally.

use log::debug;

use crate::error::{Result, RouteClusterError};
use crate::interpolation::interpolate_route;
use crate::{GpsPoint, InterpolatedRoute, MedianLine, Route};

/// Compute the median line of a cluster's routes, each resampled to `count` points.
///
/// An empty cluster yields an empty line. Members that cannot be interpolated
/// (see [`crate::interpolate_points`]) make the whole call fail.
///
/// # Example
/// ```
/// use route_clusterer::{median_line, GpsPoint, Route};
///
/// let north = Route::new(vec![GpsPoint::new(0.001, 0.0), GpsPoint::new(0.001, 0.01)]).unwrap();
/// let south = Route::new(vec![GpsPoint::new(-0.001, 0.0), GpsPoint::new(-0.001, 0.01)]).unwrap();
///
/// let median = median_line(&[north, south], 10).unwrap();
/// assert_eq!(median.len(), 10);
/// assert!(median.points.iter().all(|p| p.latitude.abs() < 1e-12));
/// ```
pub fn median_line(routes: &[Route], count: usize) -> Result<MedianLine> {
    if routes.is_empty() {
        debug!("[RouteClusterer] Median of empty cluster requested, returning empty line");
        return Ok(MedianLine::default());
    }

    let interpolated = routes
        .iter()
        .enumerate()
        .map(|(i, route)| interpolate_route(route, count).map_err(|e| e.with_route_index(i)))
        .collect::<Result<Vec<_>>>()?;

    median_line_from_interpolated(&interpolated)
}

/// Average already-interpolated routes point by point.
///
/// All routes must have the same number of points.
pub fn median_line_from_interpolated(routes: &[InterpolatedRoute]) -> Result<MedianLine> {
    let Some(first) = routes.first() else {
        return Ok(MedianLine::default());
    };

    let count = first.len();
    if let Some(other) = routes.iter().find(|r| r.len() != count) {
        return Err(RouteClusterError::GeometryComputation {
            message: format!(
                "cannot average routes of different lengths ({} vs {} points)",
                count,
                other.len()
            ),
        });
    }

    let n = routes.len() as f64;
    let points = (0..count)
        .map(|i| {
            let (sum_lat, sum_lng) = routes.iter().fold((0.0, 0.0), |(lat, lng), r| {
                (lat + r.points[i].latitude, lng + r.points[i].longitude)
            });
            GpsPoint::new(sum_lat / n, sum_lng / n)
        })
        .collect();

    Ok(MedianLine { points })
}
