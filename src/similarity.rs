//! Coverage similarity between interpolated routes.
//!
//! The test answers "how much of route A is covered by route B": for every
//! point of A we look for any point of B within the match radius. It is
//! deliberately one-directional. A short route lying on a longer one is
//! covered by it, while the longer route is not covered by the short one.
//!
//! Internal failures never escape [`routes_are_similar`]; they are logged and
//! turned into a negative verdict so a single bad route only ends up in a
//! cluster of its own.

use log::warn;

use crate::error::{Result, RouteClusterError};
use crate::geo_utils::haversine_distance_km;
use crate::{ClusterConfig, InterpolatedRoute};

/// Outcome of a single similarity test.
#[derive(Debug, Clone, PartialEq)]
pub enum SimilarityVerdict {
    /// Coverage met the threshold
    Pass { coverage: f64 },
    /// Coverage was below the threshold
    Fail { coverage: f64 },
    /// The test could not be computed and counts as a failure
    Suppressed { error: RouteClusterError },
}

impl SimilarityVerdict {
    /// Whether the routes count as similar. Suppressed verdicts are not.
    pub fn is_similar(&self) -> bool {
        matches!(self, SimilarityVerdict::Pass { .. })
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, SimilarityVerdict::Suppressed { .. })
    }
}

/// Fraction of points in `a` that have at least one point of `b` within
/// `radius_km` (inclusive).
///
/// Brute force over all pairs, O(N²). Both routes must be non-empty and of
/// equal length.
///
/// # Example
/// ```
/// use route_clusterer::{coverage_ratio, interpolate_points, GpsPoint};
///
/// let a = interpolate_points(&[GpsPoint::new(0.0, 0.0), GpsPoint::new(0.0, 0.01)], 10).unwrap();
/// let b = interpolate_points(&[GpsPoint::new(1.0, 0.0), GpsPoint::new(1.0, 0.01)], 10).unwrap();
///
/// assert_eq!(coverage_ratio(&a, &a, 0.2).unwrap(), 1.0);
/// assert_eq!(coverage_ratio(&a, &b, 0.2).unwrap(), 0.0);
/// ```
pub fn coverage_ratio(a: &InterpolatedRoute, b: &InterpolatedRoute, radius_km: f64) -> Result<f64> {
    if a.is_empty() || b.is_empty() {
        return Err(RouteClusterError::GeometryComputation {
            message: format!("cannot compare empty routes ({} vs {} points)", a.len(), b.len()),
        });
    }
    if a.len() != b.len() {
        return Err(RouteClusterError::GeometryComputation {
            message: format!(
                "interpolated routes differ in length ({} vs {} points)",
                a.len(),
                b.len()
            ),
        });
    }

    let mut match_count = 0usize;
    for pa in &a.points {
        let mut covered = false;
        for pb in &b.points {
            let distance = haversine_distance_km(pa, pb);
            if !distance.is_finite() {
                return Err(RouteClusterError::GeometryComputation {
                    message: format!(
                        "non-finite distance between ({}, {}) and ({}, {})",
                        pa.latitude, pa.longitude, pb.latitude, pb.longitude
                    ),
                });
            }
            if distance <= radius_km {
                covered = true;
                break;
            }
        }
        if covered {
            match_count += 1;
        }
    }

    Ok(match_count as f64 / a.len() as f64)
}

/// Test whether `a` is covered by `b` under the configured radius and threshold.
pub fn evaluate_similarity(
    a: &InterpolatedRoute,
    b: &InterpolatedRoute,
    config: &ClusterConfig,
) -> SimilarityVerdict {
    match coverage_ratio(a, b, config.match_radius_km) {
        Ok(coverage) if coverage >= config.similarity_threshold => {
            SimilarityVerdict::Pass { coverage }
        }
        Ok(coverage) => SimilarityVerdict::Fail { coverage },
        Err(error) => SimilarityVerdict::Suppressed { error },
    }
}

/// Fail-closed similarity test: `true` iff coverage of `a` by `b` reaches
/// `config.similarity_threshold`. Any internal error yields `false`.
///
/// Not symmetric: `routes_are_similar(a, b, ..)` may differ from
/// `routes_are_similar(b, a, ..)`.
pub fn routes_are_similar(a: &InterpolatedRoute, b: &InterpolatedRoute, config: &ClusterConfig) -> bool {
    let verdict = evaluate_similarity(a, b, config);
    if let SimilarityVerdict::Suppressed { error } = &verdict {
        warn!("[RouteClusterer] Similarity test suppressed: {}", error);
    }
    verdict.is_similar()
}
