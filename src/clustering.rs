//! Greedy route clustering.
//!
//! Routes are processed strictly in input order. Each route is tested against
//! the representative (first member) of every existing cluster, in cluster
//! creation order, and joins the first one whose test passes. A route that
//! matches no cluster starts a new one and becomes its representative.
//!
//! The partition depends on input order and is not globally optimal. There is
//! no spatial pre-filter: a full pass costs O(R² · N²) distance evaluations for
//! R routes resampled to N points.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::similarity::{evaluate_similarity, SimilarityVerdict};
use crate::{Cluster, ClusterConfig, ClusteringStats, InterpolatedRoute, Route};

/// Clusters in creation order plus the counters of the pass that built them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringResult {
    pub clusters: Vec<Cluster>,
    pub stats: ClusteringStats,
}

/// Interpolate every route once, in input order.
pub(crate) fn interpolate_all(routes: &[Route], count: usize) -> Vec<Result<InterpolatedRoute>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        routes
            .par_iter()
            .enumerate()
            .map(|(i, route)| route.interpolate(count).map_err(|e| e.with_route_index(i)))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        routes
            .iter()
            .enumerate()
            .map(|(i, route)| route.interpolate(count).map_err(|e| e.with_route_index(i)))
            .collect()
    }
}

/// Partition `routes` into clusters of similar routes.
///
/// Every input route appears in exactly one cluster. Clusters come back in the
/// order they were created; members keep their input order. A route that
/// cannot be interpolated fails every test and ends up alone; each such
/// failed test is counted in [`ClusteringStats::suppressed_failures`].
///
/// # Example
/// ```
/// use route_clusterer::{build_clusters, ClusterConfig, GpsPoint, Route};
///
/// let a = Route::new(vec![GpsPoint::new(0.0, 0.0), GpsPoint::new(0.0, 1.0)]).unwrap();
/// let b = Route::new(vec![GpsPoint::new(1.0, 0.0), GpsPoint::new(1.0, 1.0)]).unwrap();
///
/// let result = build_clusters(&[a.clone(), b, a], &ClusterConfig::default());
/// assert_eq!(result.clusters.len(), 2);
/// assert_eq!(result.clusters[0].member_indices, vec![0, 2]);
/// assert_eq!(result.clusters[1].member_indices, vec![1]);
/// ```
pub fn build_clusters(routes: &[Route], config: &ClusterConfig) -> ClusteringResult {
    let interpolated = interpolate_all(routes, config.resample_count as usize);
    cluster_interpolated(routes, &interpolated, config)
}

/// Greedy assignment over routes whose interpolations are already known.
///
/// `interpolated` must be index-aligned with `routes`.
pub(crate) fn cluster_interpolated(
    routes: &[Route],
    interpolated: &[Result<InterpolatedRoute>],
    config: &ClusterConfig,
) -> ClusteringResult {
    let mut clusters: Vec<Cluster> = Vec::new();
    // Input index of each cluster's representative, parallel to `clusters`
    let mut representatives: Vec<usize> = Vec::new();
    let mut stats = ClusteringStats::default();

    for (index, route) in routes.iter().enumerate() {
        let mut assigned = None;

        for (cluster_idx, &rep_index) in representatives.iter().enumerate() {
            stats.comparisons += 1;

            let verdict = match (&interpolated[index], &interpolated[rep_index]) {
                (Ok(candidate), Ok(representative)) => {
                    evaluate_similarity(candidate, representative, config)
                }
                (Err(e), _) | (_, Err(e)) => SimilarityVerdict::Suppressed { error: e.clone() },
            };

            match verdict {
                SimilarityVerdict::Pass { coverage } => {
                    debug!(
                        "[RouteClusterer] Route {} joins cluster {} (coverage {:.2})",
                        index, cluster_idx, coverage
                    );
                    stats.passed += 1;
                    assigned = Some(cluster_idx);
                    break;
                }
                SimilarityVerdict::Fail { .. } => {}
                SimilarityVerdict::Suppressed { error } => {
                    warn!(
                        "[RouteClusterer] Route {} vs representative {} treated as dissimilar: {}",
                        index, rep_index, error
                    );
                    stats.suppressed_failures += 1;
                }
            }
        }

        match assigned {
            Some(cluster_idx) => clusters[cluster_idx].push(index, route),
            None => {
                debug!(
                    "[RouteClusterer] Route {} starts cluster {}",
                    index,
                    clusters.len()
                );
                clusters.push(Cluster::singleton(index, route));
                representatives.push(index);
            }
        }
    }

    info!(
        "[RouteClusterer] Clustered {} routes into {} clusters ({} comparisons, {} suppressed)",
        routes.len(),
        clusters.len(),
        stats.comparisons,
        stats.suppressed_failures
    );

    ClusteringResult { clusters, stats }
}
