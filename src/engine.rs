//! # Recompute Pipeline and Route Engine
//!
//! [`recompute`] is the whole pipeline as one pure call: interpolate every
//! route, cluster them, and synthesize a median line per cluster.
//!
//! [`RouteEngine`] wraps it for a collaborator that owns a growing route list.
//!
//! ## Architecture
//!
//! The engine publishes an immutable [`ClusterSnapshot`] holding the route list
//! together with the clusters and median lines derived from it. Every
//! mutation builds the next route list, recomputes against it, and only then
//! swaps the published snapshot. Readers hold an `Arc` to one snapshot, so they
//! never observe routes and clusters from different generations, and once a
//! mutation returns every later read sees its effect.
//!
//! A global instance is available through [`with_engine`] for callers that
//! cannot thread an engine value through their own state.

use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use crate::clustering::{cluster_interpolated, interpolate_all};
use crate::error::{Result, RouteClusterError};
use crate::median::median_line_from_interpolated;
use crate::{Bounds, Cluster, ClusterConfig, ClusteringStats, GpsPoint, InterpolatedRoute, MedianLine, Route};

// ============================================================================
// Pipeline
// ============================================================================

/// Clusters and their median lines for one route list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecomputeResult {
    /// Clusters in creation order
    pub clusters: Vec<Cluster>,
    /// Median line per cluster, index-aligned with `clusters`
    pub medians: Vec<MedianLine>,
    pub stats: ClusteringStats,
}

/// Run the full pipeline on a route list snapshot.
///
/// # Errors
///
/// - [`RouteClusterError::InvalidConfig`] for unusable tunables
/// - [`RouteClusterError::BudgetExceeded`] when the list is larger than
///   `config.max_routes`
/// - [`RouteClusterError::DegenerateRoute`] when a route cannot be
///   interpolated. Clustering itself tolerates such routes (they end up
///   alone), but no median line exists for them.
///
/// # Example
/// ```
/// use route_clusterer::{recompute, ClusterConfig, GpsPoint, Route};
///
/// let a = Route::new(vec![GpsPoint::new(0.0, 0.0), GpsPoint::new(0.0, 1.0)]).unwrap();
/// let b = Route::new(vec![GpsPoint::new(1.0, 0.0), GpsPoint::new(1.0, 1.0)]).unwrap();
///
/// let result = recompute(&[a, b], &ClusterConfig::default()).unwrap();
/// assert_eq!(result.clusters.len(), 2);
/// assert_eq!(result.medians.len(), 2);
/// ```
pub fn recompute(routes: &[Route], config: &ClusterConfig) -> Result<RecomputeResult> {
    config.validate()?;

    let max_routes = config.max_routes as usize;
    if max_routes > 0 && routes.len() > max_routes {
        warn!(
            "[RouteClusterer] Refusing recompute of {} routes (budget {})",
            routes.len(),
            max_routes
        );
        return Err(RouteClusterError::BudgetExceeded {
            route_count: routes.len(),
            max_routes,
        });
    }

    let interpolated = interpolate_all(routes, config.resample_count as usize);
    let clustering = cluster_interpolated(routes, &interpolated, config);
    let medians = synthesize_medians(&clustering.clusters, &interpolated)?;

    debug!(
        "[RouteClusterer] Recomputed {} routes: {} clusters, {} medians",
        routes.len(),
        clustering.clusters.len(),
        medians.len()
    );

    Ok(RecomputeResult {
        clusters: clustering.clusters,
        medians,
        stats: clustering.stats,
    })
}

fn cluster_median(cluster: &Cluster, interpolated: &[Result<InterpolatedRoute>]) -> Result<MedianLine> {
    let members = cluster
        .member_indices
        .iter()
        .map(|&i| interpolated[i].clone())
        .collect::<Result<Vec<_>>>()?;
    median_line_from_interpolated(&members)
}

fn synthesize_medians(
    clusters: &[Cluster],
    interpolated: &[Result<InterpolatedRoute>],
) -> Result<Vec<MedianLine>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        clusters
            .par_iter()
            .map(|c| cluster_median(c, interpolated))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        clusters
            .iter()
            .map(|c| cluster_median(c, interpolated))
            .collect()
    }
}

// ============================================================================
// Published State
// ============================================================================

/// One generation of published engine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    /// Incremented on every successful mutation; 0 for a fresh engine
    pub generation: u64,
    pub routes: Vec<Route>,
    pub clusters: Vec<Cluster>,
    pub medians: Vec<MedianLine>,
    pub stats: ClusteringStats,
}

impl ClusterSnapshot {
    fn empty() -> Self {
        Self {
            generation: 0,
            routes: Vec::new(),
            clusters: Vec::new(),
            medians: Vec::new(),
            stats: ClusteringStats::default(),
        }
    }
}

/// Engine statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub generation: u64,
    pub route_count: u32,
    pub cluster_count: u32,
    /// Similarity failures suppressed in the last recompute. Routes are
    /// validated and interpolated before they are added, so this stays 0 for
    /// anything the engine accepts.
    pub suppressed_failures: u64,
}

/// Cluster bounds wrapper for R-tree spatial indexing
#[derive(Debug, Clone)]
pub struct ClusterBounds {
    pub cluster_index: usize,
    pub bounds: Bounds,
}

impl RTreeObject for ClusterBounds {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bounds.min_lng, self.bounds.min_lat],
            [self.bounds.max_lng, self.bounds.max_lat],
        )
    }
}

// ============================================================================
// Route Engine
// ============================================================================

/// Owns a route list and keeps its clusters and median lines current.
///
/// # Example
/// ```
/// use route_clusterer::{GpsPoint, RouteEngine};
///
/// let mut engine = RouteEngine::new();
/// engine.add_route(vec![GpsPoint::new(0.0, 0.0), GpsPoint::new(0.0, 1.0)]).unwrap();
/// engine.add_route(vec![GpsPoint::new(0.0, 0.0005), GpsPoint::new(0.0, 1.0005)]).unwrap();
///
/// let snapshot = engine.snapshot();
/// assert_eq!(snapshot.generation, 2);
/// assert_eq!(snapshot.clusters.len(), 1);
/// ```
pub struct RouteEngine {
    config: ClusterConfig,
    snapshot: Arc<ClusterSnapshot>,
    spatial_index: RTree<ClusterBounds>,
}

impl Default for RouteEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteEngine {
    /// Create a new engine with default configuration.
    pub fn new() -> Self {
        Self {
            config: ClusterConfig::default(),
            snapshot: Arc::new(ClusterSnapshot::empty()),
            spatial_index: RTree::new(),
        }
    }

    /// Create a new engine with custom configuration.
    pub fn with_config(config: ClusterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }

    // ========================================================================
    // Route Management
    // ========================================================================

    /// Append a finalized route and recompute.
    ///
    /// Returns the new route's index. On error the published state is left
    /// untouched; a route that cannot be interpolated is reported as
    /// [`RouteClusterError::DegenerateRoute`].
    pub fn add_route(&mut self, points: Vec<GpsPoint>) -> Result<usize> {
        let index = self.snapshot.routes.len();
        let route = self.validate_route(points, index)?;

        let mut routes = self.snapshot.routes.clone();
        routes.push(route);
        self.publish(routes)?;

        info!(
            "[RouteClusterer] Added route {} (generation {})",
            index, self.snapshot.generation
        );
        Ok(index)
    }

    /// Append a route given as `[lat1, lng1, lat2, lng2, ...]`.
    pub fn add_route_flat(&mut self, flat_coords: &[f64]) -> Result<usize> {
        let index = self.snapshot.routes.len();
        let route = Route::from_flat(flat_coords).map_err(|e| e.with_route_index(index))?;
        self.add_route(route.into())
    }

    /// Append several routes with a single recompute.
    ///
    /// All-or-nothing: if any route is rejected none are added.
    /// Returns the number of routes added.
    pub fn add_routes(&mut self, routes: Vec<Vec<GpsPoint>>) -> Result<usize> {
        if routes.is_empty() {
            return Ok(0);
        }

        let start = self.snapshot.routes.len();
        let mut next = self.snapshot.routes.clone();
        for (offset, points) in routes.into_iter().enumerate() {
            next.push(self.validate_route(points, start + offset)?);
        }

        let added = next.len() - start;
        self.publish(next)?;

        info!(
            "[RouteClusterer] Added {} routes (generation {})",
            added, self.snapshot.generation
        );
        Ok(added)
    }

    /// Remove all routes.
    pub fn clear(&mut self) {
        let generation = self.snapshot.generation + 1;
        self.snapshot = Arc::new(ClusterSnapshot {
            generation,
            ..ClusterSnapshot::empty()
        });
        self.spatial_index = RTree::new();
        info!("[RouteClusterer] Cleared (generation {})", generation);
    }

    /// Replace the configuration and recompute the current routes under it.
    ///
    /// The old configuration stays in effect if the new one is invalid or
    /// the recompute fails.
    pub fn set_config(&mut self, config: ClusterConfig) -> Result<()> {
        config.validate()?;

        let previous = std::mem::replace(&mut self.config, config);
        let routes = self.snapshot.routes.clone();
        if let Err(e) = self.publish(routes) {
            self.config = previous;
            return Err(e);
        }
        Ok(())
    }

    fn validate_route(&self, points: Vec<GpsPoint>, index: usize) -> Result<Route> {
        let route = Route::new(points).map_err(|e| e.with_route_index(index))?;
        route
            .interpolate(self.config.resample_count as usize)
            .map_err(|e| e.with_route_index(index))?;
        Ok(route)
    }

    /// Recompute against `routes` and swap the published snapshot.
    fn publish(&mut self, routes: Vec<Route>) -> Result<()> {
        let result = recompute(&routes, &self.config)?;

        let bounds: Vec<ClusterBounds> = result
            .clusters
            .iter()
            .enumerate()
            .map(|(cluster_index, c)| ClusterBounds {
                cluster_index,
                bounds: c.bounds,
            })
            .collect();

        let snapshot = ClusterSnapshot {
            generation: self.snapshot.generation + 1,
            routes,
            clusters: result.clusters,
            medians: result.medians,
            stats: result.stats,
        };

        self.snapshot = Arc::new(snapshot);
        self.spatial_index = RTree::bulk_load(bounds);
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// The current published state.
    pub fn snapshot(&self) -> Arc<ClusterSnapshot> {
        Arc::clone(&self.snapshot)
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn generation(&self) -> u64 {
        self.snapshot.generation
    }

    pub fn route_count(&self) -> usize {
        self.snapshot.routes.len()
    }

    pub fn cluster_count(&self) -> usize {
        self.snapshot.clusters.len()
    }

    /// Indices of clusters whose bounds intersect the viewport.
    pub fn query_viewport(&self, min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> Vec<usize> {
        let search_bounds = AABB::from_corners([min_lng, min_lat], [max_lng, max_lat]);
        let mut indices: Vec<usize> = self
            .spatial_index
            .locate_in_envelope_intersecting(&search_bounds)
            .map(|b| b.cluster_index)
            .collect();
        indices.sort_unstable();
        indices
    }

    /// Clusters as JSON.
    pub fn clusters_json(&self) -> String {
        serde_json::to_string(&self.snapshot.clusters).unwrap_or_else(|_| "[]".to_string())
    }

    /// Median lines as JSON: one array of `{latitude, longitude}` per cluster.
    pub fn medians_json(&self) -> String {
        let lines: Vec<&[GpsPoint]> = self
            .snapshot
            .medians
            .iter()
            .map(|m| m.points.as_slice())
            .collect();
        serde_json::to_string(&lines).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            generation: self.snapshot.generation,
            route_count: self.snapshot.routes.len() as u32,
            cluster_count: self.snapshot.clusters.len() as u32,
            suppressed_failures: self.snapshot.stats.suppressed_failures,
        }
    }
}

// ============================================================================
// Global Singleton
// ============================================================================

/// Global engine instance.
pub static ENGINE: Lazy<Mutex<RouteEngine>> = Lazy::new(|| Mutex::new(RouteEngine::new()));

/// Run `f` with exclusive access to the global engine.
///
/// A panic inside an earlier call does not make the engine unusable: the
/// published snapshot is only ever replaced whole.
pub fn with_engine<F, R>(f: F) -> R
where
    F: FnOnce(&mut RouteEngine) -> R,
{
    let mut engine = ENGINE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut engine)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn straight(lat: f64, lng_offset: f64) -> Vec<GpsPoint> {
        vec![
            GpsPoint::new(lat, lng_offset),
            GpsPoint::new(lat, 0.05 + lng_offset),
        ]
    }

    fn small_config() -> ClusterConfig {
        ClusterConfig {
            resample_count: 40,
            ..ClusterConfig::default()
        }
    }

    fn to_routes(lines: &[Vec<GpsPoint>]) -> Vec<Route> {
        lines.iter().map(|p| Route::new(p.clone()).unwrap()).collect()
    }

    #[test]
    fn test_recompute_empty() {
        let result = recompute(&[], &ClusterConfig::default()).unwrap();
        assert!(result.clusters.is_empty());
        assert!(result.medians.is_empty());
    }

    #[test]
    fn test_recompute_medians_align_with_clusters() {
        let routes = to_routes(&[straight(0.0, 0.0), straight(1.0, 0.0), straight(0.0, 0.0005)]);
        let result = recompute(&routes, &small_config()).unwrap();

        assert_eq!(result.clusters.len(), 2);
        assert_eq!(result.medians.len(), 2);
        assert!(result.medians.iter().all(|m| m.len() == 40));

        // First median is the mean of routes 0 and 2
        let expected = crate::median_line(&result.clusters[0].routes, 40).unwrap();
        assert_eq!(result.medians[0], expected);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let routes = to_routes(&[
            straight(0.0, 0.0),
            straight(0.0015, 0.0),
            straight(0.003, 0.0),
            straight(2.0, 0.0),
        ]);
        let first = recompute(&routes, &small_config()).unwrap();
        let second = recompute(&routes, &small_config()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_recompute_budget() {
        let config = ClusterConfig {
            max_routes: 2,
            ..small_config()
        };
        let routes = to_routes(&[straight(0.0, 0.0), straight(1.0, 0.0), straight(2.0, 0.0)]);

        let err = recompute(&routes, &config).unwrap_err();
        assert_eq!(
            err,
            RouteClusterError::BudgetExceeded {
                route_count: 3,
                max_routes: 2
            }
        );

        let unlimited = ClusterConfig {
            max_routes: 0,
            ..small_config()
        };
        assert!(recompute(&routes, &unlimited).is_ok());
    }

    #[test]
    fn test_recompute_reports_degenerate_route() {
        let p = GpsPoint::new(0.0, 0.0);
        let mut routes = to_routes(&[straight(0.0, 0.0)]);
        routes.push(Route::new(vec![p, p]).unwrap());

        let err = recompute(&routes, &small_config()).unwrap_err();
        assert!(matches!(
            err,
            RouteClusterError::DegenerateRoute {
                route_index: Some(1),
                ..
            }
        ));
    }

    #[test]
    fn test_recompute_rejects_invalid_config() {
        let config = ClusterConfig {
            similarity_threshold: -0.1,
            ..ClusterConfig::default()
        };
        assert!(matches!(
            recompute(&[], &config),
            Err(RouteClusterError::InvalidConfig { .. })
        ));

        let oversized = ClusterConfig {
            resample_count: 4_000_000_000,
            ..ClusterConfig::default()
        };
        assert!(matches!(
            recompute(&to_routes(&[straight(0.0, 0.0)]), &oversized),
            Err(RouteClusterError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_engine_add_route_read_after_write() {
        let mut engine = RouteEngine::with_config(small_config()).unwrap();
        assert_eq!(engine.generation(), 0);

        let index = engine.add_route(straight(0.0, 0.0)).unwrap();
        assert_eq!(index, 0);
        assert_eq!(engine.snapshot().clusters.len(), 1);

        let index = engine.add_route(straight(0.0, 0.0005)).unwrap();
        assert_eq!(index, 1);

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.generation, 2);
        assert_eq!(snapshot.routes.len(), 2);
        assert_eq!(snapshot.clusters.len(), 1);
        assert_eq!(snapshot.clusters[0].member_indices, vec![0, 1]);
        assert_eq!(snapshot.medians.len(), 1);
    }

    #[test]
    fn test_engine_old_snapshot_is_consistent() {
        let mut engine = RouteEngine::with_config(small_config()).unwrap();
        engine.add_route(straight(0.0, 0.0)).unwrap();
        let before = engine.snapshot();

        engine.add_route(straight(1.0, 0.0)).unwrap();

        // A reader holding the old generation still sees matching data
        assert_eq!(before.generation, 1);
        assert_eq!(before.routes.len(), 1);
        assert_eq!(before.clusters.len(), 1);
        assert_eq!(engine.snapshot().clusters.len(), 2);
    }

    #[test]
    fn test_engine_rejects_degenerate_route() {
        let mut engine = RouteEngine::with_config(small_config()).unwrap();
        engine.add_route(straight(0.0, 0.0)).unwrap();

        let p = GpsPoint::new(0.0, 0.0);
        let err = engine.add_route(vec![p, p]).unwrap_err();
        assert!(matches!(
            err,
            RouteClusterError::DegenerateRoute {
                route_index: Some(1),
                ..
            }
        ));

        let err = engine.add_route(vec![p]).unwrap_err();
        assert!(matches!(err, RouteClusterError::DegenerateRoute { .. }));

        // Published state unchanged
        assert_eq!(engine.route_count(), 1);
        assert_eq!(engine.generation(), 1);
    }

    #[test]
    fn test_engine_add_routes_all_or_nothing() {
        let mut engine = RouteEngine::with_config(small_config()).unwrap();
        let p = GpsPoint::new(0.0, 0.0);

        let err = engine.add_routes(vec![straight(0.0, 0.0), vec![p, p]]);
        assert!(err.is_err());
        assert_eq!(engine.route_count(), 0);

        let added = engine
            .add_routes(vec![straight(0.0, 0.0), straight(1.0, 0.0)])
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(engine.generation(), 1);
        assert_eq!(engine.cluster_count(), 2);
    }

    #[test]
    fn test_engine_add_flat() {
        let mut engine = RouteEngine::with_config(small_config()).unwrap();
        let flat: Vec<f64> = straight(0.0, 0.0)
            .iter()
            .flat_map(|p| vec![p.latitude, p.longitude])
            .collect();

        assert_eq!(engine.add_route_flat(&flat).unwrap(), 0);
        assert!(engine.add_route_flat(&flat[..3]).is_err());
        assert_eq!(engine.route_count(), 1);
    }

    #[test]
    fn test_engine_budget_keeps_previous_state() {
        let config = ClusterConfig {
            max_routes: 1,
            ..small_config()
        };
        let mut engine = RouteEngine::with_config(config).unwrap();
        engine.add_route(straight(0.0, 0.0)).unwrap();

        let err = engine.add_route(straight(1.0, 0.0)).unwrap_err();
        assert!(matches!(err, RouteClusterError::BudgetExceeded { .. }));
        assert_eq!(engine.route_count(), 1);
    }

    #[test]
    fn test_engine_set_config_recomputes() {
        let mut engine = RouteEngine::with_config(small_config()).unwrap();
        engine.add_route(straight(0.0, 0.0)).unwrap();
        engine.add_route(straight(0.0015, 0.0)).unwrap();
        assert_eq!(engine.cluster_count(), 1);

        // ~167 m apart: separate once the radius shrinks to 0.1 km
        let tight = ClusterConfig {
            match_radius_km: 0.1,
            ..small_config()
        };
        engine.set_config(tight.clone()).unwrap();
        assert_eq!(engine.cluster_count(), 2);
        assert_eq!(engine.config(), &tight);

        let invalid = ClusterConfig {
            resample_count: 0,
            ..small_config()
        };
        assert!(engine.set_config(invalid).is_err());
        assert_eq!(engine.config(), &tight);

        let oversized = ClusterConfig {
            resample_count: u32::MAX,
            ..small_config()
        };
        assert!(matches!(
            engine.set_config(oversized),
            Err(RouteClusterError::InvalidConfig { .. })
        ));
        assert_eq!(engine.config(), &tight);
        assert_eq!(engine.cluster_count(), 2);
    }

    #[test]
    fn test_engine_clear() {
        let mut engine = RouteEngine::with_config(small_config()).unwrap();
        engine.add_route(straight(0.0, 0.0)).unwrap();
        engine.clear();

        assert_eq!(engine.route_count(), 0);
        assert_eq!(engine.cluster_count(), 0);
        assert_eq!(engine.generation(), 2);
        assert!(engine.query_viewport(-1.0, 1.0, -1.0, 1.0).is_empty());
    }

    #[test]
    fn test_engine_viewport_query() {
        let mut engine = RouteEngine::with_config(small_config()).unwrap();
        engine.add_route(straight(0.0, 0.0)).unwrap();
        engine.add_route(straight(10.0, 0.0)).unwrap();

        assert_eq!(engine.query_viewport(-0.5, 0.5, -0.5, 0.5), vec![0]);
        assert_eq!(engine.query_viewport(9.5, 10.5, 0.0, 0.1), vec![1]);
        assert_eq!(engine.query_viewport(-1.0, 11.0, -1.0, 1.0), vec![0, 1]);
        assert!(engine.query_viewport(40.0, 41.0, -75.0, -74.0).is_empty());
    }

    #[test]
    fn test_engine_json_output() {
        let mut engine = RouteEngine::with_config(small_config()).unwrap();
        engine.add_route(straight(0.0, 0.0)).unwrap();

        let clusters: serde_json::Value = serde_json::from_str(&engine.clusters_json()).unwrap();
        assert_eq!(clusters[0]["member_indices"][0], 0);

        let medians: Vec<Vec<GpsPoint>> = serde_json::from_str(&engine.medians_json()).unwrap();
        assert_eq!(medians.len(), 1);
        assert_eq!(medians[0].len(), 40);
    }

    #[test]
    fn test_engine_stats() {
        let mut engine = RouteEngine::with_config(small_config()).unwrap();
        engine.add_route(straight(0.0, 0.0)).unwrap();
        engine.add_route(straight(1.0, 0.0)).unwrap();

        let stats = engine.stats();
        assert_eq!(stats.generation, 2);
        assert_eq!(stats.route_count, 2);
        assert_eq!(stats.cluster_count, 2);
        assert_eq!(stats.suppressed_failures, 0);
    }

    #[test]
    fn test_with_engine_global() {
        let count = with_engine(|e| {
            e.clear();
            e.add_route(straight(0.0, 0.0)).unwrap();
            e.route_count()
        });
        assert_eq!(count, 1);
        with_engine(|e| e.clear());
    }
}
