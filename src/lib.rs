//! # Route Clusterer
//!
//! Groups hand-drawn GPS routes into clusters of similar paths and produces a
//! representative "median line" for each cluster.
//!
//! This library provides:
//! - Arc-length interpolation of polylines to a fixed point count
//! - A one-directional coverage similarity test between two routes
//! - Greedy, input-order-sensitive clustering against cluster representatives
//! - Coordinate-wise mean trajectories per cluster
//! - A route engine that recomputes and publishes results on every append
//!
//! ## Features
//!
//! - **`parallel`** - Interpolate routes and synthesize medians with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use route_clusterer::{recompute, ClusterConfig, GpsPoint, Route};
//!
//! let a = Route::new(vec![GpsPoint::new(0.0, 0.0), GpsPoint::new(0.0, 1.0)]).unwrap();
//! // Same path shifted ~55 m east
//! let b = Route::new(vec![GpsPoint::new(0.0, 0.0005), GpsPoint::new(0.0, 1.0005)]).unwrap();
//! // Parallel path ~111 km north
//! let c = Route::new(vec![GpsPoint::new(1.0, 0.0), GpsPoint::new(1.0, 1.0)]).unwrap();
//!
//! let result = recompute(&[a, b, c], &ClusterConfig::default()).unwrap();
//! assert_eq!(result.clusters.len(), 2);
//! assert_eq!(result.clusters[0].member_indices, vec![0, 1]);
//! assert_eq!(result.medians[0].len(), 100);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, RouteClusterError};

// Geographic utilities (distance, arc length, interpolation primitives)
pub mod geo_utils;

// Arc-length resampling of routes
pub mod interpolation;
pub use interpolation::{
    interpolate_points, interpolate_route, MAX_RESAMPLE_COUNT, MIN_ROUTE_LENGTH_KM,
};

// Coverage similarity between interpolated routes
pub mod similarity;
pub use similarity::{coverage_ratio, evaluate_similarity, routes_are_similar, SimilarityVerdict};

// Greedy clustering
pub mod clustering;
pub use clustering::{build_clusters, ClusteringResult};

// Per-cluster mean trajectories
pub mod median;
pub use median::{median_line, median_line_from_interpolated};

// Recompute pipeline and stateful engine (snapshot-and-swap publication)
pub mod engine;
pub use engine::{
    recompute, with_engine, ClusterSnapshot, EngineStats, RecomputeResult, RouteEngine, ENGINE,
};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude in degrees.
///
/// # Example
/// ```
/// use route_clusterer::GpsPoint;
/// let point = GpsPoint::new(43.65, -79.38); // Toronto
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box for one or more routes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Smallest bounds containing both `self` and `other`.
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
            min_lng: self.min_lng.min(other.min_lng),
            max_lng: self.max_lng.max(other.max_lng),
        }
    }
}

/// A finalized, user-drawn route: an ordered polyline of at least 2 points.
///
/// Routes are immutable once created. Their identity is their position in the
/// route list they belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<GpsPoint>", into = "Vec<GpsPoint>")]
pub struct Route {
    points: Vec<GpsPoint>,
}

impl Route {
    /// Create a route from its vertices.
    ///
    /// Fails with [`RouteClusterError::DegenerateRoute`] for fewer than 2 points
    /// and [`RouteClusterError::InvalidCoordinates`] for NaN or out-of-range
    /// coordinates. A route whose points all coincide is accepted here and
    /// rejected by [`Route::interpolate`].
    ///
    /// # Example
    /// ```
    /// use route_clusterer::{GpsPoint, Route};
    ///
    /// assert!(Route::new(vec![GpsPoint::new(43.65, -79.38)]).is_err());
    /// assert!(Route::new(vec![GpsPoint::new(43.65, -79.38), GpsPoint::new(43.66, -79.38)]).is_ok());
    /// ```
    pub fn new(points: Vec<GpsPoint>) -> Result<Self> {
        if points.len() < 2 {
            return Err(RouteClusterError::DegenerateRoute {
                route_index: None,
                point_count: points.len(),
                length_km: 0.0,
            });
        }

        if let Some((i, p)) = points.iter().enumerate().find(|(_, p)| !p.is_valid()) {
            return Err(RouteClusterError::InvalidCoordinates {
                route_index: None,
                message: format!(
                    "point {} = ({}, {}) is outside WGS84 range",
                    i, p.latitude, p.longitude
                ),
            });
        }

        Ok(Self { points })
    }

    /// Create a route from a flat `[lat1, lng1, lat2, lng2, ...]` buffer.
    pub fn from_flat(flat_coords: &[f64]) -> Result<Self> {
        if flat_coords.len() % 2 != 0 {
            return Err(RouteClusterError::InvalidCoordinates {
                route_index: None,
                message: format!("odd coordinate buffer length {}", flat_coords.len()),
            });
        }

        let points = flat_coords
            .chunks_exact(2)
            .map(|chunk| GpsPoint::new(chunk[0], chunk[1]))
            .collect();
        Self::new(points)
    }

    /// The route's vertices.
    pub fn points(&self) -> &[GpsPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if the route has no vertices.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Total arc length in kilometers.
    pub fn length_km(&self) -> f64 {
        geo_utils::polyline_length_km(&self.points)
    }

    pub fn bounds(&self) -> Bounds {
        // Non-empty by construction
        Bounds::from_points(&self.points).unwrap_or(Bounds {
            min_lat: 0.0,
            max_lat: 0.0,
            min_lng: 0.0,
            max_lng: 0.0,
        })
    }

    /// Resample this route to `count` points evenly spaced by arc length.
    pub fn interpolate(&self, count: usize) -> Result<InterpolatedRoute> {
        interpolate_route(self, count)
    }
}

impl TryFrom<Vec<GpsPoint>> for Route {
    type Error = RouteClusterError;

    fn try_from(points: Vec<GpsPoint>) -> Result<Self> {
        Route::new(points)
    }
}

impl From<Route> for Vec<GpsPoint> {
    fn from(route: Route) -> Self {
        route.points
    }
}

/// A route resampled to a fixed number of points, equally spaced by arc length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpolatedRoute {
    pub points: Vec<GpsPoint>,
}

impl InterpolatedRoute {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A group of routes assigned together by the greedy similarity test.
///
/// The first member is the representative every later candidate was tested
/// against. Members passed the test against the representative, not
/// necessarily against each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Positions of the member routes in the input route list, in assignment order
    pub member_indices: Vec<usize>,
    /// Copies of the member routes, index-aligned with `member_indices`
    pub routes: Vec<Route>,
    /// Bounding box over all member routes
    pub bounds: Bounds,
}

impl Cluster {
    /// Start a cluster with `route` as its representative.
    pub fn singleton(route_index: usize, route: &Route) -> Self {
        Self {
            member_indices: vec![route_index],
            routes: vec![route.clone()],
            bounds: route.bounds(),
        }
    }

    /// Add a member that passed the test against the representative.
    pub fn push(&mut self, route_index: usize, route: &Route) {
        self.bounds = self.bounds.union(&route.bounds());
        self.member_indices.push(route_index);
        self.routes.push(route.clone());
    }

    /// The route all candidates are tested against.
    pub fn representative(&self) -> Option<&Route> {
        self.routes.first()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Coordinate-wise mean trajectory of a cluster.
///
/// Has exactly `resample_count` points for a non-empty cluster and none for
/// an empty one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedianLine {
    pub points: Vec<GpsPoint>,
}

impl MedianLine {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Configuration for interpolation, similarity and clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Number of points every route is resampled to (N, 2 to 1000).
    /// Default: 100
    pub resample_count: u32,

    /// Radius within which a point counts as covered, in kilometers (R).
    /// Default: 0.2 km
    pub match_radius_km: f64,

    /// Minimum covered fraction for two routes to be similar (T, 0.0-1.0).
    /// Default: 0.5
    pub similarity_threshold: f64,

    /// Largest route list a recompute will accept. 0 disables the check.
    /// Default: 1000 (the full pass is O(R² · N²))
    pub max_routes: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            resample_count: 100,
            match_radius_km: 0.2,
            similarity_threshold: 0.5,
            max_routes: 1000,
        }
    }
}

impl ClusterConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    ///
    /// # Example
    /// ```
    /// use route_clusterer::ClusterConfig;
    ///
    /// let config = ClusterConfig::from_json(r#"{"match_radius_km": 0.5}"#).unwrap();
    /// assert_eq!(config.match_radius_km, 0.5);
    /// assert_eq!(config.resample_count, 100);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ClusterConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every tunable is usable.
    pub fn validate(&self) -> Result<()> {
        if self.resample_count < 2 {
            return Err(RouteClusterError::InvalidConfig {
                message: format!("resample_count must be at least 2, got {}", self.resample_count),
            });
        }
        if self.resample_count as usize > MAX_RESAMPLE_COUNT {
            return Err(RouteClusterError::InvalidConfig {
                message: format!(
                    "resample_count must be at most {}, got {}",
                    MAX_RESAMPLE_COUNT, self.resample_count
                ),
            });
        }
        if !self.match_radius_km.is_finite() || self.match_radius_km < 0.0 {
            return Err(RouteClusterError::InvalidConfig {
                message: format!(
                    "match_radius_km must be a non-negative distance, got {}",
                    self.match_radius_km
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(RouteClusterError::InvalidConfig {
                message: format!(
                    "similarity_threshold must be within [0, 1], got {}",
                    self.similarity_threshold
                ),
            });
        }
        Ok(())
    }
}

/// Counters collected during a clustering pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusteringStats {
    /// Similarity tests evaluated
    pub comparisons: u64,
    /// Tests that passed
    pub passed: u64,
    /// Tests that failed because of an internal geometry error
    pub suppressed_failures: u64,
}

// ============================================================================
// Tests
// ============================================================================
