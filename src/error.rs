//! Unified error handling for the route-clusterer library.
//!
//! Interpolation and median synthesis return these errors to the caller.
//! Similarity evaluation never does: failures there are converted to a
//! negative verdict (see [`crate::similarity`]).

use std::fmt;

/// Unified error type for route-clusterer operations.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteClusterError {
    /// Route has fewer than 2 points or (near) zero arc length
    DegenerateRoute {
        route_index: Option<usize>,
        point_count: usize,
        length_km: f64,
    },
    /// Route has NaN or out-of-range coordinates
    InvalidCoordinates {
        route_index: Option<usize>,
        message: String,
    },
    /// Distance or interpolation math failed
    GeometryComputation { message: String },
    /// Configuration error
    InvalidConfig { message: String },
    /// Route list is larger than the recompute budget allows
    BudgetExceeded { route_count: usize, max_routes: usize },
    /// Config (de)serialization error
    Serialization { message: String },
}

impl RouteClusterError {
    /// Attach a route index to route-level errors that don't carry one yet.
    pub fn with_route_index(self, index: usize) -> Self {
        match self {
            RouteClusterError::DegenerateRoute {
                route_index: None,
                point_count,
                length_km,
            } => RouteClusterError::DegenerateRoute {
                route_index: Some(index),
                point_count,
                length_km,
            },
            RouteClusterError::InvalidCoordinates {
                route_index: None,
                message,
            } => RouteClusterError::InvalidCoordinates {
                route_index: Some(index),
                message,
            },
            other => other,
        }
    }
}

fn route_label(route_index: &Option<usize>) -> String {
    match route_index {
        Some(i) => format!("Route #{}", i),
        None => "Route".to_string(),
    }
}

impl fmt::Display for RouteClusterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteClusterError::DegenerateRoute {
                route_index,
                point_count,
                length_km,
            } => {
                write!(
                    f,
                    "{} is degenerate: {} points, {:.6} km arc length",
                    route_label(route_index),
                    point_count,
                    length_km
                )
            }
            RouteClusterError::InvalidCoordinates {
                route_index,
                message,
            } => {
                write!(
                    f,
                    "{} has invalid coordinates: {}",
                    route_label(route_index),
                    message
                )
            }
            RouteClusterError::GeometryComputation { message } => {
                write!(f, "Geometry computation failed: {}", message)
            }
            RouteClusterError::InvalidConfig { message } => {
                write!(f, "Configuration error: {}", message)
            }
            RouteClusterError::BudgetExceeded {
                route_count,
                max_routes,
            } => {
                write!(
                    f,
                    "Route list has {} routes, recompute budget is {}",
                    route_count, max_routes
                )
            }
            RouteClusterError::Serialization { message } => {
                write!(f, "Serialization error: {}", message)
            }
        }
    }
}

impl std::error::Error for RouteClusterError {}

impl From<serde_json::Error> for RouteClusterError {
    fn from(err: serde_json::Error) -> Self {
        RouteClusterError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type alias for route-clusterer operations.
pub type Result<T> = std::result::Result<T, RouteClusterError>;

/// Extension trait for converting Option to RouteClusterError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a geometry computation error.
    fn ok_or_geometry(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_geometry(self, message: &str) -> Result<T> {
        self.ok_or_else(|| RouteClusterError::GeometryComputation {
            message: message.to_string(),
        })
    }
}
