//! # Geographic Utilities
//!
//! Distance and centroid helpers shared by coordinate grouping and rendering.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`central_angle`] | Great-circle distance expressed as an angle in radians |
//! | [`meters_to_radians`] | Convert a surface distance to an angle on the Earth sphere |
//! | [`meters_to_degrees`] | Convert meters to approximate degrees at a latitude |
//! | [`compute_center`] | Unweighted centroid of a set of points |
//!
//! ## Example
//!
//! ```rust
//! use ride_pulse::{GpsPoint, geo_utils};
//!
//! let dock_a = GpsPoint::new(42.3601, -71.0589);
//! let dock_b = GpsPoint::new(42.3603, -71.0589);
//!
//! // ~22m apart: inside the default 30m grouping threshold
//! let angle = geo_utils::central_angle(&dock_a, &dock_b);
//! assert!(angle <= geo_utils::meters_to_radians(30.0));
//! ```
//!
//! ## Coordinate System
//!
//! All functions expect WGS84 coordinates (latitude/longitude in degrees). Centroids
//! and degree conversions are small-area approximations, fine for a single metro area.

use geo::{Point, Haversine, Distance};
use crate::GpsPoint;

/// Mean Earth radius used to turn a grouping threshold into an angle.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Sphere radius behind `geo`'s haversine distance.
const HAVERSINE_RADIUS_METERS: f64 = 6_371_008.8;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two GPS points using the Haversine formula.
///
/// Returns the distance in meters along the Earth's surface.
///
/// # Example
///
/// ```rust
/// use ride_pulse::{GpsPoint, geo_utils};
///
/// let boston = GpsPoint::new(42.3601, -71.0589);
/// let cambridge = GpsPoint::new(42.3736, -71.1097);
///
/// let distance = geo_utils::haversine_distance(&boston, &cambridge);
/// assert!((distance - 4_440.0).abs() < 100.0);
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Great-circle separation of two points in radians.
///
/// Independent of the sphere radius, so it can be compared directly against
/// [`meters_to_radians`] of a threshold.
#[inline]
pub fn central_angle(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    haversine_distance(p1, p2) / HAVERSINE_RADIUS_METERS
}

/// Convert a surface distance in meters to an angle in radians on a sphere
/// of radius [`EARTH_RADIUS_METERS`].
///
/// ```rust
/// use ride_pulse::geo_utils::meters_to_radians;
///
/// let eps = meters_to_radians(30.0);
/// assert!((eps - 30.0 / 6_371_000.0).abs() < 1e-15);
/// ```
#[inline]
pub fn meters_to_radians(meters: f64) -> f64 {
    meters / EARTH_RADIUS_METERS
}

/// Convert meters to approximate degrees at a given latitude.
///
/// Uses the longitude scale at `latitude`, which is the larger of the two
/// degree spans, so the result is suitable as a square search buffer.
///
/// # Notes
///
/// - At the equator, 1 degree ≈ 111,320 meters
/// - At 45°N/S, 1 degree of longitude ≈ 78,710 meters
/// - Near the poles the cosine is clamped to keep the buffer finite
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let lat_rad = latitude.to_radians();
    let meters_per_degree = 111_320.0 * lat_rad.cos().max(0.1);
    meters / meters_per_degree
}

// =============================================================================
// Centroid
// =============================================================================

/// Compute the arithmetic mean of latitudes and longitudes.
///
/// Unweighted: every member counts once regardless of its distance to the
/// others. Returns (0, 0) for empty input.
pub fn compute_center(points: &[GpsPoint]) -> GpsPoint {
    if points.is_empty() {
        return GpsPoint::new(0.0, 0.0);
    }

    let sum_lat: f64 = points.iter().map(|p| p.latitude).sum();
    let sum_lng: f64 = points.iter().map(|p| p.longitude).sum();
    let n = points.len() as f64;

    GpsPoint::new(sum_lat / n, sum_lng / n)
}

// =============================================================================
// Unit Tests
// =============================================================================
