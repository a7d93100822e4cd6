//! # Geographic Utilities
//!
//! Core geographic computation utilities shared by simplification, analysis
//! and coverage estimation.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`polyline_length`] | Total length of a GPS track in meters |
//! | [`compute_bounds`] | Bounding box of a GPS track |
//! | [`LocalProjection`] | Equirectangular projection to a local meter plane |
//!
//! ## Example
//!
//! ```rust
//! use track_coverage::{GpsPoint, geo_utils};
//!
//! let track = vec![
//!     GpsPoint::new(51.5074, -0.1278),  // London
//!     GpsPoint::new(51.5080, -0.1290),
//!     GpsPoint::new(51.5090, -0.1300),
//! ];
//!
//! let length = geo_utils::polyline_length(&track);
//! println!("Track length: {:.0}m", length);
//!
//! let bounds = geo_utils::compute_bounds(&track);
//! println!("Bounds: {:.4}N to {:.4}N", bounds.min_lat, bounds.max_lat);
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Haversine Formula
//!
//! The haversine formula calculates the great-circle distance between two points on a sphere:
//!
//! ```text
//! a = sin²(Δlat/2) + cos(lat1)·cos(lat2)·sin²(Δlon/2)
//! c = 2·atan2(√a, √(1−a))
//! d = R·c
//! ```
//!
//! Reference: [Haversine formula (Wikipedia)](https://en.wikipedia.org/wiki/Haversine_formula)
//!
//! ### Local Projection
//!
//! Planar work (perpendicular distances, buffers, polygon areas) happens in a
//! local equirectangular plane measured in meters. Over the extent of a search
//! sector or a single track the distortion is well below GPS noise.

use geo::{Coord, Distance, Haversine, Point};
use crate::{Bounds, GpsPoint};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude on the sphere of radius [`EARTH_RADIUS_M`].
pub const METERS_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two GPS points using the Haversine formula.
///
/// Returns the distance in meters along the Earth's surface (assuming a spherical Earth
/// with radius 6,371 km).
///
/// # Example
///
/// ```rust
/// use track_coverage::{GpsPoint, geo_utils};
///
/// let a = GpsPoint::new(0.0, 0.0);
/// let b = GpsPoint::new(0.0, 1.0);
///
/// let distance = geo_utils::haversine_distance(&a, &b);
/// assert!((distance - 111_195.0).abs() < 100.0);
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Calculate the total length of a polyline (GPS track) in meters.
///
/// Sums the haversine distance between consecutive points. Empty or single-point
/// tracks return 0.0.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Compute the bounding box of a GPS track.
///
/// For empty input, returns a bounds with MIN/MAX values that will fail any
/// containment check.
pub fn compute_bounds(points: &[GpsPoint]) -> Bounds {
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

    Bounds { min_lat, max_lat, min_lng, max_lng }
}

// =============================================================================
// Local Projection
// =============================================================================

/// Equirectangular projection of WGS84 coordinates onto a local plane in meters.
///
/// `x` grows east and `y` grows north from the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalProjection {
    origin_lat: f64,
    origin_lng: f64,
    cos_lat: f64,
}

impl LocalProjection {
    /// Create a projection centred on the given origin.
    pub fn new(origin_lat: f64, origin_lng: f64) -> Self {
        Self {
            origin_lat,
            origin_lng,
            // Clamp so polar origins don't collapse the x axis
            cos_lat: origin_lat.to_radians().cos().max(1e-6),
        }
    }

    /// Create a projection centred on the middle of the bounds.
    pub fn centered_on(bounds: &Bounds) -> Self {
        let center = bounds.center();
        Self::new(center.latitude, center.longitude)
    }

    /// Project a point to planar meters.
    #[inline]
    pub fn project(&self, point: &GpsPoint) -> Coord<f64> {
        Coord {
            x: (point.longitude - self.origin_lng) * METERS_PER_DEGREE * self.cos_lat,
            y: (point.latitude - self.origin_lat) * METERS_PER_DEGREE,
        }
    }

    /// Inverse of [`LocalProjection::project`], returning (latitude, longitude).
    #[inline]
    pub fn unproject(&self, coord: Coord<f64>) -> (f64, f64) {
        (
            self.origin_lat + coord.y / METERS_PER_DEGREE,
            self.origin_lng + coord.x / (METERS_PER_DEGREE * self.cos_lat),
        )
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
        let p = GpsPoint::new(51.5074, -0.1278);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_one_degree_at_equator() {
        let a = GpsPoint::new(0.0, 0.0);
        let b = GpsPoint::new(0.0, 1.0);
        let dist_km = haversine_distance(&a, &b) / 1000.0;
        // 111.19 km within 0.5%
        assert!(approx_eq(dist_km, 111.19, 111.19 * 0.005), "got {}", dist_km);
    }

    #[test]
    fn test_haversine_distance_known_value() {
        // London to Paris is approximately 344 km
        let london = GpsPoint::new(51.5074, -0.1278);
        let paris = GpsPoint::new(48.8566, 2.3522);
        let dist = haversine_distance(&london, &paris);
        assert!(approx_eq(dist, 343_560.0, 5000.0));
    }

    #[test]
    fn test_polyline_length_degenerate() {
        let empty: Vec<GpsPoint> = vec![];
        assert_eq!(polyline_length(&empty), 0.0);
        assert_eq!(polyline_length(&[GpsPoint::new(51.5074, -0.1278)]), 0.0);
    }

    #[test]
    fn test_polyline_length_two_points() {
        let track = vec![
            GpsPoint::new(51.5074, -0.1278),
            GpsPoint::new(51.5080, -0.1280),
        ];
        let length = polyline_length(&track);
        assert!(length > 0.0);
        assert!(length < 100.0);
    }

    #[test]
    fn test_compute_bounds() {
        let track = vec![
            GpsPoint::new(51.50, -0.13),
            GpsPoint::new(51.51, -0.12),
            GpsPoint::new(51.505, -0.125),
        ];
        let bounds = compute_bounds(&track);
        assert_eq!(bounds.min_lat, 51.50);
        assert_eq!(bounds.max_lat, 51.51);
        assert_eq!(bounds.min_lng, -0.13);
        assert_eq!(bounds.max_lng, -0.12);
    }

    #[test]
    fn test_projection_matches_haversine_locally() {
        let proj = LocalProjection::new(46.0, 7.0);
        let a = GpsPoint::new(46.001, 7.002);
        let b = GpsPoint::new(46.004, 6.998);

        let pa = proj.project(&a);
        let pb = proj.project(&b);
        let planar = ((pa.x - pb.x).powi(2) + (pa.y - pb.y).powi(2)).sqrt();
        let great_circle = haversine_distance(&a, &b);

        assert!(approx_eq(planar, great_circle, great_circle * 0.001));
    }

    #[test]
    fn test_projection_roundtrip_origin() {
        let proj = LocalProjection::new(-33.9, 18.4);
        let origin = proj.project(&GpsPoint::new(-33.9, 18.4));
        assert!(approx_eq(origin.x, 0.0, 1e-9));
        assert!(approx_eq(origin.y, 0.0, 1e-9));

        let (lat, lng) = proj.unproject(Coord { x: 1000.0, y: -500.0 });
        let back = proj.project(&GpsPoint::new(lat, lng));
        assert!(approx_eq(back.x, 1000.0, 1e-6));
        assert!(approx_eq(back.y, -500.0, 1e-6));
    }
}
