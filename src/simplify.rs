//! # Track Simplification
//!
//! Reduces a GPS track to fewer points while preserving its shape, for
//! storage and export.
//!
//! Two strategies are offered:
//!
//! | Function | Strategy |
//! |----------|----------|
//! | [`simplify`] | Douglas-Peucker: bounded perpendicular deviation from the original line |
//! | [`simplify_by_distance`] | Distance threshold: drop fixes too close to the last kept one |
//!
//! Tolerances are always meters. Douglas-Peucker runs on a local planar projection
//! anchored at the first point, and uses an explicit work stack so very long
//! tracks cannot exhaust the call stack.
//!
//! Deviation is measured to the chord *segment* between the retained endpoints,
//! clamped at its ends, rather than to the infinite line through them. On an
//! out-and-back track the turnaround lies on the line through start and finish
//! but far from the segment, so it is kept.
//!
//! Both strategies return an order-preserving subsequence of the input that
//! starts with the first point and ends with the last.

use geo::Coord;
use log::debug;

use crate::geo_utils::{haversine_distance, LocalProjection};
use crate::GpsPoint;

/// Simplify a track with Douglas-Peucker, tolerance in meters.
///
/// Inputs with fewer than three points are returned unchanged.
///
/// # Example
///
/// ```rust
/// use track_coverage::{GpsPoint, simplify};
///
/// // A straight line with a 100m detour in the middle
/// let points = vec![
///     GpsPoint::new(46.0000, 7.0),
///     GpsPoint::new(46.0010, 7.0),
///     GpsPoint::new(46.0020, 7.0013),
///     GpsPoint::new(46.0030, 7.0),
///     GpsPoint::new(46.0040, 7.0),
/// ];
///
/// let simplified = simplify(&points, 50.0);
/// assert_eq!(simplified.len(), 3);
/// assert_eq!(simplified[1], points[2]);
/// ```
pub fn simplify(points: &[GpsPoint], tolerance_m: f64) -> Vec<GpsPoint> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let simplified: Vec<GpsPoint> = simplify_indices(points, tolerance_m)
        .into_iter()
        .map(|i| points[i])
        .collect();

    debug!(
        "[Simplify] Douglas-Peucker {} -> {} points (tolerance {:.1}m)",
        points.len(),
        simplified.len(),
        tolerance_m
    );

    simplified
}

/// Indices of the points [`simplify`] keeps, in ascending order.
///
/// Useful for mapping a simplified track back onto the raw fixes.
pub fn simplify_indices(points: &[GpsPoint], tolerance_m: f64) -> Vec<usize> {
    let n = points.len();
    if n < 3 {
        return (0..n).collect();
    }

    let tolerance = sanitize_tolerance(tolerance_m);
    let projection = LocalProjection::new(points[0].latitude, points[0].longitude);
    let coords: Vec<Coord<f64>> = points.iter().map(|p| projection.project(p)).collect();

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    // Each entry is an inclusive (start, end) range whose endpoints are already kept
    let mut stack = vec![(0usize, n - 1)];

    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }

        let mut max_distance = 0.0;
        let mut max_index = start;
        for i in (start + 1)..end {
            let d = point_segment_distance(coords[i], coords[start], coords[end]);
            if d > max_distance {
                max_distance = d;
                max_index = i;
            }
        }

        if max_distance > tolerance {
            keep[max_index] = true;
            stack.push((max_index, end));
            stack.push((start, max_index));
        }
    }

    keep.iter()
        .enumerate()
        .filter_map(|(i, &k)| k.then_some(i))
        .collect()
}

/// Thin a track by distance: keep a point only if it is more than `tolerance_m`
/// meters (haversine) from the last kept point.
///
/// The first and last points are always kept. Cheaper than [`simplify`] but it
/// does not bound shape deviation.
///
/// # Example
///
/// ```rust
/// use track_coverage::{GpsPoint, simplify_by_distance};
///
/// // Fixes roughly 1.1m apart
/// let points: Vec<GpsPoint> = (0..20)
///     .map(|i| GpsPoint::new(46.0 + i as f64 * 0.00001, 7.0))
///     .collect();
///
/// let thinned = simplify_by_distance(&points, 5.0);
/// assert!(thinned.len() < points.len());
/// assert_eq!(thinned.last(), points.last());
/// ```
pub fn simplify_by_distance(points: &[GpsPoint], tolerance_m: f64) -> Vec<GpsPoint> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let tolerance = sanitize_tolerance(tolerance_m);
    let last_index = points.len() - 1;

    let mut kept = Vec::with_capacity(points.len());
    kept.push(points[0]);
    let mut last_kept = points[0];

    for point in &points[1..last_index] {
        if haversine_distance(&last_kept, point) > tolerance {
            kept.push(*point);
            last_kept = *point;
        }
    }
    kept.push(points[last_index]);

    debug!(
        "[Simplify] distance threshold {} -> {} points (tolerance {:.1}m)",
        points.len(),
        kept.len(),
        tolerance_m
    );

    kept
}

fn sanitize_tolerance(tolerance_m: f64) -> f64 {
    if tolerance_m.is_finite() && tolerance_m > 0.0 {
        tolerance_m
    } else {
        0.0
    }
}

/// Planar distance from `p` to the segment `a`-`b`.
fn point_segment_distance(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;

    if len_sq == 0.0 {
        return ((p.x - a.x).powi(2) + (p.y - a.y).powi(2)).sqrt();
    }

    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    let proj_x = a.x + t * dx;
    let proj_y = a.y + t * dy;
    ((p.x - proj_x).powi(2) + (p.y - proj_y).powi(2)).sqrt()
}
