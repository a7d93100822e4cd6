//! # Sector Coverage Estimation
//!
//! Estimates what fraction of a search sector has been physically covered by
//! the teams' tracks.
//!
//! ## Algorithm
//! 1. Validate the sector boundary (>= 3 distinct vertices, simple polygon)
//! 2. Project boundary and track points onto a local plane in meters
//! 3. Drop points whose buffer cannot reach the sector, thin the rest with an
//!    R-tree so buffered centres are at least `radius × min_point_spacing_ratio`
//!    apart. Above `max_buffer_points` the spacing grows towards the radius
//!    until the points fit, so a dense sweep keeps covering its whole footprint
//! 4. Buffer every remaining point into a disk of `buffer_radius_m`
//! 5. Union the disks by balanced pairwise reduction
//! 6. Coverage = (sector area − uncovered area) / sector area × 100, clamped to [0, 100]
//!
//! Computing the uncovered remainder (sector minus union) rather than the
//! intersection means a union that swallows the sector leaves nothing behind
//! and reports exactly 100.

use std::collections::HashSet;
use std::f64::consts::TAU;

use geo::{Area, BooleanOps, BoundingRect, Coord, Line, LineString, MultiPolygon, Polygon};
use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use log::{debug, warn};
use rstar::RTree;

use crate::geo_utils::{compute_bounds, LocalProjection};
use crate::{GpsPoint, Result, TrackError};

/// Default buffer radius around each track point, in meters.
pub const DEFAULT_BUFFER_RADIUS_M: f64 = 50.0;

// Sectors smaller than this (m²) are treated as having no area
const MIN_SECTOR_AREA_M2: f64 = 1e-3;

// Results within this many percentage points of 0 or 100 snap to the bound
const COVERAGE_SNAP_PERCENT: f64 = 1e-3;

const MIN_CIRCLE_SEGMENTS: u32 = 8;

// Factor applied to the thinning spacing while the point count exceeds the cap
const SPACING_GROWTH: f64 = 1.5;

/// Configuration for coverage estimation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoverageConfig {
    /// Radius searched around each track point.
    /// Default: 50.0 meters
    pub buffer_radius_m: f64,

    /// Vertices per buffer disk (minimum 8).
    /// Default: 32
    pub circle_segments: u32,

    /// Maximum points buffered per call; 0 disables the cap.
    /// Default: 20000
    pub max_buffer_points: u32,

    /// Points closer than `buffer_radius_m × ratio` to an already buffered
    /// point are skipped. 0 disables thinning.
    /// Default: 0.25
    pub min_point_spacing_ratio: f64,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            buffer_radius_m: DEFAULT_BUFFER_RADIUS_M,
            circle_segments: 32,
            max_buffer_points: 20_000,
            min_point_spacing_ratio: 0.25,
        }
    }
}

/// Result of a coverage estimation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoverageResult {
    /// Covered share of the sector, always within [0, 100]
    pub coverage_percent: f64,
    /// Planar sector area
    pub sector_area_m2: f64,
    /// Planar area of the sector inside the buffer union
    pub covered_area_m2: f64,
    /// Track points supplied
    pub points_considered: u32,
    /// Track points actually buffered after filtering, thinning and capping
    pub points_buffered: u32,
}

/// Validate a sector boundary and return it as an open ring.
///
/// An explicitly closed ring (last point equal to the first) is accepted and
/// the closing point dropped.
///
/// # Errors
///
/// - [`TrackError::TooFewBoundaryPoints`] with fewer than three vertices
/// - [`TrackError::InvalidCoordinate`] for out-of-range or non-finite vertices
/// - [`TrackError::DuplicateBoundaryPoint`] when a vertex repeats
/// - [`TrackError::DegenerateBoundary`] when the ring encloses no area
/// - [`TrackError::SelfIntersectingBoundary`] when two edges cross or overlap
///
/// # Example
///
/// ```rust
/// use track_coverage::{GpsPoint, validate_boundary, TrackError};
///
/// let square = vec![
///     GpsPoint::new(0.0, 0.0),
///     GpsPoint::new(0.0, 1.0),
///     GpsPoint::new(1.0, 1.0),
///     GpsPoint::new(1.0, 0.0),
/// ];
/// assert_eq!(validate_boundary(&square).unwrap().len(), 4);
///
/// let bowtie = vec![
///     GpsPoint::new(0.0, 0.0),
///     GpsPoint::new(1.0, 1.0),
///     GpsPoint::new(0.0, 1.0),
///     GpsPoint::new(1.0, 0.0),
/// ];
/// assert!(matches!(
///     validate_boundary(&bowtie),
///     Err(TrackError::SelfIntersectingBoundary { .. })
/// ));
/// ```
pub fn validate_boundary(boundary: &[GpsPoint]) -> Result<Vec<GpsPoint>> {
    prepare_sector(boundary).map(|sector| sector.ring)
}

/// Estimate the percentage of a sector covered by the given tracks.
///
/// Each track point is buffered by `buffer_radius_m` meters; see
/// [`estimate_coverage_with_config`] for the full result and tuning knobs.
///
/// Returns 0 when no tracks (or no points) are supplied.
pub fn estimate_coverage<T: AsRef<[GpsPoint]>>(
    boundary: &[GpsPoint],
    tracks: &[T],
    buffer_radius_m: f64,
) -> Result<f64> {
    let config = CoverageConfig {
        buffer_radius_m,
        ..CoverageConfig::default()
    };
    estimate_coverage_with_config(boundary, tracks, &config).map(|r| r.coverage_percent)
}

/// Estimate sector coverage, returning areas and point counts alongside the percentage.
///
/// Fails only when the boundary is invalid; nothing is computed in that case.
pub fn estimate_coverage_with_config<T: AsRef<[GpsPoint]>>(
    boundary: &[GpsPoint],
    tracks: &[T],
    config: &CoverageConfig,
) -> Result<CoverageResult> {
    let sector = prepare_sector(boundary)?;
    let sector_area_m2 = sector.polygon.unsigned_area();

    let points_considered: usize = tracks.iter().map(|t| t.as_ref().len()).sum();
    let radius = config.buffer_radius_m;

    let mut result = CoverageResult {
        coverage_percent: 0.0,
        sector_area_m2,
        covered_area_m2: 0.0,
        points_considered: points_considered as u32,
        points_buffered: 0,
    };

    if points_considered == 0 || !radius.is_finite() || radius <= 0.0 {
        return Ok(result);
    }

    let centres = select_buffer_centres(tracks, &sector, config);
    result.points_buffered = centres.len() as u32;
    if centres.is_empty() {
        debug!("[Coverage] No track points within {:.0}m of the sector", radius);
        return Ok(result);
    }

    let disks: Vec<MultiPolygon<f64>> = centres
        .iter()
        .map(|c| MultiPolygon::new(vec![disk(*c, radius, config.circle_segments)]))
        .collect();
    let union = union_all(disks);

    let uncovered = sector.polygon.difference(&union).unsigned_area();
    let covered = (sector_area_m2 - uncovered).max(0.0);
    let mut percent = (covered / sector_area_m2 * 100.0).clamp(0.0, 100.0);
    if percent > 100.0 - COVERAGE_SNAP_PERCENT {
        percent = 100.0;
    } else if percent < COVERAGE_SNAP_PERCENT {
        percent = 0.0;
    }

    debug!(
        "[Coverage] {:.2}% of {:.0}m² covered by {} buffered points ({} supplied)",
        percent, sector_area_m2, centres.len(), points_considered
    );

    result.coverage_percent = percent;
    result.covered_area_m2 = sector_area_m2 * percent / 100.0;
    Ok(result)
}

/// Estimate coverage for many sectors in parallel.
///
/// Each entry pairs a sector boundary with the tracks to test against it. An
/// invalid boundary fails only its own entry.
#[cfg(feature = "parallel")]
pub fn estimate_coverage_batch<B, T>(
    requests: &[(B, Vec<T>)],
    config: &CoverageConfig,
) -> Vec<Result<CoverageResult>>
where
    B: AsRef<[GpsPoint]> + Sync,
    T: AsRef<[GpsPoint]> + Sync,
{
    use log::info;
    use rayon::prelude::*;

    let start = std::time::Instant::now();
    let results: Vec<Result<CoverageResult>> = requests
        .par_iter()
        .map(|(boundary, tracks)| estimate_coverage_with_config(boundary.as_ref(), tracks, config))
        .collect();

    info!(
        "[Coverage] Batch of {} sectors estimated in {:?}",
        requests.len(),
        start.elapsed()
    );
    results
}

// =============================================================================
// Boundary Validation
// =============================================================================

struct PreparedSector {
    ring: Vec<GpsPoint>,
    projection: LocalProjection,
    polygon: Polygon<f64>,
}

fn prepare_sector(boundary: &[GpsPoint]) -> Result<PreparedSector> {
    let mut ring = boundary.to_vec();
    if ring.len() > 1 && ring[0].same_position(&ring[ring.len() - 1]) {
        ring.pop();
    }

    if ring.len() < 3 {
        return Err(TrackError::TooFewBoundaryPoints { count: ring.len() });
    }

    for (index, p) in ring.iter().enumerate() {
        if !p.is_valid() {
            return Err(TrackError::InvalidCoordinate {
                index,
                latitude: p.latitude,
                longitude: p.longitude,
            });
        }
    }

    let mut seen = HashSet::with_capacity(ring.len());
    for (index, p) in ring.iter().enumerate() {
        if !seen.insert((p.latitude.to_bits(), p.longitude.to_bits())) {
            return Err(TrackError::DuplicateBoundaryPoint { index });
        }
    }

    let projection = LocalProjection::centered_on(&compute_bounds(&ring));
    let coords: Vec<Coord<f64>> = ring.iter().map(|p| projection.project(p)).collect();

    if let Some((first_edge, second_edge)) = find_edge_intersection(&coords) {
        return Err(TrackError::SelfIntersectingBoundary { first_edge, second_edge });
    }

    // Catches rings that are collinear up to rounding
    let polygon = Polygon::new(LineString::new(coords), vec![]);
    if polygon.unsigned_area() < MIN_SECTOR_AREA_M2 {
        return Err(TrackError::DegenerateBoundary);
    }

    Ok(PreparedSector { ring, projection, polygon })
}

/// First pair of edges that intersect illegally, if any.
///
/// Edge `i` runs from vertex `i` to vertex `i + 1` (wrapping). Adjacent edges may
/// only touch at their shared vertex; all other pairs may not touch at all.
fn find_edge_intersection(coords: &[Coord<f64>]) -> Option<(usize, usize)> {
    let n = coords.len();
    let edges: Vec<Line<f64>> = (0..n)
        .map(|i| Line::new(coords[i], coords[(i + 1) % n]))
        .collect();

    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(edges[i], edges[j]) {
                None => {}
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(_) => return Some((i, j)),
            }
        }
    }
    None
}

// =============================================================================
// Buffering
// =============================================================================

/// Project, filter, thin and cap the track points that will be buffered.
fn select_buffer_centres<T: AsRef<[GpsPoint]>>(
    tracks: &[T],
    sector: &PreparedSector,
    config: &CoverageConfig,
) -> Vec<Coord<f64>> {
    let radius = config.buffer_radius_m;
    let reach = match sector.polygon.bounding_rect() {
        Some(rect) => rect,
        None => return Vec::new(),
    };
    let (min, max) = (reach.min(), reach.max());

    let candidates: Vec<Coord<f64>> = tracks
        .iter()
        .flat_map(|t| t.as_ref().iter())
        .filter(|p| p.is_valid())
        .map(|p| sector.projection.project(p))
        .filter(|c| {
            c.x >= min.x - radius
                && c.x <= max.x + radius
                && c.y >= min.y - radius
                && c.y <= max.y + radius
        })
        .collect();

    let ratio = config.min_point_spacing_ratio;
    let mut spacing = if ratio.is_finite() { (radius * ratio).clamp(0.0, radius) } else { 0.0 };
    let mut kept = thin_by_spacing(&candidates, spacing);

    let cap = config.max_buffer_points as usize;
    if cap == 0 || kept.len() <= cap {
        return kept;
    }

    // Coarsen the spacing towards the radius; neighbouring disks then still overlap
    while kept.len() > cap && spacing < radius {
        spacing = if spacing > 0.0 {
            (spacing * SPACING_GROWTH).min(radius)
        } else {
            radius / 8.0
        };
        kept = thin_by_spacing(&candidates, spacing);
    }
    debug!(
        "[Coverage] Thinned {} points to {} at {:.1}m spacing",
        candidates.len(),
        kept.len(),
        spacing
    );

    if kept.len() > cap {
        warn!(
            "[Coverage] {} points still exceed the cap of {} at {:.1}m spacing, sampling uniformly",
            kept.len(),
            cap,
            spacing
        );
        let step = kept.len() as f64 / cap as f64;
        kept = (0..cap).map(|i| kept[(i as f64 * step) as usize]).collect();
    }

    kept
}

/// Greedily keep points at least `spacing` meters from every point kept before them.
fn thin_by_spacing(points: &[Coord<f64>], spacing: f64) -> Vec<Coord<f64>> {
    let spacing_sq = spacing * spacing;
    let mut index: RTree<[f64; 2]> = RTree::new();
    let mut kept = Vec::new();

    for c in points {
        let key = [c.x, c.y];
        if index.locate_within_distance(key, spacing_sq).next().is_some() {
            continue;
        }
        index.insert(key);
        kept.push(*c);
    }

    kept
}

/// Regular polygon approximating a disk.
fn disk(center: Coord<f64>, radius: f64, segments: u32) -> Polygon<f64> {
    let n = segments.max(MIN_CIRCLE_SEGMENTS) as usize;
    let coords: Vec<Coord<f64>> = (0..n)
        .map(|i| {
            let angle = TAU * i as f64 / n as f64;
            Coord {
                x: center.x + radius * angle.cos(),
                y: center.y + radius * angle.sin(),
            }
        })
        .collect();
    Polygon::new(LineString::new(coords), vec![])
}

/// Union all shapes by repeatedly merging neighbouring pairs.
///
/// Balanced merging keeps intermediate shapes small compared to folding every
/// disk into one growing accumulator.
fn union_all(mut layer: Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    while layer.len() > 1 {
        layer = union_layer(&layer);
    }
    layer.pop().unwrap_or_else(|| MultiPolygon::new(Vec::new()))
}

#[cfg(not(feature = "parallel"))]
fn union_layer(layer: &[MultiPolygon<f64>]) -> Vec<MultiPolygon<f64>> {
    layer.chunks(2).map(union_pair).collect()
}

#[cfg(feature = "parallel")]
fn union_layer(layer: &[MultiPolygon<f64>]) -> Vec<MultiPolygon<f64>> {
    use rayon::prelude::*;

    layer.par_chunks(2).map(union_pair).collect()
}

fn union_pair(pair: &[MultiPolygon<f64>]) -> MultiPolygon<f64> {
    match pair {
        [a, b] => a.union(b),
        [a] => a.clone(),
        _ => MultiPolygon::new(Vec::new()),
    }
}

// =============================================================================
// Tests
// =============================================================================
