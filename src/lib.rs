//! # Track Coverage
//!
//! Geospatial core for coordinating search teams in the field.
//!
//! This library provides:
//! - GPS track simplification (Douglas-Peucker and distance threshold)
//! - Track analytics (distance, speed, moving time, elevation, pace, 1 km splits)
//! - Search sector coverage estimation from buffered track points
//! - Map tile caching with time-to-live expiry
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel processing with rayon
//! - **`persistence`** - Enable the SQLite-backed tile cache
//! - **`http`** - Enable the HTTP tile fetcher
//! - **`serde`** - Derive serde traits on point and result types
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use track_coverage::{GpsPoint, analyze, estimate_coverage, simplify};
//!
//! // A short walk, one ping every 10 seconds
//! let track: Vec<GpsPoint> = (0..30)
//!     .map(|i| GpsPoint::at(46.0 + i as f64 * 0.0001, 7.0, 1_700_000_000 + i * 10))
//!     .collect();
//!
//! let simplified = simplify(&track, 5.0);
//! assert_eq!(simplified.first(), track.first());
//! assert_eq!(simplified.last(), track.last());
//!
//! let stats = analyze(&track);
//! println!("{:.2} km in {:.0} s", stats.total_distance_km, stats.duration_s);
//!
//! let sector = vec![
//!     GpsPoint::new(45.999, 6.999),
//!     GpsPoint::new(46.004, 6.999),
//!     GpsPoint::new(46.004, 7.001),
//!     GpsPoint::new(45.999, 7.001),
//! ];
//! let percent = estimate_coverage(&sector, &[track], 50.0).unwrap();
//! assert!(percent > 0.0 && percent <= 100.0);
//! ```

// Unified error handling
pub mod error;
pub use error::{Result, TrackError};

// Geographic utilities (distance, bounds, projection)
pub mod geo_utils;

// Point simplification
pub mod simplify;
pub use simplify::{simplify, simplify_by_distance, simplify_indices};

// Track analytics
pub mod analysis;
pub use analysis::{analyze, analyze_tracks, analyze_with_config, AnalysisConfig, TrackSegment, TrackStats};
#[cfg(feature = "parallel")]
pub use analysis::analyze_tracks_parallel;

// Sector coverage estimation
pub mod coverage;
pub use coverage::{
    estimate_coverage, estimate_coverage_with_config, validate_boundary,
    CoverageConfig, CoverageResult, DEFAULT_BUFFER_RADIUS_M,
};
#[cfg(feature = "parallel")]
pub use coverage::estimate_coverage_batch;

// Sector model and coverage progress
pub mod sector;
pub use sector::{sector_progress, CoverageSample, ProgressMode, Sector, SectorStatus};

// Tile caching
pub mod tile_cache;
pub use tile_cache::{
    get_or_fetch, CachedTile, MemoryTileCache, TileCache, TileFetcher, TileKey,
    TileOrigin, TileResponse, BLANK_TILE, DEFAULT_TILE_TTL,
};

// SQLite-backed tile cache
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::SqliteTileCache;

// HTTP tile fetching
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::{prefetch_tiles_sync, HttpTileFetcher, TileFetchResult};

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("TrackCoverageRust")
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A GPS fix: position, time and optional elevation/accuracy.
///
/// Timestamps are Unix seconds.
///
/// # Example
/// ```
/// use track_coverage::GpsPoint;
/// let point = GpsPoint::at(51.5074, -0.1278, 1_700_000_000).with_elevation(11.0);
/// assert_eq!(point.elevation, Some(11.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Unix timestamp in seconds
    #[cfg_attr(feature = "serde", serde(default))]
    pub timestamp: i64,
    /// Elevation in meters
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub elevation: Option<f64>,
    /// Horizontal accuracy in meters
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub accuracy: Option<f64>,
}

impl GpsPoint {
    /// Create an untimed GPS point (timestamp 0).
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self::at(latitude, longitude, 0)
    }

    /// Create a GPS point with a Unix timestamp in seconds.
    pub fn at(latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
            elevation: None,
            accuracy: None,
        }
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
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

    /// True if both points sit at the same coordinates, ignoring time.
    pub fn same_position(&self, other: &GpsPoint) -> bool {
        self.latitude == other.latitude && self.longitude == other.longitude
    }
}

/// Bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
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
        Some(geo_utils::compute_bounds(points))
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// A recorded track: the ordered fixes one team member produced.
///
/// Owned by the coordinating application; this crate only derives values from it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Track {
    pub id: String,
    pub owner_id: String,
    pub points: Vec<GpsPoint>,
    /// Unix timestamp in seconds
    pub created_at: i64,
}

impl Track {
    /// Create a track, rejecting invalid coordinates and decreasing timestamps.
    ///
    /// Tracks with fewer than two points are accepted.
    ///
    /// # Example
    /// ```
    /// use track_coverage::{GpsPoint, Track};
    ///
    /// let ok = Track::new("t1", "alice", vec![
    ///     GpsPoint::at(46.0, 7.0, 100),
    ///     GpsPoint::at(46.001, 7.0, 110),
    /// ], 100);
    /// assert!(ok.is_ok());
    ///
    /// let backwards = Track::new("t2", "alice", vec![
    ///     GpsPoint::at(46.0, 7.0, 110),
    ///     GpsPoint::at(46.001, 7.0, 100),
    /// ], 100);
    /// assert!(backwards.is_err());
    /// ```
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        points: Vec<GpsPoint>,
        created_at: i64,
    ) -> Result<Self> {
        validate_track_points(&points)?;
        Ok(Self {
            id: id.into(),
            owner_id: owner_id.into(),
            points,
            created_at,
        })
    }

    /// A copy of this track simplified with a tolerance in meters.
    pub fn simplified(&self, tolerance_m: f64) -> Track {
        Track {
            id: self.id.clone(),
            owner_id: self.owner_id.clone(),
            points: simplify::simplify(&self.points, tolerance_m),
            created_at: self.created_at,
        }
    }

    /// Movement statistics with the default analysis settings.
    pub fn stats(&self) -> TrackStats {
        analysis::analyze(&self.points)
    }

    /// Total length in meters.
    pub fn distance_meters(&self) -> f64 {
        geo_utils::polyline_length(&self.points)
    }

    /// Fewer than two points: valid, but nothing to measure.
    pub fn is_degenerate(&self) -> bool {
        self.points.len() < 2
    }
}

impl AsRef<[GpsPoint]> for Track {
    fn as_ref(&self) -> &[GpsPoint] {
        &self.points
    }
}

/// Check that every point is a valid coordinate and timestamps never decrease.
pub fn validate_track_points(points: &[GpsPoint]) -> Result<()> {
    for (index, p) in points.iter().enumerate() {
        if !p.is_valid() {
            return Err(TrackError::InvalidCoordinate {
                index,
                latitude: p.latitude,
                longitude: p.longitude,
            });
        }
        if index > 0 && p.timestamp < points[index - 1].timestamp {
            return Err(TrackError::UnorderedTimestamps { index });
        }
    }
    Ok(())
}

// ============================================================================
// FFI Exports (only when feature enabled)
// ============================================================================

#[cfg(feature = "ffi")]
mod ffi {
    use super::*;
    use log::{debug, info};

    /// Simplify a track with Douglas-Peucker, tolerance in meters.
    #[uniffi::export]
    pub fn ffi_simplify_track(points: Vec<GpsPoint>, tolerance_meters: f64) -> Vec<GpsPoint> {
        init_logging();
        let simplified = simplify::simplify(&points, tolerance_meters);
        info!(
            "[TrackCoverageRust] simplify_track: {} -> {} points (tolerance {:.1}m)",
            points.len(), simplified.len(), tolerance_meters
        );
        simplified
    }

    /// Thin a track by dropping points closer than the tolerance to the last kept point.
    #[uniffi::export]
    pub fn ffi_simplify_by_distance(points: Vec<GpsPoint>, tolerance_meters: f64) -> Vec<GpsPoint> {
        init_logging();
        simplify::simplify_by_distance(&points, tolerance_meters)
    }

    /// Compute movement statistics for a track.
    #[uniffi::export]
    pub fn ffi_analyze_track(points: Vec<GpsPoint>, config: AnalysisConfig) -> TrackStats {
        init_logging();
        debug!("[TrackCoverageRust] analyze_track called with {} points", points.len());
        analysis::analyze_with_config(&points, &config)
    }

    /// Estimate how much of a sector the given tracks cover.
    #[uniffi::export]
    pub fn ffi_estimate_coverage(
        boundary: Vec<GpsPoint>,
        tracks: Vec<Vec<GpsPoint>>,
        config: CoverageConfig,
    ) -> std::result::Result<CoverageResult, TrackError> {
        init_logging();
        let start = std::time::Instant::now();
        let result = coverage::estimate_coverage_with_config(&boundary, &tracks, &config)?;
        info!(
            "[TrackCoverageRust] estimate_coverage: {:.1}% from {} tracks ({} buffered points) in {:?}",
            result.coverage_percent, tracks.len(), result.points_buffered, start.elapsed()
        );
        Ok(result)
    }

    /// Validate a sector boundary, returning the normalized (open) ring.
    #[uniffi::export]
    pub fn ffi_validate_boundary(boundary: Vec<GpsPoint>) -> std::result::Result<Vec<GpsPoint>, TrackError> {
        init_logging();
        coverage::validate_boundary(&boundary)
    }

    /// Status a sector with the given coverage may move to.
    #[uniffi::export]
    pub fn ffi_suggest_sector_status(coverage_percent: f64) -> SectorStatus {
        SectorStatus::suggested_for(coverage_percent)
    }

    /// Aggregate coverage samples of one sector into a progress percentage.
    #[uniffi::export]
    pub fn ffi_sector_progress(samples: Vec<CoverageSample>, mode: ProgressMode) -> f64 {
        sector::sector_progress(&samples, mode)
    }

    /// Get default coverage configuration.
    #[uniffi::export]
    pub fn default_coverage_config() -> CoverageConfig {
        CoverageConfig::default()
    }

    /// Get default analysis configuration.
    #[uniffi::export]
    pub fn default_analysis_config() -> AnalysisConfig {
        AnalysisConfig::default()
    }
}

// ============================================================================
// Tests
// ============================================================================
