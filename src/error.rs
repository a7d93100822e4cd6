//! Unified error type for track, sector and tile cache operations.
//!
//! Degenerate tracks, cache misses and numeric edge cases are not errors and
//! never surface here. Only input that must be rejected (invalid boundaries,
//! malformed tracks) and infrastructure failures (storage, tile fetch) do.

use thiserror::Error;

/// Errors returned by this crate.
#[derive(Debug, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error), uniffi(flat_error))]
pub enum TrackError {
    /// A sector boundary needs at least three distinct vertices.
    #[error("Sector boundary needs at least 3 points, got {count}")]
    TooFewBoundaryPoints { count: usize },

    /// A boundary vertex appears more than once.
    #[error("Sector boundary repeats vertex {index}")]
    DuplicateBoundaryPoint { index: usize },

    /// All boundary vertices are collinear, so the polygon has no area.
    #[error("Sector boundary encloses no area")]
    DegenerateBoundary,

    /// Two boundary edges cross or overlap.
    #[error("Sector boundary edges {first_edge} and {second_edge} intersect")]
    SelfIntersectingBoundary { first_edge: usize, second_edge: usize },

    /// A point lies outside the WGS84 coordinate range or is not finite.
    #[error("Invalid coordinate at index {index}: ({latitude}, {longitude})")]
    InvalidCoordinate {
        index: usize,
        latitude: f64,
        longitude: f64,
    },

    /// A track point is timestamped before its predecessor.
    #[error("Track timestamps decrease at index {index}")]
    UnorderedTimestamps { index: usize },

    /// The tile fetch collaborator failed.
    #[error("Tile fetch failed: {0}")]
    TileFetch(String),

    /// Tile storage failed for a reason other than SQLite.
    #[error("Tile storage error: {0}")]
    Storage(String),

    /// SQLite error from the persistent tile cache.
    #[cfg(feature = "persistence")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl TrackError {
    /// True for errors caused by rejected input rather than infrastructure.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TrackError::TooFewBoundaryPoints { .. }
                | TrackError::DuplicateBoundaryPoint { .. }
                | TrackError::DegenerateBoundary
                | TrackError::SelfIntersectingBoundary { .. }
                | TrackError::InvalidCoordinate { .. }
                | TrackError::UnorderedTimestamps { .. }
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TrackError>;
