//! Search sectors and coverage progress.
//!
//! A [`Sector`] is a validated polygon assigned to a team within an operation.
//! The sector lifecycle (creation, storage, status changes, notifications)
//! belongs to the coordinating application; this module only validates
//! boundaries at construction, suggests a status for a coverage value and
//! aggregates coverage samples into a progress figure.

use crate::coverage::{estimate_coverage_with_config, validate_boundary, CoverageConfig, CoverageResult};
use crate::{GpsPoint, Result};

/// Lifecycle state of a sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SectorStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl SectorStatus {
    /// Status a sector with this coverage may move to.
    ///
    /// Full coverage allows completion, any coverage means work is in progress.
    pub fn suggested_for(coverage_percent: f64) -> Self {
        if coverage_percent >= 100.0 {
            SectorStatus::Completed
        } else if coverage_percent > 0.0 {
            SectorStatus::InProgress
        } else {
            SectorStatus::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SectorStatus::Pending => "pending",
            SectorStatus::InProgress => "in_progress",
            SectorStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for SectorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bounded search area within an operation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sector {
    pub id: String,
    pub operation_id: String,
    /// Open ring of at least three distinct vertices
    pub boundary: Vec<GpsPoint>,
    pub priority: i32,
    pub status: SectorStatus,
    pub assigned_team: Option<String>,
}

impl Sector {
    /// Create a pending sector, rejecting invalid boundaries.
    ///
    /// A closed ring is accepted and stored open.
    ///
    /// # Example
    ///
    /// ```rust
    /// use track_coverage::{GpsPoint, Sector, SectorStatus};
    ///
    /// let sector = Sector::new("s-1", "op-7", vec![
    ///     GpsPoint::new(46.00, 7.00),
    ///     GpsPoint::new(46.00, 7.01),
    ///     GpsPoint::new(46.01, 7.01),
    ///     GpsPoint::new(46.01, 7.00),
    /// ], 1).unwrap();
    /// assert_eq!(sector.status, SectorStatus::Pending);
    ///
    /// assert!(Sector::new("s-2", "op-7", vec![GpsPoint::new(46.0, 7.0)], 1).is_err());
    /// ```
    pub fn new(
        id: impl Into<String>,
        operation_id: impl Into<String>,
        boundary: Vec<GpsPoint>,
        priority: i32,
    ) -> Result<Self> {
        let boundary = validate_boundary(&boundary)?;
        Ok(Self {
            id: id.into(),
            operation_id: operation_id.into(),
            boundary,
            priority,
            status: SectorStatus::Pending,
            assigned_team: None,
        })
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.assigned_team = Some(team_id.into());
        self
    }

    /// Estimate how much of this sector the tracks cover.
    pub fn estimate_coverage<T: AsRef<[GpsPoint]>>(
        &self,
        tracks: &[T],
        config: &CoverageConfig,
    ) -> Result<CoverageResult> {
        estimate_coverage_with_config(&self.boundary, tracks, config)
    }

    /// Estimate coverage and wrap it as a sample for the given team.
    pub fn sample_coverage<T: AsRef<[GpsPoint]>>(
        &self,
        team_id: impl Into<String>,
        tracks: &[T],
        config: &CoverageConfig,
        sampled_at: i64,
    ) -> Result<CoverageSample> {
        let result = self.estimate_coverage(tracks, config)?;
        Ok(CoverageSample::new(
            self.id.clone(),
            team_id,
            result.coverage_percent,
            sampled_at,
        ))
    }
}

/// One coverage measurement of a sector by a team. Samples are append-only.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoverageSample {
    pub sector_id: String,
    pub team_id: String,
    /// Within [0, 100]
    pub coverage_percent: f64,
    /// Unix timestamp in seconds
    pub sampled_at: i64,
}

impl CoverageSample {
    /// Create a sample; the percentage is clamped to [0, 100] and NaN becomes 0.
    pub fn new(
        sector_id: impl Into<String>,
        team_id: impl Into<String>,
        coverage_percent: f64,
        sampled_at: i64,
    ) -> Self {
        let coverage_percent = if coverage_percent.is_nan() {
            0.0
        } else {
            coverage_percent.clamp(0.0, 100.0)
        };
        Self {
            sector_id: sector_id.into(),
            team_id: team_id.into(),
            coverage_percent,
            sampled_at,
        }
    }
}

/// How a sector's displayed progress is derived from its samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ProgressMode {
    /// Most recent sample wins
    #[default]
    Latest,
    /// Mean of all samples
    Average,
}

/// Progress of a sector from its samples; 0 without samples.
///
/// For [`ProgressMode::Latest`], ties on `sampled_at` go to the sample appended last.
pub fn sector_progress(samples: &[CoverageSample], mode: ProgressMode) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let progress = match mode {
        ProgressMode::Latest => samples
            .iter()
            .fold(None::<&CoverageSample>, |best, s| match best {
                Some(b) if b.sampled_at > s.sampled_at => Some(b),
                _ => Some(s),
            })
            .map_or(0.0, |s| s.coverage_percent),
        ProgressMode::Average => {
            samples.iter().map(|s| s.coverage_percent).sum::<f64>() / samples.len() as f64
        }
    };

    progress.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrackError;

    fn square_sector() -> Sector {
        Sector::new(
            "sector-1",
            "op-1",
            vec![
                GpsPoint::new(46.000, 7.000),
                GpsPoint::new(46.000, 7.002),
                GpsPoint::new(46.002, 7.002),
                GpsPoint::new(46.002, 7.000),
            ],
            2,
        )
        .unwrap()
    }

    #[test]
    fn test_status_suggestion() {
        assert_eq!(SectorStatus::suggested_for(0.0), SectorStatus::Pending);
        assert_eq!(SectorStatus::suggested_for(0.01), SectorStatus::InProgress);
        assert_eq!(SectorStatus::suggested_for(99.9), SectorStatus::InProgress);
        assert_eq!(SectorStatus::suggested_for(100.0), SectorStatus::Completed);
        assert_eq!(SectorStatus::InProgress.to_string(), "in_progress");
    }

    #[test]
    fn test_sector_rejects_self_intersection() {
        let err = Sector::new(
            "bad",
            "op-1",
            vec![
                GpsPoint::new(46.000, 7.000),
                GpsPoint::new(46.002, 7.002),
                GpsPoint::new(46.000, 7.002),
                GpsPoint::new(46.002, 7.000),
            ],
            1,
        )
        .unwrap_err();
        assert!(matches!(err, TrackError::SelfIntersectingBoundary { .. }));
        assert!(err.is_validation());
    }

    #[test]
    fn test_sector_stores_open_ring() {
        let mut boundary = square_sector().boundary;
        boundary.push(boundary[0]);
        let sector = Sector::new("s", "op", boundary, 0).unwrap().with_team("team-a");
        assert_eq!(sector.boundary.len(), 4);
        assert_eq!(sector.assigned_team.as_deref(), Some("team-a"));
    }

    #[test]
    fn test_sample_coverage() {
        let sector = square_sector();
        let track = vec![GpsPoint::at(46.001, 7.001, 10), GpsPoint::at(46.0011, 7.001, 20)];
        let sample = sector
            .sample_coverage("team-a", &[track], &CoverageConfig::default(), 1_000)
            .unwrap();

        assert_eq!(sample.sector_id, "sector-1");
        assert_eq!(sample.team_id, "team-a");
        assert!(sample.coverage_percent > 0.0 && sample.coverage_percent < 100.0);
        assert_eq!(
            SectorStatus::suggested_for(sample.coverage_percent),
            SectorStatus::InProgress
        );
    }

    #[test]
    fn test_sample_clamped() {
        assert_eq!(CoverageSample::new("s", "t", 140.0, 0).coverage_percent, 100.0);
        assert_eq!(CoverageSample::new("s", "t", -3.0, 0).coverage_percent, 0.0);
        assert_eq!(CoverageSample::new("s", "t", f64::NAN, 0).coverage_percent, 0.0);
    }

    #[test]
    fn test_progress_modes() {
        let samples = vec![
            CoverageSample::new("s", "a", 40.0, 100),
            CoverageSample::new("s", "b", 80.0, 300),
            CoverageSample::new("s", "a", 60.0, 200),
        ];
        assert_eq!(sector_progress(&samples, ProgressMode::Latest), 80.0);
        assert_eq!(sector_progress(&samples, ProgressMode::Average), 60.0);
        assert_eq!(sector_progress(&[], ProgressMode::Average), 0.0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_enum_serialization() {
        assert_eq!(serde_json::to_value(ProgressMode::Average).unwrap(), "average");
        assert_eq!(serde_json::to_value(SectorStatus::InProgress).unwrap(), "in_progress");
        let mode: ProgressMode = serde_json::from_str("\"latest\"").unwrap();
        assert_eq!(mode, ProgressMode::Latest);
    }

    #[test]
    fn test_latest_tie_goes_to_last_appended() {
        let samples = vec![
            CoverageSample::new("s", "a", 10.0, 500),
            CoverageSample::new("s", "b", 30.0, 500),
        ];
        assert_eq!(sector_progress(&samples, ProgressMode::Latest), 30.0);
    }
}
