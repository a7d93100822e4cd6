//! # Track Analytics
//!
//! Derives movement statistics from an ordered GPS track: distance, duration,
//! moving time, speeds, elevation gain/loss, pace and ~1 km splits.
//!
//! Speeds are computed per step (consecutive point pair). GPS noise produces
//! implausible spikes, and duplicate timestamps produce division by zero, so:
//!
//! - steps whose time delta is at or below [`AnalysisConfig::min_time_delta_s`]
//!   are skipped for every speed and moving-time statistic,
//! - only speeds inside `[min_speed_kmh, max_speed_kmh]` feed the average and
//!   the maximum.
//!
//! Distances always include every step.
//!
//! Degenerate tracks (fewer than two points) yield zeroed statistics rather
//! than an error.

use log::debug;

use crate::geo_utils::haversine_distance;
use crate::GpsPoint;

/// Configuration for track analysis.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalysisConfig {
    /// Lower bound of the plausible speed band, and the moving threshold.
    /// Default: 0.5 km/h
    pub min_speed_kmh: f64,

    /// Upper bound of the plausible speed band. Faster steps are treated as GPS noise.
    /// Default: 20.0 km/h (on foot)
    pub max_speed_kmh: f64,

    /// Target length of each split.
    /// Default: 1.0 km
    pub segment_length_km: f64,

    /// Steps with a time delta at or below this are skipped for speed statistics.
    /// Default: 0.5 s
    pub min_time_delta_s: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_speed_kmh: 0.5,
            max_speed_kmh: 20.0,
            segment_length_km: 1.0,
            min_time_delta_s: 0.5,
        }
    }
}

/// One split of a track.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackSegment {
    /// Position of this split in the track (0-based)
    pub index: u32,
    /// Index of the first point of the split
    pub start_index: u32,
    /// Index of the last point of the split (shared with the next split)
    pub end_index: u32,
    pub distance_km: f64,
    pub duration_s: f64,
    /// Distance over elapsed time; 0 when no time elapsed
    pub avg_speed_kmh: f64,
}

/// Movement statistics for a track.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackStats {
    pub total_distance_km: f64,
    /// Last timestamp minus first timestamp
    pub duration_s: f64,
    /// Time spent in steps faster than the moving threshold
    pub moving_time_s: f64,
    /// In-band distance over in-band time
    pub avg_speed_kmh: f64,
    /// Fastest in-band step
    pub max_speed_kmh: f64,
    pub elevation_gain_m: f64,
    pub elevation_loss_m: f64,
    /// Minutes per kilometer over the whole duration; `None` without distance
    pub pace_min_per_km: Option<f64>,
    pub segments: Vec<TrackSegment>,
    pub point_count: u32,
    /// Unix seconds of the first point
    pub start_time: Option<i64>,
    /// Unix seconds of the last point
    pub end_time: Option<i64>,
}

impl TrackStats {
    /// True if the track had too few points to measure anything.
    pub fn is_degenerate(&self) -> bool {
        self.point_count < 2
    }
}

// Below this the distance is treated as zero for pace
const MIN_PACE_DISTANCE_KM: f64 = 1e-6;

/// Analyze a track with the default configuration.
///
/// # Example
///
/// ```rust
/// use track_coverage::{GpsPoint, analyze};
///
/// // ~111m north every minute
/// let track: Vec<GpsPoint> = (0..11)
///     .map(|i| GpsPoint::at(46.0 + i as f64 * 0.001, 7.0, i * 60))
///     .collect();
///
/// let stats = analyze(&track);
/// assert!((stats.total_distance_km - 1.112).abs() < 0.01);
/// assert_eq!(stats.duration_s, 600.0);
/// assert!((stats.avg_speed_kmh - 6.67).abs() < 0.1);
/// ```
pub fn analyze(points: &[GpsPoint]) -> TrackStats {
    analyze_with_config(points, &AnalysisConfig::default())
}

/// Analyze a track.
pub fn analyze_with_config(points: &[GpsPoint], config: &AnalysisConfig) -> TrackStats {
    let start_time = points.first().map(|p| p.timestamp);
    let end_time = points.last().map(|p| p.timestamp);

    if points.len() < 2 {
        return TrackStats {
            point_count: points.len() as u32,
            start_time,
            end_time,
            ..TrackStats::default()
        };
    }

    let mut total_distance_km = 0.0;
    let mut moving_time_s = 0.0;
    let mut in_band_distance_km = 0.0;
    let mut in_band_time_s = 0.0;
    let mut max_speed_kmh: f64 = 0.0;
    let mut skipped_steps = 0u32;

    for w in points.windows(2) {
        let distance_km = haversine_distance(&w[0], &w[1]) / 1000.0;
        total_distance_km += distance_km;

        let dt = w[1].timestamp.saturating_sub(w[0].timestamp) as f64;
        if dt <= config.min_time_delta_s {
            skipped_steps += 1;
            continue;
        }

        let speed_kmh = distance_km / (dt / 3600.0);
        if speed_kmh > config.min_speed_kmh {
            moving_time_s += dt;
        }
        if speed_kmh >= config.min_speed_kmh && speed_kmh <= config.max_speed_kmh {
            in_band_distance_km += distance_km;
            in_band_time_s += dt;
            max_speed_kmh = max_speed_kmh.max(speed_kmh);
        }
    }

    if skipped_steps > 0 {
        debug!("[Analysis] Skipped {} steps with no elapsed time", skipped_steps);
    }

    let avg_speed_kmh = if in_band_time_s > 0.0 {
        in_band_distance_km / (in_band_time_s / 3600.0)
    } else {
        0.0
    };

    let duration_s = match (start_time, end_time) {
        (Some(start), Some(end)) => end.saturating_sub(start).max(0) as f64,
        _ => 0.0,
    };

    let pace_min_per_km = if total_distance_km > MIN_PACE_DISTANCE_KM {
        Some(duration_s / 60.0 / total_distance_km)
    } else {
        None
    };

    let (elevation_gain_m, elevation_loss_m) = elevation_change(points);

    TrackStats {
        total_distance_km,
        duration_s,
        moving_time_s,
        avg_speed_kmh,
        max_speed_kmh,
        elevation_gain_m,
        elevation_loss_m,
        pace_min_per_km,
        segments: split_segments(points, config.segment_length_km),
        point_count: points.len() as u32,
        start_time,
        end_time,
    }
}

/// Analyze several tracks.
pub fn analyze_tracks<T: AsRef<[GpsPoint]>>(tracks: &[T]) -> Vec<TrackStats> {
    tracks.iter().map(|t| analyze(t.as_ref())).collect()
}

/// Analyze several tracks in parallel.
#[cfg(feature = "parallel")]
pub fn analyze_tracks_parallel<T: AsRef<[GpsPoint]> + Sync>(
    tracks: &[T],
    config: &AnalysisConfig,
) -> Vec<TrackStats> {
    use rayon::prelude::*;

    tracks
        .par_iter()
        .map(|t| analyze_with_config(t.as_ref(), config))
        .collect()
}

/// Gain and loss across consecutive points that carry an elevation.
fn elevation_change(points: &[GpsPoint]) -> (f64, f64) {
    let mut gain = 0.0;
    let mut loss = 0.0;
    let mut previous: Option<f64> = None;

    for elevation in points.iter().filter_map(|p| p.elevation) {
        if !elevation.is_finite() {
            continue;
        }
        if let Some(prev) = previous {
            let delta = elevation - prev;
            if delta > 0.0 {
                gain += delta;
            } else {
                loss -= delta;
            }
        }
        previous = Some(elevation);
    }

    (gain, loss)
}

/// Split a track into consecutive chunks of about `segment_length_km`.
///
/// A chunk closes at the first point where its cumulative distance reaches the
/// target; any remainder becomes a final, shorter chunk.
fn split_segments(points: &[GpsPoint], segment_length_km: f64) -> Vec<TrackSegment> {
    if points.len() < 2 || segment_length_km.is_nan() || segment_length_km <= 0.0 {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut start = 0usize;
    let mut distance_km = 0.0;

    for i in 1..points.len() {
        distance_km += haversine_distance(&points[i - 1], &points[i]) / 1000.0;

        let is_last = i == points.len() - 1;
        if distance_km >= segment_length_km || (is_last && distance_km > 0.0) {
            segments.push(make_segment(points, segments.len(), start, i, distance_km));
            start = i;
            distance_km = 0.0;
        }
    }

    segments
}

fn make_segment(
    points: &[GpsPoint],
    index: usize,
    start: usize,
    end: usize,
    distance_km: f64,
) -> TrackSegment {
    let duration_s = points[end]
        .timestamp
        .saturating_sub(points[start].timestamp)
        .max(0) as f64;
    let avg_speed_kmh = if duration_s > 0.0 {
        distance_km / (duration_s / 3600.0)
    } else {
        0.0
    };

    TrackSegment {
        index: index as u32,
        start_index: start as u32,
        end_index: end as u32,
        distance_km,
        duration_s,
        avg_speed_kmh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    /// Walk north at ~111m per step, `dt` seconds apart.
    fn walk(steps: usize, dt: i64) -> Vec<GpsPoint> {
        (0..=steps)
            .map(|i| GpsPoint::at(46.0 + i as f64 * 0.001, 7.0, 1_000 + i as i64 * dt))
            .collect()
    }

    #[test]
    fn test_degenerate_tracks_zeroed() {
        let empty = analyze(&[]);
        assert_eq!(empty, TrackStats::default());
        assert!(empty.is_degenerate());

        let single = analyze(&[GpsPoint::at(46.0, 7.0, 42)]);
        assert_eq!(single.total_distance_km, 0.0);
        assert_eq!(single.duration_s, 0.0);
        assert!(single.segments.is_empty());
        assert_eq!(single.pace_min_per_km, None);
        assert_eq!(single.point_count, 1);
        assert_eq!(single.start_time, Some(42));
        assert_eq!(single.end_time, Some(42));
    }

    #[test]
    fn test_distance_duration_and_speed() {
        // 10 steps of ~111.2m, 60s each -> ~6.67 km/h
        let stats = analyze(&walk(10, 60));

        assert!(approx_eq(stats.total_distance_km, 1.112, 0.005));
        assert_eq!(stats.duration_s, 600.0);
        assert_eq!(stats.moving_time_s, 600.0);
        assert!(approx_eq(stats.avg_speed_kmh, 6.67, 0.05));
        assert!(approx_eq(stats.max_speed_kmh, 6.67, 0.05));
        assert_eq!(stats.point_count, 11);
        assert_eq!(stats.start_time, Some(1_000));
        assert_eq!(stats.end_time, Some(1_600));

        let pace = stats.pace_min_per_km.unwrap();
        assert!(approx_eq(pace, 10.0 / 1.112, 0.05));
    }

    #[test]
    fn test_spike_excluded_from_speed_stats() {
        let mut track = walk(10, 60);
        // Teleport one fix ~5.5km east for a single second: far above 20 km/h
        track[5] = GpsPoint::at(track[5].latitude, 7.07, track[4].timestamp + 1);

        let stats = analyze(&track);
        assert!(stats.max_speed_kmh <= 20.0, "max {}", stats.max_speed_kmh);
        assert!(stats.avg_speed_kmh <= 20.0);
        // The spike still counts toward distance
        assert!(stats.total_distance_km > 10.0);
    }

    #[test]
    fn test_duplicate_timestamps_skipped() {
        let track = vec![
            GpsPoint::at(46.000, 7.0, 100),
            GpsPoint::at(46.001, 7.0, 100),
            GpsPoint::at(46.002, 7.0, 160),
        ];
        let stats = analyze(&track);

        assert!(stats.avg_speed_kmh.is_finite());
        assert!(stats.max_speed_kmh.is_finite());
        assert_eq!(stats.moving_time_s, 60.0);
        assert!(approx_eq(stats.total_distance_km, 0.2224, 0.002));
    }

    #[test]
    fn test_stationary_track() {
        let track: Vec<GpsPoint> = (0..5).map(|i| GpsPoint::at(46.0, 7.0, i * 30)).collect();
        let stats = analyze(&track);

        assert_eq!(stats.total_distance_km, 0.0);
        assert_eq!(stats.moving_time_s, 0.0);
        assert_eq!(stats.avg_speed_kmh, 0.0);
        assert_eq!(stats.pace_min_per_km, None);
        assert!(stats.segments.is_empty());
        assert_eq!(stats.duration_s, 120.0);
    }

    #[test]
    fn test_elevation_gain_loss() {
        let elevations = [100.0, 110.0, 105.0, 120.0, 90.0];
        let track: Vec<GpsPoint> = elevations
            .iter()
            .enumerate()
            .map(|(i, e)| GpsPoint::at(46.0 + i as f64 * 0.001, 7.0, i as i64 * 60).with_elevation(*e))
            .collect();
        let stats = analyze(&track);

        assert!(approx_eq(stats.elevation_gain_m, 25.0, 1e-9));
        assert!(approx_eq(stats.elevation_loss_m, 35.0, 1e-9));
    }

    #[test]
    fn test_elevation_needs_two_points() {
        let mut track = walk(3, 60);
        track[1] = track[1].with_elevation(500.0);
        let stats = analyze(&track);
        assert_eq!(stats.elevation_gain_m, 0.0);
        assert_eq!(stats.elevation_loss_m, 0.0);

        // Gaps between elevation-bearing points are bridged
        track[3] = track[3].with_elevation(520.0);
        let stats = analyze(&track);
        assert!(approx_eq(stats.elevation_gain_m, 20.0, 1e-9));
    }

    #[test]
    fn test_segments_cover_track_in_order() {
        // ~2.5km at ~111m per step
        let track = walk(23, 60);
        let stats = analyze(&track);

        assert_eq!(stats.segments.len(), 3);
        assert_eq!(stats.segments[0].start_index, 0);
        assert_eq!(stats.segments.last().unwrap().end_index, 23);

        for w in stats.segments.windows(2) {
            assert_eq!(w[0].end_index, w[1].start_index);
            assert_eq!(w[0].index + 1, w[1].index);
        }
        for segment in &stats.segments[..2] {
            assert!(segment.distance_km >= 1.0 && segment.distance_km < 1.12);
            assert!(approx_eq(segment.avg_speed_kmh, 6.67, 0.05));
        }

        let summed: f64 = stats.segments.iter().map(|s| s.distance_km).sum();
        assert!(approx_eq(summed, stats.total_distance_km, 1e-9));
    }

    #[test]
    fn test_custom_speed_band() {
        let config = AnalysisConfig {
            max_speed_kmh: 5.0,
            ..AnalysisConfig::default()
        };
        // ~6.67 km/h is above this band
        let stats = analyze_with_config(&walk(5, 60), &config);
        assert_eq!(stats.avg_speed_kmh, 0.0);
        assert_eq!(stats.max_speed_kmh, 0.0);
        assert_eq!(stats.moving_time_s, 300.0);
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let track = vec![
            GpsPoint::at(46.000, 7.0, i64::MIN),
            GpsPoint::at(46.001, 7.0, 0),
            GpsPoint::at(46.002, 7.0, i64::MAX),
        ];
        let stats = analyze(&track);
        assert_eq!(stats.duration_s, i64::MAX as f64);
        assert!(stats.total_distance_km > 0.2);
        assert!(stats.segments.iter().all(|s| s.duration_s >= 0.0));
    }

    #[test]
    fn test_analyze_tracks() {
        let tracks = vec![walk(2, 60), vec![]];
        let stats = analyze_tracks(&tracks);
        assert_eq!(stats.len(), 2);
        assert!(stats[0].total_distance_km > 0.0);
        assert!(stats[1].is_degenerate());
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_analyze_tracks_parallel_matches_sequential() {
        let tracks = vec![walk(5, 30), walk(12, 45), walk(1, 10)];
        let parallel = analyze_tracks_parallel(&tracks, &AnalysisConfig::default());
        assert_eq!(parallel, analyze_tracks(&tracks));
    }
}
