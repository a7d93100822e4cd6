//! Estimate search sector coverage from team tracks.
//!
//! Run with: cargo run --example sector_coverage --features parallel

use std::time::Instant;

use track_coverage::{
    estimate_coverage_batch, sector_progress, CoverageConfig, CoverageSample, GpsPoint,
    ProgressMode, Sector, SectorStatus,
};

/// Parallel north-south sweeps across a sector, `spacing` degrees apart.
fn sweep_track(min_lng: f64, max_lng: f64, spacing: f64, start_ts: i64) -> Vec<GpsPoint> {
    let mut points = Vec::new();
    let mut lng = min_lng;
    let mut ts = start_ts;
    let mut northbound = true;
    while lng <= max_lng {
        for step in 0..=40 {
            let frac = step as f64 / 40.0;
            let lat = if northbound { 46.000 + frac * 0.009 } else { 46.009 - frac * 0.009 };
            points.push(GpsPoint::at(lat, lng, ts));
            ts += 10;
        }
        northbound = !northbound;
        lng += spacing;
    }
    points
}

fn main() {
    let boundary = vec![
        GpsPoint::new(46.000, 7.000),
        GpsPoint::new(46.000, 7.012),
        GpsPoint::new(46.009, 7.012),
        GpsPoint::new(46.009, 7.000),
    ];

    let sector = match Sector::new("sector-A", "op-42", boundary, 1) {
        Ok(sector) => sector.with_team("team-1"),
        Err(e) => {
            eprintln!("Invalid sector: {}", e);
            return;
        }
    };

    println!("Sector Coverage Example\n");

    let config = CoverageConfig::default();
    let mut samples = Vec::new();

    // Coverage grows as the team sweeps more of the sector
    for (hour, max_lng) in [(1, 7.003), (2, 7.007), (3, 7.012)] {
        let track = sweep_track(7.0005, max_lng, 0.0012, 1_700_000_000);
        let start = Instant::now();
        match sector.sample_coverage("team-1", &[track], &config, 1_700_000_000 + hour * 3600) {
            Ok(sample) => {
                println!(
                    "Hour {}: {:.1}% covered -> {} ({:.1}ms)",
                    hour,
                    sample.coverage_percent,
                    SectorStatus::suggested_for(sample.coverage_percent),
                    start.elapsed().as_secs_f64() * 1000.0
                );
                samples.push(sample);
            }
            Err(e) => println!("Hour {}: coverage failed: {}", hour, e),
        }
    }

    samples.push(CoverageSample::new("sector-A", "team-2", 35.0, 1_700_000_000 + 1800));
    println!(
        "\nProgress: latest {:.1}%, average {:.1}%",
        sector_progress(&samples, ProgressMode::Latest),
        sector_progress(&samples, ProgressMode::Average)
    );

    // Many sectors at once, one of them invalid
    let bowtie = vec![
        GpsPoint::new(46.02, 7.00),
        GpsPoint::new(46.03, 7.01),
        GpsPoint::new(46.02, 7.01),
        GpsPoint::new(46.03, 7.00),
    ];
    let track = sweep_track(7.0005, 7.012, 0.0012, 1_700_000_000);
    let jobs = vec![
        (sector.boundary.clone(), vec![track.clone()]),
        (bowtie, vec![track]),
    ];

    println!("\nBatch:");
    for (i, result) in estimate_coverage_batch(&jobs, &config).into_iter().enumerate() {
        match result {
            Ok(r) => println!(
                "   #{}: {:.1}% of {:.0} m² ({} of {} points buffered)",
                i, r.coverage_percent, r.sector_area_m2, r.points_buffered, r.points_considered
            ),
            Err(e) => println!("   #{}: rejected: {}", i, e),
        }
    }
}
