//! Simplify and analyze a recorded GPS track.
//!
//! Run with: cargo run --example track_analysis

use track_coverage::{analyze_with_config, simplify, simplify_by_distance, AnalysisConfig, GpsPoint, Track};

fn main() {
    // A 40 minute walk heading north-east with a few zig-zags, one fix every 5s
    let points: Vec<GpsPoint> = (0..480)
        .map(|i| {
            let t = i as f64;
            GpsPoint::at(
                46.2044 + t * 0.00002,
                6.1432 + t * 0.00001 + (t / 40.0).sin() * 0.0003,
                1_700_000_000 + i as i64 * 5,
            )
            .with_elevation(375.0 + (t / 60.0).sin() * 12.0)
        })
        .collect();

    let track = match Track::new("walk-1", "searcher-7", points, 1_700_000_000) {
        Ok(track) => track,
        Err(e) => {
            eprintln!("Invalid track: {}", e);
            return;
        }
    };

    println!("Track Analysis Example\n");
    println!("Raw track: {} points, {:.0}m\n", track.points.len(), track.distance_meters());

    println!("1. Douglas-Peucker simplification:");
    for tolerance in [2.0, 10.0, 25.0] {
        let simplified = simplify(&track.points, tolerance);
        println!("   {:>5.1}m tolerance -> {} points", tolerance, simplified.len());
    }

    println!("\n2. Distance threshold thinning:");
    for tolerance in [5.0, 20.0] {
        let thinned = simplify_by_distance(&track.points, tolerance);
        println!("   {:>5.1}m spacing   -> {} points", tolerance, thinned.len());
    }

    let config = AnalysisConfig {
        segment_length_km: 0.5,
        ..AnalysisConfig::default()
    };
    let stats = analyze_with_config(&track.points, &config);

    println!("\n3. Statistics:");
    println!("   Distance:   {:.2} km", stats.total_distance_km);
    println!("   Duration:   {:.0} s (moving {:.0} s)", stats.duration_s, stats.moving_time_s);
    println!("   Speed:      avg {:.1} km/h, max {:.1} km/h", stats.avg_speed_kmh, stats.max_speed_kmh);
    println!("   Elevation:  +{:.0} m / -{:.0} m", stats.elevation_gain_m, stats.elevation_loss_m);
    match stats.pace_min_per_km {
        Some(pace) => println!("   Pace:       {:.1} min/km", pace),
        None => println!("   Pace:       n/a"),
    }

    println!("\n4. Segments of {} km:", config.segment_length_km);
    for segment in &stats.segments {
        println!(
            "   #{} points {}..{}: {:.2} km in {:.0} s ({:.1} km/h)",
            segment.index,
            segment.start_index,
            segment.end_index,
            segment.distance_km,
            segment.duration_s,
            segment.avg_speed_kmh
        );
    }
}
