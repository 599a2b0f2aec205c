//! Compare sequential and parallel coordinate grouping on a city-sized dock grid.
//!
//! Run with: cargo run --release --example grouping_benchmark --features parallel

use ride_pulse::{cluster_coordinates, cluster_coordinates_parallel, GpsPoint, GroupingConfig};
use std::time::Instant;

fn main() {
    println!("Coordinate Grouping Benchmark\n");

    let config = GroupingConfig::default();

    for docks_per_side in [20usize, 50, 100] {
        let points = dock_grid(docks_per_side, 8);

        let start = Instant::now();
        let sequential = cluster_coordinates(&points, &config);
        let seq_time = start.elapsed();

        let start = Instant::now();
        let parallel = cluster_coordinates_parallel(&points, &config);
        let par_time = start.elapsed();

        let same = sequential.canonical_partition() == parallel.canonical_partition();

        println!(
            "{:>6} coordinates -> {:>6} groups  sequential {:>10.2?}  parallel {:>10.2?}  identical: {}",
            points.len(),
            sequential.len(),
            seq_time,
            par_time,
            same
        );
    }
}

/// Docks ~200m apart, each with `samples` GPS readings scattered within ~5m.
fn dock_grid(per_side: usize, samples: usize) -> Vec<GpsPoint> {
    let origin = GpsPoint::new(42.30, -71.15);
    let step = 0.0018;
    let mut points = Vec::with_capacity(per_side * per_side * samples);

    for row in 0..per_side {
        for col in 0..per_side {
            let lat = origin.latitude + row as f64 * step;
            let lng = origin.longitude + col as f64 * step;
            for s in 0..samples {
                let offset = (s as f64 - samples as f64 / 2.0) * 0.000005;
                points.push(GpsPoint::new(lat + offset, lng - offset));
            }
        }
    }
    points
}
