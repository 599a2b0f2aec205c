//! Scrub through a synthetic day and print the busiest windows.
//!
//! Run with: cargo run --example time_scrub

use chrono::{NaiveDate, TimeDelta};
use ride_pulse::{build_event_table, BikeFilter, GpsPoint, GroupingConfig, Session, TimeBucket, TripRecord};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Time Scrub Example\n");

    let docks = [
        GpsPoint::new(42.3601, -71.0589), // Downtown Crossing
        GpsPoint::new(42.3522, -71.0552), // South Station
        GpsPoint::new(42.3467, -71.0972), // Fenway
        GpsPoint::new(42.3736, -71.1190), // Harvard Square
        GpsPoint::new(42.3625, -71.0843), // Kendall
    ];

    let trips = synthetic_day(&docks);
    println!("Generated {} trips", trips.len());

    let table = build_event_table(&trips, &GroupingConfig::default())?;
    let mut session = Session::new(table);
    println!(
        "Baseline: {} pickups / {} dropoffs at the busiest dock-window\n",
        session.baseline().max_start_events,
        session.baseline().max_end_events
    );

    let mut frames = Vec::new();
    for _ in TimeBucket::all() {
        frames.push(session.frame());
        session.advance();
    }
    frames.sort_by(|a, b| b.total.cmp(&a.total).then(a.bucket.cmp(&b.bucket)));

    println!("Busiest windows:");
    for frame in frames.iter().take(5) {
        println!(
            "  {:<22} {:>3} pickups {:>3} dropoffs  heights {:.1} / {:.1}",
            frame.time_label,
            frame.pickups,
            frame.dropoffs,
            frame.start_layer.elevation_scale,
            frame.end_layer.elevation_scale
        );
    }

    session.set_filter(BikeFilter::Only("electric_bike".to_string()));
    if let Some(peak) = frames.first() {
        session.select(peak.bucket);
        let frame = session.frame();
        println!("\nElectric bikes only at {}: {} events", frame.time_label, frame.total);
    }

    Ok(())
}

/// Commute-shaped demand: rides cluster around 8 AM and 5:30 PM.
fn synthetic_day(docks: &[GpsPoint]) -> Vec<TripRecord> {
    let day = NaiveDate::from_ymd_opt(2024, 9, 17)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid date");
    let mut trips = Vec::new();

    for i in 0..2_000usize {
        let peak = if i % 2 == 0 { 8 * 60 } else { 17 * 60 + 30 };
        let spread = ((i * 37) % 180) as i64 - 90;
        let started = day + TimeDelta::minutes((peak + spread).clamp(0, 1400));
        let duration = TimeDelta::minutes(5 + (i % 30) as i64);

        // Jitter within a few meters so each dock is a small cluster of points
        let jitter = (i % 5) as f64 * 0.00002;
        let from = docks[i % docks.len()];
        let to = docks[(i * 3 + 1) % docks.len()];

        trips.push(TripRecord::new(
            &format!("ride-{}", i),
            started,
            started + duration,
            GpsPoint::new(from.latitude + jitter, from.longitude),
            GpsPoint::new(to.latitude, to.longitude + jitter),
            if i % 3 == 0 { "electric_bike" } else { "classic_bike" },
        ));
    }
    trips
}
