//! Load a month of trip exports, pick the busiest day and save its clustered
//! events as a reusable artifact.
//!
//! Run with: cargo run --example busiest_day -- <trips.csv | directory> [artifact.json]

use ride_pulse::trips::{load_trip_directory, read_trips_csv, top_busiest_days};
use ride_pulse::{
    build_event_table, busiest_day, remove_ride_outliers, EventArtifact, GroupingConfig, OutlierConfig,
};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Instant;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let Some(input) = args.next() else {
        eprintln!("Usage: busiest_day <trips.csv | directory> [artifact.json]");
        std::process::exit(1);
    };
    let output = args.next().unwrap_or_else(|| "busiest_day_events.json".to_string());

    println!("Busiest Day Example\n");

    let start = Instant::now();
    let path = Path::new(&input);
    let trips = if path.is_dir() {
        load_trip_directory(path)?
    } else {
        read_trips_csv(BufReader::new(File::open(path)?))?
    };
    println!("Loaded {} trips in {:?}", trips.len(), start.elapsed());

    let trips = remove_ride_outliers(trips, &OutlierConfig::default());
    println!("{} trips after removing outliers\n", trips.len());

    println!("Top days:");
    for (date, count) in top_busiest_days(&trips, 5) {
        println!("  {}: {} rides", date, count);
    }

    let Some((date, rides)) = busiest_day(&trips) else {
        println!("\nNo trips to analyse");
        return Ok(());
    };

    let config = GroupingConfig::default();
    let start = Instant::now();
    let table = build_event_table(&rides, &config)?;
    println!(
        "\n{}: {} events in {} coordinate groups ({}m threshold, {:?})",
        date,
        table.events.len(),
        table.groups.len(),
        config.distance_threshold_meters,
        start.elapsed()
    );

    let largest = table
        .groups
        .groups()
        .iter()
        .max_by_key(|g| g.members.len());
    if let Some(group) = largest {
        println!(
            "Largest group: {} docks around ({:.5}, {:.5})",
            group.members.len(),
            group.center.latitude,
            group.center.longitude
        );
    }

    EventArtifact::from_table(&table).save(&output)?;
    println!("Saved artifact to {}", output);
    Ok(())
}
