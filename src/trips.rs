//! Raw trip ingestion, cleaning and busiest-day selection.
//!
//! Reads the operator's monthly trip exports, drops implausible rides and
//! picks the day with the most rides. Station names, ids and member type are
//! ignored; rows without both coordinates are skipped.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::dataset::check_columns;
use crate::error::{Error, Result};
use crate::{GpsPoint, TripRecord};

/// Columns a raw trip export must carry.
pub const TRIP_COLUMNS: [&str; 8] = [
    "ride_id",
    "rideable_type",
    "started_at",
    "ended_at",
    "start_lat",
    "start_lng",
    "end_lat",
    "end_lng",
];

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Bounds on plausible ride duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierConfig {
    /// Rides this short or shorter are dropped (re-docks, false starts).
    /// Default: 120 seconds
    pub min_duration_secs: i64,
    /// Rides this long or longer are dropped (lost or unreturned bikes).
    /// Default: 86,400 seconds
    pub max_duration_secs: i64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: 120,
            max_duration_secs: 86_400,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTripRow {
    ride_id: String,
    rideable_type: String,
    started_at: String,
    ended_at: String,
    start_lat: Option<f64>,
    start_lng: Option<f64>,
    end_lat: Option<f64>,
    end_lng: Option<f64>,
}

/// Parse a trip timestamp, with or without fractional seconds.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value.trim(), fmt).ok())
}

/// Read a raw trip export.
///
/// Unparseable timestamps are errors; rows with a blank coordinate are
/// skipped with a warning, as they cannot be placed on the map.
pub fn read_trips_csv<R: Read>(reader: R) -> Result<Vec<TripRecord>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    check_columns(&headers, &TRIP_COLUMNS)?;

    let mut trips = Vec::new();
    let mut skipped = 0usize;

    for (i, row) in rdr.deserialize::<RawTripRow>().enumerate() {
        let row = row?;
        let timestamp = |column: &'static str, value: &str| {
            parse_timestamp(value).ok_or_else(|| Error::Parse {
                row: i + 1,
                column,
                value: value.to_string(),
            })
        };
        let started_at = timestamp("started_at", &row.started_at)?;
        let ended_at = timestamp("ended_at", &row.ended_at)?;

        let (Some(start_lat), Some(start_lng), Some(end_lat), Some(end_lng)) =
            (row.start_lat, row.start_lng, row.end_lat, row.end_lng)
        else {
            skipped += 1;
            continue;
        };

        trips.push(TripRecord {
            ride_id: row.ride_id,
            started_at,
            ended_at,
            start: GpsPoint::new(start_lat, start_lng),
            end: GpsPoint::new(end_lat, end_lng),
            bike_type: row.rideable_type,
        });
    }

    if skipped > 0 {
        warn!("Skipped {} trips without complete coordinates", skipped);
    }
    info!("Read {} trips", trips.len());
    Ok(trips)
}

/// Read every `*.csv` file in a directory, in file name order.
pub fn load_trip_directory(dir: impl AsRef<Path>) -> Result<Vec<TripRecord>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir.as_ref())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no CSV files found in {}", dir.as_ref().display()),
        )));
    }

    let mut trips = Vec::new();
    for path in paths {
        trips.extend(read_trips_csv(BufReader::new(File::open(&path)?))?);
    }
    Ok(trips)
}

/// Keep rides whose duration lies strictly between the configured bounds.
pub fn remove_ride_outliers(trips: Vec<TripRecord>, config: &OutlierConfig) -> Vec<TripRecord> {
    let before = trips.len();
    let kept: Vec<TripRecord> = trips
        .into_iter()
        .filter(|t| {
            let secs = t.duration().num_seconds();
            secs > config.min_duration_secs && secs < config.max_duration_secs
        })
        .collect();
    info!("Removed {} outlier rides, {} remain", before - kept.len(), kept.len());
    kept
}

/// Days ranked by number of rides started, most first; ties go to the
/// earlier date.
pub fn top_busiest_days(trips: &[TripRecord], top_n: usize) -> Vec<(NaiveDate, usize)> {
    let mut per_day: HashMap<NaiveDate, usize> = HashMap::new();
    for t in trips {
        *per_day.entry(t.ride_date()).or_insert(0) += 1;
    }

    let mut ranked: Vec<(NaiveDate, usize)> = per_day.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(top_n);
    ranked
}

/// Rides that started on `date`.
pub fn rides_on(trips: &[TripRecord], date: NaiveDate) -> Vec<TripRecord> {
    trips.iter().filter(|t| t.ride_date() == date).cloned().collect()
}

/// The busiest day and its rides, or `None` when there are no trips.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use ride_pulse::{busiest_day, GpsPoint, TripRecord};
///
/// let p = GpsPoint::new(42.36, -71.06);
/// let ride = |id: &str, d: u32| {
///     let day = NaiveDate::from_ymd_opt(2024, 9, d).unwrap();
///     TripRecord::new(id, day.and_hms_opt(9, 0, 0).unwrap(), day.and_hms_opt(9, 30, 0).unwrap(), p, p, "classic_bike")
/// };
///
/// let trips = vec![ride("a", 16), ride("b", 17), ride("c", 17)];
/// let (date, rides) = busiest_day(&trips).unwrap();
/// assert_eq!(date, NaiveDate::from_ymd_opt(2024, 9, 17).unwrap());
/// assert_eq!(rides.len(), 2);
/// ```
pub fn busiest_day(trips: &[TripRecord]) -> Option<(NaiveDate, Vec<TripRecord>)> {
    let (date, count) = top_busiest_days(trips, 1).into_iter().next()?;
    info!("Busiest day is {} with {} rides", date, count);
    Some((date, rides_on(trips, date)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = "\
ride_id,rideable_type,started_at,ended_at,start_station_name,start_lat,start_lng,end_lat,end_lng,member_casual
r1,classic_bike,2024-09-17 08:00:00,2024-09-17 08:20:00,Downtown,42.3601,-71.0589,42.3611,-71.0599,member
r2,electric_bike,2024-09-17 08:01:00.123,2024-09-17 08:01:30.000,Downtown,42.3601,-71.0589,42.3601,-71.0589,casual
r3,classic_bike,2024-09-16 12:00:00,2024-09-16 12:30:00,Back Bay,42.3500,-71.0800,,,member
r4,classic_bike,2024-09-16 13:00:00,2024-09-16 13:45:00,Back Bay,42.3500,-71.0800,42.3550,-71.0700,member
";

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-09-17 08:00:00").is_some());
        assert!(parse_timestamp("2024-09-17 08:00:00.5").is_some());
        assert!(parse_timestamp("2024-09-17T08:00:00").is_some());
        assert!(parse_timestamp("17/09/2024 08:00").is_none());
    }

    #[test]
    fn test_read_trips_skips_missing_coordinates() {
        let trips = read_trips_csv(EXPORT.as_bytes()).unwrap();
        let ids: Vec<&str> = trips.iter().map(|t| t.ride_id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2", "r4"]);
        assert_eq!(trips[1].bike_type, "electric_bike");
        assert_eq!(trips[0].end, GpsPoint::new(42.3611, -71.0599));
    }

    #[test]
    fn test_read_trips_requires_columns() {
        let csv = "ride_id,started_at,ended_at\nr1,2024-09-17 08:00:00,2024-09-17 08:20:00\n";
        match read_trips_csv(csv.as_bytes()) {
            Err(Error::Schema { missing }) => assert!(missing.contains(&"rideable_type".to_string())),
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_timestamp_reports_row() {
        let csv = "ride_id,rideable_type,started_at,ended_at,start_lat,start_lng,end_lat,end_lng\n\
                   r1,classic_bike,yesterday,2024-09-17 08:20:00,42.36,-71.05,42.36,-71.05\n";
        assert!(matches!(
            read_trips_csv(csv.as_bytes()),
            Err(Error::Parse { row: 1, column: "started_at", .. })
        ));
    }

    #[test]
    fn test_outliers_removed() {
        let trips = read_trips_csv(EXPORT.as_bytes()).unwrap();
        let kept = remove_ride_outliers(trips, &OutlierConfig::default());
        // r2 lasted 30 seconds
        let ids: Vec<&str> = kept.iter().map(|t| t.ride_id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r4"]);
    }

    #[test]
    fn test_outlier_bounds_are_exclusive() {
        let day = NaiveDate::from_ymd_opt(2024, 9, 17).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let p = GpsPoint::new(42.36, -71.06);
        let trip = |id: &str, secs: i64| {
            TripRecord::new(id, day, day + chrono::TimeDelta::seconds(secs), p, p, "classic_bike")
        };
        let kept = remove_ride_outliers(
            vec![trip("a", 120), trip("b", 121), trip("c", 86_399), trip("d", 86_400)],
            &OutlierConfig::default(),
        );
        let ids: Vec<&str> = kept.iter().map(|t| t.ride_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_top_busiest_days_tie_break() {
        let p = GpsPoint::new(42.36, -71.06);
        let ride = |id: &str, d: u32| {
            let day = NaiveDate::from_ymd_opt(2024, 9, d).unwrap();
            TripRecord::new(id, day.and_hms_opt(9, 0, 0).unwrap(), day.and_hms_opt(9, 30, 0).unwrap(), p, p, "classic_bike")
        };
        let trips = vec![ride("a", 18), ride("b", 18), ride("c", 16), ride("d", 16), ride("e", 17)];
        let ranked = top_busiest_days(&trips, 10);
        let days: Vec<u32> = ranked.iter().map(|(d, _)| chrono::Datelike::day(d)).collect();
        assert_eq!(days, vec![16, 18, 17]);
        assert_eq!(top_busiest_days(&trips, 1).len(), 1);
    }

    #[test]
    fn test_busiest_day_empty() {
        assert!(busiest_day(&[]).is_none());
    }

    #[test]
    fn test_load_trip_directory() {
        let dir = std::env::temp_dir().join("ride_pulse_trip_dir_test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("2024-09.csv"), EXPORT).unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let trips = load_trip_directory(&dir).unwrap();
        std::fs::remove_dir_all(&dir).ok();
        assert_eq!(trips.len(), 3);
    }
}
