//! Tabular event input and the persisted event artifact.
//!
//! Two ways in:
//!
//! - a flat CSV event table with the columns in [`REQUIRED_COLUMNS`]
//!   (and optionally the group columns), validated before any row is read;
//! - a JSON [`EventArtifact`] written by a previous run.
//!
//! Whether coordinates are already grouped is always stated explicitly, with
//! [`CoordinateGrouping`] for CSV and the `coordinates_grouped` flag for the
//! artifact. It is never guessed from which columns happen to be present.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use chrono::NaiveDateTime;
use log::{debug, info, warn};
use serde::{Deserialize, Deserializer, Serialize};

use crate::clustering::{CoordinateGroups, GroupingConfig};
use crate::bucket::MINUTES_PER_BUCKET;
use crate::error::{Error, Result};
use crate::trips::parse_timestamp;
use crate::{group_events, ClusteredEvent, Direction, Event, EventTable, GpsPoint, TimeBucket};

/// Columns every event table must carry.
pub const REQUIRED_COLUMNS: [&str; 6] = ["event_type", "minute", "lat", "lng", "bike_type", "time_window"];

/// Columns carrying a precomputed grouping.
pub const GROUP_COLUMNS: [&str; 3] = ["coordinate_group_id", "group_lat", "group_lng"];

/// Fail with [`Error::Schema`] listing every required column absent from `headers`.
///
/// ```
/// use ride_pulse::dataset::{check_columns, REQUIRED_COLUMNS};
///
/// let headers = ["event_type", "minute", "lat", "lng", "bike_type"];
/// let err = check_columns(&headers, &REQUIRED_COLUMNS).unwrap_err();
/// assert_eq!(err.to_string(), "Missing required columns: [\"time_window\"]");
/// ```
pub fn check_columns<S: AsRef<str>>(headers: &[S], required: &[&str]) -> Result<()> {
    let missing: Vec<String> = required
        .iter()
        .filter(|col| !headers.iter().any(|h| h.as_ref() == **col))
        .map(|col| col.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::Schema { missing })
    }
}

/// How to obtain coordinate groups for loaded events.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateGrouping {
    /// Rows carry `coordinate_group_id`, `group_lat` and `group_lng`; use them as-is
    Precomputed,
    /// Group from scratch with this configuration
    Compute(GroupingConfig),
}

/// One row of the flat event table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub ride_id: Option<String>,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub event_time: Option<NaiveDateTime>,
    pub event_type: Direction,
    pub minute: u16,
    pub lat: f64,
    pub lng: f64,
    pub bike_type: String,
    pub time_window: u16,
    #[serde(default)]
    pub coordinate_group_id: Option<usize>,
    #[serde(default)]
    pub group_lat: Option<f64>,
    #[serde(default)]
    pub group_lng: Option<f64>,
}

/// Accepts both `2024-09-17 08:05:00` and `2024-09-17T08:05:00`; blank is `None`.
fn optional_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_timestamp(value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid event_time `{}`", value))),
    }
}

impl EventRow {
    /// Convert to an [`Event`], checking minute and window ranges and that
    /// the window is the one the minute falls in.
    ///
    /// `row` is the 1-based data row, used for ids and error messages.
    pub fn to_event(&self, row: usize) -> Result<Event> {
        let bucket = TimeBucket::new(self.time_window).ok_or_else(|| Error::Parse {
            row,
            column: "time_window",
            value: self.time_window.to_string(),
        })?;
        if TimeBucket::from_minute(self.minute).is_none() {
            return Err(Error::Parse {
                row,
                column: "minute",
                value: self.minute.to_string(),
            });
        }
        if self.time_window != self.minute / MINUTES_PER_BUCKET {
            return Err(Error::Parse {
                row,
                column: "time_window",
                value: format!("{} (minute {})", self.time_window, self.minute),
            });
        }

        Ok(Event {
            event_id: self.event_id.clone().unwrap_or_else(|| format!("row-{}", row)),
            ride_id: self.ride_id.clone(),
            timestamp: self.event_time,
            direction: self.event_type,
            position: GpsPoint::new(self.lat, self.lng),
            bike_type: self.bike_type.clone(),
            minute: self.minute,
            bucket,
        })
    }

    /// Group id and centroid, if all group columns are filled.
    fn group(&self) -> Option<(usize, GpsPoint)> {
        Some((self.coordinate_group_id?, GpsPoint::new(self.group_lat?, self.group_lng?)))
    }
}

impl From<&Event> for EventRow {
    fn from(e: &Event) -> Self {
        Self {
            event_id: Some(e.event_id.clone()),
            ride_id: e.ride_id.clone(),
            event_time: e.timestamp,
            event_type: e.direction,
            minute: e.minute,
            lat: e.position.latitude,
            lng: e.position.longitude,
            bike_type: e.bike_type.clone(),
            time_window: e.bucket.index(),
            coordinate_group_id: None,
            group_lat: None,
            group_lng: None,
        }
    }
}

impl From<&ClusteredEvent> for EventRow {
    fn from(e: &ClusteredEvent) -> Self {
        Self {
            coordinate_group_id: Some(e.group_id),
            group_lat: Some(e.group_center.latitude),
            group_lng: Some(e.group_center.longitude),
            ..EventRow::from(&e.event)
        }
    }
}

/// Build an event table from rows.
pub fn table_from_rows(rows: Vec<EventRow>, grouping: &CoordinateGrouping) -> Result<EventTable> {
    let events = rows
        .iter()
        .enumerate()
        .map(|(i, r)| r.to_event(i + 1))
        .collect::<Result<Vec<_>>>()?;

    match grouping {
        CoordinateGrouping::Compute(config) => group_events(events, config),
        CoordinateGrouping::Precomputed => {
            let mut assigned = Vec::with_capacity(rows.len());
            let mut kept = Vec::with_capacity(rows.len());
            for (e, r) in events.into_iter().zip(&rows) {
                let (id, center) = r.group().ok_or_else(|| Error::Schema {
                    missing: GROUP_COLUMNS.iter().map(|c| c.to_string()).collect(),
                })?;
                if e.position.is_valid() {
                    assigned.push((e.position, id, center));
                    kept.push(e);
                }
            }
            if kept.len() < rows.len() {
                warn!("Dropped {} events with invalid coordinates", rows.len() - kept.len());
            }
            let events = kept;

            let groups = CoordinateGroups::from_assignments(assigned);
            let events = events
                .into_iter()
                .map(|e| groups.attach(e))
                .collect::<Result<Vec<_>>>()?;

            info!("Loaded {} events with {} precomputed groups", events.len(), groups.len());
            Ok(EventTable { events, groups })
        }
    }
}

/// Read a CSV event table.
///
/// Headers are validated first; a missing required column fails before any
/// row is parsed. With [`CoordinateGrouping::Precomputed`] the group columns
/// are required as well.
pub fn read_event_csv<R: Read>(reader: R, grouping: &CoordinateGrouping) -> Result<EventTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    check_columns(&headers, &REQUIRED_COLUMNS)?;
    if *grouping == CoordinateGrouping::Precomputed {
        check_columns(&headers, &GROUP_COLUMNS)?;
    }

    let rows = rdr.deserialize::<EventRow>().collect::<std::result::Result<Vec<_>, _>>()?;
    debug!("Read {} event rows", rows.len());

    table_from_rows(rows, grouping)
}

/// [`read_event_csv`] from a file path.
pub fn load_event_csv(path: impl AsRef<Path>, grouping: &CoordinateGrouping) -> Result<EventTable> {
    let file = File::open(path.as_ref())?;
    read_event_csv(BufReader::new(file), grouping)
}

/// The single flat artifact persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventArtifact {
    /// Rows carry group assignments that should be used as-is
    pub coordinates_grouped: bool,
    /// Threshold the grouping was computed with, when known
    pub distance_threshold_meters: Option<f64>,
    pub events: Vec<EventRow>,
}

impl EventArtifact {
    /// Artifact of a grouped event table.
    pub fn from_table(table: &EventTable) -> Self {
        Self {
            coordinates_grouped: true,
            distance_threshold_meters: table.groups.threshold_meters(),
            events: table.events.iter().map(EventRow::from).collect(),
        }
    }

    /// Artifact of events that still need grouping.
    pub fn ungrouped(events: &[Event]) -> Self {
        Self {
            coordinates_grouped: false,
            distance_threshold_meters: None,
            events: events.iter().map(EventRow::from).collect(),
        }
    }

    /// Turn the artifact back into an event table, grouping with `config`
    /// only when the artifact is not flagged as grouped.
    pub fn into_table(self, config: &GroupingConfig) -> Result<EventTable> {
        let grouping = if self.coordinates_grouped {
            CoordinateGrouping::Precomputed
        } else {
            CoordinateGrouping::Compute(config.clone())
        };
        table_from_rows(self.events, &grouping)
    }

    pub fn write<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn read<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        self.write(&mut writer)?;
        writer.flush()?;
        info!("Saved {} events to {}", self.events.len(), path.as_ref().display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::read(BufReader::new(File::open(path.as_ref())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    const CSV: &str = "\
event_id,event_type,minute,lat,lng,bike_type,time_window
a-start,start,5,42.3601,-71.0589,classic_bike,0
b-start,start,6,42.3601,-71.0589,electric_bike,0
a-end,end,20,42.3611,-71.0599,classic_bike,2
";

    fn temp_path(name: &str) -> std::path::PathBuf {
        env::temp_dir().join(name)
    }

    #[test]
    fn test_missing_columns_reported_together() {
        let headers = ["event_type", "lat", "lng"];
        match check_columns(&headers, &REQUIRED_COLUMNS) {
            Err(Error::Schema { missing }) => {
                assert_eq!(missing, vec!["minute", "bike_type", "time_window"]);
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_read_csv_and_group() {
        let table = read_event_csv(CSV.as_bytes(), &CoordinateGrouping::Compute(GroupingConfig::default())).unwrap();
        assert_eq!(table.events.len(), 3);
        assert_eq!(table.groups.len(), 2);
        assert_eq!(table.events[0].group_id, table.events[1].group_id);
        assert_eq!(table.events[2].event.bucket.index(), 2);
        assert_eq!(table.events[2].event.direction, Direction::End);
    }

    #[test]
    fn test_schema_error_before_rows() {
        let csv = "event_type,minute,lat,lng,bike_type\nstart,not-a-number,1,2,classic_bike\n";
        let err = read_event_csv(csv.as_bytes(), &CoordinateGrouping::Compute(GroupingConfig::default())).unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
    }

    #[test]
    fn test_precomputed_requires_group_columns() {
        let err = read_event_csv(CSV.as_bytes(), &CoordinateGrouping::Precomputed).unwrap_err();
        match err {
            Error::Schema { missing } => assert_eq!(missing.len(), 3),
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_precomputed_groups_used_as_is() {
        // Far apart, but the table says they are one group
        let csv = "\
event_type,minute,lat,lng,bike_type,time_window,coordinate_group_id,group_lat,group_lng
start,5,42.3601,-71.0589,classic_bike,0,7,42.365,-71.065
end,20,42.3700,-71.0700,classic_bike,2,7,42.365,-71.065
";
        let table = read_event_csv(csv.as_bytes(), &CoordinateGrouping::Precomputed).unwrap();
        assert_eq!(table.groups.len(), 1);
        assert_eq!(table.events[0].group_id, table.events[1].group_id);
        assert_eq!(table.events[1].group_center, GpsPoint::new(42.365, -71.065));
        assert_eq!(table.events[0].event.event_id, "row-1");
    }

    #[test]
    fn test_out_of_range_window_rejected() {
        let csv = "event_type,minute,lat,lng,bike_type,time_window\nstart,5,42.36,-71.05,classic_bike,144\n";
        let err = read_event_csv(csv.as_bytes(), &CoordinateGrouping::Compute(GroupingConfig::default())).unwrap_err();
        assert!(matches!(err, Error::Parse { row: 1, column: "time_window", .. }));
    }

    #[test]
    fn test_window_must_match_minute() {
        let csv = "event_type,minute,lat,lng,bike_type,time_window\nstart,5,42.36,-71.05,classic_bike,100\n";
        let err = read_event_csv(csv.as_bytes(), &CoordinateGrouping::Compute(GroupingConfig::default())).unwrap_err();
        assert!(matches!(err, Error::Parse { row: 1, column: "time_window", .. }));

        let csv = "event_type,minute,lat,lng,bike_type,time_window\nstart,1439,42.36,-71.05,classic_bike,143\n";
        let table = read_event_csv(csv.as_bytes(), &CoordinateGrouping::Compute(GroupingConfig::default())).unwrap();
        assert_eq!(table.events[0].bucket(), TimeBucket::LAST);
    }

    #[test]
    fn test_event_time_with_space_separator() {
        let csv = "\
event_id,event_time,event_type,minute,lat,lng,bike_type,time_window
a-start,2024-09-17 00:05:00,start,5,42.3601,-71.0589,classic_bike,0
a-end,2024-09-17T00:20:00.5,end,20,42.3611,-71.0599,classic_bike,2
b-start,,start,6,42.3601,-71.0589,electric_bike,0
";
        let table = read_event_csv(csv.as_bytes(), &CoordinateGrouping::Compute(GroupingConfig::default())).unwrap();
        let day = chrono::NaiveDate::from_ymd_opt(2024, 9, 17).unwrap();
        assert_eq!(table.events[0].event.timestamp, day.and_hms_opt(0, 5, 0));
        assert_eq!(table.events[1].event.timestamp, day.and_hms_milli_opt(0, 20, 0, 500));
        assert_eq!(table.events[2].event.timestamp, None);

        let bad = "event_time,event_type,minute,lat,lng,bike_type,time_window\nyesterday,start,5,42.36,-71.05,classic_bike,0\n";
        assert!(matches!(
            read_event_csv(bad.as_bytes(), &CoordinateGrouping::Compute(GroupingConfig::default())),
            Err(Error::Csv(_))
        ));
    }

    #[test]
    fn test_precomputed_drops_invalid_coordinates() {
        let csv = "\
event_type,minute,lat,lng,bike_type,time_window,coordinate_group_id,group_lat,group_lng
start,5,42.3601,-71.0589,classic_bike,0,0,42.3601,-71.0589
start,6,NaN,-71.0589,classic_bike,0,0,42.3601,-71.0589
end,20,95.0,-71.0599,classic_bike,2,1,42.3611,-71.0599
";
        let table = read_event_csv(csv.as_bytes(), &CoordinateGrouping::Precomputed).unwrap();
        assert_eq!(table.events.len(), 1);
        assert_eq!(table.groups.len(), 1);
        assert!(table.events.iter().all(|e| e.event.position.is_valid()));
    }

    #[test]
    fn test_bad_event_type_is_csv_error() {
        let csv = "event_type,minute,lat,lng,bike_type,time_window\npickup,5,42.36,-71.05,classic_bike,0\n";
        let err = read_event_csv(csv.as_bytes(), &CoordinateGrouping::Compute(GroupingConfig::default())).unwrap_err();
        assert!(matches!(err, Error::Csv(_)));
    }

    #[test]
    fn test_artifact_keeps_grouping() {
        let table = read_event_csv(CSV.as_bytes(), &CoordinateGrouping::Compute(GroupingConfig::default())).unwrap();
        let artifact = EventArtifact::from_table(&table);
        assert!(artifact.coordinates_grouped);
        assert_eq!(artifact.distance_threshold_meters, Some(30.0));

        let path = temp_path("ride_pulse_artifact_test.json");
        artifact.save(&path).unwrap();
        let loaded = EventArtifact::load(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(loaded, artifact);

        // A huge threshold would merge everything if the artifact were regrouped
        let huge = GroupingConfig { distance_threshold_meters: 50_000.0 };
        let restored = loaded.into_table(&huge).unwrap();
        assert_eq!(restored.groups.len(), table.groups.len());
        assert_eq!(restored.events, table.events);
    }

    #[test]
    fn test_ungrouped_artifact_is_grouped_on_load() {
        let table = read_event_csv(CSV.as_bytes(), &CoordinateGrouping::Compute(GroupingConfig::default())).unwrap();
        let events: Vec<Event> = table.events.iter().map(|e| e.event.clone()).collect();
        let artifact = EventArtifact::ungrouped(&events);
        assert!(!artifact.coordinates_grouped);

        let huge = GroupingConfig { distance_threshold_meters: 50_000.0 };
        let restored = artifact.into_table(&huge).unwrap();
        assert_eq!(restored.groups.len(), 1);
    }

    #[test]
    fn test_grouped_flag_without_group_fields() {
        let artifact = EventArtifact {
            coordinates_grouped: true,
            distance_threshold_meters: Some(30.0),
            events: vec![EventRow {
                event_id: None,
                ride_id: None,
                event_time: None,
                event_type: Direction::Start,
                minute: 0,
                lat: 42.36,
                lng: -71.05,
                bike_type: "classic_bike".to_string(),
                time_window: 0,
                coordinate_group_id: None,
                group_lat: None,
                group_lng: None,
            }],
        };
        assert!(matches!(
            artifact.into_table(&GroupingConfig::default()),
            Err(Error::Schema { .. })
        ));
    }
}
