//! # Ride Pulse
//!
//! Bike-share trip event clustering and time-windowed density aggregation.
//!
//! This library provides:
//! - Start/end event derivation from trip records, bucketed into 10-minute windows
//! - Density-based grouping of nearby docks on a haversine metric
//! - A bucket index for fast per-window slicing while scrubbing through the day
//! - Elevation normalization against the busiest (location, window) pair of the day
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel neighbour search with rayon
//! - **`player`** - Enable the tokio playback timer
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use ride_pulse::{build_event_table, GpsPoint, GroupingConfig, Session, TripRecord};
//!
//! let day = NaiveDate::from_ymd_opt(2024, 9, 17).unwrap();
//! let trips = vec![
//!     TripRecord::new(
//!         "ride-a",
//!         day.and_hms_opt(0, 5, 0).unwrap(),
//!         day.and_hms_opt(0, 20, 0).unwrap(),
//!         GpsPoint::new(42.3601, -71.0589),
//!         GpsPoint::new(42.3611, -71.0599),
//!         "classic_bike",
//!     ),
//! ];
//!
//! let table = build_event_table(&trips, &GroupingConfig::default()).unwrap();
//! assert_eq!(table.events.len(), 2);
//!
//! let session = Session::new(table);
//! let frame = session.frame();
//! println!("{}: {} pickups", frame.time_label, frame.pickups);
//! ```

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod error;
pub use error::{Error, Result};

pub mod geo_utils;

// Ten-minute windows of the day
pub mod bucket;
pub use bucket::{TimeBucket, BUCKETS_PER_DAY, MINUTES_PER_BUCKET};

// Coordinate grouping (density-based, haversine metric)
pub mod clustering;
pub use clustering::{CoordinateGroup, CoordinateGroups, GroupingConfig, cluster_coordinates};
#[cfg(feature = "parallel")]
pub use clustering::cluster_coordinates_parallel;

// Trip → event expansion
pub mod events;
pub use events::derive_events;

// Per-bucket slicing
pub mod index;
pub use index::{BikeFilter, TimeWindowIndex, ViewWindow};

// Relative elevation scaling
pub mod elevation;
pub use elevation::{DirectionScale, ElevationScale, GlobalElevationBaseline};

// Tabular input and the event artifact
pub mod dataset;
pub use dataset::{CoordinateGrouping, EventArtifact, EventRow, REQUIRED_COLUMNS};

// Raw trip ingestion and busiest-day selection
pub mod trips;
pub use trips::{OutlierConfig, busiest_day, remove_ride_outliers, top_busiest_days};

// Renderer boundary
pub mod render;
pub use render::{FrameView, LayerSpec, RenderConfig};

// Data side of the presentation shell
pub mod session;
pub use session::Session;

// Playback timing
pub mod player;
pub use player::PlaybackConfig;
#[cfg(feature = "player")]
pub use player::Player;

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use ride_pulse::GpsPoint;
/// let point = GpsPoint::new(42.3601, -71.0589); // Boston
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// Position as `[lng, lat]`, the order map renderers expect.
    pub fn lng_lat(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

/// Bounding box of a set of points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self { min_lat, max_lat, min_lng, max_lng })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// Whether an event marks the pickup or the dropoff of a ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Start,
    End,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Start, Direction::End];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Start => "start",
            Direction::End => "end",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "start" => Ok(Direction::Start),
            "end" => Ok(Direction::End),
            other => Err(format!("unknown event type `{}`", other)),
        }
    }
}

/// One bike-share ride, as delivered by the upstream trip cleaning step.
///
/// `ended_at > started_at` is guaranteed by outlier filtering and not
/// re-checked here.
#[derive(Debug, Clone, PartialEq)]
pub struct TripRecord {
    pub ride_id: String,
    pub started_at: NaiveDateTime,
    pub ended_at: NaiveDateTime,
    pub start: GpsPoint,
    pub end: GpsPoint,
    /// Bike category, e.g. `classic_bike` or `electric_bike`
    pub bike_type: String,
}

impl TripRecord {
    pub fn new(
        ride_id: &str,
        started_at: NaiveDateTime,
        ended_at: NaiveDateTime,
        start: GpsPoint,
        end: GpsPoint,
        bike_type: &str,
    ) -> Self {
        Self {
            ride_id: ride_id.to_string(),
            started_at,
            ended_at,
            start,
            end,
            bike_type: bike_type.to_string(),
        }
    }

    pub fn duration(&self) -> TimeDelta {
        self.ended_at - self.started_at
    }

    /// Calendar date the ride started on.
    pub fn ride_date(&self) -> NaiveDate {
        self.started_at.date()
    }
}

/// A directional occurrence derived from a trip: where and when a bike was
/// picked up or dropped off.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_id: String,
    pub ride_id: Option<String>,
    /// Absent when the event was loaded from a table without timestamps
    pub timestamp: Option<NaiveDateTime>,
    pub direction: Direction,
    pub position: GpsPoint,
    pub bike_type: String,
    /// Minute of the day, 0..=1439
    pub minute: u16,
    pub bucket: TimeBucket,
}

/// An [`Event`] with its coordinate group attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteredEvent {
    pub event: Event,
    pub group_id: usize,
    /// Centroid of the group, used as the render position
    pub group_center: GpsPoint,
}

impl ClusteredEvent {
    pub fn direction(&self) -> Direction {
        self.event.direction
    }

    pub fn bucket(&self) -> TimeBucket {
        self.event.bucket
    }
}

/// The clustered event table for one day plus the grouping that produced it.
#[derive(Debug, Clone)]
pub struct EventTable {
    pub events: Vec<ClusteredEvent>,
    pub groups: CoordinateGroups,
}

impl EventTable {
    /// Events of one direction, in table order.
    pub fn direction_events(&self, direction: Direction) -> impl Iterator<Item = &ClusteredEvent> {
        self.events.iter().filter(move |e| e.direction() == direction)
    }
}

// ============================================================================
// Core Functions
// ============================================================================

/// Run the full derivation pipeline: trips → events → coordinate groups.
///
/// Grouping runs once over the union of start and end coordinates, before
/// any per-direction split, so a group stands for one physical location.
pub fn build_event_table(trips: &[TripRecord], config: &GroupingConfig) -> Result<EventTable> {
    let events = derive_events(trips);
    group_events(events, config)
}

/// Group the coordinates of already-derived events and attach group ids.
///
/// Events with non-finite or out-of-range coordinates are dropped with a
/// warning; they cannot be placed on the map.
pub fn group_events(events: Vec<Event>, config: &GroupingConfig) -> Result<EventTable> {
    config.validate()?;
    let start = std::time::Instant::now();

    let total = events.len();
    let events: Vec<Event> = events.into_iter().filter(|e| e.position.is_valid()).collect();
    if events.len() < total {
        warn!("Dropped {} events with invalid coordinates", total - events.len());
    }

    let positions: Vec<GpsPoint> = events.iter().map(|e| e.position).collect();

    #[cfg(feature = "parallel")]
    let groups = cluster_coordinates_parallel(&positions, config);

    #[cfg(not(feature = "parallel"))]
    let groups = cluster_coordinates(&positions, config);

    let events = events
        .into_iter()
        .map(|e| groups.attach(e))
        .collect::<Result<Vec<_>>>()?;

    info!(
        "Grouped {} events into {} coordinate groups ({}m threshold) in {:?}",
        events.len(),
        groups.len(),
        config.distance_threshold_meters,
        start.elapsed()
    );

    Ok(EventTable { events, groups })
}

// ============================================================================
// Tests
// ============================================================================
