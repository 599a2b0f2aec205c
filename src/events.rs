//! Expansion of trips into directional events.
//!
//! Each trip yields a start event at its pickup and an end event at its
//! dropoff. The result is restricted to a single calendar day: the earliest
//! date found among the events of both directions. End events of rides that
//! finish after midnight fall outside that day and are dropped.

use chrono::NaiveDateTime;
use log::{debug, info};

use crate::bucket::{minute_of_day, TimeBucket};
use crate::{Direction, Event, TripRecord};

impl Event {
    /// Build the event of one direction of a trip.
    pub fn from_trip(trip: &TripRecord, direction: Direction) -> Self {
        let (timestamp, position) = match direction {
            Direction::Start => (trip.started_at, trip.start),
            Direction::End => (trip.ended_at, trip.end),
        };

        Self {
            event_id: format!("{}-{}", trip.ride_id, direction),
            ride_id: Some(trip.ride_id.clone()),
            timestamp: Some(timestamp),
            direction,
            position,
            bike_type: trip.bike_type.clone(),
            minute: minute_of_day(timestamp.time()),
            bucket: TimeBucket::from_time(timestamp.time()),
        }
    }
}

/// Derive start and end events for every trip, keep the earliest day only,
/// and sort by timestamp.
///
/// Pure: the same trips always produce the same events. Event ids are
/// `"{ride_id}-start"` / `"{ride_id}-end"`, unique as long as ride ids are.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use ride_pulse::{derive_events, Direction, GpsPoint, TripRecord};
///
/// let day = NaiveDate::from_ymd_opt(2024, 9, 17).unwrap();
/// let trip = TripRecord::new(
///     "ride-1",
///     day.and_hms_opt(8, 5, 0).unwrap(),
///     day.and_hms_opt(8, 20, 0).unwrap(),
///     GpsPoint::new(42.3601, -71.0589),
///     GpsPoint::new(42.3611, -71.0599),
///     "classic_bike",
/// );
///
/// let events = derive_events(&[trip]);
/// assert_eq!(events.len(), 2);
/// assert_eq!(events[0].direction, Direction::Start);
/// assert_eq!(events[0].minute, 485);
/// assert_eq!(events[1].bucket.index(), 50);
/// ```
pub fn derive_events(trips: &[TripRecord]) -> Vec<Event> {
    let mut events: Vec<Event> = Direction::ALL
        .iter()
        .flat_map(|&direction| trips.iter().map(move |t| Event::from_trip(t, direction)))
        .collect();

    let Some(first_day) = events.iter().filter_map(|e| e.timestamp).map(|t| t.date()).min() else {
        return Vec::new();
    };

    let derived = events.len();
    events.retain(|e| e.timestamp.map(|t| t.date()) == Some(first_day));
    if events.len() < derived {
        debug!("Dropped {} events outside {}", derived - events.len(), first_day);
    }

    // Stable: ties keep start-before-end and input order
    events.sort_by_key(|e| e.timestamp.unwrap_or(NaiveDateTime::MIN));

    info!("Derived {} events from {} trips on {}", events.len(), trips.len(), first_day);
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GpsPoint;
    use chrono::NaiveDate;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 9, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn trip(id: &str, start: NaiveDateTime, end: NaiveDateTime) -> TripRecord {
        TripRecord::new(
            id,
            start,
            end,
            GpsPoint::new(42.3601, -71.0589),
            GpsPoint::new(42.3611, -71.0599),
            "electric_bike",
        )
    }

    #[test]
    fn test_two_events_per_trip() {
        let trips = vec![trip("A", at(17, 0, 5), at(17, 0, 20)), trip("B", at(17, 0, 6), at(17, 0, 40))];
        let events = derive_events(&trips);
        assert_eq!(events.len(), 4);

        let ids: Vec<&str> = events.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["A-start", "B-start", "A-end", "B-end"]);

        let minutes: Vec<u16> = events.iter().map(|e| e.minute).collect();
        assert_eq!(minutes, vec![5, 6, 20, 40]);
        let buckets: Vec<u16> = events.iter().map(|e| e.bucket.index()).collect();
        assert_eq!(buckets, vec![0, 0, 2, 4]);
    }

    #[test]
    fn test_event_attributes_follow_direction() {
        let t = trip("A", at(17, 9, 0), at(17, 9, 30));
        let start = Event::from_trip(&t, Direction::Start);
        let end = Event::from_trip(&t, Direction::End);

        assert_eq!(start.position, t.start);
        assert_eq!(end.position, t.end);
        assert_eq!(start.timestamp, Some(t.started_at));
        assert_eq!(end.timestamp, Some(t.ended_at));
        assert_eq!(end.bike_type, "electric_bike");
        assert_eq!(end.ride_id.as_deref(), Some("A"));
    }

    #[test]
    fn test_restricted_to_earliest_day() {
        // Ends after midnight, and one ride entirely on the next day
        let trips = vec![
            trip("late", at(17, 23, 50), at(18, 0, 15)),
            trip("next", at(18, 7, 0), at(18, 7, 30)),
        ];
        let events = derive_events(&trips);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, "late-start");
        assert_eq!(events[0].bucket.index(), 143);
    }

    #[test]
    fn test_sorted_by_timestamp() {
        let trips = vec![trip("B", at(17, 12, 0), at(17, 12, 30)), trip("A", at(17, 6, 0), at(17, 18, 0))];
        let events = derive_events(&trips);
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_empty_trips() {
        assert!(derive_events(&[]).is_empty());
    }

    #[test]
    fn test_every_bucket_in_range() {
        let trips: Vec<TripRecord> = (0..24)
            .map(|h| trip(&format!("r{}", h), at(17, h, 59), at(17, h, 59)))
            .collect();
        for e in derive_events(&trips) {
            assert!(e.bucket.index() < 144);
            assert_eq!(e.bucket.index(), e.minute / 10);
        }
    }
}
