//! Per-bucket slicing of the clustered event table.
//!
//! The index owns the events and precomputes, for each direction and each of
//! the 144 buckets, the row indices that fall in it. A query is a lookup plus
//! an optional bike-type filter over the (small) bucket slice, so scrubbing
//! or playback never rescans the full table.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::bucket::BUCKETS_PER_DAY;
use crate::{ClusteredEvent, Direction, TimeBucket};

/// Which bike types a view includes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BikeFilter {
    #[default]
    All,
    /// Only events of this bike type
    Only(String),
}

impl BikeFilter {
    pub fn matches(&self, bike_type: &str) -> bool {
        match self {
            BikeFilter::All => true,
            BikeFilter::Only(wanted) => wanted == bike_type,
        }
    }
}

/// The events of one bucket, split by direction.
///
/// Derived data: always reconstructible from the index and the bucket.
#[derive(Debug, Clone)]
pub struct ViewWindow<'a> {
    /// Requested bucket index (may be out of range, in which case both sides are empty)
    pub bucket: usize,
    pub start: Vec<&'a ClusteredEvent>,
    pub end: Vec<&'a ClusteredEvent>,
}

impl<'a> ViewWindow<'a> {
    pub fn events(&self, direction: Direction) -> &[&'a ClusteredEvent] {
        match direction {
            Direction::Start => &self.start,
            Direction::End => &self.end,
        }
    }

    pub fn total(&self) -> usize {
        self.start.len() + self.end.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Bucket → rows lookup over an owned event table.
#[derive(Debug, Clone)]
pub struct TimeWindowIndex {
    events: Vec<ClusteredEvent>,
    /// `rows[direction][bucket]` → indices into `events`
    rows: [Vec<Vec<usize>>; 2],
}

fn slot(direction: Direction) -> usize {
    match direction {
        Direction::Start => 0,
        Direction::End => 1,
    }
}

impl TimeWindowIndex {
    /// Build the index once; the events are read-only afterwards.
    pub fn new(events: Vec<ClusteredEvent>) -> Self {
        let empty = || vec![Vec::new(); BUCKETS_PER_DAY as usize];
        let mut rows = [empty(), empty()];

        for (i, e) in events.iter().enumerate() {
            rows[slot(e.direction())][e.bucket().index() as usize].push(i);
        }

        debug!("Indexed {} events over {} buckets", events.len(), BUCKETS_PER_DAY);
        Self { events, rows }
    }

    /// All indexed events.
    pub fn events(&self) -> &[ClusteredEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events of one direction in one bucket, optionally filtered by bike type.
    ///
    /// Out-of-range buckets yield nothing rather than an error.
    pub fn slice(&self, bucket: usize, direction: Direction, filter: &BikeFilter) -> Vec<&ClusteredEvent> {
        let Some(rows) = self.rows[slot(direction)].get(bucket) else {
            return Vec::new();
        };
        rows.iter()
            .map(|&i| &self.events[i])
            .filter(|e| filter.matches(&e.event.bike_type))
            .collect()
    }

    /// Both directions of a bucket given by raw index.
    ///
    /// # Example
    /// ```
    /// use ride_pulse::{BikeFilter, TimeWindowIndex};
    ///
    /// let index = TimeWindowIndex::new(Vec::new());
    /// let view = index.window_at(500, &BikeFilter::All);
    /// assert!(view.is_empty());
    /// ```
    pub fn window_at(&self, bucket: usize, filter: &BikeFilter) -> ViewWindow<'_> {
        ViewWindow {
            bucket,
            start: self.slice(bucket, Direction::Start, filter),
            end: self.slice(bucket, Direction::End, filter),
        }
    }

    /// Both directions of a bucket.
    pub fn window(&self, bucket: TimeBucket, filter: &BikeFilter) -> ViewWindow<'_> {
        self.window_at(bucket.index() as usize, filter)
    }

    /// Number of events of a direction in a bucket, unfiltered.
    pub fn count(&self, bucket: TimeBucket, direction: Direction) -> usize {
        self.rows[slot(direction)][bucket.index() as usize].len()
    }
}
