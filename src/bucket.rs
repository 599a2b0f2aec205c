//! Ten-minute time buckets over a single day.
//!
//! A day is split into [`BUCKETS_PER_DAY`] half-open intervals; bucket `b`
//! covers minutes `[b * 10, b * 10 + 10)`. Advancing past the last bucket
//! wraps to the first, which is what playback relies on.

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minutes covered by one bucket.
pub const MINUTES_PER_BUCKET: u16 = 10;

/// Minutes in a day.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Number of buckets in a day (0..=143).
pub const BUCKETS_PER_DAY: u16 = MINUTES_PER_DAY / MINUTES_PER_BUCKET;

/// Index of a ten-minute window of the day, always in `0..BUCKETS_PER_DAY`.
///
/// # Example
/// ```
/// use ride_pulse::TimeBucket;
///
/// let bucket = TimeBucket::from_minute(905).unwrap();
/// assert_eq!(bucket.index(), 90);
/// assert_eq!(bucket.label(), "3:00 PM");
/// assert_eq!(TimeBucket::LAST.next(), TimeBucket::FIRST);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct TimeBucket(u16);

impl TimeBucket {
    pub const FIRST: TimeBucket = TimeBucket(0);
    pub const LAST: TimeBucket = TimeBucket(BUCKETS_PER_DAY - 1);

    /// Bucket with the given index, or `None` when out of range.
    pub fn new(index: u16) -> Option<Self> {
        (index < BUCKETS_PER_DAY).then_some(Self(index))
    }

    /// Bucket containing a minute of the day (0..=1439).
    pub fn from_minute(minute_of_day: u16) -> Option<Self> {
        Self::new(minute_of_day / MINUTES_PER_BUCKET)
    }

    /// Bucket containing a wall-clock time. Seconds are ignored.
    pub fn from_time(time: NaiveTime) -> Self {
        Self(minute_of_day(time) / MINUTES_PER_BUCKET)
    }

    pub fn index(self) -> u16 {
        self.0
    }

    /// First minute of the day covered by this bucket.
    pub fn start_minute(self) -> u16 {
        self.0 * MINUTES_PER_BUCKET
    }

    /// The following bucket, wrapping 143 → 0.
    pub fn next(self) -> Self {
        Self((self.0 + 1) % BUCKETS_PER_DAY)
    }

    /// The preceding bucket, wrapping 0 → 143.
    pub fn prev(self) -> Self {
        Self((self.0 + BUCKETS_PER_DAY - 1) % BUCKETS_PER_DAY)
    }

    /// Clock label of the bucket start, e.g. `"12:00 AM"`.
    pub fn label(self) -> String {
        format_clock(self.start_minute())
    }

    /// Clock range of the half-open interval, e.g. `"12:00 AM – 12:10 AM"`.
    pub fn range_label(self) -> String {
        format!("{} – {}", self.label(), self.next().label())
    }

    /// All buckets of the day in order.
    pub fn all() -> impl Iterator<Item = TimeBucket> {
        (0..BUCKETS_PER_DAY).map(TimeBucket)
    }
}

impl TryFrom<u16> for TimeBucket {
    type Error = String;

    fn try_from(index: u16) -> Result<Self, Self::Error> {
        TimeBucket::new(index)
            .ok_or_else(|| format!("time bucket {} outside 0..{}", index, BUCKETS_PER_DAY))
    }
}

impl From<TimeBucket> for u16 {
    fn from(bucket: TimeBucket) -> Self {
        bucket.0
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Minute of the day, `hour * 60 + minute`.
pub fn minute_of_day(time: NaiveTime) -> u16 {
    (time.hour() * 60 + time.minute()) as u16
}

/// Format a minute of the day as a 12-hour clock string (`H:MM AM/PM`).
pub fn format_clock(minute_of_day: u16) -> String {
    let minute_of_day = minute_of_day % MINUTES_PER_DAY;
    let hours_24 = minute_of_day / 60;
    let minutes = minute_of_day % 60;
    let period = if hours_24 < 12 { "AM" } else { "PM" };
    let hours_12 = match hours_24 % 12 {
        0 => 12,
        h => h,
    };
    format!("{}:{:02} {}", hours_12, minutes, period)
}
