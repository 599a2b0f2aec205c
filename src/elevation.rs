//! Relative elevation scaling.
//!
//! Column heights must be comparable across the whole day, so each window's
//! busiest location is measured against the busiest (location, window) pair
//! of the day rather than against the window itself:
//!
//! - **Global pass** (once): per direction, count events per
//!   `(group, bucket)` and keep the maximum.
//! - **Local pass** (per view): per direction, count the window's events per
//!   group and keep the maximum.
//! - **Scale**: `local / global`, times a base elevation unit.
//!
//! Both maxima default to 1 when there is nothing to count, which keeps the
//! ratio defined without special cases.

use std::collections::HashMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::index::ViewWindow;
use crate::{ClusteredEvent, Direction, TimeBucket};

/// Busiest `(group, bucket)` event count of the day, per direction.
///
/// Always `>= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalElevationBaseline {
    pub max_start_events: u32,
    pub max_end_events: u32,
}

impl Default for GlobalElevationBaseline {
    fn default() -> Self {
        Self {
            max_start_events: 1,
            max_end_events: 1,
        }
    }
}

impl GlobalElevationBaseline {
    /// Run the global pass over the full event table.
    pub fn compute(events: &[ClusteredEvent]) -> Self {
        let max_for = |direction: Direction| {
            let busiest = busiest_pair_count(events.iter().filter(|e| e.direction() == direction));
            if busiest.is_none() {
                warn!("No {} events; elevation baseline defaults to 1", direction);
            }
            busiest.unwrap_or(1)
        };

        let baseline = Self {
            max_start_events: max_for(Direction::Start),
            max_end_events: max_for(Direction::End),
        };

        info!(
            "Elevation baseline: max {} start / {} end events per location per window",
            baseline.max_start_events, baseline.max_end_events
        );
        baseline
    }

    pub fn max_for(&self, direction: Direction) -> u32 {
        match direction {
            Direction::Start => self.max_start_events,
            Direction::End => self.max_end_events,
        }
    }
}

/// Largest number of events sharing one `(group, bucket)` pair.
///
/// `None` when there are no events.
pub fn busiest_pair_count<'a, I>(events: I) -> Option<u32>
where
    I: IntoIterator<Item = &'a ClusteredEvent>,
{
    let mut counts: HashMap<(usize, TimeBucket), u32> = HashMap::new();
    for e in events {
        *counts.entry((e.group_id, e.bucket())).or_insert(0) += 1;
    }
    counts.into_values().max()
}

/// Largest number of events sharing one group within a single window's
/// events. Defaults to 1 for an empty window.
pub fn local_max(events: &[&ClusteredEvent]) -> u32 {
    let mut counts: HashMap<usize, u32> = HashMap::new();
    for e in events {
        *counts.entry(e.group_id).or_insert(0) += 1;
    }
    counts.into_values().max().unwrap_or(1)
}

/// `local_max / global_max`. A zero baseline is treated as 1.
///
/// ```
/// use ride_pulse::elevation::scale_factor;
///
/// assert_eq!(scale_factor(3, 12), 0.25);
/// assert_eq!(scale_factor(5, 0), 5.0);
/// ```
pub fn scale_factor(local_max: u32, global_max: u32) -> f64 {
    local_max as f64 / global_max.max(1) as f64
}

/// Elevation of one direction for the current window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionScale {
    pub local_max: u32,
    pub global_max: u32,
    /// `local_max / global_max`
    pub factor: f64,
    /// `factor * base_elevation`
    pub elevation_scale: f64,
}

impl DirectionScale {
    pub fn new(local_max: u32, global_max: u32, base_elevation: f64) -> Self {
        let factor = scale_factor(local_max, global_max);
        Self {
            local_max,
            global_max,
            factor,
            elevation_scale: factor * base_elevation,
        }
    }
}

/// Local pass result for both directions of a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElevationScale {
    pub start: DirectionScale,
    pub end: DirectionScale,
}

impl ElevationScale {
    /// Run the local pass on a window against the day's baseline.
    pub fn for_window(view: &ViewWindow<'_>, baseline: &GlobalElevationBaseline, base_elevation: f64) -> Self {
        let scale = |direction: Direction| {
            DirectionScale::new(
                local_max(view.events(direction)),
                baseline.max_for(direction),
                base_elevation,
            )
        };
        Self {
            start: scale(Direction::Start),
            end: scale(Direction::End),
        }
    }

    pub fn get(&self, direction: Direction) -> &DirectionScale {
        match direction {
            Direction::Start => &self.start,
            Direction::End => &self.end,
        }
    }
}
