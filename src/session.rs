//! The data side of an interactive day view.
//!
//! A [`Session`] holds one day's clustered events, the bucket index and the
//! global elevation baseline, all built once. The caller moves the current
//! bucket (slider drag, timer tick) and asks for a [`FrameView`].

use log::debug;

use crate::clustering::CoordinateGroups;
use crate::elevation::GlobalElevationBaseline;
use crate::index::{BikeFilter, TimeWindowIndex, ViewWindow};
use crate::render::{FrameView, RenderConfig, ViewState};
use crate::{Bounds, EventTable, GpsPoint, TimeBucket};

#[derive(Debug, Clone)]
pub struct Session {
    index: TimeWindowIndex,
    groups: CoordinateGroups,
    baseline: GlobalElevationBaseline,
    config: RenderConfig,
    view_state: ViewState,
    filter: BikeFilter,
    bucket: TimeBucket,
}

impl Session {
    pub fn new(table: EventTable) -> Self {
        Self::with_config(table, RenderConfig::default())
    }

    /// Build the index and the day's baseline. Starts at midnight with no
    /// bike-type filter.
    pub fn with_config(table: EventTable, config: RenderConfig) -> Self {
        let EventTable { events, groups } = table;

        let centers: Vec<GpsPoint> = events.iter().map(|e| e.group_center).collect();
        let view_state = match Bounds::from_points(&centers) {
            Some(bounds) => config.view_state.centered_on(bounds.center()),
            None => config.view_state.clone(),
        };

        let index = TimeWindowIndex::new(events);
        let baseline = GlobalElevationBaseline::compute(index.events());

        Self {
            index,
            groups,
            baseline,
            config,
            view_state,
            filter: BikeFilter::All,
            bucket: TimeBucket::FIRST,
        }
    }

    pub fn bucket(&self) -> TimeBucket {
        self.bucket
    }

    pub fn select(&mut self, bucket: TimeBucket) {
        self.bucket = bucket;
    }

    /// Select by raw index. Returns `false` and keeps the current bucket when
    /// `index` is outside the day.
    pub fn select_index(&mut self, index: u16) -> bool {
        match TimeBucket::new(index) {
            Some(bucket) => {
                self.bucket = bucket;
                true
            }
            None => false,
        }
    }

    /// Step to the next window, wrapping after 11:50 PM.
    pub fn advance(&mut self) -> TimeBucket {
        self.bucket = self.bucket.next();
        self.bucket
    }

    /// Step back one window, wrapping before midnight.
    pub fn rewind(&mut self) -> TimeBucket {
        self.bucket = self.bucket.prev();
        self.bucket
    }

    pub fn filter(&self) -> &BikeFilter {
        &self.filter
    }

    /// Restrict views to one bike type. The baseline stays computed over the
    /// full day so heights remain comparable across filters.
    pub fn set_filter(&mut self, filter: BikeFilter) {
        self.filter = filter;
    }

    pub fn view(&self) -> ViewWindow<'_> {
        self.index.window(self.bucket, &self.filter)
    }

    /// Describe the current window for the renderer.
    pub fn frame(&self) -> FrameView {
        let view = self.view();
        let frame = FrameView::build(self.bucket, &view, &self.baseline, &self.config, self.view_state.clone());
        debug!(
            "Frame {}: {} pickups, {} dropoffs",
            frame.time_label, frame.pickups, frame.dropoffs
        );
        frame
    }

    pub fn baseline(&self) -> &GlobalElevationBaseline {
        &self.baseline
    }

    pub fn groups(&self) -> &CoordinateGroups {
        &self.groups
    }

    pub fn index(&self) -> &TimeWindowIndex {
        &self.index
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }
}
