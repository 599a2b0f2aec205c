//! Renderer-facing frame descriptions.
//!
//! A [`FrameView`] is everything a map front end needs to draw one window:
//! two hexagon layers (pickups and dropoffs) positioned at group centroids,
//! their elevation scales, the window statistics and the clock label. All
//! visual constants live in [`RenderConfig`] and are passed in explicitly.

use serde::{Deserialize, Serialize};

use crate::elevation::{ElevationScale, GlobalElevationBaseline};
use crate::error::Result;
use crate::index::ViewWindow;
use crate::{Direction, GpsPoint, TimeBucket};

/// RGBA colour.
pub type Rgba = [u8; 4];

const GREEN_RAMP: [Rgba; 6] = [
    [229, 245, 224, 255],
    [199, 233, 192, 255],
    [161, 217, 155, 255],
    [116, 196, 118, 255],
    [65, 171, 93, 255],
    [35, 139, 69, 255],
];

const RED_RAMP: [Rgba; 7] = [
    [254, 229, 217, 255],
    [252, 187, 161, 255],
    [252, 146, 114, 255],
    [251, 106, 74, 255],
    [239, 59, 44, 255],
    [203, 24, 29, 255],
    [165, 15, 21, 255],
];

/// Camera placement for the first frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub pitch: f64,
    pub bearing: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            latitude: 42.35,
            longitude: -71.09,
            zoom: 13.5,
            min_zoom: 5.0,
            max_zoom: 15.0,
            pitch: 40.5,
            bearing: 0.0,
        }
    }
}

impl ViewState {
    /// Same camera settings, centred on `center`.
    pub fn centered_on(&self, center: GpsPoint) -> Self {
        Self {
            latitude: center.latitude,
            longitude: center.longitude,
            ..self.clone()
        }
    }
}

/// Visual constants for the hexagon layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Elevation unit multiplied by the scale factor.
    /// Default: 20.0
    pub base_elevation: f64,
    /// Hexagon radius in meters.
    /// Default: 50.0
    pub hexagon_radius: f64,
    /// Output elevation range of the hexagon layer.
    /// Default: [0, 100]
    pub elevation_range: [f64; 2],
    /// Colour ramp for pickups (light to dark green).
    pub start_colors: Vec<Rgba>,
    /// Colour ramp for dropoffs (light to dark red).
    pub end_colors: Vec<Rgba>,
    /// Initial camera. Re-centred on the data when the session has events.
    pub view_state: ViewState,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            base_elevation: 20.0,
            hexagon_radius: 50.0,
            elevation_range: [0.0, 100.0],
            start_colors: GREEN_RAMP.to_vec(),
            end_colors: RED_RAMP.to_vec(),
            view_state: ViewState::default(),
        }
    }
}

impl RenderConfig {
    pub fn colors(&self, direction: Direction) -> &[Rgba] {
        match direction {
            Direction::Start => &self.start_colors,
            Direction::End => &self.end_colors,
        }
    }
}

/// One extruded hexagon layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSpec {
    pub id: String,
    /// `[lng, lat]` of each event's group centroid; the renderer bins them.
    pub positions: Vec<[f64; 2]>,
    pub elevation_scale: f64,
    pub elevation_range: [f64; 2],
    pub radius: f64,
    pub color_range: Vec<Rgba>,
    pub extruded: bool,
    pub coverage: f64,
}

impl LayerSpec {
    /// Layer for one direction of a window.
    pub fn for_direction(
        view: &ViewWindow<'_>,
        direction: Direction,
        scale: &ElevationScale,
        config: &RenderConfig,
    ) -> Self {
        Self {
            id: format!("{}-hexagon-layer", direction),
            positions: view
                .events(direction)
                .iter()
                .map(|e| e.group_center.lng_lat())
                .collect(),
            elevation_scale: scale.get(direction).elevation_scale,
            elevation_range: config.elevation_range,
            radius: config.hexagon_radius,
            color_range: config.colors(direction).to_vec(),
            extruded: true,
            coverage: 1.0,
        }
    }
}

/// Everything needed to draw one time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameView {
    pub bucket: TimeBucket,
    /// e.g. `"8:00 AM – 8:10 AM"`
    pub time_label: String,
    pub pickups: usize,
    pub dropoffs: usize,
    pub total: usize,
    pub start_layer: LayerSpec,
    pub end_layer: LayerSpec,
    pub baseline: GlobalElevationBaseline,
    pub scale: ElevationScale,
    pub view_state: ViewState,
}

impl FrameView {
    /// Run the local pass on `view` and describe both layers.
    ///
    /// `view` must have been taken for `bucket`.
    pub fn build(
        bucket: TimeBucket,
        view: &ViewWindow<'_>,
        baseline: &GlobalElevationBaseline,
        config: &RenderConfig,
        view_state: ViewState,
    ) -> Self {
        let scale = ElevationScale::for_window(view, baseline, config.base_elevation);
        Self {
            bucket,
            time_label: bucket.range_label(),
            pickups: view.start.len(),
            dropoffs: view.end.len(),
            total: view.total(),
            start_layer: LayerSpec::for_direction(view, Direction::Start, &scale, config),
            end_layer: LayerSpec::for_direction(view, Direction::End, &scale, config),
            baseline: *baseline,
            scale,
            view_state,
        }
    }

    pub fn layer(&self, direction: Direction) -> &LayerSpec {
        match direction {
            Direction::Start => &self.start_layer,
            Direction::End => &self.end_layer,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
