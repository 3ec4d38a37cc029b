//! Capability interface of the render engine the store drives.
//!
//! The store never draws anything itself: it registers sources and layers, toggles their layout
//! and filters, asks for hit-tests and opens popups through [`RenderEngine`]. Any engine (a
//! native map widget, a browser bridge, the in-memory [`headless::HeadlessEngine`]) can be plugged
//! in.

use std::sync::Arc;
use std::time::Duration;

use geojson::{Feature, FeatureCollection};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::filter::Predicate;
use crate::materialize::arc_layer::ArcScene;
use crate::popup::PopupContent;
use crate::style::StyleMap;

pub mod headless;

/// Error reported by a render engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A source or layer with this id is already registered.
    #[error("id `{0}` is already in use")]
    DuplicateId(String),
    /// No layer with this id.
    #[error("layer `{0}` does not exist")]
    NoSuchLayer(String),
    /// No source with this id.
    #[error("source `{0}` does not exist")]
    NoSuchSource(String),
    /// The source cannot be removed while layers use it.
    #[error("source `{0}` is used by layer `{1}`")]
    SourceInUse(String, String),
    /// Any other engine failure.
    #[error("{0}")]
    Other(String),
}

/// Position on the screen in pixels.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
}

impl ScreenPoint {
    /// Creates a new point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Geographic coordinate.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    /// Longitude in degrees.
    pub lng: f64,
    /// Latitude in degrees.
    pub lat: f64,
}

impl LngLat {
    /// Creates a new coordinate.
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Returns the coordinate with longitude shifted by whole turns so that it lies within 180°
    /// of `reference`. Used to open popups on the copy of the world the user clicked on.
    pub fn wrapped_near(self, reference: LngLat) -> Self {
        if !self.lng.is_finite() || !reference.lng.is_finite() {
            return self;
        }

        let turns = ((reference.lng - self.lng) / 360.0).round();
        Self {
            lng: self.lng + turns * 360.0,
            ..self
        }
    }

    /// Reads a GeoJSON position (`[lng, lat, ...]`).
    pub fn from_position(position: &[f64]) -> Option<Self> {
        match position {
            [lng, lat, ..] => Some(Self::new(*lng, *lat)),
            _ => None,
        }
    }
}

/// Camera position of the map.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    /// Center of the view.
    pub center: LngLat,
    /// Zoom level.
    pub zoom: f64,
    /// Tilt in degrees.
    pub pitch: f64,
    /// Rotation in degrees, north is 0.
    pub bearing: f64,
}

/// Target of a camera movement. Unset fields keep their current value.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct CameraOptions {
    /// New center.
    pub center: Option<LngLat>,
    /// New zoom level.
    pub zoom: Option<f64>,
    /// New tilt.
    pub pitch: Option<f64>,
    /// New rotation.
    pub bearing: Option<f64>,
    /// Animation duration.
    pub duration: Option<Duration>,
}

impl From<CameraPose> for CameraOptions {
    fn from(pose: CameraPose) -> Self {
        Self {
            center: Some(pose.center),
            zoom: Some(pose.zoom),
            pitch: Some(pose.pitch),
            bearing: Some(pose.bearing),
            duration: None,
        }
    }
}

/// Clustering parameters of a GeoJSON source.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterOptions {
    /// Max zoom to cluster points on.
    pub max_zoom: u32,
    /// Radius of each cluster in pixels.
    pub radius: u32,
    /// Minimum number of points to form a cluster.
    pub min_points: u32,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            max_zoom: 12,
            radius: 50,
            min_points: 4,
        }
    }
}

/// Data source registered with the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpec {
    /// In-memory GeoJSON data, optionally clustered.
    GeoJson {
        /// Features of the source.
        data: Arc<FeatureCollection>,
        /// Clustering parameters.
        cluster: Option<ClusterOptions>,
    },
    /// Vector tiles from the given url.
    Vector {
        /// Tile set url.
        url: String,
    },
}

/// Visibility layout property of a render layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Visibility {
    /// The layer is drawn.
    Visible,
    /// The layer keeps its place but is not drawn.
    None,
}

impl Visibility {
    /// Layout property key.
    pub const KEY: &'static str = "visibility";

    /// Layout property value.
    pub fn to_value(self) -> Value {
        match self {
            Visibility::Visible => json!("visible"),
            Visibility::None => json!("none"),
        }
    }

    /// Reads the layout property value. A missing value means visible.
    pub fn from_layout(layout: &StyleMap) -> Self {
        match layout.get(Self::KEY).and_then(Value::as_str) {
            Some("none") => Visibility::None,
            _ => Visibility::Visible,
        }
    }
}

impl From<bool> for Visibility {
    fn from(visible: bool) -> Self {
        if visible {
            Visibility::Visible
        } else {
            Visibility::None
        }
    }
}

/// Type of a render layer.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerType {
    /// Polygon fill.
    Fill,
    /// Extruded polygons.
    FillExtrusion,
    /// Circles.
    Circle,
    /// Lines.
    Line,
    /// Icons and text.
    Symbol,
    /// Custom 3D layer holding one line mesh per arc.
    Custom(ArcScene),
}

/// Render layer registered with the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerDescriptor {
    /// Unique layer id.
    pub id: String,
    /// Layer type.
    pub layer_type: LayerType,
    /// Source the layer draws, if any.
    pub source: Option<String>,
    /// Paint properties.
    pub paint: StyleMap,
    /// Layout properties.
    pub layout: StyleMap,
    /// Feature filter.
    pub filter: Option<Predicate>,
}

impl LayerDescriptor {
    /// Creates a layer drawing the given source.
    pub fn new(id: impl Into<String>, layer_type: LayerType, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            layer_type,
            source: Some(source.into()),
            paint: StyleMap::default(),
            layout: StyleMap::default(),
            filter: None,
        }
    }
}

/// Feature returned by a hit-test.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureHit {
    /// Id of the render layer the feature was drawn by.
    pub layer_id: String,
    /// The feature with its properties.
    pub feature: Feature,
}

/// Render engine capabilities used by the store.
///
/// All calls are made from the store while it holds its state lock, so an implementation never
/// sees concurrent calls.
pub trait RenderEngine: Send {
    /// Registers a data source.
    fn add_source(&mut self, id: &str, spec: SourceSpec) -> Result<(), EngineError>;
    /// Removes a data source. Fails if a layer still uses it.
    fn remove_source(&mut self, id: &str) -> Result<(), EngineError>;
    /// Registers a render layer. Its source must already exist.
    fn add_layer(&mut self, layer: LayerDescriptor) -> Result<(), EngineError>;
    /// Removes a render layer.
    fn remove_layer(&mut self, id: &str) -> Result<(), EngineError>;
    /// Returns true if a layer with the id is registered.
    fn has_layer(&self, id: &str) -> bool;
    /// Sets or clears the filter of a layer.
    fn set_filter(&mut self, id: &str, filter: Option<&Predicate>) -> Result<(), EngineError>;
    /// Sets a layout property of a layer.
    fn set_layout_property(&mut self, id: &str, key: &str, value: Value)
        -> Result<(), EngineError>;
    /// Returns features drawn under the point by the given layers, topmost first.
    fn query_rendered_features(&self, point: ScreenPoint, layers: &[String]) -> Vec<FeatureHit>;
    /// Zoom level at which the cluster breaks apart.
    fn cluster_expansion_zoom(&self, source_id: &str, cluster_id: u64) -> Result<f64, EngineError>;
    /// Current camera.
    fn camera(&self) -> CameraPose;
    /// Smoothly moves the camera.
    fn ease_to(&mut self, options: CameraOptions);
    /// Moves the camera along a flight curve.
    fn fly_to(&mut self, options: CameraOptions);
    /// Loads an image from the url and registers it under the name for symbol layers.
    fn add_image(&mut self, name: &str, url: &str) -> Result<(), EngineError>;
    /// Opens a popup, replacing the current one.
    fn show_popup(&mut self, at: LngLat, content: &PopupContent);
    /// Closes the popup if any.
    fn close_popup(&mut self);
    /// Re-reads the size of the container.
    fn resize(&mut self) {}
    /// Called once when the store drops the engine.
    fn release(&mut self) {}

    /// Sets the visibility layout property of a layer.
    fn set_visibility(&mut self, id: &str, visibility: Visibility) -> Result<(), EngineError> {
        self.set_layout_property(id, Visibility::KEY, visibility.to_value())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn wraps_longitude_towards_reference() {
        let click = LngLat::new(-179.0, 10.0);
        let feature = LngLat::new(181.0, 10.0).wrapped_near(click);
        assert_relative_eq!(feature.lng, -179.0);

        let far = LngLat::new(-540.0, 0.0).wrapped_near(LngLat::new(10.0, 0.0));
        assert_relative_eq!(far.lng, 180.0);

        let near = LngLat::new(121.5, 25.0).wrapped_near(LngLat::new(121.4, 25.0));
        assert_relative_eq!(near.lng, 121.5);

        let huge = LngLat::new(1e20, 25.0).wrapped_near(LngLat::new(121.0, 25.0));
        assert!(huge.lng.is_finite());
        assert!(huge.lng.abs() < 1e20);

        let nan = LngLat::new(f64::NAN, 25.0).wrapped_near(LngLat::new(121.0, 25.0));
        assert!(nan.lng.is_nan());

        let reference = LngLat::new(f64::INFINITY, 0.0);
        assert_relative_eq!(LngLat::new(200.0, 0.0).wrapped_near(reference).lng, 200.0);
    }

    #[test]
    fn visibility_reads_layout() {
        let hidden = StyleMap::new().with(Visibility::KEY, Visibility::None.to_value());
        assert_eq!(Visibility::from_layout(&hidden), Visibility::None);
        assert_eq!(Visibility::from_layout(&StyleMap::new()), Visibility::Visible);
    }
}
