//! In-memory render engine.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::engine::{
    CameraOptions, CameraPose, EngineError, FeatureHit, LayerDescriptor, LngLat, RenderEngine,
    ScreenPoint, SourceSpec, Visibility,
};
use crate::filter::Predicate;
use crate::popup::PopupContent;

/// Render engine that keeps sources, layers, camera and popup in memory and answers hit queries
/// from scripted results.
///
/// The engine is a cheap handle: clones share the same state, so a caller can hand one clone to
/// the [`MapStore`](crate::MapStore) and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct HeadlessEngine {
    state: Arc<Mutex<HeadlessState>>,
}

#[derive(Debug, Default)]
struct HeadlessState {
    sources: HashMap<String, SourceSpec>,
    layers: Vec<LayerDescriptor>,
    images: HashMap<String, String>,
    camera: CameraPose,
    camera_moves: usize,
    popup: Option<(LngLat, PopupContent)>,
    hits: Vec<(ScreenPoint, Vec<FeatureHit>)>,
    cluster_zooms: HashMap<u64, f64>,
    failing_layer: Option<String>,
    resized: usize,
    released: bool,
}

impl HeadlessState {
    fn layer(&self, id: &str) -> Result<&LayerDescriptor, EngineError> {
        self.layers
            .iter()
            .find(|layer| layer.id == id)
            .ok_or_else(|| EngineError::NoSuchLayer(id.to_string()))
    }

    fn layer_mut(&mut self, id: &str) -> Result<&mut LayerDescriptor, EngineError> {
        if self.failing_layer.as_deref() == Some(id) {
            return Err(EngineError::Other(format!("layer `{id}` rejected the change")));
        }

        self.layers
            .iter_mut()
            .find(|layer| layer.id == id)
            .ok_or_else(|| EngineError::NoSuchLayer(id.to_string()))
    }

    fn move_camera(&mut self, options: CameraOptions) {
        if let Some(center) = options.center {
            self.camera.center = center;
        }
        if let Some(zoom) = options.zoom {
            self.camera.zoom = zoom;
        }
        if let Some(pitch) = options.pitch {
            self.camera.pitch = pitch;
        }
        if let Some(bearing) = options.bearing {
            self.camera.bearing = bearing;
        }

        self.camera_moves += 1;
    }
}

impl HeadlessEngine {
    /// Creates an empty engine with the camera at the given pose.
    pub fn new(camera: CameraPose) -> Self {
        let engine = Self::default();
        engine.state.lock().camera = camera;
        engine
    }

    /// Scripts the result of a hit query at the point. Hits are returned topmost first, after
    /// dropping those of missing, hidden or filtered-out layers.
    pub fn script_hits(&self, point: ScreenPoint, hits: Vec<FeatureHit>) {
        let mut state = self.state.lock();
        state.hits.retain(|(p, _)| *p != point);
        state.hits.push((point, hits));
    }

    /// Sets the expansion zoom reported for a cluster.
    pub fn set_cluster_zoom(&self, cluster_id: u64, zoom: f64) {
        self.state.lock().cluster_zooms.insert(cluster_id, zoom);
    }

    /// Makes every change to the layer with the given id fail, until set to `None`.
    pub fn fail_layer_changes(&self, id: Option<&str>) {
        self.state.lock().failing_layer = id.map(str::to_string);
    }

    /// Copy of the registered layer.
    pub fn layer(&self, id: &str) -> Option<LayerDescriptor> {
        self.state.lock().layer(id).ok().cloned()
    }

    /// Ids of all layers in drawing order.
    pub fn layer_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .layers
            .iter()
            .map(|layer| layer.id.clone())
            .collect()
    }

    /// Returns true if the layer exists and is not hidden.
    pub fn is_visible(&self, id: &str) -> bool {
        self.state
            .lock()
            .layer(id)
            .is_ok_and(|layer| Visibility::from_layout(&layer.layout) == Visibility::Visible)
    }

    /// Current filter of the layer.
    pub fn filter(&self, id: &str) -> Option<Predicate> {
        self.state.lock().layer(id).ok()?.filter.clone()
    }

    /// Copy of the registered source.
    pub fn source(&self, id: &str) -> Option<SourceSpec> {
        self.state.lock().sources.get(id).cloned()
    }

    /// Number of registered sources.
    pub fn source_count(&self) -> usize {
        self.state.lock().sources.len()
    }

    /// Url of the registered image.
    pub fn image(&self, name: &str) -> Option<String> {
        self.state.lock().images.get(name).cloned()
    }

    /// Currently open popup.
    pub fn popup(&self) -> Option<(LngLat, PopupContent)> {
        self.state.lock().popup.clone()
    }

    /// Number of camera movements requested so far.
    pub fn camera_moves(&self) -> usize {
        self.state.lock().camera_moves
    }

    /// Number of resize requests.
    pub fn resize_count(&self) -> usize {
        self.state.lock().resized
    }

    /// Returns true once the owner has released the engine.
    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }
}

impl RenderEngine for HeadlessEngine {
    fn add_source(&mut self, id: &str, spec: SourceSpec) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if state.sources.contains_key(id) {
            return Err(EngineError::DuplicateId(id.to_string()));
        }

        state.sources.insert(id.to_string(), spec);
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if let Some(user) = state
            .layers
            .iter()
            .find(|layer| layer.source.as_deref() == Some(id))
        {
            return Err(EngineError::SourceInUse(id.to_string(), user.id.clone()));
        }

        state
            .sources
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| EngineError::NoSuchSource(id.to_string()))
    }

    fn add_layer(&mut self, layer: LayerDescriptor) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if state.failing_layer.as_deref() == Some(layer.id.as_str()) {
            return Err(EngineError::Other(format!("layer `{}` rejected", layer.id)));
        }
        if state.layer(&layer.id).is_ok() {
            return Err(EngineError::DuplicateId(layer.id));
        }
        if let Some(source) = &layer.source {
            if !state.sources.contains_key(source) {
                return Err(EngineError::NoSuchSource(source.clone()));
            }
        }

        state.layers.push(layer);
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        let index = state
            .layers
            .iter()
            .position(|layer| layer.id == id)
            .ok_or_else(|| EngineError::NoSuchLayer(id.to_string()))?;
        state.layers.remove(index);
        Ok(())
    }

    fn has_layer(&self, id: &str) -> bool {
        self.state.lock().layer(id).is_ok()
    }

    fn set_filter(&mut self, id: &str, filter: Option<&Predicate>) -> Result<(), EngineError> {
        self.state.lock().layer_mut(id)?.filter = filter.cloned();
        Ok(())
    }

    fn set_layout_property(
        &mut self,
        id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), EngineError> {
        self.state.lock().layer_mut(id)?.layout.insert(key, value);
        Ok(())
    }

    fn query_rendered_features(&self, point: ScreenPoint, layers: &[String]) -> Vec<FeatureHit> {
        let state = self.state.lock();
        let Some((_, hits)) = state.hits.iter().find(|(p, _)| *p == point) else {
            return vec![];
        };

        hits.iter()
            .filter(|hit| layers.contains(&hit.layer_id))
            .filter(|hit| {
                state.layer(&hit.layer_id).is_ok_and(|layer| {
                    Visibility::from_layout(&layer.layout) == Visibility::Visible
                        && layer.filter.as_ref().map_or(true, |filter| {
                            filter.matches(hit.feature.properties.as_ref())
                        })
                })
            })
            .cloned()
            .collect()
    }

    fn cluster_expansion_zoom(&self, source_id: &str, cluster_id: u64) -> Result<f64, EngineError> {
        let state = self.state.lock();
        if !state.sources.contains_key(source_id) {
            return Err(EngineError::NoSuchSource(source_id.to_string()));
        }

        state
            .cluster_zooms
            .get(&cluster_id)
            .copied()
            .ok_or_else(|| EngineError::Other(format!("cluster {cluster_id} not found")))
    }

    fn camera(&self) -> CameraPose {
        self.state.lock().camera
    }

    fn ease_to(&mut self, options: CameraOptions) {
        self.state.lock().move_camera(options);
    }

    fn fly_to(&mut self, options: CameraOptions) {
        self.state.lock().move_camera(options);
    }

    fn add_image(&mut self, name: &str, url: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if state.images.contains_key(name) {
            return Err(EngineError::DuplicateId(name.to_string()));
        }

        state.images.insert(name.to_string(), url.to_string());
        Ok(())
    }

    fn show_popup(&mut self, at: LngLat, content: &PopupContent) {
        self.state.lock().popup = Some((at, content.clone()));
    }

    fn close_popup(&mut self) {
        self.state.lock().popup = None;
    }

    fn resize(&mut self) {
        self.state.lock().resized += 1;
    }

    fn release(&mut self) {
        let mut state = self.state.lock();
        state.layers.clear();
        state.sources.clear();
        state.popup = None;
        state.released = true;
    }
}
