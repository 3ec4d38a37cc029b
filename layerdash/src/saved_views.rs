//! Named camera poses the user can return to.

use serde::{Deserialize, Serialize};

use crate::engine::{CameraPose, LngLat};

/// Camera pose with a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedView {
    /// Center of the view.
    pub center: LngLat,
    /// Zoom level.
    pub zoom: f64,
    /// Tilt in degrees.
    pub pitch: f64,
    /// Rotation in degrees.
    pub bearing: f64,
    /// Name shown to the user.
    pub label: String,
}

impl SavedView {
    /// Snapshots the camera pose under the label.
    pub fn from_camera(camera: CameraPose, label: impl Into<String>) -> Self {
        Self {
            center: camera.center,
            zoom: camera.zoom,
            pitch: camera.pitch,
            bearing: camera.bearing,
            label: label.into(),
        }
    }

    /// Camera pose of the view.
    pub fn pose(&self) -> CameraPose {
        CameraPose {
            center: self.center,
            zoom: self.zoom,
            pitch: self.pitch,
            bearing: self.bearing,
        }
    }
}

/// Ordered list of saved views. Views are never deduplicated.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SavedViews(Vec<SavedView>);

impl SavedViews {
    /// Creates the list.
    pub fn new(views: Vec<SavedView>) -> Self {
        Self(views)
    }

    /// Appends the view.
    pub fn push(&mut self, view: SavedView) {
        self.0.push(view);
    }

    /// Removes the view at the index, returning it.
    pub fn remove(&mut self, index: usize) -> Option<SavedView> {
        (index < self.0.len()).then(|| self.0.remove(index))
    }

    /// View at the index.
    pub fn get(&self, index: usize) -> Option<&SavedView> {
        self.0.get(index)
    }

    /// All views in order.
    pub fn as_slice(&self) -> &[SavedView] {
        &self.0
    }

    /// Number of views.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no views.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
