//! Description of logical layers as they come from a dashboard `map_config` list.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::engine::CameraPose;
use crate::style::StyleMap;

/// Geometry/render kind of a logical layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderKind {
    /// Polygons.
    Fill,
    /// Extruded polygons.
    FillExtrusion,
    /// Points drawn as circles.
    Circle,
    /// Lines.
    Line,
    /// Points drawn as icons or text.
    Symbol,
    /// Animated 3D arcs between the two ends of each line feature.
    Arc,
}

impl RenderKind {
    /// Name of the kind as used in identities and style default keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderKind::Fill => "fill",
            RenderKind::FillExtrusion => "fill-extrusion",
            RenderKind::Circle => "circle",
            RenderKind::Line => "line",
            RenderKind::Symbol => "symbol",
            RenderKind::Arc => "arc",
        }
    }

    /// Returns true for kinds that draw point features.
    pub fn is_point(&self) -> bool {
        matches!(self, RenderKind::Circle | RenderKind::Symbol)
    }
}

impl Display for RenderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size variant of a layer, selects `"<kind>-<size>"` style defaults.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeHint {
    /// Smaller than the kind default.
    Small,
    /// Larger than the kind default.
    Big,
}

impl SizeHint {
    /// Name of the variant as used in style default keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeHint::Small => "small",
            SizeHint::Big => "big",
        }
    }
}

/// Feature attribute shown in popups, with its display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyField {
    /// Attribute key in the feature properties.
    pub key: String,
    /// Label shown to the user.
    #[serde(rename = "name")]
    pub display_name: String,
}

/// Stable unique key of a logical layer: `dataset_key + "-" + render_kind`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerIdentity(String);

impl LayerIdentity {
    /// Identity as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id of the engine source backing the layer.
    pub fn source_id(&self) -> String {
        format!("{}-source", self.0)
    }
}

impl Display for LayerIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayerIdentity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Immutable description of a logical layer.
///
/// Deserializes from a dashboard `map_config` entry:
///
/// ```json
/// {
///     "index": "work_soil_liquefaction",
///     "type": "fill",
///     "paint": { "fill-color": "#c87a74" },
///     "property": [{ "key": "class", "name": "Liquefaction potential" }],
///     "title": "Soil liquefaction"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Key of the dataset to load.
    #[serde(rename = "index")]
    pub dataset_key: String,
    /// Render kind.
    #[serde(rename = "type")]
    pub render_kind: RenderKind,
    /// Paint properties with the highest precedence.
    #[serde(default)]
    pub paint: StyleMap,
    /// Attributes shown in popups, in display order.
    #[serde(default, rename = "property")]
    pub properties: Vec<PropertyField>,
    /// Size variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<SizeHint>,
    /// Icon variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Human readable title.
    #[serde(default)]
    pub title: String,
    /// Draw point features as clusters.
    #[serde(default)]
    pub cluster: bool,
    /// Camera pose the map flies to whenever the layer is shown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fly_to: Option<CameraPose>,
}

impl LayerConfig {
    /// Creates a config with empty paint and no popup attributes.
    pub fn new(dataset_key: impl Into<String>, render_kind: RenderKind) -> Self {
        Self {
            dataset_key: dataset_key.into(),
            render_kind,
            paint: StyleMap::default(),
            properties: vec![],
            size: None,
            icon: None,
            title: String::new(),
            cluster: false,
            fly_to: None,
        }
    }

    /// Derives the identity of the layer.
    pub fn identity(&self) -> LayerIdentity {
        LayerIdentity(format!("{}-{}", self.dataset_key, self.render_kind))
    }

    /// Returns true if the layer should be materialized as a cluster triad.
    pub fn is_clustered(&self) -> bool {
        if self.cluster && !self.render_kind.is_point() {
            log::warn!(
                "Clustering is not supported for {} layers, drawing {} as a plain layer",
                self.render_kind,
                self.identity()
            );
        }

        self.cluster && self.render_kind.is_point()
    }

    /// Parses the `map_config` list of a dashboard component.
    pub fn list_from_json(json: &str) -> Result<Vec<LayerConfig>, crate::error::LayerdashError> {
        Ok(serde_json::from_str(json)?)
    }
}
