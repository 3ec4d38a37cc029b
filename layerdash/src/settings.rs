//! Settings of a [`MapStore`](crate::MapStore).

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::RenderKind;
use crate::error::LayerdashError;
use crate::saved_views::SavedView;
use crate::style::{StyleDefaults, StyleMap, DEFAULT_SYMBOL_IMAGES};

/// Default location of datasets in the static asset store.
pub const DEFAULT_DATASET_URL_TEMPLATE: &str = "{base_url}/mapData/{dataset_key}.geojson";
/// Default location of symbol images in the static asset store.
pub const DEFAULT_IMAGE_URL_TEMPLATE: &str = "{base_url}/images/map/{name}.png";

/// Layer of the base map added once the engine style is loaded. The dataset is loaded through the
/// store's loader and registered as a source and a layer both named after the dataset key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseLayer {
    /// Key of the dataset.
    pub dataset_key: String,
    /// Render kind of the layer. Arcs are not supported here.
    pub render_kind: RenderKind,
    /// Paint properties.
    #[serde(default)]
    pub paint: StyleMap,
    /// Layout properties.
    #[serde(default)]
    pub layout: StyleMap,
}

/// Vector tile overlay drawn above the base layers on desktop (3D buildings).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorOverlay {
    /// Id of the source.
    pub source_id: String,
    /// Id of the layer.
    pub layer_id: String,
    /// Tile set url.
    pub url: String,
    /// Render kind of the layer.
    pub render_kind: RenderKind,
    /// Paint properties.
    #[serde(default)]
    pub paint: StyleMap,
}

/// Settings of the map store.
///
/// Every field has a default, so settings can be deserialized from a partial JSON document:
///
/// ```json
/// { "base_url": "https://citydashboard.example", "is_mobile": true }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapSettings {
    /// Root of the static asset store.
    pub base_url: String,
    /// Template of dataset urls, see [`DEFAULT_DATASET_URL_TEMPLATE`].
    pub dataset_url_template: String,
    /// Template of symbol image urls, see [`DEFAULT_IMAGE_URL_TEMPLATE`].
    pub image_url_template: String,
    /// The map is shown on a mobile device.
    pub is_mobile: bool,
    /// Delay before an arc layer is attached on desktop.
    pub arc_delay_desktop_ms: u64,
    /// Delay before an arc layer is attached on mobile.
    pub arc_delay_mobile_ms: u64,
    /// Delay before the engine re-reads its container size.
    pub resize_delay_ms: u64,
    /// Duration of the camera animation to a saved view.
    pub saved_view_ease_ms: u64,
    /// Layers added when the engine style is loaded.
    pub base_layers: Vec<BaseLayer>,
    /// Overlay added when the engine style is loaded, desktop only.
    pub vector_overlay: Option<VectorOverlay>,
    /// Names of the images registered for symbol layers.
    pub symbol_images: Vec<String>,
    /// Saved views available after start.
    pub saved_views: Vec<SavedView>,
    /// Style defaults of layer kinds and variants.
    pub style_defaults: StyleDefaults,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            dataset_url_template: DEFAULT_DATASET_URL_TEMPLATE.to_string(),
            image_url_template: DEFAULT_IMAGE_URL_TEMPLATE.to_string(),
            is_mobile: false,
            arc_delay_desktop_ms: 500,
            arc_delay_mobile_ms: 2000,
            resize_delay_ms: 200,
            saved_view_ease_ms: 4000,
            base_layers: vec![],
            vector_overlay: None,
            symbol_images: DEFAULT_SYMBOL_IMAGES.iter().map(|s| s.to_string()).collect(),
            saved_views: vec![],
            style_defaults: StyleDefaults::default(),
        }
    }
}

impl MapSettings {
    /// Parses settings from JSON.
    pub fn from_json(json: &str) -> Result<Self, LayerdashError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks that the url templates only use known placeholders.
    pub fn validate(&self) -> Result<(), LayerdashError> {
        expand_template(
            &self.dataset_url_template,
            &[("base_url", &self.base_url), ("dataset_key", "")],
        )?;
        expand_template(
            &self.image_url_template,
            &[("base_url", &self.base_url), ("name", "")],
        )?;

        if let Some(layer) = self
            .base_layers
            .iter()
            .find(|layer| layer.render_kind == RenderKind::Arc)
        {
            return Err(LayerdashError::Configuration(format!(
                "base layer {} cannot be drawn as arcs",
                layer.dataset_key
            )));
        }

        Ok(())
    }

    /// Delay before an arc layer is attached to the engine.
    pub fn arc_delay(&self) -> Duration {
        Duration::from_millis(if self.is_mobile {
            self.arc_delay_mobile_ms
        } else {
            self.arc_delay_desktop_ms
        })
    }

    /// Url of the symbol image.
    pub fn image_url(&self, name: &str) -> Result<String, LayerdashError> {
        expand_template(
            &self.image_url_template,
            &[("base_url", &self.base_url), ("name", name)],
        )
    }
}

/// Substitutes `{name}` placeholders in the template.
pub(crate) fn expand_template(
    template: &str,
    vars: &[(&str, &str)],
) -> Result<String, LayerdashError> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    strfmt::strfmt(template, &vars)
        .map_err(|err| LayerdashError::Configuration(format!("url template `{template}`: {err}")))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let settings =
            MapSettings::from_json(r#"{ "base_url": "https://city.example", "is_mobile": true }"#)
                .unwrap();
        assert!(settings.is_mobile);
        assert_eq!(settings.arc_delay(), Duration::from_millis(2000));
        assert_eq!(settings.dataset_url_template, DEFAULT_DATASET_URL_TEMPLATE);
        assert_eq!(settings.symbol_images.len(), 6);
        assert_eq!(
            settings.image_url("metro").unwrap(),
            "https://city.example/images/map/metro.png"
        );
    }

    #[test]
    fn desktop_arc_delay() {
        assert_eq!(MapSettings::default().arc_delay(), Duration::from_millis(500));
    }

    #[test]
    fn rejects_unknown_placeholders() {
        let result = MapSettings::from_json(r#"{ "image_url_template": "{cdn}/{name}.png" }"#);
        assert_matches!(result, Err(LayerdashError::Configuration(_)));
    }

    #[test]
    fn rejects_arc_base_layers() {
        let result = MapSettings::from_json(
            r#"{ "base_layers": [{ "dataset_key": "taipei_town", "render_kind": "arc" }] }"#,
        );
        assert_matches!(result, Err(LayerdashError::Configuration(_)));
    }
}
