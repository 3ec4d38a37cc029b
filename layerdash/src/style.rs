//! Paint and layout property maps and their precedence merge. See [`StyleMap::merged`].

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::{LayerConfig, RenderKind};

/// Map of style properties (`"circle-radius"`, `"fill-color"`, ...) to their values or
/// expressions, as understood by the render engine.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleMap(BTreeMap<String, Value>);

impl StyleMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the property, replacing the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Builder-style version of [`StyleMap::insert`].
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Value of the property.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns true if no properties are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over properties in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Merges the given maps in order. A key set in a later map silently overrides the same key
    /// from any earlier one, so the slice goes from the lowest to the highest precedence.
    pub fn merged<'a>(layers: impl IntoIterator<Item = &'a StyleMap>) -> StyleMap {
        let mut result = StyleMap::new();
        for layer in layers {
            for (key, value) in &layer.0 {
                result.0.insert(key.clone(), value.clone());
            }
        }

        result
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for StyleMap {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Default paint and layout maps, keyed by render kind (`"circle"`) or by kind plus a size/icon
/// variant (`"circle-big"`, `"symbol-metro"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleDefaults {
    /// Paint defaults.
    pub paint: HashMap<String, StyleMap>,
    /// Layout defaults.
    pub layout: HashMap<String, StyleMap>,
}

/// Paint and layout resolved for one render layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStyle {
    /// Paint properties.
    pub paint: StyleMap,
    /// Layout properties.
    pub layout: StyleMap,
}

impl StyleDefaults {
    /// Resolves the style of a standard layer.
    ///
    /// Precedence, lowest first: kind defaults, icon variant defaults, size variant defaults, the
    /// config's own paint. The config carries no layout, so layout stops at the variants.
    pub fn resolve(&self, config: &LayerConfig) -> ResolvedStyle {
        let keys = Self::variant_keys(config);

        let paint = StyleMap::merged(
            keys.iter()
                .filter_map(|key| self.paint.get(key))
                .chain(std::iter::once(&config.paint)),
        );
        let layout = StyleMap::merged(keys.iter().filter_map(|key| self.layout.get(key)));

        ResolvedStyle { paint, layout }
    }

    fn variant_keys(config: &LayerConfig) -> Vec<String> {
        let kind = config.render_kind.as_str();
        let mut keys = vec![kind.to_string()];
        if let Some(icon) = &config.icon {
            keys.push(format!("{kind}-{icon}"));
        }
        if let Some(size) = config.size {
            keys.push(format!("{kind}-{}", size.as_str()));
        }

        keys
    }
}

impl Default for StyleDefaults {
    fn default() -> Self {
        let zoom_radius = |stops: [f64; 4]| {
            json!([
                "interpolate", ["linear"], ["zoom"],
                12, stops[0], 13.5, stops[1], 15, stops[2], 22, stops[3]
            ])
        };

        let mut paint = HashMap::new();
        paint.insert(
            RenderKind::Circle.as_str().to_string(),
            StyleMap::new()
                .with("circle-radius", zoom_radius([2.0, 2.5, 3.0, 5.0]))
                .with("circle-stroke-width", json!(0.5))
                .with("circle-stroke-color", json!("#1d1d1d")),
        );
        paint.insert(
            "circle-big".to_string(),
            StyleMap::new().with("circle-radius", zoom_radius([3.5, 4.0, 5.0, 7.0])),
        );
        paint.insert(
            "circle-small".to_string(),
            StyleMap::new().with("circle-radius", zoom_radius([1.0, 1.5, 2.0, 3.0])),
        );
        paint.insert(
            RenderKind::Fill.as_str().to_string(),
            StyleMap::new().with("fill-opacity", json!(0.7)),
        );
        paint.insert(
            RenderKind::FillExtrusion.as_str().to_string(),
            StyleMap::new().with("fill-extrusion-opacity", json!(0.8)),
        );
        paint.insert(
            RenderKind::Line.as_str().to_string(),
            StyleMap::new().with("line-width", json!(2)),
        );
        paint.insert(
            RenderKind::Symbol.as_str().to_string(),
            StyleMap::new().with("icon-opacity", json!(1)),
        );

        let mut layout = HashMap::new();
        layout.insert(
            RenderKind::Line.as_str().to_string(),
            StyleMap::new()
                .with("line-cap", json!("round"))
                .with("line-join", json!("round")),
        );
        layout.insert(
            RenderKind::Symbol.as_str().to_string(),
            StyleMap::new()
                .with("icon-size", json!(1))
                .with("icon-allow-overlap", json!(true)),
        );
        for icon in DEFAULT_SYMBOL_IMAGES {
            layout.insert(
                format!("symbol-{icon}"),
                StyleMap::new().with("icon-image", json!(icon)),
            );
        }

        Self { paint, layout }
    }
}

/// Names of the symbol images registered with the engine by default.
pub const DEFAULT_SYMBOL_IMAGES: [&str; 6] = [
    "metro",
    "triangle_green",
    "triangle_white",
    "bike_green",
    "bike_orange",
    "bike_red",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizeHint;
    use crate::tests::config;

    #[test]
    fn later_maps_override_earlier_ones() {
        let low = StyleMap::new()
            .with("circle-radius", json!(2))
            .with("circle-color", json!("#000"));
        let high = StyleMap::new().with("circle-radius", json!(5));

        let merged = StyleMap::merged([&low, &high]);
        assert_eq!(merged.get("circle-radius"), Some(&json!(5)));
        assert_eq!(merged.get("circle-color"), Some(&json!("#000")));
    }

    #[test]
    fn resolve_applies_kind_size_and_config_in_order() {
        let defaults = StyleDefaults::default();
        let mut cfg = config("patrol_rain_sewer", RenderKind::Circle);
        cfg.size = Some(SizeHint::Big);
        cfg.paint = StyleMap::new().with("circle-stroke-width", json!(3));

        let style = defaults.resolve(&cfg);
        assert_eq!(
            style.paint.get("circle-radius"),
            defaults.paint["circle-big"].get("circle-radius")
        );
        assert_eq!(style.paint.get("circle-stroke-width"), Some(&json!(3)));
        assert_eq!(
            style.paint.get("circle-stroke-color"),
            Some(&json!("#1d1d1d"))
        );
    }

    #[test]
    fn size_variant_overrides_icon_variant() {
        let mut defaults = StyleDefaults::default();
        defaults.layout.insert(
            "symbol-big".to_string(),
            StyleMap::new().with("icon-size", json!(1.5)),
        );
        defaults.layout.insert(
            "symbol-metro".to_string(),
            StyleMap::new()
                .with("icon-image", json!("metro"))
                .with("icon-size", json!(0.5)),
        );

        let mut cfg = config("metro_station", RenderKind::Symbol);
        cfg.icon = Some("metro".to_string());
        cfg.size = Some(SizeHint::Big);

        let style = defaults.resolve(&cfg);
        assert_eq!(style.layout.get("icon-size"), Some(&json!(1.5)));
        assert_eq!(style.layout.get("icon-image"), Some(&json!("metro")));
        assert_eq!(style.layout.get("icon-allow-overlap"), Some(&json!(true)));
    }

    #[test]
    fn unknown_variant_falls_back_to_kind_defaults() {
        let defaults = StyleDefaults::default();
        let mut cfg = config("bus_stop", RenderKind::Symbol);
        cfg.icon = Some("unregistered".to_string());

        let style = defaults.resolve(&cfg);
        assert_eq!(style.layout, defaults.layout["symbol"]);
    }
}
