//! Construction of the 3D arc scene drawn by arc layers.
//!
//! Every line feature becomes an arc from its first to its last position. The arc is sampled at
//! [`ARC_INTERVAL`]` + 1` waypoints: longitude and latitude move linearly, and the elevation
//! follows half a sine wave whose height grows with the extent of the line:
//!
//! ```text
//! elevation(j) = sin(π·j / ARC_INTERVAL) · sqrt(|Δlng · Δlat|) · ARC_HEIGHT_FACTOR
//! ```
//!
//! Lines running exactly north-south or east-west therefore stay flat.

use std::f64::consts::PI;

use geojson::{Feature, Value as GeometryValue};
use log::warn;
use serde_json::Value;

use crate::color::Color;
use crate::config::LayerConfig;
use crate::engine::{LayerDescriptor, LayerType, Visibility};
use crate::style::StyleMap;

/// Number of segments of each arc.
pub const ARC_INTERVAL: usize = 20;
/// Elevation of the arc top in meters per degree of extent.
pub const ARC_HEIGHT_FACTOR: f64 = 80000.0;

const DEFAULT_WIDTH: f64 = 2.0;
const DEFAULT_OPACITY: f64 = 0.5;

/// Line mesh of one arc.
#[derive(Debug, Clone, PartialEq)]
pub struct ArcMesh {
    /// `[lng, lat, elevation]` waypoints.
    pub waypoints: Vec<[f64; 3]>,
    /// Color of each waypoint.
    pub colors: Vec<Color>,
    /// Line width in pixels.
    pub width: f64,
    /// Line opacity.
    pub opacity: f64,
}

/// Content of a custom arc layer.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ArcScene {
    /// One mesh per drawn feature.
    pub meshes: Vec<ArcMesh>,
}

/// Arc appearance read from the `arc-*` paint properties of a layer config.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ArcPaint {
    /// Color at the start of each arc.
    pub start: Color,
    /// Color at the end of each arc.
    pub end: Color,
    /// Line width.
    pub width: f64,
    /// Line opacity.
    pub opacity: f64,
}

impl ArcPaint {
    /// Reads `arc-color` (one or two colors), `arc-width` and `arc-opacity`. Missing or invalid
    /// values fall back to white, `2` and `0.5`.
    pub fn from_paint(paint: &StyleMap) -> Self {
        let colors: Vec<Color> = match paint.get("arc-color") {
            Some(Value::Array(items)) => items.iter().filter_map(parse_color).collect(),
            Some(value) => parse_color(value).into_iter().collect(),
            None => vec![],
        };

        let start = colors.first().copied().unwrap_or(Color::WHITE);
        let end = colors.get(1).copied().unwrap_or(start);

        Self {
            start,
            end,
            width: paint
                .get("arc-width")
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_WIDTH),
            opacity: paint
                .get("arc-opacity")
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_OPACITY),
        }
    }
}

fn parse_color(value: &Value) -> Option<Color> {
    let color = value.as_str().and_then(Color::try_from_hex);
    if color.is_none() {
        warn!("Ignoring invalid arc color {value}");
    }

    color
}

/// Samples the arc between the two `[lng, lat]` points.
pub fn synthesize_waypoints(start: [f64; 2], end: [f64; 2]) -> Vec<[f64; 3]> {
    let d_lng = end[0] - start[0];
    let d_lat = end[1] - start[1];
    let max_elevation = (d_lng * d_lat).abs().sqrt() * ARC_HEIGHT_FACTOR;

    (0..=ARC_INTERVAL)
        .map(|j| {
            let k = j as f64 / ARC_INTERVAL as f64;
            [
                start[0] + d_lng * k,
                start[1] + d_lat * k,
                (PI * k).sin() * max_elevation,
            ]
        })
        .collect()
}

fn endpoints(feature: &Feature) -> Option<([f64; 2], [f64; 2])> {
    let geometry = feature.geometry.as_ref()?;
    let GeometryValue::LineString(positions) = &geometry.value else {
        return None;
    };

    let point = |position: &Vec<f64>| match position.as_slice() {
        [lng, lat, ..] => Some([*lng, *lat]),
        _ => None,
    };

    if positions.len() < 2 {
        return None;
    }

    Some((point(positions.first()?)?, point(positions.last()?)?))
}

/// Builds one mesh per line feature. Features without a line geometry of at least two positions
/// are skipped.
pub fn build_scene<'a>(
    paint: &ArcPaint,
    features: impl IntoIterator<Item = &'a Feature>,
) -> ArcScene {
    let colors = Color::gradient(paint.start, paint.end, ARC_INTERVAL + 1);
    let mut skipped = 0;

    let meshes = features
        .into_iter()
        .filter_map(|feature| {
            let endpoints = endpoints(feature);
            if endpoints.is_none() {
                skipped += 1;
            }

            endpoints
        })
        .map(|(start, end)| ArcMesh {
            waypoints: synthesize_waypoints(start, end),
            colors: colors.clone(),
            width: paint.width,
            opacity: paint.opacity,
        })
        .collect();

    if skipped > 0 {
        warn!("Skipped {skipped} features without a line geometry while building arcs");
    }

    ArcScene { meshes }
}

/// Custom layer drawing the features of the arc layer.
pub(crate) fn arc_layer_descriptor<'a>(
    config: &LayerConfig,
    source_id: &str,
    features: impl IntoIterator<Item = &'a Feature>,
    visibility: Visibility,
) -> LayerDescriptor {
    let scene = build_scene(&ArcPaint::from_paint(&config.paint), features);
    let mut layer = LayerDescriptor::new(
        config.identity().as_str(),
        LayerType::Custom(scene),
        source_id,
    );
    layer.layout.insert(Visibility::KEY, visibility.to_value());

    layer
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use serde_json::json;

    use super::*;
    use crate::tests::{line_feature, point_feature};

    #[test]
    fn midpoint_of_meridian_arc_is_flat() {
        let waypoints = synthesize_waypoints([0.0, 0.0], [0.0, 2.0]);
        assert_eq!(waypoints.len(), ARC_INTERVAL + 1);

        let middle = waypoints[10];
        assert_relative_eq!(middle[0], 0.0);
        assert_relative_eq!(middle[1], 1.0);
        assert_relative_eq!(middle[2], 0.0);
    }

    #[test]
    fn diagonal_arc_peaks_in_the_middle() {
        let waypoints = synthesize_waypoints([0.0, 0.0], [2.0, 2.0]);
        assert_relative_eq!(waypoints[0][2], 0.0);
        assert_relative_eq!(waypoints[10][2], 2.0 * ARC_HEIGHT_FACTOR, epsilon = 1e-6);
        assert_relative_eq!(waypoints[20][2], 0.0, epsilon = 1e-6);
        assert_relative_eq!(waypoints[20][0], 2.0);
        assert_relative_eq!(waypoints[5][2], waypoints[15][2], epsilon = 1e-6);
    }

    #[test]
    fn paint_defaults_and_explicit_zero_opacity() {
        let default = ArcPaint::from_paint(&StyleMap::new());
        assert_eq!(default.start, Color::WHITE);
        assert_eq!(default.end, Color::WHITE);
        assert_relative_eq!(default.width, 2.0);
        assert_relative_eq!(default.opacity, 0.5);

        let paint = StyleMap::new()
            .with("arc-color", json!(["#ff0000", "#0000ff"]))
            .with("arc-opacity", json!(0));
        let custom = ArcPaint::from_paint(&paint);
        assert_eq!(custom.start, Color::rgba(255, 0, 0, 255));
        assert_eq!(custom.end, Color::rgba(0, 0, 255, 255));
        assert_relative_eq!(custom.opacity, 0.0);

        let single = ArcPaint::from_paint(&StyleMap::new().with("arc-color", json!(["#00ff00"])));
        assert_eq!(single.start, single.end);
    }

    #[test]
    fn scene_skips_non_line_features() {
        let features = vec![
            line_feature([121.5, 25.0], [121.6, 25.1], json!({})),
            point_feature(121.5, 25.0, json!({})),
            line_feature([121.4, 25.0], [121.5, 24.9], json!({})),
        ];

        let paint = ArcPaint::from_paint(
            &StyleMap::new().with("arc-color", json!(["#000000", "#ffffff"])),
        );
        let scene = build_scene(&paint, &features);
        assert_eq!(scene.meshes.len(), 2);

        let mesh = &scene.meshes[0];
        assert_eq!(mesh.colors.len(), ARC_INTERVAL + 1);
        assert_eq!(mesh.colors[0], Color::BLACK);
        assert_eq!(mesh.colors[ARC_INTERVAL], Color::WHITE);
    }
}
