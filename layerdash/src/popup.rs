//! Popups composed from clicked features.

use std::sync::Arc;

use geojson::Feature;
use log::warn;
use serde_json::Value;

use crate::config::LayerConfig;
use crate::engine::{FeatureHit, LngLat};
use crate::registry::Registry;

/// Maximum number of layers shown in one composite popup.
pub const MAX_POPUP_LAYERS: usize = 3;

/// Labelled attribute value shown in a popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupRow {
    /// Display name of the attribute.
    pub label: String,
    /// Value as text.
    pub value: String,
}

/// Clicked feature together with the config of the layer it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupEntry {
    /// Render layer the feature was hit on.
    pub layer_id: String,
    /// The feature.
    pub feature: Feature,
    /// Config of the logical layer.
    pub config: Arc<LayerConfig>,
}

impl PopupEntry {
    /// Rows for the attributes listed in the config, in the config order. Attributes the feature
    /// does not have are left out.
    pub fn rows(&self) -> Vec<PopupRow> {
        feature_rows(&self.feature, &self.config)
    }
}

pub(crate) fn feature_rows(feature: &Feature, config: &LayerConfig) -> Vec<PopupRow> {
    config
        .properties
        .iter()
        .filter_map(|field| {
            let value = feature.properties.as_ref()?.get(&field.key)?;
            Some(PopupRow {
                label: field.display_name.clone(),
                value: match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
            })
        })
        .collect()
}

/// Entries of a composite popup with the one currently shown by the inspector.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupSelection {
    /// Where the user clicked.
    pub coordinate: LngLat,
    /// Up to [`MAX_POPUP_LAYERS`] entries from distinct layers, topmost first.
    pub entries: Vec<PopupEntry>,
    active: usize,
}

impl PopupSelection {
    /// Index of the shown entry.
    pub fn active(&self) -> usize {
        self.active
    }

    /// The shown entry.
    pub fn active_entry(&self) -> Option<&PopupEntry> {
        self.entries.get(self.active)
    }

    /// Shows the entry at the index. Returns false if there is no such entry.
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.entries.len() {
            return false;
        }

        self.active = index;
        true
    }

    /// Shows the next entry, wrapping around.
    pub fn next(&mut self) {
        if !self.entries.is_empty() {
            self.active = (self.active + 1) % self.entries.len();
        }
    }

    /// Shows the previous entry, wrapping around.
    pub fn previous(&mut self) {
        if !self.entries.is_empty() {
            self.active = (self.active + self.entries.len() - 1) % self.entries.len();
        }
    }
}

/// Content of the popup open on the map.
#[derive(Debug, Clone, PartialEq)]
pub enum PopupContent {
    /// Features of several layers under the click.
    Composite(PopupSelection),
    /// Number of points in a clicked cluster.
    ClusterSummary {
        /// Where the popup is anchored.
        coordinate: LngLat,
        /// Number of nearby points.
        count: u64,
    },
    /// Attributes of a clicked unclustered point.
    FeatureDetail {
        /// Position of the point.
        coordinate: LngLat,
        /// Title of the layer.
        title: String,
        /// Attribute rows.
        rows: Vec<PopupRow>,
    },
}

impl PopupContent {
    /// Where the popup is anchored.
    pub fn coordinate(&self) -> LngLat {
        match self {
            PopupContent::Composite(selection) => selection.coordinate,
            PopupContent::ClusterSummary { coordinate, .. } => *coordinate,
            PopupContent::FeatureDetail { coordinate, .. } => *coordinate,
        }
    }
}

/// Builds a composite popup from hits ordered topmost first.
///
/// Consecutive hits on the same layer collapse into the first of them, and collection stops at
/// [`MAX_POPUP_LAYERS`] entries. Hits on layers the registry does not know and cluster aggregates
/// are ignored. Returns `None` if nothing is left.
pub fn compose_popup(
    hits: &[FeatureHit],
    registry: &Registry,
    coordinate: LngLat,
) -> Option<PopupSelection> {
    let mut entries: Vec<PopupEntry> = Vec::with_capacity(MAX_POPUP_LAYERS);
    let mut previous_layer: Option<&str> = None;

    for hit in hits {
        if entries.len() == MAX_POPUP_LAYERS {
            break;
        }
        if previous_layer == Some(hit.layer_id.as_str()) {
            continue;
        }
        previous_layer = Some(hit.layer_id.as_str());

        let Some((group, role)) = registry.member(&hit.layer_id) else {
            warn!("Clicked feature of unknown layer {}", hit.layer_id);
            continue;
        };
        if role.is_cluster() {
            continue;
        }

        entries.push(PopupEntry {
            layer_id: hit.layer_id.clone(),
            feature: hit.feature.clone(),
            config: group.config.clone(),
        });
    }

    (!entries.is_empty()).then_some(PopupSelection {
        coordinate,
        entries,
        active: 0,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::{PropertyField, RenderKind};
    use crate::group::{GroupKind, LayerGroup, MemberLayer, MemberRole};
    use crate::tests::{config, point_feature};

    fn registry(keys: &[&str]) -> Registry {
        let mut registry = Registry::default();
        for key in keys {
            let config = config(key, RenderKind::Circle);
            let identity = config.identity();
            registry.register(LayerGroup {
                source_id: identity.source_id(),
                members: vec![MemberLayer::new(identity.as_str(), MemberRole::Primary)],
                identity,
                config: Arc::new(config),
                visible: true,
                filter: None,
                kind: GroupKind::Standard,
            });
        }

        registry
    }

    fn hit(layer: &str, n: i32) -> FeatureHit {
        FeatureHit {
            layer_id: format!("{layer}-circle"),
            feature: point_feature(0.0, 0.0, json!({ "n": n })),
        }
    }

    #[test]
    fn collapses_runs_and_stops_at_three_layers() {
        let registry = registry(&["a", "b", "c", "d"]);
        let hits = [hit("a", 1), hit("a", 2), hit("b", 3), hit("c", 4), hit("d", 5)];

        let selection = compose_popup(&hits, &registry, LngLat::default()).unwrap();
        let layers: Vec<_> = selection.entries.iter().map(|e| e.layer_id.as_str()).collect();
        assert_eq!(layers, ["a-circle", "b-circle", "c-circle"]);
        assert_eq!(
            selection.entries[0].feature.properties.as_ref().unwrap()["n"],
            json!(1)
        );
    }

    #[test]
    fn only_consecutive_duplicates_are_skipped() {
        let registry = registry(&["a", "b"]);
        let hits = [hit("a", 1), hit("b", 2), hit("a", 3)];

        let selection = compose_popup(&hits, &registry, LngLat::default()).unwrap();
        assert_eq!(selection.entries.len(), 3);
        assert_eq!(selection.entries[2].layer_id, "a-circle");
    }

    #[test]
    fn nothing_to_show() {
        let registry = registry(&["a"]);
        assert_eq!(compose_popup(&[], &registry, LngLat::default()), None);
        assert_eq!(
            compose_popup(&[hit("unknown", 1)], &registry, LngLat::default()),
            None
        );
    }

    #[test]
    fn cluster_aggregates_are_left_out() {
        let mut registry = registry(&["a"]);
        let cluster = crate::tests::clustered_config("bus_stop");
        let identity = cluster.identity();
        let [base, count, unclustered] = LayerGroup::cluster_member_ids(&identity);
        registry.register(LayerGroup {
            source_id: identity.source_id(),
            members: vec![
                MemberLayer::new(base.as_str(), MemberRole::ClusterBase),
                MemberLayer::new(count.as_str(), MemberRole::ClusterCount),
                MemberLayer::new(unclustered.as_str(), MemberRole::Unclustered),
            ],
            identity,
            config: Arc::new(cluster),
            visible: true,
            filter: None,
            kind: GroupKind::Clustered,
        });

        let cluster_hit = |layer_id: &str| FeatureHit {
            layer_id: layer_id.to_string(),
            feature: point_feature(0.0, 0.0, json!({ "point_count": 5, "cluster_id": 1 })),
        };
        let hits = [hit("a", 1), cluster_hit(&base), cluster_hit(&count)];

        let selection = compose_popup(&hits, &registry, LngLat::default()).unwrap();
        let layers: Vec<_> = selection.entries.iter().map(|e| e.layer_id.as_str()).collect();
        assert_eq!(layers, ["a-circle"]);
        assert_eq!(compose_popup(&hits[1..], &registry, LngLat::default()), None);
    }

    #[test]
    fn inspector_paging_wraps() {
        let registry = registry(&["a", "b", "c"]);
        let hits = [hit("a", 1), hit("b", 2), hit("c", 3)];
        let mut selection = compose_popup(&hits, &registry, LngLat::default()).unwrap();

        selection.previous();
        assert_eq!(selection.active(), 2);
        selection.next();
        assert_eq!(selection.active(), 0);
        assert!(selection.select(1));
        assert!(!selection.select(3));
        assert_eq!(selection.active_entry().unwrap().layer_id, "b-circle");
    }

    #[test]
    fn rows_follow_config_order() {
        let mut cfg = config("patrol_rain_sewer", RenderKind::Circle);
        cfg.properties = vec![
            PropertyField {
                key: "ground_far".to_string(),
                display_name: "Depth [m]".to_string(),
            },
            PropertyField {
                key: "station_no".to_string(),
                display_name: "NO".to_string(),
            },
            PropertyField {
                key: "missing".to_string(),
                display_name: "Missing".to_string(),
            },
        ];

        let entry = PopupEntry {
            layer_id: "patrol_rain_sewer-circle".to_string(),
            feature: point_feature(0.0, 0.0, json!({ "station_no": "A-12", "ground_far": 2.5 })),
            config: Arc::new(cfg),
        };

        assert_eq!(
            entry.rows(),
            vec![
                PopupRow {
                    label: "Depth [m]".to_string(),
                    value: "2.5".to_string()
                },
                PopupRow {
                    label: "NO".to_string(),
                    value: "A-12".to_string()
                },
            ]
        );
    }
}
