//! Turning a loaded dataset and a layer config into engine sources and layers.

use std::sync::Arc;

use geojson::FeatureCollection;
use log::{debug, warn};
use serde_json::json;

use crate::config::{LayerConfig, RenderKind};
use crate::engine::{
    ClusterOptions, EngineError, LayerDescriptor, LayerType, RenderEngine, SourceSpec, Visibility,
};
use crate::error::LayerdashError;
use crate::filter::Predicate;
use crate::group::{GroupKind, LayerGroup, MemberLayer, MemberRole};
use crate::style::{StyleDefaults, StyleMap};

pub mod arc_layer;

impl From<RenderKind> for LayerType {
    fn from(kind: RenderKind) -> Self {
        match kind {
            RenderKind::Fill => LayerType::Fill,
            RenderKind::FillExtrusion => LayerType::FillExtrusion,
            RenderKind::Circle => LayerType::Circle,
            RenderKind::Line => LayerType::Line,
            RenderKind::Symbol => LayerType::Symbol,
            RenderKind::Arc => LayerType::Custom(arc_layer::ArcScene::default()),
        }
    }
}

/// Registers the source and the layers of a logical layer and returns the resulting visible
/// group.
///
/// * Standard layers get one layer styled by [`StyleDefaults::resolve`].
/// * Clustered layers get a clustering source with cluster circles, count labels and the
///   unclustered points.
/// * Arc layers get one custom layer with a mesh per line feature.
///
/// If the engine rejects any registration, everything added so far is removed again.
pub fn materialize(
    engine: &mut dyn RenderEngine,
    defaults: &StyleDefaults,
    config: Arc<LayerConfig>,
    dataset: Arc<FeatureCollection>,
) -> Result<LayerGroup, LayerdashError> {
    let identity = config.identity();
    let source_id = identity.source_id();

    let (source, layers, kind) = if config.render_kind == RenderKind::Arc {
        let layer = arc_layer::arc_layer_descriptor(
            &config,
            &source_id,
            &dataset.features,
            Visibility::Visible,
        );
        let source = SourceSpec::GeoJson {
            data: dataset.clone(),
            cluster: None,
        };
        (
            source,
            vec![(layer, MemberRole::ArcScene)],
            GroupKind::Arc { dataset },
        )
    } else if config.is_clustered() {
        let source = SourceSpec::GeoJson {
            data: dataset,
            cluster: Some(ClusterOptions::default()),
        };
        (
            source,
            cluster_layers(defaults, &config, &source_id),
            GroupKind::Clustered,
        )
    } else {
        let style = defaults.resolve(&config);
        let mut layer =
            LayerDescriptor::new(identity.as_str(), config.render_kind.into(), &source_id);
        layer.paint = style.paint;
        layer.layout = style.layout;

        let source = SourceSpec::GeoJson {
            data: dataset,
            cluster: None,
        };
        (
            source,
            vec![(layer, MemberRole::Primary)],
            GroupKind::Standard,
        )
    };

    let mut attached = Attached::default();
    if let Err(err) = attached.attach(engine, &source_id, source, &layers) {
        warn!("Failed to attach layer {identity}: {err}");
        attached.detach(engine);
        return Err(err.into());
    }

    debug!(
        "Materialized {identity} with {} render layers",
        layers.len()
    );

    Ok(LayerGroup {
        members: layers
            .into_iter()
            .map(|(layer, role)| MemberLayer::new(layer.id, role))
            .collect(),
        identity,
        config,
        source_id,
        visible: true,
        filter: None,
        kind,
    })
}

fn cluster_layers(
    defaults: &StyleDefaults,
    config: &LayerConfig,
    source_id: &str,
) -> Vec<(LayerDescriptor, MemberRole)> {
    let [base_id, count_id, unclustered_id] = LayerGroup::cluster_member_ids(&config.identity());

    let style = defaults.resolve(config);
    let mut base = LayerDescriptor::new(base_id, config.render_kind.into(), source_id);
    base.paint = style.paint;
    base.layout = style.layout;
    base.filter = MemberRole::ClusterBase.predicate(None);

    // Labels show one less than the abbreviated point count of the cluster.
    let mut count = LayerDescriptor::new(count_id, LayerType::Symbol, source_id);
    count.layout = StyleMap::new()
        .with(
            "text-field",
            json!(["to-string", ["-", ["get", "point_count_abbreviated"], 1]]),
        )
        .with(
            "text-font",
            json!(["DIN Offc Pro Medium", "Arial Unicode MS Bold"]),
        )
        .with("text-size", json!(12))
        .with("text-allow-overlap", json!(true));
    count.filter = Some(Predicate::is_cluster());

    let mut unclustered = LayerDescriptor::new(unclustered_id, LayerType::Circle, source_id);
    unclustered.paint = StyleMap::new()
        .with("circle-color", json!("#11b4da"))
        .with("circle-radius", json!(4))
        .with("circle-stroke-width", json!(1))
        .with("circle-stroke-color", json!("#fff"));
    unclustered.filter = MemberRole::Unclustered.predicate(None);

    vec![
        (base, MemberRole::ClusterBase),
        (count, MemberRole::ClusterCount),
        (unclustered, MemberRole::Unclustered),
    ]
}

#[derive(Default)]
struct Attached {
    source: Option<String>,
    layers: Vec<String>,
}

impl Attached {
    fn attach(
        &mut self,
        engine: &mut dyn RenderEngine,
        source_id: &str,
        source: SourceSpec,
        layers: &[(LayerDescriptor, MemberRole)],
    ) -> Result<(), EngineError> {
        engine.add_source(source_id, source)?;
        self.source = Some(source_id.to_string());

        for (layer, _) in layers {
            engine.add_layer(layer.clone())?;
            self.layers.push(layer.id.clone());
        }

        Ok(())
    }

    fn detach(self, engine: &mut dyn RenderEngine) {
        for id in self.layers.iter().rev() {
            if let Err(err) = engine.remove_layer(id) {
                warn!("Failed to remove layer {id}: {err}");
            }
        }

        if let Some(source) = self.source {
            if let Err(err) = engine.remove_source(&source) {
                warn!("Failed to remove source {source}: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use insta::assert_compact_debug_snapshot;

    use super::*;
    use crate::engine::headless::HeadlessEngine;
    use crate::tests::{clustered_config, config, points_dataset};

    #[test]
    fn standard_layer_uses_resolved_style() {
        let mut engine = HeadlessEngine::default();
        let mut cfg = config("patrol_rain_sewer", RenderKind::Circle);
        cfg.paint = StyleMap::new().with("circle-color", json!("#81bcf5"));

        let group = materialize(
            &mut engine,
            &StyleDefaults::default(),
            Arc::new(cfg),
            Arc::new(points_dataset(3)),
        )
        .unwrap();

        assert_eq!(group.kind, GroupKind::Standard);
        assert_eq!(group.source_id, "patrol_rain_sewer-circle-source");
        let layer = engine.layer("patrol_rain_sewer-circle").unwrap();
        assert_eq!(layer.layer_type, LayerType::Circle);
        assert_eq!(layer.source.as_deref(), Some("patrol_rain_sewer-circle-source"));
        assert_eq!(layer.paint.get("circle-color"), Some(&json!("#81bcf5")));
        assert_eq!(layer.paint.get("circle-stroke-width"), Some(&json!(0.5)));
        assert_eq!(layer.filter, None);
    }

    #[test]
    fn clustered_layer_is_a_triad() {
        let mut engine = HeadlessEngine::default();
        let group = materialize(
            &mut engine,
            &StyleDefaults::default(),
            Arc::new(clustered_config("business_count_by_town_geo")),
            Arc::new(points_dataset(10)),
        )
        .unwrap();

        assert_compact_debug_snapshot!(
            group.members.iter().map(|m| (m.id.as_str(), m.role)).collect::<Vec<_>>(),
            @r#"[("business_count_by_town_geo-circle", ClusterBase), ("business_count_by_town_geo-circle-cluster-count", ClusterCount), ("business_count_by_town_geo-circle-unclustered-point", Unclustered)]"#
        );

        assert_matches!(
            engine.source("business_count_by_town_geo-circle-source"),
            Some(SourceSpec::GeoJson { cluster: Some(options), .. })
                if options == ClusterOptions::default()
        );

        let count = engine
            .layer("business_count_by_town_geo-circle-cluster-count")
            .unwrap();
        assert_eq!(
            count.layout.get("text-field"),
            Some(&json!(["to-string", ["-", ["get", "point_count_abbreviated"], 1]]))
        );
        assert_eq!(
            engine.filter("business_count_by_town_geo-circle"),
            Some(Predicate::is_cluster())
        );
        assert_eq!(
            engine.filter("business_count_by_town_geo-circle-unclustered-point"),
            Some(Predicate::is_not_cluster())
        );
    }

    #[test]
    fn two_clustered_layers_coexist() {
        let mut engine = HeadlessEngine::default();
        let defaults = StyleDefaults::default();
        for key in ["business_count_by_town_geo", "patrol_rain_sewer"] {
            materialize(
                &mut engine,
                &defaults,
                Arc::new(clustered_config(key)),
                Arc::new(points_dataset(5)),
            )
            .unwrap();
        }

        assert_eq!(engine.layer_ids().len(), 6);
        assert_eq!(engine.source_count(), 2);
    }

    #[test]
    fn failed_registration_is_undone() {
        let mut engine = HeadlessEngine::default();
        engine.fail_layer_changes(Some("business_count_by_town_geo-circle-unclustered-point"));

        let result = materialize(
            &mut engine,
            &StyleDefaults::default(),
            Arc::new(clustered_config("business_count_by_town_geo")),
            Arc::new(points_dataset(5)),
        );

        assert_matches!(result, Err(LayerdashError::Engine(EngineError::Other(_))));
        assert!(engine.layer_ids().is_empty());
        assert_eq!(engine.source_count(), 0);
    }
}
