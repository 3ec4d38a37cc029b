//! Fixtures shared by the unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value as GeometryValue};
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::config::{LayerConfig, RenderKind};
use crate::error::LayerdashError;
use crate::loader::DatasetLoader;

pub(crate) fn config(dataset_key: &str, render_kind: RenderKind) -> LayerConfig {
    let mut config = LayerConfig::new(dataset_key, render_kind);
    config.title = dataset_key.replace('_', " ");
    config
}

pub(crate) fn clustered_config(dataset_key: &str) -> LayerConfig {
    let mut config = config(dataset_key, RenderKind::Circle);
    config.cluster = true;
    config
}

fn properties(value: Value) -> Option<JsonObject> {
    value.as_object().cloned()
}

pub(crate) fn point_feature(lng: f64, lat: f64, props: Value) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(GeometryValue::Point(vec![lng, lat]))),
        id: None,
        properties: properties(props),
        foreign_members: None,
    }
}

pub(crate) fn line_feature(start: [f64; 2], end: [f64; 2], props: Value) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(GeometryValue::LineString(vec![
            start.to_vec(),
            end.to_vec(),
        ]))),
        id: None,
        properties: properties(props),
        foreign_members: None,
    }
}

pub(crate) fn collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub(crate) fn points_dataset(count: usize) -> FeatureCollection {
    collection(
        (0..count)
            .map(|i| {
                let town = if i % 2 == 0 { "Daan" } else { "Xinyi" };
                point_feature(
                    121.5 + i as f64 * 0.01,
                    25.0,
                    json!({ "name": format!("point {i}"), "town": town }),
                )
            })
            .collect(),
    )
}

/// Loader serving datasets from memory. Unknown keys fail like a missing file.
#[derive(Debug, Default, Clone)]
pub(crate) struct StaticLoader {
    datasets: HashMap<String, FeatureCollection>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StaticLoader {
    pub(crate) fn with(mut self, dataset_key: &str, dataset: FeatureCollection) -> Self {
        self.datasets.insert(dataset_key.to_string(), dataset);
        self
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl DatasetLoader for StaticLoader {
    async fn load(&self, dataset_key: &str) -> Result<FeatureCollection, LayerdashError> {
        self.requests.lock().push(dataset_key.to_string());
        tokio::task::yield_now().await;

        self.datasets
            .get(dataset_key)
            .cloned()
            .ok_or_else(|| LayerdashError::asset_load(dataset_key, "404 Not Found"))
    }
}
