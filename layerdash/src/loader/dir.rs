use std::path::PathBuf;

use async_trait::async_trait;
use geojson::FeatureCollection;
use log::debug;

use crate::error::LayerdashError;
use crate::loader::{parse_dataset, DatasetLoader};

/// Loads datasets from `{dir}/{dataset_key}.geojson` files.
#[derive(Debug, Clone)]
pub struct DirDatasetLoader {
    dir: PathBuf,
}

impl DirDatasetLoader {
    /// Creates a loader reading from the directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, dataset_key: &str) -> PathBuf {
        self.dir.join(format!("{dataset_key}.geojson"))
    }
}

#[async_trait]
impl DatasetLoader for DirDatasetLoader {
    async fn load(&self, dataset_key: &str) -> Result<FeatureCollection, LayerdashError> {
        let path = self.path(dataset_key);
        debug!("Loading dataset {dataset_key} from {}", path.display());

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|err| LayerdashError::asset_load(dataset_key, err))?;
        parse_dataset(dataset_key, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn reads_dataset_file() {
        let dir = std::env::temp_dir().join(format!("layerdash-dir-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(
            dir.join("metro.geojson"),
            r#"{ "type": "FeatureCollection", "features": [
                { "type": "Feature", "geometry": { "type": "Point", "coordinates": [121.5, 25.0] },
                  "properties": { "name": "Taipei Main" } }
            ] }"#,
        )
        .await
        .unwrap();

        let loader = DirDatasetLoader::new(&dir);
        let dataset = loader.load("metro").await.unwrap();
        assert_eq!(dataset.features.len(), 1);

        assert_matches!(
            loader.load("missing").await,
            Err(LayerdashError::AssetLoad { dataset_key, .. }) if dataset_key == "missing"
        );

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
