//! Fetching of the datasets backing logical layers.

use async_trait::async_trait;
use geojson::FeatureCollection;

use crate::error::LayerdashError;

mod dir;
mod url;

pub use self::dir::DirDatasetLoader;
pub use self::url::UrlDatasetLoader;

/// Loads the GeoJSON dataset for a dataset key.
///
/// The store calls the loader at most once per absent identity, so implementations need neither
/// caching nor deduplication of concurrent requests.
#[async_trait]
pub trait DatasetLoader: Send + Sync {
    /// Loads and parses the dataset.
    async fn load(&self, dataset_key: &str) -> Result<FeatureCollection, LayerdashError>;
}

pub(crate) fn parse_dataset(
    dataset_key: &str,
    bytes: &[u8],
) -> Result<FeatureCollection, LayerdashError> {
    serde_json::from_slice(bytes).map_err(|err| LayerdashError::asset_load(dataset_key, err))
}
