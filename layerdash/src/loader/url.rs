use async_trait::async_trait;
use bytes::Bytes;
use geojson::FeatureCollection;
use log::{debug, info};

use crate::error::LayerdashError;
use crate::loader::{parse_dataset, DatasetLoader};
use crate::settings::{expand_template, MapSettings};

/// Loads datasets over HTTP from the static asset store.
#[derive(Debug, Clone)]
pub struct UrlDatasetLoader {
    http_client: reqwest::Client,
    base_url: String,
    url_template: String,
}

impl UrlDatasetLoader {
    /// Creates a loader resolving dataset urls with the template. The template can use the
    /// `{base_url}` and `{dataset_key}` placeholders.
    pub fn new(
        base_url: impl Into<String>,
        url_template: impl Into<String>,
    ) -> Result<Self, LayerdashError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("layerdash/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| LayerdashError::Configuration(err.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
            url_template: url_template.into(),
        })
    }

    /// Creates a loader for the asset store configured in the settings.
    pub fn from_settings(settings: &MapSettings) -> Result<Self, LayerdashError> {
        Self::new(&settings.base_url, &settings.dataset_url_template)
    }

    /// Url of the dataset.
    pub fn dataset_url(&self, dataset_key: &str) -> Result<String, LayerdashError> {
        expand_template(
            &self.url_template,
            &[("base_url", &self.base_url), ("dataset_key", dataset_key)],
        )
    }

    async fn load_from_web(&self, dataset_key: &str, url: &str) -> Result<Bytes, LayerdashError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|err| LayerdashError::asset_load(dataset_key, err))?;

        let status = response.status();
        if !status.is_success() {
            info!("Failed to load {url}: {status}");
            return Err(LayerdashError::asset_load(
                dataset_key,
                format!("server responded with {status}"),
            ));
        }

        response
            .bytes()
            .await
            .map_err(|err| LayerdashError::asset_load(dataset_key, err))
    }
}

#[async_trait]
impl DatasetLoader for UrlDatasetLoader {
    async fn load(&self, dataset_key: &str) -> Result<FeatureCollection, LayerdashError> {
        let url = self.dataset_url(dataset_key)?;
        debug!("Loading dataset {dataset_key} from {url}");

        let bytes = self.load_from_web(dataset_key, &url).await?;
        parse_dataset(dataset_key, &bytes)
    }
}
