use std::sync::Arc;

use crate::error::LayerdashError;
use crate::loader::{DatasetLoader, UrlDatasetLoader};
use crate::settings::MapSettings;
use crate::store::MapStore;

/// Convenience type to initialize a [`MapStore`].
///
/// ```ignore
/// let store = MapStoreBuilder::default()
///     .with_settings(MapSettings::from_json(&settings_json)?)
///     .with_mobile(true)
///     .build()?;
/// ```
#[derive(Default)]
pub struct MapStoreBuilder {
    settings: Option<MapSettings>,
    loader: Option<Arc<dyn DatasetLoader>>,
    is_mobile: Option<bool>,
}

impl MapStoreBuilder {
    /// Sets the settings of the store.
    ///
    /// Defaults to [`MapSettings::default()`].
    pub fn with_settings(mut self, settings: MapSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Sets the loader of layer datasets.
    ///
    /// Defaults to a [`UrlDatasetLoader`] for the asset store configured in the settings.
    pub fn with_loader(mut self, loader: impl DatasetLoader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Overrides [`MapSettings::is_mobile`].
    pub fn with_mobile(mut self, is_mobile: bool) -> Self {
        self.is_mobile = Some(is_mobile);
        self
    }

    /// Consumes the builder and creates the store.
    pub fn build(self) -> Result<MapStore, LayerdashError> {
        let mut settings = self.settings.unwrap_or_default();
        if let Some(is_mobile) = self.is_mobile {
            settings.is_mobile = is_mobile;
        }
        settings.validate()?;

        let loader = match self.loader {
            Some(loader) => loader,
            None => Arc::new(UrlDatasetLoader::from_settings(&settings)?),
        };

        Ok(MapStore::new(settings, loader))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::*;
    use crate::tests::StaticLoader;

    #[test]
    fn default_store() {
        let store = MapStoreBuilder::default().build().unwrap();
        assert!(store.needs_initialize());
        assert_eq!(store.settings(), &MapSettings::default());
    }

    #[test]
    fn mobile_overrides_settings() {
        let store = MapStoreBuilder::default()
            .with_settings(MapSettings::default())
            .with_loader(StaticLoader::default())
            .with_mobile(true)
            .build()
            .unwrap();
        assert!(store.settings().is_mobile);
        assert_eq!(store.settings().arc_delay(), Duration::from_millis(2000));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let settings = MapSettings {
            dataset_url_template: "{cdn}/{dataset_key}".to_string(),
            ..Default::default()
        };
        let result = MapStoreBuilder::default().with_settings(settings).build();
        assert_matches!(result, Err(LayerdashError::Configuration(_)));
    }
}
