//! Error types used by the crate.

use thiserror::Error;

use crate::engine::EngineError;

/// Layerdash error type.
#[derive(Debug, Error)]
pub enum LayerdashError {
    /// Dataset could not be fetched or parsed.
    #[error("failed to load dataset `{dataset_key}`: {cause}")]
    AssetLoad {
        /// Key of the dataset that failed to load.
        dataset_key: String,
        /// Human readable reason of the failure.
        cause: String,
    },
    /// The layer with the given identity was never materialized.
    #[error("layer `{0}` is not materialized")]
    UnknownLayer(String),
    /// The operation requires a render engine, but the map was not initialized or was released.
    #[error("render engine is not initialized")]
    EngineMissing,
    /// Error reported by the render engine.
    #[error("render engine error: {0}")]
    Engine(#[from] EngineError),
    /// Invalid settings or layer configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Error decoding JSON data.
    #[error("failed to decode data: {0}")]
    Decoding(#[from] serde_json::Error),
    /// Error reading data from the FS.
    #[error("failed to read file: {0}")]
    FsIo(#[from] std::io::Error),
}

impl LayerdashError {
    pub(crate) fn asset_load(dataset_key: &str, cause: impl ToString) -> Self {
        Self::AssetLoad {
            dataset_key: dataset_key.to_string(),
            cause: cause.to_string(),
        }
    }
}
