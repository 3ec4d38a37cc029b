//! Layerdash is the layer lifecycle core of an interactive map dashboard. It keeps a declarative
//! list of thematic layers ("show these now") in sync with a stateful, asynchronous render engine.
//!
//! # Quick start
//!
//! ```ignore
//! use layerdash::{LayerConfig, MapEvent, MapStoreBuilder, DirDatasetLoader};
//! use layerdash::engine::headless::HeadlessEngine;
//!
//! let store = MapStoreBuilder::default()
//!     .with_loader(DirDatasetLoader::new("./mapData"))
//!     .build()?;
//!
//! store.initialize(HeadlessEngine::default());
//! store.handle_event(MapEvent::StyleLoaded);
//!
//! let configs = LayerConfig::list_from_json(&map_config_json)?;
//! store.add_to_map_layer_list(&configs)?;
//! store.settle().await;
//! ```
//!
//! # Main components
//!
//! * [`LayerConfig`] describes a logical layer of a dashboard. Its [identity](LayerConfig::identity)
//!   is derived from the dataset key and the render kind.
//! * [`DatasetLoader`] fetches the GeoJSON dataset of a layer, over HTTP ([`UrlDatasetLoader`]) or
//!   from a directory ([`DirDatasetLoader`]).
//! * [`materialize()`](materialize::materialize) turns a dataset into engine sources and layers:
//!   one plain layer, a cluster triad, or a custom layer of 3D arcs.
//! * [`LayerGroup`](group::LayerGroup) keeps the render layers of one logical layer together, so
//!   they are shown, hidden, filtered and removed as a unit.
//! * [`MapStore`] is the entry point. It owns the [`RenderEngine`] session, the
//!   [`Registry`](registry::Registry) of materialized layers, the open popup and the saved views.
//!
//! The render engine itself is not part of the crate: anything implementing [`RenderEngine`] can
//! be driven. [`engine::headless::HeadlessEngine`] keeps everything in memory.

#![warn(clippy::unwrap_used)]
#![warn(missing_docs)]

pub(crate) mod async_runtime;
mod color;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod group;
pub mod loader;
pub mod materialize;
pub mod popup;
pub mod registry;
pub mod saved_views;
pub mod settings;
mod store;
pub mod style;

#[cfg(test)]
pub(crate) mod tests;

pub use color::Color;
pub use config::{LayerConfig, LayerIdentity, RenderKind};
pub use engine::{EngineError, RenderEngine};
pub use error::LayerdashError;
pub use loader::{DatasetLoader, DirDatasetLoader, UrlDatasetLoader};
pub use registry::LayerStatus;
pub use settings::MapSettings;
pub use store::{ClickOutcome, MapEvent, MapStore, MapStoreBuilder};
