//! The map store: the entry point driving layers, popups and the camera of one map view.

use std::sync::Arc;
use std::time::Duration;

use geojson::Value as GeometryValue;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::async_runtime;
use crate::config::{LayerConfig, LayerIdentity, RenderKind};
use crate::engine::{CameraOptions, LayerDescriptor, LngLat, RenderEngine, ScreenPoint, SourceSpec};
use crate::error::LayerdashError;
use crate::filter::{AttributeFilter, POINT_COUNT};
use crate::group::MemberRole;
use crate::loader::DatasetLoader;
use crate::materialize::materialize;
use crate::popup::{compose_popup, feature_rows, PopupContent};
use crate::registry::{LayerStatus, LoadTicket, Registry};
use crate::saved_views::{SavedView, SavedViews};
use crate::settings::MapSettings;

mod builder;

pub use builder::MapStoreBuilder;

/// Property set by the engine on cluster features, identifying the cluster.
const CLUSTER_ID: &str = "cluster_id";

/// Event reported by the render engine.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    /// The engine finished loading its style and accepts sources and layers.
    StyleLoaded,
    /// The user clicked the map.
    Click {
        /// Clicked screen position.
        point: ScreenPoint,
        /// Geographic position of the click.
        lng_lat: LngLat,
    },
    /// The engine finished drawing.
    Idle,
}

/// Result of a click on the map.
#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    /// Nothing is under the click. An open popup stays open.
    Nothing,
    /// A popup was opened, replacing the previous one.
    Opened(PopupContent),
}

/// Live render engine with the tasks spawned against it. Dropping the session aborts the tasks
/// and releases the engine.
struct EngineSession {
    engine: Box<dyn RenderEngine>,
    generation: u64,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineSession {
    fn spawn(&mut self, future: impl std::future::Future<Output = ()> + Send + 'static) {
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(async_runtime::spawn(future));
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }

        self.engine.release();
        debug!("Render engine session {} released", self.generation);
    }
}

#[derive(Default)]
struct MapState {
    session: Option<EngineSession>,
    registry: Registry,
    popup: Option<PopupContent>,
    saved_views: SavedViews,
    generation: u64,
}

impl MapState {
    fn session_mut(&mut self, generation: u64) -> Option<&mut EngineSession> {
        self.session
            .as_mut()
            .filter(|session| session.generation == generation)
    }

    fn engine_mut(&mut self) -> Result<&mut dyn RenderEngine, LayerdashError> {
        match self.session.as_mut() {
            Some(session) => Ok(session.engine.as_mut()),
            None => Err(LayerdashError::EngineMissing),
        }
    }

    fn is_current_load(
        &self,
        identity: &LayerIdentity,
        ticket: LoadTicket,
        generation: u64,
    ) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.generation == generation)
            && self.registry.is_current_load(identity, ticket)
    }
}

/// Orchestrates the logical layers of a map view over a [`RenderEngine`].
///
/// The store is a cheap handle; clones share the same state. Datasets are loaded in `tokio`
/// tasks, so the store must be used inside a `tokio` runtime.
///
/// ```ignore
/// let store = MapStoreBuilder::default().with_settings(settings).build()?;
/// store.initialize(engine);
/// store.handle_event(MapEvent::StyleLoaded);
/// store.add_to_map_layer_list(&configs)?;
/// ```
#[derive(Clone)]
pub struct MapStore {
    inner: Arc<Mutex<MapState>>,
    loader: Arc<dyn DatasetLoader>,
    settings: Arc<MapSettings>,
}

impl std::fmt::Debug for MapStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapStore")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl MapStore {
    pub(crate) fn new(settings: MapSettings, loader: Arc<dyn DatasetLoader>) -> Self {
        let state = MapState {
            saved_views: SavedViews::new(settings.saved_views.clone()),
            ..Default::default()
        };

        Self {
            inner: Arc::new(Mutex::new(state)),
            loader,
            settings: Arc::new(settings),
        }
    }

    /// Settings of the store.
    pub fn settings(&self) -> &MapSettings {
        &self.settings
    }

    /// Starts a new session with the engine. A previous session is released, and every logical
    /// layer is forgotten.
    pub fn initialize(&self, engine: impl RenderEngine + 'static) {
        let mut state = self.inner.lock();
        state.registry.take_groups();
        state.popup = None;
        state.generation += 1;
        let generation = state.generation;
        state.session = Some(EngineSession {
            engine: Box::new(engine),
            generation,
            tasks: vec![],
        });

        info!("Map initialized, session {generation}");
    }

    /// Returns true if there is no engine session, and [`MapStore::initialize`] must be called
    /// before layers can be shown.
    pub fn needs_initialize(&self) -> bool {
        self.inner.lock().session.is_none()
    }

    /// Handles an event of the render engine.
    pub fn handle_event(&self, event: MapEvent) {
        match event {
            MapEvent::StyleLoaded => self.add_base_layers(),
            MapEvent::Click { point, lng_lat } => match self.handle_click(point, lng_lat) {
                Ok(outcome) => debug!("Click at {lng_lat:?}: {outcome:?}"),
                Err(err) => warn!("Failed to handle click: {err}"),
            },
            MapEvent::Idle => self.inner.lock().registry.set_engine_idle(),
        }
    }

    fn add_base_layers(&self) {
        let mut guard = self.inner.lock();
        let Some(session) = guard.session.as_mut() else {
            warn!("Style loaded without a render engine");
            return;
        };

        for base in &self.settings.base_layers {
            let store = self.clone();
            let base = base.clone();
            let generation = session.generation;
            session.spawn(async move {
                let dataset = match store.loader.load(&base.dataset_key).await {
                    Ok(dataset) => Arc::new(dataset),
                    Err(err) => {
                        error!("Failed to load base layer: {err}");
                        return;
                    }
                };

                let mut state = store.inner.lock();
                let Some(session) = state.session_mut(generation) else {
                    return;
                };

                let mut layer = LayerDescriptor::new(
                    base.dataset_key.as_str(),
                    base.render_kind.into(),
                    base.dataset_key.as_str(),
                );
                layer.paint = base.paint;
                layer.layout = base.layout;

                let source = SourceSpec::GeoJson {
                    data: dataset,
                    cluster: None,
                };
                let result = session
                    .engine
                    .add_source(&base.dataset_key, source)
                    .and_then(|_| session.engine.add_layer(layer));
                match result {
                    Ok(()) => debug!("Base layer {} added", base.dataset_key),
                    Err(err) => error!("Failed to add base layer {}: {err}", base.dataset_key),
                }
            });
        }

        if let Some(overlay) = &self.settings.vector_overlay {
            if self.settings.is_mobile {
                debug!("Vector overlay {} skipped on mobile", overlay.layer_id);
            } else {
                let mut layer = LayerDescriptor::new(
                    overlay.layer_id.as_str(),
                    overlay.render_kind.into(),
                    overlay.source_id.as_str(),
                );
                layer.paint = overlay.paint.clone();

                let source = SourceSpec::Vector {
                    url: overlay.url.clone(),
                };
                let result = session
                    .engine
                    .add_source(&overlay.source_id, source)
                    .and_then(|_| session.engine.add_layer(layer));
                if let Err(err) = result {
                    error!("Failed to add vector overlay {}: {err}", overlay.layer_id);
                }
            }
        }

        for name in &self.settings.symbol_images {
            let result = self
                .settings
                .image_url(name)
                .and_then(|url| Ok(session.engine.add_image(name, &url)?));
            if let Err(err) = result {
                warn!("Failed to register image {name}: {err}");
            }
        }
    }

    /// Shows the logical layers. Materialized layers are made visible again; the others are
    /// loaded and attached in the background. The camera flies to the
    /// [`fly_to`](LayerConfig::fly_to) pose of each layer once it is shown.
    pub fn add_to_map_layer_list(&self, configs: &[LayerConfig]) -> Result<(), LayerdashError> {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let session = state.session.as_mut().ok_or(LayerdashError::EngineMissing)?;

        for config in configs {
            let identity = config.identity();
            if let Some(group) = state.registry.get_mut(&identity) {
                if let Err(err) = group.set_visible(session.engine.as_mut(), true) {
                    warn!("Failed to show layer {identity}: {err}");
                    continue;
                }

                state.registry.set_visible(&identity, true);
                if let Some(pose) = config.fly_to {
                    session.engine.fly_to(pose.into());
                }
                continue;
            }

            let Some(ticket) = state.registry.begin_load(&identity) else {
                debug!("Layer {identity} is already loading");
                continue;
            };

            debug!("Loading layer {identity}");
            let store = self.clone();
            let config = Arc::new(config.clone());
            let generation = session.generation;
            session.spawn(async move { store.load_layer(config, ticket, generation).await });
        }

        Ok(())
    }

    async fn load_layer(self, config: Arc<LayerConfig>, ticket: LoadTicket, generation: u64) {
        let identity = config.identity();
        let dataset = match self.loader.load(&config.dataset_key).await {
            Ok(dataset) => Arc::new(dataset),
            Err(err) => {
                error!("Failed to load layer {identity}: {err}");
                let mut state = self.inner.lock();
                if state.is_current_load(&identity, ticket, generation) {
                    state.registry.fail_load(&identity, err.to_string());
                }
                return;
            }
        };

        if config.render_kind == RenderKind::Arc {
            if !self.inner.lock().is_current_load(&identity, ticket, generation) {
                debug!("Discarding load of {identity}, the layer is no longer requested");
                return;
            }

            async_runtime::sleep(self.settings.arc_delay()).await;
        }

        let mut guard = self.inner.lock();
        if !guard.is_current_load(&identity, ticket, generation) {
            debug!("Discarding load of {identity}, the layer is no longer requested");
            return;
        }

        let state = &mut *guard;
        let Some(session) = state.session.as_mut() else {
            return;
        };

        let fly_to = config.fly_to;
        match materialize(
            session.engine.as_mut(),
            &self.settings.style_defaults,
            config,
            dataset,
        ) {
            Ok(group) => {
                info!("Layer {identity} is on the map");
                state.registry.complete_load(group);
                if let Some(pose) = fly_to {
                    session.engine.fly_to(pose.into());
                }
            }
            Err(err) => {
                error!("Failed to attach layer {identity}: {err}");
                state.registry.fail_load(&identity, err.to_string());
            }
        }
    }

    /// Hides the logical layers, clearing their filters, and closes the popup. Loads of the
    /// layers still in flight are discarded when they finish.
    pub fn turn_off_map_layer_visibility(
        &self,
        configs: &[LayerConfig],
    ) -> Result<(), LayerdashError> {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let session = state.session.as_mut().ok_or(LayerdashError::EngineMissing)?;
        let engine = session.engine.as_mut();

        for config in configs {
            let identity = config.identity();
            if state.registry.cancel_load(&identity) {
                debug!("Cancelled load of {identity}");
            }

            let Some(group) = state.registry.get_mut(&identity) else {
                continue;
            };

            if let Err(err) = group.set_filter(engine, None) {
                warn!("Failed to clear filter of {identity}: {err}");
            }
            if let Err(err) = group.set_visible(engine, false) {
                warn!("Failed to hide layer {identity}: {err}");
                continue;
            }

            state.registry.set_visible(&identity, false);
        }

        state.popup = None;
        engine.close_popup();

        Ok(())
    }

    /// Shows only the features of the logical layer whose `property` equals `value`.
    pub fn add_layer_filter(
        &self,
        identity: &LayerIdentity,
        property: &str,
        value: Value,
    ) -> Result<(), LayerdashError> {
        self.set_layer_filter(identity, Some(AttributeFilter::new(property, value)))
    }

    /// Shows all features of the logical layer again.
    pub fn clear_layer_filter(&self, identity: &LayerIdentity) -> Result<(), LayerdashError> {
        self.set_layer_filter(identity, None)
    }

    fn set_layer_filter(
        &self,
        identity: &LayerIdentity,
        filter: Option<AttributeFilter>,
    ) -> Result<(), LayerdashError> {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let session = state.session.as_mut().ok_or(LayerdashError::EngineMissing)?;

        let Some(group) = state.registry.get_mut(identity) else {
            let err = LayerdashError::UnknownLayer(identity.to_string());
            warn!("Filter ignored: {err}");
            return Ok(());
        };

        Ok(group.set_filter(session.engine.as_mut(), filter)?)
    }

    /// Removes every logical layer from the engine and forgets them, keeping the engine.
    pub fn clear_only_layers(&self) {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let groups = state.registry.take_groups();
        state.popup = None;

        let Some(session) = state.session.as_mut() else {
            return;
        };

        session.engine.close_popup();
        for group in &groups {
            if let Err(err) = group.remove(session.engine.as_mut()) {
                warn!("Failed to remove layer {}: {err}", group.identity);
            }
        }

        info!("Removed {} layers from the map", groups.len());
    }

    /// Forgets every logical layer and releases the engine. Timers and loads of the session are
    /// cancelled.
    pub fn clear_entire_map(&self) {
        let session = {
            let mut state = self.inner.lock();
            state.registry.take_groups();
            state.popup = None;
            state.session.take()
        };

        if session.is_some() {
            info!("Map released");
        }
    }

    /// Opens the popup for the features under the click.
    ///
    /// A cluster anywhere under the click zooms to the cluster and summarizes it, even below
    /// features of other layers. Otherwise an unclustered point on top shows its own attributes,
    /// and anything else opens a composite popup of up to three layers.
    pub fn handle_click(
        &self,
        point: ScreenPoint,
        lng_lat: LngLat,
    ) -> Result<ClickOutcome, LayerdashError> {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let session = state.session.as_mut().ok_or(LayerdashError::EngineMissing)?;
        let engine = session.engine.as_mut();

        let layers = state.registry.visible_member_ids();
        let hits = engine.query_rendered_features(point, &layers);
        let Some(top) = hits.first() else {
            return Ok(ClickOutcome::Nothing);
        };

        let cluster_hit = hits
            .iter()
            .find_map(|hit| match state.registry.member(&hit.layer_id) {
                Some((group, role)) if role.is_cluster() => Some((hit, group)),
                _ => None,
            });

        let content = match (cluster_hit, state.registry.member(&top.layer_id)) {
            (Some((hit, group)), _) => {
                let properties = hit.feature.properties.as_ref();
                let property = |key: &str| {
                    properties
                        .and_then(|p| p.get(key))
                        .and_then(Value::as_u64)
                };

                let center = feature_position(&hit.feature).unwrap_or(lng_lat);
                let zoom = property(CLUSTER_ID)
                    .map(|id| engine.cluster_expansion_zoom(&group.source_id, id));
                match zoom {
                    Some(Ok(zoom)) => engine.ease_to(CameraOptions {
                        center: Some(center),
                        zoom: Some(zoom),
                        ..Default::default()
                    }),
                    Some(Err(err)) => {
                        warn!("Failed to expand cluster of {}: {err}", group.identity)
                    }
                    None => warn!("Clicked cluster of {} has no id", group.identity),
                }

                let count = property(POINT_COUNT).unwrap_or(0).saturating_sub(1).max(1);
                PopupContent::ClusterSummary {
                    coordinate: lng_lat,
                    count,
                }
            }
            (None, Some((group, MemberRole::Unclustered))) => PopupContent::FeatureDetail {
                coordinate: feature_position(&top.feature)
                    .map_or(lng_lat, |position| position.wrapped_near(lng_lat)),
                title: group.config.title.clone(),
                rows: feature_rows(&top.feature, &group.config),
            },
            _ => match compose_popup(&hits, &state.registry, lng_lat) {
                Some(selection) => PopupContent::Composite(selection),
                None => return Ok(ClickOutcome::Nothing),
            },
        };

        engine.show_popup(content.coordinate(), &content);
        state.popup = Some(content.clone());

        Ok(ClickOutcome::Opened(content))
    }

    /// The open popup.
    pub fn popup(&self) -> Option<PopupContent> {
        self.inner.lock().popup.clone()
    }

    /// Shows the entry of the open composite popup. Returns false if there is no composite popup
    /// or no such entry.
    pub fn select_popup_entry(&self, index: usize) -> bool {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let Some(PopupContent::Composite(selection)) = &mut state.popup else {
            return false;
        };
        if !selection.select(index) {
            return false;
        }

        if let (Some(session), Some(content)) = (state.session.as_mut(), &state.popup) {
            session.engine.show_popup(content.coordinate(), content);
        }

        true
    }

    /// Closes the popup.
    pub fn remove_popup(&self) {
        let mut state = self.inner.lock();
        state.popup = None;
        if let Ok(engine) = state.engine_mut() {
            engine.close_popup();
        }
    }

    /// Saves the current camera under the label.
    pub fn add_saved_view(&self, label: impl Into<String>) -> Result<(), LayerdashError> {
        let mut state = self.inner.lock();
        let camera = state.engine_mut()?.camera();
        state.saved_views.push(SavedView::from_camera(camera, label));
        Ok(())
    }

    /// Removes the saved view at the index.
    pub fn remove_saved_view(&self, index: usize) -> Option<SavedView> {
        self.inner.lock().saved_views.remove(index)
    }

    /// Saved views in order.
    pub fn saved_views(&self) -> Vec<SavedView> {
        self.inner.lock().saved_views.as_slice().to_vec()
    }

    /// Animates the camera to the saved view. Returns false if there is no view at the index.
    pub fn ease_to_saved_view(&self, index: usize) -> Result<bool, LayerdashError> {
        let mut state = self.inner.lock();
        let Some(view) = state.saved_views.get(index).cloned() else {
            return Ok(false);
        };

        let mut options = CameraOptions::from(view.pose());
        options.duration = Some(Duration::from_millis(self.settings.saved_view_ease_ms));
        state.engine_mut()?.ease_to(options);

        Ok(true)
    }

    /// Makes the engine re-read its container size after a short delay.
    pub fn resize_map(&self) {
        let mut state = self.inner.lock();
        let Some(session) = state.session.as_mut() else {
            return;
        };

        let store = self.clone();
        let generation = session.generation;
        let delay = Duration::from_millis(self.settings.resize_delay_ms);
        session.spawn(async move {
            async_runtime::sleep(delay).await;
            if let Some(session) = store.inner.lock().session_mut(generation) {
                session.engine.resize();
            }
        });
    }

    /// Status of the logical layer.
    pub fn layer_status(&self, identity: &LayerIdentity) -> LayerStatus {
        self.inner.lock().registry.load_status(identity)
    }

    /// Logical layers being loaded.
    pub fn pending_layers(&self) -> Vec<LayerIdentity> {
        self.inner.lock().registry.pending()
    }

    /// Visible logical layers in the order they were shown.
    pub fn visible_layers(&self) -> Vec<LayerIdentity> {
        self.inner.lock().registry.visible().to_vec()
    }

    /// Returns true while the engine is drawing newly attached layers.
    pub fn is_rendering(&self) -> bool {
        self.inner.lock().registry.is_engine_busy()
    }

    /// Waits until every task of the current session has finished.
    pub async fn settle(&self) {
        loop {
            let tasks = match self.inner.lock().session.as_mut() {
                Some(session) => std::mem::take(&mut session.tasks),
                None => return,
            };
            if tasks.is_empty() {
                return;
            }

            for task in tasks {
                if let Err(err) = task.await {
                    if !err.is_cancelled() {
                        error!("Map task failed: {err}");
                    }
                }
            }
        }
    }
}

fn feature_position(feature: &geojson::Feature) -> Option<LngLat> {
    match &feature.geometry.as_ref()?.value {
        GeometryValue::Point(position) => LngLat::from_position(position),
        _ => None,
    }
}
