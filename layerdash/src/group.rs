//! Logical layers as groups of render layers.

use std::sync::Arc;

use geojson::{Feature, FeatureCollection};
use log::{debug, warn};

use crate::config::{LayerConfig, LayerIdentity};
use crate::engine::{EngineError, RenderEngine, Visibility};
use crate::filter::{AttributeFilter, Predicate};
use crate::materialize::arc_layer::arc_layer_descriptor;

/// Suffix of the count label layer of a clustered group.
pub const CLUSTER_COUNT_SUFFIX: &str = "cluster-count";
/// Suffix of the unclustered points layer of a clustered group.
pub const UNCLUSTERED_POINT_SUFFIX: &str = "unclustered-point";

/// Part a render layer plays in its group.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MemberRole {
    /// The only layer of a standard group.
    Primary,
    /// Cluster circles of a clustered group.
    ClusterBase,
    /// Point count labels of a clustered group.
    ClusterCount,
    /// Points outside of any cluster.
    Unclustered,
    /// Custom arc layer.
    ArcScene,
}

impl MemberRole {
    /// Returns true for layers drawing cluster features.
    pub fn is_cluster(&self) -> bool {
        matches!(self, MemberRole::ClusterBase | MemberRole::ClusterCount)
    }

    fn base_predicate(&self) -> Option<Predicate> {
        match self {
            MemberRole::ClusterBase | MemberRole::ClusterCount => Some(Predicate::is_cluster()),
            MemberRole::Unclustered => Some(Predicate::is_not_cluster()),
            MemberRole::Primary | MemberRole::ArcScene => None,
        }
    }

    fn accepts_attribute_filter(&self) -> bool {
        matches!(
            self,
            MemberRole::Primary | MemberRole::ClusterBase | MemberRole::Unclustered
        )
    }

    /// Filter of a member layer with the group's attribute filter applied.
    pub fn predicate(&self, filter: Option<&AttributeFilter>) -> Option<Predicate> {
        let attribute = filter
            .filter(|_| self.accepts_attribute_filter())
            .map(AttributeFilter::predicate);

        match (self.base_predicate(), attribute) {
            (Some(base), Some(attribute)) => Some(base.and(attribute)),
            (base, attribute) => base.or(attribute),
        }
    }
}

/// Render layer of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberLayer {
    /// Id of the render layer.
    pub id: String,
    /// Role in the group.
    pub role: MemberRole,
}

impl MemberLayer {
    /// Creates a member.
    pub fn new(id: impl Into<String>, role: MemberRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

/// Structural kind of a group.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupKind {
    /// One plain layer.
    Standard,
    /// Cluster base, count label and unclustered points.
    Clustered,
    /// Custom arc layer, rebuilt from the original dataset when filtered.
    Arc {
        /// The unfiltered dataset.
        dataset: Arc<FeatureCollection>,
    },
}

/// Materialized logical layer: the render layers implementing it, its visibility and filter.
///
/// Every operation acts on all members. When the engine rejects one of the changes the members
/// already changed are restored, so the group is never left half applied.
#[derive(Debug, Clone)]
pub struct LayerGroup {
    /// Identity of the logical layer.
    pub identity: LayerIdentity,
    /// Config the layer was created from.
    pub config: Arc<LayerConfig>,
    /// Id of the engine source shared by the members.
    pub source_id: String,
    /// Member layers in drawing order.
    pub members: Vec<MemberLayer>,
    /// Visibility of every member.
    pub visible: bool,
    /// Attribute filter in effect.
    pub filter: Option<AttributeFilter>,
    /// Structural kind.
    pub kind: GroupKind,
}

impl LayerGroup {
    /// Ids of the render layers of a clustered group: base, count label, unclustered points.
    pub fn cluster_member_ids(identity: &LayerIdentity) -> [String; 3] {
        [
            identity.to_string(),
            format!("{identity}-{CLUSTER_COUNT_SUFFIX}"),
            format!("{identity}-{UNCLUSTERED_POINT_SUFFIX}"),
        ]
    }

    /// Ids of the member layers.
    pub fn member_ids(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|member| member.id.as_str())
    }

    /// Role of the render layer in the group, if it is a member.
    pub fn role_of(&self, layer_id: &str) -> Option<MemberRole> {
        self.members
            .iter()
            .find(|member| member.id == layer_id)
            .map(|member| member.role)
    }

    /// Shows or hides every member.
    pub fn set_visible(
        &mut self,
        engine: &mut dyn RenderEngine,
        visible: bool,
    ) -> Result<(), EngineError> {
        if self.visible == visible {
            return Ok(());
        }

        let target = Visibility::from(visible);
        let previous = Visibility::from(self.visible);
        for (index, member) in self.members.iter().enumerate() {
            if let Err(err) = engine.set_visibility(&member.id, target) {
                warn!(
                    "Failed to change visibility of {}, restoring group {}: {err}",
                    member.id, self.identity
                );
                for applied in &self.members[..index] {
                    if let Err(err) = engine.set_visibility(&applied.id, previous) {
                        warn!("Failed to restore visibility of {}: {err}", applied.id);
                    }
                }

                return Err(err);
            }
        }

        self.visible = visible;
        Ok(())
    }

    /// Applies or clears the attribute filter.
    pub fn set_filter(
        &mut self,
        engine: &mut dyn RenderEngine,
        filter: Option<AttributeFilter>,
    ) -> Result<(), EngineError> {
        if self.filter == filter {
            return Ok(());
        }

        match &self.kind {
            GroupKind::Arc { dataset } => self.rebuild_arc(engine, dataset, filter.as_ref())?,
            GroupKind::Standard | GroupKind::Clustered => {
                self.apply_predicates(engine, filter.as_ref())?;
            }
        }

        debug!("Filter of {} set to {filter:?}", self.identity);
        self.filter = filter;
        Ok(())
    }

    fn apply_predicates(
        &self,
        engine: &mut dyn RenderEngine,
        filter: Option<&AttributeFilter>,
    ) -> Result<(), EngineError> {
        for (index, member) in self.members.iter().enumerate() {
            let predicate = member.role.predicate(filter);
            if let Err(err) = engine.set_filter(&member.id, predicate.as_ref()) {
                for applied in &self.members[..index] {
                    let previous = applied.role.predicate(self.filter.as_ref());
                    if let Err(err) = engine.set_filter(&applied.id, previous.as_ref()) {
                        warn!("Failed to restore filter of {}: {err}", applied.id);
                    }
                }

                return Err(err);
            }
        }

        Ok(())
    }

    fn rebuild_arc(
        &self,
        engine: &mut dyn RenderEngine,
        dataset: &FeatureCollection,
        filter: Option<&AttributeFilter>,
    ) -> Result<(), EngineError> {
        let visibility = Visibility::from(self.visible);
        let layer = arc_layer_descriptor(
            &self.config,
            &self.source_id,
            matching_features(dataset, filter),
            visibility,
        );
        engine.remove_layer(&layer.id)?;
        if let Err(err) = engine.add_layer(layer) {
            let previous = arc_layer_descriptor(
                &self.config,
                &self.source_id,
                matching_features(dataset, self.filter.as_ref()),
                visibility,
            );
            if let Err(err) = engine.add_layer(previous) {
                warn!("Failed to restore arc layer {}: {err}", self.identity);
            }

            return Err(err);
        }

        Ok(())
    }

    /// Removes every member and the source from the engine. Members the engine no longer has are
    /// skipped. Removal goes on past failures and the first error is reported.
    pub fn remove(&self, engine: &mut dyn RenderEngine) -> Result<(), EngineError> {
        let mut result = Ok(());
        for member in self.members.iter().rev() {
            if !engine.has_layer(&member.id) {
                debug!("Layer {} is already gone from the engine", member.id);
                continue;
            }

            if let Err(err) = engine.remove_layer(&member.id) {
                warn!("Failed to remove layer {}: {err}", member.id);
                result = result.and(Err(err));
            }
        }

        match engine.remove_source(&self.source_id) {
            Ok(()) | Err(EngineError::NoSuchSource(_)) => {}
            Err(err) => {
                warn!("Failed to remove source {}: {err}", self.source_id);
                result = result.and(Err(err));
            }
        }

        result
    }
}

fn matching_features<'a>(
    dataset: &'a FeatureCollection,
    filter: Option<&AttributeFilter>,
) -> impl Iterator<Item = &'a Feature> + 'a {
    let predicate = filter.map(AttributeFilter::predicate);
    dataset.features.iter().filter(move |feature| {
        predicate
            .as_ref()
            .map_or(true, |p| p.matches(feature.properties.as_ref()))
    })
}
