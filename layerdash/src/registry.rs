//! Bookkeeping of materialized, visible and loading logical layers.

use std::collections::HashMap;

use log::debug;

use crate::config::LayerIdentity;
use crate::group::{LayerGroup, MemberRole};

/// Token of one load attempt of an identity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadTicket(u64);

/// State of an identity that is not materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// The dataset is being loaded or the layer is waiting to be attached.
    Pending(LoadTicket),
    /// The last attempt failed.
    Failed(String),
}

/// Status of a logical layer as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerStatus {
    /// Never requested in this session.
    Absent,
    /// Requested, not yet on the map.
    Loading,
    /// Requested, but could not be loaded.
    Failed(String),
    /// On the map and shown.
    Visible,
    /// On the map and hidden.
    Hidden,
}

/// Registry of logical layers of one engine session.
#[derive(Debug, Default)]
pub struct Registry {
    groups: Vec<LayerGroup>,
    visible: Vec<LayerIdentity>,
    loads: HashMap<LayerIdentity, LoadState, ahash::RandomState>,
    next_ticket: u64,
    engine_busy: bool,
}

impl Registry {
    /// Returns true if the identity is materialized.
    pub fn has(&self, identity: &LayerIdentity) -> bool {
        self.get(identity).is_some()
    }

    /// Group of the identity.
    pub fn get(&self, identity: &LayerIdentity) -> Option<&LayerGroup> {
        self.groups.iter().find(|group| &group.identity == identity)
    }

    /// Mutable group of the identity.
    pub fn get_mut(&mut self, identity: &LayerIdentity) -> Option<&mut LayerGroup> {
        self.groups
            .iter_mut()
            .find(|group| &group.identity == identity)
    }

    /// Groups in materialization order.
    pub fn groups(&self) -> &[LayerGroup] {
        &self.groups
    }

    /// Visible identities in the order they were shown.
    pub fn visible(&self) -> &[LayerIdentity] {
        &self.visible
    }

    /// Registers a new group. Returns false and drops `group` if the identity is already
    /// registered.
    pub fn register(&mut self, group: LayerGroup) -> bool {
        if self.has(&group.identity) {
            debug!("Layer {} is already registered", group.identity);
            return false;
        }

        let identity = group.identity.clone();
        let visible = group.visible;
        self.groups.push(group);
        self.set_visible(&identity, visible);

        true
    }

    /// Records the visibility of the identity. Unknown identities are ignored.
    pub fn set_visible(&mut self, identity: &LayerIdentity, visible: bool) {
        if !self.has(identity) {
            return;
        }

        let position = self.visible.iter().position(|id| id == identity);
        match (visible, position) {
            (true, None) => self.visible.push(identity.clone()),
            (false, Some(index)) => {
                self.visible.remove(index);
            }
            _ => {}
        }
    }

    /// Starts loading the identity. Returns `None` if it is already materialized or loading.
    pub fn begin_load(&mut self, identity: &LayerIdentity) -> Option<LoadTicket> {
        if self.has(identity) || matches!(self.loads.get(identity), Some(LoadState::Pending(_))) {
            return None;
        }

        let ticket = LoadTicket(self.next_ticket);
        self.next_ticket += 1;
        self.loads
            .insert(identity.clone(), LoadState::Pending(ticket));

        Some(ticket)
    }

    /// Returns true if the ticket is the current load attempt of the identity.
    pub fn is_current_load(&self, identity: &LayerIdentity, ticket: LoadTicket) -> bool {
        self.loads.get(identity) == Some(&LoadState::Pending(ticket))
    }

    /// Registers the group created by a finished load. The pending marker is cleared and the
    /// engine is marked busy until it reports idle.
    pub fn complete_load(&mut self, group: LayerGroup) -> bool {
        self.loads.remove(&group.identity);
        self.engine_busy = true;
        self.register(group)
    }

    /// Marks the load of the identity as failed.
    pub fn fail_load(&mut self, identity: &LayerIdentity, reason: impl Into<String>) {
        self.loads
            .insert(identity.clone(), LoadState::Failed(reason.into()));
    }

    /// Forgets any load state of the identity, so a late completion is discarded.
    pub fn cancel_load(&mut self, identity: &LayerIdentity) -> bool {
        self.loads.remove(identity).is_some()
    }

    /// Ids of the member layers of visible groups.
    pub fn visible_member_ids(&self) -> Vec<String> {
        self.visible
            .iter()
            .filter_map(|identity| self.get(identity))
            .flat_map(|group| group.member_ids().map(str::to_string))
            .collect()
    }

    /// Group and role of the render layer.
    pub fn member(&self, layer_id: &str) -> Option<(&LayerGroup, MemberRole)> {
        self.groups
            .iter()
            .find_map(|group| group.role_of(layer_id).map(|role| (group, role)))
    }

    /// Status of the identity.
    pub fn load_status(&self, identity: &LayerIdentity) -> LayerStatus {
        if let Some(group) = self.get(identity) {
            return if group.visible {
                LayerStatus::Visible
            } else {
                LayerStatus::Hidden
            };
        }

        match self.loads.get(identity) {
            Some(LoadState::Pending(_)) => LayerStatus::Loading,
            Some(LoadState::Failed(reason)) => LayerStatus::Failed(reason.clone()),
            None => LayerStatus::Absent,
        }
    }

    /// Identities being loaded, sorted.
    pub fn pending(&self) -> Vec<LayerIdentity> {
        let mut pending: Vec<_> = self
            .loads
            .iter()
            .filter(|(_, state)| matches!(state, LoadState::Pending(_)))
            .map(|(identity, _)| identity.clone())
            .collect();
        pending.sort();
        pending
    }

    /// Returns true while the engine is drawing newly attached layers.
    pub fn is_engine_busy(&self) -> bool {
        self.engine_busy
    }

    /// Records that the engine finished drawing.
    pub fn set_engine_idle(&mut self) {
        self.engine_busy = false;
    }

    /// Empties the registry and returns the groups in materialization order. Load tickets keep
    /// counting, so completions of loads started before remain stale.
    pub fn take_groups(&mut self) -> Vec<LayerGroup> {
        self.visible.clear();
        self.loads.clear();
        self.engine_busy = false;
        std::mem::take(&mut self.groups)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::RenderKind;
    use crate::group::{GroupKind, MemberLayer};
    use crate::tests::config;

    fn group(key: &str) -> LayerGroup {
        let config = config(key, RenderKind::Fill);
        let identity = config.identity();
        LayerGroup {
            source_id: identity.source_id(),
            members: vec![MemberLayer::new(identity.as_str(), MemberRole::Primary)],
            identity,
            config: Arc::new(config),
            visible: true,
            filter: None,
            kind: GroupKind::Standard,
        }
    }

    #[test]
    fn register_is_idempotent() {
        let mut registry = Registry::default();
        assert!(registry.register(group("town")));
        assert!(!registry.register(group("town")));
        assert_eq!(registry.groups().len(), 1);
        assert_eq!(registry.visible().len(), 1);
    }

    #[test]
    fn set_visible_ignores_unknown_identities() {
        let mut registry = Registry::default();
        registry.set_visible(&"unknown-fill".into(), true);
        assert!(registry.visible().is_empty());
    }

    #[test]
    fn load_lifecycle() {
        let mut registry = Registry::default();
        let identity = LayerIdentity::from("town-fill");
        assert_eq!(registry.load_status(&identity), LayerStatus::Absent);

        let ticket = registry.begin_load(&identity).unwrap();
        assert_eq!(registry.begin_load(&identity), None);
        assert_eq!(registry.load_status(&identity), LayerStatus::Loading);
        assert_eq!(registry.pending(), vec![identity.clone()]);

        assert!(registry.complete_load(group("town")));
        assert!(registry.is_engine_busy());
        assert!(!registry.is_current_load(&identity, ticket));
        assert!(registry.pending().is_empty());
        assert_eq!(registry.load_status(&identity), LayerStatus::Visible);
        assert_eq!(registry.begin_load(&identity), None);

        registry.set_engine_idle();
        assert!(!registry.is_engine_busy());
    }

    #[test]
    fn failed_load_can_be_retried() {
        let mut registry = Registry::default();
        let identity = LayerIdentity::from("town-fill");
        let first = registry.begin_load(&identity).unwrap();
        registry.fail_load(&identity, "404");
        assert_eq!(
            registry.load_status(&identity),
            LayerStatus::Failed("404".to_string())
        );
        assert!(registry.pending().is_empty());

        let second = registry.begin_load(&identity).unwrap();
        assert_ne!(first, second);
        assert!(!registry.is_current_load(&identity, first));
        assert!(registry.is_current_load(&identity, second));
    }

    #[test]
    fn tickets_survive_reset() {
        let mut registry = Registry::default();
        let identity = LayerIdentity::from("town-fill");
        let before = registry.begin_load(&identity).unwrap();
        registry.register(group("village"));

        let groups = registry.take_groups();
        assert_eq!(groups.len(), 1);
        assert!(registry.visible().is_empty());

        let after = registry.begin_load(&identity).unwrap();
        assert!(after > before);
        assert!(!registry.is_current_load(&identity, before));
    }

    #[test]
    fn visible_member_ids_follow_visibility() {
        let mut registry = Registry::default();
        registry.register(group("town"));
        registry.register(group("village"));
        registry.set_visible(&"town-fill".into(), false);

        assert_eq!(registry.visible_member_ids(), vec!["village-fill".to_string()]);
        let (group, role) = registry.member("town-fill").unwrap();
        assert_eq!(group.identity.as_str(), "town-fill");
        assert_eq!(role, MemberRole::Primary);
    }
}
