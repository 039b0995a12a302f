use super::record::{ComponentUpdate, PropertyUpdate, coalesce_property};
use crate::tree::{NodeId, Tree};
use indexmap::IndexMap;
use smartstring::alias::String as SmartString;
use tether_types::{Command, PropertyValue};
use tracing::{trace, warn};

/// Everything recorded for one window since the last purge
#[derive(Debug, Default)]
pub struct UpdateBatch {
    updates: IndexMap<NodeId, ComponentUpdate>,
    window_properties: IndexMap<SmartString, PropertyUpdate>,
    commands: Vec<Command>,
    full_refresh: bool,
}

impl UpdateBatch {
    /// Update records in the order their parents were first touched
    pub fn updates(&self) -> impl Iterator<Item = &ComponentUpdate> + '_ {
        self.updates.values()
    }

    pub fn update(&self, node: NodeId) -> Option<&ComponentUpdate> {
        self.updates.get(&node)
    }

    pub fn update_count(&self) -> usize {
        self.updates.len()
    }

    pub fn window_properties(&self) -> impl Iterator<Item = (&str, &PropertyUpdate)> + '_ {
        self.window_properties.iter().map(|(name, update)| (name.as_str(), update))
    }

    pub fn window_property(&self, name: &str) -> Option<&PropertyUpdate> {
        self.window_properties.get(name)
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// The whole tree must be rendered from scratch
    pub fn is_full_refresh(&self) -> bool {
        self.full_refresh
    }

    /// Whether any record removed `node`, directly or as a descendant
    pub fn removes(&self, node: NodeId) -> bool {
        self.updates.values().any(|update| update.is_removed(node))
    }

    /// Every node some record removed, directly or as a descendant
    pub fn removed_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.updates.values().flat_map(ComponentUpdate::removed_nodes)
    }

    /// Drop the tree diff, keeping only the out-of-band commands
    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    pub fn is_empty(&self) -> bool {
        !self.full_refresh
            && self.updates.is_empty()
            && self.window_properties.is_empty()
            && self.commands.is_empty()
    }
}

/// Records and coalesces tree mutations of one window
///
/// Every `record_*` call expects the tree in the state the caller sees at
/// that moment: adds are reported after attaching, removes before
/// detaching.
#[derive(Debug, Default)]
pub struct UpdateManager {
    batch: UpdateBatch,
}

impl UpdateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_full_refresh(&self) -> bool {
        self.batch.full_refresh
    }

    pub fn has_pending(&self) -> bool {
        !self.batch.is_empty()
    }

    /// Current batch; callers hold the borrow for as long as it must stay stable
    pub fn snapshot(&self) -> &UpdateBatch {
        &self.batch
    }

    /// Move the batch out, leaving the manager purged
    pub fn take(&mut self) -> UpdateBatch {
        std::mem::take(&mut self.batch)
    }

    pub fn purge(&mut self) {
        self.batch = UpdateBatch::default();
    }

    /// Switch to full-refresh mode for the rest of the transaction
    ///
    /// Fine-grained records are dropped; queued commands survive.
    pub fn request_full_refresh(&mut self) {
        if self.batch.full_refresh {
            return;
        }
        trace!("full refresh requested");
        self.batch.full_refresh = true;
        self.batch.updates.clear();
        self.batch.window_properties.clear();
    }

    pub fn enqueue_command(&mut self, command: Command) {
        self.batch.commands.push(command);
    }

    pub fn record_window_property(&mut self, name: &str, old: PropertyValue, new: PropertyValue) {
        if self.batch.full_refresh {
            return;
        }
        coalesce_property(&mut self.batch.window_properties, name, old, new);
    }

    pub fn record_property_change(
        &mut self,
        tree: &Tree,
        node: NodeId,
        name: &str,
        old: PropertyValue,
        new: PropertyValue,
    ) {
        if self.batch.full_refresh || !tree.is_render_visible(node) {
            return;
        }
        if self.is_being_added(tree, node) {
            return;
        }
        if !self.batch.updates.contains_key(&node) && old.eq_value(&new) {
            return;
        }
        let update = self.record_mut(node);
        update.update_property(name, old, new);
        if update.is_empty() {
            self.batch.updates.shift_remove(&node);
        }
    }

    /// Report `child` as added under `parent`; call after attaching
    pub fn record_child_add(&mut self, tree: &Tree, parent: NodeId, child: NodeId) {
        if self.batch.full_refresh || !tree.is_render_visible(child) {
            return;
        }
        if self.is_being_added(tree, parent) {
            return;
        }
        self.record_mut(parent).add_child(child);
    }

    /// Report `child` as removed from `parent`; call before detaching
    ///
    /// Records owned by the child's subtree are absorbed. A child added in
    /// the same transaction simply drops out of the added set.
    pub fn record_child_remove(&mut self, tree: &Tree, parent: NodeId, child: NodeId) {
        if self.batch.full_refresh || !tree.is_render_visible(child) {
            return;
        }

        let subtree = tree.subtree(child);
        let absorbed: Vec<ComponentUpdate> = subtree
            .iter()
            .filter_map(|node| self.batch.updates.shift_remove(node))
            .collect();

        if self.is_being_added(tree, parent) {
            return;
        }

        let update = self.record_mut(parent);
        if !update.cancel_add(child) {
            match tree.get(child).and_then(|node| node.render_id().cloned()) {
                Some(id) => update.remove_child(id, child),
                None => warn!(%child, "removed node has no render id"),
            }
            for descendant in subtree.iter().skip(1) {
                if let Some(id) = tree.get(*descendant).and_then(|node| node.render_id().cloned()) {
                    update.add_removed_descendant(id, *descendant);
                }
            }
        }
        for record in absorbed {
            update.absorb_removed(record);
        }

        if update.is_empty() {
            self.batch.updates.shift_remove(&parent);
        }
    }

    pub fn record_layout_data_update(&mut self, tree: &Tree, parent: NodeId, child: NodeId) {
        if self.batch.full_refresh || !tree.is_render_visible(child) {
            return;
        }
        if self.is_being_added(tree, child) {
            return;
        }
        self.record_mut(parent).update_layout_data(child);
        if self.batch.updates.get(&parent).is_some_and(ComponentUpdate::is_empty) {
            self.batch.updates.shift_remove(&parent);
        }
    }

    /// Whether `node` or one of its ancestors sits in some added set
    fn is_being_added(&self, tree: &Tree, node: NodeId) -> bool {
        let mut child = node;
        while let Some(parent) = tree.parent(child) {
            if self.batch.updates.get(&parent).is_some_and(|update| update.is_added(child)) {
                return true;
            }
            child = parent;
        }
        false
    }

    fn record_mut(&mut self, node: NodeId) -> &mut ComponentUpdate {
        self.batch
            .updates
            .entry(node)
            .or_insert_with(|| ComponentUpdate::new(node))
    }
}
