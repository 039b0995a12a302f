use crate::tree::NodeId;
use indexmap::{IndexMap, IndexSet};
use smartstring::alias::String as SmartString;
use tether_types::{PropertyValue, RenderId};

/// A single coalesced property change
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyUpdate {
    pub old: PropertyValue,
    pub new: PropertyValue,
}

/// Fold a change into a property map
///
/// The first old value seen in a transaction is kept. A change that lands
/// back on that value drops the entry.
pub(crate) fn coalesce_property(
    map: &mut IndexMap<SmartString, PropertyUpdate>,
    name: &str,
    old: PropertyValue,
    new: PropertyValue,
) {
    if let Some(pending) = map.get_mut(name) {
        if pending.old.eq_value(&new) {
            map.shift_remove(name);
        } else {
            pending.new = new;
        }
        return;
    }
    if !old.eq_value(&new) {
        map.insert(name.into(), PropertyUpdate { old, new });
    }
}

/// Accumulated changes of one parent node within a transaction
#[derive(Debug, Clone)]
pub struct ComponentUpdate {
    node: NodeId,
    added: IndexSet<NodeId>,
    removed_children: IndexMap<RenderId, NodeId>,
    removed_descendants: IndexMap<RenderId, NodeId>,
    properties: IndexMap<SmartString, PropertyUpdate>,
    layout_data: IndexSet<NodeId>,
}

impl ComponentUpdate {
    pub(crate) fn new(node: NodeId) -> Self {
        Self {
            node,
            added: IndexSet::new(),
            removed_children: IndexMap::new(),
            removed_descendants: IndexMap::new(),
            properties: IndexMap::new(),
            layout_data: IndexSet::new(),
        }
    }

    /// The parent node this record describes
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn added_children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.added.iter().copied()
    }

    pub fn has_added_children(&self) -> bool {
        !self.added.is_empty()
    }

    pub fn is_added(&self, child: NodeId) -> bool {
        self.added.contains(&child)
    }

    pub fn removed_children(&self) -> impl Iterator<Item = (&RenderId, NodeId)> + '_ {
        self.removed_children.iter().map(|(id, node)| (id, *node))
    }

    pub fn has_removed_children(&self) -> bool {
        !self.removed_children.is_empty()
    }

    pub fn removed_descendants(&self) -> impl Iterator<Item = (&RenderId, NodeId)> + '_ {
        self.removed_descendants.iter().map(|(id, node)| (id, *node))
    }

    pub fn removed_descendant_count(&self) -> usize {
        self.removed_descendants.len()
    }

    /// Whether the render-id was removed either directly or as a descendant
    pub fn has_removed_descendant(&self, id: &RenderId) -> bool {
        self.removed_children.contains_key(id) || self.removed_descendants.contains_key(id)
    }

    /// Nodes removed directly, then those removed as descendants
    pub fn removed_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.removed_children
            .values()
            .chain(self.removed_descendants.values())
            .copied()
    }

    /// Whether the node was removed either directly or as a descendant
    pub fn is_removed(&self, node: NodeId) -> bool {
        self.removed_nodes().any(|n| n == node)
    }

    pub fn property(&self, name: &str) -> Option<&PropertyUpdate> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &PropertyUpdate)> + '_ {
        self.properties.iter().map(|(name, update)| (name.as_str(), update))
    }

    pub fn has_property_updates(&self) -> bool {
        !self.properties.is_empty()
    }

    pub fn layout_data_updates(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.layout_data.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed_children.is_empty()
            && self.removed_descendants.is_empty()
            && self.properties.is_empty()
            && self.layout_data.is_empty()
    }

    pub(crate) fn add_child(&mut self, child: NodeId) {
        self.added.insert(child);
    }

    /// Drop a pending add, returning whether there was one
    pub(crate) fn cancel_add(&mut self, child: NodeId) -> bool {
        self.added.shift_remove(&child)
    }

    pub(crate) fn remove_child(&mut self, id: RenderId, child: NodeId) {
        self.layout_data.shift_remove(&child);
        self.removed_children.insert(id, child);
    }

    pub(crate) fn add_removed_descendant(&mut self, id: RenderId, node: NodeId) {
        self.removed_descendants.insert(id, node);
    }

    /// Fold everything `other` removed into this record's removed descendants
    pub(crate) fn absorb_removed(&mut self, other: ComponentUpdate) {
        for (id, node) in other.removed_children.into_iter().chain(other.removed_descendants) {
            if !self.removed_children.contains_key(&id) {
                self.removed_descendants.insert(id, node);
            }
        }
    }

    pub(crate) fn update_property(&mut self, name: &str, old: PropertyValue, new: PropertyValue) {
        coalesce_property(&mut self.properties, name, old, new);
    }

    /// Mark a child's layout data as changed unless it is added or removed
    pub(crate) fn update_layout_data(&mut self, child: NodeId) {
        if self.is_added(child) || self.is_removed(child) {
            return;
        }
        self.layout_data.insert(child);
    }
}
