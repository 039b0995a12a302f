use crate::tree::{NodeId, Tree};
use crate::update::UpdateBatch;
use ahash::{AHashMap, AHashSet};
use std::any::Any;
use tracing::trace;

/// Per-node artifacts a renderer keeps between transactions
#[derive(Default)]
pub struct RenderStateCache {
    states: AHashMap<NodeId, Box<dyn Any + Send>>,
}

impl RenderStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Any>(&self, node: NodeId) -> Option<&T> {
        self.states.get(&node)?.downcast_ref::<T>()
    }

    pub fn get_mut<T: Any>(&mut self, node: NodeId) -> Option<&mut T> {
        self.states.get_mut(&node)?.downcast_mut::<T>()
    }

    pub fn set<T: Any + Send>(&mut self, node: NodeId, state: T) {
        self.states.insert(node, Box::new(state));
    }

    pub fn clear(&mut self, node: NodeId) -> bool {
        self.states.remove(&node).is_some()
    }

    pub fn clear_all(&mut self) {
        self.states.clear();
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.states.contains_key(&node)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Drop states the batch invalidates
    ///
    /// A full refresh clears everything. Otherwise a state goes when its
    /// node is gone, detached, hidden, or removed by the batch.
    pub fn purge(&mut self, tree: &Tree, batch: &UpdateBatch) {
        if batch.is_full_refresh() {
            self.clear_all();
            return;
        }
        let removed: AHashSet<NodeId> = batch.removed_nodes().collect();
        let before = self.states.len();
        self.states
            .retain(|node, _| tree.is_render_visible(*node) && !removed.contains(node));
        trace!(evicted = before - self.states.len(), "render states purged");
    }
}

impl std::fmt::Debug for RenderStateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderStateCache")
            .field("len", &self.states.len())
            .finish()
    }
}
