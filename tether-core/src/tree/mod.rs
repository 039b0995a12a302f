mod arena;
mod node;

pub use node::{ModalCapability, Node, NodeId};

use crate::error::TreeError;
use arena::NodeArena;

/// The component tree of one window
///
/// Structural edits are crate-private; callers mutate through `Window` so
/// every change is observed by the update manager.
pub struct Tree {
    arena: NodeArena,
    root: NodeId,
}

impl Tree {
    pub fn new(root: Node) -> Self {
        let mut arena = NodeArena::new();
        let root = arena.create(root);
        Self { arena, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.arena.get(id)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.arena.get(id).ok_or(TreeError::NodeNotFound(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, TreeError> {
        self.arena.get_mut(id).ok_or(TreeError::NodeNotFound(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.arena.contains(id)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.len() == 0
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena.get(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.arena.get(id).map(|node| node.children()).unwrap_or(&[])
    }

    /// Whether `ancestor` is `node` or one of its ancestors
    pub fn is_ancestor_of(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Whether the node is reachable from the root
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.contains(id) && self.is_ancestor_of(self.root, id)
    }

    /// Whether the node and every ancestor up to the root are visible
    pub fn is_render_visible(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let Some(node) = self.arena.get(node_id) else {
                return false;
            };
            if !node.is_visible() {
                return false;
            }
            if node_id == self.root {
                return true;
            }
            current = node.parent;
        }
        false
    }

    /// Descendants of `id` in preorder, excluding `id` itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// `id` followed by its descendants in preorder
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(1);
        if self.contains(id) {
            out.push(id);
            out.extend(self.descendants(id));
        }
        out
    }

    pub(crate) fn create(&mut self, node: Node) -> NodeId {
        let mut node = node;
        node.parent = None;
        node.children.clear();
        node.render_id = None;
        node.last_render_id = None;
        self.arena.create(node)
    }

    /// Attach `child` under `parent`, appending when `index` is `None`
    pub(crate) fn insert_child(
        &mut self,
        parent: NodeId,
        index: Option<usize>,
        child: NodeId,
    ) -> Result<(), TreeError> {
        if child == self.root {
            return Err(TreeError::RootNode("attached"));
        }
        let len = self.node(parent)?.children.len();
        if self.node(child)?.parent.is_some() {
            return Err(TreeError::AlreadyAttached(child));
        }
        if self.is_ancestor_of(child, parent) {
            return Err(TreeError::Cycle { parent, child });
        }
        let index = index.unwrap_or(len);
        if index > len {
            return Err(TreeError::IndexOutOfBounds { index, len });
        }

        self.node_mut(parent)?.children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Detach `child` from `parent`, returning the index it occupied
    pub(crate) fn detach(&mut self, parent: NodeId, child: NodeId) -> Result<usize, TreeError> {
        let position = self
            .node(parent)?
            .children
            .iter()
            .position(|id| *id == child)
            .ok_or(TreeError::NotAChild { parent, child })?;
        self.node_mut(parent)?.children.remove(position);
        self.node_mut(child)?.parent = None;
        Ok(position)
    }

    /// Free a detached node and its whole subtree
    pub(crate) fn dispose(&mut self, id: NodeId) -> Result<usize, TreeError> {
        if id == self.root {
            return Err(TreeError::RootNode("disposed"));
        }
        if self.node(id)?.parent.is_some() {
            return Err(TreeError::StillAttached(id));
        }
        let doomed = self.subtree(id);
        for node in &doomed {
            self.arena.dispose(*node);
        }
        Ok(doomed.len())
    }
}
