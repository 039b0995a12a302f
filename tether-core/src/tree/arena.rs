use super::node::{Node, NodeId};

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Slot storage for nodes with generation-checked handles
pub(crate) struct NodeArena {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    len: usize,
}

impl NodeArena {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }

    pub fn create(&mut self, node: Node) -> NodeId {
        self.len += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId { index, generation: 0 }
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Free the slot; stale handles stop resolving
    pub fn dispose(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);
        self.len -= 1;
        Some(node)
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get() {
        let mut arena = NodeArena::new();
        let a = arena.create(Node::new("A"));
        let b = arena.create(Node::new("B"));
        assert_eq!(arena.get(a).map(Node::kind), Some("A"));
        assert_eq!(arena.get(b).map(Node::kind), Some("B"));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut arena = NodeArena::new();
        let a = arena.create(Node::new("A"));
        assert!(arena.dispose(a).is_some());
        assert!(!arena.contains(a));

        let b = arena.create(Node::new("B"));
        assert_eq!(b.index, a.index);
        assert_ne!(b.generation, a.generation);
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(b).map(Node::kind), Some("B"));
    }

    #[test]
    fn test_double_dispose() {
        let mut arena = NodeArena::new();
        let a = arena.create(Node::new("A"));
        assert!(arena.dispose(a).is_some());
        assert!(arena.dispose(a).is_none());
        assert_eq!(arena.len(), 0);
    }
}
