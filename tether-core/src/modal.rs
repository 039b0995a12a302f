//! Resolution of the effective modal root of a window
//!
//! Claimants are tracked by the window as nodes are registered. Resolution
//! is lazy: it runs only when somebody asks for the modal root.

use crate::tree::{NodeId, Tree};

/// Find the node that currently gates input, if any
///
/// With several visible claimants the tree is walked depth first, children
/// last to first and before their parent, so the deepest claimant among the
/// most recently added siblings wins.
pub fn resolve_modal_root(tree: &Tree, claimants: &[NodeId]) -> Option<NodeId> {
    let visible: Vec<NodeId> = claimants
        .iter()
        .copied()
        .filter(|node| is_claiming(tree, *node))
        .collect();

    match visible.as_slice() {
        [] => None,
        [only] => Some(*only),
        _ => {
            let mut stack = vec![(tree.root(), false)];
            while let Some((node, expanded)) = stack.pop() {
                if expanded {
                    if visible.contains(&node) {
                        return Some(node);
                    }
                    continue;
                }
                stack.push((node, true));
                // pushed in order so the last child is popped first
                stack.extend(tree.children(node).iter().map(|child| (*child, false)));
            }
            None
        }
    }
}

/// Whether input addressed to `node` is allowed under `modal_root`
pub fn verify_modal_context(tree: &Tree, modal_root: Option<NodeId>, node: NodeId) -> bool {
    match modal_root {
        None => true,
        Some(root) => tree.is_ancestor_of(root, node),
    }
}

fn is_claiming(tree: &Tree, node: NodeId) -> bool {
    tree.get(node)
        .and_then(|n| n.as_modal())
        .is_some_and(|capability| capability.modal)
        && tree.is_render_visible(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Node;

    fn attach(tree: &mut Tree, parent: NodeId, node: Node) -> NodeId {
        let id = tree.create(node);
        tree.insert_child(parent, None, id).unwrap();
        id
    }

    #[test]
    fn test_no_claimants() {
        let tree = Tree::new(Node::new("Window"));
        assert_eq!(resolve_modal_root(&tree, &[]), None);
    }

    #[test]
    fn test_single_hidden_claimant() {
        let mut tree = Tree::new(Node::new("Window"));
        let root = tree.root();
        let pane = attach(&mut tree, root, Node::new("Pane").hidden());
        let dialog = attach(&mut tree, pane, Node::new("Dialog").modal());
        assert_eq!(resolve_modal_root(&tree, &[dialog]), None);
    }

    #[test]
    fn test_later_sibling_wins() {
        let mut tree = Tree::new(Node::new("Window"));
        let root = tree.root();
        let a = attach(&mut tree, root, Node::new("A").modal());
        let c = attach(&mut tree, root, Node::new("C").modal());
        assert_eq!(resolve_modal_root(&tree, &[a, c]), Some(c));
        assert_eq!(resolve_modal_root(&tree, &[c, a]), Some(c));
    }

    #[test]
    fn test_nested_claimant_outranks_container() {
        let mut tree = Tree::new(Node::new("Window"));
        let root = tree.root();
        let a = attach(&mut tree, root, Node::new("A").modal());
        let b = attach(&mut tree, a, Node::new("B").modal());
        attach(&mut tree, a, Node::new("Label"));
        assert_eq!(resolve_modal_root(&tree, &[a, b]), Some(b));
    }

    #[test]
    fn test_capable_but_not_claiming() {
        let mut tree = Tree::new(Node::new("Window"));
        let root = tree.root();
        let a = attach(&mut tree, root, Node::new("A").modal_capable());
        assert_eq!(resolve_modal_root(&tree, &[a]), None);
    }

    #[test]
    fn test_verify_modal_context() {
        let mut tree = Tree::new(Node::new("Window"));
        let root = tree.root();
        let dialog = attach(&mut tree, root, Node::new("Dialog").modal());
        let button = attach(&mut tree, dialog, Node::new("Button"));
        let outside = attach(&mut tree, root, Node::new("Button"));

        assert!(verify_modal_context(&tree, None, outside));
        assert!(verify_modal_context(&tree, Some(dialog), dialog));
        assert!(verify_modal_context(&tree, Some(dialog), button));
        assert!(!verify_modal_context(&tree, Some(dialog), outside));
        assert!(!verify_modal_context(&tree, Some(dialog), root));
    }
}
