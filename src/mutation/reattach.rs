use std::collections::HashSet;

use crate::ancestry::{find_common_ancestor, find_node_mut};
use crate::ir::{GraphNode, ROOT_ID};

/// Owner an edge between `source` and `target` must live at: their deepest
/// common ancestor, or the root when none resolves.
pub fn edge_owner(root: &GraphNode, source: &str, target: &str) -> String {
    find_common_ancestor(root, source, target).unwrap_or_else(|| ROOT_ID.to_string())
}

struct Relocation {
    edge: String,
    from: String,
    to: String,
}

/// Re-evaluates the owner of every edge that touches one of `affected`.
///
/// `affected` must hold the whole moved subtree: a descendant's edge can change
/// owner even when its own parent link did not. Returns the number of edges that
/// were moved; a second call on the same tree always returns zero.
pub fn reattach_edges(root: &mut GraphNode, affected: &HashSet<String>) -> usize {
    let relocations = plan(root, |source, target| {
        affected.contains(source) || affected.contains(target)
    });
    apply(root, relocations)
}

/// Re-evaluates every edge in the tree.
pub fn reattach_all(root: &mut GraphNode) -> usize {
    let relocations = plan(root, |_, _| true);
    apply(root, relocations)
}

fn plan(tree: &GraphNode, touches: impl Fn(&str, &str) -> bool) -> Vec<Relocation> {
    let mut relocations = Vec::new();
    tree.walk(&mut |node| {
        for edge in &node.edges {
            if !touches(&edge.source, &edge.target) {
                continue;
            }
            let owner = edge_owner(tree, &edge.source, &edge.target);
            if owner != node.id {
                relocations.push(Relocation {
                    edge: edge.id.clone(),
                    from: node.id.clone(),
                    to: owner,
                });
            }
        }
    });
    relocations
}

fn apply(root: &mut GraphNode, relocations: Vec<Relocation>) -> usize {
    let mut moved = 0;
    for relocation in relocations {
        let Some(from) = find_node_mut(root, &relocation.from) else {
            continue;
        };
        let Some(pos) = from.edges.iter().position(|edge| edge.id == relocation.edge) else {
            continue;
        };
        let edge = from.edges.remove(pos);
        match find_node_mut(root, &relocation.to) {
            Some(owner) => {
                owner.edges.push(edge);
                moved += 1;
            }
            None => {
                // The planned owner came from this same tree, so it exists; put
                // the edge back rather than dropping it.
                if let Some(from) = find_node_mut(root, &relocation.from) {
                    from.edges.insert(pos, edge);
                }
            }
        }
    }
    if moved > 0 {
        tracing::debug!(moved, "reattached edges");
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Edge, GraphNode};

    fn tree_with_misplaced_edge() -> GraphNode {
        let mut g1 = GraphNode::group("g1", None);
        g1.children.push(GraphNode::leaf("a", None));
        g1.children.push(GraphNode::leaf("b", None));
        let mut root = GraphNode::group(ROOT_ID, None);
        root.children.push(g1);
        root.children.push(GraphNode::leaf("c", None));
        root.edges.push(Edge::new("ab", "a", "b"));
        root.edges.push(Edge::new("ac", "a", "c"));
        root
    }

    #[test]
    fn moves_edge_to_new_owner() {
        let mut root = tree_with_misplaced_edge();
        let affected: HashSet<String> = ["a".to_string()].into_iter().collect();
        assert_eq!(reattach_edges(&mut root, &affected), 1);
        assert_eq!(root.edges.len(), 1);
        assert_eq!(root.edges[0].id, "ac");
        assert_eq!(root.children[0].edges[0].id, "ab");
    }

    #[test]
    fn unaffected_edges_are_left_alone() {
        let mut root = tree_with_misplaced_edge();
        let affected: HashSet<String> = ["c".to_string()].into_iter().collect();
        assert_eq!(reattach_edges(&mut root, &affected), 0);
        assert_eq!(root.edges.len(), 2);
    }

    #[test]
    fn reattachment_is_idempotent() {
        let mut root = tree_with_misplaced_edge();
        assert_eq!(reattach_all(&mut root), 1);
        let snapshot = root.clone();
        assert_eq!(reattach_all(&mut root), 0);
        assert_eq!(root, snapshot);
    }

    #[test]
    fn owner_falls_back_to_root() {
        let root = tree_with_misplaced_edge();
        assert_eq!(edge_owner(&root, "a", "missing"), ROOT_ID);
        assert_eq!(edge_owner(&root, "a", "b"), "g1");
    }
}
