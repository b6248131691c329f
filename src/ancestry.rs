//! Pure traversal utilities over the node tree: lookup, paths, common
//! ancestors and the lowest common group (LCG).

use std::collections::HashSet;

use crate::ir::{GraphNode, ROOT_ID};

pub fn find_node<'a>(root: &'a GraphNode, id: &str) -> Option<&'a GraphNode> {
    if root.id == id {
        return Some(root);
    }
    root.children.iter().find_map(|child| find_node(child, id))
}

pub fn find_node_mut<'a>(root: &'a mut GraphNode, id: &str) -> Option<&'a mut GraphNode> {
    if root.id == id {
        return Some(root);
    }
    root.children
        .iter_mut()
        .find_map(|child| find_node_mut(child, id))
}

pub fn find_parent<'a>(root: &'a GraphNode, id: &str) -> Option<&'a GraphNode> {
    for child in &root.children {
        if child.id == id {
            return Some(root);
        }
        if let Some(parent) = find_parent(child, id) {
            return Some(parent);
        }
    }
    None
}

/// Root-to-node id sequence, both ends included.
pub fn path_to_node(root: &GraphNode, id: &str) -> Option<Vec<String>> {
    let mut path = Vec::new();
    if collect_path(root, id, &mut path) {
        Some(path)
    } else {
        None
    }
}

fn collect_path(node: &GraphNode, id: &str, path: &mut Vec<String>) -> bool {
    path.push(node.id.clone());
    if node.id == id {
        return true;
    }
    for child in &node.children {
        if collect_path(child, id, path) {
            return true;
        }
    }
    path.pop();
    false
}

fn common_prefix_len(paths: &[Vec<String>]) -> usize {
    let Some(first) = paths.first() else {
        return 0;
    };
    let mut len = first.len();
    for path in &paths[1..] {
        len = len.min(path.len());
        for idx in 0..len {
            if path[idx] != first[idx] {
                len = idx;
                break;
            }
        }
    }
    len
}

/// Deepest node on both root paths. When one id is an ancestor of the other
/// this is that ancestor itself.
pub fn find_common_ancestor(root: &GraphNode, a: &str, b: &str) -> Option<String> {
    let paths = [path_to_node(root, a)?, path_to_node(root, b)?];
    let len = common_prefix_len(&paths);
    if len == 0 {
        return None;
    }
    Some(paths[0][len - 1].clone())
}

/// Nearest container holding every id without being one of them.
///
/// A single id resolves to its parent. For several ids the deepest shared
/// ancestor is used, unless that ancestor is itself one of the inputs, in which
/// case its parent is returned. `None` when the input is empty, any id is
/// unknown, or no container qualifies (e.g. the root was selected).
pub fn find_lcg(root: &GraphNode, ids: &[&str]) -> Option<String> {
    let mut seen = HashSet::new();
    let unique: Vec<&str> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
    if unique.is_empty() {
        return None;
    }

    let mut paths = Vec::with_capacity(unique.len());
    for id in &unique {
        paths.push(path_to_node(root, id)?);
    }

    if unique.len() == 1 {
        let path = &paths[0];
        return if path.len() >= 2 {
            Some(path[path.len() - 2].clone())
        } else {
            None
        };
    }

    let len = common_prefix_len(&paths);
    if len == 0 {
        return None;
    }
    let candidate = &paths[0][len - 1];
    if seen.contains(candidate.as_str()) {
        if len >= 2 {
            Some(paths[0][len - 2].clone())
        } else {
            None
        }
    } else {
        Some(candidate.clone())
    }
}

/// True when `id` lies strictly below `ancestor`.
pub fn is_descendant(root: &GraphNode, ancestor: &str, id: &str) -> bool {
    if ancestor == id {
        return false;
    }
    find_node(root, ancestor)
        .map(|node| node.children.iter().any(|child| find_node(child, id).is_some()))
        .unwrap_or(false)
}

/// Ids of the node and all its descendants.
pub fn subtree_ids(root: &GraphNode, id: &str) -> HashSet<String> {
    let mut ids = HashSet::new();
    if let Some(node) = find_node(root, id) {
        node.walk(&mut |n| {
            ids.insert(n.id.clone());
        });
    }
    ids
}

/// Ids of every group in the tree, root included, in pre-order.
pub fn group_ids(root: &GraphNode) -> Vec<String> {
    let mut out = Vec::new();
    root.walk(&mut |node| {
        if node.is_group() {
            out.push(node.id.clone());
        }
    });
    out
}

/// Nearest group that contains `id`. Root for top-level nodes and for the root
/// itself.
pub fn enclosing_group(root: &GraphNode, id: &str) -> String {
    find_parent(root, id)
        .map(|parent| parent.id.clone())
        .unwrap_or_else(|| ROOT_ID.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::GraphNode;

    fn sample() -> GraphNode {
        // root
        // ├── g1
        // │   ├── a
        // │   └── g2
        // │       └── b
        // └── c
        let mut g2 = GraphNode::group("g2", None);
        g2.children.push(GraphNode::leaf("b", None));
        let mut g1 = GraphNode::group("g1", None);
        g1.children.push(GraphNode::leaf("a", None));
        g1.children.push(g2);
        let mut root = GraphNode::group(ROOT_ID, None);
        root.children.push(g1);
        root.children.push(GraphNode::leaf("c", None));
        root
    }

    #[test]
    fn path_includes_both_ends() {
        let root = sample();
        assert_eq!(
            path_to_node(&root, "b").unwrap(),
            vec!["root", "g1", "g2", "b"]
        );
        assert_eq!(path_to_node(&root, "root").unwrap(), vec!["root"]);
        assert!(path_to_node(&root, "zzz").is_none());
    }

    #[test]
    fn parent_lookup() {
        let root = sample();
        assert_eq!(find_parent(&root, "b").unwrap().id, "g2");
        assert_eq!(find_parent(&root, "c").unwrap().id, "root");
        assert!(find_parent(&root, "root").is_none());
    }

    #[test]
    fn common_ancestor_is_longest_prefix() {
        let root = sample();
        assert_eq!(find_common_ancestor(&root, "a", "b").as_deref(), Some("g1"));
        assert_eq!(find_common_ancestor(&root, "b", "c").as_deref(), Some("root"));
        assert_eq!(find_common_ancestor(&root, "g1", "b").as_deref(), Some("g1"));
        assert!(find_common_ancestor(&root, "a", "missing").is_none());
    }

    #[test]
    fn lcg_single_id_is_parent() {
        let root = sample();
        assert_eq!(find_lcg(&root, &["b"]).as_deref(), Some("g2"));
        assert_eq!(find_lcg(&root, &["c"]).as_deref(), Some("root"));
        assert_eq!(find_lcg(&root, &["b", "b"]).as_deref(), Some("g2"));
    }

    #[test]
    fn lcg_never_returns_a_member() {
        let root = sample();
        assert_eq!(find_lcg(&root, &["a", "b"]).as_deref(), Some("g1"));
        assert_eq!(find_lcg(&root, &["g1", "b"]).as_deref(), Some("root"));
        assert_eq!(find_lcg(&root, &["g2", "b"]).as_deref(), Some("g1"));
        assert!(find_lcg(&root, &["root"]).is_none());
        assert!(find_lcg(&root, &["root", "a"]).is_none());
    }

    #[test]
    fn lcg_rejects_unknown_or_empty() {
        let root = sample();
        assert!(find_lcg(&root, &[]).is_none());
        assert!(find_lcg(&root, &["a", "nope"]).is_none());
    }

    #[test]
    fn descendant_checks() {
        let root = sample();
        assert!(is_descendant(&root, "g1", "b"));
        assert!(!is_descendant(&root, "g1", "g1"));
        assert!(!is_descendant(&root, "g2", "a"));
        assert_eq!(subtree_ids(&root, "g1").len(), 4);
        assert_eq!(group_ids(&root), vec!["root", "g1", "g2"]);
        assert_eq!(enclosing_group(&root, "a"), "g1");
    }
}
