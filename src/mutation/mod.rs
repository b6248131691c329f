//! Copy-on-write structural mutations. Every function borrows the current
//! graph and returns a new one; on error the input is untouched and nothing
//! partial escapes.

mod batch;
mod reattach;

pub use batch::*;
pub use reattach::{edge_owner, reattach_all, reattach_edges};

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::ancestry::{find_node, find_node_mut, find_parent, is_descendant};
use crate::error::{Conflict, EditError, EditResult, EntityKind};
use crate::ir::{DomainGraph, Edge, GraphNode, NodeData, ROOT_ID};

static NON_ID_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9_-]+").expect("id pattern is valid"));

/// Canonical node id for a display name: lower-case, runs of characters outside
/// `[a-z0-9_-]` collapsed to `_`, no leading or trailing `_`.
pub fn normalize_id(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    NON_ID_CHARS
        .replace_all(&lower, "_")
        .trim_matches('_')
        .to_string()
}

pub fn add_node(
    graph: &DomainGraph,
    name: &str,
    parent_id: &str,
    data: Option<NodeData>,
) -> EditResult<DomainGraph> {
    let id = normalize_id(name);
    if id.is_empty() {
        return Err(Conflict::InvalidId(name.to_string()).into());
    }
    if graph.contains_node(&id) {
        return Err(Conflict::DuplicateNode(id).into());
    }
    if find_node(&graph.root, parent_id).is_none() {
        return Err(EditError::not_found(EntityKind::Parent, parent_id));
    }

    let mut next = graph.clone();
    let mut node = GraphNode::leaf(&id, Some(name.trim().to_string()));
    node.data = data.unwrap_or_default();
    let parent = find_node_mut(&mut next.root, parent_id)
        .ok_or_else(|| EditError::not_found(EntityKind::Parent, parent_id))?;
    parent.children.push(node);
    tracing::debug!(%id, parent = parent_id, "added node");
    Ok(next)
}

pub fn delete_node(graph: &DomainGraph, node_id: &str) -> EditResult<DomainGraph> {
    if node_id == ROOT_ID {
        return Err(Conflict::RootImmutable.into());
    }
    let mut next = graph.clone();
    let removed = detach_node(&mut next.root, node_id)
        .ok_or_else(|| EditError::not_found(EntityKind::Node, node_id))?;

    let mut gone = HashSet::new();
    removed.walk(&mut |node| {
        gone.insert(node.id.clone());
    });
    let purged = remove_edges_where(&mut next.root, |edge| {
        gone.contains(&edge.source) || gone.contains(&edge.target)
    });
    tracing::debug!(node = node_id, nodes = gone.len(), purged, "deleted node");
    Ok(next)
}

pub fn move_node(graph: &DomainGraph, node_id: &str, new_parent_id: &str) -> EditResult<DomainGraph> {
    if node_id == ROOT_ID {
        return Err(Conflict::RootImmutable.into());
    }
    let Some(current_parent) = find_parent(&graph.root, node_id) else {
        return Err(EditError::not_found(EntityKind::Node, node_id));
    };
    if find_node(&graph.root, new_parent_id).is_none() {
        return Err(EditError::not_found(EntityKind::Parent, new_parent_id));
    }
    if node_id == new_parent_id || is_descendant(&graph.root, node_id, new_parent_id) {
        return Err(Conflict::Cycle {
            node: node_id.to_string(),
            target: new_parent_id.to_string(),
        }
        .into());
    }
    if current_parent.id == new_parent_id {
        return Ok(graph.clone());
    }

    let mut next = graph.clone();
    let node = detach_node(&mut next.root, node_id)
        .ok_or_else(|| EditError::not_found(EntityKind::Node, node_id))?;
    let mut affected = HashSet::new();
    node.walk(&mut |n| {
        affected.insert(n.id.clone());
    });
    find_node_mut(&mut next.root, new_parent_id)
        .ok_or_else(|| EditError::not_found(EntityKind::Parent, new_parent_id))?
        .children
        .push(node);
    reattach_edges(&mut next.root, &affected);
    tracing::debug!(node = node_id, parent = new_parent_id, "moved node");
    Ok(next)
}

pub fn add_edge(graph: &DomainGraph, edge: Edge) -> EditResult<DomainGraph> {
    if edge.id.trim().is_empty() {
        return Err(Conflict::InvalidId(edge.id).into());
    }
    if graph.contains_edge(&edge.id) {
        return Err(Conflict::DuplicateEdge(edge.id).into());
    }
    if edge.source == edge.target {
        return Err(Conflict::SelfLoop {
            edge: edge.id,
            node: edge.source,
        }
        .into());
    }
    for endpoint in [&edge.source, &edge.target] {
        if !graph.contains_node(endpoint) {
            return Err(EditError::not_found(EntityKind::Node, endpoint));
        }
    }

    let mut next = graph.clone();
    let owner = edge_owner(&next.root, &edge.source, &edge.target);
    tracing::debug!(edge = %edge.id, %owner, "added edge");
    find_node_mut(&mut next.root, &owner)
        .ok_or_else(|| EditError::not_found(EntityKind::Node, &owner))?
        .edges
        .push(edge);
    Ok(next)
}

pub fn delete_edge(graph: &DomainGraph, edge_id: &str) -> EditResult<DomainGraph> {
    let mut next = graph.clone();
    let removed = remove_edges_where(&mut next.root, |edge| edge.id == edge_id);
    if removed == 0 {
        return Err(EditError::not_found(EntityKind::Edge, edge_id));
    }
    Ok(next)
}

/// Wraps the listed nodes in a new group under `parent_id`.
///
/// Unknown ids are skipped, as are ids whose ancestor is also listed (they
/// travel with it). Fails only when nothing would end up in the group.
pub fn group_nodes(
    graph: &DomainGraph,
    node_ids: &[String],
    parent_id: &str,
    group_id: &str,
    style: Option<String>,
) -> EditResult<DomainGraph> {
    if group_id.trim().is_empty() {
        return Err(Conflict::InvalidId(group_id.to_string()).into());
    }
    if graph.contains_node(group_id) {
        return Err(Conflict::DuplicateNode(group_id.to_string()).into());
    }
    if find_node(&graph.root, parent_id).is_none() {
        return Err(EditError::not_found(EntityKind::Parent, parent_id));
    }

    let mut seen = HashSet::new();
    let mut present: Vec<&str> = Vec::new();
    for id in node_ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        if id == ROOT_ID {
            return Err(Conflict::RootImmutable.into());
        }
        if id == parent_id || is_descendant(&graph.root, id, parent_id) {
            return Err(Conflict::Cycle {
                node: id.clone(),
                target: parent_id.to_string(),
            }
            .into());
        }
        if graph.contains_node(id) {
            present.push(id.as_str());
        }
    }

    let movable: Vec<&str> = present
        .iter()
        .copied()
        .filter(|id| {
            !present
                .iter()
                .any(|other| other != id && is_descendant(&graph.root, other, id))
        })
        .collect();
    if movable.is_empty() {
        return Err(Conflict::NothingToGroup(group_id.to_string()).into());
    }

    let mut next = graph.clone();
    let mut group = GraphNode::group(group_id, Some(group_id.to_string()));
    group.data = NodeData::with_style(style);
    let mut affected = HashSet::new();
    affected.insert(group_id.to_string());
    for id in &movable {
        let node = detach_node(&mut next.root, id)
            .ok_or_else(|| EditError::not_found(EntityKind::Node, id))?;
        node.walk(&mut |n| {
            affected.insert(n.id.clone());
        });
        group.children.push(node);
    }
    find_node_mut(&mut next.root, parent_id)
        .ok_or_else(|| EditError::not_found(EntityKind::Parent, parent_id))?
        .children
        .push(group);
    reattach_edges(&mut next.root, &affected);
    tracing::debug!(group = group_id, parent = parent_id, moved = movable.len(), "grouped nodes");
    Ok(next)
}

/// Dissolves a group: children are hoisted to its parent (with the same edge
/// reattachment as [`move_node`]), its remaining edges move up, and any edge
/// that referenced the group itself is purged.
pub fn remove_group(graph: &DomainGraph, group_id: &str) -> EditResult<DomainGraph> {
    if group_id == ROOT_ID {
        return Err(Conflict::RootImmutable.into());
    }
    let Some(group) = find_node(&graph.root, group_id) else {
        return Err(EditError::not_found(EntityKind::Group, group_id));
    };
    if !group.is_group() {
        return Err(Conflict::NotAGroup(group_id.to_string()).into());
    }
    let parent_id = find_parent(&graph.root, group_id)
        .map(|parent| parent.id.clone())
        .ok_or_else(|| EditError::not_found(EntityKind::Parent, group_id))?;
    let child_ids: Vec<String> = group.children.iter().map(|child| child.id.clone()).collect();

    let mut next = graph.clone();
    for child in &child_ids {
        next = move_node(&next, child, &parent_id)?;
    }

    let emptied = detach_node(&mut next.root, group_id)
        .ok_or_else(|| EditError::not_found(EntityKind::Group, group_id))?;
    let purged = remove_edges_where(&mut next.root, |edge| edge.touches(group_id));
    for edge in emptied.edges {
        if edge.touches(group_id) {
            continue;
        }
        let owner = edge_owner(&next.root, &edge.source, &edge.target);
        find_node_mut(&mut next.root, &owner)
            .ok_or_else(|| EditError::not_found(EntityKind::Node, &owner))?
            .edges
            .push(edge);
    }
    tracing::debug!(group = group_id, parent = %parent_id, hoisted = child_ids.len(), purged, "removed group");
    Ok(next)
}

/// Unlinks a node (with its subtree) from its parent.
fn detach_node(root: &mut GraphNode, id: &str) -> Option<GraphNode> {
    if let Some(pos) = root.children.iter().position(|child| child.id == id) {
        return Some(root.children.remove(pos));
    }
    root.children
        .iter_mut()
        .find_map(|child| detach_node(child, id))
}

fn remove_edges_where(root: &mut GraphNode, mut predicate: impl FnMut(&Edge) -> bool) -> usize {
    let mut removed = 0;
    root.walk_mut(&mut |node| {
        let before = node.edges.len();
        node.edges.retain(|edge| !predicate(edge));
        removed += before - node.edges.len();
    });
    removed
}
