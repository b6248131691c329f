use serde::{Deserialize, Serialize};

use super::{
    add_edge, add_node, delete_edge, delete_node, edge_owner, group_nodes, move_node, normalize_id,
    remove_group,
};
use crate::ancestry::find_parent;
use crate::error::{EditError, EditResult};
use crate::ir::{DomainGraph, Edge, NodeData};

/// One structural edit, as carried in a batch or loaded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    AddNode {
        name: String,
        parent_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<NodeData>,
    },
    DeleteNode {
        node_id: String,
    },
    MoveNode {
        node_id: String,
        new_parent_id: String,
    },
    AddEdge {
        edge_id: String,
        source_id: String,
        target_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_handle: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_handle: Option<String>,
    },
    DeleteEdge {
        edge_id: String,
    },
    GroupNodes {
        node_ids: Vec<String>,
        parent_id: String,
        group_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style: Option<String>,
    },
    RemoveGroup {
        group_id: String,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddNode { .. } => "add_node",
            Self::DeleteNode { .. } => "delete_node",
            Self::MoveNode { .. } => "move_node",
            Self::AddEdge { .. } => "add_edge",
            Self::DeleteEdge { .. } => "delete_edge",
            Self::GroupNodes { .. } => "group_nodes",
            Self::RemoveGroup { .. } => "remove_group",
        }
    }

    /// Position in the batch order: nodes first, then groups, then everything
    /// else, edges last so they land once endpoints reach their final ancestry.
    fn phase(&self) -> u8 {
        match self {
            Self::AddNode { .. } => 0,
            Self::GroupNodes { .. } => 1,
            Self::AddEdge { .. } => 3,
            _ => 2,
        }
    }

    pub fn apply(&self, graph: &DomainGraph) -> EditResult<DomainGraph> {
        match self {
            Self::AddNode {
                name,
                parent_id,
                data,
            } => add_node(graph, name, parent_id, data.clone()),
            Self::DeleteNode { node_id } => delete_node(graph, node_id),
            Self::MoveNode {
                node_id,
                new_parent_id,
            } => move_node(graph, node_id, new_parent_id),
            Self::AddEdge {
                edge_id,
                source_id,
                target_id,
                label,
                source_handle,
                target_handle,
            } => add_edge(
                graph,
                Edge {
                    id: edge_id.clone(),
                    source: source_id.clone(),
                    target: target_id.clone(),
                    label: label.clone(),
                    source_handle: source_handle.clone(),
                    target_handle: target_handle.clone(),
                },
            ),
            Self::DeleteEdge { edge_id } => delete_edge(graph, edge_id),
            Self::GroupNodes {
                node_ids,
                parent_id,
                group_id,
                style,
            } => group_nodes(graph, node_ids, parent_id, group_id, style.clone()),
            Self::RemoveGroup { group_id } => remove_group(graph, group_id),
        }
    }

    /// Node ids this operation creates, moves or attaches to. Used to find the
    /// scope an edit happened in. `before` resolves ids that only existed
    /// prior to the edit.
    pub fn touched_nodes(&self, before: &DomainGraph) -> Vec<String> {
        match self {
            Self::AddNode { name, .. } => vec![normalize_id(name)],
            Self::DeleteNode { node_id } => vec![node_id.clone()],
            Self::MoveNode { node_id, .. } => vec![node_id.clone()],
            Self::AddEdge {
                source_id,
                target_id,
                ..
            } => vec![source_id.clone(), target_id.clone()],
            Self::DeleteEdge { edge_id } => before
                .find_edge(edge_id)
                .map(|(edge, _)| vec![edge.source.clone(), edge.target.clone()])
                .unwrap_or_default(),
            Self::GroupNodes { group_id, .. } => vec![group_id.clone()],
            Self::RemoveGroup { group_id } => vec![group_id.clone()],
        }
    }

    /// Groups whose direct contents (children or owned edges) this operation
    /// changes, including the ones a node leaves. Ids may be stale in `after`.
    pub fn containers(&self, before: &DomainGraph, after: &DomainGraph) -> Vec<String> {
        let former_parent =
            |id: &str| find_parent(&before.root, id).map(|parent| parent.id.clone());
        match self {
            Self::AddNode { parent_id, .. } => vec![parent_id.clone()],
            Self::DeleteNode { node_id } => former_parent(node_id).into_iter().collect(),
            Self::MoveNode {
                node_id,
                new_parent_id,
            } => former_parent(node_id)
                .into_iter()
                .chain(std::iter::once(new_parent_id.clone()))
                .collect(),
            Self::AddEdge {
                source_id,
                target_id,
                ..
            } => vec![edge_owner(&after.root, source_id, target_id)],
            Self::DeleteEdge { edge_id } => before
                .find_edge(edge_id)
                .map(|(_, owner)| vec![owner.to_string()])
                .unwrap_or_default(),
            Self::GroupNodes {
                node_ids,
                parent_id,
                group_id,
                ..
            } => {
                let mut out = vec![parent_id.clone(), group_id.clone()];
                out.extend(node_ids.iter().filter_map(|id| former_parent(id)));
                out
            }
            Self::RemoveGroup { group_id } => former_parent(group_id).into_iter().collect(),
        }
    }
}

/// Applies `operations` in phase order (`add_node`, `group_nodes`, the rest,
/// `add_edge`), keeping caller order within a phase. Either every operation
/// applies or the call fails naming the first failing one by its original
/// index; the input graph is never changed.
pub fn batch_update(graph: &DomainGraph, operations: &[Operation]) -> EditResult<DomainGraph> {
    let mut order: Vec<usize> = (0..operations.len()).collect();
    order.sort_by_key(|&idx| operations[idx].phase());

    let mut working = graph.clone();
    for idx in order {
        let op = &operations[idx];
        working = op.apply(&working).map_err(|err| {
            tracing::debug!(index = idx, op = op.name(), error = %err, "batch aborted");
            EditError::Batch {
                index: idx,
                op: op.name().to_string(),
                source: Box::new(err),
            }
        })?;
    }
    Ok(working)
}

pub fn parse_operations(input: &str) -> Result<Vec<Operation>, serde_json::Error> {
    serde_json::from_str(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Conflict, EntityKind};
    use crate::ir::ROOT_ID;

    fn add(name: &str, parent: &str) -> Operation {
        Operation::AddNode {
            name: name.to_string(),
            parent_id: parent.to_string(),
            data: None,
        }
    }

    fn edge(id: &str, source: &str, target: &str) -> Operation {
        Operation::AddEdge {
            edge_id: id.to_string(),
            source_id: source.to_string(),
            target_id: target.to_string(),
            label: None,
            source_handle: None,
            target_handle: None,
        }
    }

    #[test]
    fn edges_are_added_after_grouping_regardless_of_order() {
        let ops = vec![
            edge("e1", "a", "b"),
            Operation::GroupNodes {
                node_ids: vec!["a".to_string(), "b".to_string()],
                parent_id: ROOT_ID.to_string(),
                group_id: "g1".to_string(),
                style: None,
            },
            add("a", ROOT_ID),
            add("b", ROOT_ID),
        ];
        let graph = batch_update(&DomainGraph::new(), &ops).unwrap();
        assert_eq!(graph.find_edge("e1").unwrap().1, "g1");
        assert_eq!(find_parent(&graph.root, "a").unwrap().id, "g1");
    }

    #[test]
    fn failure_reports_original_index_and_leaves_input_alone() {
        let start = DomainGraph::new();
        let ops = vec![
            Operation::DeleteNode {
                node_id: "ghost".to_string(),
            },
            add("a", ROOT_ID),
        ];
        let err = batch_update(&start, &ops).unwrap_err();
        match &err {
            EditError::Batch { index, op, source } => {
                assert_eq!(*index, 0);
                assert_eq!(op, "delete_node");
                assert_eq!(
                    **source,
                    EditError::NotFound {
                        kind: EntityKind::Node,
                        id: "ghost".to_string()
                    }
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(start, DomainGraph::new());
    }

    #[test]
    fn self_loop_in_batch_aborts() {
        let ops = vec![add("a", ROOT_ID), edge("loop", "a", "a")];
        let err = batch_update(&DomainGraph::new(), &ops).unwrap_err();
        assert!(matches!(
            err.root_cause(),
            EditError::StructuralConflict(Conflict::SelfLoop { .. })
        ));
    }

    #[test]
    fn parses_tagged_json() {
        let input = r#"[
            {"type": "add_node", "name": "API", "parent_id": "root"},
            {"type": "add_edge", "edge_id": "e1", "source_id": "api", "target_id": "db", "label": "reads"},
            {"type": "remove_group", "group_id": "g1"}
        ]"#;
        let ops = parse_operations(input).unwrap();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].touched_nodes(&DomainGraph::new()), vec!["api".to_string()]);
        assert_eq!(ops[1].name(), "add_edge");
    }

    #[test]
    fn delete_edge_and_move_resolve_through_previous_graph() {
        let ops = vec![
            add("a", ROOT_ID),
            add("b", ROOT_ID),
            Operation::GroupNodes {
                node_ids: vec!["a".to_string(), "b".to_string()],
                parent_id: ROOT_ID.to_string(),
                group_id: "g".to_string(),
                style: None,
            },
            edge("e1", "a", "b"),
        ];
        let before = batch_update(&DomainGraph::new(), &ops).unwrap();

        let delete = Operation::DeleteEdge {
            edge_id: "e1".to_string(),
        };
        let after = delete.apply(&before).unwrap();
        assert_eq!(delete.touched_nodes(&before), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(delete.containers(&before, &after), vec!["g".to_string()]);

        let leave = Operation::MoveNode {
            node_id: "a".to_string(),
            new_parent_id: ROOT_ID.to_string(),
        };
        let after = leave.apply(&before).unwrap();
        assert_eq!(
            leave.containers(&before, &after),
            vec!["g".to_string(), ROOT_ID.to_string()]
        );
        assert_eq!(edge("e2", "a", "b").containers(&after, &after), vec![ROOT_ID.to_string()]);
    }
}
