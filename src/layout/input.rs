use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::LayoutOptions;
use crate::ancestry::find_node;
use crate::error::{Conflict, EditError, EntityKind};
use crate::ir::{DomainGraph, GraphNode};
use crate::sizing::SizingConfig;
use crate::view_state::ViewState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// One entity handed to the engine. Leaves carry their final size; groups
/// carry a minimum size and are grown around their children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub group: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<LayoutNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<LayoutEdge>,
}

impl LayoutNode {
    pub fn is_group(&self) -> bool {
        self.group || !self.children.is_empty()
    }

    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a LayoutNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

/// Engine input: the scope subtree plus the options for this run. Owns all of
/// its data so a run can move to another thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutGraph {
    pub root: LayoutNode,
    pub options: LayoutOptions,
}

impl LayoutGraph {
    /// Builds the engine input for the group `scope`. Leaves that already have
    /// cached geometry keep their size; others are sized from their label.
    pub fn from_domain(
        graph: &DomainGraph,
        scope: &str,
        options: &LayoutOptions,
        view: &ViewState,
        sizing: &SizingConfig,
    ) -> Result<Self, EditError> {
        let node = find_node(&graph.root, scope)
            .ok_or_else(|| EditError::not_found(EntityKind::Group, scope))?;
        if !node.is_group() {
            return Err(Conflict::NotAGroup(scope.to_string()).into());
        }
        Ok(Self {
            root: convert(node, view, sizing),
            options: options.clone(),
        })
    }

    pub fn node_ids(&self) -> HashSet<&str> {
        let mut ids = HashSet::new();
        self.root.walk(&mut |node| {
            ids.insert(node.id.as_str());
        });
        ids
    }

    pub fn edges(&self) -> Vec<&LayoutEdge> {
        let mut edges = Vec::new();
        self.root.walk(&mut |node| edges.extend(node.edges.iter()));
        edges
    }

    pub fn node_count(&self) -> usize {
        self.node_ids().len()
    }
}

fn convert(node: &GraphNode, view: &ViewState, sizing: &SizingConfig) -> LayoutNode {
    let group = node.is_group();
    let (width, height) = if group {
        sizing.group_size()
    } else {
        match view.leaves.get(&node.id) {
            Some(record) if record.width > 0.0 && record.height > 0.0 => {
                (record.width, record.height)
            }
            _ => sizing.leaf_size(node.display_label()),
        }
    };
    LayoutNode {
        id: node.id.clone(),
        label: node.label.clone(),
        width,
        height,
        group,
        children: node
            .children
            .iter()
            .map(|child| convert(child, view, sizing))
            .collect(),
        edges: node
            .edges
            .iter()
            .map(|edge| LayoutEdge {
                id: edge.id.clone(),
                source: edge.source.clone(),
                target: edge.target.clone(),
                label: edge.label.clone(),
            })
            .collect(),
    }
}
