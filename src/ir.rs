use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::GraphError;

pub const ROOT_ID: &str = "root";

/// Opaque per-node payload. The core never interprets it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, serde_json::Value>,
}

impl NodeData {
    pub fn is_empty(&self) -> bool {
        self.icon.is_none() && self.style.is_none() && self.annotations.is_empty()
    }

    pub fn with_style(style: Option<String>) -> Self {
        Self {
            style,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Edge {
    pub fn new(id: &str, source: &str, target: &str) -> Self {
        Self {
            id: id.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            label: None,
            source_handle: None,
            target_handle: None,
        }
    }

    pub fn touches(&self, id: &str) -> bool {
        self.source == id || self.target == id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<GraphNode>,
    /// Edges owned by this node: their endpoints' common ancestor is this node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<Edge>,
    /// Explicit group marker so an emptied group stays a group.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_group: bool,
    #[serde(default, skip_serializing_if = "NodeData::is_empty")]
    pub data: NodeData,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl GraphNode {
    pub fn leaf(id: &str, label: Option<String>) -> Self {
        Self {
            id: id.to_string(),
            label,
            children: Vec::new(),
            edges: Vec::new(),
            is_group: false,
            data: NodeData::default(),
        }
    }

    pub fn group(id: &str, label: Option<String>) -> Self {
        Self {
            is_group: true,
            ..Self::leaf(id, label)
        }
    }

    pub fn is_group(&self) -> bool {
        self.is_group || !self.children.is_empty()
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }

    /// Pre-order walk over this node and all descendants.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a GraphNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    pub fn walk_mut(&mut self, visit: &mut dyn FnMut(&mut GraphNode)) {
        visit(self);
        for child in &mut self.children {
            child.walk_mut(visit);
        }
    }
}

/// The canonical structure held by the host. It carries no geometry and no
/// layout mode; those live in [`crate::view_state::ViewState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainGraph {
    pub root: GraphNode,
}

impl DomainGraph {
    pub fn new() -> Self {
        Self {
            root: GraphNode::group(ROOT_ID, None),
        }
    }

    pub fn from_json(input: &str) -> Result<Self, GraphError> {
        let graph: DomainGraph =
            serde_json::from_str(input).map_err(|err| GraphError::Parse(err.to_string()))?;
        graph.validate()?;
        Ok(graph)
    }

    pub fn to_json_pretty(&self) -> Result<String, GraphError> {
        serde_json::to_string_pretty(self).map_err(|err| GraphError::Parse(err.to_string()))
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.root.walk(&mut |_| count += 1);
        count
    }

    pub fn edge_count(&self) -> usize {
        let mut count = 0;
        self.root.walk(&mut |node| count += node.edges.len());
        count
    }

    pub fn contains_node(&self, id: &str) -> bool {
        crate::ancestry::find_node(&self.root, id).is_some()
    }

    pub fn contains_edge(&self, id: &str) -> bool {
        self.find_edge(id).is_some()
    }

    /// Returns the edge and the id of the node that owns it.
    pub fn find_edge(&self, id: &str) -> Option<(&Edge, &str)> {
        let mut found = None;
        self.root.walk(&mut |node| {
            if found.is_some() {
                return;
            }
            if let Some(edge) = node.edges.iter().find(|edge| edge.id == id) {
                found = Some((edge, node.id.as_str()));
            }
        });
        found
    }

    /// All edges paired with their owner id, in pre-order of owners.
    pub fn edges_with_owner(&self) -> Vec<(&Edge, &str)> {
        let mut out = Vec::new();
        self.root.walk(&mut |node| {
            for edge in &node.edges {
                out.push((edge, node.id.as_str()));
            }
        });
        out
    }

    pub fn node_ids(&self) -> HashSet<String> {
        let mut ids = HashSet::new();
        self.root.walk(&mut |node| {
            ids.insert(node.id.clone());
        });
        ids
    }

    pub fn edge_ids(&self) -> HashSet<String> {
        let mut ids = HashSet::new();
        self.root.walk(&mut |node| {
            for edge in &node.edges {
                ids.insert(edge.id.clone());
            }
        });
        ids
    }

    /// Checks every structural invariant. Used when a graph enters the system
    /// from outside the mutation engine (files, wire).
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.root.id != ROOT_ID {
            return Err(GraphError::BadRoot(self.root.id.clone()));
        }
        let mut nodes: HashSet<&str> = HashSet::new();
        let mut duplicate = None;
        self.root.walk(&mut |node| {
            if !nodes.insert(node.id.as_str()) && duplicate.is_none() {
                duplicate = Some(node.id.clone());
            }
        });
        if let Some(id) = duplicate {
            return Err(GraphError::DuplicateNode(id));
        }

        let mut edges: HashSet<&str> = HashSet::new();
        for (edge, owner) in self.edges_with_owner() {
            if !edges.insert(edge.id.as_str()) {
                return Err(GraphError::DuplicateEdge(edge.id.clone()));
            }
            for endpoint in [&edge.source, &edge.target] {
                if !nodes.contains(endpoint.as_str()) {
                    return Err(GraphError::DanglingEdge {
                        edge: edge.id.clone(),
                        endpoint: endpoint.clone(),
                    });
                }
            }
            if edge.source == edge.target {
                return Err(GraphError::SelfLoop(edge.id.clone()));
            }
            let expected = crate::mutation::edge_owner(&self.root, &edge.source, &edge.target);
            if expected != owner {
                return Err(GraphError::MisplacedEdge {
                    edge: edge.id.clone(),
                    owner: owner.to_string(),
                    expected,
                });
            }
        }
        Ok(())
    }
}

impl Default for DomainGraph {
    fn default() -> Self {
        Self::new()
    }
}
