use serde::{Deserialize, Serialize};

use super::LayoutError;
use crate::view_state::Point;

/// A polyline piece of an edge, relative to the edge's owning node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSection {
    pub start: Point,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bends: Vec<Point>,
    pub end: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub sections: Vec<EdgeSection>,
}

/// Engine result for one entity; `x`/`y` are relative to the parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputNode {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub group: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutputNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<OutputEdge>,
}

impl OutputNode {
    pub fn is_group(&self) -> bool {
        self.group || !self.children.is_empty()
    }

    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a OutputNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutOutput {
    pub root: OutputNode,
}

impl LayoutOutput {
    /// Reads output produced by an out-of-process engine.
    pub fn from_json(input: &str) -> Result<Self, LayoutError> {
        serde_json::from_str(input).map_err(|err| LayoutError::invalid(err.to_string()))
    }
}
