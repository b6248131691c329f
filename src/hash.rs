use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hasher;

use crate::ir::{DomainGraph, GraphNode};

/// Deterministic fingerprint of a graph's membership and shape. Labels and
/// payload data do not contribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructuralHash(pub u64);

impl fmt::Display for StructuralHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

pub fn structural_hash(graph: &DomainGraph) -> StructuralHash {
    let mut hasher = FxHasher::default();
    hash_node(&graph.root, &mut hasher);
    StructuralHash(hasher.finish())
}

fn write_str(hasher: &mut FxHasher, value: &str) {
    hasher.write_u64(value.len() as u64);
    hasher.write(value.as_bytes());
}

fn hash_node(node: &GraphNode, hasher: &mut FxHasher) {
    hasher.write_u8(b'N');
    write_str(hasher, &node.id);
    hasher.write_u8(node.is_group() as u8);
    hasher.write_u64(node.children.len() as u64);

    // Edge order inside an owner is an artifact of reattachment, not structure.
    let mut edges: Vec<_> = node.edges.iter().collect();
    edges.sort_by(|a, b| a.id.cmp(&b.id));
    hasher.write_u64(edges.len() as u64);
    for edge in edges {
        hasher.write_u8(b'E');
        write_str(hasher, &edge.id);
        write_str(hasher, &edge.source);
        write_str(hasher, &edge.target);
    }

    for child in &node.children {
        hash_node(child, hasher);
    }
    hasher.write_u8(b'/');
}
