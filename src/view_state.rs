//! Geometry and layout-mode side table keyed by entity id.
//!
//! All coordinates are absolute (root-relative). The domain graph never holds
//! any of this; entries are created by direct manipulation or extracted from
//! layout output and purged when their entity disappears.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::ancestry::find_node;
use crate::error::{EditError, EntityKind};
use crate::ir::{DomainGraph, GraphNode, ROOT_ID};
use crate::layout::{LayoutOutput, OutputNode};
use crate::sizing::SizingConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeometryRecord {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl GeometryRecord {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    pub fn union(&self, other: &Self) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = (self.x + self.width).max(other.x + other.width);
        let bottom = (self.y + self.height).max(other.y + other.height);
        Self::new(x, y, right - x, bottom - y)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeRoute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waypoints: Option<Vec<Point>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LayoutMode {
    /// Manual geometry is authoritative.
    #[default]
    Free,
    /// The automatic engine is authoritative.
    Lock,
}

/// A direct-manipulation write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManualUpdate {
    Node { id: String, geometry: GeometryRecord },
    Edge { id: String, route: EdgeRoute },
}

impl ManualUpdate {
    pub fn id(&self) -> &str {
        match self {
            Self::Node { id, .. } | Self::Edge { id, .. } => id,
        }
    }
}

/// How layout output is merged into the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resync {
    /// Overwrite every entity the run covered.
    Scope,
    /// Only fill entities that have no cached geometry yet.
    MissingOnly,
}

/// Absolute geometry pulled out of one layout run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedGeometry {
    pub leaves: BTreeMap<String, GeometryRecord>,
    pub groups: BTreeMap<String, GeometryRecord>,
    pub edges: BTreeMap<String, Vec<Point>>,
}

impl ExtractedGeometry {
    pub fn len(&self) -> usize {
        self.leaves.len() + self.groups.len() + self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub written: usize,
    pub kept: usize,
    pub protected: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    #[serde(default)]
    pub leaves: BTreeMap<String, GeometryRecord>,
    #[serde(default)]
    pub groups: BTreeMap<String, GeometryRecord>,
    #[serde(default)]
    pub edges: BTreeMap<String, EdgeRoute>,
    #[serde(default)]
    pub modes: BTreeMap<String, LayoutMode>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn geometry(&self, id: &str) -> Option<&GeometryRecord> {
        self.leaves.get(id).or_else(|| self.groups.get(id))
    }

    pub fn edge_route(&self, id: &str) -> Option<&EdgeRoute> {
        self.edges.get(id)
    }

    pub fn layout_mode(&self, group_id: &str) -> LayoutMode {
        self.modes.get(group_id).copied().unwrap_or_default()
    }

    /// Sets the mode and returns the previous one.
    pub fn set_layout_mode(&mut self, group_id: &str, mode: LayoutMode) -> LayoutMode {
        self.modes
            .insert(group_id.to_string(), mode)
            .unwrap_or_default()
    }

    /// Writes manual geometry. Only records whose value actually changes are
    /// touched; every other record stays exactly as it was. Returns the ids
    /// that changed.
    pub fn apply_manipulation(
        &mut self,
        graph: &DomainGraph,
        updates: &[ManualUpdate],
    ) -> Result<Vec<String>, EditError> {
        // Resolve everything before writing so a bad id leaves the cache alone.
        let mut resolved = Vec::with_capacity(updates.len());
        for update in updates {
            match update {
                ManualUpdate::Node { id, geometry } => {
                    let node = find_node(&graph.root, id)
                        .ok_or_else(|| EditError::not_found(EntityKind::Node, id))?;
                    resolved.push((update, node.is_group(), *geometry));
                }
                ManualUpdate::Edge { id, .. } => {
                    if !graph.contains_edge(id) {
                        return Err(EditError::not_found(EntityKind::Edge, id));
                    }
                    resolved.push((update, false, GeometryRecord::default()));
                }
            }
        }

        let mut changed = Vec::new();
        for (update, is_group, geometry) in resolved {
            match update {
                ManualUpdate::Node { id, .. } => {
                    let map = if is_group {
                        &mut self.groups
                    } else {
                        &mut self.leaves
                    };
                    if map.get(id) != Some(&geometry) {
                        map.insert(id.clone(), geometry);
                        changed.push(id.clone());
                    }
                }
                ManualUpdate::Edge { id, route } => {
                    if self.edges.get(id) != Some(route) {
                        self.edges.insert(id.clone(), route.clone());
                        changed.push(id.clone());
                    }
                }
            }
        }
        Ok(changed)
    }

    /// Update set that moves `id` to `(x, y)` carrying its descendants and the
    /// routes of edges inside the moved subtree along.
    pub fn translate_subtree(
        &self,
        graph: &DomainGraph,
        id: &str,
        x: f32,
        y: f32,
    ) -> Result<Vec<ManualUpdate>, EditError> {
        let node = find_node(&graph.root, id).ok_or_else(|| EditError::not_found(EntityKind::Node, id))?;
        let Some(current) = self.geometry(id) else {
            return Ok(vec![ManualUpdate::Node {
                id: id.to_string(),
                geometry: GeometryRecord::new(x, y, 0.0, 0.0),
            }]);
        };
        let (dx, dy) = (x - current.x, y - current.y);

        let mut updates = Vec::new();
        let mut inside = HashSet::new();
        node.walk(&mut |n| {
            inside.insert(n.id.clone());
            if let Some(record) = self.geometry(&n.id) {
                updates.push(ManualUpdate::Node {
                    id: n.id.clone(),
                    geometry: record.translated(dx, dy),
                });
            }
        });
        node.walk(&mut |n| {
            for edge in &n.edges {
                if !(inside.contains(&edge.source) && inside.contains(&edge.target)) {
                    continue;
                }
                let Some(route) = self.edges.get(&edge.id) else {
                    continue;
                };
                let Some(points) = &route.waypoints else {
                    continue;
                };
                updates.push(ManualUpdate::Edge {
                    id: edge.id.clone(),
                    route: EdgeRoute {
                        waypoints: Some(points.iter().map(|p| p.offset(dx, dy)).collect()),
                        ..route.clone()
                    },
                });
            }
        });
        Ok(updates)
    }

    /// Merges extracted layout geometry. Ids in `protected` were written by
    /// hand after the run started and are never overwritten.
    pub fn merge_layout(
        &mut self,
        extracted: ExtractedGeometry,
        resync: Resync,
        protected: &HashSet<String>,
    ) -> MergeReport {
        let mut report = MergeReport::default();
        let mut merge = |map: &mut BTreeMap<String, GeometryRecord>,
                         other: &mut BTreeMap<String, GeometryRecord>,
                         incoming: BTreeMap<String, GeometryRecord>| {
            for (id, record) in incoming {
                if protected.contains(&id) {
                    report.protected += 1;
                    continue;
                }
                let cached = map.contains_key(&id) || other.contains_key(&id);
                if resync == Resync::MissingOnly && cached {
                    report.kept += 1;
                    continue;
                }
                other.remove(&id);
                map.insert(id, record);
                report.written += 1;
            }
        };
        merge(&mut self.leaves, &mut self.groups, extracted.leaves);
        merge(&mut self.groups, &mut self.leaves, extracted.groups);

        for (id, points) in extracted.edges {
            if protected.contains(&id) {
                report.protected += 1;
                continue;
            }
            let entry = self.edges.entry(id).or_default();
            if resync == Resync::MissingOnly && entry.waypoints.is_some() {
                report.kept += 1;
                continue;
            }
            entry.waypoints = Some(points);
            report.written += 1;
        }
        report
    }

    /// Drops entries for ids that left the graph and re-files records whose
    /// entity switched between leaf and group. Returns the number dropped.
    pub fn purge(&mut self, graph: &DomainGraph) -> usize {
        let mut kinds: HashMap<String, bool> = HashMap::new();
        graph.root.walk(&mut |node| {
            kinds.insert(node.id.clone(), node.is_group());
        });
        let edge_ids = graph.edge_ids();
        let before = self.leaves.len() + self.groups.len() + self.edges.len() + self.modes.len();

        self.leaves.retain(|id, _| kinds.contains_key(id));
        self.groups.retain(|id, _| kinds.contains_key(id));
        self.edges.retain(|id, _| edge_ids.contains(id));
        self.modes.retain(|id, _| kinds.get(id).copied().unwrap_or(false));

        let promoted: Vec<String> = self
            .leaves
            .keys()
            .filter(|id| kinds.get(*id).copied().unwrap_or(false))
            .cloned()
            .collect();
        for id in promoted {
            if let Some(record) = self.leaves.remove(&id) {
                self.groups.insert(id, record);
            }
        }
        let demoted: Vec<String> = self
            .groups
            .keys()
            .filter(|id| !kinds.get(*id).copied().unwrap_or(true))
            .cloned()
            .collect();
        for id in demoted {
            if let Some(record) = self.groups.remove(&id) {
                self.leaves.insert(id, record);
            }
        }

        let after = self.leaves.len() + self.groups.len() + self.edges.len() + self.modes.len();
        let dropped = before - after;
        if dropped > 0 {
            tracing::debug!(dropped, "purged view state");
        }
        dropped
    }

    /// Gives every entity without geometry a placeholder inside its parent,
    /// used when an edit adds entities but no layout run is due. Groups wrap
    /// whatever children already have geometry. Returns the seeded ids.
    pub fn seed_missing(&mut self, graph: &DomainGraph, sizing: &SizingConfig) -> Vec<String> {
        let mut seeded = Vec::new();
        let origin = self
            .geometry(ROOT_ID)
            .copied()
            .unwrap_or_else(|| GeometryRecord::new(0.0, 0.0, 0.0, 0.0));
        for (index, child) in graph.root.children.iter().enumerate() {
            self.seed_node(child, &origin, index, sizing, &mut seeded);
        }
        seeded
    }

    fn seed_node(
        &mut self,
        node: &GraphNode,
        parent: &GeometryRecord,
        index: usize,
        sizing: &SizingConfig,
        seeded: &mut Vec<String>,
    ) {
        if self.geometry(&node.id).is_none() {
            let placed = if node.is_group() {
                let bounds = node
                    .children
                    .iter()
                    .filter_map(|child| self.geometry(&child.id))
                    .fold(None, |acc: Option<GeometryRecord>, record| {
                        Some(acc.map_or(*record, |acc| acc.union(record)))
                    });
                match bounds {
                    Some(bounds) => GeometryRecord::new(
                        bounds.x - sizing.padding_x,
                        bounds.y - sizing.padding_y * 2.0 - sizing.font_size,
                        bounds.width + sizing.padding_x * 2.0,
                        bounds.height + sizing.padding_y * 3.0 + sizing.font_size,
                    ),
                    None => {
                        let (width, height) = sizing.group_size();
                        cascade(parent, index, width, height, sizing)
                    }
                }
            } else {
                let (width, height) = sizing.leaf_size(node.display_label());
                cascade(parent, index, width, height, sizing)
            };
            if node.is_group() {
                self.groups.insert(node.id.clone(), placed);
            } else {
                self.leaves.insert(node.id.clone(), placed);
            }
            seeded.push(node.id.clone());
        }

        let Some(own) = self.geometry(&node.id).copied() else {
            return;
        };
        for (child_index, child) in node.children.iter().enumerate() {
            self.seed_node(child, &own, child_index, sizing, seeded);
        }
    }
}

fn cascade(
    parent: &GeometryRecord,
    index: usize,
    width: f32,
    height: f32,
    sizing: &SizingConfig,
) -> GeometryRecord {
    let step = sizing.cascade_offset * index as f32;
    GeometryRecord::new(
        parent.x + sizing.padding_x + step,
        parent.y + sizing.padding_y * 2.0 + sizing.font_size + step,
        width,
        height,
    )
}

/// Converts relative-to-parent layout output into absolute geometry by walking
/// the tree top-down and accumulating parent offsets. `origin` is the absolute
/// position the output root's own coordinates are relative to.
pub fn extract_layout(output: &LayoutOutput, origin: Point) -> ExtractedGeometry {
    let mut extracted = ExtractedGeometry::default();
    extract_node(&output.root, origin, &mut extracted);
    extracted
}

fn extract_node(node: &OutputNode, parent: Point, out: &mut ExtractedGeometry) {
    let absolute = parent.offset(node.x, node.y);
    let record = GeometryRecord::new(absolute.x, absolute.y, node.width, node.height);
    if node.is_group() {
        out.groups.insert(node.id.clone(), record);
    } else {
        out.leaves.insert(node.id.clone(), record);
    }

    for edge in &node.edges {
        let mut points = Vec::new();
        for section in &edge.sections {
            points.push(section.start);
            points.extend(section.bends.iter().copied());
            points.push(section.end);
        }
        let points = points
            .into_iter()
            .map(|p| p.offset(absolute.x, absolute.y))
            .collect();
        out.edges.insert(edge.id.clone(), points);
    }

    for child in &node.children {
        extract_node(child, absolute, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Edge, GraphNode};
    use crate::layout::{EdgeSection, OutputEdge};

    fn graph() -> DomainGraph {
        let mut group = GraphNode::group("g", None);
        group.children.push(GraphNode::leaf("a", None));
        group.children.push(GraphNode::leaf("b", None));
        group.edges.push(Edge::new("ab", "a", "b"));
        let mut graph = DomainGraph::new();
        graph.root.children.push(group);
        graph.root.children.push(GraphNode::leaf("c", None));
        graph
    }

    fn out(id: &str, x: f32, y: f32, children: Vec<OutputNode>) -> OutputNode {
        OutputNode {
            id: id.to_string(),
            x,
            y,
            width: 10.0,
            height: 10.0,
            group: false,
            children,
            edges: Vec::new(),
        }
    }

    #[test]
    fn drag_touches_only_the_dragged_entity() {
        let graph = graph();
        let mut view = ViewState::new();
        view.leaves.insert("a".into(), GeometryRecord::new(0.0, 0.0, 10.0, 10.0));
        view.leaves.insert("b".into(), GeometryRecord::new(20.0, 0.0, 10.0, 10.0));
        view.leaves.insert("c".into(), GeometryRecord::new(40.0, 0.0, 10.0, 10.0));
        let before = view.clone();

        let changed = view
            .apply_manipulation(
                &graph,
                &[
                    ManualUpdate::Node {
                        id: "a".into(),
                        geometry: GeometryRecord::new(5.0, 5.0, 10.0, 10.0),
                    },
                    ManualUpdate::Node {
                        id: "b".into(),
                        geometry: before.leaves["b"],
                    },
                ],
            )
            .unwrap();
        assert_eq!(changed, vec!["a".to_string()]);
        assert_eq!(view.leaves["b"], before.leaves["b"]);
        assert_eq!(view.leaves["c"], before.leaves["c"]);
    }

    #[test]
    fn drag_of_unknown_id_changes_nothing() {
        let graph = graph();
        let mut view = ViewState::new();
        let err = view
            .apply_manipulation(
                &graph,
                &[
                    ManualUpdate::Node {
                        id: "a".into(),
                        geometry: GeometryRecord::new(1.0, 1.0, 1.0, 1.0),
                    },
                    ManualUpdate::Node {
                        id: "ghost".into(),
                        geometry: GeometryRecord::default(),
                    },
                ],
            )
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(view, ViewState::new());
    }

    #[test]
    fn translate_carries_descendants_and_inner_routes() {
        let graph = graph();
        let mut view = ViewState::new();
        view.groups.insert("g".into(), GeometryRecord::new(0.0, 0.0, 100.0, 50.0));
        view.leaves.insert("a".into(), GeometryRecord::new(10.0, 10.0, 10.0, 10.0));
        view.leaves.insert("c".into(), GeometryRecord::new(200.0, 0.0, 10.0, 10.0));
        view.edges.insert(
            "ab".into(),
            EdgeRoute {
                waypoints: Some(vec![Point::new(1.0, 1.0)]),
                ..Default::default()
            },
        );
        let updates = view.translate_subtree(&graph, "g", 50.0, 0.0).unwrap();
        assert_eq!(updates.len(), 3);
        view.apply_manipulation(&graph, &updates).unwrap();
        assert_eq!(view.leaves["a"].x, 60.0);
        assert_eq!(view.leaves["c"].x, 200.0);
        assert_eq!(view.edges["ab"].waypoints.as_ref().unwrap()[0], Point::new(51.0, 1.0));
    }

    #[test]
    fn extraction_accumulates_parent_offsets() {
        let mut group = out("g", 100.0, 50.0, vec![out("a", 10.0, 20.0, Vec::new())]);
        group.edges.push(OutputEdge {
            id: "ab".into(),
            source: "a".into(),
            target: "b".into(),
            sections: vec![EdgeSection {
                start: Point::new(0.0, 0.0),
                bends: vec![Point::new(5.0, 5.0)],
                end: Point::new(10.0, 10.0),
            }],
        });
        let mut flagged = out("empty", 0.0, 300.0, Vec::new());
        flagged.group = true;
        let output = LayoutOutput {
            root: out("root", 0.0, 0.0, vec![group, flagged]),
        };
        let extracted = extract_layout(&output, Point::new(1000.0, 0.0));
        assert_eq!(extracted.groups["g"].x, 1100.0);
        assert_eq!(extracted.leaves["a"], GeometryRecord::new(1110.0, 70.0, 10.0, 10.0));
        assert!(extracted.groups.contains_key("empty"));
        assert_eq!(extracted.edges["ab"][1], Point::new(1105.0, 55.0));
    }

    #[test]
    fn merge_respects_resync_and_protection() {
        let mut view = ViewState::new();
        view.leaves.insert("a".into(), GeometryRecord::new(1.0, 1.0, 1.0, 1.0));
        view.leaves.insert("b".into(), GeometryRecord::new(2.0, 2.0, 2.0, 2.0));
        let mut extracted = ExtractedGeometry::default();
        for id in ["a", "b", "c"] {
            extracted
                .leaves
                .insert(id.to_string(), GeometryRecord::new(9.0, 9.0, 9.0, 9.0));
        }

        let mut missing_only = view.clone();
        let report = missing_only.merge_layout(extracted.clone(), Resync::MissingOnly, &HashSet::new());
        assert_eq!(report.written, 1);
        assert_eq!(missing_only.leaves["a"].x, 1.0);

        let protected: HashSet<String> = ["b".to_string()].into_iter().collect();
        let report = view.merge_layout(extracted, Resync::Scope, &protected);
        assert_eq!(report.written, 2);
        assert_eq!(report.protected, 1);
        assert_eq!(view.leaves["a"].x, 9.0);
        assert_eq!(view.leaves["b"].x, 2.0);
    }

    #[test]
    fn purge_drops_and_reclassifies() {
        let graph = graph();
        let mut view = ViewState::new();
        view.leaves.insert("g".into(), GeometryRecord::default());
        view.leaves.insert("gone".into(), GeometryRecord::default());
        view.groups.insert("c".into(), GeometryRecord::default());
        view.edges.insert("old".into(), EdgeRoute::default());
        view.modes.insert("g".into(), LayoutMode::Lock);
        view.modes.insert("c".into(), LayoutMode::Lock);
        assert_eq!(view.purge(&graph), 3);
        assert!(view.groups.contains_key("g"));
        assert!(view.leaves.contains_key("c"));
        assert_eq!(view.layout_mode("g"), LayoutMode::Lock);
        assert_eq!(view.layout_mode("c"), LayoutMode::Free);
    }

    #[test]
    fn seeding_fills_only_missing_entities() {
        let graph = graph();
        let sizing = SizingConfig {
            system_fonts: false,
            ..Default::default()
        };
        let mut view = ViewState::new();
        view.leaves.insert("a".into(), GeometryRecord::new(100.0, 100.0, 50.0, 20.0));
        let seeded = view.seed_missing(&graph, &sizing);
        assert_eq!(seeded, vec!["g".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(view.leaves["a"], GeometryRecord::new(100.0, 100.0, 50.0, 20.0));
        let g = view.groups["g"];
        assert!(g.x < 100.0 && g.y < 100.0);
        assert!(g.x + g.width > 150.0);
        assert!(view.seed_missing(&graph, &sizing).is_empty());
    }
}
