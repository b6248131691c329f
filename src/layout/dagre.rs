use dagre_rust::{
    GraphConfig as DagreConfig, GraphEdge as DagreEdge, GraphNode as DagreNode,
    layout as dagre_layout,
};
use graphlib_rust::{Graph as DagreGraph, GraphOption};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};

use super::{
    CycleBreaking, EdgeSection, HierarchyHandling, LayoutEdge, LayoutEngine, LayoutError,
    LayoutGraph, LayoutNode, LayoutOptions, LayoutOutput, OutputEdge, OutputNode,
};
use crate::view_state::{GeometryRecord, Point};

/// Hierarchical engine built on `dagre_rust`: every group's direct children
/// are ranked by dagre, innermost groups first, and each group is then sized
/// around its laid-out children.
#[derive(Debug, Clone, Copy, Default)]
pub struct DagreEngine;

impl DagreEngine {
    pub fn new() -> Self {
        Self
    }
}

impl LayoutEngine for DagreEngine {
    fn name(&self) -> &'static str {
        "dagre"
    }

    fn layout(&self, input: &LayoutGraph) -> Result<LayoutOutput, LayoutError> {
        let hierarchy = input.options.effective_hierarchy();
        let result = catch_unwind(AssertUnwindSafe(|| {
            layout_group(&input.root, &input.options, hierarchy)
        }));
        let root = match result {
            Ok(root) => root?,
            Err(_) => return Err(LayoutError::Engine("dagre panicked".to_string())),
        };
        Ok(LayoutOutput { root })
    }
}

fn layout_group(
    node: &LayoutNode,
    options: &LayoutOptions,
    hierarchy: HierarchyHandling,
) -> Result<OutputNode, LayoutError> {
    if node.children.is_empty() {
        return Ok(OutputNode {
            id: node.id.clone(),
            x: 0.0,
            y: 0.0,
            width: node.width,
            height: node.height,
            group: node.group,
            children: Vec::new(),
            edges: Vec::new(),
        });
    }

    let mut children = Vec::with_capacity(node.children.len());
    for child in &node.children {
        if child.is_group() {
            children.push(layout_group(child, options, hierarchy)?);
        } else {
            children.push(OutputNode {
                id: child.id.clone(),
                x: 0.0,
                y: 0.0,
                width: child.width,
                height: child.height,
                group: false,
                children: Vec::new(),
                edges: Vec::new(),
            });
        }
    }

    // Which direct child each descendant belongs to at this level.
    let mut owner_child: HashMap<&str, usize> = HashMap::new();
    for (idx, child) in node.children.iter().enumerate() {
        child.walk(&mut |n| {
            owner_child.insert(n.id.as_str(), idx);
        });
    }

    let mut level_edges: Vec<(usize, usize)> = Vec::new();
    for edge in &node.edges {
        let (Some(&from), Some(&to)) = (
            owner_child.get(edge.source.as_str()),
            owner_child.get(edge.target.as_str()),
        ) else {
            continue;
        };
        if from == to {
            continue;
        }
        let direct = node.children[from].id == edge.source && node.children[to].id == edge.target;
        if hierarchy == HierarchyHandling::SeparateChildren && !direct {
            continue;
        }
        level_edges.push((from, to));
    }

    place_children(&mut children, &level_edges, options)?;

    let pad = options.group_padding;
    let (min_x, min_y, max_x, max_y) = children.iter().fold(
        (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
        |(min_x, min_y, max_x, max_y), child| {
            (
                min_x.min(child.x),
                min_y.min(child.y),
                max_x.max(child.x + child.width),
                max_y.max(child.y + child.height),
            )
        },
    );
    for child in &mut children {
        child.x += pad - min_x;
        child.y += pad + options.group_header - min_y;
    }
    let width = (max_x - min_x + pad * 2.0).max(node.width);
    let height = (max_y - min_y + pad * 2.0 + options.group_header).max(node.height);

    let mut output = OutputNode {
        id: node.id.clone(),
        x: 0.0,
        y: 0.0,
        width,
        height,
        group: true,
        children,
        edges: Vec::new(),
    };
    output.edges = route_edges(&output, &node.edges, options);
    Ok(output)
}

fn place_children(
    children: &mut [OutputNode],
    edges: &[(usize, usize)],
    options: &LayoutOptions,
) -> Result<(), LayoutError> {
    let mut dagre_graph: DagreGraph<DagreConfig, DagreNode, DagreEdge> =
        DagreGraph::new(Some(GraphOption {
            directed: Some(true),
            multigraph: Some(false),
            compound: Some(false),
        }));

    let mut graph_config = DagreConfig::default();
    graph_config.rankdir = Some(options.direction.rankdir().to_string());
    let spacing = &options.spacing;
    graph_config.nodesep = Some(spacing.node_node);
    // dagre separates long-edge dummies from boxes by edgesep.
    graph_config.edgesep = Some(spacing.edge_node);
    // Edges crossing a layer gap keep edge_node_between_layers clear on both sides.
    graph_config.ranksep = Some(
        spacing
            .node_node_between_layers
            .max(spacing.edge_node_between_layers * 2.0),
    );
    graph_config.marginx = Some(options.margin);
    graph_config.marginy = Some(options.margin);
    dagre_graph.set_graph(graph_config);

    let keep_order = matches!(
        options.cycle_breaking,
        CycleBreaking::ModelOrder | CycleBreaking::Interactive
    );
    for (idx, child) in children.iter().enumerate() {
        let mut node = DagreNode::default();
        node.width = child.width;
        node.height = child.height;
        if keep_order {
            node.order = Some(idx);
        }
        dagre_graph.set_node(child.id.clone(), Some(node));
    }

    let mut edge_set: HashSet<(usize, usize)> = HashSet::new();
    for (from, to) in orient_edges(children.len(), edges, options.cycle_breaking) {
        if !edge_set.insert((from, to)) {
            continue;
        }
        let from = children[from].id.clone();
        let to = children[to].id.clone();
        let edge_label = DagreEdge::default();
        let _ = dagre_graph.set_edge(&from, &to, Some(edge_label), None);
    }

    dagre_layout::run_layout(&mut dagre_graph);

    for child in children.iter_mut() {
        let Some(dagre_node) = dagre_graph.node(&child.id) else {
            return Err(LayoutError::Engine(format!("dagre dropped node {}", child.id)));
        };
        child.x = dagre_node.x - child.width / 2.0;
        child.y = dagre_node.y - child.height / 2.0;
    }
    Ok(())
}

/// Flips the edges that close a cycle under the chosen strategy, so dagre's own
/// depth-first pass finds nothing left to break. `DepthFirst` and `Interactive`
/// leave that pass in charge.
fn orient_edges(
    count: usize,
    edges: &[(usize, usize)],
    strategy: CycleBreaking,
) -> Vec<(usize, usize)> {
    let position: Vec<usize> = match strategy {
        CycleBreaking::DepthFirst | CycleBreaking::Interactive => return edges.to_vec(),
        CycleBreaking::ModelOrder => (0..count).collect(),
        CycleBreaking::Greedy => {
            let mut position = vec![0; count];
            for (rank, node) in greedy_order(count, edges).into_iter().enumerate() {
                position[node] = rank;
            }
            position
        }
    };
    edges
        .iter()
        .map(|&(from, to)| {
            if position[from] > position[to] {
                (to, from)
            } else {
                (from, to)
            }
        })
        .collect()
}

/// Eades-Lin-Smyth ordering: sinks go to the back, sources to the front, and
/// otherwise the node with the largest out-minus-in degree goes next. Ties
/// fall to the earlier child.
fn greedy_order(count: usize, edges: &[(usize, usize)]) -> Vec<usize> {
    let mut alive = vec![true; count];
    let mut remaining = count;
    let mut front = Vec::with_capacity(count);
    let mut back = Vec::new();
    let degrees = |alive: &[bool], node: usize| {
        edges
            .iter()
            .filter(|&&(from, to)| from != to && alive[from] && alive[to])
            .fold((0isize, 0isize), |(out, inc), &(from, to)| {
                (out + (from == node) as isize, inc + (to == node) as isize)
            })
    };

    while remaining > 0 {
        let mut peeled = true;
        while peeled {
            peeled = false;
            for node in 0..count {
                if !alive[node] {
                    continue;
                }
                let (out, inc) = degrees(&alive, node);
                if out == 0 {
                    back.push(node);
                } else if inc == 0 {
                    front.push(node);
                } else {
                    continue;
                }
                alive[node] = false;
                remaining -= 1;
                peeled = true;
            }
        }
        let pick = (0..count).filter(|&node| alive[node]).max_by_key(|&node| {
            let (out, inc) = degrees(&alive, node);
            (out - inc, std::cmp::Reverse(node))
        });
        if let Some(node) = pick {
            front.push(node);
            alive[node] = false;
            remaining -= 1;
        }
    }
    front.extend(back.into_iter().rev());
    front
}

/// Boxes of every descendant of `group`, relative to `group`.
fn descendant_boxes(group: &OutputNode) -> HashMap<&str, GeometryRecord> {
    fn visit<'a>(node: &'a OutputNode, dx: f32, dy: f32, out: &mut HashMap<&'a str, GeometryRecord>) {
        for child in &node.children {
            let x = dx + child.x;
            let y = dy + child.y;
            out.insert(child.id.as_str(), GeometryRecord::new(x, y, child.width, child.height));
            visit(child, x, y, out);
        }
    }
    let mut out = HashMap::new();
    out.insert(
        group.id.as_str(),
        GeometryRecord::new(0.0, 0.0, group.width, group.height),
    );
    visit(group, 0.0, 0.0, &mut out);
    out
}

/// Straight border-to-border sections. Edges sharing the same pair of
/// endpoints are fanned out by the edge-edge spacing, or its between-layers
/// variant when the pair sits in different layers.
fn route_edges(group: &OutputNode, edges: &[LayoutEdge], options: &LayoutOptions) -> Vec<OutputEdge> {
    let boxes = descendant_boxes(group);
    let mut bundles: BTreeMap<(&str, &str), Vec<&LayoutEdge>> = BTreeMap::new();
    for edge in edges {
        let key = if edge.source <= edge.target {
            (edge.source.as_str(), edge.target.as_str())
        } else {
            (edge.target.as_str(), edge.source.as_str())
        };
        bundles.entry(key).or_default().push(edge);
    }

    let mut routed: HashMap<&str, OutputEdge> = HashMap::new();
    for bundle in bundles.values() {
        let count = bundle.len();
        for (slot, edge) in bundle.iter().enumerate() {
            let (Some(source), Some(target)) = (
                boxes.get(edge.source.as_str()),
                boxes.get(edge.target.as_str()),
            ) else {
                continue;
            };
            let gap = if crosses_layers(source, target, options) {
                options.spacing.edge_edge_between_layers
            } else {
                options.spacing.edge_edge
            };
            let offset = (slot as f32 - (count as f32 - 1.0) / 2.0) * gap;
            routed.insert(edge.id.as_str(), straight_edge(edge, source, target, offset));
        }
    }

    edges
        .iter()
        .filter_map(|edge| routed.remove(edge.id.as_str()))
        .collect()
}

/// True when the boxes are further apart along the layout axis than across it.
fn crosses_layers(source: &GeometryRecord, target: &GeometryRecord, options: &LayoutOptions) -> bool {
    let (a, b) = (source.center(), target.center());
    let (along, across) = if options.direction.is_horizontal() {
        ((a.x - b.x).abs(), (a.y - b.y).abs())
    } else {
        ((a.y - b.y).abs(), (a.x - b.x).abs())
    };
    along > across
}

fn straight_edge(
    edge: &LayoutEdge,
    source: &GeometryRecord,
    target: &GeometryRecord,
    offset: f32,
) -> OutputEdge {
    let from = source.center();
    let to = target.center();
    let (dx, dy) = (to.x - from.x, to.y - from.y);
    let len = (dx * dx + dy * dy).sqrt();
    let (nx, ny) = if len > f32::EPSILON {
        (-dy / len * offset, dx / len * offset)
    } else {
        (0.0, 0.0)
    };
    let start = clip_to_border(source, to.offset(nx, ny), from).offset(nx, ny);
    let end = clip_to_border(target, from.offset(nx, ny), to).offset(nx, ny);
    OutputEdge {
        id: edge.id.clone(),
        source: edge.source.clone(),
        target: edge.target.clone(),
        sections: vec![EdgeSection {
            start,
            bends: Vec::new(),
            end,
        }],
    }
}

/// Point where the ray from `center` towards `toward` leaves `rect`.
fn clip_to_border(rect: &GeometryRecord, toward: Point, center: Point) -> Point {
    let dx = toward.x - center.x;
    let dy = toward.y - center.y;
    if dx.abs() < f32::EPSILON && dy.abs() < f32::EPSILON {
        return center;
    }
    let half_w = rect.width / 2.0;
    let half_h = rect.height / 2.0;
    let scale = if dx.abs() * half_h > dy.abs() * half_w {
        half_w / dx.abs()
    } else {
        half_h / dy.abs()
    };
    Point::new(center.x + dx * scale, center.y + dy * scale)
}
