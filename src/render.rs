use crate::config::RenderConfig;
use crate::ir::{DomainGraph, GraphNode};
use crate::view_state::{GeometryRecord, Point, ViewState};
use anyhow::Result;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct BoxPrimitive {
    pub id: String,
    pub label: String,
    pub geometry: GeometryRecord,
    pub depth: usize,
    pub style: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgePrimitive {
    pub id: String,
    pub label: Option<String>,
    pub points: Vec<Point>,
}

/// Drawable primitives in paint order: groups outermost first, then edges,
/// then leaves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderScene {
    pub groups: Vec<BoxPrimitive>,
    pub leaves: Vec<BoxPrimitive>,
    pub edges: Vec<EdgePrimitive>,
}

impl RenderScene {
    /// Reads geometry from the view only; entities without geometry are left
    /// out. Edges without a cached route are drawn centre to centre.
    pub fn build(graph: &DomainGraph, view: &ViewState) -> Self {
        let mut scene = Self::default();
        for child in &graph.root.children {
            scene.collect(child, view, 0);
        }

        for (edge, _) in graph.edges_with_owner() {
            let route = view
                .edges
                .get(&edge.id)
                .and_then(|route| route.waypoints.clone())
                .filter(|points| points.len() >= 2);
            let points = match route {
                Some(points) => points,
                None => {
                    let (Some(source), Some(target)) =
                        (view.geometry(&edge.source), view.geometry(&edge.target))
                    else {
                        continue;
                    };
                    vec![source.center(), target.center()]
                }
            };
            scene.edges.push(EdgePrimitive {
                id: edge.id.clone(),
                label: edge.label.clone(),
                points,
            });
        }
        scene
    }

    fn collect(&mut self, node: &GraphNode, view: &ViewState, depth: usize) {
        if let Some(geometry) = view.geometry(&node.id) {
            let primitive = BoxPrimitive {
                id: node.id.clone(),
                label: node.display_label().to_string(),
                geometry: *geometry,
                depth,
                style: node.data.style.clone(),
            };
            if node.is_group() {
                self.groups.push(primitive);
            } else {
                self.leaves.push(primitive);
            }
        }
        for child in &node.children {
            self.collect(child, view, depth + 1);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.leaves.is_empty() && self.edges.is_empty()
    }

    /// Bounding box over every primitive.
    pub fn bounds(&self) -> Option<GeometryRecord> {
        let boxes = self
            .groups
            .iter()
            .chain(self.leaves.iter())
            .map(|primitive| primitive.geometry);
        let points = self
            .edges
            .iter()
            .flat_map(|edge| edge.points.iter())
            .map(|p| GeometryRecord::new(p.x, p.y, 0.0, 0.0));
        boxes
            .chain(points)
            .reduce(|acc, record| acc.union(&record))
    }
}

/// Shrinks, never enlarges. Non-positive limits are ignored.
fn fit_scale(width: f32, height: f32, config: &RenderConfig) -> f32 {
    let mut scale: f32 = 1.0;
    if config.width > 0.0 {
        scale = scale.min(config.width / width);
    }
    if config.height > 0.0 {
        scale = scale.min(config.height / height);
    }
    scale
}

pub fn render_svg(scene: &RenderScene, config: &RenderConfig) -> String {
    let bounds = scene
        .bounds()
        .unwrap_or_else(|| GeometryRecord::new(0.0, 0.0, 0.0, 0.0));
    let pad = config.padding;
    let width = (bounds.width + pad * 2.0).max(200.0);
    let height = (bounds.height + pad * 2.0).max(200.0);
    let min_x = bounds.x - pad;
    let min_y = bounds.y - pad;
    let scale = fit_scale(width, height, config);
    let (display_w, display_h) = (width * scale, height * scale);

    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{display_w:.2}\" height=\"{display_h:.2}\" viewBox=\"{min_x:.2} {min_y:.2} {width:.2} {height:.2}\">",
    ));
    svg.push_str(&format!(
        "<rect x=\"{min_x:.2}\" y=\"{min_y:.2}\" width=\"100%\" height=\"100%\" fill=\"{}\"/>",
        config.background
    ));
    svg.push_str("<defs>");
    svg.push_str(&format!(
        "<marker id=\"arrow\" viewBox=\"0 0 10 10\" refX=\"10\" refY=\"5\" markerWidth=\"6\" markerHeight=\"6\" orient=\"auto-start-reverse\"><path d=\"M 0 0 L 10 5 L 0 10 z\" fill=\"{}\"/></marker>",
        config.line_color
    ));
    svg.push_str("</defs>");

    let mut groups: Vec<&BoxPrimitive> = scene.groups.iter().collect();
    groups.sort_by_key(|group| group.depth);
    for group in groups {
        let g = &group.geometry;
        let dash = if group.style.as_deref() == Some("dashed") {
            " stroke-dasharray=\"6 4\""
        } else {
            ""
        };
        svg.push_str(&format!(
            "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"10\" ry=\"10\" fill=\"{}\" stroke=\"{}\" stroke-width=\"1.2\"{dash}/>",
            g.x, g.y, g.width, g.height, config.group_fill, config.group_stroke
        ));
        svg.push_str(&format!(
            "<text x=\"{:.2}\" y=\"{:.2}\" font-family=\"{}\" font-size=\"{}\" font-weight=\"600\" fill=\"{}\">{}</text>",
            g.x + 12.0,
            g.y + config.font_size + 8.0,
            config.font_family,
            config.font_size,
            config.text_color,
            escape_xml(&group.label)
        ));
    }

    for edge in &scene.edges {
        svg.push_str(&format!(
            "<path d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"1.4\" marker-end=\"url(#arrow)\"/>",
            points_to_path(&edge.points),
            config.line_color
        ));
        if let Some(label) = edge.label.as_deref().filter(|label| !label.trim().is_empty()) {
            let mid = path_midpoint(&edge.points);
            svg.push_str(&format!(
                "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\" font-family=\"{}\" font-size=\"{}\" fill=\"{}\">{}</text>",
                mid.x,
                mid.y - 4.0,
                config.font_family,
                config.font_size * 0.9,
                config.text_color,
                escape_xml(label)
            ));
        }
    }

    for leaf in &scene.leaves {
        let g = &leaf.geometry;
        svg.push_str(&format!(
            "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"8\" ry=\"8\" fill=\"{}\" stroke=\"{}\" stroke-width=\"1.4\"/>",
            g.x, g.y, g.width, g.height, config.node_fill, config.node_stroke
        ));
        let center = g.center();
        svg.push_str(&format!(
            "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\" dominant-baseline=\"central\" font-family=\"{}\" font-size=\"{}\" fill=\"{}\">{}</text>",
            center.x,
            center.y,
            config.font_family,
            config.font_size,
            config.text_color,
            escape_xml(&leaf.label)
        ));
    }

    svg.push_str("</svg>");
    svg
}

/// Convenience for callers holding a graph and view.
pub fn render_graph_svg(graph: &DomainGraph, view: &ViewState, config: &RenderConfig) -> String {
    render_svg(&RenderScene::build(graph, view), config)
}

fn points_to_path(points: &[Point]) -> String {
    if points.is_empty() {
        return String::new();
    }
    let mut d = String::new();
    d.push_str(&format!("M {:.2} {:.2}", points[0].x, points[0].y));
    for point in points.iter().skip(1) {
        d.push_str(&format!(" L {:.2} {:.2}", point.x, point.y));
    }
    d
}

fn path_midpoint(points: &[Point]) -> Point {
    match points {
        [] => Point::default(),
        [only] => *only,
        _ if points.len() % 2 == 0 => {
            let a = points[points.len() / 2 - 1];
            let b = points[points.len() / 2];
            Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
        }
        _ => points[points.len() / 2],
    }
}

pub fn write_output_svg(svg: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, svg)?;
        }
        None => {
            print!("{}", svg);
        }
    }
    Ok(())
}

#[cfg(feature = "png")]
pub fn write_output_png(svg: &str, output: &Path, render_cfg: &RenderConfig) -> Result<()> {
    let mut opt = usvg::Options::default();
    opt.font_family = "Inter".to_string();
    opt.default_size = usvg::Size::from_wh(render_cfg.width, render_cfg.height)
        .or_else(|| usvg::Size::from_wh(800.0, 600.0))
        .ok_or_else(|| anyhow::anyhow!("invalid render size"))?;

    let tree = usvg::Tree::from_str(svg, &opt)?;
    let size = tree.size().to_int_size();
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| anyhow::anyhow!("Failed to allocate pixmap"))?;

    let mut pixmap_mut = pixmap.as_mut();
    resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap_mut);
    pixmap.save_png(output)?;
    Ok(())
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Edge;
    use crate::view_state::EdgeRoute;

    fn sample() -> (DomainGraph, ViewState) {
        let mut group = GraphNode::group("g", Some("Back & end".into()));
        group.children.push(GraphNode::leaf("api", Some("API".into())));
        group.children.push(GraphNode::leaf("db", Some("<db>".into())));
        group.edges.push(Edge::new("e1", "api", "db"));
        let mut graph = DomainGraph::new();
        graph.root.children.push(group);
        graph.root.children.push(GraphNode::leaf("ghost", None));

        let mut view = ViewState::new();
        view.groups
            .insert("g".into(), GeometryRecord::new(0.0, 0.0, 300.0, 200.0));
        view.leaves
            .insert("api".into(), GeometryRecord::new(20.0, 40.0, 120.0, 48.0));
        view.leaves
            .insert("db".into(), GeometryRecord::new(20.0, 120.0, 120.0, 48.0));
        (graph, view)
    }

    #[test]
    fn scene_skips_entities_without_geometry() {
        let (graph, view) = sample();
        let scene = RenderScene::build(&graph, &view);
        assert_eq!(scene.groups.len(), 1);
        assert_eq!(scene.leaves.len(), 2);
        assert!(scene.leaves.iter().all(|leaf| leaf.id != "ghost"));
        assert_eq!(
            scene.edges[0].points,
            vec![Point::new(80.0, 64.0), Point::new(80.0, 144.0)]
        );
    }

    #[test]
    fn cached_route_wins_over_centres() {
        let (graph, mut view) = sample();
        let route = vec![Point::new(1.0, 1.0), Point::new(2.0, 5.0), Point::new(3.0, 3.0)];
        view.edges.insert(
            "e1".into(),
            EdgeRoute {
                waypoints: Some(route.clone()),
                ..Default::default()
            },
        );
        let scene = RenderScene::build(&graph, &view);
        assert_eq!(scene.edges[0].points, route);
    }

    #[test]
    fn render_svg_escapes_labels() {
        let (graph, view) = sample();
        let svg = render_graph_svg(&graph, &view, &RenderConfig::default());
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("Back &amp; end"));
        assert!(svg.contains("&lt;db&gt;"));
        assert!(svg.contains("M 80.00 64.00 L 80.00 144.00"));
    }

    #[test]
    fn large_drawings_shrink_to_the_configured_size() {
        let (graph, mut view) = sample();
        view.groups
            .insert("g".into(), GeometryRecord::new(0.0, 0.0, 2952.0, 200.0));
        let config = RenderConfig {
            width: 1000.0,
            ..RenderConfig::default()
        };
        let svg = render_graph_svg(&graph, &view, &config);
        assert!(svg.contains("width=\"1000.00\" height=\"82.67\""));
        assert!(svg.contains("viewBox=\"-24.00 -24.00 3000.00 248.00\""));

        let defaults = render_graph_svg(&graph, &view, &RenderConfig::default());
        assert!(defaults.contains("viewBox=\"-24.00 -24.00 3000.00 248.00\""));
        assert!(defaults.contains("width=\"1200.00\" height=\"99.20\""));
    }

    #[test]
    fn empty_scene_still_renders() {
        let svg = render_graph_svg(&DomainGraph::new(), &ViewState::new(), &RenderConfig::default());
        assert!(svg.ends_with("</svg>"));
    }
}
