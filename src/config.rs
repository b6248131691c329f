use crate::layout::{LayoutOptions, Spacing};
use crate::sizing::SizingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Largest displayed size; bigger drawings are scaled down to fit.
    pub width: f32,
    pub height: f32,
    pub padding: f32,
    pub background: String,
    pub font_family: String,
    pub font_size: f32,
    pub text_color: String,
    pub node_fill: String,
    pub node_stroke: String,
    pub group_fill: String,
    pub group_stroke: String,
    pub line_color: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1200.0,
            height: 800.0,
            padding: 24.0,
            background: "#FFFFFF".to_string(),
            font_family: "Inter, Segoe UI, system-ui, -apple-system, sans-serif".to_string(),
            font_size: 13.0,
            text_color: "#1F2937".to_string(),
            node_fill: "#F8FAFC".to_string(),
            node_stroke: "#64748B".to_string(),
            group_fill: "#EEF2FF".to_string(),
            group_stroke: "#A5B4FC".to_string(),
            line_color: "#475569".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub layout: LayoutOptions,
    pub sizing: SizingConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpacingFile {
    node_node: Option<f32>,
    node_node_between_layers: Option<f32>,
    edge_node: Option<f32>,
    edge_node_between_layers: Option<f32>,
    edge_edge: Option<f32>,
    edge_edge_between_layers: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutFile {
    spacing: Option<SpacingFile>,
    direction: Option<String>,
    hierarchy_handling: Option<crate::layout::HierarchyHandling>,
    cycle_breaking: Option<crate::layout::CycleBreaking>,
    group_padding: Option<f32>,
    group_header: Option<f32>,
    margin: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SizingFile {
    font_family: Option<String>,
    font_size: Option<f32>,
    padding_x: Option<f32>,
    padding_y: Option<f32>,
    min_width: Option<f32>,
    min_height: Option<f32>,
    max_width: Option<f32>,
    line_height: Option<f32>,
    group_min_width: Option<f32>,
    group_min_height: Option<f32>,
    cascade_offset: Option<f32>,
    system_fonts: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderFile {
    width: Option<f32>,
    height: Option<f32>,
    padding: Option<f32>,
    background: Option<String>,
    font_family: Option<String>,
    font_size: Option<f32>,
    text_color: Option<String>,
    node_fill: Option<String>,
    node_stroke: Option<String>,
    group_fill: Option<String>,
    group_stroke: Option<String>,
    line_color: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    layout: Option<LayoutFile>,
    sizing: Option<SizingFile>,
    render: Option<RenderFile>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parses a JSON5 config document and overlays it onto the defaults.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let parsed: ConfigFile = json5::from_str(contents)?;

    if let Some(layout) = parsed.layout {
        apply_layout(&mut config.layout, layout)?;
    }
    if let Some(sizing) = parsed.sizing {
        apply_sizing(&mut config.sizing, sizing);
    }
    if let Some(render) = parsed.render {
        apply_render(&mut config.render, render);
    }
    Ok(config)
}

fn apply_layout(options: &mut LayoutOptions, file: LayoutFile) -> anyhow::Result<()> {
    if let Some(spacing) = file.spacing {
        apply_spacing(&mut options.spacing, spacing);
    }
    if let Some(direction) = file.direction {
        options.direction = crate::layout::Direction::from_token(&direction)
            .ok_or_else(|| anyhow::anyhow!("unknown layout direction: {direction}"))?;
    }
    if let Some(v) = file.hierarchy_handling {
        options.hierarchy_handling = v;
    }
    if let Some(v) = file.cycle_breaking {
        options.cycle_breaking = v;
    }
    if let Some(v) = file.group_padding {
        options.group_padding = v;
    }
    if let Some(v) = file.group_header {
        options.group_header = v;
    }
    if let Some(v) = file.margin {
        options.margin = v;
    }
    Ok(())
}

fn apply_spacing(spacing: &mut Spacing, file: SpacingFile) {
    if let Some(v) = file.node_node {
        spacing.node_node = v;
    }
    if let Some(v) = file.node_node_between_layers {
        spacing.node_node_between_layers = v;
    }
    if let Some(v) = file.edge_node {
        spacing.edge_node = v;
    }
    if let Some(v) = file.edge_node_between_layers {
        spacing.edge_node_between_layers = v;
    }
    if let Some(v) = file.edge_edge {
        spacing.edge_edge = v;
    }
    if let Some(v) = file.edge_edge_between_layers {
        spacing.edge_edge_between_layers = v;
    }
}

fn apply_sizing(sizing: &mut SizingConfig, file: SizingFile) {
    if let Some(v) = file.font_family {
        sizing.font_family = v;
    }
    if let Some(v) = file.font_size {
        sizing.font_size = v;
    }
    if let Some(v) = file.padding_x {
        sizing.padding_x = v;
    }
    if let Some(v) = file.padding_y {
        sizing.padding_y = v;
    }
    if let Some(v) = file.min_width {
        sizing.min_width = v;
    }
    if let Some(v) = file.min_height {
        sizing.min_height = v;
    }
    if let Some(v) = file.max_width {
        sizing.max_width = v;
    }
    if let Some(v) = file.line_height {
        sizing.line_height = v;
    }
    if let Some(v) = file.group_min_width {
        sizing.group_min_width = v;
    }
    if let Some(v) = file.group_min_height {
        sizing.group_min_height = v;
    }
    if let Some(v) = file.cascade_offset {
        sizing.cascade_offset = v;
    }
    if let Some(v) = file.system_fonts {
        sizing.system_fonts = v;
    }
}

fn apply_render(render: &mut RenderConfig, file: RenderFile) {
    if let Some(v) = file.width {
        render.width = v;
    }
    if let Some(v) = file.height {
        render.height = v;
    }
    if let Some(v) = file.padding {
        render.padding = v;
    }
    if let Some(v) = file.background {
        render.background = v;
    }
    if let Some(v) = file.font_family {
        render.font_family = v;
    }
    if let Some(v) = file.font_size {
        render.font_size = v;
    }
    if let Some(v) = file.text_color {
        render.text_color = v;
    }
    if let Some(v) = file.node_fill {
        render.node_fill = v;
    }
    if let Some(v) = file.node_stroke {
        render.node_stroke = v;
    }
    if let Some(v) = file.group_fill {
        render.group_fill = v;
    }
    if let Some(v) = file.group_stroke {
        render.group_stroke = v;
    }
    if let Some(v) = file.line_color {
        render.line_color = v;
    }
}
