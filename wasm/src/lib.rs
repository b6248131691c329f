use archgraph::config::Config;
use archgraph::layout::{Direction, LayoutOptions};
use archgraph::mutation::parse_operations;
use archgraph::render::render_graph_svg;
use archgraph::{DagreEngine, DomainGraph, Edit, Editor, Provenance, ROOT_ID, ViewState, structural_hash};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionOptions {
    provenance: Option<String>,
    view_state: Option<ViewState>,
    layout: Option<LayoutOptions>,
    direction: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApplyResult {
    graph: DomainGraph,
    view_state: ViewState,
    scope: String,
    laid_out: bool,
}

fn parse_options(options_json: Option<String>) -> Result<SessionOptions, String> {
    match options_json {
        Some(raw) => serde_json::from_str(&raw).map_err(|error| error.to_string()),
        None => Ok(SessionOptions::default()),
    }
}

fn build_config(options: &SessionOptions) -> Result<Config, String> {
    let mut config = Config::default();
    // Browsers expose no system font database; use the width estimate.
    config.sizing.system_fonts = false;
    if let Some(layout) = options.layout.clone() {
        config.layout = layout;
    }
    if let Some(direction) = options.direction.as_deref() {
        config.layout.direction = Direction::from_token(direction)
            .ok_or_else(|| format!("unknown layout direction: {direction}"))?;
    }
    Ok(config)
}

fn apply_operations_impl(
    graph_json: &str,
    ops_json: &str,
    options_json: Option<String>,
) -> Result<String, String> {
    let options = parse_options(options_json)?;
    let config = build_config(&options)?;
    let graph = DomainGraph::from_json(graph_json).map_err(|error| error.to_string())?;
    let operations = parse_operations(ops_json).map_err(|error| error.to_string())?;
    let provenance = Provenance::from_hint(options.provenance.as_deref());

    let view = options.view_state.unwrap_or_default();
    let mut editor = Editor::from_parts(graph, view, DagreEngine, config);
    let outcome = editor
        .apply_and_layout(Edit::mutate(provenance, operations))
        .map_err(|error| error.to_string())?;
    let (graph, view_state) = editor.into_parts();
    serde_json::to_string(&ApplyResult {
        graph,
        view_state,
        scope: outcome.scope,
        laid_out: !outcome.layouts.is_empty(),
    })
    .map_err(|error| error.to_string())
}

fn layout_graph_impl(graph_json: &str, options_json: Option<String>) -> Result<String, String> {
    let options = parse_options(options_json)?;
    let config = build_config(&options)?;
    let graph = DomainGraph::from_json(graph_json).map_err(|error| error.to_string())?;
    let scope = options.scope.clone().unwrap_or_else(|| ROOT_ID.to_string());
    let view = options.view_state.unwrap_or_default();

    let mut editor = Editor::from_parts(graph, view, DagreEngine, config);
    let ticket = editor
        .request_layout(&scope, Provenance::AutoGenerated)
        .map_err(|error| error.to_string())?;
    let result = editor.run(&ticket);
    editor
        .complete(ticket, result)
        .map_err(|error| error.to_string())?;
    serde_json::to_string(editor.view()).map_err(|error| error.to_string())
}

#[wasm_bindgen(js_name = applyOperations)]
pub fn apply_operations(
    graph_json: &str,
    ops_json: &str,
    options_json: Option<String>,
) -> Result<String, JsValue> {
    apply_operations_impl(graph_json, ops_json, options_json).map_err(|error| JsValue::from_str(&error))
}

#[wasm_bindgen(js_name = structuralHash)]
pub fn structural_hash_hex(graph_json: &str) -> Result<String, JsValue> {
    let graph = DomainGraph::from_json(graph_json).map_err(|error| JsValue::from_str(&error.to_string()))?;
    Ok(structural_hash(&graph).to_string())
}

#[wasm_bindgen(js_name = layoutGraph)]
pub fn layout_graph(graph_json: &str, options_json: Option<String>) -> Result<String, JsValue> {
    layout_graph_impl(graph_json, options_json).map_err(|error| JsValue::from_str(&error))
}

#[wasm_bindgen(js_name = renderSvg)]
pub fn render_svg(graph_json: &str, view_json: &str) -> Result<String, JsValue> {
    let graph = DomainGraph::from_json(graph_json).map_err(|error| JsValue::from_str(&error.to_string()))?;
    let view: ViewState =
        serde_json::from_str(view_json).map_err(|error| JsValue::from_str(&error.to_string()))?;
    Ok(render_graph_svg(&graph, &view, &Config::default().render))
}
