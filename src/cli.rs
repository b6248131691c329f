use crate::config::{Config, load_config};
use crate::editor::{Edit, Editor};
use crate::ir::{DomainGraph, ROOT_ID};
use crate::layout::{DagreEngine, Direction};
use crate::mutation::parse_operations;
use crate::policy::Provenance;
use crate::render::{RenderScene, render_svg, write_output_svg};
use crate::view_state::ViewState;
use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "archgraph", version, about = "Hierarchical architecture graph editor core")]
pub struct Args {
    /// Config JSON5 file (layout, sizing and render settings)
    #[arg(short = 'c', long = "configFile", global = true)]
    pub config: Option<PathBuf>,

    /// Layout direction override (DOWN, RIGHT, UP, LEFT)
    #[arg(short = 'd', long = "direction", global = true)]
    pub direction: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply a batch of operations to a graph
    Apply(ApplyArgs),
    /// Print the structural hash of a graph
    Hash(GraphInput),
    /// Run automatic layout and write the resulting view state
    Layout(LayoutArgs),
    /// Render a graph and its view state
    Render(RenderArgs),
    /// Check a graph document against every structural invariant
    Validate(GraphInput),
}

#[derive(ClapArgs, Debug)]
pub struct GraphInput {
    /// Graph JSON file or '-' for stdin
    #[arg(short = 'g', long = "graph")]
    pub graph: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub input: GraphInput,

    /// View state JSON file
    #[arg(short = 'v', long = "view")]
    pub view: Option<PathBuf>,

    /// Operations JSON file (array of tagged operations)
    #[arg(long = "ops")]
    pub ops: PathBuf,

    /// Where the edit came from: "auto" or "direct"
    #[arg(short = 'p', long = "provenance")]
    pub provenance: Option<String>,

    /// Output graph file. Defaults to stdout.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output view state file
    #[arg(long = "viewOutput")]
    pub view_output: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct LayoutArgs {
    #[command(flatten)]
    pub input: GraphInput,

    #[arg(short = 'v', long = "view")]
    pub view: Option<PathBuf>,

    /// Group to lay out
    #[arg(short = 's', long = "scope", default_value = ROOT_ID)]
    pub scope: String,

    /// Output view state file. Defaults to stdout.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct RenderArgs {
    #[command(flatten)]
    pub input: GraphInput,

    /// View state JSON file. Without one the graph is laid out first.
    #[arg(short = 'v', long = "view")]
    pub view: Option<PathBuf>,

    /// Output file (svg/png). Defaults to stdout for SVG if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'e', long = "outputFormat", value_enum, default_value = "svg")]
    pub output_format: OutputFormat,

    /// Width
    #[arg(short = 'w', long = "width")]
    pub width: Option<f32>,

    /// Height
    #[arg(short = 'H', long = "height")]
    pub height: Option<f32>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Svg,
    Png,
}

pub fn run() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    if let Some(direction) = args.direction.as_deref() {
        config.layout.direction = Direction::from_token(direction)
            .ok_or_else(|| anyhow::anyhow!("unknown layout direction: {direction}"))?;
    }

    match args.command {
        Command::Apply(cmd) => run_apply(cmd, config),
        Command::Hash(input) => {
            let graph = read_graph(input.graph.as_deref())?;
            println!("{}", crate::hash::structural_hash(&graph));
            Ok(())
        }
        Command::Layout(cmd) => run_layout(cmd, config),
        Command::Render(cmd) => run_render(cmd, config),
        Command::Validate(input) => {
            let graph = read_graph(input.graph.as_deref())?;
            println!(
                "ok: {} nodes, {} edges, hash {}",
                graph.node_count(),
                graph.edge_count(),
                crate::hash::structural_hash(&graph)
            );
            Ok(())
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .try_init();
}

fn run_apply(cmd: ApplyArgs, config: Config) -> Result<()> {
    let graph = read_graph(cmd.input.graph.as_deref())?;
    let view = read_view(cmd.view.as_deref())?;
    let ops_text = std::fs::read_to_string(&cmd.ops)
        .with_context(|| format!("reading operations from {}", cmd.ops.display()))?;
    let operations = parse_operations(&ops_text)?;
    let provenance = Provenance::from_hint(cmd.provenance.as_deref());

    let mut editor = Editor::from_parts(graph, view, DagreEngine, config);
    let outcome = editor.apply_and_layout(Edit::mutate(provenance, operations))?;
    tracing::info!(scope = %outcome.scope, runs = outcome.layouts.len(), "applied operations");

    let (graph, view) = editor.into_parts();
    write_text(&graph.to_json_pretty()?, cmd.output.as_deref())?;
    if let Some(path) = cmd.view_output.as_deref() {
        write_text(&serde_json::to_string_pretty(&view)?, Some(path))?;
    }
    Ok(())
}

fn run_layout(cmd: LayoutArgs, config: Config) -> Result<()> {
    let graph = read_graph(cmd.input.graph.as_deref())?;
    let view = read_view(cmd.view.as_deref())?;
    let view = layout_view(graph, view, config, &cmd.scope)?.1;
    write_text(&serde_json::to_string_pretty(&view)?, cmd.output.as_deref())
}

fn run_render(cmd: RenderArgs, mut config: Config) -> Result<()> {
    if let Some(width) = cmd.width {
        config.render.width = width;
    }
    if let Some(height) = cmd.height {
        config.render.height = height;
    }
    let graph = read_graph(cmd.input.graph.as_deref())?;
    let render = config.render.clone();
    let (graph, view) = match cmd.view.as_deref() {
        Some(path) => {
            let view = read_view(Some(path))?;
            (graph, view)
        }
        None => layout_view(graph, ViewState::new(), config, ROOT_ID)?,
    };
    let svg = render_svg(&RenderScene::build(&graph, &view), &render);
    match cmd.output_format {
        OutputFormat::Svg => write_output_svg(&svg, cmd.output.as_deref()),
        OutputFormat::Png => {
            let output = ensure_output(&cmd.output, "png")?;
            write_png(&svg, &output, &render)
        }
    }
}

#[cfg(feature = "png")]
fn write_png(svg: &str, output: &Path, render: &crate::config::RenderConfig) -> Result<()> {
    crate::render::write_output_png(svg, output, render)
}

#[cfg(not(feature = "png"))]
fn write_png(_svg: &str, _output: &Path, _render: &crate::config::RenderConfig) -> Result<()> {
    Err(anyhow::anyhow!("PNG output requires the `png` feature"))
}

fn layout_view(
    graph: DomainGraph,
    view: ViewState,
    config: Config,
    scope: &str,
) -> Result<(DomainGraph, ViewState)> {
    let mut editor = Editor::from_parts(graph, view, DagreEngine, config);
    let ticket = editor.request_layout(scope, Provenance::AutoGenerated)?;
    let result = editor.run(&ticket);
    editor.complete(ticket, result)?;
    Ok(editor.into_parts())
}

fn read_graph(path: Option<&Path>) -> Result<DomainGraph> {
    let text = read_input(path)?;
    Ok(DomainGraph::from_json(&text)?)
}

fn read_view(path: Option<&Path>) -> Result<ViewState> {
    let Some(path) = path else {
        return Ok(ViewState::new());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading view state from {}", path.display()))?;
    Ok(serde_json::from_str(&text)?)
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path
        && path != Path::new("-")
    {
        return std::fs::read_to_string(path)
            .with_context(|| format!("reading graph from {}", path.display()));
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn write_text(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, text)?,
        None => println!("{text}"),
    }
    Ok(())
}

fn ensure_output(output: &Option<PathBuf>, ext: &str) -> Result<PathBuf> {
    if let Some(path) = output {
        return Ok(path.clone());
    }
    Err(anyhow::anyhow!("Output path required for {} output", ext))
}
