use std::path::Path;

use archgraph::ancestry::{find_lcg, find_node, find_parent};
use archgraph::config::Config;
use archgraph::layout::{HierarchyHandling, LayoutEngine, LayoutGraph};
use archgraph::mutation::{add_edge, add_node, delete_node, group_nodes, move_node, remove_group};
use archgraph::render::render_graph_svg;
use archgraph::sizing::SizingConfig;
use archgraph::{
    Conflict, DagreEngine, DomainGraph, Edit, EditError, Edge, Editor, EntityKind, GeometryRecord,
    LayoutMode, ManualUpdate, Operation, Provenance, ROOT_ID, ViewState, batch_update,
    structural_hash,
};

fn load_fixture(name: &str) -> DomainGraph {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    let input = std::fs::read_to_string(&path).expect("fixture read failed");
    DomainGraph::from_json(&input).expect("fixture is not a valid graph")
}

fn config() -> Config {
    Config {
        sizing: SizingConfig {
            system_fonts: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn owner_of(graph: &DomainGraph, edge: &str) -> String {
    graph.find_edge(edge).expect("edge missing").1.to_string()
}

fn parent_of(graph: &DomainGraph, id: &str) -> String {
    find_parent(&graph.root, id).expect("node missing").id.clone()
}

fn assert_inside(outer: &GeometryRecord, inner: &GeometryRecord, what: &str) {
    let eps = 0.01;
    assert!(
        inner.x >= outer.x - eps
            && inner.y >= outer.y - eps
            && inner.x + inner.width <= outer.x + outer.width + eps
            && inner.y + inner.height <= outer.y + outer.height + eps,
        "{what}: {inner:?} escapes {outer:?}"
    );
}

fn laid_out(graph: DomainGraph) -> Editor<DagreEngine> {
    let mut editor = Editor::from_parts(graph, ViewState::new(), DagreEngine, config());
    let ticket = editor
        .request_layout(ROOT_ID, Provenance::AutoGenerated)
        .expect("root is always a valid scope");
    let result = editor.run(&ticket);
    editor.complete(ticket, result).expect("layout failed");
    editor
}

#[test]
fn build_group_and_ungroup_keeps_edges_at_their_common_ancestor() {
    let graph = add_node(&DomainGraph::new(), "A", ROOT_ID, None).unwrap();
    let graph = add_node(&graph, "B", ROOT_ID, None).unwrap();
    let graph = add_edge(&graph, Edge::new("e1", "a", "b")).unwrap();
    assert_eq!(owner_of(&graph, "e1"), ROOT_ID);

    let grouped = group_nodes(&graph, &["a".into(), "b".into()], ROOT_ID, "G1", None).unwrap();
    assert_eq!(parent_of(&grouped, "a"), "G1");
    assert_eq!(owner_of(&grouped, "e1"), "G1");
    assert!(grouped.validate().is_ok());

    let ungrouped = remove_group(&grouped, "G1").unwrap();
    assert!(!ungrouped.contains_node("G1"));
    assert_eq!(parent_of(&ungrouped, "a"), ROOT_ID);
    assert_eq!(parent_of(&ungrouped, "b"), ROOT_ID);
    assert_eq!(owner_of(&ungrouped, "e1"), ROOT_ID);
    assert!(ungrouped.validate().is_ok());
}

#[test]
fn moving_a_group_into_its_own_subtree_is_rejected() {
    let graph = add_node(&DomainGraph::new(), "a", ROOT_ID, None).unwrap();
    let graph = group_nodes(&graph, &["a".into()], ROOT_ID, "g", None).unwrap();
    let before = graph.clone();

    let err = move_node(&graph, "g", "a").unwrap_err();
    assert_eq!(
        err,
        EditError::StructuralConflict(Conflict::Cycle {
            node: "g".into(),
            target: "a".into(),
        })
    );
    let err = move_node(&graph, "g", "g").unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(graph, before);
}

#[test]
fn fixture_loads_with_expected_ownership() {
    let graph = load_fixture("architecture.json");
    assert_eq!(graph.node_count(), 10);
    assert_eq!(graph.edge_count(), 5);
    assert_eq!(owner_of(&graph, "web_api"), ROOT_ID);
    assert_eq!(owner_of(&graph, "api_db"), "backend");
    assert_eq!(owner_of(&graph, "db_cache"), "data");
    assert_eq!(
        find_lcg(&graph.root, &["db", "auth"]).as_deref(),
        Some("backend")
    );
    assert_eq!(find_lcg(&graph.root, &["backend", "db"]).as_deref(), Some(ROOT_ID));
}

#[test]
fn moving_a_node_across_groups_reattaches_its_edges() {
    let graph = load_fixture("architecture.json");
    let moved = move_node(&graph, "db", "frontend").unwrap();
    assert_eq!(parent_of(&moved, "db"), "frontend");
    assert_eq!(owner_of(&moved, "api_db"), ROOT_ID);
    assert_eq!(owner_of(&moved, "db_cache"), ROOT_ID);
    assert_eq!(owner_of(&moved, "api_auth"), "backend");
    assert!(moved.validate().is_ok());
    assert_ne!(structural_hash(&moved), structural_hash(&graph));
}

#[test]
fn removing_a_nested_group_hoists_children_and_keeps_inner_edges() {
    let graph = load_fixture("architecture.json");
    let graph = remove_group(&graph, "backend").unwrap();
    for id in ["api", "auth", "data"] {
        assert_eq!(parent_of(&graph, id), ROOT_ID, "{id}");
    }
    assert_eq!(owner_of(&graph, "api_auth"), ROOT_ID);
    assert_eq!(owner_of(&graph, "api_db"), ROOT_ID);
    assert_eq!(owner_of(&graph, "db_cache"), "data");
    assert_eq!(graph.edge_count(), 5);
    assert!(graph.validate().is_ok());
}

#[test]
fn deleting_a_group_drops_its_subtree_and_touching_edges() {
    let graph = load_fixture("architecture.json");
    let graph = delete_node(&graph, "data").unwrap();
    for id in ["data", "db", "cache"] {
        assert!(!graph.contains_node(id), "{id}");
    }
    let mut edges: Vec<String> = graph.edge_ids().into_iter().collect();
    edges.sort();
    assert_eq!(edges, vec!["api_auth", "mobile_api", "web_api"]);
}

#[test]
fn remove_group_errors_are_typed() {
    let graph = load_fixture("architecture.json");
    assert_eq!(
        remove_group(&graph, ROOT_ID).unwrap_err(),
        Conflict::RootImmutable.into()
    );
    assert_eq!(
        remove_group(&graph, "api").unwrap_err(),
        Conflict::NotAGroup("api".into()).into()
    );
    assert_eq!(
        remove_group(&graph, "nope").unwrap_err(),
        EditError::not_found(EntityKind::Group, "nope")
    );
}

#[test]
fn failing_batch_reports_original_index_and_changes_nothing() {
    let graph = load_fixture("architecture.json");
    let ops = vec![
        Operation::MoveNode {
            node_id: "cache".into(),
            new_parent_id: "frontend".into(),
        },
        Operation::AddNode {
            name: "Queue".into(),
            parent_id: "backend".into(),
            data: None,
        },
        Operation::DeleteEdge {
            edge_id: "missing".into(),
        },
    ];
    let err = batch_update(&graph, &ops).unwrap_err();
    match &err {
        EditError::Batch { index, op, .. } => {
            assert_eq!(*index, 2);
            assert_eq!(op, "delete_edge");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_not_found());
    assert!(!graph.contains_node("queue"));
    assert_eq!(parent_of(&graph, "cache"), "data");
}

#[test]
fn full_layout_places_every_entity_inside_its_group() {
    let graph = load_fixture("architecture.json");
    let editor = laid_out(graph.clone());
    let view = editor.view();

    graph.root.walk(&mut |node| {
        let own = view
            .geometry(&node.id)
            .unwrap_or_else(|| panic!("{} has no geometry", node.id));
        for child in &node.children {
            let inner = view.geometry(&child.id).expect("child geometry");
            assert_inside(own, inner, &child.id);
        }
    });
    for edge in graph.edge_ids() {
        let route = view.edge_route(&edge).expect("edge route");
        assert!(route.waypoints.as_ref().is_some_and(|points| points.len() >= 2));
    }
}

#[test]
fn scoped_layout_leaves_siblings_alone() {
    let editor = laid_out(load_fixture("architecture.json"));
    let (graph, view) = editor.into_parts();
    let frontend = view.geometry("frontend").copied().unwrap();
    let web = view.geometry("web").copied().unwrap();
    let data_origin = view.geometry("data").unwrap().origin();

    let mut editor = Editor::from_parts(graph, view, DagreEngine, config());
    let ticket = editor.request_layout("data", Provenance::AutoGenerated).unwrap();
    assert_eq!(ticket.input.node_count(), 3);
    let result = editor.run(&ticket);
    let report = editor.complete(ticket, result).unwrap();
    assert_eq!(report.scope, "data");

    let view = editor.view();
    assert_eq!(view.geometry("frontend"), Some(&frontend));
    assert_eq!(view.geometry("web"), Some(&web));
    let data = view.geometry("data").unwrap();
    assert_eq!(data.origin(), data_origin);
    assert_inside(data, view.geometry("db").unwrap(), "db");
    assert_inside(data, view.geometry("cache").unwrap(), "cache");
}

#[test]
fn layout_input_rejects_leaf_scope() {
    let graph = load_fixture("architecture.json");
    let err = LayoutGraph::from_domain(
        &graph,
        "api",
        &config().layout,
        &ViewState::new(),
        &config().sizing,
    )
    .unwrap_err();
    assert_eq!(err, Conflict::NotAGroup("api".into()).into());
}

#[test]
fn separate_children_still_produces_valid_output() {
    let graph = load_fixture("architecture.json");
    let mut config = config();
    config.layout.hierarchy_handling = HierarchyHandling::SeparateChildren;
    let input = LayoutGraph::from_domain(
        &graph,
        ROOT_ID,
        &config.layout,
        &ViewState::new(),
        &config.sizing,
    )
    .unwrap();
    let output = DagreEngine.layout(&input).unwrap();
    assert!(archgraph::layout::validate_output(&input, &output).is_ok());
}

#[test]
fn drag_in_free_group_skips_layout_and_in_lock_group_relayouts() {
    let mut editor = laid_out(load_fixture("architecture.json"));
    let before = editor.view().clone();
    let moved = before.geometry("auth").unwrap().translated(40.0, 0.0);

    let outcome = editor
        .apply(Edit::manipulate(vec![ManualUpdate::Node {
            id: "auth".into(),
            geometry: moved,
        }]))
        .unwrap();
    assert!(outcome.tickets.is_empty());
    assert_eq!(outcome.changed, vec!["auth".to_string()]);
    assert_eq!(editor.view().geometry("auth"), Some(&moved));
    assert_eq!(editor.view().geometry("api"), before.geometry("api"));

    editor
        .apply_and_layout(Edit::set_layout_mode("backend", LayoutMode::Lock))
        .unwrap();
    assert_eq!(editor.view().layout_mode("backend"), LayoutMode::Lock);
    let outcome = editor
        .apply(Edit::manipulate(vec![ManualUpdate::Node {
            id: "api".into(),
            geometry: GeometryRecord::new(-500.0, -500.0, 120.0, 48.0),
        }]))
        .unwrap();
    let scopes: Vec<&str> = outcome.tickets.iter().map(|t| t.scope.as_str()).collect();
    assert_eq!(scopes, vec!["backend"]);
}

fn locked(group: &str) -> Editor<DagreEngine> {
    let mut editor = laid_out(load_fixture("architecture.json"));
    editor
        .apply_and_layout(Edit::set_layout_mode(group, LayoutMode::Lock))
        .unwrap();
    editor
}

#[test]
fn deleting_an_edge_inside_a_locked_group_relayouts_that_group() {
    let mut editor = locked("data");
    let outcome = editor
        .apply(Edit::mutate(
            Provenance::DirectManipulation,
            vec![Operation::DeleteEdge {
                edge_id: "db_cache".into(),
            }],
        ))
        .unwrap();
    assert_eq!(outcome.scope, "data");
    let scopes: Vec<&str> = outcome.tickets.iter().map(|t| t.scope.as_str()).collect();
    assert_eq!(scopes, vec!["data"]);
}

#[test]
fn moving_a_node_out_of_a_locked_group_relayouts_the_group_it_left() {
    let mut editor = locked("data");
    let outcome = editor
        .apply_and_layout(Edit::mutate(
            Provenance::DirectManipulation,
            vec![Operation::MoveNode {
                node_id: "cache".into(),
                new_parent_id: ROOT_ID.into(),
            }],
        ))
        .unwrap();
    assert_eq!(outcome.scope, ROOT_ID);
    let scopes: Vec<&str> = outcome.layouts.iter().map(|r| r.scope.as_str()).collect();
    assert_eq!(scopes, vec!["data"]);
    assert_eq!(editor.in_flight("data"), None);

    let view = editor.view();
    assert_inside(view.geometry("data").unwrap(), view.geometry("db").unwrap(), "db");
    assert!(view.geometry("cache").is_some());
}

#[test]
fn moves_between_free_groups_stay_manual() {
    let mut editor = laid_out(load_fixture("architecture.json"));
    let outcome = editor
        .apply(Edit::mutate(
            Provenance::DirectManipulation,
            vec![Operation::MoveNode {
                node_id: "auth".into(),
                new_parent_id: "frontend".into(),
            }],
        ))
        .unwrap();
    assert_eq!(outcome.scope, ROOT_ID);
    assert!(outcome.tickets.is_empty());
}

#[test]
fn generated_import_lays_out_in_one_call() {
    let mut editor = Editor::with_config(DagreEngine, config());
    let ops = vec![
        Operation::AddEdge {
            edge_id: "lb_app".into(),
            source_id: "lb".into(),
            target_id: "app".into(),
            label: None,
            source_handle: None,
            target_handle: None,
        },
        Operation::GroupNodes {
            node_ids: vec!["app".into(), "worker".into()],
            parent_id: ROOT_ID.into(),
            group_id: "cluster".into(),
            style: Some("dashed".into()),
        },
        Operation::AddNode {
            name: "LB".into(),
            parent_id: ROOT_ID.into(),
            data: None,
        },
        Operation::AddNode {
            name: "App".into(),
            parent_id: ROOT_ID.into(),
            data: None,
        },
        Operation::AddNode {
            name: "Worker".into(),
            parent_id: ROOT_ID.into(),
            data: None,
        },
    ];
    let outcome = editor
        .apply_and_layout(Edit::mutate(Provenance::AutoGenerated, ops))
        .unwrap();
    assert_eq!(outcome.scope, ROOT_ID);
    assert_eq!(outcome.layouts.len(), 1);
    let graph = editor.graph();
    assert_eq!(parent_of(graph, "app"), "cluster");
    assert_eq!(owner_of(graph, "lb_app"), ROOT_ID);
    assert_eq!(
        find_node(&graph.root, "cluster").unwrap().data.style.as_deref(),
        Some("dashed")
    );
    for id in ["lb", "app", "worker", "cluster"] {
        assert!(editor.view().geometry(id).is_some(), "{id}");
    }
}

#[test]
fn renders_labels_from_laid_out_fixture() {
    let editor = laid_out(load_fixture("architecture.json"));
    let svg = render_graph_svg(editor.graph(), editor.view(), &config().render);
    assert!(svg.contains("<svg"));
    assert!(svg.contains("</svg>"));
    assert!(svg.contains("API Gateway"));
    assert!(svg.contains("Backend"));
}

#[test]
fn json_round_trip_preserves_structure_hash() {
    let graph = load_fixture("architecture.json");
    let text = graph.to_json_pretty().unwrap();
    let reloaded = DomainGraph::from_json(&text).unwrap();
    assert_eq!(reloaded, graph);
    assert_eq!(structural_hash(&reloaded), structural_hash(&graph));
}
