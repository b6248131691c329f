//! When the automatic layout engine runs.
//!
//! Evaluated per edit and never cached: provenance and the scope's current
//! mode decide, nothing else.

use serde::{Deserialize, Serialize};

use crate::ancestry::{
    enclosing_group, find_common_ancestor, find_lcg, find_node, find_parent, is_descendant,
};
use crate::ir::{DomainGraph, ROOT_ID};
use crate::view_state::{LayoutMode, Resync, ViewState};

/// Where an edit came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Generated structure (imports, generators, "tidy up").
    AutoGenerated,
    /// A person touched the canvas or the tree.
    #[default]
    DirectManipulation,
}

impl Provenance {
    /// Parses a host-supplied hint. Anything unrecognised counts as direct
    /// manipulation.
    pub fn from_hint(hint: Option<&str>) -> Self {
        match hint.map(|h| h.trim().to_ascii_lowercase()) {
            Some(h) if matches!(h.as_str(), "auto" | "auto_generated" | "autogenerated" | "generated") => {
                Self::AutoGenerated
            }
            _ => Self::DirectManipulation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutDecision {
    Run { scope: String, resync: Resync },
    Skip,
}

impl LayoutDecision {
    pub fn should_run(&self) -> bool {
        matches!(self, Self::Run { .. })
    }
}

pub fn decide(provenance: Provenance, scope: &str, mode: LayoutMode) -> LayoutDecision {
    let decision = match (provenance, mode) {
        (Provenance::AutoGenerated, _) | (Provenance::DirectManipulation, LayoutMode::Lock) => {
            LayoutDecision::Run {
                scope: scope.to_string(),
                resync: Resync::Scope,
            }
        }
        (Provenance::DirectManipulation, LayoutMode::Free) => LayoutDecision::Skip,
    };
    tracing::debug!(?provenance, scope, ?mode, run = decision.should_run(), "layout decision");
    decision
}

/// FREE to LOCK snaps the scope to the engine once; every other transition
/// leaves the current geometry alone.
pub fn decide_mode_change(scope: &str, from: LayoutMode, to: LayoutMode) -> LayoutDecision {
    match (from, to) {
        (LayoutMode::Free, LayoutMode::Lock) => LayoutDecision::Run {
            scope: scope.to_string(),
            resync: Resync::Scope,
        },
        _ => LayoutDecision::Skip,
    }
}

/// Nearest group enclosing everything an edit touched.
///
/// Ids still in `after` are resolved there. Ids that vanished (deletions) fall
/// back to their former parent in `before`, provided that parent survived.
/// `containers` are groups whose contents changed, such as the group a moved
/// node left; the scope always encloses them too.
pub fn edit_scope(
    before: &DomainGraph,
    after: &DomainGraph,
    touched: &[String],
    containers: &[String],
) -> String {
    let mut present = Vec::new();
    let mut scopes = Vec::new();
    for id in touched {
        if after.contains_node(id) {
            present.push(id.as_str());
        } else if let Some(parent) = find_parent(&before.root, id)
            && after.contains_node(&parent.id)
        {
            scopes.push(parent.id.clone());
        }
    }

    if !present.is_empty() {
        scopes.push(find_lcg(&after.root, &present).unwrap_or_else(|| ROOT_ID.to_string()));
    }
    scopes.extend(containers.iter().filter_map(|id| resolve_container(after, id)));

    let mut scope: Option<String> = None;
    for container in scopes {
        scope = Some(match scope {
            None => container,
            Some(current) => find_common_ancestor(&after.root, &current, &container)
                .unwrap_or_else(|| ROOT_ID.to_string()),
        });
    }
    let scope = scope.unwrap_or_else(|| ROOT_ID.to_string());
    // A container emptied by a deletion is no longer a group.
    match find_node(&after.root, &scope) {
        Some(node) if !node.is_group() => enclosing_group(&after.root, &scope),
        _ => scope,
    }
}

/// Scopes one edit re-runs layout for, outermost only.
///
/// The edit scope is decided first. Every changed container is then decided on
/// its own mode, so a LOCK group that lost a child or an edge is re-laid out
/// even when the enclosing scope is FREE.
pub fn edit_runs(
    provenance: Provenance,
    graph: &DomainGraph,
    view: &ViewState,
    scope: &str,
    containers: &[String],
) -> Vec<String> {
    let mut runs: Vec<String> = Vec::new();
    let candidates = std::iter::once(scope.to_string())
        .chain(containers.iter().filter_map(|id| resolve_container(graph, id)));
    for candidate in candidates {
        if runs.contains(&candidate) {
            continue;
        }
        if decide(provenance, &candidate, view.layout_mode(&candidate)).should_run() {
            runs.push(candidate);
        }
    }
    runs.iter()
        .filter(|id| !runs.iter().any(|outer| is_descendant(&graph.root, outer, id)))
        .cloned()
        .collect()
}

/// The group at or above `id`. `None` once `id` left the graph.
fn resolve_container(graph: &DomainGraph, id: &str) -> Option<String> {
    let node = find_node(&graph.root, id)?;
    if node.is_group() {
        Some(node.id.clone())
    } else {
        Some(enclosing_group(&graph.root, id))
    }
}
