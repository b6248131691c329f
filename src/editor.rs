//! Editing session: owns the current graph and geometry cache, applies edits,
//! and coordinates single-flight layout runs per scope.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::ancestry::find_node;
use crate::config::Config;
use crate::error::{Conflict, EditError, EntityKind, Error};
use crate::hash::{StructuralHash, structural_hash};
use crate::ir::{DomainGraph, ROOT_ID};
use crate::layout::{LayoutEngine, LayoutError, LayoutGraph, LayoutOutput, validate_output};
use crate::mutation::{Operation, batch_update};
use crate::policy::{
    LayoutDecision, Provenance, decide, decide_mode_change, edit_runs, edit_scope,
};
use crate::view_state::{
    LayoutMode, ManualUpdate, MergeReport, Point, Resync, ViewState, extract_layout,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    /// Structural operations, applied as one batch.
    Mutate { operations: Vec<Operation> },
    /// Geometry written by hand.
    Manipulate { updates: Vec<ManualUpdate> },
    SetLayoutMode { group_id: String, mode: LayoutMode },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edit {
    #[serde(default)]
    pub provenance: Provenance,
    pub change: Change,
}

impl Edit {
    pub fn mutate(provenance: Provenance, operations: Vec<Operation>) -> Self {
        Self {
            provenance,
            change: Change::Mutate { operations },
        }
    }

    pub fn manipulate(updates: Vec<ManualUpdate>) -> Self {
        Self {
            provenance: Provenance::DirectManipulation,
            change: Change::Manipulate { updates },
        }
    }

    pub fn set_layout_mode(group_id: &str, mode: LayoutMode) -> Self {
        Self {
            provenance: Provenance::DirectManipulation,
            change: Change::SetLayoutMode {
                group_id: group_id.to_string(),
                mode,
            },
        }
    }
}

/// Handle for one in-flight run. Owns its input so the engine call can move to
/// another thread.
#[derive(Debug, Clone)]
pub struct LayoutTicket {
    pub scope: String,
    pub generation: u64,
    pub hash: StructuralHash,
    /// Logical clock at issue time; manual writes stamped later survive the run.
    pub issued_at: u64,
    pub resync: Resync,
    pub input: LayoutGraph,
}

#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub scope: String,
    /// Ids whose cached geometry this edit wrote (manual writes or placeholders).
    pub changed: Vec<String>,
    /// One run per scope that needs layout, none of them nested in another.
    pub tickets: Vec<LayoutTicket>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutReport {
    pub scope: String,
    pub generation: u64,
    pub merged: MergeReport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub scope: String,
    pub changed: Vec<String>,
    pub layouts: Vec<LayoutReport>,
}

pub struct Editor<E: LayoutEngine> {
    graph: DomainGraph,
    view: ViewState,
    engine: E,
    config: Config,
    generation: u64,
    in_flight: HashMap<String, u64>,
    clock: u64,
    manual_writes: HashMap<String, u64>,
}

impl<E: LayoutEngine> Editor<E> {
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, Config::default())
    }

    pub fn with_config(engine: E, config: Config) -> Self {
        Self::from_parts(DomainGraph::new(), ViewState::new(), engine, config)
    }

    /// Resumes a session from a stored graph and view. Stale view entries are
    /// purged on the way in.
    pub fn from_parts(graph: DomainGraph, mut view: ViewState, engine: E, config: Config) -> Self {
        view.purge(&graph);
        Self {
            graph,
            view,
            engine,
            config,
            generation: 0,
            in_flight: HashMap::new(),
            clock: 0,
            manual_writes: HashMap::new(),
        }
    }

    pub fn graph(&self) -> &DomainGraph {
        &self.graph
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn structural_hash(&self) -> StructuralHash {
        structural_hash(&self.graph)
    }

    /// Generation of the live run for `scope`, if any.
    pub fn in_flight(&self, scope: &str) -> Option<u64> {
        self.in_flight.get(scope).copied()
    }

    pub fn into_parts(self) -> (DomainGraph, ViewState) {
        (self.graph, self.view)
    }

    pub fn apply(&mut self, edit: Edit) -> Result<EditOutcome, EditError> {
        match edit.change {
            Change::Mutate { operations } => self.apply_mutation(edit.provenance, &operations),
            Change::Manipulate { updates } => self.apply_manipulation(edit.provenance, &updates),
            Change::SetLayoutMode { group_id, mode } => self.apply_mode(&group_id, mode),
        }
    }

    fn apply_mutation(
        &mut self,
        provenance: Provenance,
        operations: &[Operation],
    ) -> Result<EditOutcome, EditError> {
        let next = batch_update(&self.graph, operations)?;
        let touched: Vec<String> = operations
            .iter()
            .flat_map(|op| op.touched_nodes(&self.graph))
            .collect();
        let containers: Vec<String> = operations
            .iter()
            .flat_map(|op| op.containers(&self.graph, &next))
            .collect();
        let scope = edit_scope(&self.graph, &next, &touched, &containers);
        self.graph = next;
        self.view.purge(&self.graph);
        self.manual_writes
            .retain(|id, _| self.view.geometry(id).is_some() || self.view.edges.contains_key(id));

        let runs = edit_runs(provenance, &self.graph, &self.view, &scope, &containers);
        tracing::debug!(ops = operations.len(), %scope, runs = runs.len(), "applied mutation batch");
        let runs = runs.into_iter().map(|run| (run, Resync::Scope)).collect();
        self.finish(scope, Vec::new(), runs)
    }

    fn apply_manipulation(
        &mut self,
        provenance: Provenance,
        updates: &[ManualUpdate],
    ) -> Result<EditOutcome, EditError> {
        let changed = self.view.apply_manipulation(&self.graph, updates)?;
        if !changed.is_empty() {
            self.clock += 1;
            for id in &changed {
                self.manual_writes.insert(id.clone(), self.clock);
            }
        }

        let mut touched = Vec::new();
        for update in updates {
            match update {
                ManualUpdate::Node { id, .. } => touched.push(id.clone()),
                ManualUpdate::Edge { id, .. } => {
                    if let Some((edge, _)) = self.graph.find_edge(id) {
                        touched.push(edge.source.clone());
                        touched.push(edge.target.clone());
                    }
                }
            }
        }
        let scope = edit_scope(&self.graph, &self.graph, &touched, &[]);
        let runs = if changed.is_empty() {
            Vec::new()
        } else {
            edit_runs(provenance, &self.graph, &self.view, &scope, &[])
                .into_iter()
                .map(|run| (run, Resync::Scope))
                .collect()
        };
        self.finish(scope, changed, runs)
    }

    fn apply_mode(&mut self, group_id: &str, mode: LayoutMode) -> Result<EditOutcome, EditError> {
        let node = find_node(&self.graph.root, group_id)
            .ok_or_else(|| EditError::not_found(EntityKind::Group, group_id))?;
        if !node.is_group() {
            return Err(Conflict::NotAGroup(group_id.to_string()).into());
        }
        let previous = self.view.set_layout_mode(group_id, mode);
        tracing::debug!(group = group_id, from = ?previous, to = ?mode, "layout mode changed");
        let runs = match decide_mode_change(group_id, previous, mode) {
            LayoutDecision::Run { scope, resync } => vec![(scope, resync)],
            LayoutDecision::Skip => Vec::new(),
        };
        self.finish(group_id.to_string(), Vec::new(), runs)
    }

    /// Seeds placeholders for anything a root run will not reach, then issues
    /// one ticket per run.
    fn finish(
        &mut self,
        scope: String,
        mut changed: Vec<String>,
        runs: Vec<(String, Resync)>,
    ) -> Result<EditOutcome, EditError> {
        if !runs.iter().any(|(run, _)| run == ROOT_ID) {
            changed.extend(self.view.seed_missing(&self.graph, &self.config.sizing));
        }
        let mut tickets = Vec::with_capacity(runs.len());
        for (run, resync) in runs {
            tickets.push(self.issue(&run, resync)?);
        }
        Ok(EditOutcome {
            scope,
            changed,
            tickets,
        })
    }

    /// Explicit run request, e.g. "tidy up". Auto-generated requests and LOCK
    /// scopes resync the whole scope; a direct request in a FREE scope only
    /// fills entities that have no geometry yet.
    pub fn request_layout(
        &mut self,
        scope: &str,
        provenance: Provenance,
    ) -> Result<LayoutTicket, EditError> {
        let resync = match decide(provenance, scope, self.view.layout_mode(scope)) {
            LayoutDecision::Run { resync, .. } => resync,
            LayoutDecision::Skip => Resync::MissingOnly,
        };
        self.issue(scope, resync)
    }

    fn issue(&mut self, scope: &str, resync: Resync) -> Result<LayoutTicket, EditError> {
        let input = LayoutGraph::from_domain(
            &self.graph,
            scope,
            &self.config.layout,
            &self.view,
            &self.config.sizing,
        )?;
        self.generation += 1;
        if let Some(previous) = self.in_flight.insert(scope.to_string(), self.generation) {
            tracing::debug!(scope, superseded = previous, "superseding in-flight layout");
        }
        tracing::debug!(scope, generation = self.generation, nodes = input.node_count(), "issued layout");
        Ok(LayoutTicket {
            scope: scope.to_string(),
            generation: self.generation,
            hash: self.structural_hash(),
            issued_at: self.clock,
            resync,
            input,
        })
    }

    /// Runs the engine for a ticket. Touches no session state.
    pub fn run(&self, ticket: &LayoutTicket) -> Result<LayoutOutput, LayoutError> {
        self.engine.layout(&ticket.input)
    }

    /// Applies a finished run, unless it is stale or failed. The run is retired
    /// either way.
    pub fn complete(
        &mut self,
        ticket: LayoutTicket,
        result: Result<LayoutOutput, LayoutError>,
    ) -> Result<LayoutReport, LayoutError> {
        let current = self.in_flight.get(&ticket.scope).copied();
        if current == Some(ticket.generation) {
            self.in_flight.remove(&ticket.scope);
        }
        if self.in_flight.is_empty() {
            self.manual_writes.retain(|_, stamp| *stamp > ticket.issued_at);
        }

        if current != Some(ticket.generation) {
            let err = LayoutError::stale(&ticket.scope, "superseded by a newer run");
            tracing::debug!(scope = %ticket.scope, generation = ticket.generation, "discarding stale layout");
            return Err(err);
        }
        if ticket.hash != self.structural_hash() {
            let err = LayoutError::stale(&ticket.scope, "structure changed since the run was issued");
            tracing::debug!(scope = %ticket.scope, generation = ticket.generation, "discarding stale layout");
            return Err(err);
        }

        let output = result
            .and_then(|output| validate_output(&ticket.input, &output).map(|()| output))
            .inspect_err(|err| {
                if err.is_failure() {
                    tracing::warn!(scope = %ticket.scope, error = %err, "layout failed; keeping previous geometry");
                }
            })?;

        let origin = if ticket.scope == ROOT_ID {
            Point::default()
        } else {
            self.view
                .geometry(&ticket.scope)
                .map(|record| record.origin())
                .unwrap_or_default()
        };
        let extracted = extract_layout(&output, origin);
        let protected: HashSet<String> = self
            .manual_writes
            .iter()
            .filter(|(_, stamp)| **stamp > ticket.issued_at)
            .map(|(id, _)| id.clone())
            .collect();
        let merged = self.view.merge_layout(extracted, ticket.resync, &protected);
        tracing::info!(
            scope = %ticket.scope,
            generation = ticket.generation,
            written = merged.written,
            protected = merged.protected,
            "applied layout"
        );
        Ok(LayoutReport {
            scope: ticket.scope,
            generation: ticket.generation,
            merged,
        })
    }

    /// Applies an edit and, when runs are due, lays out and merges them before
    /// returning. A failed run retires the ones after it.
    pub fn apply_and_layout(&mut self, edit: Edit) -> Result<SyncOutcome, Error> {
        let outcome = self.apply(edit)?;
        let mut layouts = Vec::with_capacity(outcome.tickets.len());
        let mut tickets = outcome.tickets.into_iter();
        while let Some(ticket) = tickets.next() {
            let result = self.run(&ticket);
            match self.complete(ticket, result) {
                Ok(report) => layouts.push(report),
                Err(err) => {
                    for rest in tickets.by_ref() {
                        self.retire(&rest);
                    }
                    return Err(err.into());
                }
            }
        }
        Ok(SyncOutcome {
            scope: outcome.scope,
            changed: outcome.changed,
            layouts,
        })
    }

    /// Drops a ticket without applying it.
    pub fn retire(&mut self, ticket: &LayoutTicket) {
        if self.in_flight.get(&ticket.scope) == Some(&ticket.generation) {
            self.in_flight.remove(&ticket.scope);
        }
    }
}
