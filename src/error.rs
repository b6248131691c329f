use std::fmt;

pub type EditResult<T> = std::result::Result<T, EditError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Edge,
    Group,
    Parent,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Node => "node",
            Self::Edge => "edge",
            Self::Group => "group",
            Self::Parent => "parent",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Conflict {
    #[error("node id already exists: {0}")]
    DuplicateNode(String),
    #[error("edge id already exists: {0}")]
    DuplicateEdge(String),
    #[error("edge {edge} would connect {node} to itself")]
    SelfLoop { edge: String, node: String },
    #[error("moving {node} under {target} would create a cycle")]
    Cycle { node: String, target: String },
    #[error("the root node cannot be deleted, moved or ungrouped")]
    RootImmutable,
    #[error("invalid id derived from {0:?}")]
    InvalidId(String),
    #[error("{0} is not a group")]
    NotAGroup(String),
    #[error("none of the requested nodes could be moved into group {0}")]
    NothingToGroup(String),
}

/// Synchronous, caller-visible mutation failure. The input graph is never
/// modified when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("structural conflict: {0}")]
    StructuralConflict(#[from] Conflict),

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("batch operation #{index} ({op}) failed: {source}")]
    Batch {
        index: usize,
        op: String,
        source: Box<EditError>,
    },
}

impl EditError {
    pub fn not_found(kind: EntityKind, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Unwraps batch context to the failure that actually happened.
    pub fn root_cause(&self) -> &EditError {
        match self {
            Self::Batch { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.root_cause(), Self::StructuralConflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), Self::NotFound { .. })
    }
}

/// Failures loading a serialized graph that bypassed the mutation engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("graph parse error: {0}")]
    Parse(String),
    #[error("root node must have id \"root\", found {0:?}")]
    BadRoot(String),
    #[error("duplicate node id: {0}")]
    DuplicateNode(String),
    #[error("duplicate edge id: {0}")]
    DuplicateEdge(String),
    #[error("edge {edge} references missing node {endpoint}")]
    DanglingEdge { edge: String, endpoint: String },
    #[error("edge {0} is a self-loop")]
    SelfLoop(String),
    #[error("edge {edge} is owned by {owner} but belongs to {expected}")]
    MisplacedEdge {
        edge: String,
        owner: String,
        expected: String,
    },
}

/// Either side of an editor round trip.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Edit(#[from] EditError),

    #[error(transparent)]
    Layout(#[from] crate::layout::LayoutError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}
