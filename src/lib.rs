pub mod ancestry;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod editor;
pub mod error;
pub mod hash;
pub mod ir;
pub mod layout;
pub mod mutation;
pub mod policy;
pub mod render;
pub mod sizing;
pub mod view_state;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, RenderConfig, load_config};
pub use editor::{Change, Edit, EditOutcome, Editor, LayoutReport, LayoutTicket, SyncOutcome};
pub use error::{Conflict, EditError, EditResult, EntityKind, Error, GraphError};
pub use hash::{StructuralHash, structural_hash};
pub use ir::{DomainGraph, Edge, GraphNode, NodeData, ROOT_ID};
pub use layout::{DagreEngine, LayoutEngine, LayoutError, LayoutGraph, LayoutOptions, LayoutOutput};
pub use mutation::{Operation, batch_update};
pub use policy::{LayoutDecision, Provenance};
pub use view_state::{GeometryRecord, LayoutMode, ManualUpdate, Resync, ViewState};
