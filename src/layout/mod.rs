//! Automatic layout tier: options, engine input/output and the engine seam.
//!
//! `DomainGraph` is converted to a [`LayoutGraph`] for one scope, an engine
//! turns it into a [`LayoutOutput`] with parent-relative coordinates, and
//! [`validate_output`] gates what may reach the geometry cache.

mod dagre;
mod error;
mod input;
mod options;
mod output;
mod validate;

pub use dagre::DagreEngine;
pub use error::LayoutError;
pub use input::{LayoutEdge, LayoutGraph, LayoutNode};
pub use options::{CycleBreaking, Direction, HierarchyHandling, LayoutOptions, Spacing};
pub use output::{EdgeSection, LayoutOutput, OutputEdge, OutputNode};
pub use validate::validate_output;

/// An automatic layout engine. Runs are pure functions of their input, so an
/// engine may be shared between threads and called concurrently.
pub trait LayoutEngine: Send + Sync {
    fn name(&self) -> &'static str {
        "custom"
    }

    fn layout(&self, input: &LayoutGraph) -> Result<LayoutOutput, LayoutError>;
}

impl<E: LayoutEngine + ?Sized> LayoutEngine for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn layout(&self, input: &LayoutGraph) -> Result<LayoutOutput, LayoutError> {
        (**self).layout(input)
    }
}

impl<E: LayoutEngine + ?Sized> LayoutEngine for std::sync::Arc<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn layout(&self, input: &LayoutGraph) -> Result<LayoutOutput, LayoutError> {
        (**self).layout(input)
    }
}
