//! Layer data model.
//!
//! A layer is one unit of N-dimensional array data, optionally stored as a
//! multiscale pyramid of progressively coarser levels, plus the spatial
//! transform (scale/translate) that maps data indices into world
//! coordinates.
//!
//! The engine never touches concrete array backends directly: everything
//! goes through the [`ArraySource`] capability trait, so lazy, remote or
//! compressed backends plug in by implementing a single async read method.

mod source;
mod store;

use std::fmt;

pub use source::{ArraySource, AxisSelection, InMemorySource, RegionSpec};
pub use store::{Layer, LayerData};

/// Opaque identifier for a layer registered with an engine.
///
/// Allocated monotonically by the engine; never reused within one engine
/// instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub(crate) u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer-{}", self.0)
    }
}
