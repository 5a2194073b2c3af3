//! Array source abstraction and the in-memory reference backend.
//!
//! [`ArraySource`] is the capability interface every array backend must
//! provide: report a shape, and materialize a rectangular region as a
//! concrete in-memory patch. The slicing engine depends only on this trait,
//! which keeps lazy-loading, tiled or remote backends out of the core.

use async_trait::async_trait;
use ndarray::{ArrayD, Axis};

use crate::error::DataAccessError;

// =============================================================================
// Region Specification
// =============================================================================

/// Per-axis selection for a region read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisSelection {
    /// Pin the axis at a single index; the axis is removed from the result.
    Index(usize),

    /// Keep the full extent of the axis.
    Full,
}

/// A rectangular region of an N-dimensional source: one selection per axis.
///
/// Axes selected with [`AxisSelection::Index`] are collapsed away, so the
/// resulting patch has one axis per `Full` entry, in source axis order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSpec {
    selections: Vec<AxisSelection>,
}

impl RegionSpec {
    /// Build a region from explicit per-axis selections.
    pub fn new(selections: Vec<AxisSelection>) -> Self {
        Self { selections }
    }

    /// Number of axes this region addresses.
    pub fn ndim(&self) -> usize {
        self.selections.len()
    }

    /// The per-axis selections.
    pub fn selections(&self) -> &[AxisSelection] {
        &self.selections
    }

    /// Axes kept in full, in source order.
    pub fn kept_axes(&self) -> Vec<usize> {
        self.selections
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, AxisSelection::Full))
            .map(|(axis, _)| axis)
            .collect()
    }
}

// =============================================================================
// ArraySource Trait
// =============================================================================

/// Capability interface for N-dimensional array backends.
///
/// Implementations must be thread-safe: the scheduler reads regions from
/// worker tasks while the viewer keeps moving, and never serializes reads
/// against each other (sources are read-only from the engine's
/// perspective).
///
/// The only declared failure mode is [`DataAccessError`], covering both
/// shape violations and backend I/O failures from lazy or remote data.
#[async_trait]
pub trait ArraySource: Send + Sync {
    /// Extent of the source per axis.
    fn shape(&self) -> &[usize];

    /// Materialize the region described by `spec` as an owned patch.
    ///
    /// The patch holds one axis per `Full` selection, in source axis order.
    async fn read_region(&self, spec: &RegionSpec) -> Result<ArrayD<f32>, DataAccessError>;
}

// =============================================================================
// In-Memory Source
// =============================================================================

/// [`ArraySource`] backed by an owned `ndarray` array.
///
/// The reference backend: reads are plain view indexing, never fail with
/// I/O errors, and serve as the baseline for tests and for callers whose
/// data already lives in memory.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    data: ArrayD<f32>,
    shape: Vec<usize>,
}

impl InMemorySource {
    /// Wrap an owned array.
    pub fn new(data: ArrayD<f32>) -> Self {
        let shape = data.shape().to_vec();
        Self { data, shape }
    }
}

#[async_trait]
impl ArraySource for InMemorySource {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    async fn read_region(&self, spec: &RegionSpec) -> Result<ArrayD<f32>, DataAccessError> {
        if spec.ndim() != self.shape.len() {
            return Err(DataAccessError::RankMismatch {
                expected: self.shape.len(),
                actual: spec.ndim(),
            });
        }

        for (axis, selection) in spec.selections().iter().enumerate() {
            if let AxisSelection::Index(index) = selection {
                if *index >= self.shape[axis] {
                    return Err(DataAccessError::OutOfBounds {
                        axis,
                        index: *index,
                        extent: self.shape[axis],
                    });
                }
            }
        }

        // Collapse pinned axes from the highest axis down so earlier axis
        // indices stay valid while later ones are removed.
        let mut view = self.data.view();
        for (axis, selection) in spec.selections().iter().enumerate().rev() {
            if let AxisSelection::Index(index) = selection {
                view = view.index_axis_move(Axis(axis), *index);
            }
        }

        Ok(view.to_owned())
    }
}

// =============================================================================
// Tests
// =============================================================================
