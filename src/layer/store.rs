//! Layer storage: multiscale pyramid handles plus the spatial transform.

use std::sync::Arc;

use ndarray::{ArrayD, IxDyn};

use crate::dims::Dims;
use crate::error::{DataAccessError, LayerError};

use super::source::{ArraySource, AxisSelection, RegionSpec};
use super::LayerId;

// =============================================================================
// Layer Data (pyramid)
// =============================================================================

/// Ordered array handles from finest (level 0) to coarsest.
///
/// Non-multiscale data is a pyramid of length 1; level 0 always exists.
/// Construction validates that all levels share a rank and that per-axis
/// extents never grow toward coarser levels.
pub struct LayerData {
    levels: Vec<Arc<dyn ArraySource>>,
    shapes: Vec<Vec<usize>>,
}

impl LayerData {
    /// Validate and wrap a pyramid of sources.
    pub fn new(levels: Vec<Arc<dyn ArraySource>>) -> Result<Self, LayerError> {
        if levels.is_empty() {
            return Err(LayerError::EmptyPyramid);
        }

        let shapes: Vec<Vec<usize>> = levels.iter().map(|l| l.shape().to_vec()).collect();
        let ndim = shapes[0].len();

        for (level, shape) in shapes.iter().enumerate().skip(1) {
            if shape.len() != ndim {
                return Err(LayerError::LevelRankMismatch {
                    level,
                    expected: ndim,
                    actual: shape.len(),
                });
            }
            for (axis, (&coarser, &finer)) in
                shape.iter().zip(shapes[level - 1].iter()).enumerate()
            {
                if coarser > finer {
                    return Err(LayerError::LevelShapeMismatch {
                        level,
                        axis,
                        coarser,
                        finer,
                    });
                }
            }
        }

        Ok(Self { levels, shapes })
    }

    /// Single-level convenience wrapper.
    pub fn single(source: Arc<dyn ArraySource>) -> Result<Self, LayerError> {
        Self::new(vec![source])
    }

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        self.shapes[0].len()
    }

    /// Number of resolution levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Whether this pyramid has more than one level.
    pub fn is_multiscale(&self) -> bool {
        self.levels.len() > 1
    }

    /// Extents of one level.
    pub fn shape(&self, level: usize) -> Result<&[usize], DataAccessError> {
        self.shapes
            .get(level)
            .map(|s| s.as_slice())
            .ok_or(DataAccessError::LevelOutOfRange {
                level,
                levels: self.levels.len(),
            })
    }

    /// Extents of every level, finest first.
    pub fn level_shapes(&self) -> &[Vec<usize>] {
        &self.shapes
    }

    /// Source handle of one level.
    pub fn level(&self, level: usize) -> Result<&Arc<dyn ArraySource>, DataAccessError> {
        self.levels.get(level).ok_or(DataAccessError::LevelOutOfRange {
            level,
            levels: self.levels.len(),
        })
    }

    /// Downsample factor of `level` relative to level 0 along `axis`.
    ///
    /// Level 0 is always 1.0; a level with half the extent is 2.0.
    pub fn downsample(&self, level: usize, axis: usize) -> f64 {
        let finest = self.shapes[0][axis].max(1) as f64;
        let coarse = self.shapes[level][axis].max(1) as f64;
        finest / coarse
    }
}

impl std::fmt::Debug for LayerData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerData")
            .field("levels", &self.levels.len())
            .field("shapes", &self.shapes)
            .finish()
    }
}

// =============================================================================
// Layer
// =============================================================================

/// One layer: a (possibly multiscale) pyramid plus its spatial transform.
///
/// `scale` is world units per data step at level 0 and `translate` the world
/// offset, both per axis. Data is read-only from the engine's perspective;
/// replacing it goes through the engine so cached slices can be invalidated.
#[derive(Debug)]
pub struct Layer {
    id: LayerId,
    data: LayerData,
    scale: Vec<f64>,
    translate: Vec<f64>,
}

impl Layer {
    /// Validate transform lengths/values and assemble a layer.
    pub fn new(
        id: LayerId,
        data: LayerData,
        scale: Vec<f64>,
        translate: Vec<f64>,
    ) -> Result<Self, LayerError> {
        let ndim = data.ndim();
        if scale.len() != ndim {
            return Err(LayerError::TransformMismatch {
                field: "scale",
                expected: ndim,
                actual: scale.len(),
            });
        }
        if translate.len() != ndim {
            return Err(LayerError::TransformMismatch {
                field: "translate",
                expected: ndim,
                actual: translate.len(),
            });
        }
        for (axis, &value) in scale.iter().enumerate() {
            if !value.is_finite() || value == 0.0 {
                return Err(LayerError::InvalidScale { axis, value });
            }
        }

        Ok(Self {
            id,
            data,
            scale,
            translate,
        })
    }

    /// Layer identifier.
    pub fn id(&self) -> LayerId {
        self.id
    }

    /// The pyramid.
    pub fn data(&self) -> &LayerData {
        &self.data
    }

    /// World units per data step at level 0, per axis.
    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    /// World offset per axis.
    pub fn translate(&self) -> &[f64] {
        &self.translate
    }

    // =========================================================================
    // Transforms
    // =========================================================================

    /// World coordinate of a level-0 data index along `axis`.
    pub fn data_to_world(&self, axis: usize, index: i64) -> f64 {
        self.translate[axis] + self.scale[axis] * index as f64
    }

    /// Nearest level-0 data index for a world coordinate along `axis`.
    pub fn world_to_data(&self, axis: usize, world: f64) -> i64 {
        ((world - self.translate[axis]) / self.scale[axis]).round() as i64
    }

    /// World position of a patch origin, one entry per displayed axis.
    pub fn world_offset(&self, displayed: &[usize]) -> Vec<f64> {
        displayed.iter().map(|&a| self.translate[a]).collect()
    }

    /// World units per patch pixel at `level`, one entry per displayed axis.
    pub fn world_scale(&self, displayed: &[usize], level: usize) -> Vec<f64> {
        displayed
            .iter()
            .map(|&a| self.scale[a] * self.data.downsample(level, a))
            .collect()
    }

    // =========================================================================
    // Extraction
    // =========================================================================

    /// Extract the patch for `dims` at `level`.
    ///
    /// Collapsed axes are pinned at their current step, rescaled to the
    /// level's resolution and clamped into the level extent; displayed axes
    /// are kept in full. The returned patch axes follow `dims.displayed()`
    /// order.
    ///
    /// Reads only from the immutable snapshot, so it is safe to run from a
    /// worker while the engine's current position keeps changing.
    pub async fn extract(&self, level: usize, dims: &Dims) -> Result<ArrayD<f32>, DataAccessError> {
        let shape = self.data.shape(level)?;
        if dims.ndim() != shape.len() {
            return Err(DataAccessError::RankMismatch {
                expected: shape.len(),
                actual: dims.ndim(),
            });
        }

        let selections = (0..dims.ndim())
            .map(|axis| {
                if dims.is_displayed(axis) {
                    AxisSelection::Full
                } else {
                    AxisSelection::Index(self.level_step(level, axis, dims, shape))
                }
            })
            .collect();

        let raw = self
            .data
            .level(level)?
            .read_region(&RegionSpec::new(selections))
            .await?;

        Ok(reorder_to_displayed(raw, dims.displayed()))
    }

    /// Rescale a viewer-resolution step to a level-local index, clamped into
    /// the level extent.
    fn level_step(&self, level: usize, axis: usize, dims: &Dims, shape: &[usize]) -> usize {
        let step = dims.steps()[axis].max(0) as f64;
        let scaled = (step / self.data.downsample(level, axis)).round() as i64;
        let extent = shape[axis] as i64;
        scaled.clamp(0, (extent - 1).max(0)) as usize
    }
}

/// Permute a collapsed patch so its axes follow the displayed order.
///
/// After extraction the remaining axes sit in ascending source order; the
/// j-th output axis must be `displayed[j]`, whose position among the
/// remaining axes equals the number of displayed axes smaller than it.
fn reorder_to_displayed(patch: ArrayD<f32>, displayed: &[usize]) -> ArrayD<f32> {
    let perm: Vec<usize> = displayed
        .iter()
        .map(|&a| displayed.iter().filter(|&&b| b < a).count())
        .collect();

    if perm.iter().enumerate().all(|(j, &p)| j == p) {
        return patch;
    }
    patch.permuted_axes(IxDyn(&perm))
}

// =============================================================================
// Tests
// =============================================================================
