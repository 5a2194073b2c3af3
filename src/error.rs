use thiserror::Error;

use crate::layer::LayerId;

/// Errors raised by dimensional position construction and transitions.
///
/// These are always surfaced synchronously to the caller that requested the
/// change; the engine's current position is left untouched on failure.
#[derive(Debug, Clone, Error)]
pub enum PositionError {
    /// Axis index is outside `[0, ndim)`
    #[error("axis {axis} out of range for {ndim}-dimensional position")]
    InvalidAxis { axis: usize, ndim: usize },

    /// Step value is outside the axis range
    #[error("step {step} outside range [{min}, {max}] on axis {axis}")]
    InvalidStep {
        axis: usize,
        step: i64,
        min: i64,
        max: i64,
    },

    /// Axis order is not a permutation of `0..ndim`
    #[error("order {order:?} is not a permutation of 0..{ndim}")]
    InvalidOrder { order: Vec<usize>, ndim: usize },

    /// Displayed axes must name 2 or 3 distinct axes
    #[error("displayed axes {axes:?} must name 2 or 3 distinct axes")]
    InvalidDisplayed { axes: Vec<usize> },

    /// An axis range with max < min or a non-positive step increment
    #[error("invalid range on axis {axis}: min {min}, max {max}, step {step}")]
    InvalidRange {
        axis: usize,
        min: i64,
        max: i64,
        step: i64,
    },

    /// A per-axis field has the wrong length
    #[error("{field} has length {actual}, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Fewer than two axes cannot form a displayable position
    #[error("a position needs at least 2 axes, got {ndim}")]
    TooFewAxes { ndim: usize },

    /// Position dimensionality does not match what the engine is tracking
    #[error("position has {actual} axes but the engine is tracking {expected}")]
    NdimMismatch { expected: usize, actual: usize },

    /// A step/order/displayed transition was requested before any position
    /// or layer established the dimensionality
    #[error("no position has been set")]
    Unset,
}

/// Errors raised by layer management (add/remove/replace data).
#[derive(Debug, Clone, Error)]
pub enum LayerError {
    /// Layer id is not registered with this engine
    #[error("unknown layer {0}")]
    UnknownLayer(LayerId),

    /// A multiscale pyramid needs at least one resolution level
    #[error("layer pyramid must contain at least one level")]
    EmptyPyramid,

    /// Pyramid levels must all have the same number of axes
    #[error("level {level} has {actual} axes, expected {expected}")]
    LevelRankMismatch {
        level: usize,
        expected: usize,
        actual: usize,
    },

    /// Pyramid levels must shrink (or stay equal) per axis toward coarser levels
    #[error("level {level} grows along axis {axis}: extent {coarser} exceeds finer extent {finer}")]
    LevelShapeMismatch {
        level: usize,
        axis: usize,
        coarser: usize,
        finer: usize,
    },

    /// Scale/translate vectors must have one entry per axis
    #[error("{field} has length {actual}, expected {expected} (one per axis)")]
    TransformMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Layer dimensionality does not match the engine's current position
    #[error("layer data has {actual} axes but the engine is tracking {expected}")]
    RankMismatch { expected: usize, actual: usize },

    /// Scale factors must be finite and non-zero to be invertible
    #[error("scale factor {value} on axis {axis} is not finite and non-zero")]
    InvalidScale { axis: usize, value: f64 },
}

/// Extraction-time failures reading underlying array data.
///
/// These are reported asynchronously per layer via
/// [`SliceEvent::SliceFailed`](crate::slicing::SliceEvent); the scheduler
/// keeps running and the layer's last accepted slice stays on display.
#[derive(Debug, Clone, Error)]
pub enum DataAccessError {
    /// A pinned index fell outside the source extent on some axis
    #[error("index {index} out of bounds for axis {axis} with extent {extent}")]
    OutOfBounds {
        axis: usize,
        index: usize,
        extent: usize,
    },

    /// Requested resolution level does not exist in the pyramid
    #[error("level {level} out of range, pyramid has {levels} level(s)")]
    LevelOutOfRange { level: usize, levels: usize },

    /// Region dimensionality does not match the source
    #[error("region has {actual} axes, source has {expected}")]
    RankMismatch { expected: usize, actual: usize },

    /// Backend-specific read failure (lazy/remote data failing I/O)
    #[error("source error: {0}")]
    Source(String),
}

/// Invalid engine configuration, raised from [`SliceEngine::new`](crate::SliceEngine::new).
#[derive(Debug, Clone, Error)]
#[error("invalid engine configuration: {0}")]
pub struct InvalidConfig(pub String);
