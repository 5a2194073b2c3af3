//! Slice request/result value types and the subscriber event stream.

use std::sync::Arc;

use ndarray::ArrayD;

use crate::dims::Dims;
use crate::error::DataAccessError;
use crate::layer::LayerId;

// =============================================================================
// Slice Request
// =============================================================================

/// One unit of slicing work for one layer.
///
/// The position is captured by value (an immutable snapshot) at request
/// time; workers read only from this snapshot while the viewer keeps
/// moving. The generation counter is per layer and is the sole ordering
/// key: two requests for the same layer compare by generation, never by
/// wall-clock completion time.
#[derive(Debug, Clone)]
pub struct SliceRequest {
    /// Target layer
    pub layer_id: LayerId,

    /// Position snapshot this request was scheduled with
    pub position: Arc<Dims>,

    /// Resolution level chosen for this request
    pub level: usize,

    /// Per-layer monotonically increasing counter
    pub generation: u64,
}

// =============================================================================
// Slice Result
// =============================================================================

/// Outcome of one slice extraction, ready for the renderer.
///
/// Immutable; shared as `Arc<SliceResult>` between the cache and every
/// subscriber.
#[derive(Debug)]
pub struct SliceResult {
    /// Source layer
    pub layer_id: LayerId,

    /// Generation of the request that produced this result
    pub generation: u64,

    /// Resolution level the patch was extracted from
    pub level: usize,

    /// Extracted data, one axis per displayed axis, in render order
    pub patch: ArrayD<f32>,

    /// The displayed axes identity the patch was produced for
    pub displayed: Vec<usize>,

    /// World coordinates of the patch origin, one entry per displayed axis
    pub world_offset: Vec<f64>,

    /// World units per patch pixel at this level, one entry per displayed axis
    pub world_scale: Vec<f64>,
}

// =============================================================================
// Events
// =============================================================================

/// Event stream delivered to subscribers, in acceptance order.
#[derive(Debug, Clone)]
pub enum SliceEvent {
    /// A slice passed the ordering gate and is ready to render.
    SliceReady(Arc<SliceResult>),

    /// Extraction failed; the layer's last accepted slice stays on display.
    SliceFailed {
        layer_id: LayerId,
        generation: u64,
        error: DataAccessError,
    },
}

impl SliceEvent {
    /// Layer this event belongs to.
    pub fn layer_id(&self) -> LayerId {
        match self {
            Self::SliceReady(result) => result.layer_id,
            Self::SliceFailed { layer_id, .. } => *layer_id,
        }
    }

    /// Generation of the request behind this event.
    pub fn generation(&self) -> u64 {
        match self {
            Self::SliceReady(result) => result.generation,
            Self::SliceFailed { generation, .. } => *generation,
        }
    }
}
