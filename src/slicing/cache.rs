//! Bounded cache for computed slices.
//!
//! Slices are keyed by a deterministic signature of what produced them:
//! layer, resolution level, the pinned steps of every collapsed axis, and
//! the displayed-axes identity. Revisiting a previously sliced position is
//! a lookup instead of a recomputation.
//!
//! Eviction is least-recently-used with a configurable entry capacity.
//! Entries are invalidated per layer whenever that layer's underlying data
//! is replaced, so a stale patch of old data is never served.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use crate::dims::Dims;
use crate::layer::LayerId;

use super::request::SliceResult;

// =============================================================================
// Cache Key
// =============================================================================

/// Deterministic signature of one slice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SliceKey {
    /// Source layer
    pub layer_id: LayerId,

    /// Resolution level
    pub level: usize,

    /// `(axis, step)` for every collapsed axis, in ascending axis order
    pub pinned_steps: Vec<(usize, i64)>,

    /// Displayed axes identity, in render order
    pub displayed: Vec<usize>,
}

impl SliceKey {
    /// Build the signature for slicing `layer_id` at `level` under `dims`.
    pub fn for_position(layer_id: LayerId, level: usize, dims: &Dims) -> Self {
        let pinned_steps = (0..dims.ndim())
            .filter(|axis| !dims.is_displayed(*axis))
            .map(|axis| (axis, dims.steps()[axis]))
            .collect();
        Self {
            layer_id,
            level,
            pinned_steps,
            displayed: dims.displayed().to_vec(),
        }
    }
}

// =============================================================================
// Slice Cache
// =============================================================================

/// LRU cache of accepted slice results.
///
/// Mutations are always performed under the engine's state lock (the cache
/// and the per-layer generation baseline are the only mutable shared state,
/// and both are single-writer), so the cache itself carries no locking.
pub struct SliceCache {
    entries: LruCache<SliceKey, Arc<SliceResult>>,
}

impl SliceCache {
    /// Create a cache bounded to `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap()),
        }
    }

    /// Look up a slice, marking it most recently used on a hit.
    pub fn get(&mut self, key: &SliceKey) -> Option<Arc<SliceResult>> {
        self.entries.get(key).cloned()
    }

    /// Store a slice, evicting the least-recently-used entry when full.
    pub fn put(&mut self, key: SliceKey, result: Arc<SliceResult>) {
        self.entries.put(key, result);
    }

    /// Whether a slice is cached, without touching LRU order.
    pub fn contains(&self, key: &SliceKey) -> bool {
        self.entries.contains(key)
    }

    /// Drop every entry belonging to `layer_id`; returns how many were
    /// removed. Called when the layer's data is replaced or the layer is
    /// removed.
    pub fn invalidate_layer(&mut self, layer_id: LayerId) -> usize {
        let stale: Vec<SliceKey> = self
            .entries
            .iter()
            .filter(|(key, _)| key.layer_id == layer_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.entries.pop(key);
        }
        stale.len()
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached slices.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}

impl std::fmt::Debug for SliceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SliceCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.entries.cap())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
