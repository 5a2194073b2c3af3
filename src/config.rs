//! Engine configuration.
//!
//! The engine is embedded, so configuration is a plain value handed to
//! [`SliceEngine::new`](crate::SliceEngine::new) rather than anything
//! parsed from the environment. All knobs have defaults that suit an
//! interactive viewer; `validate()` rejects the combinations that cannot
//! work.

// =============================================================================
// Default Values
// =============================================================================

/// Default number of cached slices across all layers.
///
/// Sized for one full scrub through an axis of typical length.
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Default number of concurrently running extractions.
pub const DEFAULT_WORKER_POOL_SIZE: usize = 4;

// =============================================================================
// Engine Configuration
// =============================================================================

/// Tunables for a [`SliceEngine`](crate::SliceEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of cached slices (LRU-evicted beyond this).
    pub cache_capacity: usize,

    /// When false, extraction runs synchronously inline instead of on the
    /// worker pool. Completion order then equals dispatch order, which is
    /// what deterministic tests want.
    pub async_enabled: bool,

    /// Number of extractions allowed to run concurrently.
    pub worker_pool_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            async_enabled: true,
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
        }
    }
}

impl EngineConfig {
    /// Preset with inline extraction for deterministic testing.
    pub fn synchronous() -> Self {
        Self {
            async_enabled: false,
            ..Self::default()
        }
    }

    /// Override the cache capacity.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Override the worker pool size.
    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size;
        self
    }

    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_capacity == 0 {
            return Err("cache_capacity must be greater than 0".to_string());
        }
        if self.worker_pool_size == 0 {
            return Err("worker_pool_size must be greater than 0".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
