//! # ndim-slicer
//!
//! An asynchronous slicing engine for multi-dimensional image viewers.
//!
//! Viewers navigate arbitrarily high-dimensional array data (time x channel
//! x z x y x x) by continuously re-slicing it into 2D/3D patches for a GPU
//! canvas. This crate is the engine behind that: given a layer's
//! N-dimensional data (possibly a multiscale pyramid) and the current
//! dimensional position, it computes the right patch at the right
//! resolution level, off the UI thread, and guarantees that slices are
//! delivered in order even when the underlying work completes out of
//! order.
//!
//! ## Features
//!
//! - **Immutable position snapshots**: in-flight work holds the position it
//!   was scheduled with; the viewer keeps moving underneath it
//! - **Per-layer ordering gate**: a generation counter per layer ensures a
//!   stale slice never overwrites a newer one on screen
//! - **Multiscale level selection**: pure viewport-to-level mapping that
//!   never upsamples while a denser level is available
//! - **Bounded slice cache**: revisiting a position is a lookup, not a
//!   recomputation, with per-layer invalidation on data replacement
//! - **Pluggable array backends**: the engine depends only on the
//!   [`ArraySource`] capability trait
//!
//! ## Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`dims`] - dimensional position snapshots and transitions
//! - [`layer`] - array sources, multiscale pyramids, spatial transforms
//! - [`multiscale`] - resolution level selection
//! - [`slicing`] - the scheduler, cache and engine context object
//! - [`config`] - engine configuration
//! - [`error`] - error taxonomy
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ndarray::ArrayD;
//! use ndim_slicer::{
//!     ArraySource, EngineConfig, InMemorySource, LayerData, SliceEngine, SliceEvent,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = SliceEngine::new(EngineConfig::default())?;
//!     let mut events = engine.subscribe().await;
//!
//!     // a 4-d stack: time x channel x y x x
//!     let data = ArrayD::<f32>::zeros(ndarray::IxDyn(&[100, 3, 512, 512]));
//!     let source: Arc<dyn ArraySource> = Arc::new(InMemorySource::new(data));
//!     engine
//!         .add_layer(LayerData::single(source)?, vec![1.0; 4], vec![0.0; 4])
//!         .await?;
//!
//!     // scrub through time; only the newest slice ever reaches the renderer
//!     for t in 0..100 {
//!         engine.set_step(0, t).await?;
//!     }
//!
//!     while let Some(event) = events.recv().await {
//!         if let SliceEvent::SliceReady(result) = event {
//!             println!("layer {} generation {}", result.layer_id, result.generation);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dims;
pub mod error;
pub mod layer;
pub mod multiscale;
pub mod slicing;

// Re-export commonly used types
pub use config::{EngineConfig, DEFAULT_CACHE_CAPACITY, DEFAULT_WORKER_POOL_SIZE};
pub use dims::{AxisRange, Dims, DimsDiff};
pub use error::{DataAccessError, InvalidConfig, LayerError, PositionError};
pub use layer::{
    ArraySource, AxisSelection, InMemorySource, Layer, LayerData, LayerId, RegionSpec,
};
pub use multiscale::{downsample_factor, select_level};
pub use slicing::{
    SliceCache, SliceEngine, SliceEvent, SliceKey, SliceRequest, SliceResult, Viewport,
};
