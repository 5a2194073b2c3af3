//! The engine context object: owns the current position, the layer set and
//! the scheduler state.
//!
//! All "current viewer" state lives here explicitly (no process-global
//! state), so multiple independent engines can run side by side in one
//! process, which the tests rely on.
//!
//! # Concurrency model
//!
//! A single mutex serializes all control flow: position transitions,
//! diffing, cache lookups and ordering decisions are synchronous and fast.
//! Only extraction is offloaded, to `tokio` worker tasks bounded by a
//! semaphore. Workers re-acquire the state lock when their result lands,
//! which makes the cache and the per-layer generation baseline
//! single-writer. Array sources are read-only, so extractions themselves
//! run without any mutual exclusion.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::dims::{AxisRange, Dims};
use crate::error::{DataAccessError, InvalidConfig, LayerError, PositionError};
use crate::layer::{Layer, LayerData, LayerId};
use crate::multiscale::select_level;

use super::cache::{SliceCache, SliceKey};
use super::request::{SliceEvent, SliceRequest, SliceResult};
use super::scheduler::LayerSliceState;

// =============================================================================
// Viewport
// =============================================================================

/// Camera inputs for resolution-level selection.
///
/// Both fields address the two screen dimensions; with three displayed axes
/// the last two (the in-plane axes) are matched against the screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Canvas extent in screen pixels
    pub canvas_size_px: [f64; 2],

    /// World units visible across the canvas
    pub field_of_view_world: [f64; 2],
}

// =============================================================================
// Engine
// =============================================================================

/// The asynchronous slicing engine.
///
/// Accepts dimensional-position changes, builds one [`SliceRequest`] per
/// affected layer, dispatches extraction to a worker pool, and delivers
/// only the most recent [`SliceResult`] per layer to subscribers. Cheap to
/// clone handles are not provided; share the engine itself behind an `Arc`
/// if multiple owners need it.
///
/// # Example
///
/// ```ignore
/// use ndim_slicer::{Dims, EngineConfig, InMemorySource, LayerData, SliceEngine};
///
/// let engine = SliceEngine::new(EngineConfig::default())?;
/// let mut events = engine.subscribe().await;
///
/// let layer = engine
///     .add_layer(LayerData::single(source)?, vec![1.0; 4], vec![0.0; 4])
///     .await?;
///
/// engine.set_step(0, 5).await?;
/// while let Some(event) = events.recv().await {
///     // forward accepted slices to the renderer
/// }
/// ```
pub struct SliceEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,

    /// Bounds the number of concurrently running extractions.
    workers: Semaphore,

    state: Mutex<EngineState>,
}

struct EngineState {
    next_layer_id: u64,
    dims: Option<Arc<Dims>>,
    viewport: Option<Viewport>,
    layers: HashMap<LayerId, Arc<Layer>>,
    slices: HashMap<LayerId, LayerSliceState>,
    cache: SliceCache,
    subscribers: Vec<mpsc::UnboundedSender<SliceEvent>>,
}

impl SliceEngine {
    /// Create an engine with the given configuration.
    pub fn new(config: EngineConfig) -> Result<Self, InvalidConfig> {
        config.validate().map_err(InvalidConfig)?;
        Ok(Self {
            inner: Arc::new(EngineInner {
                workers: Semaphore::new(config.worker_pool_size),
                state: Mutex::new(EngineState {
                    next_layer_id: 0,
                    dims: None,
                    viewport: None,
                    layers: HashMap::new(),
                    slices: HashMap::new(),
                    cache: SliceCache::new(config.cache_capacity),
                    subscribers: Vec::new(),
                }),
                config,
            }),
        })
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Register a subscriber for slice events.
    ///
    /// Every subscriber receives every accepted result and every failure,
    /// in acceptance order. Dropped receivers are pruned on the next
    /// delivery.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<SliceEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.inner.state.lock().await;
        state.subscribers.push(tx);
        rx
    }

    // =========================================================================
    // Layer management
    // =========================================================================

    /// Register a layer and slice it at the current position.
    ///
    /// The first layer establishes the engine's dimensionality and a
    /// default position (last two axes displayed, collapsed axes at step
    /// 0). Later layers must match that dimensionality; axis ranges are
    /// widened to cover the new layer's extents.
    pub async fn add_layer(
        &self,
        data: LayerData,
        scale: Vec<f64>,
        translate: Vec<f64>,
    ) -> Result<LayerId, LayerError> {
        let mut state = self.inner.state.lock().await;

        match &state.dims {
            Some(dims) if dims.ndim() != data.ndim() => {
                return Err(LayerError::RankMismatch {
                    expected: dims.ndim(),
                    actual: data.ndim(),
                });
            }
            None if data.ndim() < 2 => {
                return Err(LayerError::RankMismatch {
                    expected: 2,
                    actual: data.ndim(),
                });
            }
            _ => {}
        }

        let id = LayerId(state.next_layer_id);
        state.next_layer_id += 1;

        let extents = data.shape(0).map(|s| s.to_vec()).unwrap_or_default();
        let layer = Arc::new(Layer::new(id, data, scale, translate)?);

        state.dims = Some(match state.dims.take() {
            Some(dims) => Arc::new(widen_ranges(&dims, &extents)),
            None => Arc::new(
                Dims::from_extents(&extents).map_err(|_| LayerError::RankMismatch {
                    expected: 2,
                    actual: extents.len(),
                })?,
            ),
        });

        info!(layer_id = %id, levels = layer.data().level_count(), "layer added");
        state.layers.insert(id, layer);
        state.slices.insert(id, LayerSliceState::new());

        self.schedule_layer(&mut state, id).await;
        Ok(id)
    }

    /// Remove a layer and drop its cached slices.
    ///
    /// In-flight extractions for the layer are discarded when they land.
    pub async fn remove_layer(&self, layer_id: LayerId) -> Result<(), LayerError> {
        let mut state = self.inner.state.lock().await;
        if state.layers.remove(&layer_id).is_none() {
            return Err(LayerError::UnknownLayer(layer_id));
        }
        state.slices.remove(&layer_id);
        let dropped = state.cache.invalidate_layer(layer_id);
        info!(%layer_id, dropped, "layer removed");
        Ok(())
    }

    /// Replace a layer's pyramid with new data of the same rank.
    ///
    /// Cached slices of the old data are invalidated before the layer is
    /// resliced, so stale patches are never served again.
    pub async fn set_layer_data(
        &self,
        layer_id: LayerId,
        data: LayerData,
    ) -> Result<(), LayerError> {
        let mut state = self.inner.state.lock().await;

        let current = state
            .layers
            .get(&layer_id)
            .ok_or(LayerError::UnknownLayer(layer_id))?;
        if data.ndim() != current.data().ndim() {
            return Err(LayerError::RankMismatch {
                expected: current.data().ndim(),
                actual: data.ndim(),
            });
        }

        let extents = data.shape(0).map(|s| s.to_vec()).unwrap_or_default();
        let replacement = Layer::new(
            layer_id,
            data,
            current.scale().to_vec(),
            current.translate().to_vec(),
        )?;
        state.layers.insert(layer_id, Arc::new(replacement));

        if let Some(dims) = state.dims.take() {
            state.dims = Some(Arc::new(widen_ranges(&dims, &extents)));
        }

        let dropped = state.cache.invalidate_layer(layer_id);
        debug!(%layer_id, dropped, "layer data replaced");

        self.schedule_layer(&mut state, layer_id).await;
        Ok(())
    }

    // =========================================================================
    // Position management
    // =========================================================================

    /// Move to a new position, reslicing every affected layer.
    ///
    /// A layer is affected when `order`/`displayed` changed or a collapsed
    /// axis' step changed; a no-op transition schedules nothing.
    pub async fn set_position(&self, position: Dims) -> Result<(), PositionError> {
        let mut state = self.inner.state.lock().await;

        if let Some(current) = &state.dims {
            if current.ndim() != position.ndim() {
                return Err(PositionError::NdimMismatch {
                    expected: current.ndim(),
                    actual: position.ndim(),
                });
            }

            let diff = Dims::diff(current, &position);
            if diff.is_empty() {
                return Ok(());
            }
            let needs_slicing = diff.affects_slicing(&position);

            debug!(
                changed = ?diff.changed_steps,
                layout = diff.layout_changed,
                "position changed"
            );
            state.dims = Some(Arc::new(position));
            if needs_slicing {
                self.schedule_all(&mut state).await;
            }
        } else {
            state.dims = Some(Arc::new(position));
            self.schedule_all(&mut state).await;
        }
        Ok(())
    }

    /// Pin one axis at a new step, keeping everything else.
    pub async fn set_step(&self, axis: usize, value: i64) -> Result<(), PositionError> {
        self.transition(|dims| dims.with_step(axis, value)).await
    }

    /// Replace the axis order, keeping everything else.
    pub async fn set_order(&self, order: Vec<usize>) -> Result<(), PositionError> {
        self.transition(|dims| dims.with_order(order)).await
    }

    /// Replace the displayed axes, keeping everything else.
    pub async fn set_displayed(&self, axes: Vec<usize>) -> Result<(), PositionError> {
        self.transition(|dims| dims.with_displayed(axes)).await
    }

    async fn transition(
        &self,
        build: impl FnOnce(&Dims) -> Result<Dims, PositionError>,
    ) -> Result<(), PositionError> {
        let mut state = self.inner.state.lock().await;
        let current = state.dims.clone().ok_or(PositionError::Unset)?;
        let next = build(&current)?;

        let diff = Dims::diff(&current, &next);
        if diff.is_empty() {
            return Ok(());
        }
        let needs_slicing = diff.affects_slicing(&next);

        state.dims = Some(Arc::new(next));
        if needs_slicing {
            self.schedule_all(&mut state).await;
        }
        Ok(())
    }

    /// Update the camera inputs used for resolution-level selection and
    /// reslice multiscale layers, whose preferred level may have changed.
    pub async fn set_viewport(&self, viewport: Viewport) {
        let mut state = self.inner.state.lock().await;
        if state.viewport == Some(viewport) {
            return;
        }
        state.viewport = Some(viewport);
        debug!(?viewport, "viewport changed");

        let mut multiscale: Vec<LayerId> = state
            .layers
            .values()
            .filter(|l| l.data().is_multiscale())
            .map(|l| l.id())
            .collect();
        multiscale.sort();
        for id in multiscale {
            self.schedule_layer(&mut state, id).await;
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// The current position snapshot, if one has been established.
    pub async fn position(&self) -> Option<Arc<Dims>> {
        self.inner.state.lock().await.dims.clone()
    }

    /// Registered layer ids, ascending.
    pub async fn layer_ids(&self) -> Vec<LayerId> {
        let state = self.inner.state.lock().await;
        let mut ids: Vec<LayerId> = state.layers.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of cached slices across all layers.
    pub async fn cache_len(&self) -> usize {
        self.inner.state.lock().await.cache.len()
    }

    /// Generation of the newest accepted slice for a layer (`None` before
    /// the first acceptance or for unknown layers).
    pub async fn accepted_generation(&self, layer_id: LayerId) -> Option<u64> {
        let state = self.inner.state.lock().await;
        state
            .slices
            .get(&layer_id)
            .map(|ls| ls.last_accepted())
            .filter(|g| *g > 0)
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    async fn schedule_all(&self, state: &mut EngineState) {
        let mut ids: Vec<LayerId> = state.layers.keys().copied().collect();
        ids.sort();
        for id in ids {
            self.schedule_layer(state, id).await;
        }
    }

    /// Build and dispatch one request for `layer_id` against the current
    /// position: cache hits are accepted synchronously, misses go to the
    /// worker pool (or run inline when async is disabled).
    async fn schedule_layer(&self, state: &mut EngineState, layer_id: LayerId) {
        let Some(dims) = state.dims.clone() else {
            return;
        };
        let Some(layer) = state.layers.get(&layer_id).cloned() else {
            return;
        };
        let Some(slice_state) = state.slices.get_mut(&layer_id) else {
            return;
        };
        let generation = slice_state.begin_request();

        let level = choose_level(&layer, &dims, state.viewport.as_ref());
        let key = SliceKey::for_position(layer_id, level, &dims);

        if let Some(result) = state.cache.get(&key) {
            let accepted = state
                .slices
                .get_mut(&layer_id)
                .map(|ls| ls.try_accept(generation))
                .unwrap_or(false);
            if accepted {
                // Re-stamp the cached patch with the generation that asked
                // for it so subscribers observe a monotonic stream.
                let fresh = Arc::new(SliceResult {
                    layer_id,
                    generation,
                    level: result.level,
                    patch: result.patch.clone(),
                    displayed: result.displayed.clone(),
                    world_offset: result.world_offset.clone(),
                    world_scale: result.world_scale.clone(),
                });
                debug!(%layer_id, generation, level, "slice served from cache");
                deliver(state, SliceEvent::SliceReady(fresh));
            }
            return;
        }

        let request = SliceRequest {
            layer_id,
            position: dims,
            level,
            generation,
        };

        if self.inner.config.async_enabled {
            debug!(%layer_id, generation, level, "dispatching extraction");
            spawn_extraction(Arc::clone(&self.inner), layer, request);
        } else {
            let outcome = layer.extract(level, &request.position).await;
            complete_extraction(state, &layer, request, outcome);
        }
    }
}

// =============================================================================
// Extraction workers
// =============================================================================

fn spawn_extraction(inner: Arc<EngineInner>, layer: Arc<Layer>, request: SliceRequest) {
    tokio::spawn(async move {
        let Ok(_permit) = inner.workers.acquire().await else {
            return;
        };

        // Cooperative cancellation: skip work superseded while queued.
        {
            let state = inner.state.lock().await;
            match state.slices.get(&request.layer_id) {
                Some(ls) if ls.is_current(request.generation) => {}
                _ => {
                    debug!(
                        layer_id = %request.layer_id,
                        generation = request.generation,
                        "request superseded before extraction"
                    );
                    return;
                }
            }
        }

        let outcome = layer.extract(request.level, &request.position).await;

        let mut state = inner.state.lock().await;
        complete_extraction(&mut state, &layer, request, outcome);
    });
}

/// Run a completed extraction through the ordering gate and, if accepted,
/// cache and deliver it. Must be called under the engine state lock.
fn complete_extraction(
    state: &mut EngineState,
    layer: &Arc<Layer>,
    request: SliceRequest,
    outcome: Result<ndarray::ArrayD<f32>, DataAccessError>,
) {
    let SliceRequest {
        layer_id,
        position,
        level,
        generation,
    } = request;

    match outcome {
        Ok(patch) => {
            let accepted = state
                .slices
                .get_mut(&layer_id)
                .map(|ls| ls.try_accept(generation))
                .unwrap_or(false);
            if !accepted {
                debug!(%layer_id, generation, "stale slice discarded");
                return;
            }

            let displayed = position.displayed().to_vec();
            let result = Arc::new(SliceResult {
                layer_id,
                generation,
                level,
                world_offset: layer.world_offset(&displayed),
                world_scale: layer.world_scale(&displayed, level),
                displayed,
                patch,
            });

            state
                .cache
                .put(SliceKey::for_position(layer_id, level, &position), result.clone());
            debug!(%layer_id, generation, level, "slice accepted");
            deliver(state, SliceEvent::SliceReady(result));
        }
        Err(error) => {
            // A failure of superseded work is just late cancellation.
            let current = state
                .slices
                .get(&layer_id)
                .map(|ls| ls.is_current(generation))
                .unwrap_or(false);
            if !current {
                debug!(%layer_id, generation, "superseded extraction failed, dropped");
                return;
            }

            warn!(%layer_id, generation, %error, "slice extraction failed");
            deliver(
                state,
                SliceEvent::SliceFailed {
                    layer_id,
                    generation,
                    error,
                },
            );
        }
    }
}

fn deliver(state: &mut EngineState, event: SliceEvent) {
    state
        .subscribers
        .retain(|tx| tx.send(event.clone()).is_ok());
}

/// Pick the resolution level for one layer at the current position.
///
/// Without camera information the coarsest level is used: it is cheap,
/// always valid, and refined as soon as a viewport arrives.
fn choose_level(layer: &Layer, dims: &Dims, viewport: Option<&Viewport>) -> usize {
    let data = layer.data();
    if !data.is_multiscale() {
        return 0;
    }
    let Some(viewport) = viewport else {
        return data.level_count() - 1;
    };

    let displayed = dims.displayed();
    let screen_axes = if displayed.len() > 2 {
        &displayed[displayed.len() - 2..]
    } else {
        displayed
    };

    select_level(
        data.level_shapes(),
        screen_axes,
        layer.scale(),
        &viewport.canvas_size_px,
        &viewport.field_of_view_world,
    )
}

/// Widen axis ranges so the position covers `extents`; steps and layout
/// are preserved.
fn widen_ranges(dims: &Dims, extents: &[usize]) -> Dims {
    let mut merged = dims.clone();
    for (axis, &extent) in extents.iter().enumerate() {
        let Ok(current) = merged.range(axis) else {
            continue;
        };
        let wanted = AxisRange {
            min: current.min.min(0),
            max: current.max.max((extent as i64 - 1).max(0)),
            step: current.step,
        };
        if wanted != current {
            if let Ok(next) = merged.with_range(axis, wanted) {
                merged = next;
            }
        }
    }
    merged
}

// =============================================================================
// Tests
// =============================================================================
