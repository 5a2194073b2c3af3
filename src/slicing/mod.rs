//! The asynchronous slicing engine.
//!
//! This module ties the data model together: position changes come in,
//! per-layer [`SliceRequest`]s go out to worker tasks, and accepted
//! [`SliceResult`]s flow back to subscribers through a per-layer ordering
//! gate that guarantees an older slice can never overwrite a newer one,
//! regardless of completion order.
//!
//! # Architecture
//!
//! ```text
//! set_position / set_viewport / add_layer
//!        │
//!        ▼
//! ┌────────────────────────────────────────────────────────────┐
//! │                        SliceEngine                         │
//! │   diff position ─► per-layer generation ─► cache lookup    │
//! │        │                                      │            │
//! │        │ miss                                 │ hit        │
//! │        ▼                                      ▼            │
//! │   worker pool (extract)  ─────►  ordering gate ─► accept   │
//! │        │ stale/superseded            │                     │
//! │        ▼                             ▼                     │
//! │     discarded                 cache + subscribers          │
//! └────────────────────────────────────────────────────────────┘
//! ```

mod cache;
mod engine;
mod request;
mod scheduler;

pub use cache::{SliceCache, SliceKey};
pub use engine::{SliceEngine, Viewport};
pub use request::{SliceEvent, SliceRequest, SliceResult};
