//! Dimensional position management.
//!
//! A [`Dims`] value is an immutable snapshot of "where we are" in
//! N-dimensional space: which axes are displayed, at which index every
//! collapsed axis is pinned, and the valid range per axis. Transitions
//! (`with_step`, `with_order`, `with_displayed`, `with_range`) validate their
//! arguments and return a new snapshot, never mutating the old one, so that
//! in-flight slicing work can safely hold a reference to the position it was
//! scheduled with.

mod position;

pub use position::{AxisRange, Dims, DimsDiff};
