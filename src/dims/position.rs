//! Immutable dimensional position snapshots.

use crate::error::PositionError;

// =============================================================================
// Axis Range
// =============================================================================

/// Valid step range for one axis: `min..=max` walked in increments of `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRange {
    /// Lowest valid step
    pub min: i64,

    /// Highest valid step
    pub max: i64,

    /// Step increment (>= 1)
    pub step: i64,
}

impl AxisRange {
    /// Create a range covering `0..extent` with unit increments.
    ///
    /// An empty extent collapses to the single step 0.
    pub fn from_extent(extent: usize) -> Self {
        Self {
            min: 0,
            max: (extent as i64 - 1).max(0),
            step: 1,
        }
    }

    /// Whether `value` lies within `[min, max]`.
    pub fn contains(&self, value: i64) -> bool {
        self.min <= value && value <= self.max
    }

    /// Clamp `value` into `[min, max]`.
    pub fn clamp(&self, value: i64) -> i64 {
        value.clamp(self.min, self.max)
    }
}

impl Default for AxisRange {
    fn default() -> Self {
        Self {
            min: 0,
            max: 0,
            step: 1,
        }
    }
}

// =============================================================================
// Dims
// =============================================================================

/// Immutable snapshot of an N-dimensional viewing position.
///
/// Holds, per axis: the current step, the valid step range, plus the global
/// axis order and the set of displayed (non-collapsed) axes. All invariants
/// are enforced at construction, so holders of a `Dims` never need to
/// re-validate:
///
/// - `order` is a permutation of `0..ndim`
/// - `displayed` names 2 or 3 distinct axes, each `< ndim`
/// - every `current_step[a]` lies within `range[a]`
///
/// A change produces a new instance via the `with_*` transitions; the
/// original is never mutated, so asynchronous extraction can capture an
/// `Arc<Dims>` and read from it while the viewer keeps moving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dims {
    ndim: usize,
    order: Vec<usize>,
    displayed: Vec<usize>,
    current_step: Vec<i64>,
    range: Vec<AxisRange>,
}

impl Dims {
    /// Construct a position from explicit parts, validating every invariant.
    pub fn new(
        order: Vec<usize>,
        displayed: Vec<usize>,
        current_step: Vec<i64>,
        range: Vec<AxisRange>,
    ) -> Result<Self, PositionError> {
        let ndim = order.len();
        if ndim < 2 {
            return Err(PositionError::TooFewAxes { ndim });
        }

        validate_order(&order, ndim)?;
        validate_displayed(&displayed, ndim)?;

        if current_step.len() != ndim {
            return Err(PositionError::LengthMismatch {
                field: "current_step",
                expected: ndim,
                actual: current_step.len(),
            });
        }
        if range.len() != ndim {
            return Err(PositionError::LengthMismatch {
                field: "range",
                expected: ndim,
                actual: range.len(),
            });
        }

        for (axis, r) in range.iter().enumerate() {
            if r.max < r.min || r.step < 1 {
                return Err(PositionError::InvalidRange {
                    axis,
                    min: r.min,
                    max: r.max,
                    step: r.step,
                });
            }
        }
        for (axis, (&step, r)) in current_step.iter().zip(range.iter()).enumerate() {
            if !r.contains(step) {
                return Err(PositionError::InvalidStep {
                    axis,
                    step,
                    min: r.min,
                    max: r.max,
                });
            }
        }

        Ok(Self {
            ndim,
            order,
            displayed,
            current_step,
            range,
        })
    }

    /// Default position over the given axis extents: identity order, last
    /// two axes displayed, every collapsed axis pinned at step 0.
    pub fn from_extents(extents: &[usize]) -> Result<Self, PositionError> {
        let ndim = extents.len();
        if ndim < 2 {
            return Err(PositionError::TooFewAxes { ndim });
        }
        Self::new(
            (0..ndim).collect(),
            vec![ndim - 2, ndim - 1],
            vec![0; ndim],
            extents.iter().map(|&e| AxisRange::from_extent(e)).collect(),
        )
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        self.ndim
    }

    /// Axis order (a permutation of `0..ndim`).
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Displayed (non-collapsed) axes, in render order.
    pub fn displayed(&self) -> &[usize] {
        &self.displayed
    }

    /// Current step for every axis.
    pub fn steps(&self) -> &[i64] {
        &self.current_step
    }

    /// Current step on one axis.
    pub fn step(&self, axis: usize) -> Result<i64, PositionError> {
        self.check_axis(axis)?;
        Ok(self.current_step[axis])
    }

    /// Step range on one axis.
    pub fn range(&self, axis: usize) -> Result<AxisRange, PositionError> {
        self.check_axis(axis)?;
        Ok(self.range[axis])
    }

    /// Whether `axis` is one of the displayed axes.
    pub fn is_displayed(&self, axis: usize) -> bool {
        self.displayed.contains(&axis)
    }

    /// Collapsed (non-displayed) axes, following the global axis order.
    pub fn collapsed_axes(&self) -> Vec<usize> {
        self.order
            .iter()
            .copied()
            .filter(|a| !self.is_displayed(*a))
            .collect()
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// New snapshot with `axis` pinned at `value`.
    pub fn with_step(&self, axis: usize, value: i64) -> Result<Self, PositionError> {
        self.check_axis(axis)?;
        let r = self.range[axis];
        if !r.contains(value) {
            return Err(PositionError::InvalidStep {
                axis,
                step: value,
                min: r.min,
                max: r.max,
            });
        }
        let mut next = self.clone();
        next.current_step[axis] = value;
        Ok(next)
    }

    /// New snapshot with the axis order replaced.
    pub fn with_order(&self, new_order: Vec<usize>) -> Result<Self, PositionError> {
        validate_order(&new_order, self.ndim)?;
        let mut next = self.clone();
        next.order = new_order;
        Ok(next)
    }

    /// New snapshot with the displayed axes replaced.
    pub fn with_displayed(&self, axes: Vec<usize>) -> Result<Self, PositionError> {
        validate_displayed(&axes, self.ndim)?;
        let mut next = self.clone();
        next.displayed = axes;
        Ok(next)
    }

    /// New snapshot with one axis range replaced, clamping the current step
    /// into the new bounds.
    pub fn with_range(&self, axis: usize, range: AxisRange) -> Result<Self, PositionError> {
        self.check_axis(axis)?;
        if range.max < range.min || range.step < 1 {
            return Err(PositionError::InvalidRange {
                axis,
                min: range.min,
                max: range.max,
                step: range.step,
            });
        }
        let mut next = self.clone();
        next.range[axis] = range;
        next.current_step[axis] = range.clamp(next.current_step[axis]);
        Ok(next)
    }

    // =========================================================================
    // Diffing
    // =========================================================================

    /// Minimal difference between two snapshots of the same dimensionality,
    /// used by the scheduler to decide which layers need reslicing.
    pub fn diff(old: &Self, new: &Self) -> DimsDiff {
        let layout_changed = old.order != new.order || old.displayed != new.displayed;
        let changed_steps = old
            .current_step
            .iter()
            .zip(new.current_step.iter())
            .enumerate()
            .filter(|(_, (o, n))| o != n)
            .map(|(axis, _)| axis)
            .collect();
        DimsDiff {
            changed_steps,
            layout_changed,
        }
    }

    fn check_axis(&self, axis: usize) -> Result<(), PositionError> {
        if axis >= self.ndim {
            return Err(PositionError::InvalidAxis {
                axis,
                ndim: self.ndim,
            });
        }
        Ok(())
    }
}

fn validate_order(order: &[usize], ndim: usize) -> Result<(), PositionError> {
    if order.len() != ndim {
        return Err(PositionError::InvalidOrder {
            order: order.to_vec(),
            ndim,
        });
    }
    let mut seen = vec![false; ndim];
    for &axis in order {
        if axis >= ndim || seen[axis] {
            return Err(PositionError::InvalidOrder {
                order: order.to_vec(),
                ndim,
            });
        }
        seen[axis] = true;
    }
    Ok(())
}

fn validate_displayed(axes: &[usize], ndim: usize) -> Result<(), PositionError> {
    if axes.len() < 2 || axes.len() > 3 {
        return Err(PositionError::InvalidDisplayed {
            axes: axes.to_vec(),
        });
    }
    for (i, &axis) in axes.iter().enumerate() {
        if axis >= ndim {
            return Err(PositionError::InvalidAxis { axis, ndim });
        }
        if axes[..i].contains(&axis) {
            return Err(PositionError::InvalidDisplayed {
                axes: axes.to_vec(),
            });
        }
    }
    Ok(())
}

// =============================================================================
// Diff
// =============================================================================

/// Difference between two position snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimsDiff {
    /// Axes whose current step changed
    pub changed_steps: Vec<usize>,

    /// Whether `order` or `displayed` changed
    pub layout_changed: bool,
}

impl DimsDiff {
    /// Whether this change requires reslicing against the new position.
    ///
    /// Displayed axes are extracted in full, so a step change on a displayed
    /// axis alone does not alter the slice.
    pub fn affects_slicing(&self, new: &Dims) -> bool {
        if self.layout_changed {
            return true;
        }
        self.changed_steps.iter().any(|a| !new.is_displayed(*a))
    }

    /// Whether nothing changed at all.
    pub fn is_empty(&self) -> bool {
        !self.layout_changed && self.changed_steps.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
