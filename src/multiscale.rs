//! Resolution level selection for multiscale pyramids.
//!
//! Pure functions mapping the current viewport (canvas size and world-space
//! field of view) onto the pyramid level whose pixel density best matches
//! the screen. No engine state is involved, which keeps the policy easy to
//! test exhaustively.

/// Relative tolerance when comparing pixel densities, so a level that is
/// exactly 1:1 with the screen is not rejected by floating-point noise.
const DENSITY_EPSILON: f64 = 1e-9;

/// Select the pyramid level to render for the current viewport.
///
/// # Arguments
///
/// * `level_shapes` - per-level axis extents, finest (level 0) first
/// * `displayed` - the axes mapped onto the screen, in render order
/// * `base_scale` - world units per data pixel at level 0, per source axis
/// * `canvas_size_px` - canvas extent in screen pixels, parallel to `displayed`
/// * `field_of_view_world` - world units visible, parallel to `displayed`
///
/// # Selection rule
///
/// A level qualifies when on every displayed axis its data pixels are at
/// least as dense as screen pixels (no upsampling). Among qualifying levels
/// the coarsest wins; between levels with identical density the finer one
/// wins. When no level qualifies (zoomed in past native resolution) the
/// finest level is returned. A single-level pyramid always yields level 0,
/// as does a degenerate viewport.
pub fn select_level(
    level_shapes: &[Vec<usize>],
    displayed: &[usize],
    base_scale: &[f64],
    canvas_size_px: &[f64],
    field_of_view_world: &[f64],
) -> usize {
    if level_shapes.len() < 2 || displayed.is_empty() {
        return 0;
    }
    if canvas_size_px.len() != displayed.len() || field_of_view_world.len() != displayed.len() {
        return 0;
    }
    if canvas_size_px
        .iter()
        .chain(field_of_view_world.iter())
        .any(|v| !v.is_finite() || *v <= 0.0)
    {
        return 0;
    }

    let scores: Vec<f64> = (0..level_shapes.len())
        .map(|level| density_deficit(level_shapes, level, displayed, base_scale, canvas_size_px, field_of_view_world))
        .collect();

    // Scores grow with level (coarser data can only be sparser on screen),
    // so the qualifying levels form a prefix. Walk down from the coarsest.
    let qualifies = |score: f64| score <= 1.0 + DENSITY_EPSILON;
    let mut selected = None;
    for level in (0..scores.len()).rev() {
        if qualifies(scores[level]) {
            selected = Some(level);
            break;
        }
    }

    let Some(mut level) = selected else {
        return 0;
    };

    // Equal densities (duplicate level shapes): prefer the finer level.
    while level > 0 && scores[level - 1] == scores[level] {
        level -= 1;
    }
    level
}

/// Worst-case ratio of world-units-per-data-pixel to world-units-per-screen-
/// pixel across the displayed axes. A value of 1.0 is an exact 1:1 match;
/// above 1.0 the level would be upsampled on screen.
fn density_deficit(
    level_shapes: &[Vec<usize>],
    level: usize,
    displayed: &[usize],
    base_scale: &[f64],
    canvas_size_px: &[f64],
    field_of_view_world: &[f64],
) -> f64 {
    displayed
        .iter()
        .enumerate()
        .map(|(i, &axis)| {
            let scale = base_scale.get(axis).copied().unwrap_or(1.0);
            let world_per_data = scale.abs() * downsample_factor(level_shapes, level, axis);
            let world_per_screen = field_of_view_world[i] / canvas_size_px[i];
            world_per_data / world_per_screen
        })
        .fold(0.0, f64::max)
}

/// Downsample factor of `level` relative to level 0 along `axis`.
pub fn downsample_factor(level_shapes: &[Vec<usize>], level: usize, axis: usize) -> f64 {
    let finest = level_shapes[0].get(axis).copied().unwrap_or(1).max(1) as f64;
    let coarse = level_shapes[level].get(axis).copied().unwrap_or(1).max(1) as f64;
    finest / coarse
}

// =============================================================================
// Tests
// =============================================================================
