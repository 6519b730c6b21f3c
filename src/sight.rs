//! Sight Gate — line-of-sight test between an actor and a target
//!
//! Pure, stateless query over the spatial index, re-run fresh at every
//! decision point (everything moves every frame, caching would lie). A ray
//! from the origin toward the target is clear when it strikes nothing, or
//! when the first thing it strikes belongs to the target's own hierarchy —
//! a body never occludes itself.

use bevy::prelude::*;

use crate::spatial::{LayerMask, SpatialQuery};

/// Targets closer than this are always visible (degenerate ray).
pub const SIGHT_EPSILON: f32 = 1e-3;

/// Ray test from `origin` toward `target_point`. `source` is excluded so
/// the viewer's own colliders never block the ray; a hit owned by
/// `target` counts as seeing the target, not as occlusion.
pub fn has_line_of_sight(
    query: &dyn SpatialQuery,
    source: Entity,
    origin: Vec3,
    target: Entity,
    target_point: Vec3,
) -> bool {
    let delta = target_point - origin;
    let distance = delta.length();
    if distance < SIGHT_EPSILON {
        return true;
    }
    match query.raycast(origin, delta / distance, distance, LayerMask::ALL, &[source]) {
        None => true,
        Some(hit) => hit.owner == target,
    }
}
