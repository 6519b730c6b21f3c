//! Area Expansion Resolver — a blast wave that grows to its full radius
//!
//! Provides:
//! - `ExpandingBlast`: a spawned wave entity carrying a candidate snapshot
//! - `tick_blasts`: the system that damages candidates as the front
//!   reaches their snapshotted distance
//!
//! Candidates and their distances are frozen at activation. An enemy that
//! runs away after the wave starts is still hit when the front crosses
//! where it stood; one that walks in afterwards is never hit. The final
//! tick sweeps everything within the full radius so a front that skips
//! past a distance between frames cannot miss anyone.

use bevy::prelude::*;
use tracing::debug;

use crate::config::BlastParams;
use crate::spatial::{LayerMask, Pose, Shape, SpatialQuery};
use crate::vitality::DamageEvent;

// ============================================================================
// Wave Entity
// ============================================================================

#[derive(Debug, Clone)]
struct BlastCandidate {
    target: Entity,
    /// Distance from the wave origin, frozen at activation.
    distance: f32,
    /// Position at activation, reported as the impact point.
    position: Vec3,
    hit: bool,
}

/// One in-flight wave. Lives on its own entity so the caster's slot can
/// cool down (or the caster can die) while the wave keeps expanding.
#[derive(Component, Debug, Clone)]
pub struct ExpandingBlast {
    origin: Vec3,
    source: Entity,
    max_radius: f32,
    duration: f32,
    elapsed: f32,
    damage: f32,
    force: f32,
    candidates: Vec<BlastCandidate>,
}

impl ExpandingBlast {
    /// Freeze the candidate set: everything on `mask` within `max_radius`
    /// of `origin` right now, except the caster's own colliders.
    pub fn snapshot(
        query: &dyn SpatialQuery,
        origin: Vec3,
        source: Entity,
        params: &BlastParams,
        mask: LayerMask,
    ) -> Self {
        let mut candidates: Vec<BlastCandidate> = Vec::new();
        for hit in query.overlaps(
            &Shape::Sphere {
                radius: params.max_radius,
            },
            &Pose::new(origin, 0.0),
            mask,
            &[source],
        ) {
            // Multi-collider actors snapshot once, at their closest part
            let distance = origin.distance(hit.position);
            match candidates.iter_mut().find(|c| c.target == hit.owner) {
                Some(existing) => {
                    if distance < existing.distance {
                        existing.distance = distance;
                        existing.position = hit.position;
                    }
                }
                None => candidates.push(BlastCandidate {
                    target: hit.owner,
                    distance,
                    position: hit.position,
                    hit: false,
                }),
            }
        }
        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        Self {
            origin,
            source,
            max_radius: params.max_radius,
            duration: params.duration.max(f32::EPSILON),
            elapsed: 0.0,
            damage: params.damage,
            force: params.force,
            candidates,
        }
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Current front radius. Grows linearly and clamps at the rim.
    pub fn radius(&self) -> f32 {
        (self.elapsed / self.duration).min(1.0) * self.max_radius
    }

    /// Advance the front by `dt`, returning the candidates it crossed and
    /// whether the wave is spent. The last advance sweeps the full radius.
    fn advance(&mut self, dt: f32) -> (Vec<(Entity, Vec3)>, bool) {
        self.elapsed += dt;
        let finished = self.elapsed >= self.duration;
        let front = self.radius();
        let mut crossed = Vec::new();
        for candidate in &mut self.candidates {
            if candidate.hit {
                continue;
            }
            if candidate.distance <= front || (finished && candidate.distance <= self.max_radius) {
                candidate.hit = true;
                crossed.push((candidate.target, candidate.position));
            }
        }
        (crossed, finished)
    }
}

// ============================================================================
// Tick System
// ============================================================================

/// System: expand every wave, damage the candidates the front crossed,
/// and despawn spent waves.
pub fn tick_blasts(
    time: Res<Time>,
    mut blasts: Query<(Entity, &mut ExpandingBlast)>,
    mut damage: EventWriter<DamageEvent>,
    mut commands: Commands,
) {
    let dt = time.delta_secs();
    for (entity, mut blast) in blasts.iter_mut() {
        let (crossed, finished) = blast.advance(dt);
        for (target, point) in crossed {
            damage.send(DamageEvent {
                source: blast.source,
                target,
                amount: blast.damage,
                knockback_origin: Some(blast.origin),
                knockback_multiplier: blast.force,
                crit: false,
                point,
            });
        }
        if finished {
            debug!(?entity, "blast wave spent");
            commands.entity(entity).despawn();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
