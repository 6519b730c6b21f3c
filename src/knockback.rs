//! Knockback Integrator — curve-driven displacement with mover hand-off
//!
//! Provides:
//! - `EaseCurve`: the displacement shaping curves the tuning table names
//! - `strength`: the health-based falloff `ref / (ref + h)`
//! - `Knockback` / `KnockbackReceiver` components and the `start_knockback`
//!   and `integrate_knockback` systems
//!
//! A knocked-back actor's mover is paused for the ride and resumed after a
//! re-snap onto the navigable surface, so pathing never fights the shove
//! and never resumes from a point it can't stand on. Dying mid-flight does
//! not stop the ride, and the killing blow itself still shoves the body;
//! only a hit on an already-dead target fails to start one.

use bevy::prelude::*;
use bevy::utils::HashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::actors::{Mover, PathFollower, WalkSurface};
use crate::config::{CombatConfig, MIN_TIME_EPSILON};
use crate::vitality::{HitLanded, Vitality};

/// Search radius for re-attaching a mover that landed off the surface.
pub const SNAP_RADIUS: f32 = 1.5;

// ============================================================================
// Curves and Falloff
// ============================================================================

/// Displacement shaping over normalized time. All curves map 0 -> 0 and
/// 1 -> 1; only the distribution in between differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EaseCurve {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    Smooth,
}

impl EaseCurve {
    pub fn sample(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            EaseCurve::Linear => t,
            EaseCurve::EaseIn => t * t,
            EaseCurve::EaseOut => t * (2.0 - t),
            EaseCurve::Smooth => t * t * (3.0 - 2.0 * t),
        }
    }
}

/// Health falloff: heavier (higher max health) targets travel less. At
/// `health == reference` the multiplier is exactly 0.5.
pub fn strength(reference: f32, health: f32) -> f32 {
    reference / (reference + health.max(0.0))
}

// ============================================================================
// Components
// ============================================================================

/// Opt-in marker: actors without one never get shoved (turrets, bosses).
#[derive(Component, Debug, Clone, Copy)]
pub struct KnockbackReceiver {
    pub multiplier: f32,
}

impl Default for KnockbackReceiver {
    fn default() -> Self {
        Self { multiplier: 1.0 }
    }
}

/// An in-flight shove. Present only while the ride lasts.
#[derive(Component, Debug, Clone)]
pub struct Knockback {
    /// Horizontal unit vector away from the hit's origin.
    direction: Vec3,
    total: f32,
    duration: f32,
    elapsed: f32,
    curve: EaseCurve,
}

impl Knockback {
    pub fn new(direction: Vec3, total: f32, duration: f32, curve: EaseCurve) -> Self {
        Self {
            direction,
            total,
            duration: duration.max(MIN_TIME_EPSILON),
            elapsed: 0.0,
            curve,
        }
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn total(&self) -> f32 {
        self.total
    }

    /// Displacement to apply for a `dt` advance, plus whether the ride
    /// finished inside it. The final sliver is included in that last step.
    fn advance(&mut self, dt: f32) -> (f32, bool) {
        let t0 = self.elapsed / self.duration;
        self.elapsed += dt;
        let t1 = (self.elapsed / self.duration).min(1.0);
        let step = self.total * (self.curve.sample(t1) - self.curve.sample(t0));
        (step, self.elapsed >= self.duration)
    }
}

// ============================================================================
// Systems
// ============================================================================

/// System: turn landed hits that carry an origin into knockback rides.
/// Hits on the already-dead or the already-airborne are ignored; the
/// killing blow itself still shoves the body.
pub fn start_knockback(
    mut hits: EventReader<HitLanded>,
    config: Res<CombatConfig>,
    mut targets: Query<
        (&Transform, &Vitality, &KnockbackReceiver, Option<&mut PathFollower>),
        Without<Knockback>,
    >,
    mut commands: Commands,
) {
    // The `Knockback` insert below is deferred, so `Without<Knockback>`
    // alone cannot reject a second hit on the same target this frame.
    let mut started: HashSet<Entity> = HashSet::default();
    for hit in hits.read() {
        let Some(origin) = hit.knockback_origin else {
            continue;
        };
        if started.contains(&hit.target) {
            continue;
        }
        // Query misses cover targets with no receiver and targets already
        // mid-ride.
        let Ok((transform, vitality, receiver, follower)) = targets.get_mut(hit.target) else {
            continue;
        };
        if vitality.is_dead() && !hit.fatal {
            continue;
        }

        let params = &config.knockback;
        let total = params.base_distance
            * strength(params.reference_health, vitality.max())
            * hit.knockback_multiplier
            * receiver.multiplier;
        if total <= f32::EPSILON {
            continue;
        }

        let direction = push_direction(origin, transform);
        if let Some(mut follower) = follower {
            follower.pause();
        }
        started.insert(hit.target);
        debug!(target = ?hit.target, total, "knockback started");
        commands.entity(hit.target).insert(Knockback::new(
            direction,
            total,
            params.duration,
            params.curve,
        ));
    }
}

/// Horizontal push direction away from `origin`. A hit dead-center falls
/// back to shoving the target straight backwards.
fn push_direction(origin: Vec3, transform: &Transform) -> Vec3 {
    let mut away = transform.translation - origin;
    away.y = 0.0;
    let away = away.normalize_or_zero();
    if away != Vec3::ZERO {
        return away;
    }
    let mut back = *transform.back();
    back.y = 0.0;
    let back = back.normalize_or_zero();
    if back != Vec3::ZERO {
        back
    } else {
        Vec3::Z
    }
}

/// System: advance every ride and hand the mover back when it ends.
/// Death mid-ride changes nothing; the displacement completes regardless.
pub fn integrate_knockback(
    time: Res<Time>,
    surface: Res<WalkSurface>,
    mut riders: Query<(Entity, &mut Transform, &mut Knockback, Option<&mut PathFollower>)>,
    mut commands: Commands,
) {
    let dt = time.delta_secs();
    for (entity, mut transform, mut knockback, follower) in riders.iter_mut() {
        let (step, finished) = knockback.advance(dt);
        transform.translation += knockback.direction() * step;
        if !finished {
            continue;
        }

        let landing = transform.translation;
        let snapped = surface
            .0
            .sample(landing)
            .or_else(|| surface.0.nearest_within(landing, SNAP_RADIUS));
        match snapped {
            Some(point) => {
                transform.translation = point;
                if let Some(mut follower) = follower {
                    follower.teleport_onto_surface(point);
                    follower.resume();
                }
            }
            None => {
                // Landed past the snap radius; leave the actor where it
                // is but still give the mover back.
                warn!(?entity, ?landing, "knockback landed off the surface");
                if let Some(mut follower) = follower {
                    follower.resume();
                }
            }
        }
        commands.entity(entity).remove::<Knockback>();
    }
}

// ============================================================================
// Tests
// ============================================================================
