//! Vitality — the health/damage model every actor carries
//!
//! Mutation goes through `apply_damage` and `heal` only. Damage requests
//! arrive as buffered `DamageEvent`s; the application system emits a
//! `HitLanded` notification for every applied hit *before* the death check
//! resolves, so hit reactions (flash, knockback) fire even on a lethal
//! blow. Death latches: it is reported exactly once and further damage is
//! ignored until an explicit `reset_to_full` recycles the actor.

use bevy::prelude::*;
use tracing::debug;

use crate::config::HEALTH_EPSILON;

// ============================================================================
// Component
// ============================================================================

/// Current/max health plus the latched death flag.
#[derive(Component, Debug, Clone)]
pub struct Vitality {
    current: f32,
    max: f32,
    dead: bool,
}

/// Result of one `apply_damage` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    /// Non-positive amount or already dead — nothing happened.
    Ignored,
    Applied { fatal: bool },
}

impl Vitality {
    pub fn new(max: f32) -> Self {
        let max = max.max(1.0);
        Self {
            current: max,
            max,
            dead: false,
        }
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn fraction(&self) -> f32 {
        self.current / self.max
    }

    /// Subtract health. No-op for non-positive amounts and for the dead.
    /// Near-zero health counts as death (float-edge clamp).
    pub fn apply_damage(&mut self, amount: f32) -> DamageOutcome {
        if self.dead || amount <= 0.0 {
            return DamageOutcome::Ignored;
        }
        self.current = (self.current - amount).max(0.0);
        if self.current <= HEALTH_EPSILON {
            self.current = 0.0;
            self.dead = true;
            DamageOutcome::Applied { fatal: true }
        } else {
            DamageOutcome::Applied { fatal: false }
        }
    }

    /// Restore health, clamped to max. No-op when dead.
    pub fn heal(&mut self, amount: f32) {
        if self.dead || amount <= 0.0 {
            return;
        }
        self.current = (self.current + amount).min(self.max);
    }

    /// Spawn-time configuration: clamp to >= 1 and refill. Not meant for
    /// mid-fight rescaling.
    pub fn set_max_health(&mut self, max: f32) {
        self.max = max.max(1.0);
        self.current = self.max;
    }

    /// Recycle the record for a fresh run. The only path that un-latches
    /// death.
    pub fn reset_to_full(&mut self) {
        self.dead = false;
        self.current = self.max;
    }
}

impl Default for Vitality {
    fn default() -> Self {
        Self::new(100.0)
    }
}

// ============================================================================
// Events
// ============================================================================

/// Damage request produced by the hit resolver / blast wave. Applied in
/// arrival order by `apply_damage_events`.
#[derive(Event, Debug, Clone)]
pub struct DamageEvent {
    pub source: Entity,
    pub target: Entity,
    pub amount: f32,
    /// World point knockback radiates from, when the hit carries any.
    pub knockback_origin: Option<Vec3>,
    pub knockback_multiplier: f32,
    pub crit: bool,
    /// Approximate impact point, for VFX collaborators.
    pub point: Vec3,
}

/// Fired for every hit that actually subtracted health (fire-and-forget,
/// consumed by VFX/UI and the knockback integrator).
#[derive(Event, Debug, Clone)]
pub struct HitLanded {
    pub target: Entity,
    pub amount: f32,
    pub crit: bool,
    /// This hit is the one that killed the target. Listeners that skip the
    /// dead still react to the killing blow through this.
    pub fatal: bool,
    pub point: Vec3,
    pub knockback_origin: Option<Vec3>,
    pub knockback_multiplier: f32,
}

/// Fired exactly once per vitality record.
#[derive(Event, Debug, Clone)]
pub struct DeathEvent {
    pub entity: Entity,
}

// ============================================================================
// Application System
// ============================================================================

/// System: drain damage requests, mutate vitality, emit notifications.
/// `HitLanded` goes out before `DeathEvent` so reactions see the hit first.
pub fn apply_damage_events(
    mut requests: EventReader<DamageEvent>,
    mut targets: Query<&mut Vitality>,
    mut hits: EventWriter<HitLanded>,
    mut deaths: EventWriter<DeathEvent>,
) {
    for request in requests.read() {
        let Ok(mut vitality) = targets.get_mut(request.target) else {
            continue;
        };
        match vitality.apply_damage(request.amount) {
            DamageOutcome::Ignored => {}
            DamageOutcome::Applied { fatal } => {
                hits.send(HitLanded {
                    target: request.target,
                    amount: request.amount,
                    crit: request.crit,
                    fatal,
                    point: request.point,
                    knockback_origin: request.knockback_origin,
                    knockback_multiplier: request.knockback_multiplier,
                });
                if fatal {
                    debug!(target = ?request.target, "actor died");
                    deaths.send(DeathEvent {
                        entity: request.target,
                    });
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
