//! Combat Core Library
//!
//! This library provides the server-side combat resolution modules:
//! - Phase-machine action slots (telegraph / active / cooldown, combos)
//! - Overlap and hitscan hit resolution with per-window dedup and crits
//! - Vitality tracking with latched death
//! - Curve-driven knockback with mover pause/resume and surface re-snap
//! - Expanding blast waves with frozen candidate snapshots
//! - Line-of-sight gating for enemy attack starts
//!
//! Everything is tuned through `CombatConfig` (JSON) and driven by the
//! `CombatCorePlugin` system chain; the phase machines and resolvers are
//! plain structs, testable without a frame loop.

pub mod config; // Tuning table: loadouts, knockback params, sanitization
pub mod spatial; // Shapes, layer masks, the flat collider index
pub mod vitality; // Health, damage events, latched death
pub mod channeling; // Telegraph movement lock with slot ownership
pub mod action; // Per-slot phase machines and the drive system
pub mod hit; // Overlap/hitscan resolution, per-window hit records
pub mod knockback; // Curve-driven displacement and mover hand-off
pub mod blast; // Expanding wave with frozen candidate snapshot
pub mod sight; // Line-of-sight gate over the spatial index
pub mod actors; // Teams, colliders, enemy intents, mover facade

// Re-export commonly used types
pub use action::{ActionNotice, ActionNoticeKind, ActionPhase, ActionSlots, PerformRequest, SlotId};
pub use actors::{combatant_bundle, CombatCollider, EnemyIntent, PathFollower, Team, WalkSurface};
pub use blast::ExpandingBlast;
pub use channeling::Channeling;
pub use config::{CombatConfig, ConfigError};
pub use knockback::{Knockback, KnockbackReceiver};
pub use spatial::{LayerMask, Shape, SpatialIndex, SpatialQuery};
pub use vitality::{DamageEvent, DeathEvent, HitLanded, Vitality};

use bevy::prelude::*;

/// The whole combat chain in one plugin. Resolution order within a frame:
/// fresh spatial index, enemy intents, action machines (which spawn waves
/// and emit damage), wave expansion, damage application, then knockback.
pub struct CombatCorePlugin;

impl Plugin for CombatCorePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<Time>()
            .init_resource::<SpatialIndex>()
            .init_resource::<WalkSurface>()
            .init_resource::<CombatConfig>()
            .add_event::<PerformRequest>()
            .add_event::<ActionNotice>()
            .add_event::<DamageEvent>()
            .add_event::<HitLanded>()
            .add_event::<DeathEvent>()
            .add_systems(
                Update,
                (
                    spatial::sync_spatial_index,
                    actors::drive_enemy_intents,
                    action::drive_actions,
                    blast::tick_blasts,
                    vitality::apply_damage_events,
                    knockback::start_knockback,
                    knockback::integrate_knockback,
                    action::deactivate_on_death,
                )
                    .chain(),
            );
    }
}
