//! Actor Assembly — teams, colliders, enemy intent, and the mover façade
//!
//! Provides:
//! - `Team` membership with the layer groups each side queries against
//! - `CombatCollider`: what the spatial index is rebuilt from
//! - `EnemyIntent` + the gating system that turns "target in range, sight
//!   clear, not channeling" into a start request
//! - `PathFollower`: the black-box path mover the knockback integrator
//!   pauses, resumes, and re-snaps (the only three calls it ever makes)
//! - `NavSurface`: navigable-surface sampling with a small-radius fallback

use bevy::prelude::*;
use tracing::debug;

use crate::action::{ActionSlots, PerformRequest, SlotId};
use crate::channeling::Channeling;
use crate::config::Loadout;
use crate::knockback::KnockbackReceiver;
use crate::sight::has_line_of_sight;
use crate::spatial::{LayerMask, Shape, SpatialIndex};
use crate::vitality::Vitality;

// ============================================================================
// Teams and Colliders
// ============================================================================

/// Which side an actor fights for. Decides both the groups its colliders
/// join and the groups its attacks query.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Team {
    Player,
    Enemy,
}

impl Team {
    /// Groups this actor's colliders belong to.
    pub fn layer(self) -> LayerMask {
        match self {
            Team::Player => LayerMask::PLAYER,
            Team::Enemy => LayerMask::ENEMY,
        }
    }

    /// Groups this actor's attacks are allowed to hit.
    pub fn attack_mask(self) -> LayerMask {
        match self {
            Team::Player => LayerMask::ENEMY,
            Team::Enemy => LayerMask::PLAYER,
        }
    }
}

/// Registers the entity in the spatial index. `owner` points at the actor
/// root for sub-colliders (head, limbs); `None` means the entity is its
/// own root.
#[derive(Component, Debug, Clone)]
pub struct CombatCollider {
    pub shape: Shape,
    pub layers: LayerMask,
    pub owner: Option<Entity>,
}

impl CombatCollider {
    pub fn body(shape: Shape, team: Team) -> Self {
        Self {
            shape,
            layers: team.layer(),
            owner: None,
        }
    }

    pub fn obstacle(shape: Shape) -> Self {
        Self {
            shape,
            layers: LayerMask::OBSTACLE,
            owner: None,
        }
    }

    pub fn part_of(owner: Entity, shape: Shape, team: Team) -> Self {
        Self {
            shape,
            layers: team.layer(),
            owner: Some(owner),
        }
    }
}

/// Everything a fighting actor carries besides placement and AI: health,
/// action slots, the channeling latch, a body collider, knockback
/// receptivity, and a mover to pause.
pub fn combatant_bundle(team: Team, max_health: f32, loadout: &Loadout, body: Shape) -> impl Bundle {
    (
        team,
        Vitality::new(max_health),
        ActionSlots::from_loadout(loadout),
        Channeling::default(),
        CombatCollider::body(body, team),
        KnockbackReceiver::default(),
        PathFollower::default(),
    )
}

// ============================================================================
// Enemy Intent
// ============================================================================

/// Drives an enemy's attack decision: which slot it fires at which target,
/// and from how close. Transitions only happen when the target is alive,
/// inside `range`, visible, and the actor is not already channeling.
#[derive(Component, Debug, Clone)]
pub struct EnemyIntent {
    pub target: Option<Entity>,
    pub slot: SlotId,
    pub range: f32,
}

impl EnemyIntent {
    pub fn new(target: Entity, range: f32) -> Self {
        Self {
            target: Some(target),
            slot: SlotId(0),
            range,
        }
    }
}

/// System: evaluate enemy start conditions and emit `PerformRequest`s.
/// Sight is re-queried here every frame — never cached.
pub fn drive_enemy_intents(
    index: Res<SpatialIndex>,
    enemies: Query<(Entity, &Transform, &EnemyIntent, &ActionSlots, &Channeling)>,
    targets: Query<(&Transform, &Vitality)>,
    mut requests: EventWriter<PerformRequest>,
) {
    for (entity, transform, intent, slots, channeling) in enemies.iter() {
        let Some(target) = intent.target else {
            continue;
        };
        let Some(machine) = slots.get(intent.slot) else {
            continue;
        };
        if channeling.is_channeling() || !machine.can_start() {
            continue;
        }
        let Ok((target_tf, target_vitality)) = targets.get(target) else {
            continue;
        };
        if target_vitality.is_dead() {
            continue;
        }
        if transform.translation.distance(target_tf.translation) > intent.range {
            continue;
        }
        if !has_line_of_sight(
            index.as_ref(),
            entity,
            transform.translation,
            target,
            target_tf.translation,
        ) {
            continue;
        }
        debug!(actor = ?entity, ?target, "enemy start condition met");
        requests.send(PerformRequest {
            actor: entity,
            slot: intent.slot,
        });
    }
}

// ============================================================================
// Mover Façade
// ============================================================================

/// The three calls the combat core makes toward the path-following mover.
/// Everything else about pathing is someone else's problem.
pub trait Mover {
    fn pause(&mut self);
    fn resume(&mut self);
    fn teleport_onto_surface(&mut self, point: Vec3);
}

/// Stand-in for the external path follower. Pause depth is counted so a
/// knockback and a script pausing the same mover don't fight over the
/// resume.
#[derive(Component, Debug, Default)]
pub struct PathFollower {
    pause_depth: u32,
    last_snap: Option<Vec3>,
}

impl PathFollower {
    pub fn is_paused(&self) -> bool {
        self.pause_depth > 0
    }

    /// Last point the mover was re-attached at, if any.
    pub fn last_snap(&self) -> Option<Vec3> {
        self.last_snap
    }
}

impl Mover for PathFollower {
    fn pause(&mut self) {
        self.pause_depth += 1;
    }

    fn resume(&mut self) {
        self.pause_depth = self.pause_depth.saturating_sub(1);
    }

    fn teleport_onto_surface(&mut self, point: Vec3) {
        self.last_snap = Some(point);
    }
}

// ============================================================================
// Navigable Surface
// ============================================================================

/// Navigable-surface sampling for the post-knockback re-snap.
pub trait NavSurface: Send + Sync {
    /// Projection of `point` onto the surface, if `point` is navigable.
    fn sample(&self, point: Vec3) -> Option<Vec3>;
    /// Closest navigable point within `radius` of `point`.
    fn nearest_within(&self, point: Vec3, radius: f32) -> Option<Vec3>;
}

/// Resource wrapper so the surface implementation stays swappable.
#[derive(Resource)]
pub struct WalkSurface(pub Box<dyn NavSurface>);

impl Default for WalkSurface {
    fn default() -> Self {
        WalkSurface(Box::new(FlatSurface { half_extent: 100.0 }))
    }
}

/// Flat square arena at y = 0. Anything inside the bounds is navigable.
pub struct FlatSurface {
    pub half_extent: f32,
}

impl NavSurface for FlatSurface {
    fn sample(&self, point: Vec3) -> Option<Vec3> {
        (point.x.abs() <= self.half_extent && point.z.abs() <= self.half_extent)
            .then_some(Vec3::new(point.x, 0.0, point.z))
    }

    fn nearest_within(&self, point: Vec3, radius: f32) -> Option<Vec3> {
        let clamped = Vec3::new(
            point.x.clamp(-self.half_extent, self.half_extent),
            0.0,
            point.z.clamp(-self.half_extent, self.half_extent),
        );
        (clamped.distance(Vec3::new(point.x, 0.0, point.z)) <= radius).then_some(clamped)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_masks_oppose() {
        assert!(Team::Player.attack_mask().intersects(Team::Enemy.layer()));
        assert!(!Team::Player.attack_mask().intersects(Team::Player.layer()));
        assert!(Team::Enemy.attack_mask().intersects(Team::Player.layer()));
    }

    #[test]
    fn test_path_follower_pause_depth() {
        let mut follower = PathFollower::default();
        assert!(!follower.is_paused());
        follower.pause();
        follower.pause();
        follower.resume();
        assert!(follower.is_paused());
        follower.resume();
        assert!(!follower.is_paused());
        // Resume past zero stays at zero
        follower.resume();
        assert!(!follower.is_paused());
    }

    #[test]
    fn test_path_follower_records_snap() {
        let mut follower = PathFollower::default();
        assert_eq!(follower.last_snap(), None);
        follower.teleport_onto_surface(Vec3::new(1.0, 0.0, 2.0));
        assert_eq!(follower.last_snap(), Some(Vec3::new(1.0, 0.0, 2.0)));
    }

    #[test]
    fn test_flat_surface_sample_inside_and_out() {
        let surface = FlatSurface { half_extent: 10.0 };
        assert_eq!(
            surface.sample(Vec3::new(3.0, 1.5, -4.0)),
            Some(Vec3::new(3.0, 0.0, -4.0))
        );
        assert_eq!(surface.sample(Vec3::new(11.0, 0.0, 0.0)), None);
    }

    #[test]
    fn test_flat_surface_nearest_within_radius() {
        let surface = FlatSurface { half_extent: 10.0 };
        // 1 unit off the edge — recoverable with radius 1.5
        assert_eq!(
            surface.nearest_within(Vec3::new(11.0, 0.0, 0.0), 1.5),
            Some(Vec3::new(10.0, 0.0, 0.0))
        );
        // 5 units off — the search radius can't reach
        assert_eq!(surface.nearest_within(Vec3::new(15.0, 0.0, 0.0), 1.5), None);
    }
}
