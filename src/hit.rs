//! Hit Resolution — overlap queries, per-activation dedup, damage rolls
//!
//! Every activation owns a `HitRecord`; a candidate damaged once in a
//! window stays immune to that window no matter how many frames re-query
//! it. Candidates with several sub-colliders collapse to one vitality via
//! the index's owner links. Crits multiply damage and are reported
//! separately so the UI can tell.

use bevy::prelude::*;
use rand::Rng;
use std::collections::HashSet;

use crate::config::CritParams;
use crate::spatial::{LayerMask, Pose, Shape, SpatialQuery};

// ============================================================================
// Hit Record
// ============================================================================

/// Targets already damaged during the current Active window. Cleared when
/// a new window opens.
#[derive(Debug, Clone, Default)]
pub struct HitRecord {
    hit: HashSet<Entity>,
}

impl HitRecord {
    pub fn clear(&mut self) {
        self.hit.clear();
    }

    pub fn contains(&self, target: Entity) -> bool {
        self.hit.contains(&target)
    }

    pub fn mark(&mut self, target: Entity) {
        self.hit.insert(target);
    }

    pub fn len(&self) -> usize {
        self.hit.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hit.is_empty()
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// One damage application the caller should turn into a `DamageEvent`.
#[derive(Debug, Clone)]
pub struct PendingHit {
    pub target: Entity,
    pub amount: f32,
    pub crit: bool,
    /// The struck collider's position, reported as the impact point.
    pub point: Vec3,
}

/// Outcome of one resolution pass. `new_hits.len()` is the count callers
/// use to stop single-hit actions early.
#[derive(Debug, Clone, Default)]
pub struct HitResolution {
    pub new_hits: Vec<PendingHit>,
}

impl HitResolution {
    pub fn count(&self) -> usize {
        self.new_hits.len()
    }
}

/// Overlap `shape` at `pose` and damage every eligible candidate not yet
/// in `record`. Eligibility: on `mask`, not excluded, not dead. Damage is
/// `amount * step_mult`, optionally doubled-up by the crit roll.
#[allow(clippy::too_many_arguments)]
pub fn resolve_hits<R: Rng>(
    query: &dyn SpatialQuery,
    shape: &Shape,
    pose: &Pose,
    mask: LayerMask,
    excluded: &[Entity],
    amount: f32,
    step_mult: f32,
    crit: &CritParams,
    record: &mut HitRecord,
    is_dead: impl Fn(Entity) -> bool,
    rng: &mut R,
) -> HitResolution {
    let mut resolution = HitResolution::default();
    let mut seen = HashSet::new();

    for hit in query.overlaps(shape, pose, mask, excluded) {
        // A candidate's sub-colliders collapse to one owner
        if !seen.insert(hit.owner) {
            continue;
        }
        if record.contains(hit.owner) || is_dead(hit.owner) {
            continue;
        }
        let (amount, crit) = roll_damage(amount * step_mult, crit, rng);
        record.mark(hit.owner);
        resolution.new_hits.push(PendingHit {
            target: hit.owner,
            amount,
            crit,
            point: hit.position,
        });
    }
    resolution
}

/// Hitscan variant: the closest eligible surface along the ray takes the
/// hit, bodies in between block it. Resolves at most one candidate.
#[allow(clippy::too_many_arguments)]
pub fn resolve_hitscan<R: Rng>(
    query: &dyn SpatialQuery,
    origin: Vec3,
    direction: Vec3,
    max_range: f32,
    mask: LayerMask,
    excluded: &[Entity],
    amount: f32,
    crit: &CritParams,
    record: &mut HitRecord,
    is_dead: impl Fn(Entity) -> bool,
    rng: &mut R,
) -> HitResolution {
    let mut resolution = HitResolution::default();
    let Some(hit) = query.raycast(origin, direction, max_range, LayerMask::ALL, excluded) else {
        return resolution;
    };
    // The ray stops at whatever it hit first; only an eligible target
    // standing there takes damage.
    let target_entry = query
        .overlaps(&Shape::Sphere { radius: 1e-3 }, &Pose::new(hit.point, 0.0), mask, excluded)
        .into_iter()
        .find(|c| c.owner == hit.owner);
    if target_entry.is_none() {
        return resolution;
    }
    if record.contains(hit.owner) || is_dead(hit.owner) {
        return resolution;
    }
    let (amount, crit) = roll_damage(amount, crit, rng);
    record.mark(hit.owner);
    resolution.new_hits.push(PendingHit {
        target: hit.owner,
        amount,
        crit,
        point: hit.point,
    });
    resolution
}

fn roll_damage<R: Rng>(base: f32, crit: &CritParams, rng: &mut R) -> (f32, bool) {
    if crit.chance > 0.0 && rng.random::<f32>() < crit.chance {
        (base * crit.multiplier, true)
    } else {
        (base, false)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{ColliderHit, IndexEntry, RayHit, SpatialIndex};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn actor(id: u32) -> Entity {
        Entity::from_raw(id)
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn no_crit() -> CritParams {
        CritParams {
            chance: 0.0,
            multiplier: 2.0,
        }
    }

    fn arena(positions: &[(u32, Vec3)]) -> SpatialIndex {
        let mut index = SpatialIndex::default();
        for &(id, pos) in positions {
            index.insert(IndexEntry {
                collider: actor(id),
                owner: actor(id),
                shape: Shape::Sphere { radius: 0.4 },
                pose: Pose::new(pos, 0.0),
                layers: LayerMask::ENEMY,
            });
        }
        index
    }

    #[test]
    fn test_resolve_damages_overlapping_candidates() {
        let index = arena(&[
            (1, Vec3::new(1.0, 0.0, 0.0)),
            (2, Vec3::new(0.0, 0.0, 1.0)),
            (3, Vec3::new(9.0, 0.0, 0.0)),
        ]);
        let mut record = HitRecord::default();
        let resolution = resolve_hits(
            &index,
            &Shape::Sphere { radius: 2.0 },
            &Pose::new(Vec3::ZERO, 0.0),
            LayerMask::ENEMY,
            &[],
            10.0,
            1.0,
            &no_crit(),
            &mut record,
            |_| false,
            &mut rng(),
        );
        assert_eq!(resolution.count(), 2);
        assert!(resolution.new_hits.iter().all(|h| (h.amount - 10.0).abs() < 1e-6));
        assert!(!resolution.new_hits.iter().any(|h| h.crit));
    }

    #[test]
    fn test_same_window_never_hits_twice() {
        let index = arena(&[(1, Vec3::new(1.0, 0.0, 0.0))]);
        let mut record = HitRecord::default();
        let shape = Shape::Sphere { radius: 2.0 };
        let pose = Pose::new(Vec3::ZERO, 0.0);

        // Re-query the same held hitbox across several frames
        for frame in 0..5 {
            let resolution = resolve_hits(
                &index, &shape, &pose, LayerMask::ENEMY, &[], 10.0, 1.0, &no_crit(),
                &mut record, |_| false, &mut rng(),
            );
            let expected = if frame == 0 { 1 } else { 0 };
            assert_eq!(resolution.count(), expected, "frame {}", frame);
        }

        // A new window clears the record, the target is hittable again
        record.clear();
        let resolution = resolve_hits(
            &index, &shape, &pose, LayerMask::ENEMY, &[], 10.0, 1.0, &no_crit(),
            &mut record, |_| false, &mut rng(),
        );
        assert_eq!(resolution.count(), 1);
    }

    #[test]
    fn test_sub_colliders_collapse_to_one_hit() {
        let mut index = SpatialIndex::default();
        for (collider, offset) in [(10, Vec3::ZERO), (11, Vec3::Y)] {
            index.insert(IndexEntry {
                collider: actor(collider),
                owner: actor(5),
                shape: Shape::Sphere { radius: 0.3 },
                pose: Pose::new(Vec3::new(1.0, 0.0, 0.0) + offset, 0.0),
                layers: LayerMask::ENEMY,
            });
        }
        let mut record = HitRecord::default();
        let resolution = resolve_hits(
            &index,
            &Shape::Sphere { radius: 3.0 },
            &Pose::new(Vec3::ZERO, 0.0),
            LayerMask::ENEMY,
            &[],
            10.0,
            1.0,
            &no_crit(),
            &mut record,
            |_| false,
            &mut rng(),
        );
        assert_eq!(resolution.count(), 1);
        assert_eq!(resolution.new_hits[0].target, actor(5));
    }

    #[test]
    fn test_dead_and_excluded_candidates_skipped() {
        let index = arena(&[
            (1, Vec3::new(1.0, 0.0, 0.0)),
            (2, Vec3::new(-1.0, 0.0, 0.0)),
        ]);
        let mut record = HitRecord::default();
        let resolution = resolve_hits(
            &index,
            &Shape::Sphere { radius: 3.0 },
            &Pose::new(Vec3::ZERO, 0.0),
            LayerMask::ENEMY,
            &[actor(2)],
            10.0,
            1.0,
            &no_crit(),
            &mut record,
            |e| e == actor(1), // 1 is dead
            &mut rng(),
        );
        assert_eq!(resolution.count(), 0);
        assert!(record.is_empty());
    }

    #[test]
    fn test_step_multiplier_scales_damage() {
        let index = arena(&[(1, Vec3::new(1.0, 0.0, 0.0))]);
        let mut record = HitRecord::default();
        let resolution = resolve_hits(
            &index,
            &Shape::Sphere { radius: 2.0 },
            &Pose::new(Vec3::ZERO, 0.0),
            LayerMask::ENEMY,
            &[],
            20.0,
            1.5,
            &no_crit(),
            &mut record,
            |_| false,
            &mut rng(),
        );
        assert!((resolution.new_hits[0].amount - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_guaranteed_crit_multiplies_and_flags() {
        let index = arena(&[(1, Vec3::new(1.0, 0.0, 0.0))]);
        let mut record = HitRecord::default();
        let crit = CritParams {
            chance: 1.0,
            multiplier: 2.0,
        };
        let resolution = resolve_hits(
            &index,
            &Shape::Sphere { radius: 2.0 },
            &Pose::new(Vec3::ZERO, 0.0),
            LayerMask::ENEMY,
            &[],
            10.0,
            1.0,
            &crit,
            &mut record,
            |_| false,
            &mut rng(),
        );
        assert!(resolution.new_hits[0].crit);
        assert!((resolution.new_hits[0].amount - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_hitscan_hits_closest_target() {
        let index = arena(&[
            (1, Vec3::new(0.0, 0.0, -6.0)),
            (2, Vec3::new(0.0, 0.0, -3.0)),
        ]);
        let mut record = HitRecord::default();
        let resolution = resolve_hitscan(
            &index,
            Vec3::ZERO,
            Vec3::NEG_Z,
            20.0,
            LayerMask::ENEMY,
            &[],
            8.0,
            &no_crit(),
            &mut record,
            |_| false,
            &mut rng(),
        );
        assert_eq!(resolution.count(), 1);
        assert_eq!(resolution.new_hits[0].target, actor(2));
    }

    #[test]
    fn test_hitscan_blocked_by_obstacle() {
        let mut index = arena(&[(1, Vec3::new(0.0, 0.0, -6.0))]);
        index.insert(IndexEntry {
            collider: actor(9),
            owner: actor(9),
            shape: Shape::Box {
                half_extents: Vec3::new(2.0, 2.0, 0.2),
            },
            pose: Pose::new(Vec3::new(0.0, 0.0, -3.0), 0.0),
            layers: LayerMask::OBSTACLE,
        });
        let mut record = HitRecord::default();
        let resolution = resolve_hitscan(
            &index,
            Vec3::ZERO,
            Vec3::NEG_Z,
            20.0,
            LayerMask::ENEMY,
            &[],
            8.0,
            &no_crit(),
            &mut record,
            |_| false,
            &mut rng(),
        );
        assert_eq!(resolution.count(), 0);
    }

    #[test]
    fn test_hitscan_out_of_range() {
        let index = arena(&[(1, Vec3::new(0.0, 0.0, -30.0))]);
        let mut record = HitRecord::default();
        let resolution = resolve_hitscan(
            &index,
            Vec3::ZERO,
            Vec3::NEG_Z,
            20.0,
            LayerMask::ENEMY,
            &[],
            8.0,
            &no_crit(),
            &mut record,
            |_| false,
            &mut rng(),
        );
        assert_eq!(resolution.count(), 0);
    }

    /// The resolver only depends on the `SpatialQuery` seam — prove it by
    /// running against a canned fake instead of the real index.
    #[test]
    fn test_resolver_runs_against_fake_query() {
        struct Canned;
        impl SpatialQuery for Canned {
            fn overlaps(
                &self,
                _shape: &Shape,
                _pose: &Pose,
                _mask: LayerMask,
                _excluded: &[Entity],
            ) -> Vec<ColliderHit> {
                vec![ColliderHit {
                    collider: Entity::from_raw(1),
                    owner: Entity::from_raw(1),
                    position: Vec3::ZERO,
                }]
            }
            fn raycast(
                &self,
                _origin: Vec3,
                _direction: Vec3,
                _max: f32,
                _mask: LayerMask,
                _excluded: &[Entity],
            ) -> Option<RayHit> {
                None
            }
        }

        let mut record = HitRecord::default();
        let resolution = resolve_hits(
            &Canned,
            &Shape::Sphere { radius: 1.0 },
            &Pose::new(Vec3::ZERO, 0.0),
            LayerMask::ALL,
            &[],
            5.0,
            1.0,
            &no_crit(),
            &mut record,
            |_| false,
            &mut rng(),
        );
        assert_eq!(resolution.count(), 1);
    }
}
