//! Spatial Queries — shapes, layer masks, and the overlap/raycast abstraction
//!
//! Provides:
//! - `Shape` (sphere / oriented box) and `Pose` for attack volumes
//! - `LayerMask` group constants for eligibility filtering
//! - The `SpatialQuery` trait the hit resolver and sight gate run against
//! - `SpatialIndex`: a flat, rebuilt-per-frame index over `CombatCollider`s
//!
//! No physics engine required — overlap tests run in the attacker's local
//! space, raycasts use segment/sphere and slab tests. The trait seam exists
//! so resolver logic stays testable against a hand-rolled index.

use bevy::prelude::*;

use crate::actors::CombatCollider;

// ============================================================================
// Layer Masks
// ============================================================================

/// Bit groups for collider filtering. Each collider belongs to one or more
/// groups; queries pass the set of groups they are interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const NONE: LayerMask = LayerMask(0);
    /// Player characters
    pub const PLAYER: LayerMask = LayerMask(1 << 0);
    /// Enemy monsters and NPCs
    pub const ENEMY: LayerMask = LayerMask(1 << 1);
    /// Static walls and obstacles (sight blockers)
    pub const OBSTACLE: LayerMask = LayerMask(1 << 2);
    /// Projectiles
    pub const PROJECTILE: LayerMask = LayerMask(1 << 3);
    pub const ALL: LayerMask = LayerMask(u32::MAX);

    /// True if the two masks share at least one group.
    pub fn intersects(self, other: LayerMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for LayerMask {
    type Output = LayerMask;
    fn bitor(self, rhs: LayerMask) -> LayerMask {
        LayerMask(self.0 | rhs.0)
    }
}

// ============================================================================
// Shapes and Poses
// ============================================================================

/// An attack/collider volume. Boxes are oriented by the pose yaw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
}

impl Shape {
    /// Uniformly scale the shape by a size multiplier.
    pub fn scaled(&self, size: f32) -> Shape {
        let s = size.max(f32::EPSILON);
        match *self {
            Shape::Sphere { radius } => Shape::Sphere { radius: radius * s },
            Shape::Box { half_extents } => Shape::Box {
                half_extents: half_extents * s,
            },
        }
    }

    /// Radius of the bounding sphere, used to inflate point tests so a
    /// target's own collider extent counts toward the overlap.
    pub fn bounding_radius(&self) -> f32 {
        match *self {
            Shape::Sphere { radius } => radius,
            Shape::Box { half_extents } => half_extents.length(),
        }
    }

    /// Point containment against this shape at `pose`, inflated by
    /// `inflate` (typically the candidate collider's bounding radius).
    /// Box containment runs in the pose's local space.
    pub fn contains(&self, pose: &Pose, point: Vec3, inflate: f32) -> bool {
        match *self {
            Shape::Sphere { radius } => {
                let r = radius + inflate;
                point.distance_squared(pose.position) <= r * r
            }
            Shape::Box { half_extents } => {
                let local = pose.to_local(point);
                local.x.abs() <= half_extents.x + inflate
                    && local.y.abs() <= half_extents.y + inflate
                    && local.z.abs() <= half_extents.z + inflate
            }
        }
    }
}

/// World placement of a shape: position plus yaw (combat volumes never
/// pitch or roll).
#[derive(Debug, Clone, Copy)]
pub struct Pose {
    pub position: Vec3,
    pub yaw: f32,
}

impl Pose {
    pub fn new(position: Vec3, yaw: f32) -> Self {
        Self { position, yaw }
    }

    /// Transform a world point into this pose's local space.
    pub fn to_local(&self, point: Vec3) -> Vec3 {
        Quat::from_rotation_y(-self.yaw) * (point - self.position)
    }
}

// ============================================================================
// Query Trait
// ============================================================================

/// A collider returned by an overlap query. `owner` is the actor root the
/// collider belongs to — multi-collider actors deduplicate through it.
#[derive(Debug, Clone, Copy)]
pub struct ColliderHit {
    pub collider: Entity,
    pub owner: Entity,
    pub position: Vec3,
}

/// The closest surface struck by a raycast.
#[derive(Debug, Clone, Copy)]
pub struct RayHit {
    pub collider: Entity,
    pub owner: Entity,
    pub distance: f32,
    pub point: Vec3,
}

/// Geometric queries the combat core needs from the world. Implemented by
/// `SpatialIndex`; tests may substitute their own index.
pub trait SpatialQuery {
    /// All colliders overlapping `shape` at `pose`, restricted to `mask`,
    /// excluding any collider whose owner appears in `excluded`.
    fn overlaps(
        &self,
        shape: &Shape,
        pose: &Pose,
        mask: LayerMask,
        excluded: &[Entity],
    ) -> Vec<ColliderHit>;

    /// Closest surface along `origin + t * direction`, `t` in `[0, max]`,
    /// restricted to `mask`, excluding owners in `excluded`.
    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max: f32,
        mask: LayerMask,
        excluded: &[Entity],
    ) -> Option<RayHit>;
}

// ============================================================================
// Flat Index
// ============================================================================

/// One registered collider in the index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub collider: Entity,
    pub owner: Entity,
    pub shape: Shape,
    pub pose: Pose,
    pub layers: LayerMask,
}

/// Flat collider index, cleared and rebuilt from `CombatCollider`
/// components every frame (actors move every frame, so nothing is cached).
#[derive(Resource, Debug, Default)]
pub struct SpatialIndex {
    entries: Vec<IndexEntry>,
}

impl SpatialIndex {
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn insert(&mut self, entry: IndexEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SpatialQuery for SpatialIndex {
    fn overlaps(
        &self,
        shape: &Shape,
        pose: &Pose,
        mask: LayerMask,
        excluded: &[Entity],
    ) -> Vec<ColliderHit> {
        self.entries
            .iter()
            .filter(|e| e.layers.intersects(mask))
            .filter(|e| !excluded.contains(&e.owner))
            .filter(|e| shape.contains(pose, e.pose.position, e.shape.bounding_radius()))
            .map(|e| ColliderHit {
                collider: e.collider,
                owner: e.owner,
                position: e.pose.position,
            })
            .collect()
    }

    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max: f32,
        mask: LayerMask,
        excluded: &[Entity],
    ) -> Option<RayHit> {
        let dir = direction.normalize_or_zero();
        if dir == Vec3::ZERO {
            return None;
        }

        let mut best: Option<RayHit> = None;
        for e in &self.entries {
            if !e.layers.intersects(mask) || excluded.contains(&e.owner) {
                continue;
            }
            let t = match e.shape {
                Shape::Sphere { radius } => ray_sphere(origin, dir, max, e.pose.position, radius),
                Shape::Box { half_extents } => ray_obb(origin, dir, max, &e.pose, half_extents),
            };
            if let Some(t) = t {
                if best.map_or(true, |b| t < b.distance) {
                    best = Some(RayHit {
                        collider: e.collider,
                        owner: e.owner,
                        distance: t,
                        point: origin + dir * t,
                    });
                }
            }
        }
        best
    }
}

/// Segment/sphere intersection. Returns the entry distance, 0.0 when the
/// origin starts inside.
fn ray_sphere(origin: Vec3, dir: Vec3, max: f32, center: Vec3, radius: f32) -> Option<f32> {
    let to_center = center - origin;
    if to_center.length_squared() <= radius * radius {
        return Some(0.0);
    }
    let proj = to_center.dot(dir);
    if proj < 0.0 {
        return None;
    }
    let closest_sq = to_center.length_squared() - proj * proj;
    let r_sq = radius * radius;
    if closest_sq > r_sq {
        return None;
    }
    let t = proj - (r_sq - closest_sq).sqrt();
    (t >= 0.0 && t <= max).then_some(t)
}

/// Segment/oriented-box intersection via the slab method in the box's
/// local space. Returns the entry distance, 0.0 when starting inside.
fn ray_obb(origin: Vec3, dir: Vec3, max: f32, pose: &Pose, half: Vec3) -> Option<f32> {
    let local_origin = pose.to_local(origin);
    let local_dir = Quat::from_rotation_y(-pose.yaw) * dir;

    let mut t_enter = 0.0_f32;
    let mut t_exit = max;
    for axis in 0..3 {
        let (o, d, h) = match axis {
            0 => (local_origin.x, local_dir.x, half.x),
            1 => (local_origin.y, local_dir.y, half.y),
            _ => (local_origin.z, local_dir.z, half.z),
        };
        if d.abs() < 1e-8 {
            if o.abs() > h {
                return None;
            }
            continue;
        }
        let mut t0 = (-h - o) / d;
        let mut t1 = (h - o) / d;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_enter = t_enter.max(t0);
        t_exit = t_exit.min(t1);
        if t_enter > t_exit {
            return None;
        }
    }
    Some(t_enter.max(0.0))
}

// ============================================================================
// Index Sync System
// ============================================================================

/// System: rebuild the flat index from every `CombatCollider` in the world.
/// Runs first in the combat chain so the frame's queries see fresh poses.
pub fn sync_spatial_index(
    mut index: ResMut<SpatialIndex>,
    colliders: Query<(Entity, &Transform, &CombatCollider)>,
) {
    index.clear();
    for (entity, transform, collider) in colliders.iter() {
        let (yaw, _, _) = transform.rotation.to_euler(EulerRot::YXZ);
        index.insert(IndexEntry {
            collider: entity,
            owner: collider.owner.unwrap_or(entity),
            shape: collider.shape,
            pose: Pose::new(transform.translation, yaw),
            layers: collider.layers,
        });
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u32, owner: u32, pos: Vec3, shape: Shape, layers: LayerMask) -> IndexEntry {
        IndexEntry {
            collider: Entity::from_raw(id),
            owner: Entity::from_raw(owner),
            shape,
            pose: Pose::new(pos, 0.0),
            layers,
        }
    }

    #[test]
    fn test_layer_mask_intersection() {
        assert!(LayerMask::ENEMY.intersects(LayerMask::ENEMY | LayerMask::PLAYER));
        assert!(!LayerMask::ENEMY.intersects(LayerMask::PLAYER));
        assert!(!LayerMask::NONE.intersects(LayerMask::ALL));
    }

    #[test]
    fn test_sphere_contains_inflated() {
        let shape = Shape::Sphere { radius: 1.0 };
        let pose = Pose::new(Vec3::ZERO, 0.0);
        // Just outside the raw radius, but inside with 0.5 inflation
        assert!(!shape.contains(&pose, Vec3::new(1.2, 0.0, 0.0), 0.0));
        assert!(shape.contains(&pose, Vec3::new(1.2, 0.0, 0.0), 0.5));
    }

    #[test]
    fn test_box_contains_respects_yaw() {
        let shape = Shape::Box {
            half_extents: Vec3::new(0.5, 1.0, 2.0),
        };
        // Long axis points down -Z when yaw = 0
        let ahead = Pose::new(Vec3::ZERO, 0.0);
        assert!(shape.contains(&ahead, Vec3::new(0.0, 0.0, -1.8), 0.0));
        assert!(!shape.contains(&ahead, Vec3::new(1.8, 0.0, 0.0), 0.0));

        // Rotate 90° — the long axis now sweeps along X
        let turned = Pose::new(Vec3::ZERO, std::f32::consts::FRAC_PI_2);
        assert!(turned.to_local(Vec3::new(-1.8, 0.0, 0.0)).z.abs() > 1.0);
        assert!(shape.contains(&turned, Vec3::new(-1.8, 0.0, 0.0), 0.0));
    }

    #[test]
    fn test_shape_scaled() {
        let s = Shape::Sphere { radius: 2.0 }.scaled(1.5);
        assert!(matches!(s, Shape::Sphere { radius } if (radius - 3.0).abs() < 1e-6));
        let b = Shape::Box {
            half_extents: Vec3::ONE,
        }
        .scaled(2.0);
        assert!(matches!(b, Shape::Box { half_extents } if half_extents == Vec3::splat(2.0)));
    }

    #[test]
    fn test_overlap_filters_layers_and_exclusions() {
        let mut index = SpatialIndex::default();
        index.insert(entry(1, 1, Vec3::new(1.0, 0.0, 0.0), Shape::Sphere { radius: 0.4 }, LayerMask::ENEMY));
        index.insert(entry(2, 2, Vec3::new(-1.0, 0.0, 0.0), Shape::Sphere { radius: 0.4 }, LayerMask::PLAYER));
        index.insert(entry(3, 3, Vec3::new(0.5, 0.0, 0.0), Shape::Sphere { radius: 0.4 }, LayerMask::ENEMY));

        let shape = Shape::Sphere { radius: 2.0 };
        let pose = Pose::new(Vec3::ZERO, 0.0);

        let hits = index.overlaps(&shape, &pose, LayerMask::ENEMY, &[]);
        assert_eq!(hits.len(), 2);

        let hits = index.overlaps(&shape, &pose, LayerMask::ENEMY, &[Entity::from_raw(3)]);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].owner, Entity::from_raw(1));
    }

    #[test]
    fn test_overlap_sub_colliders_share_owner() {
        let mut index = SpatialIndex::default();
        // Two colliders, one owner (e.g. torso + head)
        index.insert(entry(10, 7, Vec3::new(1.0, 0.0, 0.0), Shape::Sphere { radius: 0.3 }, LayerMask::ENEMY));
        index.insert(entry(11, 7, Vec3::new(1.0, 1.0, 0.0), Shape::Sphere { radius: 0.2 }, LayerMask::ENEMY));

        let hits = index.overlaps(
            &Shape::Sphere { radius: 3.0 },
            &Pose::new(Vec3::ZERO, 0.0),
            LayerMask::ENEMY,
            &[],
        );
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.owner == Entity::from_raw(7)));
    }

    #[test]
    fn test_raycast_hits_closest() {
        let mut index = SpatialIndex::default();
        index.insert(entry(1, 1, Vec3::new(0.0, 0.0, -5.0), Shape::Sphere { radius: 0.5 }, LayerMask::ENEMY));
        index.insert(entry(2, 2, Vec3::new(0.0, 0.0, -2.0), Shape::Sphere { radius: 0.5 }, LayerMask::ENEMY));

        let hit = index
            .raycast(Vec3::ZERO, Vec3::NEG_Z, 10.0, LayerMask::ALL, &[])
            .unwrap();
        assert_eq!(hit.owner, Entity::from_raw(2));
        assert!((hit.distance - 1.5).abs() < 1e-4);
    }

    #[test]
    fn test_raycast_respects_max_distance() {
        let mut index = SpatialIndex::default();
        index.insert(entry(1, 1, Vec3::new(0.0, 0.0, -5.0), Shape::Sphere { radius: 0.5 }, LayerMask::ENEMY));

        assert!(index
            .raycast(Vec3::ZERO, Vec3::NEG_Z, 3.0, LayerMask::ALL, &[])
            .is_none());
        assert!(index
            .raycast(Vec3::ZERO, Vec3::NEG_Z, 6.0, LayerMask::ALL, &[])
            .is_some());
    }

    #[test]
    fn test_raycast_through_obb_wall() {
        let mut index = SpatialIndex::default();
        let mut wall = entry(
            1,
            1,
            Vec3::new(0.0, 0.0, -4.0),
            Shape::Box {
                half_extents: Vec3::new(3.0, 2.0, 0.25),
            },
            LayerMask::OBSTACLE,
        );
        wall.pose.yaw = 0.0;
        index.insert(wall);

        let hit = index
            .raycast(Vec3::ZERO, Vec3::NEG_Z, 10.0, LayerMask::OBSTACLE, &[])
            .unwrap();
        assert!((hit.distance - 3.75).abs() < 1e-3);

        // Ray parallel to the wall never touches it
        assert!(index
            .raycast(Vec3::new(5.0, 0.0, 0.0), Vec3::NEG_Z, 10.0, LayerMask::OBSTACLE, &[])
            .is_none());
    }

    #[test]
    fn test_raycast_origin_inside_collider() {
        let mut index = SpatialIndex::default();
        index.insert(entry(1, 1, Vec3::ZERO, Shape::Sphere { radius: 1.0 }, LayerMask::ENEMY));

        let hit = index
            .raycast(Vec3::new(0.2, 0.0, 0.0), Vec3::NEG_Z, 10.0, LayerMask::ALL, &[])
            .unwrap();
        assert_eq!(hit.distance, 0.0);
    }

    #[test]
    fn test_raycast_zero_direction() {
        let mut index = SpatialIndex::default();
        index.insert(entry(1, 1, Vec3::ZERO, Shape::Sphere { radius: 1.0 }, LayerMask::ALL));
        assert!(index.raycast(Vec3::ZERO, Vec3::ZERO, 10.0, LayerMask::ALL, &[]).is_none());
    }
}
