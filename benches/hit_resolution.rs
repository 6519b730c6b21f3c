use bevy::prelude::{Entity, Vec3};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use combat_core::config::{BlastParams, CritParams};
use combat_core::hit::{resolve_hits, HitRecord};
use combat_core::spatial::{IndexEntry, LayerMask, Pose, Shape, SpatialQuery};
use combat_core::{ExpandingBlast, SpatialIndex};

/// A crowd scattered over a 40x40 arena.
fn crowd(count: u32) -> SpatialIndex {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let mut index = SpatialIndex::default();
    for id in 0..count {
        let pos = Vec3::new(
            rng.random::<f32>() * 40.0 - 20.0,
            0.0,
            rng.random::<f32>() * 40.0 - 20.0,
        );
        index.insert(IndexEntry {
            collider: Entity::from_raw(id),
            owner: Entity::from_raw(id),
            shape: Shape::Sphere { radius: 0.5 },
            pose: Pose::new(pos, 0.0),
            layers: LayerMask::ENEMY,
        });
    }
    index
}

fn bench_overlap_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_hits");
    for count in [50, 200, 800] {
        let index = crowd(count);
        let shape = Shape::Box {
            half_extents: Vec3::new(1.2, 0.8, 1.5),
        };
        let crit = CritParams {
            chance: 0.2,
            multiplier: 2.0,
        };
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            let mut rng = StdRng::seed_from_u64(7);
            b.iter(|| {
                let mut record = HitRecord::default();
                let resolution = resolve_hits(
                    &index,
                    &shape,
                    &Pose::new(Vec3::ZERO, 0.8),
                    LayerMask::ENEMY,
                    &[],
                    25.0,
                    1.0,
                    &crit,
                    &mut record,
                    |_| false,
                    &mut rng,
                );
                black_box(resolution.count())
            });
        });
    }
    group.finish();
}

fn bench_raycast(c: &mut Criterion) {
    let index = crowd(800);
    c.bench_function("raycast_800_colliders", |b| {
        b.iter(|| {
            black_box(index.raycast(
                Vec3::new(-25.0, 0.0, 0.0),
                Vec3::X,
                50.0,
                LayerMask::ENEMY,
                &[],
            ))
        });
    });
}

fn bench_blast_wave(c: &mut Criterion) {
    let index = crowd(800);
    let params = BlastParams {
        damage: 40.0,
        telegraph: 0.6,
        cooldown: 12.0,
        max_radius: 15.0,
        duration: 0.5,
        force: 2.0,
    };

    c.bench_function("blast_snapshot_800_colliders", |b| {
        b.iter(|| {
            black_box(ExpandingBlast::snapshot(
                &index,
                Vec3::ZERO,
                Entity::from_raw(u32::MAX - 1),
                &params,
                LayerMask::ENEMY,
            ))
        });
    });
}

criterion_group!(
    benches,
    bench_overlap_resolution,
    bench_raycast,
    bench_blast_wave
);
criterion_main!(benches);
