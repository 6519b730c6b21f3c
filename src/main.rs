//! Headless scripted encounter. Spawns a small arena, drives a few frames
//! of combat by hand, and logs what the core resolves — a smoke run for
//! the whole chain without any client attached.

use std::time::Duration;

use anyhow::{Context, Result};
use bevy::prelude::*;
use tracing::info;

use combat_core::{
    combatant_bundle, ActionNotice, CombatCollider, CombatConfig, CombatCorePlugin, DeathEvent,
    EnemyIntent, HitLanded, PerformRequest, Shape, SlotId, Team, Vitality,
};

const FRAME: f32 = 1.0 / 60.0;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading tuning table {path}"))?;
            CombatConfig::from_json(&json).context("parsing tuning table")?
        }
        None => CombatConfig::default(),
    };
    let player_loadout = config
        .loadout("player")
        .context("tuning table has no player loadout")?
        .clone();
    let grunt_loadout = config
        .loadout("grunt")
        .context("tuning table has no grunt loadout")?
        .clone();

    let mut app = App::new();
    app.add_plugins(CombatCorePlugin)
        .add_systems(Update, log_combat_events)
        .insert_resource(config);

    let world = app.world_mut();
    let player = world
        .spawn((
            Transform::from_translation(Vec3::ZERO)
                .looking_at(Vec3::new(0.0, 0.0, -3.0), Vec3::Y),
            combatant_bundle(
                Team::Player,
                100.0,
                &player_loadout,
                Shape::Sphere { radius: 0.5 },
            ),
        ))
        .id();

    world.spawn((
        Transform::from_translation(Vec3::new(0.0, 0.0, -2.0))
            .looking_at(Vec3::ZERO, Vec3::Y),
        combatant_bundle(Team::Enemy, 40.0, &grunt_loadout, Shape::Sphere { radius: 0.5 }),
        EnemyIntent::new(player, 2.5),
    ));

    // Wall between the player and a second grunt: that one stays passive
    // until someone clears its sightline.
    world.spawn((
        Transform::from_translation(Vec3::new(3.0, 0.0, -1.5)),
        CombatCollider::obstacle(Shape::Box {
            half_extents: Vec3::new(0.3, 2.0, 2.0),
        }),
    ));
    world.spawn((
        Transform::from_translation(Vec3::new(6.0, 0.0, -1.5))
            .looking_at(Vec3::ZERO, Vec3::Y),
        combatant_bundle(Team::Enemy, 40.0, &grunt_loadout, Shape::Sphere { radius: 0.5 }),
        EnemyIntent::new(player, 10.0),
    ));

    info!("arena up — running the scripted encounter");

    // Frame 1: the player opens with the basic melee swing.
    app.world_mut().send_event(PerformRequest {
        actor: player,
        slot: SlotId(0),
    });
    run_for(&mut app, 1.0);

    // The blast clears everything in reach, wall or no wall.
    app.world_mut().send_event(PerformRequest {
        actor: player,
        slot: SlotId(4),
    });
    run_for(&mut app, 2.0);

    let mut vitals = app.world_mut().query::<&Vitality>();
    let survivors = vitals
        .iter(app.world())
        .filter(|v| !v.is_dead())
        .count();
    info!(survivors, "encounter finished");
    Ok(())
}

/// Advance the app by fixed frames for `seconds` of simulated time.
fn run_for(app: &mut App, seconds: f32) {
    let frames = (seconds / FRAME).ceil() as u32;
    for _ in 0..frames {
        app.world_mut()
            .resource_mut::<Time>()
            .advance_by(Duration::from_secs_f32(FRAME));
        app.update();
    }
}

fn log_combat_events(
    mut notices: EventReader<ActionNotice>,
    mut hits: EventReader<HitLanded>,
    mut deaths: EventReader<DeathEvent>,
) {
    for notice in notices.read() {
        info!(actor = ?notice.actor, slot = ?notice.slot, kind = ?notice.kind, "action");
    }
    for hit in hits.read() {
        info!(target = ?hit.target, amount = hit.amount, crit = hit.crit, "hit landed");
    }
    for death in deaths.read() {
        info!(entity = ?death.entity, "death");
    }
}
