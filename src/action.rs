//! Action State Machine — telegraph/active/cooldown phases per slot
//!
//! Provides:
//! - `ActionMachine`: one action slot's phase machine, ticked with explicit
//!   delta time so it is testable without a frame loop
//! - `ActionSlots`: the per-actor component holding the loadout's machines
//! - `PerformRequest` / `ActionNotice` events and the `drive_actions` system
//!   that translates phase transitions into hit resolution, channeling
//!   ownership, and blast spawns
//!
//! Leftover delta carries across phase boundaries: a 0.5s tick against a
//! 0.4s telegraph opens the window and burns 0.1s of it in the same call,
//! so timings stay exact at any frame rate.

use bevy::prelude::*;
use bevy::utils::HashMap;
use tracing::{debug, info, warn};

use crate::actors::Team;
use crate::blast::ExpandingBlast;
use crate::channeling::Channeling;
use crate::config::{ActionParams, StepTiming, MIN_SPEED_EPSILON, MIN_TIME_EPSILON};
use crate::hit::{resolve_hits, resolve_hitscan, HitRecord, HitResolution};
use crate::spatial::{Pose, SpatialIndex};
use crate::vitality::{DamageEvent, DeathEvent, Vitality};

// ============================================================================
// Identifiers and Events
// ============================================================================

/// Index of an action slot inside an actor's loadout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub u8);

/// Request to start (or, for combos, continue) the given slot. Emitted by
/// player input plumbing and by `drive_enemy_intents`.
#[derive(Event, Debug, Clone, Copy)]
pub struct PerformRequest {
    pub actor: Entity,
    pub slot: SlotId,
}

/// Phase transition notification for consumers outside the core
/// (animation, VFX, netcode).
#[derive(Event, Debug, Clone, Copy)]
pub struct ActionNotice {
    pub actor: Entity,
    pub slot: SlotId,
    pub kind: ActionNoticeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionNoticeKind {
    TelegraphStarted { step: u8 },
    WindowOpened { step: u8 },
    WindowClosed,
    /// Combo link window expired; the chain reset without a cooldown.
    ComboDropped,
    Cancelled,
}

// ============================================================================
// Phase Machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPhase {
    Idle,
    Telegraph,
    Active,
    /// Combo only: the gap after a non-final swing. Repeat input is
    /// rejected during `min_delay`, then accepted during `link_window`.
    BetweenSwings,
    Cooldown,
}

/// Internal transition record returned by `tick`/`start`/`cancel`, in the
/// order the transitions happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    TelegraphStarted { step: u8 },
    WindowOpened { step: u8 },
    WindowEnded,
    ComboDropped,
    Cancelled,
}

/// One action slot's state. All durations are divided by the owner's
/// action speed when a phase is entered.
#[derive(Debug, Clone)]
pub struct ActionMachine {
    params: ActionParams,
    speed: f32,
    phase: ActionPhase,
    phase_left: f32,
    step: u8,
    link_open: bool,
    record: HitRecord,
}

impl ActionMachine {
    pub fn new(params: ActionParams, speed: f32) -> Self {
        Self {
            params,
            speed: speed.max(MIN_SPEED_EPSILON),
            phase: ActionPhase::Idle,
            phase_left: 0.0,
            step: 0,
            link_open: false,
            record: HitRecord::default(),
        }
    }

    pub fn params(&self) -> &ActionParams {
        &self.params
    }

    pub fn phase(&self) -> ActionPhase {
        self.phase
    }

    pub fn step(&self) -> u8 {
        self.step
    }

    pub fn can_start(&self) -> bool {
        self.phase == ActionPhase::Idle
    }

    /// True while the telegraph holds the movement lock.
    pub fn is_channeling(&self) -> bool {
        self.phase == ActionPhase::Telegraph
    }

    pub fn record_mut(&mut self) -> &mut HitRecord {
        &mut self.record
    }

    fn scaled(&self, base: f32) -> f32 {
        base / self.speed
    }

    fn combo_step(&self) -> StepTiming {
        match &self.params {
            ActionParams::Combo(p) => p
                .steps
                .get(self.step as usize)
                .cloned()
                .unwrap_or(StepTiming {
                    telegraph: MIN_TIME_EPSILON,
                    active: MIN_TIME_EPSILON,
                    damage_mult: 1.0,
                }),
            _ => StepTiming {
                telegraph: 0.0,
                active: 0.0,
                damage_mult: 1.0,
            },
        }
    }

    fn telegraph_base(&self) -> f32 {
        match &self.params {
            ActionParams::Melee(p) => p.telegraph,
            ActionParams::Ranged(p) => p.telegraph,
            // Dashes go live instantly
            ActionParams::Dash(_) => 0.0,
            ActionParams::Combo(_) => self.combo_step().telegraph,
            ActionParams::Blast(p) => p.telegraph,
        }
    }

    fn active_base(&self) -> f32 {
        match &self.params {
            ActionParams::Melee(p) => p.active,
            // Hitscan and wave spawn resolve the instant the window opens
            ActionParams::Ranged(_) | ActionParams::Blast(_) => 0.0,
            ActionParams::Dash(p) => p.duration,
            ActionParams::Combo(_) => self.combo_step().active,
        }
    }

    fn cooldown_base(&self) -> f32 {
        match &self.params {
            ActionParams::Melee(p) => p.cooldown,
            ActionParams::Ranged(p) => p.cooldown,
            ActionParams::Dash(p) => p.cooldown,
            ActionParams::Combo(p) => p.cooldown,
            ActionParams::Blast(p) => p.cooldown,
        }
    }

    fn final_step(&self) -> bool {
        match &self.params {
            ActionParams::Combo(p) => (self.step as usize) + 1 >= p.steps.len(),
            _ => true,
        }
    }

    /// Begin the telegraph. No-op unless Idle.
    pub fn start(&mut self) -> Vec<PhaseEvent> {
        if !self.can_start() {
            return Vec::new();
        }
        self.step = 0;
        self.link_open = false;
        self.phase = ActionPhase::Telegraph;
        self.phase_left = self.scaled(self.telegraph_base());
        vec![PhaseEvent::TelegraphStarted { step: 0 }]
    }

    /// Advance the machine, carrying leftover delta across boundaries.
    /// Zero-length phases are consumed in the same call.
    pub fn tick(&mut self, dt: f32) -> Vec<PhaseEvent> {
        let mut events = Vec::new();
        let mut remaining = dt.max(0.0);
        loop {
            if self.phase == ActionPhase::Idle {
                break;
            }
            if self.phase_left > remaining {
                self.phase_left -= remaining;
                break;
            }
            remaining -= self.phase_left;
            self.phase_left = 0.0;
            self.advance(&mut events);
        }
        events
    }

    fn advance(&mut self, events: &mut Vec<PhaseEvent>) {
        match self.phase {
            ActionPhase::Idle => {}
            ActionPhase::Telegraph => {
                self.record.clear();
                self.phase = ActionPhase::Active;
                self.phase_left = self.scaled(self.active_base());
                events.push(PhaseEvent::WindowOpened { step: self.step });
            }
            ActionPhase::Active => {
                events.push(PhaseEvent::WindowEnded);
                if self.final_step() {
                    self.enter_cooldown();
                } else {
                    self.phase = ActionPhase::BetweenSwings;
                    self.link_open = false;
                    self.phase_left = match &self.params {
                        ActionParams::Combo(p) => self.scaled(p.min_delay),
                        _ => 0.0,
                    };
                }
            }
            ActionPhase::BetweenSwings => {
                if self.link_open {
                    // Link expired: chain resets, no cooldown owed
                    self.phase = ActionPhase::Idle;
                    self.step = 0;
                    self.link_open = false;
                    events.push(PhaseEvent::ComboDropped);
                } else {
                    self.link_open = true;
                    self.phase_left = match &self.params {
                        ActionParams::Combo(p) => self.scaled(p.link_window),
                        _ => 0.0,
                    };
                }
            }
            ActionPhase::Cooldown => {
                self.phase = ActionPhase::Idle;
                self.step = 0;
            }
        }
    }

    fn enter_cooldown(&mut self) {
        self.phase = ActionPhase::Cooldown;
        self.phase_left = self.scaled(self.cooldown_base());
        self.link_open = false;
    }

    /// Repeat input during a combo gap. Accepted only once the link window
    /// is open; advances to the next swing's telegraph.
    pub fn request_repeat(&mut self) -> Vec<PhaseEvent> {
        if self.phase != ActionPhase::BetweenSwings || !self.link_open {
            return Vec::new();
        }
        self.step += 1;
        self.link_open = false;
        self.phase = ActionPhase::Telegraph;
        self.phase_left = self.scaled(self.telegraph_base());
        vec![PhaseEvent::TelegraphStarted { step: self.step }]
    }

    /// Interrupt the action. The full cooldown is always paid; a cancel is
    /// never a way to skip one.
    pub fn cancel(&mut self) -> Vec<PhaseEvent> {
        match self.phase {
            ActionPhase::Idle | ActionPhase::Cooldown => Vec::new(),
            _ => {
                self.step = 0;
                self.enter_cooldown();
                vec![PhaseEvent::Cancelled]
            }
        }
    }

    /// Hard reset to Idle with no cooldown. Used on death.
    pub fn deactivate(&mut self) {
        self.phase = ActionPhase::Idle;
        self.phase_left = 0.0;
        self.step = 0;
        self.link_open = false;
        self.record.clear();
    }
}

// ============================================================================
// Per-Actor Slots
// ============================================================================

/// The actor's loadout, one machine per configured action.
#[derive(Component, Debug, Clone)]
pub struct ActionSlots {
    slots: Vec<ActionMachine>,
}

impl ActionSlots {
    pub fn from_loadout(loadout: &crate::config::Loadout) -> Self {
        Self {
            slots: loadout
                .actions
                .iter()
                .map(|params| ActionMachine::new(params.clone(), loadout.speed))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, slot: SlotId) -> Option<&ActionMachine> {
        self.slots.get(slot.0 as usize)
    }

    pub fn get_mut(&mut self, slot: SlotId) -> Option<&mut ActionMachine> {
        self.slots.get_mut(slot.0 as usize)
    }

    pub fn deactivate_all(&mut self) {
        for machine in &mut self.slots {
            machine.deactivate();
        }
    }

    /// Cancel every slot except `keep`. Returns the cancelled slots with
    /// their transition events, for channeling cleanup.
    pub fn cancel_all_except(&mut self, keep: SlotId) -> Vec<(SlotId, Vec<PhaseEvent>)> {
        let mut cancelled = Vec::new();
        for (i, machine) in self.slots.iter_mut().enumerate() {
            let slot = SlotId(i as u8);
            if slot == keep {
                continue;
            }
            let events = machine.cancel();
            if !events.is_empty() {
                cancelled.push((slot, events));
            }
        }
        cancelled
    }
}

// ============================================================================
// Drive System
// ============================================================================

/// System: consume `PerformRequest`s, tick every machine, and act on the
/// transitions — channeling ownership, hit resolution, blast spawns.
#[allow(clippy::too_many_arguments)]
pub fn drive_actions(
    time: Res<Time>,
    index: Res<SpatialIndex>,
    mut requests: EventReader<PerformRequest>,
    mut actors: Query<(Entity, &Transform, &Team, &mut ActionSlots, &mut Channeling)>,
    vitality: Query<&Vitality>,
    mut damage: EventWriter<DamageEvent>,
    mut notices: EventWriter<ActionNotice>,
    mut commands: Commands,
) {
    let dt = time.delta_secs();
    let mut requested: HashMap<Entity, Vec<SlotId>> = HashMap::default();
    for request in requests.read() {
        requested.entry(request.actor).or_default().push(request.slot);
    }

    let mut rng = rand::rng();
    let is_dead = |e: Entity| vitality.get(e).map(|v| v.is_dead()).unwrap_or(false);

    for (entity, transform, team, mut slots, mut channeling) in actors.iter_mut() {
        // Dead actors are parked by `deactivate_on_death`; skip them here
        // so a corpse never answers a stale request.
        if is_dead(entity) {
            continue;
        }

        let (yaw, _, _) = transform.rotation.to_euler(EulerRot::YXZ);
        let origin = transform.translation;
        let forward = *transform.forward();

        // 1. Honor this frame's requests.
        if let Some(slot_ids) = requested.get(&entity) {
            for &slot in slot_ids {
                let (is_dash, phase) = match slots.get(slot) {
                    Some(machine) => (
                        matches!(machine.params(), ActionParams::Dash(_)),
                        machine.phase(),
                    ),
                    None => {
                        warn!(actor = ?entity, ?slot, "request for unknown slot");
                        continue;
                    }
                };

                if phase == ActionPhase::BetweenSwings {
                    let Some(machine) = slots.get_mut(slot) else {
                        continue;
                    };
                    let events = machine.request_repeat();
                    if events.is_empty() {
                        debug!(actor = ?entity, ?slot, "combo repeat too early, rejected");
                    }
                    handle_events(entity, slot, &events, &mut channeling, &mut notices);
                    continue;
                }

                if channeling.is_channeling() && !is_dash {
                    debug!(actor = ?entity, ?slot, "request ignored while channeling");
                    continue;
                }
                if phase != ActionPhase::Idle {
                    continue;
                }

                // Dashes cut through whatever else the actor was doing.
                if is_dash {
                    for (other, events) in slots.cancel_all_except(slot) {
                        handle_events(entity, other, &events, &mut channeling, &mut notices);
                    }
                }
                if let Some(machine) = slots.get_mut(slot) {
                    let events = machine.start();
                    handle_events(entity, slot, &events, &mut channeling, &mut notices);
                }
            }
        }

        // 2. Tick every slot and act on its transitions.
        for i in 0..slots.len() {
            let slot = SlotId(i as u8);
            let Some(machine) = slots.get_mut(slot) else {
                continue;
            };
            let events = machine.tick(dt);
            let opened = events
                .iter()
                .any(|e| matches!(e, PhaseEvent::WindowOpened { .. }));
            let params = machine.params().clone();
            let phase = machine.phase();
            let step = machine.step();
            handle_events(entity, slot, &events, &mut channeling, &mut notices);

            // Held hitboxes re-query every Active frame; instant kinds
            // resolve exactly once, on the frame the window opened.
            if !opened && phase != ActionPhase::Active {
                continue;
            }

            match &params {
                ActionParams::Melee(p) => {
                    let shape = p.shape.to_shape(p.size_mult);
                    let pose = Pose::new(origin + forward * p.reach, yaw);
                    let Some(machine) = slots.get_mut(slot) else {
                        continue;
                    };
                    let resolution = resolve_hits(
                        index.as_ref(),
                        &shape,
                        &pose,
                        team.attack_mask(),
                        &[entity],
                        p.damage,
                        1.0,
                        &p.crit,
                        machine.record_mut(),
                        is_dead,
                        &mut rng,
                    );
                    send_damage(&resolution, entity, origin, p.knockback_mult, &mut damage);
                }
                ActionParams::Combo(p) => {
                    let shape = p.shape.to_shape(p.size_mult);
                    let pose = Pose::new(origin + forward * p.reach, yaw);
                    let mult = p
                        .steps
                        .get(step as usize)
                        .map(|s| s.damage_mult)
                        .unwrap_or(1.0);
                    let Some(machine) = slots.get_mut(slot) else {
                        continue;
                    };
                    let resolution = resolve_hits(
                        index.as_ref(),
                        &shape,
                        &pose,
                        team.attack_mask(),
                        &[entity],
                        p.damage,
                        mult,
                        &p.crit,
                        machine.record_mut(),
                        is_dead,
                        &mut rng,
                    );
                    send_damage(&resolution, entity, origin, p.knockback_mult, &mut damage);
                }
                ActionParams::Ranged(p) => {
                    if !opened {
                        continue;
                    }
                    let Some(machine) = slots.get_mut(slot) else {
                        continue;
                    };
                    let resolution = resolve_hitscan(
                        index.as_ref(),
                        origin,
                        forward,
                        p.max_range,
                        team.attack_mask(),
                        &[entity],
                        p.damage,
                        &p.crit,
                        machine.record_mut(),
                        is_dead,
                        &mut rng,
                    );
                    send_damage(&resolution, entity, origin, p.knockback_mult, &mut damage);
                }
                ActionParams::Blast(p) => {
                    if !opened {
                        continue;
                    }
                    let blast = ExpandingBlast::snapshot(
                        index.as_ref(),
                        origin,
                        entity,
                        p,
                        team.attack_mask(),
                    );
                    info!(actor = ?entity, candidates = blast.candidate_count(), "blast wave spawned");
                    commands.spawn(blast);
                }
                ActionParams::Dash(_) => {}
            }
        }
    }
}

fn handle_events(
    actor: Entity,
    slot: SlotId,
    events: &[PhaseEvent],
    channeling: &mut Channeling,
    notices: &mut EventWriter<ActionNotice>,
) {
    for event in events {
        let kind = match *event {
            PhaseEvent::TelegraphStarted { step } => {
                channeling.set(slot);
                ActionNoticeKind::TelegraphStarted { step }
            }
            PhaseEvent::WindowOpened { step } => {
                channeling.release(slot);
                ActionNoticeKind::WindowOpened { step }
            }
            PhaseEvent::WindowEnded => ActionNoticeKind::WindowClosed,
            PhaseEvent::ComboDropped => ActionNoticeKind::ComboDropped,
            PhaseEvent::Cancelled => {
                channeling.release(slot);
                ActionNoticeKind::Cancelled
            }
        };
        notices.send(ActionNotice { actor, slot, kind });
    }
}

fn send_damage(
    resolution: &HitResolution,
    source: Entity,
    origin: Vec3,
    knockback_mult: f32,
    damage: &mut EventWriter<DamageEvent>,
) {
    for hit in &resolution.new_hits {
        damage.send(DamageEvent {
            source,
            target: hit.target,
            amount: hit.amount,
            knockback_origin: Some(origin),
            knockback_multiplier: knockback_mult,
            crit: hit.crit,
            point: hit.point,
        });
    }
}

/// System: park every slot, drop the movement lock, and pull the corpse
/// out of the spatial index when an actor dies. A body on the ground
/// neither blocks rays nor soaks hits.
pub fn deactivate_on_death(
    mut deaths: EventReader<DeathEvent>,
    mut actors: Query<(&mut ActionSlots, &mut Channeling)>,
    mut commands: Commands,
) {
    for death in deaths.read() {
        if let Ok((mut slots, mut channeling)) = actors.get_mut(death.entity) {
            slots.deactivate_all();
            channeling.force_clear();
            commands.entity(death.entity).remove::<crate::actors::CombatCollider>();
            info!(entity = ?death.entity, "actions deactivated on death");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
