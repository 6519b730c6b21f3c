//! Combat Tuning Tables — numeric parameters from the upgrade/config collaborator
//!
//! The core only ever receives numbers: damage, durations, cooldowns, hitbox
//! sizes, knockback distances. Rarity and progression logic live elsewhere.
//! Tables load from JSON (`CombatConfig::from_json`) or come from the
//! hand-authored defaults below; either way `sanitize` clamps degenerate
//! values so every timer eventually advances and no division hits zero.

use std::collections::HashMap;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::knockback::EaseCurve;
use crate::spatial::Shape;

/// Smallest accepted duration. Zero/negative durations are configuration
/// mistakes; clamping keeps the state machines live.
pub const MIN_TIME_EPSILON: f32 = 1e-4;
/// Floor for action-speed multipliers (durations divide by speed).
pub const MIN_SPEED_EPSILON: f32 = 1e-3;
/// Health at or below this counts as death.
pub const HEALTH_EPSILON: f32 = 1e-3;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse combat config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("loadout `{0}` has no actions")]
    EmptyLoadout(String),
}

// ============================================================================
// Shape Parameters
// ============================================================================

/// Serializable hitbox shape. Box extents are half-extents in the
/// attacker's local space, long axis forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ShapeParams {
    Sphere { radius: f32 },
    Box { half_extents: [f32; 3] },
}

impl ShapeParams {
    /// Build the runtime shape, scaled by a size multiplier.
    pub fn to_shape(&self, size_mult: f32) -> Shape {
        match *self {
            ShapeParams::Sphere { radius } => Shape::Sphere { radius }.scaled(size_mult),
            ShapeParams::Box { half_extents } => Shape::Box {
                half_extents: Vec3::from_array(half_extents),
            }
            .scaled(size_mult),
        }
    }
}

// ============================================================================
// Per-Action Parameters
// ============================================================================

/// Crit roll parameters. Chance 0 disables the roll entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CritParams {
    pub chance: f32,
    pub multiplier: f32,
}

impl Default for CritParams {
    fn default() -> Self {
        Self {
            chance: 0.0,
            multiplier: 2.0,
        }
    }
}

/// Timing for one combo swing. Each step telegraphs on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTiming {
    pub telegraph: f32,
    pub active: f32,
    pub damage_mult: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeleeParams {
    pub damage: f32,
    pub telegraph: f32,
    pub active: f32,
    pub cooldown: f32,
    pub shape: ShapeParams,
    /// Forward offset of the hitbox center from the attacker.
    pub reach: f32,
    #[serde(default = "default_size_mult")]
    pub size_mult: f32,
    #[serde(default = "default_knockback_mult")]
    pub knockback_mult: f32,
    #[serde(default)]
    pub crit: CritParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangedParams {
    pub damage: f32,
    pub telegraph: f32,
    pub cooldown: f32,
    pub max_range: f32,
    #[serde(default = "default_knockback_mult")]
    pub knockback_mult: f32,
    #[serde(default)]
    pub crit: CritParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashParams {
    pub duration: f32,
    pub cooldown: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComboParams {
    pub damage: f32,
    /// Per-swing timing and multiplier, in order (typically 3 entries).
    pub steps: Vec<StepTiming>,
    /// After a swing: repeat input rejected for this long...
    pub min_delay: f32,
    /// ...then accepted for this long. Expiry resets with no cooldown.
    pub link_window: f32,
    pub cooldown: f32,
    pub shape: ShapeParams,
    pub reach: f32,
    #[serde(default = "default_size_mult")]
    pub size_mult: f32,
    #[serde(default = "default_knockback_mult")]
    pub knockback_mult: f32,
    #[serde(default)]
    pub crit: CritParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlastParams {
    pub damage: f32,
    pub telegraph: f32,
    pub cooldown: f32,
    pub max_radius: f32,
    /// Seconds the wave takes to reach `max_radius`.
    pub duration: f32,
    /// Knockback multiplier applied to every wave hit.
    pub force: f32,
}

/// One performable action slot, as configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionParams {
    Melee(MeleeParams),
    Ranged(RangedParams),
    Dash(DashParams),
    Combo(ComboParams),
    Blast(BlastParams),
}

fn default_size_mult() -> f32 {
    1.0
}

fn default_knockback_mult() -> f32 {
    1.0
}

fn default_speed() -> f32 {
    1.0
}

// ============================================================================
// Knockback Parameters
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnockbackParams {
    /// Displacement before mass scaling (world units).
    pub base_distance: f32,
    /// Health at which the strength curve crosses 0.5.
    pub reference_health: f32,
    /// Seconds the displacement is spread over.
    pub duration: f32,
    #[serde(default)]
    pub curve: EaseCurve,
}

impl Default for KnockbackParams {
    fn default() -> Self {
        Self {
            base_distance: 4.0,
            reference_health: 100.0,
            duration: 0.25,
            curve: EaseCurve::Linear,
        }
    }
}

// ============================================================================
// Loadouts and the Top-Level Table
// ============================================================================

/// The ordered action slots plus the action-speed stat for one archetype.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loadout {
    #[serde(default = "default_speed")]
    pub speed: f32,
    pub actions: Vec<ActionParams>,
}

/// Everything the combat core is tuned by. Inserted as a resource.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct CombatConfig {
    pub knockback: KnockbackParams,
    pub loadouts: HashMap<String, Loadout>,
}

impl Default for CombatConfig {
    fn default() -> Self {
        let mut loadouts = HashMap::new();

        loadouts.insert(
            "player".to_string(),
            Loadout {
                speed: 1.0,
                actions: vec![
                    ActionParams::Melee(MeleeParams {
                        damage: 25.0,
                        telegraph: 0.4,
                        active: 0.25,
                        cooldown: 1.0,
                        shape: ShapeParams::Box {
                            half_extents: [1.2, 0.8, 1.5],
                        },
                        reach: 1.5,
                        size_mult: 1.0,
                        knockback_mult: 1.0,
                        crit: CritParams {
                            chance: 0.2,
                            multiplier: 2.0,
                        },
                    }),
                    ActionParams::Combo(ComboParams {
                        damage: 20.0,
                        steps: vec![
                            StepTiming { telegraph: 0.2, active: 0.15, damage_mult: 1.0 },
                            StepTiming { telegraph: 0.15, active: 0.15, damage_mult: 1.2 },
                            StepTiming { telegraph: 0.25, active: 0.2, damage_mult: 1.5 },
                        ],
                        min_delay: 0.1,
                        link_window: 0.3,
                        cooldown: 1.2,
                        shape: ShapeParams::Sphere { radius: 1.1 },
                        reach: 1.2,
                        size_mult: 1.0,
                        knockback_mult: 1.0,
                        crit: CritParams {
                            chance: 0.2,
                            multiplier: 2.0,
                        },
                    }),
                    ActionParams::Dash(DashParams {
                        duration: 0.35,
                        cooldown: 0.8,
                    }),
                    ActionParams::Ranged(RangedParams {
                        damage: 15.0,
                        telegraph: 0.25,
                        cooldown: 0.6,
                        max_range: 18.0,
                        knockback_mult: 0.5,
                        crit: CritParams {
                            chance: 0.2,
                            multiplier: 2.0,
                        },
                    }),
                    ActionParams::Blast(BlastParams {
                        damage: 40.0,
                        telegraph: 0.6,
                        cooldown: 12.0,
                        max_radius: 8.0,
                        duration: 0.5,
                        force: 2.0,
                    }),
                ],
            },
        );

        loadouts.insert(
            "grunt".to_string(),
            Loadout {
                speed: 1.0,
                actions: vec![ActionParams::Melee(MeleeParams {
                    damage: 10.0,
                    telegraph: 0.6,
                    active: 0.2,
                    cooldown: 1.5,
                    shape: ShapeParams::Sphere { radius: 0.9 },
                    reach: 1.0,
                    size_mult: 1.0,
                    knockback_mult: 0.6,
                    crit: CritParams::default(),
                })],
            },
        );

        loadouts.insert(
            "archer".to_string(),
            Loadout {
                speed: 1.0,
                actions: vec![ActionParams::Ranged(RangedParams {
                    damage: 8.0,
                    telegraph: 0.8,
                    cooldown: 2.0,
                    max_range: 15.0,
                    knockback_mult: 0.3,
                    crit: CritParams::default(),
                })],
            },
        );

        Self {
            knockback: KnockbackParams::default(),
            loadouts,
        }
    }
}

impl CombatConfig {
    /// Parse a tuning table from JSON and clamp degenerate values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let mut config: CombatConfig = serde_json::from_str(json)?;
        for (name, loadout) in &config.loadouts {
            if loadout.actions.is_empty() {
                return Err(ConfigError::EmptyLoadout(name.clone()));
            }
        }
        config.sanitize();
        Ok(config)
    }

    /// Clamp zero/negative durations, speeds, and sizes. Invalid numbers
    /// degrade, they never fail (soft-real-time contract).
    pub fn sanitize(&mut self) {
        clamp_time(&mut self.knockback.duration, "knockback.duration");
        self.knockback.base_distance = self.knockback.base_distance.max(0.0);
        self.knockback.reference_health = self.knockback.reference_health.max(1.0);

        for loadout in self.loadouts.values_mut() {
            if loadout.speed < MIN_SPEED_EPSILON {
                warn!(speed = loadout.speed, "clamping non-positive action speed");
                loadout.speed = MIN_SPEED_EPSILON;
            }
            for action in &mut loadout.actions {
                match action {
                    ActionParams::Melee(p) => {
                        clamp_time(&mut p.telegraph, "melee.telegraph");
                        clamp_time(&mut p.active, "melee.active");
                        clamp_time(&mut p.cooldown, "melee.cooldown");
                    }
                    ActionParams::Ranged(p) => {
                        clamp_time(&mut p.telegraph, "ranged.telegraph");
                        clamp_time(&mut p.cooldown, "ranged.cooldown");
                        p.max_range = p.max_range.max(0.0);
                    }
                    ActionParams::Dash(p) => {
                        clamp_time(&mut p.duration, "dash.duration");
                        clamp_time(&mut p.cooldown, "dash.cooldown");
                    }
                    ActionParams::Combo(p) => {
                        for step in &mut p.steps {
                            clamp_time(&mut step.telegraph, "combo.telegraph");
                            clamp_time(&mut step.active, "combo.active");
                        }
                        clamp_time(&mut p.min_delay, "combo.min_delay");
                        clamp_time(&mut p.link_window, "combo.link_window");
                        clamp_time(&mut p.cooldown, "combo.cooldown");
                    }
                    ActionParams::Blast(p) => {
                        clamp_time(&mut p.telegraph, "blast.telegraph");
                        clamp_time(&mut p.duration, "blast.duration");
                        clamp_time(&mut p.cooldown, "blast.cooldown");
                        p.max_radius = p.max_radius.max(0.0);
                    }
                }
            }
        }
    }

    pub fn loadout(&self, name: &str) -> Option<&Loadout> {
        self.loadouts.get(name)
    }
}

fn clamp_time(value: &mut f32, field: &str) {
    if *value < MIN_TIME_EPSILON {
        warn!(field, value = *value, "clamping non-positive duration");
        *value = MIN_TIME_EPSILON;
    }
}

// ============================================================================
// Tests
// ============================================================================
