//! Engine tuning and per-species attack tables.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{
    ATTACK_RANGE_TOLERANCE, BASE_VIEW_DISTANCE, DEATH_GRACE_MS, DESYNC_SNAP_RADIUS,
    DISENGAGE_MULTIPLIER, LOD_FAR_MULTIPLIER, LOD_MEDIUM_MULTIPLIER, LOD_NEAR_MULTIPLIER,
    MAX_POPULATION, PATH_REUSE_TOLERANCE, SPAWN_ATTEMPTS, SPAWN_INTERVAL_MS,
    SPAWN_MIN_TARGET_DISTANCE, STUCK_RADIUS, STUCK_SAMPLE_COUNT, STUCK_SAMPLE_INTERVAL_MS,
    TICK_MS, WAYPOINT_REACHED_RADIUS,
};
use crate::error::CombatError;
use crate::geometry::Hitbox;
use crate::rng::Rng;
use crate::types::{AttackSlot, DamageType};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub tick_ms: u64,
    pub base_view_distance: f32,
    pub lod_near_multiplier: f32,
    pub lod_medium_multiplier: f32,
    pub lod_far_multiplier: f32,
    pub spawn_interval_ms: u64,
    pub max_population: usize,
    pub spawn_attempts: usize,
    pub spawn_min_target_distance: f32,
    pub death_grace_ms: u64,
    pub disengage_multiplier: f32,
    pub attack_range_tolerance: f32,
    pub stuck_sample_interval_ms: u64,
    pub stuck_sample_count: usize,
    pub stuck_radius: f32,
    pub path_reuse_tolerance: f32,
    pub waypoint_reached_radius: f32,
    pub desync_snap_radius: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_ms: TICK_MS,
            base_view_distance: BASE_VIEW_DISTANCE,
            lod_near_multiplier: LOD_NEAR_MULTIPLIER,
            lod_medium_multiplier: LOD_MEDIUM_MULTIPLIER,
            lod_far_multiplier: LOD_FAR_MULTIPLIER,
            spawn_interval_ms: SPAWN_INTERVAL_MS,
            max_population: MAX_POPULATION,
            spawn_attempts: SPAWN_ATTEMPTS,
            spawn_min_target_distance: SPAWN_MIN_TARGET_DISTANCE,
            death_grace_ms: DEATH_GRACE_MS,
            disengage_multiplier: DISENGAGE_MULTIPLIER,
            attack_range_tolerance: ATTACK_RANGE_TOLERANCE,
            stuck_sample_interval_ms: STUCK_SAMPLE_INTERVAL_MS,
            stuck_sample_count: STUCK_SAMPLE_COUNT,
            stuck_radius: STUCK_RADIUS,
            path_reuse_tolerance: PATH_REUSE_TOLERANCE,
            waypoint_reached_radius: WAYPOINT_REACHED_RADIUS,
            desync_snap_radius: DESYNC_SNAP_RADIUS,
        }
    }
}

/// Archetype-specific attack parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "archetype", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AttackKind {
    /// Oriented box in front of the attacker, `range` long.
    Melee { width: f32 },
    Cone { angle: f32 },
    /// Circle of `radius` centred `offset` units ahead of the attacker.
    CircleAoe {
        radius: f32,
        #[serde(default)]
        offset: f32,
    },
    Projectile { speed: f32 },
    MultiProjectile { speed: f32, count: usize, spread: f32 },
    /// Repeated AOE ticks while charging along a direction fixed at windup.
    MultiHit {
        hits: u32,
        interval_ms: u64,
        radius: f32,
        charge_speed: f32,
    },
    /// Blink `distance` past the target, then strike a cone `reach` deep.
    TeleportMelee {
        distance: f32,
        cone_angle: f32,
        reach: f32,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "when", rename_all = "snake_case")]
pub enum AttackCondition {
    #[default]
    Always,
    /// Preferred only once the target is at least this far away.
    MinDistance { distance: f32 },
    /// Frenzy variant: target hp fraction strictly below the threshold.
    TargetHpBelow { fraction: f32 },
    /// Target moved away since the last evaluation; fires with `chance`.
    TargetRetreating { chance: f32 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackDef {
    pub name: String,
    #[serde(flatten)]
    pub kind: AttackKind,
    pub damage: i32,
    pub range: f32,
    pub cooldown_ms: u64,
    pub windup_ms: u64,
    pub recovery_ms: u64,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub condition: AttackCondition,
    #[serde(default)]
    pub damage_type: DamageType,
    #[serde(default)]
    pub stun_ms: u64,
}

impl AttackDef {
    /// Minimal attack used when a species ships without an attack table.
    pub fn fallback() -> Self {
        Self {
            name: "strike".to_string(),
            kind: AttackKind::Melee { width: 32.0 },
            damage: 5,
            range: 40.0,
            cooldown_ms: 1_500,
            windup_ms: 300,
            recovery_ms: 300,
            priority: 0,
            condition: AttackCondition::Always,
            damage_type: DamageType::Physical,
            stun_ms: 0,
        }
    }

    /// Shape tested on activation; `None` for projectile archetypes.
    pub fn hitbox(&self) -> Option<Hitbox> {
        match self.kind {
            AttackKind::Melee { width } => Some(Hitbox::Rect {
                length: self.range,
                width,
            }),
            AttackKind::Cone { angle } => Some(Hitbox::Cone {
                range: self.range,
                angle,
            }),
            AttackKind::CircleAoe { radius, .. } | AttackKind::MultiHit { radius, .. } => {
                Some(Hitbox::Circle { radius })
            }
            AttackKind::TeleportMelee {
                cone_angle, reach, ..
            } => Some(Hitbox::Cone {
                range: reach,
                angle: cone_angle,
            }),
            AttackKind::Projectile { .. } | AttackKind::MultiProjectile { .. } => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackTable {
    pub primary: Option<AttackDef>,
    pub special1: Option<AttackDef>,
    pub special2: Option<AttackDef>,
}

impl AttackTable {
    pub fn get(&self, slot: AttackSlot) -> Option<&AttackDef> {
        match slot {
            AttackSlot::Primary => self.primary.as_ref(),
            AttackSlot::Special1 => self.special1.as_ref(),
            AttackSlot::Special2 => self.special2.as_ref(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (AttackSlot, &AttackDef)> {
        AttackSlot::ALL
            .into_iter()
            .filter_map(|slot| self.get(slot).map(|def| (slot, def)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesDef {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
    pub max_hp: i32,
    /// Units moved per base tick.
    pub move_speed: f32,
    pub aggro_range: f32,
    pub collision_radius: f32,
    #[serde(default)]
    pub attacks: AttackTable,
}

fn default_weight() -> f32 {
    1.0
}

impl SpeciesDef {
    pub fn attack(&self, slot: AttackSlot) -> Option<&AttackDef> {
        self.attacks.get(slot)
    }

    pub fn max_attack_range(&self) -> f32 {
        self.attacks
            .iter()
            .map(|(_, def)| def.range)
            .fold(0.0, f32::max)
    }

    /// Safe species used when a requested one is unknown.
    pub fn fallback() -> Self {
        Self {
            name: "grunt".to_string(),
            weight: 1.0,
            max_hp: 60,
            move_speed: 4.0,
            aggro_range: 400.0,
            collision_radius: 14.0,
            attacks: AttackTable {
                primary: Some(AttackDef::fallback()),
                special1: None,
                special2: None,
            },
        }
    }
}

/// Never empty: every constructor and deserialization goes through
/// `normalize`, which inserts the fallback species.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<SpeciesDef>", into = "Vec<SpeciesDef>")]
pub struct SpeciesTable {
    species: Vec<SpeciesDef>,
}

impl From<Vec<SpeciesDef>> for SpeciesTable {
    fn from(species: Vec<SpeciesDef>) -> Self {
        Self::new(species)
    }
}

impl From<SpeciesTable> for Vec<SpeciesDef> {
    fn from(table: SpeciesTable) -> Self {
        table.species
    }
}

impl Default for SpeciesTable {
    fn default() -> Self {
        Self {
            species: default_species(),
        }
    }
}

impl SpeciesTable {
    pub fn new(species: Vec<SpeciesDef>) -> Self {
        let mut table = Self { species };
        table.normalize();
        table
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CombatError> {
        let species: Vec<SpeciesDef> = serde_json::from_str(raw)?;
        if species.is_empty() {
            return Err(CombatError::InvalidConfig(
                "species table is empty".to_string(),
            ));
        }
        Ok(Self::new(species))
    }

    pub fn get(&self, name: &str) -> Option<&SpeciesDef> {
        self.species.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpeciesDef> {
        self.species.iter()
    }

    pub fn fallback(&self) -> &SpeciesDef {
        &self.species[0]
    }

    pub fn pick_weighted(&self, rng: &mut Rng) -> &SpeciesDef {
        let weights: Vec<f32> = self.species.iter().map(|s| s.weight).collect();
        &self.species[rng.pick_weighted(&weights)]
    }

    /// Degrades species with missing attack tables to the minimal default
    /// attack instead of disabling them.
    fn normalize(&mut self) {
        if self.species.is_empty() {
            self.species.push(SpeciesDef::fallback());
        }
        for species in &mut self.species {
            if species.attacks.primary.is_none() {
                warn!(
                    species = %species.name,
                    "species has no primary attack; using default strike"
                );
                species.attacks.primary = Some(AttackDef::fallback());
            }
            species.max_hp = species.max_hp.max(1);
            species.move_speed = species.move_speed.max(0.0);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub engine: EngineConfig,
    pub species: Vec<SpeciesDef>,
}

impl ConfigFile {
    pub fn into_parts(self) -> (EngineConfig, SpeciesTable) {
        let table = if self.species.is_empty() {
            SpeciesTable::default()
        } else {
            SpeciesTable::new(self.species)
        };
        (self.engine, table)
    }
}

pub fn load_config_file(path: &Path) -> Result<(EngineConfig, SpeciesTable), CombatError> {
    let raw = std::fs::read_to_string(path)?;
    let file: ConfigFile = serde_json::from_str(&raw)?;
    Ok(file.into_parts())
}

fn attack(
    name: &str,
    kind: AttackKind,
    damage: i32,
    range: f32,
    cooldown_ms: u64,
    windup_ms: u64,
    recovery_ms: u64,
) -> AttackDef {
    AttackDef {
        name: name.to_string(),
        kind,
        damage,
        range,
        cooldown_ms,
        windup_ms,
        recovery_ms,
        priority: 0,
        condition: AttackCondition::Always,
        damage_type: DamageType::Physical,
        stun_ms: 0,
    }
}

pub fn default_species() -> Vec<SpeciesDef> {
    vec![
        SpeciesDef::fallback(),
        SpeciesDef {
            name: "archer".to_string(),
            weight: 0.8,
            max_hp: 40,
            move_speed: 3.5,
            aggro_range: 500.0,
            collision_radius: 12.0,
            attacks: AttackTable {
                primary: Some(attack(
                    "arrow",
                    AttackKind::Projectile { speed: 12.0 },
                    6,
                    360.0,
                    1_500,
                    400,
                    300,
                )),
                special1: Some(AttackDef {
                    priority: 1,
                    condition: AttackCondition::MinDistance { distance: 150.0 },
                    ..attack(
                        "volley",
                        AttackKind::MultiProjectile {
                            speed: 11.0,
                            count: 3,
                            spread: 0.6,
                        },
                        5,
                        320.0,
                        5_000,
                        500,
                        400,
                    )
                }),
                special2: None,
            },
        },
        SpeciesDef {
            name: "brute".to_string(),
            weight: 0.4,
            max_hp: 160,
            move_speed: 3.0,
            aggro_range: 350.0,
            collision_radius: 20.0,
            attacks: AttackTable {
                primary: Some(attack(
                    "smash",
                    AttackKind::Melee { width: 48.0 },
                    14,
                    56.0,
                    1_600,
                    450,
                    450,
                )),
                special1: Some(AttackDef {
                    priority: 2,
                    stun_ms: 400,
                    ..attack(
                        "ground_slam",
                        AttackKind::CircleAoe {
                            radius: 90.0,
                            offset: 0.0,
                        },
                        20,
                        70.0,
                        6_000,
                        700,
                        600,
                    )
                }),
                special2: Some(AttackDef {
                    priority: 3,
                    condition: AttackCondition::TargetHpBelow { fraction: 0.3 },
                    ..attack(
                        "frenzy",
                        AttackKind::MultiHit {
                            hits: 3,
                            interval_ms: 200,
                            radius: 50.0,
                            charge_speed: 6.0,
                        },
                        7,
                        120.0,
                        8_000,
                        400,
                        500,
                    )
                }),
            },
        },
        SpeciesDef {
            name: "shaman".to_string(),
            weight: 0.5,
            max_hp: 50,
            move_speed: 3.2,
            aggro_range: 450.0,
            collision_radius: 13.0,
            attacks: AttackTable {
                primary: Some(AttackDef {
                    damage_type: DamageType::Fire,
                    ..attack(
                        "flame_breath",
                        AttackKind::Cone { angle: 1.2 },
                        9,
                        140.0,
                        2_000,
                        500,
                        400,
                    )
                }),
                special1: Some(AttackDef {
                    priority: 1,
                    condition: AttackCondition::MinDistance { distance: 180.0 },
                    damage_type: DamageType::Magic,
                    ..attack(
                        "spirit_fan",
                        AttackKind::MultiProjectile {
                            speed: 10.0,
                            count: 5,
                            spread: 1.0,
                        },
                        6,
                        380.0,
                        6_000,
                        600,
                        400,
                    )
                }),
                special2: None,
            },
        },
        SpeciesDef {
            name: "stalker".to_string(),
            weight: 0.6,
            max_hp: 70,
            move_speed: 5.0,
            aggro_range: 500.0,
            collision_radius: 14.0,
            attacks: AttackTable {
                primary: Some(attack(
                    "claw",
                    AttackKind::Melee { width: 32.0 },
                    10,
                    44.0,
                    1_000,
                    250,
                    250,
                )),
                special1: Some(AttackDef {
                    priority: 2,
                    condition: AttackCondition::TargetRetreating { chance: 0.35 },
                    ..attack(
                        "shadow_step",
                        AttackKind::TeleportMelee {
                            distance: 48.0,
                            cone_angle: 1.6,
                            reach: 60.0,
                        },
                        16,
                        260.0,
                        7_000,
                        350,
                        400,
                    )
                }),
                special2: None,
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_archetype() {
        let table = SpeciesTable::default();
        let kinds: Vec<&str> = table
            .species
            .iter()
            .flat_map(|s| s.attacks.iter().map(|(_, def)| def))
            .map(|def| match def.kind {
                AttackKind::Melee { .. } => "melee",
                AttackKind::Cone { .. } => "cone",
                AttackKind::CircleAoe { .. } => "circle_aoe",
                AttackKind::Projectile { .. } => "projectile",
                AttackKind::MultiProjectile { .. } => "multi_projectile",
                AttackKind::MultiHit { .. } => "multi_hit",
                AttackKind::TeleportMelee { .. } => "teleport_melee",
            })
            .collect();
        for expected in [
            "melee",
            "cone",
            "circle_aoe",
            "projectile",
            "multi_projectile",
            "multi_hit",
            "teleport_melee",
        ] {
            assert!(kinds.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn json_species_without_attacks_gets_default_strike() {
        let raw = r#"[{"name":"blob","maxHp":10,"moveSpeed":2,"aggroRange":100,"collisionRadius":8}]"#;
        let table = SpeciesTable::from_json_str(raw).expect("parses");
        let blob = table.get("blob").expect("blob present");
        assert_eq!(blob.weight, 1.0);
        assert_eq!(
            blob.attack(AttackSlot::Primary).map(|a| a.name.as_str()),
            Some("strike")
        );
    }

    #[test]
    fn json_attack_archetype_is_tagged() {
        let raw = r#"[{"name":"spitter","maxHp":20,"moveSpeed":3,"aggroRange":300,"collisionRadius":10,
            "attacks":{"primary":{"name":"spit","archetype":"multi_projectile","speed":8,"count":4,"spread":0.8,
            "damage":3,"range":250,"cooldownMs":900,"windupMs":200,"recoveryMs":100,
            "condition":{"when":"min_distance","distance":60}}}}]"#;
        let table = SpeciesTable::from_json_str(raw).expect("parses");
        let spit = table
            .get("spitter")
            .and_then(|s| s.attack(AttackSlot::Primary))
            .expect("attack");
        assert_eq!(
            spit.kind,
            AttackKind::MultiProjectile {
                speed: 8.0,
                count: 4,
                spread: 0.8
            }
        );
        assert_eq!(spit.condition, AttackCondition::MinDistance { distance: 60.0 });
    }

    #[test]
    fn empty_tables_degrade_to_the_fallback_species() {
        let built = SpeciesTable::new(Vec::new());
        assert_eq!(built.fallback().name, SpeciesDef::fallback().name);

        let decoded: SpeciesTable = serde_json::from_str("[]").expect("parses");
        assert_eq!(decoded.iter().count(), 1);
        let mut rng = Rng::new(3);
        assert_eq!(decoded.pick_weighted(&mut rng).name, decoded.fallback().name);
        assert!(decoded.get("missing").is_none());
    }

    #[test]
    fn empty_table_is_rejected() {
        assert!(matches!(
            SpeciesTable::from_json_str("[]"),
            Err(CombatError::InvalidConfig(_))
        ));
    }

    #[test]
    fn engine_config_fills_missing_fields() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"maxPopulation": 7}"#).expect("parses");
        assert_eq!(cfg.max_population, 7);
        assert_eq!(cfg.tick_ms, TICK_MS);
        assert_eq!(cfg.lod_far_multiplier, 3.0);
    }
}
