use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::collaborators::{
    CombatTarget, DamageMetadata, DamagePipeline, DamageRequest, ProjectileSink, ProjectileSpec,
    TargetRegistry,
};
use crate::config::{AttackCondition, AttackDef, AttackKind, EngineConfig, SpeciesDef, SpeciesTable};
use crate::constants::{
    MULTI_HIT_MIN_INTERVAL_MS, STUCK_PUSH_LEVEL, STUCK_PUSH_MULTIPLIER, WANDER_STEP_MULTIPLIER,
};
use crate::error::CombatError;
use crate::geometry::{spread_angles, Hitbox};
use crate::monster::{AttackSession, Monster, PathCache, StunSnapshot};
use crate::pathfinding::Pathfinder;
use crate::registry::MonsterRegistry;
use crate::rng::Rng;
use crate::scheduler::{Effect, EffectPurpose, EffectScheduler, ScheduledEffect};
use crate::terrain::Terrain;
use crate::types::{
    AttackPhase, AttackSlot, Combatant, DamageType, Facing, LodTier, MonsterId, MonsterState,
    MonsterView, RuntimeEvent, Snapshot, TargetId, Vec2,
};

mod ai_system;
mod attack_system;
mod lod_system;
mod movement_system;
mod spawn_system;
mod utils;

use self::utils::{find_live_target, monster_key, nearest_live_target, species_of};

/// External systems the engine reads from and reports to.
pub struct Collaborators {
    pub terrain: Box<dyn Terrain + Send>,
    pub pathfinder: Box<dyn Pathfinder + Send>,
    pub targets: Box<dyn TargetRegistry + Send>,
    pub damage: Box<dyn DamagePipeline + Send>,
    pub projectiles: Box<dyn ProjectileSink + Send>,
}

#[derive(Clone, Debug, Default)]
pub struct CombatEngineOptions {
    pub seed: u64,
    pub config: EngineConfig,
    pub species: SpeciesTable,
}

/// A hit decided during the tick, delivered to the damage pipeline after
/// every monster has updated.
#[derive(Clone, Debug)]
struct PendingHit {
    monster: MonsterId,
    key: u64,
    target: TargetId,
    slot: AttackSlot,
    attack: String,
    amount: i32,
    damage_type: DamageType,
    activation_id: u64,
    stun_ms: u64,
}

#[derive(Clone, Debug)]
struct PendingProjectile {
    monster: MonsterId,
    key: u64,
    slot: AttackSlot,
    spec: ProjectileSpec,
}

/// Melee or spell swing made by a player, resolved against monsters.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerAttack {
    pub name: String,
    pub origin: Vec2,
    pub angle: f32,
    pub shape: Hitbox,
    pub damage: i32,
    pub damage_type: DamageType,
    pub stun_ms: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub spawned: u64,
    pub killed: u64,
    pub despawned: u64,
    pub attacks_started: u64,
    pub attacks_completed: u64,
    pub attacks_interrupted: u64,
    pub hits_applied: u64,
    pub projectiles_fired: u64,
    pub stale_effects: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LodCounts {
    pub near: usize,
    pub medium: usize,
    pub far: usize,
    pub dormant: usize,
}

pub struct CombatEngine {
    pub config: EngineConfig,
    pub species: SpeciesTable,

    terrain: Box<dyn Terrain + Send>,
    pathfinder: Box<dyn Pathfinder + Send>,
    targets: Box<dyn TargetRegistry + Send>,
    damage: Box<dyn DamagePipeline + Send>,
    projectiles: Box<dyn ProjectileSink + Send>,

    seed: u64,
    rng: Rng,
    monsters: MonsterRegistry,
    scheduler: EffectScheduler,
    events: Vec<RuntimeEvent>,
    target_snapshot: Vec<CombatTarget>,
    pending_hits: Vec<PendingHit>,
    pending_projectiles: Vec<PendingProjectile>,
    stats: EngineStats,

    elapsed_ms: u64,
    tick_counter: u64,
    spawn_accumulator_ms: u64,
    next_activation_id: u64,
    reported_config: HashSet<String>,
    /// Monsters already warned about standing with no walkable ground nearby.
    reported_desync: HashSet<MonsterId>,
}

impl CombatEngine {
    pub fn new(collaborators: Collaborators, options: CombatEngineOptions) -> Self {
        let Collaborators {
            terrain,
            pathfinder,
            targets,
            damage,
            projectiles,
        } = collaborators;
        info!(
            seed = options.seed,
            species = options.species.iter().count(),
            tick_ms = options.config.tick_ms,
            "combat engine created"
        );
        Self {
            config: options.config,
            species: options.species,
            terrain,
            pathfinder,
            targets,
            damage,
            projectiles,
            seed: options.seed,
            rng: Rng::new(options.seed),
            monsters: MonsterRegistry::new(),
            scheduler: EffectScheduler::new(),
            events: Vec::new(),
            target_snapshot: Vec::new(),
            pending_hits: Vec::new(),
            pending_projectiles: Vec::new(),
            stats: EngineStats::default(),
            elapsed_ms: 0,
            tick_counter: 0,
            spawn_accumulator_ms: 0,
            next_activation_id: 1,
            reported_config: HashSet::new(),
            reported_desync: HashSet::new(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn tick(&self) -> u64 {
        self.tick_counter
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn terrain(&self) -> &dyn Terrain {
        self.terrain.as_ref()
    }

    pub fn monster(&self, id: MonsterId) -> Option<&Monster> {
        self.monsters.get(id)
    }

    pub fn monster_mut(&mut self, id: MonsterId) -> Option<&mut Monster> {
        self.monsters.get_mut(id)
    }

    pub fn monsters(&self) -> impl Iterator<Item = &Monster> {
        self.monsters.iter()
    }

    pub fn monster_count(&self) -> usize {
        self.monsters.len()
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn lod_counts(&self) -> LodCounts {
        let mut counts = LodCounts::default();
        for monster in self.monsters.iter().filter(|m| !m.is_dying()) {
            match monster.lod {
                LodTier::Near => counts.near += 1,
                LodTier::Medium => counts.medium += 1,
                LodTier::Far => counts.far += 1,
                LodTier::Dormant => counts.dormant += 1,
            }
        }
        counts
    }

    pub fn is_effect_pending(&self, id: MonsterId, purpose: EffectPurpose) -> bool {
        self.scheduler.is_pending(id, purpose)
    }

    /// Advances the simulation by one tick of `dt_ms`.
    ///
    /// Order: due deferred effects, spawn timer, LOD bucketing, per-monster
    /// updates in registry order, then buffered hits and projectiles are
    /// delivered in a canonical order so outcomes do not depend on arena order.
    pub fn step(&mut self, dt_ms: u64) {
        self.tick_counter += 1;
        self.elapsed_ms = self.elapsed_ms.saturating_add(dt_ms);
        let now_ms = self.elapsed_ms;

        self.refresh_targets();
        self.run_due_effects(now_ms);
        self.update_spawning(dt_ms);
        let due = self.update_lod(dt_ms);
        for (id, elapsed_ms) in due {
            self.update_monster(id, elapsed_ms, now_ms);
        }
        self.flush_hits();
        self.flush_projectiles();
    }

    pub fn build_snapshot(&mut self, include_events: bool) -> Snapshot {
        Snapshot {
            tick: self.tick_counter,
            now_ms: self.elapsed_ms,
            monsters: self.monsters.iter().map(Monster::view).collect(),
            events: if include_events {
                std::mem::take(&mut self.events)
            } else {
                Vec::new()
            },
        }
    }

    /// Views of the monsters within `radius` of an observer.
    pub fn build_observer_snapshot(&self, observer: Vec2, radius: f32) -> Vec<MonsterView> {
        self.monsters
            .iter()
            .filter(|m| m.position.distance(observer) <= radius)
            .map(Monster::view)
            .collect()
    }

    pub fn drain_events(&mut self) -> Vec<RuntimeEvent> {
        std::mem::take(&mut self.events)
    }

    /// Applies a damage verdict from the pipeline to a monster. Returns false
    /// when the monster is gone or already dying.
    pub fn apply_monster_damage(
        &mut self,
        id: MonsterId,
        amount: i32,
        stun_ms: u64,
        by: Option<Combatant>,
    ) -> bool {
        let now_ms = self.elapsed_ms;
        let Some(monster) = self.monsters.get_mut(id) else {
            return false;
        };
        if monster.is_dying() {
            return false;
        }
        let amount = amount.max(0);
        monster.hp -= amount;
        let hp = monster.hp;
        self.events.push(RuntimeEvent::MonsterDamaged {
            monster_id: id,
            amount,
            hp,
            by,
        });
        if hp <= 0 {
            self.kill_monster(id, by, now_ms);
        } else if stun_ms > 0 {
            self.stun_monster(id, stun_ms);
        }
        true
    }

    /// Hit-tests a player attack against every live monster and routes each
    /// hit through the damage pipeline. Returns the monsters that took damage.
    pub fn resolve_player_attack(
        &mut self,
        attacker: TargetId,
        attack: &PlayerAttack,
    ) -> Vec<MonsterId> {
        let struck: Vec<MonsterId> = self
            .monsters
            .iter()
            .filter(|m| !m.is_dying())
            .filter(|m| {
                attack
                    .shape
                    .contains(attack.origin, attack.angle, m.position, m.collision_radius)
            })
            .map(|m| m.id)
            .collect();

        let source = Combatant::Player(attacker);
        let activation_id = self.next_activation_id();
        let mut landed = Vec::new();
        for id in struck {
            let request = DamageRequest {
                source,
                target: Combatant::Monster(id),
                amount: attack.damage,
                damage_type: attack.damage_type,
                metadata: DamageMetadata {
                    attack: attack.name.clone(),
                    slot: None,
                    activation_id,
                    stun_ms: attack.stun_ms,
                },
            };
            let outcome = self.damage.apply_damage(&request);
            if !outcome.success {
                continue;
            }
            if self.apply_monster_damage(id, outcome.applied, outcome.stun_ms, Some(source)) {
                landed.push(id);
            }
        }
        landed
    }

    fn refresh_targets(&mut self) {
        let mut targets = self.targets.targets();
        targets.sort_by_key(|t| t.id);
        self.target_snapshot = targets;
    }

    fn run_due_effects(&mut self, now_ms: u64) {
        while let Some(effect) = self.scheduler.pop_due(now_ms) {
            self.run_effect(effect);
        }
    }

    fn run_effect(&mut self, effect: ScheduledEffect) {
        match effect.effect {
            Effect::Activate => self.activate_attack(effect.monster, effect.fire_at_ms),
            Effect::Complete => self.complete_attack(effect.monster, effect.fire_at_ms),
            Effect::Despawn => self.despawn_monster(effect.monster),
        }
    }

    fn next_activation_id(&mut self) -> u64 {
        let id = self.next_activation_id;
        self.next_activation_id += 1;
        id
    }

    /// Logs a configuration fallback the first time `key` is seen.
    fn report_config_error(&mut self, key: String, error: CombatError) {
        if self.reported_config.insert(key) {
            warn!(%error, "configuration fallback");
        }
    }

    fn note_stale_effect(&mut self, id: MonsterId) {
        self.stats.stale_effects += 1;
        debug!(error = %CombatError::StaleEffect { monster: id }, "dropping effect");
    }

    fn flush_hits(&mut self) {
        if self.pending_hits.is_empty() {
            return;
        }
        let mut hits = std::mem::take(&mut self.pending_hits);
        hits.sort_by(|a, b| {
            (a.target, a.key, a.slot.index()).cmp(&(b.target, b.key, b.slot.index()))
        });
        for hit in hits {
            let still_armed = self
                .monsters
                .get(hit.monster)
                .map(|m| !m.is_dying() && m.state != MonsterState::Stunned)
                .unwrap_or(false);
            if !still_armed {
                self.note_stale_effect(hit.monster);
                continue;
            }
            let request = DamageRequest {
                source: Combatant::Monster(hit.monster),
                target: Combatant::Player(hit.target),
                amount: hit.amount,
                damage_type: hit.damage_type,
                metadata: DamageMetadata {
                    attack: hit.attack,
                    slot: Some(hit.slot),
                    activation_id: hit.activation_id,
                    stun_ms: hit.stun_ms,
                },
            };
            let outcome = self.damage.apply_damage(&request);
            if outcome.success {
                self.stats.hits_applied += 1;
                self.events.push(RuntimeEvent::AttackDamage {
                    monster_id: hit.monster,
                    target: hit.target,
                    amount: outcome.applied,
                    activation_id: hit.activation_id,
                });
            }
        }
    }

    fn flush_projectiles(&mut self) {
        if self.pending_projectiles.is_empty() {
            return;
        }
        let mut launches = std::mem::take(&mut self.pending_projectiles);
        launches.sort_by(|a, b| (a.key, a.slot.index()).cmp(&(b.key, b.slot.index())));
        for launch in launches {
            self.stats.projectiles_fired += 1;
            self.projectiles.create_projectile(launch.monster, launch.spec);
        }
    }
}
