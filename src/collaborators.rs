//! Interfaces to the systems around the engine, plus in-memory versions used
//! by the binaries and tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::types::{AttackSlot, Combatant, DamageType, MonsterId, TargetId, Vec2};

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CombatTarget {
    pub id: TargetId,
    pub position: Vec2,
    pub hp: i32,
    #[serde(rename = "maxHp")]
    pub max_hp: i32,
    pub radius: f32,
    pub alive: bool,
}

impl CombatTarget {
    pub fn new(id: u64, position: Vec2, hp: i32) -> Self {
        Self {
            id: TargetId(id),
            position,
            hp,
            max_hp: hp.max(1),
            radius: 16.0,
            alive: hp > 0,
        }
    }

    pub fn is_live(&self) -> bool {
        self.alive && self.hp > 0
    }

    pub fn hp_fraction(&self) -> f32 {
        self.hp.max(0) as f32 / self.max_hp.max(1) as f32
    }
}

pub trait TargetRegistry {
    fn targets(&self) -> Vec<CombatTarget>;

    fn get(&self, id: TargetId) -> Option<CombatTarget> {
        self.targets().into_iter().find(|t| t.id == id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DamageMetadata {
    pub attack: String,
    pub slot: Option<AttackSlot>,
    #[serde(rename = "activationId")]
    pub activation_id: u64,
    #[serde(rename = "stunMs")]
    pub stun_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DamageRequest {
    pub source: Combatant,
    pub target: Combatant,
    pub amount: i32,
    #[serde(rename = "damageType")]
    pub damage_type: DamageType,
    pub metadata: DamageMetadata,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct DamageOutcome {
    pub success: bool,
    pub applied: i32,
    pub killed: bool,
    #[serde(rename = "stunMs")]
    pub stun_ms: u64,
}

/// Authoritative hp mutation. The engine decides who is hit and for how much;
/// the pipeline decides what that means.
pub trait DamagePipeline {
    fn apply_damage(&mut self, request: &DamageRequest) -> DamageOutcome;
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ProjectileSpec {
    pub position: Vec2,
    pub angle: f32,
    pub speed: f32,
    pub damage: i32,
    pub range: f32,
    #[serde(rename = "effectType")]
    pub effect_type: DamageType,
}

pub trait ProjectileSink {
    fn create_projectile(&mut self, owner: MonsterId, spec: ProjectileSpec);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared handle over a map of live combat targets.
#[derive(Clone, Debug, Default)]
pub struct TargetTable {
    inner: Arc<Mutex<BTreeMap<TargetId, CombatTarget>>>,
}

impl TargetTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, target: CombatTarget) {
        lock(&self.inner).insert(target.id, target);
    }

    pub fn remove(&self, id: TargetId) -> Option<CombatTarget> {
        lock(&self.inner).remove(&id)
    }

    pub fn set_position(&self, id: TargetId, position: Vec2) {
        if let Some(target) = lock(&self.inner).get_mut(&id) {
            target.position = position;
        }
    }

    pub fn set_hp(&self, id: TargetId, hp: i32) {
        if let Some(target) = lock(&self.inner).get_mut(&id) {
            target.hp = hp;
            target.alive = hp > 0;
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }
}

impl TargetRegistry for TargetTable {
    fn targets(&self) -> Vec<CombatTarget> {
        lock(&self.inner).values().copied().collect()
    }

    fn get(&self, id: TargetId) -> Option<CombatTarget> {
        lock(&self.inner).get(&id).copied()
    }
}

/// Shared record of every damage request that reached the pipeline.
#[derive(Clone, Debug, Default)]
pub struct DamageLog {
    inner: Arc<Mutex<Vec<DamageRequest>>>,
}

impl DamageLog {
    pub fn requests(&self) -> Vec<DamageRequest> {
        lock(&self.inner).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }

    fn push(&self, request: DamageRequest) {
        lock(&self.inner).push(request);
    }
}

/// Pipeline that subtracts hp from a [`TargetTable`] for player targets and
/// passes monster damage through unchanged.
#[derive(Clone, Debug, Default)]
pub struct TableDamagePipeline {
    targets: TargetTable,
    log: DamageLog,
}

impl TableDamagePipeline {
    pub fn new(targets: TargetTable) -> Self {
        Self {
            targets,
            log: DamageLog::default(),
        }
    }

    pub fn log(&self) -> DamageLog {
        self.log.clone()
    }
}

impl DamagePipeline for TableDamagePipeline {
    fn apply_damage(&mut self, request: &DamageRequest) -> DamageOutcome {
        self.log.push(request.clone());
        match request.target {
            Combatant::Player(id) => {
                let Some(target) = self.targets.get(id) else {
                    return DamageOutcome::default();
                };
                if !target.is_live() {
                    return DamageOutcome::default();
                }
                let hp = target.hp - request.amount.max(0);
                self.targets.set_hp(id, hp);
                DamageOutcome {
                    success: true,
                    applied: request.amount.max(0),
                    killed: hp <= 0,
                    stun_ms: request.metadata.stun_ms,
                }
            }
            Combatant::Monster(_) => DamageOutcome {
                success: true,
                applied: request.amount.max(0),
                killed: false,
                stun_ms: request.metadata.stun_ms,
            },
        }
    }
}

/// Projectile sink that only records launches.
#[derive(Clone, Debug, Default)]
pub struct ProjectileLog {
    inner: Arc<Mutex<Vec<(MonsterId, ProjectileSpec)>>>,
}

impl ProjectileLog {
    pub fn launched(&self) -> Vec<(MonsterId, ProjectileSpec)> {
        lock(&self.inner).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }
}

impl ProjectileSink for ProjectileLog {
    fn create_projectile(&mut self, owner: MonsterId, spec: ProjectileSpec) {
        lock(&self.inner).push((owner, spec));
    }
}
