use super::*;

impl CombatEngine {
    pub(super) fn update_monster(&mut self, id: MonsterId, elapsed_ms: u64, now_ms: u64) {
        let Some(monster) = self.monsters.get(id) else {
            return;
        };
        if monster.is_dying() {
            return;
        }
        if monster.hp <= 0 {
            self.kill_monster(id, None, now_ms);
            return;
        }
        self.snap_to_walkable(id);

        match monster_state(&self.monsters, id) {
            Some(MonsterState::Stunned) => {
                self.update_stunned(id, elapsed_ms, now_ms);
                return;
            }
            Some(MonsterState::Idle | MonsterState::Chasing | MonsterState::Attacking) => {}
            _ => return,
        }

        self.validate_target(id);
        match monster_state(&self.monsters, id) {
            Some(MonsterState::Idle) => self.update_idle(id, now_ms),
            Some(MonsterState::Chasing) => self.update_chasing(id, elapsed_ms, now_ms),
            Some(MonsterState::Attacking) => self.update_attacking(id, elapsed_ms),
            _ => {}
        }
    }

    /// Drops a target that vanished or died and falls back to idle so the
    /// caller re-evaluates on this same tick.
    fn validate_target(&mut self, id: MonsterId) {
        let Some(target) = self.monsters.get(id).and_then(|m| m.target) else {
            return;
        };
        if find_live_target(&self.target_snapshot, target).is_some() {
            return;
        }
        debug!(
            error = %CombatError::InvalidState { monster: id, target },
            "clearing stale target"
        );
        self.interrupt_attack(id);
        if let Some(monster) = self.monsters.get_mut(id) {
            monster.clear_target();
            monster.state = MonsterState::Idle;
            monster.velocity = Vec2::ZERO;
        }
    }

    /// Picks the nearest live target inside aggro range and starts chasing it.
    pub(super) fn scan_for_target(&mut self, id: MonsterId) -> bool {
        let Some(monster) = self.monsters.get_mut(id) else {
            return false;
        };
        let found = nearest_live_target(&self.target_snapshot, monster.position)
            .filter(|(_, d)| *d <= monster.aggro_range);
        let Some((target, _)) = found else {
            return false;
        };
        monster.target = Some(target.id);
        monster.state = MonsterState::Chasing;
        monster.path = None;
        monster.last_target_distance = None;
        monster.stuck.reset();
        true
    }

    fn update_idle(&mut self, id: MonsterId, now_ms: u64) {
        let Some(monster) = self.monsters.get_mut(id) else {
            return;
        };
        monster.velocity = Vec2::ZERO;
        let Some(target_id) = monster.target else {
            self.scan_for_target(id);
            return;
        };
        let Some(target) = find_live_target(&self.target_snapshot, target_id) else {
            return;
        };
        let distance = monster.position.distance(target.position);
        if distance > monster.aggro_range * self.config.disengage_multiplier {
            monster.clear_target();
            self.scan_for_target(id);
            return;
        }
        if let Some(facing) = Facing::from_vector(target.position - monster.position) {
            monster.facing = facing;
        }

        if let Some(slot) = self.select_attack(id, &target, distance, now_ms) {
            self.start_attack(id, slot, &target, now_ms);
        } else if self.needs_closing(id, distance, now_ms) {
            if let Some(monster) = self.monsters.get_mut(id) {
                monster.state = MonsterState::Chasing;
                monster.stuck.reset();
            }
        }
    }

    fn update_chasing(&mut self, id: MonsterId, elapsed_ms: u64, now_ms: u64) {
        let Some(monster) = self.monsters.get_mut(id) else {
            return;
        };
        let target = monster
            .target
            .and_then(|t| find_live_target(&self.target_snapshot, t));
        let Some(target) = target else {
            monster.clear_target();
            monster.state = MonsterState::Idle;
            monster.velocity = Vec2::ZERO;
            self.scan_for_target(id);
            return;
        };
        let distance = monster.position.distance(target.position);
        if distance > monster.aggro_range * self.config.disengage_multiplier {
            monster.clear_target();
            monster.state = MonsterState::Idle;
            monster.velocity = Vec2::ZERO;
            self.scan_for_target(id);
            return;
        }

        if let Some(slot) = self.select_attack(id, &target, distance, now_ms) {
            self.start_attack(id, slot, &target, now_ms);
            return;
        }
        if !self.needs_closing(id, distance, now_ms) {
            if let Some(monster) = self.monsters.get_mut(id) {
                monster.state = MonsterState::Idle;
                monster.velocity = Vec2::ZERO;
            }
            return;
        }
        self.move_toward(id, target.position, elapsed_ms, now_ms);
    }

    /// True when the target is beyond every attack, or some ready attack
    /// still needs the monster to close in.
    fn needs_closing(&self, id: MonsterId, distance: f32, now_ms: u64) -> bool {
        let Some(monster) = self.monsters.get(id) else {
            return false;
        };
        let species = species_of(&self.species, &monster.species);
        if distance > species.max_attack_range() {
            return true;
        }
        species.attacks.iter().any(|(slot, def)| {
            distance > def.range && monster.cooldown_ready(slot, def.cooldown_ms, now_ms)
        })
    }

    fn update_stunned(&mut self, id: MonsterId, elapsed_ms: u64, now_ms: u64) {
        let Some(monster) = self.monsters.get_mut(id) else {
            return;
        };
        monster.velocity = Vec2::ZERO;
        monster.stun_remaining_ms = monster.stun_remaining_ms.saturating_sub(elapsed_ms);
        if monster.stun_remaining_ms > 0 {
            return;
        }
        self.recover_from_stun(id, now_ms);
    }

    /// Resumes the pre-stun behavior when its target is still alive and in
    /// aggro range; otherwise goes idle and scans right away.
    fn recover_from_stun(&mut self, id: MonsterId, now_ms: u64) {
        let Some(monster) = self.monsters.get_mut(id) else {
            return;
        };
        let snapshot = monster.stun_snapshot.take();
        let resumed = snapshot.and_then(|snapshot| {
            let target = find_live_target(&self.target_snapshot, snapshot.target?)?;
            if monster.position.distance(target.position) > monster.aggro_range {
                return None;
            }
            Some((snapshot.state, target.id))
        });

        match resumed {
            Some((state, target)) => {
                monster.target = Some(target);
                monster.state = match state {
                    MonsterState::Chasing | MonsterState::Attacking => MonsterState::Chasing,
                    _ => MonsterState::Idle,
                };
                debug!(monster = %id, state = ?monster.state, "stun recovered; resuming");
            }
            None => {
                monster.clear_target();
                monster.state = MonsterState::Idle;
                self.scan_for_target(id);
                debug!(monster = %id, now_ms, "stun recovered; rescanning");
            }
        }
    }

    /// Stuns a live monster, cancelling any attack in flight. A monster that
    /// is already stunned keeps the longer of the two durations.
    pub fn stun_monster(&mut self, id: MonsterId, duration_ms: u64) -> bool {
        if duration_ms == 0 {
            return false;
        }
        let Some(monster) = self.monsters.get_mut(id) else {
            return false;
        };
        match monster.state {
            MonsterState::Dying => return false,
            MonsterState::Stunned => {
                monster.stun_remaining_ms = monster.stun_remaining_ms.max(duration_ms);
                return true;
            }
            _ => {}
        }
        self.interrupt_attack(id);
        let Some(monster) = self.monsters.get_mut(id) else {
            return false;
        };
        monster.stun_snapshot = Some(StunSnapshot {
            state: monster.state,
            target: monster.target,
        });
        monster.state = MonsterState::Stunned;
        monster.stun_remaining_ms = duration_ms;
        monster.velocity = Vec2::ZERO;
        monster.path = None;
        self.events.push(RuntimeEvent::MonsterStunned {
            monster_id: id,
            duration_ms,
        });
        true
    }

    pub(super) fn kill_monster(&mut self, id: MonsterId, by: Option<Combatant>, now_ms: u64) {
        let alive = self
            .monsters
            .get(id)
            .map(|m| !m.is_dying())
            .unwrap_or(false);
        if !alive {
            return;
        }
        self.interrupt_attack(id);
        let Some(monster) = self.monsters.get_mut(id) else {
            return;
        };
        monster.state = MonsterState::Dying;
        monster.velocity = Vec2::ZERO;
        monster.stun_remaining_ms = 0;
        monster.stun_snapshot = None;
        monster.clear_target();
        self.scheduler
            .schedule(id, Effect::Despawn, now_ms + self.config.death_grace_ms);
        self.stats.killed += 1;
        self.events.push(RuntimeEvent::MonsterKilled {
            monster_id: id,
            by,
        });
        debug!(monster = %id, ?by, "monster killed");
    }
}

fn monster_state(monsters: &MonsterRegistry, id: MonsterId) -> Option<MonsterState> {
    monsters.get(id).map(|m| m.state)
}

#[cfg(test)]
mod tests {
    use crate::collaborators::{CombatTarget, ProjectileLog, TableDamagePipeline, TargetTable};
    use crate::config::{AttackDef, AttackTable, EngineConfig, SpeciesDef, SpeciesTable};
    use crate::engine::{Collaborators, CombatEngine, CombatEngineOptions};
    use crate::pathfinding::GridPathfinder;
    use crate::terrain::GridTerrain;
    use crate::types::{MonsterState, TargetId, Vec2};

    fn engine(targets: &TargetTable) -> CombatEngine {
        let hound = SpeciesDef {
            name: "hound".to_string(),
            weight: 1.0,
            max_hp: 30,
            move_speed: 4.0,
            aggro_range: 300.0,
            collision_radius: 10.0,
            attacks: AttackTable {
                primary: Some(AttackDef {
                    range: 40.0,
                    ..AttackDef::fallback()
                }),
                special1: None,
                special2: None,
            },
        };
        CombatEngine::new(
            Collaborators {
                terrain: Box::new(GridTerrain::open(40, 40, 32.0)),
                pathfinder: Box::new(GridPathfinder::default()),
                targets: Box::new(targets.clone()),
                damage: Box::new(TableDamagePipeline::new(targets.clone())),
                projectiles: Box::new(ProjectileLog::default()),
            },
            CombatEngineOptions {
                seed: 5,
                config: EngineConfig {
                    spawn_interval_ms: 0,
                    ..EngineConfig::default()
                },
                species: SpeciesTable::new(vec![hound]),
            },
        )
    }

    #[test]
    fn chase_gives_up_beyond_disengage_range() {
        let targets = TargetTable::new();
        targets.upsert(CombatTarget::new(1, Vec2::new(300.0, 100.0), 100));
        let mut engine = engine(&targets);
        let id = engine
            .create_monster(Some("hound"), Some(Vec2::new(100.0, 100.0)))
            .expect("spawn");
        engine.step(50);
        assert_eq!(engine.monster(id).map(|m| m.state), Some(MonsterState::Chasing));

        // Past aggro but inside 1.5x aggro: keep chasing.
        targets.set_position(TargetId(1), Vec2::new(500.0, 100.0));
        engine.step(50);
        assert_eq!(engine.monster(id).map(|m| m.state), Some(MonsterState::Chasing));

        targets.set_position(TargetId(1), Vec2::new(800.0, 100.0));
        engine.step(50);
        let monster = engine.monster(id).expect("monster");
        assert_eq!(monster.state, MonsterState::Idle);
        assert_eq!(monster.target, None);
    }

    #[test]
    fn disengaging_switches_to_a_closer_target_in_the_same_tick() {
        let targets = TargetTable::new();
        targets.upsert(CombatTarget::new(1, Vec2::new(300.0, 100.0), 100));
        let mut engine = engine(&targets);
        let id = engine
            .create_monster(Some("hound"), Some(Vec2::new(100.0, 100.0)))
            .expect("spawn");
        engine.step(50);
        assert_eq!(engine.monster(id).and_then(|m| m.target), Some(TargetId(1)));

        targets.set_position(TargetId(1), Vec2::new(900.0, 100.0));
        targets.upsert(CombatTarget::new(2, Vec2::new(100.0, 250.0), 100));
        engine.step(50);
        let monster = engine.monster(id).expect("monster");
        assert_eq!(monster.state, MonsterState::Chasing);
        assert_eq!(monster.target, Some(TargetId(2)));
    }

    #[test]
    fn stun_recovery_resumes_when_target_is_still_close() {
        let targets = TargetTable::new();
        targets.upsert(CombatTarget::new(1, Vec2::new(250.0, 100.0), 100));
        let mut engine = engine(&targets);
        let id = engine
            .create_monster(Some("hound"), Some(Vec2::new(100.0, 100.0)))
            .expect("spawn");
        engine.step(50);
        assert!(engine.stun_monster(id, 100));
        engine.step(50);
        assert_eq!(engine.monster(id).map(|m| m.state), Some(MonsterState::Stunned));
        engine.step(50);
        let monster = engine.monster(id).expect("monster");
        assert_eq!(monster.state, MonsterState::Chasing);
        assert_eq!(monster.target, Some(TargetId(1)));
    }

    #[test]
    fn stun_recovery_rescans_in_the_same_tick() {
        let targets = TargetTable::new();
        targets.upsert(CombatTarget::new(1, Vec2::new(250.0, 100.0), 100));
        let mut engine = engine(&targets);
        let id = engine
            .create_monster(Some("hound"), Some(Vec2::new(100.0, 100.0)))
            .expect("spawn");
        engine.step(50);
        assert!(engine.stun_monster(id, 50));

        targets.set_hp(TargetId(1), 0);
        targets.upsert(CombatTarget::new(2, Vec2::new(100.0, 250.0), 100));
        engine.step(50);
        let monster = engine.monster(id).expect("monster");
        assert_eq!(monster.state, MonsterState::Chasing);
        assert_eq!(monster.target, Some(TargetId(2)));
    }

    #[test]
    fn stun_recovery_goes_idle_when_target_left_aggro_range() {
        let targets = TargetTable::new();
        targets.upsert(CombatTarget::new(1, Vec2::new(250.0, 100.0), 100));
        let mut engine = engine(&targets);
        let id = engine
            .create_monster(Some("hound"), Some(Vec2::new(100.0, 100.0)))
            .expect("spawn");
        engine.step(50);
        assert!(engine.stun_monster(id, 50));
        targets.set_position(TargetId(1), Vec2::new(700.0, 100.0));
        engine.step(50);
        let monster = engine.monster(id).expect("monster");
        assert_eq!(monster.state, MonsterState::Idle);
        assert_eq!(monster.target, None);
    }

    #[test]
    fn zero_hp_found_during_update_starts_dying() {
        let targets = TargetTable::new();
        targets.upsert(CombatTarget::new(1, Vec2::new(250.0, 100.0), 100));
        let mut engine = engine(&targets);
        let id = engine
            .create_monster(Some("hound"), Some(Vec2::new(100.0, 100.0)))
            .expect("spawn");
        engine.monster_mut(id).expect("monster").hp = 0;
        engine.step(50);
        let monster = engine.monster(id).expect("monster");
        assert_eq!(monster.state, MonsterState::Dying);
        assert_eq!(engine.stats().killed, 1);
    }
}
