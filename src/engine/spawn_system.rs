use super::*;

impl CombatEngine {
    /// Spawns one monster. `species` falls back to the table's default when
    /// unknown; `None` picks a weighted-random species. `position` is snapped
    /// to walkable ground, and `None` searches for a spot away from targets.
    pub fn create_monster(
        &mut self,
        species: Option<&str>,
        position: Option<Vec2>,
    ) -> Result<MonsterId, CombatError> {
        let def = match species {
            Some(name) => match self.species.get(name) {
                Some(def) => def.clone(),
                None => {
                    let fallback = self.species.fallback().clone();
                    self.report_config_error(
                        format!("species:{name}"),
                        CombatError::UnknownSpecies {
                            name: name.to_string(),
                            fallback: fallback.name.clone(),
                        },
                    );
                    fallback
                }
            },
            None => self.species.pick_weighted(&mut self.rng).clone(),
        };

        let position = match position {
            Some(p) if self.terrain.is_walkable(p.x, p.y) => p,
            Some(p) => {
                let snapped =
                    self.terrain
                        .find_nearest_walkable(p.x, p.y, self.config.desync_snap_radius);
                match snapped {
                    Some(snapped) => snapped,
                    None => self
                        .pick_spawn_position()
                        .ok_or(CombatError::NoSpawnPosition)?,
                }
            }
            None => self
                .pick_spawn_position()
                .ok_or(CombatError::NoSpawnPosition)?,
        };

        let key = monster_key(self.seed, &def.name, position);
        let id = self
            .monsters
            .insert_with(|id| Monster::new(id, &def, position, key));
        self.stats.spawned += 1;
        self.events.push(RuntimeEvent::MonsterSpawned {
            monster_id: id,
            species: def.name.clone(),
            x: position.x,
            y: position.y,
        });
        debug!(monster = %id, species = %def.name, x = position.x, y = position.y, "monster spawned");
        Ok(id)
    }

    /// Spawns up to `count` random monsters without exceeding the population cap.
    pub fn spawn_batch(&mut self, count: usize) -> Vec<MonsterId> {
        let room = self
            .config
            .max_population
            .saturating_sub(self.monsters.len());
        let mut spawned = Vec::with_capacity(count.min(room));
        for _ in 0..count.min(room) {
            match self.create_monster(None, None) {
                Ok(id) => spawned.push(id),
                Err(error) => {
                    warn!(%error, "batch spawn stopped");
                    break;
                }
            }
        }
        spawned
    }

    pub(super) fn update_spawning(&mut self, dt_ms: u64) {
        let interval = self.config.spawn_interval_ms;
        if interval == 0 {
            return;
        }
        self.spawn_accumulator_ms = self.spawn_accumulator_ms.saturating_add(dt_ms);
        if self.spawn_accumulator_ms < interval {
            return;
        }
        if self.monsters.len() >= self.config.max_population {
            self.spawn_accumulator_ms = interval;
            return;
        }
        self.spawn_accumulator_ms -= interval;
        if let Err(error) = self.create_monster(None, None) {
            warn!(%error, "periodic spawn skipped");
        }
    }

    /// Random walkable point at least the configured distance from every live
    /// target; falls back to walkable ground near a world edge. Targets are read
    /// from the registry so spawns made before the first tick see them too.
    pub(super) fn pick_spawn_position(&mut self) -> Option<Vec2> {
        let bounds = self.terrain.bounds();
        if bounds.x <= 0.0 || bounds.y <= 0.0 {
            return None;
        }
        let min_distance = self.config.spawn_min_target_distance;
        let occupied: Vec<Vec2> = self
            .targets
            .targets()
            .into_iter()
            .filter(|t| t.is_live())
            .map(|t| t.position)
            .collect();
        for _ in 0..self.config.spawn_attempts {
            let candidate = Vec2::new(
                self.rng.range_f32(0.0, bounds.x),
                self.rng.range_f32(0.0, bounds.y),
            );
            if !self.terrain.is_walkable(candidate.x, candidate.y) {
                continue;
            }
            let crowded = occupied
                .iter()
                .any(|p| p.distance(candidate) < min_distance);
            if !crowded {
                return Some(candidate);
            }
        }

        let inset = self.terrain.tile_size() / 2.0;
        let edge = match self.rng.int(0, 3) {
            0 => Vec2::new(self.rng.range_f32(inset, bounds.x - inset), inset),
            1 => Vec2::new(self.rng.range_f32(inset, bounds.x - inset), bounds.y - inset),
            2 => Vec2::new(inset, self.rng.range_f32(inset, bounds.y - inset)),
            _ => Vec2::new(bounds.x - inset, self.rng.range_f32(inset, bounds.y - inset)),
        };
        let radius = bounds.length();
        let found = self.terrain.find_nearest_walkable(edge.x, edge.y, radius);
        if found.is_none() {
            debug!(x = edge.x, y = edge.y, "no walkable ground near world edge");
        }
        found
    }

    pub(super) fn despawn_monster(&mut self, id: MonsterId) {
        let dying = self.monsters.get(id).map(Monster::is_dying).unwrap_or(false);
        if !dying {
            self.note_stale_effect(id);
            return;
        }
        self.scheduler.cancel_all(id);
        self.monsters.remove(id);
        self.reported_desync.remove(&id);
        self.stats.despawned += 1;
        self.events.push(RuntimeEvent::MonsterDespawned { monster_id: id });
    }
}

#[cfg(test)]
mod tests {
    use crate::collaborators::{
        CombatTarget, ProjectileLog, TableDamagePipeline, TargetTable,
    };
    use crate::config::{EngineConfig, SpeciesTable};
    use crate::engine::{Collaborators, CombatEngine, CombatEngineOptions};
    use crate::pathfinding::GridPathfinder;
    use crate::terrain::{GridTerrain, Terrain, Tile};
    use crate::types::Vec2;

    fn engine_on(terrain: GridTerrain, targets: TargetTable, config: EngineConfig) -> CombatEngine {
        CombatEngine::new(
            Collaborators {
                terrain: Box::new(terrain),
                pathfinder: Box::new(GridPathfinder::default()),
                targets: Box::new(targets.clone()),
                damage: Box::new(TableDamagePipeline::new(targets)),
                projectiles: Box::new(ProjectileLog::default()),
            },
            CombatEngineOptions {
                seed: 11,
                config,
                species: SpeciesTable::default(),
            },
        )
    }

    #[test]
    fn spawn_search_without_targets_lands_on_walkable_ground() {
        let layout = "\
##########
#........#
#.######.#
#.#....#.#
#.######.#
#........#
##########";
        let terrain = GridTerrain::parse(layout, 32.0).expect("layout");
        let mut engine = engine_on(terrain, TargetTable::new(), EngineConfig::default());
        let bounds = engine.terrain().bounds();
        for _ in 0..50 {
            let id = engine.create_monster(None, None).expect("spawn");
            let p = engine.monster(id).expect("monster").position;
            assert!(p.x >= 0.0 && p.x < bounds.x && p.y >= 0.0 && p.y < bounds.y);
            assert!(engine.terrain().is_walkable(p.x, p.y));
        }
    }

    #[test]
    fn spawn_search_keeps_distance_from_targets() {
        let targets = TargetTable::new();
        targets.upsert(CombatTarget::new(1, Vec2::new(1_000.0, 1_000.0), 100));
        let mut engine = engine_on(
            GridTerrain::open(64, 64, 32.0),
            targets.clone(),
            EngineConfig {
                spawn_attempts: 200,
                ..EngineConfig::default()
            },
        );
        engine.step(50);
        for _ in 0..20 {
            let id = engine.create_monster(Some("grunt"), None).expect("spawn");
            let p = engine.monster(id).expect("monster").position;
            assert!(p.distance(Vec2::new(1_000.0, 1_000.0)) >= 300.0);
        }
    }

    #[test]
    fn batch_spawn_before_first_tick_avoids_targets() {
        let targets = TargetTable::new();
        targets.upsert(CombatTarget::new(1, Vec2::new(320.0, 320.0), 100));
        let mut engine = engine_on(
            GridTerrain::open(20, 20, 32.0),
            targets.clone(),
            EngineConfig {
                spawn_attempts: 200,
                max_population: 100,
                ..EngineConfig::default()
            },
        );
        let spawned = engine.spawn_batch(40);
        assert_eq!(spawned.len(), 40);
        let min_distance = engine.config.spawn_min_target_distance;
        for id in spawned {
            let p = engine.monster(id).expect("monster").position;
            assert!(p.distance(Vec2::new(320.0, 320.0)) >= min_distance);
        }
    }

    #[test]
    fn spawn_search_finds_a_lone_floor_tile_in_the_far_corner() {
        let mut terrain = GridTerrain::open(64, 64, 32.0);
        for ty in 0..64 {
            for tx in 0..64 {
                terrain.set_tile(tx, ty, Tile::Wall);
            }
        }
        terrain.set_tile(63, 63, Tile::Floor(0));
        let mut engine = engine_on(terrain, TargetTable::new(), EngineConfig::default());
        let corner = Vec2::new(63.5 * 32.0, 63.5 * 32.0);
        for _ in 0..20 {
            let id = engine.create_monster(None, None).expect("spawn");
            let p = engine.monster(id).expect("monster").position;
            assert!(engine.terrain().is_walkable(p.x, p.y));
            assert!(p.distance(corner) <= 32.0);
        }
    }

    #[test]
    fn unknown_species_falls_back_to_default() {
        let mut engine = engine_on(
            GridTerrain::open(16, 16, 32.0),
            TargetTable::new(),
            EngineConfig::default(),
        );
        let id = engine
            .create_monster(Some("dragon"), Some(Vec2::new(100.0, 100.0)))
            .expect("spawn");
        assert_eq!(engine.monster(id).expect("monster").species, "grunt");
        engine
            .create_monster(Some("dragon"), Some(Vec2::new(120.0, 100.0)))
            .expect("spawn");
        assert_eq!(engine.reported_config.len(), 1);
    }

    #[test]
    fn explicit_position_in_a_wall_is_snapped() {
        let terrain = GridTerrain::arena(10, 10, 32.0);
        let mut engine = engine_on(terrain, TargetTable::new(), EngineConfig::default());
        let id = engine
            .create_monster(Some("grunt"), Some(Vec2::new(5.0, 5.0)))
            .expect("spawn");
        let p = engine.monster(id).expect("monster").position;
        assert!(engine.terrain().is_walkable(p.x, p.y));
    }

    #[test]
    fn periodic_spawner_respects_population_cap() {
        let mut engine = engine_on(
            GridTerrain::open(32, 32, 32.0),
            TargetTable::new(),
            EngineConfig {
                spawn_interval_ms: 100,
                max_population: 3,
                ..EngineConfig::default()
            },
        );
        for _ in 0..40 {
            engine.step(50);
        }
        assert_eq!(engine.monster_count(), 3);
        assert_eq!(engine.stats().spawned, 3);
        assert!(engine.spawn_batch(5).is_empty());
    }
}
