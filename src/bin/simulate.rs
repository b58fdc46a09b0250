use std::collections::BTreeMap;
use std::f32::consts::TAU;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use mmo_monster_combat_server::collaborators::{
    CombatTarget, ProjectileLog, TableDamagePipeline, TargetRegistry, TargetTable,
};
use mmo_monster_combat_server::config::{load_config_file, EngineConfig, SpeciesTable};
use mmo_monster_combat_server::constants::TICK_MS;
use mmo_monster_combat_server::engine::{
    Collaborators, CombatEngine, CombatEngineOptions, EngineStats, LodCounts, PlayerAttack,
};
use mmo_monster_combat_server::geometry::Hitbox;
use mmo_monster_combat_server::pathfinding::GridPathfinder;
use mmo_monster_combat_server::terrain::{GridTerrain, Terrain};
use mmo_monster_combat_server::types::{DamageType, RuntimeEvent, TargetId, Vec2};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_ARENA_TILES: i32 = 96;
const DEFAULT_TILE_SIZE: f32 = 32.0;
const TARGET_MAX_HP: i32 = 500;
const TARGET_RESPAWN_MS: u64 = 3_000;
const TARGET_ORBIT_PERIOD_MS: f32 = 40_000.0;
const TARGET_SWING_EVERY_TICKS: u64 = 10;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless monster combat scenario runner")]
struct Cli {
    /// JSON file with `engine` and `species` sections.
    #[arg(long)]
    config: Option<PathBuf>,
    /// ASCII tile map; `#` walls, `.` floor, digits elevation.
    #[arg(long)]
    map: Option<PathBuf>,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, default_value_t = 1_200)]
    ticks: u64,
    #[arg(long, default_value_t = 60)]
    monsters: usize,
    #[arg(long, default_value_t = 4)]
    targets: usize,
    #[arg(long)]
    json_logs: bool,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventCounts {
    spawned: u64,
    damaged: u64,
    stunned: u64,
    killed: u64,
    despawned: u64,
    attacks_started: u64,
    attack_hits: u64,
    projectiles: u64,
    completed: u64,
    interrupted: u64,
}

impl EventCounts {
    fn record(&mut self, event: &RuntimeEvent) {
        match event {
            RuntimeEvent::MonsterSpawned { .. } => self.spawned += 1,
            RuntimeEvent::MonsterDamaged { .. } => self.damaged += 1,
            RuntimeEvent::MonsterStunned { .. } => self.stunned += 1,
            RuntimeEvent::MonsterKilled { .. } => self.killed += 1,
            RuntimeEvent::MonsterDespawned { .. } => self.despawned += 1,
            RuntimeEvent::AttackStarted { .. } => self.attacks_started += 1,
            RuntimeEvent::AttackDamage { .. } => self.attack_hits += 1,
            RuntimeEvent::ProjectileFired { count, .. } => self.projectiles += *count as u64,
            RuntimeEvent::AttackCompleted { .. } => self.completed += 1,
            RuntimeEvent::AttackInterrupted { .. } => self.interrupted += 1,
            RuntimeEvent::AttackPhaseChanged { .. } => {}
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunSummary {
    started_at: String,
    finished_at: String,
    seed: u64,
    ticks: u64,
    sim_ms: u64,
    monsters_alive: usize,
    target_downs: u64,
    events: EventCounts,
    stats: EngineStats,
    lod: LodCounts,
    species: BTreeMap<String, usize>,
}

struct Scenario {
    engine: CombatEngine,
    targets: TargetTable,
    projectiles: ProjectileLog,
    center: Vec2,
    orbit_radius: f32,
    target_count: usize,
    down_since: BTreeMap<TargetId, u64>,
    target_downs: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let (config, species) = match cli.config.as_deref() {
        Some(path) => load_config_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => (EngineConfig::default(), SpeciesTable::default()),
    };
    let terrain = match cli.map.as_deref() {
        Some(path) => load_map(path)?,
        None => GridTerrain::arena(DEFAULT_ARENA_TILES, DEFAULT_ARENA_TILES, DEFAULT_TILE_SIZE),
    };

    let started_at = Utc::now();
    info!(
        seed = cli.seed,
        ticks = cli.ticks,
        monsters = cli.monsters,
        targets = cli.targets,
        "simulation started"
    );

    let mut scenario = Scenario::new(terrain, config, species, cli.seed, cli.targets);
    let spawned = scenario.engine.spawn_batch(cli.monsters);
    if spawned.len() < cli.monsters {
        warn!(
            requested = cli.monsters,
            spawned = spawned.len(),
            "initial population below request"
        );
    }

    let mut events = EventCounts::default();
    for _ in 0..cli.ticks {
        scenario.advance();
        let snapshot = scenario.engine.build_snapshot(true);
        for event in &snapshot.events {
            events.record(event);
        }
    }

    let summary = RunSummary {
        started_at: started_at.to_rfc3339(),
        finished_at: Utc::now().to_rfc3339(),
        seed: cli.seed,
        ticks: cli.ticks,
        sim_ms: scenario.engine.now_ms(),
        monsters_alive: scenario.engine.monster_count(),
        target_downs: scenario.target_downs,
        events,
        stats: scenario.engine.stats().clone(),
        lod: scenario.engine.lod_counts(),
        species: species_census(&scenario.engine),
    };
    info!(
        killed = summary.stats.killed,
        hits = summary.stats.hits_applied,
        projectiles = scenario.projectiles.len(),
        "simulation finished"
    );
    println!(
        "{}",
        serde_json::to_string(&summary).context("serializing run summary")?
    );
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_map(path: &Path) -> Result<GridTerrain> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading map {}", path.display()))?;
    GridTerrain::parse(&raw, DEFAULT_TILE_SIZE)
        .with_context(|| format!("parsing map {}", path.display()))
}

impl Scenario {
    fn new(
        terrain: GridTerrain,
        config: EngineConfig,
        species: SpeciesTable,
        seed: u64,
        target_count: usize,
    ) -> Self {
        let bounds = terrain.bounds();
        let center = Vec2::new(bounds.x / 2.0, bounds.y / 2.0);
        let orbit_radius = bounds.x.min(bounds.y) / 4.0;
        let targets = TargetTable::new();
        let projectiles = ProjectileLog::default();
        let engine = CombatEngine::new(
            Collaborators {
                terrain: Box::new(terrain),
                pathfinder: Box::new(GridPathfinder::default()),
                targets: Box::new(targets.clone()),
                damage: Box::new(TableDamagePipeline::new(targets.clone())),
                projectiles: Box::new(projectiles.clone()),
            },
            CombatEngineOptions {
                seed,
                config,
                species,
            },
        );
        let mut scenario = Self {
            engine,
            targets,
            projectiles,
            center,
            orbit_radius,
            target_count,
            down_since: BTreeMap::new(),
            target_downs: 0,
        };
        for index in 0..target_count {
            let position = scenario.target_position(index, 0);
            scenario.targets.upsert(CombatTarget::new(
                index as u64 + 1,
                position,
                TARGET_MAX_HP,
            ));
        }
        scenario
    }

    /// Where target `index` stands at `now_ms`: evenly spaced on a slow orbit
    /// around the map centre, pulled onto walkable ground.
    fn target_position(&self, index: usize, now_ms: u64) -> Vec2 {
        let phase = index as f32 / self.target_count.max(1) as f32;
        let turn = now_ms as f32 / TARGET_ORBIT_PERIOD_MS;
        let angle = (phase + turn) * TAU;
        let ideal = self.center + Vec2::from_angle(angle) * self.orbit_radius;
        let terrain = self.engine.terrain();
        if terrain.is_walkable(ideal.x, ideal.y) {
            return ideal;
        }
        terrain
            .find_nearest_walkable(ideal.x, ideal.y, self.orbit_radius)
            .unwrap_or(self.center)
    }

    fn advance(&mut self) {
        let now_ms = self.engine.now_ms();
        self.move_targets(now_ms);
        if self.engine.tick() % TARGET_SWING_EVERY_TICKS == 0 {
            self.swing_targets();
        }
        self.engine.step(TICK_MS);
        self.track_downs(self.engine.now_ms());
    }

    fn move_targets(&mut self, now_ms: u64) {
        for index in 0..self.target_count {
            let id = TargetId(index as u64 + 1);
            let position = self.target_position(index, now_ms);
            self.targets.set_position(id, position);
        }
    }

    /// Every live target swings a cone at its nearest monster.
    fn swing_targets(&mut self) {
        for target in self.targets.targets() {
            if !target.is_live() {
                continue;
            }
            let nearest = self
                .engine
                .monsters()
                .filter(|m| !m.is_dying())
                .map(|m| (m.position, m.position.distance(target.position)))
                .filter(|(_, d)| *d <= 120.0)
                .min_by(|a, b| a.1.total_cmp(&b.1));
            let Some((aim, _)) = nearest else {
                continue;
            };
            let attack = PlayerAttack {
                name: "sweep".to_string(),
                origin: target.position,
                angle: target.position.angle_to(aim),
                shape: Hitbox::Cone {
                    range: 120.0,
                    angle: std::f32::consts::FRAC_PI_2,
                },
                damage: 12,
                damage_type: DamageType::Physical,
                stun_ms: 0,
            };
            self.engine.resolve_player_attack(target.id, &attack);
        }
    }

    fn track_downs(&mut self, now_ms: u64) {
        for target in self.targets.targets() {
            if target.is_live() {
                continue;
            }
            match self.down_since.get(&target.id).copied() {
                None => {
                    self.down_since.insert(target.id, now_ms);
                    self.target_downs += 1;
                }
                Some(since) if now_ms.saturating_sub(since) >= TARGET_RESPAWN_MS => {
                    self.down_since.remove(&target.id);
                    self.targets.set_hp(target.id, TARGET_MAX_HP);
                }
                Some(_) => {}
            }
        }
    }
}

fn species_census(engine: &CombatEngine) -> BTreeMap<String, usize> {
    let mut census = BTreeMap::new();
    for monster in engine.monsters() {
        *census.entry(monster.species.clone()).or_insert(0) += 1;
    }
    census
}
