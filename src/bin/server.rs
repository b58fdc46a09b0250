use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use mmo_monster_combat_server::collaborators::{
    CombatTarget, ProjectileSink, ProjectileSpec, TableDamagePipeline,
    TargetRegistry, TargetTable,
};
use mmo_monster_combat_server::config::{load_config_file, EngineConfig, SpeciesTable};
use mmo_monster_combat_server::constants::{BASE_VIEW_DISTANCE, TICK_MS};
use mmo_monster_combat_server::engine::{Collaborators, CombatEngine, CombatEngineOptions};
use mmo_monster_combat_server::pathfinding::GridPathfinder;
use mmo_monster_combat_server::terrain::GridTerrain;
use mmo_monster_combat_server::types::{MonsterId, RuntimeEvent, TargetId, Vec2};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_ARENA_TILES: i32 = 128;
const TILE_SIZE: f32 = 32.0;
const INITIAL_POPULATION: usize = 80;
const MAX_RETAINED_EVENTS: usize = 512;

type SharedState = Arc<Mutex<ServerState>>;

/// No projectile simulation runs in this host; launches are only traced.
struct TracedProjectiles;

impl ProjectileSink for TracedProjectiles {
    fn create_projectile(&mut self, owner: MonsterId, spec: ProjectileSpec) {
        debug!(
            monster = %owner,
            x = spec.position.x,
            y = spec.position.y,
            angle = spec.angle,
            "projectile launched"
        );
    }
}

struct ServerState {
    engine: CombatEngine,
    targets: TargetTable,
    recent_events: Vec<RuntimeEvent>,
}

impl ServerState {
    fn new(engine: CombatEngine, targets: TargetTable) -> Self {
        Self {
            engine,
            targets,
            recent_events: Vec::new(),
        }
    }

    fn retain_events(&mut self, events: Vec<RuntimeEvent>) {
        self.recent_events.extend(events);
        let overflow = self.recent_events.len().saturating_sub(MAX_RETAINED_EVENTS);
        if overflow > 0 {
            self.recent_events.drain(..overflow);
        }
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotQuery {
    x: Option<f32>,
    y: Option<f32>,
    radius: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct TargetUpdate {
    id: u64,
    x: f32,
    y: f32,
    hp: Option<i32>,
    #[serde(default)]
    remove: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let seed = std::env::var("SEED")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(1);

    let (config, species) = match std::env::var("CONFIG_PATH").ok().map(PathBuf::from) {
        Some(path) => load_config_file(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => (EngineConfig::default(), SpeciesTable::default()),
    };
    let terrain = match std::env::var("MAP_PATH").ok().map(PathBuf::from) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading map {}", path.display()))?;
            GridTerrain::parse(&raw, TILE_SIZE)
                .with_context(|| format!("parsing map {}", path.display()))?
        }
        None => GridTerrain::arena(DEFAULT_ARENA_TILES, DEFAULT_ARENA_TILES, TILE_SIZE),
    };

    let targets = TargetTable::new();
    let mut engine = CombatEngine::new(
        Collaborators {
            terrain: Box::new(terrain),
            pathfinder: Box::new(GridPathfinder::default()),
            targets: Box::new(targets.clone()),
            damage: Box::new(TableDamagePipeline::new(targets.clone())),
            projectiles: Box::new(TracedProjectiles),
        },
        CombatEngineOptions {
            seed,
            config,
            species,
        },
    );
    engine.spawn_batch(INITIAL_POPULATION);

    let state = Arc::new(Mutex::new(ServerState::new(engine, targets)));
    start_tick_loop(state.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/snapshot", get(snapshot_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/targets", post(target_handler))
        .with_state(state);

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    info!(port, seed, "listening");
    axum::serve(listener, app)
        .await
        .context("server runtime failed")?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|value| value.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn start_tick_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            tick_engine(&mut guard);
        }
    });
}

fn tick_engine(state: &mut ServerState) {
    state.engine.step(TICK_MS);
    let events = state.engine.drain_events();
    if !events.is_empty() {
        debug!(tick = state.engine.tick(), count = events.len(), "tick events");
    }
    state.retain_events(events);
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn snapshot_handler(
    State(state): State<SharedState>,
    Query(query): Query<SnapshotQuery>,
) -> impl IntoResponse {
    let mut guard = state.lock().await;
    let tick = guard.engine.tick();
    let now_ms = guard.engine.now_ms();
    let monsters = match observer_from_query(&query) {
        Some((observer, radius)) => guard.engine.build_observer_snapshot(observer, radius),
        None => guard.engine.build_snapshot(false).monsters,
    };
    let events = std::mem::take(&mut guard.recent_events);
    Json(json!({
        "tick": tick,
        "nowMs": now_ms,
        "monsters": monsters,
        "events": events,
    }))
}

async fn stats_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let guard = state.lock().await;
    Json(json!({
        "tick": guard.engine.tick(),
        "monsters": guard.engine.monster_count(),
        "targets": guard.targets.len(),
        "stats": guard.engine.stats(),
        "lod": guard.engine.lod_counts(),
    }))
}

async fn target_handler(
    State(state): State<SharedState>,
    Json(update): Json<TargetUpdate>,
) -> impl IntoResponse {
    let guard = state.lock().await;
    let status = apply_target_update(&guard.targets, &update);
    (status, Json(json!({ "ok": status.is_success() })))
}

fn apply_target_update(targets: &TargetTable, update: &TargetUpdate) -> StatusCode {
    if !update.x.is_finite() || !update.y.is_finite() {
        return StatusCode::BAD_REQUEST;
    }
    let id = TargetId(update.id);
    if update.remove {
        return match targets.remove(id) {
            Some(_) => StatusCode::OK,
            None => StatusCode::NOT_FOUND,
        };
    }
    let position = Vec2::new(update.x, update.y);
    if targets.get(id).is_some() {
        targets.set_position(id, position);
        if let Some(hp) = update.hp {
            targets.set_hp(id, hp);
        }
    } else {
        targets.upsert(CombatTarget::new(update.id, position, update.hp.unwrap_or(100)));
    }
    StatusCode::OK
}

/// Observer position and culling radius; both coordinates are required and
/// must be finite, the radius defaults to the base view distance.
fn observer_from_query(query: &SnapshotQuery) -> Option<(Vec2, f32)> {
    let (x, y) = (query.x?, query.y?);
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    let radius = query
        .radius
        .filter(|r| r.is_finite() && *r > 0.0)
        .unwrap_or(BASE_VIEW_DISTANCE);
    Some((Vec2::new(x, y), radius))
}
