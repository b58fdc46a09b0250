pub const TICK_RATE: u32 = 20;
pub const TICK_MS: u64 = 1000 / TICK_RATE as u64;

pub const BASE_VIEW_DISTANCE: f32 = 800.0;
pub const LOD_NEAR_MULTIPLIER: f32 = 1.0;
pub const LOD_MEDIUM_MULTIPLIER: f32 = 2.0;
pub const LOD_FAR_MULTIPLIER: f32 = 3.0;
pub const LOD_MEDIUM_INTERVAL: u32 = 2;
pub const LOD_FAR_INTERVAL: u32 = 4;

pub const DISENGAGE_MULTIPLIER: f32 = 1.5;
pub const ATTACK_RANGE_TOLERANCE: f32 = 1.2;

pub const DEATH_GRACE_MS: u64 = 2_000;
pub const SPAWN_INTERVAL_MS: u64 = 5_000;
pub const MAX_POPULATION: usize = 200;
pub const SPAWN_ATTEMPTS: usize = 30;
pub const SPAWN_MIN_TARGET_DISTANCE: f32 = 300.0;

pub const PATH_REUSE_TOLERANCE: f32 = 24.0;
pub const WAYPOINT_REACHED_RADIUS: f32 = 6.0;
pub const DESYNC_SNAP_RADIUS: f32 = 160.0;
pub const PATH_MAX_EXPANSIONS: usize = 4_000;

pub const STUCK_SAMPLE_INTERVAL_MS: u64 = 500;
pub const STUCK_SAMPLE_COUNT: usize = 4;
pub const STUCK_RADIUS: f32 = 4.0;
pub const STUCK_PUSH_LEVEL: u32 = 3;
pub const STUCK_PUSH_MULTIPLIER: f32 = 3.0;
pub const WANDER_STEP_MULTIPLIER: f32 = 0.5;

pub const MULTI_HIT_MIN_INTERVAL_MS: u64 = 50;
