use thiserror::Error;

use crate::types::{MonsterId, TargetId, Vec2};

#[derive(Error, Debug)]
pub enum CombatError {
    #[error("unknown species '{name}', falling back to '{fallback}'")]
    UnknownSpecies { name: String, fallback: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{monster} holds stale target {target}")]
    InvalidState { monster: MonsterId, target: TargetId },

    #[error("{monster} desynced onto unwalkable tile at {at:?}")]
    TerrainDesync { monster: MonsterId, at: Vec2 },

    #[error("no path from {from:?} to {to:?}")]
    PathNotFound { from: Vec2, to: Vec2 },

    #[error("deferred effect for {monster} fired after its precondition lapsed")]
    StaleEffect { monster: MonsterId },

    #[error("terrain has no walkable tile to spawn on")]
    NoSpawnPosition,

    #[error("invalid terrain layout: {0}")]
    InvalidTerrain(String),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}
