pub mod collaborators;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod monster;
pub mod pathfinding;
pub mod registry;
pub mod rng;
pub mod scheduler;
pub mod terrain;
pub mod types;
