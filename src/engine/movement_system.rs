use std::f32::consts::{FRAC_PI_4, PI};

use super::*;

impl CombatEngine {
    /// Moves a monster one step toward `goal`, scaled so `move_speed` is
    /// travelled per base tick. Blocked steps slide along an axis, then try a
    /// short random wander; repeated lack of progress escalates to detours
    /// and finally a strong random push.
    pub(super) fn move_toward(&mut self, id: MonsterId, goal: Vec2, elapsed_ms: u64, now_ms: u64) {
        let tick_ms = self.config.tick_ms.max(1);
        let reuse_tolerance = self.config.path_reuse_tolerance;
        let reach_radius = self.config.waypoint_reached_radius;
        let (sample_interval, sample_count, stuck_radius) = (
            self.config.stuck_sample_interval_ms,
            self.config.stuck_sample_count,
            self.config.stuck_radius,
        );
        let terrain = self.terrain.as_ref();
        let pathfinder = self.pathfinder.as_ref();
        let Some(monster) = self.monsters.get_mut(id) else {
            return;
        };

        let remaining = monster.position.distance(goal);
        let mut step = monster.move_speed * elapsed_ms as f32 / tick_ms as f32;
        if step <= 0.0 || remaining <= f32::EPSILON {
            monster.velocity = Vec2::ZERO;
            return;
        }

        let mut direction = plan_direction(
            terrain,
            pathfinder,
            monster,
            goal,
            reuse_tolerance,
            reach_radius,
        );
        let level = monster.stuck.level;
        if level >= STUCK_PUSH_LEVEL {
            direction = Vec2::from_angle(monster.rng.range_f32(-PI, PI));
            step *= STUCK_PUSH_MULTIPLIER;
            monster.path = None;
        } else if level > 0 {
            let sign = if monster.rng.bool(0.5) { 1.0 } else { -1.0 };
            direction = direction.rotated(sign * FRAC_PI_4 * level as f32);
            monster.path = None;
        } else {
            step = step.min(remaining);
        }

        let displacement = resolve_step(terrain, monster, direction, step);
        monster.position += displacement;
        monster.velocity = displacement;
        if let Some(facing) = Facing::from_vector(displacement) {
            monster.facing = facing;
        }
        let previous = monster.stuck.level;
        monster
            .stuck
            .sample(now_ms, monster.position, sample_interval, sample_count, stuck_radius);
        if monster.stuck.level > previous {
            debug!(monster = %id, level = monster.stuck.level, "monster stuck; escalating");
        }
    }

    /// Moves a monster standing on unwalkable ground to the nearest walkable
    /// tile within the configured radius.
    pub(super) fn snap_to_walkable(&mut self, id: MonsterId) {
        let radius = self.config.desync_snap_radius;
        let Some(monster) = self.monsters.get_mut(id) else {
            return;
        };
        let at = monster.position;
        if self.terrain.is_walkable(at.x, at.y) {
            return;
        }
        let error = CombatError::TerrainDesync { monster: id, at };
        match self.terrain.find_nearest_walkable(at.x, at.y, radius) {
            Some(snapped) => {
                debug!(%error, x = snapped.x, y = snapped.y, "snapped to walkable ground");
                monster.position = snapped;
                monster.velocity = Vec2::ZERO;
                monster.path = None;
                self.reported_desync.remove(&id);
            }
            None => {
                if self.reported_desync.insert(id) {
                    warn!(%error, radius, "no walkable ground within snap radius");
                }
            }
        }
    }
}

/// Direction for this step: straight at the goal when the segment is clear,
/// otherwise along a cached or freshly searched path.
fn plan_direction(
    terrain: &dyn Terrain,
    pathfinder: &dyn Pathfinder,
    monster: &mut Monster,
    goal: Vec2,
    reuse_tolerance: f32,
    reach_radius: f32,
) -> Vec2 {
    let position = monster.position;
    let straight = (goal - position).normalized();
    if terrain.can_move(position, goal) {
        monster.path = None;
        return straight;
    }

    let reusable = monster
        .path
        .as_ref()
        .map(|p| !p.is_exhausted() && p.target_snapshot.distance(goal) <= reuse_tolerance)
        .unwrap_or(false);
    if !reusable {
        let result = pathfinder.find_path(terrain, position, goal);
        if !result.success || result.waypoints.is_empty() {
            debug!(
                error = %CombatError::PathNotFound { from: position, to: goal },
                "moving directly"
            );
            monster.path = None;
            return straight;
        }
        monster.path = Some(PathCache {
            waypoints: result.waypoints,
            cursor: 0,
            target_snapshot: goal,
        });
    }

    let Some(path) = monster.path.as_mut() else {
        return straight;
    };
    while let Some(waypoint) = path.current() {
        if waypoint.distance(position) > reach_radius {
            break;
        }
        path.cursor += 1;
    }
    match path.current() {
        Some(waypoint) => (waypoint - position).normalized(),
        None => {
            monster.path = None;
            straight
        }
    }
}

/// Largest legal displacement along `direction`: the full step, then each
/// axis alone, then a short random wander. Zero when everything is blocked.
fn resolve_step(terrain: &dyn Terrain, monster: &mut Monster, direction: Vec2, step: f32) -> Vec2 {
    let from = monster.position;
    let full = direction * step;
    if full.is_zero() {
        return Vec2::ZERO;
    }
    let candidates = [full, Vec2::new(full.x, 0.0), Vec2::new(0.0, full.y)];
    for candidate in candidates {
        if !candidate.is_zero() && terrain.can_move(from, from + candidate) {
            return candidate;
        }
    }
    let wander = Vec2::from_angle(monster.rng.range_f32(-PI, PI)) * (step * WANDER_STEP_MULTIPLIER);
    if terrain.can_move(from, from + wander) {
        return wander;
    }
    Vec2::ZERO
}
