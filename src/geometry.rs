//! Hit geometry for attacks. Targets are treated as a point plus radius.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::types::Vec2;

const BOUNDARY_EPS: f32 = 1e-4;

/// Wraps an angle into [-π, π].
pub fn normalize_angle(angle: f32) -> f32 {
    let mut a = angle.rem_euclid(2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    }
    a
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Hitbox {
    /// Box extending `length` forward from the origin, `width` wide.
    Rect { length: f32, width: f32 },
    Circle { radius: f32 },
    /// `angle` is the full opening angle in radians.
    Cone { range: f32, angle: f32 },
}

impl Hitbox {
    pub fn contains(&self, origin: Vec2, facing: f32, target: Vec2, target_radius: f32) -> bool {
        match *self {
            Hitbox::Rect { length, width } => {
                rect_hit(origin, facing, length, width, target, target_radius)
            }
            Hitbox::Circle { radius } => circle_hit(origin, radius, target, target_radius),
            Hitbox::Cone { range, angle } => {
                cone_hit(origin, facing, range, angle, target, target_radius)
            }
        }
    }
}

pub fn rect_hit(
    origin: Vec2,
    facing: f32,
    length: f32,
    width: f32,
    target: Vec2,
    target_radius: f32,
) -> bool {
    let rel = target - origin;
    let forward = Vec2::from_angle(facing);
    let along = rel.x * forward.x + rel.y * forward.y;
    let lateral = rel.x * -forward.y + rel.y * forward.x;
    along >= -target_radius - BOUNDARY_EPS
        && along <= length + target_radius + BOUNDARY_EPS
        && lateral.abs() <= width / 2.0 + target_radius + BOUNDARY_EPS
}

pub fn circle_hit(center: Vec2, radius: f32, target: Vec2, target_radius: f32) -> bool {
    center.distance(target) <= radius + target_radius + BOUNDARY_EPS
}

pub fn cone_hit(
    origin: Vec2,
    facing: f32,
    range: f32,
    cone_angle: f32,
    target: Vec2,
    target_radius: f32,
) -> bool {
    let dist = origin.distance(target);
    if dist > range + target_radius + BOUNDARY_EPS {
        return false;
    }
    if dist <= BOUNDARY_EPS {
        return true;
    }
    let delta = normalize_angle(origin.angle_to(target) - facing);
    delta.abs() <= cone_angle / 2.0 + BOUNDARY_EPS
}

/// Evenly spreads `count` angles across `arc` centred on `center`.
pub fn spread_angles(center: f32, arc: f32, count: usize) -> Vec<f32> {
    match count {
        0 => Vec::new(),
        1 => vec![normalize_angle(center)],
        _ => {
            let step = arc / (count - 1) as f32;
            let start = center - arc / 2.0;
            (0..count)
                .map(|i| normalize_angle(start + step * i as f32))
                .collect()
        }
    }
}
