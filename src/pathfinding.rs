//! Elevation-aware 8-way grid search.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use serde::Serialize;

use crate::constants::PATH_MAX_EXPANSIONS;
use crate::terrain::Terrain;
use crate::types::Vec2;

const STRAIGHT_COST: i32 = 10;
const DIAGONAL_COST: i32 = 14;

const NEIGHBORS: [(i32, i32, i32); 8] = [
    (1, 0, STRAIGHT_COST),
    (-1, 0, STRAIGHT_COST),
    (0, 1, STRAIGHT_COST),
    (0, -1, STRAIGHT_COST),
    (1, 1, DIAGONAL_COST),
    (1, -1, DIAGONAL_COST),
    (-1, 1, DIAGONAL_COST),
    (-1, -1, DIAGONAL_COST),
];

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PathResult {
    pub success: bool,
    pub waypoints: Vec<Vec2>,
}

impl PathResult {
    pub fn failed() -> Self {
        Self::default()
    }
}

pub trait Pathfinder {
    fn find_path(&self, terrain: &dyn Terrain, start: Vec2, end: Vec2) -> PathResult;
}

type Cell = (i32, i32);

#[derive(Clone, Copy, Debug)]
pub struct GridPathfinder {
    pub max_expansions: usize,
}

impl Default for GridPathfinder {
    fn default() -> Self {
        Self {
            max_expansions: PATH_MAX_EXPANSIONS,
        }
    }
}

impl GridPathfinder {
    fn cell_of(terrain: &dyn Terrain, p: Vec2) -> Cell {
        let tile = terrain.tile_size();
        ((p.x / tile).floor() as i32, (p.y / tile).floor() as i32)
    }

    fn center_of(terrain: &dyn Terrain, cell: Cell) -> Vec2 {
        let tile = terrain.tile_size();
        Vec2::new((cell.0 as f32 + 0.5) * tile, (cell.1 as f32 + 0.5) * tile)
    }

    fn walkable(terrain: &dyn Terrain, cell: Cell) -> bool {
        let c = Self::center_of(terrain, cell);
        terrain.is_walkable(c.x, c.y)
    }

    fn can_enter(terrain: &dyn Terrain, from: Cell, to: Cell) -> bool {
        if !Self::walkable(terrain, to) {
            return false;
        }
        let a = Self::center_of(terrain, from);
        let b = Self::center_of(terrain, to);
        if !terrain.can_step(a, b) {
            return false;
        }
        let dx = to.0 - from.0;
        let dy = to.1 - from.1;
        if dx != 0 && dy != 0 {
            // no corner cutting
            let side_a = (from.0 + dx, from.1);
            let side_b = (from.0, from.1 + dy);
            if !Self::walkable(terrain, side_a) || !Self::walkable(terrain, side_b) {
                return false;
            }
            let pa = Self::center_of(terrain, side_a);
            let pb = Self::center_of(terrain, side_b);
            if !terrain.can_step(a, pa) || !terrain.can_step(a, pb) {
                return false;
            }
        }
        true
    }

    fn heuristic(a: Cell, b: Cell) -> i32 {
        let dx = (a.0 - b.0).abs();
        let dy = (a.1 - b.1).abs();
        STRAIGHT_COST * (dx + dy) + (DIAGONAL_COST - 2 * STRAIGHT_COST) * dx.min(dy)
    }

    fn reconstruct(came_from: &HashMap<Cell, Cell>, start: Cell, goal: Cell) -> Option<Vec<Cell>> {
        let mut reverse = vec![goal];
        let mut cursor = goal;
        while cursor != start {
            cursor = *came_from.get(&cursor)?;
            if cursor != start {
                reverse.push(cursor);
            }
        }
        reverse.reverse();
        Some(reverse)
    }
}

impl Pathfinder for GridPathfinder {
    fn find_path(&self, terrain: &dyn Terrain, start: Vec2, end: Vec2) -> PathResult {
        let start_cell = Self::cell_of(terrain, start);
        let goal_cell = Self::cell_of(terrain, end);
        if !Self::walkable(terrain, goal_cell) {
            return PathResult::failed();
        }
        if start_cell == goal_cell {
            return PathResult {
                success: true,
                waypoints: vec![end],
            };
        }

        let mut open = BinaryHeap::<(Reverse<i32>, Reverse<i32>, Cell)>::new();
        let mut g_scores = HashMap::<Cell, i32>::new();
        let mut came_from = HashMap::<Cell, Cell>::new();
        g_scores.insert(start_cell, 0);
        open.push((
            Reverse(Self::heuristic(start_cell, goal_cell)),
            Reverse(0),
            start_cell,
        ));

        let mut expansions = 0usize;
        while let Some((_f, Reverse(g_cost), cell)) = open.pop() {
            if g_cost > g_scores.get(&cell).copied().unwrap_or(i32::MAX) {
                continue;
            }
            if cell == goal_cell {
                let Some(cells) = Self::reconstruct(&came_from, start_cell, goal_cell) else {
                    return PathResult::failed();
                };
                let mut waypoints: Vec<Vec2> = cells
                    .iter()
                    .map(|c| Self::center_of(terrain, *c))
                    .collect();
                if let Some(last) = waypoints.last_mut() {
                    *last = end;
                }
                return PathResult {
                    success: true,
                    waypoints,
                };
            }
            expansions += 1;
            if expansions > self.max_expansions {
                break;
            }
            for (dx, dy, cost) in NEIGHBORS {
                let next = (cell.0 + dx, cell.1 + dy);
                let tentative = g_cost + cost;
                if tentative >= g_scores.get(&next).copied().unwrap_or(i32::MAX) {
                    continue;
                }
                if !Self::can_enter(terrain, cell, next) {
                    continue;
                }
                came_from.insert(next, cell);
                g_scores.insert(next, tentative);
                open.push((
                    Reverse(tentative + Self::heuristic(next, goal_cell)),
                    Reverse(tentative),
                    next,
                ));
            }
        }
        PathResult::failed()
    }
}
