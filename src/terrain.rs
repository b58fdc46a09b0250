//! Terrain and collision queries.
//!
//! The engine only talks to terrain through [`Terrain`]. [`GridTerrain`] is the
//! tile-grid implementation shipped with the crate: `#` is a wall, `.` is floor
//! at elevation 0, `1`-`9` are raised floor, and `^` is a stair tile that
//! bridges any two elevations.

use crate::error::CombatError;
use crate::types::Vec2;

pub trait Terrain {
    /// World extent as (width, height); valid positions lie in `[0, w) x [0, h)`.
    fn bounds(&self) -> Vec2;
    fn tile_size(&self) -> f32;
    fn is_walkable(&self, x: f32, y: f32) -> bool;
    fn elevation(&self, x: f32, y: f32) -> i32;
    fn is_stair(&self, x: f32, y: f32) -> bool;

    /// Whether a straight segment can be travelled: every sample walkable and
    /// elevation changes only onto or off a stair tile.
    fn can_move(&self, from: Vec2, to: Vec2) -> bool {
        if !self.is_walkable(to.x, to.y) {
            return false;
        }
        let dist = from.distance(to);
        let step = (self.tile_size() / 4.0).max(1.0);
        let samples = (dist / step).ceil().max(1.0) as usize;
        let mut prev = from;
        for i in 1..=samples {
            let t = i as f32 / samples as f32;
            let p = from + (to - from) * t;
            if !self.is_walkable(p.x, p.y) || !self.can_step(prev, p) {
                return false;
            }
            prev = p;
        }
        true
    }

    /// Elevation rule between two adjacent points.
    fn can_step(&self, from: Vec2, to: Vec2) -> bool {
        self.elevation(from.x, from.y) == self.elevation(to.x, to.y)
            || self.is_stair(from.x, from.y)
            || self.is_stair(to.x, to.y)
    }

    /// Nearest walkable tile centre within `radius`, searched in expanding rings.
    fn find_nearest_walkable(&self, x: f32, y: f32, radius: f32) -> Option<Vec2> {
        let tile = self.tile_size();
        if self.is_walkable(x, y) {
            return Some(Vec2::new(x, y));
        }
        let cx = (x / tile).floor() as i32;
        let cy = (y / tile).floor() as i32;
        let max_ring = (radius / tile).ceil() as i32;
        let origin = Vec2::new(x, y);
        for ring in 1..=max_ring {
            let mut best: Option<(f32, Vec2)> = None;
            for ty in (cy - ring)..=(cy + ring) {
                for tx in (cx - ring)..=(cx + ring) {
                    if (tx - cx).abs() != ring && (ty - cy).abs() != ring {
                        continue;
                    }
                    let center = Vec2::new((tx as f32 + 0.5) * tile, (ty as f32 + 0.5) * tile);
                    if !self.is_walkable(center.x, center.y) {
                        continue;
                    }
                    let d = origin.distance(center);
                    if d > radius + tile {
                        continue;
                    }
                    if best.map(|(bd, _)| d < bd).unwrap_or(true) {
                        best = Some((d, center));
                    }
                }
            }
            if let Some((_, center)) = best {
                return Some(center);
            }
        }
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tile {
    Wall,
    Floor(u8),
    Stair,
}

#[derive(Clone, Debug)]
pub struct GridTerrain {
    pub width: i32,
    pub height: i32,
    pub tile_size: f32,
    tiles: Vec<Tile>,
}

impl GridTerrain {
    /// All-floor terrain at elevation 0.
    pub fn open(width: i32, height: i32, tile_size: f32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            tile_size,
            tiles: vec![Tile::Floor(0); (width * height) as usize],
        }
    }

    /// Open floor enclosed by a one-tile wall border.
    pub fn arena(width: i32, height: i32, tile_size: f32) -> Self {
        let mut terrain = Self::open(width, height, tile_size);
        for x in 0..terrain.width {
            terrain.set_tile(x, 0, Tile::Wall);
            terrain.set_tile(x, terrain.height - 1, Tile::Wall);
        }
        for y in 0..terrain.height {
            terrain.set_tile(0, y, Tile::Wall);
            terrain.set_tile(terrain.width - 1, y, Tile::Wall);
        }
        terrain
    }

    pub fn from_rows<S: AsRef<str>>(rows: &[S], tile_size: f32) -> Result<Self, CombatError> {
        if rows.is_empty() {
            return Err(CombatError::InvalidTerrain("no rows".to_string()));
        }
        if tile_size <= 0.0 {
            return Err(CombatError::InvalidTerrain(format!(
                "tile size must be positive, got {tile_size}"
            )));
        }
        let width = rows[0].as_ref().chars().count();
        let mut tiles = Vec::with_capacity(width * rows.len());
        for (y, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.chars().count() != width {
                return Err(CombatError::InvalidTerrain(format!(
                    "row {y} has {} tiles, expected {width}",
                    row.chars().count()
                )));
            }
            for (x, c) in row.chars().enumerate() {
                let tile = match c {
                    '#' => Tile::Wall,
                    '.' => Tile::Floor(0),
                    '^' => Tile::Stair,
                    '1'..='9' => Tile::Floor(c as u8 - b'0'),
                    other => {
                        return Err(CombatError::InvalidTerrain(format!(
                            "unknown tile '{other}' at ({x}, {y})"
                        )))
                    }
                };
                tiles.push(tile);
            }
        }
        Ok(Self {
            width: width as i32,
            height: rows.len() as i32,
            tile_size,
            tiles,
        })
    }

    pub fn parse(layout: &str, tile_size: f32) -> Result<Self, CombatError> {
        let rows: Vec<&str> = layout
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .collect();
        Self::from_rows(&rows, tile_size)
    }

    pub fn tile(&self, tx: i32, ty: i32) -> Tile {
        if tx < 0 || ty < 0 || tx >= self.width || ty >= self.height {
            return Tile::Wall;
        }
        self.tiles[(ty * self.width + tx) as usize]
    }

    pub fn set_tile(&mut self, tx: i32, ty: i32, tile: Tile) {
        if tx < 0 || ty < 0 || tx >= self.width || ty >= self.height {
            return;
        }
        self.tiles[(ty * self.width + tx) as usize] = tile;
    }

    fn tile_at(&self, x: f32, y: f32) -> Tile {
        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
            return Tile::Wall;
        }
        self.tile(
            (x / self.tile_size).floor() as i32,
            (y / self.tile_size).floor() as i32,
        )
    }
}

impl Terrain for GridTerrain {
    fn bounds(&self) -> Vec2 {
        Vec2::new(
            self.width as f32 * self.tile_size,
            self.height as f32 * self.tile_size,
        )
    }

    fn tile_size(&self) -> f32 {
        self.tile_size
    }

    fn is_walkable(&self, x: f32, y: f32) -> bool {
        !matches!(self.tile_at(x, y), Tile::Wall)
    }

    fn elevation(&self, x: f32, y: f32) -> i32 {
        match self.tile_at(x, y) {
            Tile::Floor(level) => level as i32,
            Tile::Wall | Tile::Stair => 0,
        }
    }

    fn is_stair(&self, x: f32, y: f32) -> bool {
        matches!(self.tile_at(x, y), Tile::Stair)
    }
}
