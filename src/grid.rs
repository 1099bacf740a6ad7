// src/grid.rs
//! Адресация тайлов и сэмплов
//!
//! Мир представляет собой квадратную решётку тайлов вокруг начала координат.
//! Кольцо `r` состоит из тайлов с чебышёвским расстоянием `r` от тайла `(0, 0)`; в нём ровно `8r` тайлов.
//! Сэмплы соседних тайлов образуют единую глобальную решётку без дублирования краёв:
//! глобальный сэмпл = `tile * tile_size + local`.
//!
//! Ось `x` направлена на восток, ось `y` на север.
//! Соседи не хранятся в тайлах, а вычисляются здесь.

use crate::error::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Идентификатор тайла в осевых координатах решётки
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(into = "String", try_from = "String")]
pub struct TileId {
    pub x: i32,
    pub y: i32,
}

impl TileId {
    pub const ORIGIN: TileId = TileId { x: 0, y: 0 };

    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Номер кольца: чебышёвское расстояние до начала координат
    #[must_use]
    pub fn ring(self) -> u32 {
        self.x.unsigned_abs().max(self.y.unsigned_abs())
    }

    /// Позиция внутри канонического обхода своего кольца
    #[must_use]
    pub fn position_in_ring(self) -> usize {
        let r = self.ring() as i32;
        if r == 0 {
            return 0;
        }
        let side = 2 * r;
        if self.y == r && self.x < r {
            (self.x + r) as usize
        } else if self.x == r && self.y > -r {
            (side + (r - self.y)) as usize
        } else if self.y == -r && self.x > -r {
            (2 * side + (r - self.x)) as usize
        } else {
            (3 * side + (self.y + r)) as usize
        }
    }

    #[must_use]
    pub fn offset(self, dir: Dir8) -> Self {
        let (dx, dy) = dir.offset();
        Self::new(self.x + dx, self.y + dy)
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.x, self.y)
    }
}

impl FromStr for TileId {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self> {
        let (x, y) = s
            .split_once(':')
            .ok_or_else(|| MapError::Validation(format!("tile id {s:?} is not of the form x:y")))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<i32>()
                .map_err(|_| MapError::Validation(format!("tile id {s:?} has a non-integer part")))
        };
        Ok(Self::new(parse(x)?, parse(y)?))
    }
}

impl From<TileId> for String {
    fn from(value: TileId) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for TileId {
    type Error = MapError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Сторона света для расширения кольца
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Direction {
    N,
    S,
    #[default]
    E,
    W,
}

/// Одно из 8 направлений на решётке.
///
/// Порядок вариантов задаёт фиксированный приоритет при равенстве высот: N, NE, E, SE, S, SW, W, NW.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dir8 {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl Dir8 {
    pub const ALL: [Dir8; 8] = [
        Dir8::N,
        Dir8::NE,
        Dir8::E,
        Dir8::SE,
        Dir8::S,
        Dir8::SW,
        Dir8::W,
        Dir8::NW,
    ];

    #[must_use]
    pub fn offset(self) -> (i32, i32) {
        match self {
            Dir8::N => (0, 1),
            Dir8::NE => (1, 1),
            Dir8::E => (1, 0),
            Dir8::SE => (1, -1),
            Dir8::S => (0, -1),
            Dir8::SW => (-1, -1),
            Dir8::W => (-1, 0),
            Dir8::NW => (-1, 1),
        }
    }

    #[must_use]
    pub fn is_diagonal(self) -> bool {
        matches!(self, Dir8::NE | Dir8::SE | Dir8::SW | Dir8::NW)
    }

    #[must_use]
    pub fn opposite(self) -> Dir8 {
        Dir8::ALL[(self as usize + 4) % 8]
    }

    /// Длина шага в единицах сэмплов
    #[must_use]
    pub fn length(self) -> f32 {
        if self.is_diagonal() {
            std::f32::consts::SQRT_2
        } else {
            1.0
        }
    }

    /// Число поворотов на 45° между двумя направлениями (0..=4)
    #[must_use]
    pub fn turn_steps(self, other: Dir8) -> u32 {
        let d = (self as i32 - other as i32).rem_euclid(8) as u32;
        d.min(8 - d)
    }
}

/// Глобальная координата сэмпла
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SampleCoord {
    pub x: i32,
    pub y: i32,
}

impl SampleCoord {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn step(self, dir: Dir8) -> Self {
        let (dx, dy) = dir.offset();
        Self::new(self.x + dx, self.y + dy)
    }

    /// Евклидово расстояние в единицах сэмплов
    #[must_use]
    pub fn distance(self, other: SampleCoord) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }

    #[must_use]
    pub fn chebyshev(self, other: SampleCoord) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }
}

impl fmt::Display for SampleCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Локальная координата сэмпла внутри тайла
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalCoord {
    pub x: usize,
    pub y: usize,
}

impl LocalCoord {
    #[must_use]
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// Индекс решётки: знает размер тайла и границу сгенерированных колец
#[derive(Debug, Clone)]
pub struct GridIndex {
    tile_size: u32,
    max_ring: u32,
}

impl GridIndex {
    #[must_use]
    pub fn new(tile_size: u32) -> Self {
        Self {
            tile_size,
            max_ring: 0,
        }
    }

    #[must_use]
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    #[must_use]
    pub fn max_ring(&self) -> u32 {
        self.max_ring
    }

    pub(crate) fn set_max_ring(&mut self, ring: u32) {
        debug_assert!(ring >= self.max_ring, "rings are never retracted");
        self.max_ring = ring;
    }

    #[must_use]
    pub fn contains(&self, tile: TileId) -> bool {
        tile.ring() <= self.max_ring
    }

    #[must_use]
    pub fn contains_sample(&self, sample: SampleCoord) -> bool {
        self.contains(self.split(sample).0)
    }

    /// До 8 соседних сгенерированных тайлов в порядке N, NE, E, SE, S, SW, W, NW
    #[must_use]
    pub fn neighbors(&self, tile: TileId) -> Vec<TileId> {
        Dir8::ALL
            .iter()
            .map(|&d| tile.offset(d))
            .filter(|&t| self.contains(t))
            .collect()
    }

    /// Канонический обход кольца: от северо-западного угла по часовой стрелке
    #[must_use]
    pub fn tiles_in_ring(ring: u32) -> Vec<TileId> {
        if ring == 0 {
            return vec![TileId::ORIGIN];
        }
        let r = ring as i32;
        let mut tiles = Vec::with_capacity(8 * ring as usize);
        // север: запад → восток
        tiles.extend((-r..r).map(|x| TileId::new(x, r)));
        // восток: север → юг
        tiles.extend((-r + 1..=r).rev().map(|y| TileId::new(r, y)));
        // юг: восток → запад
        tiles.extend((-r + 1..=r).rev().map(|x| TileId::new(x, -r)));
        // запад: юг → север
        tiles.extend((-r..r).map(|y| TileId::new(-r, y)));
        tiles
    }

    /// Тот же обход, но начиная со стороны, обращённой в `direction`
    #[must_use]
    pub fn tiles_in_ring_from(ring: u32, direction: Direction) -> Vec<TileId> {
        let mut tiles = Self::tiles_in_ring(ring);
        let side = 2 * ring as usize;
        let start = match direction {
            Direction::N => 0,
            Direction::E => side,
            Direction::S => 2 * side,
            Direction::W => 3 * side,
        };
        let len = tiles.len();
        if len > 0 {
            tiles.rotate_left(start % len);
        }
        tiles
    }

    /// Разбивает глобальный сэмпл на тайл и локальную координату (без проверки границ мира)
    #[must_use]
    pub fn split(&self, sample: SampleCoord) -> (TileId, LocalCoord) {
        let n = self.tile_size as i32;
        let tile = TileId::new(sample.x.div_euclid(n), sample.y.div_euclid(n));
        let local = LocalCoord::new(
            sample.x.rem_euclid(n) as usize,
            sample.y.rem_euclid(n) as usize,
        );
        (tile, local)
    }

    #[must_use]
    pub fn join(&self, tile: TileId, local: LocalCoord) -> SampleCoord {
        let origin = self.tile_origin(tile);
        SampleCoord::new(origin.x + local.x as i32, origin.y + local.y as i32)
    }

    #[must_use]
    pub fn tile_origin(&self, tile: TileId) -> SampleCoord {
        let n = self.tile_size as i32;
        SampleCoord::new(tile.x * n, tile.y * n)
    }

    #[must_use]
    pub fn tile_center(&self, tile: TileId) -> SampleCoord {
        let half = (self.tile_size / 2) as i32;
        let origin = self.tile_origin(tile);
        SampleCoord::new(origin.x + half, origin.y + half)
    }

    pub fn tile_containing(&self, sample: SampleCoord) -> Result<TileId> {
        let (tile, _) = self.split(sample);
        if self.contains(tile) {
            Ok(tile)
        } else {
            Err(MapError::OutOfBounds(sample))
        }
    }

    /// Сгенерированные тайлы, пересекающие прямоугольник сэмплов `[min, max]`
    pub fn tiles_in_box(
        &self,
        min: SampleCoord,
        max: SampleCoord,
    ) -> impl Iterator<Item = TileId> + '_ {
        let (lo, _) = self.split(min);
        let (hi, _) = self.split(max);
        (lo.y..=hi.y)
            .flat_map(move |y| (lo.x..=hi.x).map(move |x| TileId::new(x, y)))
            .filter(|&t| self.contains(t))
    }

    /// Границы сгенерированного мира в сэмплах (включительно)
    #[must_use]
    pub fn sample_bounds(&self) -> (SampleCoord, SampleCoord) {
        let r = self.max_ring as i32;
        let n = self.tile_size as i32;
        (
            SampleCoord::new(-r * n, -r * n),
            SampleCoord::new((r + 1) * n - 1, (r + 1) * n - 1),
        )
    }

    /// Лежит ли локальная координата на краю тайла
    #[must_use]
    pub fn is_edge(&self, local: LocalCoord) -> bool {
        let last = self.tile_size as usize - 1;
        local.x == 0 || local.y == 0 || local.x == last || local.y == last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ring_has_eight_r_distinct_tiles() {
        for ring in 1..5 {
            let tiles = GridIndex::tiles_in_ring(ring);
            assert_eq!(tiles.len(), 8 * ring as usize);
            let unique: HashSet<_> = tiles.iter().copied().collect();
            assert_eq!(unique.len(), tiles.len());
            assert!(tiles.iter().all(|t| t.ring() == ring));
        }
    }

    #[test]
    fn ring_order_matches_position_in_ring() {
        for ring in 0..4 {
            for (i, tile) in GridIndex::tiles_in_ring(ring).into_iter().enumerate() {
                assert_eq!(tile.position_in_ring(), i, "tile {tile}");
            }
        }
    }

    #[test]
    fn direction_rotates_ring_start() {
        let east = GridIndex::tiles_in_ring_from(1, Direction::E);
        assert_eq!(east[0], TileId::new(1, 1));
        let south = GridIndex::tiles_in_ring_from(1, Direction::S);
        assert_eq!(south[0], TileId::new(1, -1));
        let mut a = east.clone();
        let mut b = GridIndex::tiles_in_ring_from(1, Direction::W);
        a.sort();
        b.sort();
        assert_eq!(a, b);
        assert_eq!(
            GridIndex::tiles_in_ring_from(0, Direction::W),
            vec![TileId::ORIGIN]
        );
        assert_eq!(GridIndex::tiles_in_ring_from(2, Direction::S).len(), 16);
    }

    #[test]
    fn split_handles_negative_samples() {
        let grid = GridIndex::new(16);
        let (tile, local) = grid.split(SampleCoord::new(-1, 17));
        assert_eq!(tile, TileId::new(-1, 1));
        assert_eq!(local, LocalCoord::new(15, 1));
        assert_eq!(grid.join(tile, local), SampleCoord::new(-1, 17));
    }

    #[test]
    fn tile_containing_respects_generated_range() {
        let mut grid = GridIndex::new(16);
        assert!(grid.tile_containing(SampleCoord::new(20, 0)).is_err());
        grid.set_max_ring(1);
        assert_eq!(
            grid.tile_containing(SampleCoord::new(20, 0)).unwrap(),
            TileId::new(1, 0)
        );
        assert_eq!(grid.neighbors(TileId::ORIGIN).len(), 8);
        assert_eq!(grid.neighbors(TileId::new(1, 1)).len(), 3);
    }

    #[test]
    fn tiles_in_box_clips_to_world() {
        let mut grid = GridIndex::new(8);
        grid.set_max_ring(1);
        let tiles: Vec<_> = grid
            .tiles_in_box(SampleCoord::new(-100, 0), SampleCoord::new(3, 3))
            .collect();
        assert_eq!(tiles, vec![TileId::new(-1, 0), TileId::new(0, 0)]);
    }

    #[test]
    fn tile_id_parses_and_formats() {
        let id: TileId = "-2:5".parse().unwrap();
        assert_eq!(id, TileId::new(-2, 5));
        assert_eq!(id.to_string(), "-2:5");
        assert!("2;5".parse::<TileId>().is_err());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"-2:5\"");
    }

    #[test]
    fn turn_steps_are_symmetric() {
        assert_eq!(Dir8::N.turn_steps(Dir8::N), 0);
        assert_eq!(Dir8::N.turn_steps(Dir8::NW), 1);
        assert_eq!(Dir8::E.turn_steps(Dir8::W), 4);
        assert_eq!(Dir8::SW.turn_steps(Dir8::NE), 4);
        assert_eq!(Dir8::N.opposite(), Dir8::S);
    }
}
