//! Tile level geometry and the collision oracle the simulation consults.

use serde::{Deserialize, Serialize};
use std::ops::BitOr;

/// Collision properties of a single tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TileFlag(u8);

impl TileFlag {
    pub const EMPTY: TileFlag = TileFlag(0);
    /// Blocks movement from every direction.
    pub const SOLID: TileFlag = TileFlag(1 << 1);
    /// One-way: entities land on it from above and pass through it
    /// from below or the sides.
    pub const PLATFORM: TileFlag = TileFlag(1 << 2);
    pub const HAZARD: TileFlag = TileFlag(1 << 3);
    pub const LADDER: TileFlag = TileFlag(1 << 4);
    pub const WATER: TileFlag = TileFlag(1 << 5);

    pub fn contains(self, other: TileFlag) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for TileFlag {
    type Output = TileFlag;

    fn bitor(self, rhs: TileFlag) -> TileFlag {
        TileFlag(self.0 | rhs.0)
    }
}

/// Read-only view of level geometry used by the collision system.
///
/// Lookups outside the level must report solid so entities are blocked
/// rather than falling out of the world.
pub trait TileOracle: Send + Sync {
    fn is_solid(&self, x: i32, y: i32) -> bool;

    /// One-way tiles that only stop a falling entity.
    fn is_platform(&self, _x: i32, _y: i32) -> bool {
        false
    }

    /// Level size in tiles as `(width, height)`.
    fn bounds(&self) -> (i32, i32);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileMap {
    width: i32,
    height: i32,
    tiles: Vec<TileFlag>,
}

impl TileMap {
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(0);
        let height = height.max(0);
        Self {
            width,
            height,
            tiles: vec![TileFlag::EMPTY; (width * height) as usize],
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || x >= self.width || y < 0 || y >= self.height {
            None
        } else {
            Some((y * self.width + x) as usize)
        }
    }

    /// Flag at `(x, y)`; anything outside the map is solid.
    pub fn get(&self, x: i32, y: i32) -> TileFlag {
        self.index(x, y)
            .map(|i| self.tiles[i])
            .unwrap_or(TileFlag::SOLID)
    }

    /// Writes outside the map are ignored.
    pub fn set(&mut self, x: i32, y: i32, flag: TileFlag) {
        if let Some(i) = self.index(x, y) {
            self.tiles[i] = flag;
        }
    }

    fn fill_row(&mut self, y: i32, xs: std::ops::Range<i32>, flag: TileFlag) {
        for x in xs {
            self.set(x, y, flag);
        }
    }
}

impl TileOracle for TileMap {
    fn is_solid(&self, x: i32, y: i32) -> bool {
        self.get(x, y).contains(TileFlag::SOLID)
    }

    fn is_platform(&self, x: i32, y: i32) -> bool {
        self.get(x, y).contains(TileFlag::PLATFORM)
    }

    fn bounds(&self) -> (i32, i32) {
        (self.width, self.height)
    }
}

pub const MIN_LEVEL_WIDTH: i32 = 40;
pub const MIN_LEVEL_HEIGHT: i32 = 20;

/// The demo level at its minimum playable size.
pub fn demo_level() -> TileMap {
    demo_level_for_viewport(MIN_LEVEL_WIDTH, MIN_LEVEL_HEIGHT)
}

/// Demo level stretched to fill a viewport, never smaller than 40x20.
///
/// Floor along the bottom row, walls on both edges, three platforms, a two
/// tile obstacle near the left and a floating platform up high.
pub fn demo_level_for_viewport(width: i32, height: i32) -> TileMap {
    let width = width.max(MIN_LEVEL_WIDTH);
    let height = height.max(MIN_LEVEL_HEIGHT);
    let mut map = TileMap::new(width, height);

    map.fill_row(height - 1, 0..width, TileFlag::SOLID);
    for y in 0..height {
        map.set(0, y, TileFlag::SOLID);
        map.set(width - 1, y, TileFlag::SOLID);
    }

    map.fill_row(height - 5, 5..12, TileFlag::SOLID);
    map.fill_row(height - 8, 15..22, TileFlag::SOLID);
    map.fill_row(height - 5, 25..32, TileFlag::SOLID);

    map.set(10, height - 2, TileFlag::SOLID);
    map.set(10, height - 3, TileFlag::SOLID);

    map.fill_row(height - 12, 18..23, TileFlag::SOLID);

    map
}

/// ASCII picture of the map, one string per row.
pub fn render_tile_map(map: &TileMap) -> Vec<String> {
    (0..map.height())
        .map(|y| {
            (0..map.width())
                .map(|x| {
                    let tile = map.get(x, y);
                    if tile.contains(TileFlag::SOLID) {
                        '#'
                    } else if tile.contains(TileFlag::PLATFORM) {
                        '='
                    } else if tile.contains(TileFlag::HAZARD) {
                        '^'
                    } else if tile.contains(TileFlag::LADDER) {
                        'H'
                    } else if tile.contains(TileFlag::WATER) {
                        '~'
                    } else {
                        ' '
                    }
                })
                .collect()
        })
        .collect()
}
