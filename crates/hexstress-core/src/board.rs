//! Hex board construction, tile state, and the per-tick stress diffusion rule.

use crate::entity::{FactorId, SwormId};
use crate::{Position, WorldError};
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap, new_key_type};
use smallvec::SmallVec;

new_key_type! {
    /// Stable handle for tiles backed by a generational slot map.
    pub struct TileId;
}

/// Width of one tile in world units.
pub const TILE_WIDTH: f32 = 1.0;
/// Horizontal center-to-center spacing between adjacent columns.
pub const HORIZONTAL_SPACING: f32 = 0.75 * TILE_WIDTH;
/// Vertical center-to-center spacing within a column; sqrt(3)/2.
pub const VERTICAL_SPACING: f32 = 0.866_025_4 * TILE_WIDTH;
/// Two tiles are neighbors when their centers sit closer than this.
/// All six hex neighbors are at ~0.866, the next-nearest pair at 1.5.
pub const ADJACENCY_RADIUS: f32 = 1.1 * VERTICAL_SPACING;

/// Share of the strongest neighbor's raw stress that diffuses into a tile.
const NEIGHBOR_PUSH_SHARE: f32 = 0.8;
/// Damping applied to accumulated stress when blending on the home tile.
const HOME_DAMPING: f32 = 0.5;

/// Linear interpolation between `a` and `b`.
#[inline]
pub(crate) fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Effective stress as a pure function of its inputs.
///
/// Blends the distance-based baseline with locally accumulated stress;
/// the home tile only feels half of its accumulated component.
#[must_use]
pub fn effective_stress(base: f32, level: f32, is_home: bool) -> f32 {
    let damping = if is_home { HOME_DAMPING } else { 1.0 };
    (base + (1.0 - base) * level * damping).clamp(-1.0, 1.0)
}

/// Linear map from stress in [-1, 1] to a hue in [2/3, 0] for the
/// external color-mapping layer.
#[must_use]
pub fn stress_to_hue(stress: f32) -> f32 {
    (1.0 - stress.clamp(-1.0, 1.0)) / 3.0
}

/// Grid coordinate of a tile: column offset from center, row index within the column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub col: i32,
    pub row: i32,
}

/// Entity currently claiming a tile, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Occupant {
    #[default]
    None,
    StressFactor(FactorId),
    SwormSegment(SwormId),
}

/// A single board tile with its raw and derived stress state.
#[derive(Debug, Clone)]
pub struct Tile {
    pub coord: TileCoord,
    pub position: Position,
    /// Raw accumulated stress in [0, 1], written by diffusion and occupants.
    pub stress_level: f32,
    /// Distance-derived baseline in [-1, 1].
    pub base_stress: f32,
    /// Blended value in [-1, 1] read by the agent and the presentation layer.
    pub effective_stress: f32,
    pub is_home: bool,
    /// Fewer than six neighbors.
    pub is_edge: bool,
    pub occupant: Occupant,
    pub neighbors: SmallVec<[TileId; 6]>,
}

impl Tile {
    /// Whether no entity currently claims this tile.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.occupant == Occupant::None
    }
}

/// Owns every tile of the hexagonal diamond plus the home reference and
/// the distance-stress calibration.
#[derive(Debug)]
pub struct HexBoard {
    tiles: SlotMap<TileId, Tile>,
    /// Construction order, used for stable iteration and diffusion passes.
    order: Vec<TileId>,
    home: TileId,
    diameter: u32,
    /// `k` in `base = 1 - 2 / (1 + k * d^2)`; owned here, scaled down on
    /// each stress-factor elimination.
    distance_stress_factor: f32,
    level_scratch: SecondaryMap<TileId, f32>,
}

impl HexBoard {
    /// Build the board for an odd `diameter`, link neighbors geometrically,
    /// and compute the initial derived stress values.
    pub fn new(diameter: u32) -> Result<Self, WorldError> {
        if diameter == 0 || diameter % 2 == 0 {
            return Err(WorldError::InvalidConfig(
                "board diameter must be an odd positive integer",
            ));
        }
        let half = (diameter / 2) as i32;
        let mut tiles = SlotMap::with_key();
        let mut order = Vec::new();
        let mut home = None;
        for col in -half..=half {
            let count = diameter as i32 - col.abs();
            let vert_offset = -0.5 * VERTICAL_SPACING * (count - 1) as f32;
            for row in 0..count {
                let is_home = col == 0 && row == half;
                let position = Position::new(
                    HORIZONTAL_SPACING * col as f32,
                    vert_offset + VERTICAL_SPACING * row as f32,
                );
                let id = tiles.insert(Tile {
                    coord: TileCoord { col, row },
                    position,
                    stress_level: 0.0,
                    base_stress: 0.0,
                    effective_stress: 0.0,
                    is_home,
                    is_edge: false,
                    occupant: Occupant::None,
                    neighbors: SmallVec::new(),
                });
                if is_home {
                    home = Some(id);
                }
                order.push(id);
            }
        }
        let home = home.ok_or(WorldError::InvalidConfig("board has no home tile"))?;
        let scale = VERTICAL_SPACING * (0.5 + diameter as f32);
        let mut board = Self {
            tiles,
            order,
            home,
            diameter,
            distance_stress_factor: 30.0 / (scale * scale),
            level_scratch: SecondaryMap::new(),
        };
        board.link_neighbors();
        board.refresh_derived();
        Ok(board)
    }

    /// Geometric adjacency scan over all tile pairs; runs once after placement.
    fn link_neighbors(&mut self) {
        let radius_sq = ADJACENCY_RADIUS * ADJACENCY_RADIUS;
        let ids = self.order.clone();
        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                let dist_sq = self.tiles[a].position.distance_squared(self.tiles[b].position);
                if dist_sq < radius_sq {
                    self.tiles[a].neighbors.push(b);
                    self.tiles[b].neighbors.push(a);
                }
            }
        }
        for &id in &ids {
            let tile = &mut self.tiles[id];
            tile.is_edge = tile.neighbors.len() < 6;
        }
    }

    /// One diffusion pass: every tile reads the previous tick's levels,
    /// unoccupied tiles lerp toward the strongest neighbor's push, then all
    /// derived values are refreshed.
    pub(crate) fn diffuse(&mut self, rate: f32) {
        self.level_scratch.clear();
        for &id in &self.order {
            self.level_scratch.insert(id, self.tiles[id].stress_level);
        }
        for &id in &self.order {
            let push = {
                let tile = &self.tiles[id];
                tile.neighbors
                    .iter()
                    .filter_map(|n| self.level_scratch.get(*n).copied())
                    .fold(0.0_f32, f32::max)
                    * NEIGHBOR_PUSH_SHARE
            };
            let tile = &mut self.tiles[id];
            if tile.occupant == Occupant::None {
                tile.stress_level = lerp(tile.stress_level, push, rate).clamp(0.0, 1.0);
            }
        }
        self.refresh_derived();
    }

    /// Recompute `base_stress` and `effective_stress` for every tile from
    /// the current calibration and raw levels.
    pub(crate) fn refresh_derived(&mut self) {
        let home_pos = self.tiles[self.home].position;
        let k = self.distance_stress_factor;
        for &id in &self.order {
            let tile = &mut self.tiles[id];
            let dist_sq = tile.position.distance_squared(home_pos);
            tile.base_stress = 1.0 - 2.0 / (1.0 + k * dist_sq);
            tile.effective_stress =
                effective_stress(tile.base_stress, tile.stress_level, tile.is_home);
        }
    }

    /// Scale the distance-stress factor down after an elimination.
    pub(crate) fn relieve(&mut self, factor: f32) {
        self.distance_stress_factor *= factor;
    }

    #[must_use]
    pub fn contains(&self, id: TileId) -> bool {
        self.tiles.contains_key(id)
    }

    #[must_use]
    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.tiles.get(id)
    }

    pub(crate) fn tile_mut(&mut self, id: TileId) -> Option<&mut Tile> {
        self.tiles.get_mut(id)
    }

    /// Neighbor handles of `id`; empty when the tile does not exist.
    #[must_use]
    pub fn neighbors(&self, id: TileId) -> &[TileId] {
        self.tiles.get(id).map_or(&[], |tile| &tile.neighbors)
    }

    /// The single home tile.
    #[must_use]
    pub const fn home(&self) -> TileId {
        self.home
    }

    #[must_use]
    pub const fn diameter(&self) -> u32 {
        self.diameter
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Tile handles in construction order.
    pub fn ids(&self) -> impl Iterator<Item = TileId> + '_ {
        self.order.iter().copied()
    }

    /// Tiles in construction order.
    pub fn tiles(&self) -> impl Iterator<Item = (TileId, &Tile)> + '_ {
        self.order.iter().map(move |&id| (id, &self.tiles[id]))
    }

    #[must_use]
    pub const fn distance_stress_factor(&self) -> f32 {
        self.distance_stress_factor
    }

    /// Largest raw stress level anywhere on the board.
    #[must_use]
    pub fn max_stress_level(&self) -> f32 {
        self.order
            .iter()
            .map(|&id| self.tiles[id].stress_level)
            .fold(0.0_f32, f32::max)
    }

    /// Claim a tile for an entity. The tile must exist.
    pub(crate) fn set_occupant(&mut self, id: TileId, occupant: Occupant) -> Result<(), WorldError> {
        let tile = self.tiles.get_mut(id).ok_or(WorldError::UnknownTile)?;
        tile.occupant = occupant;
        Ok(())
    }

    pub(crate) fn clear_occupant(&mut self, id: TileId) {
        if let Some(tile) = self.tiles.get_mut(id) {
            tile.occupant = Occupant::None;
        }
    }
}
