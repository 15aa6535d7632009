//! Pooled board entities: stress factors, sworms, and the spawn tasks that
//! place them.

use crate::HexStressConfig;
use crate::board::{HexBoard, Occupant, TileId, lerp};
use rand::Rng;
use rand::rngs::SmallRng;
use slotmap::{Key, SlotMap, new_key_type};
use smallvec::SmallVec;
use tracing::debug;

new_key_type! {
    /// Handle for pooled stress-factor entities.
    pub struct FactorId;
}
new_key_type! {
    /// Handle for pooled sworm entities.
    pub struct SwormId;
}

/// Reuse pool: a slot-map arena plus a parked free list. Absence of a
/// reusable instance is not an error; a fresh slot is allocated instead.
#[derive(Debug)]
pub(crate) struct EntityPool<K: Key, V: Default> {
    entries: SlotMap<K, V>,
    parked: Vec<K>,
}

impl<K: Key, V: Default> EntityPool<K, V> {
    pub fn new() -> Self {
        Self {
            entries: SlotMap::with_key(),
            parked: Vec::new(),
        }
    }

    /// Take a parked instance when one exists, otherwise allocate.
    pub fn acquire(&mut self) -> K {
        if let Some(key) = self.parked.pop() {
            debug!("reusing pooled entity");
            key
        } else {
            self.entries.insert(V::default())
        }
    }

    /// Return an instance to the pool for later reuse.
    pub fn release(&mut self, key: K) {
        debug_assert!(self.entries.contains_key(key));
        self.parked.push(key);
    }

    pub fn get(&self, key: K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut V> {
        self.entries.get_mut(key)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut V)> + '_ {
        self.entries.iter_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> + '_ {
        self.entries.iter()
    }
}

/// An obstacle that raises its tile's stress over time until neutralized
/// by sustained agent presence.
#[derive(Debug, Default)]
pub struct StressFactor {
    /// `None` while parked in the pool.
    tile: Option<TileId>,
    strength: f32,
    push_countdown: u32,
}

impl StressFactor {
    pub(crate) fn activate(&mut self, tile: TileId, config: &HexStressConfig) {
        self.tile = Some(tile);
        self.strength = 1.0;
        self.push_countdown = config.factor_push_interval_ticks;
    }

    pub(crate) fn park(&mut self) {
        self.tile = None;
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.tile.is_some()
    }

    #[must_use]
    pub fn tile(&self) -> Option<TileId> {
        self.tile
    }

    /// Current strength in [0, 1].
    #[must_use]
    pub const fn strength(&self) -> f32 {
        self.strength
    }

    /// One fixed tick: count down and, on the interval boundary, push the
    /// occupied tile's raw stress toward 1.
    pub(crate) fn advance(&mut self, board: &mut HexBoard, config: &HexStressConfig) {
        let Some(tile_id) = self.tile else {
            return;
        };
        self.push_countdown = self.push_countdown.saturating_sub(1);
        if self.push_countdown > 0 {
            return;
        }
        self.push_countdown = config.factor_push_interval_ticks;
        if let Some(tile) = board.tile_mut(tile_id) {
            tile.stress_level =
                lerp(tile.stress_level, 1.0, config.factor_push_lerp).clamp(0.0, 1.0);
        }
    }

    /// Apply sustained agent pressure. Returns `true` exactly when the
    /// strength drops below the elimination threshold.
    pub(crate) fn apply_pressure(&mut self, amount: f32, threshold: f32) -> bool {
        if self.tile.is_none() {
            return false;
        }
        self.strength = (self.strength - amount).max(0.0);
        self.strength < threshold
    }
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    tile: TileId,
    lifetime: i32,
}

/// A self-extending multi-segment entity. Every occupied tile's raw stress
/// is held at a floor each tick; segments decay independently.
#[derive(Debug, Default)]
pub struct Sworm {
    /// `None` while parked in the pool.
    head: Option<TileId>,
    target_len: usize,
    segments: Vec<Segment>,
    update_countdown: u32,
    stopped: bool,
    reached_full: bool,
}

impl Sworm {
    /// Activate on `start` with the head as sole segment and full lifetime.
    pub(crate) fn activate(&mut self, start: TileId, target_len: usize, config: &HexStressConfig) {
        self.head = Some(start);
        self.target_len = target_len.max(1);
        self.segments.clear();
        self.segments.push(Segment {
            tile: start,
            lifetime: self.target_len as i32,
        });
        self.update_countdown = config.sworm_update_interval_ticks;
        self.stopped = false;
        self.reached_full = false;
    }

    pub(crate) fn park(&mut self) {
        self.head = None;
        self.segments.clear();
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.head.is_some()
    }

    #[must_use]
    pub fn head(&self) -> Option<TileId> {
        self.head
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Ordered occupied segment tiles.
    pub fn segment_tiles(&self) -> impl Iterator<Item = TileId> + '_ {
        self.segments.iter().map(|segment| segment.tile)
    }

    /// Raise every live segment tile's raw stress to at least the floor.
    /// Runs every fixed tick while active.
    pub(crate) fn hold_stress(&self, board: &mut HexBoard, floor: f32) {
        for segment in &self.segments {
            if let Some(tile) = board.tile_mut(segment.tile) {
                tile.stress_level = tile.stress_level.max(floor);
            }
        }
    }

    /// One fixed tick. On the update interval: decay lifetimes, drop dead
    /// segments, extend the head, and shorten a stunted sworm. Returns
    /// `true` once the segment list is empty and the sworm should retire.
    pub(crate) fn advance(
        &mut self,
        board: &mut HexBoard,
        rng: &mut SmallRng,
        self_id: SwormId,
        config: &HexStressConfig,
    ) -> bool {
        if self.head.is_none() {
            return false;
        }
        self.update_countdown = self.update_countdown.saturating_sub(1);
        if self.update_countdown > 0 {
            return false;
        }
        self.update_countdown = config.sworm_update_interval_ticks;
        self.slither(board, rng, self_id);
        self.segments.is_empty()
    }

    fn slither(&mut self, board: &mut HexBoard, rng: &mut SmallRng, self_id: SwormId) {
        for segment in &mut self.segments {
            segment.lifetime -= 1;
        }
        self.segments.retain(|segment| {
            if segment.lifetime < 1 {
                board.clear_occupant(segment.tile);
                false
            } else {
                true
            }
        });

        if !self.stopped {
            let head = match self.head {
                Some(head) => head,
                None => return,
            };
            let head_is_edge = board.tile(head).is_some_and(|tile| tile.is_edge);
            if head_is_edge {
                self.stopped = true;
            } else if self.segments.len() < self.target_len {
                match self.pick_extension(board, rng, head) {
                    Some(next) => {
                        let _ = board.set_occupant(next, Occupant::SwormSegment(self_id));
                        self.segments.push(Segment {
                            tile: next,
                            lifetime: self.target_len as i32,
                        });
                        self.head = Some(next);
                        if self.segments.len() >= self.target_len {
                            self.reached_full = true;
                        }
                    }
                    None => self.stopped = true,
                }
            } else {
                self.reached_full = true;
            }

            // Stunted sworms die out promptly instead of lingering.
            if self.stopped && !self.reached_full && self.segments.len() < self.target_len {
                let shortfall = self.target_len as i32 - self.segments.len() as i32 - 1;
                for segment in &mut self.segments {
                    segment.lifetime -= shortfall;
                }
                self.target_len = self.segments.len().max(1);
            }
        }
    }

    /// Uniform choice among the head's free, non-home, non-segment neighbors.
    fn pick_extension(
        &self,
        board: &HexBoard,
        rng: &mut SmallRng,
        head: TileId,
    ) -> Option<TileId> {
        let candidates: SmallVec<[TileId; 6]> = board
            .neighbors(head)
            .iter()
            .copied()
            .filter(|&id| {
                board
                    .tile(id)
                    .is_some_and(|tile| tile.is_free() && !tile.is_home)
                    && !self.segments.iter().any(|segment| segment.tile == id)
            })
            .collect();
        pick_uniform(rng, &candidates)
    }
}

/// Uniform random choice; `None` on an empty candidate set.
pub(crate) fn pick_uniform<T: Copy>(rng: &mut SmallRng, options: &[T]) -> Option<T> {
    if options.is_empty() {
        None
    } else {
        Some(options[rng.random_range(0..options.len())])
    }
}

/// Weighted random choice; `None` on an empty set or non-positive total
/// weight. Weights must be non-negative.
pub(crate) fn pick_weighted<T: Copy>(rng: &mut SmallRng, options: &[(T, f32)]) -> Option<T> {
    let total: f32 = options.iter().map(|(_, weight)| weight.max(0.0)).sum();
    if options.is_empty() || total <= 0.0 {
        return None;
    }
    let mut draw = rng.random_range(0.0..total);
    for &(value, weight) in options {
        draw -= weight.max(0.0);
        if draw < 0.0 {
            return Some(value);
        }
    }
    options.last().map(|&(value, _)| value)
}

/// Periodic spawn process, modeled as a task whose predicate is evaluated
/// once per fixed tick. Gates on the agent's first confirmed action and
/// backs off as occupancy grows.
#[derive(Debug, Default)]
pub(crate) struct SpawnTask {
    started: bool,
    countdown: u32,
}

impl SpawnTask {
    /// Evaluate the task's wake-up predicate for this tick. Returns `true`
    /// when a spawn attempt should run now.
    pub fn poll(&mut self, first_action_taken: bool, active: usize, cap: usize) -> bool {
        if !first_action_taken {
            return false;
        }
        if !self.started {
            self.started = true;
            return false;
        }
        if self.countdown > 0 {
            self.countdown -= 1;
            return false;
        }
        // Suspended on "capacity available"; re-checked next tick.
        active < cap
    }

    /// Re-arm after an attempt, growing the delay with current occupancy.
    pub fn backoff(&mut self, config: &HexStressConfig, active: usize) {
        self.countdown =
            config.spawn_base_delay_ticks + config.spawn_backoff_per_active_ticks * active as u32;
    }
}
