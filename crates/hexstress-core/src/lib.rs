//! Core simulation for a hexagonal board of reactive tiles, a player
//! agent, decaying stress-factor obstacles, and self-extending sworms.
//!
//! The board produces a continuously evolving stress field; the agent
//! navigates it and alternates between exploration, panic, and rest.
//! Rendering, audio, input capture, and scene management are external
//! collaborators: they feed pointer/confirm/cancel events in and read
//! tile stress, agent state, and lifecycle notifications back out.

pub mod agent;
pub mod board;
pub mod entity;
pub mod path;

pub use agent::{Agent, AgentState, LOW_STRESS_THRESHOLD};
pub use board::{
    ADJACENCY_RADIUS, HORIZONTAL_SPACING, HexBoard, Occupant, Tile, TileCoord, TileId,
    VERTICAL_SPACING, effective_stress, stress_to_hue,
};
pub use entity::{FactorId, StressFactor, Sworm, SwormId};
pub use path::{HOP_COST, find_path};

use agent::{AgentSignal, AgentTickInputs};
use entity::{EntityPool, SpawnTask, pick_uniform, pick_weighted};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::debug;

/// Shared epsilon for "has decayed to ~0" checks and float comparisons.
pub const NEGLIGIBLE: f32 = 1e-2;

/// Approximate equality within [`NEGLIGIBLE`].
#[must_use]
pub fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < NEGLIGIBLE
}

/// Errors that can occur when constructing or driving a world.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// A placement or lookup referenced a tile that does not exist.
    #[error("unknown tile")]
    UnknownTile,
    /// A spawn targeted a tile already claimed by another entity.
    #[error("tile is already occupied")]
    TileOccupied,
}

/// Monotonic fixed-tick counter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// World-space position of a tile center.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    /// Construct a new position.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance_squared(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        self.distance_squared(other).sqrt()
    }
}

/// Static configuration for a hexstress session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HexStressConfig {
    /// Board diameter in tiles; must be an odd positive integer.
    pub diameter: u32,
    /// Optional RNG seed for reproducible sessions.
    pub rng_seed: Option<u64>,
    /// Expo/demo installations alter reset behavior; the core only reads it.
    pub expo_mode: bool,
    /// Lerp rate for neighbor stress diffusion, per fixed tick.
    pub diffusion_rate: f32,
    /// Fixed ticks per agent hop between adjacent tiles.
    pub hop_interval_ticks: u32,
    /// Upward drift rate of the agent accumulator toward tile stress.
    pub stress_rise_rate: f32,
    /// Downward drift rate, applied only on the home tile.
    pub stress_fall_rate: f32,
    /// Accumulator value above which the agent flees.
    pub high_stress_threshold: f32,
    /// Total stress factors the session will ever spawn.
    pub factor_budget: usize,
    /// Concurrent stress-factor cap before remaining-budget clamping.
    pub max_concurrent_factors: usize,
    /// Fixed ticks between a factor's stress pushes.
    pub factor_push_interval_ticks: u32,
    /// Lerp applied toward full stress on each factor push.
    pub factor_push_lerp: f32,
    /// Strength lost per fixed tick of sustained agent presence.
    pub agent_pressure: f32,
    /// Strength below which a factor is eliminated.
    pub factor_elimination_threshold: f32,
    /// Scale applied to the distance-stress factor per elimination.
    pub stress_relief_factor: f32,
    /// Total sworms the session will ever spawn.
    pub sworm_budget: usize,
    /// Concurrent sworm cap before remaining-budget clamping.
    pub max_concurrent_sworms: usize,
    /// Fixed ticks between sworm slither updates.
    pub sworm_update_interval_ticks: u32,
    /// Inclusive range of sworm target lengths.
    pub sworm_min_length: usize,
    pub sworm_max_length: usize,
    /// Raw stress floor held on every live sworm segment tile.
    pub sworm_stress_floor: f32,
    /// Base inter-spawn delay in fixed ticks.
    pub spawn_base_delay_ticks: u32,
    /// Extra delay per currently active entity of the same kind.
    pub spawn_backoff_per_active_ticks: u32,
    /// Maximum number of recent tick summaries retained in memory.
    pub history_capacity: usize,
}

impl Default for HexStressConfig {
    fn default() -> Self {
        Self {
            diameter: 11,
            rng_seed: None,
            expo_mode: false,
            diffusion_rate: 0.05,
            hop_interval_ticks: 5,
            stress_rise_rate: 0.08,
            stress_fall_rate: 0.01,
            high_stress_threshold: 0.8,
            factor_budget: 12,
            max_concurrent_factors: 3,
            factor_push_interval_ticks: 20,
            factor_push_lerp: 0.2,
            agent_pressure: 0.01,
            factor_elimination_threshold: 0.1,
            stress_relief_factor: 0.9,
            sworm_budget: 8,
            max_concurrent_sworms: 2,
            sworm_update_interval_ticks: 5,
            sworm_min_length: 3,
            sworm_max_length: 6,
            sworm_stress_floor: 0.9,
            spawn_base_delay_ticks: 40,
            spawn_backoff_per_active_ticks: 20,
            history_capacity: 256,
        }
    }
}

impl HexStressConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), WorldError> {
        if self.diameter == 0 || self.diameter % 2 == 0 {
            return Err(WorldError::InvalidConfig(
                "board diameter must be an odd positive integer",
            ));
        }
        if !(0.0..=1.0).contains(&self.diffusion_rate) {
            return Err(WorldError::InvalidConfig(
                "diffusion_rate must lie in [0, 1]",
            ));
        }
        if self.hop_interval_ticks == 0
            || self.factor_push_interval_ticks == 0
            || self.sworm_update_interval_ticks == 0
        {
            return Err(WorldError::InvalidConfig(
                "tick intervals must be positive",
            ));
        }
        if self.stress_rise_rate <= 0.0 || self.stress_fall_rate <= 0.0 {
            return Err(WorldError::InvalidConfig(
                "stress coupling rates must be positive",
            ));
        }
        if !(-1.0..=1.0).contains(&self.high_stress_threshold) {
            return Err(WorldError::InvalidConfig(
                "high_stress_threshold must lie in [-1, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.factor_push_lerp)
            || !(0.0..=1.0).contains(&self.factor_elimination_threshold)
            || !(0.0..=1.0).contains(&self.sworm_stress_floor)
        {
            return Err(WorldError::InvalidConfig(
                "factor and sworm stress parameters must lie in [0, 1]",
            ));
        }
        if self.agent_pressure <= 0.0 {
            return Err(WorldError::InvalidConfig(
                "agent_pressure must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.stress_relief_factor) {
            return Err(WorldError::InvalidConfig(
                "stress_relief_factor must lie in [0, 1]",
            ));
        }
        if self.sworm_min_length == 0 || self.sworm_min_length > self.sworm_max_length {
            return Err(WorldError::InvalidConfig(
                "sworm length range must be non-empty and positive",
            ));
        }
        if self.history_capacity == 0 {
            return Err(WorldError::InvalidConfig(
                "history_capacity must be positive",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG, seeding from entropy when unseeded.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

/// Lifecycle notifications consumed by the external audio/UI layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    StressFactorEliminated { factor: FactorId, tile: TileId },
    SwormEliminated { sworm: SwormId },
    AgentSlept,
}

/// Events emitted after processing one fixed tick.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TickEvents {
    pub tick: Tick,
    pub events: Vec<SimEvent>,
}

/// Per-tick summary retained in the bounded history ring.
#[derive(Debug, Clone, PartialEq)]
pub struct TickSummary {
    pub tick: Tick,
    pub agent_state: AgentState,
    pub agent_stress: f32,
    pub active_factors: usize,
    pub active_sworms: usize,
    pub factors_eliminated: usize,
    pub sworms_eliminated: usize,
    pub max_effective_stress: f32,
}

/// Global progress metrics exposed to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub factors_eliminated: usize,
    pub factors_remaining: usize,
    pub sworms_eliminated: usize,
    pub active_factors: usize,
    pub active_sworms: usize,
}

/// Aggregate session state: board, agent, pooled entities, and the
/// fixed-tick scheduler driving them.
pub struct World {
    config: HexStressConfig,
    tick: Tick,
    rng: SmallRng,
    board: HexBoard,
    agent: Agent,
    factors: EntityPool<FactorId, StressFactor>,
    sworms: EntityPool<SwormId, Sworm>,
    factor_task: SpawnTask,
    sworm_task: SpawnTask,
    factors_eliminated: usize,
    sworms_eliminated: usize,
    pending_events: Vec<SimEvent>,
    history: VecDeque<TickSummary>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("tick", &self.tick)
            .field("diameter", &self.config.diameter)
            .field("agent_state", &self.agent.state())
            .field("factors_eliminated", &self.factors_eliminated)
            .finish()
    }
}

impl World {
    /// Instantiate a new session from the supplied configuration, with the
    /// agent placed on the home tile.
    pub fn new(config: HexStressConfig) -> Result<Self, WorldError> {
        config.validate()?;
        let board = HexBoard::new(config.diameter)?;
        let agent = Agent::new(board.home());
        let rng = config.seeded_rng();
        let history_capacity = config.history_capacity;
        Ok(Self {
            config,
            tick: Tick::zero(),
            rng,
            board,
            agent,
            factors: EntityPool::new(),
            sworms: EntityPool::new(),
            factor_task: SpawnTask::default(),
            sworm_task: SpawnTask::default(),
            factors_eliminated: 0,
            sworms_eliminated: 0,
            pending_events: Vec::new(),
            history: VecDeque::with_capacity(history_capacity),
        })
    }

    /// Execute one fixed tick: diffusion, entity effects, agent behavior,
    /// spawn tasks. Each stage reads state the previous stages finalized.
    pub fn step(&mut self) -> TickEvents {
        self.tick = self.tick.next();
        self.stage_diffusion();
        self.stage_entities();
        self.stage_agent();
        self.stage_spawns();
        let events = std::mem::take(&mut self.pending_events);
        self.push_summary();
        TickEvents {
            tick: self.tick,
            events,
        }
    }

    fn stage_diffusion(&mut self) {
        self.board.diffuse(self.config.diffusion_rate);
    }

    /// Entity-driven stress overrides, applied after diffusion so occupied
    /// tiles are driven by their occupants for this tick.
    fn stage_entities(&mut self) {
        for (_, factor) in self.factors.iter_mut() {
            factor.advance(&mut self.board, &self.config);
        }

        let mut retired: Vec<SwormId> = Vec::new();
        for (id, sworm) in self.sworms.iter_mut() {
            if !sworm.is_active() {
                continue;
            }
            sworm.hold_stress(&mut self.board, self.config.sworm_stress_floor);
            if sworm.advance(&mut self.board, &mut self.rng, id, &self.config) {
                retired.push(id);
            }
        }
        for id in retired {
            if let Some(sworm) = self.sworms.get_mut(id) {
                sworm.park();
            }
            self.sworms.release(id);
            self.sworms_eliminated += 1;
            self.pending_events.push(SimEvent::SwormEliminated { sworm: id });
        }

        self.board.refresh_derived();
    }

    fn stage_agent(&mut self) {
        let inputs = AgentTickInputs {
            active_factors: self.active_factor_count(),
            progress_ratio: self.factors_eliminated as f32 / self.config.factor_budget.max(1) as f32,
            remaining_factor_capacity: self.remaining_factor_capacity(),
            board_quiet: self.board.max_stress_level() < NEGLIGIBLE,
        };
        let signal = self
            .agent
            .advance(&self.board, &mut self.rng, &self.config, &inputs);
        if let Some(AgentSignal::FellAsleep) = signal {
            self.pending_events.push(SimEvent::AgentSlept);
        }

        self.stage_engagement();
    }

    /// A stationary agent grinds down a stress factor sharing its tile.
    fn stage_engagement(&mut self) {
        if self.agent.state() != AgentState::Idle {
            self.agent.set_engaged_factor(None);
            return;
        }
        let tile_id = self.agent.current_tile();
        let occupant = match self.board.tile(tile_id) {
            Some(tile) => tile.occupant,
            None => return,
        };
        let Occupant::StressFactor(factor_id) = occupant else {
            self.agent.set_engaged_factor(None);
            return;
        };
        self.agent.set_engaged_factor(Some(factor_id));

        let pressure = self.config.agent_pressure;
        let threshold = self.config.factor_elimination_threshold;
        let eliminated = self
            .factors
            .get_mut(factor_id)
            .is_some_and(|factor| factor.apply_pressure(pressure, threshold));
        if eliminated {
            self.retire_factor(factor_id, tile_id);
            self.agent.set_engaged_factor(None);
        }
    }

    fn retire_factor(&mut self, factor_id: FactorId, tile_id: TileId) {
        if let Some(factor) = self.factors.get_mut(factor_id) {
            factor.park();
        }
        self.board.clear_occupant(tile_id);
        self.factors.release(factor_id);
        self.factors_eliminated += 1;
        self.board.relieve(self.config.stress_relief_factor);
        self.pending_events.push(SimEvent::StressFactorEliminated {
            factor: factor_id,
            tile: tile_id,
        });
    }

    /// Evaluate both spawn tasks' predicates for this tick.
    fn stage_spawns(&mut self) {
        let first_action = self.agent.first_action_taken();

        let active_factors = self.active_factor_count();
        let factor_cap = self
            .config
            .max_concurrent_factors
            .min(self.remaining_factor_capacity());
        if self
            .factor_task
            .poll(first_action, active_factors, factor_cap)
        {
            self.try_spawn_factor();
            self.factor_task.backoff(&self.config, active_factors);
        }

        let active_sworms = self.active_sworm_count();
        let sworm_cap = self
            .config
            .max_concurrent_sworms
            .min(self.remaining_sworm_capacity());
        if self.sworm_task.poll(first_action, active_sworms, sworm_cap) {
            self.try_spawn_sworm();
            self.sworm_task.backoff(&self.config, active_sworms);
        }
    }

    /// Weighted random placement biased toward already-stressed tiles.
    fn try_spawn_factor(&mut self) {
        let agent_tile = self.agent.current_tile();
        let candidates: Vec<(TileId, f32)> = self
            .board
            .tiles()
            .filter(|&(id, tile)| tile.is_free() && !tile.is_home && id != agent_tile)
            .map(|(id, tile)| (id, tile.effective_stress + 1.0))
            .collect();
        match pick_weighted(&mut self.rng, &candidates) {
            Some(tile) => {
                // Placement cannot fail here; the tile came from the board.
                let _ = self.spawn_stress_factor_at(tile);
            }
            None => debug!("no candidate tile for a stress factor; spawn skipped"),
        }
    }

    /// Uniform random placement on roomy (non-edge) tiles.
    fn try_spawn_sworm(&mut self) {
        let candidates: Vec<TileId> = self
            .board
            .tiles()
            .filter(|(_, tile)| tile.is_free() && !tile.is_edge)
            .map(|(id, _)| id)
            .collect();
        match pick_uniform(&mut self.rng, &candidates) {
            Some(tile) => {
                let length = self
                    .rng
                    .random_range(self.config.sworm_min_length..=self.config.sworm_max_length);
                let _ = self.spawn_sworm_at(tile, length);
            }
            None => debug!("no candidate tile for a sworm; spawn skipped"),
        }
    }

    /// Place a stress factor on `tile`, reusing a pooled instance when one
    /// is parked. The tile must exist and be free.
    pub fn spawn_stress_factor_at(&mut self, tile: TileId) -> Result<FactorId, WorldError> {
        if !self.board.tile(tile).ok_or(WorldError::UnknownTile)?.is_free() {
            return Err(WorldError::TileOccupied);
        }
        let id = self.factors.acquire();
        if let Some(factor) = self.factors.get_mut(id) {
            factor.activate(tile, &self.config);
        }
        self.board.set_occupant(tile, Occupant::StressFactor(id))?;
        Ok(id)
    }

    /// Place a sworm head on `tile` with the given target length, reusing a
    /// pooled instance when one is parked. The tile must exist and be free.
    pub fn spawn_sworm_at(&mut self, tile: TileId, length: usize) -> Result<SwormId, WorldError> {
        if !self.board.tile(tile).ok_or(WorldError::UnknownTile)?.is_free() {
            return Err(WorldError::TileOccupied);
        }
        let id = self.sworms.acquire();
        if let Some(sworm) = self.sworms.get_mut(id) {
            sworm.activate(tile, length, &self.config);
        }
        self.board.set_occupant(tile, Occupant::SwormSegment(id))?;
        Ok(id)
    }

    fn push_summary(&mut self) {
        let max_effective_stress = self
            .board
            .tiles()
            .map(|(_, tile)| tile.effective_stress)
            .fold(-1.0_f32, f32::max);
        let summary = TickSummary {
            tick: self.tick,
            agent_state: self.agent.state(),
            agent_stress: self.agent.stress(),
            active_factors: self.active_factor_count(),
            active_sworms: self.active_sworm_count(),
            factors_eliminated: self.factors_eliminated,
            sworms_eliminated: self.sworms_eliminated,
            max_effective_stress,
        };
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary);
    }

    // --- navigation events from the input layer ---

    /// Pointer entered a tile; drives target selection and path preview.
    pub fn pointer_entered(&mut self, tile: TileId) {
        self.agent.pointer_entered(&self.board, tile);
    }

    /// Pointer left a tile.
    pub fn pointer_left(&mut self, tile: TileId) {
        self.agent.pointer_left(tile);
    }

    /// Primary action: confirm navigation toward the previewed target.
    /// Returns whether a move started.
    pub fn confirm(&mut self) -> bool {
        self.agent.confirm(&self.config)
    }

    /// Secondary action: cancel an in-progress move after the current hop.
    pub fn cancel(&mut self) {
        self.agent.cancel();
    }

    /// Place the agent directly on a tile. The tile must exist.
    pub fn place_agent(&mut self, tile: TileId) -> Result<(), WorldError> {
        self.agent.place_on_tile(&self.board, tile)
    }

    /// Force the agent's stress accumulator (clamped to [-1, 1]); a hook
    /// for demo installations and tests.
    pub fn set_agent_stress(&mut self, value: f32) {
        self.agent.set_stress(value);
    }

    // --- queryable state for the presentation layers ---

    #[must_use]
    pub fn config(&self) -> &HexStressConfig {
        &self.config
    }

    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    #[must_use]
    pub const fn expo_mode(&self) -> bool {
        self.config.expo_mode
    }

    #[must_use]
    pub fn board(&self) -> &HexBoard {
        &self.board
    }

    #[must_use]
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Effective stress of a tile, for external color mapping.
    #[must_use]
    pub fn effective_stress_of(&self, tile: TileId) -> Option<f32> {
        self.board.tile(tile).map(|t| t.effective_stress)
    }

    #[must_use]
    pub fn active_factor_count(&self) -> usize {
        self.factors.iter().filter(|(_, f)| f.is_active()).count()
    }

    #[must_use]
    pub fn active_sworm_count(&self) -> usize {
        self.sworms.iter().filter(|(_, s)| s.is_active()).count()
    }

    #[must_use]
    pub fn remaining_factor_capacity(&self) -> usize {
        self.config.factor_budget.saturating_sub(self.factors_eliminated)
    }

    #[must_use]
    pub fn remaining_sworm_capacity(&self) -> usize {
        self.config.sworm_budget.saturating_sub(self.sworms_eliminated)
    }

    #[must_use]
    pub fn progress(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            factors_eliminated: self.factors_eliminated,
            factors_remaining: self.remaining_factor_capacity(),
            sworms_eliminated: self.sworms_eliminated,
            active_factors: self.active_factor_count(),
            active_sworms: self.active_sworm_count(),
        }
    }

    #[must_use]
    pub fn stress_factor(&self, id: FactorId) -> Option<&StressFactor> {
        self.factors.get(id)
    }

    #[must_use]
    pub fn sworm(&self, id: SwormId) -> Option<&Sworm> {
        self.sworms.get(id)
    }

    /// Iterate over retained tick summaries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }
}
