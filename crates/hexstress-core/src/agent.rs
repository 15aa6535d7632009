//! Player agent: finite-state behavior coupled to the stress field.

use crate::board::{HexBoard, TileId};
use crate::entity::FactorId;
use crate::{HexStressConfig, WorldError, path};
use rand::Rng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Below this accumulator value the agent stops pulsing entirely.
pub const LOW_STRESS_THRESHOLD: f32 = -0.5;

/// Movement states of the player agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AgentState {
    #[default]
    Idle,
    Moving,
    Fleeing,
    /// Terminal for the session.
    Sleeping,
}

/// Outcome signals the world turns into lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AgentSignal {
    FellAsleep,
    SecondWind,
    ReachedHome,
}

/// Snapshot of world facts the agent reads during one fixed tick.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AgentTickInputs {
    pub active_factors: usize,
    /// Eliminated stress factors over the session budget.
    pub progress_ratio: f32,
    pub remaining_factor_capacity: usize,
    /// Board-wide raw stress has decayed to ~0.
    pub board_quiet: bool,
}

/// The single player agent. Created once at session start on the home tile.
#[derive(Debug)]
pub struct Agent {
    current_tile: TileId,
    target_tile: Option<TileId>,
    /// Invariant: when non-empty, the front element is `current_tile`.
    route: VecDeque<TileId>,
    stress: f32,
    state: AgentState,
    hop_countdown: u32,
    cancel_requested: bool,
    /// Rising-edge latch: one flee episode per threshold crossing.
    flee_latched: bool,
    hovered_tile: Option<TileId>,
    preview_path: Vec<TileId>,
    preview_enabled: bool,
    engaged_factor: Option<FactorId>,
    first_action_taken: bool,
}

impl Agent {
    pub(crate) fn new(home: TileId) -> Self {
        Self {
            current_tile: home,
            target_tile: None,
            route: VecDeque::new(),
            stress: LOW_STRESS_THRESHOLD,
            state: AgentState::Idle,
            hop_countdown: 0,
            cancel_requested: false,
            flee_latched: false,
            hovered_tile: None,
            preview_path: Vec::new(),
            preview_enabled: false,
            engaged_factor: None,
            first_action_taken: false,
        }
    }

    /// Move the agent directly onto `tile`, clearing any route.
    pub(crate) fn place_on_tile(
        &mut self,
        board: &HexBoard,
        tile: TileId,
    ) -> Result<(), WorldError> {
        if !board.contains(tile) {
            return Err(WorldError::UnknownTile);
        }
        self.current_tile = tile;
        self.route.clear();
        self.target_tile = None;
        self.clear_preview();
        Ok(())
    }

    /// Pointer entered a tile: while idle, compute and expose a preview path.
    pub(crate) fn pointer_entered(&mut self, board: &HexBoard, tile: TileId) {
        if !board.contains(tile) {
            debug!(?tile, "pointer event for unknown tile ignored");
            return;
        }
        self.hovered_tile = Some(tile);
        if self.state != AgentState::Idle {
            return;
        }
        match path::find_path(board, self.current_tile, tile) {
            Some(preview) if preview.len() > 1 => {
                self.preview_path = preview;
                self.preview_enabled = true;
                self.target_tile = Some(tile);
            }
            _ => self.clear_preview(),
        }
    }

    /// Pointer left a tile: drop the preview if it was for that tile.
    pub(crate) fn pointer_left(&mut self, tile: TileId) {
        if self.hovered_tile == Some(tile) {
            self.hovered_tile = None;
            if self.state == AgentState::Idle {
                self.clear_preview();
            }
        }
    }

    /// Confirm navigation toward the previewed target, consuming the
    /// preview. Returns whether a move actually started. A preview that no
    /// longer starts at the current tile is stale and is rejected.
    pub(crate) fn confirm(&mut self, config: &HexStressConfig) -> bool {
        if self.state != AgentState::Idle
            || self.preview_path.len() < 2
            || self.preview_path.first() != Some(&self.current_tile)
        {
            return false;
        }
        self.route = self.preview_path.drain(..).collect();
        self.state = AgentState::Moving;
        self.hop_countdown = config.hop_interval_ticks;
        self.cancel_requested = false;
        self.first_action_taken = true;
        self.preview_enabled = false;
        true
    }

    /// Request cancellation; honored at the end of the current hop.
    pub(crate) fn cancel(&mut self) {
        if self.state == AgentState::Moving {
            self.cancel_requested = true;
        }
    }

    /// Advance one fixed tick: stress coupling, flee entry, movement, and
    /// the sleep check. Reads tile state already finalized for this tick.
    pub(crate) fn advance(
        &mut self,
        board: &HexBoard,
        rng: &mut SmallRng,
        config: &HexStressConfig,
        inputs: &AgentTickInputs,
    ) -> Option<AgentSignal> {
        if self.state == AgentState::Sleeping {
            return None;
        }

        self.couple_stress(board, config);

        let over_threshold = self.stress > config.high_stress_threshold;
        if over_threshold && !self.flee_latched {
            self.flee_latched = true;
            self.begin_flee(board, config);
        } else if !over_threshold {
            self.flee_latched = false;
        }

        match self.state {
            AgentState::Moving | AgentState::Fleeing => self.advance_movement(rng, config, inputs),
            AgentState::Idle => self.check_sleep(board, inputs),
            AgentState::Sleeping => None,
        }
    }

    /// Asymmetric drift toward the current tile's effective stress: fast
    /// upward anywhere, slow downward only while resting on the home tile.
    fn couple_stress(&mut self, board: &HexBoard, config: &HexStressConfig) {
        let Some(tile) = board.tile(self.current_tile) else {
            return;
        };
        let tile_stress = tile.effective_stress;
        if tile_stress > self.stress {
            self.stress += config.stress_rise_rate * (tile_stress - self.stress);
        } else if tile.is_home {
            self.stress -= config.stress_fall_rate * (self.stress - tile_stress);
        }
        self.stress = self.stress.clamp(-1.0, 1.0);
    }

    /// Enter the fleeing state with an internally computed route home. Any
    /// in-progress move is abandoned at the current tile, which is the end
    /// of its current hop in this discretization.
    fn begin_flee(&mut self, board: &HexBoard, config: &HexStressConfig) {
        let Some(route) = path::find_path(board, self.current_tile, board.home()) else {
            return;
        };
        self.route = route.into_iter().collect();
        self.target_tile = Some(board.home());
        self.state = AgentState::Fleeing;
        self.cancel_requested = false;
        self.clear_preview();
        if self.hop_countdown == 0 {
            self.hop_countdown = config.hop_interval_ticks;
        }
    }

    fn advance_movement(
        &mut self,
        rng: &mut SmallRng,
        config: &HexStressConfig,
        inputs: &AgentTickInputs,
    ) -> Option<AgentSignal> {
        self.hop_countdown = self.hop_countdown.saturating_sub(1);
        if self.hop_countdown > 0 {
            return None;
        }

        // Hop boundary: step onto the next route tile, then decide.
        if self.route.len() > 1 {
            self.route.pop_front();
            if let Some(&next) = self.route.front() {
                self.current_tile = next;
            }
        }

        match self.state {
            AgentState::Fleeing => {
                if self.route.len() <= 1 {
                    self.arrive_idle();
                    return Some(AgentSignal::ReachedHome);
                }
                if inputs.active_factors > 1 && rng.random::<f32>() < inputs.progress_ratio {
                    self.stress *= 0.5;
                    self.arrive_idle();
                    debug!(stress = self.stress, "second wind cut the flee short");
                    return Some(AgentSignal::SecondWind);
                }
                self.hop_countdown = config.hop_interval_ticks;
            }
            AgentState::Moving => {
                if self.route.len() <= 1 || self.cancel_requested {
                    self.arrive_idle();
                } else {
                    self.hop_countdown = config.hop_interval_ticks;
                }
            }
            AgentState::Idle | AgentState::Sleeping => {}
        }
        None
    }

    fn arrive_idle(&mut self) {
        self.state = AgentState::Idle;
        self.route.clear();
        self.target_tile = None;
        self.cancel_requested = false;
        self.hop_countdown = 0;
        self.clear_preview();
    }

    /// Idle on the home tile with no stress-factor capacity left and a
    /// quiet board: fall asleep. Terminal for the session.
    fn check_sleep(&mut self, board: &HexBoard, inputs: &AgentTickInputs) -> Option<AgentSignal> {
        let on_home = self.current_tile == board.home();
        if on_home
            && inputs.remaining_factor_capacity == 0
            && inputs.active_factors == 0
            && inputs.board_quiet
        {
            self.state = AgentState::Sleeping;
            self.clear_preview();
            return Some(AgentSignal::FellAsleep);
        }
        None
    }

    fn clear_preview(&mut self) {
        self.preview_path.clear();
        self.preview_enabled = false;
        if self.state == AgentState::Idle {
            self.target_tile = None;
        }
    }

    #[must_use]
    pub const fn state(&self) -> AgentState {
        self.state
    }

    #[must_use]
    pub const fn current_tile(&self) -> TileId {
        self.current_tile
    }

    #[must_use]
    pub const fn target_tile(&self) -> Option<TileId> {
        self.target_tile
    }

    /// Stress accumulator in [-1, 1].
    #[must_use]
    pub const fn stress(&self) -> f32 {
        self.stress
    }

    pub(crate) fn set_stress(&mut self, value: f32) {
        self.stress = value.clamp(-1.0, 1.0);
    }

    /// Remaining route, front element being the current tile while moving.
    #[must_use]
    pub fn route(&self) -> &VecDeque<TileId> {
        &self.route
    }

    /// Preview path computed from pointer hover, for external line drawing.
    #[must_use]
    pub fn preview_path(&self) -> &[TileId] {
        &self.preview_path
    }

    /// Whether the presentation layer should draw the preview path.
    #[must_use]
    pub const fn preview_enabled(&self) -> bool {
        self.preview_enabled
    }

    #[must_use]
    pub const fn first_action_taken(&self) -> bool {
        self.first_action_taken
    }

    #[must_use]
    pub const fn engaged_factor(&self) -> Option<FactorId> {
        self.engaged_factor
    }

    pub(crate) fn set_engaged_factor(&mut self, factor: Option<FactorId>) {
        self.engaged_factor = factor;
    }

    /// Seconds between visual pulses for the presentation layer; `None`
    /// below the low-stress threshold, where the agent does not pulse.
    #[must_use]
    pub fn pulse_period(&self) -> Option<f32> {
        if self.stress > LOW_STRESS_THRESHOLD {
            Some(4.0 - 3.5 * self.stress)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HexStressConfig;
    use rand::SeedableRng;

    fn setup() -> (HexBoard, Agent, HexStressConfig, SmallRng) {
        let config = HexStressConfig::default();
        let board = HexBoard::new(7).expect("board");
        let agent = Agent::new(board.home());
        let rng = SmallRng::seed_from_u64(11);
        (board, agent, config, rng)
    }

    fn quiet_inputs() -> AgentTickInputs {
        AgentTickInputs {
            active_factors: 0,
            progress_ratio: 0.0,
            remaining_factor_capacity: 4,
            board_quiet: true,
        }
    }

    #[test]
    fn starts_idle_on_home_at_baseline_stress() {
        let (board, agent, _, _) = setup();
        assert_eq!(agent.state(), AgentState::Idle);
        assert_eq!(agent.current_tile(), board.home());
        assert_eq!(agent.stress(), LOW_STRESS_THRESHOLD);
        assert!(agent.route().is_empty());
    }

    #[test]
    fn confirm_without_preview_does_not_move() {
        let (_, mut agent, config, _) = setup();
        assert!(!agent.confirm(&config));
        assert_eq!(agent.state(), AgentState::Idle);
        assert!(!agent.first_action_taken());
    }

    #[test]
    fn confirm_consumes_the_preview() {
        let (board, mut agent, config, mut rng) = setup();
        let target = board.neighbors(board.home())[0];
        agent.pointer_entered(&board, target);
        assert!(agent.confirm(&config));
        assert!(agent.preview_path().is_empty());

        for _ in 0..config.hop_interval_ticks {
            agent.advance(&board, &mut rng, &config, &quiet_inputs());
        }
        assert_eq!(agent.current_tile(), target);
        // No fresh pointer event: a repeat confirm must not restart the
        // old route from its original start tile.
        assert!(!agent.confirm(&config));
        assert_eq!(agent.state(), AgentState::Idle);
        assert_eq!(agent.current_tile(), target);
    }

    #[test]
    fn placement_drops_a_pending_preview() {
        let (board, mut agent, config, _) = setup();
        let target = board.neighbors(board.home())[0];
        agent.pointer_entered(&board, target);
        assert!(agent.preview_enabled());
        agent.place_on_tile(&board, target).expect("place");
        assert!(agent.preview_path().is_empty());
        assert!(!agent.confirm(&config));
    }

    #[test]
    fn hover_confirm_walks_route_then_idles() {
        let (board, mut agent, config, mut rng) = setup();
        let target = board.neighbors(board.home())[0];
        agent.pointer_entered(&board, target);
        assert!(agent.preview_enabled());
        assert_eq!(agent.preview_path().len(), 2);
        assert!(agent.confirm(&config));
        assert_eq!(agent.state(), AgentState::Moving);
        assert_eq!(agent.route().front(), Some(&board.home()));

        for _ in 0..config.hop_interval_ticks {
            agent.advance(&board, &mut rng, &config, &quiet_inputs());
        }
        assert_eq!(agent.current_tile(), target);
        assert_eq!(agent.state(), AgentState::Idle);
        assert!(agent.route().is_empty());
    }

    #[test]
    fn pointer_left_clears_preview() {
        let (board, mut agent, _, _) = setup();
        let target = board.neighbors(board.home())[0];
        agent.pointer_entered(&board, target);
        assert!(agent.preview_enabled());
        agent.pointer_left(target);
        assert!(!agent.preview_enabled());
        assert!(agent.preview_path().is_empty());
    }

    #[test]
    fn cancel_finishes_current_hop_then_stops() {
        let (board, mut agent, config, mut rng) = setup();
        // Two-hop route: home -> n1 -> n2.
        let n1 = board.neighbors(board.home())[0];
        let n2 = *board
            .neighbors(n1)
            .iter()
            .find(|&&t| t != board.home() && !board.neighbors(board.home()).contains(&t))
            .expect("second hop");
        agent.pointer_entered(&board, n2);
        assert!(agent.confirm(&config));

        agent.cancel();
        for _ in 0..config.hop_interval_ticks {
            agent.advance(&board, &mut rng, &config, &quiet_inputs());
        }
        // First hop completed, then the cancel took effect.
        assert_eq!(agent.state(), AgentState::Idle);
        assert_ne!(agent.current_tile(), n2);
        assert_ne!(agent.current_tile(), board.home());
    }

    #[test]
    fn stress_rises_fast_and_falls_only_at_home() {
        let (mut board, mut agent, config, mut rng) = setup();
        let away = board.neighbors(board.home())[0];
        agent.place_on_tile(&board, away).expect("place");
        if let Some(tile) = board.tile_mut(away) {
            tile.effective_stress = 0.5;
        }
        let before = agent.stress();
        agent.advance(&board, &mut rng, &config, &quiet_inputs());
        assert!(agent.stress() > before, "rises toward tile stress");

        // Off home, lower tile stress does not pull the accumulator down.
        if let Some(tile) = board.tile_mut(away) {
            tile.effective_stress = -1.0;
        }
        let held = agent.stress();
        agent.advance(&board, &mut rng, &config, &quiet_inputs());
        assert!((agent.stress() - held).abs() < 1e-6);

        // Back home it decays, slowly.
        agent.place_on_tile(&board, board.home()).expect("place");
        let at_home = agent.stress();
        agent.advance(&board, &mut rng, &config, &quiet_inputs());
        assert!(agent.stress() < at_home);
        assert!(at_home - agent.stress() < config.stress_rise_rate);
    }

    #[test]
    fn flees_iff_accumulator_exceeds_threshold() {
        let (board, mut agent, config, mut rng) = setup();
        let away = board.neighbors(board.home())[0];
        agent.place_on_tile(&board, away).expect("place");

        agent.set_stress(config.high_stress_threshold);
        agent.advance(&board, &mut rng, &config, &quiet_inputs());
        assert_ne!(agent.state(), AgentState::Fleeing, "threshold is strict");

        agent.set_stress(0.9);
        agent.advance(&board, &mut rng, &config, &quiet_inputs());
        assert_eq!(agent.state(), AgentState::Fleeing);
        assert_eq!(agent.route().front(), Some(&away));
        assert_eq!(agent.route().back(), Some(&board.home()));
    }

    #[test]
    fn fleeing_reaches_home_and_idles() {
        let (board, mut agent, config, mut rng) = setup();
        let away = board.neighbors(board.home())[0];
        agent.place_on_tile(&board, away).expect("place");
        agent.set_stress(0.95);

        let mut signal = None;
        for _ in 0..(config.hop_interval_ticks * 4) {
            if let Some(s) = agent.advance(&board, &mut rng, &config, &quiet_inputs()) {
                signal = Some(s);
                break;
            }
        }
        assert_eq!(signal, Some(AgentSignal::ReachedHome));
        assert_eq!(agent.current_tile(), board.home());
        assert_eq!(agent.state(), AgentState::Idle);
    }

    #[test]
    fn second_wind_halves_stress_and_returns_to_idle() {
        let (board, mut agent, config, mut rng) = setup();
        // Start three hops from home so at least one mid-route hop exists.
        let goal = board
            .tiles()
            .find(|(_, t)| t.is_edge && t.coord.col == 3)
            .map(|(id, _)| id)
            .expect("edge tile");
        agent.place_on_tile(&board, goal).expect("place");
        agent.set_stress(0.95);

        // Guaranteed roll: progress ratio 1.0 and several visible factors.
        let inputs = AgentTickInputs {
            active_factors: 3,
            progress_ratio: 1.0,
            remaining_factor_capacity: 2,
            board_quiet: false,
        };
        let mut signal = None;
        for _ in 0..(config.hop_interval_ticks * 8) {
            if let Some(s) = agent.advance(&board, &mut rng, &config, &inputs) {
                signal = Some(s);
                break;
            }
        }
        assert_eq!(signal, Some(AgentSignal::SecondWind));
        assert_eq!(agent.state(), AgentState::Idle);
        assert!(agent.stress() <= 0.95 * 0.5 + 1e-3);
    }

    #[test]
    fn sleeps_only_when_spent_quiet_and_home() {
        let (board, mut agent, config, mut rng) = setup();
        let spent = AgentTickInputs {
            active_factors: 0,
            progress_ratio: 1.0,
            remaining_factor_capacity: 0,
            board_quiet: true,
        };
        let signal = agent.advance(&board, &mut rng, &config, &spent);
        assert_eq!(signal, Some(AgentSignal::FellAsleep));
        assert_eq!(agent.state(), AgentState::Sleeping);

        // Terminal: nothing moves it out of sleeping.
        agent.set_stress(1.0);
        for _ in 0..20 {
            assert!(agent.advance(&board, &mut rng, &config, &spent).is_none());
        }
        assert_eq!(agent.state(), AgentState::Sleeping);
    }

    #[test]
    fn no_sleep_while_capacity_remains() {
        let (board, mut agent, config, mut rng) = setup();
        let inputs = AgentTickInputs {
            active_factors: 0,
            progress_ratio: 0.5,
            remaining_factor_capacity: 1,
            board_quiet: true,
        };
        assert!(agent.advance(&board, &mut rng, &config, &inputs).is_none());
        assert_eq!(agent.state(), AgentState::Idle);
    }

    #[test]
    fn pulse_period_follows_stress() {
        let (_, mut agent, _, _) = setup();
        assert_eq!(agent.pulse_period(), None, "no pulsing at baseline");
        agent.set_stress(0.0);
        assert_eq!(agent.pulse_period(), Some(4.0));
        agent.set_stress(1.0);
        assert_eq!(agent.pulse_period(), Some(0.5));
    }
}
