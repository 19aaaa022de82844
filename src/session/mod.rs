use tracing::{debug, info, warn};

use crate::agents::{Ghost, GhostId, Player};
use crate::config::{ConfigError, SessionConfig};
use crate::constants::{ghost_base_speed, ms_to_ticks, player_speed};
use crate::maze::Maze;
use crate::rng::Rng;
use crate::score_board::ScoreSubmitter;
use crate::timers::{FrightTimer, ModeCycleTimer, TimerBank};
use crate::types::{
    CycleMode, Direction, GameEvent, GhostRole, MazeInit, ScoreSubmission, SessionPhase, Snapshot,
};

mod movement_system;
mod rules_system;
mod timer_system;

#[cfg(test)]
pub(crate) mod test_support;

/// Everything one game mutates. Each subsystem takes it by reference.
#[derive(Clone, Debug)]
pub struct SessionState {
    pub maze: Maze,
    pub player: Player,
    pub ghosts: Vec<Ghost>,
    pub timers: TimerBank,
    pub score: u32,
    pub level: u32,
    pub combo: u32,
    pub phase: SessionPhase,
    pub paused: bool,
    pub input: Direction,
    pub tick: u64,
    pub now_ms: u64,
    rng: Rng,
    events: Vec<GameEvent>,
}

impl SessionState {
    fn new(config: &SessionConfig) -> Result<Self, ConfigError> {
        let maze = Maze::build(&config.map, config.tile_size)?;
        let player = Player::new(
            maze.player_spawn(),
            player_speed(config.tile_size),
            config.starting_extra_lives,
        );
        let timers = TimerBank::new(
            ModeCycleTimer::new(config.mode_first_phase_ms, config.mode_phase_ms),
            FrightTimer::new(config.fright_duration_ms, config.fright_shrink_per_level_ms),
        );
        let mut state = Self {
            maze,
            player,
            ghosts: Vec::new(),
            timers,
            score: 0,
            level: 1,
            combo: 0,
            phase: SessionPhase::Playing,
            paused: false,
            input: Direction::None,
            tick: 0,
            now_ms: 0,
            rng: Rng::new(config.seed),
            events: Vec::new(),
        };
        state.spawn_ghosts(config, config.initial_ghost_count);
        state.reset_round(config);
        Ok(state)
    }

    pub(crate) fn push_event(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    /// Replaces the ghost roster with the first `count` roles.
    fn spawn_ghosts(&mut self, config: &SessionConfig, count: usize) {
        self.ghosts.clear();
        self.timers.mode.untrack_all();
        self.timers.retreats.clear();
        for _ in 0..count.min(config.max_ghost_count) {
            self.add_ghost(config);
        }
    }

    /// Activates the next role in the table. Returns false at the cap.
    pub(crate) fn add_ghost(&mut self, config: &SessionConfig) -> bool {
        let index = self.ghosts.len();
        if index >= config.max_ghost_count {
            return false;
        }
        let (Some(role), Some(spawn)) = (GhostRole::ALL.get(index), self.maze.ghost_spawn(index))
        else {
            return false;
        };
        let id = GhostId(index);
        let mut ghost = Ghost::new(
            id,
            *role,
            spawn,
            ghost_base_speed(config.tile_size),
            config.tile_size,
        );
        let delay = self.release_delay_ticks(config);
        ghost.reset(delay);
        self.ghosts.push(ghost);
        self.timers.mode.track(id);
        self.timers.add_retreat(id, config.retreat_duration_ms);
        true
    }

    fn release_delay_ticks(&mut self, config: &SessionConfig) -> u32 {
        let delay_ms = self
            .rng
            .range_u64(config.release_delay_min_ms, config.release_delay_max_ms);
        ms_to_ticks(delay_ms, config.tick_ms)
    }

    /// Agents back to spawn, timers restarted, combo cleared. Pickups,
    /// score, lives and level are left alone.
    pub(crate) fn reset_round(&mut self, config: &SessionConfig) {
        self.player.reset();
        for index in 0..self.ghosts.len() {
            let delay = self.release_delay_ticks(config);
            self.ghosts[index].reset(delay);
        }
        self.timers.restart(self.now_ms);
        self.timers.mode.apply(&mut self.ghosts);
        self.combo = 0;
        self.phase = SessionPhase::Playing;
    }

    fn play_tick(&mut self, config: &SessionConfig) {
        self.settle_timers();
        self.release_ghosts();
        self.resolve_walls();
        if self.consume_pickups(config) {
            return;
        }
        self.steer_ghosts();
        if self.resolve_ghost_collisions(config) {
            return;
        }
        self.integrate();
    }
}

pub struct Session {
    config: SessionConfig,
    state: SessionState,
    identity: Option<String>,
    submitter: Option<Box<dyn ScoreSubmitter + Send>>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = SessionState::new(&config)?;
        debug!(
            seed = config.seed,
            ghosts = state.ghosts.len(),
            pellets = state.maze.pellet_total(),
            "session created"
        );
        Ok(Self {
            config,
            state,
            identity: None,
            submitter: None,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn score(&self) -> u32 {
        self.state.score
    }

    pub fn level(&self) -> u32 {
        self.state.level
    }

    pub fn lives(&self) -> u32 {
        self.state.player.lives
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    pub fn player(&self) -> &Player {
        &self.state.player
    }

    pub fn ghosts(&self) -> &[Ghost] {
        &self.state.ghosts
    }

    pub fn maze(&self) -> &Maze {
        &self.state.maze
    }

    pub fn now_ms(&self) -> u64 {
        self.state.now_ms
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn set_identity(&mut self, identity: Option<String>) {
        self.identity = identity.filter(|name| !name.trim().is_empty());
    }

    pub fn set_score_submitter(&mut self, submitter: Box<dyn ScoreSubmitter + Send>) {
        self.submitter = Some(submitter);
    }

    /// Direction held by the input collaborator; read once per tick.
    pub fn set_input(&mut self, dir: Direction) {
        self.state.input = dir;
    }

    pub fn pause(&mut self) {
        if self.state.paused || self.state.phase == SessionPhase::Quit {
            return;
        }
        self.state.paused = true;
        if self.state.phase == SessionPhase::Playing {
            self.state.timers.freeze(self.state.now_ms);
        }
        debug!(now_ms = self.state.now_ms, "session paused");
    }

    pub fn resume(&mut self) {
        if !self.state.paused || self.state.phase == SessionPhase::Quit {
            return;
        }
        self.state.paused = false;
        if self.state.phase == SessionPhase::Playing {
            self.state.timers.thaw(self.state.now_ms);
        }
        debug!(now_ms = self.state.now_ms, "session resumed");
    }

    pub fn toggle_pause(&mut self) {
        if self.state.paused {
            self.resume();
        } else {
            self.pause();
        }
    }

    /// Advances the simulation by one tick of `dt_ms`. Does nothing while
    /// paused, after game over or after quit.
    pub fn step(&mut self, dt_ms: u64) {
        if self.state.paused {
            return;
        }
        let phase = self.state.phase;
        if matches!(phase, SessionPhase::GameOver | SessionPhase::Quit) {
            return;
        }
        self.state.tick += 1;
        self.state.now_ms = self.state.now_ms.saturating_add(dt_ms);

        match phase {
            SessionPhase::Playing => self.state.play_tick(&self.config),
            SessionPhase::Dying { frames_left } => {
                if frames_left > 1 {
                    self.state.phase = SessionPhase::Dying {
                        frames_left: frames_left - 1,
                    };
                } else if self.state.finish_death(&self.config) {
                    self.finish_game();
                }
            }
            SessionPhase::LevellingUp { frames_left } => {
                if frames_left > 1 {
                    self.state.phase = SessionPhase::LevellingUp {
                        frames_left: frames_left - 1,
                    };
                } else {
                    self.state.finish_level_up(&self.config);
                }
            }
            SessionPhase::GameOver | SessionPhase::Quit => {}
        }
    }

    fn finish_game(&mut self) {
        let final_score = self.state.score;
        let final_level = self.state.level;
        info!(final_score, final_level, "game over");
        self.state.push_event(GameEvent::GameOver {
            final_score,
            final_level,
        });

        let Some(identity) = self.identity.clone() else {
            return;
        };
        let Some(submitter) = self.submitter.as_mut() else {
            return;
        };
        let submission = ScoreSubmission {
            identity,
            final_score,
            final_level,
        };
        if let Err(err) = submitter.submit(&submission) {
            warn!(identity = %submission.identity, error = %err, "score submission failed");
            self.state.push_event(GameEvent::ScoreSubmissionFailed {
                message: err.to_string(),
            });
        }
    }

    /// Starts a fresh game after game over. Ignored in any other phase.
    pub fn play_again(&mut self) {
        if self.state.phase != SessionPhase::GameOver {
            return;
        }
        let config = &self.config;
        let state = &mut self.state;
        state.score = 0;
        state.level = 1;
        state.player.lives = config.starting_extra_lives;
        state.maze.rearm_pickups();
        state.timers.fright.set_level(1);
        state.spawn_ghosts(config, config.initial_ghost_count);
        state.paused = false;
        state.input = Direction::None;
        state.reset_round(config);
        info!("new game started");
    }

    pub fn quit(&mut self) {
        self.state.phase = SessionPhase::Quit;
        self.state.paused = false;
        self.state.timers.freeze(self.state.now_ms);
    }

    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.state.events)
    }

    pub fn maze_init(&self) -> MazeInit {
        self.state.maze.to_maze_init()
    }

    pub fn cycle_mode(&self) -> CycleMode {
        self.state.timers.mode.mode()
    }

    pub fn build_snapshot(&mut self, include_events: bool) -> Snapshot {
        let now_ms = self.state.now_ms;
        let state = &self.state;
        let snapshot = Snapshot {
            tick: state.tick,
            now_ms,
            phase: state.phase,
            paused: state.paused,
            score: state.score,
            level: state.level,
            mode: state.timers.mode.mode(),
            mode_remaining_ms: state.timers.mode.countdown().remaining_at(now_ms),
            fright_remaining_ms: state.timers.fright.countdown().remaining_at(now_ms),
            player: state.player.to_view(),
            ghosts: state.ghosts.iter().map(Ghost::to_view).collect(),
            pickups: state.maze.pickup_views(),
            events: Vec::new(),
        };
        if include_events {
            return Snapshot {
                events: self.drain_events(),
                ..snapshot
            };
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{corridor_session, session_with};
    use super::*;
    use crate::score_board::SubmitError;
    use crate::types::{GhostMode, SpeedTier};

    #[test]
    fn default_session_starts_in_scatter_with_three_ghosts() {
        let mut session = Session::new(SessionConfig::default()).expect("default session");
        assert_eq!(session.ghosts().len(), 3);
        assert_eq!(session.cycle_mode(), CycleMode::Scatter);
        assert_eq!(session.lives(), 2);
        let snapshot = session.build_snapshot(true);
        assert_eq!(snapshot.pickups.len(), 136);
        assert!(snapshot.ghosts.iter().all(|g| g.mode == GhostMode::Scatter));
    }

    #[test]
    fn mode_changes_after_first_scatter_phase() {
        let mut session = session_with(3, |_| {});
        while session.now_ms() < 7_000 {
            session.step(16);
        }
        let events = session.drain_events();
        assert!(events.contains(&GameEvent::ModeChanged {
            mode: CycleMode::Chase
        }));
        assert_eq!(session.cycle_mode(), CycleMode::Chase);
        assert!(session
            .ghosts()
            .iter()
            .filter(|ghost| ghost.is_dangerous())
            .all(|ghost| ghost.mode() == GhostMode::Chase));
    }

    #[test]
    fn pause_preserves_mode_timer_and_freezes_clock() {
        let mut session = session_with(3, |_| {});
        for _ in 0..50 {
            session.step(16);
        }
        let before = session.build_snapshot(false).mode_remaining_ms;
        session.pause();
        session.pause();
        for _ in 0..500 {
            session.step(16);
        }
        assert_eq!(session.now_ms(), 800);
        session.resume();
        session.resume();
        assert_eq!(session.build_snapshot(false).mode_remaining_ms, before);
        session.toggle_pause();
        assert!(session.is_paused());
        session.toggle_pause();
        assert!(!session.is_paused());
    }

    #[test]
    fn combo_doubles_and_resets_per_power_up() {
        let mut session = session_with(3, |_| {});
        let state = &mut session.state;
        state.begin_power_up();
        let mut awards = Vec::new();
        for index in 0..3 {
            awards.push(state.capture_ghost(index));
        }
        assert_eq!(awards, vec![200, 400, 800]);
        for index in 0..3 {
            state.ghosts[index].end_retreat();
        }
        state.begin_power_up();
        assert_eq!(state.capture_ghost(0), 200);
        assert_eq!(state.score, 1_600);
    }

    #[test]
    fn scared_and_retreating_never_overlap() {
        let mut session = session_with(2, |_| {});
        let state = &mut session.state;
        state.begin_power_up();
        state.capture_ghost(0);
        state.begin_power_up();
        assert!(!state.ghosts[0].is_scared());
        assert!(state.ghosts[0].is_retreating());
        assert_eq!(state.ghosts[0].speed_tier(), SpeedTier::Retreating);
        assert!(state.ghosts[1].is_scared());
        assert_eq!(state.ghosts[1].speed, state.ghosts[1].expected_speed());
    }

    #[test]
    fn fright_expiry_restores_ghosts() {
        let mut session = session_with(2, |_| {});
        session.state.begin_power_up();
        for _ in 0..((6_000 / 16) + 2) {
            session.step(16);
        }
        assert!(session.ghosts().iter().all(|ghost| !ghost.is_scared()));
        assert!(session
            .ghosts()
            .iter()
            .all(|ghost| ghost.speed == ghost.expected_speed()));
        assert!(session.state.timers.mode.countdown().is_running());
    }

    struct FailingSubmitter;

    impl ScoreSubmitter for FailingSubmitter {
        fn submit(&mut self, _submission: &ScoreSubmission) -> Result<(), SubmitError> {
            Err(SubmitError::Unavailable("score service down".to_string()))
        }
    }

    #[test]
    fn failed_submission_is_reported_not_fatal() {
        let mut session = corridor_session(0);
        session.set_identity(Some("ada".to_string()));
        session.set_score_submitter(Box::new(FailingSubmitter));
        for _ in 0..200 {
            session.step(16);
        }
        assert_eq!(session.phase(), SessionPhase::GameOver);
        let events = session.drain_events();
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::ScoreSubmissionFailed { .. })));
        session.play_again();
        assert_eq!(session.phase(), SessionPhase::Playing);
        assert_eq!(session.lives(), 0);
        assert_eq!(session.score(), 0);
    }

    #[test]
    fn quit_stops_everything() {
        let mut session = Session::new(SessionConfig::default()).expect("default session");
        session.quit();
        session.step(16);
        session.pause();
        assert_eq!(session.phase(), SessionPhase::Quit);
        assert_eq!(session.now_ms(), 0);
        assert!(!session.is_paused());
    }
}
