use super::*;
use crate::constants::{AGENT_HITBOX_RATIO, GHOST_CAPTURE_BASE_SCORE, PELLET_SCORE};
use crate::types::{PickupKind, Vec2};

impl SessionState {
    /// Eats whatever sits in the player's cell. Returns true when the last
    /// pellet went and the level-up sequence took over the tick.
    pub(super) fn consume_pickups(&mut self, config: &SessionConfig) -> bool {
        let cell = self.maze.cell_of(self.player.position);
        self.player.is_eating = false;
        match self.maze.consume_at(cell) {
            Some(PickupKind::Pellet) => {
                self.player.is_eating = true;
                self.score = self.score.saturating_add(PELLET_SCORE);
                self.push_event(GameEvent::PelletEaten {
                    score_delta: PELLET_SCORE,
                });
                if self.maze.pellets_left() == 0 {
                    self.begin_level_up(config);
                    return true;
                }
            }
            Some(PickupKind::PowerUp) => self.begin_power_up(),
            None => {}
        }
        false
    }

    /// Restarts the fright window and scares every ghost not retreating.
    pub(super) fn begin_power_up(&mut self) {
        self.combo = 0;
        self.push_event(GameEvent::PowerUpEaten);
        if self.timers.fright.duration_ms() == 0 {
            return;
        }
        self.timers.begin_fright(self.now_ms);
        let mut scared = 0;
        for ghost in &mut self.ghosts {
            if ghost.scare() {
                scared += 1;
            }
        }
        if scared > 0 {
            self.push_event(GameEvent::GhostScared);
        }
    }

    /// Awards the combo score and sends the ghost home. Returns the award.
    pub(super) fn capture_ghost(&mut self, index: usize) -> u32 {
        let multiplier = 1u32.checked_shl(self.combo).unwrap_or(u32::MAX);
        let award = GHOST_CAPTURE_BASE_SCORE.saturating_mul(multiplier);
        self.combo = self.combo.saturating_add(1);
        self.score = self.score.saturating_add(award);

        let now_ms = self.now_ms;
        let ghost = &mut self.ghosts[index];
        ghost.begin_retreat();
        let (id, role) = (ghost.id(), ghost.role());
        if let Some(timer) = self.timers.retreat_mut(id) {
            timer.start(now_ms);
        }
        let retreating = self.ghosts.iter().filter(|g| g.is_retreating()).count();
        self.push_event(GameEvent::GhostCaptured {
            role,
            score_delta: award,
        });
        self.push_event(GameEvent::GhostRetreating { count: retreating });
        award
    }

    fn overlaps_player(&self, position: Vec2, tile_size: f32) -> bool {
        let reach = 2.0 * AGENT_HITBOX_RATIO * tile_size;
        let delta = position - self.player.position;
        delta.x.abs() < reach && delta.y.abs() < reach
    }

    /// Returns true when a normal ghost caught the player.
    pub(super) fn resolve_ghost_collisions(&mut self, config: &SessionConfig) -> bool {
        for index in 0..self.ghosts.len() {
            let ghost = &self.ghosts[index];
            if ghost.is_retreating() || !self.overlaps_player(ghost.position, config.tile_size) {
                continue;
            }
            if ghost.is_scared() {
                self.capture_ghost(index);
                continue;
            }
            self.begin_death(config);
            return true;
        }
        false
    }

    pub(super) fn begin_death(&mut self, config: &SessionConfig) {
        self.player.is_shrinking = true;
        self.player.velocity = Vec2::ZERO;
        self.timers.freeze(self.now_ms);
        self.phase = SessionPhase::Dying {
            frames_left: config.death_animation_frames,
        };
        info!(lives = self.player.lives, score = self.score, "player caught");
    }

    /// Ends the death animation. Returns true when it was the last life.
    pub(super) fn finish_death(&mut self, config: &SessionConfig) -> bool {
        if self.player.lives == 0 {
            self.maze.rearm_pickups();
            self.reset_round(config);
            self.phase = SessionPhase::GameOver;
            return true;
        }
        self.player.lives -= 1;
        self.push_event(GameEvent::PlayerDied {
            lives_remaining: self.player.lives,
        });
        self.reset_round(config);
        false
    }

    pub(super) fn begin_level_up(&mut self, config: &SessionConfig) {
        self.player.is_levelling_up = true;
        self.player.velocity = Vec2::ZERO;
        self.timers.freeze(self.now_ms);
        self.phase = SessionPhase::LevellingUp {
            frames_left: config.level_up_animation_frames,
        };
        info!(level = self.level, score = self.score, "maze cleared");
    }

    pub(super) fn finish_level_up(&mut self, config: &SessionConfig) {
        self.level = self.level.saturating_add(1);
        self.maze.rearm_pickups();
        self.timers.fright.set_level(self.level);
        if self.level == config.extra_ghost_level && self.add_ghost(config) {
            debug!(ghosts = self.ghosts.len(), "ghost added");
        }
        self.reset_round(config);
        self.push_event(GameEvent::LevelUp {
            new_level: self.level,
        });
        info!(level = self.level, fright_ms = self.timers.fright.duration_ms(), "level up");
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{corridor_session, session_from_rows};
    use crate::types::{Direction, GameEvent, SessionPhase};

    #[test]
    fn touching_a_normal_ghost_starts_the_death_animation() {
        let mut session = corridor_session(2);
        let mut ticks = 0;
        while !matches!(session.phase(), SessionPhase::Dying { .. }) && ticks < 20 {
            session.step(16);
            ticks += 1;
        }
        assert!(session.player().is_shrinking);
        let frozen_pos = session.player().position;
        session.set_input(Direction::Left);
        session.step(16);
        assert_eq!(session.player().position, frozen_pos);

        for _ in 0..session.config().death_animation_frames {
            session.step(16);
        }
        assert_eq!(session.phase(), SessionPhase::Playing);
        assert_eq!(session.lives(), 1);
        assert!(!session.player().is_shrinking);
        assert!(session
            .drain_events()
            .contains(&GameEvent::PlayerDied { lives_remaining: 1 }));
    }

    #[test]
    fn power_up_lets_the_player_eat_a_ghost() {
        let mut session = session_from_rows(
            &["-------", "|o . .|", "-------"],
            (1, 1),
            &[(3, 1)],
            |config| {
                config.release_delay_min_ms = 60_000;
                config.release_delay_max_ms = 60_000;
            },
        );
        session.set_input(Direction::Right);
        for _ in 0..20 {
            session.step(16);
        }
        let events = session.drain_events();
        assert!(events.contains(&GameEvent::PowerUpEaten));
        assert!(events.contains(&GameEvent::GhostScared));
        assert!(events.iter().any(|event| matches!(
            event,
            GameEvent::GhostCaptured {
                score_delta: 200,
                ..
            }
        )));
        assert!(events.contains(&GameEvent::GhostRetreating { count: 1 }));
        assert!(session.ghosts()[0].is_retreating());
        assert_eq!(session.phase(), SessionPhase::Playing);
    }

    #[test]
    fn fright_shrinks_and_fourth_ghost_joins_on_level_two() {
        let mut session = session_from_rows(
            &["--------", "|.     |", "--------"],
            (1, 1),
            &[(4, 1), (5, 1), (6, 1), (3, 1)],
            |config| {
                config.initial_ghost_count = 3;
                config.release_delay_min_ms = 60_000;
                config.release_delay_max_ms = 60_000;
                config.level_up_animation_frames = 2;
            },
        );
        session.step(16);
        assert!(matches!(session.phase(), SessionPhase::LevellingUp { .. }));
        session.step(16);
        session.step(16);
        assert_eq!(session.level(), 2);
        assert_eq!(session.ghosts().len(), 4);
        assert_eq!(session.state().timers.fright.duration_ms(), 5_500);
        assert!(session
            .drain_events()
            .contains(&GameEvent::LevelUp { new_level: 2 }));
    }
}
