use super::*;
use crate::targeting::{choose_direction, legal_directions, needs_decision, target_for, TargetContext};
use crate::types::Vec2;

impl SessionState {
    /// Applies input, drops blocked velocity components, warps agents that
    /// crossed a tunnel mouth and catches any stale ghost speed.
    pub(super) fn resolve_walls(&mut self) {
        self.player.steer(&self.maze, self.input);
        if let Some(wrapped) = self.maze.wrap_tunnel(self.player.position) {
            self.player.position = wrapped;
        }

        for ghost in &mut self.ghosts {
            if ghost.check_speed_matches_state() {
                debug!(ghost = ghost.id().0, speed = ghost.speed, "ghost speed realigned");
            }
            if let Some(wrapped) = self.maze.wrap_tunnel(ghost.position) {
                ghost.position = wrapped;
            }
            ghost.velocity = self.maze.resolve_velocity(ghost.position, ghost.velocity);
        }
    }

    fn aggressive_position(&self) -> Option<Vec2> {
        self.ghosts
            .iter()
            .find(|ghost| ghost.role() == GhostRole::Aggressive)
            .map(|ghost| ghost.position)
    }

    /// Picks a new heading for every released ghost at a decision point.
    pub(super) fn steer_ghosts(&mut self) {
        let aggressive = self.aggressive_position();
        for index in 0..self.ghosts.len() {
            let ghost = &self.ghosts[index];
            if !ghost.is_released() {
                continue;
            }
            let options = legal_directions(&self.maze, ghost.position, ghost.speed);
            if !needs_decision(ghost, options) {
                continue;
            }
            let ctx = TargetContext {
                maze: &self.maze,
                player: &self.player,
                aggressive,
            };
            let target = target_for(ghost, &ctx);
            let dir = choose_direction(ghost, options, target, &mut self.rng);

            let ghost = &mut self.ghosts[index];
            ghost.head(dir);
            ghost.last_options = options;
        }
    }

    pub(super) fn integrate(&mut self) {
        self.player.update();
        for ghost in &mut self.ghosts {
            ghost.update();
        }
    }
}
