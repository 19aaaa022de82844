use super::*;

impl SessionState {
    /// Applies every timer expiry due at the current clock before the tick
    /// runs, so no phase sees a half-applied transition.
    pub(super) fn settle_timers(&mut self) {
        let settled = self.timers.settle(self.now_ms);

        if settled.fright_expired {
            for ghost in &mut self.ghosts {
                ghost.unscare();
            }
            debug!(now_ms = self.now_ms, "fright over");
        }

        if settled.mode_flips > 0 {
            self.timers.mode.apply(&mut self.ghosts);
            let mode = self.timers.mode.mode();
            debug!(?mode, phase = self.timers.mode.phase(), "mode changed");
            self.push_event(GameEvent::ModeChanged { mode });
        }

        for id in settled.retreats_expired {
            if let Some(ghost) = self.ghosts.get_mut(id.0) {
                ghost.end_retreat();
            }
        }
    }

    pub(super) fn release_ghosts(&mut self) {
        for ghost in &mut self.ghosts {
            if ghost.tick_release() {
                debug!(ghost = ghost.id().0, role = ?ghost.role(), "ghost released");
            }
        }
    }
}
