use crate::agents::{Ghost, GhostId};
use crate::constants::fright_duration_for_level;
use crate::types::CycleMode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
    Paused,
}

/// Deadline timer on the session clock. `remaining_ms` is only rewritten on
/// pause, so a pause/resume pair never loses or gains time.
#[derive(Clone, Debug)]
pub struct Countdown {
    duration_ms: u64,
    remaining_ms: u64,
    started_at_ms: u64,
    state: TimerState,
}

impl Countdown {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            remaining_ms: duration_ms,
            started_at_ms: 0,
            state: TimerState::Idle,
        }
    }

    pub fn start(&mut self, now_ms: u64) {
        self.start_with(now_ms, self.duration_ms);
    }

    pub fn start_with(&mut self, now_ms: u64, duration_ms: u64) {
        self.duration_ms = duration_ms;
        self.remaining_ms = duration_ms;
        self.started_at_ms = now_ms;
        self.state = TimerState::Running;
    }

    pub fn pause(&mut self, now_ms: u64) {
        if self.state != TimerState::Running {
            return;
        }
        let elapsed = now_ms.saturating_sub(self.started_at_ms);
        self.remaining_ms = self.remaining_ms.saturating_sub(elapsed);
        self.state = TimerState::Paused;
    }

    pub fn resume(&mut self, now_ms: u64) {
        if self.state != TimerState::Paused {
            return;
        }
        self.started_at_ms = now_ms;
        self.state = TimerState::Running;
    }

    pub fn reset(&mut self) {
        self.remaining_ms = self.duration_ms;
        self.state = TimerState::Idle;
    }

    pub fn set_duration(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms;
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.state == TimerState::Paused
    }

    pub fn remaining_at(&self, now_ms: u64) -> u64 {
        match self.state {
            TimerState::Running => self
                .remaining_ms
                .saturating_sub(now_ms.saturating_sub(self.started_at_ms)),
            TimerState::Paused => self.remaining_ms,
            TimerState::Idle => 0,
        }
    }

    pub fn deadline(&self) -> Option<u64> {
        (self.state == TimerState::Running).then(|| self.started_at_ms + self.remaining_ms)
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        self.deadline().is_some_and(|deadline| now_ms >= deadline)
    }
}

/// Global scatter/chase alternation. Even phases scatter, odd phases chase.
#[derive(Clone, Debug)]
pub struct ModeCycleTimer {
    countdown: Countdown,
    phase: u32,
    first_phase_ms: u64,
    phase_ms: u64,
    ghosts: Vec<GhostId>,
}

impl ModeCycleTimer {
    pub fn new(first_phase_ms: u64, phase_ms: u64) -> Self {
        Self {
            countdown: Countdown::new(first_phase_ms),
            phase: 0,
            first_phase_ms,
            phase_ms,
            ghosts: Vec::new(),
        }
    }

    fn phase_duration(&self, phase: u32) -> u64 {
        if phase == 0 {
            self.first_phase_ms
        } else {
            self.phase_ms
        }
    }

    pub fn mode(&self) -> CycleMode {
        if self.phase % 2 == 0 {
            CycleMode::Scatter
        } else {
            CycleMode::Chase
        }
    }

    pub fn phase(&self) -> u32 {
        self.phase
    }

    pub fn start(&mut self, now_ms: u64) {
        let duration = self.phase_duration(self.phase);
        self.countdown.start_with(now_ms, duration);
    }

    pub fn pause(&mut self, now_ms: u64) {
        self.countdown.pause(now_ms);
    }

    pub fn resume(&mut self, now_ms: u64) {
        self.countdown.resume(now_ms);
    }

    pub fn reset(&mut self) {
        self.phase = 0;
        self.countdown = Countdown::new(self.first_phase_ms);
    }

    /// Advances through every phase boundary at or before `now_ms`; each
    /// phase starts at the previous deadline. Returns the number of flips.
    pub fn poll(&mut self, now_ms: u64) -> u32 {
        let mut flips = 0;
        while let Some(deadline) = self.countdown.deadline() {
            if now_ms < deadline {
                break;
            }
            self.phase += 1;
            let duration = self.phase_duration(self.phase);
            self.countdown.start_with(deadline, duration);
            flips += 1;
            if duration == 0 {
                break;
            }
        }
        flips
    }

    pub fn track(&mut self, ghost: GhostId) {
        if !self.ghosts.contains(&ghost) {
            self.ghosts.push(ghost);
        }
    }

    pub fn untrack_all(&mut self) {
        self.ghosts.clear();
    }

    pub fn tracked(&self) -> &[GhostId] {
        &self.ghosts
    }

    /// Copies the global mode onto every tracked ghost.
    pub fn apply(&self, ghosts: &mut [Ghost]) {
        let chasing = self.mode() == CycleMode::Chase;
        for ghost in ghosts.iter_mut() {
            if self.ghosts.contains(&ghost.id()) {
                ghost.set_chasing(chasing);
            }
        }
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }
}

#[derive(Clone, Debug)]
pub struct FrightTimer {
    countdown: Countdown,
    base_ms: u64,
    shrink_ms: u64,
}

impl FrightTimer {
    pub fn new(base_ms: u64, shrink_ms: u64) -> Self {
        Self {
            countdown: Countdown::new(base_ms),
            base_ms,
            shrink_ms,
        }
    }

    /// Rescales the duration for `level`; takes effect on the next start.
    pub fn set_level(&mut self, level: u32) {
        self.countdown
            .set_duration(fright_duration_for_level(self.base_ms, self.shrink_ms, level));
    }

    pub fn duration_ms(&self) -> u64 {
        self.countdown.duration_ms()
    }

    /// Starts or restarts the fright window.
    pub fn start(&mut self, now_ms: u64) {
        self.countdown.start(now_ms);
    }

    pub fn pause(&mut self, now_ms: u64) {
        self.countdown.pause(now_ms);
    }

    pub fn resume(&mut self, now_ms: u64) {
        self.countdown.resume(now_ms);
    }

    pub fn reset(&mut self) {
        self.countdown.reset();
    }

    pub fn is_active(&self) -> bool {
        self.countdown.state() != TimerState::Idle
    }

    /// Returns the deadline when the window has closed and goes idle.
    pub fn poll(&mut self, now_ms: u64) -> Option<u64> {
        let deadline = self.countdown.deadline()?;
        if now_ms < deadline {
            return None;
        }
        self.countdown.reset();
        Some(deadline)
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }
}

#[derive(Clone, Debug)]
pub struct RetreatTimer {
    owner: GhostId,
    countdown: Countdown,
}

impl RetreatTimer {
    pub fn new(owner: GhostId, duration_ms: u64) -> Self {
        Self {
            owner,
            countdown: Countdown::new(duration_ms),
        }
    }

    pub fn owner(&self) -> GhostId {
        self.owner
    }

    pub fn start(&mut self, now_ms: u64) {
        self.countdown.start(now_ms);
    }

    pub fn reset(&mut self) {
        self.countdown.reset();
    }

    pub fn poll(&mut self, now_ms: u64) -> bool {
        if self.countdown.is_due(now_ms) {
            self.countdown.reset();
            return true;
        }
        false
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SettledExpiries {
    pub fright_expired: bool,
    pub mode_flips: u32,
    pub retreats_expired: Vec<GhostId>,
}

#[derive(Clone, Debug)]
struct FrozenTimers {
    mode: bool,
    fright: bool,
    retreats: Vec<bool>,
}

/// Every timer the session owns. Retreat timers are indexed by ghost slot.
#[derive(Clone, Debug)]
pub struct TimerBank {
    pub mode: ModeCycleTimer,
    pub fright: FrightTimer,
    pub retreats: Vec<RetreatTimer>,
    frozen: Option<FrozenTimers>,
}

impl TimerBank {
    pub fn new(mode: ModeCycleTimer, fright: FrightTimer) -> Self {
        Self {
            mode,
            fright,
            retreats: Vec::new(),
            frozen: None,
        }
    }

    pub fn add_retreat(&mut self, owner: GhostId, duration_ms: u64) {
        self.retreats.push(RetreatTimer::new(owner, duration_ms));
    }

    pub fn retreat_mut(&mut self, owner: GhostId) -> Option<&mut RetreatTimer> {
        self.retreats.iter_mut().find(|timer| timer.owner() == owner)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    /// Pauses every running timer and remembers which ones were running.
    pub fn freeze(&mut self, now_ms: u64) {
        if self.frozen.is_some() {
            return;
        }
        let frozen = FrozenTimers {
            mode: self.mode.countdown().is_running(),
            fright: self.fright.countdown().is_running(),
            retreats: self
                .retreats
                .iter()
                .map(|timer| timer.countdown().is_running())
                .collect(),
        };
        self.mode.pause(now_ms);
        self.fright.pause(now_ms);
        for timer in &mut self.retreats {
            timer.countdown.pause(now_ms);
        }
        self.frozen = Some(frozen);
    }

    pub fn thaw(&mut self, now_ms: u64) {
        let Some(frozen) = self.frozen.take() else {
            return;
        };
        if frozen.mode {
            self.mode.resume(now_ms);
        }
        if frozen.fright {
            self.fright.resume(now_ms);
        }
        for (timer, was_running) in self.retreats.iter_mut().zip(frozen.retreats) {
            if was_running {
                timer.countdown.resume(now_ms);
            }
        }
    }

    /// Fright suspends the mode cycle until it closes.
    pub fn begin_fright(&mut self, now_ms: u64) {
        self.mode.pause(now_ms);
        self.fright.start(now_ms);
    }

    /// Fires every expiry due at `now_ms`: fright first, then the mode
    /// cycle, then retreats.
    pub fn settle(&mut self, now_ms: u64) -> SettledExpiries {
        let mut out = SettledExpiries::default();
        if let Some(deadline) = self.fright.poll(now_ms) {
            out.fright_expired = true;
            self.mode.resume(deadline);
        }
        out.mode_flips = self.mode.poll(now_ms);
        for timer in &mut self.retreats {
            if timer.poll(now_ms) {
                out.retreats_expired.push(timer.owner());
            }
        }
        out
    }

    /// Back to a fresh scatter phase starting at `now_ms`.
    pub fn restart(&mut self, now_ms: u64) {
        self.frozen = None;
        self.fright.reset();
        for timer in &mut self.retreats {
            timer.reset();
        }
        self.mode.reset();
        self.mode.start(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> TimerBank {
        let mut bank = TimerBank::new(ModeCycleTimer::new(7_000, 20_000), FrightTimer::new(6_000, 500));
        bank.add_retreat(GhostId(0), 3_000);
        bank.add_retreat(GhostId(1), 3_000);
        bank
    }

    #[test]
    fn pause_resume_preserves_remaining_exactly() {
        let mut timer = Countdown::new(5_000);
        timer.start(1_000);
        let mut now = 1_000;
        for (run, idle) in [(700, 300), (16, 10_000), (1, 1), (2_000, 50)] {
            now += run;
            let before = timer.remaining_at(now);
            timer.pause(now);
            timer.pause(now + 5);
            now += idle;
            assert_eq!(timer.remaining_at(now), before);
            timer.resume(now);
            timer.resume(now + 3);
            assert_eq!(timer.remaining_at(now), before);
        }
        assert_eq!(timer.remaining_at(now), 5_000 - 700 - 16 - 1 - 2_000);
    }

    #[test]
    fn remaining_never_goes_negative() {
        let mut timer = Countdown::new(100);
        timer.start(0);
        timer.pause(500);
        assert_eq!(timer.remaining_at(500), 0);
        timer.resume(600);
        assert!(timer.is_due(600));
    }

    #[test]
    fn mode_cycle_runs_short_scatter_then_long_phases() {
        let mut mode = ModeCycleTimer::new(7_000, 20_000);
        mode.start(0);
        assert_eq!(mode.mode(), CycleMode::Scatter);
        assert_eq!(mode.poll(6_999), 0);
        assert_eq!(mode.poll(7_005), 1);
        assert_eq!(mode.mode(), CycleMode::Chase);
        // next boundary is anchored at 7000, not at the late poll
        assert_eq!(mode.countdown().remaining_at(7_005), 19_995);
        assert_eq!(mode.poll(47_000), 2);
        assert_eq!(mode.mode(), CycleMode::Chase);
        assert_eq!(mode.phase(), 3);
    }

    #[test]
    fn mode_reset_returns_to_first_phase() {
        let mut mode = ModeCycleTimer::new(7_000, 20_000);
        mode.start(0);
        mode.poll(30_000);
        mode.reset();
        assert_eq!(mode.phase(), 0);
        assert_eq!(mode.countdown().state(), TimerState::Idle);
        mode.start(30_000);
        assert_eq!(mode.countdown().remaining_at(30_000), 7_000);
    }

    #[test]
    fn fright_suspends_mode_and_resumes_at_its_deadline() {
        let mut bank = bank();
        bank.restart(0);
        bank.begin_fright(2_000);
        assert!(bank.mode.countdown().is_paused());
        let settled = bank.settle(8_010);
        assert!(settled.fright_expired);
        assert_eq!(settled.mode_flips, 0);
        assert!(bank.mode.countdown().is_running());
        // 5000 left at the pause, resumed at 8000
        assert_eq!(bank.mode.countdown().remaining_at(8_010), 4_990);
    }

    #[test]
    fn fright_shrinks_with_level() {
        let mut fright = FrightTimer::new(6_000, 500);
        fright.set_level(2);
        assert_eq!(fright.duration_ms(), 5_500);
        fright.set_level(30);
        assert_eq!(fright.duration_ms(), 0);
        fright.set_level(1);
        assert_eq!(fright.duration_ms(), 6_000);
    }

    #[test]
    fn freeze_thaw_resumes_only_running_timers() {
        let mut bank = bank();
        bank.restart(0);
        bank.begin_fright(1_000);
        if let Some(timer) = bank.retreat_mut(GhostId(1)) {
            timer.start(1_500);
        }
        bank.freeze(2_000);
        bank.freeze(2_500);
        assert!(bank.is_frozen());
        bank.thaw(10_000);
        assert!(bank.mode.countdown().is_paused());
        assert!(bank.fright.countdown().is_running());
        assert_eq!(bank.fright.countdown().remaining_at(10_000), 5_000);
        assert_eq!(bank.retreats[0].countdown().state(), TimerState::Idle);
        assert_eq!(bank.retreats[1].countdown().remaining_at(10_000), 2_500);
    }

    #[test]
    fn settle_reports_retreat_owners() {
        let mut bank = bank();
        bank.restart(0);
        if let Some(timer) = bank.retreat_mut(GhostId(0)) {
            timer.start(100);
        }
        assert!(bank.settle(3_099).retreats_expired.is_empty());
        assert_eq!(bank.settle(3_100).retreats_expired, vec![GhostId(0)]);
        assert!(bank.settle(9_000).retreats_expired.is_empty());
    }
}
