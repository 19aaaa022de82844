use crate::constants::MOUTH_TOGGLE_FRAMES;
use crate::maze::Maze;
use crate::targeting::DirectionSet;
use crate::types::{Direction, GhostMode, GhostRole, GhostView, PlayerView, SpeedTier, Vec2};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GhostId(pub usize);

#[derive(Clone, Debug)]
pub struct Player {
    pub position: Vec2,
    pub velocity: Vec2,
    pub speed: f32,
    pub facing: Direction,
    pub lives: u32,
    pub is_eating: bool,
    pub is_shrinking: bool,
    pub is_levelling_up: bool,
    mouth_open: bool,
    mouth_frames: u8,
    spawn: Vec2,
}

impl Player {
    pub fn new(spawn: Vec2, speed: f32, lives: u32) -> Self {
        Self {
            position: spawn,
            velocity: Vec2::ZERO,
            speed,
            facing: Direction::Left,
            lives,
            is_eating: false,
            is_shrinking: false,
            is_levelling_up: false,
            mouth_open: true,
            mouth_frames: 0,
            spawn,
        }
    }

    pub fn spawn(&self) -> Vec2 {
        self.spawn
    }

    pub fn mouth_open(&self) -> bool {
        self.mouth_open
    }

    pub fn is_moving(&self) -> bool {
        !self.velocity.is_zero()
    }

    /// Applies the held direction when it is legal here, then drops any
    /// velocity component that would hit a wall.
    pub fn steer(&mut self, maze: &Maze, input: Direction) {
        if input != Direction::None && maze.can_travel(self.position, input, self.speed) {
            self.velocity = input.unit().scale(self.speed);
            self.facing = input;
        }
        self.velocity = maze.resolve_velocity(self.position, self.velocity);
    }

    pub fn update(&mut self) {
        if self.velocity.is_zero() {
            return;
        }
        self.position = self.position + self.velocity;
        self.mouth_frames += 1;
        if self.mouth_frames >= MOUTH_TOGGLE_FRAMES {
            self.mouth_frames = 0;
            self.mouth_open = !self.mouth_open;
        }
    }

    /// Back to spawn. Lives and score are untouched.
    pub fn reset(&mut self) {
        self.position = self.spawn;
        self.velocity = Vec2::ZERO;
        self.facing = Direction::Left;
        self.is_eating = false;
        self.is_shrinking = false;
        self.is_levelling_up = false;
        self.mouth_open = true;
        self.mouth_frames = 0;
    }

    pub fn to_view(&self) -> PlayerView {
        PlayerView {
            x: self.position.x,
            y: self.position.y,
            facing: self.facing,
            moving: self.is_moving(),
            mouth_open: self.mouth_open,
            is_eating: self.is_eating,
            is_shrinking: self.is_shrinking,
            is_levelling_up: self.is_levelling_up,
            lives: self.lives,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Ghost {
    pub position: Vec2,
    pub velocity: Vec2,
    pub speed: f32,
    pub facing: Direction,
    pub last_options: DirectionSet,
    id: GhostId,
    role: GhostRole,
    spawn: Vec2,
    base_speed: f32,
    tile_size: f32,
    scared: bool,
    retreating: bool,
    chasing: bool,
    released: bool,
    release_ticks: u32,
}

impl Ghost {
    pub fn new(id: GhostId, role: GhostRole, spawn: Vec2, base_speed: f32, tile_size: f32) -> Self {
        Self {
            position: spawn,
            velocity: Vec2::ZERO,
            speed: base_speed,
            facing: Direction::None,
            last_options: DirectionSet::EMPTY,
            id,
            role,
            spawn,
            base_speed,
            tile_size,
            scared: false,
            retreating: false,
            chasing: false,
            released: false,
            release_ticks: 0,
        }
    }

    pub fn id(&self) -> GhostId {
        self.id
    }

    pub fn role(&self) -> GhostRole {
        self.role
    }

    pub fn spawn(&self) -> Vec2 {
        self.spawn
    }

    pub fn is_scared(&self) -> bool {
        self.scared
    }

    pub fn is_retreating(&self) -> bool {
        self.retreating
    }

    /// Chasing only counts while the ghost is in its normal state.
    pub fn is_chasing(&self) -> bool {
        self.chasing && !self.scared && !self.retreating
    }

    pub fn set_chasing(&mut self, chasing: bool) {
        self.chasing = chasing;
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn release_ticks(&self) -> u32 {
        self.release_ticks
    }

    /// Catchable: touching the player kills the player.
    pub fn is_dangerous(&self) -> bool {
        !self.scared && !self.retreating
    }

    pub fn mode(&self) -> GhostMode {
        if self.retreating {
            GhostMode::Retreating
        } else if self.scared {
            GhostMode::Frightened
        } else if self.chasing {
            GhostMode::Chase
        } else {
            GhostMode::Scatter
        }
    }

    pub fn speed_tier(&self) -> SpeedTier {
        if self.retreating {
            SpeedTier::Retreating
        } else if self.scared {
            SpeedTier::Scared
        } else {
            SpeedTier::Normal
        }
    }

    pub fn expected_speed(&self) -> f32 {
        match self.speed_tier() {
            SpeedTier::Scared => self.base_speed / 2.0,
            SpeedTier::Normal => self.base_speed,
            SpeedTier::Retreating => self.base_speed * 2.0,
        }
    }

    /// Rescales velocity and realigns the position when the speed no longer
    /// matches the state flags. Returns whether anything changed.
    pub fn check_speed_matches_state(&mut self) -> bool {
        let expected = self.expected_speed();
        if self.speed == expected {
            return false;
        }
        self.adjust_position(expected);
        let dir = Direction::from_velocity(self.velocity);
        self.velocity = dir.unit().scale(expected);
        self.speed = expected;
        true
    }

    /// Snaps each coordinate onto the lattice `tile/2 + k * new_speed` so
    /// cell centres stay reachable. Moving axes snap backwards, others to
    /// the nearest point.
    pub fn adjust_position(&mut self, new_speed: f32) {
        if new_speed <= 0.0 {
            return;
        }
        let half = self.tile_size / 2.0;
        let snap = |coord: f32, velocity: f32| {
            let steps = (coord - half) / new_speed;
            let steps = if velocity > 0.0 {
                steps.floor()
            } else if velocity < 0.0 {
                steps.ceil()
            } else {
                steps.round()
            };
            half + steps * new_speed
        };
        self.position = Vec2::new(
            snap(self.position.x, self.velocity.x),
            snap(self.position.y, self.velocity.y),
        );
    }

    /// Back to spawn in scatter with movement held for `release_ticks`.
    pub fn reset(&mut self, release_ticks: u32) {
        self.position = self.spawn;
        self.velocity = Vec2::ZERO;
        self.speed = self.base_speed;
        self.facing = Direction::None;
        self.last_options = DirectionSet::EMPTY;
        self.scared = false;
        self.retreating = false;
        self.chasing = false;
        self.release_ticks = release_ticks;
        self.released = release_ticks == 0;
    }

    /// Counts down the hold; returns true on the tick the ghost is released.
    pub fn tick_release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.release_ticks = self.release_ticks.saturating_sub(1);
        if self.release_ticks == 0 {
            self.released = true;
            return true;
        }
        false
    }

    /// Retreating ghosts are immune. Returns whether the ghost became scared.
    pub fn scare(&mut self) -> bool {
        if self.retreating {
            return false;
        }
        self.scared = true;
        self.check_speed_matches_state();
        true
    }

    pub fn unscare(&mut self) {
        if !self.scared {
            return;
        }
        self.scared = false;
        self.check_speed_matches_state();
    }

    pub fn begin_retreat(&mut self) {
        self.scared = false;
        self.retreating = true;
        self.check_speed_matches_state();
    }

    pub fn end_retreat(&mut self) {
        if !self.retreating {
            return;
        }
        self.retreating = false;
        self.check_speed_matches_state();
    }

    pub fn head(&mut self, dir: Direction) {
        self.velocity = dir.unit().scale(self.speed);
        if dir != Direction::None {
            self.facing = dir;
        }
    }

    pub fn update(&mut self) {
        if !self.released {
            return;
        }
        self.position = self.position + self.velocity;
    }

    pub fn to_view(&self) -> GhostView {
        GhostView {
            id: self.id.0,
            role: self.role,
            color: self.role.color(),
            x: self.position.x,
            y: self.position.y,
            facing: self.facing,
            mode: self.mode(),
            scared: self.scared,
            retreating: self.retreating,
            chasing: self.is_chasing(),
            released: self.released,
            speed: self.speed,
            speed_tier: self.speed_tier(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapDefinition;
    use crate::types::GridCell;

    fn ghost_at(x: f32, y: f32) -> Ghost {
        let mut ghost = Ghost::new(GhostId(0), GhostRole::Aggressive, Vec2::new(x, y), 4.0, 32.0);
        ghost.reset(0);
        ghost
    }

    #[test]
    fn speed_tier_follows_flags() {
        let mut ghost = ghost_at(48.0, 48.0);
        ghost.head(Direction::Right);
        assert_eq!(ghost.speed, 4.0);

        assert!(ghost.scare());
        assert_eq!(ghost.speed_tier(), SpeedTier::Scared);
        assert_eq!(ghost.speed, 2.0);
        assert_eq!(ghost.velocity, Vec2::new(2.0, 0.0));

        ghost.begin_retreat();
        assert!(!ghost.is_scared());
        assert_eq!(ghost.speed, 8.0);
        assert!(!ghost.scare());
        assert_eq!(ghost.mode(), GhostMode::Retreating);

        ghost.end_retreat();
        assert_eq!(ghost.speed, 4.0);
        assert_eq!(ghost.mode(), GhostMode::Scatter);
    }

    #[test]
    fn adjust_position_snaps_back_along_travel() {
        let mut ghost = ghost_at(48.0, 48.0);
        ghost.position = Vec2::new(54.0, 48.0);
        ghost.velocity = Vec2::new(2.0, 0.0);
        ghost.adjust_position(8.0);
        assert_eq!(ghost.position, Vec2::new(48.0, 48.0));

        ghost.position = Vec2::new(54.0, 48.0);
        ghost.velocity = Vec2::new(-2.0, 0.0);
        ghost.adjust_position(8.0);
        assert_eq!(ghost.position, Vec2::new(56.0, 48.0));
    }

    #[test]
    fn chasing_is_masked_by_fright() {
        let mut ghost = ghost_at(48.0, 48.0);
        ghost.set_chasing(true);
        assert_eq!(ghost.mode(), GhostMode::Chase);
        ghost.scare();
        assert!(!ghost.is_chasing());
        assert_eq!(ghost.mode(), GhostMode::Frightened);
        ghost.unscare();
        assert!(ghost.is_chasing());
    }

    #[test]
    fn release_counts_down() {
        let mut ghost = ghost_at(48.0, 48.0);
        ghost.reset(2);
        ghost.head(Direction::Right);
        ghost.update();
        assert_eq!(ghost.position, Vec2::new(48.0, 48.0));
        assert!(!ghost.tick_release());
        assert!(ghost.tick_release());
        assert!(ghost.is_released());
        assert!(!ghost.tick_release());
        ghost.update();
        assert_eq!(ghost.position, Vec2::new(52.0, 48.0));
    }

    #[test]
    fn player_steer_respects_walls_and_reset_keeps_lives() {
        let map = MapDefinition {
            rows: vec!["-----".into(), "|...|".into(), "-----".into()],
            player_spawn: GridCell::new(1, 1),
            ghost_spawns: Vec::new(),
        };
        let maze = Maze::build(&map, 32.0).expect("corridor builds");
        let mut player = Player::new(maze.player_spawn(), 4.0, 2);
        player.steer(&maze, Direction::Left);
        assert!(!player.is_moving());
        player.steer(&maze, Direction::Right);
        player.update();
        assert_eq!(player.position, Vec2::new(52.0, 48.0));
        assert_eq!(player.facing, Direction::Right);

        player.lives = 1;
        player.reset();
        assert_eq!(player.position, Vec2::new(48.0, 48.0));
        assert_eq!(player.lives, 1);
        assert!(!player.is_moving());
    }
}
