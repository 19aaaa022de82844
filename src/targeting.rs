use crate::agents::{Ghost, Player};
use crate::constants::{AMBUSH_LEAD_TILES, ERRATIC_SHY_RADIUS_TILES, FLANK_PIVOT_TILES};
use crate::maze::Maze;
use crate::rng::Rng;
use crate::types::{Direction, GhostRole, Vec2};

/// Set of movement directions, iterated in scan order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirectionSet(u8);

impl DirectionSet {
    pub const EMPTY: DirectionSet = DirectionSet(0);

    fn bit(dir: Direction) -> u8 {
        match dir {
            Direction::Down => 1,
            Direction::Right => 2,
            Direction::Left => 4,
            Direction::Up => 8,
            Direction::None => 0,
        }
    }

    pub fn insert(&mut self, dir: Direction) {
        self.0 |= Self::bit(dir);
    }

    pub fn contains(self, dir: Direction) -> bool {
        let bit = Self::bit(dir);
        bit != 0 && self.0 & bit != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = Direction> {
        Direction::SCAN_ORDER
            .into_iter()
            .filter(move |dir| self.contains(*dir))
    }
}

impl FromIterator<Direction> for DirectionSet {
    fn from_iter<I: IntoIterator<Item = Direction>>(iter: I) -> Self {
        let mut set = DirectionSet::EMPTY;
        for dir in iter {
            set.insert(dir);
        }
        set
    }
}

pub fn legal_directions(maze: &Maze, position: Vec2, speed: f32) -> DirectionSet {
    Direction::SCAN_ORDER
        .into_iter()
        .filter(|dir| maze.can_travel(position, *dir, speed))
        .collect()
}

/// Legal directions minus the reversal of `heading`, unless reversing is
/// the only way out.
pub fn candidates(options: DirectionSet, heading: Direction) -> Vec<Direction> {
    let reverse = heading.opposite();
    let forward: Vec<Direction> = options
        .iter()
        .filter(|dir| heading == Direction::None || *dir != reverse)
        .collect();
    if forward.is_empty() {
        return options.iter().collect();
    }
    forward
}

/// Current direction of travel, falling back to facing when stopped.
pub fn heading_of(ghost: &Ghost) -> Direction {
    match Direction::from_velocity(ghost.velocity) {
        Direction::None => ghost.facing,
        dir => dir,
    }
}

/// A ghost re-plans when the legal set changed since last tick, when it is
/// stopped, or when its heading is no longer legal.
pub fn needs_decision(ghost: &Ghost, options: DirectionSet) -> bool {
    if options != ghost.last_options || ghost.velocity.is_zero() {
        return true;
    }
    !options.contains(Direction::from_velocity(ghost.velocity))
}

/// Fixed per-role corners: red top-right, pink top-left, cyan bottom-right,
/// orange bottom-left.
pub fn scatter_corner(role: GhostRole, maze: &Maze) -> Vec2 {
    let (w, h) = (maze.width_px(), maze.height_px());
    match role {
        GhostRole::Aggressive => Vec2::new(w, 0.0),
        GhostRole::Ambusher => Vec2::new(0.0, 0.0),
        GhostRole::Flanker => Vec2::new(w, h),
        GhostRole::Erratic => Vec2::new(0.0, h),
    }
}

pub struct TargetContext<'a> {
    pub maze: &'a Maze,
    pub player: &'a Player,
    /// Position of the aggressive ghost, if one is active.
    pub aggressive: Option<Vec2>,
}

pub fn chase_target(role: GhostRole, ghost_position: Vec2, ctx: &TargetContext<'_>) -> Vec2 {
    let tile = ctx.maze.tile_size();
    let player = ctx.player.position;
    let facing = ctx.player.facing.unit();
    match role {
        GhostRole::Aggressive => player,
        GhostRole::Ambusher => player + facing.scale(AMBUSH_LEAD_TILES * tile),
        GhostRole::Flanker => {
            let pivot = player + facing.scale(FLANK_PIVOT_TILES * tile);
            let anchor = ctx.aggressive.unwrap_or(player);
            pivot + (pivot - anchor)
        }
        GhostRole::Erratic => {
            if ghost_position.distance(player) > ERRATIC_SHY_RADIUS_TILES * tile {
                player
            } else {
                scatter_corner(role, ctx.maze)
            }
        }
    }
}

/// Where the ghost steers toward; `None` means pick at random.
pub fn target_for(ghost: &Ghost, ctx: &TargetContext<'_>) -> Option<Vec2> {
    if ghost.is_retreating() {
        return Some(ghost.spawn());
    }
    if ghost.is_scared() {
        return None;
    }
    if ghost.is_chasing() {
        Some(chase_target(ghost.role(), ghost.position, ctx))
    } else {
        Some(scatter_corner(ghost.role(), ctx.maze))
    }
}

/// Candidate whose one-step projection lands strictly closest to `target`;
/// the earliest candidate keeps ties.
pub fn pick_toward(candidates: &[Direction], position: Vec2, speed: f32, target: Vec2) -> Direction {
    let mut best = Direction::None;
    let mut best_distance = f32::INFINITY;
    for dir in candidates {
        let projected = position + dir.unit().scale(speed);
        let distance = projected.distance(target);
        if distance < best_distance {
            best = *dir;
            best_distance = distance;
        }
    }
    best
}

pub fn choose_direction(
    ghost: &Ghost,
    options: DirectionSet,
    target: Option<Vec2>,
    rng: &mut Rng,
) -> Direction {
    let candidates = candidates(options, heading_of(ghost));
    match target {
        Some(target) => pick_toward(&candidates, ghost.position, ghost.speed, target),
        None => rng.pick(&candidates).unwrap_or(Direction::None),
    }
}
