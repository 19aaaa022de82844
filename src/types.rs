use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    None,
}

impl Direction {
    /// Order in which legal directions are discovered; ties resolve to the
    /// earliest entry.
    pub const SCAN_ORDER: [Direction; 4] = [
        Direction::Down,
        Direction::Right,
        Direction::Left,
        Direction::Up,
    ];

    pub fn parse_move(value: &str) -> Option<Self> {
        match value {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    pub fn unit(self) -> Vec2 {
        match self {
            Direction::Up => Vec2::new(0.0, -1.0),
            Direction::Down => Vec2::new(0.0, 1.0),
            Direction::Left => Vec2::new(-1.0, 0.0),
            Direction::Right => Vec2::new(1.0, 0.0),
            Direction::None => Vec2::ZERO,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::None => Direction::None,
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::Left | Direction::Right)
    }

    pub fn is_vertical(self) -> bool {
        matches!(self, Direction::Up | Direction::Down)
    }

    /// Dominant axis of a velocity, `None` when it is zero.
    pub fn from_velocity(velocity: Vec2) -> Self {
        if velocity.x == 0.0 && velocity.y == 0.0 {
            return Direction::None;
        }
        if velocity.x.abs() >= velocity.y.abs() {
            if velocity.x > 0.0 {
                Direction::Right
            } else {
                Direction::Left
            }
        } else if velocity.y > 0.0 {
            Direction::Down
        } else {
            Direction::Up
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn scale(self, factor: f32) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    pub fn distance(self, other: Vec2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCell {
    pub col: i32,
    pub row: i32,
}

impl GridCell {
    pub const fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }
}

/// Fixed ghost role table. Activation order follows declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GhostRole {
    /// Red: heads straight for the player.
    Aggressive,
    /// Pink: aims ahead of the player.
    Ambusher,
    /// Cyan: mirrors the aggressive ghost around a point ahead of the player.
    Flanker,
    /// Orange: chases from afar, backs off to its corner when close.
    Erratic,
}

impl GhostRole {
    pub const ALL: [GhostRole; 4] = [
        GhostRole::Aggressive,
        GhostRole::Ambusher,
        GhostRole::Flanker,
        GhostRole::Erratic,
    ];

    pub fn color(self) -> &'static str {
        match self {
            GhostRole::Aggressive => "red",
            GhostRole::Ambusher => "pink",
            GhostRole::Flanker => "cyan",
            GhostRole::Erratic => "orange",
        }
    }
}

/// Global alternation driven by the mode cycle timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleMode {
    Scatter,
    Chase,
}

/// Per-ghost behaviour as seen by a renderer. Derived from the ghost's flags,
/// so frightened and chase can never be reported together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GhostMode {
    Scatter,
    Chase,
    Frightened,
    Retreating,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedTier {
    Scared,
    Normal,
    Retreating,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionPhase {
    Playing,
    Dying {
        #[serde(rename = "framesLeft")]
        frames_left: u32,
    },
    LevellingUp {
        #[serde(rename = "framesLeft")]
        frames_left: u32,
    },
    GameOver,
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PickupKind {
    Pellet,
    PowerUp,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    ModeChanged {
        mode: CycleMode,
    },
    GhostScared,
    GhostRetreating {
        count: usize,
    },
    PelletEaten {
        #[serde(rename = "scoreDelta")]
        score_delta: u32,
    },
    PowerUpEaten,
    GhostCaptured {
        role: GhostRole,
        #[serde(rename = "scoreDelta")]
        score_delta: u32,
    },
    PlayerDied {
        #[serde(rename = "livesRemaining")]
        lives_remaining: u32,
    },
    LevelUp {
        #[serde(rename = "newLevel")]
        new_level: u32,
    },
    GameOver {
        #[serde(rename = "finalScore")]
        final_score: u32,
        #[serde(rename = "finalLevel")]
        final_level: u32,
    },
    ScoreSubmissionFailed {
        message: String,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct PlayerView {
    pub x: f32,
    pub y: f32,
    pub facing: Direction,
    pub moving: bool,
    #[serde(rename = "mouthOpen")]
    pub mouth_open: bool,
    #[serde(rename = "isEating")]
    pub is_eating: bool,
    #[serde(rename = "isShrinking")]
    pub is_shrinking: bool,
    #[serde(rename = "isLevellingUp")]
    pub is_levelling_up: bool,
    pub lives: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct GhostView {
    pub id: usize,
    pub role: GhostRole,
    pub color: &'static str,
    pub x: f32,
    pub y: f32,
    pub facing: Direction,
    pub mode: GhostMode,
    pub scared: bool,
    pub retreating: bool,
    pub chasing: bool,
    pub released: bool,
    pub speed: f32,
    #[serde(rename = "speedTier")]
    pub speed_tier: SpeedTier,
}

#[derive(Clone, Debug, Serialize)]
pub struct PickupView {
    pub col: i32,
    pub row: i32,
    pub kind: PickupKind,
}

#[derive(Clone, Debug, Serialize)]
pub struct MazeInit {
    pub cols: i32,
    pub rows: i32,
    #[serde(rename = "tileSize")]
    pub tile_size: f32,
    pub symbols: Vec<String>,
    #[serde(rename = "tunnelRow")]
    pub tunnel_row: Option<i32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    #[serde(rename = "nowMs")]
    pub now_ms: u64,
    pub phase: SessionPhase,
    pub paused: bool,
    pub score: u32,
    pub level: u32,
    pub mode: CycleMode,
    #[serde(rename = "modeRemainingMs")]
    pub mode_remaining_ms: u64,
    #[serde(rename = "frightRemainingMs")]
    pub fright_remaining_ms: u64,
    pub player: PlayerView,
    pub ghosts: Vec<GhostView>,
    pub pickups: Vec<PickupView>,
    pub events: Vec<GameEvent>,
}

/// What the score-submission collaborator receives at game over.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScoreSubmission {
    pub identity: String,
    #[serde(rename = "finalScore")]
    pub final_score: u32,
    #[serde(rename = "finalLevel")]
    pub final_level: u32,
}
