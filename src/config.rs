use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEATH_ANIMATION_FRAMES, EXTRA_GHOST_LEVEL, FRIGHT_DURATION_MS, FRIGHT_SHRINK_PER_LEVEL_MS,
    INITIAL_GHOST_COUNT, LEVEL_UP_ANIMATION_FRAMES, MAX_GHOST_COUNT, MODE_FIRST_PHASE_MS,
    MODE_PHASE_MS, RELEASE_DELAY_MAX_MS, RELEASE_DELAY_MIN_MS, RETREAT_DURATION_MS,
    STARTING_EXTRA_LIVES, TICK_MS, TILE_SIZE, TILE_SIZE_QUANTUM,
};
use crate::maze::{Maze, MazeError};
use crate::types::GridCell;

const DEFAULT_ROWS: [&str; 15] = [
    "1-----------------2",
    "|o.......|.......o|",
    "|.[-].[-]_[-].[-].|",
    "|.................|",
    "|.[].^.[---].^.[].|",
    "|....|...|...|....|",
    "4--].|-]   [-|.[--3",
    "........   ........",
    "1--].|.[---].|.[--2",
    "|....|.......|....|",
    "|.[]._.[---]._.[].|",
    "|........ ........|",
    "|.[-].[-]^[-].[-].|",
    "|o.......|.......o|",
    "4-----------------3",
];

/// Symbol grid plus spawn cells. `ghostSpawns` is indexed by role order
/// (aggressive, ambusher, flanker, erratic).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapDefinition {
    pub rows: Vec<String>,
    pub player_spawn: GridCell,
    pub ghost_spawns: Vec<GridCell>,
}

impl Default for MapDefinition {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS.iter().map(|row| row.to_string()).collect(),
            player_spawn: GridCell::new(9, 11),
            ghost_spawns: vec![
                GridCell::new(9, 6),
                GridCell::new(8, 7),
                GridCell::new(10, 7),
                GridCell::new(9, 7),
            ],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    pub tile_size: f32,
    pub tick_ms: u64,
    pub starting_extra_lives: u32,
    pub initial_ghost_count: usize,
    pub max_ghost_count: usize,
    pub extra_ghost_level: u32,
    pub mode_first_phase_ms: u64,
    pub mode_phase_ms: u64,
    pub fright_duration_ms: u64,
    pub fright_shrink_per_level_ms: u64,
    pub retreat_duration_ms: u64,
    pub release_delay_min_ms: u64,
    pub release_delay_max_ms: u64,
    pub death_animation_frames: u32,
    pub level_up_animation_frames: u32,
    pub seed: u32,
    pub map: MapDefinition,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tile_size: TILE_SIZE,
            tick_ms: TICK_MS,
            starting_extra_lives: STARTING_EXTRA_LIVES,
            initial_ghost_count: INITIAL_GHOST_COUNT,
            max_ghost_count: MAX_GHOST_COUNT,
            extra_ghost_level: EXTRA_GHOST_LEVEL,
            mode_first_phase_ms: MODE_FIRST_PHASE_MS,
            mode_phase_ms: MODE_PHASE_MS,
            fright_duration_ms: FRIGHT_DURATION_MS,
            fright_shrink_per_level_ms: FRIGHT_SHRINK_PER_LEVEL_MS,
            retreat_duration_ms: RETREAT_DURATION_MS,
            release_delay_min_ms: RELEASE_DELAY_MIN_MS,
            release_delay_max_ms: RELEASE_DELAY_MAX_MS,
            death_animation_frames: DEATH_ANIMATION_FRAMES,
            level_up_animation_frames: LEVEL_UP_ANIMATION_FRAMES,
            seed: 1,
            map: MapDefinition::default(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Invalid(String),
    Maze(MazeError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config io error: {e}"),
            ConfigError::Json(e) => write!(f, "config parse error: {e}"),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
            ConfigError::Maze(e) => write!(f, "invalid map: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Json(e) => Some(e),
            ConfigError::Maze(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Json(e)
    }
}

impl From<MazeError> for ConfigError {
    fn from(e: MazeError) -> Self {
        ConfigError::Maze(e)
    }
}

impl SessionConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tile_size <= 0.0
            || !self.tile_size.is_finite()
            || (self.tile_size % TILE_SIZE_QUANTUM) != 0.0
        {
            return Err(ConfigError::Invalid(format!(
                "tileSize must be a positive multiple of {TILE_SIZE_QUANTUM}, got {}",
                self.tile_size
            )));
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::Invalid("tickMs must be positive".to_string()));
        }
        if self.max_ghost_count > MAX_GHOST_COUNT {
            return Err(ConfigError::Invalid(format!(
                "maxGhostCount must be at most {MAX_GHOST_COUNT}"
            )));
        }
        if self.initial_ghost_count > self.max_ghost_count {
            return Err(ConfigError::Invalid(
                "initialGhostCount exceeds maxGhostCount".to_string(),
            ));
        }
        if self.map.ghost_spawns.len() < self.max_ghost_count {
            return Err(ConfigError::Invalid(format!(
                "map defines {} ghost spawns but maxGhostCount is {}",
                self.map.ghost_spawns.len(),
                self.max_ghost_count
            )));
        }
        if self.release_delay_min_ms > self.release_delay_max_ms {
            return Err(ConfigError::Invalid(
                "releaseDelayMinMs exceeds releaseDelayMaxMs".to_string(),
            ));
        }
        if self.mode_phase_ms == 0 || self.mode_first_phase_ms == 0 {
            return Err(ConfigError::Invalid(
                "mode phase durations must be positive".to_string(),
            ));
        }
        Maze::build(&self.map, self.tile_size)?;
        Ok(())
    }
}
