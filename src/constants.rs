pub const TICK_RATE: u32 = 60;
pub const TICK_MS: u64 = 1000 / TICK_RATE as u64;

pub const TILE_SIZE: f32 = 32.0;
/// Tile sizes must be a multiple of this so every speed tier divides a tile.
pub const TILE_SIZE_QUANTUM: f32 = 16.0;
/// Gap kept between an agent's box and a corridor wall.
pub const WALL_SLACK: f32 = 1.0;
pub const AGENT_HITBOX_RATIO: f32 = 0.375;

pub const PLAYER_SPEED_DIVISOR: f32 = 8.0;
pub const GHOST_SPEED_DIVISOR: f32 = 8.0;

pub const STARTING_EXTRA_LIVES: u32 = 2;
pub const INITIAL_GHOST_COUNT: usize = 3;
pub const MAX_GHOST_COUNT: usize = 4;
pub const EXTRA_GHOST_LEVEL: u32 = 2;

pub const MODE_FIRST_PHASE_MS: u64 = 7_000;
pub const MODE_PHASE_MS: u64 = 20_000;
pub const FRIGHT_DURATION_MS: u64 = 6_000;
pub const FRIGHT_SHRINK_PER_LEVEL_MS: u64 = 500;
pub const RETREAT_DURATION_MS: u64 = 3_000;
pub const RELEASE_DELAY_MIN_MS: u64 = 500;
pub const RELEASE_DELAY_MAX_MS: u64 = 2_500;

pub const DEATH_ANIMATION_FRAMES: u32 = 48;
pub const LEVEL_UP_ANIMATION_FRAMES: u32 = 60;
pub const MOUTH_TOGGLE_FRAMES: u8 = 6;

pub const PELLET_SCORE: u32 = 10;
pub const GHOST_CAPTURE_BASE_SCORE: u32 = 200;

pub const AMBUSH_LEAD_TILES: f32 = 4.0;
pub const FLANK_PIVOT_TILES: f32 = 2.0;
pub const ERRATIC_SHY_RADIUS_TILES: f32 = 8.0;

pub fn player_speed(tile_size: f32) -> f32 {
    tile_size / PLAYER_SPEED_DIVISOR
}

pub fn ghost_base_speed(tile_size: f32) -> f32 {
    tile_size / GHOST_SPEED_DIVISOR
}

pub fn ms_to_ticks(ms: u64, tick_ms: u64) -> u32 {
    if tick_ms == 0 {
        return 0;
    }
    ms.div_ceil(tick_ms).min(u32::MAX as u64) as u32
}

/// Fright duration after `level_ups` shrink steps, floored at zero.
pub fn fright_duration_for_level(base_ms: u64, shrink_ms: u64, level: u32) -> u64 {
    base_ms.saturating_sub(shrink_ms.saturating_mul(level.saturating_sub(1) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_tiers_divide_default_tile() {
        let base = ghost_base_speed(TILE_SIZE);
        for speed in [base / 2.0, base, base * 2.0] {
            assert_eq!((TILE_SIZE / speed).fract(), 0.0);
        }
        assert_eq!(player_speed(TILE_SIZE), 4.0);
    }

    #[test]
    fn ms_to_ticks_rounds_up() {
        assert_eq!(ms_to_ticks(0, 16), 0);
        assert_eq!(ms_to_ticks(16, 16), 1);
        assert_eq!(ms_to_ticks(17, 16), 2);
        assert_eq!(ms_to_ticks(500, 0), 0);
    }

    #[test]
    fn fright_duration_shrinks_per_level_with_floor() {
        assert_eq!(fright_duration_for_level(6_000, 500, 1), 6_000);
        assert_eq!(fright_duration_for_level(6_000, 500, 3), 5_000);
        assert_eq!(fright_duration_for_level(6_000, 500, 40), 0);
    }
}
