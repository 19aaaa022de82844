use crate::config::{MapDefinition, SessionConfig};
use crate::types::{Direction, GridCell};

use super::Session;

const HELD_MS: u64 = 60_000;

/// Session over a tiny ASCII map. Ghost count and cap follow `ghosts`.
pub(crate) fn session_from_rows(
    rows: &[&str],
    player: (i32, i32),
    ghosts: &[(i32, i32)],
    tweak: impl FnOnce(&mut SessionConfig),
) -> Session {
    let mut config = SessionConfig {
        initial_ghost_count: ghosts.len(),
        max_ghost_count: ghosts.len(),
        map: MapDefinition {
            rows: rows.iter().map(|row| row.to_string()).collect(),
            player_spawn: GridCell::new(player.0, player.1),
            ghost_spawns: ghosts
                .iter()
                .map(|(col, row)| GridCell::new(*col, *row))
                .collect(),
        },
        ..SessionConfig::default()
    };
    tweak(&mut config);
    Session::new(config).expect("test session should build")
}

/// Default maze with `ghosts` active ghosts held in their spawn cells.
pub(crate) fn session_with(ghosts: usize, tweak: impl FnOnce(&mut SessionConfig)) -> Session {
    let mut config = SessionConfig {
        initial_ghost_count: ghosts,
        release_delay_min_ms: HELD_MS,
        release_delay_max_ms: HELD_MS,
        ..SessionConfig::default()
    };
    tweak(&mut config);
    Session::new(config).expect("test session should build")
}

/// Player walking right into a held ghost two cells away.
pub(crate) fn corridor_session(lives: u32) -> Session {
    let mut session = session_from_rows(
        &["-------", "|  . .|", "-------"],
        (1, 1),
        &[(3, 1)],
        |config| {
            config.starting_extra_lives = lives;
            config.release_delay_min_ms = HELD_MS;
            config.release_delay_max_ms = HELD_MS;
        },
    );
    session.set_input(Direction::Right);
    session
}
