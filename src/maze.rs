use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use crate::config::MapDefinition;
use crate::constants::WALL_SLACK;
use crate::types::{Direction, GridCell, MazeInit, PickupKind, PickupView, Vec2};

const CENTER_EPSILON: f32 = 1e-3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WallKind {
    Horizontal,
    Vertical,
    CornerTopLeft,
    CornerTopRight,
    CornerBottomRight,
    CornerBottomLeft,
    CapLeft,
    CapRight,
    CapTop,
    CapBottom,
    Cross,
    TeeTop,
    TeeRight,
    TeeBottom,
    TeeLeft,
    Block,
    Tunnel,
}

impl WallKind {
    fn from_symbol(symbol: char) -> Self {
        match symbol {
            '-' => WallKind::Horizontal,
            '|' => WallKind::Vertical,
            '1' => WallKind::CornerTopLeft,
            '2' => WallKind::CornerTopRight,
            '3' => WallKind::CornerBottomRight,
            '4' => WallKind::CornerBottomLeft,
            '[' => WallKind::CapLeft,
            ']' => WallKind::CapRight,
            '^' => WallKind::CapTop,
            '_' => WallKind::CapBottom,
            '+' => WallKind::Cross,
            '5' => WallKind::TeeTop,
            '6' => WallKind::TeeRight,
            '7' => WallKind::TeeBottom,
            '8' => WallKind::TeeLeft,
            _ => WallKind::Block,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileKind {
    Wall(WallKind),
    Pellet,
    PowerUp,
    Empty,
    TunnelWarp,
}

impl TileKind {
    pub fn is_wall(self) -> bool {
        matches!(self, TileKind::Wall(_))
    }
}

/// One grid cell. Only pellets and power-ups ever flip `consumed`.
#[derive(Clone, Debug)]
pub struct Tile {
    pub kind: TileKind,
    pub cell: GridCell,
    pub consumed: bool,
}

impl Tile {
    fn new(kind: TileKind, cell: GridCell) -> Self {
        Self {
            kind,
            cell,
            consumed: false,
        }
    }

    fn pickup_kind(&self) -> Option<PickupKind> {
        match self.kind {
            TileKind::Pellet => Some(PickupKind::Pellet),
            TileKind::PowerUp => Some(PickupKind::PowerUp),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MazeError {
    EmptyMap,
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    InvalidTileSize(f32),
    NoPellets,
    SpawnBlocked {
        label: String,
        cell: GridCell,
    },
}

impl fmt::Display for MazeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MazeError::EmptyMap => write!(f, "map has no rows"),
            MazeError::RaggedRow {
                row,
                expected,
                found,
            } => write!(f, "row {row} has {found} columns, expected {expected}"),
            MazeError::InvalidTileSize(size) => write!(f, "invalid tile size {size}"),
            MazeError::NoPellets => write!(f, "map has no pellets"),
            MazeError::SpawnBlocked { label, cell } => write!(
                f,
                "{label} spawn at ({}, {}) is not an open cell",
                cell.col, cell.row
            ),
        }
    }
}

impl std::error::Error for MazeError {}

#[derive(Clone, Debug)]
pub struct Maze {
    cols: i32,
    rows: i32,
    tile_size: f32,
    symbols: Vec<String>,
    grid: Vec<Tile>,
    tunnel_row: Option<i32>,
    tunnel_tiles: Vec<Tile>,
    pickup_cells: HashMap<GridCell, usize>,
    pellet_total: usize,
    pellets_left: usize,
    player_spawn: GridCell,
    ghost_spawns: Vec<GridCell>,
}

impl Maze {
    pub fn build(map: &MapDefinition, tile_size: f32) -> Result<Self, MazeError> {
        if tile_size <= 0.0 || !tile_size.is_finite() {
            return Err(MazeError::InvalidTileSize(tile_size));
        }
        let Some(first) = map.rows.first() else {
            return Err(MazeError::EmptyMap);
        };
        let width = first.chars().count();
        if width == 0 {
            return Err(MazeError::EmptyMap);
        }

        let mut grid = Vec::with_capacity(width * map.rows.len());
        let mut pickup_cells = HashMap::new();
        let mut pellet_total = 0;
        for (row, line) in map.rows.iter().enumerate() {
            let found = line.chars().count();
            if found != width {
                return Err(MazeError::RaggedRow {
                    row,
                    expected: width,
                    found,
                });
            }
            for (col, symbol) in line.chars().enumerate() {
                let cell = GridCell::new(col as i32, row as i32);
                let kind = match symbol {
                    ' ' => TileKind::Empty,
                    '.' => {
                        pellet_total += 1;
                        TileKind::Pellet
                    }
                    'o' => TileKind::PowerUp,
                    other => TileKind::Wall(WallKind::from_symbol(other)),
                };
                if matches!(kind, TileKind::Pellet | TileKind::PowerUp) {
                    pickup_cells.insert(cell, grid.len());
                }
                grid.push(Tile::new(kind, cell));
            }
        }
        if pellet_total == 0 {
            return Err(MazeError::NoPellets);
        }

        let cols = width as i32;
        let rows = map.rows.len() as i32;
        let tunnel_row = (0..rows).find(|&row| {
            let left = &grid[(row * cols) as usize];
            let right = &grid[(row * cols + cols - 1) as usize];
            !left.kind.is_wall() && !right.kind.is_wall()
        });

        let mut tunnel_tiles = Vec::new();
        if let Some(row) = tunnel_row {
            for col in [-1, cols] {
                tunnel_tiles.push(Tile::new(
                    TileKind::Wall(WallKind::Tunnel),
                    GridCell::new(col, row - 1),
                ));
                tunnel_tiles.push(Tile::new(
                    TileKind::Wall(WallKind::Tunnel),
                    GridCell::new(col, row + 1),
                ));
                tunnel_tiles.push(Tile::new(TileKind::TunnelWarp, GridCell::new(col, row)));
            }
        }

        let maze = Self {
            cols,
            rows,
            tile_size,
            symbols: map.rows.clone(),
            grid,
            tunnel_row,
            tunnel_tiles,
            pickup_cells,
            pellet_total,
            pellets_left: pellet_total,
            player_spawn: map.player_spawn,
            ghost_spawns: map.ghost_spawns.clone(),
        };

        maze.check_spawn("player", map.player_spawn)?;
        for (index, cell) in map.ghost_spawns.iter().enumerate() {
            maze.check_spawn(&format!("ghost {index}"), *cell)?;
        }
        Ok(maze)
    }

    fn check_spawn(&self, label: &str, cell: GridCell) -> Result<(), MazeError> {
        if !self.in_grid(cell) || self.is_wall_cell(cell) {
            return Err(MazeError::SpawnBlocked {
                label: label.to_string(),
                cell,
            });
        }
        Ok(())
    }

    pub fn cols(&self) -> i32 {
        self.cols
    }

    pub fn rows(&self) -> i32 {
        self.rows
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    pub fn width_px(&self) -> f32 {
        self.cols as f32 * self.tile_size
    }

    pub fn height_px(&self) -> f32 {
        self.rows as f32 * self.tile_size
    }

    pub fn tunnel_row(&self) -> Option<i32> {
        self.tunnel_row
    }

    pub fn player_spawn(&self) -> Vec2 {
        self.cell_center(self.player_spawn)
    }

    pub fn ghost_spawn(&self, index: usize) -> Option<Vec2> {
        self.ghost_spawns
            .get(index)
            .map(|cell| self.cell_center(*cell))
    }

    fn in_grid(&self, cell: GridCell) -> bool {
        cell.col >= 0 && cell.row >= 0 && cell.col < self.cols && cell.row < self.rows
    }

    pub fn cell_of(&self, position: Vec2) -> GridCell {
        GridCell::new(
            (position.x / self.tile_size).floor() as i32,
            (position.y / self.tile_size).floor() as i32,
        )
    }

    pub fn cell_center(&self, cell: GridCell) -> Vec2 {
        let half = self.tile_size / 2.0;
        Vec2::new(
            cell.col as f32 * self.tile_size + half,
            cell.row as f32 * self.tile_size + half,
        )
    }

    /// Tile under a pixel position, including the tunnel tiles outside the grid.
    pub fn tile_at(&self, position: Vec2) -> Option<&Tile> {
        let cell = self.cell_of(position);
        if self.in_grid(cell) {
            return self.grid.get((cell.row * self.cols + cell.col) as usize);
        }
        self.tunnel_tiles.iter().find(|tile| tile.cell == cell)
    }

    /// Outside the grid only the tunnel row is open.
    pub fn is_wall_cell(&self, cell: GridCell) -> bool {
        if self.in_grid(cell) {
            return self.grid[(cell.row * self.cols + cell.col) as usize]
                .kind
                .is_wall();
        }
        Some(cell.row) != self.tunnel_row
    }

    /// Swept box test: would the agent's box at `position + velocity`
    /// overlap any wall cell.
    pub fn is_wall(&self, position: Vec2, velocity: Vec2) -> bool {
        let half = self.tile_size / 2.0 - WALL_SLACK;
        let next = position + velocity;
        let col_min = ((next.x - half) / self.tile_size).floor() as i32;
        let col_max = ((next.x + half) / self.tile_size).ceil() as i32 - 1;
        let row_min = ((next.y - half) / self.tile_size).floor() as i32;
        let row_max = ((next.y + half) / self.tile_size).ceil() as i32 - 1;
        for row in row_min..=row_max {
            for col in col_min..=col_max {
                if self.is_wall_cell(GridCell::new(col, row)) {
                    return true;
                }
            }
        }
        false
    }

    pub fn is_centered(&self, coord: f32) -> bool {
        let offset = (coord - self.tile_size / 2.0).rem_euclid(self.tile_size);
        offset < CENTER_EPSILON || offset > self.tile_size - CENTER_EPSILON
    }

    /// Whether an agent at `position` may start moving `dir` at `speed`.
    /// Leaving an axis requires being centred on it.
    pub fn can_travel(&self, position: Vec2, dir: Direction, speed: f32) -> bool {
        if dir == Direction::None {
            return true;
        }
        let aligned = if dir.is_horizontal() {
            self.is_centered(position.y)
        } else {
            self.is_centered(position.x)
        };
        aligned && !self.is_wall(position, dir.unit().scale(speed))
    }

    /// Zeroes each velocity component that would run into a wall.
    pub fn resolve_velocity(&self, position: Vec2, velocity: Vec2) -> Vec2 {
        let mut out = velocity;
        if out.x != 0.0 && self.is_wall(position, Vec2::new(out.x, 0.0)) {
            out.x = 0.0;
        }
        if out.y != 0.0 && self.is_wall(position, Vec2::new(0.0, out.y)) {
            out.y = 0.0;
        }
        out
    }

    /// Position after crossing a warp tile centre, if the agent crossed one.
    pub fn wrap_tunnel(&self, position: Vec2) -> Option<Vec2> {
        self.tunnel_row?;
        let half = self.tile_size / 2.0;
        let span = (self.cols + 1) as f32 * self.tile_size;
        if position.x < -half {
            Some(Vec2::new(position.x + span, position.y))
        } else if position.x > self.width_px() + half {
            Some(Vec2::new(position.x - span, position.y))
        } else {
            None
        }
    }

    pub fn consume_at(&mut self, cell: GridCell) -> Option<PickupKind> {
        let index = *self.pickup_cells.get(&cell)?;
        let tile = &mut self.grid[index];
        if tile.consumed {
            return None;
        }
        tile.consumed = true;
        let kind = tile.pickup_kind();
        if kind == Some(PickupKind::Pellet) {
            self.pellets_left = self.pellets_left.saturating_sub(1);
        }
        kind
    }

    pub fn rearm_pickups(&mut self) {
        for index in self.pickup_cells.values() {
            self.grid[*index].consumed = false;
        }
        self.pellets_left = self.pellet_total;
    }

    pub fn pellets_left(&self) -> usize {
        self.pellets_left
    }

    pub fn pellet_total(&self) -> usize {
        self.pellet_total
    }

    pub fn pickup_total(&self) -> usize {
        self.pickup_cells.len()
    }

    pub fn consumed_count(&self) -> usize {
        self.pickup_cells
            .values()
            .filter(|index| self.grid[**index].consumed)
            .count()
    }

    /// Unconsumed pickups in row-major order.
    pub fn pickup_views(&self) -> Vec<PickupView> {
        self.grid
            .iter()
            .filter(|tile| !tile.consumed)
            .filter_map(|tile| {
                tile.pickup_kind().map(|kind| PickupView {
                    col: tile.cell.col,
                    row: tile.cell.row,
                    kind,
                })
            })
            .collect()
    }

    /// Open cells reachable from the player spawn, tunnel wrap included.
    pub fn reachable_cells(&self) -> HashSet<GridCell> {
        let mut out = HashSet::new();
        let start = self.player_spawn;
        if self.is_wall_cell(start) {
            return out;
        }
        let mut queue = VecDeque::new();
        out.insert(start);
        queue.push_back(start);

        while let Some(cell) = queue.pop_front() {
            for dir in Direction::SCAN_ORDER {
                let step = dir.unit();
                let mut next = GridCell::new(cell.col + step.x as i32, cell.row + step.y as i32);
                if next.col < 0 {
                    next.col = self.cols - 1;
                } else if next.col >= self.cols {
                    next.col = 0;
                }
                if next.row < 0 || next.row >= self.rows || self.is_wall_cell(next) {
                    continue;
                }
                if Some(cell.row) != self.tunnel_row && (next.col - cell.col).abs() > 1 {
                    continue;
                }
                if out.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        out
    }

    pub fn to_maze_init(&self) -> MazeInit {
        MazeInit {
            cols: self.cols,
            rows: self.rows,
            tile_size: self.tile_size,
            symbols: self.symbols.clone(),
            tunnel_row: self.tunnel_row,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_map(rows: &[&str], player: (i32, i32)) -> MapDefinition {
        MapDefinition {
            rows: rows.iter().map(|row| row.to_string()).collect(),
            player_spawn: GridCell::new(player.0, player.1),
            ghost_spawns: Vec::new(),
        }
    }

    #[test]
    fn default_map_layout() {
        let maze = Maze::build(&MapDefinition::default(), 32.0).expect("default map builds");
        assert_eq!((maze.cols(), maze.rows()), (19, 15));
        assert_eq!(maze.pellet_total(), 132);
        assert_eq!(maze.pickup_total(), 136);
        assert_eq!(maze.tunnel_row(), Some(7));
    }

    #[test]
    fn every_pickup_is_reachable_from_player_spawn() {
        let maze = Maze::build(&MapDefinition::default(), 32.0).expect("default map builds");
        let reachable = maze.reachable_cells();
        for pickup in maze.pickup_views() {
            assert!(
                reachable.contains(&GridCell::new(pickup.col, pickup.row)),
                "pickup is unreachable: ({},{})",
                pickup.col,
                pickup.row
            );
        }
    }

    #[test]
    fn rejects_bad_maps() {
        assert_eq!(
            Maze::build(&small_map(&["|  |"], (1, 0)), 32.0).unwrap_err(),
            MazeError::NoPellets
        );
        assert!(matches!(
            Maze::build(&small_map(&["|..|", "|."], (1, 0)), 32.0),
            Err(MazeError::RaggedRow { row: 1, .. })
        ));
        assert!(matches!(
            Maze::build(&small_map(&["|..|"], (0, 0)), 32.0),
            Err(MazeError::SpawnBlocked { .. })
        ));
        assert_eq!(
            Maze::build(&small_map(&[], (0, 0)), 32.0).unwrap_err(),
            MazeError::EmptyMap
        );
    }

    #[test]
    fn wall_test_blocks_only_steps_into_walls() {
        let maze = Maze::build(&small_map(&["-----", "|...|", "-----"], (1, 1)), 32.0)
            .expect("corridor builds");
        let start = maze.cell_center(GridCell::new(1, 1));
        assert!(!maze.is_wall(start, Vec2::ZERO));
        assert!(!maze.is_wall(start, Vec2::new(4.0, 0.0)));
        assert!(maze.is_wall(start, Vec2::new(-4.0, 0.0)));
        assert!(maze.is_wall(start, Vec2::new(0.0, 4.0)));
        assert_eq!(
            maze.resolve_velocity(start, Vec2::new(-4.0, 0.0)),
            Vec2::ZERO
        );
    }

    #[test]
    fn turning_requires_centering() {
        let maze = Maze::build(
            &small_map(&["-----", "|...|", "|.|.|", "|...|", "-----"], (1, 1)),
            32.0,
        )
        .expect("loop builds");
        let center = maze.cell_center(GridCell::new(1, 1));
        assert!(maze.can_travel(center, Direction::Down, 4.0));
        let off_center = center + Vec2::new(4.0, 0.0);
        assert!(!maze.can_travel(off_center, Direction::Down, 4.0));
        assert!(maze.can_travel(off_center, Direction::Right, 4.0));
        assert!(maze.can_travel(off_center, Direction::Left, 4.0));
    }

    #[test]
    fn tunnel_wraps_both_ways() {
        let maze = Maze::build(&small_map(&["-----", "..o..", "-----"], (2, 1)), 32.0)
            .expect("tunnel builds");
        assert_eq!(maze.tunnel_row(), Some(1));
        assert!(!maze.is_wall(Vec2::new(-12.0, 48.0), Vec2::new(-4.0, 0.0)));
        assert!(maze.is_wall_cell(GridCell::new(-1, 0)));

        let left = maze
            .wrap_tunnel(Vec2::new(-20.0, 48.0))
            .expect("past the left warp centre");
        assert_eq!(left, Vec2::new(172.0, 48.0));
        let right = maze
            .wrap_tunnel(Vec2::new(180.0, 48.0))
            .expect("past the right warp centre");
        assert_eq!(right, Vec2::new(-12.0, 48.0));
        assert!(maze.wrap_tunnel(Vec2::new(-16.0, 48.0)).is_none());
        assert_eq!(
            maze.tile_at(Vec2::new(-16.0, 48.0)).map(|tile| tile.kind),
            Some(TileKind::TunnelWarp)
        );
    }

    #[test]
    fn consume_and_rearm() {
        let mut maze = Maze::build(&small_map(&["-----", "|.o.|", "-----"], (1, 1)), 32.0)
            .expect("builds");
        assert_eq!(maze.consume_at(GridCell::new(1, 1)), Some(PickupKind::Pellet));
        assert_eq!(maze.consume_at(GridCell::new(1, 1)), None);
        assert_eq!(maze.consume_at(GridCell::new(2, 1)), Some(PickupKind::PowerUp));
        assert_eq!(maze.pellets_left(), 1);
        assert_eq!(maze.consumed_count(), 2);
        maze.rearm_pickups();
        assert_eq!(maze.pellets_left(), 2);
        assert_eq!(maze.pickup_views().len(), 3);
    }
}
