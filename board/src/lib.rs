//! The board: an immutable grid of wall/floor cells.
//!
//! A [`Board`] is parsed once from a text representation and never mutated
//! afterwards. Everything else in the engine (`state`, `render`, `engine`)
//! treats it as a read-only map: walkability, 4-connected adjacency, and
//! the Moore neighborhood used for blast radii.

use std::collections::{HashMap, HashSet};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A `(row, col)` grid position. `(0, 0)` is top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coordinate {
    pub row: i32,
    pub col: i32,
}

impl Coordinate {
    pub fn new(row: i32, col: i32) -> Self {
        Coordinate { row, col }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// A single grid square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Cell {
    Wall,
    Floor,
}

impl Cell {
    fn from_char(c: char) -> Cell {
        if c == '#' { Cell::Wall } else { Cell::Floor }
    }

    fn to_char(self) -> char {
        match self {
            Cell::Wall => '#',
            Cell::Floor => ' ',
        }
    }
}

/// The dimensions of a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Dimensions {
    pub rows: usize,
    pub cols: usize,
}

/// Reasons a board text representation fails to parse into a valid [`Board`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardError {
    /// Some row has a different length than the first row.
    NonRectangular,
    /// A cell in the first row, last row, first column, or last column is not a wall.
    NotEnclosed,
    /// No floor cell exists anywhere on the board.
    Unwalkable,
}

impl fmt::Display for BoardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardError::NonRectangular => write!(f, "non_rectangular"),
            BoardError::NotEnclosed => write!(f, "not_enclosed"),
            BoardError::Unwalkable => write!(f, "unwalkable"),
        }
    }
}

impl std::error::Error for BoardError {}

/// An immutable grid of wall/floor cells, fully enclosed by walls, with at
/// least one walkable cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    cells: Vec<Vec<Cell>>,
    dimensions: Dimensions,
}

/// Ships with the crate so tests and callers that don't care about a
/// specific layout have something sane to construct a [`Board`] from.
const DEFAULT_BOARD_TEXT: &str = "\
##########
#        #
#        #
#        #
#   ##   #
#   ##   #
#        #
#        #
#        #
##########
";

impl Board {
    /// Parses a board from its text representation.
    ///
    /// Lines are split on `\n`; leading and trailing blank lines are
    /// trimmed. `#` maps to [`Cell::Wall`]; every other character
    /// (including space) maps to [`Cell::Floor`].
    pub fn parse(text: &str) -> Result<Board, BoardError> {
        let mut lines: Vec<&str> = text.split('\n').collect();
        while lines.first().is_some_and(|l| l.is_empty()) {
            lines.remove(0);
        }
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }

        let rows = lines.len();
        let cols = lines.first().map(|l| l.chars().count()).unwrap_or(0);

        if lines.iter().any(|line| line.chars().count() != cols) {
            return Err(BoardError::NonRectangular);
        }

        let cells: Vec<Vec<Cell>> = lines
            .iter()
            .map(|line| line.chars().map(Cell::from_char).collect())
            .collect();

        let enclosed = (0..cols).all(|c| cells[0][c] == Cell::Wall && cells[rows - 1][c] == Cell::Wall)
            && (0..rows).all(|r| cells[r][0] == Cell::Wall && cells[r][cols - 1] == Cell::Wall);
        if !enclosed {
            return Err(BoardError::NotEnclosed);
        }

        let has_floor = cells.iter().flatten().any(|c| *c == Cell::Floor);
        if !has_floor {
            return Err(BoardError::Unwalkable);
        }

        Ok(Board {
            cells,
            dimensions: Dimensions { rows, cols },
        })
    }

    /// The shipped 10x10 enclosure with an interior wall fragment.
    pub fn default_board() -> Board {
        Board::parse(DEFAULT_BOARD_TEXT).expect("built-in default board is valid")
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// The raw row-major cell matrix.
    pub fn cells(&self) -> &[Vec<Cell>] {
        &self.cells
    }

    /// A `(row, col) -> Cell` lookup over every cell on the board.
    pub fn cell_map(&self) -> HashMap<Coordinate, Cell> {
        let mut map = HashMap::with_capacity(self.dimensions.rows * self.dimensions.cols);
        for (row, line) in self.cells.iter().enumerate() {
            for (col, cell) in line.iter().enumerate() {
                map.insert(Coordinate::new(row as i32, col as i32), *cell);
            }
        }
        map
    }

    fn cell_at(&self, coord: Coordinate) -> Option<Cell> {
        if coord.row < 0 || coord.col < 0 {
            return None;
        }
        self.cells
            .get(coord.row as usize)
            .and_then(|row| row.get(coord.col as usize))
            .copied()
    }

    /// True iff `coord` is inside the board and walkable (a floor cell).
    /// Out-of-bounds coordinates are non-walkable.
    pub fn walkable(&self, coord: Coordinate) -> bool {
        self.cell_at(coord) == Some(Cell::Floor)
    }

    /// True iff `a == b`, or `a` and `b` differ by exactly 1 on exactly one
    /// axis (4-connected adjacency; a cell is its own neighbor).
    pub fn neighbors(&self, a: Coordinate, b: Coordinate) -> bool {
        if a == b {
            return true;
        }
        let dr = (a.row - b.row).abs();
        let dc = (a.col - b.col).abs();
        (dr == 1 && dc == 0) || (dr == 0 && dc == 1)
    }

    /// Uniformly chooses a walkable cell using the supplied RNG. Accepting
    /// the RNG as a parameter keeps this function deterministic under a
    /// seeded RNG in tests, while production callers pass `rand::thread_rng()`.
    pub fn random_walkable_cell(&self, rng: &mut impl rand::Rng) -> Coordinate {
        let floors: Vec<Coordinate> = self
            .cell_map()
            .into_iter()
            .filter(|(_, cell)| *cell == Cell::Floor)
            .map(|(coord, _)| coord)
            .collect();
        debug_assert!(!floors.is_empty(), "board has at least one floor cell");
        let index = rng.gen_range(0..floors.len());
        floors[index]
    }

    /// The in-bounds 3x3 Moore neighborhood centered on `center` (8-connected,
    /// includes the center itself). Out-of-bounds coordinates are omitted;
    /// walls inside the radius are included in this coordinate set (it is up
    /// to the caller to decide who on those cells actually gets hit).
    pub fn blast_radius(&self, center: Coordinate) -> HashSet<Coordinate> {
        let mut result = HashSet::with_capacity(9);
        for dr in -1..=1 {
            for dc in -1..=1 {
                let candidate = Coordinate::new(center.row + dr, center.col + dc);
                if candidate.row >= 0
                    && candidate.col >= 0
                    && (candidate.row as usize) < self.dimensions.rows
                    && (candidate.col as usize) < self.dimensions.cols
                {
                    result.insert(candidate);
                }
            }
        }
        result
    }

    /// Renders the board back to its text representation: one line per row,
    /// `#` for walls, space for floors, trailing newline per row.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.dimensions.rows * (self.dimensions.cols + 1));
        for row in &self.cells {
            for cell in row {
                out.push(cell.to_char());
            }
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn small_board() -> Board {
        Board::parse("####\n#  #\n#  #\n####\n").unwrap()
    }

    #[test]
    fn parses_valid_board() {
        let board = small_board();
        assert_eq!(board.dimensions(), Dimensions { rows: 4, cols: 4 });
        assert!(board.walkable(Coordinate::new(1, 1)));
        assert!(!board.walkable(Coordinate::new(0, 0)));
    }

    #[test]
    fn round_trips() {
        let text = "####\n#  #\n#  #\n####\n";
        let board = Board::parse(text).unwrap();
        assert_eq!(board.render(), text);
    }

    #[test]
    fn round_trips_modulo_leading_trailing_blank_lines() {
        let text = "\n\n####\n#  #\n#  #\n####\n\n";
        let board = Board::parse(text).unwrap();
        assert_eq!(board.render(), "####\n#  #\n#  #\n####\n");
    }

    #[test]
    fn rejects_non_rectangular() {
        let err = Board::parse("####\n#  #\n###\n####\n").unwrap_err();
        assert_eq!(err, BoardError::NonRectangular);
    }

    #[test]
    fn rejects_not_enclosed() {
        let err = Board::parse("####\n   #\n#  #\n####\n").unwrap_err();
        assert_eq!(err, BoardError::NotEnclosed);
    }

    #[test]
    fn rejects_unwalkable() {
        let err = Board::parse("####\n####\n####\n").unwrap_err();
        assert_eq!(err, BoardError::Unwalkable);
    }

    #[test]
    fn out_of_bounds_is_not_walkable() {
        let board = small_board();
        assert!(!board.walkable(Coordinate::new(-1, 0)));
        assert!(!board.walkable(Coordinate::new(100, 100)));
    }

    #[test]
    fn neighbor_symmetry_and_self() {
        let board = small_board();
        let a = Coordinate::new(1, 1);
        let b = Coordinate::new(1, 2);
        let c = Coordinate::new(2, 2);
        assert!(board.neighbors(a, a));
        assert_eq!(board.neighbors(a, b), board.neighbors(b, a));
        assert!(board.neighbors(a, b));
        assert!(!board.neighbors(a, c));
    }

    #[test]
    fn blast_radius_is_moore_neighborhood_clipped_to_bounds() {
        let board = small_board();
        let radius = board.blast_radius(Coordinate::new(0, 0));
        // only in-bounds coordinates among the 3x3 around (0,0) survive.
        assert!(radius.contains(&Coordinate::new(0, 0)));
        assert!(radius.contains(&Coordinate::new(1, 1)));
        assert!(!radius.iter().any(|c| c.row < 0 || c.col < 0));
    }

    #[test]
    fn random_walkable_cell_is_deterministic_with_seeded_rng() {
        let board = Board::default_board();
        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        assert_eq!(
            board.random_walkable_cell(&mut rng_a),
            board.random_walkable_cell(&mut rng_b)
        );
    }

    #[test]
    fn default_board_is_valid() {
        let board = Board::default_board();
        assert_eq!(board.dimensions(), Dimensions { rows: 10, cols: 10 });
    }
}
