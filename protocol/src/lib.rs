//! Shared types that cross the boundary between the pure game logic
//! (`board`, `state`), the actor runtime (`engine`), and anything external
//! that consumes a [`Frame`] (a renderer, a transport, a test harness).
//!
//! A small, dependency-light crate of serializable types with no behavior
//! of their own — the shared vocabulary every other crate in the workspace
//! depends on.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use board::{Board, BoardError, Cell, Coordinate, Dimensions};

/// Player identity is a caller-supplied string; this core does not perform
/// authentication.
pub type PlayerId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerStatus {
    Alive,
    Dead,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub position: Coordinate,
    pub status: PlayerStatus,
}

/// The contents of one cell once players have been folded in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoalescedCell {
    /// No players occupy this cell; it keeps its bare board contents.
    Empty(Cell),
    /// At least one player occupies this cell.
    Occupied(HashMap<PlayerId, PlayerStatus>),
}

/// A coalesced view of the board: every walkable cell and every wall has an
/// entry, with players folded into the cell they stand on.
pub type CoalescedBoard = HashMap<Coordinate, CoalescedCell>;

/// A versioned snapshot broadcast to every subscriber of a game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Strictly increasing across every broadcast a single `GameActor` emits.
    pub sequence: u64,
    pub board_state: CoalescedBoard,
    pub dimensions: Dimensions,
}

/// A movement direction, as understood by `PlaySession::move`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// The coordinate reached by moving one step from `from` in this direction.
    pub fn apply(self, from: Coordinate) -> Coordinate {
        let (dr, dc) = match self {
            Direction::Up => (-1, 0),
            Direction::Down => (1, 0),
            Direction::Left => (0, -1),
            Direction::Right => (0, 1),
        };
        Coordinate::new(from.row + dr, from.col + dc)
    }
}

/// Errors reported when constructing a [`state::GameState`] (or, wrapped,
/// a `GameActor`). None of these mutate any state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    /// An option value had the wrong shape; carries the option's name.
    InvalidOption(&'static str),
    /// The board's dimensions exceed the configured `max_board_dimension`.
    MaxBoardDimensionExceeded,
    /// The supplied board text failed board validation.
    Board(BoardError),
}

impl fmt::Display for ConstructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructionError::InvalidOption(name) => write!(f, "invalid_option({name})"),
            ConstructionError::MaxBoardDimensionExceeded => {
                write!(f, "max_board_dimension_exceeded")
            }
            ConstructionError::Board(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ConstructionError {}

impl From<BoardError> for ConstructionError {
    fn from(value: BoardError) -> Self {
        ConstructionError::Board(value)
    }
}

/// Errors reported back to the caller of a `GameState`/`GameActor` action.
/// State is left unchanged whenever one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionError {
    InvalidPlayer,
    DeadPlayer,
    UnwalkableDestination,
    UnreachableDestination,
    MaxPlayers,
    /// Internal: the id was already registered. The `GameActor` treats this
    /// as a reconnect and never surfaces it to `join` callers.
    AlreadySpawned,
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActionError::InvalidPlayer => "invalid_player",
            ActionError::DeadPlayer => "dead_player",
            ActionError::UnwalkableDestination => "unwalkable_destination",
            ActionError::UnreachableDestination => "unreachable_destination",
            ActionError::MaxPlayers => "max_players",
            ActionError::AlreadySpawned => "already_spawned",
        };
        f.write_str(label)
    }
}

impl std::error::Error for ActionError {}

/// Errors reported by the [`Fleet`](crate) registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetError {
    /// The fleet's `max_games` cap has been reached.
    MaxGames,
    /// A game with this name is already registered.
    NameTaken,
    /// The new game's `GameState` failed to construct.
    Construction(ConstructionError),
}

impl fmt::Display for FleetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FleetError::MaxGames => write!(f, "max_games"),
            FleetError::NameTaken => write!(f, "name_taken"),
            FleetError::Construction(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for FleetError {}

impl From<ConstructionError> for FleetError {
    fn from(value: ConstructionError) -> Self {
        FleetError::Construction(value)
    }
}

/// Raised when a named game does not exist in the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidGame;

impl fmt::Display for InvalidGame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid_game")
    }
}

impl std::error::Error for InvalidGame {}

/// Transport/liveness errors: the RPC couldn't be completed at all, as
/// opposed to the actor completing it and reporting an [`ActionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The RPC did not complete within the configured timeout.
    RequestTimedOut,
    /// The actor's mailbox is closed; it has already terminated.
    ActorUnavailable,
    /// A `PlaySession` exhausted its reconnect attempts.
    ReconnectExhausted,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportError::RequestTimedOut => "request_timed_out",
            TransportError::ActorUnavailable => "actor_unavailable",
            TransportError::ReconnectExhausted => "reconnect_exhausted",
        };
        f.write_str(label)
    }
}

impl std::error::Error for TransportError {}

/// Options accepted by `GameState::new` / `Fleet::new`.
#[derive(Debug, Clone, Default)]
pub struct GameOptions {
    /// Use this board; `None` means the default board.
    pub board: Option<Board>,
    /// Population cap for `spawn_player`. Must be `> 1` when present.
    pub max_players: Option<u32>,
    /// Rejects boards whose `rows` or `cols` exceed this. Must be `> 0` when present.
    pub max_board_dimension: Option<u32>,
}

impl GameOptions {
    /// Validates the shape of the supplied options (not the board itself,
    /// which `GameState::new` checks against `max_board_dimension`).
    pub fn validate(&self) -> Result<(), ConstructionError> {
        if let Some(max_players) = self.max_players {
            if max_players <= 1 {
                return Err(ConstructionError::InvalidOption("max_players"));
            }
        }
        if let Some(max_dim) = self.max_board_dimension {
            if max_dim == 0 {
                return Err(ConstructionError::InvalidOption("max_board_dimension"));
            }
        }
        Ok(())
    }
}

/// Runtime configuration for one `GameActor`.
#[derive(Debug, Clone)]
pub struct GameActorConfig {
    pub options: GameOptions,
    /// Delay between a kill and the victim's automatic respawn.
    pub respawn_delay: Duration,
    /// Bound on the actor's command mailbox.
    pub mailbox_capacity: usize,
}

impl Default for GameActorConfig {
    fn default() -> Self {
        GameActorConfig {
            options: GameOptions::default(),
            respawn_delay: Duration::from_millis(5000),
            mailbox_capacity: CHANNEL_BUFFER_SIZE,
        }
    }
}

/// Runtime configuration for one `PlaySession`.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub reconnect_delay: Duration,
    pub reconnect_attempts: u32,
    /// Default timeout applied to RPCs the session makes into its game actor.
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            reconnect_delay: Duration::from_millis(100),
            reconnect_attempts: 3,
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Fleet-wide configuration.
#[derive(Debug, Clone, Default)]
pub struct FleetConfig {
    /// Caps the number of concurrently live games; `None` means unbounded.
    pub max_games: Option<u32>,
}

/// The mailbox bound shared by every `GameActor`.
pub const CHANNEL_BUFFER_SIZE: usize = 256;
