//! Pure game-state transitions: a [`Board`] plus a player table, with every
//! rule expressed as an input state + arguments -> `(outcome, new state)`
//! function. Nothing in here touches the clock, randomness outside the
//! injected RNG, or I/O — that is `engine`'s job.

use std::collections::HashMap;

use board::{Board, Coordinate};
use protocol::{ActionError, CoalescedBoard, CoalescedCell, ConstructionError, GameOptions, PlayerId, PlayerRecord, PlayerStatus};
use rand::Rng;

/// Outcome of a mutating action that carries no extra information on success.
pub type ActionResult = Result<(), ActionError>;

/// Metadata scoped to the most recent transition. Never read by subsequent
/// transitions; `GameActor` consumes it to decide whether to schedule a
/// respawn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Effects {
    pub killed: Vec<PlayerId>,
}

/// Composes a [`Board`], a player table, and configured limits. Every
/// operation is pure: it borrows `self` and returns a new, independent
/// `GameState`.
#[derive(Debug, Clone)]
pub struct GameState {
    board: Board,
    players: HashMap<PlayerId, PlayerRecord>,
    max_players: Option<u32>,
    last_effects: Option<Effects>,
}

impl GameState {
    /// Validates `options` and returns either the initial state (no players)
    /// or a construction error. Construction errors never allocate a state.
    pub fn new(options: GameOptions) -> Result<GameState, ConstructionError> {
        options.validate()?;

        let board = options.board.unwrap_or_else(Board::default_board);

        if let Some(max_dim) = options.max_board_dimension {
            let dims = board.dimensions();
            if dims.rows > max_dim as usize || dims.cols > max_dim as usize {
                return Err(ConstructionError::MaxBoardDimensionExceeded);
            }
        }

        Ok(GameState {
            board,
            players: HashMap::new(),
            max_players: options.max_players,
            last_effects: None,
        })
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn players(&self) -> &HashMap<PlayerId, PlayerRecord> {
        &self.players
    }

    pub fn max_players(&self) -> Option<u32> {
        self.max_players
    }

    /// Metadata produced by the most recent transition, if any (currently
    /// only [`GameState::player_attack`] populates this).
    pub fn last_effects(&self) -> Option<&Effects> {
        self.last_effects.as_ref()
    }

    /// Returns a clone of `self` with `last_effects` cleared, the baseline
    /// "no-op" new state every action error returns.
    fn unchanged(&self) -> GameState {
        GameState {
            board: self.board.clone(),
            players: self.players.clone(),
            max_players: self.max_players,
            last_effects: None,
        }
    }

    /// Places `player_id` at a uniformly random walkable cell. Reconnects
    /// (an id already present) are reported as `already_spawned` rather
    /// than mutating anything — `GameActor` treats that as a soft success.
    pub fn spawn_player(&self, player_id: PlayerId, rng: &mut impl Rng) -> (GameState, ActionResult) {
        if self.players.contains_key(&player_id) {
            return (self.unchanged(), Err(ActionError::AlreadySpawned));
        }
        if let Some(cap) = self.max_players {
            if self.players.len() as u32 >= cap {
                return (self.unchanged(), Err(ActionError::MaxPlayers));
            }
        }

        let position = self.board.random_walkable_cell(rng);
        let mut players = self.players.clone();
        players.insert(
            player_id,
            PlayerRecord {
                position,
                status: PlayerStatus::Alive,
            },
        );
        (
            GameState {
                board: self.board.clone(),
                players,
                max_players: self.max_players,
                last_effects: None,
            },
            Ok(()),
        )
    }

    /// Places an existing player at a fresh random walkable cell, alive
    /// again. Used to bring dead players back after the respawn delay.
    pub fn respawn_player(&self, player_id: &PlayerId, rng: &mut impl Rng) -> (GameState, ActionResult) {
        if !self.players.contains_key(player_id) {
            return (self.unchanged(), Err(ActionError::InvalidPlayer));
        }

        let position = self.board.random_walkable_cell(rng);
        let mut players = self.players.clone();
        players.insert(
            player_id.clone(),
            PlayerRecord {
                position,
                status: PlayerStatus::Alive,
            },
        );
        (
            GameState {
                board: self.board.clone(),
                players,
                max_players: self.max_players,
                last_effects: None,
            },
            Ok(()),
        )
    }

    /// Moves `player_id` to `destination`, applying the checks in order:
    /// unknown id, dead player, unwalkable destination, then reachability
    /// (4-connected; the current cell is always reachable, so this is a
    /// no-op move that still reports success).
    pub fn move_player(&self, player_id: &PlayerId, destination: Coordinate) -> (GameState, ActionResult) {
        let Some(record) = self.players.get(player_id) else {
            return (self.unchanged(), Err(ActionError::InvalidPlayer));
        };
        if record.status == PlayerStatus::Dead {
            return (self.unchanged(), Err(ActionError::DeadPlayer));
        }
        if !self.board.walkable(destination) {
            return (self.unchanged(), Err(ActionError::UnwalkableDestination));
        }
        if !self.board.neighbors(record.position, destination) {
            return (self.unchanged(), Err(ActionError::UnreachableDestination));
        }

        let mut players = self.players.clone();
        players.insert(
            player_id.clone(),
            PlayerRecord {
                position: destination,
                status: PlayerStatus::Alive,
            },
        );
        (
            GameState {
                board: self.board.clone(),
                players,
                max_players: self.max_players,
                last_effects: None,
            },
            Ok(()),
        )
    }

    /// Resolves an attack from `player_id`: every other player inside the
    /// attacker's 8-connected blast radius dies. The attacker is never
    /// affected by their own attack. The returned state's `last_effects`
    /// lists the ids newly killed by this call (already-dead victims are
    /// not re-reported).
    pub fn player_attack(&self, player_id: &PlayerId) -> (GameState, ActionResult) {
        let Some(attacker) = self.players.get(player_id) else {
            return (self.unchanged(), Err(ActionError::InvalidPlayer));
        };
        if attacker.status == PlayerStatus::Dead {
            return (self.unchanged(), Err(ActionError::DeadPlayer));
        }

        let radius = self.board.blast_radius(attacker.position);
        let mut players = self.players.clone();
        let mut killed = Vec::new();
        for (id, record) in players.iter_mut() {
            if id == player_id {
                continue;
            }
            if record.status == PlayerStatus::Alive && radius.contains(&record.position) {
                record.status = PlayerStatus::Dead;
                killed.push(id.clone());
            }
        }

        (
            GameState {
                board: self.board.clone(),
                players,
                max_players: self.max_players,
                last_effects: Some(Effects { killed }),
            },
            Ok(()),
        )
    }

    /// Unconditionally removes the listed ids. Used by the actor to evict
    /// players whose subscriber set has gone empty.
    pub fn drop_players(&self, ids: &[PlayerId]) -> GameState {
        let mut players = self.players.clone();
        for id in ids {
            players.remove(id);
        }
        GameState {
            board: self.board.clone(),
            players,
            max_players: self.max_players,
            last_effects: None,
        }
    }

    /// Folds every player into the cell at its position, starting from the
    /// board's bare cell map. Total over any reachable state: every
    /// walkable or wall cell on the board gets exactly one entry.
    ///
    /// # Panics
    ///
    /// Panics if a player is recorded on a wall cell — that is a corrupt
    /// state, not a recoverable condition (see `GameActor`'s failure model).
    pub fn coalesce(&self) -> CoalescedBoard {
        let mut coalesced: CoalescedBoard = self
            .board
            .cell_map()
            .into_iter()
            .map(|(coord, cell)| (coord, CoalescedCell::Empty(cell)))
            .collect();

        for (id, record) in &self.players {
            match coalesced.get_mut(&record.position) {
                Some(CoalescedCell::Empty(board::Cell::Floor)) => {
                    let mut occupants = HashMap::with_capacity(1);
                    occupants.insert(id.clone(), record.status);
                    coalesced.insert(record.position, CoalescedCell::Occupied(occupants));
                }
                Some(CoalescedCell::Occupied(occupants)) => {
                    occupants.insert(id.clone(), record.status);
                }
                Some(CoalescedCell::Empty(board::Cell::Wall)) => {
                    panic!(
                        "invariant violation: player {id} is located on a wall at {}",
                        record.position
                    );
                }
                None => {
                    panic!(
                        "invariant violation: player {id} is located off the board at {}",
                        record.position
                    );
                }
            }
        }

        coalesced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn tiny_board() -> Board {
        Board::parse("#####\n#   #\n#   #\n#   #\n#####\n").unwrap()
    }

    fn state_with_board(board: Board) -> GameState {
        GameState::new(GameOptions {
            board: Some(board),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn new_rejects_bad_max_board_dimension() {
        let err = GameState::new(GameOptions {
            board: Some(tiny_board()),
            max_board_dimension: Some(2),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err, ConstructionError::MaxBoardDimensionExceeded);
    }

    #[test]
    fn spawn_places_player_on_a_walkable_cell() {
        let mut rng = rng();
        let state = state_with_board(tiny_board());
        let (state, result) = state.spawn_player("me".into(), &mut rng);
        assert!(result.is_ok());
        let record = &state.players()["me"];
        assert!(state.board().walkable(record.position));
        assert_eq!(record.status, PlayerStatus::Alive);
    }

    #[test]
    fn spawn_respects_max_players() {
        let mut rng = rng();
        let state = GameState::new(GameOptions {
            board: Some(tiny_board()),
            max_players: Some(2),
            ..Default::default()
        })
        .unwrap();
        let (state, _) = state.spawn_player("a".into(), &mut rng);
        let (state, _) = state.spawn_player("b".into(), &mut rng);
        let (_, result) = state.spawn_player("c".into(), &mut rng);
        assert_eq!(result, Err(ActionError::MaxPlayers));
    }

    #[test]
    fn spawn_twice_is_already_spawned_not_mutating() {
        let mut rng = rng();
        let state = state_with_board(tiny_board());
        let (state, _) = state.spawn_player("me".into(), &mut rng);
        let before = state.players()["me"].position;
        let (state, result) = state.spawn_player("me".into(), &mut rng);
        assert_eq!(result, Err(ActionError::AlreadySpawned));
        assert_eq!(state.players()["me"].position, before);
    }

    #[test]
    fn move_onto_neighbor_floor_succeeds() {
        let mut rng = rng();
        let state = state_with_board(tiny_board());
        let (mut state, _) = state.spawn_player("me".into(), &mut rng);
        // Force a known position so the move's destination is deterministic.
        state = GameState {
            players: {
                let mut players = state.players().clone();
                players.insert(
                    "me".into(),
                    PlayerRecord {
                        position: Coordinate::new(1, 1),
                        status: PlayerStatus::Alive,
                    },
                );
                players
            },
            ..state
        };
        let (state, result) = state.move_player(&"me".to_string(), Coordinate::new(1, 2));
        assert_eq!(result, Ok(()));
        assert_eq!(state.players()["me"].position, Coordinate::new(1, 2));
    }

    #[test]
    fn illegal_moves_are_rejected_in_order() {
        let mut rng = rng();
        let state = state_with_board(tiny_board());
        let (mut state, _) = state.spawn_player("me".into(), &mut rng);
        state = GameState {
            players: {
                let mut players = state.players().clone();
                players.insert(
                    "me".into(),
                    PlayerRecord {
                        position: Coordinate::new(1, 1),
                        status: PlayerStatus::Alive,
                    },
                );
                players
            },
            ..state
        };

        let (unchanged, result) = state.move_player(&"me".to_string(), Coordinate::new(1, 0));
        assert_eq!(result, Err(ActionError::UnwalkableDestination));
        assert_eq!(unchanged.players()["me"].position, Coordinate::new(1, 1));

        let (_, result) = state.move_player(&"me".to_string(), Coordinate::new(2, 2));
        assert_eq!(result, Err(ActionError::UnreachableDestination));

        let (_, result) = state.move_player(&"me".to_string(), Coordinate::new(1, 3));
        assert_eq!(result, Err(ActionError::UnreachableDestination));
    }

    #[test]
    fn move_idempotence_same_cell_is_a_noop_success() {
        let mut rng = rng();
        let state = state_with_board(tiny_board());
        let (state, _) = state.spawn_player("me".into(), &mut rng);
        let pos = state.players()["me"].position;
        let (after, result) = state.move_player(&"me".to_string(), pos);
        assert_eq!(result, Ok(()));
        assert_eq!(after.players()["me"].position, pos);
    }

    #[test]
    fn attack_kills_everyone_in_radius_except_self() {
        let mut rng = rng();
        let state = state_with_board(tiny_board());
        let (mut state, _) = state.spawn_player("me".into(), &mut rng);
        let (s, _) = state.spawn_player("victim".into(), &mut rng);
        state = s;
        let players = {
            let mut p = state.players().clone();
            p.insert(
                "me".into(),
                PlayerRecord {
                    position: Coordinate::new(2, 2),
                    status: PlayerStatus::Alive,
                },
            );
            p.insert(
                "victim".into(),
                PlayerRecord {
                    position: Coordinate::new(2, 3),
                    status: PlayerStatus::Alive,
                },
            );
            p
        };
        state = GameState { players, ..state };

        let (after, result) = state.player_attack(&"me".to_string());
        assert_eq!(result, Ok(()));
        assert_eq!(after.players()["me"].status, PlayerStatus::Alive);
        assert_eq!(after.players()["victim"].status, PlayerStatus::Dead);
        assert_eq!(after.last_effects().unwrap().killed, vec!["victim".to_string()]);
    }

    #[test]
    fn attack_self_safety() {
        let mut rng = rng();
        let state = state_with_board(tiny_board());
        let (state, _) = state.spawn_player("me".into(), &mut rng);
        let (after, _) = state.player_attack(&"me".to_string());
        assert_eq!(after.players()["me"].status, PlayerStatus::Alive);
    }

    #[test]
    fn coalesce_is_total_over_board_cells() {
        let mut rng = rng();
        let state = state_with_board(tiny_board());
        let (state, _) = state.spawn_player("me".into(), &mut rng);
        let coalesced = state.coalesce();
        let board_keys: std::collections::HashSet<_> = state.board().cell_map().into_keys().collect();
        let coalesced_keys: std::collections::HashSet<_> = coalesced.keys().copied().collect();
        assert_eq!(board_keys, coalesced_keys);
    }

    #[test]
    fn coalesce_folds_multiple_players_on_one_cell() {
        let mut rng = rng();
        let state = state_with_board(tiny_board());
        let (state, _) = state.spawn_player("a".into(), &mut rng);
        let (state, _) = state.spawn_player("b".into(), &mut rng);
        let shared = Coordinate::new(1, 1);
        let players = {
            let mut p = state.players().clone();
            for id in ["a", "b"] {
                p.insert(
                    id.into(),
                    PlayerRecord {
                        position: shared,
                        status: PlayerStatus::Alive,
                    },
                );
            }
            p
        };
        let state = GameState { players, ..state };
        let coalesced = state.coalesce();
        match &coalesced[&shared] {
            CoalescedCell::Occupied(map) => assert_eq!(map.len(), 2),
            other => panic!("expected an occupied cell, got {other:?}"),
        }
    }

    #[test]
    #[should_panic(expected = "invariant violation")]
    fn coalesce_panics_on_corrupt_state() {
        let state = state_with_board(tiny_board());
        let players = {
            let mut p = state.players().clone();
            p.insert(
                "ghost".into(),
                PlayerRecord {
                    position: Coordinate::new(0, 0),
                    status: PlayerStatus::Alive,
                },
            );
            p
        };
        let state = GameState { players, ..state };
        let _ = state.coalesce();
    }

    #[test]
    fn drop_players_removes_unconditionally() {
        let mut rng = rng();
        let state = state_with_board(tiny_board());
        let (state, _) = state.spawn_player("me".into(), &mut rng);
        let state = state.drop_players(&["me".to_string()]);
        assert!(!state.players().contains_key("me"));
    }

    #[test]
    fn invalid_player_errors_for_unknown_ids() {
        let state = state_with_board(tiny_board());
        let unknown = "nobody".to_string();
        assert_eq!(
            state.move_player(&unknown, Coordinate::new(1, 1)).1,
            Err(ActionError::InvalidPlayer)
        );
        assert_eq!(
            state.player_attack(&unknown).1,
            Err(ActionError::InvalidPlayer)
        );
        assert_eq!(
            state.respawn_player(&unknown, &mut rng()).1,
            Err(ActionError::InvalidPlayer)
        );
    }

    #[test]
    fn dead_player_cannot_move_or_attack() {
        let mut rng = rng();
        let state = state_with_board(tiny_board());
        let (state, _) = state.spawn_player("me".into(), &mut rng);
        let (state, _) = state.spawn_player("killer".into(), &mut rng);
        // Put both adjacent, then kill "me" with an attack from "killer".
        let players = {
            let mut p = state.players().clone();
            p.insert(
                "me".into(),
                PlayerRecord {
                    position: Coordinate::new(1, 1),
                    status: PlayerStatus::Alive,
                },
            );
            p.insert(
                "killer".into(),
                PlayerRecord {
                    position: Coordinate::new(1, 2),
                    status: PlayerStatus::Alive,
                },
            );
            p
        };
        let state = GameState { players, ..state };
        let (state, _) = state.player_attack(&"killer".to_string());
        assert_eq!(state.players()["me"].status, PlayerStatus::Dead);

        let (_, move_result) = state.move_player(&"me".to_string(), Coordinate::new(1, 1));
        assert_eq!(move_result, Err(ActionError::DeadPlayer));
        let (_, attack_result) = state.player_attack(&"me".to_string());
        assert_eq!(attack_result, Err(ActionError::DeadPlayer));
    }

    #[test]
    fn walkable_invariant_holds_for_every_player() {
        let mut rng = rng();
        let mut state = state_with_board(Board::default_board());
        for i in 0..20 {
            let (s, _) = state.spawn_player(format!("p{i}"), &mut rng);
            state = s;
        }
        for record in state.players().values() {
            assert!(state.board().walkable(record.position));
        }
    }
}
